use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use clap::Parser;
use rag_gateway::{
    api, config, embedding, index::VectorIndex, llm, logging, processing, summarization,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;

const PORT_RANGE: std::ops::RangeInclusive<u16> = 8000..=8099;

/// Retrieval-augmented generation gateway.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Address to bind (overrides SERVER_HOST).
    #[arg(long)]
    host: Option<IpAddr>,
    /// Port to bind (overrides SERVER_PORT; otherwise the first free port in 8000-8099).
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    config::init_config().context("Failed to load configuration")?;
    let config = config::get_config();
    if let Some(path) = logging::init_tracing() {
        tracing::debug!(path = %path.display(), "File logging enabled");
    }

    let embedder =
        embedding::get_embedding_client(config).context("Failed to build embedding client")?;
    let chat = llm::get_chat_client(config).context("Failed to build chat client")?;
    let splitter = processing::TextSplitter::new(
        processing::ChunkingConfig {
            chunk_size: config.text_splitter_chunk_size,
            chunk_overlap: config.text_splitter_chunk_overlap,
            length_unit: config.text_splitter_length_unit,
        },
        &config.embedding_model,
    )
    .context("Failed to build text splitter")?;
    tracing::info!(
        embedding_provider = ?config.embedding_provider,
        chat_provider = ?config.chat_provider,
        chunk_size = splitter.chunk_size(),
        chunk_overlap = splitter.chunk_overlap(),
        top_k = config.retrieval_top_k,
        "Pipeline configured"
    );

    let index = Arc::new(VectorIndex::new(embedder));
    let rag = processing::RagService::new(index, chat.clone(), splitter)
        .with_upload_dir(config.upload_tmp_dir.clone())
        .with_top_k(config.retrieval_top_k);
    let summarizer = summarization::SummarizationService::new(chat);
    let app = api::create_router(Arc::new(rag), Arc::new(summarizer))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes));

    let host = cli.host.unwrap_or(config.server_host);
    let port = cli.port.or(config.server_port);
    let (listener, addr) = bind_listener(host, port).await?;
    tracing::info!("Listening on http://{addr}");
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn bind_listener(
    host: IpAddr,
    port: Option<u16>,
) -> anyhow::Result<(TcpListener, SocketAddr)> {
    if let Some(port) = port {
        let addr = SocketAddr::new(host, port);
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        return Ok((listener, addr));
    }

    for port in PORT_RANGE {
        let addr = SocketAddr::new(host, port);
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, addr));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
            }
            Err(err) => return Err(err).with_context(|| format!("Failed to bind {addr}")),
        }
    }

    anyhow::bail!(
        "No available port found in range {}-{}",
        PORT_RANGE.start(),
        PORT_RANGE.end()
    )
}
