use serde::Deserialize;
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;
const DEFAULT_TOP_K: usize = 4;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10_000_000;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Bearer token for OpenAI-compatible providers.
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible API (including the `/v1` segment).
    pub openai_base_url: String,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of vectors produced by the offline hashing provider.
    pub embedding_dimension: usize,
    /// Chat-completion provider used for answering and summarization.
    pub chat_provider: ChatProvider,
    /// Chat model identifier passed to the provider.
    pub chat_model: String,
    /// Maximum chunk length, measured in `text_splitter_length_unit`.
    pub text_splitter_chunk_size: usize,
    /// Overlap retained between adjacent chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Unit used to measure chunk lengths.
    pub text_splitter_length_unit: LengthUnit,
    /// Number of chunks retrieved per question.
    pub retrieval_top_k: usize,
    /// Directory receiving temporary upload files (OS temp dir when unset).
    pub upload_tmp_dir: Option<PathBuf>,
    /// Maximum accepted multipart body size in bytes.
    pub max_upload_bytes: usize,
    /// Address the HTTP server binds to.
    pub server_host: IpAddr,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted OpenAI (or compatible) embeddings API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
    /// Offline deterministic hashing; no network access.
    Hash,
}

/// Supported chat-completion backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatProvider {
    /// Hosted OpenAI (or compatible) chat completions API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

/// Unit used by the text splitter to measure chunk length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    /// Unicode scalar values.
    #[default]
    Characters,
    /// BPE tokens of the embedding model.
    Tokens,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let embedding_provider = parse_or(&get, "EMBEDDING_PROVIDER", EmbeddingProvider::OpenAI)?;
        let chat_provider = parse_or(&get, "CHAT_PROVIDER", ChatProvider::OpenAI)?;
        let openai_api_key = get("OPENAI_API_KEY");
        let needs_openai = embedding_provider == EmbeddingProvider::OpenAI
            || chat_provider == ChatProvider::OpenAI;
        if needs_openai && openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".into()));
        }

        let text_splitter_chunk_size: usize =
            parse_or(&get, "TEXT_SPLITTER_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let text_splitter_chunk_overlap: usize =
            parse_or(&get, "TEXT_SPLITTER_CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?;
        if text_splitter_chunk_size == 0 {
            return Err(ConfigError::InvalidValue("TEXT_SPLITTER_CHUNK_SIZE".into()));
        }
        if text_splitter_chunk_overlap >= text_splitter_chunk_size {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_OVERLAP".into(),
            ));
        }

        let embedding_dimension: usize =
            parse_or(&get, "EMBEDDING_DIMENSION", DEFAULT_EMBEDDING_DIMENSION)?;
        if embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }

        let retrieval_top_k: usize = parse_or(&get, "RETRIEVAL_TOP_K", DEFAULT_TOP_K)?;
        if retrieval_top_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVAL_TOP_K".into()));
        }

        Ok(Self {
            openai_api_key,
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            ollama_url: get("OLLAMA_URL").unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            embedding_provider,
            embedding_model: get("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension,
            chat_provider,
            chat_model: get("CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            text_splitter_chunk_size,
            text_splitter_chunk_overlap,
            text_splitter_length_unit: parse_or(
                &get,
                "TEXT_SPLITTER_LENGTH_UNIT",
                LengthUnit::Characters,
            )?,
            retrieval_top_k,
            upload_tmp_dir: get("UPLOAD_TMP_DIR").map(PathBuf::from),
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            server_host: parse_or(&get, "SERVER_HOST", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?,
            server_port: get("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for ChatProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for LengthUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "characters" | "chars" => Ok(Self::Characters),
            "tokens" => Ok(Self::Tokens),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment (after `.env`) and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    Ok(CONFIG.get_or_init(|| config))
}
