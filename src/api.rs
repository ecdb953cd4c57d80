//! HTTP surface for the RAG gateway.
//!
//! - `GET /` – Liveness greeting.
//! - `POST /api/app1/ingest` – Multipart upload (field `file`) of a PDF or plain-text document;
//!   the text is chunked, embedded, and added to the in-memory index.
//! - `POST /api/app1/query` – Answer `{ "question" }` from the indexed documents, returning the
//!   answer and the unique sources it was grounded on.
//! - `POST /api/app2/summarize` – Summarize `{ "text" }` in one response.
//! - `POST /api/app2/summarize/stream` – Same, streamed as Server-Sent Events: one
//!   `{"token": ...}` payload per fragment, then `[DONE]`, or a single `{"error": ...}`.
//! - `GET /api/metrics` – Ingestion and answering counters.
//!
//! Failures are rendered as `{"detail": message}`.

use crate::llm::LlmError;
use crate::processing::{DocumentUpload, RagApi, RagError};
use crate::summarization::SummarizationService;
use axum::{
    Json, Router,
    extract::{Multipart, State, multipart::MultipartError},
    http::{
        HeaderName, StatusCode,
        header::{CACHE_CONTROL, CONNECTION},
    },
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;

const UPLOAD_FIELD: &str = "file";
const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Shared handler state.
struct AppState<R> {
    rag: Arc<R>,
    summarizer: Arc<SummarizationService>,
}

impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            rag: Arc::clone(&self.rag),
            summarizer: Arc::clone(&self.summarizer),
        }
    }
}

/// Build the HTTP router exposing the gateway API surface.
pub fn create_router<R>(rag: Arc<R>, summarizer: Arc<SummarizationService>) -> Router
where
    R: RagApi + 'static,
{
    let api = Router::new()
        .route("/app1/ingest", post(ingest_document::<R>))
        .route("/app1/query", post(query_documents::<R>))
        .route("/app2/summarize", post(summarize::<R>))
        .route("/app2/summarize/stream", post(summarize_stream::<R>))
        .route("/metrics", get(get_metrics::<R>));

    Router::new()
        .route("/", get(root))
        .nest("/api", api)
        .with_state(AppState { rag, summarizer })
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Hello World" }))
}

/// Response body for message-only endpoints.
#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

/// Ingest the multipart `file` field.
async fn ingest_document<R>(
    State(state): State<AppState<R>>,
    mut multipart: Multipart,
) -> Result<Json<MessageResponse>, AppError>
where
    R: RagApi,
{
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?;
        upload = Some(DocumentUpload {
            bytes: bytes.to_vec(),
            content_type,
            filename,
        });
        break;
    }
    let upload = upload.ok_or_else(|| {
        AppError::bad_request(format!("Missing multipart field '{UPLOAD_FIELD}'"))
    })?;

    let outcome = state.rag.ingest(upload).await?;
    Ok(Json(MessageResponse {
        message: format!(
            "Ingested {} chunks from '{}'",
            outcome.chunk_count, outcome.source
        ),
    }))
}

/// Request body for `POST /api/app1/query`.
#[derive(Deserialize)]
struct QueryRequest {
    question: String,
}

/// Response body for `POST /api/app1/query`.
#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    sources: Vec<String>,
}

async fn query_documents<R>(
    State(state): State<AppState<R>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError>
where
    R: RagApi,
{
    let answer = state.rag.answer(&request.question).await?;
    tracing::info!(sources = answer.sources.len(), "Query answered");
    Ok(Json(QueryResponse {
        answer: answer.text,
        sources: answer.sources,
    }))
}

/// Request body for both summarize endpoints.
#[derive(Deserialize)]
struct SummarizeRequest {
    text: String,
}

/// Response body for `POST /api/app2/summarize`.
#[derive(Serialize)]
struct SummarizeResponse {
    summary: String,
}

async fn summarize<R>(
    State(state): State<AppState<R>>,
    Json(request): Json<SummarizeRequest>,
) -> Result<Json<SummarizeResponse>, AppError>
where
    R: RagApi,
{
    let summary = state.summarizer.summarize(&request.text).await?;
    Ok(Json(SummarizeResponse { summary }))
}

/// Stream a summary as Server-Sent Events.
///
/// Failures after the response has started are reported in-band as an `error` payload, so the
/// status is always 200.
async fn summarize_stream<R>(
    State(state): State<AppState<R>>,
    Json(request): Json<SummarizeRequest>,
) -> impl IntoResponse
where
    R: RagApi,
{
    let events = state
        .summarizer
        .summarize_stream(request.text)
        .map(|event| Ok::<_, Infallible>(Event::default().data(event.sse_data())));

    (
        [
            (CACHE_CONTROL, "no-cache"),
            (CONNECTION, "keep-alive"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Sse::new(events).keep_alive(KeepAlive::default()),
    )
}

/// Return the pipeline counters.
async fn get_metrics<R>(State(state): State<AppState<R>>) -> impl IntoResponse
where
    R: RagApi,
{
    Json(state.rag.metrics_snapshot())
}

/// Error rendered as `{"detail": message}` with a matching status code.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    detail: String,
}

impl AppError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn internal(error: &dyn std::error::Error) -> Self {
        tracing::error!(%error, "Request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: error.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

impl From<RagError> for AppError {
    fn from(inner: RagError) -> Self {
        match inner {
            RagError::UnsupportedMediaType(_) => {
                Self::bad_request("Only PDF and text files are supported")
            }
            other => Self::internal(&other),
        }
    }
}

impl From<LlmError> for AppError {
    fn from(inner: LlmError) -> Self {
        Self::internal(&inner)
    }
}

impl From<MultipartError> for AppError {
    fn from(inner: MultipartError) -> Self {
        tracing::warn!(error = %inner, "Rejected multipart upload");
        Self {
            status: inner.status(),
            detail: inner.body_text(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::llm::{ChatClient, ChatRequest, LlmError, TokenStream};
    use crate::metrics::MetricsSnapshot;
    use crate::processing::{
        Answer, DocumentUpload, IngestOutcome, RagApi, RagError, UNKNOWN_SOURCE,
    };
    use crate::summarization::SummarizationService;
    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header::CONTENT_TYPE},
    };
    use futures_util::stream;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const BOUNDARY: &str = "rag-gateway-boundary";

    #[derive(Default)]
    struct StubRag {
        uploads: Mutex<Vec<DocumentUpload>>,
        questions: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RagApi for StubRag {
        async fn ingest(&self, upload: DocumentUpload) -> Result<IngestOutcome, RagError> {
            if upload.content_type.as_deref() == Some("image/png") {
                return Err(RagError::UnsupportedMediaType("image/png".into()));
            }
            let source = upload
                .filename
                .clone()
                .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());
            self.uploads.lock().await.push(upload);
            Ok(IngestOutcome {
                chunk_count: 3,
                chunk_ids: (0..3).map(|_| uuid::Uuid::new_v4()).collect(),
                source,
            })
        }

        async fn answer(&self, question: &str) -> Result<Answer, RagError> {
            self.questions.lock().await.push(question.to_string());
            Ok(Answer {
                text: "Blue.".into(),
                sources: vec!["sky.txt".into()],
            })
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_ingested: 2,
                chunks_indexed: 7,
                questions_answered: 1,
                empty_retrievals: 0,
            }
        }
    }

    struct StubChat {
        tokens: Vec<Result<String, LlmError>>,
    }

    #[async_trait]
    impl ChatClient for StubChat {
        async fn complete(&self, _request: ChatRequest) -> Result<String, LlmError> {
            Ok("Short summary.".into())
        }

        async fn stream(&self, _request: ChatRequest) -> Result<TokenStream, LlmError> {
            let tokens: Vec<Result<String, LlmError>> = self
                .tokens
                .iter()
                .map(|item| match item {
                    Ok(token) => Ok(token.clone()),
                    Err(error) => Err(LlmError::GenerationFailed(error.to_string())),
                })
                .collect();
            Ok(Box::pin(stream::iter(tokens)))
        }
    }

    fn app_with(rag: Arc<StubRag>, tokens: Vec<Result<String, LlmError>>) -> Router {
        let summarizer = Arc::new(SummarizationService::new(Arc::new(StubChat { tokens })));
        create_router(rag, summarizer)
    }

    fn app() -> Router {
        app_with(Arc::new(StubRag::default()), Vec::new())
    }

    fn multipart_request(
        field: &str,
        filename: &str,
        content_type: &str,
        body: &str,
    ) -> Request<Body> {
        let payload = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n{body}\r\n--{BOUNDARY}--\r\n"
        );
        Request::builder()
            .method(Method::POST)
            .uri("/api/app1/ingest")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(payload))
            .expect("request")
    }

    fn json_request(uri: &str, payload: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json body")
    }

    async fn sse_payloads(response: axum::response::Response) -> Vec<String> {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        String::from_utf8(body.to_vec())
            .expect("utf-8 body")
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|data| data.trim().to_string())
            .collect()
    }

    #[tokio::test]
    async fn root_says_hello() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "message": "Hello World" }));
    }

    #[tokio::test]
    async fn ingest_forwards_upload_and_reports_chunks() {
        let rag = Arc::new(StubRag::default());
        let response = app_with(rag.clone(), Vec::new())
            .oneshot(multipart_request(
                "file",
                "notes.txt",
                "text/plain",
                "The sky is blue.",
            ))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "message": "Ingested 3 chunks from 'notes.txt'" })
        );
        let uploads = rag.uploads.lock().await;
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].bytes, b"The sky is blue.");
        assert_eq!(uploads[0].content_type.as_deref(), Some("text/plain"));
        assert_eq!(uploads[0].filename.as_deref(), Some("notes.txt"));
    }

    #[tokio::test]
    async fn ingest_rejects_unsupported_type() {
        let response = app()
            .oneshot(multipart_request("file", "photo.png", "image/png", "PNG"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await,
            json!({ "detail": "Only PDF and text files are supported" })
        );
    }

    #[tokio::test]
    async fn ingest_requires_file_field() {
        let rag = Arc::new(StubRag::default());
        let response = app_with(rag.clone(), Vec::new())
            .oneshot(multipart_request("document", "notes.txt", "text/plain", "text"))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().unwrap().contains("file"));
        assert!(rag.uploads.lock().await.is_empty());
    }

    #[tokio::test]
    async fn query_returns_answer_and_sources() {
        let rag = Arc::new(StubRag::default());
        let response = app_with(rag.clone(), Vec::new())
            .oneshot(json_request(
                "/api/app1/query",
                json!({ "question": "What color is the sky?" }),
            ))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "answer": "Blue.", "sources": ["sky.txt"] })
        );
        assert_eq!(
            rag.questions.lock().await.as_slice(),
            ["What color is the sky?".to_string()]
        );
    }

    #[tokio::test]
    async fn summarize_returns_summary() {
        let response = app()
            .oneshot(json_request(
                "/api/app2/summarize",
                json!({ "text": "Long text" }),
            ))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "summary": "Short summary." }));
    }

    #[tokio::test]
    async fn summarize_stream_emits_tokens_then_done() {
        let response = app_with(
            Arc::new(StubRag::default()),
            vec![Ok("Hello".into()), Ok(" world".into())],
        )
        .oneshot(json_request(
            "/api/app2/summarize/stream",
            json!({ "text": "Long text" }),
        ))
        .await
        .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert!(
            headers[CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );
        assert_eq!(headers["cache-control"], "no-cache");
        assert_eq!(headers["connection"], "keep-alive");
        assert_eq!(headers["x-accel-buffering"], "no");

        let payloads = sse_payloads(response).await;
        assert_eq!(
            payloads,
            vec![
                r#"{"token":"Hello"}"#.to_string(),
                r#"{"token":" world"}"#.to_string(),
                "[DONE]".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn summarize_stream_reports_error_without_done() {
        let response = app_with(
            Arc::new(StubRag::default()),
            vec![
                Ok("Partial".into()),
                Err(LlmError::GenerationFailed("rate limited".into())),
            ],
        )
        .oneshot(json_request(
            "/api/app2/summarize/stream",
            json!({ "text": "Long text" }),
        ))
        .await
        .expect("router response");

        let payloads = sse_payloads(response).await;
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0], r#"{"token":"Partial"}"#);
        let error: Value = serde_json::from_str(&payloads[1]).expect("error payload");
        assert!(error["error"].as_str().unwrap().contains("rate limited"));
        assert!(!payloads.iter().any(|payload| payload == "[DONE]"));
    }

    #[tokio::test]
    async fn metrics_exposes_counters() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/api/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({
                "documents_ingested": 2,
                "chunks_indexed": 7,
                "questions_answered": 1,
                "empty_retrievals": 0
            })
        );
    }
}
