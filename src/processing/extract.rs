//! Upload staging and text extraction.
//!
//! Uploaded bytes are written to a request-private [`NamedTempFile`] before any parser sees
//! them. The handle owns the file, so it is deleted when dropped on every exit path.

use crate::processing::types::ExtractionError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const TEMP_PREFIX: &str = "rag-upload-";

/// Document formats accepted by ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// `application/pdf`
    Pdf,
    /// `text/plain`
    PlainText,
}

impl DocumentKind {
    /// Classify a declared content type, ignoring case and parameters such as `charset`.
    pub fn from_content_type(content_type: Option<&str>) -> Option<Self> {
        let essence = content_type?
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Some(Self::Pdf),
            "text/plain" => Some(Self::PlainText),
            _ => None,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Pdf => ".pdf",
            Self::PlainText => ".txt",
        }
    }
}

/// Write `bytes` to a fresh temporary file inside `dir` (or the OS temp dir).
pub async fn stage_upload(
    bytes: Vec<u8>,
    kind: DocumentKind,
    dir: Option<PathBuf>,
) -> Result<NamedTempFile, ExtractionError> {
    tokio::task::spawn_blocking(move || -> Result<NamedTempFile, ExtractionError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX).suffix(kind.suffix());
        let mut file = match dir.as_deref() {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(&bytes)?;
        file.flush()?;
        Ok(file)
    })
    .await
    .map_err(|error| ExtractionError::Task(error.to_string()))?
}

/// Extract the text of a staged document.
///
/// PDF pages are joined in order with a blank line. Plain text must be valid UTF-8.
pub async fn extract_text(path: &Path, kind: DocumentKind) -> Result<String, ExtractionError> {
    match kind {
        DocumentKind::Pdf => {
            let path = path.to_path_buf();
            let pages = tokio::task::spawn_blocking(move || {
                pdf_extract::extract_text_by_pages(&path)
                    .map_err(|error| ExtractionError::Pdf(error.to_string()))
            })
            .await
            .map_err(|error| ExtractionError::Task(error.to_string()))??;
            tracing::debug!(pages = pages.len(), "Extracted PDF text");
            Ok(pages.join("\n\n"))
        }
        DocumentKind::PlainText => {
            let bytes = tokio::fs::read(path).await?;
            Ok(String::from_utf8(bytes)?)
        }
    }
}
