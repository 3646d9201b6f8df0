//! Page-wise text extraction for PDF documents.
//!
//! Extraction is the first step of indexing: the indexer hands a file path
//! to a [`PageExtractor`] and receives one UTF-8 string per page. Only
//! `.pdf` files are accepted. Extraction never panics the caller; a
//! malformed document becomes [`DocketError::Extraction`].

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::collection::source_name;
use crate::error::{DocketError, Result};

/// Turns a document on disk into per-page text.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Extract the text of every page, in page order.
    async fn extract_pages(&self, path: &Path) -> Result<Vec<String>>;
}

/// PDF extractor backed by `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

/// Whether `path` carries a `.pdf` extension (case-insensitive).
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Extract per-page text from in-memory PDF bytes.
pub fn extract_pdf_pages(document: &str, bytes: &[u8]) -> Result<Vec<String>> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| DocketError::Extraction {
        document: document.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl PageExtractor for PdfExtractor {
    async fn extract_pages(&self, path: &Path) -> Result<Vec<String>> {
        let document = source_name(path);
        if !is_pdf(path) {
            return Err(DocketError::UnsupportedFormat(document));
        }

        let bytes = tokio::fs::read(path).await.map_err(|e| DocketError::Extraction {
            document: document.clone(),
            message: e.to_string(),
        })?;

        // pdf-extract is synchronous and may panic on malformed input
        let name = document.clone();
        let pages = tokio::task::spawn_blocking(move || extract_pdf_pages(&name, &bytes))
            .await
            .map_err(|e| DocketError::Extraction {
                document: document.clone(),
                message: format!("extractor aborted: {}", e),
            })??;

        debug!(document = %document, pages = pages.len(), "extracted pdf text");
        Ok(pages)
    }
}
