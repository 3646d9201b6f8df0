//! Error types for docket.
//!
//! Every failure the retrieval core can surface maps to one [`DocketError`]
//! variant. The variants keep "no document indexed yet", "could not reach
//! the language model" and "internal extraction error" distinguishable all
//! the way up to the CLI, which renders them with
//! [`DocketError::user_message`].

use thiserror::Error;

/// Errors produced by indexing, retrieval, and answering.
#[derive(Debug, Error)]
pub enum DocketError {
    /// The source document could not be converted to text.
    #[error("extraction failed for '{document}': {message}")]
    Extraction {
        /// File name of the document being indexed.
        document: String,
        /// Underlying extractor message.
        message: String,
    },

    /// Only PDF documents are accepted.
    #[error("unsupported document format: '{0}' (only .pdf is accepted)")]
    UnsupportedFormat(String),

    /// A query targeted a collection that has never been indexed.
    #[error("document '{document}' is not indexed (collection '{collection}' not found)")]
    NotIndexed {
        /// Raw document name supplied by the caller.
        document: String,
        /// Collection identifier derived from it.
        collection: String,
    },

    /// The index store has no collection with this id.
    #[error("collection '{0}' not found")]
    CollectionNotFound(String),

    /// The session has no current document.
    #[error("no document has been uploaded in this session")]
    NoDocument,

    /// The question was empty or whitespace.
    #[error("question is empty")]
    EmptyQuestion,

    /// The language-model call failed or timed out.
    #[error("generation failed ({provider}): {message}")]
    Generation {
        /// Generator provider name (e.g. `gemini`).
        provider: String,
        /// Description of the failure.
        message: String,
    },

    /// The embedding backend failed.
    #[error("embedding failed ({provider}): {message}")]
    Embedding {
        /// Embedding provider name (e.g. `local`).
        provider: String,
        /// Description of the failure.
        message: String,
    },

    /// A collection was written or queried with a different embedding model
    /// than the one it was created with.
    #[error(
        "collection '{collection}' was built with embedding model '{expected}' ({expected_dims} dims), got '{actual}' ({actual_dims} dims)"
    )]
    ModelMismatch {
        collection: String,
        expected: String,
        expected_dims: usize,
        actual: String,
        actual_dims: usize,
    },

    /// The index store backend failed.
    #[error("index store error ({backend}): {message}")]
    Store {
        /// Store backend name (`sqlite`, `memory`).
        backend: String,
        /// Description of the failure.
        message: String,
    },

    /// Writing the usage log failed. Never fatal to an answer.
    #[error("usage log error: {0}")]
    UsageLog(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DocketError {
    pub(crate) fn store(backend: &str, err: impl std::fmt::Display) -> Self {
        DocketError::Store {
            backend: backend.to_string(),
            message: err.to_string(),
        }
    }

    /// Returns `true` when the error means "index the document first".
    pub fn is_not_indexed(&self) -> bool {
        matches!(
            self,
            DocketError::NotIndexed { .. }
                | DocketError::CollectionNotFound(_)
                | DocketError::NoDocument
        )
    }

    /// Actionable, user-facing message for this error.
    pub fn user_message(&self) -> String {
        match self {
            DocketError::NotIndexed { document, .. } => format!(
                "'{}' has not been indexed yet. Please index the document first (docket index <file.pdf>).",
                document
            ),
            DocketError::NoDocument => "Please upload a document first.".to_string(),
            DocketError::EmptyQuestion => "Please enter a valid question.".to_string(),
            DocketError::Generation { message, .. } => format!(
                "Could not generate an answer: the language model could not be reached ({}).",
                message
            ),
            DocketError::Extraction { document, message } => format!(
                "Internal extraction error: could not read text from '{}' ({}).",
                document, message
            ),
            DocketError::UnsupportedFormat(name) => {
                format!("'{}' is not a PDF. Only PDF documents are supported.", name)
            }
            other => other.to_string(),
        }
    }
}

/// Convenience result type for docket operations.
pub type Result<T> = std::result::Result<T, DocketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_indexed_message_asks_for_indexing() {
        let err = DocketError::NotIndexed {
            document: "contract.pdf".into(),
            collection: "contract".into(),
        };
        assert!(err.is_not_indexed());
        assert!(err.user_message().contains("index the document first"));
    }

    #[test]
    fn test_messages_distinguish_failure_kinds() {
        let gen = DocketError::Generation {
            provider: "gemini".into(),
            message: "timeout".into(),
        }
        .user_message();
        let ext = DocketError::Extraction {
            document: "a.pdf".into(),
            message: "bad xref".into(),
        }
        .user_message();
        let none = DocketError::NoDocument.user_message();

        assert!(gen.contains("language model"));
        assert!(ext.contains("extraction"));
        assert!(none.contains("upload a document"));
        assert_ne!(gen, ext);
    }
}
