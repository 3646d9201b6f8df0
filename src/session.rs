//! Interactive chat session state.
//!
//! A session tracks the current document, the conversation about it, and
//! a cached summary. Uploading a document resets the conversation and the
//! summary. Sessions own their state; the indexer and answering engine are
//! shared services.

use std::path::Path;
use std::sync::Arc;

use crate::answer::{Answer, AnsweringEngine};
use crate::conversation::{Conversation, Turn};
use crate::error::{DocketError, Result};
use crate::ingest::{IndexReport, Indexer};

pub struct Session {
    indexer: Arc<Indexer>,
    engine: Arc<AnsweringEngine>,
    document: Option<String>,
    conversation: Conversation,
    summary: Option<Answer>,
}

impl Session {
    pub fn new(indexer: Arc<Indexer>, engine: Arc<AnsweringEngine>) -> Self {
        Self {
            indexer,
            engine,
            document: None,
            conversation: Conversation::new(),
            summary: None,
        }
    }

    /// Index the PDF at `path` and make it the current document.
    pub async fn upload(&mut self, path: &Path) -> Result<IndexReport> {
        let report = self.indexer.index(path).await?;
        self.select(report.document.clone());
        Ok(report)
    }

    /// Index already-extracted pages and make them the current document.
    pub async fn upload_pages(&mut self, document: &str, pages: &[String]) -> Result<IndexReport> {
        let report = self.indexer.index_pages(document, pages).await?;
        self.select(report.document.clone());
        Ok(report)
    }

    /// Switch to a document indexed earlier, without re-indexing it.
    pub fn select(&mut self, document: String) {
        self.document = Some(document);
        self.conversation.clear();
        self.summary = None;
    }

    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_ref().map(|a| a.text.as_str())
    }

    /// Ask about the current document. The exchange is added to the
    /// conversation only when an answer was produced.
    pub async fn ask(&mut self, question: &str) -> Result<Answer> {
        let document = self.document.as_deref().ok_or(DocketError::NoDocument)?;
        let answer = self
            .engine
            .ask(question, document, self.conversation.turns())
            .await?;
        self.conversation
            .push(Turn::new(question.trim(), answer.text.clone()));
        Ok(answer)
    }

    /// Summarize the current document, reusing the cached summary if present.
    ///
    /// A cached summary is returned without its usage-log warning, since no
    /// new generation was logged.
    pub async fn summarize(&mut self) -> Result<Answer> {
        if let Some(summary) = &self.summary {
            return Ok(Answer {
                usage_log_error: None,
                ..summary.clone()
            });
        }
        let document = self.document.as_deref().ok_or(DocketError::NoDocument)?;
        let answer = self.engine.summarize(document).await?;
        self.summary = Some(answer.clone());
        Ok(answer)
    }
}
