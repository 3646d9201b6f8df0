//! Grounded question answering and summarization.
//!
//! The [`AnsweringEngine`] ties retrieval, context assembly, prompt
//! rendering and generation together. The instruction to answer only from
//! the supplied context lives in the prompt; nothing here can verify that
//! the model obeyed it.
//!
//! Every completed generation appends one row to the usage log when one is
//! configured. A failed append is logged and reported on the returned
//! [`Answer`], never as an error.

use std::sync::Arc;

use tracing::{info, warn};

use crate::context::assemble_within;
use crate::conversation::{format_history, Turn};
use crate::error::{DocketError, Result};
use crate::llm::Generator;
use crate::models::{RetrievedChunk, TokenUsage};
use crate::retrieve::Retriever;
use crate::usage::UsageLog;

/// Render the grounded Q&A prompt.
pub fn build_qa_prompt(question: &str, context: &str, history: &str) -> String {
    format!(
        "Use the pieces of information provided in the context and previous conversation history to answer the user's question.\n\
         If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\
         Don't provide anything out of the given context.\n\
         \n\
         Previous Conversation:\n\
         {history}\n\
         \n\
         Question: {question}\n\
         Context: {context}\n\
         Answer:"
    )
}

/// Render the summarization prompt.
pub fn build_summary_prompt(context: &str) -> String {
    format!(
        "Summarize the given legal document concisely while preserving key details.\n\
         Provide a structured summary that highlights the most important points.\n\
         \n\
         Document:\n\
         {context}\n\
         \n\
         Summary:"
    )
}

/// Result of one answering or summarization call.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub usage: Option<TokenUsage>,
    /// Chunks the context was assembled from, best match first.
    pub sources: Vec<RetrievedChunk>,
    /// Set when the answer succeeded but the usage row could not be written.
    pub usage_log_error: Option<String>,
}

pub struct AnsweringEngine {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    usage_log: Option<UsageLog>,
    max_context_chars: usize,
    summary_query: String,
}

impl AnsweringEngine {
    pub fn new(retriever: Retriever, generator: Arc<dyn Generator>) -> Self {
        Self {
            retriever,
            generator,
            usage_log: None,
            max_context_chars: 0,
            summary_query: "Summarize this document".to_string(),
        }
    }

    pub fn with_usage_log(mut self, usage_log: UsageLog) -> Self {
        self.usage_log = Some(usage_log);
        self
    }

    /// Cap the assembled context at `max_chars` characters (`0` = no cap).
    pub fn with_max_context_chars(mut self, max_chars: usize) -> Self {
        self.max_context_chars = max_chars;
        self
    }

    pub fn with_summary_query(mut self, query: impl Into<String>) -> Self {
        self.summary_query = query.into();
        self
    }

    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    /// Answer `question` about `document`, taking prior `history` into account.
    pub async fn ask(&self, question: &str, document: &str, history: &[Turn]) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DocketError::EmptyQuestion);
        }

        let sources = self.retriever.retrieve(question, document).await?;
        let context = assemble_within(&sources, self.max_context_chars);
        let prompt = build_qa_prompt(question, &context, &format_history(history));

        info!(
            document,
            chunks = sources.len(),
            context_chars = context.len(),
            history_turns = history.len(),
            "answering question"
        );
        self.complete(&prompt, sources).await
    }

    /// Summarize `document` from the passages nearest the summary query.
    pub async fn summarize(&self, document: &str) -> Result<Answer> {
        let sources = self.retriever.retrieve(&self.summary_query, document).await?;
        let context = assemble_within(&sources, self.max_context_chars);
        let prompt = build_summary_prompt(&context);

        info!(document, chunks = sources.len(), "summarizing document");
        self.complete(&prompt, sources).await
    }

    async fn complete(&self, prompt: &str, sources: Vec<RetrievedChunk>) -> Result<Answer> {
        let generation = self.generator.generate(prompt).await?;
        let usage = generation.usage;
        let usage_log_error = self.log_usage(usage.unwrap_or_default()).await;

        Ok(Answer {
            text: generation.content,
            usage,
            sources,
            usage_log_error,
        })
    }

    async fn log_usage(&self, usage: TokenUsage) -> Option<String> {
        let log = self.usage_log.as_ref()?;
        match log.append(self.generator.model_name(), &usage).await {
            Ok(_) => None,
            Err(e) => {
                warn!(path = %log.path().display(), error = %e, "failed to write usage log");
                Some(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::models::{Chunk, Generation, IndexRecord};
    use crate::store::{IndexStore, InMemoryStore};
    use crate::usage::Pricing;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct ConstEmbedder;

    #[async_trait]
    impl Embedder for ConstEmbedder {
        fn provider(&self) -> &str {
            "test"
        }
        fn model_name(&self) -> &str {
            "const"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Records prompts and answers with a fixed reply.
    struct EchoGenerator {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Generator for EchoGenerator {
        fn provider(&self) -> &str {
            "echo"
        }
        fn model_name(&self) -> &str {
            "echo-1"
        }
        async fn generate(&self, prompt: &str) -> Result<Generation> {
            if self.fail {
                return Err(DocketError::Generation {
                    provider: "echo".into(),
                    message: "connection refused".into(),
                });
            }
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(Generation {
                content: "The rent is $1,000.".into(),
                usage: Some(TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                }),
            })
        }
    }

    async fn engine(fail: bool) -> (AnsweringEngine, Arc<EchoGenerator>) {
        let store = Arc::new(InMemoryStore::new());
        let h = store.open_or_create("lease", "lease.pdf", "const", 2).await.unwrap();
        store
            .add(
                &h,
                &[IndexRecord {
                    chunk: Chunk {
                        id: "lease.pdf_0".into(),
                        source: "lease.pdf".into(),
                        position: 0,
                        page: 1,
                        text: "Monthly rent is $1,000.".into(),
                        hash: String::new(),
                    },
                    embedding: vec![1.0, 0.0],
                }],
            )
            .await
            .unwrap();
        let generator = Arc::new(EchoGenerator {
            prompts: Mutex::new(Vec::new()),
            fail,
        });
        let retriever = Retriever::new(Arc::new(ConstEmbedder), store, 5);
        (AnsweringEngine::new(retriever, generator.clone()), generator)
    }

    #[test]
    fn test_qa_prompt_layout() {
        let prompt = build_qa_prompt("What is the rent?", "Rent is $1,000.", "User: hi\nAI: hello\n");
        assert!(prompt.starts_with("Use the pieces of information"));
        assert!(prompt.contains("If you don't know the answer, just say that you don't know"));
        assert!(prompt.contains("Previous Conversation:\nUser: hi\nAI: hello\n"));
        assert!(prompt.contains("Question: What is the rent?\nContext: Rent is $1,000.\nAnswer:"));
    }

    #[test]
    fn test_summary_prompt_layout() {
        let prompt = build_summary_prompt("Clause 1.");
        assert!(prompt.starts_with("Summarize the given legal document"));
        assert!(prompt.contains("Document:\nClause 1.\n\nSummary:"));
    }

    #[tokio::test]
    async fn test_ask_includes_context_and_history() {
        let (engine, generator) = engine(false).await;
        let history = vec![Turn::new("Who is the tenant?", "Jane Doe.")];
        let answer = engine.ask("What is the rent?", "lease.pdf", &history).await.unwrap();

        assert_eq!(answer.text, "The rent is $1,000.");
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.usage.map(|u| u.total()), Some(15));

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("Context: Monthly rent is $1,000."));
        assert!(prompts[0].contains("User: Who is the tenant?\nAI: Jane Doe.\n"));
    }

    #[tokio::test]
    async fn test_blank_question_rejected() {
        let (engine, generator) = engine(false).await;
        let err = engine.ask("   ", "lease.pdf", &[]).await.unwrap_err();
        assert!(matches!(err, DocketError::EmptyQuestion));
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let (engine, _) = engine(true).await;
        let err = engine.ask("What is the rent?", "lease.pdf", &[]).await.unwrap_err();
        assert!(matches!(err, DocketError::Generation { .. }));
    }

    #[tokio::test]
    async fn test_usage_log_failure_is_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let (engine, _) = engine(false).await;
        let engine = engine.with_usage_log(UsageLog::new(
            tmp.path(),
            Pricing {
                input_per_million: 1.0,
                output_per_million: 1.0,
            },
        ));
        let answer = engine.summarize("lease.pdf").await.unwrap();
        assert_eq!(answer.text, "The rent is $1,000.");
        assert!(answer.usage_log_error.is_some());
    }

    #[tokio::test]
    async fn test_context_budget_applied() {
        let (engine, generator) = engine(false).await;
        let engine = engine.with_max_context_chars(7);
        engine.ask("rent?", "lease.pdf", &[]).await.unwrap();
        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("Context: Monthly\nAnswer:"));
    }
}
