//! # Docket
//!
//! Grounded question answering over PDF documents.
//!
//! Each uploaded PDF is split into overlapping chunks, embedded, and kept in
//! its own collection inside a local vector index. Questions are answered by
//! retrieving the chunks nearest the question from that one document,
//! assembling them into a context, and asking a language model to answer
//! from that context (and the conversation so far) only.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────┐
//! │ PDF file │──▶│ Extract+Chunk│──▶│  Embedder  │
//! └──────────┘   └──────────────┘   └─────┬──────┘
//!                                         ▼
//!                                   ┌────────────┐
//!                                   │ IndexStore │  one collection per document
//!                                   └─────┬──────┘
//!                                         ▼
//! ┌──────────┐   ┌──────────────┐   ┌────────────┐
//! │ Question │──▶│  Retriever   │──▶│  Context   │──▶ Generator ──▶ Answer
//! └──────────┘   └──────────────┘   └────────────┘        │
//!                                                         ▼
//!                                                    usage.csv
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docket index ./contracts/lease.pdf
//! docket ask lease.pdf "When is rent due?"
//! docket summarize lease.pdf
//! docket chat ./contracts/lease.pdf
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`collection`] | File name → collection id |
//! | [`chunk`] | Recursive character splitting |
//! | [`extract`] | PDF page text extraction |
//! | [`embedding`] | Embedding providers and vector helpers |
//! | [`store`] | Collection storage (SQLite, in-memory) |
//! | [`ingest`] | Indexing pipeline |
//! | [`retrieve`] | Nearest-chunk retrieval |
//! | [`context`] | Context assembly |
//! | [`conversation`] | Chat turns and history |
//! | [`llm`] | Language-model clients |
//! | [`answer`] | Grounded Q&A and summarization |
//! | [`usage`] | Token usage log |
//! | [`session`] | Chat session state |
//! | [`config`] | TOML configuration |

pub mod answer;
pub mod chunk;
pub mod collection;
pub mod config;
pub mod context;
pub mod conversation;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod retrieve;
pub mod session;
pub mod store;
pub mod usage;

pub use error::{DocketError, Result};
