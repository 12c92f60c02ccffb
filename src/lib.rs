//! # planrag — Retrieval-Augmented Test-Plan Generator
//!
//! Indexes each project's product documents (PDF, DOCX, text, Markdown,
//! YAML) into a local vector index, then drafts structured test plans by
//! retrieving the most relevant passages and handing them to a local LLM.
//!
//! ## Architecture
//!
//! - **[`config`]** — JSON configuration, defaults, validation
//! - **[`loader`]** — Per-format document loading with isolated failures
//! - **[`chunker`]** — Deterministic fixed-overlap text splitting
//! - **[`embedder`]** — Embedding providers (Ollama, offline hashing)
//! - **[`db`]** — Per-project SQLite + sqlite-vec index with advisory locks
//! - **[`indexer`]** — Staged full rebuilds on a worker pool
//! - **[`retriever`]** — Top-k similarity retrieval
//! - **[`prompt`]** — Slot templating with a context budget
//! - **[`generator`]** — LLM call boundary and response validation
//! - **[`plan`]** — End-to-end generation and serial-numbered output
//! - **[`formatter`]** — Markdown export to XLSX, DOCX and PDF

pub mod chunker;
pub mod config;
pub mod db;
pub mod embedder;
pub mod formatter;
pub mod generator;
pub mod indexer;
pub mod loader;
pub mod plan;
pub mod prompt;
pub mod retriever;
