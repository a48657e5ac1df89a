//! # allure-rag core
//!
//! Shared, I/O-free logic for allure-rag: the report model and decomposer,
//! the chunk `rag_text` template, retention planning, prompt building,
//! streamed-answer reassembly, report summaries, and the embedding and
//! vector store traits.
//!
//! This crate contains no tokio, filesystem or network code.

pub mod decompose;
pub mod embedding;
pub mod error;
pub mod models;
pub mod prompt;
pub mod retention;
pub mod store;
pub mod stream;
pub mod summary;

pub use error::{RagError, Result};
