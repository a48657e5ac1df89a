//! # allure-rag
//!
//! Retrieval-augmented analysis of Allure test reports.
//!
//! Reports are decomposed into one text chunk per test case, saved as chunk
//! files, embedded, and indexed in Qdrant. Each team keeps only its three
//! most recent reports in both tiers. An analysis retrieves every retained
//! chunk of a team and asks a generative model (Ollama) for feedback on the
//! current report and the trend across the previous ones.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌─────────────┐   ┌──────────┐
//! │  Allure  │──▶│ Decompose  │──▶│ Chunk files │   │  Qdrant  │
//! │   API    │   │  (core)    │──▶│ Embed+Index │──▶│ 3/team   │
//! └──────────┘   └────────────┘   └─────────────┘   └────┬─────┘
//!                                                        │
//!                      ┌─────────────────────────────────┤
//!                      ▼                                 ▼
//!                 ┌──────────┐   ┌────────┐        ┌──────────┐
//!                 │  Query   │──▶│ Ollama │        │   CLI    │
//!                 │  engine  │   │ stream │        │  (arag)  │
//!                 └────┬─────┘   └────────┘        └──────────┘
//!                      ▼
//!                 ┌──────────┐
//!                 │   Sink   │
//!                 └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | Tracing subscriber setup |
//! | [`embedding`] | Local and Ollama embedding backends |
//! | [`qdrant`] | Qdrant vector store |
//! | [`cache`] | Lazily created model and store client |
//! | [`chunk_files`] | File tier of the retention store |
//! | [`indexer`] | Vector tier: collection setup, eviction, upsert |
//! | [`generation`] | Streaming completion model |
//! | [`rag`] | Retrieval-augmented query engine |
//! | [`allure`] | Allure report API client |
//! | [`sink`] | Delivery of finished analyses |
//! | [`pipeline`] | Ingest, analyse, deliver |
//! | [`server`] | HTTP API |

pub mod allure;
pub mod cache;
pub mod chunk_files;
pub mod config;
pub mod embedding;
pub mod generation;
pub mod indexer;
pub mod logging;
pub mod pipeline;
pub mod qdrant;
pub mod rag;
pub mod server;
pub mod sink;
