//! # Knowledge pipeline
//!
//! Turns heterogeneous project sources into uniform, classified
//! knowledge items.
//!
//! Project records, form responses, applet interactions, uploaded
//! documents (PDF, DOCX, XLSX, CSV, JSON, text) and chat messages are each
//! read by a source adapter, classified by keyword heuristics into a fixed
//! category taxonomy with tags and an importance score, and written as a
//! new current generation of [`KnowledgeItem`](models::KnowledgeItem)s.
//! Re-extracting a source supersedes its previous items instead of
//! deleting them. An extraction queue with bounded retries lets callers
//! defer work.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Source       │──▶│  Adapters   │──▶│  Classifiers │
//! │ records      │   │ + Readers   │   │  + Summaries │
//! └──────────────┘   └─────────────┘   └──────┬───────┘
//!                                             ▼
//!                 ┌────────────────┐   ┌──────────────┐
//!                 │  Queue runner  │──▶│  Extractor   │──▶ Store
//!                 └────────────────┘   └──────────────┘   (supersede + insert)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kx init                                         # create database
//! kx extract form-response r_123 --project p_1    # extract now
//! kx enqueue file_document f_9 --project p_1      # or defer
//! kx process --project p_1                        # run one queue batch
//! kx items --project p_1                          # inspect results
//! kx serve                                        # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Source records, knowledge items, queue entries |
//! | [`readers`] | Document format readers |
//! | [`classify`] | Category, importance and tag heuristics |
//! | [`summary`] | Bounded-length summaries |
//! | [`adapters`] | Per-source item shaping, including the applet registry |
//! | [`extractor`] | Extraction orchestrator |
//! | [`queue`] | Extraction queue runner |
//! | [`store`] | Persistence trait with in-memory and SQLite backends |
//! | [`storage`] | Object storage access for uploaded documents |
//! | [`migrate`] | SQLite schema |
//! | [`server`] | HTTP API |
//! | [`error`] | Extraction error type |

pub mod adapters;
pub mod classify;
pub mod config;
pub mod error;
pub mod extractor;
pub mod migrate;
pub mod models;
pub mod queue;
pub mod readers;
pub mod server;
pub mod storage;
pub mod store;
pub mod summary;

pub use error::{ExtractorError, ExtractorResult};
pub use extractor::KnowledgeExtractor;
pub use queue::QueueRunReport;
