//! # ragstack
//!
//! Multi-tenant RAG document ingestion and semantic search service.
//!
//! ragstack turns uploaded documents (PDF, plain text, markdown, CSV) into
//! searchable, embedded text chunks and answers similarity queries against
//! them, scoped to a tenant's projects.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────────────┐   ┌──────────┐
//! │  Upload  │──▶│      Ingestion Pipeline        │──▶│  SQLite   │
//! │  (HTTP)  │   │ extract → chunk → embed → store│   │ + blobs   │
//! └──────────┘   └───────────────────────────────┘   └────┬─────┘
//!                                                         │
//! ┌──────────┐   ┌───────────────────────────────┐        │
//! │  Query   │──▶│    Similarity Search Service   │◀───────┘
//! │  (HTTP)  │   │ embed query → match → rank     │
//! └──────────┘   └───────────────────────────────┘
//! ```
//!
//! Uploads return as soon as the document row exists and the raw bytes are
//! stored; extraction, chunking, and embedding continue in a detached task
//! that records its outcome on the document's status.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`chunk`] | Paragraph-boundary text chunking with overlap |
//! | [`extract`] | PDF / plain-text extraction |
//! | [`embedding`] | Embedding API client and vector utilities |
//! | [`blob`] | Object storage for uploaded bytes |
//! | [`store`] | Datastore abstraction (SQLite + in-memory) |
//! | [`ingest`] | Ingestion pipeline orchestration |
//! | [`search`] | Similarity search service |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod blob;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod search;
pub mod server;
pub mod store;
