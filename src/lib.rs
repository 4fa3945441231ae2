//! # Coursebot
//!
//! A retrieval-augmented chatbot over course materials. Course documents are
//! parsed into lesson-aware chunks, indexed in SQLite (FTS5 keyword search,
//! plus cosine ranking over stored vectors when an embedding provider is
//! configured), and answered through a hosted generation model that can call
//! search and outline tools during a query.
//!
//! The `coursebot` binary wraps this library with an ingestion CLI and an
//! HTTP server; see [`server`] for the API surface.

pub mod config;
pub mod db;
pub mod document;
pub mod embedding;
pub mod extract;
pub mod generator;
pub mod migrate;
pub mod models;
pub mod rag;
pub mod server;
pub mod session;
pub mod store;
pub mod tools;
