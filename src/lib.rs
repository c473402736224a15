//! Folio - question answering over a single document
//!
//! One document is extracted, chunked, embedded and indexed in memory at
//! startup; each question is embedded, matched against the index and answered
//! by a generative model constrained to the retrieved context.

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extraction;
pub mod retrieval;
pub mod server;
pub mod service;
pub mod synthesis;

pub use error::{ErrorKind, FolioError, Result};
