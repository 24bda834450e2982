//! # Buildlens - build database reports
//!
//! Buildlens reads the databases produced by a build-introspection pass
//! (packages, module descriptors, source files and their per-build
//! instances) and renders reports over them.
//!
//! Buildlens provides:
//! - A merge engine that folds N databases into one, keeping environments apart
//! - A typed view over the generic `junction` edge table
//! - A traversal builder for environment-scoped multi-hop queries
//! - A report plugin interface with an explicit registry and dispatcher

pub mod entity;
pub mod edge;
pub mod storage;
pub mod merge;
pub mod query;
pub mod report;
pub mod dispatch;
pub mod config;
pub mod logging;
pub mod ui;

use std::path::PathBuf;

// Re-exports for convenient access
pub use entity::{EnvId, Environment};
pub use edge::{Edge, EntityKey, TableTag};
pub use storage::ReportDb;
pub use merge::{merge_databases, MergeStrategy};
pub use query::{QueryEngine, Traversal};
pub use report::{Report, ReportRegistry};
pub use dispatch::{Dispatcher, DispatchOutcome, DispatchRequest};

/// Result type alias for Buildlens operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Buildlens operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No databases found matching: {patterns}")]
    NoDatabaseFound { patterns: String },

    #[error("Database does not exist: [{}]", .0.display())]
    DatabaseNotFound(PathBuf),

    #[error("No input databases were provided")]
    NoInput,

    #[error("Unknown report requested: {0}")]
    UnknownReport(String),

    #[error("Failed to merge {}: {context}", path.display())]
    Merge {
        path: PathBuf,
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Report error: {0}")]
    Report(String),
}

impl Error {
    /// Process exit status for this error class.
    ///
    /// 2 is left to clap, which uses it for command-line usage errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NoDatabaseFound { .. } | Error::NoInput => 6,
            Error::DatabaseNotFound(_) => 3,
            Error::UnknownReport(_) => 4,
            Error::Merge { .. } => 5,
            _ => 1,
        }
    }
}
