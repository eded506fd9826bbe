//! Core types shared by the retrieval engine and the tool sandbox.
//!
//! This crate provides the error taxonomy, the startup configuration and the
//! blob storage abstraction that both indexes and tool code are persisted in.
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::assertions_on_result_states,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        reason = "Allow for tests"
    )
)]

/// Startup configuration for every component.
pub mod config;
/// Timeout helpers for blocking operations.
pub mod deadline;
/// Error types and result definitions.
pub mod error;
/// Blob storage backends.
pub mod storage;

pub use config::{
    EmbeddingConfig, InstallerConfig, LoreConfig, RetrievalConfig, SandboxConfig, StorageConfig,
    ToolStoreConfig,
};
pub use deadline::with_deadline;
pub use error::{Error, Result};
pub use storage::{BlobStore, BoundedBlobStore, LocalBlobStore, MemoryBlobStore};
