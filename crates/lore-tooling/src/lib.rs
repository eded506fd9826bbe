//! Dynamic tool resolution and sandboxed execution.
//!
//! This crate provides:
//! - `ToolSpec` records resolved through a `ToolRegistry` over a metadata store
//! - `ToolSandbox`, which installs a tool's packages, loads its JavaScript and
//!   runs it in a fresh Boa context under one of three calling conventions
//! - `Envelope`, the canonical success/failure shape every invocation returns
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::assertions_on_result_states,
        clippy::shadow_unrelated,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        reason = "Allow for tests"
    )
)]

/// Tool metadata stores and the active-tool registry.
mod registry;
/// JavaScript sandbox and dependency installation.
mod runtime;
/// Core abstractions shared by the registry and the sandbox.
mod tool;

pub use registry::{
    InMemoryToolStore, JsonFileToolStore, RequirementList, ToolFilter, ToolMetadataStore,
    ToolRecord, ToolRegistry,
};
pub use runtime::{
    BlobPackageInstaller, CommandPackageInstaller, Convention, PackageInstaller, RawReturn,
    Requirement, ToolSandbox, installer_from_config,
};
pub use tool::{Envelope, ExecutableRef, FailureKind, ToolError, ToolResult, ToolSpec};
