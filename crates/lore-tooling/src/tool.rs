use std::fmt;
use std::io::Error as IoError;

use serde::{Deserialize, Serialize};
use serde_json::{Error as SerdeJsonError, Map, Value, json};
use thiserror::Error;

/// Errors raised while resolving, installing or running a tool.
///
/// These never escape [`crate::ToolSandbox::invoke`]; they are folded into a
/// failure [`Envelope`].
#[derive(Debug, Error)]
pub enum ToolError {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// The provided input or record was invalid or malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The tool failed to execute.
    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    /// Failed to serialize or deserialize data.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerdeJsonError),

    /// A package could not be installed.
    #[error("Dependency install failed: {0}")]
    DependencyInstall(String),

    /// A storage or configuration error from the core crate.
    #[error(transparent)]
    Core(#[from] lore_core::Error),
}

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Where a tool's source code lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutableRef {
    /// Source stored directly in the record
    Inline(String),
    /// Blob key of the source
    Stored(String),
}

/// A resolved, validated tool definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Record identifier
    pub id: String,
    /// Name the model calls the tool by
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON schema of the input object
    pub input_schema: Value,
    /// Where the code lives
    pub executable: ExecutableRef,
    /// Package specifiers, in install order
    pub requirements: Vec<String>,
    /// Whether the tool is offered to the model
    pub is_active: bool,
}

impl ToolSpec {
    /// The tool definition in the shape the model's tool configuration expects.
    pub fn model_spec(&self) -> Value {
        json!({
            "toolSpec": {
                "name": self.name,
                "description": self.description,
                "inputSchema": { "json": self.input_schema },
            }
        })
    }
}

/// Why an invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// No active tool has the requested name
    ToolNotFound,
    /// A package failed to install or timed out
    DependencyInstallFailed,
    /// The tool's code could not be loaded
    CodeUnavailable,
    /// The code threw, timed out or could not be evaluated
    ExecutionError,
    /// A handler returned something other than an object
    InvalidReturnShape,
    /// The tool itself reported failure
    ToolReported,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ToolNotFound => "ToolNotFound",
            Self::DependencyInstallFailed => "DependencyInstallFailed",
            Self::CodeUnavailable => "CodeUnavailable",
            Self::ExecutionError => "ExecutionError",
            Self::InvalidReturnShape => "InvalidReturnShape",
            Self::ToolReported => "ToolReported",
        };
        formatter.write_str(name)
    }
}

/// Canonical result of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Whether the tool succeeded
    pub success: bool,
    /// Result payload on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Failure classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

impl Envelope {
    /// A successful envelope carrying `result`.
    pub fn success(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            kind: None,
        }
    }

    /// A failed envelope carrying `error`.
    pub fn failure(kind: FailureKind, error: impl Into<Value>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            kind: Some(kind),
        }
    }

    /// Error payload as display text.
    pub fn error_text(&self) -> Option<String> {
        self.error.as_ref().map(|error| match error {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
    }

    /// The envelope as JSON.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("success".to_owned(), Value::Bool(self.success));
        if let Some(result) = &self.result {
            object.insert("result".to_owned(), result.clone());
        }
        if let Some(error) = &self.error {
            object.insert("error".to_owned(), error.clone());
        }
        if let Some(kind) = self.kind {
            object.insert("kind".to_owned(), Value::String(kind.to_string()));
        }
        Value::Object(object)
    }
}
