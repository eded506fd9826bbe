//! Sandboxed tool execution on the Boa JavaScript engine.
//!
//! Every invocation walks the same pipeline: resolve the tool, install its
//! packages into a private directory, load its code, run it in a fresh
//! engine context and normalize whatever it returned into an [`Envelope`].
//! Failures at any stage become a failure envelope; nothing is raised to
//! the caller.

mod conversion;
mod envelope;
mod packages;
mod prelude;
mod promise;
mod units;

pub use envelope::RawReturn;
pub use packages::{
    BlobPackageInstaller, CommandPackageInstaller, PackageInstaller, Requirement,
    installer_from_config,
};
pub use units::Convention;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use boa_engine::{Context, Source};
use lore_core::{BlobStore, LoreConfig, SandboxConfig};
use serde_json::Value;
use tokio::task::spawn_blocking;
use tokio::time;

use crate::registry::{ToolMetadataStore, ToolRegistry};
use crate::tool::{Envelope, ExecutableRef, FailureKind, ToolError, ToolResult};
use envelope::normalize;
use packages::PackageDir;
use promise::{describe_js_error, drain_jobs};
use units::{Invocation, dispatch};

/// Source reported to handlers for a registered tool call.
const SOURCE_TOOL_CALL: &str = "tool-call";
/// Source reported to handlers when testing unsaved code.
const SOURCE_TEST_TOOL: &str = "test-tool";

/// Runs registered tools, and unsaved tool code, in isolated engine contexts.
pub struct ToolSandbox<S: ToolMetadataStore> {
    registry: Arc<ToolRegistry<S>>,
    code_store: Arc<dyn BlobStore>,
    installer: Arc<dyn PackageInstaller>,
    config: SandboxConfig,
}

impl<S: ToolMetadataStore> ToolSandbox<S> {
    /// Create a sandbox.
    ///
    /// `code_store` serves tools whose code lives under a blob key; wrap it in a
    /// [`lore_core::BoundedBlobStore`] to bound those reads.
    pub fn new(
        registry: Arc<ToolRegistry<S>>,
        code_store: Arc<dyn BlobStore>,
        installer: Arc<dyn PackageInstaller>,
        config: SandboxConfig,
    ) -> Self {
        Self {
            registry,
            code_store,
            installer,
            config,
        }
    }

    /// Create a sandbox whose installer is chosen by `config`.
    pub fn from_config(
        registry: Arc<ToolRegistry<S>>,
        blobs: Arc<dyn BlobStore>,
        config: &LoreConfig,
    ) -> Self {
        let installer = installer_from_config(
            &config.sandbox,
            Arc::clone(&blobs),
            &config.storage.package_prefix,
        );
        Self::new(registry, blobs, installer, config.sandbox.clone())
    }

    /// Registry tools are resolved from.
    pub fn registry(&self) -> &ToolRegistry<S> {
        &self.registry
    }

    /// Run the active tool named `tool_name` with `input`.
    pub async fn invoke(&self, tool_name: &str, input: &Value) -> Envelope {
        let Some(tool) = self.registry.resolve(tool_name).await else {
            tracing::warn!(tool_name, "Tool not found");
            return Envelope::failure(
                FailureKind::ToolNotFound,
                format!("Tool not found: {tool_name}"),
            );
        };
        self.run(
            &tool.name,
            &tool.executable,
            &tool.requirements,
            input,
            SOURCE_TOOL_CALL,
        )
        .await
    }

    /// Run unsaved `code` through the same pipeline as a registered tool.
    pub async fn test_code(
        &self,
        tool_name: &str,
        code: &str,
        requirements: &[String],
        input: &Value,
    ) -> Envelope {
        let executable = ExecutableRef::Inline(code.to_owned());
        self.run(tool_name, &executable, requirements, input, SOURCE_TEST_TOOL)
            .await
    }

    async fn run(
        &self,
        tool_name: &str,
        executable: &ExecutableRef,
        requirements: &[String],
        input: &Value,
        source: &'static str,
    ) -> Envelope {
        let started = Instant::now();
        tracing::info!(tool_name, source, "Invoking tool");

        let packages = match PackageDir::install(
            self.installer.as_ref(),
            requirements,
            self.config.install_timeout(),
        )
        .await
        {
            Ok(packages) => packages,
            Err(error) => {
                tracing::warn!(tool_name, %error, "Dependency install failed");
                return Envelope::failure(FailureKind::DependencyInstallFailed, failure_text(error));
            }
        };
        let modules = match packages.modules().await {
            Ok(modules) => modules,
            Err(error) => {
                return Envelope::failure(FailureKind::DependencyInstallFailed, failure_text(error));
            }
        };

        let code = match self.load_code(executable).await {
            Ok(code) => code,
            Err(error) => {
                tracing::warn!(tool_name, %error, "Tool code unavailable");
                return Envelope::failure(FailureKind::CodeUnavailable, failure_text(error));
            }
        };

        let job = ExecutionJob {
            tool_name: tool_name.to_owned(),
            source,
            code,
            input: input.clone(),
            modules,
            function_version: self.config.function_version.clone(),
            memory_limit_mb: self.config.memory_limit_mb,
            loop_iteration_limit: self.config.loop_iteration_limit,
            max_result_elements: self.config.max_result_elements,
            deadline: started + self.config.execution_timeout(),
        };
        let envelope = self.execute(job).await.map_or_else(
            |error| {
                tracing::warn!(tool_name, %error, "Tool execution failed");
                Envelope::failure(FailureKind::ExecutionError, failure_text(error))
            },
            |(convention, value)| normalize(value, convention),
        );

        // The package directory lives until the tool has finished running.
        drop(packages);
        tracing::info!(
            tool_name,
            success = envelope.success,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tool finished"
        );
        envelope
    }

    async fn load_code(&self, executable: &ExecutableRef) -> ToolResult<String> {
        match executable {
            ExecutableRef::Inline(code) => Ok(code.clone()),
            ExecutableRef::Stored(key) => {
                let bytes = self.code_store.get(key).await?;
                String::from_utf8(bytes).map_err(|err| {
                    ToolError::InvalidInput(format!("code under {key} is not UTF-8: {err}"))
                })
            }
        }
    }

    async fn execute(&self, job: ExecutionJob) -> ToolResult<(Convention, Value)> {
        let timeout = self.config.execution_timeout();
        time::timeout(timeout, async move {
            // Boa contexts are !Send, so each run gets its own blocking thread
            spawn_blocking(move || execute_sync(&job))
                .await
                .map_err(|err| ToolError::ExecutionFailed(format!("Task join failed: {err}")))?
        })
        .await
        .map_err(|_elapsed| {
            ToolError::ExecutionFailed(format!(
                "Execution timed out after {} seconds",
                timeout.as_secs()
            ))
        })?
    }
}

/// Everything needed to run a tool on a blocking thread.
struct ExecutionJob {
    tool_name: String,
    source: &'static str,
    code: String,
    input: Value,
    modules: BTreeMap<String, String>,
    function_version: String,
    memory_limit_mb: u32,
    loop_iteration_limit: u64,
    max_result_elements: usize,
    deadline: Instant,
}

/// Evaluate the tool's code in a fresh context and dispatch to its entry point.
///
/// # Errors
/// Returns error if evaluation, the entry point or result conversion fails
fn execute_sync(job: &ExecutionJob) -> ToolResult<(Convention, Value)> {
    let mut context = Context::default();
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(job.loop_iteration_limit);

    prelude::install(&mut context, &job.modules)?;
    prelude::inject_input(&mut context, &job.input)?;

    context
        .eval(Source::from_bytes(&job.code))
        .map_err(|err| {
            let message = describe_js_error(&err, &mut context);
            ToolError::ExecutionFailed(format!("JavaScript error: {message}"))
        })?;
    drain_jobs(&mut context)?;

    let call = Invocation {
        tool_name: &job.tool_name,
        source: job.source,
        code: &job.code,
        input: &job.input,
        function_version: &job.function_version,
        memory_limit_mb: job.memory_limit_mb,
        deadline: job.deadline,
        max_result_elements: job.max_result_elements,
    };
    dispatch(&mut context, &call)
}

/// Text of an error as it appears in a failure envelope.
fn failure_text(error: ToolError) -> String {
    match error {
        ToolError::ExecutionFailed(message) | ToolError::DependencyInstall(message) => message,
        other => other.to_string(),
    }
}
