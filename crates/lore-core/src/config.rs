//! Configuration for storage, embedding, retrieval, the tool store and the sandbox.
//!
//! A [`LoreConfig`] is built once at process start (file, then explicit
//! environment overrides, then [`LoreConfig::validate`]) and handed to every
//! component constructor. Nothing reads the environment per call.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Complete configuration.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoreConfig {
    /// Blob storage layout
    pub storage: StorageConfig,
    /// Embedding model settings
    pub embedding: EmbeddingConfig,
    /// Chunking, search and context budgets
    pub retrieval: RetrievalConfig,
    /// Tool metadata store location
    pub tools: ToolStoreConfig,
    /// Tool execution limits
    pub sandbox: SandboxConfig,
}

/// Blob storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the local blob store (required)
    pub root: PathBuf,
    /// Key prefix under which collection indexes live
    pub index_prefix: String,
    /// Key prefix under which tool packages live
    pub package_prefix: String,
    /// Budget in seconds for a single blob operation
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            index_prefix: "vector-indexes".to_owned(),
            package_prefix: "tool-packages".to_owned(),
            timeout_secs: 30,
        }
    }
}

impl StorageConfig {
    /// Budget for a single blob operation.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Embedding model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding model name
    pub model: String,
    /// Ollama host URL
    pub host: String,
    /// Ollama port
    pub port: u16,
    /// Length of every produced vector
    pub dimension: usize,
    /// Inputs longer than this many characters are truncated
    pub max_input_chars: usize,
    /// Budget in seconds for one model call
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_owned(),
            host: "http://localhost".to_owned(),
            port: 11434,
            dimension: 768,
            max_input_chars: 8000,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    /// Budget for one model call.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Chunking, search and context rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default number of results per search
    pub top_k: usize,
    /// Target chunk length in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    pub chunk_overlap: usize,
    /// Budget for the whole rendered context
    pub context_max_chars: usize,
    /// Budget for one document's content inside the context
    pub document_max_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            chunk_size: 1000,
            chunk_overlap: 200,
            context_max_chars: 4000,
            document_max_chars: 500,
        }
    }
}

/// Where tool records are read from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolStoreConfig {
    /// JSON file holding tool records; `None` means no tools are available
    pub specs_path: Option<PathBuf>,
}

/// How tool dependencies are installed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstallerConfig {
    /// Fetch package sources from the blob store
    #[default]
    Blob,
    /// Run an external installer; `{target}` and `{package}` are substituted in `args`
    Command {
        /// Program to run
        program: String,
        /// Argument template
        args: Vec<String>,
    },
}

/// Tool execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Budget in seconds for installing one package
    pub install_timeout_secs: u64,
    /// Wall-clock budget in seconds for running tool code
    pub execution_timeout_secs: u64,
    /// Memory limit reported to event handlers
    pub memory_limit_mb: u32,
    /// Function version reported to event handlers
    pub function_version: String,
    /// Maximum loop iterations the engine allows before aborting
    pub loop_iteration_limit: u64,
    /// Most array elements a tool's return value may carry
    pub max_result_elements: usize,
    /// Dependency installer
    pub installer: InstallerConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            install_timeout_secs: 30,
            execution_timeout_secs: 60,
            memory_limit_mb: 256,
            function_version: "1".to_owned(),
            loop_iteration_limit: 10_000_000,
            max_result_elements: 100_000,
            installer: InstallerConfig::default(),
        }
    }
}

impl SandboxConfig {
    /// Budget for installing one package.
    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    /// Budget for running tool code.
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }
}

impl LoreConfig {
    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|error| {
            Error::Config(format!("Failed to read config {}: {error}", path.display()))
        })?;
        let config: Self = toml::from_str(&contents)?;

        tracing::debug!(
            path = %path.display(),
            storage_root = %config.storage.root.display(),
            embedding_model = %config.embedding.model,
            "Loaded config"
        );

        Ok(config)
    }

    /// Load, override from the process environment, and validate.
    ///
    /// # Errors
    /// Returns an error if the file is unreadable or the result is invalid
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the `LORE_*` environment overrides.
    ///
    /// # Errors
    /// Returns an error if a numeric override cannot be parsed
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    ///
    /// # Errors
    /// Returns an error if a numeric override cannot be parsed
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup("LORE_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(prefix) = lookup("LORE_INDEX_PREFIX") {
            self.storage.index_prefix = prefix;
        }
        if let Some(model) = lookup("LORE_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(host) = lookup("LORE_EMBEDDING_HOST") {
            self.embedding.host = host;
        }
        if let Some(port) = lookup("LORE_EMBEDDING_PORT") {
            self.embedding.port = parse_override("LORE_EMBEDDING_PORT", &port)?;
        }
        if let Some(dimension) = lookup("LORE_EMBEDDING_DIMENSION") {
            self.embedding.dimension = parse_override("LORE_EMBEDDING_DIMENSION", &dimension)?;
        }
        if let Some(path) = lookup("LORE_TOOL_SPECS") {
            self.tools.specs_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Reject configurations that cannot work, before any component is built.
    ///
    /// # Errors
    /// Returns [`Error::Config`] naming the first offending setting
    pub fn validate(&self) -> Result<()> {
        if self.storage.root.as_os_str().is_empty() {
            return Err(Error::Config("storage.root must be set".to_owned()));
        }
        if self.storage.index_prefix.trim().is_empty() {
            return Err(Error::Config("storage.index_prefix must not be empty".to_owned()));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(Error::Config("embedding.model must be set".to_owned()));
        }
        if self.embedding.dimension == 0 {
            return Err(Error::Config("embedding.dimension must be positive".to_owned()));
        }
        if self.embedding.max_input_chars == 0 {
            return Err(Error::Config(
                "embedding.max_input_chars must be positive".to_owned(),
            ));
        }
        if self.retrieval.chunk_size == 0 {
            return Err(Error::Config("retrieval.chunk_size must be positive".to_owned()));
        }
        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            return Err(Error::Config(format!(
                "retrieval.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.retrieval.chunk_overlap, self.retrieval.chunk_size
            )));
        }
        if self.retrieval.context_max_chars == 0 || self.retrieval.document_max_chars == 0 {
            return Err(Error::Config("context budgets must be positive".to_owned()));
        }
        let timeouts = [
            ("storage.timeout_secs", self.storage.timeout_secs),
            ("embedding.timeout_secs", self.embedding.timeout_secs),
            ("sandbox.install_timeout_secs", self.sandbox.install_timeout_secs),
            ("sandbox.execution_timeout_secs", self.sandbox.execution_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(Error::Config(format!("{name} must be positive")));
        }
        if let InstallerConfig::Command { program, .. } = &self.sandbox.installer
            && program.trim().is_empty()
        {
            return Err(Error::Config(
                "sandbox.installer.program must be set".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Parse a numeric override, naming the variable on failure.
fn parse_override<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{name} has an invalid value: {raw}")))
}
