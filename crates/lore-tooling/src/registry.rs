//! Tool metadata stores and the active-tool registry.

use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use lore_core::Error as CoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, warn};

use crate::tool::{ExecutableRef, ToolError, ToolResult, ToolSpec};

/// Package requirements as stored: newline-separated text or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequirementList {
    /// One specifier per line
    Lines(String),
    /// One specifier per element
    List(Vec<String>),
}

impl Default for RequirementList {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl RequirementList {
    /// Specifiers in order, trimmed, without blanks or `#` comments.
    pub fn specifiers(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Self::Lines(text) => text.lines().collect(),
            Self::List(items) => items.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_owned)
            .collect()
    }
}

/// A tool record exactly as the metadata store holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRecord {
    /// Record identifier
    pub id: String,
    /// Tool name
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Input schema, as an object or as JSON text
    pub input_schema: Value,
    /// Inline source code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_code: Option<String>,
    /// Blob key of the source code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_key: Option<String>,
    /// Package requirements
    #[serde(default)]
    pub requirements: RequirementList,
    /// Free-form grouping label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Whether the tool is offered to the model
    #[serde(default)]
    pub is_active: bool,
}

impl ToolRecord {
    /// Validate the record and convert it into a [`ToolSpec`].
    ///
    /// # Errors
    /// Returns [`ToolError::InvalidInput`] for a blank name, a schema that is not
    /// a JSON object, or a record with neither inline code nor a code key.
    pub fn into_spec(self) -> ToolResult<ToolSpec> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(ToolError::InvalidInput(format!(
                "tool record {} has no name",
                self.id
            )));
        }

        let input_schema = match self.input_schema {
            Value::String(text) => serde_json::from_str::<Value>(&text)?,
            other => other,
        };
        if !input_schema.is_object() {
            return Err(ToolError::InvalidInput(format!(
                "input schema of {name} is not an object"
            )));
        }

        let inline = self.execution_code.filter(|code| !code.trim().is_empty());
        let stored = self.code_key.filter(|key| !key.trim().is_empty());
        let executable = match (inline, stored) {
            (Some(code), _) => ExecutableRef::Inline(code),
            (None, Some(key)) => ExecutableRef::Stored(key.trim().to_owned()),
            (None, None) => {
                return Err(ToolError::InvalidInput(format!("{name} has no code")));
            }
        };

        Ok(ToolSpec {
            id: self.id,
            name,
            description: self.description,
            input_schema,
            executable,
            requirements: self.requirements.specifiers(),
            is_active: self.is_active,
        })
    }
}

/// Record filter applied by [`ToolMetadataStore::scan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolFilter {
    /// Only records with `isActive == true`
    pub active_only: bool,
    /// Only records with this exact name
    pub name: Option<String>,
}

impl ToolFilter {
    /// Every active record.
    pub fn active() -> Self {
        Self {
            active_only: true,
            name: None,
        }
    }

    /// The active records named `name`.
    pub fn active_named(name: &str) -> Self {
        Self {
            active_only: true,
            name: Some(name.to_owned()),
        }
    }

    /// Whether `record` passes the filter.
    pub fn matches(&self, record: &ToolRecord) -> bool {
        (!self.active_only || record.is_active)
            && self
                .name
                .as_ref()
                .is_none_or(|name| record.name.trim() == name.as_str())
    }
}

/// Backing store for tool records.
#[async_trait]
pub trait ToolMetadataStore: Send + Sync {
    /// Every record passing `filter`.
    ///
    /// # Errors
    /// Returns an error if the store is unreachable
    async fn scan(&self, filter: &ToolFilter) -> ToolResult<Vec<ToolRecord>>;

    /// The record with identifier `id`.
    ///
    /// # Errors
    /// Returns a not-found error if no record has that id
    async fn get_by_id(&self, id: &str) -> ToolResult<ToolRecord>;
}

fn record_not_found(id: &str) -> ToolError {
    ToolError::Core(CoreError::NotFound { key: id.to_owned() })
}

/// Records held in memory.
#[derive(Debug, Default)]
pub struct InMemoryToolStore {
    records: RwLock<Vec<ToolRecord>>,
}

impl InMemoryToolStore {
    /// Create a store holding `records`.
    pub fn new(records: Vec<ToolRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Add a record, replacing any record with the same id.
    ///
    /// # Errors
    /// Returns an error if the lock is poisoned
    pub fn upsert(&self, record: ToolRecord) -> ToolResult<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| ToolError::ExecutionFailed("tool store lock poisoned".to_owned()))?;
        records.retain(|existing| existing.id != record.id);
        records.push(record);
        Ok(())
    }

    fn snapshot(&self) -> ToolResult<Vec<ToolRecord>> {
        self.records
            .read()
            .map(|records| records.clone())
            .map_err(|_| ToolError::ExecutionFailed("tool store lock poisoned".to_owned()))
    }
}

#[async_trait]
impl ToolMetadataStore for InMemoryToolStore {
    async fn scan(&self, filter: &ToolFilter) -> ToolResult<Vec<ToolRecord>> {
        Ok(self
            .snapshot()?
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect())
    }

    async fn get_by_id(&self, id: &str) -> ToolResult<ToolRecord> {
        self.snapshot()?
            .into_iter()
            .find(|record| record.id == id)
            .ok_or_else(|| record_not_found(id))
    }
}

/// Records read from a JSON array file on every scan.
///
/// Entries that do not deserialize as a [`ToolRecord`] are skipped.
#[derive(Debug, Clone)]
pub struct JsonFileToolStore {
    path: PathBuf,
}

impl JsonFileToolStore {
    /// Create a store over the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_records(&self) -> ToolResult<Vec<ToolRecord>> {
        let contents = fs::read_to_string(&self.path).await?;
        let entries: Vec<Value> = serde_json::from_str(&contents)?;
        Ok(entries
            .into_iter()
            .enumerate()
            .filter_map(
                |(position, entry)| match serde_json::from_value::<ToolRecord>(entry) {
                    Ok(record) => Some(record),
                    Err(error) => {
                        warn!(
                            path = %self.path.display(),
                            position,
                            %error,
                            "Skipping malformed tool record"
                        );
                        None
                    }
                },
            )
            .collect())
    }
}

#[async_trait]
impl ToolMetadataStore for JsonFileToolStore {
    async fn scan(&self, filter: &ToolFilter) -> ToolResult<Vec<ToolRecord>> {
        Ok(self
            .read_records()
            .await?
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect())
    }

    async fn get_by_id(&self, id: &str) -> ToolResult<ToolRecord> {
        self.read_records()
            .await?
            .into_iter()
            .find(|record| record.id == id)
            .ok_or_else(|| record_not_found(id))
    }
}

/// Resolves active tools from a metadata store.
///
/// Store failures never surface: listings fall back to the built-in tools,
/// which are empty unless set with [`Self::with_fallback`].
pub struct ToolRegistry<S: ToolMetadataStore> {
    store: S,
    fallback: Vec<ToolSpec>,
}

impl<S: ToolMetadataStore> ToolRegistry<S> {
    /// Create a registry over `store` with no built-in tools.
    pub fn new(store: S) -> Self {
        Self {
            store,
            fallback: Vec::new(),
        }
    }

    /// Set the tools offered when the store yields nothing usable.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Vec<ToolSpec>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Active tools, optionally restricted to the ids in `selected_ids`.
    pub async fn list_active(&self, selected_ids: Option<&[String]>) -> Vec<ToolSpec> {
        let records = match self.store.scan(&ToolFilter::active()).await {
            Ok(records) => records,
            Err(error) => {
                warn!(%error, "Tool store unavailable, using built-in tools");
                return self.fallback.clone();
            }
        };

        let specs: Vec<ToolSpec> = records
            .into_iter()
            .filter(|record| selected_ids.is_none_or(|ids| ids.contains(&record.id)))
            .filter_map(|record| {
                let id = record.id.clone();
                record
                    .into_spec()
                    .map_err(|error| warn!(tool_id = %id, %error, "Skipping malformed tool"))
                    .ok()
            })
            .collect();

        if specs.is_empty() {
            debug!("No usable tools in store, using built-in tools");
            return self.fallback.clone();
        }
        specs
    }

    /// Model-facing definitions of the active tools.
    pub async fn model_specs(&self, selected_ids: Option<&[String]>) -> Vec<Value> {
        self.list_active(selected_ids)
            .await
            .iter()
            .map(ToolSpec::model_spec)
            .collect()
    }

    /// The active tool named `name`, if any.
    pub async fn resolve(&self, name: &str) -> Option<ToolSpec> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        match self.store.scan(&ToolFilter::active_named(name)).await {
            Ok(records) => {
                if let Some(tool) = records
                    .into_iter()
                    .find_map(|record| record.into_spec().ok())
                {
                    return Some(tool);
                }
            }
            Err(error) => warn!(tool_name = name, %error, "Tool lookup failed"),
        }

        self.fallback
            .iter()
            .find(|tool| tool.is_active && tool.name == name)
            .cloned()
    }

    /// Where the active tool named `name` keeps its code.
    pub async fn get_executable_ref(&self, name: &str) -> Option<ExecutableRef> {
        self.resolve(name).await.map(|tool| tool.executable)
    }

    /// The tool with identifier `id`, active or not.
    ///
    /// # Errors
    /// Returns an error if the record is missing or malformed
    pub async fn get_by_id(&self, id: &str) -> ToolResult<ToolSpec> {
        self.store.get_by_id(id).await?.into_spec()
    }
}
