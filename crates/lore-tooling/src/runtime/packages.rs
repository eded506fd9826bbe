//! Per-invocation package installation.

use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lore_core::{BlobStore, InstallerConfig, SandboxConfig, with_deadline};
use tempfile::{Builder, TempDir};
use tokio::fs;
use tokio::process::Command;

use crate::{ToolError, ToolResult};

/// A parsed package specifier: `name`, `name@version` or `name==version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Package name, possibly scoped (`@scope/name`)
    pub name: String,
    /// Pinned version, if any
    pub version: Option<String>,
}

impl FromStr for Requirement {
    type Err = ToolError;

    fn from_str(specifier: &str) -> Result<Self, Self::Err> {
        let specifier = specifier.trim();
        let (name, version) = specifier.split_once("==").map_or_else(
            || match specifier.rfind('@') {
                Some(at) if at > 0 => (&specifier[..at], Some(&specifier[at + 1..])),
                _ => (specifier, None),
            },
            |(package, pinned)| (package.trim(), Some(pinned.trim())),
        );

        let valid_name = !name.is_empty()
            && name.split('/').all(|segment| {
                !segment.is_empty()
                    && segment != "."
                    && segment != ".."
                    && segment
                        .chars()
                        .all(|ch| ch.is_ascii_alphanumeric() || "-_.@".contains(ch))
            });
        let valid_version = version.is_none_or(|pinned| {
            !pinned.is_empty()
                && pinned
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || "-_.+^~*<>=".contains(ch))
        });
        if !valid_name || !valid_version {
            return Err(ToolError::InvalidInput(format!(
                "invalid package specifier: {specifier:?}"
            )));
        }

        Ok(Self {
            name: name.to_owned(),
            version: version.map(str::to_owned),
        })
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.name)?;
        if let Some(version) = &self.version {
            write!(formatter, "@{version}")?;
        }
        Ok(())
    }
}

/// Installs one package into an invocation's package directory.
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Install `requirement` below `target`.
    ///
    /// # Errors
    /// Returns an error if the package cannot be fetched or installed
    async fn install(&self, requirement: &Requirement, target: &Path) -> ToolResult<()>;
}

/// Fetches single-file `module.exports` packages from blob storage.
///
/// `name@version` is read from `{prefix}/{name}/{version}.js`, an unpinned
/// `name` from `{prefix}/{name}/latest.js`.
pub struct BlobPackageInstaller {
    blobs: Arc<dyn BlobStore>,
    prefix: String,
}

impl BlobPackageInstaller {
    /// Create an installer reading below `prefix` in `blobs`.
    pub fn new(blobs: Arc<dyn BlobStore>, prefix: &str) -> Self {
        Self {
            blobs,
            prefix: prefix.trim_end_matches('/').to_owned(),
        }
    }

    /// Blob key holding `requirement`.
    pub fn package_key(&self, requirement: &Requirement) -> String {
        format!(
            "{}/{}/{}.js",
            self.prefix,
            requirement.name,
            requirement.version.as_deref().unwrap_or("latest")
        )
    }
}

#[async_trait]
impl PackageInstaller for BlobPackageInstaller {
    async fn install(&self, requirement: &Requirement, target: &Path) -> ToolResult<()> {
        let key = self.package_key(requirement);
        let source = self.blobs.get(&key).await?;
        let path = target.join(format!("{}.js", requirement.name));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, source).await?;
        tracing::debug!(package = %requirement, key, "Installed package from blob store");
        Ok(())
    }
}

/// Runs an external installer such as `npm install --prefix {target} {package}`.
pub struct CommandPackageInstaller {
    program: String,
    args: Vec<String>,
}

impl CommandPackageInstaller {
    /// Create an installer running `program` with the `args` template.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn expand_args(&self, requirement: &Requirement, target: &Path) -> Vec<String> {
        let target = target.display().to_string();
        let package = requirement.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace("{target}", &target).replace("{package}", &package))
            .collect()
    }
}

#[async_trait]
impl PackageInstaller for CommandPackageInstaller {
    async fn install(&self, requirement: &Requirement, target: &Path) -> ToolResult<()> {
        let args = self.expand_args(requirement, target);
        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(target)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| {
                ToolError::DependencyInstall(format!("failed to run {}: {err}", self.program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ToolError::DependencyInstall(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        tracing::debug!(package = %requirement, program = %self.program, "Installed package");
        Ok(())
    }
}

/// Build the installer selected by `config`.
pub fn installer_from_config(
    config: &SandboxConfig,
    blobs: Arc<dyn BlobStore>,
    package_prefix: &str,
) -> Arc<dyn PackageInstaller> {
    match &config.installer {
        InstallerConfig::Blob => Arc::new(BlobPackageInstaller::new(blobs, package_prefix)),
        InstallerConfig::Command { program, args } => {
            Arc::new(CommandPackageInstaller::new(program.clone(), args.clone()))
        }
    }
}

/// Packages installed for one invocation. The directory is removed on drop.
pub struct PackageDir {
    dir: TempDir,
}

impl PackageDir {
    /// Install every specifier into a fresh directory, one at a time, each
    /// within `budget`.
    ///
    /// # Errors
    /// Returns [`ToolError::DependencyInstall`] for the first package that
    /// fails to parse, install or finish in time
    pub async fn install(
        installer: &dyn PackageInstaller,
        specifiers: &[String],
        budget: Duration,
    ) -> ToolResult<Self> {
        let dir = Builder::new()
            .prefix("lore-packages-")
            .tempdir()?;

        for specifier in specifiers {
            let specifier = specifier.trim();
            if specifier.is_empty() {
                continue;
            }
            let requirement: Requirement = specifier.parse()?;
            let operation = format!("install {requirement}");
            with_deadline(
                &operation,
                budget,
                installer.install(&requirement, dir.path()),
            )
            .await
            .map_err(|err| match err {
                ToolError::DependencyInstall(_) => err,
                other => ToolError::DependencyInstall(format!("{requirement}: {other}")),
            })?;
        }

        Ok(Self { dir })
    }

    /// Directory the packages were installed into.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Module sources keyed by the id `require` resolves them under.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read
    pub async fn modules(&self) -> ToolResult<BTreeMap<String, String>> {
        scan_modules(self.path()).await
    }
}

/// Collect every `.js` file below `root`, keyed by module id.
///
/// `name.js` is keyed `name`, `name/index.js` is keyed `name` unless
/// `name.js` exists, and a leading `node_modules/` is dropped.
///
/// # Errors
/// Returns an error if a directory or file cannot be read
pub async fn scan_modules(root: &Path) -> ToolResult<BTreeMap<String, String>> {
    let mut direct = BTreeMap::new();
    let mut indexes = BTreeMap::new();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(directory) = pending.pop() {
        let mut entries = match fs::read_dir(&directory).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => continue,
            Err(error) => return Err(error.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if entry.file_type().await?.is_dir() {
                pending.push(path);
                continue;
            }
            let Some(relative) = path
                .strip_prefix(root)
                .ok()
                .and_then(Path::to_str)
                .map(|relative| relative.replace('\\', "/"))
            else {
                continue;
            };
            let Some(stem) = relative.strip_suffix(".js") else {
                continue;
            };
            let stem = stem.strip_prefix("node_modules/").unwrap_or(stem);
            let source = fs::read_to_string(&path).await?;
            let (modules, id) = stem
                .strip_suffix("/index")
                .map_or((&mut direct, stem), |package| (&mut indexes, package));
            modules.insert(id.to_owned(), source);
        }
    }

    for (id, source) in indexes {
        direct.entry(id).or_insert(source);
    }
    Ok(direct)
}
