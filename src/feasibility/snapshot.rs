//! Read-only view of project state queried by the checklist engine.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::feasibility::types::DependencyKind;

/// Answer to a single probe.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProbeResult {
    pub exists: bool,
    pub exposed: BTreeSet<String>,
}

impl ProbeResult {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn present(exposed: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            exists: true,
            exposed: exposed.into_iter().map(Into::into).collect(),
        }
    }
}

/// A project snapshot. Never mutated by its readers.
pub trait ProjectSnapshot: Send + Sync {
    fn probe(&self, name: &str, kind: DependencyKind) -> ProbeResult;
}

/// Where snapshots come from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// # Errors
    /// Returns `Error::Configuration` when the snapshot cannot be obtained.
    async fn snapshot(&self) -> Result<Arc<dyn ProjectSnapshot>>;
}

/// In-memory snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticSnapshot {
    entries: BTreeMap<(DependencyKind, String), BTreeSet<String>>,
}

impl StaticSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        name: &str,
        kind: DependencyKind,
        exposed: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.insert(name, kind, exposed);
        self
    }

    pub fn insert(
        &mut self,
        name: &str,
        kind: DependencyKind,
        exposed: impl IntoIterator<Item = impl Into<String>>,
    ) {
        self.entries
            .entry((kind, name.to_string()))
            .or_default()
            .extend(exposed.into_iter().map(Into::into));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ProjectSnapshot for StaticSnapshot {
    fn probe(&self, name: &str, kind: DependencyKind) -> ProbeResult {
        match self.entries.get(&(kind, name.to_string())) {
            Some(exposed) => ProbeResult {
                exists: true,
                exposed: exposed.clone(),
            },
            None => ProbeResult::absent(),
        }
    }
}

#[async_trait]
impl SnapshotSource for StaticSnapshot {
    async fn snapshot(&self) -> Result<Arc<dyn ProjectSnapshot>> {
        Ok(Arc::new(self.clone()))
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    dependencies: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    name: String,
    kind: DependencyKind,
    #[serde(default)]
    exposes: Vec<String>,
}

/// Snapshot loaded from a TOML project-state manifest:
///
/// ```toml
/// [[dependencies]]
/// name = "User"
/// kind = "entity"
/// exposes = ["id", "email"]
/// ```
#[derive(Debug, Clone)]
pub struct ManifestSource {
    path: PathBuf,
}

impl ManifestSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse manifest text.
    pub fn parse(content: &str) -> Result<StaticSnapshot> {
        let manifest: Manifest = toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("invalid project manifest: {}", e)))?;
        let mut snapshot = StaticSnapshot::new();
        for entry in manifest.dependencies {
            snapshot.insert(&entry.name, entry.kind, entry.exposes);
        }
        Ok(snapshot)
    }
}

#[async_trait]
impl SnapshotSource for ManifestSource {
    async fn snapshot(&self) -> Result<Arc<dyn ProjectSnapshot>> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::Configuration(format!(
                "cannot read project manifest {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let snapshot = Self::parse(&content)?;
        debug!(path = %self.path.display(), entries = snapshot.len(), "loaded project manifest");
        Ok(Arc::new(snapshot))
    }
}
