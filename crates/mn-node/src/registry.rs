//! Trial registry: which OS process runs which trial.
//!
//! The scheduler only ever writes. Reads belong to the external supervisor
//! that monitors or kills training processes, so the read helpers here are
//! the supervisor-side view of the same store.

use dashmap::DashMap;
use mn_types::{RegistryError, TaskResult, TrialId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Capability to publish the process running a trial.
pub trait TrialRegistrar: Send + Sync {
    /// Record `pid` for `(model_id, trial_id)`, replacing any previous entry.
    fn record(&self, model_id: &str, trial_id: &TrialId, pid: u32) -> TaskResult<()>;
}

impl<T: TrialRegistrar + ?Sized> TrialRegistrar for Arc<T> {
    fn record(&self, model_id: &str, trial_id: &TrialId, pid: u32) -> TaskResult<()> {
        (**self).record(model_id, trial_id, pid)
    }
}

/// In-process registry. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTrialRegistry {
    entries: Arc<DashMap<(String, TrialId), u32>>,
}

impl InMemoryTrialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, model_id: &str, trial_id: &TrialId) -> Option<u32> {
        self.entries
            .get(&(model_id.to_string(), trial_id.clone()))
            .map(|entry| *entry.value())
    }

    /// All trials recorded for a model, ordered by trial id.
    pub fn trials_for(&self, model_id: &str) -> BTreeMap<TrialId, u32> {
        self.entries
            .iter()
            .filter(|entry| entry.key().0 == model_id)
            .map(|entry| (entry.key().1.clone(), *entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TrialRegistrar for InMemoryTrialRegistry {
    fn record(&self, model_id: &str, trial_id: &TrialId, pid: u32) -> TaskResult<()> {
        self.entries
            .insert((model_id.to_string(), trial_id.clone()), pid);
        debug!(model_id, trial_id = %trial_id, pid, "recorded trial process");
        Ok(())
    }
}

/// Directory-backed registry shared between processes on one host.
///
/// Layout is `<root>/<model_id>/<trial_id>.pid`, each file holding the
/// decimal pid. Entries are written to a temporary file and renamed into
/// place, so readers never observe a partial write.
#[derive(Debug, Clone)]
pub struct FsTrialRegistry {
    root: PathBuf,
}

impl FsTrialRegistry {
    const EXTENSION: &'static str = "pid";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lookup(&self, model_id: &str, trial_id: &TrialId) -> TaskResult<Option<u32>> {
        let path = self.entry_path(model_id, trial_id)?;
        match std::fs::read_to_string(&path) {
            Ok(raw) => parse_pid(&path, &raw).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(&path, e).into()),
        }
    }

    /// All trials recorded for a model, ordered by trial id.
    pub fn trials_for(&self, model_id: &str) -> TaskResult<BTreeMap<TrialId, u32>> {
        let dir = self.model_dir(model_id)?;
        let mut trials = BTreeMap::new();

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(trials),
            Err(e) => return Err(storage_error(&dir, e).into()),
        };

        for entry in entries {
            let path = entry.map_err(|e| storage_error(&dir, e))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(Self::EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let raw = std::fs::read_to_string(&path).map_err(|e| storage_error(&path, e))?;
            trials.insert(TrialId::from(stem), parse_pid(&path, &raw)?);
        }

        Ok(trials)
    }

    fn model_dir(&self, model_id: &str) -> Result<PathBuf, RegistryError> {
        validate_key(model_id)?;
        Ok(self.root.join(model_id))
    }

    fn entry_path(&self, model_id: &str, trial_id: &TrialId) -> Result<PathBuf, RegistryError> {
        validate_key(trial_id.as_str())?;
        Ok(self
            .model_dir(model_id)?
            .join(format!("{}.{}", trial_id, Self::EXTENSION)))
    }
}

impl TrialRegistrar for FsTrialRegistry {
    fn record(&self, model_id: &str, trial_id: &TrialId, pid: u32) -> TaskResult<()> {
        let path = self.entry_path(model_id, trial_id)?;
        let dir = self.model_dir(model_id)?;
        std::fs::create_dir_all(&dir).map_err(|e| storage_error(&dir, e))?;

        // Unique per writer so concurrent writers never share a temp file.
        let tmp = dir.join(format!(".{}.{}.tmp", trial_id, std::process::id()));
        std::fs::write(&tmp, pid.to_string()).map_err(|e| storage_error(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| storage_error(&path, e))?;

        debug!(
            model_id,
            trial_id = %trial_id,
            pid,
            path = %path.display(),
            "recorded trial process"
        );
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<(), RegistryError> {
    let invalid = key.is_empty()
        || key == "."
        || key == ".."
        || key.starts_with('.')
        || key.contains(&['/', '\\', '\0'][..]);
    if invalid {
        return Err(RegistryError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

fn parse_pid(path: &Path, raw: &str) -> TaskResult<u32> {
    raw.trim().parse().map_err(|e| {
        RegistryError::Storage {
            path: path.display().to_string(),
            message: format!("invalid pid {raw:?}: {e}"),
        }
        .into()
    })
}

fn storage_error(path: &Path, e: std::io::Error) -> RegistryError {
    RegistryError::Storage {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}
