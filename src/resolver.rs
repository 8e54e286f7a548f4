//! Backend resolver: the single trial-and-fallback loop
//!
//! Candidates are tried in registry order. A tree attempt that reports
//! "not implemented" is retried at once as a flat open of the same backend;
//! any other failure is recorded and the next candidate gets its turn. The
//! decision to give up, and which error to surface, lives only in
//! [`Resolver::open`].

use crate::backends::BackendSet;
use crate::data_source::{normalize_group_path, Backend, GroupTable, OpenedDataset};
use crate::errors::BackendError;
use crate::registry::{BackendCandidate, FormatInfo};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Which opening strategy an attempt was using when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptStage {
    /// No adapter is registered under the candidate's id
    Lookup,
    Tree,
    Flat,
    GroupProbe,
}

impl fmt::Display for AttemptStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptStage::Lookup => "lookup",
            AttemptStage::Tree => "tree open",
            AttemptStage::Flat => "flat open",
            AttemptStage::GroupProbe => "group probe",
        };
        f.write_str(name)
    }
}

/// One failed attempt.
#[derive(Debug)]
pub struct AttemptFailure {
    pub backend: String,
    pub stage: AttemptStage,
    pub error: BackendError,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} backend failed during {}: {}", self.backend, self.stage, self.error)
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No backends available for {extension} files. Missing dependencies: {}", .missing.join(", "))]
    NoBackendAvailable {
        extension: String,
        missing: Vec<String>,
    },

    #[error("{}", describe_last(.attempts))]
    AllBackendsFailed { attempts: Vec<AttemptFailure> },
}

fn describe_last(attempts: &[AttemptFailure]) -> String {
    attempts
        .last()
        .map(ToString::to_string)
        .unwrap_or_else(|| "no backend attempt was made".to_string())
}

impl ResolveError {
    /// The failure that is surfaced to the caller: the last one recorded.
    pub fn last_failure(&self) -> Option<&AttemptFailure> {
        match self {
            ResolveError::NoBackendAvailable { .. } => None,
            ResolveError::AllBackendsFailed { attempts } => attempts.last(),
        }
    }
}

/// A successfully opened dataset and the backend that produced it.
#[derive(Debug)]
pub struct ResolvedDataset {
    pub dataset: OpenedDataset,
    pub backend: String,
}

pub struct Resolver<'a> {
    backends: &'a BackendSet,
}

impl<'a> Resolver<'a> {
    pub fn new(backends: &'a BackendSet) -> Self {
        Self { backends }
    }

    /// Open `path` with the first available candidate that succeeds.
    pub fn open(&self, path: &Path, format: &FormatInfo) -> Result<ResolvedDataset, ResolveError> {
        if format.candidates.is_empty() {
            return Err(ResolveError::NoBackendAvailable {
                extension: format.extension.clone(),
                missing: format.missing_dependencies.clone(),
            });
        }

        let mut failures: Vec<AttemptFailure> = Vec::new();
        for candidate in &format.candidates {
            let Some(backend) = self.backends.get(&candidate.id) else {
                warn!(backend = %candidate.id, "no adapter registered for candidate");
                failures.push(AttemptFailure {
                    backend: candidate.id.clone(),
                    stage: AttemptStage::Lookup,
                    error: BackendError::NotFound(format!("backend adapter '{}'", candidate.id)),
                });
                continue;
            };

            match attempt(backend, candidate, path) {
                Ok(dataset) => {
                    info!(
                        backend = %candidate.id,
                        shape = dataset.shape_name(),
                        failed_attempts = failures.len(),
                        "opened dataset"
                    );
                    return Ok(ResolvedDataset {
                        dataset,
                        backend: candidate.id.clone(),
                    });
                }
                Err(failure) => {
                    warn!(%failure, "backend attempt failed, trying next candidate");
                    failures.push(failure);
                }
            }
        }

        Err(ResolveError::AllBackendsFailed { attempts: failures })
    }
}

fn attempt(
    backend: &dyn Backend,
    candidate: &BackendCandidate,
    path: &Path,
) -> Result<OpenedDataset, AttemptFailure> {
    let fail = |stage: AttemptStage| {
        let backend = candidate.id.clone();
        move |error: BackendError| AttemptFailure {
            backend,
            stage,
            error,
        }
    };

    if candidate.forces_flat_open {
        return open_grouped(backend, candidate, path).map(OpenedDataset::Grouped);
    }

    match backend.open_tree(path, &candidate.open_options) {
        Ok(tree) => Ok(OpenedDataset::Tree(tree)),
        Err(error) if error.is_not_implemented() => {
            warn!(
                backend = %candidate.id,
                reason = %error,
                "tree opening not implemented, falling back to a flat open"
            );
            backend
                .open_flat(path, "/", &candidate.open_options)
                .map(OpenedDataset::Flat)
                .map_err(fail(AttemptStage::Flat))
        }
        Err(error) => Err(fail(AttemptStage::Tree)(error)),
    }
}

/// Flat-open the root plus every group the backend's probe reports.
fn open_grouped(
    backend: &dyn Backend,
    candidate: &BackendCandidate,
    path: &Path,
) -> Result<BTreeMap<String, GroupTable>, AttemptFailure> {
    let failure = |stage, error| AttemptFailure {
        backend: candidate.id.clone(),
        stage,
        error,
    };

    let mut groups = vec!["/".to_string()];
    match backend.list_groups(path, &candidate.open_options) {
        Some(Ok(paths)) => {
            for group in paths.iter().map(|p| normalize_group_path(p)) {
                if !groups.contains(&group) {
                    groups.push(group);
                }
            }
        }
        Some(Err(error)) => return Err(failure(AttemptStage::GroupProbe, error)),
        None => {}
    }

    let mut tables = BTreeMap::new();
    for group in groups {
        // Tables opened so far are dropped, and therefore closed, on failure
        let table = backend
            .open_flat(path, &group, &candidate.open_options)
            .map_err(|error| failure(AttemptStage::Flat, error))?;
        tables.insert(group, table);
    }
    Ok(tables)
}
