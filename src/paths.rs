//! Path resolution for expanded objects
//!
//! Derives where an object is retrieved from and where its staging, archive
//! and verification files live. Every local path embeds the object's
//! identifier (`{name}-{identifier}`) so artifacts of different objects, and
//! of repeated runs over the same object, never share a directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors raised while resolving paths
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("unknown retrieval method '{0}' (expected 'gitannex' or 'rsync')")]
    UnknownRetrievalMethod(String),
}

/// How an object's source is retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    /// git-annex repository, cloned from `{source}/{name}.git`
    #[serde(rename = "gitannex")]
    GitAnnex,
    /// rsync tree at `{source}/{name}`
    Rsync,
}

impl RetrievalMethod {
    /// Token used in manifests and inventory output
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMethod::GitAnnex => "gitannex",
            RetrievalMethod::Rsync => "rsync",
        }
    }

    /// Resolve the source location of `name` under `source_base`.
    pub fn source_location(&self, source_base: &str, name: &str) -> String {
        let base = source_base.trim().trim_end_matches('/');
        match self {
            RetrievalMethod::GitAnnex => format!("{}/{}.git", base, name),
            RetrievalMethod::Rsync => format!("{}/{}", base, name),
        }
    }
}

impl fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalMethod {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gitannex" => Ok(RetrievalMethod::GitAnnex),
            "rsync" => Ok(RetrievalMethod::Rsync),
            _ => Err(PathError::UnknownRetrievalMethod(s.to_string())),
        }
    }
}

/// Resolve a source location from a raw method token.
pub fn resolve_source(method: &str, source_base: &str, name: &str) -> Result<String, PathError> {
    let method: RetrievalMethod = method.parse()?;
    Ok(method.source_location(source_base, name))
}

/// `/{workspace_root}/{name}-{identifier}`
pub fn resolve_workspace(workspace_root: &str, name: &str, identifier: &Uuid) -> PathBuf {
    object_dir(workspace_root, name, identifier)
}

/// `/{dest_root}/{name}-{identifier}/{name}.{extension}`
pub fn resolve_compressed_dest(
    dest_root: &str,
    name: &str,
    identifier: &Uuid,
    extension: &str,
) -> PathBuf {
    let extension = extension.trim().trim_start_matches('.');
    object_dir(dest_root, name, identifier).join(format!("{}.{}", name, extension))
}

/// `/{verification_root}/{name}-{identifier}`, or `None` when no verification
/// root is configured. A blank root counts as unconfigured.
pub fn resolve_verification_dir(
    verification_root: Option<&str>,
    name: &str,
    identifier: &Uuid,
) -> Option<PathBuf> {
    verification_root
        .filter(|root| !root.trim().is_empty())
        .map(|root| object_dir(root, name, identifier))
}

/// Directories to remove once an object's job is done: workspace, the
/// archive's parent and the verification dir, without repeats.
pub fn cleanup_paths(
    workspace: &Path,
    compressed_dest: &Path,
    verification: Option<&Path>,
) -> Vec<PathBuf> {
    let candidates = [Some(workspace), compressed_dest.parent(), verification];

    let mut paths: Vec<PathBuf> = Vec::with_capacity(candidates.len());
    for candidate in candidates.into_iter().flatten() {
        if !paths.iter().any(|p| p.as_path() == candidate) {
            paths.push(candidate.to_path_buf());
        }
    }
    paths
}

fn object_dir(root: &str, name: &str, identifier: &Uuid) -> PathBuf {
    let root = root.trim().trim_matches('/');
    if root.is_empty() {
        PathBuf::from(format!("/{}-{}", name, identifier))
    } else {
        PathBuf::from(format!("/{}/{}-{}", root, name, identifier))
    }
}
