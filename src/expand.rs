//! Manifest expansion
//!
//! Turns one manifest into one [`ResolvedRecord`] per directive name:
//!
//! 1. Load the manifest
//! 2. Validate it (nothing is produced for an invalid manifest)
//! 3. Resolve the retrieval method
//! 4. Draw the verification sample once, over the full name list
//! 5. Expand every name in declared order
//!
//! Expansion is all-or-nothing: any error discards the records built so far.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::identifier::generate_identifier;
use crate::manifest::{
    load_layered, validate, Manifest, ManifestError, Override, Policy, ValidationFailure,
    DESCRIPTION_KEY,
};
use crate::paths::{self, PathError, RetrievalMethod};
use crate::sample::select_sample;

/// Errors that abort an expansion
#[derive(Debug, thiserror::Error)]
pub enum ExpandError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Invalid(#[from] ValidationFailure),

    #[error(transparent)]
    Path(#[from] PathError),
}

/// Verification staging for one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationTarget {
    /// Where the object is unpacked for verification
    pub verification_path: PathBuf,

    /// Whether this object was drawn into the verification sample
    pub verify_flag: bool,
}

/// Fully resolved inventory record for one object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRecord {
    /// Directive name
    pub name: String,

    /// Record id (currently the directive name)
    pub id: String,

    /// Random identifier embedded in this record's local paths
    pub identifier: Uuid,

    pub source_location: String,
    pub workspace_path: PathBuf,
    pub compressed_archive_path: PathBuf,

    /// Directories to remove after the job, without repeats
    pub cleanup_paths: Vec<PathBuf>,

    /// Descriptive metadata with `description` set to this object's name
    pub description_payload: Map<String, Value>,

    pub vault: String,
    pub application: String,
    pub method: RetrievalMethod,

    /// Present only when the manifest declares a verification destination
    #[serde(flatten)]
    pub verification: Option<VerificationTarget>,
}

impl ResolvedRecord {
    pub fn verification_path(&self) -> Option<&Path> {
        self.verification.as_ref().map(|v| v.verification_path.as_path())
    }

    pub fn verify_flag(&self) -> Option<bool> {
        self.verification.as_ref().map(|v| v.verify_flag)
    }

    /// Description payload serialized as a compact JSON string
    pub fn description_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.description_payload)
    }
}

/// Expands manifests using an injectable random source
#[derive(Debug)]
pub struct Expander<R> {
    rng: R,
}

impl Expander<StdRng> {
    /// Expander seeded from the operating system
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Expander with reproducible identifiers and samples
    pub fn with_seed(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Expander<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Load a manifest (with optional defaults and overrides) and expand it.
    pub fn expand_path(
        &mut self,
        manifest_path: &Path,
        defaults_path: Option<&Path>,
        overrides: &[Override],
    ) -> Result<Vec<ResolvedRecord>, ExpandError> {
        let loaded = load_layered(manifest_path, defaults_path, overrides)?;
        self.expand(&loaded.manifest)
    }

    /// Validate and expand an already loaded manifest.
    pub fn expand(&mut self, manifest: &Manifest) -> Result<Vec<ResolvedRecord>, ExpandError> {
        let policy = validate(manifest)?;
        let method: RetrievalMethod = policy.method.parse()?;

        warn_on_duplicates(policy.names);

        // Validation guarantees an active directive has a verification destination
        let sample = select_sample(policy.sample, policy.names, &mut self.rng);
        tracing::debug!(
            directive = %policy.sample,
            selected = sample.len(),
            "verification sample drawn"
        );

        let records: Vec<ResolvedRecord> = policy
            .names
            .iter()
            .map(|name| self.expand_one(&policy, method, &sample, name))
            .collect();

        tracing::info!(
            records = records.len(),
            sampled = sample.len(),
            method = %method,
            "manifest expanded"
        );
        Ok(records)
    }

    fn expand_one(
        &mut self,
        policy: &Policy<'_>,
        method: RetrievalMethod,
        sample: &BTreeSet<String>,
        name: &str,
    ) -> ResolvedRecord {
        let identifier = generate_identifier(&mut self.rng);

        let source_location = method.source_location(policy.source, name);
        let workspace_path = paths::resolve_workspace(policy.workspace, name, &identifier);
        let compressed_archive_path = paths::resolve_compressed_dest(
            policy.compressed_destination,
            name,
            &identifier,
            policy.compressed_extension,
        );
        let verification_path =
            paths::resolve_verification_dir(policy.verification_destination, name, &identifier);

        let mut description_payload = policy.description_values.clone();
        description_payload.insert(DESCRIPTION_KEY.to_string(), Value::String(name.to_string()));

        let cleanup_paths = paths::cleanup_paths(
            &workspace_path,
            &compressed_archive_path,
            verification_path.as_deref(),
        );

        let verification = verification_path.map(|verification_path| VerificationTarget {
            verification_path,
            verify_flag: sample.contains(name),
        });

        tracing::debug!(%name, %identifier, workspace = %workspace_path.display(), "resolved record");

        ResolvedRecord {
            name: name.to_string(),
            id: name.to_string(),
            identifier,
            source_location,
            workspace_path,
            compressed_archive_path,
            cleanup_paths,
            description_payload,
            vault: policy.vault.to_string(),
            application: policy.application.to_string(),
            method,
            verification,
        }
    }
}

fn warn_on_duplicates(names: &[String]) {
    let mut seen = HashSet::new();
    let duplicates: BTreeSet<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|name| !seen.insert(*name))
        .collect();
    if !duplicates.is_empty() {
        tracing::warn!(
            ?duplicates,
            "directive_names contains repeated names; each occurrence gets its own identifier"
        );
    }
}
