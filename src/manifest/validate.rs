//! Manifest validation
//!
//! Validation runs to completion and reports every problem it finds, so a
//! manifest author sees all missing fields in one pass. On success it hands
//! back a [`Policy`]: the same manifest with every required field present and
//! the sampling directive parsed.

use serde_json::{Map, Value};

use super::{non_blank, Manifest};
use crate::sample::{SampleDirective, SampleError};

/// One problem found in a manifest
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationIssue {
    /// Required fields that are absent or blank, in declaration order
    #[error("missing required field(s): {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    /// Zero-based positions of blank entries in `directive_names`
    #[error("directive_names has blank entries at position(s) {}", join(.0, ", "))]
    BlankDirectiveNames(Vec<usize>),

    /// The sampling directive could not be parsed
    #[error("{0}")]
    InvalidSamplingDirective(SampleError),

    /// Sampling was requested without anywhere to stage verification
    #[error("verification_sample_size '{directive}' requires verification_destination to be set")]
    MissingVerificationDestination { directive: String },
}

/// All problems found in a manifest
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid manifest: {}", join(.issues, "; "))]
pub struct ValidationFailure {
    pub issues: Vec<ValidationIssue>,
}

fn join<T: ToString>(items: &[T], separator: &str) -> String {
    let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
    parts.join(separator)
}

impl ValidationFailure {
    /// Missing field names, if a missing-fields issue was reported
    pub fn missing_fields(&self) -> &[&'static str] {
        self.issues
            .iter()
            .find_map(|issue| match issue {
                ValidationIssue::MissingFields(fields) => Some(fields.as_slice()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

/// Validated archival policy borrowed from a [`Manifest`]
#[derive(Debug, Clone, PartialEq)]
pub struct Policy<'a> {
    pub names: &'a [String],
    pub source: &'a str,
    pub workspace: &'a str,
    pub compressed_destination: &'a str,
    pub compressed_extension: &'a str,
    pub verification_destination: Option<&'a str>,
    pub sample: SampleDirective,
    pub description_values: &'a Map<String, Value>,
    pub vault: &'a str,
    pub application: &'a str,
    pub method: &'a str,
}

/// Non-blank text of a required field; records `field` as missing otherwise
fn required<'m>(
    missing: &mut Vec<&'static str>,
    field: &'static str,
    value: &'m Option<String>,
) -> Option<&'m str> {
    let value = non_blank(value.as_deref());
    if value.is_none() {
        missing.push(field);
    }
    value
}

/// Validate a manifest, collecting every problem before failing.
pub fn validate(manifest: &Manifest) -> Result<Policy<'_>, ValidationFailure> {
    let mut missing = Vec::new();

    let source = required(&mut missing, "source", &manifest.source);
    let workspace = required(&mut missing, "workspace", &manifest.workspace);
    let compressed_destination =
        required(&mut missing, "compressed_destination", &manifest.compressed_destination);
    let compressed_extension =
        required(&mut missing, "compressed_extension", &manifest.compressed_extension);

    let description_values = manifest
        .description_values
        .as_ref()
        .filter(|values| !values.is_empty());
    if description_values.is_none() {
        missing.push("description_values");
    }

    let vault = required(&mut missing, "vault", &manifest.vault);
    let application = required(&mut missing, "application", &manifest.application);
    let method = required(&mut missing, "method", &manifest.method);

    let names = manifest
        .directive_names
        .as_deref()
        .filter(|names| !names.is_empty());
    if names.is_none() {
        missing.push("directive_names");
    }

    let mut issues = Vec::new();
    if !missing.is_empty() {
        issues.push(ValidationIssue::MissingFields(missing));
    }

    if let Some(names) = names {
        let blank: Vec<usize> = names
            .iter()
            .enumerate()
            .filter(|(_, name)| name.trim().is_empty())
            .map(|(i, _)| i)
            .collect();
        if !blank.is_empty() {
            issues.push(ValidationIssue::BlankDirectiveNames(blank));
        }
    }

    let directive_text = manifest.sample_directive_text();
    let sample = match SampleDirective::parse_optional(directive_text) {
        Ok(sample) => Some(sample),
        Err(err) => {
            issues.push(ValidationIssue::InvalidSamplingDirective(err));
            None
        }
    };

    let verification_destination = manifest.verification_root();
    if let (Some(directive), None) = (directive_text, verification_destination) {
        issues.push(ValidationIssue::MissingVerificationDestination {
            directive: directive.to_string(),
        });
    }

    let policy = (|| {
        Some(Policy {
            names: names?,
            source: source?,
            workspace: workspace?,
            compressed_destination: compressed_destination?,
            compressed_extension: compressed_extension?,
            verification_destination,
            sample: sample?,
            description_values: description_values?,
            vault: vault?,
            application: application?,
            method: method?,
        })
    })();

    match policy {
        Some(policy) if issues.is_empty() => Ok(policy),
        _ => Err(ValidationFailure { issues }),
    }
}
