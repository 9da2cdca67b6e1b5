//! Layered manifest loading
//!
//! A manifest is assembled from up to three layers, lowest precedence first:
//! 1. Site defaults file (shared vault, application, method, roots)
//! 2. The manifest itself
//! 3. `--set key=value` overrides from the command line
//!
//! Merge semantics:
//! - Objects: deep-merge by key
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::{DocumentFormat, Manifest, ManifestError};

/// Where a manifest layer came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LayerOrigin {
    Defaults,
    Manifest,
    Cli,
}

/// A contributing layer with provenance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestSource {
    /// Origin of this layer
    pub origin: LayerOrigin,

    /// File path (None for CLI overrides)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of the raw file bytes (None for CLI overrides)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Manifest merged from all layers, plus the layers that contributed
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub manifest: Manifest,
    pub sources: Vec<ManifestSource>,
}

/// A single `key=value` override.
///
/// Dotted keys address nested mappings (`description_values.project=x`).
/// `directive_names` takes a comma-separated list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub key: String,
    pub value: String,
}

impl FromStr for Override {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| ManifestError::InvalidOverride(s.to_string()))?;
        let key = key.trim();
        if key.is_empty() || key.split('.').any(|part| part.is_empty()) {
            return Err(ManifestError::InvalidOverride(s.to_string()));
        }
        Ok(Override {
            key: key.to_string(),
            value: value.trim().to_string(),
        })
    }
}

impl Override {
    /// Convert to a JSON object suitable for merging
    pub fn to_value(&self) -> Value {
        let leaf = if self.key == "directive_names" {
            Value::Array(
                self.value
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(|name| Value::String(name.to_string()))
                    .collect(),
            )
        } else {
            Value::String(self.value.clone())
        };

        self.key.rsplit('.').fold(leaf, |inner, part| {
            let mut map = Map::new();
            map.insert(part.to_string(), inner);
            Value::Object(map)
        })
    }
}

/// Deep merge two JSON values.
///
/// Objects merge recursively by key; anything else in `overlay` replaces the
/// value in `base`, including arrays and nulls.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Object(Map::new()), deep_merge)
}

/// Load a manifest with an optional defaults layer and CLI overrides.
pub fn load_layered(
    manifest_path: &Path,
    defaults_path: Option<&Path>,
    overrides: &[Override],
) -> Result<LoadedManifest, ManifestError> {
    let mut layers = Vec::new();
    let mut sources = Vec::new();

    if let Some(path) = defaults_path {
        let (value, digest) = load_file(path)?;
        tracing::debug!(path = %path.display(), "loaded manifest defaults");
        layers.push(value);
        sources.push(ManifestSource {
            origin: LayerOrigin::Defaults,
            path: Some(path.display().to_string()),
            digest: Some(digest),
        });
    }

    let (value, digest) = load_file(manifest_path)?;
    layers.push(value);
    sources.push(ManifestSource {
        origin: LayerOrigin::Manifest,
        path: Some(manifest_path.display().to_string()),
        digest: Some(digest),
    });

    if !overrides.is_empty() {
        for item in overrides {
            tracing::debug!(key = %item.key, "applying manifest override");
            layers.push(item.to_value());
        }
        sources.push(ManifestSource {
            origin: LayerOrigin::Cli,
            path: None,
            digest: None,
        });
    }

    let manifest = Manifest::from_value(merge_layers(layers))?;
    Ok(LoadedManifest { manifest, sources })
}

/// Read and parse one layer, returning the value and the digest of its bytes
fn load_file(path: &Path) -> Result<(Value, String), ManifestError> {
    let bytes = fs::read(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let digest = hex::encode(Sha256::digest(&bytes));

    let format = DocumentFormat::from_path(path);
    let origin = path.display().to_string();
    let content = String::from_utf8(bytes).map_err(|e| ManifestError::Parse {
        origin: origin.clone(),
        format,
        reason: format!("invalid UTF-8: {}", e),
    })?;

    let value = format.parse_value(&content, &origin)?;
    Ok((value, digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_scalar_override() {
        let result = deep_merge(json!({"vault": "a"}), json!({"vault": "b"}));
        assert_eq!(result["vault"], "b");
    }

    #[test]
    fn test_object_deep_merge() {
        let base = json!({"description_values": {"project": "p", "owner": "o"}});
        let overlay = json!({"description_values": {"owner": "x"}});
        let result = deep_merge(base, overlay);

        assert_eq!(result["description_values"]["project"], "p");
        assert_eq!(result["description_values"]["owner"], "x");
    }

    #[test]
    fn test_array_replace() {
        let base = json!({"directive_names": ["A", "B", "C"]});
        let overlay = json!({"directive_names": ["X"]});
        let result = deep_merge(base, overlay);

        assert_eq!(result["directive_names"], json!(["X"]));
    }

    #[test]
    fn test_null_override() {
        let result = deep_merge(json!({"verification_destination": "/v"}), json!({"verification_destination": null}));
        assert!(result["verification_destination"].is_null());
    }

    #[test]
    fn test_merge_layers_precedence() {
        let defaults = json!({"vault": "site", "method": "rsync"});
        let manifest = json!({"method": "gitannex"});
        let cli = json!({"vault": "cli"});

        let result = merge_layers(vec![defaults, manifest, cli]);
        assert_eq!(result["vault"], "cli");
        assert_eq!(result["method"], "gitannex");
    }

    #[test]
    fn test_override_parse() {
        let item: Override = "vault = deep-freeze".parse().unwrap();
        assert_eq!(item.key, "vault");
        assert_eq!(item.value, "deep-freeze");

        assert!("novalue".parse::<Override>().is_err());
        assert!("=x".parse::<Override>().is_err());
        assert!("a..b=x".parse::<Override>().is_err());
    }

    #[test]
    fn test_override_empty_value_allowed() {
        let item: Override = "verification_sample_size=".parse().unwrap();
        assert_eq!(item.to_value(), json!({"verification_sample_size": ""}));
    }

    #[test]
    fn test_override_nested_key() {
        let item: Override = "description_values.project=atlas".parse().unwrap();
        assert_eq!(item.to_value(), json!({"description_values": {"project": "atlas"}}));
    }

    #[test]
    fn test_override_directive_names_list() {
        let item: Override = "directive_names=A, B,,C".parse().unwrap();
        assert_eq!(item.to_value(), json!({"directive_names": ["A", "B", "C"]}));
    }

    #[test]
    fn test_load_layered_with_defaults_and_overrides() {
        let defaults = write_temp(
            ".toml",
            r#"
                vault = "site-vault"
                application = "guardian"
                method = "rsync"

                [description_values]
                owner = "archives team"
            "#,
        );
        let manifest = write_temp(
            ".yml",
            "directive_names: [A, B]\nmethod: gitannex\ndescription_values:\n  project: atlas\n",
        );
        let overrides = vec!["vault=cli-vault".parse().unwrap()];

        let loaded = load_layered(manifest.path(), Some(defaults.path()), &overrides).unwrap();
        let m = &loaded.manifest;
        assert_eq!(m.vault.as_deref(), Some("cli-vault"));
        assert_eq!(m.application.as_deref(), Some("guardian"));
        assert_eq!(m.method.as_deref(), Some("gitannex"));

        let description = m.description_values.as_ref().unwrap();
        assert_eq!(description["owner"], "archives team");
        assert_eq!(description["project"], "atlas");

        let origins: Vec<_> = loaded.sources.iter().map(|s| s.origin).collect();
        assert_eq!(origins, vec![LayerOrigin::Defaults, LayerOrigin::Manifest, LayerOrigin::Cli]);
        assert_eq!(loaded.sources[1].digest.as_ref().unwrap().len(), 64);
        assert!(loaded.sources[2].path.is_none());
    }

    #[test]
    fn test_digest_matches_file_bytes() {
        let content = "vault: v\n";
        let manifest = write_temp(".yaml", content);
        let loaded = load_layered(manifest.path(), None, &[]).unwrap();

        let expected = hex::encode(Sha256::digest(content.as_bytes()));
        assert_eq!(loaded.sources.len(), 1);
        assert_eq!(loaded.sources[0].digest.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn test_missing_manifest_is_io_error() {
        let result = load_layered(Path::new("/nonexistent/manifest.yml"), None, &[]);
        assert!(matches!(result, Err(ManifestError::Io { .. })));
    }
}
