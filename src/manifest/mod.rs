//! Archival manifest documents
//!
//! A manifest names a batch of objects (`directive_names`) and the shared
//! policy used to archive them: where sources live, where workspaces and
//! compressed archives go, the cold-storage vault and the retrieval method.
//! Manifests are read from YAML, TOML or JSON and may be layered on top of a
//! defaults file (see [`layers`]).

pub mod layers;
pub mod validate;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

pub use layers::{load_layered, LayerOrigin, LoadedManifest, ManifestSource, Override};
pub use validate::{validate, Policy, ValidationFailure, ValidationIssue};

/// Key overwritten with each object's name in `description_values`
pub const DESCRIPTION_KEY: &str = "description";

/// Archival manifest as loaded, before validation.
///
/// Every field is optional here so that validation can report all missing
/// fields at once instead of failing on the first.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Manifest {
    /// Objects to archive, in output order
    #[serde(default, deserialize_with = "optional_text_list")]
    pub directive_names: Option<Vec<String>>,

    /// Base path or URI that sources are retrieved from
    #[serde(default, deserialize_with = "optional_text")]
    pub source: Option<String>,

    /// Root for per-object staging workspaces
    #[serde(default, deserialize_with = "optional_text")]
    pub workspace: Option<String>,

    /// Root for compressed archives
    #[serde(default, deserialize_with = "optional_text")]
    pub compressed_destination: Option<String>,

    /// Archive file extension, without the leading dot
    #[serde(default, deserialize_with = "optional_text")]
    pub compressed_extension: Option<String>,

    /// Root for verification staging; enables verification output when set
    #[serde(default, deserialize_with = "optional_text")]
    pub verification_destination: Option<String>,

    /// Sampling directive: blank, `all`, or `numerator/denominator`
    #[serde(default, deserialize_with = "optional_text")]
    pub verification_sample_size: Option<String>,

    /// Descriptive metadata attached to every record
    #[serde(default)]
    pub description_values: Option<Map<String, Value>>,

    /// Cold-storage vault name
    #[serde(default, deserialize_with = "optional_text")]
    pub vault: Option<String>,

    /// Owning application or workflow
    #[serde(default, deserialize_with = "optional_text")]
    pub application: Option<String>,

    /// Retrieval method token (`gitannex` or `rsync`)
    #[serde(default, deserialize_with = "optional_text")]
    pub method: Option<String>,
}

/// Errors that can occur when loading a manifest
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {origin} as {format}: {reason}")]
    Parse {
        origin: String,
        format: DocumentFormat,
        reason: String,
    },

    #[error("{origin}: document root must be a mapping")]
    NotAMapping { origin: String },

    #[error("invalid override '{0}': expected key=value")]
    InvalidOverride(String),

    #[error("manifest does not match the expected layout: {0}")]
    Shape(#[from] serde_json::Error),
}

/// Structured document formats accepted for manifests and defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentFormat {
    #[default]
    Yaml,
    Toml,
    Json,
}

impl DocumentFormat {
    /// Pick a format from the file extension; anything unrecognised is read
    /// as YAML, which also accepts JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("toml") => DocumentFormat::Toml,
            Some("json") => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }

    /// Parse `content` into a generic JSON value.
    pub fn parse_value(&self, content: &str, origin: &str) -> Result<Value, ManifestError> {
        let parse_err = |reason: String| ManifestError::Parse {
            origin: origin.to_string(),
            format: *self,
            reason,
        };

        let value = match self {
            DocumentFormat::Yaml => {
                serde_yaml::from_str::<Value>(content).map_err(|e| parse_err(e.to_string()))?
            }
            DocumentFormat::Toml => {
                let table: toml::Value =
                    toml::from_str(content).map_err(|e| parse_err(e.to_string()))?;
                toml_to_json(table)
            }
            DocumentFormat::Json => {
                serde_json::from_str::<Value>(content).map_err(|e| parse_err(e.to_string()))?
            }
        };

        match value {
            Value::Object(_) => Ok(value),
            // An empty YAML document: every field is missing, validation reports them
            Value::Null => Ok(Value::Object(Map::new())),
            _ => Err(ManifestError::NotAMapping {
                origin: origin.to_string(),
            }),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Yaml => f.write_str("YAML"),
            DocumentFormat::Toml => f.write_str("TOML"),
            DocumentFormat::Json => f.write_str("JSON"),
        }
    }
}

impl Manifest {
    /// Load a single manifest file, without defaults or overrides.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let origin = path.display().to_string();
        let value = DocumentFormat::from_path(path).parse_value(&content, &origin)?;
        Self::from_value(value)
    }

    /// Parse a manifest from an in-memory document.
    pub fn parse(content: &str, format: DocumentFormat) -> Result<Self, ManifestError> {
        let value = format.parse_value(content, "<inline>")?;
        Self::from_value(value)
    }

    /// Build a manifest from an already merged document.
    pub fn from_value(value: Value) -> Result<Self, ManifestError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Object names, or an empty slice when the field is missing
    pub fn names(&self) -> &[String] {
        self.directive_names.as_deref().unwrap_or_default()
    }

    /// Verification root, when configured and non-blank
    pub fn verification_root(&self) -> Option<&str> {
        non_blank(self.verification_destination.as_deref())
    }

    /// Sampling directive text, when configured and non-blank
    pub fn sample_directive_text(&self) -> Option<&str> {
        non_blank(self.verification_sample_size.as_deref())
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Convert a TOML value to a JSON value
fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => {
            Value::Object(table.into_iter().map(|(k, v)| (k, toml_to_json(v))).collect())
        }
    }
}

/// Render a scalar as text. Numbers and booleans are accepted so that an
/// unquoted `vault: 2024` or `verification_sample_size: 5` reaches validation
/// instead of failing the whole document.
fn scalar_text(value: Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Array(_) => Err("expected a single value, found a list".to_string()),
        Value::Object(_) => Err("expected a single value, found a mapping".to_string()),
    }
}

fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Option::<Value>::deserialize(deserializer)?.unwrap_or(Value::Null);
    scalar_text(value).map_err(D::Error::custom)
}

fn optional_text_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| scalar_text(item).map(Option::unwrap_or_default))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
            .map_err(D::Error::custom),
        Some(_) => Err(D::Error::custom("directive_names must be a list")),
    }
}
