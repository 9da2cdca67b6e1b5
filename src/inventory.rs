//! Inventory output
//!
//! Wraps expanded records in a versioned document and writes it out. The
//! verification columns only appear when at least one record carries them.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::expand::ResolvedRecord;
use crate::manifest::ManifestSource;

/// Schema version for the inventory document
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "archive-manifest/inventory@1";

/// Default output file stem when none is given
pub const DEFAULT_OUTPUT_STEM: &str = "archive_inventory";

/// Columns every record carries, in output order
pub const RECORD_COLUMNS: &[&str] = &[
    "name",
    "id",
    "identifier",
    "source_location",
    "workspace_path",
    "compressed_archive_path",
    "cleanup_paths",
    "description_payload",
    "vault",
    "application",
    "method",
];

/// Columns present only when a verification destination is configured
pub const VERIFICATION_COLUMNS: &[&str] = &["verification_path", "verify_flag"];

/// Errors that can occur when writing an inventory
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("failed to serialize inventory: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Output encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One pretty-printed inventory document
    #[default]
    Json,
    /// One compact record per line, no envelope
    JsonLines,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::JsonLines => "jsonl",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "jsonl" | "ndjson" => Ok(OutputFormat::JsonLines),
            other => Err(format!("unknown output format '{}' (expected json or jsonl)", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Output columns for a record set
pub fn columns(records: &[ResolvedRecord]) -> Vec<&'static str> {
    let mut columns = RECORD_COLUMNS.to_vec();
    if records.iter().any(|r| r.verification.is_some()) {
        columns.extend_from_slice(VERIFICATION_COLUMNS);
    }
    columns
}

/// Output path for `requested` in `format`: the requested stem and directory
/// with the format's extension, or `archive_inventory.<ext>` when unset.
pub fn resolve_output_path(requested: Option<&Path>, format: OutputFormat) -> PathBuf {
    match requested {
        Some(path) => path.with_extension(format.extension()),
        None => PathBuf::from(format!("{}.{}", DEFAULT_OUTPUT_STEM, format.extension())),
    }
}

/// Inventory document (the `json` output format)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryDocument {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// When the manifest was expanded
    pub created_at: DateTime<Utc>,

    /// Layers the manifest was assembled from
    pub sources: Vec<ManifestSource>,

    /// Record fields in output order
    pub columns: Vec<String>,

    /// One record per directive name, in manifest order
    pub records: Vec<ResolvedRecord>,
}

impl InventoryDocument {
    pub fn new(records: Vec<ResolvedRecord>, sources: Vec<ManifestSource>) -> Self {
        let columns = columns(&records).into_iter().map(String::from).collect();
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            sources,
            columns,
            records,
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Serialize records as JSON Lines
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Render in the given format
    pub fn render(&self, format: OutputFormat) -> Result<String, InventoryError> {
        let rendered = match format {
            OutputFormat::Json => {
                let mut json = self.to_json()?;
                json.push('\n');
                json
            }
            OutputFormat::JsonLines => self.to_json_lines()?,
        };
        Ok(rendered)
    }

    /// Write to file atomically (write-then-rename)
    pub fn write_to_file(&self, path: &Path, format: OutputFormat) -> Result<(), InventoryError> {
        let rendered = self.render(format)?;
        let io_err = |source: io::Error| InventoryError::Io {
            path: path.to_path_buf(),
            source,
        };

        let parent = path.parent().unwrap_or_else(|| Path::new(""));
        let temp_path = parent.join(format!(".{}.tmp", uuid::Uuid::new_v4()));

        write_staged(&temp_path, |file| file.write_all(rendered.as_bytes())).map_err(io_err)?;
        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(io_err(e));
        }

        tracing::info!(path = %path.display(), records = self.records.len(), %format, "inventory written");
        Ok(())
    }
}

/// Create `temp_path` and fill it with `write`; the file is removed again if
/// any step fails.
fn write_staged<F>(temp_path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut fs::File) -> io::Result<()>,
{
    let result = fs::File::create(temp_path).and_then(|mut file| {
        write(&mut file)?;
        file.sync_all()
    });
    if result.is_err() {
        let _ = fs::remove_file(temp_path);
    }
    result
}
