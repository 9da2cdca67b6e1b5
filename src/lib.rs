//! Archive Manifest - archival inventory expansion
//!
//! This crate expands a declarative archival manifest (a batch of named
//! objects plus shared archival policy) into one resolved inventory record per
//! object: where to retrieve it, where to stage and compress it, and whether it
//! belongs to the post-compression verification sample.

pub mod expand;
pub mod identifier;
pub mod inventory;
pub mod manifest;
pub mod paths;
pub mod sample;

pub use expand::{ExpandError, Expander, ResolvedRecord, VerificationTarget};
pub use inventory::{InventoryDocument, InventoryError, OutputFormat};
pub use manifest::{
    load_layered, validate, DocumentFormat, LoadedManifest, Manifest, ManifestError, Override,
    ValidationFailure, ValidationIssue,
};
pub use paths::{PathError, RetrievalMethod};
pub use sample::{select_sample, SampleDirective, SampleError};
