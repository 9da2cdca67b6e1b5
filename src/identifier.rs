//! Per-object identifiers
//!
//! Every expanded object gets a fresh version-4 UUID that is embedded in its
//! workspace and archive paths, so repeated runs over the same manifest never
//! share a directory.

use rand::Rng;
use uuid::{Builder, Uuid};

/// Generate a random version-4 UUID from the supplied random source.
///
/// Drawing the bytes from `rng` instead of the process-global generator keeps
/// identifiers reproducible under a seeded source.
pub fn generate_identifier<R: Rng + ?Sized>(rng: &mut R) -> Uuid {
    let bytes: [u8; 16] = rng.gen();
    Builder::from_random_bytes(bytes).into_uuid()
}
