//! Postcard-based store snapshots with versioned envelopes.
//!
//! `InMemoryStore::snapshot` writes every record through this module and
//! `InMemoryStore::restore` reads them back.
//!
//! # Format
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│VERSION (varint) │POSTCARD PAYLOAD (N bytes)│
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "DIRY"              u32                postcard::to_allocvec(T)
//! ```
//!
//! Magic and version are checked on every read. A snapshot from another
//! schema version is refused rather than migrated.
//!
//! # Example
//!
//! ```rust
//! use diary_kit::serialization::{read_snapshot, write_snapshot};
//! use diary_kit::model::Customer;
//!
//! # fn main() -> diary_kit::Result<()> {
//! let customers = vec![Customer::new("Alice")];
//! let bytes = write_snapshot(&customers)?;
//!
//! let restored: Vec<Customer> = read_snapshot(&bytes)?;
//! assert_eq!(restored, customers);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Magic header for diary snapshots: b"DIRY"
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"DIRY";

/// Current snapshot schema version.
///
/// Increment when a stored model type changes shape (fields added, removed,
/// reordered or retyped; enum variants changed).
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope around a snapshot payload.
///
/// # Example
///
/// ```rust
/// use diary_kit::serialization::SnapshotEnvelope;
///
/// let envelope = SnapshotEnvelope::new("data");
/// assert_eq!(envelope.magic, *b"DIRY");
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SnapshotEnvelope<T> {
    /// Magic header: must be b"DIRY"
    pub magic: [u8; 4],
    /// Schema version: must match SNAPSHOT_SCHEMA_VERSION
    pub version: u32,
    /// The snapshot contents
    pub payload: T,
}

impl<T> SnapshotEnvelope<T> {
    /// Create a new envelope with current magic and version.
    pub fn new(payload: T) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_SCHEMA_VERSION,
            payload,
        }
    }

    /// Refuse envelopes written by something else or by another schema.
    ///
    /// # Errors
    /// - `Error::InvalidSnapshot` if the magic is not `b"DIRY"`
    /// - `Error::VersionMismatch` if the schema version differs
    pub fn check(&self) -> Result<()> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(Error::InvalidSnapshot(format!(
                "not a diary snapshot (magic {:?})",
                self.magic
            )));
        }
        if self.version != SNAPSHOT_SCHEMA_VERSION {
            return Err(Error::VersionMismatch {
                expected: SNAPSHOT_SCHEMA_VERSION,
                found: self.version,
            });
        }
        Ok(())
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}

/// Wrap `value` in an envelope and encode it.
///
/// # Errors
/// Returns `Error::SerializationError` if encoding fails
pub fn write_snapshot<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    postcard::to_allocvec(&SnapshotEnvelope::new(value))
        .map_err(|e| Error::SerializationError(e.to_string()))
}

/// Decode an envelope and return its payload once the header checks out.
///
/// # Errors
/// - `Error::DeserializationError` for truncated or corrupt bytes
/// - `Error::InvalidSnapshot` / `Error::VersionMismatch` from
///   [`SnapshotEnvelope::check`]
pub fn read_snapshot<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T> {
    let envelope: SnapshotEnvelope<T> = postcard::from_bytes(bytes)?;
    if let Err(e) = envelope.check() {
        warn!("Refusing snapshot: {}", e);
        return Err(e);
    }
    Ok(envelope.into_payload())
}
