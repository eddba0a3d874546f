//! On-disk representation of stored blobs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Current envelope version written by [`crate::Store::save`].
pub const STORAGE_VERSION: u32 = 1;

/// Versioned wrapper around a stored JSON blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredBlob {
    /// Envelope format version.
    pub version: u32,
    /// Key the blob was saved under.
    pub key: String,
    /// When the blob was last written.
    #[serde(with = "time::serde::rfc3339")]
    pub saved_at: OffsetDateTime,
    /// The caller's data.
    pub data: Value,
}

impl StoredBlob {
    /// Wrap `data` in a current-version envelope stamped with the current time.
    pub fn new(key: &str, data: Value) -> Self {
        Self {
            version: STORAGE_VERSION,
            key: key.to_string(),
            saved_at: OffsetDateTime::now_utc(),
            data,
        }
    }
}
