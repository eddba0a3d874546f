//! Local persistence for Thermex integration state.
//!
//! This crate stores one JSON blob per key, which the integration uses to
//! keep each configured hood's runtime counter across restarts.
//!
//! # Features
//!
//! - File-backed store with atomic replace-on-write
//! - In-memory store for tests
//! - Versioned envelope around every blob
//!
//! # Example
//!
//! ```no_run
//! use thermex_store::Store;
//!
//! let store = Store::open_default()?;
//! store.save("thermex_entry1_runtime", &serde_json::json!({"runtime_hours": 0.0}))?;
//! let data = store.load("thermex_entry1_runtime")?;
//! # Ok::<(), thermex_store::Error>(())
//! ```

mod error;
mod models;
mod store;

pub use error::{Error, Result};
pub use models::{STORAGE_VERSION, StoredBlob};
pub use store::Store;

/// Default storage directory following platform conventions.
///
/// - Linux: `~/.local/share/thermex`
/// - macOS: `~/Library/Application Support/thermex`
/// - Windows: `C:\Users\<user>\AppData\Local\thermex`
pub fn default_store_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("thermex")
}
