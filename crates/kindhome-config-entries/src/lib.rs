//! Config Entries
//!
//! Persisted configuration records for set-up devices. A [`ConfigEntry`]
//! is what a successful setup flow writes out; [`ConfigEntries`] holds all
//! of them, indexed so flows can refuse to configure the same device twice.
//!
//! # Storage
//!
//! Entries live in `.storage/core.config_entries` as versioned JSON,
//! written atomically after every mutation.

pub mod entry;
pub mod manager;
pub mod storage;

// Re-export main types
pub use entry::{ConfigEntry, ConfigEntrySource};

pub use manager::{
    ConfigEntries, ConfigEntriesData, ConfigEntriesError, ConfigEntriesResult, STORAGE_KEY,
    STORAGE_MINOR_VERSION, STORAGE_VERSION,
};

pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};
