//! Blob storage for opaque model bundles.
//!
//! The training pipeline persists one bundle per model kind plus a JSON
//! manifest. Stores only see names and bytes.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::FileModelStore;
pub use memory::MemoryModelStore;
pub use traits::{ModelStore, StorageError};
