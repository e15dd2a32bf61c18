//! In-memory model store for tests and ephemeral services.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;
use crate::storage::traits::{ModelStore, StorageError, check_name};

/// An in-memory model store. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryModelStore {
    bundles: Arc<RwLock<HashMap<String, Arc<[u8]>>>>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of bundles stored.
    pub fn len(&self) -> usize {
        self.bundles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.read().is_empty()
    }
}

impl ModelStore for MemoryModelStore {
    fn put(&self, name: &str, bytes: &[u8]) -> Result<()> {
        check_name(name)?;
        self.bundles.write().insert(name.to_string(), Arc::from(bytes));
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Vec<u8>> {
        self.bundles
            .read()
            .get(name)
            .map(|b| b.to_vec())
            .ok_or_else(|| StorageError::NotFound(name.to_string()).into())
    }

    fn exists(&self, name: &str) -> bool {
        self.bundles.read().contains_key(name)
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.bundles.write().remove(name);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.bundles.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn total_size(&self) -> Result<u64> {
        Ok(self.bundles.read().values().map(|b| b.len() as u64).sum())
    }
}
