//! File-based model store.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, XiphosError};
use crate::storage::traits::{ModelStore, StorageError, check_name};

/// A model store keeping one file per bundle in a directory.
///
/// Writes go to a uniquely named temporary file which is synced and then
/// renamed over the target, so a bundle is replaced atomically.
#[derive(Debug, Clone)]
pub struct FileModelStore {
    /// The root directory for bundles.
    directory: PathBuf,
}

impl FileModelStore {
    /// Create a store in the given directory, creating it if needed.
    pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();

        if !directory.exists() {
            fs::create_dir_all(&directory).map_err(|e| {
                XiphosError::persistence(format!(
                    "Failed to create directory {}: {e}",
                    directory.display()
                ))
            })?;
        }

        if !directory.is_dir() {
            return Err(XiphosError::persistence(format!(
                "Path is not a directory: {}",
                directory.display()
            )));
        }

        Ok(FileModelStore { directory })
    }

    /// Open an existing directory without creating it.
    pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        if !directory.is_dir() {
            return Err(XiphosError::persistence(format!(
                "Model directory does not exist: {}",
                directory.display()
            )));
        }
        Ok(FileModelStore { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }
}

impl ModelStore for FileModelStore {
    fn put(&self, name: &str, bytes: &[u8]) -> Result<()> {
        check_name(name)?;

        let temp_path = self
            .directory
            .join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()));
        let write = || -> std::io::Result<()> {
            let mut file = File::create(&temp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&temp_path, self.file_path(name))
        };

        if let Err(e) = write() {
            let _ = fs::remove_file(&temp_path);
            return Err(StorageError::IoError(format!("Failed to write {name}: {e}")).into());
        }
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Vec<u8>> {
        check_name(name)?;
        fs::read(self.file_path(name)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(name.to_string()).into()
            } else {
                StorageError::IoError(e.to_string()).into()
            }
        })
    }

    fn exists(&self, name: &str) -> bool {
        check_name(name).is_ok() && self.file_path(name).is_file()
    }

    fn delete(&self, name: &str) -> Result<()> {
        check_name(name)?;
        let path = self.file_path(name);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| StorageError::IoError(format!("Failed to delete {name}: {e}")))?;
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.directory).map_err(|e| StorageError::IoError(e.to_string()))? {
            let entry = entry.map_err(|e| StorageError::IoError(e.to_string()))?;
            let path = entry.path();

            if path.is_file()
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
                && !name.starts_with('.')
            {
                names.push(name.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    fn total_size(&self) -> Result<u64> {
        let mut total = 0;
        for name in self.list()? {
            total += fs::metadata(self.file_path(&name))
                .map_err(|e| StorageError::IoError(e.to_string()))?
                .len();
        }
        Ok(total)
    }
}
