//! File-backed backing store.
//!
//! One file per key under a root directory; slashes in keys map to
//! subdirectories (`items/<uuid>` lives at `<root>/items/<uuid>`). Writes
//! go to a temporary sibling first and are published with a rename, which
//! is atomic on the filesystems this crate targets.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::{BackingStore, StoreError, StoreResult};

/// File-backed [`BackingStore`] rooted at a directory.
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .map_err(|err| StoreError::io(format!("create {}", root.display()), err))?;
        Ok(Self { root })
    }

    /// Returns the root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        if key.is_empty() {
            return Err(StoreError::backend("empty key"));
        }
        let mut path = self.root.clone();
        for part in key.split('/') {
            if part.is_empty() || part == "." || part == ".." {
                return Err(StoreError::backend(format!("invalid key: {key}")));
            }
            path.push(part);
        }
        Ok(path)
    }

    fn collect_keys(dir: &Path, prefix: &str, out: &mut Vec<String>) -> StoreResult<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(StoreError::io(format!("read {}", dir.display()), err)),
        };
        for entry in entries {
            let entry =
                entry.map_err(|err| StoreError::io(format!("read {}", dir.display()), err))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(".tmp-") {
                continue;
            }
            let child_key = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{prefix}/{name}")
            };
            let file_type = entry
                .file_type()
                .map_err(|err| StoreError::io(format!("stat {child_key}"), err))?;
            if file_type.is_dir() {
                Self::collect_keys(&entry.path(), &child_key, out)?;
            } else {
                out.push(child_key);
            }
        }
        Ok(())
    }
}

impl BackingStore for FsStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::io(format!("read {key}"), err)),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let path = self.path_for(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::backend(format!("invalid key: {key}")))?;
        fs::create_dir_all(parent)
            .map_err(|err| StoreError::io(format!("create {}", parent.display()), err))?;

        let tmp = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let result = (|| {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result.map_err(|err| StoreError::io(format!("write {key}"), err))
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io(format!("delete {key}"), err)),
        }
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut out = Vec::new();
        Self::collect_keys(&self.root, "", &mut out)?;
        Ok(out)
    }

    fn clear(&self) -> StoreResult<()> {
        for key in self.keys()? {
            self.delete(&key)?;
        }
        Ok(())
    }
}
