//! Calculator Vault - Vault Directory
//!
//! Owns the ciphertext directory and the cache directory used for
//! temporarily revealed plaintext.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use crate::error::{VaultError, VaultResult};

/// Marker asking the media indexer to skip the directory
pub const NOMEDIA: &str = ".nomedia";

/// Ciphertext blob extension
pub const BLOB_EXT: &str = "enc";

/// Overwrite chunk for secure delete
const WIPE_CHUNK: usize = 1024 * 1024;

/// Vault directory handler
pub struct VaultDirectory {
    root: PathBuf,
    cache: PathBuf,
}

impl VaultDirectory {
    pub fn new(root: &Path, cache: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            cache: cache.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cache(&self) -> &Path {
        &self.cache
    }

    /// Create the directory and its `.nomedia` marker if the directory is missing
    pub fn ensure_initialized(&self) -> VaultResult<()> {
        if self.root.exists() {
            return Ok(());
        }

        fs::create_dir_all(&self.root)
            .map_err(|e| VaultError::Storage(format!("cannot create vault directory: {}", e)))?;
        File::create(self.root.join(NOMEDIA))
            .map_err(|e| VaultError::Storage(format!("cannot create media marker: {}", e)))?;

        log::info!("Vault directory initialized");
        Ok(())
    }

    /// Fresh, unused blob path inside the vault
    pub fn new_blob_path(&self) -> PathBuf {
        self.root.join(format!("{}.{}", Uuid::new_v4(), BLOB_EXT))
    }

    /// Write via temp file + rename
    pub fn write_atomic(&self, path: &Path, data: &[u8]) -> VaultResult<()> {
        self.check_inside(path, &[self.root.as_path()])?;

        let temp_path = path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;

        if let Err(e) = file.write_all(data).and_then(|_| file.sync_all()) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        fs::rename(&temp_path, path)?;
        Ok(())
    }

    pub fn read(&self, path: &Path) -> VaultResult<Vec<u8>> {
        if !path.exists() {
            return Err(VaultError::EntryNotFound(file_name(path)));
        }

        let mut file = File::open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Zero-overwrite then unlink. A missing file is fine.
    pub fn secure_delete(&self, path: &Path) -> VaultResult<()> {
        self.check_inside(path, &[self.root.as_path(), self.cache.as_path()])?;

        if !path.exists() {
            return Ok(());
        }

        let size = fs::metadata(path)?.len() as usize;
        if size > 0 {
            let mut file = OpenOptions::new().write(true).open(path)?;
            let zeros = vec![0u8; size.min(WIPE_CHUNK)];
            let mut remaining = size;
            while remaining > 0 {
                let n = remaining.min(zeros.len());
                file.write_all(&zeros[..n])?;
                remaining -= n;
            }
            file.sync_all()?;
        }

        fs::remove_file(path)?;
        Ok(())
    }

    /// Write decrypted content to the cache directory
    pub fn write_revealed(&self, extension: Option<&str>, data: &[u8]) -> VaultResult<PathBuf> {
        fs::create_dir_all(&self.cache)?;

        let name = match extension {
            Some(ext) if !ext.is_empty() => format!("{}.{}", Uuid::new_v4(), ext),
            _ => Uuid::new_v4().to_string(),
        };
        let path = self.cache.join(name);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(data)?;
        file.sync_all()?;

        Ok(path)
    }

    /// Wipe every revealed file. Returns how many were removed.
    pub fn purge_revealed(&self) -> VaultResult<usize> {
        if !self.cache.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&self.cache)? {
            let path = entry?.path();
            if path.is_file() {
                self.secure_delete(&path)?;
                removed += 1;
            }
        }

        if removed > 0 {
            log::info!("Purged {} revealed file(s)", removed);
        }
        Ok(removed)
    }

    /// Every blob currently in the vault directory
    pub fn list_blobs(&self) -> VaultResult<Vec<PathBuf>> {
        let mut blobs = Vec::new();
        if !self.root.exists() {
            return Ok(blobs);
        }

        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_file() && path.extension().map_or(false, |e| e == BLOB_EXT) {
                blobs.push(path);
            }
        }
        blobs.sort();
        Ok(blobs)
    }

    /// Total bytes held in the vault directory
    pub fn total_size(&self) -> VaultResult<u64> {
        let mut size = 0;
        for blob in self.list_blobs()? {
            size += fs::metadata(&blob)?.len();
        }
        Ok(size)
    }

    fn check_inside(&self, path: &Path, dirs: &[&Path]) -> VaultResult<()> {
        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if escapes || !dirs.iter().any(|dir| path.starts_with(dir)) {
            return Err(VaultError::Storage(format!(
                "path outside the vault: {}",
                file_name(path)
            )));
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn vault_dir(base: &Path) -> VaultDirectory {
        VaultDirectory::new(&base.join("vault"), &base.join("cache"))
    }

    #[test]
    fn test_ensure_initialized_creates_marker_once() {
        let dir = tempdir().unwrap();
        let vd = vault_dir(dir.path());

        vd.ensure_initialized().unwrap();
        let marker = vd.root().join(NOMEDIA);
        assert!(marker.exists());
        assert_eq!(fs::metadata(&marker).unwrap().len(), 0);

        // Existing directory is left alone, marker is not recreated
        fs::remove_file(&marker).unwrap();
        vd.ensure_initialized().unwrap();
        assert!(!marker.exists());
    }

    #[test]
    fn test_ensure_initialized_reports_storage_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"file, not a dir").unwrap();

        let vd = VaultDirectory::new(&blocker.join("vault"), &dir.path().join("cache"));
        assert!(matches!(vd.ensure_initialized(), Err(VaultError::Storage(_))));
    }

    #[test]
    fn test_write_read_delete() {
        let dir = tempdir().unwrap();
        let vd = vault_dir(dir.path());
        vd.ensure_initialized().unwrap();

        let path = vd.new_blob_path();
        assert_ne!(path, vd.new_blob_path());

        vd.write_atomic(&path, b"ciphertext").unwrap();
        assert_eq!(vd.read(&path).unwrap(), b"ciphertext");
        assert!(!path.with_extension("tmp").exists());
        assert_eq!(vd.list_blobs().unwrap(), vec![path.clone()]);
        assert_eq!(vd.total_size().unwrap(), 10);

        vd.secure_delete(&path).unwrap();
        assert!(!path.exists());
        vd.secure_delete(&path).unwrap();
        assert!(matches!(vd.read(&path), Err(VaultError::EntryNotFound(_))));
    }

    #[test]
    fn test_refuses_paths_outside() {
        let dir = tempdir().unwrap();
        let vd = vault_dir(dir.path());
        vd.ensure_initialized().unwrap();

        let outside = dir.path().join("important.txt");
        fs::write(&outside, b"keep me").unwrap();

        assert!(vd.secure_delete(&outside).is_err());
        assert!(vd.write_atomic(&outside, b"x").is_err());
        let sneaky = vd.root().join("..").join("important.txt");
        assert!(vd.secure_delete(&sneaky).is_err());
        assert_eq!(fs::read(&outside).unwrap(), b"keep me");
    }

    #[test]
    fn test_revealed_files_are_purged() {
        let dir = tempdir().unwrap();
        let vd = vault_dir(dir.path());
        assert_eq!(vd.purge_revealed().unwrap(), 0);

        let a = vd.write_revealed(Some("jpg"), b"plain").unwrap();
        let b = vd.write_revealed(None, b"plain").unwrap();
        assert!(a.starts_with(vd.cache()));
        assert_eq!(a.extension().unwrap(), "jpg");
        assert_eq!(fs::read(&b).unwrap(), b"plain");

        assert_eq!(vd.purge_revealed().unwrap(), 2);
        assert!(!a.exists());
        assert!(!b.exists());
    }
}
