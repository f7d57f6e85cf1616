//! Calculator Vault - File Metadata Store
//!
//! The whole listing is one JSON array under `@vault_files`. Every mutation
//! rewrites the array, so mutations run under a single-writer lock.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{VaultError, VaultResult};
use crate::store::KeyValueStore;

/// Key holding the serialized listing
pub const FILES_KEY: &str = "@vault_files";

/// Display category derived from the MIME type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Photos,
    Videos,
    Documents,
}

impl Category {
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type.starts_with("image/") {
            Category::Photos
        } else if mime_type.starts_with("video/") {
            Category::Videos
        } else {
            Category::Documents
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Photos => "Photos",
            Category::Videos => "Videos",
            Category::Documents => "Documents",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "photos" => Ok(Category::Photos),
            "videos" => Ok(Category::Videos),
            "documents" => Ok(Category::Documents),
            other => Err(VaultError::Config(format!("unknown category: {}", other))),
        }
    }
}

/// One stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    #[serde(rename = "encPath")]
    pub ciphertext_path: PathBuf,
    #[serde(rename = "originalUri", default, skip_serializing_if = "Option::is_none")]
    pub original_uri: Option<String>,
    #[serde(rename = "addedAt", default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

impl VaultEntry {
    pub fn category(&self) -> Category {
        Category::from_mime(&self.mime_type)
    }
}

/// Ordered listing of vault entries
pub struct MetadataStore {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl MetadataStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    /// All entries in insertion order
    pub fn list(&self) -> VaultResult<Vec<VaultEntry>> {
        match self.kv.get(FILES_KEY)? {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| VaultError::MetadataCorrupted(e.to_string())),
        }
    }

    pub fn get(&self, id: &str) -> VaultResult<Option<VaultEntry>> {
        Ok(self.list()?.into_iter().find(|e| e.id == id))
    }

    /// Append a new entry with a fresh id
    pub fn add(
        &self,
        name: &str,
        mime_type: &str,
        ciphertext_path: PathBuf,
        original_uri: Option<String>,
    ) -> VaultResult<VaultEntry> {
        let _guard = self.write_lock.lock();

        let mut entries = self.list()?;
        let entry = VaultEntry {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            ciphertext_path,
            original_uri,
            added_at: Some(Utc::now()),
        };
        entries.push(entry.clone());
        self.persist(&entries)?;

        log::debug!("Metadata entry added ({} total)", entries.len());
        Ok(entry)
    }

    /// Remove an entry. Unknown ids are ignored.
    pub fn delete(&self, id: &str) -> VaultResult<()> {
        let _guard = self.write_lock.lock();

        let mut entries = self.list()?;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Ok(());
        }
        self.persist(&entries)
    }

    /// Rewrite ciphertext paths in one write
    pub(crate) fn relocate(&self, moves: &[(String, PathBuf)]) -> VaultResult<()> {
        let _guard = self.write_lock.lock();

        let mut entries = self.list()?;
        for entry in entries.iter_mut() {
            if let Some((_, path)) = moves.iter().find(|(id, _)| *id == entry.id) {
                entry.ciphertext_path = path.clone();
            }
        }
        self.persist(&entries)
    }

    fn persist(&self, entries: &[VaultEntry]) -> VaultResult<()> {
        let raw = serde_json::to_string(entries)
            .map_err(|e| VaultError::Persistence(e.to_string()))?;
        self.kv
            .set(FILES_KEY, &raw)
            .map_err(|e| VaultError::Persistence(e.to_string()))
    }
}
