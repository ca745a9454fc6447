use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::models::{CatalogDocument, ImageRecord, TagsInput};

/// Durable CRUD over [`ImageRecord`]s, backed by a single JSON document.
///
/// Every operation re-reads the document, applies its change and writes the
/// whole document back in one atomic replace, so a failed write never leaves
/// a partially applied batch on disk. The internal mutex serializes the
/// read-modify-write cycle; there is a single logical writer per process.
#[derive(Debug)]
pub struct CatalogStore {
    db_path: PathBuf,
    lock: Mutex<()>,
}

impl CatalogStore {
    /// Opens the backing document, creating parent directories and seeding an
    /// empty collection when the file is absent. An unreadable location or
    /// unrecoverably malformed document is fatal: the host must not open any
    /// interface until this succeeds.
    pub async fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        log::info!("Catalog store path: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::StoreInit(format!("cannot create {}: {e}", parent.display())))?;
        }

        let store = Self {
            db_path,
            lock: Mutex::new(()),
        };

        match tokio::fs::read(&store.db_path).await {
            Ok(bytes) if !bytes.is_empty() => {
                serde_json::from_slice::<CatalogDocument>(&bytes).map_err(|e| {
                    Error::StoreInit(format!(
                        "malformed document at {}: {e}",
                        store.db_path.display()
                    ))
                })?;
            }
            Ok(_) => {
                store
                    .write_document(&CatalogDocument::default())
                    .await
                    .map_err(|e| Error::StoreInit(e.to_string()))?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                store
                    .write_document(&CatalogDocument::default())
                    .await
                    .map_err(|e| Error::StoreInit(e.to_string()))?;
                log::info!("Seeded empty catalog at {}", store.db_path.display());
            }
            Err(e) => {
                return Err(Error::StoreInit(format!(
                    "cannot read {}: {e}",
                    store.db_path.display()
                )))
            }
        }

        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn read_document(&self) -> Result<CatalogDocument> {
        let bytes = match tokio::fs::read(&self.db_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CatalogDocument::default()),
            Err(e) => return Err(e.into()),
        };
        if bytes.is_empty() {
            return Ok(CatalogDocument::default());
        }
        let mut doc: CatalogDocument = serde_json::from_slice(&bytes)?;
        for record in &mut doc.images {
            record.migrate();
        }
        Ok(doc)
    }

    /// Writes via a temp file in the same directory plus rename, so readers
    /// never observe a torn document.
    async fn write_document(&self, doc: &CatalogDocument) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(doc)?;
        let tmp_path = self.db_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| Error::Persistence(format!("write {}: {e}", tmp_path.display())))?;
        tokio::fs::rename(&tmp_path, &self.db_path)
            .await
            .map_err(|e| Error::Persistence(format!("rename into {}: {e}", self.db_path.display())))?;
        Ok(())
    }

    /// Every stored record, migrated to the current shape. Never fails: a
    /// read failure is logged and degrades to an empty collection.
    pub async fn list_all(&self) -> Vec<ImageRecord> {
        let _guard = self.lock.lock().await;
        match self.read_document().await {
            Ok(doc) => doc.images,
            Err(e) => {
                log::warn!("Failed to read catalog, returning empty collection: {e}");
                Vec::new()
            }
        }
    }

    /// Authoritative single-record fetch, used for revert-on-failure.
    pub async fn get(&self, id: &str) -> Result<ImageRecord> {
        let _guard = self.lock.lock().await;
        let doc = self.read_document().await?;
        doc.images
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Creates a record for every path not already present, by exact string
    /// match against stored paths and against earlier paths in the same
    /// batch. Existing paths are skipped silently; the whole batch persists
    /// in one write. Returns only the newly created records.
    pub async fn upsert_many(&self, paths: &[String]) -> Result<Vec<ImageRecord>> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;

        let mut seen: HashSet<String> = doc.images.iter().map(|r| r.path.clone()).collect();
        let mut created = Vec::new();
        for path in paths {
            if seen.contains(path) {
                log::debug!("Skipped existing image: {path}");
                continue;
            }
            let record = ImageRecord::new(path);
            seen.insert(path.clone());
            doc.images.push(record.clone());
            created.push(record);
        }

        if !created.is_empty() {
            self.write_document(&doc).await?;
            log::info!("Added {} new image(s) to the catalog", created.len());
        }
        Ok(created)
    }

    /// Overwrites the description and bumps `last_updated`. Saving the value
    /// already stored is a no-op that leaves `last_updated` untouched.
    pub async fn update_description(&self, id: &str, text: &str) -> Result<ImageRecord> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;
        let record = doc
            .images
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if record.description == text {
            log::debug!("Description for {id} unchanged, skipped write");
            return Ok(record.clone());
        }

        record.description = text.to_string();
        record.last_updated = Utc::now();
        let updated = record.clone();
        self.write_document(&doc).await?;
        Ok(updated)
    }

    /// Normalizes the input and writes only when the normalized tags differ
    /// from what is stored.
    pub async fn update_tags(&self, id: &str, input: TagsInput) -> Result<ImageRecord> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;
        let record = doc
            .images
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let tags = input.normalize();
        if record.tags == tags {
            log::debug!("Tags for {id} unchanged, skipped write");
            return Ok(record.clone());
        }

        record.tags = tags;
        record.last_updated = Utc::now();
        let updated = record.clone();
        self.write_document(&doc).await?;
        Ok(updated)
    }

    /// Removes all matching records in one durable write and returns the
    /// count actually removed. Unknown ids are skipped, not errors.
    pub async fn remove(&self, ids: &[String]) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut doc = self.read_document().await?;

        let targets: HashSet<&str> = ids.iter().map(|s| s.as_str()).collect();
        let before = doc.images.len();
        doc.images.retain(|r| !targets.contains(r.id.as_str()));
        let removed = before - doc.images.len();

        if removed > 0 {
            self.write_document(&doc).await?;
            log::info!("Removed {removed} image(s) from the catalog");
        }
        Ok(removed)
    }
}
