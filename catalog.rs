use std::path::{Path, PathBuf};

use crate::caption::{CaptionClient, CaptionProvider};
use crate::config::PromptCatalog;
use crate::discovery;
use crate::error::{Error, Result};
use crate::models::{BatchFailure, BatchSummary, EditOutcome, ImageRecord, TagsInput};
use crate::store::CatalogStore;

/// One item of a captioning batch.
#[derive(Debug, Clone)]
pub struct CaptionRequest {
    pub id: String,
    pub path: PathBuf,
}

/// The presentation-facing façade. Composes store, discovery and captioning
/// into user actions, and owns the optimistic-edit reconciliation rules: the
/// UI applies an edit locally, this layer confirms it against the store, and
/// on a persistence failure hands back the authoritative record so the UI
/// reverts instead of keeping divergent state.
pub struct Catalog<P> {
    store: CatalogStore,
    captions: CaptionClient<P>,
    prompts: PromptCatalog,
}

impl<P: CaptionProvider> Catalog<P> {
    pub fn new(store: CatalogStore, captions: CaptionClient<P>, prompts: PromptCatalog) -> Self {
        Self {
            store,
            captions,
            prompts,
        }
    }

    pub async fn list_all(&self) -> Vec<ImageRecord> {
        self.store.list_all().await
    }

    pub fn prompts(&self) -> &PromptCatalog {
        &self.prompts
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// Adds the user's selection to the catalog. Directories anywhere in the
    /// selection trigger a recursive discovery pass; a pure-file selection is
    /// taken as given, since the file picker already filtered by extension.
    /// Returns only the newly created records; zero new records is a normal
    /// outcome, not a failure.
    pub async fn add_from_selection(&self, paths: Vec<PathBuf>) -> Result<Vec<ImageRecord>> {
        let mut any_dir = false;
        for path in &paths {
            if let Ok(meta) = tokio::fs::metadata(path).await {
                if meta.is_dir() {
                    any_dir = true;
                    break;
                }
            }
        }

        let files = if any_dir {
            discovery::expand_selection(paths).await?
        } else {
            paths
        };

        let as_strings: Vec<String> = files
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();
        self.store.upsert_many(&as_strings).await
    }

    pub async fn update_description(&self, id: &str, text: &str) -> Result<EditOutcome> {
        match self.store.update_description(id, text).await {
            Ok(record) => Ok(EditOutcome::Applied { record }),
            Err(e @ Error::NotFound(_)) => Err(e),
            Err(e) => Ok(self.revert(id, e).await),
        }
    }

    pub async fn update_tags(&self, id: &str, input: TagsInput) -> Result<EditOutcome> {
        match self.store.update_tags(id, input).await {
            Ok(record) => Ok(EditOutcome::Applied { record }),
            Err(e @ Error::NotFound(_)) => Err(e),
            Err(e) => Ok(self.revert(id, e).await),
        }
    }

    /// Re-fetches the confirmed record after a failed write so the caller can
    /// overwrite its optimistic local value.
    async fn revert(&self, id: &str, cause: Error) -> EditOutcome {
        log::warn!("Write for {id} failed, reverting to stored state: {cause}");
        let record = self.store.get(id).await.ok();
        EditOutcome::Reverted {
            record,
            reason: cause.to_string(),
        }
    }

    pub async fn remove(&self, ids: &[String]) -> Result<usize> {
        self.store.remove(ids).await
    }

    /// Generate-then-persist as one logical unit: a captioning failure leaves
    /// the stored description untouched, and a caption that fails to persist
    /// is an error, never silently dropped.
    pub async fn describe_and_save(
        &self,
        id: &str,
        path: &Path,
        prompt_key: &str,
    ) -> Result<ImageRecord> {
        let prompt = self.prompts.resolve(prompt_key);
        let text = self.captions.describe(path, prompt).await?;
        self.store.update_description(id, &text).await
    }

    /// Strictly sequential batch captioning, one in-flight remote call at a
    /// time. A failed item is recorded and never aborts the rest.
    pub async fn describe_and_save_batch(
        &self,
        items: &[CaptionRequest],
        prompt_key: &str,
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for item in items {
            match self.describe_and_save(&item.id, &item.path, prompt_key).await {
                Ok(_) => summary.succeeded += 1,
                Err(e) => {
                    log::warn!("Batch caption failed for {}: {e}", item.path.display());
                    summary.failed.push(BatchFailure {
                        id: item.id.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }
        log::info!(
            "Caption batch finished: {} succeeded, {} failed",
            summary.succeeded,
            summary.failed.len()
        );
        summary
    }

    /// Raw byte read for thumbnail rendering in the shell.
    pub async fn read_image_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    /// Directory containing a record's file, for the shell to reveal.
    pub fn open_location(&self, path: &Path) -> Result<PathBuf> {
        path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .ok_or_else(|| Error::Selection(format!("{} has no parent folder", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::ImagePayload;
    use crate::config::RetryPolicy;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Replays provider outcomes in order across all calls; sequential batch
    /// processing makes the consumption order deterministic.
    #[derive(Clone, Default)]
    struct SeqProvider {
        script: Arc<Mutex<VecDeque<Result<String>>>>,
        calls: Arc<AtomicUsize>,
    }

    impl SeqProvider {
        fn push(&self, outcome: Result<String>) {
            self.script.lock().unwrap().push_back(outcome);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CaptionProvider for SeqProvider {
        async fn generate(&self, _prompt: &str, _payload: &ImagePayload) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::Transient("script exhausted".to_string())))
        }
    }

    async fn make_catalog(tmp: &tempfile::TempDir) -> (Catalog<SeqProvider>, SeqProvider) {
        let store = CatalogStore::open(tmp.path().join("db.json")).await.unwrap();
        let provider = SeqProvider::default();
        let catalog = Catalog::new(
            store,
            CaptionClient::new(provider.clone(), RetryPolicy::default()),
            PromptCatalog::default(),
        );
        (catalog, provider)
    }

    fn write_image(tmp: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = tmp.path().join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"bytes").unwrap();
        path
    }

    #[tokio::test]
    async fn add_from_selection_dedupes_file_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let (catalog, _) = make_catalog(&tmp).await;

        let added = catalog
            .add_from_selection(vec![
                PathBuf::from("/a/cat.jpg"),
                PathBuf::from("/a/cat.jpg"),
                PathBuf::from("/b/dog.png"),
            ])
            .await
            .unwrap();
        assert_eq!(added.len(), 2);

        let listed = catalog.list_all().await;
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|r| r.description.is_empty() && r.tags.is_empty()));
        assert_eq!(listed[0].folder_name, "a");
        assert_eq!(listed[1].folder_name, "b");

        // Re-adding the same selection is a zero-effect success.
        let again = catalog
            .add_from_selection(vec![PathBuf::from("/a/cat.jpg")])
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn add_from_selection_scans_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let (catalog, _) = make_catalog(&tmp).await;
        let pics = tmp.path().join("pics");
        write_image(&tmp, "pics/a.jpg");
        write_image(&tmp, "pics/nested/b.png");
        write_image(&tmp, "pics/skip.txt");

        let added = catalog.add_from_selection(vec![pics]).await.unwrap();
        assert_eq!(added.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn describe_and_save_retries_then_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let (catalog, provider) = make_catalog(&tmp).await;
        let image = write_image(&tmp, "a/cat.jpg");

        let added = catalog
            .add_from_selection(vec![image.clone()])
            .await
            .unwrap();
        let id = added[0].id.clone();
        let t0 = added[0].last_updated;

        provider.push(Err(Error::Transient("flaky".to_string())));
        provider.push(Err(Error::Transient("flaky".to_string())));
        provider.push(Ok("a cat".to_string()));

        let record = catalog.describe_and_save(&id, &image, "basic").await.unwrap();
        assert_eq!(record.description, "a cat");
        assert!(record.last_updated >= t0);
        assert_eq!(provider.calls(), 3);

        let listed = catalog.list_all().await;
        assert_eq!(listed[0].description, "a cat");
    }

    #[tokio::test(start_paused = true)]
    async fn captioning_failure_leaves_description_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let (catalog, provider) = make_catalog(&tmp).await;
        let image = write_image(&tmp, "a/cat.jpg");
        let added = catalog.add_from_selection(vec![image.clone()]).await.unwrap();
        let id = added[0].id.clone();

        for _ in 0..5 {
            provider.push(Err(Error::Transient("down".to_string())));
        }
        let err = catalog.describe_and_save(&id, &image, "basic").await.unwrap_err();
        assert!(matches!(err, Error::RemoteCallFailed(_)));

        assert_eq!(catalog.list_all().await[0].description, "");
    }

    #[tokio::test(start_paused = true)]
    async fn batch_failures_do_not_abort_remaining_items() {
        let tmp = tempfile::tempdir().unwrap();
        let (catalog, provider) = make_catalog(&tmp).await;
        let bad = write_image(&tmp, "a/bad.jpg");
        let good = write_image(&tmp, "a/good.jpg");
        let added = catalog
            .add_from_selection(vec![bad.clone(), good.clone()])
            .await
            .unwrap();

        // First item exhausts its retry budget, second succeeds immediately.
        for _ in 0..5 {
            provider.push(Err(Error::Transient("down".to_string())));
        }
        provider.push(Ok("a good image".to_string()));

        let items = vec![
            CaptionRequest {
                id: added[0].id.clone(),
                path: bad,
            },
            CaptionRequest {
                id: added[1].id.clone(),
                path: good,
            },
        ];
        let summary = catalog.describe_and_save_batch(&items, "basic").await;

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.total(), items.len());
        assert_eq!(summary.failed[0].id, items[0].id);

        let listed = catalog.list_all().await;
        assert_eq!(listed[0].description, "");
        assert_eq!(listed[1].description, "a good image");
    }

    #[tokio::test]
    async fn failed_write_reverts_to_authoritative_record() {
        let tmp = tempfile::tempdir().unwrap();
        let (catalog, _) = make_catalog(&tmp).await;
        let added = catalog
            .add_from_selection(vec![PathBuf::from("/a/cat.jpg")])
            .await
            .unwrap();
        let id = added[0].id.clone();
        catalog.update_description(&id, "first").await.unwrap();

        // Occupy the temp-file slot with a directory so the next write fails
        // while reads keep working.
        std::fs::create_dir(tmp.path().join("db.json.tmp")).unwrap();

        let outcome = catalog.update_description(&id, "second").await.unwrap();
        match outcome {
            EditOutcome::Reverted { record, reason } => {
                assert_eq!(record.unwrap().description, "first");
                assert!(!reason.is_empty());
            }
            other => panic!("expected Reverted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_id_propagates_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let (catalog, _) = make_catalog(&tmp).await;
        let err = catalog.update_description("missing", "x").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn open_location_returns_containing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let (catalog, _) = make_catalog(&tmp).await;
        let dir = catalog.open_location(Path::new("/a/b/cat.jpg")).unwrap();
        assert_eq!(dir, PathBuf::from("/a/b"));

        assert!(catalog.open_location(Path::new("cat.jpg")).is_err());
    }

    #[tokio::test]
    async fn read_image_bytes_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let (catalog, _) = make_catalog(&tmp).await;
        let image = write_image(&tmp, "a/cat.jpg");
        let bytes = catalog.read_image_bytes(&image).await.unwrap();
        assert_eq!(bytes, b"bytes");
    }
}
