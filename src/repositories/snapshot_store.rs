use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::errors::AppResult;
use crate::models::EpgSnapshot;

/// Whole-snapshot persistence keyed by provider id
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the current snapshot for a provider
    ///
    /// # Returns
    ///
    /// * `Ok(Some(snapshot))` - A snapshot has been saved before
    /// * `Ok(None)` - Nothing stored for this provider
    async fn load(&self, provider_id: &str) -> AppResult<Option<EpgSnapshot>>;

    /// Replace the provider's snapshot
    async fn save(&self, snapshot: &EpgSnapshot) -> AppResult<()>;

    /// Remove the provider's snapshot, returning whether one existed
    async fn delete(&self, provider_id: &str) -> AppResult<bool>;

    /// Store the diagnostic report of the provider's latest merge run
    async fn write_report(&self, provider_id: &str, lines: &[String]) -> AppResult<()>;
}

/// JSON files under `<data_dir>/epg/`
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    epg_dir: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            epg_dir: data_dir.as_ref().join("epg"),
        }
    }

    pub fn snapshot_path(&self, provider_id: &str) -> PathBuf {
        self.epg_dir
            .join(format!("epg_{}.json", file_safe(provider_id)))
    }

    pub fn report_path(&self, provider_id: &str) -> PathBuf {
        self.epg_dir
            .join(format!("epg_report_{}.txt", file_safe(provider_id)))
    }

    /// Write through a temporary file so readers never see a partial snapshot
    async fn write_atomic(&self, path: &Path, contents: &[u8]) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.epg_dir).await?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

/// Reversible file name form of a provider id: ASCII letters, digits and
/// `-` are kept, every other byte becomes `_XX` (uppercase hex), so distinct
/// ids never share a file.
fn file_safe(provider_id: &str) -> String {
    let mut safe = String::with_capacity(provider_id.len());
    for byte in provider_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            safe.push(char::from(byte));
        } else {
            safe.push_str(&format!("_{byte:02X}"));
        }
    }
    safe
}

#[async_trait]
impl SnapshotStore for JsonSnapshotStore {
    async fn load(&self, provider_id: &str) -> AppResult<Option<EpgSnapshot>> {
        let path = self.snapshot_path(provider_id);
        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: EpgSnapshot = serde_json::from_slice(&contents)?;
        if snapshot.provider_id != provider_id {
            warn!(
                "Ignoring {}: holds provider '{}', expected '{}'",
                path.display(),
                snapshot.provider_id,
                provider_id
            );
            return Ok(None);
        }
        debug!(
            "Loaded snapshot {} for provider '{}' ({} programmes)",
            snapshot.id,
            provider_id,
            snapshot.programs.len()
        );
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &EpgSnapshot) -> AppResult<()> {
        let path = self.snapshot_path(&snapshot.provider_id);
        let contents = serde_json::to_vec(snapshot)?;
        self.write_atomic(&path, &contents).await?;
        info!(
            "Saved snapshot {} for provider '{}' to {}",
            snapshot.id,
            snapshot.provider_id,
            path.display()
        );
        Ok(())
    }

    async fn delete(&self, provider_id: &str) -> AppResult<bool> {
        match tokio::fs::remove_file(self.snapshot_path(provider_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_report(&self, provider_id: &str, lines: &[String]) -> AppResult<()> {
        let mut contents = lines.join("\n");
        contents.push('\n');
        self.write_atomic(&self.report_path(provider_id), contents.as_bytes())
            .await
    }
}

/// Process-local store, used by tests and one-shot CLI runs
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<HashMap<String, EpgSnapshot>>,
    reports: RwLock<HashMap<String, Vec<String>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last report written for a provider
    pub async fn report(&self, provider_id: &str) -> Option<Vec<String>> {
        self.reports.read().await.get(provider_id).cloned()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self, provider_id: &str) -> AppResult<Option<EpgSnapshot>> {
        Ok(self.snapshots.read().await.get(provider_id).cloned())
    }

    async fn save(&self, snapshot: &EpgSnapshot) -> AppResult<()> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.provider_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn delete(&self, provider_id: &str) -> AppResult<bool> {
        Ok(self.snapshots.write().await.remove(provider_id).is_some())
    }

    async fn write_report(&self, provider_id: &str, lines: &[String]) -> AppResult<()> {
        self.reports
            .write()
            .await
            .insert(provider_id.to_string(), lines.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_file_safe() {
        let store = JsonSnapshotStore::new("/data");
        assert_eq!(
            store.snapshot_path("prov/1 a"),
            PathBuf::from("/data/epg/epg_prov_2F1_20a.json")
        );
        assert_eq!(
            store.report_path("p-1"),
            PathBuf::from("/data/epg/epg_report_p-1.txt")
        );
    }

    #[tokio::test]
    async fn test_similar_ids_do_not_share_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path());

        assert_ne!(store.snapshot_path("p/1"), store.snapshot_path("p_1"));
        assert_ne!(store.report_path("p 1"), store.report_path("p_1"));

        store.save(&EpgSnapshot::empty("p_1")).await.unwrap();
        assert!(store.load("p/1").await.unwrap().is_none());
        assert_eq!(store.load("p_1").await.unwrap().unwrap().provider_id, "p_1");
    }

    #[tokio::test]
    async fn test_load_rejects_foreign_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path());

        // A file renamed by hand onto another provider's name
        store.save(&EpgSnapshot::empty("other")).await.unwrap();
        std::fs::rename(store.snapshot_path("other"), store.snapshot_path("p1")).unwrap();

        assert!(store.load("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_store_missing_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path());

        assert!(store.load("p1").await.unwrap().is_none());
        assert!(!store.delete("p1").await.unwrap());

        store.save(&EpgSnapshot::empty("p1")).await.unwrap();
        assert!(store.load("p1").await.unwrap().is_some());
        assert!(store.delete("p1").await.unwrap());
        assert!(store.load("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_store_report() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path());

        store
            .write_report("p1", &["DL_FAIL http://a".to_string(), "OK http://b programs=1 channels=1".to_string()])
            .await
            .unwrap();

        let text = std::fs::read_to_string(store.report_path("p1")).unwrap();
        assert_eq!(text, "DL_FAIL http://a\nOK http://b programs=1 channels=1\n");
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemorySnapshotStore::new();
        let snapshot = EpgSnapshot::empty("p1");
        store.save(&snapshot).await.unwrap();

        assert_eq!(store.load("p1").await.unwrap(), Some(snapshot));
        assert!(store.load("p2").await.unwrap().is_none());

        store.write_report("p1", &["x".to_string()]).await.unwrap();
        assert_eq!(store.report("p1").await, Some(vec!["x".to_string()]));
    }
}
