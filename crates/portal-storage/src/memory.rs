//! In-memory backend with optional file-snapshot persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use jiff::Timestamp;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use portal_core::{
    normalize_url, parse_user_id, Consumer, Lifecycle, Producer, Result, Statistics, StorageError,
    UserUrl, Users,
};
use portal_generator::gen_uid;

use crate::config::StoreConfig;
use crate::{format_timestamp, snapshot};

/// One stored URL record.
///
/// Ownership is not part of the record — it lives in the user map, and is
/// therefore lost across snapshot reloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct UrlEntry {
    pub long_url: String,
    pub created_at: Timestamp,
    pub correlation_id: String,
    pub statistics: u64,
    pub removed: bool,
}

impl UrlEntry {
    fn new(long_url: String, correlation_id: String) -> Self {
        Self {
            long_url,
            created_at: Timestamp::now(),
            correlation_id,
            statistics: 0,
            removed: false,
        }
    }
}

#[derive(Default)]
struct Inner {
    urls: HashMap<String, UrlEntry>,
    users: HashMap<u64, Vec<String>>,
}

impl Inner {
    fn uid_by_long_url(&self, long_url: &str) -> Option<&str> {
        self.urls
            .iter()
            .find(|(_, entry)| entry.long_url == long_url)
            .map(|(uid, _)| uid.as_str())
    }
}

/// In-memory implementation of the storage capability traits.
///
/// Both maps sit behind a single read-write lock, and every mutating
/// operation runs as one critical section under the write guard — the
/// duplicate check and the insert (likewise the ownership check and the
/// tombstone write) can never interleave with another writer.
pub struct MemoryStore {
    config: StoreConfig,
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(Inner::default()),
        }
    }

    fn short_url(&self, uid: &str) -> String {
        format!("{}{uid}", self.config.base_url)
    }
}

#[async_trait]
impl Producer for MemoryStore {
    async fn add(&self, long_url: &str, user_id: &str) -> Result<String> {
        let long_url = normalize_url(long_url);
        let uid = gen_uid(self.config.uid_length);

        let mut inner = self.inner.write();

        if let Some(existing) = inner.uid_by_long_url(&long_url) {
            let short_url = self.short_url(existing);
            return Err(StorageError::AlreadyExists { short_url });
        }

        inner
            .urls
            .insert(uid.clone(), UrlEntry::new(long_url, String::new()));

        if let Some(owner) = parse_user_id(user_id) {
            inner.users.entry(owner).or_default().push(uid.clone());
        }

        Ok(self.short_url(&uid))
    }

    async fn add_batch(&self, long_url: &str, user_id: &str, correlation_id: &str) -> String {
        let long_url = normalize_url(long_url);
        let uid = gen_uid(self.config.uid_length);

        let mut inner = self.inner.write();

        if let Some(existing) = inner.uid_by_long_url(&long_url) {
            return self.short_url(existing);
        }

        inner
            .urls
            .insert(uid.clone(), UrlEntry::new(long_url, correlation_id.to_owned()));

        if let Some(owner) = parse_user_id(user_id) {
            inner.users.entry(owner).or_default().push(uid.clone());
        }

        self.short_url(&uid)
    }

    async fn update(&self, uid: &str) {
        let mut inner = self.inner.write();

        if let Some(entry) = inner.urls.get_mut(uid) {
            entry.statistics += 1;
        }
    }

    async fn del_urls(&self, user_id: &str, uids: &[String]) -> Result<()> {
        if uids.is_empty() || user_id.is_empty() {
            return Err(StorageError::InvalidData);
        }

        let owner = parse_user_id(user_id).ok_or(StorageError::UserIdNotValid)?;

        let mut inner = self.inner.write();
        let Inner { urls, users } = &mut *inner;

        let Some(owned) = users.get(&owner) else {
            return Ok(());
        };

        for uid in uids {
            if !owned.iter().any(|o| o == uid) {
                continue;
            }

            if let Some(entry) = urls.get_mut(uid) {
                entry.removed = true;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Consumer for MemoryStore {
    async fn get_url(&self, uid: &str) -> Result<String> {
        let inner = self.inner.read();

        let entry = inner.urls.get(uid).ok_or(StorageError::UidNotFound)?;

        if entry.removed {
            return Err(StorageError::Removed {
                long_url: entry.long_url.clone(),
            });
        }

        Ok(entry.long_url.clone())
    }

    async fn stat(&self, uid: &str) -> Result<Statistics> {
        let inner = self.inner.read();

        let entry = inner.urls.get(uid).ok_or(StorageError::UidNotFound)?;

        Ok(Statistics {
            short_url: self.short_url(uid),
            long_url: entry.long_url.clone(),
            created_at: format_timestamp(entry.created_at),
            usage: entry.statistics,
        })
    }
}

#[async_trait]
impl Users for MemoryStore {
    async fn create_user(&self) -> u64 {
        let mut inner = self.inner.write();
        let uid = inner.users.len() as u64 + 1;
        inner.users.insert(uid, Vec::new());
        uid
    }

    async fn urls_for_user(&self, user_id: &str) -> Result<Vec<UserUrl>> {
        let owner = parse_user_id(user_id).ok_or(StorageError::UserIdNotValid)?;

        let inner = self.inner.read();

        let Some(owned) = inner.users.get(&owner) else {
            return Err(StorageError::UserNotFound);
        };

        let urls: Vec<UserUrl> = owned
            .iter()
            .filter_map(|uid| {
                inner
                    .urls
                    .get(uid)
                    .filter(|entry| !entry.removed)
                    .map(|entry| UserUrl {
                        short_url: self.short_url(uid),
                        original_url: entry.long_url.clone(),
                    })
            })
            .collect();

        if urls.is_empty() {
            return Err(StorageError::UserUrlsEmpty);
        }

        Ok(urls)
    }
}

#[async_trait]
impl Lifecycle for MemoryStore {
    async fn init(&self) -> Result<()> {
        if self.config.snapshot_path.is_empty() {
            return Ok(());
        }

        let urls = snapshot::load(&self.config.snapshot_path)?;
        info!(count = urls.len(), "loaded url snapshot");

        self.inner.write().urls = urls;

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.config.snapshot_path.is_empty() {
            return Ok(());
        }

        let inner = self.inner.read();
        snapshot::save(&self.config.snapshot_path, &inner.urls)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store() -> MemoryStore {
        MemoryStore::new(StoreConfig::builder().base_url("http://base/").build())
    }

    fn uid_of(short_url: &str) -> String {
        short_url.rsplit('/').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn add_and_get() {
        let store = store();

        let short = store.add("example.com/x", "").await.unwrap();
        assert!(short.starts_with("http://base/"));

        let uid = uid_of(&short);
        assert_eq!(uid.len(), 5);
        assert_eq!(store.get_url(&uid).await.unwrap(), "http://example.com/x");
    }

    #[tokio::test]
    async fn add_deduplicates_on_long_url() {
        let store = store();

        let first = store.add("example.com/x", "").await.unwrap();
        let err = store.add("example.com/x", "").await.unwrap_err();

        match err {
            StorageError::AlreadyExists { short_url } => assert_eq!(short_url, first),
            other => panic!("expected AlreadyExists, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn add_dedup_ignores_tombstones() {
        let store = store();
        let user = store.create_user().await.to_string();

        let short = store.add("example.com/x", &user).await.unwrap();
        let uid = uid_of(&short);

        store.del_urls(&user, &[uid]).await.unwrap();

        // Still a duplicate even though the record is tombstoned.
        assert!(matches!(
            store.add("example.com/x", "").await,
            Err(StorageError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn get_url_unknown_uid() {
        let store = store();

        assert!(matches!(
            store.get_url("nope1").await,
            Err(StorageError::UidNotFound)
        ));
    }

    #[tokio::test]
    async fn removed_url_keeps_its_payload() {
        let store = store();
        let user = store.create_user().await.to_string();

        let short = store.add("example.com/x", &user).await.unwrap();
        let uid = uid_of(&short);

        store.del_urls(&user, &[uid.clone()]).await.unwrap();

        match store.get_url(&uid).await.unwrap_err() {
            StorageError::Removed { long_url } => assert_eq!(long_url, "http://example.com/x"),
            other => panic!("expected Removed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn del_urls_skips_foreign_and_unknown_uids() {
        let store = store();
        let owner = store.create_user().await.to_string();
        let stranger = store.create_user().await.to_string();

        let short = store.add("example.com/x", &owner).await.unwrap();
        let uid = uid_of(&short);

        // Someone else's uid and an unknown uid: success, nothing removed.
        store
            .del_urls(&stranger, &[uid.clone(), "zzzzz".to_string()])
            .await
            .unwrap();

        assert_eq!(store.get_url(&uid).await.unwrap(), "http://example.com/x");
    }

    #[tokio::test]
    async fn del_urls_precondition_failures() {
        let store = store();

        assert!(matches!(
            store.del_urls("1", &[]).await,
            Err(StorageError::InvalidData)
        ));
        assert!(matches!(
            store.del_urls("", &["abc".to_string()]).await,
            Err(StorageError::InvalidData)
        ));
        assert!(matches!(
            store.del_urls("not-a-number", &["abc".to_string()]).await,
            Err(StorageError::UserIdNotValid)
        ));
    }

    #[tokio::test]
    async fn removal_is_one_way() {
        let store = store();
        let user = store.create_user().await.to_string();

        let short = store.add("example.com/x", &user).await.unwrap();
        let uid = uid_of(&short);

        store.del_urls(&user, &[uid.clone()]).await.unwrap();
        // A second deletion of the same uid must not resurrect anything.
        store.del_urls(&user, &[uid.clone()]).await.unwrap();

        assert!(matches!(
            store.get_url(&uid).await,
            Err(StorageError::Removed { .. })
        ));
    }

    #[tokio::test]
    async fn add_batch_keeps_correlation_and_dedups() {
        let store = store();

        let first = store.add_batch("example.com/a", "", "batch-1").await;
        let dup = store.add_batch("example.com/a", "", "batch-2").await;
        let other = store.add_batch("example.com/b", "", "batch-3").await;

        assert_eq!(first, dup);
        assert_ne!(first, other);

        let inner = store.inner.read();
        assert_eq!(inner.urls[&uid_of(&first)].correlation_id, "batch-1");
        assert_eq!(inner.urls[&uid_of(&other)].correlation_id, "batch-3");
    }

    #[tokio::test]
    async fn stat_reports_usage_and_survives_removal() {
        let store = store();
        let user = store.create_user().await.to_string();

        let short = store.add("example.com/x", &user).await.unwrap();
        let uid = uid_of(&short);

        store.update(&uid).await;
        store.update(&uid).await;

        let stat = store.stat(&uid).await.unwrap();
        assert_eq!(stat.usage, 2);
        assert_eq!(stat.short_url, short);
        assert_eq!(stat.long_url, "http://example.com/x");

        store.del_urls(&user, &[uid.clone()]).await.unwrap();

        // Tombstoned records still answer.
        assert_eq!(store.stat(&uid).await.unwrap().usage, 2);
    }

    #[tokio::test]
    async fn update_unknown_uid_is_a_noop() {
        let store = store();
        store.update("nope1").await;
    }

    #[tokio::test]
    async fn concurrent_updates_lose_nothing() {
        let store = Arc::new(store());

        let short = store.add("example.com/x", "").await.unwrap();
        let uid = uid_of(&short);

        let mut handles = vec![];
        for _ in 0..100 {
            let store = Arc::clone(&store);
            let uid = uid.clone();
            handles.push(tokio::spawn(async move { store.update(&uid).await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.stat(&uid).await.unwrap().usage, 100);
    }

    #[tokio::test]
    async fn create_user_allocates_sequential_ids() {
        let store = store();

        assert_eq!(store.create_user().await, 1);
        assert_eq!(store.create_user().await, 2);
    }

    #[tokio::test]
    async fn urls_for_user_lists_accessible_records() {
        let store = store();
        let user = store.create_user().await.to_string();

        let a = store.add("example.com/a", &user).await.unwrap();
        let b = store.add("example.com/b", &user).await.unwrap();

        let urls = store.urls_for_user(&user).await.unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0].short_url, a);
        assert_eq!(urls[1].short_url, b);

        store.del_urls(&user, &[uid_of(&a)]).await.unwrap();

        let urls = store.urls_for_user(&user).await.unwrap();
        assert_eq!(urls.len(), 1);
        assert_eq!(urls[0].short_url, b);
    }

    #[tokio::test]
    async fn urls_for_user_error_kinds() {
        let store = store();

        assert!(matches!(
            store.urls_for_user("abc").await,
            Err(StorageError::UserIdNotValid)
        ));
        assert!(matches!(
            store.urls_for_user("99").await,
            Err(StorageError::UserNotFound)
        ));

        let user = store.create_user().await.to_string();
        assert!(matches!(
            store.urls_for_user(&user).await,
            Err(StorageError::UserUrlsEmpty)
        ));
    }

    #[tokio::test]
    async fn snapshot_round_trip_drops_ownership() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap").to_string_lossy().into_owned();
        let config = StoreConfig::builder()
            .base_url("http://base/")
            .snapshot_path(path)
            .build();

        let store = MemoryStore::new(config.clone());
        let user = store.create_user().await.to_string();
        let short = store.add("example.com/x", &user).await.unwrap();
        let uid = uid_of(&short);
        store.update(&uid).await;
        store.close().await.unwrap();

        let reloaded = MemoryStore::new(config);
        reloaded.init().await.unwrap();

        assert_eq!(
            reloaded.get_url(&uid).await.unwrap(),
            "http://example.com/x"
        );
        assert_eq!(reloaded.stat(&uid).await.unwrap().usage, 1);

        // The user map is not part of the snapshot.
        assert!(matches!(
            reloaded.urls_for_user(&user).await,
            Err(StorageError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn init_without_snapshot_path_is_a_noop() {
        let store = store();
        store.init().await.unwrap();
        store.close().await.unwrap();
        store.ping().await.unwrap();
    }
}
