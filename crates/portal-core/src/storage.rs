use crate::error::Result;
use crate::model::{Statistics, UserUrl};
use async_trait::async_trait;

/// Write operations on shortened URLs.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Shortens a URL and returns the full short URL.
    ///
    /// Deduplicates on the normalized long URL: when a record already
    /// exists, returns [`StorageError::AlreadyExists`] carrying that
    /// record's short URL. The operation is idempotent in effect — the
    /// caller always ends up with a usable short URL. A parseable
    /// `user_id` records ownership; anything else creates an anonymous
    /// record.
    ///
    /// [`StorageError::AlreadyExists`]: crate::error::StorageError::AlreadyExists
    async fn add(&self, long_url: &str, user_id: &str) -> Result<String>;

    /// Bulk-import variant of [`add`](Producer::add).
    ///
    /// Same deduplication, but duplicates are routine here so there is no
    /// error channel: the short URL (new or pre-existing) is always
    /// returned. The record is tagged with `correlation_id` so the caller
    /// can re-associate it with its batch item.
    async fn add_batch(&self, long_url: &str, user_id: &str, correlation_id: &str) -> String;

    /// Increments the usage counter of `uid` by one.
    ///
    /// An unknown `uid` is a silent no-op.
    async fn update(&self, uid: &str);

    /// Tombstones every `uid` in the batch that is owned by `user_id`.
    ///
    /// Unknown uids and uids owned by someone else are silently skipped;
    /// only total precondition failures (empty batch, empty or malformed
    /// user id) are reported.
    async fn del_urls(&self, user_id: &str, uids: &[String]) -> Result<()>;
}

/// Read operations on shortened URLs.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Resolves `uid` to its long URL.
    ///
    /// A tombstoned record fails with [`StorageError::Removed`], which
    /// still carries the stored long URL.
    ///
    /// [`StorageError::Removed`]: crate::error::StorageError::Removed
    async fn get_url(&self, uid: &str) -> Result<String>;

    /// Returns usage statistics for `uid`. Tombstoned records still
    /// answer.
    async fn stat(&self, uid: &str) -> Result<Statistics>;
}

/// User account operations.
#[async_trait]
pub trait Users: Send + Sync {
    /// Allocates a new anonymous user and returns its identifier.
    async fn create_user(&self) -> u64;

    /// Lists the non-tombstoned URLs owned by `user_id`, in creation
    /// order.
    async fn urls_for_user(&self, user_id: &str) -> Result<Vec<UserUrl>>;
}

/// Backend lifecycle.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Prepares the backend: loads the snapshot or runs schema migration.
    async fn init(&self) -> Result<()>;

    /// Flushes and releases backend resources.
    async fn close(&self) -> Result<()>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<()>;
}

/// The full storage capability set a backend must provide.
pub trait Storage: Producer + Consumer + Users + Lifecycle + 'static {}

impl<T> Storage for T where T: Producer + Consumer + Users + Lifecycle + 'static {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use std::sync::Arc;

    /// Minimal backend proving the blanket impl and object safety.
    struct NullBackend;

    #[async_trait]
    impl Producer for NullBackend {
        async fn add(&self, _long_url: &str, _user_id: &str) -> Result<String> {
            Ok("http://base/null0".to_string())
        }

        async fn add_batch(&self, _long_url: &str, _user_id: &str, _cor: &str) -> String {
            "http://base/null0".to_string()
        }

        async fn update(&self, _uid: &str) {}

        async fn del_urls(&self, _user_id: &str, _uids: &[String]) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Consumer for NullBackend {
        async fn get_url(&self, _uid: &str) -> Result<String> {
            Err(StorageError::UidNotFound)
        }

        async fn stat(&self, _uid: &str) -> Result<Statistics> {
            Err(StorageError::UidNotFound)
        }
    }

    #[async_trait]
    impl Users for NullBackend {
        async fn create_user(&self) -> u64 {
            1
        }

        async fn urls_for_user(&self, _user_id: &str) -> Result<Vec<UserUrl>> {
            Err(StorageError::UserUrlsEmpty)
        }
    }

    #[async_trait]
    impl Lifecycle for NullBackend {
        async fn init(&self) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn backend_is_usable_as_a_trait_object() {
        let storage: Arc<dyn Storage> = Arc::new(NullBackend);

        storage.ping().await.unwrap();
        assert_eq!(storage.create_user().await, 1);
        assert_eq!(
            storage.add("example.com", "").await.unwrap(),
            "http://base/null0"
        );
        assert!(matches!(
            storage.get_url("null0").await,
            Err(StorageError::UidNotFound)
        ));
    }
}
