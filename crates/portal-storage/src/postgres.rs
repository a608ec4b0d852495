//! PostgreSQL backend.
//!
//! Deduplication is delegated to the `long_url` unique constraint: the
//! insert does nothing on conflict, and zero affected rows triggers a
//! follow-up read for the pre-existing short code. Soft delete and usage
//! counting are single `UPDATE` statements, so the database's own locking
//! provides the atomicity the in-memory backend gets from its lock.

use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::error;

use portal_core::{
    normalize_url, parse_user_id, Consumer, Lifecycle, Producer, Result, Statistics, StorageError,
    UserUrl, Users,
};
use portal_generator::gen_uid;

use crate::config::StoreConfig;
use crate::format_timestamp;

const MAX_OPEN_CONNS: u32 = 200;
const CONN_MAX_LIFETIME: Duration = Duration::from_secs(15 * 60);

/// PostgreSQL implementation of the storage capability traits.
pub struct PostgresStore {
    config: StoreConfig,
    pool: PgPool,
}

impl PostgresStore {
    /// Opens a bounded connection pool against the configured DSN.
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_OPEN_CONNS)
            .max_lifetime(CONN_MAX_LIFETIME)
            .connect(&config.dsn)
            .await
            .map_err(|err| StorageError::Connection(err.to_string()))?;

        Ok(Self { config, pool })
    }

    /// Creates a store from an existing pool.
    pub fn with_pool(config: StoreConfig, pool: PgPool) -> Self {
        Self { config, pool }
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn short_url(&self, uid: &str) -> String {
        format!("{}{uid}", self.config.base_url)
    }

    async fn short_uid_for(&self, long_url: &str) -> Result<String> {
        let row = sqlx::query("SELECT short_uid FROM urls WHERE long_url = $1")
            .bind(long_url)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.try_get("short_uid").map_err(map_sqlx_error)
    }

    async fn insert_url(
        &self,
        uid: &str,
        long_url: &str,
        correlation_id: &str,
        user_id: &str,
    ) -> Result<u64> {
        let owner = parse_user_id(user_id).map(|id| id as i64);
        let created_at = Timestamp::now().as_second();

        let result = sqlx::query(
            r#"
            INSERT INTO urls (short_uid, long_url, correlation_id, uid, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (long_url) DO NOTHING
            "#,
        )
        .bind(uid)
        .bind(long_url)
        .bind(correlation_id)
        .bind(owner)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Connection(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl Producer for PostgresStore {
    async fn add(&self, long_url: &str, user_id: &str) -> Result<String> {
        let long_url = normalize_url(long_url);
        let uid = gen_uid(self.config.uid_length);

        if self.insert_url(&uid, &long_url, "", user_id).await? == 0 {
            let existing = self.short_uid_for(&long_url).await?;
            return Err(StorageError::AlreadyExists {
                short_url: self.short_url(&existing),
            });
        }

        Ok(self.short_url(&uid))
    }

    async fn add_batch(&self, long_url: &str, user_id: &str, correlation_id: &str) -> String {
        let long_url = normalize_url(long_url);
        let uid = gen_uid(self.config.uid_length);

        match self
            .insert_url(&uid, &long_url, correlation_id, user_id)
            .await
        {
            Ok(0) => match self.short_uid_for(&long_url).await {
                Ok(existing) => self.short_url(&existing),
                Err(err) => {
                    error!(error = %err, "batch import lookup failed");
                    self.short_url(&uid)
                }
            },
            Ok(_) => self.short_url(&uid),
            Err(err) => {
                // Bulk import has no error channel; the failure is logged
                // and the generated short URL returned regardless.
                error!(error = %err, "batch import insert failed");
                self.short_url(&uid)
            }
        }
    }

    async fn update(&self, uid: &str) {
        let result = sqlx::query("UPDATE urls SET statistics = statistics + 1 WHERE short_uid = $1")
            .bind(uid)
            .execute(&self.pool)
            .await;

        if let Err(err) = result {
            error!(error = %err, "usage update failed");
        }
    }

    async fn del_urls(&self, user_id: &str, uids: &[String]) -> Result<()> {
        if uids.is_empty() || user_id.is_empty() {
            return Err(StorageError::InvalidData);
        }

        let owner = parse_user_id(user_id).ok_or(StorageError::UserIdNotValid)? as i64;

        sqlx::query("UPDATE urls SET removed = TRUE WHERE short_uid = ANY($1) AND uid = $2")
            .bind(uids.to_vec())
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}

#[async_trait]
impl Consumer for PostgresStore {
    async fn get_url(&self, uid: &str) -> Result<String> {
        let row = sqlx::query("SELECT long_url, removed FROM urls WHERE short_uid = $1")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StorageError::UidNotFound);
        };

        let long_url: String = row.try_get("long_url").map_err(map_sqlx_error)?;
        let removed: bool = row.try_get("removed").map_err(map_sqlx_error)?;

        if removed {
            return Err(StorageError::Removed { long_url });
        }

        Ok(long_url)
    }

    async fn stat(&self, uid: &str) -> Result<Statistics> {
        let row = sqlx::query("SELECT long_url, statistics, created_at FROM urls WHERE short_uid = $1")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StorageError::UidNotFound);
        };

        let long_url: String = row.try_get("long_url").map_err(map_sqlx_error)?;
        let statistics: i64 = row.try_get("statistics").map_err(map_sqlx_error)?;
        let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;

        let created_at = Timestamp::from_second(created_at)
            .map_err(|err| StorageError::Query(format!("invalid created_at timestamp: {err}")))?;

        Ok(Statistics {
            short_url: self.short_url(uid),
            long_url,
            created_at: format_timestamp(created_at),
            usage: statistics as u64,
        })
    }
}

#[async_trait]
impl Users for PostgresStore {
    async fn create_user(&self) -> u64 {
        let created_at = Timestamp::now().as_second();

        let row = sqlx::query("INSERT INTO users (created_at) VALUES ($1) RETURNING uid")
            .bind(created_at)
            .fetch_one(&self.pool)
            .await;

        match row.and_then(|row| row.try_get::<i64, _>("uid")) {
            Ok(uid) => uid as u64,
            Err(err) => {
                error!(error = %err, "user allocation failed");
                0
            }
        }
    }

    async fn urls_for_user(&self, user_id: &str) -> Result<Vec<UserUrl>> {
        let owner = parse_user_id(user_id).ok_or(StorageError::UserIdNotValid)? as i64;

        let user = sqlx::query("SELECT uid FROM users WHERE uid = $1")
            .bind(owner)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if user.is_none() {
            return Err(StorageError::UserNotFound);
        }

        let rows = sqlx::query(
            r#"
            SELECT short_uid, long_url
            FROM urls
            WHERE uid = $1 AND removed = FALSE
            ORDER BY created_at
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if rows.is_empty() {
            return Err(StorageError::UserUrlsEmpty);
        }

        rows.into_iter()
            .map(|row| {
                let short_uid: String = row.try_get("short_uid").map_err(map_sqlx_error)?;
                let original_url: String = row.try_get("long_url").map_err(map_sqlx_error)?;

                Ok(UserUrl {
                    short_url: self.short_url(&short_uid),
                    original_url,
                })
            })
            .collect()
    }
}

#[async_trait]
impl Lifecycle for PostgresStore {
    async fn init(&self) -> Result<()> {
        for ddl in [
            include_str!("../ddl/postgres/users.sql"),
            include_str!("../ddl/postgres/urls.sql"),
        ] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|err| StorageError::Connection(err.to_string()))
    }
}
