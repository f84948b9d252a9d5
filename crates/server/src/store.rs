//! Durable `sessionId -> SessionRecord` mapping with a secondary `userId`
//! uniqueness index (`spec.md` §4.2). Backed by SQLite via `sqlx`; schema
//! evolution runs idempotently at open time through embedded migrations.

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sandman_protocol::SessionRecord;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::error::EngineError;

#[derive(FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    container_id: String,
    container_ip: String,
    host_ssh_port: i64,
    gpu_uuid: String,
    profile_name: String,
    ttl_minutes: i64,
    created_at: String,
    expires_at: String,
    metadata: String,
}

impl TryFrom<SessionRow> for SessionRecord {
    type Error = anyhow::Error;

    fn try_from(row: SessionRow) -> Result<Self> {
        Ok(SessionRecord {
            id: Uuid::parse_str(&row.id).context("corrupt session id")?,
            user_id: row.user_id,
            container_id: row.container_id,
            container_ip: row.container_ip,
            host_ssh_port: row.host_ssh_port as u16,
            gpu_uuid: row.gpu_uuid,
            profile_name: row.profile_name,
            ttl_minutes: row.ttl_minutes as u32,
            created_at: DateTime::parse_from_rfc3339(&row.created_at)?.with_timezone(&Utc),
            expires_at: DateTime::parse_from_rfc3339(&row.expires_at)?.with_timezone(&Utc),
            metadata: serde_json::from_str(&row.metadata).unwrap_or_default(),
        })
    }
}

pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    /// Opens (creating if absent) the SQLite file at `path` and runs
    /// embedded migrations. Failure here is fatal at startup (`spec.md` §7).
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .context("invalid database path")?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .context("failed to open session store")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run session store migrations")?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn create(&self, record: &SessionRecord) -> Result<(), EngineError> {
        let metadata = serde_json::to_string(&record.metadata)
            .map_err(|e| EngineError::PersistenceFault(e.to_string()))?;

        let result = sqlx::query(
            "INSERT INTO sessions \
             (id, user_id, container_id, container_ip, host_ssh_port, gpu_uuid, profile_name, \
              ttl_minutes, created_at, expires_at, metadata) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(&record.user_id)
        .bind(&record.container_id)
        .bind(&record.container_ip)
        .bind(record.host_ssh_port as i64)
        .bind(&record.gpu_uuid)
        .bind(&record.profile_name)
        .bind(record.ttl_minutes as i64)
        .bind(record.created_at.to_rfc3339())
        .bind(record.expires_at.to_rfc3339())
        .bind(metadata)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(EngineError::DuplicateUser(record.user_id.clone()))
            }
            Err(err) => Err(EngineError::PersistenceFault(err.to_string())),
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<SessionRecord>> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("failed to query session by id")?;
        row.map(SessionRecord::try_from).transpose()
    }

    pub async fn get_by_user(&self, user_id: &str) -> Result<Option<SessionRecord>> {
        let row = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to query session by user")?;
        row.map(SessionRecord::try_from).transpose()
    }

    /// Newest-first, per `spec.md` §4.2.
    pub async fn list_all(&self) -> Result<Vec<SessionRecord>> {
        let rows = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .context("failed to list sessions")?;
        rows.into_iter().map(SessionRecord::try_from).collect()
    }

    pub async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<SessionRecord>> {
        let rows = sqlx::query_as::<_, SessionRow>("SELECT * FROM sessions WHERE expires_at < ?")
            .bind(now.to_rfc3339())
            .fetch_all(&self.pool)
            .await
            .context("failed to list expired sessions")?;
        rows.into_iter().map(SessionRecord::try_from).collect()
    }

    /// Idempotent: returns `Ok(())` whether or not a row existed.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("failed to delete session")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn sample_record(user_id: &str) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            container_id: "c1".to_string(),
            container_ip: "10.100.0.100".to_string(),
            host_ssh_port: 10000,
            gpu_uuid: "GPU-1".to_string(),
            profile_name: "3g.20gb".to_string(),
            ttl_minutes: 60,
            created_at: now,
            expires_at: now + chrono::Duration::minutes(60),
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let store = SessionStore::open_in_memory().await.unwrap();
        let record = sample_record("alice");
        store.create(&record).await.unwrap();

        let fetched = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.user_id, "alice");
        assert_eq!(fetched.gpu_uuid, "GPU-1");
    }

    #[tokio::test]
    async fn duplicate_user_is_rejected() {
        let store = SessionStore::open_in_memory().await.unwrap();
        store.create(&sample_record("alice")).await.unwrap();
        let err = store.create(&sample_record("alice")).await.unwrap_err();
        assert!(matches!(err, EngineError::DuplicateUser(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = SessionStore::open_in_memory().await.unwrap();
        let record = sample_record("alice");
        store.create(&record).await.unwrap();
        store.delete(record.id).await.unwrap();
        store.delete(record.id).await.unwrap();
        assert!(store.get(record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_all_is_newest_first() {
        let store = SessionStore::open_in_memory().await.unwrap();
        let mut first = sample_record("alice");
        first.created_at = Utc::now() - chrono::Duration::minutes(10);
        let second = sample_record("bob");
        store.create(&first).await.unwrap();
        store.create(&second).await.unwrap();

        let all = store.list_all().await.unwrap();
        assert_eq!(all[0].user_id, "bob");
        assert_eq!(all[1].user_id, "alice");
    }

    #[tokio::test]
    async fn list_expired_finds_past_due_records() {
        let store = SessionStore::open_in_memory().await.unwrap();
        let mut expired = sample_record("alice");
        expired.expires_at = Utc::now() - chrono::Duration::minutes(1);
        store.create(&expired).await.unwrap();
        store.create(&sample_record("bob")).await.unwrap();

        let results = store.list_expired(Utc::now()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].user_id, "alice");
    }
}
