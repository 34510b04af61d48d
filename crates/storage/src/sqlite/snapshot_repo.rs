use async_trait::async_trait;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{db, ser};
use crate::repository::{SnapshotStore, StorageError};

#[async_trait]
impl SnapshotStore for SqliteRepository {
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT body FROM session_snapshots WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        row.map(|row| row.try_get::<String, _>("body").map_err(ser))
            .transpose()
    }

    async fn save(&self, key: &str, body: &str) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO session_snapshots (key, body, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    body = excluded.body,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(key)
        .bind(body)
        .bind(self.clock.now())
        .execute(&self.pool)
        .await
        .map_err(db)?;

        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM session_snapshots WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(db)?;
        Ok(())
    }
}
