use async_trait::async_trait;
use sqlx::Row;
use survey_core::model::{SurveyDefinition, SurveyId};

use super::SqliteRepository;
use super::mapping::{db, from_json, ser, to_json};
use crate::repository::{StorageError, SurveyRepository};

#[async_trait]
impl SurveyRepository for SqliteRepository {
    async fn get_survey(&self, id: &SurveyId) -> Result<Option<SurveyDefinition>, StorageError> {
        let row = sqlx::query("SELECT body FROM surveys WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let body: String = row.try_get("body").map_err(ser)?;
        from_json(&body).map(Some)
    }

    async fn upsert_survey(&self, survey: &SurveyDefinition) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO surveys (id, body, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET
                    body = excluded.body,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(survey.id().as_str())
        .bind(to_json(survey)?)
        .bind(self.clock.now())
        .execute(&self.pool)
        .await
        .map_err(db)?;

        Ok(())
    }
}
