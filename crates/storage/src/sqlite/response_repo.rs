use async_trait::async_trait;
use sqlx::Row;
use survey_core::model::{ResponseId, SubmissionPayload, SubmittedResponse, SurveyId};

use super::SqliteRepository;
use super::mapping::{db, from_json, ser, to_json};
use crate::repository::{ResponseRepository, StorageError};

fn map_body(row: &sqlx::sqlite::SqliteRow) -> Result<SubmittedResponse, StorageError> {
    let body: String = row.try_get("body").map_err(ser)?;
    from_json(&body)
}

#[async_trait]
impl ResponseRepository for SqliteRepository {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<ResponseId, StorageError> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.map_err(db)?;

        if let Some(requested) = &payload.response_id {
            let replacement = SubmittedResponse::from_payload(requested.clone(), payload, None);
            let res = sqlx::query(
                r"
                    UPDATE responses
                    SET survey_id = ?2, respondent_id = ?3, body = ?4, submitted_at = ?5
                    WHERE id = ?1
                ",
            )
            .bind(requested.as_str())
            .bind(payload.survey_id.as_str())
            .bind(payload.respondent_id.as_str())
            .bind(to_json(&replacement)?)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db)?;

            if res.rows_affected() > 0 {
                tx.commit().await.map_err(db)?;
                return Ok(requested.clone());
            }
        }

        let id = ResponseId::generate();
        let response =
            SubmittedResponse::from_payload(id.clone(), payload, payload.response_id.clone());
        sqlx::query(
            r"
                INSERT INTO responses (
                    id, survey_id, respondent_id, body, link_response_id, submitted_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(id.as_str())
        .bind(payload.survey_id.as_str())
        .bind(payload.respondent_id.as_str())
        .bind(to_json(&response)?)
        .bind(response.link_response_id.as_ref().map(ResponseId::as_str))
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        tx.commit().await.map_err(db)?;
        Ok(id)
    }

    async fn get_response(
        &self,
        id: &ResponseId,
    ) -> Result<Option<SubmittedResponse>, StorageError> {
        let row = sqlx::query("SELECT body FROM responses WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        row.as_ref().map(map_body).transpose()
    }

    async fn list_responses(
        &self,
        survey_id: &SurveyId,
    ) -> Result<Vec<SubmittedResponse>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT body FROM responses
                WHERE survey_id = ?1
                ORDER BY submitted_at ASC, rowid ASC
            ",
        )
        .bind(survey_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        rows.iter().map(map_body).collect()
    }
}
