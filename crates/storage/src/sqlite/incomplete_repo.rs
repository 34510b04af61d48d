use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::Row;
use survey_core::model::{
    AnswerValue, IncompleteAnswer, IncompleteRecordId, IncompleteResponseRecord,
    IncompleteStatus, QuestionId, RespondentId, SectionId, SurveyId,
};

use super::SqliteRepository;
use super::mapping::{db, from_json, ser, to_json};
use crate::repository::{IncompleteResponseRepository, StorageError};

type AnswerMap = BTreeMap<QuestionId, IncompleteAnswer>;

fn parse_status(raw: &str) -> Result<IncompleteStatus, StorageError> {
    IncompleteStatus::parse(raw)
        .ok_or_else(|| StorageError::Serialization(format!("invalid status: {raw}")))
}

fn map_record(row: &sqlx::sqlite::SqliteRow) -> Result<IncompleteResponseRecord, StorageError> {
    let answers: String = row.try_get("answers").map_err(ser)?;
    let status: String = row.try_get("status").map_err(ser)?;
    Ok(IncompleteResponseRecord {
        id: IncompleteRecordId::new(row.try_get::<String, _>("id").map_err(ser)?),
        survey_id: SurveyId::new(row.try_get::<String, _>("survey_id").map_err(ser)?),
        respondent_id: RespondentId::new(row.try_get::<String, _>("respondent_id").map_err(ser)?),
        per_question_answers: from_json(&answers)?,
        status: parse_status(&status)?,
        created_at: row.try_get("created_at").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}

#[async_trait]
impl IncompleteResponseRepository for SqliteRepository {
    async fn start(
        &self,
        survey_id: &SurveyId,
        respondent_id: &RespondentId,
    ) -> Result<IncompleteRecordId, StorageError> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.map_err(db)?;

        // The partial unique index turns a second open record into a no-op.
        sqlx::query(
            r"
                INSERT OR IGNORE INTO incomplete_responses (
                    id, survey_id, respondent_id, answers, status, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, '{}', 'open', ?4, ?4)
            ",
        )
        .bind(IncompleteRecordId::generate().as_str())
        .bind(survey_id.as_str())
        .bind(respondent_id.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        let row = sqlx::query(
            r"
                SELECT id FROM incomplete_responses
                WHERE survey_id = ?1 AND respondent_id = ?2 AND status = 'open'
            ",
        )
        .bind(survey_id.as_str())
        .bind(respondent_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(db)?;

        tx.commit().await.map_err(db)?;
        Ok(IncompleteRecordId::new(
            row.try_get::<String, _>("id").map_err(ser)?,
        ))
    }

    async fn update(
        &self,
        id: &IncompleteRecordId,
        question_id: &QuestionId,
        answer: &AnswerValue,
        section_id: &SectionId,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        let row = sqlx::query("SELECT answers, status FROM incomplete_responses WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db)?
            .ok_or(StorageError::NotFound)?;

        let status: String = row.try_get("status").map_err(ser)?;
        if parse_status(&status)? != IncompleteStatus::Open {
            return Err(StorageError::Conflict);
        }

        let raw: String = row.try_get("answers").map_err(ser)?;
        let mut answers: AnswerMap = from_json(&raw)?;
        answers.insert(
            question_id.clone(),
            IncompleteAnswer {
                answer: answer.clone(),
                section_id: section_id.clone(),
            },
        );

        sqlx::query("UPDATE incomplete_responses SET answers = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id.as_str())
            .bind(to_json(&answers)?)
            .bind(self.clock.now())
            .execute(&mut *tx)
            .await
            .map_err(db)?;

        tx.commit().await.map_err(db)?;
        Ok(())
    }

    async fn mark_completed(&self, id: &IncompleteRecordId) -> Result<bool, StorageError> {
        let res = sqlx::query(
            "UPDATE incomplete_responses SET status = 'completed', updated_at = ?2 WHERE id = ?1",
        )
        .bind(id.as_str())
        .bind(self.clock.now())
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(res.rows_affected() > 0)
    }

    async fn remove_completed(&self, id: &IncompleteRecordId) -> Result<bool, StorageError> {
        let res =
            sqlx::query("DELETE FROM incomplete_responses WHERE id = ?1 AND status = 'completed'")
                .bind(id.as_str())
                .execute(&self.pool)
                .await
                .map_err(db)?;
        Ok(res.rows_affected() > 0)
    }

    async fn remove_by_survey_and_respondent(
        &self,
        survey_id: &SurveyId,
        respondent_id: &RespondentId,
    ) -> Result<bool, StorageError> {
        let res = sqlx::query(
            "DELETE FROM incomplete_responses WHERE survey_id = ?1 AND respondent_id = ?2",
        )
        .bind(survey_id.as_str())
        .bind(respondent_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(res.rows_affected() > 0)
    }

    async fn reset(&self, id: &IncompleteRecordId) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                UPDATE incomplete_responses
                SET answers = '{}', status = 'open', updated_at = ?2
                WHERE id = ?1
            ",
        )
        .bind(id.as_str())
        .bind(self.clock.now())
        .execute(&self.pool)
        .await
        .map_err(db)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn get(
        &self,
        id: &IncompleteRecordId,
    ) -> Result<Option<IncompleteResponseRecord>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, survey_id, respondent_id, answers, status, created_at, updated_at
                FROM incomplete_responses
                WHERE id = ?1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(map_record).transpose()
    }
}
