//! `reqwest` adapter for the remote response and incomplete-response API.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use storage::repository::{IncompleteResponseRepository, ResponseRepository, StorageError};
use survey_core::model::{
    AnswerValue, IncompleteRecordId, IncompleteResponseRecord, QuestionId, RespondentId,
    ResponseId, SectionId, SubmissionPayload, SubmittedResponse, SurveyId,
};

use crate::config::RemoteConfig;
use crate::error::RemoteError;

#[derive(Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpRemote {
    #[must_use]
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url,
            token: config.token,
        }
    }

    /// Join percent-encoded path segments onto the base url.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteError::CannotBeABase(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, RemoteError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%status, url = %response.url(), "remote request rejected");
            return Err(RemoteError::HttpStatus(status));
        }
        Ok(response)
    }

    /// Send a request whose 404 means "nothing there" rather than failure.
    async fn send_optional(
        &self,
        builder: RequestBuilder,
    ) -> Result<Option<Response>, StorageError> {
        match self.send(builder).await {
            Ok(response) => Ok(Some(response)),
            Err(RemoteError::HttpStatus(StatusCode::NOT_FOUND)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

//
// ─── WIRE BODIES ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitReply {
    response_id: ResponseId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest<'a> {
    survey_id: &'a SurveyId,
    respondent_id: &'a RespondentId,
}

#[derive(Debug, Deserialize)]
struct StartReply {
    id: IncompleteRecordId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    question_id: &'a QuestionId,
    answer: &'a AnswerValue,
    section_id: &'a SectionId,
}

//
// ─── REPOSITORY IMPLS ──────────────────────────────────────────────────────────
//

#[async_trait]
impl ResponseRepository for HttpRemote {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<ResponseId, StorageError> {
        let url = self.endpoint(&["surveys", payload.survey_id.as_str(), "responses"])?;
        let response = self.send(self.request(Method::POST, url).json(payload)).await?;
        let reply: SubmitReply = response.json().await.map_err(RemoteError::from)?;
        Ok(reply.response_id)
    }

    async fn get_response(
        &self,
        id: &ResponseId,
    ) -> Result<Option<SubmittedResponse>, StorageError> {
        let url = self.endpoint(&["responses", id.as_str()])?;
        let Some(response) = self.send_optional(self.request(Method::GET, url)).await? else {
            return Ok(None);
        };
        let body = response.json().await.map_err(RemoteError::from)?;
        Ok(Some(body))
    }

    async fn list_responses(
        &self,
        survey_id: &SurveyId,
    ) -> Result<Vec<SubmittedResponse>, StorageError> {
        let url = self.endpoint(&["surveys", survey_id.as_str(), "responses"])?;
        let response = self.send(self.request(Method::GET, url)).await?;
        Ok(response.json().await.map_err(RemoteError::from)?)
    }
}

#[async_trait]
impl IncompleteResponseRepository for HttpRemote {
    async fn start(
        &self,
        survey_id: &SurveyId,
        respondent_id: &RespondentId,
    ) -> Result<IncompleteRecordId, StorageError> {
        let url = self.endpoint(&["incomplete-responses"])?;
        let body = StartRequest {
            survey_id,
            respondent_id,
        };
        let response = self.send(self.request(Method::POST, url).json(&body)).await?;
        let reply: StartReply = response.json().await.map_err(RemoteError::from)?;
        Ok(reply.id)
    }

    async fn update(
        &self,
        id: &IncompleteRecordId,
        question_id: &QuestionId,
        answer: &AnswerValue,
        section_id: &SectionId,
    ) -> Result<(), StorageError> {
        let url = self.endpoint(&["incomplete-responses", id.as_str()])?;
        let body = UpdateRequest {
            question_id,
            answer,
            section_id,
        };
        self.send(self.request(Method::PATCH, url).json(&body))
            .await?;
        Ok(())
    }

    async fn mark_completed(&self, id: &IncompleteRecordId) -> Result<bool, StorageError> {
        let url = self.endpoint(&["incomplete-responses", id.as_str(), "complete"])?;
        Ok(self
            .send_optional(self.request(Method::POST, url))
            .await?
            .is_some())
    }

    async fn remove_completed(&self, id: &IncompleteRecordId) -> Result<bool, StorageError> {
        let mut url = self.endpoint(&["incomplete-responses", id.as_str()])?;
        url.query_pairs_mut().append_pair("status", "completed");
        Ok(self
            .send_optional(self.request(Method::DELETE, url))
            .await?
            .is_some())
    }

    async fn remove_by_survey_and_respondent(
        &self,
        survey_id: &SurveyId,
        respondent_id: &RespondentId,
    ) -> Result<bool, StorageError> {
        let url = self.endpoint(&[
            "surveys",
            survey_id.as_str(),
            "incomplete-responses",
            respondent_id.as_str(),
        ])?;
        Ok(self
            .send_optional(self.request(Method::DELETE, url))
            .await?
            .is_some())
    }

    async fn reset(&self, id: &IncompleteRecordId) -> Result<(), StorageError> {
        let url = self.endpoint(&["incomplete-responses", id.as_str(), "reset"])?;
        self.send(self.request(Method::POST, url)).await?;
        Ok(())
    }

    async fn get(
        &self,
        id: &IncompleteRecordId,
    ) -> Result<Option<IncompleteResponseRecord>, StorageError> {
        let url = self.endpoint(&["incomplete-responses", id.as_str()])?;
        let Some(response) = self.send_optional(self.request(Method::GET, url)).await? else {
            return Ok(None);
        };
        let body = response.json().await.map_err(RemoteError::from)?;
        Ok(Some(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(base: &str) -> HttpRemote {
        HttpRemote::new(RemoteConfig {
            base_url: Url::parse(base).unwrap(),
            token: Some("t0k".into()),
        })
    }

    #[test]
    fn endpoints_join_and_escape_segments() {
        let remote = remote("https://api.example.test/v1/");
        let url = remote
            .endpoint(&["surveys", "s 1/x", "incomplete-responses", "r1"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.test/v1/surveys/s%201%2Fx/incomplete-responses/r1"
        );

        let bare = self::remote("https://api.example.test");
        assert_eq!(
            bare.endpoint(&["responses", "abc"]).unwrap().as_str(),
            "https://api.example.test/responses/abc"
        );
    }

    #[test]
    fn opaque_base_urls_are_rejected() {
        let remote = remote("mailto:ops@example.test");
        assert!(matches!(
            remote.endpoint(&["responses"]),
            Err(RemoteError::CannotBeABase(_))
        ));
    }

    #[test]
    fn statuses_map_onto_storage_errors() {
        let not_found: StorageError = RemoteError::HttpStatus(StatusCode::NOT_FOUND).into();
        assert!(matches!(not_found, StorageError::NotFound));
        let conflict: StorageError = RemoteError::HttpStatus(StatusCode::CONFLICT).into();
        assert!(matches!(conflict, StorageError::Conflict));
        let other: StorageError = RemoteError::HttpStatus(StatusCode::BAD_GATEWAY).into();
        assert!(matches!(other, StorageError::Connection(_)));
    }

    #[test]
    fn update_body_uses_camel_case() {
        let body = UpdateRequest {
            question_id: &QuestionId::new("q1"),
            answer: &AnswerValue::Scale(4),
            section_id: &SectionId::new("s1"),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["questionId"], "q1");
        assert_eq!(json["sectionId"], "s1");
        assert_eq!(json["answer"]["type"], "scale");
    }
}
