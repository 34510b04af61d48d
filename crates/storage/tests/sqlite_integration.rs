use survey_core::model::{
    AnswerValue, IncompleteStatus, Question, QuestionId, QuestionType, RespondentId, ResponseEntry,
    ResponseId, RetakeMode, Section, SectionId, SubmissionPayload, SurveyDefinition,
    SurveyDefinitionDraft, SurveyId,
};
use survey_core::time::fixed_now;
use storage::repository::{
    IncompleteResponseRepository, ResponseRepository, SnapshotStore, StorageError,
    SurveyRepository,
};
use storage::sqlite::SqliteRepository;

async fn repo(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn survey() -> SurveyDefinition {
    let mut draft = SurveyDefinitionDraft::new(SurveyId::new("sv"));
    draft.title = "Feedback".into();
    draft.retake_mode = RetakeMode::Replace;
    draft.sections = vec![Section {
        id: SectionId::new("s1"),
        name: "General".into(),
        order: 1,
    }];
    draft.questions = vec![Question {
        id: QuestionId::new("q1"),
        section_id: SectionId::new("s1"),
        order: 1,
        title: "How was it?".into(),
        kind: QuestionType::Scale { min: 1, max: 5 },
        required: true,
    }];
    draft.validate().unwrap()
}

fn payload(response_id: Option<ResponseId>, score: i64) -> SubmissionPayload {
    SubmissionPayload {
        survey_id: SurveyId::new("sv"),
        respondent_id: RespondentId::new("alice"),
        responses: vec![ResponseEntry {
            question_id: QuestionId::new("q1"),
            answer: AnswerValue::Scale(score),
            section_id: SectionId::new("s1"),
        }],
        start_time: fixed_now(),
        end_time: fixed_now(),
        retake_mode: RetakeMode::Replace,
        response_id,
    }
}

#[tokio::test]
async fn surveys_and_snapshots_round_trip() {
    let repo = repo("memdb_surveys").await;
    let def = survey();
    repo.upsert_survey(&def).await.unwrap();
    repo.upsert_survey(&def).await.unwrap();

    let fetched = repo.get_survey(def.id()).await.unwrap().expect("survey");
    assert_eq!(fetched, def);
    assert!(repo.get_survey(&SurveyId::new("nope")).await.unwrap().is_none());

    let key = "survey:sv:session:alice";
    assert!(repo.load(key).await.unwrap().is_none());
    repo.save(key, "{\"a\":1}").await.unwrap();
    repo.save(key, "{\"a\":2}").await.unwrap();
    assert_eq!(repo.load(key).await.unwrap().as_deref(), Some("{\"a\":2}"));
    repo.clear(key).await.unwrap();
    repo.clear(key).await.unwrap();
    assert!(repo.load(key).await.unwrap().is_none());
}

#[tokio::test]
async fn replace_submission_overwrites_in_place() {
    let repo = repo("memdb_responses").await;

    let first = repo.submit(&payload(None, 2)).await.unwrap();
    let second = repo.submit(&payload(Some(first.clone()), 5)).await.unwrap();
    assert_eq!(first, second);

    let stored = repo.get_response(&first).await.unwrap().expect("response");
    assert_eq!(stored.responses[0].answer, AnswerValue::Scale(5));
    assert!(stored.link_response_id.is_none());

    let unknown = ResponseId::new("gone");
    let third = repo.submit(&payload(Some(unknown.clone()), 1)).await.unwrap();
    assert_ne!(third, unknown);
    let linked = repo.get_response(&third).await.unwrap().expect("response");
    assert_eq!(linked.link_response_id, Some(unknown));

    let all = repo.list_responses(&SurveyId::new("sv")).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn incomplete_record_lifecycle() {
    let repo = repo("memdb_incomplete").await;
    let survey_id = SurveyId::new("sv");
    let alice = RespondentId::new("alice");

    let id = repo.start(&survey_id, &alice).await.unwrap();
    assert_eq!(repo.start(&survey_id, &alice).await.unwrap(), id);

    repo.update(
        &id,
        &QuestionId::new("q1"),
        &AnswerValue::Scale(3),
        &SectionId::new("s1"),
    )
    .await
    .unwrap();
    let record = repo.get(&id).await.unwrap().expect("record");
    assert_eq!(record.status, IncompleteStatus::Open);
    assert_eq!(record.per_question_answers.len(), 1);

    assert!(repo.mark_completed(&id).await.unwrap());
    let err = repo
        .update(
            &id,
            &QuestionId::new("q1"),
            &AnswerValue::Scale(4),
            &SectionId::new("s1"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    repo.reset(&id).await.unwrap();
    let record = repo.get(&id).await.unwrap().expect("record");
    assert!(record.is_open());
    assert!(record.per_question_answers.is_empty());

    assert!(!repo.remove_completed(&id).await.unwrap());
    assert!(repo.remove_by_survey_and_respondent(&survey_id, &alice).await.unwrap());
    assert!(repo.get(&id).await.unwrap().is_none());
    assert!(matches!(repo.reset(&id).await, Err(StorageError::NotFound)));
}

#[tokio::test]
async fn completed_record_frees_the_slot_for_a_new_run() {
    let repo = repo("memdb_slots").await;
    let survey_id = SurveyId::new("sv");
    let bob = RespondentId::new("bob");

    let first = repo.start(&survey_id, &bob).await.unwrap();
    repo.mark_completed(&first).await.unwrap();
    let second = repo.start(&survey_id, &bob).await.unwrap();
    assert_ne!(first, second);

    assert!(repo.remove_completed(&first).await.unwrap());
    assert!(repo.get(&second).await.unwrap().is_some());
}
