mod answer;
mod ids;
mod response;
mod retake;
mod session;
mod survey;

pub use answer::{AnswerError, AnswerValue};
pub use ids::{
    IncompleteRecordId, ParseIdError, QuestionId, RespondentId, ResponseId, SectionId, SurveyId,
};
pub use response::{
    IncompleteAnswer, IncompleteResponseRecord, IncompleteStatus, ResponseEntry,
    SubmissionPayload, SubmittedResponse,
};
pub use retake::{RemoteRestart, RetakePolicy};
pub use session::{SessionState, Step};
pub use survey::{
    BranchCondition, BranchingRule, DefinitionError, Question, QuestionType, RetakeMode, Section,
    SurveyDefinition, SurveyDefinitionDraft,
};
