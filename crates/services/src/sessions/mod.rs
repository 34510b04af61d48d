mod collector;
mod service;
mod session;
mod snapshot;
mod submission;
mod tasks;
mod tracker;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use collector::{AnswerCollector, CommitMode, InputSurface};
pub use service::SurveySessionService;
pub use session::SurveySession;
pub use snapshot::{LocalSnapshotStore, response_key, session_key};
pub use submission::{SubmissionCoordinator, SubmitOutcome, build_payload, missing_required};
pub use tasks::BackgroundTasks;
pub use tracker::RemoteTracker;
