#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod remote;
pub mod sessions;

pub use survey_core::Clock;
pub use sessions as session;

pub use config::{RemoteConfig, SessionConfig};
pub use error::{ConfigError, RemoteError, SessionError};
pub use remote::HttpRemote;
pub use sessions::{
    CommitMode, InputSurface, SubmitOutcome, SurveySession, SurveySessionService,
};
