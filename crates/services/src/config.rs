use std::env;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);
const DEFAULT_COMPLETED_GRACE: Duration = Duration::from_secs(5);

/// Per-session timing and mode knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Inactivity window after which a free-text edit is committed.
    pub debounce: Duration,
    /// Delay between marking the incomplete record completed and removing it.
    pub completed_grace: Duration,
    /// Admin preview: no remote effects, submission allowed from any step.
    pub preview: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            completed_grace: DEFAULT_COMPLETED_GRACE,
            preview: false,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    #[must_use]
    pub fn with_completed_grace(mut self, grace: Duration) -> Self {
        self.completed_grace = grace;
        self
    }

    #[must_use]
    pub fn with_preview(mut self, preview: bool) -> Self {
        self.preview = preview;
        self
    }

    /// Read `SURVEY_DEBOUNCE_MS`, `SURVEY_COMPLETED_GRACE_MS` and
    /// `SURVEY_PREVIEW`, falling back to defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Same as [`SessionConfig::from_env`] over an arbitrary lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a value is present but cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(ms) = millis(&lookup, "SURVEY_DEBOUNCE_MS")? {
            config.debounce = ms;
        }
        if let Some(ms) = millis(&lookup, "SURVEY_COMPLETED_GRACE_MS")? {
            config.completed_grace = ms;
        }
        if let Some(raw) = non_empty(&lookup, "SURVEY_PREVIEW") {
            config.preview = match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidFlag {
                        var: "SURVEY_PREVIEW",
                        raw,
                    });
                }
            };
        }
        Ok(config)
    }
}

/// Location of the remote response and incomplete-response endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub base_url: Url,
    pub token: Option<String>,
}

impl RemoteConfig {
    /// Read `SURVEY_API_BASE_URL` and `SURVEY_API_TOKEN`.
    ///
    /// Returns `Ok(None)` when no base url is configured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if the base url does not parse.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Same as [`RemoteConfig::from_env`] over an arbitrary lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if the base url does not parse.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        let Some(raw) = non_empty(&lookup, "SURVEY_API_BASE_URL") else {
            return Ok(None);
        };
        let base_url = Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl {
            var: "SURVEY_API_BASE_URL",
            source,
        })?;
        Ok(Some(Self {
            base_url,
            token: non_empty(&lookup, "SURVEY_API_TOKEN"),
        }))
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Option<String> {
    lookup(var)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    non_empty(lookup, var)
        .map(|raw| {
            raw.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidNumber { var, raw })
        })
        .transpose()
}
