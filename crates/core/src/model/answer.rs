use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::survey::QuestionType;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AnswerError {
    #[error("a {found} answer does not fit a {expected} question")]
    Mismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("option {0:?} is not offered by this question")]
    UnknownOption(String),
    #[error("scale value {value} outside {min}..={max}")]
    OutOfRange { value: i64, min: i64, max: i64 },
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid number {0:?}")]
    NotANumber(String),
}

//
// ─── ANSWER VALUE ──────────────────────────────────────────────────────────────
//

/// A respondent's answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Text(String),
    Choice(String),
    MultiChoice(Vec<String>),
    Scale(i64),
    DateValue(String),
    FileRef(String),
}

const DATE_FORMAT: &str = "%Y-%m-%d";

impl AnswerValue {
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            AnswerValue::Text(_) => "text",
            AnswerValue::Choice(_) => "choice",
            AnswerValue::MultiChoice(_) => "multi_choice",
            AnswerValue::Scale(_) => "scale",
            AnswerValue::DateValue(_) => "date",
            AnswerValue::FileRef(_) => "file",
        }
    }

    /// Normalize a value coming from any input surface.
    ///
    /// Trims strings and deduplicates multi-choice selections (keeping the
    /// first occurrence). Returns `None` when nothing meaningful is left, which
    /// callers treat as "no answer".
    #[must_use]
    pub fn normalize(self) -> Option<Self> {
        fn trimmed(raw: String) -> Option<String> {
            let t = raw.trim();
            (!t.is_empty()).then(|| t.to_owned())
        }

        match self {
            AnswerValue::Text(s) => trimmed(s).map(AnswerValue::Text),
            AnswerValue::Choice(s) => trimmed(s).map(AnswerValue::Choice),
            AnswerValue::DateValue(s) => trimmed(s).map(AnswerValue::DateValue),
            AnswerValue::FileRef(s) => trimmed(s).map(AnswerValue::FileRef),
            AnswerValue::Scale(n) => Some(AnswerValue::Scale(n)),
            AnswerValue::MultiChoice(items) => {
                let mut out: Vec<String> = Vec::with_capacity(items.len());
                for item in items.into_iter().filter_map(trimmed) {
                    if !out.contains(&item) {
                        out.push(item);
                    }
                }
                (!out.is_empty()).then_some(AnswerValue::MultiChoice(out))
            }
        }
    }

    /// Check that this value is acceptable for a question of the given type.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError` when the variant does not fit the question type,
    /// a choice is not offered, a scale value is out of range, or a date does
    /// not parse.
    pub fn check(&self, kind: &QuestionType) -> Result<(), AnswerError> {
        match (self, kind) {
            (AnswerValue::Text(_), QuestionType::Text { .. })
            | (AnswerValue::FileRef(_), QuestionType::File) => Ok(()),
            (AnswerValue::Choice(choice), QuestionType::Choice { options }) => {
                ensure_offered(options, choice)
            }
            (AnswerValue::MultiChoice(choices), QuestionType::MultiChoice { options }) => choices
                .iter()
                .try_for_each(|choice| ensure_offered(options, choice)),
            (AnswerValue::Scale(value), QuestionType::Scale { min, max }) => {
                if (*min..=*max).contains(value) {
                    Ok(())
                } else {
                    Err(AnswerError::OutOfRange {
                        value: *value,
                        min: *min,
                        max: *max,
                    })
                }
            }
            (AnswerValue::DateValue(raw), QuestionType::Date) => NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .map(|_| ())
                .map_err(|_| AnswerError::InvalidDate(raw.clone())),
            (value, kind) => Err(AnswerError::Mismatch {
                expected: kind.name(),
                found: value.kind_name(),
            }),
        }
    }

    /// Interpret raw text typed into a question's input as an answer of the
    /// question's type. Multi-choice input is comma separated.
    ///
    /// # Errors
    ///
    /// Returns `AnswerError::NotANumber` for unparsable scale input.
    pub fn from_input(kind: &QuestionType, raw: &str) -> Result<Option<Self>, AnswerError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let value = match kind {
            QuestionType::Text { .. } => AnswerValue::Text(raw.to_owned()),
            QuestionType::Choice { .. } => AnswerValue::Choice(raw.to_owned()),
            QuestionType::MultiChoice { .. } => {
                AnswerValue::MultiChoice(raw.split(',').map(str::to_owned).collect())
            }
            QuestionType::Scale { .. } => AnswerValue::Scale(
                raw.parse()
                    .map_err(|_| AnswerError::NotANumber(raw.to_owned()))?,
            ),
            QuestionType::Date => AnswerValue::DateValue(raw.to_owned()),
            QuestionType::File => AnswerValue::FileRef(raw.to_owned()),
        };
        Ok(value.normalize())
    }

    /// Flat textual form, used when evaluating branching conditions.
    #[must_use]
    pub fn display_text(&self) -> String {
        match self {
            AnswerValue::Text(s)
            | AnswerValue::Choice(s)
            | AnswerValue::DateValue(s)
            | AnswerValue::FileRef(s) => s.clone(),
            AnswerValue::Scale(n) => n.to_string(),
            AnswerValue::MultiChoice(items) => items.join(", "),
        }
    }
}

fn ensure_offered(options: &[String], choice: &str) -> Result<(), AnswerError> {
    if options.iter().any(|o| o == choice) {
        Ok(())
    } else {
        Err(AnswerError::UnknownOption(choice.to_owned()))
    }
}
