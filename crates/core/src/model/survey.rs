use std::collections::HashSet;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::answer::AnswerValue;
use crate::model::ids::{QuestionId, SectionId, SurveyId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DefinitionError {
    #[error("section {0} appears more than once")]
    DuplicateSection(SectionId),

    #[error("two sections share order {0}")]
    DuplicateSectionOrder(u32),

    #[error("two questions in section {section} share order {order}")]
    DuplicateQuestionOrder { section: SectionId, order: u32 },

    #[error("question {question} references unknown section {section}")]
    UnknownSection {
        question: QuestionId,
        section: SectionId,
    },

    #[error("question {0} has a scale whose min exceeds its max")]
    InvalidScale(QuestionId),

    #[error("question {0} offers no options")]
    NoOptions(QuestionId),

    #[error("branching rule references unknown question {0}")]
    UnknownBranchSource(QuestionId),
}

//
// ─── BUILDING BLOCKS ───────────────────────────────────────────────────────────
//

/// Policy for what a restart does with a respondent's previous response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetakeMode {
    /// Every completed run creates a brand-new response.
    #[default]
    New,
    /// Completed runs overwrite the respondent's previous response.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub name: String,
    pub order: u32,
}

/// Input shape of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionType {
    Text {
        #[serde(default)]
        multiline: bool,
    },
    Choice {
        options: Vec<String>,
    },
    MultiChoice {
        options: Vec<String>,
    },
    Scale {
        min: i64,
        max: i64,
    },
    Date,
    File,
}

impl QuestionType {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            QuestionType::Text { .. } => "text",
            QuestionType::Choice { .. } => "choice",
            QuestionType::MultiChoice { .. } => "multi_choice",
            QuestionType::Scale { .. } => "scale",
            QuestionType::Date => "date",
            QuestionType::File => "file",
        }
    }

    /// Whether answers arrive as free text and go through the debounce window.
    #[must_use]
    pub fn is_free_text(&self) -> bool {
        matches!(self, QuestionType::Text { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub section_id: SectionId,
    pub order: u32,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchCondition {
    Equals,
    NotEquals,
    Contains,
}

/// Jump to `next_question_id` when the answer to `question_id` satisfies
/// `condition` against `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchingRule {
    pub question_id: QuestionId,
    pub condition: BranchCondition,
    pub value: String,
    pub next_question_id: QuestionId,
}

impl BranchingRule {
    #[must_use]
    pub fn matches(&self, answer: &AnswerValue) -> bool {
        let text = answer.display_text();
        match self.condition {
            BranchCondition::Equals => text == self.value,
            BranchCondition::NotEquals => text != self.value,
            BranchCondition::Contains => match answer {
                AnswerValue::MultiChoice(items) => items.iter().any(|i| *i == self.value),
                _ => text.contains(&self.value),
            },
        }
    }
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// Unvalidated survey document as delivered by the definition source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyDefinitionDraft {
    pub id: SurveyId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub retake_mode: RetakeMode,
    #[serde(default)]
    pub branching: Vec<BranchingRule>,
}

impl SurveyDefinitionDraft {
    #[must_use]
    pub fn new(id: SurveyId) -> Self {
        Self {
            id,
            title: String::new(),
            sections: Vec::new(),
            questions: Vec::new(),
            retake_mode: RetakeMode::default(),
            branching: Vec::new(),
        }
    }

    /// Validate the draft and fix the traversal order.
    ///
    /// Repeated question ids are dropped (the first occurrence wins).
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError` for duplicate sections or orders, questions
    /// pointing at unknown sections, malformed question types, or branching
    /// rules attached to unknown questions.
    pub fn validate(self) -> Result<SurveyDefinition, DefinitionError> {
        let Self {
            id,
            title,
            mut sections,
            questions,
            retake_mode,
            branching,
        } = self;

        let mut section_ids = HashSet::new();
        let mut section_orders = HashSet::new();
        for section in &sections {
            if !section_ids.insert(section.id.clone()) {
                return Err(DefinitionError::DuplicateSection(section.id.clone()));
            }
            if !section_orders.insert(section.order) {
                return Err(DefinitionError::DuplicateSectionOrder(section.order));
            }
        }
        sections.sort_by_key(|s| s.order);

        let mut question_ids = HashSet::new();
        let mut unique: Vec<Question> = questions
            .into_iter()
            .filter(|q| question_ids.insert(q.id.clone()))
            .collect();

        let mut question_orders = HashSet::new();
        for question in &unique {
            validate_kind(question)?;
            if !sections.is_empty() && !section_ids.contains(&question.section_id) {
                return Err(DefinitionError::UnknownSection {
                    question: question.id.clone(),
                    section: question.section_id.clone(),
                });
            }
            if !question_orders.insert((question.section_id.clone(), question.order)) {
                return Err(DefinitionError::DuplicateQuestionOrder {
                    section: question.section_id.clone(),
                    order: question.order,
                });
            }
        }

        if let Some(rule) = branching
            .iter()
            .find(|rule| !question_ids.contains(&rule.question_id))
        {
            return Err(DefinitionError::UnknownBranchSource(rule.question_id.clone()));
        }

        let mut section_ranges = Vec::with_capacity(sections.len());
        let questions = if sections.is_empty() {
            unique.sort_by_key(|q| q.order);
            unique
        } else {
            let mut ordered = Vec::with_capacity(unique.len());
            for section in &sections {
                let start = ordered.len();
                let mut members: Vec<Question> = unique
                    .iter()
                    .filter(|q| q.section_id == section.id)
                    .cloned()
                    .collect();
                members.sort_by_key(|q| q.order);
                ordered.extend(members);
                section_ranges.push(start..ordered.len());
            }
            ordered
        };

        Ok(SurveyDefinition {
            id,
            title,
            sections,
            questions,
            section_ranges,
            retake_mode,
            branching,
        })
    }
}

fn validate_kind(question: &Question) -> Result<(), DefinitionError> {
    match &question.kind {
        QuestionType::Scale { min, max } if min > max => {
            Err(DefinitionError::InvalidScale(question.id.clone()))
        }
        QuestionType::Choice { options } | QuestionType::MultiChoice { options }
            if options.is_empty() =>
        {
            Err(DefinitionError::NoOptions(question.id.clone()))
        }
        _ => Ok(()),
    }
}

//
// ─── DEFINITION ────────────────────────────────────────────────────────────────
//

/// Immutable, validated survey.
///
/// Questions are stored in traversal order: section by section (by section
/// `order`), and by question `order` within each section. Surveys without
/// sections are a single flat sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SurveyDefinitionDraft", into = "SurveyDefinitionDraft")]
pub struct SurveyDefinition {
    id: SurveyId,
    title: String,
    sections: Vec<Section>,
    questions: Vec<Question>,
    section_ranges: Vec<Range<usize>>,
    retake_mode: RetakeMode,
    branching: Vec<BranchingRule>,
}

impl TryFrom<SurveyDefinitionDraft> for SurveyDefinition {
    type Error = DefinitionError;

    fn try_from(draft: SurveyDefinitionDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl From<SurveyDefinition> for SurveyDefinitionDraft {
    fn from(def: SurveyDefinition) -> Self {
        Self {
            id: def.id,
            title: def.title,
            sections: def.sections,
            questions: def.questions,
            retake_mode: def.retake_mode,
            branching: def.branching,
        }
    }
}

impl SurveyDefinition {
    #[must_use]
    pub fn id(&self) -> &SurveyId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn retake_mode(&self) -> RetakeMode {
        self.retake_mode
    }

    /// Sections sorted by `order`.
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Unique questions in traversal order.
    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn branching_rules(&self) -> &[BranchingRule] {
        &self.branching
    }

    #[must_use]
    pub fn has_sections(&self) -> bool {
        !self.sections.is_empty()
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| &q.id == id)
    }

    /// Position of a question in traversal order.
    #[must_use]
    pub fn question_index(&self, id: &QuestionId) -> Option<usize> {
        self.questions.iter().position(|q| &q.id == id)
    }

    #[must_use]
    pub fn section(&self, id: &SectionId) -> Option<&Section> {
        self.sections.iter().find(|s| &s.id == id)
    }

    #[must_use]
    pub fn section_index(&self, id: &SectionId) -> Option<usize> {
        self.sections.iter().position(|s| &s.id == id)
    }

    /// Range of `questions()` belonging to the section at `index`.
    ///
    /// Empty for out-of-range indices and for flat surveys.
    #[must_use]
    pub fn section_range(&self, index: usize) -> Range<usize> {
        self.section_ranges.get(index).cloned().unwrap_or(0..0)
    }

    #[must_use]
    pub fn section_questions(&self, id: &SectionId) -> &[Question] {
        match self.section_index(id) {
            Some(idx) => &self.questions[self.section_range(idx)],
            None => &[],
        }
    }
}
