use std::collections::BTreeMap;

use crate::flow::FlowController;
use crate::model::{AnswerValue, QuestionId, Step, SurveyDefinition};

/// Aggregated view of a respondent's position, useful for UI.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// 1-based step number; `Welcome` is step 1.
    pub current_step: usize,
    /// Unique questions plus the welcome and thank-you bookends.
    pub total_steps: usize,
    pub answered: usize,
    pub percent: f64,
    pub is_last_question: bool,
}

/// Questions that lie fully before `step` in traversal order.
#[must_use]
pub fn questions_before(definition: &SurveyDefinition, step: &Step) -> usize {
    let total = definition.question_count();
    match step {
        Step::Welcome => 0,
        Step::ThankYou => total,
        Step::Section(id) => definition
            .section_index(id)
            .map_or(total, |idx| definition.section_range(idx).start.min(total)),
        Step::Question(id) => definition.question_index(id).unwrap_or(total),
    }
}

/// Compute progress for `step`.
///
/// Percent is `questions_before / question_count × 100`, pinned to 0 at
/// `Welcome` and 100 at `ThankYou` (including surveys with no questions).
#[must_use]
pub fn progress(
    definition: &SurveyDefinition,
    step: &Step,
    answers: &BTreeMap<QuestionId, AnswerValue>,
) -> Progress {
    let count = definition.question_count();
    let total_steps = count + 2;
    let before = questions_before(definition, step);

    let percent = match step {
        Step::Welcome => 0.0,
        Step::ThankYou => 100.0,
        _ if count == 0 => 0.0,
        #[allow(clippy::cast_precision_loss)]
        _ => before as f64 / count as f64 * 100.0,
    };

    let current_step = match step {
        Step::Welcome => 1,
        Step::ThankYou => total_steps,
        Step::Question(_) => before + 2,
        Step::Section(_) => (before + 2).min(total_steps - 1),
    };

    let answered = answers
        .keys()
        .filter(|id| definition.question(id).is_some())
        .count();

    let is_last_question = step
        .question_id()
        .is_some_and(|id| FlowController::new(definition).is_last_question(id));

    Progress {
        current_step,
        total_steps,
        answered,
        percent,
        is_last_question,
    }
}
