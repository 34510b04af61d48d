//! Respondent navigation through a survey.
//!
//! `Welcome → Section → Question … → ThankYou`. Any step naming an id the
//! definition does not contain resolves to `ThankYou`.

use std::collections::BTreeMap;

use crate::model::{AnswerValue, QuestionId, Step, SurveyDefinition};

/// Stateless transition rules over a survey definition.
#[derive(Debug, Clone, Copy)]
pub struct FlowController<'a> {
    definition: &'a SurveyDefinition,
}

impl<'a> FlowController<'a> {
    #[must_use]
    pub fn new(definition: &'a SurveyDefinition) -> Self {
        Self { definition }
    }

    /// Whether `step` references ids present in the definition.
    #[must_use]
    pub fn contains(&self, step: &Step) -> bool {
        match step {
            Step::Welcome | Step::ThankYou => true,
            Step::Section(id) => self.definition.section(id).is_some(),
            Step::Question(id) => self.definition.question(id).is_some(),
        }
    }

    /// Forward transition from `step`.
    ///
    /// Branching rules attached to the current question take precedence over
    /// the linear order when its committed answer satisfies them.
    #[must_use]
    pub fn next(&self, step: &Step, answers: &BTreeMap<QuestionId, AnswerValue>) -> Step {
        let def = self.definition;
        match step {
            Step::Welcome => {
                if def.has_sections() {
                    self.section_step(0)
                } else {
                    self.question_step(0)
                }
            }
            Step::Section(id) => {
                let Some(idx) = def.section_index(id) else {
                    return Step::ThankYou;
                };
                let range = def.section_range(idx);
                if range.is_empty() {
                    self.section_step(idx + 1)
                } else {
                    self.question_step(range.start)
                }
            }
            Step::Question(id) => {
                let Some(idx) = def.question_index(id) else {
                    return Step::ThankYou;
                };
                if let Some(target) = self.branch_target(id, answers) {
                    return target;
                }
                self.after_question(idx)
            }
            Step::ThankYou => Step::ThankYou,
        }
    }

    /// Backward transition from `step`.
    #[must_use]
    pub fn back(&self, step: &Step) -> Step {
        let def = self.definition;
        match step {
            Step::Welcome => Step::Welcome,
            Step::ThankYou => Step::ThankYou,
            Step::Section(id) => match def.section_index(id) {
                None => Step::ThankYou,
                Some(0) => Step::Welcome,
                Some(idx) => {
                    let previous = def.section_range(idx - 1);
                    if previous.is_empty() {
                        self.section_step(idx - 1)
                    } else {
                        self.question_step(previous.end - 1)
                    }
                }
            },
            Step::Question(id) => {
                let Some(idx) = def.question_index(id) else {
                    return Step::ThankYou;
                };
                if !def.has_sections() {
                    return match idx {
                        0 => Step::Welcome,
                        _ => self.question_step(idx - 1),
                    };
                }
                let section_idx = self.section_of(idx);
                match section_idx {
                    Some(s) if def.section_range(s).start == idx => self.section_step(s),
                    Some(_) => self.question_step(idx - 1),
                    None => Step::ThankYou,
                }
            }
        }
    }

    /// Last question of its section, and that section is the last one.
    /// Gates the submit affordance.
    #[must_use]
    pub fn is_last_question(&self, id: &QuestionId) -> bool {
        let def = self.definition;
        let Some(idx) = def.question_index(id) else {
            return false;
        };
        if !def.has_sections() {
            return idx + 1 == def.question_count();
        }
        match self.section_of(idx) {
            Some(s) => s + 1 == def.sections().len() && def.section_range(s).end == idx + 1,
            None => false,
        }
    }

    /// Rule-driven jump for `id`, if its committed answer triggers one.
    #[must_use]
    pub fn branch_target(
        &self,
        id: &QuestionId,
        answers: &BTreeMap<QuestionId, AnswerValue>,
    ) -> Option<Step> {
        let answer = answers.get(id)?;
        let rule = self
            .definition
            .branching_rules()
            .iter()
            .find(|rule| &rule.question_id == id && rule.matches(answer))?;
        Some(match self.definition.question(&rule.next_question_id) {
            Some(q) => Step::Question(q.id.clone()),
            None => Step::ThankYou,
        })
    }

    fn after_question(&self, idx: usize) -> Step {
        let def = self.definition;
        if !def.has_sections() {
            return self.question_step(idx + 1);
        }
        match self.section_of(idx) {
            Some(s) if idx + 1 < def.section_range(s).end => self.question_step(idx + 1),
            Some(s) => self.section_step(s + 1),
            None => Step::ThankYou,
        }
    }

    fn section_of(&self, question_idx: usize) -> Option<usize> {
        let question = self.definition.questions().get(question_idx)?;
        self.definition.section_index(&question.section_id)
    }

    fn question_step(&self, idx: usize) -> Step {
        self.definition
            .questions()
            .get(idx)
            .map_or(Step::ThankYou, |q| Step::Question(q.id.clone()))
    }

    fn section_step(&self, idx: usize) -> Step {
        self.definition
            .sections()
            .get(idx)
            .map_or(Step::ThankYou, |s| Step::Section(s.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        BranchCondition, BranchingRule, Question, QuestionType, Section, SectionId, SurveyId,
        SurveyDefinitionDraft,
    };

    fn q(id: &str, section: &str, order: u32) -> Question {
        Question {
            id: QuestionId::new(id),
            section_id: SectionId::new(section),
            order,
            title: String::new(),
            kind: QuestionType::Scale { min: 1, max: 5 },
            required: false,
        }
    }

    fn s(id: &str, order: u32) -> Section {
        Section {
            id: SectionId::new(id),
            name: id.into(),
            order,
        }
    }

    fn qs(id: &str) -> Step {
        Step::Question(QuestionId::new(id))
    }

    fn ss(id: &str) -> Step {
        Step::Section(SectionId::new(id))
    }

    /// s1: [a, b], s2: [], s3: [c]
    fn survey() -> SurveyDefinition {
        let mut d = SurveyDefinitionDraft::new(SurveyId::new("x"));
        d.sections = vec![s("s1", 1), s("s2", 2), s("s3", 3)];
        d.questions = vec![q("a", "s1", 1), q("b", "s1", 2), q("c", "s3", 1)];
        d.validate().unwrap()
    }

    #[test]
    fn walks_forward_through_sections_skipping_empty_ones() {
        let def = survey();
        let flow = FlowController::new(&def);
        let none = BTreeMap::new();

        let mut step = Step::Welcome;
        let mut seen = Vec::new();
        while !step.is_terminal() {
            step = flow.next(&step, &none);
            seen.push(step.clone());
        }
        assert_eq!(
            seen,
            vec![ss("s1"), qs("a"), qs("b"), ss("s2"), ss("s3"), qs("c"), Step::ThankYou]
        );
    }

    #[test]
    fn walks_backward_mirroring_forward() {
        let def = survey();
        let flow = FlowController::new(&def);
        assert_eq!(flow.back(&qs("c")), ss("s3"));
        assert_eq!(flow.back(&ss("s3")), ss("s2"));
        assert_eq!(flow.back(&ss("s2")), qs("b"));
        assert_eq!(flow.back(&qs("b")), qs("a"));
        assert_eq!(flow.back(&qs("a")), ss("s1"));
        assert_eq!(flow.back(&ss("s1")), Step::Welcome);
        assert_eq!(flow.back(&Step::Welcome), Step::Welcome);
        assert_eq!(flow.back(&Step::ThankYou), Step::ThankYou);
    }

    #[test]
    fn last_question_flag() {
        let def = survey();
        let flow = FlowController::new(&def);
        assert!(flow.is_last_question(&QuestionId::new("c")));
        assert!(!flow.is_last_question(&QuestionId::new("b")));
        assert!(!flow.is_last_question(&QuestionId::new("missing")));
    }

    #[test]
    fn missing_ids_are_terminal() {
        let def = survey();
        let flow = FlowController::new(&def);
        let none = BTreeMap::new();
        assert_eq!(flow.next(&qs("ghost"), &none), Step::ThankYou);
        assert_eq!(flow.next(&ss("ghost"), &none), Step::ThankYou);
        assert_eq!(flow.back(&qs("ghost")), Step::ThankYou);
        assert!(!flow.contains(&qs("ghost")));
        assert!(flow.contains(&ss("s2")));
    }

    #[test]
    fn flat_survey_goes_straight_to_questions() {
        let mut d = SurveyDefinitionDraft::new(SurveyId::new("flat"));
        d.questions = vec![q("a", "-", 1), q("b", "-", 2)];
        let def = d.validate().unwrap();
        let flow = FlowController::new(&def);
        let none = BTreeMap::new();
        assert_eq!(flow.next(&Step::Welcome, &none), qs("a"));
        assert_eq!(flow.next(&qs("b"), &none), Step::ThankYou);
        assert_eq!(flow.back(&qs("a")), Step::Welcome);
        assert!(flow.is_last_question(&QuestionId::new("b")));
    }

    #[test]
    fn empty_survey_finishes_immediately() {
        let def = SurveyDefinitionDraft::new(SurveyId::new("empty"))
            .validate()
            .unwrap();
        let flow = FlowController::new(&def);
        assert_eq!(flow.next(&Step::Welcome, &BTreeMap::new()), Step::ThankYou);
    }

    #[test]
    fn branching_rule_overrides_linear_order() {
        let mut d = SurveyDefinitionDraft::new(SurveyId::new("x"));
        d.sections = vec![s("s1", 1), s("s3", 3)];
        d.questions = vec![q("a", "s1", 1), q("b", "s1", 2), q("c", "s3", 1)];
        d.branching = vec![
            BranchingRule {
                question_id: QuestionId::new("a"),
                condition: BranchCondition::Equals,
                value: "1".into(),
                next_question_id: QuestionId::new("c"),
            },
            BranchingRule {
                question_id: QuestionId::new("b"),
                condition: BranchCondition::Equals,
                value: "5".into(),
                next_question_id: QuestionId::new("gone"),
            },
        ];
        let def = d.validate().unwrap();
        let flow = FlowController::new(&def);

        let mut answers = BTreeMap::new();
        answers.insert(QuestionId::new("a"), AnswerValue::Scale(1));
        assert_eq!(flow.next(&qs("a"), &answers), qs("c"));

        answers.insert(QuestionId::new("a"), AnswerValue::Scale(2));
        assert_eq!(flow.next(&qs("a"), &answers), qs("b"));

        answers.insert(QuestionId::new("b"), AnswerValue::Scale(5));
        assert_eq!(flow.next(&qs("b"), &answers), Step::ThankYou);
    }
}
