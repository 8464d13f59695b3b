use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schemas::exam::{AttemptId, OptionId, QuestionId};
use crate::schemas::submission::{AnswerDto, SubmitExamRequest};

/// A student's (possibly partial) response to one question.
///
/// Both fields are independent: a question can carry a selected option and free text at the
/// same time, and neither is checked against the question type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerState {
    #[serde(default)]
    pub selected_option_id: Option<OptionId>,
    #[serde(default)]
    pub text_answer: Option<String>,
}

impl AnswerState {
    pub fn selected(option_id: OptionId) -> Self {
        Self { selected_option_id: Some(option_id), text_answer: None }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self { selected_option_id: None, text_answer: Some(text.into()) }
    }

    /// Overwrites only the fields present in `partial`.
    pub fn merge(&mut self, partial: AnswerState) {
        if let Some(option_id) = partial.selected_option_id {
            self.selected_option_id = Some(option_id);
        }
        if let Some(text) = partial.text_answer {
            self.text_answer = Some(text);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerSheet {
    answers: BTreeMap<QuestionId, AnswerState>,
}

impl AnswerSheet {
    pub fn record(&mut self, question_id: QuestionId, partial: AnswerState) {
        self.answers.entry(question_id).or_default().merge(partial);
    }

    pub fn get(&self, question_id: QuestionId) -> Option<&AnswerState> {
        self.answers.get(&question_id)
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Flattens the sheet into the submission body. Unanswered questions are omitted; text
    /// is forwarded verbatim, including an empty string.
    pub fn to_request(&self, attempt_id: AttemptId) -> SubmitExamRequest {
        let answers = self
            .answers
            .iter()
            .map(|(question_id, state)| AnswerDto {
                question_id: *question_id,
                selected_option_id: state.selected_option_id,
                text_answer: state.text_answer.clone(),
            })
            .collect();

        SubmitExamRequest { attempt_id, answers }
    }
}

impl FromIterator<(QuestionId, AnswerState)> for AnswerSheet {
    fn from_iter<I: IntoIterator<Item = (QuestionId, AnswerState)>>(iter: I) -> Self {
        let mut sheet = Self::default();
        for (question_id, partial) in iter {
            sheet.record(question_id, partial);
        }
        sheet
    }
}
