use serde::{Deserialize, Serialize};

use crate::schemas::exam::{AttemptId, OptionId, QuestionId};

/// One entry of the submitted answer list. Absent fields are sent as explicit `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerDto {
    pub question_id: QuestionId,
    pub selected_option_id: Option<OptionId>,
    pub text_answer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitExamRequest {
    pub attempt_id: AttemptId,
    pub answers: Vec<AnswerDto>,
}
