use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::schemas::exam::{AttemptId, QuestionId, QuestionType};
use crate::schemas::null_as_default;

/// How a question was graded. Methods this client does not know keep their wire name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationMethod {
    AiGpt4Langchain,
    LocalRuleBased,
    ErrorFallback,
    Other(String),
}

impl EvaluationMethod {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "AI_GPT4_LANGCHAIN" => Self::AiGpt4Langchain,
            "LOCAL_RULE_BASED" => Self::LocalRuleBased,
            "ERROR_FALLBACK" => Self::ErrorFallback,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::AiGpt4Langchain => "AI_GPT4_LANGCHAIN",
            Self::LocalRuleBased => "LOCAL_RULE_BASED",
            Self::ErrorFallback => "ERROR_FALLBACK",
            Self::Other(raw) => raw,
        }
    }
}

impl Serialize for EvaluationMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for EvaluationMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_wire(raw.trim()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingDetail {
    pub question_id: QuestionId,
    #[serde(default)]
    pub question_type: Option<QuestionType>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub score: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub max_score: f64,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_correct: bool,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub evaluation_method: Option<EvaluationMethod>,
}

/// Overall result as published by the AI service. `score` is on the 10-point scale;
/// `max_score` is the sum of the graded questions' marks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedGradingResult {
    pub attempt_id: AttemptId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub score: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub max_score: f64,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub details: Vec<GradingDetail>,
}
