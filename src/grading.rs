use serde::Serialize;

use crate::schemas::exam::{AttemptId, QuestionId};
use crate::schemas::grading::{DetailedGradingResult, EvaluationMethod, GradingDetail};

/// The AI service reports overall scores out of this many points.
pub const SCORE_SCALE: f64 = 10.0;

/// Pass mark on the 10-point grading scale.
pub const PASS_MARK: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    Unknown,
}

impl ConfidenceLevel {
    pub fn from_confidence(confidence: Option<f64>) -> Self {
        match confidence {
            Some(value) if !value.is_finite() => Self::Unknown,
            Some(value) if value >= 0.8 => Self::High,
            Some(value) if value >= 0.5 => Self::Medium,
            Some(_) => Self::Low,
            None => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Excellent,
    Good,
    Average,
    Poor,
}

impl ScoreBand {
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 80.0 {
            Self::Excellent
        } else if percentage >= 60.0 {
            Self::Good
        } else if percentage >= 50.0 {
            Self::Average
        } else {
            Self::Poor
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Average => "average",
            Self::Poor => "poor",
        }
    }
}

/// Display label for a grading method; results that do not state one read "Automatic".
pub fn evaluation_method_label(method: Option<&EvaluationMethod>) -> &str {
    match method {
        Some(EvaluationMethod::AiGpt4Langchain) => "AI (GPT-4)",
        Some(EvaluationMethod::LocalRuleBased) => "Rule-based",
        Some(other) if !other.as_wire().is_empty() => other.as_wire(),
        _ => "Automatic",
    }
}

fn percentage(score: f64, max_score: f64) -> f64 {
    if max_score <= 0.0 || !score.is_finite() || !max_score.is_finite() {
        return 0.0;
    }
    score / max_score * 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionLine {
    pub question_id: QuestionId,
    pub score: f64,
    pub max_score: f64,
    pub percentage: f64,
    pub band: ScoreBand,
    pub is_correct: bool,
    pub confidence_level: ConfidenceLevel,
    pub evaluation_method: Option<EvaluationMethod>,
    pub feedback: Option<String>,
}

impl QuestionLine {
    fn from_detail(detail: &GradingDetail) -> Self {
        let percentage = percentage(detail.score, detail.max_score);
        Self {
            question_id: detail.question_id,
            score: detail.score,
            max_score: detail.max_score,
            percentage,
            band: ScoreBand::from_percentage(percentage),
            is_correct: detail.is_correct,
            confidence_level: ConfidenceLevel::from_confidence(detail.confidence),
            evaluation_method: detail.evaluation_method.clone(),
            feedback: detail.feedback.clone().filter(|text| !text.trim().is_empty()),
        }
    }
}

/// Presentation view of a detailed grading result.
///
/// The overall `score` is already on the 10-point scale, so percentage, band and the pass
/// flag are all measured against `SCORE_SCALE`. `total_marks` is the raw sum of the graded
/// questions' marks and is informational only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSummary {
    pub attempt_id: AttemptId,
    pub score: f64,
    pub total_marks: f64,
    pub percentage: f64,
    pub passed: bool,
    pub band: ScoreBand,
    pub confidence_level: ConfidenceLevel,
    pub evaluation_method: Option<EvaluationMethod>,
    pub feedback: Option<String>,
    pub language: Option<String>,
    pub questions: Vec<QuestionLine>,
}

impl ResultSummary {
    pub fn from_result(result: &DetailedGradingResult) -> Self {
        let percentage = percentage(result.score, SCORE_SCALE);
        let evaluation_method =
            result.details.first().and_then(|detail| detail.evaluation_method.clone());

        Self {
            attempt_id: result.attempt_id,
            score: result.score,
            total_marks: result.max_score,
            percentage,
            passed: result.score >= PASS_MARK,
            band: ScoreBand::from_percentage(percentage),
            confidence_level: ConfidenceLevel::from_confidence(result.confidence),
            evaluation_method,
            feedback: result.feedback.clone().filter(|text| !text.trim().is_empty()),
            language: result.language.clone(),
            questions: result.details.iter().map(QuestionLine::from_detail).collect(),
        }
    }

    /// Plain-text rendering used by the CLI.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Attempt {}: {:.1}/{:.0} ({:.0}%, {}) {}\n",
            self.attempt_id,
            self.score,
            SCORE_SCALE,
            self.percentage,
            self.band.as_str(),
            if self.passed { "PASSED" } else { "NOT PASSED" },
        );
        out.push_str(&format!(
            "Graded by {} with {} confidence\n",
            evaluation_method_label(self.evaluation_method.as_ref()),
            self.confidence_level.as_str(),
        ));
        if self.total_marks > 0.0 {
            out.push_str(&format!("Questions worth {:.1} marks in total\n", self.total_marks));
        }
        if let Some(feedback) = &self.feedback {
            out.push_str(&format!("Feedback: {feedback}\n"));
        }

        for line in &self.questions {
            out.push_str(&format!(
                "  Q{}: {:.1}/{:.1} {} [{}]{}\n",
                line.question_id,
                line.score,
                line.max_score,
                if line.is_correct { "correct" } else { "incorrect" },
                line.band.as_str(),
                line.feedback.as_deref().map(|text| format!(" {text}")).unwrap_or_default(),
            ));
        }
        out
    }
}
