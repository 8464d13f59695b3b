use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::core::config::Settings;
use crate::schemas::exam::{
    AttemptId, Exam, ExamAttempt, ExamId, StartAttemptRequest, StartAttemptResponse,
};
use crate::schemas::submission::SubmitExamRequest;
use crate::services::http::{ServiceError, ServiceHttp};

/// Operations the client consumes from the exam service.
#[async_trait]
pub trait ExamService: Send + Sync {
    async fn fetch_attempt(&self, attempt_id: AttemptId) -> Result<ExamAttempt, ServiceError>;

    async fn submit_answers(&self, request: &SubmitExamRequest) -> Result<(), ServiceError>;

    async fn start_attempt(
        &self,
        request: &StartAttemptRequest,
    ) -> Result<StartAttemptResponse, ServiceError>;

    async fn list_exams(&self) -> Result<Vec<Exam>, ServiceError>;

    async fn fetch_exam(&self, exam_id: ExamId) -> Result<Exam, ServiceError>;

    async fn attempt_history(&self) -> Result<Vec<ExamAttempt>, ServiceError>;

    async fn attempts_for_exam(&self, exam_id: ExamId) -> Result<Vec<ExamAttempt>, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct HttpExamService {
    http: ServiceHttp,
}

impl HttpExamService {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = ServiceHttp::new(settings, settings.services().exam_service_url.clone())?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ExamService for HttpExamService {
    async fn fetch_attempt(&self, attempt_id: AttemptId) -> Result<ExamAttempt, ServiceError> {
        self.http
            .get_json(&format!("/api/exams/attempt/{attempt_id}"), &format!("attempt {attempt_id}"))
            .await
    }

    async fn submit_answers(&self, request: &SubmitExamRequest) -> Result<(), ServiceError> {
        tracing::info!(
            attempt_id = %request.attempt_id,
            answers = request.answers.len(),
            "Sending exam submission"
        );
        let body = self
            .http
            .post_raw("/api/exams/submit", request, &format!("attempt {}", request.attempt_id))
            .await?;

        if submission_accepted(&body)? {
            Ok(())
        } else {
            Err(ServiceError::Rejected("exam service did not accept the submission".to_string()))
        }
    }

    async fn start_attempt(
        &self,
        request: &StartAttemptRequest,
    ) -> Result<StartAttemptResponse, ServiceError> {
        let response: StartAttemptResponse = self
            .http
            .post_json("/api/exams/start", request, &format!("exam {}", request.exam_id))
            .await?;
        tracing::info!(
            exam_id = %request.exam_id,
            attempt_id = %response.attempt_id,
            "Exam attempt started"
        );
        Ok(response)
    }

    async fn list_exams(&self) -> Result<Vec<Exam>, ServiceError> {
        self.http.get_json("/api/exams", "exam list").await
    }

    async fn fetch_exam(&self, exam_id: ExamId) -> Result<Exam, ServiceError> {
        self.http.get_json(&format!("/api/exams/{exam_id}"), &format!("exam {exam_id}")).await
    }

    async fn attempt_history(&self) -> Result<Vec<ExamAttempt>, ServiceError> {
        self.http.get_json("/api/exams/history", "attempt history").await
    }

    async fn attempts_for_exam(&self, exam_id: ExamId) -> Result<Vec<ExamAttempt>, ServiceError> {
        self.http
            .get_json(&format!("/api/exams/attempts/{exam_id}"), &format!("attempts of exam {exam_id}"))
            .await
    }
}

/// The submit endpoint answers with a bare boolean; an empty or object body counts as accepted.
fn submission_accepted(body: &[u8]) -> Result<bool, ServiceError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(true);
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Bool(accepted)) => Ok(accepted),
        Ok(_) => Ok(true),
        Err(err) => Err(ServiceError::InvalidPayload(err.to_string())),
    }
}
