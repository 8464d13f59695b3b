use anyhow::Result;

use crate::core::config::Settings;
use crate::schemas::exam::AttemptId;
use crate::schemas::grading::DetailedGradingResult;
use crate::services::http::{ServiceError, ServiceHttp};

/// Read-only client for graded results published by the AI grading service.
#[derive(Debug, Clone)]
pub struct GradingService {
    http: ServiceHttp,
}

impl GradingService {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = ServiceHttp::new(settings, settings.services().ai_service_url.clone())?;
        Ok(Self { http })
    }

    pub async fn detailed_result(
        &self,
        attempt_id: AttemptId,
    ) -> Result<DetailedGradingResult, ServiceError> {
        if attempt_id.0 <= 0 {
            return Err(ServiceError::InvalidRequest(format!(
                "attempt id must be positive, got {attempt_id}"
            )));
        }

        let result: DetailedGradingResult = self
            .http
            .get_json(
                &format!("/result/{attempt_id}/details"),
                &format!("grading result for attempt {attempt_id}"),
            )
            .await?;

        tracing::info!(
            attempt_id = %attempt_id,
            score = result.score,
            max_score = result.max_score,
            details = result.details.len(),
            "Fetched grading result"
        );
        Ok(result)
    }
}
