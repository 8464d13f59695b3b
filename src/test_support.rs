use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::config::Settings;
use crate::core::time::{format_offset, Clock};
use crate::schemas::exam::{
    AttemptExam, AttemptId, Exam, ExamAttempt, ExamId, StartAttemptRequest, StartAttemptResponse,
};
use crate::schemas::submission::SubmitExamRequest;
use crate::services::{ExamService, ServiceError};

const CONFIG_VARS: &[&str] = &[
    "IGCSE_STRICT_CONFIG",
    "ENVIRONMENT",
    "EXAM_SERVICE_URL",
    "AI_SERVICE_URL",
    "ACCESS_TOKEN",
    "HTTP_CONNECT_TIMEOUT_SECONDS",
    "HTTP_REQUEST_TIMEOUT_SECONDS",
    "TICK_INTERVAL_MS",
    "IGCSE_LOG_LEVEL",
    "IGCSE_LOG_JSON",
    "PROMETHEUS_ENABLED",
];

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

/// Resets every variable `Settings::load` reads. Call with `env_lock` held.
pub(crate) fn set_test_env() {
    for key in CONFIG_VARS {
        std::env::remove_var(key);
    }
    std::env::set_var("IGCSE_ENV", "test");
}

pub(crate) async fn settings_with_urls(exam_url: &str, ai_url: &str) -> Settings {
    let _guard = env_lock().await;
    set_test_env();
    std::env::set_var("EXAM_SERVICE_URL", exam_url);
    std::env::set_var("AI_SERVICE_URL", ai_url);
    std::env::set_var("HTTP_CONNECT_TIMEOUT_SECONDS", "2");
    std::env::set_var("HTTP_REQUEST_TIMEOUT_SECONDS", "5");
    let settings = Settings::load().expect("settings");
    set_test_env();
    settings
}

/// Serves `router` on an ephemeral localhost port and returns its base url.
pub(crate) async fn spawn_stub_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind stub server");
    let addr = listener.local_addr().expect("stub server addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub server");
    });
    format!("http://{addr}")
}

#[derive(Debug)]
pub(crate) struct ManualClock {
    now: StdMutex<OffsetDateTime>,
}

impl ManualClock {
    pub(crate) fn new(now: OffsetDateTime) -> Arc<Self> {
        Arc::new(Self { now: StdMutex::new(now) })
    }

    pub(crate) fn advance(&self, by: time::Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().expect("clock lock")
    }
}

pub(crate) fn attempt_fixture(
    attempt_id: i64,
    start_time: OffsetDateTime,
    duration_minutes: i64,
) -> ExamAttempt {
    ExamAttempt {
        attempt_id: AttemptId(attempt_id),
        start_time: Some(format_offset(start_time)),
        submitted_at: None,
        total_score: None,
        exam: AttemptExam {
            exam_id: Some(ExamId(1)),
            title: "IGCSE Chemistry Paper 2".to_string(),
            description: None,
            duration: duration_minutes,
            questions: Vec::new(),
        },
        answers: Vec::new(),
    }
}

/// In-memory exam service that records submissions and can be told to fail them.
#[derive(Default)]
pub(crate) struct FakeExamService {
    attempt: Option<ExamAttempt>,
    submit_delay: Option<Duration>,
    failures_remaining: AtomicUsize,
    submit_calls: AtomicUsize,
    submissions: StdMutex<Vec<SubmitExamRequest>>,
}

impl FakeExamService {
    pub(crate) fn with_attempt(attempt: ExamAttempt) -> Self {
        Self { attempt: Some(attempt), ..Self::default() }
    }

    pub(crate) fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    pub(crate) fn failing_submits(self, count: usize) -> Self {
        self.failures_remaining.store(count, Ordering::SeqCst);
        self
    }

    pub(crate) fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn submissions(&self) -> Vec<SubmitExamRequest> {
        self.submissions.lock().expect("submissions lock").clone()
    }
}

#[async_trait]
impl ExamService for FakeExamService {
    async fn fetch_attempt(&self, attempt_id: AttemptId) -> Result<ExamAttempt, ServiceError> {
        match &self.attempt {
            Some(attempt) if attempt.attempt_id == attempt_id => Ok(attempt.clone()),
            _ => Err(ServiceError::NotFound { resource: format!("attempt {attempt_id}") }),
        }
    }

    async fn submit_answers(&self, request: &SubmitExamRequest) -> Result<(), ServiceError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }
        self.submissions.lock().expect("submissions lock").push(request.clone());

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(ServiceError::Network("HTTP 503: exam service unavailable".to_string()));
        }
        Ok(())
    }

    async fn start_attempt(
        &self,
        request: &StartAttemptRequest,
    ) -> Result<StartAttemptResponse, ServiceError> {
        Ok(StartAttemptResponse { attempt_id: AttemptId(request.exam_id.0 * 10) })
    }

    async fn list_exams(&self) -> Result<Vec<Exam>, ServiceError> {
        Ok(Vec::new())
    }

    async fn fetch_exam(&self, exam_id: ExamId) -> Result<Exam, ServiceError> {
        Err(ServiceError::NotFound { resource: format!("exam {exam_id}") })
    }

    async fn attempt_history(&self) -> Result<Vec<ExamAttempt>, ServiceError> {
        Ok(self.attempt.iter().cloned().collect())
    }

    async fn attempts_for_exam(&self, _exam_id: ExamId) -> Result<Vec<ExamAttempt>, ServiceError> {
        Ok(self.attempt.iter().cloned().collect())
    }
}
