use serde::Serialize;
use time::OffsetDateTime;

use crate::attempt::answers::{AnswerSheet, AnswerState};
use crate::attempt::errors::AttemptError;
use crate::attempt::timing::{
    compute_deadline, duration_seconds_from_minutes, remaining_seconds,
};
use crate::core::time::parse_server_timestamp;
use crate::schemas::exam::{AttemptId, ExamAttempt, QuestionId};
use crate::schemas::submission::SubmitExamRequest;

/// Lifecycle of an attempt's submission. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionState {
    Active,
    Submitting,
    Submitted,
}

impl SubmissionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Submitting => "submitting",
            Self::Submitted => "submitted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmitReason {
    Manual,
    Expired,
}

impl SubmitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionTick {
    Running { remaining_seconds: u64 },
    /// Remaining time reached zero on this tick; reported once per session.
    Expired,
    Inactive,
}

/// In-memory state of one exam attempt.
///
/// The deadline is fixed at construction from the server-issued start time; the countdown is
/// always recomputed against it.
#[derive(Debug, Clone)]
pub struct AttemptSession {
    attempt_id: AttemptId,
    start_time: OffsetDateTime,
    duration_seconds: i64,
    deadline: OffsetDateTime,
    remaining_seconds: u64,
    answers: AnswerSheet,
    state: SubmissionState,
    expiry_reported: bool,
    frozen_request: Option<SubmitExamRequest>,
    retry_available: bool,
    last_error: Option<String>,
}

impl AttemptSession {
    pub fn new(
        attempt_id: AttemptId,
        start_time: OffsetDateTime,
        duration_seconds: i64,
        now: OffsetDateTime,
    ) -> Self {
        let deadline = compute_deadline(start_time, duration_seconds);
        Self {
            attempt_id,
            start_time,
            duration_seconds,
            deadline,
            remaining_seconds: remaining_seconds(deadline, now),
            answers: AnswerSheet::default(),
            state: SubmissionState::Active,
            expiry_reported: false,
            frozen_request: None,
            retry_available: false,
            last_error: None,
        }
    }

    /// Builds a session from attempt metadata returned by the exam service.
    pub fn from_attempt(attempt: &ExamAttempt, now: OffsetDateTime) -> Result<Self, AttemptError> {
        let attempt_id = attempt.attempt_id;
        let raw_start = attempt.start_time.as_deref().ok_or_else(|| {
            AttemptError::InvalidAttempt { attempt_id, reason: "missing start time".to_string() }
        })?;
        let start_time =
            parse_server_timestamp(raw_start).map_err(|err| AttemptError::InvalidAttempt {
                attempt_id,
                reason: format!("unparseable start time {raw_start:?}: {err}"),
            })?;
        let duration_seconds = duration_seconds_from_minutes(attempt.exam.duration).ok_or_else(
            || AttemptError::InvalidAttempt {
                attempt_id,
                reason: format!("exam duration must be positive, got {}", attempt.exam.duration),
            },
        )?;

        Ok(Self::new(attempt_id, start_time, duration_seconds, now))
    }

    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    pub fn start_time(&self) -> OffsetDateTime {
        self.start_time
    }

    pub fn duration_seconds(&self) -> i64 {
        self.duration_seconds
    }

    pub fn deadline(&self) -> OffsetDateTime {
        self.deadline
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    pub fn answers(&self) -> &AnswerSheet {
        &self.answers
    }

    pub fn retry_available(&self) -> bool {
        self.retry_available
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn tick(&mut self, now: OffsetDateTime) -> SessionTick {
        if self.state != SubmissionState::Active {
            return SessionTick::Inactive;
        }

        // `min` keeps the countdown non-increasing if the wall clock steps backwards.
        self.remaining_seconds = remaining_seconds(self.deadline, now).min(self.remaining_seconds);
        if self.remaining_seconds > 0 {
            return SessionTick::Running { remaining_seconds: self.remaining_seconds };
        }

        if self.expiry_reported {
            return SessionTick::Inactive;
        }
        self.expiry_reported = true;
        SessionTick::Expired
    }

    /// Returns false once the sheet is frozen for submission.
    pub(crate) fn record_answer(&mut self, question_id: QuestionId, partial: AnswerState) -> bool {
        if self.state != SubmissionState::Active {
            return false;
        }
        self.answers.record(question_id, partial);
        true
    }

    /// The single `Active -> Submitting` transition. Yields the frozen request to send, or
    /// `None` when another trigger already won.
    pub(crate) fn begin_submit(&mut self) -> Option<SubmitExamRequest> {
        if self.state != SubmissionState::Active {
            return None;
        }

        self.state = SubmissionState::Submitting;
        let request = self.answers.to_request(self.attempt_id);
        self.frozen_request = Some(request.clone());
        Some(request)
    }

    /// Consumes the retry affordance left by a failed submission.
    pub(crate) fn begin_retry(&mut self) -> Result<SubmitExamRequest, AttemptError> {
        if self.state != SubmissionState::Submitting || !self.retry_available {
            return Err(AttemptError::RetryUnavailable);
        }
        let request = self.frozen_request.clone().ok_or(AttemptError::RetryUnavailable)?;
        self.retry_available = false;
        Ok(request)
    }

    pub(crate) fn complete_submit(&mut self) {
        self.state = SubmissionState::Submitted;
        self.retry_available = false;
        self.last_error = None;
    }

    pub(crate) fn fail_submit(&mut self, error: String) {
        self.retry_available = true;
        self.last_error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::exam::{AttemptExam, OptionId};
    use time::macros::datetime;
    use time::Duration;

    const NOW: OffsetDateTime = datetime!(2025-06-01 12:00:00 UTC);

    fn attempt(start_time: Option<&str>, duration_minutes: i64) -> ExamAttempt {
        ExamAttempt {
            attempt_id: AttemptId(11),
            start_time: start_time.map(str::to_string),
            submitted_at: None,
            total_score: None,
            exam: AttemptExam {
                exam_id: None,
                title: "Chemistry".to_string(),
                description: None,
                duration: duration_minutes,
                questions: Vec::new(),
            },
            answers: Vec::new(),
        }
    }

    #[test]
    fn fresh_session_has_full_duration() {
        let session = AttemptSession::new(AttemptId(1), NOW, 600, NOW);
        assert_eq!(session.remaining_seconds(), 600);
        assert_eq!(session.deadline(), NOW + Duration::seconds(600));
        assert_eq!(session.state(), SubmissionState::Active);
    }

    #[test]
    fn session_loaded_after_deadline_starts_at_zero() {
        let session = AttemptSession::new(AttemptId(1), NOW - Duration::seconds(65), 60, NOW);
        assert_eq!(session.remaining_seconds(), 0);
    }

    #[test]
    fn from_attempt_uses_server_start_time() {
        let session = AttemptSession::from_attempt(&attempt(Some("2025-06-01T11:30:00"), 45), NOW)
            .expect("session");
        assert_eq!(session.start_time(), datetime!(2025-06-01 11:30:00 UTC));
        assert_eq!(session.duration_seconds(), 2700);
        assert_eq!(session.remaining_seconds(), 900);
    }

    #[test]
    fn from_attempt_rejects_unusable_metadata() {
        for (start, minutes) in [(None, 30), (Some("not a date"), 30), (Some("2025-06-01T11:30:00"), 0)] {
            let err = AttemptSession::from_attempt(&attempt(start, minutes), NOW)
                .expect_err("invalid attempt");
            assert!(matches!(err, AttemptError::InvalidAttempt { attempt_id: AttemptId(11), .. }));
        }
    }

    #[test]
    fn ticks_are_non_increasing_and_report_expiry_once() {
        let mut session = AttemptSession::new(AttemptId(1), NOW, 3, NOW);
        let mut seen = Vec::new();
        for offset in [1, 1, 2, 0, 3, 4, 10] {
            seen.push(session.tick(NOW + Duration::seconds(offset)));
        }

        assert_eq!(
            seen,
            vec![
                SessionTick::Running { remaining_seconds: 2 },
                SessionTick::Running { remaining_seconds: 2 },
                SessionTick::Running { remaining_seconds: 1 },
                SessionTick::Running { remaining_seconds: 1 },
                SessionTick::Expired,
                SessionTick::Inactive,
                SessionTick::Inactive,
            ]
        );
        assert_eq!(session.remaining_seconds(), 0);
    }

    #[test]
    fn only_one_submit_transition_succeeds() {
        let mut session = AttemptSession::new(AttemptId(1), NOW, 60, NOW);
        session.record_answer(QuestionId(1), AnswerState::selected(OptionId(3)));

        let first = session.begin_submit().expect("first transition");
        assert_eq!(first.answers.len(), 1);
        assert_eq!(session.state(), SubmissionState::Submitting);
        assert!(session.begin_submit().is_none());
        assert_eq!(session.tick(NOW + Duration::seconds(120)), SessionTick::Inactive);
    }

    #[test]
    fn answers_freeze_once_submitting() {
        let mut session = AttemptSession::new(AttemptId(1), NOW, 60, NOW);
        assert!(session.record_answer(QuestionId(1), AnswerState::text("a")));
        session.begin_submit().expect("transition");

        assert!(!session.record_answer(QuestionId(2), AnswerState::text("late")));
        assert!(session.answers().get(QuestionId(2)).is_none());
    }

    #[test]
    fn retry_requires_a_failed_submission_and_is_consumed() {
        let mut session = AttemptSession::new(AttemptId(1), NOW, 60, NOW);
        assert_eq!(session.begin_retry(), Err(AttemptError::RetryUnavailable));

        let frozen = session.begin_submit().expect("transition");
        assert_eq!(session.begin_retry(), Err(AttemptError::RetryUnavailable));

        session.fail_submit("HTTP 502: bad gateway".to_string());
        assert!(session.retry_available());
        assert_eq!(session.state(), SubmissionState::Submitting);
        assert_eq!(session.last_error(), Some("HTTP 502: bad gateway"));

        assert_eq!(session.begin_retry(), Ok(frozen));
        assert_eq!(session.begin_retry(), Err(AttemptError::RetryUnavailable));

        session.complete_submit();
        assert_eq!(session.state(), SubmissionState::Submitted);
        assert_eq!(session.last_error(), None);
    }
}
