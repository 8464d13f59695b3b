use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::attempt::answers::{AnswerSheet, AnswerState};
use crate::attempt::errors::AttemptError;
use crate::attempt::session::{AttemptSession, SessionTick, SubmissionState, SubmitReason};
use crate::core::time::{format_offset, Clock};
use crate::schemas::exam::{AttemptId, QuestionId};
use crate::schemas::submission::SubmitExamRequest;
use crate::services::ExamService;

/// Where the view should navigate after a successful submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectTarget {
    Results { attempt_id: AttemptId },
}

impl RedirectTarget {
    pub fn path(&self) -> String {
        match self {
            Self::Results { attempt_id } => format!("/exams/result?attemptId={attempt_id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted(RedirectTarget),
    /// Another trigger already moved the attempt past `Active`; nothing was sent.
    AlreadyHandled(SubmissionState),
}

#[derive(Debug)]
pub enum TickOutcome {
    Running { remaining_seconds: u64 },
    Expired(Result<SubmitOutcome, AttemptError>),
    Inactive,
}

#[derive(Debug)]
pub enum TimerExit {
    Expired(Result<SubmitOutcome, AttemptError>),
    /// The attempt left `Active` through another trigger.
    Stopped,
    Cancelled,
}

/// What a view renders: the countdown and the submission status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptSnapshot {
    pub remaining_seconds: u64,
    pub submission_state: SubmissionState,
    pub retry_available: bool,
    pub last_error: Option<String>,
}

impl AttemptSnapshot {
    fn of(session: &AttemptSession) -> Self {
        Self {
            remaining_seconds: session.remaining_seconds(),
            submission_state: session.state(),
            retry_available: session.retry_available(),
            last_error: session.last_error().map(str::to_string),
        }
    }
}

/// Drives one exam attempt: countdown against the server deadline and at-most-once submission.
///
/// Session state sits behind a synchronous mutex that is never held across an `.await`, so
/// the check-and-set of the submission state cannot interleave with another trigger.
pub struct AttemptController<S: ExamService + ?Sized> {
    attempt_id: AttemptId,
    service: Arc<S>,
    clock: Arc<dyn Clock>,
    session: Mutex<AttemptSession>,
    snapshot_tx: watch::Sender<AttemptSnapshot>,
}

impl<S: ExamService + ?Sized> AttemptController<S> {
    /// Fetches the attempt and derives its deadline. No timer runs until `run_timer`.
    pub async fn initialize(
        service: Arc<S>,
        clock: Arc<dyn Clock>,
        attempt_id: AttemptId,
    ) -> Result<Self, AttemptError> {
        let attempt = service.fetch_attempt(attempt_id).await.map_err(|err| {
            tracing::error!(attempt_id = %attempt_id, error = %err, "Failed to load exam attempt");
            AttemptError::from_fetch(attempt_id, err)
        })?;

        let session = AttemptSession::from_attempt(&attempt, clock.now())?;
        tracing::info!(
            attempt_id = %attempt_id,
            start_time = %format_offset(session.start_time()),
            deadline = %format_offset(session.deadline()),
            remaining_seconds = session.remaining_seconds(),
            "Exam attempt session initialized"
        );

        let (snapshot_tx, _) = watch::channel(AttemptSnapshot::of(&session));
        Ok(Self { attempt_id, service, clock, session: Mutex::new(session), snapshot_tx })
    }

    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    pub fn deadline(&self) -> OffsetDateTime {
        self.lock().deadline()
    }

    pub fn snapshot(&self) -> AttemptSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AttemptSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn answers(&self) -> AnswerSheet {
        self.lock().answers().clone()
    }

    /// Merges `partial` into the answer for `question_id`. Ignored once submission started.
    pub fn record_answer(&self, question_id: QuestionId, partial: AnswerState) -> bool {
        let recorded = self.lock().record_answer(question_id, partial);
        if !recorded {
            tracing::warn!(
                attempt_id = %self.attempt_id,
                question_id = %question_id,
                "Answer ignored; attempt is no longer active"
            );
        }
        recorded
    }

    /// Recomputes the countdown and submits with `SubmitReason::Expired` when it hits zero.
    pub async fn tick(&self) -> TickOutcome {
        let outcome = {
            let mut session = self.lock();
            let outcome = session.tick(self.clock.now());
            self.publish(&session);
            outcome
        };

        match outcome {
            SessionTick::Running { remaining_seconds } => TickOutcome::Running { remaining_seconds },
            SessionTick::Inactive => TickOutcome::Inactive,
            SessionTick::Expired => {
                tracing::info!(attempt_id = %self.attempt_id, "Exam time is up; submitting automatically");
                TickOutcome::Expired(self.submit(SubmitReason::Expired).await)
            }
        }
    }

    pub async fn submit(&self, reason: SubmitReason) -> Result<SubmitOutcome, AttemptError> {
        let request = {
            let mut session = self.lock();
            match session.begin_submit() {
                Some(request) => {
                    self.publish(&session);
                    request
                }
                None => {
                    let state = session.state();
                    drop(session);
                    metrics::counter!("exam_submission_duplicates_total", "reason" => reason.as_str())
                        .increment(1);
                    tracing::info!(
                        attempt_id = %self.attempt_id,
                        reason = reason.as_str(),
                        state = state.as_str(),
                        "Submit trigger ignored; attempt already left active state"
                    );
                    return Ok(SubmitOutcome::AlreadyHandled(state));
                }
            }
        };

        metrics::counter!("exam_submissions_total", "reason" => reason.as_str()).increment(1);
        tracing::info!(
            attempt_id = %self.attempt_id,
            reason = reason.as_str(),
            answers = request.answers.len(),
            "Submitting exam attempt"
        );
        self.send(request).await
    }

    /// Re-sends the frozen payload after a failed submission. Does not re-check `Active`.
    pub async fn retry_submit(&self) -> Result<SubmitOutcome, AttemptError> {
        let request = {
            let mut session = self.lock();
            let request = session.begin_retry()?;
            self.publish(&session);
            request
        };

        metrics::counter!("exam_submission_retries_total").increment(1);
        tracing::info!(attempt_id = %self.attempt_id, "Retrying exam submission");
        self.send(request).await
    }

    /// Ticks every `tick_interval` until the attempt expires, leaves `Active`, or `cancel`
    /// flips to `true`.
    pub async fn run_timer(
        &self,
        tick_interval: Duration,
        mut cancel: watch::Receiver<bool>,
    ) -> TimerExit {
        let mut ticker = interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cancel_open = true;

        loop {
            if *cancel.borrow() {
                tracing::info!(attempt_id = %self.attempt_id, "Attempt timer cancelled");
                return TimerExit::Cancelled;
            }

            tokio::select! {
                changed = cancel.changed(), if cancel_open => {
                    if changed.is_err() {
                        cancel_open = false;
                    }
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        TickOutcome::Running { .. } => {}
                        TickOutcome::Expired(result) => return TimerExit::Expired(result),
                        TickOutcome::Inactive => return TimerExit::Stopped,
                    }
                }
            }
        }
    }

    async fn send(&self, request: SubmitExamRequest) -> Result<SubmitOutcome, AttemptError> {
        match self.service.submit_answers(&request).await {
            Ok(()) => {
                {
                    let mut session = self.lock();
                    session.complete_submit();
                    self.publish(&session);
                }
                tracing::info!(attempt_id = %self.attempt_id, "Exam attempt submitted");
                Ok(SubmitOutcome::Submitted(RedirectTarget::Results { attempt_id: self.attempt_id }))
            }
            Err(err) => {
                let err = AttemptError::from_submit(err);
                {
                    let mut session = self.lock();
                    session.fail_submit(err.to_string());
                    self.publish(&session);
                }
                metrics::counter!("exam_submission_failures_total").increment(1);
                tracing::error!(
                    attempt_id = %self.attempt_id,
                    error = %err,
                    "Exam submission failed; waiting for manual retry"
                );
                Err(err)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, AttemptSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, session: &AttemptSession) {
        self.snapshot_tx.send_replace(AttemptSnapshot::of(session));
    }
}
