use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::watch;

use crate::attempt::{
    format_remaining, AnswerState, AttemptController, AttemptError, SubmissionState,
    SubmitOutcome, SubmitReason, TimerExit,
};
use crate::core::config::Settings;
use crate::core::shutdown::cancel_on_shutdown;
use crate::core::time::SystemClock;
use crate::grading::ResultSummary;
use crate::schemas::exam::{AttemptId, ExamAttempt, ExamId, QuestionId, StartAttemptRequest, UserId};
use crate::services::{ExamService, GradingService, HttpExamService};

const USAGE: &str = "usage: igcse-exam <command>
  exams                                   list exams
  start <exam-id> [--user <user-id>]      start an attempt
  attempt <attempt-id> [--answers <file.json>] [--submit-now]
                                          run an attempt session
  history [--exam <exam-id>]              list past attempts
  result <attempt-id>                     print the graded result";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exams,
    Start { exam_id: ExamId, user_id: Option<UserId> },
    Attempt { attempt_id: AttemptId, answers: Option<PathBuf>, submit_now: bool },
    History { exam_id: Option<ExamId> },
    Result { attempt_id: AttemptId },
}

pub fn parse_args<I>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let command = args.next().ok_or_else(|| anyhow!("missing command\n{USAGE}"))?;

    match command.as_str() {
        "exams" => {
            if let Some(arg) = args.next() {
                bail!("Unknown argument: {arg}");
            }
            Ok(Command::Exams)
        }
        "start" => {
            let exam_id = ExamId(parse_id(args.next(), "exam id")?);
            let mut user_id = None;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--user" => user_id = Some(UserId(parse_id(args.next(), "--user")?)),
                    _ => bail!("Unknown argument: {arg}"),
                }
            }
            Ok(Command::Start { exam_id, user_id })
        }
        "attempt" => {
            let attempt_id = AttemptId(parse_id(args.next(), "attempt id")?);
            let mut answers = None;
            let mut submit_now = false;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--answers" => {
                        let path = args.next().ok_or_else(|| anyhow!("--answers missing value"))?;
                        answers = Some(PathBuf::from(path));
                    }
                    "--submit-now" => submit_now = true,
                    _ => bail!("Unknown argument: {arg}"),
                }
            }
            Ok(Command::Attempt { attempt_id, answers, submit_now })
        }
        "history" => {
            let mut exam_id = None;
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--exam" => exam_id = Some(ExamId(parse_id(args.next(), "--exam")?)),
                    _ => bail!("Unknown argument: {arg}"),
                }
            }
            Ok(Command::History { exam_id })
        }
        "result" => {
            let attempt_id = AttemptId(parse_id(args.next(), "attempt id")?);
            if let Some(arg) = args.next() {
                bail!("Unknown argument: {arg}");
            }
            Ok(Command::Result { attempt_id })
        }
        "-h" | "--help" | "help" => Err(anyhow!("{USAGE}")),
        other => Err(anyhow!("Unknown command: {other}\n{USAGE}")),
    }
}

fn parse_id(value: Option<String>, name: &str) -> Result<i64> {
    let value = value.ok_or_else(|| anyhow!("{name} missing value"))?;
    value.parse::<i64>().with_context(|| format!("{name} must be an integer, got {value:?}"))
}

/// Reads `{"<questionId>": {"selectedOptionId": n, "textAnswer": "..."}}`.
pub fn parse_answers(raw: &str) -> Result<Vec<(QuestionId, AnswerState)>> {
    let entries: BTreeMap<String, AnswerState> =
        serde_json::from_str(raw).context("Answers file is not a JSON object of answers")?;

    entries
        .into_iter()
        .map(|(key, answer)| {
            let question_id = key
                .trim()
                .parse::<i64>()
                .with_context(|| format!("Answer key {key:?} is not a question id"))?;
            Ok((QuestionId(question_id), answer))
        })
        .collect()
}

pub async fn execute(settings: &Settings, command: Command) -> Result<()> {
    match command {
        Command::Exams => list_exams(settings).await,
        Command::Start { exam_id, user_id } => start_attempt(settings, exam_id, user_id).await,
        Command::Attempt { attempt_id, answers, submit_now } => {
            run_attempt(settings, attempt_id, answers, submit_now).await
        }
        Command::History { exam_id } => history(settings, exam_id).await,
        Command::Result { attempt_id } => show_result(settings, attempt_id).await,
    }
}

async fn list_exams(settings: &Settings) -> Result<()> {
    let service = HttpExamService::from_settings(settings)?;
    let exams = service.list_exams().await?;
    if exams.is_empty() {
        println!("No exams available.");
        return Ok(());
    }

    for exam in exams {
        println!(
            "{}\t{}\t{} min\t{}",
            exam.exam_id,
            exam.title,
            exam.duration,
            if exam.is_active { "active" } else { "inactive" }
        );
    }
    Ok(())
}

async fn start_attempt(settings: &Settings, exam_id: ExamId, user_id: Option<UserId>) -> Result<()> {
    let service = HttpExamService::from_settings(settings)?;
    let response = service.start_attempt(&StartAttemptRequest { exam_id, user_id }).await?;
    println!("{}", response.attempt_id);
    Ok(())
}

async fn history(settings: &Settings, exam_id: Option<ExamId>) -> Result<()> {
    let service = HttpExamService::from_settings(settings)?;
    let attempts = match exam_id {
        Some(exam_id) => service.attempts_for_exam(exam_id).await?,
        None => service.attempt_history().await?,
    };

    for attempt in &attempts {
        println!("{}", history_line(attempt));
    }
    Ok(())
}

fn history_line(attempt: &ExamAttempt) -> String {
    let status = match (&attempt.submitted_at, attempt.total_score) {
        (Some(_), Some(score)) => format!("submitted, score {score:.1}"),
        (Some(_), None) => "submitted, not graded".to_string(),
        (None, _) => "in progress".to_string(),
    };
    format!(
        "{}\t{}\t{}\t{status}",
        attempt.attempt_id,
        attempt.exam.title,
        attempt.start_time.as_deref().unwrap_or("-")
    )
}

async fn show_result(settings: &Settings, attempt_id: AttemptId) -> Result<()> {
    let service = GradingService::from_settings(settings)?;
    let result = service.detailed_result(attempt_id).await?;
    print!("{}", ResultSummary::from_result(&result).render());
    Ok(())
}

async fn run_attempt(
    settings: &Settings,
    attempt_id: AttemptId,
    answers: Option<PathBuf>,
    submit_now: bool,
) -> Result<()> {
    let service = Arc::new(HttpExamService::from_settings(settings)?);
    let controller = AttemptController::initialize(service, Arc::new(SystemClock), attempt_id).await?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    if let Some(path) = answers {
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read answers file {}", path.display()))?;
        for (question_id, answer) in parse_answers(&raw)? {
            controller.record_answer(question_id, answer);
        }
        tracing::info!(attempt_id = %attempt_id, answers = controller.answers().len(), "Answers loaded");
    }
    if controller.answers().is_empty() {
        tracing::warn!(attempt_id = %attempt_id, "No answers recorded for this attempt");
    }

    let result = if submit_now {
        controller.submit(SubmitReason::Manual).await
    } else {
        println!(
            "Attempt {attempt_id}: {} remaining. Type `submit` and press Enter to hand in early.",
            format_remaining(seconds_i64(controller.snapshot().remaining_seconds))
        );
        let countdown = spawn_countdown(controller.subscribe());
        let end = drive_session(
            &controller,
            settings.timer().tick_interval(),
            cancel_on_shutdown(),
            &mut input,
        )
        .await;
        countdown.abort();
        println!();

        match end {
            SessionEnd::Finished(result) => result,
            SessionEnd::Cancelled => {
                println!("Attempt session cancelled; nothing was submitted.");
                return Ok(());
            }
        }
    };

    match result {
        Ok(outcome) => report(outcome),
        Err(AttemptError::Network(message)) if controller.snapshot().retry_available => {
            eprintln!("Submission failed: {message}");
            if !confirm("Retry submission? [y/N] ", &mut input).await? {
                bail!("attempt {attempt_id} was not submitted");
            }
            report(controller.retry_submit().await?)
        }
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug)]
enum SessionEnd {
    Finished(Result<SubmitOutcome, AttemptError>),
    Cancelled,
}

/// Runs the countdown while listening for a `submit` line on `input`, so a manual hand-in
/// races the expiry trigger through the same guarded `submit`.
async fn drive_session<S, R>(
    controller: &AttemptController<S>,
    tick_interval: Duration,
    cancel: watch::Receiver<bool>,
    input: &mut Lines<R>,
) -> SessionEnd
where
    S: ExamService + ?Sized,
    R: AsyncBufRead + Unpin,
{
    let timer = controller.run_timer(tick_interval, cancel);
    tokio::pin!(timer);
    let mut input_open = true;

    loop {
        tokio::select! {
            exit = &mut timer => {
                return match exit {
                    TimerExit::Expired(result) => SessionEnd::Finished(result),
                    TimerExit::Stopped => SessionEnd::Finished(Ok(SubmitOutcome::AlreadyHandled(
                        controller.snapshot().submission_state,
                    ))),
                    TimerExit::Cancelled => SessionEnd::Cancelled,
                };
            }
            line = input.next_line(), if input_open => {
                match line {
                    Ok(Some(line)) if line.trim().eq_ignore_ascii_case("submit") => {
                        match controller.submit(SubmitReason::Manual).await {
                            // An expiry submission is in flight; the timer reports its result.
                            Ok(SubmitOutcome::AlreadyHandled(_)) => {}
                            result => return SessionEnd::Finished(result),
                        }
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => input_open = false,
                    Err(err) => {
                        tracing::warn!(error = %err, "Stopped reading commands from stdin");
                        input_open = false;
                    }
                }
            }
        }
    }
}

fn report(outcome: SubmitOutcome) -> Result<()> {
    match outcome {
        SubmitOutcome::Submitted(target) => println!("Submitted. Results: {}", target.path()),
        SubmitOutcome::AlreadyHandled(state) => {
            println!("Nothing sent; attempt is already {}.", state.as_str())
        }
    }
    Ok(())
}

fn spawn_countdown(
    mut updates: watch::Receiver<crate::attempt::AttemptSnapshot>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            if snapshot.submission_state != SubmissionState::Active {
                break;
            }
            print!("\rTime remaining: {}", format_remaining(seconds_i64(snapshot.remaining_seconds)));
            let _ = std::io::stdout().flush();
        }
    })
}

fn seconds_i64(seconds: u64) -> i64 {
    i64::try_from(seconds).unwrap_or(i64::MAX)
}

async fn confirm<R: AsyncBufRead + Unpin>(prompt: &str, input: &mut Lines<R>) -> Result<bool> {
    eprint!("{prompt}");
    let _ = std::io::stderr().flush();

    let line = input.next_line().await?.unwrap_or_default();
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::exam::{AttemptExam, OptionId};
    use crate::test_support::{attempt_fixture, FakeExamService, ManualClock};
    use time::macros::datetime;
    use time::OffsetDateTime;

    const NOW: OffsetDateTime = datetime!(2025-06-01 12:00:00 UTC);

    fn input(raw: &'static str) -> Lines<BufReader<&'static [u8]>> {
        BufReader::new(raw.as_bytes()).lines()
    }

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|arg| arg.to_string()).collect()
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_args(args(&["exams"])).expect("exams"), Command::Exams);
        assert_eq!(
            parse_args(args(&["start", "3", "--user", "17"])).expect("start"),
            Command::Start { exam_id: ExamId(3), user_id: Some(UserId(17)) }
        );
        assert_eq!(
            parse_args(args(&["attempt", "42", "--answers", "a.json", "--submit-now"]))
                .expect("attempt"),
            Command::Attempt {
                attempt_id: AttemptId(42),
                answers: Some(PathBuf::from("a.json")),
                submit_now: true,
            }
        );
        assert_eq!(
            parse_args(args(&["history", "--exam", "3"])).expect("history"),
            Command::History { exam_id: Some(ExamId(3)) }
        );
        assert_eq!(
            parse_args(args(&["result", "42"])).expect("result"),
            Command::Result { attempt_id: AttemptId(42) }
        );
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_args(Vec::new()).is_err());
        assert!(parse_args(args(&["grade"])).is_err());
        assert!(parse_args(args(&["start"])).is_err());
        assert!(parse_args(args(&["start", "abc"])).is_err());
        assert!(parse_args(args(&["attempt", "1", "--answers"])).is_err());
        assert!(parse_args(args(&["result", "1", "--verbose"])).is_err());
    }

    #[test]
    fn parses_answers_file() {
        let answers = parse_answers(
            r#"{
                "5": {"selectedOptionId": 42},
                "12": {"textAnswer": "Covalent bonds share electrons."},
                "3": {"selectedOptionId": 7, "textAnswer": "because"}
            }"#,
        )
        .expect("answers");

        assert_eq!(answers.len(), 3);
        assert!(answers.contains(&(QuestionId(5), AnswerState::selected(OptionId(42)))));
        assert!(answers
            .contains(&(QuestionId(12), AnswerState::text("Covalent bonds share electrons."))));
        assert!(answers.contains(&(
            QuestionId(3),
            AnswerState {
                selected_option_id: Some(OptionId(7)),
                text_answer: Some("because".to_string()),
            }
        )));
    }

    #[test]
    fn rejects_non_numeric_answer_keys() {
        assert!(parse_answers(r#"{"q1": {"textAnswer": "x"}}"#).is_err());
        assert!(parse_answers("[1, 2]").is_err());
    }

    #[test]
    fn history_lines_show_status() {
        let mut attempt = ExamAttempt {
            attempt_id: AttemptId(8),
            start_time: Some("2025-06-01T09:00:00".to_string()),
            submitted_at: None,
            total_score: None,
            exam: AttemptExam {
                exam_id: Some(ExamId(1)),
                title: "Physics".to_string(),
                description: None,
                duration: 60,
                questions: Vec::new(),
            },
            answers: Vec::new(),
        };
        assert_eq!(history_line(&attempt), "8\tPhysics\t2025-06-01T09:00:00\tin progress");

        attempt.submitted_at = Some("2025-06-01T09:40:00".to_string());
        attempt.total_score = Some(6.5);
        assert!(history_line(&attempt).ends_with("submitted, score 6.5"));
    }

    #[tokio::test]
    async fn submit_line_hands_in_while_countdown_runs() {
        let service = Arc::new(FakeExamService::with_attempt(attempt_fixture(7, NOW, 30)));
        let controller =
            AttemptController::initialize(service.clone(), ManualClock::new(NOW), AttemptId(7))
                .await
                .expect("initialize");
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let end = drive_session(
            &controller,
            Duration::from_millis(5),
            cancel_rx,
            &mut input("hello\n  SUBMIT \n"),
        )
        .await;

        assert!(matches!(end, SessionEnd::Finished(Ok(SubmitOutcome::Submitted(_)))));
        assert_eq!(service.submit_calls(), 1);
        assert_eq!(controller.snapshot().submission_state, SubmissionState::Submitted);
    }

    #[tokio::test]
    async fn expiry_wins_when_no_submit_line_arrives() {
        let service = Arc::new(FakeExamService::with_attempt(attempt_fixture(
            7,
            NOW - time::Duration::minutes(2),
            1,
        )));
        let controller =
            AttemptController::initialize(service.clone(), ManualClock::new(NOW), AttemptId(7))
                .await
                .expect("initialize");
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let end =
            drive_session(&controller, Duration::from_millis(5), cancel_rx, &mut input("later\n"))
                .await;

        assert!(matches!(end, SessionEnd::Finished(Ok(SubmitOutcome::Submitted(_)))));
        assert_eq!(service.submit_calls(), 1);
    }

    #[tokio::test]
    async fn failed_manual_submit_is_reported_for_retry() {
        let service = Arc::new(
            FakeExamService::with_attempt(attempt_fixture(7, NOW, 30)).failing_submits(1),
        );
        let controller =
            AttemptController::initialize(service.clone(), ManualClock::new(NOW), AttemptId(7))
                .await
                .expect("initialize");
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let end =
            drive_session(&controller, Duration::from_millis(5), cancel_rx, &mut input("submit\n"))
                .await;

        assert!(matches!(end, SessionEnd::Finished(Err(AttemptError::Network(_)))));
        assert!(controller.snapshot().retry_available);
        assert!(confirm("retry? ", &mut input("yes\n")).await.expect("confirm"));
        assert!(!confirm("retry? ", &mut input("")).await.expect("confirm"));
    }
}
