pub mod answers;
pub mod controller;
pub mod errors;
pub mod session;
pub mod timing;


pub use answers::{AnswerSheet, AnswerState};
pub use controller::{
    AttemptController, AttemptSnapshot, RedirectTarget, SubmitOutcome, TickOutcome, TimerExit,
};
pub use errors::AttemptError;
pub use session::{AttemptSession, SubmissionState, SubmitReason};
pub use timing::format_remaining;
