pub mod exam_service;
pub mod grading_service;
pub mod http;

pub use exam_service::{ExamService, HttpExamService};
pub use grading_service::GradingService;
pub use http::ServiceError;
