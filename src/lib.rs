pub mod attempt;
pub mod cli;
pub mod core;
pub mod grading;
pub mod schemas;
pub mod services;

#[cfg(test)]
mod test_support;

use crate::core::{config::Settings, telemetry};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let command = cli::parse_args(std::env::args().skip(1))?;

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    tracing::debug!(
        environment = %settings.runtime().environment.as_str(),
        exam_service = %settings.services().exam_service_url.as_str(),
        "igcse-exam starting"
    );

    let result = cli::execute(&settings, command).await;

    if let Some(rendered) = core::metrics::render() {
        eprintln!("{rendered}");
    }

    result
}
