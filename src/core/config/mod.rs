mod parsing;
mod settings;
mod types;

pub use types::{
    ConfigError, Environment, HttpSettings, RuntimeSettings, ServiceSettings, ServiceUrl,
    Settings, TelemetrySettings, TimerSettings,
};
