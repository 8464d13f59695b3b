use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_environment, parse_positive_u64,
};
use super::types::{
    ConfigError, HttpSettings, RuntimeSettings, ServiceSettings, ServiceUrl, Settings,
    TelemetrySettings, TimerSettings,
};

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            parse_environment(env_optional("IGCSE_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("IGCSE_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let exam_service_url = ServiceUrl::parse(
            "EXAM_SERVICE_URL",
            env_or_default("EXAM_SERVICE_URL", "http://localhost:8080"),
        )?;
        let ai_service_url = ServiceUrl::parse(
            "AI_SERVICE_URL",
            env_or_default("AI_SERVICE_URL", "http://localhost:8080/api/ai"),
        )?;
        let access_token = env_optional("ACCESS_TOKEN");

        let connect_timeout_seconds = parse_positive_u64(
            "HTTP_CONNECT_TIMEOUT_SECONDS",
            env_or_default("HTTP_CONNECT_TIMEOUT_SECONDS", "10"),
        )?;
        let request_timeout_seconds = parse_positive_u64(
            "HTTP_REQUEST_TIMEOUT_SECONDS",
            env_or_default("HTTP_REQUEST_TIMEOUT_SECONDS", "30"),
        )?;

        let tick_interval_ms =
            parse_positive_u64("TICK_INTERVAL_MS", env_or_default("TICK_INTERVAL_MS", "1000"))?;

        let log_level = env_or_default("IGCSE_LOG_LEVEL", "info");
        let json = env_optional("IGCSE_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            services: ServiceSettings { exam_service_url, ai_service_url, access_token },
            http: HttpSettings { connect_timeout_seconds, request_timeout_seconds },
            timer: TimerSettings { tick_interval_ms },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn services(&self) -> &ServiceSettings {
        &self.services
    }

    pub fn http(&self) -> &HttpSettings {
        &self.http
    }

    pub fn timer(&self) -> &TimerSettings {
        &self.timer
    }

    pub fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.http.request_timeout_seconds < self.http.connect_timeout_seconds {
            return Err(ConfigError::InvalidValue {
                field: "HTTP_REQUEST_TIMEOUT_SECONDS",
                value: self.http.request_timeout_seconds.to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.services.access_token.is_none() {
            return Err(ConfigError::MissingSecret("ACCESS_TOKEN"));
        }

        Ok(())
    }
}
