use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    pub worker_concurrency: u32,
    pub worker_poll_interval_ms: u64,
    pub job_timeout_seconds: u64,
    pub webhook_timeout_seconds: u64,
    pub queue_backoff_ms: u64,
    pub webhook_backoff_ms: u64,
    /// How long a claimed job may stay active before it is handed out again.
    pub job_lease_seconds: u64,
    pub reminder_max_attempts: u32,
    pub expiration_max_attempts: u32,
    pub webhook_max_attempts: u32,
    pub failed_job_retention: usize,
    pub completed_job_retention: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_service_key: String::new(),
            redis_url: None,
            redis_key_prefix: "agenda".to_string(),
            worker_concurrency: 5,
            worker_poll_interval_ms: 500,
            job_timeout_seconds: 120,
            webhook_timeout_seconds: 10,
            queue_backoff_ms: 5000,
            webhook_backoff_ms: 3000,
            job_lease_seconds: 150,
            reminder_max_attempts: 3,
            expiration_max_attempts: 3,
            webhook_max_attempts: 5,
            failed_job_retention: 500,
            completed_job_retention: 1000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_KEY not set, using empty value");
                    String::new()
                }),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            redis_key_prefix: env::var("REDIS_KEY_PREFIX")
                .unwrap_or(defaults.redis_key_prefix),
            worker_concurrency: parse_or("WORKER_CONCURRENCY", defaults.worker_concurrency),
            worker_poll_interval_ms: parse_or("WORKER_POLL_INTERVAL_MS", defaults.worker_poll_interval_ms),
            job_timeout_seconds: parse_or("JOB_TIMEOUT_SECONDS", defaults.job_timeout_seconds),
            webhook_timeout_seconds: parse_or("WEBHOOK_TIMEOUT_SECONDS", defaults.webhook_timeout_seconds),
            queue_backoff_ms: parse_or("QUEUE_BACKOFF_MS", defaults.queue_backoff_ms),
            webhook_backoff_ms: parse_or("WEBHOOK_BACKOFF_MS", defaults.webhook_backoff_ms),
            job_lease_seconds: parse_or("JOB_LEASE_SECONDS", defaults.job_lease_seconds),
            reminder_max_attempts: parse_or("REMINDER_MAX_ATTEMPTS", defaults.reminder_max_attempts),
            expiration_max_attempts: parse_or("EXPIRATION_MAX_ATTEMPTS", defaults.expiration_max_attempts),
            webhook_max_attempts: parse_or("WEBHOOK_MAX_ATTEMPTS", defaults.webhook_max_attempts),
            failed_job_retention: parse_or("FAILED_JOB_RETENTION", defaults.failed_job_retention),
            completed_job_retention: parse_or("COMPLETED_JOB_RETENTION", defaults.completed_job_retention),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }
        if config.job_lease_seconds <= config.job_timeout_seconds {
            warn!("JOB_LEASE_SECONDS should exceed JOB_TIMEOUT_SECONDS, running jobs may be handed out twice");
        }
        if !config.is_redis_configured() {
            warn!("REDIS_URL not set, jobs will not survive a restart");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_service_key.is_empty()
    }

    pub fn is_redis_configured(&self) -> bool {
        self.redis_url.is_some()
    }
}

fn parse_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_queue_budgets() {
        let config = AppConfig::default();
        assert_eq!(config.reminder_max_attempts, 3);
        assert_eq!(config.expiration_max_attempts, 3);
        assert_eq!(config.webhook_max_attempts, 5);
        assert_eq!(config.queue_backoff_ms, 5000);
        assert_eq!(config.webhook_backoff_ms, 3000);
        assert!(config.job_lease_seconds > config.job_timeout_seconds);
        assert!(!config.is_configured());
        assert!(!config.is_redis_configured());
    }

    #[test]
    fn parse_or_falls_back_on_garbage() {
        env::set_var("AGENDA_TEST_PARSE_OR", "not-a-number");
        assert_eq!(parse_or("AGENDA_TEST_PARSE_OR", 7u32), 7);
        env::set_var("AGENDA_TEST_PARSE_OR", " 12 ");
        assert_eq!(parse_or("AGENDA_TEST_PARSE_OR", 7u32), 12);
        env::remove_var("AGENDA_TEST_PARSE_OR");
    }
}
