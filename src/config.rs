//! Environment-driven configuration, following this codebase's
//! `parse_env_with_default` convention for fallible env parsing without
//! `unwrap()`.

use std::str::FromStr;

/// Dispatcher tuning knobs, loaded once at process start.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub database_url: String,
    pub lease_batch_size: i64,
    pub process_batch_size: usize,
    pub max_attempts: i32,
    pub poll_interval_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub stale_lease_secs: i64,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
}

impl DispatcherConfig {
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable not set".to_string())?;

        Ok(Self {
            database_url,
            lease_batch_size: parse_env_with_default("OUTBOX_LEASE_BATCH_SIZE", 200),
            process_batch_size: parse_env_with_default("OUTBOX_PROCESS_BATCH_SIZE", 32),
            max_attempts: parse_env_with_default("OUTBOX_MAX_ATTEMPTS", 8),
            poll_interval_ms: parse_env_with_default("OUTBOX_POLL_INTERVAL_MS", 20),
            shutdown_timeout_ms: parse_env_with_default("OUTBOX_SHUTDOWN_TIMEOUT_MS", 30_000),
            stale_lease_secs: parse_env_with_default("OUTBOX_STALE_LEASE_SECS", 300),
            db_max_connections: parse_env_with_default("DB_MAX_CONNECTIONS", 20),
            db_min_connections: parse_env_with_default("DB_MIN_CONNECTIONS", 5),
            db_acquire_timeout_secs: parse_env_with_default("DB_ACQUIRE_TIMEOUT_SECS", 10),
        })
    }

    /// Warns once at construction time about configuration pathologies that
    /// are accepted rather than rejected (§4.3, §4.9 of the dispatcher spec).
    pub fn warn_on_pathologies(&self) {
        if self.lease_batch_size <= 0 {
            tracing::warn!("OUTBOX_LEASE_BATCH_SIZE <= 0: leasing is disabled");
        }
        if self.process_batch_size == 0 {
            tracing::warn!(
                "OUTBOX_PROCESS_BATCH_SIZE is 0: leased rows will never be processed here and will only be recovered via stale-lease reclamation by another worker"
            );
        }
    }
}

/// Parses an environment variable with a default fallback, never panicking
/// on a missing or malformed value.
fn parse_env_with_default<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn from_env_requires_database_url() {
        std::env::remove_var("DATABASE_URL");
        assert!(DispatcherConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn from_env_applies_defaults() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        std::env::remove_var("OUTBOX_LEASE_BATCH_SIZE");

        let config = DispatcherConfig::from_env().unwrap();
        assert_eq!(config.lease_batch_size, 200);
        assert_eq!(config.process_batch_size, 32);
        assert_eq!(config.max_attempts, 8);
        assert_eq!(config.poll_interval_ms, 20);

        std::env::remove_var("DATABASE_URL");
    }

    #[test]
    #[serial]
    fn from_env_reads_overrides() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        std::env::set_var("OUTBOX_MAX_ATTEMPTS", "3");

        let config = DispatcherConfig::from_env().unwrap();
        assert_eq!(config.max_attempts, 3);

        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("OUTBOX_MAX_ATTEMPTS");
    }
}
