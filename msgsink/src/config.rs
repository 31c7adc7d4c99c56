//! Configuration module for environment variable parsing.

use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret for webhook signature verification.
    ///
    /// Absence is a permanent misconfiguration, not a per-request error:
    /// the process still starts and serves reads, readiness reports
    /// not-ready, and ingestion fails closed.
    pub webhook_secret: Option<String>,

    /// SQLite database file path
    pub database_path: PathBuf,

    /// Port for the web server to listen on
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            webhook_secret: env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),

            database_path: env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/data/app.db")),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
        }
    }

    /// Secret as raw bytes for HMAC verification.
    pub fn secret_bytes(&self) -> Option<&[u8]> {
        self.webhook_secret.as_deref().map(str::as_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // from_env reads fixed variable names, so tests that mutate the
    // environment serialize on this lock.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        env::remove_var("WEBHOOK_SECRET");
        env::remove_var("DATABASE_PATH");
        env::remove_var("PORT");
    }

    #[test]
    fn test_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let config = Config::from_env();
        assert_eq!(config.webhook_secret, None);
        assert_eq!(config.database_path, PathBuf::from("/data/app.db"));
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_explicit_values() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("WEBHOOK_SECRET", "hunter2");
        env::set_var("DATABASE_PATH", "/tmp/test.db");
        env::set_var("PORT", "9090");

        let config = Config::from_env();
        assert_eq!(config.webhook_secret.as_deref(), Some("hunter2"));
        assert_eq!(config.secret_bytes(), Some(&b"hunter2"[..]));
        assert_eq!(config.database_path, PathBuf::from("/tmp/test.db"));
        assert_eq!(config.port, 9090);

        clear_env();
    }

    #[test]
    fn test_empty_secret_treated_as_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("WEBHOOK_SECRET", "");

        let config = Config::from_env();
        assert_eq!(config.webhook_secret, None);
        assert_eq!(config.secret_bytes(), None);

        clear_env();
    }

    #[test]
    fn test_invalid_port_falls_back_to_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        env::set_var("PORT", "not-a-port");

        let config = Config::from_env();
        assert_eq!(config.port, 8080);

        clear_env();
    }
}
