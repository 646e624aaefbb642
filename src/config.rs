/// Configuration management for the admin gate
use crate::error::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub admin_auth: AdminAuthConfig,
    pub logging: LoggingConfig,
    pub housekeeping: HousekeepingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Take the client address from `x-forwarded-for` instead of the socket peer
    pub trust_proxy_headers: bool,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Two-step authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminAuthConfig {
    /// Lifetime of a session that has only passed step 1
    pub step1_ttl_secs: i64,
    /// Lifetime of a fully authenticated session, refreshed on step 2
    pub authenticated_ttl_secs: i64,
    /// Sliding window for the attempt throttle
    pub throttle_window_secs: i64,
    /// Attempts allowed per (ip, step) inside the window
    pub throttle_max_attempts: i64,
    /// Privileged routes also demand a fully authenticated two-step session
    pub require_two_step_for_privileged: bool,
    /// PHC hash provisioned for step 1 at startup
    #[serde(skip_serializing)]
    pub step1_passhash: Option<String>,
    /// PHC hash provisioned for step 2 at startup
    #[serde(skip_serializing)]
    pub step2_passhash: Option<String>,
}

impl Default for AdminAuthConfig {
    fn default() -> Self {
        Self {
            step1_ttl_secs: 5 * 60,
            authenticated_ttl_secs: 30 * 60,
            throttle_window_secs: 30 * 60,
            throttle_max_attempts: 5,
            require_two_step_for_privileged: false,
            step1_passhash: None,
            step2_passhash: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

/// Background housekeeping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousekeepingConfig {
    /// How long attempt rows are kept once they fall out of the throttle window
    pub attempt_retention_secs: i64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl GateConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> GateResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("GATE_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("GATE_PORT")
            .unwrap_or_else(|_| "8787".to_string())
            .parse()
            .map_err(|_| GateError::Validation("Invalid port number".to_string()))?;

        let data_directory: PathBuf = env::var("GATE_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("GATE_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("gate.sqlite"));

        let defaults = AdminAuthConfig::default();
        let admin_auth = AdminAuthConfig {
            step1_ttl_secs: env_or("GATE_STEP1_TTL_SECS", defaults.step1_ttl_secs),
            authenticated_ttl_secs: env_or(
                "GATE_AUTHENTICATED_TTL_SECS",
                defaults.authenticated_ttl_secs,
            ),
            throttle_window_secs: env_or("GATE_THROTTLE_WINDOW_SECS", defaults.throttle_window_secs),
            throttle_max_attempts: env_or(
                "GATE_THROTTLE_MAX_ATTEMPTS",
                defaults.throttle_max_attempts,
            ),
            require_two_step_for_privileged: env_or("GATE_REQUIRE_TWO_STEP_FOR_PRIVILEGED", false),
            step1_passhash: env::var("GATE_STEP1_PASSHASH").ok().filter(|s| !s.is_empty()),
            step2_passhash: env::var("GATE_STEP2_PASSHASH").ok().filter(|s| !s.is_empty()),
        };

        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let json = env::var("GATE_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let attempt_retention_secs = env_or("GATE_ATTEMPT_RETENTION_SECS", 86_400);

        Ok(GateConfig {
            service: ServiceConfig {
                hostname,
                port,
                trust_proxy_headers: env_or("GATE_TRUST_PROXY_HEADERS", false),
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            admin_auth,
            logging: LoggingConfig { level, json },
            housekeeping: HousekeepingConfig {
                attempt_retention_secs,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> GateResult<()> {
        if self.service.hostname.is_empty() {
            return Err(GateError::Validation("Hostname cannot be empty".to_string()));
        }

        let auth = &self.admin_auth;
        if auth.step1_ttl_secs <= 0 || auth.authenticated_ttl_secs <= 0 {
            return Err(GateError::Validation(
                "Session lifetimes must be positive".to_string(),
            ));
        }
        if auth.throttle_window_secs <= 0 || auth.throttle_max_attempts <= 0 {
            return Err(GateError::Validation(
                "Throttle window and attempt limit must be positive".to_string(),
            ));
        }

        // Attempts must outlive the window or the throttle under-counts
        if self.housekeeping.attempt_retention_secs < auth.throttle_window_secs {
            return Err(GateError::Validation(
                "Attempt retention must be at least the throttle window".to_string(),
            ));
        }

        Ok(())
    }
}

/// Fixed configuration for tests, independent of the environment
#[cfg(test)]
impl GateConfig {
    pub fn for_tests() -> Self {
        GateConfig {
            service: ServiceConfig {
                hostname: "localhost".to_string(),
                port: 8787,
                trust_proxy_headers: false,
            },
            storage: StorageConfig {
                data_directory: "./data".into(),
                database: "./data/gate.sqlite".into(),
            },
            admin_auth: AdminAuthConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
            housekeeping: HousekeepingConfig {
                attempt_retention_secs: 86_400,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> GateConfig {
        GateConfig::for_tests()
    }

    #[test]
    fn test_defaults_match_protocol_windows() {
        let auth = AdminAuthConfig::default();
        assert_eq!(auth.step1_ttl_secs, 300);
        assert_eq!(auth.authenticated_ttl_secs, 1800);
        assert_eq!(auth.throttle_window_secs, 1800);
        assert_eq!(auth.throttle_max_attempts, 5);
        assert!(!auth.require_two_step_for_privileged);
    }

    #[test]
    fn test_validate() {
        assert!(sample().validate().is_ok());

        let mut config = sample();
        config.admin_auth.throttle_max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.housekeeping.attempt_retention_secs = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_passhashes_not_serialized() {
        let mut config = sample();
        config.admin_auth.step1_passhash = Some("$argon2id$secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("argon2id"));
    }
}
