/// Configuration management for the Waypost patrol server
use crate::error::{PatrolError, PatrolResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub checkin: CheckinConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Base URL embedded in bind / check-in QR payloads, e.g. https://patrol.example.com
    pub public_base_url: String,
    pub version: String,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret for admin console bearer tokens
    pub admin_jwt_secret: String,
    /// HMAC secret for legacy signed point QR payloads
    pub qr_signing_secret: String,
    /// Default TTL for binding codes, in minutes
    pub binding_code_ttl_minutes: i64,
}

/// Check-in policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinConfig {
    /// Minimum seconds between accepted check-ins for the same (identity, point) key
    pub cooldown_seconds: i64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> PatrolResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("WAYPOST_HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("WAYPOST_PORT")
            .unwrap_or_else(|_| "8420".to_string())
            .parse()
            .map_err(|_| PatrolError::Validation("Invalid port number".to_string()))?;
        let public_base_url = env::var("WAYPOST_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{}:{}", hostname, port));
        let version = env::var("WAYPOST_VERSION").unwrap_or_else(|_| "0.1.0".to_string());

        let data_directory: PathBuf = env::var("WAYPOST_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("WAYPOST_DB_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("waypost.sqlite"));

        let admin_jwt_secret = env::var("WAYPOST_ADMIN_JWT_SECRET")
            .map_err(|_| PatrolError::Validation("Admin JWT secret required".to_string()))?;
        let qr_signing_secret = env::var("WAYPOST_QR_SIGNING_SECRET")
            .map_err(|_| PatrolError::Validation("QR signing secret required".to_string()))?;
        let binding_code_ttl_minutes = env::var("WAYPOST_BINDING_CODE_TTL_MINUTES")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let cooldown_seconds = env::var("WAYPOST_CHECKIN_COOLDOWN_SECONDS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .unwrap_or(60);

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                public_base_url,
                version,
            },
            storage: StorageConfig {
                data_directory,
                database,
            },
            auth: AuthConfig {
                admin_jwt_secret,
                qr_signing_secret,
                binding_code_ttl_minutes,
            },
            checkin: CheckinConfig { cooldown_seconds },
            logging: LoggingConfig { level: log_level },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> PatrolResult<()> {
        if self.service.hostname.is_empty() {
            return Err(PatrolError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.auth.admin_jwt_secret.len() < 32 {
            return Err(PatrolError::Validation(
                "Admin JWT secret must be at least 32 characters".to_string(),
            ));
        }

        if self.checkin.cooldown_seconds < 0 {
            return Err(PatrolError::Validation(
                "Cooldown seconds cannot be negative".to_string(),
            ));
        }

        Ok(())
    }

    /// Bind URL for a one-time binding code
    pub fn bind_url(&self, code: &str) -> String {
        format!(
            "{}/patrol/bind?code={}",
            self.service.public_base_url.trim_end_matches('/'),
            urlencode(code)
        )
    }

    /// Stable bind URL for a permanent device identifier
    pub fn permanent_bind_url(&self, device_public_id: &str) -> String {
        format!(
            "{}/patrol/bind/permanent/{}",
            self.service.public_base_url.trim_end_matches('/'),
            urlencode(device_public_id)
        )
    }

    /// Stable check-in URL for a patrol point
    pub fn point_checkin_url(&self, public_id: &str) -> String {
        format!(
            "{}/patrol/checkin/{}",
            self.service.public_base_url.trim_end_matches('/'),
            urlencode(public_id)
        )
    }
}

/// Percent-encode a path/query component
fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// Fixed config for in-module tests across the crate
#[cfg(test)]
pub(crate) fn test_config() -> ServerConfig {
    ServerConfig {
        service: ServiceConfig {
            hostname: "localhost".to_string(),
            port: 8420,
            public_base_url: "https://patrol.example.com/".to_string(),
            version: "0.1.0".to_string(),
        },
        storage: StorageConfig {
            data_directory: "./data".into(),
            database: "./data/waypost.sqlite".into(),
        },
        auth: AuthConfig {
            admin_jwt_secret: "0123456789abcdef0123456789abcdef".to_string(),
            qr_signing_secret: "qr-secret".to_string(),
            binding_code_ttl_minutes: 10,
        },
        checkin: CheckinConfig { cooldown_seconds: 60 },
        logging: LoggingConfig {
            level: "info".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_secret() {
        let mut config = test_config();
        config.auth.admin_jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_urls_strip_trailing_slash() {
        let config = test_config();
        assert_eq!(
            config.point_checkin_url("abc-123"),
            "https://patrol.example.com/patrol/checkin/abc-123"
        );
        assert!(config.bind_url("a+b").starts_with("https://patrol.example.com/patrol/bind?code="));
    }
}
