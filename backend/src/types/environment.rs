//! Environment configuration for different deployment stages

use std::env;
use std::time::Duration;

use aws_config::{retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion};
use tracing::Level;

/// `LocalStack` endpoint used in development
const LOCALSTACK_ENDPOINT: &str = "http://localhost:4566";

/// Default lifetime of presigned photo URLs (1 hour)
const DEFAULT_SIGNED_URL_EXPIRY_SECS: u64 = 60 * 60;

/// Default number of cached presigned URLs
const DEFAULT_SIGNED_URL_CACHE_CAPACITY: usize = 1024;

/// Default upload limit (5 MiB)
const DEFAULT_MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

/// Default time after which an untouched edit session is cancelled (1 hour)
const DEFAULT_EDIT_SESSION_IDLE_SECS: u64 = 60 * 60;

/// Application environment configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    /// Production environment
    Production,
    /// Staging environment
    Staging,
    /// Development environment (uses `LocalStack`)
    Development {
        /// Optional override for presigned URL expiry in seconds
        signed_url_expiry_override: Option<u64>,
    },
}

impl Environment {
    /// Creates an Environment from the `APP_ENV` environment variable
    ///
    /// # Panics
    ///
    /// Panics if `APP_ENV` contains an invalid value
    #[must_use]
    pub fn from_env() -> Self {
        let env = env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .trim()
            .to_lowercase();

        match env.as_str() {
            "production" => Self::Production,
            "staging" => Self::Staging,
            "development" => {
                let signed_url_expiry_override = env::var("SIGNED_URL_EXPIRY_SECS")
                    .ok()
                    .and_then(|val| val.parse::<u64>().ok());

                Self::Development {
                    signed_url_expiry_override,
                }
            }
            _ => panic!("Invalid environment: {env}"),
        }
    }

    /// Returns the S3 bucket name for profile photos
    ///
    /// # Panics
    ///
    /// Panics if the `S3_BUCKET_NAME` environment variable is not set outside development
    #[must_use]
    pub fn s3_bucket(&self) -> String {
        match self {
            Self::Production | Self::Staging => {
                env::var("S3_BUCKET_NAME").expect("S3_BUCKET_NAME environment variable is not set")
            }
            Self::Development { .. } => {
                env::var("S3_BUCKET_NAME").unwrap_or_else(|_| "heritage-profile-photos".to_string())
            }
        }
    }

    /// Returns the `DynamoDB` table holding profiles
    ///
    /// # Panics
    ///
    /// Panics if the `PROFILES_TABLE_NAME` environment variable is not set outside development
    #[must_use]
    pub fn profiles_table_name(&self) -> String {
        match self {
            Self::Production | Self::Staging => env::var("PROFILES_TABLE_NAME")
                .expect("PROFILES_TABLE_NAME environment variable is not set"),
            Self::Development { .. } => {
                env::var("PROFILES_TABLE_NAME").unwrap_or_else(|_| "profiles".to_string())
            }
        }
    }

    /// Public URL prefix of stored photos
    ///
    /// # Panics
    ///
    /// Panics if the `PHOTO_PUBLIC_BASE_URL` environment variable is not set outside development
    #[must_use]
    pub fn photo_public_base_url(&self) -> String {
        match self {
            Self::Production | Self::Staging => env::var("PHOTO_PUBLIC_BASE_URL")
                .expect("PHOTO_PUBLIC_BASE_URL environment variable is not set"),
            Self::Development { .. } => env::var("PHOTO_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("{LOCALSTACK_ENDPOINT}/{}", self.s3_bucket())),
        }
    }

    /// Whether to show API docs
    #[must_use]
    pub const fn show_api_docs(&self) -> bool {
        matches!(self, Self::Development { .. } | Self::Staging)
    }

    /// Returns the endpoint URL to use for AWS services
    #[must_use]
    pub const fn override_aws_endpoint_url(&self) -> Option<&str> {
        match self {
            Self::Production | Self::Staging => None,
            Self::Development { .. } => Some(LOCALSTACK_ENDPOINT),
        }
    }

    /// AWS configuration with retry and timeout settings
    pub async fn aws_config(&self) -> aws_config::SdkConfig {
        let retry_config = RetryConfig::standard()
            .with_max_attempts(3)
            .with_initial_backoff(Duration::from_millis(50));

        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(30))
            .build();

        let mut config_builder = aws_config::load_defaults(BehaviorVersion::latest())
            .await
            .to_builder()
            .retry_config(retry_config)
            .timeout_config(timeout_config);

        if let Some(endpoint_url) = self.override_aws_endpoint_url() {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }

        config_builder.build()
    }

    /// AWS S3 service configuration
    pub async fn s3_client_config(&self) -> aws_sdk_s3::Config {
        let aws_config = self.aws_config().await;
        let s3_config: aws_sdk_s3::Config = (&aws_config).into();
        let mut builder = s3_config.to_builder();

        // LocalStack only serves path-style bucket addressing
        if matches!(self, Self::Development { .. }) {
            builder.set_force_path_style(Some(true));
        }

        builder.build()
    }

    /// Presigned photo URL expiry time in seconds
    #[must_use]
    pub fn signed_url_expiry_secs(&self) -> u64 {
        match self {
            Self::Production | Self::Staging => DEFAULT_SIGNED_URL_EXPIRY_SECS,
            Self::Development {
                signed_url_expiry_override,
            } => signed_url_expiry_override.unwrap_or(DEFAULT_SIGNED_URL_EXPIRY_SECS),
        }
    }

    /// Remaining lifetime below which a cached URL is re-signed
    #[must_use]
    pub fn signed_url_refresh_margin_secs(&self) -> u64 {
        self.signed_url_expiry_secs() / 10
    }

    /// Maximum number of cached presigned URLs
    #[must_use]
    pub fn signed_url_cache_capacity(&self) -> usize {
        env::var("SIGNED_URL_CACHE_CAPACITY")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(DEFAULT_SIGNED_URL_CACHE_CAPACITY)
    }

    /// Maximum accepted photo size in bytes
    #[must_use]
    pub fn max_photo_bytes(&self) -> usize {
        env::var("MAX_PHOTO_BYTES")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_PHOTO_BYTES)
    }

    /// Seconds an edit session may sit untouched before it is cancelled
    #[must_use]
    pub fn edit_session_idle_secs(&self) -> u64 {
        env::var("EDIT_SESSION_IDLE_SECS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_EDIT_SESSION_IDLE_SECS)
    }

    /// Log level used when `RUST_LOG` is not set
    #[must_use]
    pub fn tracing_level(&self) -> Level {
        env::var("TRACING_LEVEL")
            .ok()
            .and_then(|val| val.parse::<Level>().ok())
            .unwrap_or(match self {
                Self::Production | Self::Staging => Level::INFO,
                Self::Development { .. } => Level::DEBUG,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_environment_from_env() {
        env::remove_var("APP_ENV");
        env::remove_var("SIGNED_URL_EXPIRY_SECS");
        assert_eq!(
            Environment::from_env(),
            Environment::Development {
                signed_url_expiry_override: None
            }
        );

        env::set_var("APP_ENV", "development");
        assert_eq!(
            Environment::from_env(),
            Environment::Development {
                signed_url_expiry_override: None
            }
        );

        env::set_var("APP_ENV", "staging");
        assert_eq!(Environment::from_env(), Environment::Staging);

        env::set_var("APP_ENV", " Production ");
        assert_eq!(Environment::from_env(), Environment::Production);

        env::remove_var("APP_ENV");
    }

    #[test]
    #[serial]
    #[should_panic(expected = "Invalid environment: invalid")]
    fn test_invalid_environment() {
        env::set_var("APP_ENV", "invalid");
        let _ = Environment::from_env();
    }

    #[test]
    #[serial]
    fn test_signed_url_expiry_secs() {
        let env = Environment::Development {
            signed_url_expiry_override: None,
        };
        assert_eq!(env.signed_url_expiry_secs(), 3600);
        assert_eq!(env.signed_url_refresh_margin_secs(), 360);

        let env = Environment::Development {
            signed_url_expiry_override: Some(120),
        };
        assert_eq!(env.signed_url_expiry_secs(), 120);

        assert_eq!(Environment::Production.signed_url_expiry_secs(), 3600);
        assert_eq!(Environment::Staging.signed_url_expiry_secs(), 3600);
    }

    #[test]
    #[serial]
    fn test_development_defaults() {
        env::remove_var("S3_BUCKET_NAME");
        env::remove_var("PROFILES_TABLE_NAME");
        env::remove_var("PHOTO_PUBLIC_BASE_URL");
        env::remove_var("MAX_PHOTO_BYTES");
        env::remove_var("SIGNED_URL_CACHE_CAPACITY");
        env::remove_var("EDIT_SESSION_IDLE_SECS");

        let env = Environment::Development {
            signed_url_expiry_override: None,
        };
        assert_eq!(env.s3_bucket(), "heritage-profile-photos");
        assert_eq!(env.profiles_table_name(), "profiles");
        assert_eq!(
            env.photo_public_base_url(),
            "http://localhost:4566/heritage-profile-photos"
        );
        assert_eq!(env.max_photo_bytes(), 5 * 1024 * 1024);
        assert_eq!(env.signed_url_cache_capacity(), 1024);
        assert_eq!(env.edit_session_idle_secs(), 3600);
        assert!(env.show_api_docs());
        assert!(!Environment::Production.show_api_docs());
    }

    #[test]
    #[serial]
    fn test_limits_from_env() {
        env::set_var("MAX_PHOTO_BYTES", "2048");
        env::set_var("SIGNED_URL_CACHE_CAPACITY", "not-a-number");
        env::set_var("EDIT_SESSION_IDLE_SECS", "900");

        let env = Environment::Staging;
        assert_eq!(env.max_photo_bytes(), 2048);
        assert_eq!(env.signed_url_cache_capacity(), 1024);
        assert_eq!(env.edit_session_idle_secs(), 900);

        env::set_var("EDIT_SESSION_IDLE_SECS", "0");
        assert_eq!(env.edit_session_idle_secs(), 3600);

        env::remove_var("MAX_PHOTO_BYTES");
        env::remove_var("SIGNED_URL_CACHE_CAPACITY");
        env::remove_var("EDIT_SESSION_IDLE_SECS");
    }
}
