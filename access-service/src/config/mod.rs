use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

use crate::models::{
    SessionOriginPolicy, DEFAULT_MAX_CONCURRENT_SESSIONS, DEFAULT_SESSION_IDLE_MINUTES,
};
use crate::services::rate_limit::{LimitPolicies, LimitPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub redis_url: Option<String>,
    pub security: SecurityConfig,
    pub identity: IdentityConfig,
    pub geo: GeoConfig,
    pub lockout_webhook_url: Option<String>,
    pub rate_limit: RateLimitConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub admin_api_key: String,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    pub verify_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeoConfig {
    pub enabled: bool,
    pub base_url: String,
    /// Enrichment budget per event; a slow provider never delays a login
    /// past this.
    pub budget_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub login_max_attempts: u32,
    pub login_window_seconds: u64,
    pub login_block_seconds: u64,
    pub password_reset_max_attempts: u32,
    pub password_reset_window_seconds: u64,
    pub password_reset_block_seconds: u64,
    pub api_max_attempts: u32,
    pub api_window_seconds: u64,
    pub api_block_seconds: u64,
    pub second_factor_max_attempts: u32,
    pub second_factor_window_seconds: u64,
    pub second_factor_block_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub idle_minutes: u32,
    pub max_concurrent: u32,
    pub origin_policy: String,
}

impl AccessConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AccessConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("access-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: get_env(
                    "DATABASE_URL",
                    Some("postgres://localhost/access_dev"),
                    is_prod,
                )?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", 20)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", 1)?,
            },
            redis_url: env::var("REDIS_URL").ok(),
            security: SecurityConfig {
                admin_api_key: get_env("ADMIN_API_KEY", Some("dev-admin-key"), is_prod)?,
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            },
            identity: IdentityConfig {
                verify_url: get_env(
                    "IDENTITY_VERIFY_URL",
                    Some("http://localhost:9100/identity/verify"),
                    is_prod,
                )?,
                timeout_seconds: parse_env("IDENTITY_TIMEOUT_SECONDS", 5)?,
            },
            geo: GeoConfig {
                enabled: parse_env("GEO_ENABLED", true)?,
                base_url: get_env("GEO_BASE_URL", Some("http://ip-api.com/json"), is_prod)?,
                budget_ms: parse_env("GEO_BUDGET_MS", 2000)?,
            },
            lockout_webhook_url: env::var("LOCKOUT_WEBHOOK_URL").ok(),
            rate_limit: RateLimitConfig {
                login_max_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", 5)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", 900)?,
                login_block_seconds: parse_env("RATE_LIMIT_LOGIN_BLOCK_SECONDS", 1800)?,
                password_reset_max_attempts: parse_env("RATE_LIMIT_PASSWORD_RESET_ATTEMPTS", 3)?,
                password_reset_window_seconds: parse_env(
                    "RATE_LIMIT_PASSWORD_RESET_WINDOW_SECONDS",
                    3600,
                )?,
                password_reset_block_seconds: parse_env(
                    "RATE_LIMIT_PASSWORD_RESET_BLOCK_SECONDS",
                    3600,
                )?,
                api_max_attempts: parse_env("RATE_LIMIT_API_ATTEMPTS", 100)?,
                api_window_seconds: parse_env("RATE_LIMIT_API_WINDOW_SECONDS", 900)?,
                api_block_seconds: parse_env("RATE_LIMIT_API_BLOCK_SECONDS", 900)?,
                second_factor_max_attempts: parse_env("RATE_LIMIT_SECOND_FACTOR_ATTEMPTS", 3)?,
                second_factor_window_seconds: parse_env(
                    "RATE_LIMIT_SECOND_FACTOR_WINDOW_SECONDS",
                    300,
                )?,
                second_factor_block_seconds: parse_env(
                    "RATE_LIMIT_SECOND_FACTOR_BLOCK_SECONDS",
                    900,
                )?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", 100)?,
                global_ip_window_seconds: parse_env("RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS", 60)?,
            },
            session: SessionConfig {
                idle_minutes: parse_env("SESSION_IDLE_MINUTES", DEFAULT_SESSION_IDLE_MINUTES)?,
                max_concurrent: parse_env(
                    "SESSION_MAX_CONCURRENT",
                    DEFAULT_MAX_CONCURRENT_SESSIONS,
                )?,
                origin_policy: get_env("SESSION_ORIGIN_POLICY", Some("log_only"), is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.rate_limit.login_max_attempts == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RATE_LIMIT_LOGIN_ATTEMPTS must be positive"
            )));
        }

        if self.session.max_concurrent == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SESSION_MAX_CONCURRENT must be positive"
            )));
        }

        self.origin_policy()?;

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }
            if self.security.admin_api_key == "dev-admin-key" {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "ADMIN_API_KEY must be set explicitly in production"
                )));
            }
        }

        Ok(())
    }

    pub fn origin_policy(&self) -> Result<SessionOriginPolicy, AppError> {
        self.session
            .origin_policy
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))
    }

    pub fn limit_policies(&self) -> LimitPolicies {
        LimitPolicies {
            login: LimitPolicy::new(
                self.rate_limit.login_max_attempts,
                self.rate_limit.login_window_seconds,
                self.rate_limit.login_block_seconds,
            ),
            password_reset: LimitPolicy::new(
                self.rate_limit.password_reset_max_attempts,
                self.rate_limit.password_reset_window_seconds,
                self.rate_limit.password_reset_block_seconds,
            ),
            api: LimitPolicy::new(
                self.rate_limit.api_max_attempts,
                self.rate_limit.api_window_seconds,
                self.rate_limit.api_block_seconds,
            ),
            second_factor: LimitPolicy::new(
                self.rate_limit.second_factor_max_attempts,
                self.rate_limit.second_factor_window_seconds,
                self.rate_limit.second_factor_block_seconds,
            ),
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match env::var(key) {
        Ok(val) => val.parse().map_err(|_| {
            AppError::ConfigError(anyhow::anyhow!(format!("{} has an invalid value", key)))
        }),
        Err(_) => Ok(default),
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
