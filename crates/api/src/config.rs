//! Application configuration loaded from environment variables.

use std::time::Duration;

use domain::review::LikePolicy;
use fulfillment::{PickupConfig, RazorpayConfig, ShiprocketConfig};
use thiserror::Error;

/// Secret the sandbox gateway signs callbacks with when no Razorpay
/// credentials are configured.
pub const SANDBOX_PAYMENT_SECRET: &str = "sandbox_secret";

#[derive(Debug, Error)]
#[error("invalid {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `DATABASE_URL`: PostgreSQL when set, in-memory store otherwise
/// - `CURRENCY`: gateway currency (default `INR`)
/// - `ADMIN_KEY`: required to open admin sessions
/// - `SESSION_TTL_SECS`: how long a session token stays valid (default one day)
/// - `LIKE_POLICY`: `allow-multiple` or `one-per-user`
/// - `UPSTREAM_TIMEOUT_MS`: bound on every gateway and aggregator call
/// - `RAZORPAY_KEY_ID`, `RAZORPAY_KEY_SECRET`, `RAZORPAY_BASE_URL`
/// - `SHIPROCKET_EMAIL`, `SHIPROCKET_PASSWORD`, `SHIPROCKET_BASE_URL`,
///   `SHIPROCKET_TOKEN_TTL_HOURS`, `SHIPROCKET_WEBHOOK_KEY`
/// - `PICKUP_LOCATION`, `PICKUP_POSTCODE`
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub currency: String,
    pub admin_key: Option<String>,
    pub session_ttl: Duration,
    pub like_policy: LikePolicy,
    pub upstream_timeout: Duration,
    /// None runs payments against the in-memory sandbox gateway.
    pub razorpay: Option<RazorpayConfig>,
    /// None runs shipping against the in-memory sandbox aggregator.
    pub shiprocket: Option<ShiprocketConfig>,
    pub webhook_key: Option<String>,
    pub pickup: PickupConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let upstream_timeout = match var("UPSTREAM_TIMEOUT_MS") {
            Some(ms) => Duration::from_millis(parse("UPSTREAM_TIMEOUT_MS", &ms)?),
            None => defaults.upstream_timeout,
        };

        let razorpay = match (var("RAZORPAY_KEY_ID"), var("RAZORPAY_KEY_SECRET")) {
            (Some(key_id), Some(key_secret)) => Some(RazorpayConfig {
                key_id,
                key_secret,
                base_url: var("RAZORPAY_BASE_URL")
                    .unwrap_or_else(|| "https://api.razorpay.com".to_string()),
                timeout: upstream_timeout,
            }),
            _ => None,
        };

        let shiprocket = match (var("SHIPROCKET_EMAIL"), var("SHIPROCKET_PASSWORD")) {
            (Some(email), Some(password)) => {
                let ttl_hours: u64 = match var("SHIPROCKET_TOKEN_TTL_HOURS") {
                    Some(hours) => parse("SHIPROCKET_TOKEN_TTL_HOURS", &hours)?,
                    None => 216,
                };
                Some(ShiprocketConfig {
                    email,
                    password,
                    base_url: var("SHIPROCKET_BASE_URL")
                        .unwrap_or_else(|| "https://apiv2.shiprocket.in".to_string()),
                    timeout: upstream_timeout,
                    token_ttl: Duration::from_secs(ttl_hours * 3600),
                })
            }
            _ => None,
        };

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: match var("PORT") {
                Some(port) => parse("PORT", &port)?,
                None => defaults.port,
            },
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match var("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
                None => LogFormat::Text,
                Some(f) if f == "text" => LogFormat::Text,
                Some(f) if f == "json" => LogFormat::Json,
                Some(other) => {
                    return Err(ConfigError {
                        var: "LOG_FORMAT",
                        reason: format!("expected text or json, got {other:?}"),
                    });
                }
            },
            database_url: var("DATABASE_URL"),
            currency: var("CURRENCY")
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or(defaults.currency),
            admin_key: var("ADMIN_KEY"),
            session_ttl: match var("SESSION_TTL_SECS") {
                Some(secs) => Duration::from_secs(parse("SESSION_TTL_SECS", &secs)?),
                None => defaults.session_ttl,
            },
            like_policy: match var("LIKE_POLICY") {
                Some(policy) => policy.parse().map_err(|reason| ConfigError {
                    var: "LIKE_POLICY",
                    reason,
                })?,
                None => LikePolicy::default(),
            },
            upstream_timeout,
            razorpay,
            shiprocket,
            webhook_key: var("SHIPROCKET_WEBHOOK_KEY"),
            pickup: PickupConfig {
                location: var("PICKUP_LOCATION").unwrap_or(defaults.pickup.location),
                postcode: var("PICKUP_POSTCODE").unwrap_or(defaults.pickup.postcode),
            },
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Secret payment callbacks are verified with.
    pub fn payment_secret(&self) -> &str {
        self.razorpay
            .as_ref()
            .map_or(SANDBOX_PAYMENT_SECRET, |r| r.key_secret.as_str())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            currency: "INR".to_string(),
            admin_key: None,
            session_ttl: Duration::from_secs(24 * 3600),
            like_policy: LikePolicy::default(),
            upstream_timeout: Duration::from_millis(5000),
            razorpay: None,
            shiprocket: None,
            webhook_key: None,
            pickup: PickupConfig {
                location: "Primary".to_string(),
                postcode: "110001".to_string(),
            },
        }
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError {
        var,
        reason: e.to_string(),
    })
}
