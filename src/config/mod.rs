//! Configuration module for payment-recon.

use crate::error::AppError;
use config::{Config as Cfg, File};
use secrecy::SecretString;
use serde::Deserialize;
use std::env;

/// Common section loaded from `configuration.*` files and `APP__`-prefixed
/// environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct CommonConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl CommonConfig {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[derive(Debug, Clone)]
pub struct ReconConfig {
    pub common: CommonConfig,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub webhooks: WebhookConfig,
    pub admin: AdminConfig,
    pub match_policy: MatchPolicy,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub stripe_secret: SecretString,
    pub plaid_secret: SecretString,
    /// Maximum accepted age of a signed Stripe timestamp, in seconds.
    pub stripe_tolerance_secs: i64,
}

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub api_token: SecretString,
}

/// Matching policy: weight table, thresholds, and candidate window.
///
/// These are business rules, not algorithm constants; every field can be
/// overridden from the environment.
#[derive(Debug, Clone)]
pub struct MatchPolicy {
    /// Bookings whose event date is at most this many days before the
    /// payment are still candidates.
    pub window_days_before: i64,
    /// Bookings whose event date is at most this many days after the
    /// payment are candidates (deposits often precede events by weeks).
    pub window_days_after: i64,
    pub candidate_limit: i64,
    pub weight_exact_balance: u32,
    pub weight_exact_deposit: u32,
    pub weight_name_match: u32,
    pub name_similarity_floor: f64,
    pub weight_phone_match: u32,
    pub weight_email_match: u32,
    pub weight_temporal: u32,
    /// Days over which the temporal-proximity signal decays to zero.
    pub temporal_horizon_days: i64,
    pub score_cap: u32,
    pub auto_threshold: u32,
    pub review_threshold: u32,
    /// Minimum normalized confidence before the customer is notified of an
    /// auto-match.
    pub customer_notify_confidence: f64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            window_days_before: 7,
            window_days_after: 60,
            candidate_limit: 25,
            weight_exact_balance: 100,
            weight_exact_deposit: 90,
            weight_name_match: 70,
            name_similarity_floor: 0.5,
            weight_phone_match: 80,
            weight_email_match: 80,
            weight_temporal: 30,
            temporal_horizon_days: 14,
            score_cap: 225,
            auto_threshold: 150,
            review_threshold: 100,
            customer_notify_confidence: 0.80,
        }
    }
}

impl MatchPolicy {
    fn from_env() -> Self {
        let d = Self::default();
        Self {
            window_days_before: env_parse("MATCH_WINDOW_DAYS_BEFORE", d.window_days_before),
            window_days_after: env_parse("MATCH_WINDOW_DAYS_AFTER", d.window_days_after),
            candidate_limit: env_parse("MATCH_CANDIDATE_LIMIT", d.candidate_limit),
            weight_exact_balance: env_parse("MATCH_WEIGHT_EXACT_BALANCE", d.weight_exact_balance),
            weight_exact_deposit: env_parse("MATCH_WEIGHT_EXACT_DEPOSIT", d.weight_exact_deposit),
            weight_name_match: env_parse("MATCH_WEIGHT_NAME", d.weight_name_match),
            name_similarity_floor: env_parse("MATCH_NAME_SIMILARITY_FLOOR", d.name_similarity_floor),
            weight_phone_match: env_parse("MATCH_WEIGHT_PHONE", d.weight_phone_match),
            weight_email_match: env_parse("MATCH_WEIGHT_EMAIL", d.weight_email_match),
            weight_temporal: env_parse("MATCH_WEIGHT_TEMPORAL", d.weight_temporal),
            temporal_horizon_days: env_parse("MATCH_TEMPORAL_HORIZON_DAYS", d.temporal_horizon_days),
            score_cap: env_parse("MATCH_SCORE_CAP", d.score_cap),
            auto_threshold: env_parse("MATCH_AUTO_THRESHOLD", d.auto_threshold),
            review_threshold: env_parse("MATCH_REVIEW_THRESHOLD", d.review_threshold),
            customer_notify_confidence: env_parse(
                "MATCH_CUSTOMER_NOTIFY_CONFIDENCE",
                d.customer_notify_confidence,
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub admin_recipient: String,
    pub whatsapp: WhatsAppConfig,
    pub sms: SmsConfig,
}

#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub enabled: bool,
    pub api_url: String,
    pub access_token: SecretString,
}

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub enabled: bool,
    pub api_url: String,
    pub api_key: SecretString,
    pub sender_id: String,
}

impl ReconConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = CommonConfig::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "payment-recon".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),
                min_connections: env_parse("DATABASE_MIN_CONNECTIONS", 2),
            },
            webhooks: WebhookConfig {
                stripe_secret: SecretString::new(
                    env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
                ),
                plaid_secret: SecretString::new(
                    env::var("PLAID_WEBHOOK_SECRET").unwrap_or_default(),
                ),
                stripe_tolerance_secs: env_parse("STRIPE_SIGNATURE_TOLERANCE_SECS", 300),
            },
            admin: AdminConfig {
                api_token: SecretString::new(env::var("ADMIN_API_TOKEN").unwrap_or_default()),
            },
            match_policy: MatchPolicy::from_env(),
            notify: NotifyConfig {
                admin_recipient: env::var("NOTIFY_ADMIN_RECIPIENT").unwrap_or_default(),
                whatsapp: WhatsAppConfig {
                    enabled: env_parse("WHATSAPP_ENABLED", false),
                    api_url: env::var("WHATSAPP_API_URL").unwrap_or_default(),
                    access_token: SecretString::new(
                        env::var("WHATSAPP_ACCESS_TOKEN").unwrap_or_default(),
                    ),
                },
                sms: SmsConfig {
                    enabled: env_parse("SMS_ENABLED", false),
                    api_url: env::var("SMS_API_URL").unwrap_or_default(),
                    api_key: SecretString::new(env::var("SMS_API_KEY").unwrap_or_default()),
                    sender_id: env::var("SMS_SENDER_ID").unwrap_or_else(|_| "INTEGRA".to_string()),
                },
            },
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
