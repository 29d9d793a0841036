//! Server configuration

use rust_decimal::Decimal;
use std::str::FromStr;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Business rules read once at startup.
///
/// Orders snapshot the fee percentage and split at creation time, so
/// changing these values never affects orders already in flight.
#[derive(Debug, Clone)]
pub struct MarketPolicy {
    /// Platform fee as a percentage of the order total
    pub platform_fee_percentage: Decimal,
    /// Escrow hold after delivery confirmation
    pub payment_hold_hours: i64,
    /// Days after approval before a shipped order is auto-confirmed
    pub auto_confirm_days: i64,
    /// Orders handled per release sweep
    pub release_batch_size: usize,
    /// Webhook URL sent with each payment
    pub notification_url: Option<String>,
}

impl MarketPolicy {
    pub fn hold_ms(&self) -> i64 {
        self.payment_hold_hours * 60 * 60 * 1000
    }

    pub fn auto_confirm_ms(&self) -> i64 {
        self.auto_confirm_days * 24 * 60 * 60 * 1000
    }
}

impl Default for MarketPolicy {
    fn default() -> Self {
        Self {
            platform_fee_percentage: Decimal::from(5),
            payment_hold_hours: 24,
            auto_confirm_days: 7,
            release_batch_size: 200,
            notification_url: None,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment: development | staging | production
    pub environment: String,
    pub http_port: u16,
    /// Directory holding the ledger database
    pub data_dir: String,
    pub log_level: Option<String>,
    pub log_json: bool,
    pub log_dir: Option<String>,
    /// HS256 secret for bearer tokens
    pub jwt_secret: String,
    /// Platform-level gateway token, used when a seller token is unavailable
    pub mp_access_token: String,
    pub mp_public_key: Option<String>,
    pub mp_client_id: Option<String>,
    pub mp_client_secret: Option<String>,
    /// Absent secret makes the webhook endpoint reject every delivery
    pub mp_webhook_secret: Option<String>,
    pub mp_oauth_redirect_uri: Option<String>,
    pub mp_api_base: Option<String>,
    pub release_interval_secs: u64,
    pub policy: MarketPolicy,
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    fn optional(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|s| !s.is_empty())
    }

    fn parsed<T: FromStr>(name: &str, default: T) -> Result<T, BoxError> {
        match Self::optional(name) {
            Some(raw) => raw
                .parse()
                .map_err(|_| format!("{name} has an invalid value: {raw}").into()),
            None => Ok(default),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let defaults = MarketPolicy::default();
        let platform_fee_percentage: Decimal =
            Self::parsed("PLATFORM_FEE_PERCENTAGE", defaults.platform_fee_percentage)?;
        if platform_fee_percentage < Decimal::ZERO || platform_fee_percentage > Decimal::ONE_HUNDRED {
            return Err("PLATFORM_FEE_PERCENTAGE must be between 0 and 100".into());
        }
        let payment_hold_hours: i64 = Self::parsed("PAYMENT_HOLD_HOURS", defaults.payment_hold_hours)?;
        if payment_hold_hours < 0 {
            return Err("PAYMENT_HOLD_HOURS must not be negative".into());
        }

        let public_base_url = Self::optional("PUBLIC_BASE_URL");
        let notification_url = public_base_url
            .as_deref()
            .map(|base| format!("{}/webhooks/gateway", base.trim_end_matches('/')));

        Ok(Self {
            http_port: Self::parsed("HTTP_PORT", 8080)?,
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()),
            log_level: Self::optional("LOG_LEVEL"),
            log_json: Self::parsed("LOG_JSON", false)?,
            log_dir: Self::optional("LOG_DIR"),
            jwt_secret: Self::require_secret("JWT_SECRET", &environment)?,
            mp_access_token: Self::require_secret("MP_ACCESS_TOKEN", &environment)?,
            mp_public_key: Self::optional("MP_PUBLIC_KEY"),
            mp_client_id: Self::optional("MP_CLIENT_ID"),
            mp_client_secret: Self::optional("MP_CLIENT_SECRET"),
            mp_webhook_secret: Self::optional("MP_WEBHOOK_SECRET"),
            mp_oauth_redirect_uri: Self::optional("MP_OAUTH_REDIRECT_URI"),
            mp_api_base: Self::optional("MP_API_BASE"),
            release_interval_secs: Self::parsed("RELEASE_INTERVAL_SECS", 3600)?,
            policy: MarketPolicy {
                platform_fee_percentage,
                payment_hold_hours,
                auto_confirm_days: defaults.auto_confirm_days,
                release_batch_size: Self::parsed("RELEASE_BATCH_SIZE", defaults.release_batch_size)?,
                notification_url,
            },
            environment,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Path of the ledger database file
    pub fn database_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.data_dir).join("ledger.redb")
    }
}
