//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Core
//! - `DATABASE_URL` - `PostgreSQL` connection string (in-memory store when unset)
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 8083)
//! - `CORS_ORIGIN` - Allowed browser origin (any origin when unset)
//! - `SECURE_COOKIES` - Mark the session cookie `Secure` (default: false)
//! - `ADMIN_EMAILS` - Comma-separated emails that register as admins
//! - `NATS_URL` - Publish domain events to NATS when set
//! - `LOG_FORMAT` - `pretty` or `json` (default: pretty)
//!
//! ## Commerce
//! - `BASE_CURRENCY` (default: INR)
//! - `SHIPPING_FEE` - Flat fee below the free-shipping threshold (default: 99)
//! - `FREE_SHIPPING_THRESHOLD` (default: 999)
//! - `SHIPMENT_REFRESH_SECS` - AWB refresh interval, 0 disables (default: 60)
//!
//! ## Integrations (each optional; the feature reports unavailable when unset)
//! - `RAZORPAY_KEY_ID`, `RAZORPAY_KEY_SECRET`, `RAZORPAY_WEBHOOK_SECRET`
//! - `SHIPROCKET_EMAIL`, `SHIPROCKET_PASSWORD`, `SHIPROCKET_PICKUP_LOCATION`
//! - `CLOUDINARY_CLOUD_NAME`, `CLOUDINARY_API_KEY`, `CLOUDINARY_API_SECRET`, `CLOUDINARY_FOLDER`
//! - `CURRENCY_API_URL` (default: <https://open.er-api.com/v6/latest>)
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `MAIL_FROM`

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Storefront service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<SecretString>,
    pub host: IpAddr,
    pub port: u16,
    pub cors_origin: Option<String>,
    pub secure_cookies: bool,
    pub admin_emails: Vec<String>,
    pub nats_url: Option<String>,
    pub log_format: LogFormat,
    pub commerce: CommerceConfig,
    pub razorpay: Option<RazorpayConfig>,
    pub shiprocket: Option<ShiprocketConfig>,
    pub cloudinary: Option<CloudinaryConfig>,
    pub currency_api_url: String,
    pub smtp: Option<SmtpConfig>,
}

/// Pricing rules applied at cart and checkout.
#[derive(Debug, Clone)]
pub struct CommerceConfig {
    pub currency: String,
    pub shipping_fee: Decimal,
    pub free_shipping_threshold: Decimal,
    pub shipment_refresh: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: SecretString,
    pub webhook_secret: Option<SecretString>,
}

#[derive(Debug, Clone)]
pub struct ShiprocketConfig {
    pub email: String,
    pub password: SecretString,
    pub pickup_location: String,
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: SecretString,
    pub folder: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl Default for CommerceConfig {
    fn default() -> Self {
        Self {
            currency: "INR".to_string(),
            shipping_fee: Decimal::new(99, 0),
            free_shipping_threshold: Decimal::new(999, 0),
            shipment_refresh: Some(Duration::from_secs(60)),
        }
    }
}

impl Default for Config {
    /// Local defaults: in-memory store, no integrations.
    fn default() -> Self {
        Self {
            database_url: None,
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8083,
            cors_origin: None,
            secure_cookies: false,
            admin_emails: vec![],
            nats_url: None,
            log_format: LogFormat::Pretty,
            commerce: CommerceConfig::default(),
            razorpay: None,
            shiprocket: None,
            cloudinary: None,
            currency_api_url: "https://open.er-api.com/v6/latest".to_string(),
            smtp: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value is malformed, or if an integration is
    /// only partially configured.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let log_format = match get_optional_env("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidEnvVar("LOG_FORMAT".into(), other.into()));
            }
        };

        let refresh_secs: u64 = parse_env_or("SHIPMENT_REFRESH_SECS", 60)?;

        Ok(Self {
            database_url: get_optional_env("DATABASE_URL").map(SecretString::from),
            host: parse_env_or("HOST", defaults.host)?,
            port: parse_env_or("PORT", defaults.port)?,
            cors_origin: get_optional_env("CORS_ORIGIN"),
            secure_cookies: parse_env_or("SECURE_COOKIES", false)?,
            admin_emails: parse_list(get_optional_env("ADMIN_EMAILS").as_deref().unwrap_or_default()),
            nats_url: get_optional_env("NATS_URL"),
            log_format,
            commerce: CommerceConfig {
                currency: get_optional_env("BASE_CURRENCY").map_or(defaults.commerce.currency, |c| c.to_uppercase()),
                shipping_fee: parse_env_or("SHIPPING_FEE", defaults.commerce.shipping_fee)?,
                free_shipping_threshold: parse_env_or(
                    "FREE_SHIPPING_THRESHOLD",
                    defaults.commerce.free_shipping_threshold,
                )?,
                shipment_refresh: (refresh_secs > 0).then(|| Duration::from_secs(refresh_secs)),
            },
            razorpay: RazorpayConfig::from_env()?,
            shiprocket: ShiprocketConfig::from_env()?,
            cloudinary: CloudinaryConfig::from_env()?,
            currency_api_url: get_optional_env("CURRENCY_API_URL").unwrap_or(defaults.currency_api_url),
            smtp: SmtpConfig::from_env()?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    #[must_use]
    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|a| a.eq_ignore_ascii_case(email.trim()))
    }
}

impl RazorpayConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(key_id) = get_optional_env("RAZORPAY_KEY_ID") else {
            return Ok(None);
        };
        Ok(Some(Self {
            key_id,
            key_secret: get_required_secret("RAZORPAY_KEY_SECRET")?,
            webhook_secret: get_optional_env("RAZORPAY_WEBHOOK_SECRET").map(SecretString::from),
        }))
    }
}

impl ShiprocketConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(email) = get_optional_env("SHIPROCKET_EMAIL") else {
            return Ok(None);
        };
        Ok(Some(Self {
            email,
            password: get_required_secret("SHIPROCKET_PASSWORD")?,
            pickup_location: get_optional_env("SHIPROCKET_PICKUP_LOCATION").unwrap_or_else(|| "Primary".into()),
        }))
    }
}

impl CloudinaryConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(cloud_name) = get_optional_env("CLOUDINARY_CLOUD_NAME") else {
            return Ok(None);
        };
        Ok(Some(Self {
            cloud_name,
            api_key: get_required_env("CLOUDINARY_API_KEY")?,
            api_secret: get_required_secret("CLOUDINARY_API_SECRET")?,
            folder: get_optional_env("CLOUDINARY_FOLDER").unwrap_or_else(|| "storefront".into()),
        }))
    }
}

impl SmtpConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };
        Ok(Some(Self {
            host,
            port: parse_env_or("SMTP_PORT", 587)?,
            username: get_required_env("SMTP_USERNAME")?,
            password: get_required_secret("SMTP_PASSWORD")?,
            from_address: get_required_env("MAIL_FROM")?,
        }))
    }
}

fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn get_required_env(key: &str) -> Result<String, ConfigError> {
    get_optional_env(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    get_required_env(key).map(SecretString::from)
}

fn parse_env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_optional_env(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
