//! Service configuration from environment variables

use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL; absent means the in-memory store (development only)
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub port: u16,
    /// Public base URL used to build image links
    pub app_url: String,
    /// Directory uploaded images are written to
    pub storage_dir: String,
    /// development | staging | production
    pub environment: String,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_api_base: String,
    pub checkout_success_url: String,
    pub checkout_cancel_url: String,
    pub default_currency: String,
    pub payment_timeout: Duration,
    /// Return reserved units to stock when a payment fails or is canceled
    pub restock_on_payment_failure: bool,
    pub nats_url: Option<String>,
    /// Seeded on startup when both are set.
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
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

    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());
        let database_url = optional("DATABASE_URL");
        if database_url.is_none() && environment != "development" {
            return Err(format!("DATABASE_URL must be set in {environment} environment").into());
        }
        let port = parse_or("PORT", 8083)?;
        let app_url = std::env::var("APP_URL").unwrap_or_else(|_| format!("http://localhost:{port}"));

        Ok(Self {
            database_url,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            port,
            checkout_success_url: std::env::var("CHECKOUT_SUCCESS_URL")
                .unwrap_or_else(|_| format!("{app_url}/checkout/success")),
            checkout_cancel_url: std::env::var("CHECKOUT_CANCEL_URL")
                .unwrap_or_else(|_| format!("{app_url}/checkout/cancel")),
            app_url,
            storage_dir: std::env::var("STORAGE_DIR").unwrap_or_else(|_| "public/storage".into()),
            jwt_secret: Self::require_secret("JWT_SECRET", &environment)?,
            jwt_refresh_secret: Self::require_secret("JWT_REFRESH_SECRET", &environment)?,
            stripe_secret_key: Self::require_secret("STRIPE_SECRET_KEY", &environment)?,
            stripe_webhook_secret: Self::require_secret("STRIPE_WEBHOOK_SECRET", &environment)?,
            stripe_api_base: std::env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".into()),
            default_currency: std::env::var("DEFAULT_CURRENCY").unwrap_or_else(|_| "usd".into()),
            payment_timeout: Duration::from_secs(parse_or("PAYMENT_TIMEOUT_SECS", 10)?),
            restock_on_payment_failure: parse_flag(
                std::env::var("RESTOCK_ON_PAYMENT_FAILURE").ok().as_deref(),
            )?,
            nats_url: optional("NATS_URL"),
            admin_email: optional("ADMIN_EMAIL"),
            admin_password: optional("ADMIN_PASSWORD"),
            environment,
        })
    }
}

impl Default for Config {
    /// Development settings with no external services.
    fn default() -> Self {
        let app_url = "http://localhost:8083".to_string();
        Self {
            database_url: None,
            database_max_connections: 10,
            port: 8083,
            checkout_success_url: format!("{app_url}/checkout/success"),
            checkout_cancel_url: format!("{app_url}/checkout/cancel"),
            app_url,
            storage_dir: "public/storage".into(),
            environment: "development".into(),
            jwt_secret: "dev-JWT_SECRET-not-for-production".into(),
            jwt_refresh_secret: "dev-JWT_REFRESH_SECRET-not-for-production".into(),
            stripe_secret_key: "dev-STRIPE_SECRET_KEY-not-for-production".into(),
            stripe_webhook_secret: "dev-STRIPE_WEBHOOK_SECRET-not-for-production".into(),
            stripe_api_base: "https://api.stripe.com".into(),
            default_currency: "usd".into(),
            payment_timeout: Duration::from_secs(10),
            restock_on_payment_failure: false,
            nats_url: None,
            admin_email: None,
            admin_password: None,
        }
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, BoxError> {
    match optional(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{name} has an invalid value: {raw}").into()),
        None => Ok(default),
    }
}

fn parse_flag(raw: Option<&str>) -> Result<bool, BoxError> {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(format!("invalid boolean: {other}").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(!parse_flag(None).unwrap());
        assert!(parse_flag(Some("TRUE")).unwrap());
        assert!(parse_flag(Some(" on ")).unwrap());
        assert!(!parse_flag(Some("0")).unwrap());
        assert!(parse_flag(Some("maybe")).is_err());
    }
}
