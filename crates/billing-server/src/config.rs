//! Server Configuration
//!
//! Parsed once at startup and injected into every component.

use std::net::IpAddr;

use billing_core::pricing::DEFAULT_UNIT_PRICE;
use billing_gateway::CinetPayConfig;
use billing_payments::{CheckoutSettings, SandboxAck};

/// Shortest accepted JWT secret
const MIN_JWT_SECRET_LENGTH: usize = 32;

const WEBHOOK_PATH: &str = "/billing/cinetpay/webhook";

/// Deployment environment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Test,
    Production,
}

impl AppEnv {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(AppEnv::Development),
            "test" => Ok(AppEnv::Test),
            "production" | "prod" => Ok(AppEnv::Production),
            other => anyhow::bail!("unknown APP_ENV '{other}'"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppEnv::Development => "development",
            AppEnv::Test => "test",
            AppEnv::Production => "production",
        }
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub app_env: AppEnv,
    pub jwt_secret: String,

    pub currency: String,

    /// Monthly premium price in minor units
    pub unit_price: i64,

    pub cinetpay: CinetPayConfig,

    /// Enables `x-token` verification when set
    pub cinetpay_secret_key: Option<String>,

    pub notify_url: Option<String>,
    pub return_url: Option<String>,

    /// Trust webhook payload status (non-production only)
    pub sandbox_mode: bool,
    pub allow_non_production: bool,

    /// Empty means every source is accepted
    pub ip_allowlist: Vec<IpAddr>,

    /// Read the client address from `X-Forwarded-For` (set only behind a reverse proxy)
    pub trust_proxy: bool,

    pub webhook_rate_limit_per_min: u32,
}

fn flag(value: Option<String>) -> bool {
    value.is_some_and(|v| matches!(v.trim(), "1" | "true" | "TRUE"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl AppConfig {
    /// Load from `.env` and process environment
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key/value source
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let app_env = AppEnv::parse(&get("APP_ENV").unwrap_or_else(|| "development".into()))?;

        let unit_price = match non_empty(get("PREMIUM_PRICE_XAF")) {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| anyhow::anyhow!("PREMIUM_PRICE_XAF must be a positive integer, got '{raw}'"))?,
            None => DEFAULT_UNIT_PRICE,
        };

        let webhook_rate_limit_per_min = match non_empty(get("WEBHOOK_RATE_LIMIT_PER_MIN")) {
            Some(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("WEBHOOK_RATE_LIMIT_PER_MIN must be an integer, got '{raw}'"))?,
            None => 60,
        };

        let ip_allowlist = non_empty(get("CINETPAY_IP_ALLOWLIST"))
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        s.parse::<IpAddr>()
                            .map_err(|_| anyhow::anyhow!("invalid address '{s}' in CINETPAY_IP_ALLOWLIST"))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        let notify_url = non_empty(get("CINETPAY_NOTIFY_URL")).or_else(|| {
            non_empty(get("API_PUBLIC_BASE_URL"))
                .map(|base| format!("{}{WEBHOOK_PATH}", base.trim_end_matches('/')))
        });

        Ok(Self {
            bind_addr: non_empty(get("BIND_ADDR")).unwrap_or_else(|| "0.0.0.0:4000".into()),
            app_env,
            jwt_secret: get("JWT_ACCESS_SECRET").unwrap_or_default(),
            currency: non_empty(get("BASE_CURRENCY")).unwrap_or_else(|| "XAF".into()),
            unit_price,
            cinetpay: CinetPayConfig::from_lookup(&get),
            cinetpay_secret_key: non_empty(get("CINETPAY_SECRET_KEY")),
            return_url: non_empty(get("CINETPAY_RETURN_URL")).or_else(|| notify_url.clone()),
            notify_url,
            sandbox_mode: flag(get("CINETPAY_SANDBOX_MODE")),
            allow_non_production: flag(get("ALLOW_NON_PRODUCTION")),
            ip_allowlist,
            trust_proxy: flag(get("TRUST_PROXY")),
            webhook_rate_limit_per_min,
        })
    }

    /// Startup checks. Returns the sandbox acknowledgement when sandbox mode
    /// is enabled and permitted; refuses to start otherwise.
    pub fn validate(&self) -> anyhow::Result<Option<SandboxAck>> {
        if self.jwt_secret.len() < MIN_JWT_SECRET_LENGTH {
            anyhow::bail!("JWT_ACCESS_SECRET must be at least {MIN_JWT_SECRET_LENGTH} bytes");
        }
        if self.webhook_rate_limit_per_min == 0 {
            anyhow::bail!("WEBHOOK_RATE_LIMIT_PER_MIN must be positive");
        }

        if !self.sandbox_mode {
            return Ok(None);
        }

        let ack = SandboxAck::acknowledge(self.app_env.as_str(), self.allow_non_production)?;
        Ok(Some(ack))
    }

    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings {
            currency: self.currency.clone(),
            notify_url: self.notify_url.clone(),
            return_url: self.return_url.clone(),
        }
    }
}
