use crate::error::{GatewayError, GatewayResult};
use chrono::{FixedOffset, Offset, Utc};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://sandbox.blinkpay.co.nz";
pub const DEFAULT_REDIRECT_URI: &str = "consentpay://return";
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(10);
/// New Zealand standard time.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 12 * 60;

/// Connection settings for the payment gateway.
#[derive(Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Where the gateway sends the payer back to once they are done.
    pub redirect_uri: String,
    pub token_timeout: Duration,
    /// Offset of the merchant's local time, used for enduring consent start dates.
    pub merchant_utc_offset: FixedOffset,
}

impl GatewayConfig {
    pub fn new(
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            token_timeout: DEFAULT_TOKEN_TIMEOUT,
            merchant_utc_offset: default_offset(),
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn with_token_timeout(mut self, timeout: Duration) -> Self {
        self.token_timeout = timeout;
        self
    }

    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.merchant_utc_offset = offset;
        self
    }

    /// Reads `CONSENTPAY_*` variables from the process environment.
    pub fn from_env() -> GatewayResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup.
    ///
    /// Client id and secret are required; everything else has a default.
    pub fn from_lookup<F>(lookup: F) -> GatewayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| GatewayError::Config {
                    message: format!("{key} not set"),
                })
        };

        let client_id = required("CONSENTPAY_CLIENT_ID")?;
        let client_secret = required("CONSENTPAY_CLIENT_SECRET")?;
        let base_url =
            lookup("CONSENTPAY_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let mut config = Self::new(base_url, client_id, client_secret);

        if let Some(redirect_uri) = lookup("CONSENTPAY_REDIRECT_URI") {
            config.redirect_uri = redirect_uri;
        }

        if let Some(raw) = lookup("CONSENTPAY_UTC_OFFSET_MINUTES") {
            let minutes: i32 = raw.parse().map_err(|_| GatewayError::Config {
                message: format!("CONSENTPAY_UTC_OFFSET_MINUTES is not a number: {raw}"),
            })?;
            config.merchant_utc_offset = minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .ok_or_else(|| GatewayError::Config {
                    message: format!("UTC offset out of range: {minutes} minutes"),
                })?;
        }

        Ok(config)
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("token_timeout", &self.token_timeout)
            .field("merchant_utc_offset", &self.merchant_utc_offset)
            .finish()
    }
}

fn default_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_UTC_OFFSET_MINUTES * 60).unwrap_or_else(|| Utc.fix())
}

/// Bounds for status polling: at most `max_attempts` reads, `interval` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_secs(1),
        }
    }
}

impl PollConfig {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Worst-case time spent polling without a terminal result.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}
