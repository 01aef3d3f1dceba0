use crate::paginate::PageConfig;
use std::{fmt, time::Duration};

/// Public ISS host, reachable without credentials.
pub const DEFAULT_ISS_URL: &str = "https://iss.moex.com";

/// AlgoPack gateway, used when an auth token is configured.
pub const ALGOPACK_URL: &str = "https://apim.moex.com";

/// Environment variable overriding the base URL.
pub const ENV_ISS_URL: &str = "MOEX_ISS_URL";

/// Environment variable holding the AlgoPack bearer token.
pub const ENV_AUTH_TOKEN: &str = "MOEX_AUTH_TOKEN";

/// Configuration for a [`MoexClient`](super::MoexClient).
#[derive(Clone, PartialEq)]
pub struct MoexConfig {
    /// Scheme and host, optionally with a path prefix, prepended to every ISS path.
    pub base_url: String,
    /// Forwarded verbatim as a bearer `Authorization` header.
    pub auth_token: Option<String>,
    pub request_timeout: Duration,
    pub stock_pages: PageConfig,
    pub futoi_pages: PageConfig,
    pub candle_pages: PageConfig,
}

impl Default for MoexConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ISS_URL.to_string(),
            auth_token: None,
            request_timeout: Duration::from_secs(10),
            stock_pages: PageConfig::STOCK_STATS,
            futoi_pages: PageConfig::FUTOI,
            candle_pages: PageConfig::CANDLES,
        }
    }
}

impl fmt::Debug for MoexConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MoexConfig")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .field("stock_pages", &self.stock_pages)
            .field("futoi_pages", &self.futoi_pages)
            .field("candle_pages", &self.candle_pages)
            .finish()
    }
}

impl MoexConfig {
    /// Build a config from `MOEX_ISS_URL` and `MOEX_AUTH_TOKEN`.
    ///
    /// With a token and no explicit URL the AlgoPack gateway is used.
    pub fn from_env() -> Self {
        let auth_token = std::env::var(ENV_AUTH_TOKEN)
            .ok()
            .filter(|token| !token.trim().is_empty());

        let base_url = std::env::var(ENV_ISS_URL)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| match auth_token {
                Some(_) => ALGOPACK_URL.to_string(),
                None => DEFAULT_ISS_URL.to_string(),
            });

        Self {
            base_url,
            auth_token,
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_auth_token(mut self, auth_token: impl Into<String>) -> Self {
        self.auth_token = Some(auth_token.into());
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_stock_pages(mut self, pages: PageConfig) -> Self {
        self.stock_pages = pages;
        self
    }

    pub fn with_futoi_pages(mut self, pages: PageConfig) -> Self {
        self.futoi_pages = pages;
        self
    }

    pub fn with_candle_pages(mut self, pages: PageConfig) -> Self {
        self.candle_pages = pages;
        self
    }

    /// Drop the politeness delay from every endpoint family.
    pub fn without_delay(mut self) -> Self {
        self.stock_pages = self.stock_pages.with_delay(Duration::ZERO);
        self.futoi_pages = self.futoi_pages.with_delay(Duration::ZERO);
        self.candle_pages = self.candle_pages.with_delay(Duration::ZERO);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_page_presets() {
        let config = MoexConfig::default();

        assert_eq!(config.base_url, DEFAULT_ISS_URL);
        assert_eq!(config.stock_pages.batch_size, 100);
        assert_eq!(config.stock_pages.ceiling, 5_000);
        assert_eq!(config.futoi_pages.ceiling, 10_000);
        assert_eq!(config.candle_pages.batch_size, 500);
        assert_eq!(config.candle_pages.ceiling, 50_000);
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = MoexConfig::default().with_auth_token("secret-token");

        let actual = format!("{config:?}");

        assert!(!actual.contains("secret-token"));
        assert!(actual.contains("<redacted>"));
    }

    #[test]
    fn test_without_delay() {
        let config = MoexConfig::default().without_delay();

        assert!(config.stock_pages.delay.is_zero());
        assert!(config.futoi_pages.delay.is_zero());
        assert!(config.candle_pages.delay.is_zero());
        assert_eq!(config.futoi_pages.batch_size, 100);
    }
}
