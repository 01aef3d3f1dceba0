use super::config::MoexConfig;
use crate::error::MoexError;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

/// Parsed body of a successful ISS request.
#[derive(Clone, PartialEq, Debug)]
pub struct IssResponse {
    pub status: u16,
    pub url: String,
    pub body: Value,
}

/// Issues one GET request against an ISS path.
///
/// Implementations resolve `path` against their own base URL, append `params` as query pairs and
/// map non-2xx responses to [`MoexError::Status`] or [`MoexError::Unauthorized`].
#[async_trait]
pub trait IssTransport: Send + Sync {
    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<IssResponse, MoexError>;
}

#[async_trait]
impl<T> IssTransport for &T
where
    T: IssTransport + ?Sized,
{
    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<IssResponse, MoexError> {
        (**self).get(path, params).await
    }
}

/// [`IssTransport`] over HTTPS using a shared `reqwest` connection pool.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &MoexConfig) -> Result<Self, MoexError> {
        Url::parse(&config.base_url)?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    /// Full request URL for `path` with `params` and `iss.meta=off` appended.
    pub fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, MoexError> {
        let pairs = params
            .iter()
            .map(|(key, value)| (*key, value.as_str()))
            .chain(std::iter::once(("iss.meta", "off")));

        Url::parse_with_params(&format!("{}{}", self.base_url, path), pairs)
            .map_err(MoexError::from)
    }
}

#[async_trait]
impl IssTransport for HttpTransport {
    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<IssResponse, MoexError> {
        let url = self.url(path, params)?;
        debug!(%url, auth = self.auth_token.is_some(), "ISS request");

        let mut request = self.http.get(url.clone()).header(ACCEPT, "application/json");
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let error = MoexError::from_status(status.as_u16(), url.as_str());
            if error.is_auth() {
                warn!(
                    %url,
                    status = status.as_u16(),
                    "ISS rejected credentials, token may be expired, invalid or lack permissions"
                );
            }
            return Err(error);
        }

        let body = response.json::<Value>().await?;

        Ok(IssResponse {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_appends_params_and_meta_off() {
        let config = MoexConfig::default().with_base_url("https://iss.moex.com/");
        let transport = HttpTransport::new(&config).unwrap();

        let actual = transport
            .url(
                "/iss/analyticalproducts/futoi/securities/Si.json",
                &[("from", "2026-02-01".to_string()), ("start", "100".to_string())],
            )
            .unwrap();

        assert_eq!(
            actual.as_str(),
            concat!(
                "https://iss.moex.com/iss/analyticalproducts/futoi/securities/Si.json",
                "?from=2026-02-01&start=100&iss.meta=off"
            )
        );
    }

    #[test]
    fn test_url_keeps_base_path_prefix() {
        let config = MoexConfig::default().with_base_url("http://localhost:8080/moex-api");
        let transport = HttpTransport::new(&config).unwrap();

        let actual = transport.url("/iss/securities.json", &[]).unwrap();

        assert_eq!(
            actual.as_str(),
            "http://localhost:8080/moex-api/iss/securities.json?iss.meta=off"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let actual = HttpTransport::new(&MoexConfig::default().with_base_url("not a url"));

        assert!(matches!(actual, Err(MoexError::Request(_))));
    }
}
