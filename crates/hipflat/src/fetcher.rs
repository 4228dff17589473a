use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};

pub const SCRAPINGBEE_ENDPOINT: &str = "https://app.scrapingbee.com/api/v1/";

const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Rendering proxy rejected the API key (HTTP {0})")]
    Unauthorized(u16),
    #[error("Rendering proxy rate limit reached: {0}")]
    RateLimited(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Rendering proxy returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl FetchError {
    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else {
            FetchError::HttpError(err)
        }
    }

    fn from_status(status: StatusCode, body: &str) -> Self {
        let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                FetchError::Unauthorized(status.as_u16())
            }
            StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited(preview),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                FetchError::Timeout(format!("HTTP {}", status.as_u16()))
            }
            _ => FetchError::Status {
                status: status.as_u16(),
                body: preview,
            },
        }
    }
}

/// Per-request rendering switches understood by the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub render_js: bool,
    pub premium_proxy: bool,
    pub country_code: Option<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            render_js: true,
            premium_proxy: true,
            country_code: Some("th".to_string()),
        }
    }
}

/// Anything that can turn a target URL into page markup, one attempt per call.
pub trait PageFetcher {
    fn fetch(
        &self,
        url: &str,
        options: &RenderOptions,
    ) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// ScrapingBee client. The API key is owned by the client, never read from the
/// environment here.
#[derive(Clone)]
pub struct ScrapingBee {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl std::fmt::Debug for ScrapingBee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapingBee")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl ScrapingBee {
    pub fn new(api_key: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(format!(
                "{}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: SCRAPINGBEE_ENDPOINT.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn request_url(&self, target: &str, options: &RenderOptions) -> Result<Url, FetchError> {
        let mut params = vec![
            ("api_key", self.api_key.as_str()),
            ("url", target),
            ("render_js", bool_param(options.render_js)),
            ("premium_proxy", bool_param(options.premium_proxy)),
        ];
        if let Some(code) = options.country_code.as_deref() {
            params.push(("country_code", code));
        }

        Url::parse_with_params(&self.endpoint, &params)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", self.endpoint, e)))
    }
}

fn bool_param(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

impl PageFetcher for ScrapingBee {
    async fn fetch(&self, url: &str, options: &RenderOptions) -> Result<String, FetchError> {
        let request_url = self.request_url(url, options)?;
        log::info!("Requesting {} through the rendering proxy", url);

        let response = self
            .client
            .get(request_url)
            .send()
            .await
            .map_err(FetchError::from_transport)
            .inspect_err(|e| log::error!("HTTP error for {}: {}", url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(FetchError::from_transport)
            .inspect_err(|e| log::error!("Decode error for {}: {}", url, e))?;

        if !status.is_success() {
            return Err(FetchError::from_status(status, &body));
        }

        log::info!("Status {} ({} bytes)", status.as_u16(), body.len());
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url_carries_options() {
        let bee = ScrapingBee::new("secret-key").expect("client");
        let url = bee
            .request_url(
                "https://www.hipflat.co.th/ja/apartment-for-rent/pattaya?page=2",
                &RenderOptions::default(),
            )
            .expect("url");

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert!(url.as_str().starts_with(SCRAPINGBEE_ENDPOINT));
        assert!(pairs.contains(&("api_key".into(), "secret-key".into())));
        assert!(pairs.contains(&(
            "url".into(),
            "https://www.hipflat.co.th/ja/apartment-for-rent/pattaya?page=2".into()
        )));
        assert!(pairs.contains(&("render_js".into(), "true".into())));
        assert!(pairs.contains(&("premium_proxy".into(), "true".into())));
        assert!(pairs.contains(&("country_code".into(), "th".into())));
    }

    #[test]
    fn test_request_url_without_country_or_js() {
        let bee = ScrapingBee::new("k").expect("client");
        let options = RenderOptions {
            render_js: false,
            premium_proxy: false,
            country_code: None,
        };
        let url = bee.request_url("https://example.com", &options).expect("url");

        assert!(url.query_pairs().all(|(k, _)| k != "country_code"));
        assert!(url.query_pairs().any(|(k, v)| k == "render_js" && v == "false"));
    }

    #[test]
    fn test_invalid_endpoint() {
        let bee = ScrapingBee::new("k").expect("client").with_endpoint("not a url");
        let err = bee
            .request_url("https://example.com", &RenderOptions::default())
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            FetchError::from_status(StatusCode::UNAUTHORIZED, ""),
            FetchError::Unauthorized(401)
        ));
        assert!(matches!(
            FetchError::from_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            FetchError::RateLimited(_)
        ));
        assert!(matches!(
            FetchError::from_status(StatusCode::GATEWAY_TIMEOUT, ""),
            FetchError::Timeout(_)
        ));

        let long_body = "x".repeat(1000);
        match FetchError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &long_body) {
            FetchError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), ERROR_BODY_PREVIEW);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
