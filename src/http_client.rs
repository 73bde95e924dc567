use crate::config::HttpConfig;
use crate::error::FetchError;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;

/// Browser identities sent in rotation with every request
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0",
];

const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504, 520, 521, 522, 523, 524];

/// A fetched body together with its HTTP status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// The network seam used by every pipeline stage.
///
/// Non-2xx statuses are returned as pages, not errors; only timeouts and
/// transport failures are `Err`.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchedPage, FetchError>;

    /// Status code of a HEAD request.
    async fn head(&self, url: &str, timeout: Duration) -> Result<u16, FetchError>;
}

#[derive(Debug, Clone, Copy)]
struct Backoff {
    initial_ms: u64,
    max_ms: u64,
}

impl Backoff {
    /// Doubling delay capped at `max_ms`, with ±25% jitter.
    fn delay(&self, attempt: u32) -> Duration {
        let exp = self.initial_ms.saturating_mul(1u64 << attempt.min(20)).min(self.max_ms);
        let jitter: f64 = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_millis((exp as f64 * jitter) as u64)
    }
}

/// reqwest client presenting itself as a French-locale desktop browser
pub struct EnhancedHttpClient {
    client: Client,
    max_retries: u32,
    backoff: Backoff,
}

impl EnhancedHttpClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::from_config(&HttpConfig::default())
    }

    pub fn from_config(http: &HttpConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("fr-FR,fr;q=0.9,en;q=0.8"));
        headers.insert("DNT", HeaderValue::from_static("1"));

        let client = Client::builder()
            .timeout(http.listing_timeout().max(http.episodes_timeout()))
            .cookie_store(http.enable_cookies)
            .gzip(http.enable_compression)
            .brotli(http.enable_compression)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            max_retries: u32::try_from(http.max_retries).unwrap_or(u32::MAX),
            backoff: Backoff {
                initial_ms: http.initial_retry_delay_ms,
                max_ms: http.max_retry_delay_ms,
            },
        })
    }

    fn pick_user_agent() -> &'static str {
        USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0])
    }

    fn should_retry_status(status: StatusCode) -> bool {
        RETRYABLE_STATUSES.contains(&status.as_u16())
    }

    fn should_retry_error(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect() || err.is_request()
    }

    /// Send the request built by `build`, retrying retryable statuses and
    /// transport errors up to `max_retries` extra times.
    async fn send(&self, url: &str, build: impl Fn() -> RequestBuilder) -> Result<Response, reqwest::Error> {
        let mut attempt = 0u32;
        loop {
            let result = build().header(USER_AGENT, Self::pick_user_agent()).send().await;
            let retry = attempt < self.max_retries
                && match &result {
                    Ok(response) => Self::should_retry_status(response.status()),
                    Err(err) => Self::should_retry_error(err),
                };
            if !retry {
                return result;
            }

            let delay = self.backoff.delay(attempt);
            match &result {
                Ok(response) => log::warn!(
                    "{} answered {}, retry {}/{} in {:?}",
                    url,
                    response.status(),
                    attempt + 1,
                    self.max_retries,
                    delay
                ),
                Err(err) => log::warn!(
                    "{} failed ({}), retry {}/{} in {:?}",
                    url,
                    err,
                    attempt + 1,
                    self.max_retries,
                    delay
                ),
            }
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl Fetch for EnhancedHttpClient {
    async fn get(&self, url: &str, timeout: Duration) -> Result<FetchedPage, FetchError> {
        let response = self
            .send(url, || self.client.get(url).timeout(timeout))
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| FetchError::from_reqwest(url, e))?;
        Ok(FetchedPage { status, body })
    }

    async fn head(&self, url: &str, timeout: Duration) -> Result<u16, FetchError> {
        let response = self
            .send(url, || self.client.head(url).timeout(timeout))
            .await
            .map_err(|e| FetchError::from_reqwest(url, e))?;
        Ok(response.status().as_u16())
    }
}
