use std::time::Duration;

use log::{debug, warn};
use rand::random_range;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use rustls::crypto::{CryptoProvider, ring};
use tokio::time::sleep;
use url::Url;

use crate::config::FetcherConfig;
use crate::error::FetchError;
use crate::metrics::{METRICS, RuntimeMetrics};

/// Randomized pause applied before every request.
///
/// Bounds are in seconds; `low <= high` is checked when the
/// configuration is validated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayRange {
    pub low: f64,
    pub high: f64,
}

impl DelayRange {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// No pause at all (tests, local mirrors).
    pub fn none() -> Self {
        Self { low: 0.0, high: 0.0 }
    }

    /// Unrepresentable bounds (NaN, infinite, overflowing) yield no pause.
    pub fn sample(&self) -> Duration {
        let secs = if self.high > self.low {
            random_range(self.low..=self.high)
        } else {
            self.low.max(0.0)
        };
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self { low: 1.0, high: 3.0 }
    }
}

/// Installs rustls' `ring` provider as the process default.
///
/// rustls >= 0.23 refuses to build a TLS config when more than one
/// provider is compiled in and none was chosen. Must run before the
/// first HTTPS request; repeated calls are harmless.
pub fn install_crypto_provider() {
    let _ = CryptoProvider::install_default(ring::default_provider());
}

/// A fetched document.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// ============================================================
/// RateLimitedFetcher
/// ============================================================
///
/// HTTP GET with a random pause in front of every call.
///
/// Each source adapter owns its own fetcher so the delay bounds the
/// request rate against that one source. The underlying
/// `reqwest::Client` is a cheap clone of a shared connection pool.
///
/// CONTRACT:
/// - Never panics
/// - Timeouts, DNS/connect failures and non-2xx statuses are returned
///   as `FetchError`; callers decide whether that means "nothing found"
///
#[derive(Clone)]
pub struct RateLimitedFetcher {
    client: reqwest::Client,
    delay: DelayRange,
    timeout: Duration,
}

impl RateLimitedFetcher {
    pub fn new(client: reqwest::Client, delay: DelayRange, timeout: Duration) -> Self {
        Self {
            client,
            delay,
            timeout,
        }
    }

    /// Builds the shared HTTP client with browser-like headers.
    ///
    /// Some court portals answer 403 to clients without an
    /// `Accept-Language` header.
    pub fn build_client(cfg: &FetcherConfig) -> Result<reqwest::Client, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("pt-BR,pt;q=0.9,en;q=0.8"),
        );

        reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .default_headers(headers)
            .build()
    }

    pub fn from_config(client: reqwest::Client, cfg: &FetcherConfig) -> Self {
        Self::new(
            client,
            DelayRange::new(cfg.delay_min_secs, cfg.delay_max_secs),
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    /// Fetches `url` with optional query parameters.
    ///
    /// `timeout` overrides the configured default for this one call.
    pub async fn fetch(
        &self,
        url: &str,
        params: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<Page, FetchError> {
        let parsed = if params.is_empty() {
            Url::parse(url)
        } else {
            Url::parse_with_params(url, params.iter().map(|(k, v)| (*k, v.as_str())))
        };
        let target = parsed.map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;

        let pause = self.delay.sample();
        if !pause.is_zero() {
            sleep(pause).await;
        }

        RuntimeMetrics::incr(&METRICS.fetches);
        debug!("GET {} (after {:.1}s pause)", target, pause.as_secs_f64());

        let result = self.get(target.as_str(), timeout.unwrap_or(self.timeout)).await;
        if let Err(e) = &result {
            RuntimeMetrics::incr(&METRICS.fetch_failures);
            warn!("{}", e);
        }
        result
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<Page, FetchError> {
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };

        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(transport)?;
        Ok(Page {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}
