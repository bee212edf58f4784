//! HTTP transport handed to the site adapter and the channel web preview.
//!
//! Adapters only see the [`HttpFetch`] trait, so tests can swap in canned
//! responses. The reqwest implementation classifies responses into the
//! [`SourceError`] taxonomy:
//!
//! | Response | Result |
//! |----------|--------|
//! | 2xx | body text |
//! | 429, or 503 with `Retry-After` | [`SourceError::RateLimited`] |
//! | other status, connect/timeout/TLS failure | [`SourceError::Unavailable`] |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Certificate, Client, StatusCode, header};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::error::{HarvestError, SourceError};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Wait used when a 429 carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// GET `url` and return the body as text.
    async fn get_text(&self, url: &str) -> Result<String, SourceError>;
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout: Duration,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    /// Extra PEM root certificate.
    pub ca_file: Option<std::path::PathBuf>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(20),
            insecure: false,
            ca_file: None,
        }
    }
}

/// [`HttpFetch`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, HarvestError> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .gzip(true)
            .brotli(true);
        if config.insecure {
            warn!("TLS certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(path) = &config.ca_file {
            builder = builder.add_root_certificate(load_certificate(path)?);
        }
        let client = builder
            .build()
            .map_err(|e| HarvestError::config(format!("building HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

fn load_certificate(path: &Path) -> Result<Certificate, HarvestError> {
    let pem = std::fs::read(path)?;
    Certificate::from_pem(&pem)
        .map_err(|e| HarvestError::config(format!("invalid CA file {}: {e}", path.display())))
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn get_text(&self, url: &str) -> Result<String, SourceError> {
        let t0 = Instant::now();
        let resp = self
            .client
            .get(url)
            .header(header::ACCEPT, "*/*")
            .send()
            .await
            .map_err(|e| SourceError::unavailable(format!("GET {url}: {e}")))?;

        let status = resp.status();
        let retry_after = resp
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));

        if let Some(err) = classify_status(status, retry_after) {
            debug!(%status, elapsed_ms = t0.elapsed().as_millis() as u64, "Request rejected");
            return Err(match err {
                SourceError::Unavailable { reason } => {
                    SourceError::unavailable(format!("GET {url}: {reason}"))
                }
                other => other,
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| SourceError::unavailable(format!("reading {url}: {e}")))?;
        debug!(
            %status,
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched"
        );
        Ok(body)
    }
}

/// Map a non-success status onto the error taxonomy. `None` for 2xx.
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>) -> Option<SourceError> {
    if status.is_success() {
        return None;
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some(SourceError::RateLimited {
            retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
        });
    }
    if status == StatusCode::SERVICE_UNAVAILABLE {
        if let Some(retry_after) = retry_after {
            return Some(SourceError::RateLimited { retry_after });
        }
    }
    Some(SourceError::unavailable(format!("HTTP {status}")))
}

/// `Retry-After` is either delta-seconds or an HTTP date.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::OK, None), None);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, None),
            Some(SourceError::RateLimited {
                retry_after: DEFAULT_RETRY_AFTER
            })
        );
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, Some(Duration::from_secs(2))),
            Some(SourceError::RateLimited {
                retry_after: Duration::from_secs(2)
            })
        );
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, None),
            Some(SourceError::Unavailable { .. })
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, None),
            Some(SourceError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_parse_retry_after() {
        let now = Utc.with_ymd_and_hms(2025, 8, 27, 12, 0, 0).unwrap();
        assert_eq!(parse_retry_after("120", now), Some(Duration::from_secs(120)));
        assert_eq!(
            parse_retry_after("Wed, 27 Aug 2025 12:00:30 GMT", now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("Wed, 27 Aug 2025 11:00:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[test]
    fn test_reqwest_fetcher_builds() {
        assert!(ReqwestFetcher::new(&HttpConfig::default()).is_ok());
    }
}
