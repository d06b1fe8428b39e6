//! Page fetching.
//!
//! HTTP client used for every page, manifest and API request a resolution makes.

use async_trait::async_trait;
use reqwest::header::{ACCEPT_ENCODING, REFERER, USER_AGENT};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

/// Maximum redirect hops followed for a single request
const MAX_REDIRECTS: usize = 10;

pub mod useragents {
    pub const FIREFOX: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/115.0";
    pub const IPHONE_6: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 11_0 like Mac OS X) AppleWebKit/604.1.38 (KHTML, like Gecko) Version/11.0 Mobile/15A372 Safari/604.1";
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("403 Client Error: Forbidden for url: {0}")]
    Forbidden(String),
    #[error("404 Client Error: Not Found for url: {0}")]
    NotFound(String),
    #[error("HTTP {status} for url: {url}")]
    Status { status: u16, url: String },
    #[error("unsupported transfer encoding: {0}")]
    TransferEncodingUnsupported(String),
    #[error("network error: {0}")]
    Network(String),
}

/// One outgoing page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub accept_encoding: Option<String>,
    pub verify_tls: bool,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            referer: None,
            user_agent: None,
            accept_encoding: None,
            verify_tls: true,
        }
    }

    pub fn referer(mut self, referer: Option<String>) -> Self {
        self.referer = referer;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Body of a fetched page, with the URL it ended up at after redirects
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub text: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError>;
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    client: Client,
    insecure_client: Client,
    default_user_agent: String,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout_ms: u64, max_retries: u32) -> Result<Self, FetchError> {
        let timeout = Duration::from_millis(timeout_ms);
        Ok(Self {
            client: build_client(timeout, false)?,
            insecure_client: build_client(timeout, true)?,
            default_user_agent: user_agent.to_string(),
            max_retries,
        })
    }

    async fn send(&self, request: &FetchRequest) -> Result<reqwest::Response, FetchError> {
        let client = if request.verify_tls {
            &self.client
        } else {
            &self.insecure_client
        };
        let user_agent = request
            .user_agent
            .as_deref()
            .unwrap_or(&self.default_user_agent);

        let mut attempt = 0;
        loop {
            let mut builder = client.get(&request.url).header(USER_AGENT, user_agent);
            if let Some(referer) = &request.referer {
                builder = builder.header(REFERER, referer);
            }
            if let Some(encoding) = &request.accept_encoding {
                builder = builder.header(ACCEPT_ENCODING, encoding);
            }

            match builder.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.max_retries {
                        let backoff_ms = backoff(attempt);
                        tracing::warn!("fetch_retry" = attempt + 1, "reason" = "429", "backoff_ms" = backoff_ms);
                        sleep(Duration::from_millis(backoff_ms)).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) if err.is_decode() => {
                    return Err(FetchError::TransferEncodingUnsupported(err.to_string()));
                }
                Err(err) => {
                    if attempt < self.max_retries && (err.is_connect() || err.is_timeout()) {
                        let backoff_ms = backoff(attempt);
                        tracing::warn!("fetch_retry" = attempt + 1, "reason" = "network", "backoff_ms" = backoff_ms);
                        sleep(Duration::from_millis(backoff_ms)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(FetchError::Network(err.to_string()));
                }
            }
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedPage, FetchError> {
        let response = self.send(request).await?;

        let status = response.status();
        match status {
            StatusCode::FORBIDDEN => return Err(FetchError::Forbidden(request.url.clone())),
            StatusCode::NOT_FOUND => return Err(FetchError::NotFound(request.url.clone())),
            s if !s.is_success() => {
                return Err(FetchError::Status {
                    status: s.as_u16(),
                    url: request.url.clone(),
                })
            }
            _ => {}
        }

        let url = response.url().to_string();
        if url != request.url {
            tracing::debug!("URL: {}", url);
        }

        let text = response.text().await.map_err(|e| {
            if e.is_decode() {
                FetchError::TransferEncodingUnsupported(e.to_string())
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        Ok(FetchedPage { url, text })
    }
}

fn build_client(timeout: Duration, accept_invalid_certs: bool) -> Result<Client, FetchError> {
    Client::builder()
        .timeout(timeout)
        .gzip(true)
        .deflate(true)
        .redirect(redirect_policy())
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|e| FetchError::Network(e.to_string()))
}

/// Follow redirects, logging each hop
fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else {
            tracing::debug!("Redirect: {} - {}", attempt.status().as_u16(), attempt.url());
            attempt.follow()
        }
    })
}

fn backoff(attempt: u32) -> u64 {
    (1u64 << attempt).saturating_mul(500).min(10_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer one request on a loopback port with a canned raw response
    async fn serve_once(response: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(response).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{}/page", addr)
    }

    #[test]
    fn test_fetch_request_builder() {
        let request = FetchRequest::new("http://example.com/")
            .referer(Some("http://ref.example.com/".to_string()))
            .user_agent(useragents::IPHONE_6);
        assert_eq!(request.referer.as_deref(), Some("http://ref.example.com/"));
        assert_eq!(request.user_agent.as_deref(), Some(useragents::IPHONE_6));
        assert!(request.verify_tls);
        assert_eq!(request.accept_encoding, None);
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff(0), 500);
        assert_eq!(backoff(1), 1000);
        assert_eq!(backoff(10), 10_000);
    }

    #[test]
    fn test_fetcher_builds() {
        assert!(HttpFetcher::new(useragents::FIREFOX, 1000, 0).is_ok());
    }

    #[tokio::test]
    async fn test_undecodable_body_is_transfer_encoding_error() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: 10\r\nConnection: close\r\n\r\nnotgzip!!!",
        )
        .await;
        let fetcher = HttpFetcher::new("test", 5_000, 0).unwrap();
        let err = fetcher.fetch(&FetchRequest::new(url)).await.unwrap_err();
        assert!(matches!(err, FetchError::TransferEncodingUnsupported(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_truncated_body_is_network_error() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 100\r\nConnection: close\r\n\r\n<html>",
        )
        .await;
        let fetcher = HttpFetcher::new("test", 5_000, 0).unwrap();
        let err = fetcher.fetch(&FetchRequest::new(url)).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)), "{:?}", err);
    }
}
