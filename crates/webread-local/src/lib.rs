use futures_util::StreamExt;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;
use webread_core::{Error, FetchBackend, PageRequest, PageResponse, Result};

pub mod cache;
pub mod config;
pub mod extract;
pub mod reader;
pub mod rewrite;
pub mod robots;
pub mod search;
pub mod session;

pub use cache::{BoundedCache, CacheStatus, ContentCache, GlobalCache};
pub use config::{Config, SearxngAuth};
pub use reader::{ReaderContext, UrlReader};
pub use session::SessionTracker;

const UNREADABLE_BODY: &str = "[Could not read response body]";

/// reqwest-backed [`FetchBackend`]. Each fetch runs under its own deadline
/// covering connect, headers and body.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            max_body_bytes: config::DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes.max(1);
        self
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self::new(cfg.http_client()?).with_max_body_bytes(cfg.fetch.max_body_bytes))
    }

    /// Stream the body, stopping once `max_body_bytes` have arrived.
    async fn read_body(&self, resp: reqwest::Response) -> std::result::Result<String, String> {
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| e.to_string())?;
            if bytes.len().saturating_add(chunk.len()) > self.max_body_bytes {
                let can_take = self.max_body_bytes.saturating_sub(bytes.len());
                bytes.extend_from_slice(&chunk[..can_take]);
                debug!(max_bytes = self.max_body_bytes, "response body truncated");
                break;
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn apply_headers(
        mut rb: reqwest::RequestBuilder,
        headers: &BTreeMap<String, String>,
    ) -> reqwest::RequestBuilder {
        for (k, v) in headers {
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(k.as_bytes()),
                reqwest::header::HeaderValue::from_str(v),
            ) {
                rb = rb.header(name, value);
            }
        }
        rb
    }

    async fn fetch_inner(&self, url: reqwest::Url, req: &PageRequest) -> Result<PageResponse> {
        let t0 = Instant::now();
        let rb = Self::apply_headers(self.client.get(url), &req.headers);
        let resp = rb.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    url: req.url.clone(),
                    timeout_ms: req.timeout_ms,
                }
            } else {
                Error::Network {
                    url: req.url.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let final_url = resp.url().to_string();
        let status = resp.status();
        let status_text = status.canonical_reason().unwrap_or("").to_string();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = match self.read_body(resp).await {
            Ok(b) => b,
            // Non-2xx bodies are only used for error messages.
            Err(_) if !status.is_success() => UNREADABLE_BODY.to_string(),
            Err(e) => {
                return Err(Error::Content {
                    url: req.url.clone(),
                    message: format!("failed to read website content: {e}"),
                })
            }
        };

        Ok(PageResponse {
            url: req.url.clone(),
            final_url,
            status: status.as_u16(),
            status_text,
            content_type,
            body,
            elapsed_ms: t0.elapsed().as_millis(),
        })
    }
}

#[async_trait::async_trait]
impl FetchBackend for HttpFetcher {
    async fn fetch(&self, req: &PageRequest) -> Result<PageResponse> {
        let url = reqwest::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
        // Dropping the future on expiry cancels the in-flight request.
        match tokio::time::timeout(req.timeout(), self.fetch_inner(url, req)).await {
            Ok(r) => r,
            Err(_) => Err(Error::Timeout {
                url: req.url.clone(),
                timeout_ms: req.timeout_ms,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::header, http::StatusCode, routing::get, Router};
    use std::net::SocketAddr;
    use std::time::Duration;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn fetches_body_and_metadata() {
        let app = Router::new().route(
            "/",
            get(|| async { ([(header::CONTENT_TYPE, "text/html")], "<p>hello</p>") }),
        );
        let addr = serve(app).await;
        let f = HttpFetcher::new(reqwest::Client::new());
        let r = f
            .fetch(&PageRequest::new(format!("http://{addr}/"), 2_000))
            .await
            .unwrap();
        assert!(r.is_success());
        assert_eq!(r.body, "<p>hello</p>");
        assert_eq!(r.content_type.as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn non_2xx_is_returned_with_status_text() {
        let app = Router::new().route(
            "/",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down for maintenance") }),
        );
        let addr = serve(app).await;
        let f = HttpFetcher::new(reqwest::Client::new());
        let r = f
            .fetch(&PageRequest::new(format!("http://{addr}/"), 2_000))
            .await
            .unwrap();
        assert_eq!(r.status, 503);
        assert_eq!(r.status_text, "Service Unavailable");
        assert_eq!(r.body, "down for maintenance");
    }

    #[tokio::test]
    async fn oversized_body_is_cut_at_the_byte_cap() {
        let app = Router::new().route("/", get(|| async { "x".repeat(10_000) }));
        let addr = serve(app).await;
        let f = HttpFetcher::new(reqwest::Client::new()).with_max_body_bytes(1_024);
        let r = f
            .fetch(&PageRequest::new(format!("http://{addr}/"), 2_000))
            .await
            .unwrap();
        assert!(r.is_success());
        assert_eq!(r.body.len(), 1_024);
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let app = Router::new().route(
            "/",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let addr = serve(app).await;
        let f = HttpFetcher::new(reqwest::Client::new());
        let err = f
            .fetch(&PageRequest::new(format!("http://{addr}/"), 100))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), webread_core::ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap()
        };
        let f = HttpFetcher::new(reqwest::Client::new());
        let err = f
            .fetch(&PageRequest::new(format!("http://{addr}/"), 2_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), webread_core::ErrorKind::Network);
    }

    #[tokio::test]
    async fn malformed_url_is_format_error() {
        let f = HttpFetcher::new(reqwest::Client::new());
        let err = f
            .fetch(&PageRequest::new("not a url", 2_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), webread_core::ErrorKind::UrlFormat);
    }
}
