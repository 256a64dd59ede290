use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;
use webread_core::{Error, Result, SearchProvider, SearchQuery, SearchResponse, SearchResult};

use crate::config::{Config, SearxngAuth};

const DEFAULT_MAX_RESULTS: usize = 10;

fn timeout_ms_from_query(q: &SearchQuery) -> u64 {
    // Provider requests can hang indefinitely without an explicit timeout.
    q.timeout_ms.unwrap_or(20_000).clamp(1_000, 60_000)
}

/// SearXNG JSON API (`/search?format=json`).
pub struct SearxngSearchProvider {
    client: reqwest::Client,
    endpoint: String,
    auth: Option<SearxngAuth>,
}

impl SearxngSearchProvider {
    pub fn new(client: reqwest::Client, base_endpoint: &str) -> Self {
        Self {
            client,
            endpoint: Self::endpoint_search_for(base_endpoint),
            auth: None,
        }
    }

    pub fn with_basic_auth(mut self, auth: SearxngAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn from_config(client: reqwest::Client, cfg: &Config) -> Result<Self> {
        let base = cfg.searxng_url.as_deref().ok_or_else(|| {
            Error::NotConfigured("missing WEBREAD_SEARXNG_URL (or SEARXNG_URL)".to_string())
        })?;
        let p = Self::new(client, base);
        Ok(match cfg.searxng_auth.clone() {
            Some(auth) => p.with_basic_auth(auth),
            None => p,
        })
    }

    fn endpoint_search_for(base_endpoint: &str) -> String {
        // Accept either a base URL (…/), or a full /search endpoint.
        let mut base = base_endpoint.trim().trim_end_matches('/').to_string();
        if !base.ends_with("/search") {
            base.push_str("/search");
        }
        base
    }
}

#[derive(Debug, Deserialize)]
struct SearxngSearchResponse {
    results: Option<Vec<SearxngResult>>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    url: Option<String>,
    title: Option<String>,
    content: Option<String>,
    score: Option<f64>,
}

#[async_trait::async_trait]
impl SearchProvider for SearxngSearchProvider {
    fn name(&self) -> &'static str {
        "searxng"
    }

    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse> {
        let t0 = Instant::now();
        let max_results = q.max_results.unwrap_or(DEFAULT_MAX_RESULTS).clamp(1, 50);
        let timeout_ms = timeout_ms_from_query(q);

        let mut req = self
            .client
            .get(&self.endpoint)
            .query(&[("q", q.query.as_str()), ("format", "json")]);
        if let Some(lang) = q.language.as_deref() {
            req = req.query(&[("language", lang)]);
        }
        if let Some(auth) = &self.auth {
            req = req.basic_auth(&auth.username, auth.password.as_deref());
        }

        let resp = req
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("searxng search HTTP {status}")));
        }

        let parsed: SearxngSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let results: Vec<SearchResult> = parsed
            .results
            .unwrap_or_default()
            .into_iter()
            .filter_map(|r| {
                Some(SearchResult {
                    url: r.url?,
                    title: r.title,
                    snippet: r.content,
                    score: r.score,
                    source: "searxng".to_string(),
                })
            })
            .take(max_results)
            .collect();

        let mut timings_ms = BTreeMap::new();
        timings_ms.insert("search".to_string(), t0.elapsed().as_millis());
        debug!(query = %q.query, results = results.len(), "searxng search done");

        Ok(SearchResponse {
            results,
            provider: "searxng".to_string(),
            timings_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, routing::get, Json, Router};
    use std::collections::HashMap;

    fn query(q: &str) -> SearchQuery {
        SearchQuery {
            query: q.to_string(),
            max_results: Some(2),
            language: None,
            timeout_ms: Some(5_000),
        }
    }

    #[test]
    fn endpoint_accepts_base_or_search_path() {
        assert_eq!(
            SearxngSearchProvider::endpoint_search_for("http://sx.local/"),
            "http://sx.local/search"
        );
        assert_eq!(
            SearxngSearchProvider::endpoint_search_for("http://sx.local/search"),
            "http://sx.local/search"
        );
    }

    #[test]
    fn unconfigured_provider_is_not_configured_error() {
        let cfg = Config::default();
        let err = SearxngSearchProvider::from_config(reqwest::Client::new(), &cfg)
            .err()
            .unwrap();
        assert_eq!(err.kind(), webread_core::ErrorKind::NotConfigured);
    }

    #[test]
    fn parses_minimal_searxng_shape() {
        let js = r#"
        {
          "results": [
            {"url":"https://example.com","title":"Example","content":"Hello","score":1.5}
          ]
        }
        "#;
        let parsed: SearxngSearchResponse = serde_json::from_str(js).unwrap();
        let rs = parsed.results.unwrap();
        assert_eq!(rs.len(), 1);
        assert_eq!(rs[0].score, Some(1.5));
    }

    #[tokio::test]
    async fn searches_local_fixture_and_caps_results() {
        let app = Router::new().route(
            "/search",
            get(|Query(p): Query<HashMap<String, String>>| async move {
                assert_eq!(p.get("format").map(String::as_str), Some("json"));
                let q = p.get("q").cloned().unwrap_or_default();
                Json(serde_json::json!({
                    "results": [
                        {"url": "https://a.example/", "title": format!("A {q}"), "content": "first"},
                        {"title": "no url, skipped"},
                        {"url": "https://b.example/", "title": "B", "content": "second"},
                        {"url": "https://c.example/", "title": "C", "content": "third"}
                    ]
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let p = SearxngSearchProvider::new(reqwest::Client::new(), &format!("http://{addr}"));
        let resp = p.search(&query("rust")).await.unwrap();
        assert_eq!(resp.provider, "searxng");
        assert_eq!(resp.results.len(), 2);
        assert_eq!(resp.results[0].title.as_deref(), Some("A rust"));
        assert_eq!(resp.results[1].url, "https://b.example/");
    }

    #[tokio::test]
    async fn basic_auth_is_sent_when_configured() {
        use axum::http::{HeaderMap, StatusCode};

        let app = Router::new().route(
            "/search",
            get(|headers: HeaderMap| async move {
                // base64("user:pass")
                match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                    Some("Basic dXNlcjpwYXNz") => (
                        StatusCode::OK,
                        Json(serde_json::json!({"results": [{"url": "https://ok.example/"}]})),
                    ),
                    _ => (StatusCode::UNAUTHORIZED, Json(serde_json::json!({}))),
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let base = format!("http://{addr}");
        let anon = SearxngSearchProvider::new(reqwest::Client::new(), &base);
        let err = anon.search(&query("rust")).await.unwrap_err();
        assert!(err.to_string().contains("401"));

        let mut cfg = Config::default();
        cfg.searxng_url = Some(base);
        cfg.searxng_auth = Some(SearxngAuth {
            username: "user".to_string(),
            password: Some("pass".to_string()),
        });
        let authed = SearxngSearchProvider::from_config(reqwest::Client::new(), &cfg).unwrap();
        let resp = authed.search(&query("rust")).await.unwrap();
        assert_eq!(resp.results[0].url, "https://ok.example/");
    }

    #[tokio::test]
    async fn http_failure_maps_to_search_error() {
        let app = Router::new().route(
            "/search",
            get(|| async { (axum::http::StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let p = SearxngSearchProvider::new(reqwest::Client::new(), &format!("http://{addr}/"));
        let err = p.search(&query("rust")).await.unwrap_err();
        assert_eq!(err.kind(), webread_core::ErrorKind::Search);
        assert!(err.to_string().contains("429"));
    }
}
