//! Read and search orchestration.
//!
//! [`ReaderContext`] is built once per process and shared; [`UrlReader`] is a
//! cheap handle over it that the tool surfaces call into.

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use tracing::{debug, info, warn};
use webread_core::paginate::apply_pagination;
use webread_core::{
    ContentExtractor, Error, FetchBackend, FetchRequest, MarkdownConverter, Page, PageRequest,
    PaginationOptions, Result, SearchProvider, SearchQuery, SearchResult,
};

use crate::cache::{CacheStatus, ContentCache, GlobalCache};
use crate::config::Config;
use crate::extract::{html_preview, Html2TextConverter, ScraperExtractor};
use crate::rewrite::{is_blocked_video_host, resolve_redirect_url};
use crate::robots::RobotsGate;
use crate::search::SearxngSearchProvider;
use crate::session::{normalize_query, SessionStats, SessionTracker};
use crate::HttpFetcher;

/// Chars of a failing response body kept in the error message.
const ERROR_BODY_CHARS: usize = 1_000;
const EMPTY_PREVIEW_CHARS: usize = 200;

pub const NO_BATCH_URLS: &str = "No URLs provided for batch reading.";
pub const ROBOTS_BLOCKED: &str =
    "Access to this URL is blocked by the website's robots.txt policy.";

pub struct ReaderContext {
    pub config: Arc<Config>,
    pub backend: Arc<dyn FetchBackend>,
    pub search: Option<Arc<dyn SearchProvider>>,
    pub content_cache: ContentCache,
    pub global_cache: GlobalCache,
    pub robots: RobotsGate,
    pub sessions: Arc<SessionTracker>,
    pub extractor: Box<dyn ContentExtractor>,
    pub converter: Box<dyn MarkdownConverter>,
}

impl ReaderContext {
    /// Defaults for everything but the transport; no search provider.
    pub fn new(config: Config, backend: Arc<dyn FetchBackend>) -> Self {
        let robots = RobotsGate::new(
            config.fetch.enable_robots_txt,
            config.fetch.timeout_ms,
            config.fetch.robots_ttl,
            &config.user_agent,
            backend.clone(),
        );
        Self {
            content_cache: ContentCache::new(&config.cache),
            global_cache: GlobalCache::default(),
            robots,
            sessions: Arc::new(SessionTracker::new()),
            extractor: Box::new(ScraperExtractor::default()),
            converter: Box::new(Html2TextConverter::default()),
            search: None,
            backend,
            config: Arc::new(config),
        }
    }

    /// Production wiring: shared reqwest client, HTTP fetcher and SearXNG when
    /// `SEARXNG_URL` is set.
    pub fn from_config(config: Config) -> Result<Self> {
        let client = config.http_client()?;
        let search: Option<Arc<dyn SearchProvider>> = match config.searxng_url {
            Some(_) => Some(Arc::new(SearxngSearchProvider::from_config(
                client.clone(),
                &config,
            )?)),
            None => None,
        };
        let backend: Arc<dyn FetchBackend> = Arc::new(
            HttpFetcher::new(client).with_max_body_bytes(config.fetch.max_body_bytes),
        );
        let mut ctx = Self::new(config, backend);
        ctx.search = search;
        Ok(ctx)
    }

    pub fn with_search_provider(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(provider);
        self
    }

    pub fn with_extractor(mut self, extractor: Box<dyn ContentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_converter(mut self, converter: Box<dyn MarkdownConverter>) -> Self {
        self.converter = converter;
        self
    }
}

fn continuation_note(page: &Page) -> String {
    match page.continuation {
        Some(c) => format!(
            "\n\n[truncated] {} chars remain. Continue with startChar={}.",
            c.remaining, c.next_start
        ),
        None => String::new(),
    }
}

fn join_non_empty<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(AsRef::as_ref)
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn empty_content_warning(url: &str, html: &str) -> String {
    format!(
        "Warning: {url} produced no readable content after conversion.\n\
         Original HTML length: {} characters.\n\
         Preview: {}",
        html.chars().count(),
        html_preview(html, EMPTY_PREVIEW_CHARS)
    )
}

/// `<n>. <title>\n<url>\n<snippet>` blocks separated by blank lines.
pub fn format_search_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let title = r.title.as_deref().unwrap_or(r.url.as_str());
            let snippet = r.snippet.as_deref().unwrap_or("").trim();
            format!("{}. {}\n{}\n{}", i + 1, title.trim(), r.url, snippet)
                .trim_end()
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Clone)]
pub struct UrlReader {
    ctx: Arc<ReaderContext>,
}

impl UrlReader {
    pub fn new(ctx: ReaderContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &Arc<ReaderContext> {
        &self.ctx
    }

    pub fn sessions(&self) -> &Arc<SessionTracker> {
        &self.ctx.sessions
    }

    /// Dispatch a single or batch read. Batches never fail as a whole.
    pub async fn read_request(
        &self,
        req: &FetchRequest,
        timeout_ms: Option<u64>,
        opts: &PaginationOptions,
        session_id: &str,
    ) -> Result<String> {
        match req {
            FetchRequest::Single { url } => self.read(url, timeout_ms, opts, session_id).await,
            FetchRequest::Batch { urls } => {
                Ok(self.read_batch(urls, timeout_ms, opts, session_id).await)
            }
        }
    }

    pub async fn read(
        &self,
        url: &str,
        timeout_ms: Option<u64>,
        opts: &PaginationOptions,
        session_id: &str,
    ) -> Result<String> {
        let r = self.read_inner(url, timeout_ms, opts, session_id).await;
        if let Err(e) = &r {
            warn!(url, kind = e.kind().as_str(), error = %e, "read failed");
        }
        r
    }

    async fn read_inner(
        &self,
        url: &str,
        timeout_ms: Option<u64>,
        opts: &PaginationOptions,
        session_id: &str,
    ) -> Result<String> {
        let t0 = Instant::now();
        let ctx = &self.ctx;
        let timeout_ms = timeout_ms.unwrap_or(ctx.config.fetch.timeout_ms);
        debug!(url, timeout_ms, session_id, "read");

        ctx.sessions.increment_url_read_round(session_id);
        let hint = ctx.sessions.cache_hint(session_id, url);
        if !hint.is_empty() {
            debug!(url, hint = %hint, "cache hint");
        }

        let resolved = resolve_redirect_url(url);

        if let Some(markdown) = ctx.content_cache.get(&resolved) {
            info!(url = %resolved, "serving cached content");
            ctx.sessions.record_url_read(session_id, &resolved);
            let page = apply_pagination(&markdown, opts);
            let elapsed = t0.elapsed().as_millis();
            let detailed = ctx
                .sessions
                .detailed_cache_hint(session_id, &resolved, &ctx.global_cache);
            let read_ctx = ctx.sessions.url_read_context(session_id);
            let marker = format!("[cache hit] page content served from URL cache ({elapsed}ms)");
            let body = format!("{}{}", page.text, continuation_note(&page));
            return Ok(format!(
                "{}\n\n{body}",
                join_non_empty(&[&read_ctx, &detailed, &marker])
            ));
        }

        let parsed = url::Url::parse(&resolved).map_err(|_| Error::InvalidUrl(resolved.clone()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(resolved));
        }

        if ctx.config.fetch.block_video_sites
            && is_blocked_video_host(&resolved, &ctx.config.fetch.video_blocklist)
        {
            info!(url = %resolved, "blocked video site");
            return Err(Error::Content {
                url: resolved,
                message: "video sites are blocked by configuration".to_string(),
            });
        }

        if !ctx.robots.is_url_allowed(&resolved).await {
            return Err(Error::Content {
                url: resolved,
                message: ROBOTS_BLOCKED.to_string(),
            });
        }

        let resp = ctx
            .backend
            .fetch(&PageRequest::new(resolved.clone(), timeout_ms))
            .await?;

        if !resp.is_success() {
            return Err(Error::Server {
                url: resolved,
                status: resp.status,
                status_text: resp.status_text,
                body: resp.body.chars().take(ERROR_BODY_CHARS).collect(),
            });
        }

        let html = resp.body;
        if html.trim().is_empty() {
            return Err(Error::Content {
                url: resolved,
                message: "website returned empty content".to_string(),
            });
        }

        let main = match ctx.extractor.extract_main(&html) {
            Ok(Some(m)) if !m.trim().is_empty() => {
                debug!(url = %resolved, "extracted main content");
                m
            }
            Ok(_) => {
                warn!(url = %resolved, "no main content found; using full html");
                html.clone()
            }
            Err(e) => {
                warn!(url = %resolved, error = %e, "extraction failed; using full html");
                html.clone()
            }
        };

        let markdown = match ctx.converter.to_markdown(&main) {
            Ok(md) => md,
            Err(e) => {
                warn!(url = %resolved, error = %e, "conversion failed; returning html");
                main
            }
        };

        if markdown.trim().is_empty() {
            warn!(url = %resolved, html_len = html.len(), "empty content after conversion");
            return Ok(empty_content_warning(&resolved, &html));
        }

        ctx.content_cache.put(resolved.clone(), markdown.clone());
        ctx.global_cache.url_put(resolved.clone(), markdown.clone());

        let page = apply_pagination(&markdown, opts);
        ctx.sessions.record_url_read(session_id, &resolved);

        let body = format!("{}{}", page.text, continuation_note(&page));
        let elapsed = t0.elapsed().as_millis();
        info!(
            url = %resolved,
            chars = body.chars().count(),
            elapsed_ms = elapsed as u64,
            "fetched and converted"
        );

        let read_ctx = ctx.sessions.url_read_context(session_id);
        let detailed = ctx
            .sessions
            .detailed_cache_hint(session_id, &resolved, &ctx.global_cache);
        Ok(format!(
            "{}\n\n[new page] {resolved} ({} chars, {elapsed}ms)\n\n{body}",
            join_non_empty(&[&read_ctx, &detailed]),
            body.chars().count(),
        ))
    }

    /// Read every URL concurrently (capped by `batch_concurrency`) and report
    /// each outcome in input order.
    pub async fn read_batch(
        &self,
        urls: &[String],
        timeout_ms: Option<u64>,
        opts: &PaginationOptions,
        session_id: &str,
    ) -> String {
        if urls.is_empty() {
            return NO_BATCH_URLS.to_string();
        }
        let t0 = Instant::now();
        let cap = self.ctx.config.fetch.batch_concurrency.max(1);
        info!(count = urls.len(), concurrency = cap, "batch read started");

        let results: Vec<(String, Result<String>)> = futures_util::stream::iter(urls.to_vec())
            .map(|u| async move {
                let r = self.read(&u, timeout_ms, opts, session_id).await;
                (u, r)
            })
            .buffered(cap)
            .collect()
            .await;

        let ok = results.iter().filter(|(_, r)| r.is_ok()).count();
        let failed = results.len() - ok;
        let elapsed = t0.elapsed().as_millis();
        info!(
            total = urls.len(),
            ok,
            failed,
            elapsed_ms = elapsed as u64,
            "batch read finished"
        );

        let mut out = format!(
            "=== Batch URL Reading Results ({} URLs, {ok} success, {failed} failed, {elapsed}ms) ===\n\n",
            urls.len()
        );
        for (url, r) in results {
            match r {
                Ok(content) => out.push_str(&format!("[URL: {url}]\n{content}\n\n---\n\n")),
                Err(e) => out.push_str(&format!("[URL: {url}]\nError: {e}\n\n---\n\n")),
            }
        }
        out
    }

    pub async fn search(&self, query: &str, session_id: &str) -> Result<String> {
        let t0 = Instant::now();
        let ctx = &self.ctx;
        ctx.sessions.increment_search_round(session_id);

        let key = normalize_query(query);
        if key.is_empty() {
            return Err(Error::InvalidParams("query must not be empty".to_string()));
        }
        let hint = ctx
            .sessions
            .detailed_cache_hint(session_id, &key, &ctx.global_cache);

        if let Some(cached) = ctx.global_cache.search_get(&key) {
            info!(query = %key, "serving cached search results");
            ctx.sessions.record_search(session_id, query);
            let marker = format!(
                "[cache hit] search results served from cache ({}ms)",
                t0.elapsed().as_millis()
            );
            let search_ctx = ctx.sessions.search_context(session_id);
            return Ok(format!(
                "{}\n\n{cached}",
                join_non_empty(&[&search_ctx, &hint, &marker])
            ));
        }

        let provider = ctx.search.as_ref().ok_or_else(|| {
            Error::NotConfigured("no search backend; set WEBREAD_SEARXNG_URL".to_string())
        })?;
        let resp = provider
            .search(&SearchQuery {
                query: query.trim().to_string(),
                max_results: None,
                language: None,
                timeout_ms: Some(ctx.config.fetch.timeout_ms),
            })
            .await
            .inspect_err(|e| warn!(query = %key, error = %e, "search failed"))?;

        let text = format_search_results(&resp.results);
        ctx.global_cache.search_put(key.clone(), text.clone());
        ctx.sessions.record_search(session_id, query);

        let elapsed = t0.elapsed().as_millis();
        info!(
            query = %key,
            provider = %resp.provider,
            results = resp.results.len(),
            elapsed_ms = elapsed as u64,
            "search finished"
        );
        let search_ctx = ctx.sessions.search_context(session_id);
        let marker = format!(
            "[new search] {} results via {} ({elapsed}ms)",
            resp.results.len(),
            provider.name()
        );
        Ok(format!(
            "{}\n\n{text}",
            join_non_empty(&[&search_ctx, &hint, &marker])
        ))
    }

    pub fn stats(&self, session_id: &str) -> SessionStats {
        self.ctx.sessions.stats(session_id, &self.ctx.global_cache)
    }

    pub fn reset_session(&self, session_id: &str) -> bool {
        self.ctx.sessions.reset(session_id)
    }

    pub fn combined_context(&self, session_id: &str) -> String {
        self.ctx.sessions.combined_context(session_id)
    }

    pub fn content_cache_status(&self) -> CacheStatus {
        self.ctx.content_cache.status()
    }

    pub fn clear_robots_cache(&self) {
        self.ctx.robots.clear();
    }
}
