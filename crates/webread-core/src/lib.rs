use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub mod paginate;

pub use paginate::{Continuation, Page, PaginationOptions};

/// Session id used when the host protocol does not supply one.
pub const DEFAULT_SESSION_ID: &str = "default";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url format: {0}")]
    InvalidUrl(String),
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
    #[error("server error {status} {status_text} for {url}: {body}")]
    Server {
        url: String,
        status: u16,
        status_text: String,
        body: String,
    },
    #[error("content error for {url}: {message}")]
    Content { url: String, message: String },
    #[error("conversion failed: {0}")]
    Conversion(String),
    #[error("timed out after {timeout_ms}ms fetching {url}")]
    Timeout { url: String, timeout_ms: u64 },
    #[error("search failed: {0}")]
    Search(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of [`Error`], stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UrlFormat,
    Network,
    Server,
    Content,
    Conversion,
    Timeout,
    Search,
    NotConfigured,
    InvalidParams,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UrlFormat => "url_format",
            Self::Network => "network",
            Self::Server => "server",
            Self::Content => "content",
            Self::Conversion => "conversion",
            Self::Timeout => "timeout",
            Self::Search => "search",
            Self::NotConfigured => "not_configured",
            Self::InvalidParams => "invalid_params",
            Self::Unexpected => "unexpected",
        }
    }

    /// True when the failure belongs to the requested URL (bad input, remote
    /// refusal, transport trouble) rather than to the pipeline itself.
    pub fn is_fatal_for_url(self) -> bool {
        match self {
            Self::UrlFormat
            | Self::Network
            | Self::Server
            | Self::Content
            | Self::Timeout
            | Self::Search => true,
            Self::Conversion | Self::NotConfigured | Self::InvalidParams | Self::Unexpected => {
                false
            }
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl(_) => ErrorKind::UrlFormat,
            Self::Network { .. } => ErrorKind::Network,
            Self::Server { .. } => ErrorKind::Server,
            Self::Content { .. } => ErrorKind::Content,
            Self::Conversion(_) => ErrorKind::Conversion,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Search(_) => ErrorKind::Search,
            Self::NotConfigured(_) => ErrorKind::NotConfigured,
            Self::InvalidParams(_) => ErrorKind::InvalidParams,
            Self::Unexpected(_) => ErrorKind::Unexpected,
        }
    }
}

/// A read tool invocation: one URL or a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FetchRequest {
    Single { url: String },
    Batch { urls: Vec<String> },
}

impl FetchRequest {
    /// Build from the loose `{url?, urls?}` argument shape. A non-empty `urls`
    /// wins over `url`.
    pub fn from_parts(url: Option<String>, urls: Option<Vec<String>>) -> Result<Self> {
        match (url, urls) {
            (_, Some(urls)) if !urls.is_empty() => Ok(Self::Batch { urls }),
            (Some(url), _) if !url.trim().is_empty() => Ok(Self::Single { url }),
            _ => Err(Error::InvalidParams(
                "either 'url' or 'urls' parameter must be provided".to_string(),
            )),
        }
    }
}

/// A single network fetch handed to a [`FetchBackend`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRequest {
    pub url: String,
    /// Hard deadline for connect + headers + body.
    pub timeout_ms: u64,
    /// Optional headers to add.
    pub headers: BTreeMap<String, String>,
}

impl PageRequest {
    pub fn new(url: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            url: url.into(),
            timeout_ms,
            headers: BTreeMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    /// Body text. For non-2xx responses this is best-effort and may be a placeholder.
    pub body: String,
    pub elapsed_ms: u128,
}

impl PageResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network transport. Implementations map transport failures to
/// [`Error::Network`] and deadline expiry to [`Error::Timeout`]; HTTP status
/// codes are returned as-is for the caller to judge.
#[async_trait::async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, req: &PageRequest) -> Result<PageResponse>;
}

/// Main-content extraction (readability-like). `Ok(None)` means nothing usable
/// was found and the caller should fall back to the full document.
pub trait ContentExtractor: Send + Sync {
    fn extract_main(&self, html: &str) -> std::result::Result<Option<String>, String>;
}

/// HTML to markdown-ish text. Headings must come out as `#`-prefixed lines so
/// the pagination engine can find them.
pub trait MarkdownConverter: Send + Sync {
    fn to_markdown(&self, html: &str) -> std::result::Result<String, String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: Option<usize>,
    pub language: Option<String>,
    /// Timeout for the provider request.
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: Option<String>,
    pub snippet: Option<String>,
    pub score: Option<f64>,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub provider: String,
    pub timings_ms: BTreeMap<String, u128>,
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &SearchQuery) -> Result<SearchResponse>;
}
