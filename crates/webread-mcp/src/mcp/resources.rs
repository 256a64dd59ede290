use rmcp::model::{AnnotateAble, RawResource, Resource, ResourceContents};
use webread_local::Config;

pub(crate) const CONFIG_URI: &str = "config://server-config";
pub(crate) const HELP_URI: &str = "help://usage-guide";

const JSON_MIME: &str = "application/json";
const MARKDOWN_MIME: &str = "text/markdown";

const USAGE_GUIDE: &str = r#"# webread usage guide

## Tools

### search
Search the web through the configured SearXNG instance.
- `query` (required): search terms.
Repeated queries in a session are served from cache and marked `[cache hit]`.

### read
Read a page and return its main content as markdown-style text.
- `url`: one URL, or `urls`: a list read concurrently into one report.
- `readHeadings`: only the heading lines. Use it first on long pages.
- `section`: only the part under the first heading containing this text.
- `paragraphRange`: `"3"`, `"3-"` or `"2-5"` (1-based, blank-line separated).
- `startChar` / `maxLength`: character window. A `[truncated]` note names the next `startChar`.
- `timeoutMs`: per-request timeout, at least 1000.
Filters apply in that order: headings, section, paragraphs, character window.

### session_stats / session_reset
Counters and recent history for the calling session (`_meta.sessionId`, default `default`).
Reset forgets the history; cached pages and searches are kept.

## Tips
- Search, then read the most relevant results instead of every hit.
- Read headings first, then fetch only the section you need.
- Errors carry a `Hint:` line saying what to change before retrying.
"#;

fn resource(uri: &str, name: &str, description: &str, mime: &str) -> Resource {
    let mut r = RawResource::new(uri, name);
    r.description = Some(description.to_string());
    r.mime_type = Some(mime.to_string());
    r.no_annotation()
}

pub(crate) fn list() -> Vec<Resource> {
    vec![
        resource(
            CONFIG_URI,
            "Server Configuration",
            "Current server configuration (secrets omitted)",
            JSON_MIME,
        ),
        resource(
            HELP_URI,
            "Usage Guide",
            "How to search and read pages effectively",
            MARKDOWN_MIME,
        ),
    ]
}

/// Effective configuration. Credentials and proxy URLs are reported only as set/unset.
pub(crate) fn config_json(cfg: &Config) -> serde_json::Value {
    serde_json::json!({
        "server": {
            "name": "webread",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "search": {
            "searxng_url": cfg.searxng_url,
            "basic_auth": cfg.searxng_auth.is_some(),
        },
        "fetch": {
            "user_agent": cfg.user_agent,
            "timeout_ms": cfg.fetch.timeout_ms,
            "enable_robots_txt": cfg.fetch.enable_robots_txt,
            "robots_ttl_secs": cfg.fetch.robots_ttl.as_secs(),
            "block_video_sites": cfg.fetch.block_video_sites,
            "video_blocklist": cfg.fetch.video_blocklist,
            "batch_concurrency": cfg.fetch.batch_concurrency,
            "max_body_bytes": cfg.fetch.max_body_bytes,
        },
        "proxy": {
            "http": cfg.proxy.http.is_some(),
            "https": cfg.proxy.https.is_some(),
            "no_proxy": cfg.proxy.no_proxy,
        },
        "cache": {
            "enabled": cfg.cache.enabled,
            "ttl_secs": cfg.cache.ttl.as_secs(),
            "max_size": cfg.cache.max_size,
        },
        "session": {
            "ttl_secs": cfg.session.ttl.as_secs(),
            "sweep_interval_secs": cfg.session.sweep_interval.as_secs(),
        },
    })
}

/// Contents for `uri`, or `None` when it names no resource.
pub(crate) fn read(uri: &str, cfg: &Config) -> Option<ResourceContents> {
    let (mime, text) = match uri {
        CONFIG_URI => (
            JSON_MIME,
            serde_json::to_string_pretty(&config_json(cfg)).unwrap_or_default(),
        ),
        HELP_URI => (MARKDOWN_MIME, USAGE_GUIDE.to_string()),
        _ => return None,
    };
    let mut contents = ResourceContents::text(text, uri);
    if let ResourceContents::TextResourceContents { mime_type, .. } = &mut contents {
        *mime_type = Some(mime.to_string());
    }
    Some(contents)
}
