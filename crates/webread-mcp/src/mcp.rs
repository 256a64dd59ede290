//! MCP stdio server: `read`, `search`, `session_stats`, `session_reset`.

use rmcp::{
    handler::server::router::tool::ToolRouter as RmcpToolRouter,
    handler::server::wrapper::Parameters,
    model::{
        CallToolResult, Content, ListResourcesResult, PaginatedRequestParam,
        ReadResourceRequestParam, ReadResourceResult, ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, RoleServer, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;
use webread_core::{FetchRequest, PaginationOptions, DEFAULT_SESSION_ID};
use webread_local::UrlReader;

mod envelope;
mod resources;
use envelope::*;

const SCHEMA_VERSION: u64 = 1;
const MIN_TIMEOUT_MS: f64 = 1_000.0;

#[derive(Debug, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReadArgs {
    /// URL to read. Ignored when `urls` is non-empty.
    #[serde(default)]
    url: Option<String>,
    /// Several URLs to read concurrently; one report comes back.
    #[serde(default)]
    urls: Option<Vec<String>>,
    /// Character offset to start from (>= 0).
    #[serde(default)]
    start_char: Option<f64>,
    /// Maximum characters to return (>= 1).
    #[serde(default)]
    max_length: Option<f64>,
    /// Only the section under the first heading containing this text.
    #[serde(default)]
    section: Option<String>,
    /// Paragraphs to keep: "3", "3-" or "2-5" (1-based).
    #[serde(default)]
    paragraph_range: Option<String>,
    /// Return only the heading lines.
    #[serde(default)]
    read_headings: Option<bool>,
    /// Per-request timeout in milliseconds (>= 1000).
    #[serde(default)]
    timeout_ms: Option<f64>,
}

#[derive(Debug, Deserialize, JsonSchema, Default)]
pub(crate) struct SearchArgs {
    /// Search query.
    #[serde(default)]
    query: Option<String>,
}

#[derive(Debug)]
pub(crate) struct ReadPlan {
    request: FetchRequest,
    opts: PaginationOptions,
    timeout_ms: Option<u64>,
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn invalid(msg: &str) -> webread_core::Error {
    webread_core::Error::InvalidParams(msg.to_string())
}

/// Any JSON number is accepted; fractions are truncated after the range check.
fn number_at_least(
    v: Option<f64>,
    min: f64,
    msg: &str,
) -> Result<Option<f64>, webread_core::Error> {
    match v {
        Some(n) if !n.is_finite() || n < min => Err(invalid(msg)),
        n => Ok(n.map(f64::trunc)),
    }
}

pub(crate) fn plan_read(args: ReadArgs) -> Result<ReadPlan, webread_core::Error> {
    let start_char =
        number_at_least(args.start_char, 0.0, "startChar must be >= 0")?.map(|n| n as usize);
    let max_length =
        number_at_least(args.max_length, 1.0, "maxLength must be >= 1")?.map(|n| n as usize);
    let timeout_ms =
        number_at_least(args.timeout_ms, MIN_TIMEOUT_MS, "timeoutMs must be >= 1000")?
            .map(|n| n as u64);
    let request = FetchRequest::from_parts(args.url, args.urls)?;
    Ok(ReadPlan {
        request,
        opts: PaginationOptions {
            start_char,
            max_length,
            section: non_blank(args.section),
            paragraph_range: non_blank(args.paragraph_range),
            read_headings: args.read_headings.unwrap_or(false),
        },
        timeout_ms,
    })
}

pub(crate) fn session_id_from_meta(meta: &serde_json::Map<String, serde_json::Value>) -> String {
    meta.get("sessionId")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SESSION_ID)
        .to_string()
}

fn session_id(ctx: &RequestContext<RoleServer>) -> String {
    session_id_from_meta(&ctx.meta)
}

fn text_result(
    kind: &str,
    text: String,
    mut payload: serde_json::Value,
    t0: std::time::Instant,
) -> CallToolResult {
    payload["ok"] = serde_json::json!(true);
    add_envelope_fields(&mut payload, kind, t0.elapsed().as_millis());
    let mut r = CallToolResult::success(vec![Content::text(text)]);
    r.structured_content = Some(payload);
    r
}

fn error_result(
    kind: &str,
    err: &webread_core::Error,
    mut payload: serde_json::Value,
    t0: std::time::Instant,
) -> CallToolResult {
    let code = ErrorCode::from(err);
    payload["ok"] = serde_json::json!(false);
    payload["error"] = error_obj(code, err, code.hint());
    add_envelope_fields(&mut payload, kind, t0.elapsed().as_millis());
    let mut r = CallToolResult::error(vec![Content::text(format!(
        "Error: {err}\nHint: {}",
        code.hint()
    ))]);
    r.structured_content = Some(payload);
    r
}

#[derive(Clone)]
pub(crate) struct WebreadMcp {
    tool_router: RmcpToolRouter<Self>,
    reader: UrlReader,
}

#[tool_router]
impl WebreadMcp {
    pub(crate) fn new(reader: UrlReader) -> Self {
        Self {
            tool_router: Self::tool_router(),
            reader,
        }
    }

    #[tool(
        description = "Read one URL (or many via urls[]) and return the main content as markdown-style text. Supports headings-only, section, paragraph range and character window."
    )]
    async fn read(
        &self,
        params: Parameters<Option<ReadArgs>>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let t0 = std::time::Instant::now();
        let sid = session_id(&ctx);
        let args = params.0.unwrap_or_default();
        let plan = match plan_read(args) {
            Ok(p) => p,
            Err(e) => {
                let payload = serde_json::json!({ "session_id": sid });
                return Ok(error_result("read", &e, payload, t0));
            }
        };
        let request = serde_json::json!({
            "request": plan.request,
            "pagination": plan.opts,
            "timeout_ms": plan.timeout_ms,
        });
        let payload = serde_json::json!({ "session_id": sid, "request": request });
        match self
            .reader
            .read_request(&plan.request, plan.timeout_ms, &plan.opts, &sid)
            .await
        {
            Ok(text) => Ok(text_result("read", text, payload, t0)),
            Err(e) => Ok(error_result("read", &e, payload, t0)),
        }
    }

    #[tool(description = "Search the web via the configured SearXNG instance")]
    async fn search(
        &self,
        params: Parameters<Option<SearchArgs>>,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let t0 = std::time::Instant::now();
        let sid = session_id(&ctx);
        let query = params.0.unwrap_or_default().query.unwrap_or_default();
        let payload = serde_json::json!({ "session_id": sid, "request": { "query": query } });
        match self.reader.search(&query, &sid).await {
            Ok(text) => Ok(text_result("search", text, payload, t0)),
            Err(e) => Ok(error_result("search", &e, payload, t0)),
        }
    }

    #[tool(description = "Report this session's search/read counters and cache sizes")]
    async fn session_stats(
        &self,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let t0 = std::time::Instant::now();
        let sid = session_id(&ctx);
        let stats = self.reader.stats(&sid);
        let content_cache = self.reader.content_cache_status();
        let payload = serde_json::json!({
            "session_id": sid,
            "stats": stats,
            "content_cache": content_cache,
        });
        let text = format!(
            "{}\n\n{}",
            self.reader.combined_context(&sid),
            serde_json::to_string_pretty(&payload["stats"]).unwrap_or_default()
        );
        Ok(text_result("session_stats", text, payload, t0))
    }

    #[tool(description = "Forget this session's history (caches are kept)")]
    async fn session_reset(
        &self,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let t0 = std::time::Instant::now();
        let sid = session_id(&ctx);
        let existed = self.reader.reset_session(&sid);
        let payload = serde_json::json!({ "session_id": sid, "existed": existed });
        Ok(text_result(
            "session_reset",
            format!("Session \"{sid}\" reset."),
            payload,
            t0,
        ))
    }
}

#[tool_handler]
impl rmcp::ServerHandler for WebreadMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Web search and page reading. Use search to find pages, then read with section/paragraphRange/startChar to page through long content."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            ..Default::default()
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult::with_all_items(resources::list()))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let config = &self.reader.context().config;
        match resources::read(&request.uri, config) {
            Some(contents) => Ok(ReadResourceResult {
                contents: vec![contents],
            }),
            None => Err(McpError::resource_not_found(
                format!("unknown resource: {}", request.uri),
                None,
            )),
        }
    }
}

pub(crate) async fn serve_stdio(reader: UrlReader) -> Result<(), McpError> {
    let svc = WebreadMcp::new(reader);
    info!("mcp stdio server starting");
    let running = svc
        .serve(stdio())
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    // Keep the stdio server alive until the client closes.
    running
        .waiting()
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use webread_core::ErrorKind;

    fn args(v: serde_json::Value) -> ReadArgs {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn read_args_use_camel_case_and_blank_strings_are_unset() {
        let plan = plan_read(args(serde_json::json!({
            "url": "https://example.com/",
            "startChar": 5,
            "maxLength": 100,
            "section": "   ",
            "paragraphRange": "",
            "readHeadings": true,
            "timeoutMs": 1000
        })))
        .unwrap();
        assert_eq!(
            plan.request,
            FetchRequest::Single {
                url: "https://example.com/".to_string()
            }
        );
        assert_eq!(plan.opts.start_char, Some(5));
        assert_eq!(plan.opts.max_length, Some(100));
        assert_eq!(plan.opts.section, None);
        assert_eq!(plan.opts.paragraph_range, None);
        assert!(plan.opts.read_headings);
        assert_eq!(plan.timeout_ms, Some(1000));
    }

    #[test]
    fn read_args_reject_out_of_range_numbers() {
        for bad in [
            serde_json::json!({"url": "https://x/", "startChar": -1}),
            serde_json::json!({"url": "https://x/", "maxLength": 0}),
            serde_json::json!({"url": "https://x/", "timeoutMs": 999}),
            serde_json::json!({}),
            serde_json::json!({"urls": []}),
        ] {
            let e = plan_read(args(bad.clone())).unwrap_err();
            assert_eq!(e.kind(), ErrorKind::InvalidParams, "{bad}");
        }
    }

    #[test]
    fn read_args_accept_any_json_number() {
        let plan = plan_read(args(serde_json::json!({
            "url": "https://x/",
            "startChar": 5.0,
            "maxLength": 10.7,
            "timeoutMs": 1500.5
        })))
        .unwrap();
        assert_eq!(plan.opts.start_char, Some(5));
        assert_eq!(plan.opts.max_length, Some(10));
        assert_eq!(plan.timeout_ms, Some(1500));

        let e = plan_read(args(serde_json::json!({"url": "https://x/", "maxLength": 0.5})))
            .unwrap_err();
        assert_eq!(e.kind(), ErrorKind::InvalidParams);
    }

    #[test]
    fn non_empty_urls_make_a_batch() {
        let plan = plan_read(args(serde_json::json!({
            "url": "https://ignored/",
            "urls": ["https://a/", "https://b/"]
        })))
        .unwrap();
        assert!(matches!(plan.request, FetchRequest::Batch { ref urls } if urls.len() == 2));
    }

    #[test]
    fn session_id_defaults_when_missing_or_blank() {
        let mut meta = serde_json::Map::new();
        assert_eq!(session_id_from_meta(&meta), DEFAULT_SESSION_ID);
        meta.insert("sessionId".to_string(), serde_json::json!("  "));
        assert_eq!(session_id_from_meta(&meta), DEFAULT_SESSION_ID);
        meta.insert("sessionId".to_string(), serde_json::json!("agent-7"));
        assert_eq!(session_id_from_meta(&meta), "agent-7");
    }

    #[test]
    fn error_kinds_map_to_stable_codes() {
        let e = webread_core::Error::Timeout {
            url: "https://x/".to_string(),
            timeout_ms: 1000,
        };
        let code = ErrorCode::from(&e);
        assert_eq!(code.as_str(), "timeout");
        assert!(code.retryable());

        let e = webread_core::Error::InvalidUrl("nope".to_string());
        assert_eq!(ErrorCode::from(&e), ErrorCode::InvalidUrl);
        assert!(!ErrorCode::InvalidUrl.retryable());
    }

    #[test]
    fn error_result_carries_envelope_and_hint() {
        let t0 = std::time::Instant::now();
        let e = webread_core::Error::NotConfigured("no search backend".to_string());
        let r = error_result("search", &e, serde_json::json!({"session_id": "s"}), t0);
        assert_eq!(r.is_error, Some(true));
        let v = r.structured_content.unwrap();
        assert_eq!(v["ok"], serde_json::json!(false));
        assert_eq!(v["kind"], serde_json::json!("search"));
        assert_eq!(v["schema_version"], serde_json::json!(SCHEMA_VERSION));
        assert_eq!(v["error"]["code"], serde_json::json!("not_configured"));
        assert!(v["request"].is_null());
        let text = r.content[0].as_text().map(|t| t.text.clone()).unwrap();
        assert!(text.starts_with("Error: not configured: no search backend\nHint: Set WEBREAD_SEARXNG_URL"));
    }
}
