use std::collections::BTreeSet;

#[test]
fn webread_stdio_lists_tools_and_reads() {
    // Spawns the binary as a child process; skipped by default.
    if std::env::var("WEBREAD_E2E").ok().as_deref() != Some("1") {
        eprintln!("skipping: set WEBREAD_E2E=1 to run this test");
        return;
    }

    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    rt.block_on(async {
        use axum::{routing::get, Router};
        use rmcp::{
            model::CallToolRequestParam,
            service::ServiceExt,
            transport::{ConfigureCommandExt, TokioChildProcess},
        };
        use std::net::SocketAddr;

        let app = Router::new().route(
            "/",
            get(|| async {
                (
                    [("content-type", "text/html")],
                    "<html><body><article><h1>Hello</h1><p>world of pages</p>\
                     <h2>More</h2><p>second part</p></article></body></html>",
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("axum serve");
        });

        let bin = assert_cmd::cargo::cargo_bin!("webread");
        let service = ()
            .serve(TokioChildProcess::new(
                tokio::process::Command::new(bin).configure(|cmd| {
                    cmd.args(["mcp-stdio"]);
                    cmd.env_remove("WEBREAD_SEARXNG_URL");
                    cmd.env_remove("SEARXNG_URL");
                    cmd.env("RUST_LOG", "off");
                }),
            )?)
            .await?;

        let tools = service.list_tools(Default::default()).await?;
        let names: BTreeSet<String> = tools
            .tools
            .iter()
            .map(|t| t.name.clone().into_owned())
            .collect();
        for must_have in ["read", "search", "session_stats", "session_reset"] {
            assert!(names.contains(must_have), "missing tool {must_have}");
        }

        let call = |name: &'static str, args: serde_json::Value| CallToolRequestParam {
            name: name.into(),
            arguments: args.as_object().cloned(),
        };

        let resp = service
            .call_tool(call(
                "read",
                serde_json::json!({ "url": format!("http://{addr}/"), "section": "More" }),
            ))
            .await?;
        assert_ne!(resp.is_error, Some(true));
        let text = resp
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .unwrap_or_default();
        assert!(text.contains("[new page]"), "{text}");
        assert!(text.contains("second part"), "{text}");
        assert!(!text.contains("world of pages"), "{text}");
        let v = resp.structured_content.clone().unwrap_or_default();
        assert_eq!(v["ok"].as_bool(), Some(true));
        assert_eq!(v["kind"].as_str(), Some("read"));

        // Second read of the same URL is served from the cache.
        let resp = service
            .call_tool(call("read", serde_json::json!({ "url": format!("http://{addr}/") })))
            .await?;
        let text = resp
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .unwrap_or_default();
        assert!(text.contains("[cache hit]"), "{text}");

        let resp = service
            .call_tool(call("read", serde_json::json!({ "startChar": -1, "url": "http://x/" })))
            .await?;
        assert_eq!(resp.is_error, Some(true));
        let v = resp.structured_content.clone().unwrap_or_default();
        assert_eq!(v["error"]["code"].as_str(), Some("invalid_params"));

        let resp = service
            .call_tool(call("search", serde_json::json!({ "query": "rust" })))
            .await?;
        assert_eq!(resp.is_error, Some(true));
        let v = resp.structured_content.clone().unwrap_or_default();
        assert_eq!(v["error"]["code"].as_str(), Some("not_configured"));

        let resp = service
            .call_tool(call("session_stats", serde_json::json!({})))
            .await?;
        let v = resp.structured_content.clone().unwrap_or_default();
        assert_eq!(v["stats"]["urls"].as_u64(), Some(2));
        assert_eq!(v["session_id"].as_str(), Some("default"));

        let resp = service
            .call_tool(call("session_reset", serde_json::json!({})))
            .await?;
        let v = resp.structured_content.clone().unwrap_or_default();
        assert_eq!(v["existed"].as_bool(), Some(true));

        let resources = service.list_resources(Default::default()).await?;
        let uris: Vec<&str> = resources.resources.iter().map(|r| r.uri.as_str()).collect();
        assert_eq!(uris, vec!["config://server-config", "help://usage-guide"]);
        let guide = service
            .read_resource(rmcp::model::ReadResourceRequestParam {
                uri: "help://usage-guide".to_string(),
            })
            .await?;
        assert_eq!(guide.contents.len(), 1);

        service.cancel().await?;
        Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
    })
    .expect("e2e run");
}
