use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use webread_core::{FetchRequest, PaginationOptions, DEFAULT_SESSION_ID};
use webread_local::{Config, ReaderContext, UrlReader};

#[cfg(feature = "stdio")]
mod mcp;

#[derive(Parser, Debug)]
#[command(name = "webread")]
#[command(about = "Web search and page reading (MCP stdio server + CLI)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as an MCP stdio server.
    McpStdio,
    /// Read one or more URLs and print the text.
    Read(ReadCmd),
    /// Search via SearXNG and print the formatted results.
    Search(SearchCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct ReadCmd {
    /// URL(s) to read. More than one runs a batch.
    #[arg(required = true)]
    urls: Vec<String>,
    #[arg(long)]
    start_char: Option<usize>,
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    max_length: Option<u64>,
    /// Only the section under the first heading containing this text.
    #[arg(long)]
    section: Option<String>,
    /// Paragraph range: "3", "3-" or "2-5".
    #[arg(long)]
    paragraph_range: Option<String>,
    /// Print only the heading lines.
    #[arg(long, default_value_t = false)]
    read_headings: bool,
    #[arg(long, value_parser = clap::value_parser!(u64).range(1000..))]
    timeout_ms: Option<u64>,
    #[arg(long, default_value = DEFAULT_SESSION_ID)]
    session: String,
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    query: String,
    /// SearXNG base URL (overrides the environment).
    #[arg(long, env = "WEBREAD_SEARXNG_URL")]
    searxng_url: Option<String>,
    #[arg(long, default_value = DEFAULT_SESSION_ID)]
    session: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json (default) or text.
    #[arg(long, default_value = "json", alias = "format")]
    output: String,
}

/// `KEY=VALUE` lines from `WEBREAD_ENV_FILE`. Never overrides the process environment.
fn load_env_file() {
    let Ok(p) = std::env::var("WEBREAD_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v.trim());
        }
    }
}

fn init_tracing() {
    // stdout belongs to the MCP protocol.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webread=info,webread_local=info".into()),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_reader(cfg: Config) -> Result<UrlReader> {
    let ctx = ReaderContext::from_config(cfg)?;
    Ok(UrlReader::new(ctx))
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    let cli = Cli::parse();

    match cli.command {
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "webread",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("webread {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
        #[cfg(feature = "stdio")]
        Commands::McpStdio => {
            init_tracing();
            let cfg = Config::from_env();
            let sweep_interval = cfg.session.sweep_interval;
            let session_ttl = cfg.session.ttl;
            let reader = build_reader(cfg)?;
            let sweep = Arc::clone(reader.sessions()).spawn_sweep_task(sweep_interval, session_ttl);
            let served = mcp::serve_stdio(reader).await;
            sweep.abort();
            info!("mcp stdio server stopped");
            served.map_err(|e| anyhow::anyhow!(e.to_string()))?;
        }
        #[cfg(not(feature = "stdio"))]
        Commands::McpStdio => {
            anyhow::bail!("mcp-stdio requires feature `stdio` (rebuild with: --features stdio)");
        }
        Commands::Read(args) => {
            init_tracing();
            let reader = build_reader(Config::from_env())?;
            let request = match args.urls.as_slice() {
                [one] => FetchRequest::Single { url: one.clone() },
                _ => FetchRequest::Batch { urls: args.urls },
            };
            let opts = PaginationOptions {
                start_char: args.start_char,
                max_length: args.max_length.map(|n| n as usize),
                section: args.section.filter(|s| !s.trim().is_empty()),
                paragraph_range: args.paragraph_range.filter(|s| !s.trim().is_empty()),
                read_headings: args.read_headings,
            };
            let text = reader
                .read_request(&request, args.timeout_ms, &opts, &args.session)
                .await?;
            println!("{text}");
        }
        Commands::Search(args) => {
            init_tracing();
            let mut cfg = Config::from_env();
            if let Some(u) = args.searxng_url.filter(|u| !u.trim().is_empty()) {
                cfg.searxng_url = Some(u);
            }
            let reader = build_reader(cfg)?;
            let text = reader.search(&args.query, &args.session).await?;
            println!("{text}");
        }
    }

    Ok(())
}
