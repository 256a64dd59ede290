//! Process configuration, read once from the environment.
//!
//! Every knob accepts a `WEBREAD_`-prefixed variable first and falls back to the
//! bare name (`FETCH_TIMEOUT_MS`, `SEARXNG_URL`, ...) so existing deployments keep
//! working.

use std::time::Duration;

use crate::robots::ROBOTS_CACHE_TTL;

pub const DEFAULT_USER_AGENT: &str = "webread/0.1 (+https://github.com/webread/webread)";
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

fn env(key: &str) -> Option<String> {
    std::env::var(format!("WEBREAD_{key}"))
        .ok()
        .or_else(|| std::env::var(key).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match env(key).map(|v| v.to_ascii_lowercase()) {
        Some(v) => matches!(v.as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

fn env_csv(key: &str) -> Vec<String> {
    env(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout_ms: u64,
    pub enable_robots_txt: bool,
    pub block_video_sites: bool,
    pub video_blocklist: Vec<String>,
    /// Upper bound on simultaneous fetches within one batch.
    pub batch_concurrency: usize,
    /// Bodies past this many bytes are cut off.
    pub max_body_bytes: usize,
    pub robots_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
    pub max_size: usize,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub http: Option<String>,
    pub https: Option<String>,
    pub no_proxy: Option<String>,
}

/// HTTP basic auth for a protected SearXNG instance.
#[derive(Clone)]
pub struct SearxngAuth {
    pub username: String,
    pub password: Option<String>,
}

impl std::fmt::Debug for SearxngAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearxngAuth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub searxng_url: Option<String>,
    pub searxng_auth: Option<SearxngAuth>,
    pub user_agent: String,
    pub proxy: ProxyConfig,
    pub fetch: FetchConfig,
    pub cache: CacheConfig,
    pub session: SessionConfig,
}

fn default_video_blocklist() -> Vec<String> {
    [
        "youtube.com",
        "youtu.be",
        "vimeo.com",
        "bilibili.com",
        "dailymotion.com",
        "twitch.tv",
        "tiktok.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    pub fn from_env() -> Self {
        let video_blocklist = match env_csv("VIDEO_BLOCKLIST") {
            v if v.is_empty() => default_video_blocklist(),
            v => v,
        };
        Self {
            searxng_url: env("SEARXNG_URL"),
            searxng_auth: env("AUTH_USERNAME").map(|username| SearxngAuth {
                username,
                password: env("AUTH_PASSWORD"),
            }),
            user_agent: env("USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            proxy: ProxyConfig {
                http: env("HTTP_PROXY"),
                https: env("HTTPS_PROXY"),
                no_proxy: env("NO_PROXY"),
            },
            fetch: FetchConfig {
                timeout_ms: env_parse("FETCH_TIMEOUT_MS", 30_000u64).max(1),
                enable_robots_txt: env_bool("ENABLE_ROBOTS_TXT", false),
                block_video_sites: env_bool("BLOCK_VIDEO_SITES", false),
                video_blocklist,
                batch_concurrency: env_parse("BATCH_CONCURRENCY", 16usize).max(1),
                max_body_bytes: env_parse("MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES).max(1),
                robots_ttl: Duration::from_secs(env_parse(
                    "ROBOTS_TTL_SECS",
                    ROBOTS_CACHE_TTL.as_secs(),
                )),
            },
            cache: CacheConfig {
                enabled: env_bool("CACHE_ENABLED", true),
                ttl: Duration::from_secs(env_parse("CACHE_TTL", 3_600u64)),
                max_size: env_parse("CACHE_MAX_SIZE", 100usize).max(1),
            },
            session: SessionConfig {
                ttl: Duration::from_secs(env_parse("SESSION_TTL_SECS", 3_600u64)),
                sweep_interval: Duration::from_secs(
                    env_parse("SESSION_SWEEP_SECS", 1_800u64).max(1),
                ),
            },
        }
    }

    /// Build the shared HTTP client: user agent, proxies, redirect policy.
    pub fn http_client(&self) -> webread_core::Result<reqwest::Client> {
        let mut b = reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(10));

        let no_proxy = self
            .proxy
            .no_proxy
            .as_deref()
            .and_then(reqwest::NoProxy::from_string);
        if let Some(p) = self.proxy.http.as_deref() {
            let proxy = reqwest::Proxy::http(p)
                .map_err(|e| webread_core::Error::NotConfigured(format!("HTTP_PROXY: {e}")))?
                .no_proxy(no_proxy.clone());
            b = b.proxy(proxy);
        }
        if let Some(p) = self.proxy.https.as_deref() {
            let proxy = reqwest::Proxy::https(p)
                .map_err(|e| webread_core::Error::NotConfigured(format!("HTTPS_PROXY: {e}")))?
                .no_proxy(no_proxy);
            b = b.proxy(proxy);
        }

        b.build()
            .map_err(|e| webread_core::Error::Unexpected(format!("http client: {e}")))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            searxng_url: None,
            searxng_auth: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: ProxyConfig {
                http: None,
                https: None,
                no_proxy: None,
            },
            fetch: FetchConfig {
                timeout_ms: 30_000,
                enable_robots_txt: false,
                block_video_sites: false,
                video_blocklist: default_video_blocklist(),
                batch_concurrency: 16,
                max_body_bytes: DEFAULT_MAX_BODY_BYTES,
                robots_ttl: ROBOTS_CACHE_TTL,
            },
            cache: CacheConfig {
                enabled: true,
                ttl: Duration::from_secs(3_600),
                max_size: 100,
            },
            session: SessionConfig {
                ttl: Duration::from_secs(3_600),
                sweep_interval: Duration::from_secs(1_800),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; serialize tests that mutate them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        k: String,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(k: &str, v: &str) -> Self {
            let prev = std::env::var(k).ok();
            std::env::set_var(k, v);
            Self {
                k: k.to_string(),
                prev,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(v) = self.prev.take() {
                std::env::set_var(&self.k, v);
            } else {
                std::env::remove_var(&self.k);
            }
        }
    }

    #[test]
    fn prefixed_value_wins_over_bare_name() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _a = EnvGuard::set("FETCH_TIMEOUT_MS", "5000");
        let _b = EnvGuard::set("WEBREAD_FETCH_TIMEOUT_MS", "7000");
        assert_eq!(Config::from_env().fetch.timeout_ms, 7000);
    }

    #[test]
    fn blank_and_garbage_values_fall_back_to_defaults() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _a = EnvGuard::set("WEBREAD_CACHE_MAX_SIZE", "lots");
        let _b = EnvGuard::set("WEBREAD_SEARXNG_URL", "   ");
        let _c = EnvGuard::set("WEBREAD_ENABLE_ROBOTS_TXT", "TRUE");
        let cfg = Config::from_env();
        assert_eq!(cfg.cache.max_size, 100);
        assert!(cfg.searxng_url.is_none() || std::env::var("SEARXNG_URL").is_ok());
        assert!(cfg.fetch.enable_robots_txt);
    }

    #[test]
    fn video_blocklist_is_lowercased_csv() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _a = EnvGuard::set("WEBREAD_VIDEO_BLOCKLIST", " Example.COM, ,videos.test ");
        let cfg = Config::from_env();
        assert_eq!(
            cfg.fetch.video_blocklist,
            vec!["example.com".to_string(), "videos.test".to_string()]
        );
    }

    #[test]
    fn searxng_auth_needs_a_username_and_is_redacted() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _a = EnvGuard::set("WEBREAD_AUTH_PASSWORD", "hunter2");
        let _b = EnvGuard::set("WEBREAD_AUTH_USERNAME", "");
        let _c = EnvGuard::set("AUTH_USERNAME", "");
        assert!(Config::from_env().searxng_auth.is_none());

        let _d = EnvGuard::set("WEBREAD_AUTH_USERNAME", "alice");
        let cfg = Config::from_env();
        let auth = cfg.searxng_auth.clone().unwrap();
        assert_eq!(auth.username, "alice");
        assert_eq!(auth.password.as_deref(), Some("hunter2"));
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }

    #[test]
    fn default_config_builds_a_client() {
        assert!(Config::default().http_client().is_ok());
    }
}
