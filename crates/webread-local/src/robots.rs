//! robots.txt gate.
//!
//! Only an explicit Disallow blocks a read. A missing robots.txt, a fetch error
//! or a URL we cannot parse all allow.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use webread_core::{FetchBackend, PageRequest};

pub const ROBOTS_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    allow: bool,
    pattern: String,
}

#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

/// Parsed robots.txt rules.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    groups: Vec<Group>,
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pat, anchored) = match pattern.strip_suffix('$') {
        Some(p) => (p, true),
        None => (pattern, false),
    };
    let parts: Vec<&str> = pat.split('*').collect();
    let first = parts[0];
    if !path.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    let last = parts.len() - 1;
    for (i, part) in parts.iter().enumerate().skip(1) {
        if i == last && anchored {
            return path[pos..].ends_with(part);
        }
        match path[pos..].find(part) {
            Some(off) => pos += off + part.len(),
            None => return false,
        }
    }
    !anchored || pos == path.len()
}

impl RobotsRules {
    pub fn parse(text: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut in_rules = false;

        for raw in text.lines() {
            let line = raw.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            match key.as_str() {
                "user-agent" => {
                    if in_rules || groups.is_empty() {
                        groups.push(Group::default());
                        in_rules = false;
                    }
                    if let Some(g) = groups.last_mut() {
                        g.agents.push(value.to_ascii_lowercase());
                    }
                }
                "allow" | "disallow" => {
                    in_rules = true;
                    // `Disallow:` with no path allows everything; it adds no rule.
                    if value.is_empty() {
                        continue;
                    }
                    if let Some(g) = groups.last_mut() {
                        g.rules.push(Rule {
                            allow: key == "allow",
                            pattern: value.to_string(),
                        });
                    }
                }
                _ => {}
            }
        }
        Self { groups }
    }

    /// Groups naming `agent` specifically, else the `*` group.
    fn rules_for(&self, agent: &str) -> Vec<&Rule> {
        let agent = agent.to_ascii_lowercase();
        let specific: Vec<&Rule> = self
            .groups
            .iter()
            .filter(|g| {
                g.agents
                    .iter()
                    .any(|a| a != "*" && !agent.is_empty() && *a == agent)
            })
            .flat_map(|g| g.rules.iter())
            .collect();
        if !specific.is_empty() {
            return specific;
        }
        self.groups
            .iter()
            .filter(|g| g.agents.iter().any(|a| a == "*"))
            .flat_map(|g| g.rules.iter())
            .collect()
    }

    /// Longest matching pattern wins; an Allow/Disallow tie resolves to disallow.
    pub fn is_allowed(&self, agent: &str, path_and_query: &str) -> bool {
        let mut best: Option<(usize, bool)> = None;
        for r in self.rules_for(agent) {
            if !pattern_matches(&r.pattern, path_and_query) {
                continue;
            }
            let len = r.pattern.len();
            best = match best {
                Some((l, allow)) if l > len || (l == len && !allow) => Some((l, allow)),
                _ => Some((len, r.allow)),
            };
        }
        best.map(|(_, allow)| allow).unwrap_or(true)
    }

    pub fn can_fetch(&self, agent: &str, url: &str) -> bool {
        let Ok(u) = url::Url::parse(url) else {
            return true;
        };
        let mut target = u.path().to_string();
        if let Some(q) = u.query() {
            target.push('?');
            target.push_str(q);
        }
        self.is_allowed(agent, &target)
    }
}

#[derive(Debug, Clone)]
struct RobotsCacheEntry {
    rules: RobotsRules,
    fetched_at: Instant,
}

pub struct RobotsGate {
    enabled: bool,
    timeout_ms: u64,
    ttl: Duration,
    agent: String,
    backend: Arc<dyn FetchBackend>,
    cache: Mutex<HashMap<String, RobotsCacheEntry>>,
}

impl RobotsGate {
    /// `user_agent` is reduced to its product token (`webread/0.1 (...)` -> `webread`).
    /// Fetched rules are reused for `ttl`, normally [`ROBOTS_CACHE_TTL`].
    pub fn new(
        enabled: bool,
        timeout_ms: u64,
        ttl: Duration,
        user_agent: &str,
        backend: Arc<dyn FetchBackend>,
    ) -> Self {
        let agent = user_agent
            .split(['/', ' '])
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        Self {
            enabled,
            timeout_ms,
            ttl,
            agent,
            backend,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, host: &str) -> Option<RobotsRules> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let e = cache.get(host)?;
        (e.fetched_at.elapsed() <= self.ttl).then(|| e.rules.clone())
    }

    async fn fetch_robots_txt(&self, origin: &str) -> Option<String> {
        let robots_url = format!("{origin}/robots.txt");
        match self
            .backend
            .fetch(&PageRequest::new(robots_url.clone(), self.timeout_ms))
            .await
        {
            Ok(resp) if resp.is_success() => {
                debug!(url = %robots_url, "fetched robots.txt");
                Some(resp.body)
            }
            Ok(resp) => {
                debug!(url = %robots_url, status = resp.status, "no robots.txt");
                None
            }
            Err(e) => {
                warn!(url = %robots_url, error = %e, "robots.txt fetch failed; allowing");
                None
            }
        }
    }

    pub async fn is_url_allowed(&self, url: &str) -> bool {
        if !self.enabled {
            return true;
        }
        let parsed = match url::Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                warn!(url, error = %e, "cannot parse url for robots check; allowing");
                return true;
            }
        };
        let Some(host) = parsed.host_str().map(|h| h.to_ascii_lowercase()) else {
            return true;
        };

        let rules = match self.cached(&host) {
            Some(r) => r,
            None => {
                let origin = parsed.origin().ascii_serialization();
                let Some(text) = self.fetch_robots_txt(&origin).await else {
                    return true;
                };
                let rules = RobotsRules::parse(&text);
                self.cache
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(
                        host,
                        RobotsCacheEntry {
                            rules: rules.clone(),
                            fetched_at: Instant::now(),
                        },
                    );
                rules
            }
        };

        let allowed = rules.can_fetch(&self.agent, url);
        if !allowed {
            info!(url, "blocked by robots.txt");
        }
        allowed
    }

    pub fn clear(&self) {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
        info!("robots.txt cache cleared");
    }

    pub fn cached_hosts(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
