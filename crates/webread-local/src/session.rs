//! Per-session bookkeeping: round counters, recent queries and URLs, and the
//! "already looked this up" hints shown to the caller.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{CacheStatus, GlobalCache};

pub const MAX_TRACKED_QUERIES: usize = 20;
pub const MAX_TRACKED_URLS: usize = 50;
const CONTEXT_QUERIES: usize = 5;
const CONTEXT_URLS: usize = 3;
const SIMILARITY_CANDIDATES: usize = 3;
const SIMILARITY_THRESHOLD: f64 = 0.6;
const MAX_QUERY_CHARS: usize = 100;

/// Lowercased, trimmed, capped at 100 chars. Also the search-cache key.
pub fn normalize_query(query: &str) -> String {
    query
        .trim()
        .to_lowercase()
        .chars()
        .take(MAX_QUERY_CHARS)
        .collect()
}

/// Newest-first list. Re-recording an item leaves it where it is.
#[derive(Debug, Clone)]
pub struct RecencyList {
    cap: usize,
    items: VecDeque<String>,
}

impl RecencyList {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            items: VecDeque::new(),
        }
    }

    /// Returns false when the item was already tracked.
    pub fn push_front_if_absent(&mut self, item: String) -> bool {
        if self.items.contains(&item) {
            return false;
        }
        self.items.push_front(item);
        self.items.truncate(self.cap);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    fn summary(&self, n: usize) -> String {
        let mut s = self.iter().take(n).collect::<Vec<_>>().join(", ");
        if self.len() > n {
            s.push_str(&format!(" ({} total)", self.len()));
        }
        s
    }
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub search_round: u64,
    pub url_read_round: u64,
    pub total_searches: u64,
    pub total_urls_read: u64,
    pub searched_queries: RecencyList,
    pub read_urls: RecencyList,
    pub started_at: Instant,
}

impl SessionContext {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            search_round: 0,
            url_read_round: 0,
            total_searches: 0,
            total_urls_read: 0,
            searched_queries: RecencyList::new(MAX_TRACKED_QUERIES),
            read_urls: RecencyList::new(MAX_TRACKED_URLS),
            started_at: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,
    pub searches: u64,
    pub urls: u64,
    pub round: u64,
    pub url_read_round: u64,
    pub uptime_ms: u128,
    pub search_cache: CacheStatus,
    pub url_cache: CacheStatus,
}

/// Word-set Jaccard similarity.
fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let wa: HashSet<&str> = a.split_whitespace().collect();
    let wb: HashSet<&str> = b.split_whitespace().collect();
    let union = wa.union(&wb).count();
    if union == 0 {
        return 0.0;
    }
    wa.intersection(&wb).count() as f64 / union as f64
}

fn overlaps(tracked: &str, needle: &str) -> bool {
    tracked.contains(needle) || needle.contains(tracked)
}

#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: Mutex<HashMap<String, SessionContext>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionContext>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_session<T>(&self, id: &str, f: impl FnOnce(&mut SessionContext) -> T) -> T {
        let mut sessions = self.lock();
        let ctx = sessions
            .entry(id.to_string())
            .or_insert_with(|| SessionContext::new(id));
        f(ctx)
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }

    /// A copy of the session's current state (creating it if needed).
    pub fn snapshot(&self, id: &str) -> SessionContext {
        self.with_session(id, |c| c.clone())
    }

    pub fn increment_search_round(&self, id: &str) {
        self.with_session(id, |c| c.search_round += 1);
    }

    pub fn increment_url_read_round(&self, id: &str) {
        self.with_session(id, |c| c.url_read_round += 1);
    }

    pub fn record_search(&self, id: &str, query: &str) {
        let q = normalize_query(query);
        self.with_session(id, |c| {
            c.total_searches += 1;
            c.searched_queries.push_front_if_absent(q);
        });
    }

    pub fn record_url_read(&self, id: &str, url: &str) {
        self.with_session(id, |c| {
            c.total_urls_read += 1;
            c.read_urls.push_front_if_absent(url.to_string());
        });
    }

    pub fn search_context(&self, id: &str) -> String {
        self.with_session(id, |c| {
            let mut s = format!(
                "[Search progress] round {}, {} searches completed\n",
                c.search_round, c.total_searches
            );
            if !c.searched_queries.is_empty() {
                s.push_str("[Searched] ");
                s.push_str(&c.searched_queries.summary(CONTEXT_QUERIES));
            }
            s
        })
    }

    pub fn url_read_context(&self, id: &str) -> String {
        self.with_session(id, |c| {
            let mut s = format!(
                "[Read progress] round {}, {} pages read\n",
                c.url_read_round, c.total_urls_read
            );
            if !c.read_urls.is_empty() {
                s.push_str("[Read] ");
                s.push_str(&c.read_urls.summary(CONTEXT_URLS));
            }
            s
        })
    }

    pub fn combined_context(&self, id: &str) -> String {
        [self.search_context(id), self.url_read_context(id)]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Short hint: a tracked query or URL overlapping `query`. Empty when none.
    pub fn cache_hint(&self, id: &str, query: &str) -> String {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return String::new();
        }
        self.with_session(id, |c| {
            let mut hints = Vec::new();
            if let Some(q) = c.searched_queries.iter().find(|q| overlaps(q, &needle)) {
                hints.push(format!("Searched a similar query before: \"{q}\""));
            }
            if c.read_urls.iter().any(|u| overlaps(u, &needle)) {
                hints.push("Read a related page before".to_string());
            }
            hints.join("\n")
        })
    }

    /// Like [`cache_hint`](Self::cache_hint) plus what the global cache holds for
    /// the match. Falls back to query similarity when nothing overlaps.
    pub fn detailed_cache_hint(&self, id: &str, query: &str, global: &GlobalCache) -> String {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return String::new();
        }
        let (search_hit, url_hit, similar) = self.with_session(id, |c| {
            let search_hit = c
                .searched_queries
                .iter()
                .find(|q| overlaps(q, &needle))
                .map(str::to_string);
            let url_hit = c
                .read_urls
                .iter()
                .find(|u| overlaps(u, &needle))
                .map(str::to_string);
            let similar = if search_hit.is_none() && url_hit.is_none() {
                c.searched_queries
                    .iter()
                    .take(SIMILARITY_CANDIDATES)
                    .map(|q| (q.to_string(), similarity(&needle, q)))
                    .find(|(_, s)| *s > SIMILARITY_THRESHOLD)
            } else {
                None
            };
            (search_hit, url_hit, similar)
        });

        // Global cache lookups happen outside the session lock.
        let mut hints = Vec::new();
        if let Some(q) = search_hit {
            hints.push(format!("Cached search results: \"{q}\""));
            if let Some(results) = global.search_get(&q) {
                hints.push(format!(
                    "   -> {} results, {} chars",
                    results.split("\n\n").count(),
                    results.chars().count()
                ));
            }
        }
        if let Some(u) = url_hit {
            hints.push("Cached page content".to_string());
            if let Some(content) = global.url_get(&u) {
                hints.push(format!("   -> {} chars", content.chars().count()));
            }
        }
        if let Some((q, s)) = similar {
            hints.push(format!(
                "Related search history: \"{q}\" (similarity {:.0}%)",
                s * 100.0
            ));
        }
        hints.join("\n")
    }

    pub fn stats(&self, id: &str, global: &GlobalCache) -> SessionStats {
        let c = self.snapshot(id);
        SessionStats {
            session_id: c.session_id,
            searches: c.total_searches,
            urls: c.total_urls_read,
            round: c.search_round,
            url_read_round: c.url_read_round,
            uptime_ms: c.started_at.elapsed().as_millis(),
            search_cache: global.search_status(),
            url_cache: global.url_status(),
        }
    }

    /// Drop the session. Global caches are left alone.
    pub fn reset(&self, id: &str) -> bool {
        let removed = self.lock().remove(id).is_some();
        info!(session_id = id, removed, "session reset");
        removed
    }

    /// Remove sessions created more than `max_age` ago. Returns how many went.
    pub fn sweep_older_than(&self, max_age: Duration) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, c| c.started_at.elapsed() <= max_age);
        before - sessions.len()
    }

    /// Periodic sweep. Abort the handle to stop it.
    pub fn spawn_sweep_task(
        self: Arc<Self>,
        interval: Duration,
        max_age: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(?interval, ?max_age, "session sweep task started");
            loop {
                tokio::time::sleep(interval).await;
                let removed = self.sweep_older_than(max_age);
                if removed > 0 {
                    info!(removed, "swept expired sessions");
                } else {
                    debug!("session sweep: nothing to remove");
                }
            }
        })
    }
}
