//! URL rewriting before fetch: redirect-wrapper unwrapping and host policy.
//!
//! Search engines often hand out links like `https://s.example/go?url=<target>`;
//! the target is what we want to fetch and cache under.

use tracing::{debug, info};

/// `host == pat` or `host` is a subdomain of `pat` (ASCII case-insensitive).
pub fn host_matches(host: &str, pat: &str) -> bool {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    let pat = pat.trim().trim_start_matches('.').to_ascii_lowercase();
    if pat.is_empty() {
        return false;
    }
    if host == pat {
        return true;
    }
    host.ends_with(&format!(".{pat}"))
}

/// Unwrap a redirect wrapper carrying its target in a `url` query parameter.
///
/// Relative targets resolve against the wrapper's origin. Anything that does not
/// parse is returned unchanged so the caller reports the format error on the
/// original input.
pub fn resolve_redirect_url(url: &str) -> String {
    let Ok(parsed) = url::Url::parse(url) else {
        return url.to_string();
    };
    let Some(target) = parsed
        .query_pairs()
        .find(|(k, _)| k == "url")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
    else {
        return url.to_string();
    };

    let resolved = if target.starts_with("http://") || target.starts_with("https://") {
        target
    } else {
        let origin = parsed.origin().ascii_serialization();
        match url::Url::parse(&origin).and_then(|base| base.join(&target)) {
            Ok(u) => u.to_string(),
            Err(e) => {
                debug!(url, target, error = %e, "cannot resolve relative redirect target");
                return url.to_string();
            }
        }
    };
    info!(from = url, to = %resolved, "resolved redirect url");
    resolved
}

/// True when `url`'s host is on `blocklist` (suffix match).
pub fn is_blocked_video_host(url: &str, blocklist: &[String]) -> bool {
    let Ok(u) = url::Url::parse(url) else {
        return false;
    };
    let Some(host) = u.host_str() else {
        return false;
    };
    blocklist.iter().any(|pat| host_matches(host, pat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwraps_encoded_absolute_target() {
        assert_eq!(
            resolve_redirect_url("https://s.example/go?url=http%3A%2F%2Ftarget.example%2Fpage"),
            "http://target.example/page"
        );
    }

    #[test]
    fn relative_target_resolves_against_wrapper_origin() {
        assert_eq!(
            resolve_redirect_url("https://s.example/link/go?url=%2Farticle%3Fid%3D7&x=1"),
            "https://s.example/article?id=7"
        );
        assert_eq!(
            resolve_redirect_url("https://s.example:8443/go?url=next"),
            "https://s.example:8443/next"
        );
    }

    #[test]
    fn leaves_plain_and_unparseable_urls_alone() {
        assert_eq!(
            resolve_redirect_url("https://plain.example/a?b=c"),
            "https://plain.example/a?b=c"
        );
        assert_eq!(
            resolve_redirect_url("https://s.example/go?url="),
            "https://s.example/go?url="
        );
        assert_eq!(resolve_redirect_url("not a url"), "not a url");
    }

    #[test]
    fn host_matching_is_suffix_on_label_boundary() {
        assert!(host_matches("youtube.com", "youtube.com"));
        assert!(host_matches("WWW.YouTube.com", "youtube.com"));
        assert!(host_matches("m.youtube.com.", ".youtube.com"));
        assert!(!host_matches("notyoutube.com", "youtube.com"));
        assert!(!host_matches("youtube.com", ""));
    }

    #[test]
    fn video_blocklist_checks_url_host() {
        let list = vec!["vimeo.com".to_string(), "youtu.be".to_string()];
        assert!(is_blocked_video_host("https://player.vimeo.com/video/1", &list));
        assert!(is_blocked_video_host("https://youtu.be/abc", &list));
        assert!(!is_blocked_video_host("https://example.com/vimeo.com", &list));
        assert!(!is_blocked_video_host("garbage", &list));
    }
}
