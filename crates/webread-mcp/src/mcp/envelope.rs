use serde::Serialize;
use webread_core::ErrorKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    InvalidParams,
    InvalidUrl,
    NotConfigured,
    ContentUnavailable,
    Timeout,
    FetchFailed,
    SearchFailed,
    UnexpectedError,
}

impl ErrorCode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParams => "invalid_params",
            Self::InvalidUrl => "invalid_url",
            Self::NotConfigured => "not_configured",
            Self::ContentUnavailable => "content_unavailable",
            Self::Timeout => "timeout",
            Self::FetchFailed => "fetch_failed",
            Self::SearchFailed => "search_failed",
            Self::UnexpectedError => "unexpected_error",
        }
    }

    pub(crate) fn retryable(self) -> bool {
        match self {
            Self::FetchFailed | Self::Timeout | Self::SearchFailed => true,
            // Configuration, policy and invalid input are not retryable without changing something.
            Self::NotConfigured
            | Self::InvalidParams
            | Self::InvalidUrl
            | Self::ContentUnavailable
            | Self::UnexpectedError => false,
        }
    }

    pub(crate) fn hint(self) -> &'static str {
        match self {
            Self::InvalidParams => {
                "Pass either url or a non-empty urls list; startChar >= 0, maxLength >= 1, timeoutMs >= 1000."
            }
            Self::InvalidUrl => "Pass an absolute http(s) URL like https://example.com/page.",
            Self::NotConfigured => {
                "Set WEBREAD_SEARXNG_URL (or SEARXNG_URL) to a SearXNG instance and restart the server."
            }
            Self::ContentUnavailable => {
                "The site refuses automated reads (robots.txt), is on the video blocklist, or sent an empty page. Choose a different URL."
            }
            Self::Timeout => "The site did not answer in time. Retry with a larger timeoutMs.",
            Self::FetchFailed => {
                "The page could not be fetched. Check the URL, or retry later if the server reported 5xx."
            }
            Self::SearchFailed => "The search backend failed. Retry, or check the SearXNG instance.",
            Self::UnexpectedError => "Internal error. Retry; if it persists, report it with the server logs.",
        }
    }
}

impl From<&webread_core::Error> for ErrorCode {
    fn from(e: &webread_core::Error) -> Self {
        match e.kind() {
            ErrorKind::UrlFormat => Self::InvalidUrl,
            ErrorKind::Timeout => Self::Timeout,
            ErrorKind::Content => Self::ContentUnavailable,
            ErrorKind::Network | ErrorKind::Server | ErrorKind::Conversion => Self::FetchFailed,
            ErrorKind::Search => Self::SearchFailed,
            ErrorKind::NotConfigured => Self::NotConfigured,
            ErrorKind::InvalidParams => Self::InvalidParams,
            ErrorKind::Unexpected => Self::UnexpectedError,
        }
    }
}

pub(crate) fn add_envelope_fields(payload: &mut serde_json::Value, kind: &str, elapsed_ms: u128) {
    payload["schema_version"] = serde_json::json!(super::SCHEMA_VERSION);
    payload["kind"] = serde_json::json!(kind);
    payload["elapsed_ms"] = serde_json::json!(elapsed_ms);
    if payload.get("request").is_none() {
        payload["request"] = serde_json::Value::Null;
    }
}

pub(crate) fn error_obj(
    code: ErrorCode,
    message: impl ToString,
    hint: impl ToString,
) -> serde_json::Value {
    #[derive(Serialize)]
    struct ErrorObject {
        code: &'static str,
        message: String,
        hint: String,
        retryable: bool,
    }

    let e = ErrorObject {
        code: code.as_str(),
        message: message.to_string(),
        hint: hint.to_string(),
        retryable: code.retryable(),
    };
    match serde_json::to_value(e) {
        Ok(v) => v,
        Err(_) => serde_json::json!({
            "code": code.as_str(),
            "message": message.to_string(),
            "hint": hint.to_string(),
            "retryable": code.retryable()
        }),
    }
}
