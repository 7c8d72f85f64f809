use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ClientError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DETAIL_MAX_CHARS: usize = 512;

/// `timeout` bounds whole requests; streaming clients pass `None` and only
/// get the connect timeout.
pub(crate) fn build_client(timeout: Option<Duration>) -> Result<reqwest::Client, ClientError> {
    let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(ClientError::Build)
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Send and require a 2xx. Error bodies are mined for `detail`, `error` or
/// `message`; `fallback` is used when none is present.
pub(crate) async fn send_checked(
    req: RequestBuilder,
    url: &str,
    fallback: &str,
) -> Result<Response, ClientError> {
    let resp = req.send().await.map_err(|source| ClientError::Http {
        url: url.to_string(),
        source,
    })?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let detail = error_detail(&body).unwrap_or_else(|| fallback.to_string());
    tracing::debug!(url, status = status.as_u16(), %detail, "request rejected");
    Err(ClientError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        detail,
    })
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    resp: Response,
    url: &str,
) -> Result<T, ClientError> {
    let bytes = resp.bytes().await.map_err(|source| ClientError::Http {
        url: url.to_string(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    query: &[(&'static str, String)],
    fallback: &str,
) -> Result<T, ClientError> {
    let mut req = client.get(url);
    if !query.is_empty() {
        req = req.query(query);
    }
    let resp = send_checked(req, url, fallback).await?;
    read_json(resp, url).await
}

pub(crate) fn error_detail(body: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "error", "message"] {
            match value.get(key) {
                Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.clone()),
                Some(Value::Null) | None => {}
                Some(Value::String(_)) => {}
                Some(other) => return Some(other.to_string()),
            }
        }
        return None;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(DETAIL_MAX_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_prefers_structured_fields() {
        assert_eq!(
            error_detail(r#"{"detail":"bad query"}"#).as_deref(),
            Some("bad query")
        );
        assert_eq!(
            error_detail(r#"{"success":false,"error":"no cluster"}"#).as_deref(),
            Some("no cluster")
        );
        assert_eq!(
            error_detail(r#"{"detail":[{"loc":["body"]}]}"#).as_deref(),
            Some(r#"[{"loc":["body"]}]"#)
        );
        assert_eq!(error_detail(r#"{"ok":false}"#), None);
    }

    #[test]
    fn detail_falls_back_to_text() {
        assert_eq!(error_detail("upstream down\n").as_deref(), Some("upstream down"));
        assert_eq!(error_detail("   "), None);
        assert_eq!(error_detail(&"x".repeat(2000)).map(|s| s.len()), Some(DETAIL_MAX_CHARS));
    }

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("http://h:1/", "/health"), "http://h:1/health");
        assert_eq!(join_url("http://h:1", "query/stream"), "http://h:1/query/stream");
    }
}
