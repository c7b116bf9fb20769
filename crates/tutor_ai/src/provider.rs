use std::io;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tutor_core::error::{codes, AppError};

/// Error codes reported for one kind of outbound call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallCodes {
    pub failed: &'static str,
    pub timeout: &'static str,
}

/// Blocking HTTP client for an OpenAI-compatible API (OpenRouter by default).
#[derive(Debug, Clone)]
pub struct ProviderClient {
    base_url: String,
    api_key: Option<String>,
    agent: ureq::Agent,
}

impl ProviderClient {
    /// Plain `http` is only accepted for loopback hosts; anything else must use `https`.
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, AppError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        validate_base_url(&base_url)?;
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            base_url,
            api_key,
            agent,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
        codes: CallCodes,
    ) -> Result<T, AppError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut req = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json");
        if let Some(key) = self.api_key.as_deref() {
            req = req.set("Authorization", &format!("Bearer {key}"));
        }

        match req.send_json(body) {
            Ok(r) => r.into_json::<T>().map_err(|e| {
                if is_timeout_io(&e) {
                    AppError::new(codes.timeout, "Timed out reading provider response")
                        .with_details(format!("url={url}; err={e}"))
                        .with_retryable(true)
                } else {
                    AppError::new(codes.failed, "Failed to decode provider response")
                        .with_details(format!("url={url}; err={e}"))
                }
            }),
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(AppError::new(codes.failed, "Provider request failed")
                    .with_details(format!("url={url}; status={status}; body={}", snippet(&body, 300)))
                    .with_retryable(status == 429 || status >= 500))
            }
            Err(ureq::Error::Transport(t)) => {
                if is_timeout_transport(&t) {
                    Err(AppError::new(codes.timeout, "Provider request timed out")
                        .with_details(format!("url={url}; err={t}"))
                        .with_retryable(true))
                } else {
                    Err(AppError::new(codes.failed, "Failed to reach provider")
                        .with_details(format!("url={url}; err={t}"))
                        .with_retryable(true))
                }
            }
        }
    }
}

fn validate_base_url(base_url: &str) -> Result<(), AppError> {
    let reject = |why: &str| {
        AppError::new(codes::AI_REMOTE_NOT_ALLOWED, "Provider base URL is not allowed")
            .with_details(format!("base_url={base_url}; reason={why}"))
    };

    let (secure, rest) = if let Some(r) = base_url.strip_prefix("https://") {
        (true, r)
    } else if let Some(r) = base_url.strip_prefix("http://") {
        (false, r)
    } else {
        return Err(reject("scheme must be https (or http for loopback)"));
    };
    if rest.contains('?') || rest.contains('#') {
        return Err(reject("query and fragment are not allowed"));
    }

    let authority = rest.split('/').next().unwrap_or("");
    if authority.contains('@') {
        return Err(reject("userinfo is not allowed"));
    }
    if authority.contains('[') {
        return Err(reject("IPv6 literals are not supported"));
    }
    let (host, port) = match authority.split_once(':') {
        Some((h, p)) => (h, Some(p)),
        None => (authority, None),
    };
    if host.is_empty() {
        return Err(reject("host is missing"));
    }
    if let Some(p) = port {
        match p.parse::<u16>() {
            Ok(n) if n != 0 => {}
            _ => return Err(reject("port is invalid")),
        }
    }
    if !secure && host != "127.0.0.1" && host != "localhost" {
        return Err(reject("plain http is only allowed for loopback"));
    }
    Ok(())
}

fn is_timeout_io(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

fn is_timeout_transport(t: &ureq::Transport) -> bool {
    let mut src = std::error::Error::source(t);
    while let Some(e) = src {
        if let Some(io) = e.downcast_ref::<io::Error>() {
            if is_timeout_io(io) {
                return true;
            }
        }
        src = e.source();
    }
    t.to_string().to_ascii_lowercase().contains("timed out")
}

pub(crate) fn snippet(text: &str, max_chars: usize) -> String {
    let t = text.trim();
    match t.char_indices().nth(max_chars) {
        None => t.to_string(),
        Some((idx, _)) => format!("{}...", &t[..idx]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> Result<ProviderClient, AppError> {
        ProviderClient::new(url, None, Duration::from_secs(1))
    }

    #[test]
    fn accepts_https_and_loopback_http() {
        assert!(client("https://openrouter.ai/api/v1").is_ok());
        assert!(client("https://openrouter.ai/api/v1/").is_ok());
        assert!(client("http://127.0.0.1:11434").is_ok());
        assert!(client("http://localhost:8080/v1").is_ok());
        assert_eq!(
            client("https://openrouter.ai/api/v1/").expect("ok").base_url(),
            "https://openrouter.ai/api/v1"
        );
    }

    #[test]
    fn rejects_unsafe_base_urls() {
        assert!(client("http://example.com/v1").is_err());
        assert!(client("ftp://example.com").is_err());
        assert!(client("https://").is_err());
        assert!(client("https://user@example.com").is_err());
        assert!(client("https://example.com/v1?x=1").is_err());
        assert!(client("http://127.0.0.1.evil.com:11434").is_err());
        assert!(client("http://127.0.0.1@evil.com:11434").is_err());
        assert!(client("http://127.0.0.1:").is_err());
        assert!(client("http://127.0.0.1:0").is_err());
        assert!(client("http://127.0.0.1:99999").is_err());
        assert!(client("http://[::1]:11434").is_err());

        let err = client("http://example.com").expect_err("plain http");
        assert_eq!(err.code, codes::AI_REMOTE_NOT_ALLOWED);
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        assert_eq!(snippet("héllo wörld", 4), "héll...");
        assert_eq!(snippet("  short ", 10), "short");
    }
}
