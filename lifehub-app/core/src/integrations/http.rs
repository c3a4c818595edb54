use std::time::Duration;

use tracing::warn;

use crate::error::{LifeHubError, Result};

const USER_AGENT: &str = concat!("lifehub-app/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY: usize = 200;

pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(timeout_secs.min(15)))
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| LifeHubError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Pass 2xx responses through; turn anything else into `Upstream`.
pub async fn check_status(provider: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read response body".to_string());
    warn!("{} answered {}", provider, status);
    Err(upstream_error(provider, status.as_u16(), &body))
}

pub fn upstream_error(provider: &str, status: u16, body: &str) -> LifeHubError {
    LifeHubError::Upstream {
        provider: provider.to_string(),
        status,
        message: truncate(body.trim(), MAX_ERROR_BODY),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_truncates_body() {
        let body = "x".repeat(500);
        match upstream_error("weather", 502, &body) {
            LifeHubError::Upstream {
                provider,
                status,
                message,
            } => {
                assert_eq!(provider, "weather");
                assert_eq!(status, 502);
                assert_eq!(message.len(), MAX_ERROR_BODY + 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("ok", 10), "ok");
    }

    #[test]
    fn test_build_client() {
        assert!(build_client(20).is_ok());
    }
}
