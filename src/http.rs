//! HTTP plumbing shared by the Jira and TestRail clients.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::time::Duration;
use ureq::Agent;

pub const REQUEST_TIMEOUT_SECS: u64 = 30;

const SNIPPET_MAX_BYTES: usize = 200;

/// Blocking agent used by both clients. Non-2xx statuses come back as
/// ordinary responses so their bodies stay available to the classifiers.
pub fn agent() -> Agent {
    Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .http_status_as_error(false)
        .build()
        .new_agent()
}

/// `Authorization` header value for basic auth with `user:secret`.
pub fn basic_auth(user: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{secret}")))
}

/// Trim trailing slashes from a configured base URL so path joins never
/// produce a double slash.
pub fn trim_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// First non-blank line of a response body, truncated for error messages.
pub fn body_snippet(body: &str) -> String {
    let line = body
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    if line.is_empty() {
        return "(empty body)".to_string();
    }
    truncate_string(line, SNIPPET_MAX_BYTES)
}

fn truncate_string(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut truncated = String::new();
    for ch in text.chars() {
        if truncated.len() + ch.len_utf8() > max_bytes {
            break;
        }
        truncated.push(ch);
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_encodes_credentials() {
        // "user:pass" in base64
        assert_eq!(basic_auth("user", "pass"), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn trim_base_url_strips_trailing_slashes() {
        assert_eq!(
            trim_base_url("https://example.testrail.io//"),
            "https://example.testrail.io"
        );
        assert_eq!(
            trim_base_url("https://example.testrail.io"),
            "https://example.testrail.io"
        );
    }

    #[test]
    fn body_snippet_takes_first_non_blank_line() {
        assert_eq!(body_snippet("\n  \n{\"error\": \"bad\"}\nrest"), "{\"error\": \"bad\"}");
        assert_eq!(body_snippet("   \n\t\n"), "(empty body)");
    }

    #[test]
    fn body_snippet_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        let snippet = body_snippet(&long);
        assert!(snippet.len() <= 200);
        assert!(snippet.chars().all(|c| c == 'é'));
    }
}
