//! Jira ticket source.
//!
//! Fetches one issue over the v3 REST API and flattens its description to
//! plain text. Cloud returns descriptions as an Atlassian Document Format
//! tree; Server and Data Center return a plain string. Both normalize to the
//! same line-oriented text the scenario parser expects.

use serde_json::Value;

use crate::config::JiraConfig;
use crate::error::ApiError;
use crate::http;

/// A fetched ticket with its description already flattened.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub key: String,
    pub summary: String,
    pub description: String,
    /// Browse URL, written into synced cases as provenance.
    pub url: String,
}

/// Read-only ticket access, as the orchestrator sees it.
pub trait TicketSource {
    fn fetch_ticket(&self, key: &str) -> Result<Ticket, ApiError>;
}

pub struct JiraClient {
    agent: ureq::Agent,
    base_url: String,
    auth_header: String,
}

impl JiraClient {
    pub fn new(config: &JiraConfig) -> Self {
        Self {
            agent: http::agent(),
            base_url: http::trim_base_url(&config.base_url),
            auth_header: http::basic_auth(&config.email, &config.api_token),
        }
    }

    fn get(&self, url: &str) -> Result<(u16, String), ApiError> {
        let mut response = self
            .agent
            .get(url)
            .header("Authorization", self.auth_header.as_str())
            .header("Accept", "application/json")
            .call()
            .map_err(|err| ApiError::Network(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| ApiError::Network(err.to_string()))?;
        Ok((status, body))
    }
}

impl TicketSource for JiraClient {
    fn fetch_ticket(&self, key: &str) -> Result<Ticket, ApiError> {
        let url = format!(
            "{}/rest/api/3/issue/{key}?fields=summary,description",
            self.base_url
        );
        let (status, body) = self.get(&url)?;
        if !(200..300).contains(&status) {
            return Err(classify_jira_error(key, status, &body));
        }
        let issue: Value = serde_json::from_str(&body).map_err(|err| {
            ApiError::Unexpected(format!("issue response is not valid JSON: {err}"))
        })?;
        let fields = &issue["fields"];
        let summary = fields["summary"].as_str().unwrap_or_default().to_string();
        let description = flatten_description(&fields["description"]);
        tracing::debug!(key, description_bytes = description.len(), "fetched issue");
        Ok(Ticket {
            key: key.to_string(),
            summary,
            description,
            url: format!("{}/browse/{key}", self.base_url),
        })
    }
}

/// Flatten a description field to plain text: strings pass through, ADF
/// trees are walked in document order. Carriage returns are dropped and
/// blank-line runs are collapsed so downstream parsing sees at most one
/// blank line between blocks.
pub fn flatten_description(value: &Value) -> String {
    let text = match value {
        Value::String(text) => text.clone(),
        Value::Object(_) => {
            let mut out = String::new();
            flatten_adf_node(value, &mut out);
            out
        }
        _ => String::new(),
    };
    collapse_blank_runs(text.replace('\r', "").trim())
}

fn flatten_adf_node(node: &Value, out: &mut String) {
    match node["type"].as_str() {
        Some("text") => {
            if let Some(text) = node["text"].as_str() {
                out.push_str(text);
            }
            return;
        }
        Some("hardBreak") => {
            out.push('\n');
            return;
        }
        _ => {}
    }
    if let Some(children) = node["content"].as_array() {
        for child in children {
            flatten_adf_node(child, out);
        }
    }
    if is_block_node(node) {
        out.push_str("\n\n");
    }
}

fn is_block_node(node: &Value) -> bool {
    matches!(
        node["type"].as_str(),
        Some("paragraph" | "heading" | "codeBlock" | "blockquote" | "listItem")
    )
}

fn collapse_blank_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0usize;
    for ch in text.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(ch);
            }
        } else {
            newlines = 0;
            out.push(ch);
        }
    }
    out
}

/// Classify a Jira error response. Jira reports a missing issue and an
/// issue hidden by permissions with the same 404, so the body wording picks
/// the diagnosis; when the wording covers both, so does the message.
fn classify_jira_error(key: &str, status: u16, body: &str) -> ApiError {
    let lower = body.to_lowercase();
    match status {
        401 => ApiError::Auth(format!(
            "Jira rejected the credentials: {}",
            http::body_snippet(body)
        )),
        403 => ApiError::Auth(format!(
            "Jira denied access to {key}: {}",
            http::body_snippet(body)
        )),
        404 => {
            let mentions_missing =
                lower.contains("does not exist") || lower.contains("not found");
            let mentions_permission = lower.contains("permission");
            if mentions_permission && !mentions_missing {
                ApiError::Auth(format!("the credentials lack permission to view {key}"))
            } else if mentions_permission {
                ApiError::NotFound(format!(
                    "ticket {key} was not found; it may not exist, or the credentials may lack permission to view it"
                ))
            } else {
                ApiError::NotFound(format!("ticket {key} does not exist"))
            }
        }
        _ => ApiError::Unexpected(format!(
            "Jira returned status {status}: {}",
            http::body_snippet(body)
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_adf_paragraphs_and_hard_breaks() {
        let description = json!({
            "type": "doc",
            "version": 1,
            "content": [
                {
                    "type": "paragraph",
                    "content": [
                        { "type": "text", "text": "Scenario 1: Login" },
                        { "type": "hardBreak" },
                        { "type": "text", "text": "When user logs in" }
                    ]
                },
                {
                    "type": "paragraph",
                    "content": [ { "type": "text", "text": "Then ok" } ]
                }
            ]
        });
        assert_eq!(
            flatten_description(&description),
            "Scenario 1: Login\nWhen user logs in\n\nThen ok"
        );
    }

    #[test]
    fn flattens_bullet_lists_one_item_per_block() {
        let description = json!({
            "type": "doc",
            "content": [
                {
                    "type": "bulletList",
                    "content": [
                        {
                            "type": "listItem",
                            "content": [{
                                "type": "paragraph",
                                "content": [{ "type": "text", "text": "When a" }]
                            }]
                        },
                        {
                            "type": "listItem",
                            "content": [{
                                "type": "paragraph",
                                "content": [{ "type": "text", "text": "Then b" }]
                            }]
                        }
                    ]
                }
            ]
        });
        assert_eq!(flatten_description(&description), "When a\n\nThen b");
    }

    #[test]
    fn plain_string_descriptions_pass_through_normalized() {
        let description = json!("Scenario 1: X\r\nWhen a\r\n\r\n\r\n\r\nThen b\r\n");
        assert_eq!(
            flatten_description(&description),
            "Scenario 1: X\nWhen a\n\nThen b"
        );
    }

    #[test]
    fn null_description_is_empty() {
        assert_eq!(flatten_description(&Value::Null), "");
    }

    #[test]
    fn unauthorized_classifies_as_auth() {
        let err = classify_jira_error("PROJ-1", 401, "{\"message\": \"bad token\"}");
        assert!(matches!(err, ApiError::Auth(_)), "{err}");
    }

    #[test]
    fn ambiguous_404_reports_both_hypotheses() {
        let body = "Issue does not exist or you do not have permission to see it.";
        let err = classify_jira_error("PROJ-1", 404, body);
        let message = err.to_string();
        assert!(matches!(err, ApiError::NotFound(_)), "{message}");
        assert!(message.contains("may not exist"), "{message}");
        assert!(message.contains("permission"), "{message}");
    }

    #[test]
    fn permission_only_404_classifies_as_auth() {
        let err = classify_jira_error("PROJ-1", 404, "You do not have permission for this.");
        assert!(matches!(err, ApiError::Auth(_)), "{err}");
    }

    #[test]
    fn plain_404_classifies_as_not_found() {
        let err = classify_jira_error("PROJ-1", 404, "Issue not found");
        let message = err.to_string();
        assert!(matches!(err, ApiError::NotFound(_)), "{message}");
        assert!(message.contains("PROJ-1"), "{message}");
    }
}
