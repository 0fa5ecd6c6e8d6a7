//! Environment-backed configuration for the two services.
//!
//! Values come from process environment variables; `main` loads a local
//! `.env` file first, so both `.env` entries and exported variables work.

use anyhow::{bail, Context, Result};
use std::env;

/// Jira connection settings. Auth is basic auth with the account email and
/// an API token.
#[derive(Debug, Clone)]
pub struct JiraConfig {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
}

/// TestRail connection settings. Auth is basic auth with the username and
/// an API key.
#[derive(Debug, Clone)]
pub struct TestRailConfig {
    pub base_url: String,
    pub username: String,
    pub api_key: String,
    /// Default project when the CLI does not pass `--project-id`.
    pub project_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jira: JiraConfig,
    pub testrail: TestRailConfig,
}

impl JiraConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: required("JIRA_BASE_URL")?,
            email: required("JIRA_EMAIL")?,
            api_token: required("JIRA_API_TOKEN")?,
        })
    }
}

impl TestRailConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: required("TESTRAIL_BASE_URL")?,
            username: required("TESTRAIL_USERNAME")?,
            api_key: required("TESTRAIL_API_KEY")?,
            project_id: optional_u64("TESTRAIL_PROJECT_ID")?,
        })
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            jira: JiraConfig::from_env()?,
            testrail: TestRailConfig::from_env()?,
        })
    }
}

fn required(name: &str) -> Result<String> {
    let value = env::var(name)
        .with_context(|| format!("{name} is not set; see .env.example for required variables"))?;
    let value = value.trim().to_string();
    if value.is_empty() {
        bail!("{name} is set but empty");
    }
    Ok(value)
}

fn optional_u64(name: &str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(raw) => {
            let parsed = raw
                .trim()
                .parse()
                .with_context(|| format!("{name} must be a numeric id, got {raw:?}"))?;
            Ok(Some(parsed))
        }
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read {name}")),
    }
}
