//! Error taxonomies shared across the crate.
//!
//! `ApiError` classifies collaborator failures by what the operator should do
//! about them (fix credentials, fix the ticket key, fix the payload, retry).
//! `AddressingError` rejects bad container addressing before any case is
//! touched.

use thiserror::Error;

/// A failure reported by Jira or TestRail, classified for the operator.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Credentials were rejected or lack permission for the request.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The addressed entity does not exist (or is invisible to us).
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is not allowed on this installation.
    #[error("operation forbidden: {message}")]
    Forbidden {
        message: String,
        /// Set when the response wording blames single suite mode, where
        /// suites cannot be created or deleted.
        single_suite_mode: bool,
    },

    /// The server rejected the request payload.
    #[error("payload rejected: {0}")]
    Validation(String),

    /// Transport-level failure: DNS, TLS, timeout, connection reset.
    #[error("network error: {0}")]
    Network(String),

    /// Anything the classifier could not place.
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

impl ApiError {
    /// True when the failure is the single-suite-mode refusal, which callers
    /// surface with dedicated wording instead of a generic forbidden error.
    pub fn is_single_suite_mode(&self) -> bool {
        matches!(
            self,
            ApiError::Forbidden {
                single_suite_mode: true,
                ..
            }
        )
    }
}

/// Bad or unresolvable container addressing. Raised before any case work so
/// a typo never turns into a mass delete in the wrong section.
#[derive(Debug, Error)]
pub enum AddressingError {
    #[error("no sync target selected; pass --suite-id, --suite-name, or --section-id")]
    MissingSelector,

    #[error("--suite-id, --suite-name, and --section-id select the same thing; pass exactly one")]
    ConflictingSelectors,

    #[error(
        "suite {name:?} not found in project {project_id}; available suites: {}",
        name_list(.available)
    )]
    SuiteNotFound {
        name: String,
        project_id: u64,
        available: Vec<String>,
    },

    #[error(
        "section {segment:?} not found under {}; sections available there: {}",
        walked_display(.walked),
        name_list(.available)
    )]
    SegmentNotFound {
        segment: String,
        /// Path segments matched before the miss, joined with `/`. Empty
        /// when the first segment already failed.
        walked: String,
        available: Vec<String>,
    },

    #[error("suite {suite} has no sections; pass --section-path (with --create-missing) to add one")]
    NoSections { suite: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

fn name_list(names: &[String]) -> String {
    if names.is_empty() {
        return "(none)".to_string();
    }
    names
        .iter()
        .map(|name| format!("{name:?}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn walked_display(walked: &str) -> String {
    if walked.is_empty() {
        "the suite root".to_string()
    } else {
        format!("{walked:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suite_not_found_enumerates_available_names() {
        let err = AddressingError::SuiteNotFound {
            name: "Regression".to_string(),
            project_id: 4,
            available: vec!["Master".to_string(), "Smoke".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("\"Regression\""), "{message}");
        assert!(message.contains("project 4"), "{message}");
        assert!(message.contains("\"Master\""), "{message}");
        assert!(message.contains("\"Smoke\""), "{message}");
    }

    #[test]
    fn segment_not_found_names_walked_prefix() {
        let err = AddressingError::SegmentNotFound {
            segment: "Login".to_string(),
            walked: "Auth".to_string(),
            available: vec![],
        };
        let message = err.to_string();
        assert!(message.contains("\"Login\""), "{message}");
        assert!(message.contains("\"Auth\""), "{message}");
        assert!(message.contains("(none)"), "{message}");
    }

    #[test]
    fn first_segment_miss_points_at_suite_root() {
        let err = AddressingError::SegmentNotFound {
            segment: "Auth".to_string(),
            walked: String::new(),
            available: vec!["Payments".to_string()],
        };
        assert!(err.to_string().contains("the suite root"), "{err}");
    }

    #[test]
    fn single_suite_mode_predicate() {
        let forbidden = ApiError::Forbidden {
            message: "not allowed in single suite mode".to_string(),
            single_suite_mode: true,
        };
        assert!(forbidden.is_single_suite_mode());
        assert!(!ApiError::Auth("denied".to_string()).is_single_suite_mode());
    }
}
