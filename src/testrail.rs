//! TestRail store client.
//!
//! Wraps the v2 REST API (`index.php?/api/v2/...`). Listing endpoints are
//! shape-tolerant: TestRail 6.7 moved them from bare arrays to paginated
//! envelopes keyed by collection name, and both shapes are still in the
//! wild. Case writes negotiate the instance's step field layout once per
//! process and cache the answer.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::cell::OnceCell;

use crate::config::TestRailConfig;
use crate::error::ApiError;
use crate::http;
use crate::reconcile::CasePayload;

#[derive(Debug, Clone, Deserialize)]
pub struct Suite {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Section {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub suite_id: Option<u64>,
    #[serde(default)]
    pub parent_id: Option<u64>,
}

/// The slice of a stored case the sync run needs: identity, matching title,
/// and the ownership back-reference.
#[derive(Debug, Clone, Deserialize)]
pub struct TestCase {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub section_id: Option<u64>,
    #[serde(default)]
    pub refs: Option<String>,
}

/// Store access as the resolver and orchestrator see it.
pub trait CaseStore {
    fn list_suites(&self, project_id: u64) -> Result<Vec<Suite>, ApiError>;
    fn create_suite(&self, project_id: u64, name: &str) -> Result<Suite, ApiError>;
    fn delete_suite(&self, suite_id: u64) -> Result<(), ApiError>;
    fn list_sections(&self, project_id: u64, suite_id: u64) -> Result<Vec<Section>, ApiError>;
    fn get_section(&self, section_id: u64) -> Result<Section, ApiError>;
    fn create_section(
        &self,
        project_id: u64,
        suite_id: u64,
        name: &str,
        parent_id: Option<u64>,
    ) -> Result<Section, ApiError>;
    fn list_cases(
        &self,
        project_id: u64,
        suite_id: Option<u64>,
        section_id: u64,
    ) -> Result<Vec<TestCase>, ApiError>;
    fn create_case(&self, section_id: u64, payload: &CasePayload) -> Result<TestCase, ApiError>;
    fn update_case(&self, case_id: u64, payload: &CasePayload) -> Result<TestCase, ApiError>;
    fn delete_case(&self, case_id: u64) -> Result<(), ApiError>;
}

/// Which step fields this TestRail instance accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepMode {
    /// `custom_steps_separated`: a list of step/expected pairs.
    Separated,
    /// `custom_steps` and `custom_expected`: two text fields.
    Plain,
}

pub struct TestRailClient {
    agent: ureq::Agent,
    base_url: String,
    auth_header: String,
    step_mode: OnceCell<StepMode>,
}

impl TestRailClient {
    pub fn new(config: &TestRailConfig) -> Self {
        Self {
            agent: http::agent(),
            base_url: http::trim_base_url(&config.base_url),
            auth_header: http::basic_auth(&config.username, &config.api_key),
            step_mode: OnceCell::new(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/index.php?/api/v2/{path}", self.base_url)
    }

    fn get(&self, path: &str) -> Result<Value, ApiError> {
        let response = self
            .agent
            .get(self.api_url(path))
            .header("Authorization", self.auth_header.as_str())
            .header("Accept", "application/json")
            .call()
            .map_err(|err| ApiError::Network(err.to_string()))?;
        decode(response)
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        let response = self
            .agent
            .post(self.api_url(path))
            .header("Authorization", self.auth_header.as_str())
            .send_json(body)
            .map_err(|err| ApiError::Network(err.to_string()))?;
        decode(response)
    }

    /// Probe `get_case_fields` once to learn whether the instance carries
    /// the separated-steps field. Probe failure falls back to the plain
    /// two-field layout, which every instance accepts.
    fn step_mode(&self) -> StepMode {
        *self.step_mode.get_or_init(|| {
            let mode = match self.detect_step_mode() {
                Ok(mode) => mode,
                Err(err) => {
                    tracing::debug!(error = %err, "case field probe failed; assuming plain steps");
                    StepMode::Plain
                }
            };
            tracing::debug!(?mode, "negotiated step field layout");
            mode
        })
    }

    fn detect_step_mode(&self) -> Result<StepMode, ApiError> {
        let fields = self.get("get_case_fields")?;
        let separated = fields.as_array().is_some_and(|fields| {
            fields.iter().any(|field| {
                field["system_name"].as_str() == Some("custom_steps_separated")
                    || field["type_id"].as_u64() == Some(STEPS_FIELD_TYPE_ID)
            })
        });
        Ok(if separated {
            StepMode::Separated
        } else {
            StepMode::Plain
        })
    }
}

/// TestRail's field type id for the structured "Steps" field.
const STEPS_FIELD_TYPE_ID: u64 = 10;

impl CaseStore for TestRailClient {
    fn list_suites(&self, project_id: u64) -> Result<Vec<Suite>, ApiError> {
        let value = self.get(&format!("get_suites/{project_id}"))?;
        parse_listing(value, "suites")
    }

    fn create_suite(&self, project_id: u64, name: &str) -> Result<Suite, ApiError> {
        let value = self.post(&format!("add_suite/{project_id}"), &json!({ "name": name }))?;
        parse_entity(value, "suite")
    }

    fn delete_suite(&self, suite_id: u64) -> Result<(), ApiError> {
        self.post(&format!("delete_suite/{suite_id}"), &json!({}))?;
        Ok(())
    }

    fn list_sections(&self, project_id: u64, suite_id: u64) -> Result<Vec<Section>, ApiError> {
        let value = self.get(&format!("get_sections/{project_id}&suite_id={suite_id}"))?;
        parse_listing(value, "sections")
    }

    fn get_section(&self, section_id: u64) -> Result<Section, ApiError> {
        let value = self.get(&format!("get_section/{section_id}"))?;
        parse_entity(value, "section")
    }

    fn create_section(
        &self,
        project_id: u64,
        suite_id: u64,
        name: &str,
        parent_id: Option<u64>,
    ) -> Result<Section, ApiError> {
        let mut body = json!({ "name": name, "suite_id": suite_id });
        if let Some(parent_id) = parent_id {
            body["parent_id"] = json!(parent_id);
        }
        let value = self.post(&format!("add_section/{project_id}"), &body)?;
        parse_entity(value, "section")
    }

    fn list_cases(
        &self,
        project_id: u64,
        suite_id: Option<u64>,
        section_id: u64,
    ) -> Result<Vec<TestCase>, ApiError> {
        let mut path = format!("get_cases/{project_id}&section_id={section_id}");
        if let Some(suite_id) = suite_id {
            path.push_str(&format!("&suite_id={suite_id}"));
        }
        let value = self.get(&path)?;
        parse_listing(value, "cases")
    }

    fn create_case(&self, section_id: u64, payload: &CasePayload) -> Result<TestCase, ApiError> {
        let body = case_body(self.step_mode(), payload);
        let value = self.post(&format!("add_case/{section_id}"), &body)?;
        parse_entity(value, "case")
    }

    fn update_case(&self, case_id: u64, payload: &CasePayload) -> Result<TestCase, ApiError> {
        let body = case_body(self.step_mode(), payload);
        let value = self.post(&format!("update_case/{case_id}"), &body)?;
        parse_entity(value, "case")
    }

    fn delete_case(&self, case_id: u64) -> Result<(), ApiError> {
        self.post(&format!("delete_case/{case_id}"), &json!({}))?;
        Ok(())
    }
}

fn decode(mut response: ureq::http::Response<ureq::Body>) -> Result<Value, ApiError> {
    let status = response.status().as_u16();
    let text = response
        .body_mut()
        .read_to_string()
        .map_err(|err| ApiError::Network(err.to_string()))?;
    if !(200..300).contains(&status) {
        return Err(classify_testrail_error(status, &text));
    }
    if text.trim().is_empty() {
        // Delete endpoints answer with an empty body.
        return Ok(Value::Null);
    }
    serde_json::from_str(&text)
        .map_err(|err| ApiError::Unexpected(format!("response is not valid JSON: {err}")))
}

/// Unwrap a listing response: a bare array on older servers, a paginated
/// envelope keyed by `key` on 6.7 and later.
fn parse_listing<T: DeserializeOwned>(value: Value, key: &str) -> Result<Vec<T>, ApiError> {
    let items = match value {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut map) => map.remove(key).unwrap_or_else(|| Value::Array(Vec::new())),
        other => other,
    };
    serde_json::from_value(items)
        .map_err(|err| ApiError::Unexpected(format!("unexpected {key} listing shape: {err}")))
}

fn parse_entity<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, ApiError> {
    serde_json::from_value(value)
        .map_err(|err| ApiError::Unexpected(format!("unexpected {what} shape: {err}")))
}

/// Translate the store-agnostic payload into TestRail case fields for the
/// negotiated step layout.
fn case_body(mode: StepMode, payload: &CasePayload) -> Value {
    let mut body = json!({
        "title": payload.title,
        "custom_preconds": payload.preconditions,
        "refs": payload.refs,
    });
    match mode {
        StepMode::Separated => {
            body["custom_steps_separated"] = separated_steps(payload);
        }
        StepMode::Plain => {
            body["custom_steps"] = Value::String(payload.steps.join("\n"));
            body["custom_expected"] = Value::String(payload.expected.clone());
        }
    }
    body
}

/// Steps as step/expected pairs: the expected result rides on the last
/// step. A scenario with no steps still needs one row to carry it.
fn separated_steps(payload: &CasePayload) -> Value {
    if payload.steps.is_empty() {
        return json!([{ "content": "", "expected": payload.expected }]);
    }
    let last = payload.steps.len() - 1;
    let rows: Vec<Value> = payload
        .steps
        .iter()
        .enumerate()
        .map(|(idx, step)| {
            let expected = if idx == last {
                payload.expected.as_str()
            } else {
                ""
            };
            json!({ "content": step, "expected": expected })
        })
        .collect();
    Value::Array(rows)
}

/// Classify a TestRail error response. Single-suite installations refuse
/// suite creation and deletion with a message naming the mode; that wording
/// is a heuristic, so it is matched loosely and carried on the error.
fn classify_testrail_error(status: u16, body: &str) -> ApiError {
    let snippet = http::body_snippet(body);
    let single_suite = body.to_lowercase().contains("single suite");
    match status {
        401 => ApiError::Auth(format!("TestRail rejected the credentials: {snippet}")),
        403 => ApiError::Forbidden {
            message: snippet,
            single_suite_mode: single_suite,
        },
        400 if single_suite => ApiError::Forbidden {
            message: snippet,
            single_suite_mode: true,
        },
        400 => ApiError::Validation(snippet),
        404 => ApiError::NotFound(snippet),
        _ => ApiError::Unexpected(format!("TestRail returned status {status}: {snippet}")),
    }
}

/// In-memory store double shared by resolver and orchestrator tests. Reads
/// serve from plain vectors; every mutation appends to `calls` so tests can
/// assert exact call order.
#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    pub(crate) struct FakeStore {
        pub(crate) suites: RefCell<Vec<Suite>>,
        pub(crate) sections: RefCell<Vec<Section>>,
        pub(crate) cases: RefCell<Vec<TestCase>>,
        pub(crate) calls: RefCell<Vec<String>>,
        /// Case titles whose create/update should fail with a validation
        /// error, to exercise per-action error handling.
        pub(crate) fail_titles: RefCell<Vec<String>>,
        pub(crate) single_suite_mode: Cell<bool>,
        next_id: Cell<u64>,
    }

    impl FakeStore {
        pub(crate) fn new() -> Self {
            Self {
                next_id: Cell::new(100),
                ..Self::default()
            }
        }

        pub(crate) fn with_suite(self, id: u64, name: &str) -> Self {
            self.suites.borrow_mut().push(Suite {
                id,
                name: name.to_string(),
            });
            self
        }

        pub(crate) fn with_section(
            self,
            id: u64,
            suite_id: u64,
            parent_id: Option<u64>,
            name: &str,
        ) -> Self {
            self.sections.borrow_mut().push(Section {
                id,
                name: name.to_string(),
                suite_id: Some(suite_id),
                parent_id,
            });
            self
        }

        pub(crate) fn with_case(self, id: u64, section_id: u64, title: &str, refs: Option<&str>) -> Self {
            self.cases.borrow_mut().push(TestCase {
                id,
                title: title.to_string(),
                section_id: Some(section_id),
                refs: refs.map(str::to_string),
            });
            self
        }

        pub(crate) fn mutation_calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn next_id(&self) -> u64 {
            let id = self.next_id.get();
            self.next_id.set(id + 1);
            id
        }

        fn log(&self, call: String) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl CaseStore for FakeStore {
        fn list_suites(&self, _project_id: u64) -> Result<Vec<Suite>, ApiError> {
            Ok(self.suites.borrow().clone())
        }

        fn create_suite(&self, _project_id: u64, name: &str) -> Result<Suite, ApiError> {
            if self.single_suite_mode.get() {
                return Err(ApiError::Forbidden {
                    message: "not allowed in single suite mode".to_string(),
                    single_suite_mode: true,
                });
            }
            let suite = Suite {
                id: self.next_id(),
                name: name.to_string(),
            };
            self.log(format!("add_suite name={name}"));
            self.suites.borrow_mut().push(suite.clone());
            Ok(suite)
        }

        fn delete_suite(&self, suite_id: u64) -> Result<(), ApiError> {
            if self.single_suite_mode.get() {
                return Err(ApiError::Forbidden {
                    message: "not allowed in single suite mode".to_string(),
                    single_suite_mode: true,
                });
            }
            self.log(format!("delete_suite suite={suite_id}"));
            self.suites.borrow_mut().retain(|suite| suite.id != suite_id);
            Ok(())
        }

        fn list_sections(&self, _project_id: u64, suite_id: u64) -> Result<Vec<Section>, ApiError> {
            Ok(self
                .sections
                .borrow()
                .iter()
                .filter(|section| section.suite_id == Some(suite_id))
                .cloned()
                .collect())
        }

        fn get_section(&self, section_id: u64) -> Result<Section, ApiError> {
            self.sections
                .borrow()
                .iter()
                .find(|section| section.id == section_id)
                .cloned()
                .ok_or_else(|| ApiError::NotFound(format!("section {section_id}")))
        }

        fn create_section(
            &self,
            _project_id: u64,
            suite_id: u64,
            name: &str,
            parent_id: Option<u64>,
        ) -> Result<Section, ApiError> {
            let section = Section {
                id: self.next_id(),
                name: name.to_string(),
                suite_id: Some(suite_id),
                parent_id,
            };
            self.log(format!(
                "add_section suite={suite_id} name={name} parent={parent_id:?}"
            ));
            self.sections.borrow_mut().push(section.clone());
            Ok(section)
        }

        fn list_cases(
            &self,
            _project_id: u64,
            _suite_id: Option<u64>,
            section_id: u64,
        ) -> Result<Vec<TestCase>, ApiError> {
            // Like the real endpoint, the section filter also returns cases
            // in child sections.
            let sections = self.sections.borrow();
            let mut wanted = vec![section_id];
            let mut next = 0;
            while next < wanted.len() {
                let parent = wanted[next];
                wanted.extend(
                    sections
                        .iter()
                        .filter(|section| section.parent_id == Some(parent))
                        .map(|section| section.id),
                );
                next += 1;
            }
            Ok(self
                .cases
                .borrow()
                .iter()
                .filter(|case| case.section_id.is_some_and(|id| wanted.contains(&id)))
                .cloned()
                .collect())
        }

        fn create_case(&self, section_id: u64, payload: &CasePayload) -> Result<TestCase, ApiError> {
            if self.fail_titles.borrow().contains(&payload.title) {
                return Err(ApiError::Validation(format!(
                    "simulated rejection of {:?}",
                    payload.title
                )));
            }
            let case = TestCase {
                id: self.next_id(),
                title: payload.title.clone(),
                section_id: Some(section_id),
                refs: Some(payload.refs.clone()),
            };
            self.log(format!(
                "add_case section={section_id} title={}",
                payload.title
            ));
            self.cases.borrow_mut().push(case.clone());
            Ok(case)
        }

        fn update_case(&self, case_id: u64, payload: &CasePayload) -> Result<TestCase, ApiError> {
            if self.fail_titles.borrow().contains(&payload.title) {
                return Err(ApiError::Validation(format!(
                    "simulated rejection of {:?}",
                    payload.title
                )));
            }
            let mut cases = self.cases.borrow_mut();
            let case = cases
                .iter_mut()
                .find(|case| case.id == case_id)
                .ok_or_else(|| ApiError::NotFound(format!("case {case_id}")))?;
            case.title = payload.title.clone();
            case.refs = Some(payload.refs.clone());
            self.log(format!("update_case case={case_id} title={}", payload.title));
            Ok(case.clone())
        }

        fn delete_case(&self, case_id: u64) -> Result<(), ApiError> {
            self.log(format!("delete_case case={case_id}"));
            self.cases.borrow_mut().retain(|case| case.id != case_id);
            Ok(())
        }
    }
}
