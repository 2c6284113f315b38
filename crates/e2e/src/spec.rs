//! Declarative YAML flow specification

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::fixtures::AuthProfile;

/// A browser flow parsed from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    /// Unique name for this flow.
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering flows.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Standing profile whose SESSION this flow starts from (the browser
    /// context is created with its cached storage state).
    #[serde(default)]
    pub auth: Option<AuthProfile>,

    /// Profile whose ACCOUNT the flow references through placeholders
    /// without attaching its session - e.g. logging in as that user.
    #[serde(default)]
    pub account: Option<AuthProfile>,

    /// Steps to execute in order.
    pub steps: Vec<TestStep>,

    /// After the steps pass, require a matching email in the capture
    /// service inbox.
    #[serde(default)]
    pub expect_email: Option<EmailExpectation>,
}

/// A single step in a flow.
///
/// Selectors are accessibility-first (label, role name, visible text), the
/// way the auth pages are meant to be reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Open a path on the app origin, or a full URL.
    Navigate { url: String },

    /// Wait until the page lands on a URL (exact or glob, per Playwright).
    WaitForUrl {
        url: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Wait for the Turnstile captcha widget to attach.
    WaitForCaptcha,

    /// Fill the input with the given label.
    FillLabel { label: String, value: String },

    /// Fill the textbox with the given accessible name.
    FillTextbox { name: String, value: String },

    ClickButton { name: String },

    ClickLink { name: String },

    Press { key: String },

    /// Assert the document title matches a pattern.
    ExpectTitle { pattern: String },

    /// Assert the current URL matches a pattern.
    ExpectUrl { pattern: String },

    /// Assert text is visible. `exact` matches a whole validation message
    /// rather than a substring.
    ExpectText {
        text: String,
        #[serde(default)]
        exact: bool,
    },

    ExpectButton { name: String },

    ExpectLink { name: String },

    ExpectLabel { label: String },

    /// Assert an attribute value on the first element matching a CSS
    /// selector.
    ExpectAttribute {
        selector: String,
        attribute: String,
        value: String,
    },

    Screenshot { name: String },

    /// Fixed wait (use sparingly).
    Sleep { ms: u64 },
}

/// Inbox assertion attached to a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailExpectation {
    #[serde(default)]
    pub recipient_contains: Option<String>,
    #[serde(default)]
    pub subject_contains: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl TestStep {
    /// Short display name for logs and step errors.
    pub fn label(&self) -> String {
        match self {
            TestStep::Navigate { url } => format!("navigate:{url}"),
            TestStep::WaitForUrl { url, .. } => format!("wait_for_url:{url}"),
            TestStep::WaitForCaptcha => "wait_for_captcha".to_string(),
            TestStep::FillLabel { label, .. } => format!("fill_label:{label}"),
            TestStep::FillTextbox { name, .. } => format!("fill_textbox:{name}"),
            TestStep::ClickButton { name } => format!("click_button:{name}"),
            TestStep::ClickLink { name } => format!("click_link:{name}"),
            TestStep::Press { key } => format!("press:{key}"),
            TestStep::ExpectTitle { pattern } => format!("expect_title:{pattern}"),
            TestStep::ExpectUrl { pattern } => format!("expect_url:{pattern}"),
            TestStep::ExpectText { text, .. } => format!("expect_text:{text}"),
            TestStep::ExpectButton { name } => format!("expect_button:{name}"),
            TestStep::ExpectLink { name } => format!("expect_link:{name}"),
            TestStep::ExpectLabel { label } => format!("expect_label:{label}"),
            TestStep::ExpectAttribute {
                selector,
                attribute,
                ..
            } => format!("expect_attribute:{selector}@{attribute}"),
            TestStep::Screenshot { name } => format!("screenshot:{name}"),
            TestStep::Sleep { ms } => format!("sleep:{ms}ms"),
        }
    }
}

impl TestSpec {
    /// Parse a flow from a YAML string.
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse a flow from a YAML file.
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load all flows from a directory, sorted by file name so runs are
    /// deterministic.
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();
        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            specs.push(Self::from_file(entry.path())?);
        }
        Ok(specs)
    }

    /// Does this flow carry the tag?
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// The profile this flow's placeholders resolve against, if any.
    pub fn profile(&self) -> Option<AuthProfile> {
        self.auth.or(self.account)
    }

    /// Replace `$PLACEHOLDER` variables in every string field.
    pub fn resolve_placeholders(&self, vars: &[(&str, &str)]) -> E2eResult<Self> {
        let mut value = serde_json::to_value(self)?;
        substitute(&mut value, vars);
        Ok(serde_json::from_value(value)?)
    }
}

fn substitute(value: &mut serde_json::Value, vars: &[(&str, &str)]) {
    match value {
        serde_json::Value::String(s) => {
            for (key, replacement) in vars {
                if s.contains(key) {
                    *s = s.replace(key, replacement);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                substitute(item, vars);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values_mut() {
                substitute(item, vars);
            }
        }
        _ => {}
    }
}
