//! issue.rs — Issue snapshots and the fetchers that produce them.
//!
//! `IssueFetcher` is the seam between the scoring pipeline and wherever
//! issues actually live: `JiraFetcher` talks to the Jira REST API v2 with
//! basic auth, `StaticFetcher` serves canned snapshots for tests and offline
//! runs. Snapshots come out with placeholder text already substituted, so
//! nothing downstream has to reason about absent fields. Raw description
//! content is never logged, only its length.

use std::collections::HashMap;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::debug;

use crate::config::JiraConfig;
use crate::error::ServiceError;

pub const PLACEHOLDER_SUMMARY: &str = "No summary";
pub const PLACEHOLDER_DESCRIPTION: &str = "None";
pub const PLACEHOLDER_PRIORITY: &str = "Not set";
pub const PLACEHOLDER_STATUS: &str = "Unknown";
pub const PLACEHOLDER_ISSUE_TYPE: &str = "Unknown";

/// Longest description we forward to the model. Anything beyond this adds
/// tokens without adding signal.
const MAX_DESCRIPTION_CHARS: usize = 2000;

const USER_AGENT: &str = concat!("ticket-load-analyzer/", env!("CARGO_PKG_VERSION"));

static ISSUE_KEY_RE: OnceCell<Regex> = OnceCell::new();
static TAG_RE: OnceCell<Regex> = OnceCell::new();
static WS_RE: OnceCell<Regex> = OnceCell::new();

fn issue_key_re() -> &'static Regex {
    ISSUE_KEY_RE.get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9]*-[0-9]+$").expect("issue key regex"))
}

/// Validates the `PROJ-123` shape before the key is ever interpolated into a
/// request path.
pub fn is_valid_issue_key(key: &str) -> bool {
    issue_key_re().is_match(key)
}

/// Decodes HTML entities, strips markup, collapses whitespace and caps the
/// length. Applied to any untrusted text before it can reach a prompt.
/// Decoding runs first so entity-encoded tags get stripped like literal ones.
pub fn scrub_description(raw: &str) -> String {
    let tag_re = TAG_RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("tag regex"));
    let ws_re = WS_RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));

    let decoded = html_escape::decode_html_entities(raw);
    let no_tags = tag_re.replace_all(&decoded, " ");
    let collapsed = ws_re.replace_all(no_tags.trim(), " ").into_owned();

    if collapsed.chars().count() > MAX_DESCRIPTION_CHARS {
        collapsed.chars().take(MAX_DESCRIPTION_CHARS).collect()
    } else {
        collapsed
    }
}

/// Read-only projection of one issue at evaluation time. Text fields carry
/// placeholder strings when the source had nothing, so consumers never see
/// an empty line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueSnapshot {
    pub key: String,
    pub summary: String,
    pub description: String,
    pub priority_name: String,
    pub status_name: String,
    pub issue_type_name: String,
    pub labels: Vec<String>,
    pub component_names: Vec<String>,
}

impl IssueSnapshot {
    /// A snapshot with every text field at its placeholder.
    pub fn bare(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            summary: PLACEHOLDER_SUMMARY.to_string(),
            description: PLACEHOLDER_DESCRIPTION.to_string(),
            priority_name: PLACEHOLDER_PRIORITY.to_string(),
            status_name: PLACEHOLDER_STATUS.to_string(),
            issue_type_name: PLACEHOLDER_ISSUE_TYPE.to_string(),
            labels: Vec::new(),
            component_names: Vec::new(),
        }
    }

    /// Builds a snapshot from optional source fields, substituting the
    /// placeholder for anything absent or blank.
    #[allow(clippy::too_many_arguments)]
    pub fn from_optional(
        key: impl Into<String>,
        summary: Option<String>,
        description: Option<String>,
        priority: Option<String>,
        status: Option<String>,
        issue_type: Option<String>,
        labels: Vec<String>,
        component_names: Vec<String>,
    ) -> Self {
        let or_placeholder = |v: Option<String>, placeholder: &str| {
            v.filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| placeholder.to_string())
        };
        Self {
            key: key.into(),
            summary: or_placeholder(summary, PLACEHOLDER_SUMMARY),
            description: or_placeholder(description, PLACEHOLDER_DESCRIPTION),
            priority_name: or_placeholder(priority, PLACEHOLDER_PRIORITY),
            status_name: or_placeholder(status, PLACEHOLDER_STATUS),
            issue_type_name: or_placeholder(issue_type, PLACEHOLDER_ISSUE_TYPE),
            labels,
            component_names,
        }
    }
}

/// Where issues come from. One call per evaluation, fresh snapshot each time.
#[async_trait]
pub trait IssueFetcher: Send + Sync {
    async fn fetch(&self, issue_key: &str) -> Result<IssueSnapshot, ServiceError>;
}

pub struct JiraFetcher {
    client: reqwest::Client,
    base_url: String,
    email: String,
    api_token: String,
}

impl JiraFetcher {
    pub fn new(cfg: &JiraConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .connect_timeout(std::time::Duration::from_secs(10))
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            email: cfg.email.clone(),
            api_token: cfg.api_token.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.email.is_empty() && !self.api_token.is_empty()
    }
}

#[async_trait]
impl IssueFetcher for JiraFetcher {
    async fn fetch(&self, issue_key: &str) -> Result<IssueSnapshot, ServiceError> {
        if !is_valid_issue_key(issue_key) {
            return Err(ServiceError::validation(format!(
                "invalid issue key: {issue_key}"
            )));
        }
        if !self.is_configured() {
            return Err(ServiceError::configuration(
                "Jira credentials are not configured (base URL, email, API token)",
            ));
        }

        let url = format!(
            "{}/rest/api/2/issue/{}?fields=summary,description,priority,status,issuetype,labels,components",
            self.base_url, issue_key
        );
        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.email, Some(&self.api_token))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                metrics::counter!("jira_fetch_total", "outcome" => "transport_error").increment(1);
                ServiceError::upstream(format!("Jira request failed: {e}"))
            })?;

        let status = resp.status();
        if !status.is_success() {
            metrics::counter!("jira_fetch_total", "outcome" => "http_error").increment(1);
            return Err(ServiceError::upstream(format!(
                "Jira returned {status} for {issue_key}"
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| ServiceError::upstream(format!("Jira body read failed: {e}")))?;
        let snapshot = parse_issue_body(issue_key, &body)?;
        metrics::counter!("jira_fetch_total", "outcome" => "ok").increment(1);
        debug!(
            issue_key,
            desc_len = snapshot.description.len(),
            labels = snapshot.labels.len(),
            "fetched issue snapshot"
        );
        Ok(snapshot)
    }
}

fn parse_issue_body(issue_key: &str, body: &str) -> Result<IssueSnapshot, ServiceError> {
    #[derive(serde::Deserialize)]
    struct IssueDto {
        fields: FieldsDto,
    }
    #[derive(serde::Deserialize)]
    struct FieldsDto {
        summary: Option<String>,
        description: Option<String>,
        priority: Option<NamedDto>,
        status: Option<NamedDto>,
        #[serde(rename = "issuetype")]
        issue_type: Option<NamedDto>,
        #[serde(default)]
        labels: Vec<String>,
        #[serde(default)]
        components: Vec<NamedDto>,
    }
    #[derive(serde::Deserialize)]
    struct NamedDto {
        name: Option<String>,
    }

    let dto: IssueDto = serde_json::from_str(body)
        .map_err(|e| ServiceError::upstream(format!("Jira response parse failed: {e}")))?;
    let f = dto.fields;

    Ok(IssueSnapshot::from_optional(
        issue_key,
        f.summary,
        f.description
            .map(|d| scrub_description(&d))
            .filter(|d| !d.is_empty()),
        f.priority.and_then(|p| p.name),
        f.status.and_then(|s| s.name),
        f.issue_type.and_then(|t| t.name),
        f.labels,
        f.components.into_iter().filter_map(|c| c.name).collect(),
    ))
}

/// Canned snapshots keyed by issue key. Unknown keys fail the way a dead
/// upstream would.
#[derive(Default)]
pub struct StaticFetcher {
    issues: HashMap<String, IssueSnapshot>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, snapshot: IssueSnapshot) -> Self {
        self.insert(snapshot);
        self
    }

    pub fn insert(&mut self, snapshot: IssueSnapshot) {
        self.issues.insert(snapshot.key.clone(), snapshot);
    }
}

#[async_trait]
impl IssueFetcher for StaticFetcher {
    async fn fetch(&self, issue_key: &str) -> Result<IssueSnapshot, ServiceError> {
        self.issues
            .get(issue_key)
            .cloned()
            .ok_or_else(|| ServiceError::upstream(format!("issue {issue_key} not found")))
    }
}
