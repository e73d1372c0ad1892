//! Interaction log: recent questions and answers

use chrono::{DateTime, Local};
use serde_json::Value;
use tracing::debug;

use crate::config::BackendBase;
use crate::error::Result;
use crate::fallback::{probe, routes};
use crate::fetch::AdminFetch;
use crate::stats::{Report, StatsQuery};

/// Default number of records requested
pub const DEFAULT_LIMIT: u32 = 50;

const ITEM_KEYS: &[&str] = &["answers", "interactions", "items", "rows"];

const TIME_KEYS: &[&[&str]] = &[
    &["created_at"],
    &["timestamp"],
    &["ts"],
    &["time"],
    &["inserted_at"],
];
const CUSTOMER_KEYS: &[&[&str]] = &[
    &["customer_id"],
    &["customerId"],
    &["customer", "id"],
    &["customer"],
];
const QUESTION_KEYS: &[&[&str]] = &[
    &["question"],
    &["prompt"],
    &["user_message"],
    &["input"],
    &["query"],
];
const ANSWER_KEYS: &[&[&str]] = &[
    &["answer"],
    &["assistant_message"],
    &["output"],
    &["response"],
];

/// Placeholder status when a record carries no verdict
pub const UNKNOWN_STATUS: &str = "—";

/// Filter for the interaction log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswersQuery {
    pub window: StatsQuery,
    pub limit: u32,
    /// Free-text search
    pub text: Option<String>,
}

impl Default for AnswersQuery {
    fn default() -> Self {
        Self {
            window: StatsQuery::default(),
            limit: DEFAULT_LIMIT,
            text: None,
        }
    }
}

impl AnswersQuery {
    pub fn new(window: StatsQuery) -> Self {
        Self {
            window,
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_text(mut self, text: Option<&str>) -> Self {
        self.text = text.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string);
        self
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = self.window.params();
        let limit = if self.limit == 0 { DEFAULT_LIMIT } else { self.limit };
        params.insert(1, ("limit", limit.to_string()));
        if let Some(text) = &self.text {
            // Deployments disagree on the parameter name
            for key in ["q", "query", "search"] {
                params.push((key, text.clone()));
            }
        }
        params
    }
}

/// First alias path holding a non-null value
fn first_present<'a>(item: &'a Value, paths: &[&[&str]]) -> Option<&'a Value> {
    paths.iter().find_map(|path| {
        path.iter()
            .try_fold(item, |v, key| v.get(*key))
            .filter(|v| !v.is_null())
    })
}

fn as_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// One interaction, normalized across backend shapes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    /// Timestamp as sent
    pub time: String,
    pub customer: String,
    pub question: String,
    pub answer: String,
    /// `allowed`, `blocked`, a backend-specific status, or `—`
    pub status: String,
}

impl AnswerRecord {
    pub fn from_value(item: &Value) -> Self {
        Self {
            time: as_text(first_present(item, TIME_KEYS)),
            customer: as_text(first_present(item, CUSTOMER_KEYS)),
            question: as_text(first_present(item, QUESTION_KEYS)),
            answer: as_text(first_present(item, ANSWER_KEYS)),
            status: derive_status(item),
        }
    }

    /// Timestamp in local time when it parses as RFC 3339, else as sent
    pub fn display_time(&self) -> String {
        format_time(&self.time)
    }
}

/// `status` if set, else derived from the `blocked`/`allowed` flags
pub fn derive_status(item: &Value) -> String {
    let status = as_text(item.get("status"));
    if !status.is_empty() {
        return status;
    }

    let flag = |key: &str| item.get(key).and_then(Value::as_bool);
    match (flag("blocked"), flag("allowed")) {
        (Some(true), _) => "blocked",
        (_, Some(true)) => "allowed",
        (_, Some(false)) => "blocked",
        _ => UNKNOWN_STATUS,
    }
    .to_string()
}

/// Render a timestamp in local time, leaving unparseable input unchanged
pub fn format_time(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(ts) => ts
            .with_timezone(&Local)
            .format("%d.%m.%Y, %H:%M:%S")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Records from a response: the body itself when it is an array, else the
/// first array under a known key
pub fn records_from_body(body: &Value) -> Vec<AnswerRecord> {
    let items = match body {
        Value::Array(items) => Some(items),
        other => ITEM_KEYS
            .iter()
            .find_map(|key| other.get(*key).and_then(Value::as_array)),
    };
    items
        .map(|items| items.iter().map(AnswerRecord::from_value).collect())
        .unwrap_or_default()
}

/// Client for the interaction log endpoints
#[derive(Debug, Clone)]
pub struct AnswersClient {
    base: BackendBase,
    fetch: AdminFetch,
}

impl AnswersClient {
    pub(crate) fn new(base: BackendBase, fetch: AdminFetch) -> Self {
        Self { base, fetch }
    }

    /// Load recent interactions
    pub async fn list(&self, query: &AnswersQuery) -> Result<Report<Vec<AnswerRecord>>> {
        let set = routes::answers(&self.base)?.with_query(&query.params());
        let probed = probe(&self.fetch, &set).await?;
        debug!(via = %probed.url, "answers loaded");

        let raw = probed.response.body;
        Ok(Report {
            data: records_from_body(&raw),
            via: probed.url,
            raw,
        })
    }
}
