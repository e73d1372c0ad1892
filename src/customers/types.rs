//! Types for customer management

use std::fmt;

use chatbot_admin_widget::{decode, normalize_domain_entry, parse_allowed_domains, WidgetSettings};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Number, Value};

use crate::error::{Error, Result};
use crate::stats::count_value;

/// A customer's subscription tier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Plan {
    Standard,
    Pro,
    /// Any other tier, kept verbatim
    Other(String),
}

impl Plan {
    /// Model used when the customer has no override
    pub fn default_model(&self) -> Option<&'static str> {
        match self {
            Plan::Standard => Some("gpt-4o-mini"),
            Plan::Pro => Some("gpt-4o"),
            Plan::Other(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Plan::Standard => "standard",
            Plan::Pro => "pro",
            Plan::Other(s) => s,
        }
    }
}

impl Default for Plan {
    fn default() -> Self {
        Plan::Standard
    }
}

impl From<String> for Plan {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "standard" => Plan::Standard,
            "pro" => Plan::Pro,
            _ => Plan::Other(value),
        }
    }
}

impl From<&str> for Plan {
    fn from(value: &str) -> Self {
        Plan::from(value.to_string())
    }
}

impl From<Plan> for String {
    fn from(plan: Plan) -> Self {
        plan.as_str().to_string()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tenant of the chatbot backend.
///
/// Unknown top-level fields are kept in `extra`, so legacy flat widget
/// fields survive a round trip and stay visible to the settings codec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default, deserialize_with = "lenient::id")]
    pub id: String,

    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "lenient::plan", skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,

    /// Model override
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Public key the embeddable widget authenticates with
    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub widget_key: Option<String>,

    #[serde(default, deserialize_with = "lenient::text", skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default, deserialize_with = "lenient::domains", skip_serializing_if = "Option::is_none")]
    pub allowed_domains: Option<Vec<String>>,

    #[serde(default, deserialize_with = "lenient::number", skip_serializing_if = "Option::is_none")]
    pub monthly_message_limit: Option<f64>,

    #[serde(default, deserialize_with = "lenient::number", skip_serializing_if = "Option::is_none")]
    pub ask_rpm_limit: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_settings: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Field readers that never reject a record.
///
/// Backends disagree on field types (numeric ids, limits sent as strings).
/// Values of an unusable type read as absent.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::{parse_limit, Plan};

    fn scalar_text(value: Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(scalar_text(Value::deserialize(d)?).unwrap_or_default())
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(scalar_text(Value::deserialize(d)?))
    }

    pub fn plan<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Plan>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => Some(Plan::from(s)),
            _ => None,
        })
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => parse_limit(&s),
            _ => None,
        })
    }

    pub fn domains<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => Some(items.into_iter().filter_map(scalar_text).collect()),
            Value::String(s) => Some(s.lines().map(str::to_string).collect()),
            _ => None,
        })
    }
}

impl Customer {
    /// Parse a customer record
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Parse a response that is either `{"customer": {...}}` or the record itself
    pub fn from_body(body: &Value) -> Result<Self> {
        let record = body
            .get("customer")
            .filter(|c| c.is_object())
            .unwrap_or(body);
        Self::from_value(record)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({ "id": self.id }))
    }

    /// Name if set, else id; used for ordering
    pub fn sort_key(&self) -> &str {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.id.trim())
    }

    /// `"{name} — {id}"`, or just the id for unnamed customers
    pub fn label(&self) -> String {
        match self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => format!("{} — {}", name, self.id),
            None => self.id.clone(),
        }
    }

    /// Whether the record carries more than the list summary
    pub fn has_full_details(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().map_or(false, |s| !s.is_empty());
        present(&self.widget_key)
            || self.plan.as_ref().map_or(false, |p| !p.as_str().is_empty())
            || present(&self.system_prompt)
            || self.allowed_domains.is_some()
    }

    /// Model override if set, else the plan default
    pub fn effective_model(&self) -> Option<&str> {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .or_else(|| self.plan.as_ref().and_then(Plan::default_model))
    }

    /// Current widget settings, read through the legacy aliases
    pub fn decoded_widget_settings(&self) -> WidgetSettings {
        decode(&self.to_value())
    }

    /// Overlay the fields present in `incoming` onto this record
    pub(crate) fn merge(&mut self, incoming: Customer) {
        let mut merged = self.to_value();
        if let (Some(target), Value::Object(source)) = (merged.as_object_mut(), incoming.to_value()) {
            for (key, value) in source {
                target.insert(key, value);
            }
        }
        match serde_json::from_value(merged) {
            Ok(customer) => *self = customer,
            Err(_) => *self = incoming,
        }
    }
}

/// Parse a free-form number field; blank or non-finite input is `None`
pub fn parse_limit(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn number_or_null(value: Option<f64>) -> Value {
    match value.filter(|n| n.is_finite()) {
        Some(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => json!(n as i64),
        Some(n) => Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
        None => Value::Null,
    }
}

fn string_or_null(value: &Option<String>) -> Value {
    match value.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Value::String(s.to_string()),
        None => Value::Null,
    }
}

/// Payload for creating or updating a customer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomerDraft {
    pub name: Option<String>,
    pub plan: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub allowed_domains: Vec<String>,
    pub monthly_message_limit: Option<f64>,
    pub ask_rpm_limit: Option<f64>,
}

impl CustomerDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing record, as an editor pre-filled with it would
    pub fn from_customer(customer: &Customer) -> Self {
        Self {
            name: customer.name.clone(),
            plan: customer.plan.as_ref().map(|p| p.as_str().to_string()),
            model: customer.model.clone(),
            system_prompt: customer.system_prompt.clone(),
            allowed_domains: customer.allowed_domains.clone().unwrap_or_default(),
            monthly_message_limit: customer.monthly_message_limit,
            ask_rpm_limit: customer.ask_rpm_limit,
        }
    }

    pub fn with_name(mut self, value: &str) -> Self {
        self.name = Some(value.to_string());
        self
    }

    pub fn with_plan(mut self, value: &str) -> Self {
        self.plan = Some(value.to_string());
        self
    }

    pub fn with_model(mut self, value: &str) -> Self {
        self.model = Some(value.to_string());
        self
    }

    pub fn with_system_prompt(mut self, value: &str) -> Self {
        self.system_prompt = Some(value.to_string());
        self
    }

    /// Set allowed domains from newline-separated text
    pub fn with_allowed_domains_text(mut self, text: &str) -> Self {
        self.allowed_domains = parse_allowed_domains(text);
        self
    }

    pub fn with_monthly_message_limit(mut self, value: Option<f64>) -> Self {
        self.monthly_message_limit = value;
        self
    }

    pub fn with_ask_rpm_limit(mut self, value: Option<f64>) -> Self {
        self.ask_rpm_limit = value;
        self
    }

    fn normalized_domains(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for domain in self.allowed_domains.iter().map(|d| normalize_domain_entry(d)) {
            if !domain.is_empty() && !out.contains(&domain) {
                out.push(domain);
            }
        }
        out
    }

    /// Body for `PATCH /admin/customers/{id}`
    pub fn to_update_payload(&self) -> Value {
        json!({
            "name": string_or_null(&self.name),
            "plan": string_or_null(&self.plan),
            "model": string_or_null(&self.model),
            "system_prompt": string_or_null(&self.system_prompt),
            "allowed_domains": self.normalized_domains(),
            "monthly_message_limit": number_or_null(self.monthly_message_limit),
            "ask_rpm_limit": number_or_null(self.ask_rpm_limit),
        })
    }

    /// Body for `POST /admin/customers`; the plan defaults to `standard`
    pub fn to_create_payload(&self) -> Value {
        let mut payload = self.to_update_payload();
        if payload["plan"].is_null() {
            payload["plan"] = json!(Plan::Standard.as_str());
        }
        payload
    }
}

/// What a customer delete should cover
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Only report what would be deleted
    pub dry_run: bool,
    pub delete_documents: bool,
    pub delete_interactions: bool,
    /// Required for a real delete
    pub confirmed: bool,
}

impl DeleteOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.dry_run && !self.confirmed {
            return Err(Error::validation(
                "deleting a customer must be confirmed explicitly",
            ));
        }
        Ok(())
    }

    pub(crate) fn to_payload(&self) -> Value {
        let mut body = if self.dry_run {
            json!({ "dry_run": true })
        } else {
            json!({ "confirm_delete": true })
        };
        body["delete_documents"] = json!(self.delete_documents);
        body["delete_interactions"] = json!(self.delete_interactions);
        body
    }
}

/// Row counts reported by a customer delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteCounts {
    pub documents: u64,
    pub interactions: u64,
    pub customer_row: u64,
}

impl DeleteCounts {
    /// Read counts, defaulting to 0 documents, 0 interactions, 1 row
    pub fn from_value(value: Option<&Value>) -> Self {
        let count = |key: &str, default: u64| {
            count_value(value.and_then(|v| v.get(key))).unwrap_or(default)
        };
        Self {
            documents: count("documents", 0),
            interactions: count("interactions", 0),
            customer_row: count("customer_row", 1),
        }
    }
}

impl fmt::Display for DeleteCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "documents: {}, interactions: {}, customer_row: {}",
            self.documents, self.interactions, self.customer_row
        )
    }
}

/// Result of a customer delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub dry_run: bool,
    pub counts: DeleteCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_parsing_and_default_model() {
        assert_eq!(Plan::from(" Pro "), Plan::Pro);
        assert_eq!(Plan::from("standard").default_model(), Some("gpt-4o-mini"));
        assert_eq!(Plan::from("enterprise"), Plan::Other("enterprise".into()));
        assert_eq!(Plan::from("enterprise").default_model(), None);
    }

    #[test]
    fn test_customer_keeps_unknown_fields() {
        let customer = Customer::from_body(&json!({
            "customer": {
                "id": "c1",
                "name": "Acme",
                "plan": "pro",
                "widget_header_bg": "#112233"
            }
        }))
        .unwrap();

        assert_eq!(customer.plan, Some(Plan::Pro));
        assert_eq!(customer.extra["widget_header_bg"], "#112233");
        assert_eq!(customer.to_value()["widget_header_bg"], "#112233");
        assert_eq!(customer.decoded_widget_settings().header_color, "#112233");
    }

    #[test]
    fn test_customer_accepts_loosely_typed_fields() {
        let customer = Customer::from_value(&json!({
            "id": 42,
            "name": null,
            "plan": 3,
            "widget_key": "wk_1",
            "allowed_domains": ["a.com", 7, null],
            "monthly_message_limit": "1000",
            "ask_rpm_limit": "lots"
        }))
        .unwrap();

        assert_eq!(customer.id, "42");
        assert_eq!(customer.name, None);
        assert_eq!(customer.plan, None);
        assert_eq!(customer.widget_key.as_deref(), Some("wk_1"));
        assert_eq!(
            customer.allowed_domains,
            Some(vec!["a.com".to_string(), "7".to_string()])
        );
        assert_eq!(customer.monthly_message_limit, Some(1000.0));
        assert_eq!(customer.ask_rpm_limit, None);

        let sparse = Customer::from_value(&json!({ "id": null, "monthly_message_limit": 250 })).unwrap();
        assert_eq!(sparse.id, "");
        assert_eq!(sparse.monthly_message_limit, Some(250.0));
    }

    #[test]
    fn test_effective_model() {
        let mut customer = Customer {
            id: "c1".into(),
            plan: Some(Plan::Pro),
            ..Default::default()
        };
        assert_eq!(customer.effective_model(), Some("gpt-4o"));
        customer.model = Some("gpt-4.1".into());
        assert_eq!(customer.effective_model(), Some("gpt-4.1"));
    }

    #[test]
    fn test_merge_keeps_cached_fields() {
        let mut cached = Customer::from_value(&json!({
            "id": "c1", "name": "Acme", "widget_key": "wk_1", "legacy": 1
        }))
        .unwrap();
        let incoming = Customer::from_value(&json!({ "id": "c1", "name": "Acme GmbH" })).unwrap();

        cached.merge(incoming);
        assert_eq!(cached.name.as_deref(), Some("Acme GmbH"));
        assert_eq!(cached.widget_key.as_deref(), Some("wk_1"));
        assert_eq!(cached.extra["legacy"], 1);
    }

    #[test]
    fn test_has_full_details() {
        let summary = Customer::from_value(&json!({ "id": "c1", "name": "Acme" })).unwrap();
        assert!(!summary.has_full_details());
        let full = Customer::from_value(&json!({ "id": "c1", "allowed_domains": [] })).unwrap();
        assert!(full.has_full_details());
    }

    #[test]
    fn test_draft_payloads() {
        let draft = CustomerDraft::new()
            .with_name("  Acme ")
            .with_model(" ")
            .with_allowed_domains_text("https://www.Acme.de/shop\nacme.de\nlocalhost")
            .with_monthly_message_limit(parse_limit("1000"))
            .with_ask_rpm_limit(parse_limit("abc"));

        let payload = draft.to_create_payload();
        assert_eq!(payload["name"], "Acme");
        assert_eq!(payload["plan"], "standard");
        assert_eq!(payload["model"], Value::Null);
        assert_eq!(payload["allowed_domains"], json!(["acme.de", "localhost"]));
        assert_eq!(payload["monthly_message_limit"], 1000);
        assert_eq!(payload["ask_rpm_limit"], Value::Null);

        assert_eq!(draft.to_update_payload()["plan"], Value::Null);
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(" 12.5 "), Some(12.5));
        assert_eq!(parse_limit(""), None);
        assert_eq!(parse_limit("inf"), None);
    }

    #[test]
    fn test_delete_options() {
        let dry = DeleteOptions {
            dry_run: true,
            delete_documents: true,
            ..Default::default()
        };
        assert!(dry.validate().is_ok());
        assert_eq!(
            dry.to_payload(),
            json!({ "dry_run": true, "delete_documents": true, "delete_interactions": false })
        );

        let unconfirmed = DeleteOptions::default();
        assert!(matches!(unconfirmed.validate(), Err(Error::Validation(_))));

        let real = DeleteOptions {
            confirmed: true,
            ..Default::default()
        };
        assert_eq!(real.to_payload()["confirm_delete"], true);
    }

    #[test]
    fn test_delete_counts_defaults() {
        assert_eq!(
            DeleteCounts::from_value(None),
            DeleteCounts { documents: 0, interactions: 0, customer_row: 1 }
        );
        let counts = DeleteCounts::from_value(Some(&json!({ "documents": 4, "customer_row": 0 })));
        assert_eq!(counts.to_string(), "documents: 4, interactions: 0, customer_row: 0");
    }

    #[test]
    fn test_delete_counts_accept_numeric_strings() {
        let counts = DeleteCounts::from_value(Some(&json!({
            "documents": "4",
            "interactions": " 17 ",
            "customer_row": "one"
        })));
        assert_eq!(
            counts,
            DeleteCounts { documents: 4, interactions: 17, customer_row: 1 }
        );
    }
}
