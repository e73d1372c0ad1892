//! Usage statistics: totals and per-day counts

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::BackendBase;
use crate::error::Result;
use crate::fallback::{probe, routes};
use crate::fetch::AdminFetch;

/// Default reporting window in days
pub const DEFAULT_DAYS: u32 = 7;

/// Read a count that may arrive as a number or a numeric string
pub(crate) fn count_value(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reporting window and optional customer filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsQuery {
    pub days: u32,
    pub customer_id: Option<String>,
}

impl Default for StatsQuery {
    fn default() -> Self {
        Self {
            days: DEFAULT_DAYS,
            customer_id: None,
        }
    }
}

impl StatsQuery {
    pub fn new(days: u32) -> Self {
        Self {
            days,
            customer_id: None,
        }
    }

    /// Restrict to one customer; a blank id means all customers
    pub fn with_customer(mut self, customer_id: Option<&str>) -> Self {
        self.customer_id = customer_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        self
    }

    pub(crate) fn params(&self) -> Vec<(&'static str, String)> {
        let days = if self.days == 0 { DEFAULT_DAYS } else { self.days };
        let mut params = vec![("days", days.to_string())];
        if let Some(id) = &self.customer_id {
            params.push(("customer_id", id.clone()));
        }
        params
    }
}

/// Interaction counts over the whole window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsTotals {
    pub total: Option<u64>,
    pub allowed: Option<u64>,
    pub blocked: Option<u64>,
}

impl StatsTotals {
    pub fn from_body(body: &Value) -> Self {
        let totals = body.get("totals");
        let field = |key: &str| count_value(totals.and_then(|t| t.get(key)));
        Self {
            total: field("total"),
            allowed: field("allowed"),
            blocked: field("blocked"),
        }
    }
}

/// Interaction counts for one day
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyStatsRow {
    pub date: String,
    pub total: u64,
    pub allowed: u64,
    pub blocked: u64,
}

impl DailyStatsRow {
    fn from_value(row: &Value) -> Self {
        let field = |key: &str| count_value(row.get(key)).unwrap_or(0);
        Self {
            date: match row.get("date") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            },
            total: field("total"),
            allowed: field("allowed"),
            blocked: field("blocked"),
        }
    }

    /// Rows from a response's `days` array
    pub fn rows_from_body(body: &Value) -> Vec<Self> {
        body.get("days")
            .and_then(Value::as_array)
            .map(|rows| rows.iter().map(Self::from_value).collect())
            .unwrap_or_default()
    }
}

/// Parsed data plus the route that served it and the raw body
#[derive(Debug, Clone)]
pub struct Report<T> {
    pub data: T,
    pub via: Url,
    pub raw: Value,
}

/// Client for the statistics endpoints
#[derive(Debug, Clone)]
pub struct StatsClient {
    base: BackendBase,
    fetch: AdminFetch,
}

impl StatsClient {
    pub(crate) fn new(base: BackendBase, fetch: AdminFetch) -> Self {
        Self { base, fetch }
    }

    /// Load totals for the window
    pub async fn totals(&self, query: &StatsQuery) -> Result<Report<StatsTotals>> {
        let set = routes::stats_totals(&self.base)?.with_query(&query.params());
        let probed = probe(&self.fetch, &set).await?;
        debug!(via = %probed.url, "stats totals loaded");

        let raw = probed.response.body;
        Ok(Report {
            data: StatsTotals::from_body(&raw),
            via: probed.url,
            raw,
        })
    }

    /// Load per-day rows for the window
    pub async fn daily(&self, query: &StatsQuery) -> Result<Report<Vec<DailyStatsRow>>> {
        let set = routes::stats_daily(&self.base)?.with_query(&query.params());
        let probed = probe(&self.fetch, &set).await?;
        debug!(via = %probed.url, "daily stats loaded");

        let raw = probed.response.body;
        Ok(Report {
            data: DailyStatsRow::rows_from_body(&raw),
            via: probed.url,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_params() {
        assert_eq!(
            StatsQuery::default().params(),
            vec![("days", "7".to_string())]
        );
        let query = StatsQuery::new(30).with_customer(Some(" c1 "));
        assert_eq!(
            query.params(),
            vec![("days", "30".to_string()), ("customer_id", "c1".to_string())]
        );
        assert_eq!(StatsQuery::new(0).with_customer(Some("  ")).params().len(), 1);
    }

    #[test]
    fn test_totals_from_body() {
        let totals = StatsTotals::from_body(&json!({ "totals": { "total": 10, "allowed": "8" } }));
        assert_eq!(totals.total, Some(10));
        assert_eq!(totals.allowed, Some(8));
        assert_eq!(totals.blocked, None);
        assert_eq!(StatsTotals::from_body(&json!({})), StatsTotals::default());
    }

    #[test]
    fn test_daily_rows_default_to_zero() {
        let rows = DailyStatsRow::rows_from_body(&json!({
            "days": [
                { "date": "2024-05-01", "total": 3, "allowed": 2, "blocked": 1 },
                { "date": "2024-05-02" }
            ]
        }));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].total, 0);
        assert_eq!(rows[0].blocked, 1);
        assert!(DailyStatsRow::rows_from_body(&json!({ "days": null })).is_empty());
    }
}
