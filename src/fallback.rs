//! Endpoint fallback
//!
//! Some backend deployments expose an operation under one of several routes.
//! Each such operation is declared as an [`EndpointSet`]: an ordered list of
//! candidate routes, primary first. [`probe`] walks the list and returns the
//! first success.

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::config::BackendBase;
use crate::error::{Error, Result};
use crate::fetch::{AdminFetch, AdminResponse};

/// One candidate route with the payload it expects
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub url: Url,
    pub payload: Option<Value>,
}

impl Endpoint {
    pub fn new(url: Url) -> Self {
        Self { url, payload: None }
    }

    pub fn with_payload(url: Url, payload: Value) -> Self {
        Self {
            url,
            payload: Some(payload),
        }
    }
}

/// Ordered candidate routes for one logical operation
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointSet {
    /// Name used in logs and in [`Error::AllCandidatesFailed`]
    pub operation: &'static str,
    pub method: Method,
    pub endpoints: Vec<Endpoint>,
}

impl EndpointSet {
    pub fn new(operation: &'static str, method: Method) -> Self {
        Self {
            operation,
            method,
            endpoints: Vec::new(),
        }
    }

    /// Append a candidate
    pub fn push(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Append the same query parameters to every candidate
    pub fn with_query<K, V>(mut self, params: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for endpoint in &mut self.endpoints {
            let mut pairs = endpoint.url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key.as_ref(), value.as_ref());
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// The successful candidate and its response
#[derive(Debug, Clone)]
pub struct Probed {
    /// Route that answered
    pub url: Url,
    pub response: AdminResponse,
}

impl Probed {
    pub fn body(&self) -> &Value {
        &self.response.body
    }

    pub fn into_body(self) -> Value {
        self.response.body
    }
}

/// Try each candidate in order and return the first 2xx response.
///
/// A missing admin token aborts immediately with [`Error::MissingToken`].
/// Transport failures and non-2xx statuses move on to the next candidate.
pub async fn probe(fetch: &AdminFetch, set: &EndpointSet) -> Result<Probed> {
    for (index, endpoint) in set.endpoints.iter().enumerate() {
        debug!(
            operation = set.operation,
            attempt = index + 1,
            url = %endpoint.url,
            "trying endpoint"
        );

        let response = match fetch
            .send(set.method.clone(), &endpoint.url, endpoint.payload.as_ref())
            .await
        {
            Ok(response) => response,
            Err(e @ Error::Validation(_)) => return Err(e),
            Err(e) => {
                debug!(operation = set.operation, url = %endpoint.url, error = %e, "endpoint unreachable");
                continue;
            }
        };

        if !response.was_sent() {
            return Err(Error::MissingToken);
        }

        if response.is_success() {
            return Ok(Probed {
                url: endpoint.url.clone(),
                response,
            });
        }

        debug!(
            operation = set.operation,
            url = %endpoint.url,
            status = response.status,
            "endpoint rejected request"
        );
    }

    warn!(
        operation = set.operation,
        attempts = set.len(),
        "no endpoint answered successfully"
    );
    Err(Error::AllCandidatesFailed {
        operation: set.operation.to_string(),
        attempts: set.len(),
    })
}

/// Declared candidate routes, primary first
pub mod routes {
    use super::*;

    fn customer(base: &BackendBase, id: &str, tail: &[&str]) -> Result<Url> {
        let mut segments = vec!["admin", "customers", id];
        segments.extend_from_slice(tail);
        base.url(&segments)
    }

    pub fn widget_key(base: &BackendBase, id: &str) -> Result<EndpointSet> {
        Ok(EndpointSet::new("regenerate widget key", Method::POST)
            .push(Endpoint::with_payload(
                customer(base, id, &["widget-key"])?,
                json!({}),
            ))
            .push(Endpoint::with_payload(
                customer(base, id, &["regenerate-widget-key"])?,
                json!({}),
            )))
    }

    /// The primary route takes the settings directly; the customer update
    /// route takes them wrapped in `widget_settings`.
    pub fn widget_settings(base: &BackendBase, id: &str, settings: &Value) -> Result<EndpointSet> {
        Ok(EndpointSet::new("save widget settings", Method::PATCH)
            .push(Endpoint::with_payload(
                customer(base, id, &["widget-settings"])?,
                settings.clone(),
            ))
            .push(Endpoint::with_payload(
                customer(base, id, &[])?,
                json!({ "widget_settings": settings }),
            )))
    }

    pub fn avatar_upload(base: &BackendBase, id: &str, data_url: &str) -> Result<EndpointSet> {
        let payload = json!({ "data_url": data_url });
        Ok(EndpointSet::new("upload avatar", Method::POST)
            .push(Endpoint::with_payload(customer(base, id, &["avatar"])?, payload.clone()))
            .push(Endpoint::with_payload(
                customer(base, id, &["widget-avatar"])?,
                payload.clone(),
            ))
            .push(Endpoint::with_payload(
                base.url(&["admin", "widget", "avatar"])?,
                payload.clone(),
            ))
            .push(Endpoint::with_payload(
                base.url(&["admin", "widget", "avatar", "upload"])?,
                payload,
            )))
    }

    pub fn avatar_delete(base: &BackendBase, id: &str) -> Result<EndpointSet> {
        Ok(EndpointSet::new("delete avatar", Method::DELETE)
            .push(Endpoint::with_payload(customer(base, id, &["avatar"])?, json!({})))
            .push(Endpoint::with_payload(
                customer(base, id, &["widget-avatar"])?,
                json!({}),
            ))
            .push(Endpoint::with_payload(
                base.url(&["admin", "widget", "avatar"])?,
                json!({}),
            )))
    }

    fn get_set(base: &BackendBase, operation: &'static str, paths: &[&[&str]]) -> Result<EndpointSet> {
        paths.iter().try_fold(EndpointSet::new(operation, Method::GET), |set, p| {
            Ok(set.push(Endpoint::new(base.url(p)?)))
        })
    }

    pub fn stats_totals(base: &BackendBase) -> Result<EndpointSet> {
        get_set(
            base,
            "load stats",
            &[&["admin", "stats"], &["admin", "interaction-stats"], &["stats"]],
        )
    }

    pub fn stats_daily(base: &BackendBase) -> Result<EndpointSet> {
        get_set(
            base,
            "load daily stats",
            &[
                &["admin", "stats", "daily"],
                &["admin", "stats-daily"],
                &["stats", "daily"],
            ],
        )
    }

    pub fn answers(base: &BackendBase) -> Result<EndpointSet> {
        get_set(
            base,
            "load answers",
            &[
                &["admin", "answers"],
                &["admin", "interactions"],
                &["admin", "interactions", "recent"],
                &["admin", "answers", "recent"],
                &["answers"],
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{NoCredentials, TokenStore};
    use crate::config::ClientOptions;
    use crate::prefs::MemoryPreferences;
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetch(token: Option<&str>) -> AdminFetch {
        let tokens = TokenStore::new(Arc::new(MemoryPreferences::new()));
        if let Some(t) = token {
            tokens.set(t);
        }
        AdminFetch::new(
            reqwest::Client::new(),
            tokens,
            Arc::new(NoCredentials),
            &ClientOptions::default(),
        )
    }

    fn endpoint(server: &MockServer, p: &str) -> Endpoint {
        Endpoint::new(Url::parse(&format!("{}{}", server.uri(), p)).unwrap())
    }

    #[tokio::test]
    async fn test_skips_unreachable_and_stops_at_first_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/c"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let set = EndpointSet::new("test", Method::GET)
            .push(Endpoint::new(Url::parse("http://127.0.0.1:1/a").unwrap()))
            .push(endpoint(&server, "/b"))
            .push(endpoint(&server, "/c"));

        let probed = probe(&fetch(Some("t")), &set).await.unwrap();
        assert_eq!(probed.url.path(), "/b");
        assert_eq!(probed.body()["ok"], true);
    }

    #[tokio::test]
    async fn test_skips_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .and(query_param("days", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .expect(1)
            .mount(&server)
            .await;

        let set = EndpointSet::new("test", Method::GET)
            .push(endpoint(&server, "/a"))
            .push(endpoint(&server, "/b"))
            .with_query(&[("days", "7")]);

        let probed = probe(&fetch(Some("t")), &set).await.unwrap();
        assert_eq!(probed.url.path(), "/b");
        assert_eq!(probed.into_body(), json!({}));
    }

    #[tokio::test]
    async fn test_all_candidates_failing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let set = EndpointSet::new("load stats", Method::GET)
            .push(endpoint(&server, "/a"))
            .push(endpoint(&server, "/b"));

        match probe(&fetch(Some("t")), &set).await {
            Err(Error::AllCandidatesFailed { operation, attempts }) => {
                assert_eq!(operation, "load stats");
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_token_aborts_without_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let set = EndpointSet::new("test", Method::GET)
            .push(endpoint(&server, "/a"))
            .push(endpoint(&server, "/b"));

        assert!(matches!(
            probe(&fetch(None), &set).await,
            Err(Error::MissingToken)
        ));
    }

    #[tokio::test]
    async fn test_unsendable_token_aborts_without_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let set = EndpointSet::new("test", Method::GET)
            .push(endpoint(&server, "/a"))
            .push(endpoint(&server, "/b"));

        assert!(matches!(
            probe(&fetch(Some("tok\u{7f}en")), &set).await,
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_route_tables() {
        let base = BackendBase::parse("https://api.example.com").unwrap();

        let set = routes::widget_settings(&base, "a b", &json!({ "bot_name": "x" })).unwrap();
        assert_eq!(set.method, Method::PATCH);
        assert_eq!(
            set.endpoints[0].url.as_str(),
            "https://api.example.com/admin/customers/a%20b/widget-settings"
        );
        assert_eq!(set.endpoints[0].payload, Some(json!({ "bot_name": "x" })));
        assert_eq!(
            set.endpoints[1].payload,
            Some(json!({ "widget_settings": { "bot_name": "x" } }))
        );

        let paths: Vec<String> = routes::answers(&base)
            .unwrap()
            .endpoints
            .iter()
            .map(|e| e.url.path().to_string())
            .collect();
        assert_eq!(
            paths,
            [
                "/admin/answers",
                "/admin/interactions",
                "/admin/interactions/recent",
                "/admin/answers/recent",
                "/answers"
            ]
        );

        assert_eq!(routes::avatar_upload(&base, "c1", "data:").unwrap().len(), 4);
        assert_eq!(routes::avatar_delete(&base, "c1").unwrap().len(), 3);
        assert_eq!(routes::widget_key(&base, "c1").unwrap().len(), 2);
        assert_eq!(routes::stats_totals(&base).unwrap().len(), 3);
        assert_eq!(routes::stats_daily(&base).unwrap().len(), 3);
    }
}
