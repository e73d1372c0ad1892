//! Authenticated HTTP requests against the admin API
//!
//! Every request carries the admin token in the `X-Admin-Token` header. A
//! `401` clears the stored token, asks the credential provider for a new one
//! and retries the same request once.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::auth::{CredentialProvider, TokenStore};
use crate::config::ClientOptions;
use crate::error::Error;

/// Header the admin token travels in
pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

/// A response from the admin API, with its body already read.
///
/// The body is parsed leniently: empty or malformed JSON reads as `{}`.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminResponse {
    /// HTTP status, or `0` when the request was never sent
    pub status: u16,
    pub body: Value,
    sent: bool,
}

impl AdminResponse {
    pub(crate) fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            sent: true,
        }
    }

    /// Synthetic result for a request short-circuited for lack of a token
    pub fn not_sent() -> Self {
        Self {
            status: 0,
            body: json!({ "error": "no admin token set" }),
            sent: false,
        }
    }

    /// False when no token was available and nothing went over the wire
    pub fn was_sent(&self) -> bool {
        self.sent
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn into `Ok(body)` on success, the matching error otherwise
    pub fn into_result(self) -> Result<Value, Error> {
        if !self.sent {
            return Err(Error::MissingToken);
        }
        if !self.is_success() {
            return Err(Error::api(self.status, &self.body));
        }
        Ok(self.body)
    }
}

/// Parse a response body, treating anything unparseable as an empty object
pub fn parse_body_lenient(text: &str) -> Value {
    if text.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(text).unwrap_or_else(|_| json!({}))
}

/// Helper for building and executing one admin request
pub struct FetchBuilder<'a> {
    fetch: &'a AdminFetch,
    url: Url,
    method: Method,
    payload: Option<Value>,
}

impl<'a> FetchBuilder<'a> {
    /// Add query parameters to the request
    pub fn query<K, V>(mut self, params: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        {
            let mut pairs = self.url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key.as_ref(), value.as_ref());
            }
        }
        self
    }

    /// Add a JSON body to the request
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, Error> {
        self.payload = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Attach an already-serialized JSON body
    pub fn json_value(mut self, body: Option<Value>) -> Self {
        self.payload = body;
        self
    }

    /// Send the request, retrying once after a `401`
    pub async fn execute_raw(self) -> Result<AdminResponse, Error> {
        self.fetch
            .send(self.method, &self.url, self.payload.as_ref())
            .await
    }

    /// Send the request and return the body of a successful response
    pub async fn execute(self) -> Result<Value, Error> {
        self.execute_raw().await?.into_result()
    }
}

/// Resilient request client shared by all API clients
#[derive(Clone)]
pub struct AdminFetch {
    client: Client,
    tokens: TokenStore,
    provider: Arc<dyn CredentialProvider>,
    client_info: HeaderValue,
}

impl AdminFetch {
    pub fn new(
        client: Client,
        tokens: TokenStore,
        provider: Arc<dyn CredentialProvider>,
        options: &ClientOptions,
    ) -> Self {
        let client_info = HeaderValue::from_str(&options.client_info)
            .unwrap_or_else(|_| HeaderValue::from_static("chatbot-admin"));
        Self {
            client,
            tokens,
            provider,
            client_info,
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Start a request
    pub fn request(&self, method: Method, url: Url) -> FetchBuilder<'_> {
        FetchBuilder {
            fetch: self,
            url,
            method,
            payload: None,
        }
    }

    /// Create a GET request
    pub fn get(&self, url: Url) -> FetchBuilder<'_> {
        self.request(Method::GET, url)
    }

    /// Create a POST request
    pub fn post(&self, url: Url) -> FetchBuilder<'_> {
        self.request(Method::POST, url)
    }

    /// Create a PATCH request
    pub fn patch(&self, url: Url) -> FetchBuilder<'_> {
        self.request(Method::PATCH, url)
    }

    /// Create a DELETE request
    pub fn delete(&self, url: Url) -> FetchBuilder<'_> {
        self.request(Method::DELETE, url)
    }

    /// Send a request with the admin token attached.
    ///
    /// Without a token (stored or acquired) nothing is sent and a synthetic
    /// status-0 response is returned. A `401` triggers exactly one retry with
    /// a freshly acquired token; if none can be acquired the original `401`
    /// is returned. Every other status is returned as-is.
    pub async fn send(
        &self,
        method: Method,
        url: &Url,
        payload: Option<&Value>,
    ) -> Result<AdminResponse, Error> {
        let Some(token) = self.tokens.ensure(self.provider.as_ref()).await else {
            debug!(%method, %url, "no admin token, request not sent");
            return Ok(AdminResponse::not_sent());
        };

        let response = self.send_once(&method, url, payload, &token_header(&token)?).await?;
        if response.status != 401 {
            return Ok(response);
        }

        warn!(%method, %url, "admin token rejected, asking for a new one");
        self.tokens.clear();
        match self.tokens.ensure(self.provider.as_ref()).await {
            Some(token) => {
                self.send_once(&method, url, payload, &token_header(&token)?)
                    .await
            }
            None => Ok(response),
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        payload: Option<&Value>,
        token: &HeaderValue,
    ) -> Result<AdminResponse, Error> {
        let mut headers = HeaderMap::new();
        headers.insert("X-Client-Info", self.client_info.clone());
        headers.insert(ADMIN_TOKEN_HEADER, token.clone());

        let mut req = self
            .client
            .request(method.clone(), url.as_str())
            .headers(headers);

        if let Some(body) = payload {
            req = req
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(body)?);
        }

        debug!(%method, %url, "sending admin request");
        let response = req.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        debug!(%method, %url, status, "admin response");

        Ok(AdminResponse::new(status, parse_body_lenient(&text)))
    }
}

/// The token as a header value; tokens with control characters are refused
/// rather than sent without authentication
fn token_header(token: &str) -> Result<HeaderValue, Error> {
    let mut value = HeaderValue::from_str(token).map_err(|_| {
        Error::validation("admin token contains characters that cannot be sent in a header")
    })?;
    value.set_sensitive(true);
    Ok(value)
}

impl std::fmt::Debug for AdminFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminFetch")
            .field("tokens", &self.tokens)
            .finish()
    }
}
