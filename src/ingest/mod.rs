//! Knowledge ingestion: manual uploads, page and domain crawls, purges

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::{parse_http_url, BackendBase};
use crate::error::{Error, Result};
use crate::fetch::AdminFetch;
use crate::prefs::PreferenceStore;
use crate::stats::count_value;

/// How many upload hashes are remembered per customer
pub const RECENT_HASH_LIMIT: usize = 50;

/// Tag identifying crawl requests from this console
pub const REQUESTED_BY: &str = "admin-ui";

const LEGAL_MARKERS: &[&str] = &[
    "impressum",
    "datenschutz",
    "privacy policy",
    "agb",
    "allgemeine geschäftsbedingungen",
    "widerruf",
];

/// `legal` for imprint, privacy or terms pages, else `general`
pub fn guess_category(content: &str) -> &'static str {
    let lower = content.to_lowercase();
    if LEGAL_MARKERS.iter().any(|m| lower.contains(m)) {
        "legal"
    } else {
        "general"
    }
}

/// Hex SHA-256 of the content
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Parse user-supplied metadata; blank input means none
pub fn parse_metadata(raw: &str) -> Result<Option<Map<String, Value>>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(Some(map)),
        Ok(_) => Err(Error::validation("metadata must be a JSON object")),
        Err(e) => Err(Error::validation(format!("metadata is not valid JSON: {}", e))),
    }
}

fn required<'a>(value: &'a str, name: &str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation(format!("{} is required", name)));
    }
    Ok(value)
}

fn required_http_url<'a>(value: &'a str, name: &str) -> Result<&'a str> {
    let value = required(value, name)?;
    if parse_http_url(value).is_none() {
        return Err(Error::validation(format!(
            "{} must be a valid http(s) URL",
            name
        )));
    }
    Ok(value)
}

fn message_of(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Content hashes of recent uploads, kept per customer in the preferences
#[derive(Clone)]
pub struct RecentUploads {
    prefs: Arc<dyn PreferenceStore>,
}

impl RecentUploads {
    pub fn new(prefs: Arc<dyn PreferenceStore>) -> Self {
        Self { prefs }
    }

    fn key(customer_id: &str) -> String {
        format!("admin_upload_hash:{}", customer_id)
    }

    /// Remembered hashes, oldest first; unreadable entries count as none
    pub fn hashes(&self, customer_id: &str) -> Vec<String> {
        self.prefs
            .get(&Self::key(customer_id))
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    pub fn contains(&self, customer_id: &str, hash: &str) -> bool {
        self.hashes(customer_id).iter().any(|h| h == hash)
    }

    /// Remember a hash, keeping only the most recent ones
    pub fn record(&self, customer_id: &str, hash: &str) {
        let mut hashes = self.hashes(customer_id);
        hashes.push(hash.to_string());
        let excess = hashes.len().saturating_sub(RECENT_HASH_LIMIT);
        hashes.drain(..excess);
        match serde_json::to_string(&hashes) {
            Ok(raw) => self.prefs.set(&Self::key(customer_id), &raw),
            Err(e) => warn!(error = %e, "could not store upload hashes"),
        }
    }
}

impl fmt::Debug for RecentUploads {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecentUploads").finish_non_exhaustive()
    }
}

/// A manual text upload
#[derive(Debug, Clone, PartialEq)]
pub struct IngestRequest {
    pub customer_id: String,
    pub content: String,
    pub metadata: Option<Map<String, Value>>,
}

impl IngestRequest {
    /// Validate inputs; metadata is raw JSON text as typed by the user
    pub fn new(customer_id: &str, content: &str, metadata: &str) -> Result<Self> {
        Ok(Self {
            customer_id: required(customer_id, "customer_id")?.to_string(),
            content: required(content, "content")?.to_string(),
            metadata: parse_metadata(metadata)?,
        })
    }

    pub fn content_hash(&self) -> String {
        content_hash(&self.content)
    }

    /// Request body; a missing `category` is guessed from the content
    pub fn to_payload(&self) -> Value {
        let mut metadata = self.metadata.clone().unwrap_or_default();
        if !metadata.contains_key("category") {
            metadata.insert(
                "category".to_string(),
                Value::from(guess_category(&self.content)),
            );
        }
        json!({
            "customer_id": self.customer_id,
            "content": self.content,
            "metadata": metadata,
        })
    }
}

/// A single-page crawl
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    pub customer_id: String,
    pub url: String,
}

impl CrawlRequest {
    pub fn new(customer_id: &str, url: &str) -> Result<Self> {
        Ok(Self {
            customer_id: required(customer_id, "customer_id")?.to_string(),
            url: required_http_url(url, "url")?.to_string(),
        })
    }

    pub fn to_payload(&self) -> Value {
        json!({
            "customer_id": self.customer_id,
            "url": self.url,
            "metadata": { "requested_by": REQUESTED_BY },
        })
    }
}

/// What a page crawl stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOutcome {
    pub message: Option<String>,
    pub chunks: Option<u64>,
}

impl fmt::Display for CrawlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.message, self.chunks) {
            (Some(message), _) => f.write_str(message),
            (None, Some(chunks)) => write!(f, "done, chunks saved: {}", chunks),
            (None, None) => f.write_str("done, chunks saved: ?"),
        }
    }
}

/// A multi-page crawl of one site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainCrawlRequest {
    pub customer_id: String,
    pub start_url: String,
    pub max_pages: u32,
    pub max_depth: u32,
    pub delay_ms: u32,
    pub same_origin: bool,
    pub respect_robots: bool,
}

impl DomainCrawlRequest {
    pub const DEFAULT_MAX_PAGES: u32 = 40;
    pub const DEFAULT_MAX_DEPTH: u32 = 2;
    pub const DEFAULT_DELAY_MS: u32 = 300;

    pub fn new(customer_id: &str, start_url: &str) -> Result<Self> {
        Ok(Self {
            customer_id: required(customer_id, "customer_id")?.to_string(),
            start_url: required_http_url(start_url, "start_url")?.to_string(),
            max_pages: Self::DEFAULT_MAX_PAGES,
            max_depth: Self::DEFAULT_MAX_DEPTH,
            delay_ms: Self::DEFAULT_DELAY_MS,
            same_origin: true,
            respect_robots: true,
        })
    }

    /// Page budget, clamped to 1..=250
    pub fn with_max_pages(mut self, value: Option<i64>) -> Self {
        self.max_pages = value.map_or(Self::DEFAULT_MAX_PAGES, |v| v.clamp(1, 250) as u32);
        self
    }

    /// Link depth, clamped to 1..=6
    pub fn with_max_depth(mut self, value: Option<i64>) -> Self {
        self.max_depth = value.map_or(Self::DEFAULT_MAX_DEPTH, |v| v.clamp(1, 6) as u32);
        self
    }

    /// Politeness delay between fetches, clamped to 0..=5000 ms
    pub fn with_delay_ms(mut self, value: Option<i64>) -> Self {
        self.delay_ms = value.map_or(Self::DEFAULT_DELAY_MS, |v| v.clamp(0, 5000) as u32);
        self
    }

    pub fn with_same_origin(mut self, value: bool) -> Self {
        self.same_origin = value;
        self
    }

    pub fn with_respect_robots(mut self, value: bool) -> Self {
        self.respect_robots = value;
        self
    }

    pub fn to_payload(&self) -> Value {
        json!({
            "customer_id": self.customer_id,
            "start_url": self.start_url,
            "max_pages": self.max_pages,
            "max_depth": self.max_depth,
            "same_origin": self.same_origin,
            "respect_robots": self.respect_robots,
            "delay_ms": self.delay_ms,
            "metadata": { "requested_by": REQUESTED_BY },
        })
    }
}

/// Pages skipped during a domain crawl, by reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkippedPages {
    pub non_html: u64,
    pub robots: u64,
    pub off_origin: u64,
    pub empty: u64,
    pub dup: u64,
}

impl SkippedPages {
    fn from_value(skipped: Option<&Value>) -> Self {
        let field = |key: &str| count_value(skipped.and_then(|s| s.get(key))).unwrap_or(0);
        Self {
            non_html: field("nonHtml"),
            robots: field("robots"),
            off_origin: field("offOrigin"),
            empty: field("empty"),
            dup: field("dup"),
        }
    }
}

/// Summary the backend reports after a domain crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DomainCrawlStats {
    pub pages_visited: Option<u64>,
    pub pages_saved: Option<u64>,
    pub chunks_saved: Option<u64>,
    pub skipped: SkippedPages,
}

impl DomainCrawlStats {
    /// Stats from a response's `stats` object; each counter is read on its
    /// own, so one unreadable value leaves the others intact
    pub fn from_body(body: &Value) -> Self {
        let stats = body.get("stats");
        let field = |key: &str| count_value(stats.and_then(|s| s.get(key)));
        Self {
            pages_visited: field("pagesVisited"),
            pages_saved: field("pagesSaved"),
            chunks_saved: field("chunksSaved"),
            skipped: SkippedPages::from_value(stats.and_then(|s| s.get("skipped"))),
        }
    }
}

impl fmt::Display for DomainCrawlStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let or_unknown = |v: Option<u64>| v.map_or_else(|| "?".to_string(), |n| n.to_string());
        write!(
            f,
            "pages visited: {}, pages saved: {}, chunks: {} (skipped: non-html {}, robots {}, off-origin {}, empty {}, dup {})",
            or_unknown(self.pages_visited),
            or_unknown(self.pages_saved),
            or_unknown(self.chunks_saved),
            self.skipped.non_html,
            self.skipped.robots,
            self.skipped.off_origin,
            self.skipped.empty,
            self.skipped.dup,
        )
    }
}

/// Removal of a customer's stored documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeRequest {
    pub customer_id: String,
    /// Only documents whose source starts with this prefix
    pub source_prefix: Option<String>,
    pub dry_run: bool,
    /// Required for a real purge without a prefix
    pub confirm_all: bool,
}

impl PurgeRequest {
    pub fn new(customer_id: &str) -> Result<Self> {
        Ok(Self {
            customer_id: required(customer_id, "customer_id")?.to_string(),
            source_prefix: None,
            dry_run: false,
            confirm_all: false,
        })
    }

    pub fn with_source_prefix(mut self, prefix: Option<&str>) -> Self {
        self.source_prefix = prefix
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_confirm_all(mut self, confirm: bool) -> Self {
        self.confirm_all = confirm;
        self
    }

    fn deletes_everything(&self) -> bool {
        self.source_prefix.is_none() && !self.dry_run
    }

    pub fn validate(&self) -> Result<()> {
        if self.deletes_everything() && !self.confirm_all {
            return Err(Error::validation(
                "purging without a source prefix deletes every document; confirm it explicitly",
            ));
        }
        Ok(())
    }

    pub fn to_payload(&self) -> Value {
        let mut body = json!({ "customer_id": self.customer_id });
        if let Some(prefix) = &self.source_prefix {
            body["source_starts_with"] = json!(prefix);
        }
        if self.dry_run {
            body["dry_run"] = json!(true);
        }
        if self.deletes_everything() {
            body["confirm_all_sources"] = json!(true);
        }
        body
    }
}

/// Number of documents a purge removed, or would remove
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeOutcome {
    pub dry_run: bool,
    pub documents: u64,
}

/// Client for the ingestion endpoints
#[derive(Debug, Clone)]
pub struct IngestClient {
    base: BackendBase,
    fetch: AdminFetch,
    recent: RecentUploads,
}

impl IngestClient {
    pub(crate) fn new(base: BackendBase, fetch: AdminFetch, recent: RecentUploads) -> Self {
        Self {
            base,
            fetch,
            recent,
        }
    }

    /// Whether identical content was uploaded for this customer recently
    pub fn is_recent_duplicate(&self, request: &IngestRequest) -> bool {
        self.recent
            .contains(&request.customer_id, &request.content_hash())
    }

    /// Upload text content; returns the backend's message
    pub async fn ingest(&self, request: &IngestRequest) -> Result<String> {
        let body = self
            .fetch
            .post(self.base.url(&["ingest"])?)
            .json(&request.to_payload())?
            .execute()
            .await?;

        self.recent
            .record(&request.customer_id, &request.content_hash());
        info!(customer_id = %request.customer_id, "content ingested");
        Ok(message_of(&body).unwrap_or_else(|| "saved".to_string()))
    }

    /// Crawl a single page
    pub async fn crawl(&self, request: &CrawlRequest) -> Result<CrawlOutcome> {
        let body = self
            .fetch
            .post(self.base.url(&["crawl"])?)
            .json(&request.to_payload())?
            .execute()
            .await?;

        info!(customer_id = %request.customer_id, url = %request.url, "page crawled");
        Ok(CrawlOutcome {
            message: message_of(&body),
            chunks: count_value(body.get("chunks")),
        })
    }

    /// Crawl a whole site from a start page
    pub async fn crawl_domain(&self, request: &DomainCrawlRequest) -> Result<DomainCrawlStats> {
        debug!(
            start_url = %request.start_url,
            max_pages = request.max_pages,
            max_depth = request.max_depth,
            "starting domain crawl"
        );
        let body = self
            .fetch
            .post(self.base.url(&["crawl-domain"])?)
            .json(&request.to_payload())?
            .execute()
            .await?;

        let stats = DomainCrawlStats::from_body(&body);
        info!(customer_id = %request.customer_id, "domain crawl finished");
        Ok(stats)
    }

    /// Delete stored documents; refuses an unconfirmed purge of everything
    pub async fn purge(&self, request: &PurgeRequest) -> Result<PurgeOutcome> {
        request.validate()?;

        let body = self
            .fetch
            .delete(self.base.url(&["purge"])?)
            .json(&request.to_payload())?
            .execute()
            .await?;

        let key = if request.dry_run { "to_delete" } else { "deleted" };
        let documents = count_value(body.get(key)).unwrap_or(0);
        if !request.dry_run {
            info!(customer_id = %request.customer_id, documents, "documents purged");
        }
        Ok(PurgeOutcome {
            dry_run: request.dry_run,
            documents,
        })
    }
}
