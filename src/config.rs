//! Configuration for the chatbot admin client
//!
//! Resolves which backend to talk to and carries client-wide options.

use std::fmt;
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::prefs::PreferenceStore;

/// Backend used when nothing else is configured
pub const DEFAULT_BACKEND_BASE: &str = "https://chatbot-backend-iqma.onrender.com";

/// Preference key the resolved backend base is persisted under
pub const BACKEND_BASE_KEY: &str = "admin_ui_backend_base";

/// Launch-link parameters naming the backend, in priority order
pub const BACKEND_BASE_PARAMS: [&str; 3] = ["backend_base", "api_base", "backend"];

/// Launch-link parameter carrying an admin token
pub const ADMIN_TOKEN_PARAM: &str = "admin_token";

/// Script the embeddable widget snippet loads
pub const DEFAULT_WIDGET_SCRIPT_URL: &str =
    "https://dominikzeiner07-cell.github.io/chatbot-widget/widget.js";

/// Trim and strip trailing slashes
pub fn normalize_base_url(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

/// Parse an absolute `http`/`https` URL
pub fn parse_http_url(value: &str) -> Option<Url> {
    let url = Url::parse(value).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}

/// The backend's base address, without a trailing slash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendBase {
    base: String,
}

impl BackendBase {
    /// Validate a candidate base URL
    pub fn parse(value: &str) -> Result<Self, Error> {
        let base = normalize_base_url(value);
        if base.is_empty() || parse_http_url(&base).is_none() {
            return Err(Error::validation(format!(
                "backend base must be an absolute http(s) URL, got {:?}",
                value
            )));
        }
        Ok(Self { base })
    }

    /// Resolve the backend base: launch parameter, then stored preference,
    /// then the built-in default.
    ///
    /// Invalid candidates are skipped silently. A launch parameter that is
    /// accepted is persisted for later runs.
    pub fn resolve(param: Option<&str>, prefs: &dyn PreferenceStore) -> Self {
        if let Some(base) = param.and_then(|p| Self::parse(p).ok()) {
            debug!(base = %base, "backend base from launch parameter");
            prefs.set(BACKEND_BASE_KEY, base.as_str());
            return base;
        }

        if let Some(base) = prefs
            .get(BACKEND_BASE_KEY)
            .and_then(|stored| Self::parse(&stored).ok())
        {
            debug!(base = %base, "backend base from stored preference");
            return base;
        }

        Self {
            base: normalize_base_url(DEFAULT_BACKEND_BASE),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.base
    }

    /// Build an endpoint URL from path segments.
    ///
    /// Each segment is percent-encoded on its own, so ids containing `/` or
    /// `?` stay inside their segment.
    pub fn url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = Url::parse(&self.base)?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| Error::general(format!("{} cannot be a base URL", self.base)))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }
}

impl Default for BackendBase {
    fn default() -> Self {
        Self {
            base: normalize_base_url(DEFAULT_BACKEND_BASE),
        }
    }
}

impl fmt::Display for BackendBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base)
    }
}

/// Settings carried in on a launch link
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchParams {
    /// First non-empty backend parameter, unvalidated
    pub backend_base: Option<String>,
    /// Trimmed admin token, if one was given
    pub admin_token: Option<String>,
}

impl LaunchParams {
    /// Extract launch parameters from a link's query string
    pub fn from_url(link: &Url) -> Self {
        let lookup = |name: &str| {
            link.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            backend_base: BACKEND_BASE_PARAMS.iter().find_map(|name| lookup(*name)),
            admin_token: lookup(ADMIN_TOKEN_PARAM),
        }
    }
}

/// Remove launch parameters from a link, keeping everything else
pub fn scrub_launch_params(link: &Url) -> Url {
    let is_launch_param =
        |k: &str| k == ADMIN_TOKEN_PARAM || BACKEND_BASE_PARAMS.contains(&k);

    let kept: Vec<(String, String)> = link
        .query_pairs()
        .filter(|(k, _)| !is_launch_param(&**k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut scrubbed = link.clone();
    if kept.is_empty() {
        scrubbed.set_query(None);
    } else {
        scrubbed.query_pairs_mut().clear().extend_pairs(kept);
    }
    scrubbed
}

/// Configuration options for the admin client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout; `None` leaves the transport default in place
    pub request_timeout: Option<Duration>,

    /// Script URL used in the embeddable widget snippet
    pub widget_script_url: String,

    /// Value of the `X-Client-Info` header
    pub client_info: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: None,
            widget_script_url: DEFAULT_WIDGET_SCRIPT_URL.to_string(),
            client_info: format!("chatbot-admin/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientOptions {
    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the widget script URL
    pub fn with_widget_script_url(mut self, value: &str) -> Self {
        self.widget_script_url = value.to_string();
        self
    }

    /// Set the client info header value
    pub fn with_client_info(mut self, value: &str) -> Self {
        self.client_info = value.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::MemoryPreferences;

    #[test]
    fn test_resolve_prefers_launch_parameter_and_persists_it() {
        let prefs = MemoryPreferences::new();
        prefs.set(BACKEND_BASE_KEY, "https://stored.example.com");

        let base = BackendBase::resolve(Some(" https://param.example.com/// "), &prefs);
        assert_eq!(base.as_str(), "https://param.example.com");
        assert_eq!(
            prefs.get(BACKEND_BASE_KEY).as_deref(),
            Some("https://param.example.com")
        );
    }

    #[test]
    fn test_resolve_falls_through_invalid_candidates() {
        let prefs = MemoryPreferences::new();
        prefs.set(BACKEND_BASE_KEY, "https://stored.example.com/");

        let base = BackendBase::resolve(Some("ftp://nope.example.com"), &prefs);
        assert_eq!(base.as_str(), "https://stored.example.com");

        prefs.set(BACKEND_BASE_KEY, "not a url");
        let base = BackendBase::resolve(None, &prefs);
        assert_eq!(base.as_str(), DEFAULT_BACKEND_BASE);
    }

    #[test]
    fn test_url_encodes_segments() {
        let base = BackendBase::parse("http://localhost:5051/api/").unwrap();
        let url = base.url(&["admin", "customers", "a/b c"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5051/api/admin/customers/a%2Fb%20c");
    }

    #[test]
    fn test_launch_params_and_scrub() {
        let link = Url::parse(
            "https://admin.example.com/?tab=stats&api_base=https://b.example.com&backend=&admin_token=%20tok%20",
        )
        .unwrap();

        let params = LaunchParams::from_url(&link);
        assert_eq!(params.backend_base.as_deref(), Some("https://b.example.com"));
        assert_eq!(params.admin_token.as_deref(), Some("tok"));

        let scrubbed = scrub_launch_params(&link);
        assert_eq!(scrubbed.as_str(), "https://admin.example.com/?tab=stats");
    }

    #[test]
    fn test_scrub_without_other_params_drops_query() {
        let link = Url::parse("https://admin.example.com/console?backend_base=x").unwrap();
        assert_eq!(
            scrub_launch_params(&link).as_str(),
            "https://admin.example.com/console"
        );
    }
}
