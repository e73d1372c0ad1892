//! Chatbot Admin Client Library
//!
//! An admin client for a multi-tenant chatbot backend: customer records,
//! widget branding, document ingestion, crawling, usage statistics and the
//! interaction log.

pub mod answers;
pub mod auth;
pub mod config;
pub mod customers;
pub mod error;
pub mod fallback;
pub mod fetch;
pub mod ingest;
pub mod prefs;
pub mod stats;
pub mod widget;

pub use chatbot_admin_widget as branding;

use std::sync::Arc;

use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::answers::AnswersClient;
use crate::auth::{CredentialProvider, TokenStore};
use crate::config::{scrub_launch_params, BackendBase, ClientOptions, LaunchParams};
use crate::customers::CustomersClient;
use crate::error::Error;
use crate::fetch::AdminFetch;
use crate::ingest::{IngestClient, RecentUploads};
use crate::prefs::PreferenceStore;
use crate::stats::StatsClient;
use crate::widget::WidgetClient;

/// The main entry point for the chatbot admin client
pub struct ChatbotAdmin {
    /// Backend the client talks to
    pub base: BackendBase,
    /// Preference store for the token, backend choice and upload hashes
    pub prefs: Arc<dyn PreferenceStore>,
    /// Authenticated request client shared by all API clients
    pub fetch: AdminFetch,
    /// Client options
    pub options: ClientOptions,
}

impl ChatbotAdmin {
    /// Create a new admin client
    ///
    /// # Arguments
    ///
    /// * `backend` - Backend base URL candidate; invalid or absent values fall
    ///   back to the stored preference, then the built-in default
    /// * `prefs` - Preference store
    /// * `provider` - Asked for an admin token whenever none is stored
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use chatbot_admin::ChatbotAdmin;
    /// use chatbot_admin::auth::StaticCredentials;
    /// use chatbot_admin::prefs::MemoryPreferences;
    ///
    /// let admin = ChatbotAdmin::new(
    ///     Some("https://chatbot.example.com"),
    ///     Arc::new(MemoryPreferences::new()),
    ///     Arc::new(StaticCredentials::new("admin-token")),
    /// )
    /// .unwrap();
    /// assert_eq!(admin.base.as_str(), "https://chatbot.example.com");
    /// ```
    pub fn new(
        backend: Option<&str>,
        prefs: Arc<dyn PreferenceStore>,
        provider: Arc<dyn CredentialProvider>,
    ) -> Result<Self, Error> {
        Self::new_with_options(backend, prefs, provider, ClientOptions::default())
    }

    /// Create a new admin client with custom options
    pub fn new_with_options(
        backend: Option<&str>,
        prefs: Arc<dyn PreferenceStore>,
        provider: Arc<dyn CredentialProvider>,
        options: ClientOptions,
    ) -> Result<Self, Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        let base = BackendBase::resolve(backend, prefs.as_ref());
        debug!(base = %base, "using backend");

        let tokens = TokenStore::new(prefs.clone());
        let fetch = AdminFetch::new(http_client, tokens, provider, &options);

        Ok(Self {
            base,
            prefs,
            fetch,
            options,
        })
    }

    /// Create a client from a launch link.
    ///
    /// The link may carry a backend (`backend_base`, `api_base` or
    /// `backend`) and an `admin_token`. A token found there is stored.
    /// Returns the client and the link with those parameters removed.
    pub fn from_launch_link(
        link: &Url,
        prefs: Arc<dyn PreferenceStore>,
        provider: Arc<dyn CredentialProvider>,
        options: ClientOptions,
    ) -> Result<(Self, Url), Error> {
        let params = LaunchParams::from_url(link);
        let admin = Self::new_with_options(params.backend_base.as_deref(), prefs, provider, options)?;
        if let Some(token) = &params.admin_token {
            admin.tokens().set(token);
        }
        Ok((admin, scrub_launch_params(link)))
    }

    /// Get the admin token store
    pub fn tokens(&self) -> &TokenStore {
        self.fetch.tokens()
    }

    /// Get a client for customer management
    pub fn customers(&self) -> CustomersClient {
        CustomersClient::new(self.base.clone(), self.fetch.clone())
    }

    /// Get a client for widget customization
    pub fn widget(&self) -> WidgetClient {
        WidgetClient::new(
            self.base.clone(),
            self.fetch.clone(),
            self.customers(),
            &self.options.widget_script_url,
        )
    }

    /// Get a client for usage statistics
    pub fn stats(&self) -> StatsClient {
        StatsClient::new(self.base.clone(), self.fetch.clone())
    }

    /// Get a client for the interaction log
    pub fn answers(&self) -> AnswersClient {
        AnswersClient::new(self.base.clone(), self.fetch.clone())
    }

    /// Get a client for ingestion, crawling and purging
    pub fn ingest(&self) -> IngestClient {
        IngestClient::new(
            self.base.clone(),
            self.fetch.clone(),
            RecentUploads::new(self.prefs.clone()),
        )
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::auth::{CredentialProvider, NoCredentials, StaticCredentials};
    pub use crate::config::ClientOptions;
    pub use crate::customers::{Customer, CustomerDirectory, CustomerDraft};
    pub use crate::error::Error;
    pub use crate::prefs::{FilePreferences, MemoryPreferences, PreferenceStore};
    pub use crate::ChatbotAdmin;
    pub use chatbot_admin_widget::WidgetSettings;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoCredentials;
    use crate::config::BACKEND_BASE_KEY;
    use crate::prefs::MemoryPreferences;

    #[test]
    fn test_from_launch_link_stores_token_and_scrubs_link() {
        let prefs: Arc<dyn PreferenceStore> = Arc::new(MemoryPreferences::new());
        let link = Url::parse(
            "https://admin.example.com/?backend=https://api.example.com/&admin_token=tok&tab=widget",
        )
        .unwrap();

        let (admin, scrubbed) = ChatbotAdmin::from_launch_link(
            &link,
            prefs.clone(),
            Arc::new(NoCredentials),
            ClientOptions::default(),
        )
        .unwrap();

        assert_eq!(admin.base.as_str(), "https://api.example.com");
        assert_eq!(admin.tokens().get().as_deref(), Some("tok"));
        assert_eq!(scrubbed.as_str(), "https://admin.example.com/?tab=widget");
        assert_eq!(
            prefs.get(BACKEND_BASE_KEY).as_deref(),
            Some("https://api.example.com")
        );
    }

    #[test]
    fn test_widget_snippet_uses_backend_and_script() {
        let admin = ChatbotAdmin::new_with_options(
            Some("https://api.example.com"),
            Arc::new(MemoryPreferences::new()),
            Arc::new(NoCredentials),
            ClientOptions::default().with_widget_script_url("https://cdn.example.com/w.js"),
        )
        .unwrap();

        let snippet = admin.widget().widget_snippet(" wk_123 ").unwrap();
        assert!(snippet.contains("window.CHATBOT_WIDGET_KEY = \"wk_123\";"));
        assert!(snippet.contains("window.CHATBOT_API_BASE = \"https://api.example.com\";"));
        assert!(snippet.contains("<script src=\"https://cdn.example.com/w.js\" defer></script>"));
        assert_eq!(admin.widget().widget_snippet("  "), None);
    }
}
