//! Admin token storage and acquisition

mod provider;

use std::sync::Arc;

use tracing::debug;

use crate::prefs::PreferenceStore;

pub use provider::*;

/// Preference key the admin token is persisted under
pub const ADMIN_TOKEN_KEY: &str = "admin_ui_token";

/// Holds the opaque admin token, persisted in the preference store
#[derive(Clone)]
pub struct TokenStore {
    prefs: Arc<dyn PreferenceStore>,
}

impl TokenStore {
    pub fn new(prefs: Arc<dyn PreferenceStore>) -> Self {
        Self { prefs }
    }

    /// The stored token, if any; blank values count as absent
    pub fn get(&self) -> Option<String> {
        self.prefs
            .get(ADMIN_TOKEN_KEY)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    /// Store a token; blank tokens are ignored
    pub fn set(&self, token: &str) -> bool {
        let token = token.trim();
        if token.is_empty() {
            return false;
        }
        self.prefs.set(ADMIN_TOKEN_KEY, token);
        true
    }

    pub fn clear(&self) {
        self.prefs.remove(ADMIN_TOKEN_KEY);
    }

    /// Return the stored token, or ask the provider for one.
    ///
    /// A non-blank answer from the provider is stored before it is returned.
    pub async fn ensure(&self, provider: &dyn CredentialProvider) -> Option<String> {
        if let Some(token) = self.get() {
            return Some(token);
        }

        debug!("no stored admin token, asking credential provider");
        let token = provider.acquire().await?;
        let token = token.trim();
        if self.set(token) {
            Some(token.to_string())
        } else {
            None
        }
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("has_token", &self.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::MemoryPreferences;

    fn store() -> TokenStore {
        TokenStore::new(Arc::new(MemoryPreferences::new()))
    }

    #[tokio::test]
    async fn test_ensure_uses_stored_token_first() {
        let tokens = store();
        tokens.set("  stored  ");
        let provider = StaticCredentials::new("from-provider");
        assert_eq!(tokens.ensure(&provider).await.as_deref(), Some("stored"));
    }

    #[tokio::test]
    async fn test_ensure_persists_acquired_token() {
        let tokens = store();
        let provider = StaticCredentials::new(" fresh ");
        assert_eq!(tokens.ensure(&provider).await.as_deref(), Some("fresh"));
        assert_eq!(tokens.get().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_ensure_with_blank_answer_yields_nothing() {
        let tokens = store();
        assert_eq!(tokens.ensure(&StaticCredentials::new("   ")).await, None);
        assert_eq!(tokens.ensure(&NoCredentials).await, None);
        assert_eq!(tokens.get(), None);
    }

    #[test]
    fn test_clear() {
        let tokens = store();
        assert!(tokens.set("t"));
        assert!(!tokens.set(" "));
        tokens.clear();
        assert_eq!(tokens.get(), None);
    }
}
