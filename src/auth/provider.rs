//! Pluggable sources of admin tokens

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

/// Source of an admin token when none is stored.
///
/// The console asks interactively; tests inject fixed or failing providers.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Produce a token, or `None` if the user gave none
    async fn acquire(&self) -> Option<String>;
}

/// Always answers with the same token
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    token: String,
}

impl StaticCredentials {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn acquire(&self) -> Option<String> {
        Some(self.token.clone())
    }
}

/// Never produces a token
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

#[async_trait]
impl CredentialProvider for NoCredentials {
    async fn acquire(&self) -> Option<String> {
        None
    }
}

/// Hands out queued answers one per call, then nothing
#[derive(Debug, Default)]
pub struct SequenceCredentials {
    answers: Mutex<VecDeque<Option<String>>>,
}

impl SequenceCredentials {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(|a| a.map(Into::into)).collect()),
        }
    }

    /// Answers not yet handed out
    pub fn remaining(&self) -> usize {
        self.answers.lock().map(|a| a.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CredentialProvider for SequenceCredentials {
    async fn acquire(&self) -> Option<String> {
        self.answers.lock().ok()?.pop_front().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_credentials() {
        tokio_test::block_on(async {
            let provider = SequenceCredentials::new([Some("a"), None, Some("b")]);
            assert_eq!(provider.acquire().await.as_deref(), Some("a"));
            assert_eq!(provider.acquire().await, None);
            assert_eq!(provider.remaining(), 1);
            assert_eq!(provider.acquire().await.as_deref(), Some("b"));
            assert_eq!(provider.acquire().await, None);
        });
    }

    #[test]
    fn test_static_and_missing_credentials() {
        tokio_test::block_on(async {
            assert_eq!(StaticCredentials::new("tok").acquire().await.as_deref(), Some("tok"));
            assert_eq!(NoCredentials.acquire().await, None);
        });
    }
}
