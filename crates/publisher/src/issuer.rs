use planetflare_sdk::Token;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::error::{PublisherError, Result};
use crate::token_store::TokenStore;

/// Mints batches of fresh tokens for clients
pub struct TokenIssuer {
    store: Arc<dyn TokenStore>,
    max_batch: u32,
}

impl TokenIssuer {
    pub fn new(store: Arc<dyn TokenStore>, max_batch: u32) -> Self {
        Self { store, max_batch }
    }

    /// Largest `count` accepted by [`TokenIssuer::issue`]
    pub fn max_batch(&self) -> u32 {
        self.max_batch
    }

    /// Generate `count` distinct tokens and record them as outstanding.
    /// Tokens are only returned once the store has accepted them, so a
    /// client never holds a token the publisher has no record of.
    pub fn issue(&self, count: u32) -> Result<Vec<Token>> {
        if count == 0 {
            return Err(PublisherError::InvalidRequest(
                "num must be a positive integer".into(),
            ));
        }
        if count > self.max_batch {
            return Err(PublisherError::InvalidRequest(format!(
                "num must be at most {}",
                self.max_batch
            )));
        }

        let mut seen = HashSet::with_capacity(count as usize);
        let mut tokens = Vec::with_capacity(count as usize);
        while tokens.len() < count as usize {
            let token = Token::random();
            if seen.insert(token) {
                tokens.push(token);
            }
        }

        self.store.insert(&tokens)?;
        info!("Issued {} tokens", tokens.len());
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_store::MemoryTokenStore;

    fn issuer() -> (TokenIssuer, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::new());
        (TokenIssuer::new(store.clone(), 100), store)
    }

    #[test]
    fn test_issue_stores_distinct_tokens() {
        let (issuer, store) = issuer();
        let tokens = issuer.issue(3).unwrap();
        assert_eq!(tokens.len(), 3);

        let distinct: HashSet<_> = tokens.iter().collect();
        assert_eq!(distinct.len(), 3);
        assert!(tokens.iter().all(|t| store.contains(t)));
        assert!(tokens
            .iter()
            .all(|t| t.to_string().parse::<Token>().unwrap() == *t));
    }

    #[test]
    fn test_batches_accumulate() {
        let (issuer, store) = issuer();
        issuer.issue(10).unwrap();
        issuer.issue(100).unwrap();
        assert_eq!(store.len(), 110);
    }

    #[test]
    fn test_count_bounds() {
        let (issuer, store) = issuer();
        assert!(matches!(
            issuer.issue(0),
            Err(PublisherError::InvalidRequest(_))
        ));
        assert!(matches!(
            issuer.issue(101),
            Err(PublisherError::InvalidRequest(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_failed_store_returns_no_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(crate::token_store::FileTokenStore::load(
            dir.path().join("missing").join("tokens.dat"),
        ));
        let issuer = TokenIssuer::new(store.clone(), 10);
        assert!(matches!(
            issuer.issue(5),
            Err(PublisherError::Storage(_))
        ));
        assert!(store.is_empty());
    }
}
