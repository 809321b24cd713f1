use planetflare_sdk::Token;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{PublisherError, Result};
use crate::token_store::TokenStore;

/// Consumes presented tokens and reports how many were still outstanding
pub struct RedemptionService {
    store: Arc<dyn TokenStore>,
}

impl RedemptionService {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Malformed, unknown and already redeemed tokens count 0, so a caller
    /// can safely retry a batch whose response it never received.
    pub fn redeem(&self, tokens: &[String]) -> Result<usize> {
        if tokens.is_empty() {
            return Err(PublisherError::InvalidRequest("No tokens provided".into()));
        }

        let parsed: Vec<Token> = tokens
            .iter()
            .filter_map(|raw| match raw.parse::<Token>() {
                Ok(token) => Some(token),
                Err(e) => {
                    debug!(token = %raw, error = %e, "ignoring malformed token");
                    None
                }
            })
            .collect();

        let redeemed = self.store.delete_if_present(&parsed)?;
        info!(
            presented = tokens.len(),
            redeemed, "Redeemed tokens"
        );
        Ok(redeemed)
    }
}
