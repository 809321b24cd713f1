#![allow(dead_code)]

use publisher::config::PublisherConfig;
use publisher::ledger::PaymentSigner;
use publisher::server::AppState;
use publisher::token_store::{MemoryTokenStore, TokenStore};
use std::sync::{Arc, OnceLock};

/// RSA key generation is slow in debug builds, so tests share one small key
pub fn test_signer() -> Arc<PaymentSigner> {
    static SIGNER: OnceLock<Arc<PaymentSigner>> = OnceLock::new();
    SIGNER
        .get_or_init(|| Arc::new(PaymentSigner::ephemeral(1024).expect("test key generation")))
        .clone()
}

pub fn test_config() -> PublisherConfig {
    PublisherConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        token_store_path: None,
        max_tokens_per_request: 100,
        ..PublisherConfig::default()
    }
}

pub fn test_state() -> Arc<AppState> {
    test_state_with_store(Arc::new(MemoryTokenStore::new()))
}

pub fn test_state_with_store(store: Arc<dyn TokenStore>) -> Arc<AppState> {
    Arc::new(AppState::with_parts(test_config(), store, test_signer()))
}
