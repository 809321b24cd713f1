use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SdkError};

/// Body of `GET /info`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublisherInfo {
    /// RSA public key N component (hex)
    pub pub_key_n: String,
    /// RSA public key E component (hex)
    pub pub_key_e: String,
    /// Largest batch accepted by `/get_tokens`
    pub max_tokens_per_request: u32,
    pub version: String,
}

impl PublisherInfo {
    /// Rebuild the key that signs future payments, for offline verification
    pub fn public_key(&self) -> Result<RsaPublicKey> {
        let n = hex::decode(&self.pub_key_n)
            .map_err(|e| SdkError::Crypto(format!("Invalid key modulus: {}", e)))?;
        let e = hex::decode(&self.pub_key_e)
            .map_err(|e| SdkError::Crypto(format!("Invalid key exponent: {}", e)))?;
        RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
            .map_err(|e| SdkError::Crypto(format!("Invalid publisher key: {}", e)))
    }
}
