/// Stateless future-payment protocol. Nothing is stored server-side: every
/// record the publisher hands out is signed, and a record is only trusted
/// again after its signature checks out.
/// The RSA key lives on disk so records issued before a restart stay valid.
use planetflare_sdk::payment::{normalize_recipient_address, payment_message, validate_bounty_id};
use planetflare_sdk::FuturePayment;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::signature::{SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::PublisherConfig;
use crate::error::{PublisherError, Result};

pub struct PaymentSigner {
    signing_key: SigningKey<Sha256>,
    public_key: RsaPublicKey,
}

impl PaymentSigner {
    /// Key configured for this publisher, see [`PaymentSigner::open`]
    pub fn from_config(config: &PublisherConfig) -> Result<Self> {
        Self::open(&config.signing_key_path, config.rsa_key_bits)
    }

    /// Load the PKCS#8 DER key at `key_path`, or generate and write one if the
    /// file does not exist. An unreadable key is an error and is never
    /// replaced: every payment signed with it would stop verifying.
    pub fn open(key_path: &Path, key_bits: usize) -> Result<Self> {
        if key_path.exists() {
            let der = std::fs::read(key_path).map_err(|e| {
                PublisherError::Crypto(format!("Cannot read {}: {}", key_path.display(), e))
            })?;
            let private_key = RsaPrivateKey::from_pkcs8_der(&der).map_err(|e| {
                PublisherError::Crypto(format!("Cannot parse {}: {}", key_path.display(), e))
            })?;
            let signer = Self::from(private_key);
            info!("Using signing key {} from {}", signer.fingerprint(), key_path.display());
            return Ok(signer);
        }

        let private_key = generate_key(key_bits)?;
        let der = private_key
            .to_pkcs8_der()
            .map_err(|e| PublisherError::Crypto(format!("Cannot encode signing key: {}", e)))?;
        std::fs::write(key_path, der.as_bytes()).map_err(|e| {
            PublisherError::Crypto(format!("Cannot write {}: {}", key_path.display(), e))
        })?;

        let signer = Self::from(private_key);
        info!("Created signing key {} at {}", signer.fingerprint(), key_path.display());
        Ok(signer)
    }

    /// Throwaway key that lives only as long as the process
    pub fn ephemeral(key_bits: usize) -> Result<Self> {
        generate_key(key_bits).map(Self::from)
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Short identifier for logs: first 8 bytes of SHA-256(N)
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.public_key.n().to_bytes_be());
        hex::encode(&digest[..8])
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.signing_key
            .try_sign(message)
            .map(|signature| signature.to_vec())
            .map_err(|e| PublisherError::Crypto(format!("Failed to sign: {}", e)))
    }
}

impl From<RsaPrivateKey> for PaymentSigner {
    fn from(private_key: RsaPrivateKey) -> Self {
        Self {
            public_key: private_key.to_public_key(),
            signing_key: SigningKey::new(private_key),
        }
    }
}

fn generate_key(key_bits: usize) -> Result<RsaPrivateKey> {
    debug!(key_bits, "generating RSA signing key");
    RsaPrivateKey::new(&mut rand::thread_rng(), key_bits)
        .map_err(|e| PublisherError::Crypto(format!("Failed to generate RSA key: {}", e)))
}

pub struct FuturePaymentLedger {
    signer: Arc<PaymentSigner>,
}

impl FuturePaymentLedger {
    pub fn new(signer: Arc<PaymentSigner>) -> Self {
        Self { signer }
    }

    pub fn signer(&self) -> &PaymentSigner {
        &self.signer
    }

    /// Start a zero-amount payment for a (recipient, bounty) pair
    pub fn create(&self, recipient_address: &str, bounty_id: &str) -> Result<FuturePayment> {
        let recipient_address = normalize_recipient_address(recipient_address)?;
        validate_bounty_id(bounty_id)?;

        let payment = self.seal(recipient_address, bounty_id.to_string(), 0)?;
        debug!(
            recipient = %payment.recipient_address,
            bounty = %payment.bounty_id,
            "created future payment"
        );
        Ok(payment)
    }

    pub fn verify(&self, payment: &FuturePayment) -> bool {
        payment.verify_with(self.signer.public_key())
    }

    /// Return a new payment worth `delta` more than `payment`. The input is
    /// left untouched and must be treated as superseded by the caller.
    pub fn increment(&self, payment: &FuturePayment, delta: u64) -> Result<FuturePayment> {
        if !self.verify(payment) {
            return Err(PublisherError::Integrity(
                "refusing to increment an unverified future payment".into(),
            ));
        }

        let amount = payment.amount.checked_add(delta).ok_or_else(|| {
            PublisherError::InvalidRequest("future payment amount overflow".into())
        })?;

        self.seal(
            payment.recipient_address.clone(),
            payment.bounty_id.clone(),
            amount,
        )
    }

    fn seal(&self, recipient_address: String, bounty_id: String, amount: u64) -> Result<FuturePayment> {
        let signature = self
            .signer
            .sign(&payment_message(&recipient_address, &bounty_id, amount))?;
        Ok(FuturePayment {
            recipient_address,
            bounty_id,
            amount,
            authenticator: hex::encode(signature),
        })
    }
}
