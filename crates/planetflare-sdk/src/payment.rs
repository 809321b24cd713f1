/// Future payments are caller-held records of how many tokens a provider has
/// redeemed against a bounty. The publisher signs every version it hands out;
/// the provider keeps the latest one and presents it on the next redemption or
/// at settlement. Anyone with the publisher's public key can check a record.
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Result, SdkError};

/// Domain tag prefixed to every signed payment message
pub const FUTURE_PAYMENT_DOMAIN: &[u8] = b"planetflare_future_payment_v1:";

/// Longest hex body accepted after the `0x` prefix (a 20-byte EVM address)
pub const MAX_ADDRESS_HEX_DIGITS: usize = 40;

pub const MAX_BOUNTY_ID_LEN: usize = 128;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuturePayment {
    /// Chain address that will receive the payment (lowercase, `0x` prefixed)
    pub recipient_address: String,
    /// Bounty this payment is drawn from
    #[serde(rename = "bountyID")]
    pub bounty_id: String,
    /// Number of tokens redeemed so far
    pub amount: u64,
    /// Publisher signature over the other fields (hex)
    pub authenticator: String,
}

impl FuturePayment {
    /// Canonical bytes covered by the authenticator
    pub fn signing_message(&self) -> Vec<u8> {
        payment_message(&self.recipient_address, &self.bounty_id, self.amount)
    }

    pub fn authenticator_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(&self.authenticator)
            .map_err(|e| SdkError::InvalidInput(format!("authenticator is not valid hex: {}", e)))
    }

    /// Check the authenticator against a publisher public key.
    /// Any decoding problem counts as a failed verification.
    pub fn verify_with(&self, publisher_key: &RsaPublicKey) -> bool {
        let Ok(sig_bytes) = self.authenticator_bytes() else {
            return false;
        };
        let Ok(signature) = Signature::try_from(sig_bytes.as_slice()) else {
            return false;
        };
        let verifying_key = VerifyingKey::<Sha256>::new(publisher_key.clone());
        verifying_key
            .verify(&self.signing_message(), &signature)
            .is_ok()
    }
}

/// Length-prefixed, domain-separated encoding of the signed fields
pub fn payment_message(recipient_address: &str, bounty_id: &str, amount: u64) -> Vec<u8> {
    let mut message = Vec::with_capacity(
        FUTURE_PAYMENT_DOMAIN.len() + 16 + recipient_address.len() + bounty_id.len(),
    );
    message.extend_from_slice(FUTURE_PAYMENT_DOMAIN);
    message.extend_from_slice(&(recipient_address.len() as u32).to_le_bytes());
    message.extend_from_slice(recipient_address.as_bytes());
    message.extend_from_slice(&(bounty_id.len() as u32).to_le_bytes());
    message.extend_from_slice(bounty_id.as_bytes());
    message.extend_from_slice(&amount.to_le_bytes());
    message
}

/// Validate a recipient address and return its canonical (lowercase) form
pub fn normalize_recipient_address(raw: &str) -> Result<String> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| SdkError::InvalidInput("recipient address must start with 0x".into()))?;

    if digits.is_empty() || digits.len() > MAX_ADDRESS_HEX_DIGITS {
        return Err(SdkError::InvalidInput(format!(
            "recipient address must have 1 to {} hex digits",
            MAX_ADDRESS_HEX_DIGITS
        )));
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SdkError::InvalidInput(
            "recipient address contains non-hex characters".into(),
        ));
    }

    Ok(format!("0x{}", digits.to_ascii_lowercase()))
}

pub fn validate_bounty_id(raw: &str) -> Result<()> {
    if raw.is_empty() || raw.len() > MAX_BOUNTY_ID_LEN {
        return Err(SdkError::InvalidInput(format!(
            "bounty ID must be 1 to {} characters",
            MAX_BOUNTY_ID_LEN
        )));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':');
    if !raw.chars().all(allowed) {
        return Err(SdkError::InvalidInput(
            "bounty ID may only contain letters, digits, '_', '-', '.' and ':'".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_binds_every_field() {
        let base = payment_message("0xabc", "b1", 2);
        assert_ne!(base, payment_message("0xabd", "b1", 2));
        assert_ne!(base, payment_message("0xabc", "b2", 2));
        assert_ne!(base, payment_message("0xabc", "b1", 3));
        assert_eq!(base, payment_message("0xabc", "b1", 2));
    }

    #[test]
    fn test_message_is_length_prefixed() {
        // Moving a character between fields must change the message
        assert_ne!(
            payment_message("0xab", "cb1", 0),
            payment_message("0xabc", "b1", 0)
        );
    }

    #[test]
    fn test_recipient_address_validation() {
        assert_eq!(normalize_recipient_address("0xabc").unwrap(), "0xabc");
        assert_eq!(normalize_recipient_address("0XABC").unwrap(), "0xabc");
        assert_eq!(
            normalize_recipient_address("0x52908400098527886E0F7030069857D2E4169EE7").unwrap(),
            "0x52908400098527886e0f7030069857d2e4169ee7"
        );

        assert!(normalize_recipient_address("").is_err());
        assert!(normalize_recipient_address("0x").is_err());
        assert!(normalize_recipient_address("abc").is_err());
        assert!(normalize_recipient_address("0xxyz").is_err());
        assert!(normalize_recipient_address(&format!("0x{}", "a".repeat(41))).is_err());
    }

    #[test]
    fn test_bounty_id_validation() {
        assert!(validate_bounty_id("b1").is_ok());
        assert!(validate_bounty_id("bucket-1:v2.0_a").is_ok());

        assert!(validate_bounty_id("").is_err());
        assert!(validate_bounty_id("has space").is_err());
        assert!(validate_bounty_id(&"b".repeat(MAX_BOUNTY_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_wire_field_names() {
        let payment = FuturePayment {
            recipient_address: "0xabc".into(),
            bounty_id: "b1".into(),
            amount: 2,
            authenticator: "00".into(),
        };
        let value: serde_json::Value = serde_json::to_value(&payment).unwrap();
        assert_eq!(value["recipientAddress"], "0xabc");
        assert_eq!(value["bountyID"], "b1");
        assert_eq!(value["amount"], 2);
        assert_eq!(value["authenticator"], "00");

        let restored: FuturePayment = serde_json::from_value(value).unwrap();
        assert_eq!(restored, payment);
    }

    #[test]
    fn test_garbage_authenticator_fails_verification() {
        use rsa::RsaPrivateKey;

        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let payment = FuturePayment {
            recipient_address: "0xabc".into(),
            bounty_id: "b1".into(),
            amount: 0,
            authenticator: "not hex".into(),
        };
        assert!(!payment.verify_with(&public_key));

        let payment = FuturePayment {
            authenticator: "00".repeat(128),
            ..payment
        };
        assert!(!payment.verify_with(&public_key));
    }
}
