/// Provider presents tokens collected from clients, plus the latest future
/// payment it holds for the bounty (if any), and receives the updated payment.
use serde::{Deserialize, Serialize};

use crate::payment::FuturePayment;
use crate::token::Token;

/// Body of `POST /verify_payment`. Every field is optional on the wire so the
/// publisher can report exactly which one is missing.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemRequest {
    pub tokens: Option<Vec<String>>,
    #[serde(rename = "bountyID")]
    pub bounty_id: Option<String>,
    pub recipient_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub future_payment: Option<FuturePayment>,
}

impl RedeemRequest {
    pub fn new(tokens: &[Token], bounty_id: &str, recipient_address: &str) -> Self {
        Self {
            tokens: Some(tokens.iter().map(Token::to_hex).collect()),
            bounty_id: Some(bounty_id.to_string()),
            recipient_address: Some(recipient_address.to_string()),
            future_payment: None,
        }
    }

    /// Continue accumulating on top of a previously returned payment
    pub fn with_future_payment(mut self, payment: FuturePayment) -> Self {
        self.future_payment = Some(payment);
        self
    }
}
