use serde::{Deserialize, Serialize};

use crate::payment::FuturePayment;

/// Body of `POST /settle_payment`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    pub future_payment: FuturePayment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    /// Record accepted as the latest one for its (recipient, bounty) pair
    Queued,
    /// A record with an equal or higher amount is already pending
    AlreadyPending,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    pub status: SettlementStatus,
    pub recipient_address: String,
    #[serde(rename = "bountyID")]
    pub bounty_id: String,
    pub amount: u64,
}

/// Body of `GET /settlements/pending`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingSettlementsResponse {
    pub pending: Vec<FuturePayment>,
}
