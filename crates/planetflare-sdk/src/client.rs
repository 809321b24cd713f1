/// Drives the provider side of the protocol: fetch tokens, redeem them for a
/// signed future payment, carry that payment forward, and submit it for
/// settlement.
use crate::error::Result;
use crate::http::{HttpClient, HttpConfig};
use crate::info::PublisherInfo;
use crate::payment::FuturePayment;
use crate::redeem::RedeemRequest;
use crate::settlement::{PendingSettlementsResponse, SettleRequest, SettleResponse};
use crate::token::{Token, TokensResponse};

pub struct PublisherClient {
    base_url: String,
    http: HttpClient,
}

impl PublisherClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(base_url, HttpConfig::default())
    }

    pub fn with_config(base_url: &str, config: HttpConfig) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: HttpClient::new(config)?,
        })
    }


    pub async fn info(&self) -> Result<PublisherInfo> {
        self.http.get_json(&format!("{}/info", self.base_url)).await
    }

    pub async fn get_tokens(&self, num: u32) -> Result<Vec<Token>> {
        let url = format!("{}/get_tokens?num={}", self.base_url, num);
        let response: TokensResponse = self.http.get_json(&url).await?;
        Ok(response.tokens)
    }

    pub async fn verify_payment(&self, request: &RedeemRequest) -> Result<FuturePayment> {
        let url = format!("{}/verify_payment", self.base_url);
        self.http.post_json(&url, request).await
    }

    /// Redeem `tokens`, continuing from `prior` when the provider already holds
    /// a payment for this bounty. The returned payment supersedes `prior`.
    pub async fn redeem(
        &self,
        tokens: &[Token],
        bounty_id: &str,
        recipient_address: &str,
        prior: Option<FuturePayment>,
    ) -> Result<FuturePayment> {
        let mut request = RedeemRequest::new(tokens, bounty_id, recipient_address);
        if let Some(payment) = prior {
            request = request.with_future_payment(payment);
        }
        self.verify_payment(&request).await
    }

    pub async fn settle_payment(&self, payment: &FuturePayment) -> Result<SettleResponse> {
        let url = format!("{}/settle_payment", self.base_url);
        let request = SettleRequest {
            future_payment: payment.clone(),
        };
        self.http.post_json(&url, &request).await
    }

    pub async fn pending_settlements(&self) -> Result<Vec<FuturePayment>> {
        let url = format!("{}/settlements/pending", self.base_url);
        let response: PendingSettlementsResponse = self.http.get_json(&url).await?;
        Ok(response.pending)
    }

    /// Take every queued payment off the publisher for settlement
    pub async fn drain_settlements(&self) -> Result<Vec<FuturePayment>> {
        let url = format!("{}/settlements/drain", self.base_url);
        let response: PendingSettlementsResponse =
            self.http.post_json(&url, &serde_json::json!({})).await?;
        Ok(response.pending)
    }
}
