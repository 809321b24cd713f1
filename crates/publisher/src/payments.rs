/// Provider-facing flow: present tokens (plus the latest future payment, if
/// any), get back a payment that includes the newly redeemed tokens.
/// Checks run in a fixed order: inputs, then the presented payment, and only
/// then are tokens consumed. A forged payment therefore never burns tokens.
use planetflare_sdk::payment::{normalize_recipient_address, validate_bounty_id};
use planetflare_sdk::{FuturePayment, RedeemRequest, SettleResponse};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{PublisherError, Result};
use crate::ledger::FuturePaymentLedger;
use crate::redemption::RedemptionService;
use crate::settlement::ChainAdapter;

pub struct PaymentService {
    redemption: Arc<RedemptionService>,
    ledger: Arc<FuturePaymentLedger>,
    chain: Arc<dyn ChainAdapter>,
}

impl PaymentService {
    pub fn new(
        redemption: Arc<RedemptionService>,
        ledger: Arc<FuturePaymentLedger>,
        chain: Arc<dyn ChainAdapter>,
    ) -> Self {
        Self {
            redemption,
            ledger,
            chain,
        }
    }

    pub fn redeem(&self, request: RedeemRequest) -> Result<FuturePayment> {
        // 1. Validate inputs
        let tokens = request
            .tokens
            .filter(|tokens| !tokens.is_empty())
            .ok_or_else(|| PublisherError::InvalidRequest("No tokens provided".into()))?;
        let recipient_address = request
            .recipient_address
            .ok_or_else(|| PublisherError::InvalidRequest("No recipient address".into()))?;
        let recipient_address = normalize_recipient_address(&recipient_address)?;
        let bounty_id = request
            .bounty_id
            .ok_or_else(|| PublisherError::InvalidRequest("No bounty ID".into()))?;
        validate_bounty_id(&bounty_id)?;

        // 2. Establish the base payment
        let base = match request.future_payment {
            Some(prior) => {
                if !self.ledger.verify(&prior) {
                    warn!(
                        recipient = %prior.recipient_address,
                        bounty = %prior.bounty_id,
                        "Rejected unverifiable future payment"
                    );
                    return Err(PublisherError::Authentication);
                }
                if prior.recipient_address != recipient_address || prior.bounty_id != bounty_id {
                    return Err(PublisherError::InvalidRequest(
                        "Future payment does not match recipient address and bounty ID".into(),
                    ));
                }
                prior
            }
            None => self.ledger.create(&recipient_address, &bounty_id)?,
        };

        // Redeeming can add at most one unit per presented token
        if base.amount.checked_add(tokens.len() as u64).is_none() {
            return Err(PublisherError::InvalidRequest(
                "future payment amount would overflow".into(),
            ));
        }

        // 3. Consume tokens
        let redeemed = self.redemption.redeem(&tokens)?;

        // 4. Extend the payment by what was actually consumed
        let updated = self.ledger.increment(&base, redeemed as u64)?;
        info!(
            recipient = %updated.recipient_address,
            bounty = %updated.bounty_id,
            redeemed,
            amount = updated.amount,
            "Future payment updated"
        );
        Ok(updated)
    }

    /// Pass a verified payment on for on-chain settlement
    pub async fn settle(&self, payment: FuturePayment) -> Result<SettleResponse> {
        if !self.ledger.verify(&payment) {
            warn!(
                recipient = %payment.recipient_address,
                bounty = %payment.bounty_id,
                "Refusing to settle unverifiable future payment"
            );
            return Err(PublisherError::Authentication);
        }

        let status = self.chain.settle_payment(&payment).await?;
        Ok(SettleResponse {
            success: true,
            status,
            recipient_address: payment.recipient_address,
            bounty_id: payment.bounty_id,
            amount: payment.amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::TokenIssuer;
    use crate::ledger::PaymentSigner;
    use crate::settlement::SettlementQueue;
    use crate::token_store::{MemoryTokenStore, TokenStore};
    use planetflare_sdk::{SettlementStatus, Token};

    struct Fixture {
        store: Arc<MemoryTokenStore>,
        signer: Arc<PaymentSigner>,
        issuer: TokenIssuer,
        service: PaymentService,
        queue: Arc<SettlementQueue>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryTokenStore::new());
        let signer = Arc::new(PaymentSigner::ephemeral(1024).unwrap());
        let queue = Arc::new(SettlementQueue::new());
        let service = PaymentService::new(
            Arc::new(RedemptionService::new(store.clone())),
            Arc::new(FuturePaymentLedger::new(signer.clone())),
            queue.clone(),
        );
        Fixture {
            signer,
            issuer: TokenIssuer::new(store.clone(), 100),
            store,
            service,
            queue,
        }
    }

    #[test]
    fn test_redemption_scenario() {
        let f = fixture();
        let tokens = f.issuer.issue(3).unwrap();
        assert!(tokens.iter().all(|t| f.store.contains(t)));
        let (t1t2, t3) = (&tokens[..2], &tokens[2..]);

        // First batch, no prior payment
        let first = f
            .service
            .redeem(RedeemRequest::new(t1t2, "b1", "0xabc"))
            .unwrap();
        assert_eq!(first.recipient_address, "0xabc");
        assert_eq!(first.bounty_id, "b1");
        assert_eq!(first.amount, 2);

        // Same tokens again: already spent, amount unchanged
        let second = f
            .service
            .redeem(RedeemRequest::new(t1t2, "b1", "0xabc").with_future_payment(first.clone()))
            .unwrap();
        assert_eq!(second.amount, 2);

        // Tampered bounty is rejected and t3 stays outstanding
        let mut forged = second.clone();
        forged.bounty_id = "b2".into();
        let err = f
            .service
            .redeem(RedeemRequest::new(t3, "b2", "0xabc").with_future_payment(forged))
            .unwrap_err();
        assert!(matches!(err, PublisherError::Authentication));
        assert!(f.store.contains(&t3[0]));

        // The genuine payment continues to accumulate
        let third = f
            .service
            .redeem(RedeemRequest::new(t3, "b1", "0xabc").with_future_payment(second))
            .unwrap();
        assert_eq!(third.amount, 3);
        assert!(f.store.is_empty());
    }

    #[test]
    fn test_amount_tracks_deleted_not_presented() {
        let f = fixture();
        let tokens = f.issuer.issue(2).unwrap();
        let mut presented = tokens.clone();
        presented.push(Token::random());
        presented.push(tokens[0]);

        let payment = f
            .service
            .redeem(RedeemRequest::new(&presented, "b1", "0xabc"))
            .unwrap();
        assert_eq!(payment.amount, 2);
    }

    #[test]
    fn test_missing_fields_rejected_without_side_effects() {
        let f = fixture();
        let tokens = f.issuer.issue(1).unwrap();
        let full = RedeemRequest::new(&tokens, "b1", "0xabc");

        let cases = [
            RedeemRequest {
                tokens: None,
                ..full.clone()
            },
            RedeemRequest {
                tokens: Some(vec![]),
                ..full.clone()
            },
            RedeemRequest {
                recipient_address: None,
                ..full.clone()
            },
            RedeemRequest {
                recipient_address: Some("not-an-address".into()),
                ..full.clone()
            },
            RedeemRequest {
                bounty_id: None,
                ..full.clone()
            },
            RedeemRequest {
                bounty_id: Some("".into()),
                ..full
            },
        ];
        for request in cases {
            assert!(matches!(
                f.service.redeem(request),
                Err(PublisherError::InvalidRequest(_))
            ));
        }
        assert!(f.store.contains(&tokens[0]));
    }

    #[test]
    fn test_prior_payment_must_match_request() {
        let f = fixture();
        let tokens = f.issuer.issue(2).unwrap();
        let payment = f
            .service
            .redeem(RedeemRequest::new(&tokens[..1], "b1", "0xabc"))
            .unwrap();

        let err = f
            .service
            .redeem(RedeemRequest::new(&tokens[1..], "b9", "0xabc").with_future_payment(payment))
            .unwrap_err();
        assert!(matches!(err, PublisherError::InvalidRequest(_)));
        assert!(f.store.contains(&tokens[1]));
    }

    #[test]
    fn test_overflow_rejected_before_tokens_consumed() {
        let f = fixture();
        let tokens = f.issuer.issue(1).unwrap();
        let ledger = FuturePaymentLedger::new(f.signer.clone());
        let full = ledger
            .increment(&ledger.create("0xabc", "b1").unwrap(), u64::MAX)
            .unwrap();

        let err = f
            .service
            .redeem(RedeemRequest::new(&tokens, "b1", "0xabc").with_future_payment(full))
            .unwrap_err();
        assert!(matches!(err, PublisherError::InvalidRequest(_)));
        assert!(f.store.contains(&tokens[0]));
    }

    #[tokio::test]
    async fn test_settle_requires_verified_payment() {
        let f = fixture();
        let tokens = f.issuer.issue(2).unwrap();
        let payment = f
            .service
            .redeem(RedeemRequest::new(&tokens, "b1", "0xabc"))
            .unwrap();

        let mut inflated = payment.clone();
        inflated.amount = 100;
        assert!(matches!(
            f.service.settle(inflated).await,
            Err(PublisherError::Authentication)
        ));
        assert!(f.queue.pending().is_empty());

        let response = f.service.settle(payment.clone()).await.unwrap();
        assert!(response.success);
        assert_eq!(response.status, SettlementStatus::Queued);
        assert_eq!(response.amount, 2);
        assert_eq!(f.queue.pending(), vec![payment]);
    }
}
