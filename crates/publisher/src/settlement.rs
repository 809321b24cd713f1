/// Hand-off point between the publisher and on-chain settlement.
/// The publisher only ever passes records that verified against its key.
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use planetflare_sdk::{FuturePayment, SettlementStatus};
use tracing::info;

use crate::error::Result;

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    async fn settle_payment(&self, payment: &FuturePayment) -> Result<SettlementStatus>;
}

type PairKey = (String, String);

/// Keeps the latest verified payment per (recipient, bounty) until an
/// external settler drains it. Amounts already handed off are remembered so
/// the same record cannot be queued twice.
#[derive(Default)]
pub struct SettlementQueue {
    pending: DashMap<PairKey, FuturePayment>,
    handed_off: DashMap<PairKey, u64>,
}

impl SettlementQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Vec<FuturePayment> {
        let mut pending: Vec<FuturePayment> =
            self.pending.iter().map(|entry| entry.value().clone()).collect();
        pending.sort_by(|a, b| {
            (&a.recipient_address, &a.bounty_id).cmp(&(&b.recipient_address, &b.bounty_id))
        });
        pending
    }

    /// Remove and return everything queued so far, ordered like `pending`.
    /// A record queued while draining is either returned or left queued.
    pub fn drain(&self) -> Vec<FuturePayment> {
        let keys: Vec<PairKey> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        let mut drained: Vec<FuturePayment> = keys
            .into_iter()
            .filter_map(|key| match self.pending.entry(key) {
                // Record the hand-off while the pending entry is still locked
                Entry::Occupied(entry) => {
                    self.handed_off
                        .entry(entry.key().clone())
                        .and_modify(|amount| *amount = (*amount).max(entry.get().amount))
                        .or_insert(entry.get().amount);
                    Some(entry.remove())
                }
                Entry::Vacant(_) => None,
            })
            .collect();
        drained.sort_by(|a, b| {
            (&a.recipient_address, &a.bounty_id).cmp(&(&b.recipient_address, &b.bounty_id))
        });
        drained
    }
}

#[async_trait]
impl ChainAdapter for SettlementQueue {
    async fn settle_payment(&self, payment: &FuturePayment) -> Result<SettlementStatus> {
        let key = (payment.recipient_address.clone(), payment.bounty_id.clone());
        let entry = self.pending.entry(key);
        let already_handed_off = self
            .handed_off
            .get(entry.key())
            .is_some_and(|settled| *settled >= payment.amount);

        let status = match entry {
            _ if already_handed_off => SettlementStatus::AlreadyPending,
            Entry::Occupied(mut entry) => {
                if entry.get().amount >= payment.amount {
                    SettlementStatus::AlreadyPending
                } else {
                    entry.insert(payment.clone());
                    SettlementStatus::Queued
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(payment.clone());
                SettlementStatus::Queued
            }
        };

        info!(
            recipient = %payment.recipient_address,
            bounty = %payment.bounty_id,
            amount = payment.amount,
            ?status,
            "Settlement submitted"
        );
        Ok(status)
    }
}
