//! Cashback awarder: one fixed credit per distinct upgrade pair.
//!
//! A client cycling Pro → Elite → Pro → Elite is paid for Pro → Elite once.
//! The guard is the (from, to) pair, not the occurrence.

use crate::{
    state::{CashbackAward, ClientLoyaltyState},
    types::TierId,
};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
pub struct CashbackAwarder {
    amount: f64,
}

impl CashbackAwarder {
    pub fn new(amount: f64) -> Self {
        Self { amount }
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Grant the fixed credit if every condition holds:
    ///   - the client has met the lifetime billing minimum
    ///   - `to` is strictly above `from`
    ///   - this exact pair has never been rewarded
    pub fn maybe_award(
        &self,
        client: &mut ClientLoyaltyState,
        from: TierId,
        to: TierId,
        now: DateTime<Utc>,
    ) -> Option<CashbackAward> {
        if !client.meets_lifetime_minimum {
            log::debug!(
                "cashback: {} {from} -> {to} not eligible, lifetime minimum not met",
                client.client_id
            );
            return None;
        }
        if !from.is_upgrade_to(to) {
            return None;
        }
        if client.has_award_for(from, to) {
            log::info!(
                "cashback: {} already rewarded for {from} -> {to}",
                client.client_id
            );
            return None;
        }

        let award = CashbackAward {
            award_id:   uuid::Uuid::new_v4().to_string(),
            from_tier:  from,
            to_tier:    to,
            awarded_at: now,
            amount:     self.amount,
        };
        client.cashback_balance += self.amount;
        client.cashback_awards.push(award.clone());

        log::info!(
            "cashback: {} awarded ${:.2} for {from} -> {to} (balance ${:.2})",
            client.client_id, self.amount, client.cashback_balance
        );
        Some(award)
    }
}
