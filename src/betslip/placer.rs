//! Leg placement seam.
//!
//! The slip places each selection as an independent backend wager. The
//! API facade implements this trait; tests substitute their own.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use super::{BalancePool, BetSelection};
use crate::types::{BetReceipt, GarbetError};

/// One leg as sent to the placement endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct LegOrder {
    pub selection: BetSelection,
    pub stake: Decimal,
    pub pool: BalancePool,
}

/// Request body for `POST /matches/{id}/bet`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBetBody<'a> {
    pub market_type: &'a str,
    pub market_name: &'a str,
    pub selection: &'a str,
    pub stake: Decimal,
    pub use_bonus_balance: bool,
}

impl LegOrder {
    pub fn body(&self) -> PlaceBetBody<'_> {
        PlaceBetBody {
            market_type: &self.selection.market_type,
            market_name: &self.selection.market_name,
            selection: &self.selection.label,
            stake: self.stake,
            use_bonus_balance: self.pool == BalancePool::Bonus,
        }
    }
}

/// Places a single wager leg.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BetPlacer: Send + Sync {
    async fn place_leg(&self, order: &LegOrder) -> Result<BetReceipt, GarbetError>;
}
