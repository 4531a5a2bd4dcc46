//! Bet slip aggregator.
//!
//! Holds the wager legs the user has picked, prices them as a combined
//! (parlay-style) slip and places them one leg at a time.
//!
//! Selections are unique by (event id, selection label): picking the same
//! outcome again removes it. Different outcomes on the same event are
//! independent entries and may coexist. Odds are snapshots taken when the
//! selection was made and are not re-checked before submission.
//!
//! Submission is sequential with no compensation: the first rejected leg
//! stops the run and legs already placed stay placed.

pub mod placer;

use rust_decimal::prelude::*;
use rust_decimal::RoundingStrategy;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::BettingConfig;
use crate::types::{BetReceipt, GarbetError};

pub use placer::{BetPlacer, LegOrder, PlaceBetBody};

/// Decimal places used when showing odds and money.
const DISPLAY_DP: u32 = 2;

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// One leg of a wager.
#[derive(Debug, Clone, PartialEq)]
pub struct BetSelection {
    pub event_id: String,
    pub event_name: String,
    /// Market type code, e.g. `1X2`.
    pub market_type: String,
    /// Market display name, e.g. `Match Winner`.
    pub market_name: String,
    /// Outcome label, e.g. `Team A Win`.
    pub label: String,
    /// Decimal odds at selection time.
    pub odds: Decimal,
}

impl BetSelection {
    pub fn new(
        event_id: impl Into<String>,
        market_type: impl Into<String>,
        label: impl Into<String>,
        odds: Decimal,
    ) -> Self {
        let event_id = event_id.into();
        let market_type = market_type.into();
        Self {
            event_name: event_id.clone(),
            market_name: market_type.clone(),
            event_id,
            market_type,
            label: label.into(),
            odds,
        }
    }

    /// Attach display names for the event and market.
    pub fn with_names(mut self, event_name: impl Into<String>, market_name: impl Into<String>) -> Self {
        self.event_name = event_name.into();
        self.market_name = market_name.into();
        self
    }

    fn same_outcome(&self, other: &BetSelection) -> bool {
        self.event_id == other.event_id && self.label == other.label
    }
}

impl fmt::Display for BetSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {}: {} @ {}",
            self.event_name, self.market_name, self.label, self.odds
        )
    }
}

/// Convert odds received as a float into a `Decimal`.
///
/// Rejects NaN, infinities and anything below 1.0.
pub fn parse_odds(odds: f64) -> Result<Decimal, GarbetError> {
    if !odds.is_finite() {
        return Err(GarbetError::InvalidInput(format!("odds must be finite, got {odds}")));
    }
    let value = Decimal::from_str(&odds.to_string())
        .map_err(|e| GarbetError::InvalidInput(format!("odds {odds}: {e}")))?;
    check_odds(value)?;
    Ok(value)
}

fn check_odds(odds: Decimal) -> Result<(), GarbetError> {
    if odds < Decimal::ONE {
        return Err(GarbetError::InvalidInput(format!(
            "odds must be at least 1.0, got {odds}"
        )));
    }
    Ok(())
}

/// Combined odds and payout, or `None` if either leaves `Decimal` range.
fn checked_totals(
    odds: impl IntoIterator<Item = Decimal>,
    stake: Decimal,
) -> Option<(Decimal, Decimal)> {
    let combined = odds
        .into_iter()
        .try_fold(Decimal::ONE, |acc, o| acc.checked_mul(o))?;
    let payout = if stake <= Decimal::ZERO {
        Decimal::ZERO
    } else {
        stake.checked_mul(combined)?
    };
    Some((combined, payout))
}

// ---------------------------------------------------------------------------
// Slip state
// ---------------------------------------------------------------------------

/// Which balance a wager is debited from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BalancePool {
    #[default]
    Cash,
    Bonus,
}

/// Where the slip is in its edit/submit cycle.
///
/// `Invalid` and `Errored` are not terminal; any edit moves the slip
/// back to `Building` (or `Empty`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlipPhase {
    Empty,
    Building,
    Valid,
    Invalid,
    Submitting,
    Cleared,
    Errored,
}

/// Platform stake bounds, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeLimits {
    pub min: Decimal,
    pub max: Decimal,
}

impl StakeLimits {
    pub fn new(min: Decimal, max: Decimal) -> Self {
        Self { min, max }
    }
}

/// Submission rules: stake limits and the per-leg time budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlipPolicy {
    pub limits: StakeLimits,
    pub leg_timeout: Option<Duration>,
}

impl From<&BettingConfig> for SlipPolicy {
    fn from(cfg: &BettingConfig) -> Self {
        Self {
            limits: StakeLimits::new(cfg.min_stake, cfg.max_stake),
            leg_timeout: cfg.leg_timeout(),
        }
    }
}

/// The aggregate the user submits.
#[derive(Debug, Clone)]
pub struct BetSlip {
    selections: Vec<BetSelection>,
    stake: Decimal,
    pool: BalancePool,
    phase: SlipPhase,
}

impl Default for BetSlip {
    fn default() -> Self {
        Self::new()
    }
}

impl BetSlip {
    pub fn new() -> Self {
        Self {
            selections: Vec::new(),
            stake: Decimal::ZERO,
            pool: BalancePool::Cash,
            phase: SlipPhase::Empty,
        }
    }

    pub fn selections(&self) -> &[BetSelection] {
        &self.selections
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    pub fn stake(&self) -> Decimal {
        self.stake
    }

    pub fn pool(&self) -> BalancePool {
        self.pool
    }

    pub fn phase(&self) -> SlipPhase {
        self.phase
    }

    /// Whether an outcome is currently on the slip.
    pub fn contains(&self, event_id: &str, label: &str) -> bool {
        self.selections
            .iter()
            .any(|s| s.event_id == event_id && s.label == label)
    }

    // -- Editing -----------------------------------------------------------

    /// Add the selection, or remove it if the same outcome is already on
    /// the slip. Odds below 1.0, or an addition whose combined odds or
    /// payout would overflow, are rejected and leave the slip unchanged.
    pub fn toggle_selection(&mut self, selection: BetSelection) -> Result<&Self, GarbetError> {
        check_odds(selection.odds)?;

        if let Some(index) = self.selections.iter().position(|s| s.same_outcome(&selection)) {
            let removed = self.selections.remove(index);
            debug!(event_id = %removed.event_id, selection = %removed.label, "Selection removed");
        } else {
            let odds = self.selections.iter().map(|s| s.odds).chain([selection.odds]);
            if checked_totals(odds, self.stake).is_none() {
                return Err(GarbetError::InvalidInput(format!(
                    "adding {} @ {} would overflow the slip total",
                    selection.label, selection.odds
                )));
            }
            debug!(
                event_id = %selection.event_id,
                selection = %selection.label,
                odds = %selection.odds,
                "Selection added"
            );
            self.selections.push(selection);
        }
        self.touch();
        Ok(self)
    }

    /// Remove the selection at `index`.
    pub fn remove_selection(&mut self, index: usize) -> Result<&Self, GarbetError> {
        if index >= self.selections.len() {
            return Err(GarbetError::InvalidInput(format!(
                "selection index {index} out of range (slip has {})",
                self.selections.len()
            )));
        }
        self.selections.remove(index);
        self.touch();
        Ok(self)
    }

    /// Set the stake. Platform limits are checked at submission, not here;
    /// a stake whose payout would overflow is rejected.
    pub fn set_stake(&mut self, amount: Decimal) -> Result<&Self, GarbetError> {
        if amount < Decimal::ZERO {
            return Err(GarbetError::InvalidInput(format!(
                "stake must not be negative, got {amount}"
            )));
        }
        if checked_totals(self.selections.iter().map(|s| s.odds), amount).is_none() {
            return Err(GarbetError::InvalidInput(format!(
                "stake {amount} would overflow the potential payout"
            )));
        }
        self.stake = amount;
        self.touch();
        Ok(self)
    }

    /// Set the stake from user-entered text. Blank text unsets the stake.
    pub fn set_stake_str(&mut self, input: &str) -> Result<&Self, GarbetError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return self.set_stake(Decimal::ZERO);
        }
        let amount = Decimal::from_str(trimmed)
            .map_err(|_| GarbetError::InvalidInput(format!("stake is not a number: {trimmed:?}")))?;
        self.set_stake(amount)
    }

    pub fn set_balance_pool(&mut self, pool: BalancePool) -> &Self {
        self.pool = pool;
        self
    }

    /// Drop every selection and the stake.
    pub fn reset(&mut self) {
        self.selections.clear();
        self.stake = Decimal::ZERO;
        self.phase = SlipPhase::Empty;
    }

    fn touch(&mut self) {
        self.phase = if self.selections.is_empty() {
            SlipPhase::Empty
        } else {
            SlipPhase::Building
        };
    }

    // -- Pricing -----------------------------------------------------------

    /// Product of all selection odds; 1.0 for an empty slip.
    pub fn combined_odds(&self) -> Decimal {
        self.totals().0
    }

    /// Stake times combined odds; zero when the stake is not positive.
    pub fn potential_payout(&self) -> Decimal {
        self.totals().1
    }

    fn totals(&self) -> (Decimal, Decimal) {
        // Edits that would overflow are rejected, so this never saturates.
        checked_totals(self.selections.iter().map(|s| s.odds), self.stake)
            .unwrap_or((Decimal::MAX, Decimal::MAX))
    }

    /// Combined odds rounded for display (two places, half away from zero).
    pub fn display_combined_odds(&self) -> Decimal {
        round_display(self.combined_odds())
    }

    /// Potential payout rounded for display.
    pub fn display_payout(&self) -> Decimal {
        round_display(self.potential_payout())
    }

    // -- Submission --------------------------------------------------------

    /// Check submission preconditions against the platform stake limits.
    pub fn validate_for_submission(&mut self, limits: &StakeLimits) -> Result<(), GarbetError> {
        let result = self.check(limits);
        self.phase = if result.is_ok() {
            SlipPhase::Valid
        } else {
            SlipPhase::Invalid
        };
        result
    }

    fn check(&self, limits: &StakeLimits) -> Result<(), GarbetError> {
        if self.selections.is_empty() {
            return Err(GarbetError::EmptySlip);
        }
        if self.stake <= Decimal::ZERO {
            return Err(GarbetError::InvalidStake(format!(
                "stake must be positive, got {}",
                self.stake
            )));
        }
        if self.stake < limits.min {
            return Err(GarbetError::InvalidStake(format!(
                "stake {} is below the minimum {}",
                self.stake, limits.min
            )));
        }
        if self.stake > limits.max {
            return Err(GarbetError::InvalidStake(format!(
                "stake {} is above the maximum {}",
                self.stake, limits.max
            )));
        }
        Ok(())
    }

    /// Validate, then place every leg in order through `placer`.
    ///
    /// Nothing is sent when validation fails. The first rejected (or
    /// timed-out) leg aborts the run with `LegPlacementFailed`; earlier
    /// legs stay placed. On full success the slip is cleared and the
    /// receipts are returned in leg order.
    pub async fn submit(
        &mut self,
        placer: &dyn BetPlacer,
        policy: &SlipPolicy,
    ) -> Result<Vec<BetReceipt>, GarbetError> {
        self.validate_for_submission(&policy.limits)?;
        self.phase = SlipPhase::Submitting;

        let orders: Vec<LegOrder> = self
            .selections
            .iter()
            .map(|selection| LegOrder {
                selection: selection.clone(),
                stake: self.stake,
                pool: self.pool,
            })
            .collect();

        info!(
            legs = orders.len(),
            stake = %self.stake,
            combined_odds = %self.display_combined_odds(),
            pool = ?self.pool,
            "Submitting bet slip"
        );

        let mut receipts = Vec::with_capacity(orders.len());
        for (index, order) in orders.iter().enumerate() {
            let placed = match policy.leg_timeout {
                Some(limit) => tokio::time::timeout(limit, placer.place_leg(order))
                    .await
                    .unwrap_or_else(|_| {
                        Err(GarbetError::Transport(format!(
                            "leg placement timed out after {}ms",
                            limit.as_millis()
                        )))
                    }),
                None => placer.place_leg(order).await,
            };

            match placed {
                Ok(receipt) => {
                    debug!(index, bet_id = %receipt.bet_id, "Leg placed");
                    receipts.push(receipt);
                }
                Err(e) => {
                    warn!(
                        index,
                        event_id = %order.selection.event_id,
                        placed = receipts.len(),
                        error = %e,
                        "Leg placement failed, remaining legs skipped"
                    );
                    self.phase = SlipPhase::Errored;
                    return Err(GarbetError::LegPlacementFailed {
                        index,
                        event_id: order.selection.event_id.clone(),
                        placed: receipts.len(),
                        message: e.to_string(),
                    });
                }
            }
        }

        self.selections.clear();
        self.stake = Decimal::ZERO;
        self.phase = SlipPhase::Cleared;
        info!(placed = receipts.len(), "Bet slip placed");
        Ok(receipts)
    }
}

fn round_display(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DISPLAY_DP, RoundingStrategy::MidpointAwayFromZero)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
