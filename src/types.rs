//! Shared types for the Garbet client core.
//!
//! These types form the data model used across the session, API and
//! bet slip modules: the client-visible user record, the match board
//! returned by the backend, placement receipts and the crate-wide
//! error enum.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// The authenticated user as the backend reports it from `/auth/me`.
///
/// Credentials never appear here; they live in server-set cookies held
/// by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(alias = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    /// Cash balance.
    #[serde(default)]
    pub balance: Decimal,
    #[serde(default)]
    pub bonus_balance: Decimal,
    /// Payout account for withdrawals, set from the profile page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iban: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iban_holder_name: Option<String>,
}

impl User {
    /// Where the client should land after login.
    pub fn landing_path(&self) -> &'static str {
        self.role.landing_path()
    }

    /// Helper to build a sample user with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        User {
            id: "u-001".to_string(),
            username: "deniz".to_string(),
            email: "deniz@example.com".to_string(),
            role: Role::User,
            balance: rust_decimal_macros::dec!(150.50),
            bonus_balance: rust_decimal_macros::dec!(20),
            iban: Some("TR330006100519786457841326".to_string()),
            iban_holder_name: Some("Deniz Yilmaz".to_string()),
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{}> [{}] balance: {:.2} (bonus: {:.2})",
            self.username, self.email, self.role, self.balance, self.bonus_balance
        )
    }
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
    SuperAdmin,
    Operator,
    /// Any role this client does not know about.
    #[serde(other)]
    Unknown,
}

impl Role {
    /// Staff roles get the admin console.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin | Role::Operator)
    }

    pub fn landing_path(&self) -> &'static str {
        if self.is_staff() {
            "/admin"
        } else {
            "/dashboard"
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
            Role::SuperAdmin => write!(f, "super_admin"),
            Role::Operator => write!(f, "operator"),
            Role::Unknown => write!(f, "unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

/// A sports event as listed by `/matches`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub match_name: Option<String>,
    pub team_a: String,
    pub team_b: String,
    #[serde(default)]
    pub league: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub match_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub markets: Vec<MatchMarket>,
}

impl Match {
    /// Backend-provided name, or "Team A vs Team B".
    pub fn display_name(&self) -> String {
        self.match_name
            .clone()
            .unwrap_or_else(|| format!("{} vs {}", self.team_a, self.team_b))
    }

    /// Find a market by its type code (e.g. `1X2`).
    pub fn market(&self, market_type: &str) -> Option<&MatchMarket> {
        self.markets.iter().find(|m| m.market_type == market_type)
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({} markets)",
            self.league.as_deref().unwrap_or("-"),
            self.display_name(),
            self.markets.len()
        )
    }
}

/// One market on a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchMarket {
    #[serde(rename = "type")]
    pub market_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub selections: Vec<MarketSelection>,
}

/// A priced outcome inside a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSelection {
    pub name: String,
    pub odds: Decimal,
}

// ---------------------------------------------------------------------------
// Bet placement
// ---------------------------------------------------------------------------

/// Confirmation of one placed wager leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetReceipt {
    pub bet_id: String,
    pub event_id: String,
    pub selection: String,
    pub stake: Decimal,
    /// Odds snapshot the leg was priced at on the slip.
    pub odds: Decimal,
    pub placed_at: DateTime<Utc>,
}

impl fmt::Display for BetReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} @ {} stake {:.2}",
            self.bet_id, self.event_id, self.selection, self.odds, self.stake
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the Garbet client.
///
/// `Clone` so a single refresh failure can be handed to every request
/// that was waiting on it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GarbetError {
    #[error("Session expired")]
    AuthExpired,

    #[error("Session refresh failed: {message}")]
    AuthFailed { status: Option<u16>, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Bet slip is empty")]
    EmptySlip,

    #[error("Invalid stake: {0}")]
    InvalidStake(String),

    #[error("Leg {index} ({event_id}) rejected after {placed} placed: {message}")]
    LegPlacementFailed {
        index: usize,
        event_id: String,
        /// Legs already accepted by the backend; these are not rolled back.
        placed: usize,
        message: String,
    },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl GarbetError {
    /// HTTP status associated with the error, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            GarbetError::AuthExpired => Some(401),
            GarbetError::AuthFailed { status, .. } => *status,
            GarbetError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
