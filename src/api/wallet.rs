//! Wallet: transaction history and IBAN withdrawals.
//!
//! Withdrawals are requested against the cash balance and paid out by
//! staff after approval. A request can be cancelled while it is still
//! pending, which returns the amount to the balance.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use super::GarbetApi;
use crate::config::WalletConfig;
use crate::transport::ApiRequest;
use crate::types::{GarbetError, User};

const TRANSACTIONS_PATH: &str = "/transactions";
const WITHDRAWALS_PATH: &str = "/payment/withdrawal-requests";
const WITHDRAWAL_DESCRIPTION: &str = "IBAN withdrawal request";

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Bet,
    Win,
    #[default]
    #[serde(other)]
    Other,
}

impl TransactionKind {
    /// Whether the transaction adds to the balance.
    pub fn is_credit(self) -> bool {
        matches!(self, TransactionKind::Deposit | TransactionKind::Win)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Deposit => write!(f, "deposit"),
            TransactionKind::Withdrawal => write!(f, "withdrawal"),
            TransactionKind::Bet => write!(f, "bet"),
            TransactionKind::Win => write!(f, "win"),
            TransactionKind::Other => write!(f, "other"),
        }
    }
}

/// One balance movement on the user's account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: TransactionKind,
    #[serde(default)]
    pub amount: Decimal,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Amount with its direction: positive for credits, negative otherwise.
    pub fn signed_amount(&self) -> Decimal {
        if self.kind.is_credit() {
            self.amount.abs()
        } else {
            -self.amount.abs()
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let date = self
            .created_at
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        write!(f, "{date} {:<10} {:>+10.2}", self.kind.to_string(), self.signed_amount())
    }
}

// ---------------------------------------------------------------------------
// Withdrawals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Paid,
    Completed,
    Rejected,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl WithdrawalStatus {
    /// Only requests staff have not acted on yet can be cancelled.
    pub fn is_cancellable(self) -> bool {
        self == WithdrawalStatus::Pending
    }
}

impl fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Paid => "paid",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Rejected => "rejected",
            WithdrawalStatus::Cancelled => "cancelled",
            WithdrawalStatus::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub amount: Decimal,
    pub status: WithdrawalStatus,
    #[serde(default)]
    pub iban: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl WithdrawalRequest {
    /// First eight IBAN characters, the rest elided.
    pub fn masked_iban(&self) -> String {
        match &self.iban {
            Some(iban) => format!("{}...", iban.chars().take(8).collect::<String>()),
            None => "-".to_string(),
        }
    }
}

/// Per-request withdrawal bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalLimits {
    pub min: Decimal,
    pub max: Decimal,
}

impl From<&WalletConfig> for WithdrawalLimits {
    fn from(cfg: &WalletConfig) -> Self {
        Self {
            min: cfg.min_withdrawal,
            max: cfg.max_withdrawal,
        }
    }
}

/// Check a withdrawal locally before anything is sent.
pub fn check_withdrawal(
    user: &User,
    amount: Decimal,
    limits: &WithdrawalLimits,
) -> Result<(), GarbetError> {
    if amount <= Decimal::ZERO {
        return Err(GarbetError::InvalidInput(format!(
            "withdrawal amount must be positive, got {amount}"
        )));
    }
    if amount < limits.min {
        return Err(GarbetError::InvalidInput(format!(
            "minimum withdrawal is {}",
            limits.min
        )));
    }
    if amount > limits.max {
        return Err(GarbetError::InvalidInput(format!(
            "maximum withdrawal is {}",
            limits.max
        )));
    }
    let has_iban = user.iban.as_deref().is_some_and(|s| !s.trim().is_empty())
        && user.iban_holder_name.as_deref().is_some_and(|s| !s.trim().is_empty());
    if !has_iban {
        return Err(GarbetError::InvalidInput(
            "save IBAN details on the profile before withdrawing".into(),
        ));
    }
    if user.balance < amount {
        return Err(GarbetError::InvalidInput(format!(
            "insufficient balance: {:.2} available, {amount} requested",
            user.balance
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    #[serde(default)]
    transactions: Vec<Transaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawalsResponse {
    #[serde(default)]
    withdrawal_requests: Vec<WithdrawalRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedWithdrawal {
    #[serde(default, alias = "withdrawal")]
    withdrawal_request: Option<WithdrawalRequest>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

impl GarbetApi {
    /// Most recent transactions first, `limit` of them when given.
    pub async fn my_transactions(&self, limit: Option<u32>) -> Result<Vec<Transaction>, GarbetError> {
        let mut request = ApiRequest::get(TRANSACTIONS_PATH);
        if let Some(limit) = limit {
            request = request.with_query("limit", limit);
        }
        let resp: TransactionsResponse = self.call(request).await?;
        Ok(resp.transactions)
    }

    pub async fn withdrawal_requests(&self) -> Result<Vec<WithdrawalRequest>, GarbetError> {
        let resp: WithdrawalsResponse = self.call(ApiRequest::get(WITHDRAWALS_PATH)).await?;
        Ok(resp.withdrawal_requests)
    }

    /// Request a payout to the user's saved IBAN.
    ///
    /// Validated against the cached user (fetched when absent); nothing is
    /// sent when the check fails. The cached balance is refreshed after a
    /// successful request. Returns the created request when the backend
    /// echoes it.
    pub async fn create_withdrawal(
        &self,
        amount: Decimal,
        limits: &WithdrawalLimits,
    ) -> Result<Option<WithdrawalRequest>, GarbetError> {
        let user = match self.current_user() {
            Some(user) => user,
            None => self.me().await?,
        };
        check_withdrawal(&user, amount, limits)?;

        let body = serde_json::json!({
            "amount": amount,
            "description": WITHDRAWAL_DESCRIPTION,
        });
        let created: CreatedWithdrawal = self
            .call(ApiRequest::post(WITHDRAWALS_PATH, Some(body)))
            .await?;
        info!(user = %user.username, amount = %amount, "Withdrawal requested");

        self.refresh_balance().await;
        Ok(created.withdrawal_request)
    }

    /// Cancel a pending request; the backend returns the amount to the balance.
    pub async fn cancel_withdrawal(&self, id: &str) -> Result<(), GarbetError> {
        let path = format!("{WITHDRAWALS_PATH}/{}/cancel", urlencoding::encode(id));
        self.call::<serde_json::Value>(ApiRequest::put(path, None))
            .await?;
        info!(withdrawal_id = %id, "Withdrawal cancelled");

        self.refresh_balance().await;
        Ok(())
    }

    /// The wallet call already succeeded; a stale balance is only logged.
    async fn refresh_balance(&self) {
        if let Err(e) = self.me().await {
            warn!(error = %e, "Balance refresh after wallet change failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
