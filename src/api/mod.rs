//! Garbet backend API.
//!
//! Typed calls over the endpoints the betting flow and the wallet need. Every call
//! goes through the shared `SessionGuard`, so an expired session is
//! refreshed once and the call retried without the caller noticing.

pub mod matches;
pub mod wallet;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::betslip::{BetPlacer, LegOrder};
use crate::config::AuthConfig;
use crate::session::SessionGuard;
use crate::transport::ApiRequest;
use crate::types::{BetReceipt, GarbetError, Match, User};

pub use matches::{selection_for, DateWindow, MatchFilter, OneXTwo, Outcome};
pub use wallet::{
    check_withdrawal, Transaction, TransactionKind, WithdrawalLimits, WithdrawalRequest,
    WithdrawalStatus,
};

const MATCHES_PATH: &str = "/matches";

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

/// `/auth/me` and `/auth/login` answer either `{ user: {...} }` or the
/// bare user object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserEnvelope {
    Wrapped { user: User },
    Bare(User),
}

impl UserEnvelope {
    fn into_user(self) -> User {
        match self {
            UserEnvelope::Wrapped { user } => user,
            UserEnvelope::Bare(user) => user,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MatchesResponse {
    #[serde(default)]
    matches: Vec<Match>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceBetResponse {
    #[serde(default)]
    bet: Option<PlacedBet>,
    #[serde(default)]
    bet_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlacedBet {
    #[serde(rename = "_id", alias = "id")]
    id: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Typed facade over the Garbet REST API.
pub struct GarbetApi {
    guard: Arc<SessionGuard>,
    login_path: String,
    logout_path: String,
    me_path: String,
}

impl GarbetApi {
    pub fn new(guard: Arc<SessionGuard>, auth: &AuthConfig) -> Self {
        Self {
            guard,
            login_path: auth.login_path.clone(),
            logout_path: auth.logout_path.clone(),
            me_path: auth.me_path.clone(),
        }
    }

    pub fn guard(&self) -> &Arc<SessionGuard> {
        &self.guard
    }

    /// Cached user, without a network call.
    pub fn current_user(&self) -> Option<User> {
        self.guard.users().get()
    }

    /// Send through the guard and decode a success body.
    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, GarbetError> {
        let resp = self.guard.perform_request(&request).await?;
        if !resp.is_success() {
            debug!(request = %request, status = resp.status, "API call rejected");
            return Err(resp.into_error());
        }
        resp.json()
    }

    // -- Auth --------------------------------------------------------------

    /// Log in; the backend sets the session cookies.
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<User, GarbetError> {
        let body = serde_json::json!({
            "email": email,
            "password": password.expose_secret(),
        });
        let resp = self
            .guard
            .perform_request(&ApiRequest::post(self.login_path.clone(), Some(body)))
            .await?;
        // A 401 here means bad credentials, not an expired session.
        if !resp.is_success() {
            return Err(GarbetError::Http {
                status: resp.status,
                message: resp.error_message(),
            });
        }
        let user = resp.json::<UserEnvelope>()?.into_user();
        info!(user = %user.username, role = %user.role, "Logged in");
        self.guard.users().store(user.clone());
        Ok(user)
    }

    /// Log out. The local cache is cleared even if the backend call fails.
    pub async fn logout(&self) -> Result<(), GarbetError> {
        let result = self
            .call::<serde_json::Value>(ApiRequest::post(self.logout_path.clone(), None))
            .await
            .map(|_| ());
        self.guard.users().clear();
        if let Err(e) = &result {
            warn!(error = %e, "Logout call failed, local session cleared anyway");
        }
        result
    }

    /// Fetch the current user and refresh the cache.
    pub async fn me(&self) -> Result<User, GarbetError> {
        let envelope: UserEnvelope = self.call(ApiRequest::get(self.me_path.clone())).await?;
        let user = envelope.into_user();
        self.guard.users().store(user.clone());
        Ok(user)
    }

    /// Re-establish the session at start-up.
    ///
    /// Returns the user when the backend still recognises the session
    /// (refreshing it if needed); otherwise clears the local cache.
    pub async fn restore_session(&self) -> Option<User> {
        match self.me().await {
            Ok(user) => {
                info!(user = %user.username, landing = user.landing_path(), "Session restored");
                Some(user)
            }
            Err(e) => {
                info!(error = %e, "No active session");
                self.guard.users().clear();
                None
            }
        }
    }

    // -- Matches -----------------------------------------------------------

    /// List matches for the board.
    pub async fn list_matches(&self, filter: &MatchFilter) -> Result<Vec<Match>, GarbetError> {
        let resp: MatchesResponse = self
            .call(filter.to_request(MATCHES_PATH, Utc::now()))
            .await?;
        debug!(count = resp.matches.len(), window = ?filter.window, "Matches fetched");
        Ok(resp.matches)
    }

    /// Place one wager leg.
    pub async fn place_bet(&self, order: &LegOrder) -> Result<BetReceipt, GarbetError> {
        let path = format!(
            "{MATCHES_PATH}/{}/bet",
            urlencoding::encode(&order.selection.event_id)
        );
        let body = serde_json::to_value(order.body())
            .map_err(|e| GarbetError::InvalidInput(format!("bet body: {e}")))?;

        let resp: PlaceBetResponse = self.call(ApiRequest::post(path, Some(body))).await?;
        let bet_id = resp
            .bet
            .map(|b| b.id)
            .or(resp.bet_id)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        info!(
            bet_id = %bet_id,
            event_id = %order.selection.event_id,
            selection = %order.selection.label,
            stake = %order.stake,
            "Bet placed"
        );

        Ok(BetReceipt {
            bet_id,
            event_id: order.selection.event_id.clone(),
            selection: order.selection.label.clone(),
            stake: order.stake,
            odds: order.selection.odds,
            placed_at: Utc::now(),
        })
    }
}

#[async_trait]
impl BetPlacer for GarbetApi {
    async fn place_leg(&self, order: &LegOrder) -> Result<BetReceipt, GarbetError> {
        self.place_bet(order).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
