//! Session guard.
//!
//! Wraps every outbound API call. A 401 on an ordinary request triggers
//! exactly one call to the refresh endpoint; requests that hit a 401
//! while that refresh is running park behind it and are re-issued (or
//! failed) together when it settles.
//!
//! Shared state is a `std::sync::Mutex` that is never held across an
//! `.await`, so "is a refresh running?" and "start one" happen in the
//! same critical section.

pub mod redirect;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::AuthConfig;
use crate::storage::UserCache;
use crate::transport::{ApiRequest, ApiResponse, Transport};
use crate::types::GarbetError;

pub use redirect::{LogRedirect, LoginRedirect};

/// Outcome handed to every parked request.
type RefreshOutcome = Result<(), GarbetError>;

/// Endpoints the guard must never try to refresh for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardEndpoints {
    pub refresh: String,
    pub login: String,
}

impl Default for GuardEndpoints {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

impl From<&AuthConfig> for GuardEndpoints {
    fn from(auth: &AuthConfig) -> Self {
        Self {
            refresh: auth.refresh_path.clone(),
            login: auth.login_path.clone(),
        }
    }
}

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiting: Vec<oneshot::Sender<RefreshOutcome>>,
}

enum Turn {
    Lead,
    Wait(oneshot::Receiver<RefreshOutcome>),
}

/// Authorization-refresh interceptor shared by every API call site.
pub struct SessionGuard {
    transport: Arc<dyn Transport>,
    users: Arc<UserCache>,
    redirect: Arc<dyn LoginRedirect>,
    endpoints: GuardEndpoints,
    state: Mutex<RefreshState>,
    refreshes: AtomicU64,
}

impl SessionGuard {
    pub fn new(
        transport: Arc<dyn Transport>,
        users: Arc<UserCache>,
        redirect: Arc<dyn LoginRedirect>,
        endpoints: GuardEndpoints,
    ) -> Self {
        Self {
            transport,
            users,
            redirect,
            endpoints,
            state: Mutex::new(RefreshState::default()),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Issue a request, transparently refreshing the session on 401.
    ///
    /// Every response the guard does not intercept is returned as-is,
    /// whatever its status. A request is retried at most once.
    pub async fn perform_request(&self, request: &ApiRequest) -> Result<ApiResponse, GarbetError> {
        let response = self.transport.send(request).await?;
        if !response.is_unauthorized() || self.is_exempt(&request.path) {
            return Ok(response);
        }

        let turn = {
            let mut state = self.lock_state();
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.waiting.push(tx);
                Turn::Wait(rx)
            } else {
                state.refreshing = true;
                Turn::Lead
            }
        };

        match turn {
            Turn::Wait(rx) => {
                debug!(request = %request, "Refresh in progress, request queued");
                match rx.await {
                    Ok(Ok(())) => self.transport.send(request).await,
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(GarbetError::AuthFailed {
                        status: None,
                        message: "session refresh abandoned".to_string(),
                    }),
                }
            }
            Turn::Lead => {
                let ticket = RefreshTicket::new(self);
                match self.refresh().await {
                    Ok(()) => {
                        let released = ticket.settle(Ok(()));
                        info!(released, "Session refreshed");
                        self.transport.send(request).await
                    }
                    Err(e) => {
                        let failed = ticket.settle(Err(e.clone()));
                        warn!(error = %e, failed, "Session refresh failed, ending session");
                        self.users.clear();
                        self.redirect.redirect_to_login();
                        Err(e)
                    }
                }
            }
        }
    }

    /// Whether a refresh call is currently in flight.
    pub fn is_refreshing(&self) -> bool {
        self.lock_state().refreshing
    }

    /// Requests parked behind the in-flight refresh.
    pub fn waiting_requests(&self) -> usize {
        self.lock_state().waiting.len()
    }

    /// Total refresh calls issued since construction.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn users(&self) -> &Arc<UserCache> {
        &self.users
    }

    fn is_exempt(&self, path: &str) -> bool {
        path.contains(&self.endpoints.refresh) || path.contains(&self.endpoints.login)
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Call the refresh endpoint. Any non-2xx answer is a failure.
    async fn refresh(&self) -> RefreshOutcome {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        info!(endpoint = %self.endpoints.refresh, "Session expired, refreshing");

        let request = ApiRequest::post(self.endpoints.refresh.clone(), None);
        match self.transport.send(&request).await {
            Ok(resp) if resp.is_success() => Ok(()),
            Ok(resp) => Err(GarbetError::AuthFailed {
                status: Some(resp.status),
                message: resp.error_message(),
            }),
            Err(e) => Err(GarbetError::AuthFailed {
                status: None,
                message: e.to_string(),
            }),
        }
    }

    /// Clear the in-progress flag and hand `outcome` to every waiter.
    fn settle(&self, outcome: RefreshOutcome) -> usize {
        let waiting = {
            let mut state = self.lock_state();
            state.refreshing = false;
            std::mem::take(&mut state.waiting)
        };
        let count = waiting.len();
        for tx in waiting {
            // A waiter whose caller went away has nothing left to resume.
            let _ = tx.send(outcome.clone());
        }
        count
    }
}

/// Settles the refresh when the leading request is dropped mid-flight,
/// so cancellation cannot strand the waiting list.
struct RefreshTicket<'a> {
    guard: &'a SessionGuard,
    settled: bool,
}

impl<'a> RefreshTicket<'a> {
    fn new(guard: &'a SessionGuard) -> Self {
        Self {
            guard,
            settled: false,
        }
    }

    fn settle(mut self, outcome: RefreshOutcome) -> usize {
        self.settled = true;
        self.guard.settle(outcome)
    }
}

impl Drop for RefreshTicket<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Session refresh cancelled");
            self.guard.settle(Err(GarbetError::AuthFailed {
                status: None,
                message: "session refresh cancelled".to_string(),
            }));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
