//! Login redirect seam.
//!
//! When a session cannot be refreshed the client is sent back to the
//! login entry point. A desktop or terminal host decides what that
//! means; the guard only signals it.

use tracing::warn;

/// Invoked once per unrecoverable session failure.
#[cfg_attr(test, mockall::automock)]
pub trait LoginRedirect: Send + Sync {
    fn redirect_to_login(&self);
}

/// Default redirect: logs the login URL the user should be sent to.
pub struct LogRedirect {
    login_url: String,
}

impl LogRedirect {
    pub fn new(login_url: impl Into<String>) -> Self {
        Self {
            login_url: login_url.into(),
        }
    }
}

impl LoginRedirect for LogRedirect {
    fn redirect_to_login(&self) {
        warn!(login_url = %self.login_url, "Session ended, redirecting to login");
    }
}
