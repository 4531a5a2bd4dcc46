//! Local user cache.
//!
//! Holds the client-visible `User` record for the current session and,
//! when configured, mirrors it to a JSON file so a restarted client can
//! show who it thinks is logged in before `/auth/me` answers. The cache
//! is cleared on logout and whenever the session guard gives up on a
//! refresh.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info, warn};

use crate::types::User;

/// Shared cache of the logged-in user.
pub struct UserCache {
    current: RwLock<Option<User>>,
    path: Option<PathBuf>,
}

impl UserCache {
    /// A cache that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            current: RwLock::new(None),
            path: None,
        }
    }

    /// A cache mirrored to `path`, primed from the file if it exists.
    pub fn persistent(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let current = load_user(&path)?;
        Ok(Self {
            current: RwLock::new(current),
            path: Some(path),
        })
    }

    /// The cached user, if any.
    pub fn get(&self) -> Option<User> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.get().is_some()
    }

    pub fn is_staff(&self) -> bool {
        self.get().map(|u| u.role.is_staff()).unwrap_or(false)
    }

    /// Replace the cached user. File write failures are logged, not raised.
    pub fn store(&self, user: User) {
        if let Some(path) = &self.path {
            if let Err(e) = save_user(&user, path) {
                warn!(error = %e, "Failed to persist user cache");
            }
        }
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(user);
    }

    /// Forget the cached user.
    pub fn clear(&self) {
        let had_user = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .is_some();
        if let Some(path) = &self.path {
            if let Err(e) = delete_user(path) {
                warn!(error = %e, "Failed to delete user cache file");
            }
        }
        if had_user {
            info!("User cache cleared");
        }
    }
}

/// Save a user to a JSON file.
pub fn save_user(user: &User, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(user).context("Failed to serialise user")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write user cache to {}", path.display()))?;
    debug!(path = %path.display(), user = %user.username, "User cache saved");
    Ok(())
}

/// Load a user from a JSON file.
/// Returns None if the file doesn't exist.
pub fn load_user(path: &Path) -> Result<Option<User>> {
    if !path.exists() {
        debug!(path = %path.display(), "No user cache file");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read user cache from {}", path.display()))?;
    let user: User = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse user cache from {}", path.display()))?;

    info!(path = %path.display(), user = %user.username, "User cache loaded");
    Ok(Some(user))
}

/// Delete the cache file, if present.
pub fn delete_user(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to delete user cache {}", path.display()))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
