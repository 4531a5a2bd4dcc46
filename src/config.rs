//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (login credentials) and the API base URL override are
//! referenced by env-var name in the config and resolved at runtime
//! via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub betting: BettingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    /// Env var that, when set, overrides `base_url`.
    #[serde(default)]
    pub base_url_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_logout_path")]
    pub logout_path: String,
    #[serde(default = "default_me_path")]
    pub me_path: String,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    /// Where the client is sent when the session cannot be recovered.
    #[serde(default = "default_login_url")]
    pub login_url: String,
    pub email_env: Option<String>,
    pub password_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BettingConfig {
    pub min_stake: Decimal,
    pub max_stake: Decimal,
    /// Upper bound on a single leg placement call. Unbounded when absent.
    #[serde(default)]
    pub leg_timeout_secs: Option<u64>,
    /// Debit the bonus pool instead of cash.
    #[serde(default)]
    pub use_bonus_balance: bool,
}

/// Client-side bounds on withdrawal requests.
#[derive(Debug, Deserialize, Clone)]
pub struct WalletConfig {
    pub min_withdrawal: Decimal,
    pub max_withdrawal: Decimal,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    /// JSON file mirroring the cached user. In-memory only when absent.
    pub user_cache_path: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_login_path() -> String {
    "/auth/login".to_string()
}

fn default_logout_path() -> String {
    "/auth/logout".to_string()
}

fn default_me_path() -> String {
    "/auth/me".to_string()
}

fn default_refresh_path() -> String {
    "/auth/refresh-token".to_string()
}

fn default_login_url() -> String {
    "/auth/login".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            login_path: default_login_path(),
            logout_path: default_logout_path(),
            me_path: default_me_path(),
            refresh_path: default_refresh_path(),
            login_url: default_login_url(),
            email_env: None,
            password_env: None,
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            min_withdrawal: dec!(100),
            max_withdrawal: dec!(50000),
        }
    }
}

impl Default for BettingConfig {
    fn default() -> Self {
        Self {
            min_stake: dec!(1),
            max_stake: dec!(10000),
            leg_timeout_secs: None,
            use_bonus_balance: false,
        }
    }
}

impl ApiConfig {
    /// The base URL, honouring the env override when it is set.
    pub fn resolved_base_url(&self) -> String {
        self.base_url_env
            .as_deref()
            .and_then(|name| AppConfig::resolve_env(name).ok())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.base_url.clone())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AuthConfig {
    /// Login credentials from the configured env vars, if both are set.
    pub fn credentials(&self) -> Option<(String, SecretString)> {
        let email = AppConfig::resolve_env(self.email_env.as_deref()?).ok()?;
        let password = AppConfig::resolve_env(self.password_env.as_deref()?).ok()?;
        Some((email, SecretString::new(password)))
    }
}

impl BettingConfig {
    pub fn leg_timeout(&self) -> Option<Duration> {
        self.leg_timeout_secs.map(Duration::from_secs)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        if config.betting.min_stake > config.betting.max_stake {
            anyhow::bail!(
                "betting.min_stake ({}) exceeds betting.max_stake ({})",
                config.betting.min_stake,
                config.betting.max_stake
            );
        }
        if config.wallet.min_withdrawal > config.wallet.max_withdrawal {
            anyhow::bail!(
                "wallet.min_withdrawal ({}) exceeds wallet.max_withdrawal ({})",
                config.wallet.min_withdrawal,
                config.wallet.max_withdrawal
            );
        }
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
