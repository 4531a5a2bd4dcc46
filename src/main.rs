//! Garbet client entry point.
//!
//! Loads configuration, initialises structured logging, restores (or
//! opens) the session, prints the match board with 1X2 prices and,
//! when picks are supplied, prices a bet slip and optionally places it.
//!
//! Usage: `garbet [today|tomorrow|3days|all]`
//!
//! Environment:
//! - `GARBET_PICKS`: comma-separated `matchId:outcome` picks, e.g. `m1:1,m2:X`
//! - `GARBET_STAKE`: stake for the slip
//! - `GARBET_PLACE`: set to place the slip rather than only price it
//! - `GARBET_WITHDRAW`: amount to request as an IBAN withdrawal

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

use garbet::api::{
    selection_for, DateWindow, GarbetApi, MatchFilter, OneXTwo, Outcome, WithdrawalLimits,
};
use garbet::betslip::{BalancePool, BetSlip, SlipPolicy};
use garbet::config::AppConfig;
use garbet::session::{GuardEndpoints, LogRedirect, SessionGuard};
use garbet::storage::UserCache;
use garbet::transport::http::HttpTransport;
use garbet::types::Match;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;
    init_logging();

    let window = parse_window(std::env::args().nth(1).as_deref())?;
    info!(
        base_url = %cfg.api.resolved_base_url(),
        window = ?window,
        "Garbet client starting"
    );

    // -- Wire up the session guard and API -------------------------------

    let users = Arc::new(match &cfg.storage.user_cache_path {
        Some(path) => UserCache::persistent(path)?,
        None => UserCache::in_memory(),
    });
    let transport = Arc::new(HttpTransport::new(&cfg.api)?);
    let guard = Arc::new(SessionGuard::new(
        transport,
        users,
        Arc::new(LogRedirect::new(cfg.auth.login_url.clone())),
        GuardEndpoints::from(&cfg.auth),
    ));
    let api = GarbetApi::new(guard, &cfg.auth);

    // -- Session ---------------------------------------------------------

    let user = match api.restore_session().await {
        Some(user) => Some(user),
        None => match cfg.auth.credentials() {
            Some((email, password)) => match api.login(&email, &password).await {
                Ok(user) => Some(user),
                Err(e) => {
                    error!(error = %e, "Login failed");
                    None
                }
            },
            None => {
                warn!("No session and no credentials configured, continuing anonymously");
                None
            }
        },
    };
    if let Some(user) = &user {
        println!("{user}  -> {}", user.landing_path());
        show_wallet(&api, &WithdrawalLimits::from(&cfg.wallet)).await?;
    }

    // -- Match board -----------------------------------------------------

    let matches = api
        .list_matches(&MatchFilter::upcoming(window))
        .await
        .context("Failed to load matches")?;
    info!(count = matches.len(), "Match board loaded");
    for m in &matches {
        println!("{:<12} {}  {}", m.id, m, OneXTwo::of(m));
    }

    // -- Bet slip --------------------------------------------------------

    let Ok(picks) = std::env::var("GARBET_PICKS") else {
        return Ok(());
    };

    let mut slip = BetSlip::new();
    if cfg.betting.use_bonus_balance {
        slip.set_balance_pool(BalancePool::Bonus);
    }
    for pick in picks.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let selection = find_pick(&matches, pick)
            .with_context(|| format!("Pick {pick:?} does not match a priced outcome"))?;
        slip.toggle_selection(selection)?;
    }
    if let Ok(stake) = std::env::var("GARBET_STAKE") {
        slip.set_stake_str(&stake)?;
    }

    for (i, sel) in slip.selections().iter().enumerate() {
        println!("  #{i} {sel}");
    }
    println!(
        "Combined odds: {}  Stake: {:.2}  Potential payout: {}",
        slip.display_combined_odds(),
        slip.stake(),
        slip.display_payout()
    );

    let policy = SlipPolicy::from(&cfg.betting);
    if std::env::var("GARBET_PLACE").is_err() {
        slip.validate_for_submission(&policy.limits)?;
        info!("Slip is valid; set GARBET_PLACE to submit it");
        return Ok(());
    }

    match slip.submit(&api, &policy).await {
        Ok(receipts) => {
            for receipt in &receipts {
                println!("  placed {receipt}");
            }
            if let Ok(user) = api.me().await {
                info!(balance = %user.balance, bonus = %user.bonus_balance, "Balance after placement");
            }
        }
        Err(e) => {
            error!(error = %e, "Slip submission failed");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Recent activity and withdrawal requests; requests a withdrawal when
/// `GARBET_WITHDRAW` is set.
async fn show_wallet(api: &GarbetApi, limits: &WithdrawalLimits) -> Result<()> {
    if let Ok(amount) = std::env::var("GARBET_WITHDRAW") {
        let amount = amount
            .trim()
            .parse::<Decimal>()
            .with_context(|| format!("GARBET_WITHDRAW {amount:?} is not an amount"))?;
        match api.create_withdrawal(amount, limits).await {
            Ok(_) => info!(amount = %amount, "Withdrawal request submitted"),
            Err(e) => warn!(error = %e, "Withdrawal not requested"),
        }
    }

    match api.my_transactions(Some(5)).await {
        Ok(txs) => {
            for tx in &txs {
                println!("  {tx}");
            }
        }
        Err(e) => warn!(error = %e, "Could not load transactions"),
    }
    match api.withdrawal_requests().await {
        Ok(requests) => {
            for r in requests.iter().filter(|r| r.status.is_cancellable()) {
                println!("  withdrawal {} {:.2} to {} ({})", r.id, r.amount, r.masked_iban(), r.status);
            }
        }
        Err(e) => warn!(error = %e, "Could not load withdrawal requests"),
    }
    Ok(())
}

/// Map the CLI argument to a kickoff window (default: today).
fn parse_window(arg: Option<&str>) -> Result<DateWindow> {
    match arg.map(str::to_ascii_lowercase).as_deref() {
        None | Some("today") => Ok(DateWindow::Today),
        Some("tomorrow") => Ok(DateWindow::Tomorrow),
        Some("3days") | Some("three-days") => Ok(DateWindow::ThreeDays),
        Some("all") => Ok(DateWindow::All),
        Some(other) => anyhow::bail!("Unknown window {other:?} (expected today|tomorrow|3days|all)"),
    }
}

/// Resolve a `matchId:outcome` pick against the board.
fn find_pick(matches: &[Match], pick: &str) -> Option<garbet::betslip::BetSelection> {
    let (match_id, code) = pick.split_once(':')?;
    let outcome = Outcome::from_code(code)?;
    let m = matches.iter().find(|m| m.id == match_id)?;
    selection_for(m, outcome)
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("garbet=info"));

    if std::env::var("GARBET_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
