//! Match board queries and 1X2 price extraction.
//!
//! The backend lists matches with their markets; the sports pages only
//! offer the 1X2 (match winner) market on the board, keyed `1`, `X`, `2`.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rust_decimal::Decimal;
use std::fmt;

use crate::betslip::BetSelection;
use crate::transport::ApiRequest;
use crate::types::Match;

/// Market type code of the match winner market.
pub const ONE_X_TWO: &str = "1X2";
/// Display name sent with 1X2 placements.
pub const MATCH_WINNER: &str = "Match Winner";

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// A 1X2 outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Home, Outcome::Draw, Outcome::Away];

    /// Board column code.
    pub fn code(&self) -> &'static str {
        match self {
            Outcome::Home => "1",
            Outcome::Draw => "X",
            Outcome::Away => "2",
        }
    }

    /// Selection name as the backend spells it.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Home => "Team A Win",
            Outcome::Draw => "Draw",
            Outcome::Away => "Team B Win",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.code().eq_ignore_ascii_case(code))
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.label() == label)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The three 1X2 prices of a match; `None` where the backend has no price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OneXTwo {
    pub home: Option<Decimal>,
    pub draw: Option<Decimal>,
    pub away: Option<Decimal>,
}

impl OneXTwo {
    /// Extract the 1X2 prices from a match's markets.
    pub fn of(m: &Match) -> Self {
        let mut prices = OneXTwo::default();
        if let Some(market) = m.market(ONE_X_TWO) {
            for sel in &market.selections {
                match Outcome::from_label(&sel.name) {
                    Some(Outcome::Home) => prices.home = Some(sel.odds),
                    Some(Outcome::Draw) => prices.draw = Some(sel.odds),
                    Some(Outcome::Away) => prices.away = Some(sel.odds),
                    None => {}
                }
            }
        }
        prices
    }

    pub fn get(&self, outcome: Outcome) -> Option<Decimal> {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }
}

impl fmt::Display for OneXTwo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |p: Option<Decimal>| p.map(|d| format!("{d:.2}")).unwrap_or_else(|| "N/A".into());
        write!(
            f,
            "1: {} | X: {} | 2: {}",
            show(self.home),
            show(self.draw),
            show(self.away)
        )
    }
}

/// Build the slip selection for picking `outcome` on `m`.
/// `None` when the match has no price for it.
pub fn selection_for(m: &Match, outcome: Outcome) -> Option<BetSelection> {
    let odds = OneXTwo::of(m).get(outcome)?;
    Some(
        BetSelection::new(m.id.clone(), ONE_X_TWO, outcome.label(), odds)
            .with_names(m.display_name(), MATCH_WINNER),
    )
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Kickoff window for the match board, in UTC days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateWindow {
    Today,
    Tomorrow,
    ThreeDays,
    All,
}

impl DateWindow {
    /// Start and end of the window relative to `now`; `None` for `All`.
    pub fn bounds(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let midnight = now.date_naive().and_hms_opt(0, 0, 0)?.and_utc();
        match self {
            DateWindow::Today => Some((midnight, midnight + Duration::days(1))),
            DateWindow::Tomorrow => Some((midnight + Duration::days(1), midnight + Duration::days(2))),
            DateWindow::ThreeDays => Some((midnight, midnight + Duration::days(3))),
            DateWindow::All => None,
        }
    }
}

/// Query for `GET /matches`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchFilter {
    pub status: Option<String>,
    pub page: u32,
    pub limit: u32,
    pub window: DateWindow,
}

impl Default for MatchFilter {
    fn default() -> Self {
        Self::upcoming(DateWindow::Today)
    }
}

impl MatchFilter {
    /// Upcoming matches in `window`, first page of 50.
    pub fn upcoming(window: DateWindow) -> Self {
        Self {
            status: Some("upcoming".to_string()),
            page: 1,
            limit: 50,
            window,
        }
    }

    pub fn to_request(&self, path: &str, now: DateTime<Utc>) -> ApiRequest {
        let mut req = ApiRequest::get(path);
        if let Some(status) = &self.status {
            req = req.with_query("status", status);
        }
        req = req.with_query("page", self.page).with_query("limit", self.limit);
        if let Some((start, end)) = self.window.bounds(now) {
            req = req
                .with_query("startDate", start.to_rfc3339_opts(SecondsFormat::Millis, true))
                .with_query("endDate", end.to_rfc3339_opts(SecondsFormat::Millis, true));
        }
        req
    }
}
