//! reqwest transport against a local axum backend.
//!
//! The fake backend authenticates with `accessToken`/`refreshToken`
//! cookies and rotates the access token on refresh, so these tests
//! exercise the cookie store and the session guard over real HTTP.

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use garbet::api::{DateWindow, GarbetApi, MatchFilter};
use garbet::config::AuthConfig;
use garbet::session::{GuardEndpoints, SessionGuard};
use garbet::storage::UserCache;
use garbet::transport::http::HttpTransport;
use garbet::transport::{ApiRequest, Transport};
use garbet::types::{GarbetError, Role};

use crate::mock_transport::{MockBackend, RecordingRedirect};

const REFRESH_TOKEN: &str = "rt-1";

#[derive(Default)]
struct ServerState {
    access_token: Mutex<String>,
    issued: AtomicUsize,
    refreshes: AtomicUsize,
    refresh_revoked: Mutex<bool>,
}

impl ServerState {
    fn issue_access_token(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let token = format!("at-{n}");
        *self.access_token.lock().unwrap() = token.clone();
        token
    }

    /// Invalidate the access token the client holds.
    fn expire(&self) {
        *self.access_token.lock().unwrap() = "expired".to_string();
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        cookie(headers, "accessToken").as_deref() == Some(self.access_token.lock().unwrap().as_str())
    }
}

fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"message": "Token expired"}))).into_response()
}

async fn login(State(state): State<Arc<ServerState>>, Json(body): Json<Value>) -> Response {
    if body["password"] != "hunter2" {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Invalid credentials"})))
            .into_response();
    }
    let token = state.issue_access_token();
    (
        AppendHeaders([
            (header::SET_COOKIE, format!("accessToken={token}; Path=/; HttpOnly")),
            (header::SET_COOKIE, format!("refreshToken={REFRESH_TOKEN}; Path=/; HttpOnly")),
        ]),
        Json(json!({"user": {
            "_id": "u-9",
            "username": "operator1",
            "email": "ops@example.com",
            "role": "operator",
            "balance": 0
        }})),
    )
        .into_response()
}

async fn refresh(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    state.refreshes.fetch_add(1, Ordering::SeqCst);
    // Simulate a slow token service so concurrent 401s overlap the refresh.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let revoked = *state.refresh_revoked.lock().unwrap();
    if revoked || cookie(&headers, "refreshToken").as_deref() != Some(REFRESH_TOKEN) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Invalid refresh token"})))
            .into_response();
    }
    let token = state.issue_access_token();
    (
        AppendHeaders([(header::SET_COOKIE, format!("accessToken={token}; Path=/; HttpOnly"))]),
        Json(json!({"message": "Token refreshed"})),
    )
        .into_response()
}

async fn me(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    Json(json!({"user": {
        "_id": "u-9",
        "username": "operator1",
        "email": "ops@example.com",
        "role": "operator",
        "balance": 0
    }}))
    .into_response()
}

async fn matches(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    Json(MockBackend::matches_json()).into_response()
}

async fn place_bet(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    (StatusCode::CREATED, Json(json!({"betId": "b-http-1"}))).into_response()
}

/// Start the fake backend; returns its state and the API base URL.
async fn spawn_backend() -> (Arc<ServerState>, String) {
    let state = Arc::new(ServerState::default());
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh-token", post(refresh))
        .route("/api/auth/me", get(me))
        .route("/api/matches", get(matches))
        .route("/api/matches/:id/bet", post(place_bet))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (state, format!("http://{addr}/api"))
}

fn api_over(base_url: &str, redirect: &Arc<RecordingRedirect>) -> GarbetApi {
    let transport = HttpTransport::with_base_url(base_url, Duration::from_secs(5)).unwrap();
    let guard = Arc::new(SessionGuard::new(
        Arc::new(transport),
        Arc::new(UserCache::in_memory()),
        redirect.clone(),
        GuardEndpoints::default(),
    ));
    GarbetApi::new(guard, &AuthConfig::default())
}

fn password() -> secrecy::SecretString {
    secrecy::SecretString::new("hunter2".to_string())
}

#[tokio::test]
async fn test_login_sets_cookies_for_later_calls() {
    let (_state, base_url) = spawn_backend().await;
    let redirect = Arc::new(RecordingRedirect::default());
    let api = api_over(&base_url, &redirect);

    let user = api.login("ops@example.com", &password()).await.unwrap();
    assert_eq!(user.role, Role::Operator);
    assert_eq!(user.landing_path(), "/admin");

    let me = api.me().await.unwrap();
    assert_eq!(me.username, "operator1");
    assert!(api.guard().users().is_staff());
}

#[tokio::test]
async fn test_unauthenticated_transport_sees_raw_401() {
    let (_state, base_url) = spawn_backend().await;
    let transport = HttpTransport::with_base_url(&base_url, Duration::from_secs(5)).unwrap();

    let resp = transport.send(&ApiRequest::get("/auth/me")).await.unwrap();
    assert_eq!(resp.status, 401);
    assert_eq!(resp.error_message(), "Token expired");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_expired_cookie_refreshed_once_for_concurrent_calls() {
    let (state, base_url) = spawn_backend().await;
    let redirect = Arc::new(RecordingRedirect::default());
    let api = Arc::new(api_over(&base_url, &redirect));
    api.login("ops@example.com", &password()).await.unwrap();
    state.expire();

    let calls: Vec<_> = (0..6)
        .map(|_| {
            let api = api.clone();
            tokio::spawn(async move {
                api.list_matches(&MatchFilter::upcoming(DateWindow::All)).await
            })
        })
        .collect();

    for call in calls {
        let board = call.await.unwrap().unwrap();
        assert_eq!(board.len(), 2);
    }
    assert_eq!(state.refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(api.guard().refresh_count(), 1);
    assert_eq!(redirect.count(), 0);
}

#[tokio::test]
async fn test_bet_placed_after_cookie_rotation() {
    let (state, base_url) = spawn_backend().await;
    let redirect = Arc::new(RecordingRedirect::default());
    let api = api_over(&base_url, &redirect);
    api.login("ops@example.com", &password()).await.unwrap();
    let board = api
        .list_matches(&MatchFilter::upcoming(DateWindow::All))
        .await
        .unwrap();
    state.expire();

    let mut slip = garbet::betslip::BetSlip::new();
    slip.toggle_selection(
        garbet::api::selection_for(&board[0], garbet::api::Outcome::Home).unwrap(),
    )
    .unwrap();
    slip.set_stake(dec!(20)).unwrap();
    let policy = garbet::betslip::SlipPolicy {
        limits: garbet::betslip::StakeLimits::new(dec!(1), dec!(100)),
        leg_timeout: Some(Duration::from_secs(5)),
    };

    let receipts = slip.submit(&api, &policy).await.unwrap();
    assert_eq!(receipts[0].bet_id, "b-http-1");
    assert_eq!(state.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_revoked_refresh_token_ends_session() {
    let (state, base_url) = spawn_backend().await;
    let redirect = Arc::new(RecordingRedirect::default());
    let api = api_over(&base_url, &redirect);
    api.login("ops@example.com", &password()).await.unwrap();
    state.expire();
    *state.refresh_revoked.lock().unwrap() = true;

    let err = api.me().await.unwrap_err();

    assert!(matches!(err, GarbetError::AuthFailed { status: Some(401), .. }));
    assert_eq!(redirect.count(), 1);
    assert!(api.current_user().is_none());
}
