//! Session guard behaviour against the scripted backend.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use garbet::api::GarbetApi;
use garbet::config::AuthConfig;
use garbet::session::{GuardEndpoints, SessionGuard};
use garbet::storage::UserCache;
use garbet::transport::ApiRequest;
use garbet::types::{GarbetError, User};

use crate::mock_transport::{MockBackend, RecordingRedirect};

fn guard_over(backend: &Arc<MockBackend>, redirect: &Arc<RecordingRedirect>) -> Arc<SessionGuard> {
    Arc::new(SessionGuard::new(
        backend.clone(),
        Arc::new(UserCache::in_memory()),
        redirect.clone(),
        GuardEndpoints::default(),
    ))
}

fn cached_user() -> User {
    serde_json::from_value(MockBackend::user_json()).unwrap()
}

/// Poll until `n` requests are parked behind the refresh.
async fn wait_for_waiters(guard: &SessionGuard, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while guard.waiting_requests() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("requests never queued behind the refresh");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_401s_share_one_refresh() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(MockBackend::new().with_refresh_gate(gate.clone()));
    let redirect = Arc::new(RecordingRedirect::default());
    let guard = guard_over(&backend, &redirect);
    backend.expire_session();

    const N: usize = 8;
    let handles: Vec<_> = (0..N)
        .map(|i| {
            let guard = guard.clone();
            tokio::spawn(async move {
                guard
                    .perform_request(&ApiRequest::get(format!("/profile/{i}")))
                    .await
            })
        })
        .collect();

    wait_for_waiters(&guard, N - 1).await;
    assert!(guard.is_refreshing());
    gate.notify_one();

    for handle in handles {
        let resp = handle.await.unwrap().unwrap();
        assert_eq!(resp.status, 200);
    }

    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(guard.refresh_count(), 1);
    for i in 0..N {
        // Original attempt plus exactly one retry.
        assert_eq!(backend.hits(&format!("/profile/{i}")), 2);
    }
    assert!(!guard.is_refreshing());
    assert_eq!(guard.waiting_requests(), 0);
    assert_eq!(redirect.count(), 0);
}

#[tokio::test]
async fn test_retry_that_401s_again_is_not_retried() {
    let backend = Arc::new(MockBackend::new());
    let redirect = Arc::new(RecordingRedirect::default());
    let guard = guard_over(&backend, &redirect);
    backend.expire_session();
    backend.set_refresh_hollow(true);

    let resp = guard
        .perform_request(&ApiRequest::get("/profile/me"))
        .await
        .unwrap();

    assert_eq!(resp.status, 401);
    assert_eq!(backend.hits("/profile/me"), 2);
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(redirect.count(), 0);
}

#[tokio::test]
async fn test_retry_that_401s_again_surfaces_as_auth_expired() {
    let backend = Arc::new(MockBackend::new());
    let redirect = Arc::new(RecordingRedirect::default());
    let api = GarbetApi::new(guard_over(&backend, &redirect), &AuthConfig::default());
    backend.expire_session();
    backend.set_refresh_hollow(true);

    assert_eq!(api.me().await.unwrap_err(), GarbetError::AuthExpired);
    assert_eq!(backend.hits("/auth/me"), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_refresh_failure_fails_everyone_and_redirects_once() {
    let gate = Arc::new(Notify::new());
    let backend = Arc::new(MockBackend::new().with_refresh_gate(gate.clone()));
    let redirect = Arc::new(RecordingRedirect::default());
    let guard = guard_over(&backend, &redirect);
    guard.users().store(cached_user());
    backend.expire_session();
    backend.set_refresh_status(401);

    const N: usize = 5;
    let handles: Vec<_> = (0..N)
        .map(|i| {
            let guard = guard.clone();
            tokio::spawn(async move {
                guard
                    .perform_request(&ApiRequest::get(format!("/profile/{i}")))
                    .await
            })
        })
        .collect();

    wait_for_waiters(&guard, N - 1).await;
    gate.notify_one();

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        match err {
            GarbetError::AuthFailed { status, .. } => assert_eq!(status, Some(401)),
            other => panic!("expected AuthFailed, got {other:?}"),
        }
    }

    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(redirect.count(), 1);
    assert!(!guard.users().is_authenticated());
    for i in 0..N {
        // Nobody is retried after a failed refresh.
        assert_eq!(backend.hits(&format!("/profile/{i}")), 1);
    }
    assert!(!guard.is_refreshing());
    assert_eq!(guard.waiting_requests(), 0);
}

#[tokio::test]
async fn test_guard_recovers_after_failed_refresh() {
    let backend = Arc::new(MockBackend::new());
    let redirect = Arc::new(RecordingRedirect::default());
    let guard = guard_over(&backend, &redirect);
    backend.expire_session();
    backend.set_refresh_status(403);

    let err = guard
        .perform_request(&ApiRequest::get("/profile/me"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(403));

    // A later expiry starts a fresh refresh rather than queueing forever.
    backend.set_refresh_status(200);
    let resp = guard
        .perform_request(&ApiRequest::get("/profile/me"))
        .await
        .unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(backend.refresh_calls(), 2);
    assert_eq!(redirect.count(), 1);
}

#[tokio::test]
async fn test_separate_expiries_refresh_separately() {
    let backend = Arc::new(MockBackend::new());
    let redirect = Arc::new(RecordingRedirect::default());
    let guard = guard_over(&backend, &redirect);

    for _ in 0..2 {
        backend.expire_session();
        let resp = guard
            .perform_request(&ApiRequest::get("/profile/me"))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
    }
    assert_eq!(backend.refresh_calls(), 2);
}

#[tokio::test]
async fn test_login_401_is_not_intercepted() {
    let backend = Arc::new(MockBackend::new());
    let redirect = Arc::new(RecordingRedirect::default());
    let api = GarbetApi::new(guard_over(&backend, &redirect), &AuthConfig::default());

    let err = api
        .login("deniz@example.com", &secrecy::SecretString::new("wrong".to_string()))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(backend.refresh_calls(), 0);
    assert_eq!(redirect.count(), 0);
}

#[tokio::test]
async fn test_refresh_endpoint_401_is_not_intercepted() {
    let backend = Arc::new(MockBackend::new());
    let redirect = Arc::new(RecordingRedirect::default());
    let guard = guard_over(&backend, &redirect);
    backend.set_refresh_status(401);

    let resp = guard
        .perform_request(&ApiRequest::post("/auth/refresh-token", None))
        .await
        .unwrap();

    assert_eq!(resp.status, 401);
    assert_eq!(backend.hits("/auth/refresh-token"), 1);
    assert_eq!(guard.refresh_count(), 0);
    assert_eq!(redirect.count(), 0);
}

#[tokio::test]
async fn test_restore_session_refreshes_stale_cookie() {
    let backend = Arc::new(MockBackend::new());
    let redirect = Arc::new(RecordingRedirect::default());
    let api = GarbetApi::new(guard_over(&backend, &redirect), &AuthConfig::default());
    backend.expire_session();

    let user = api.restore_session().await.unwrap();
    assert_eq!(user.username, "deniz");
    assert_eq!(user.landing_path(), "/dashboard");
    assert_eq!(api.current_user(), Some(user));
    assert_eq!(backend.refresh_calls(), 1);
}

#[tokio::test]
async fn test_restore_session_without_recoverable_session() {
    let backend = Arc::new(MockBackend::new());
    let redirect = Arc::new(RecordingRedirect::default());
    let api = GarbetApi::new(guard_over(&backend, &redirect), &AuthConfig::default());
    api.guard().users().store(cached_user());
    backend.expire_session();
    backend.set_refresh_status(401);

    assert!(api.restore_session().await.is_none());
    assert!(api.current_user().is_none());
    assert_eq!(redirect.count(), 1);
}
