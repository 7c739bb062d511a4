use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use echo_hub::{create_router, AppState, SessionState, StatusUpdate};
use tokio::sync::{watch, Notify};
use tower::ServiceExt;

fn app(state: SessionState) -> (axum::Router, watch::Sender<StatusUpdate>, Arc<Notify>) {
    let (tx, rx) = watch::channel(StatusUpdate::new("voice-test", state));
    let stop = Arc::new(Notify::new());
    let router = create_router(AppState::new(rx, Arc::clone(&stop)));
    (router, tx, stop)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (router, _tx, _stop) = app(SessionState::Idle);

    let response = router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_status_reports_latest_transition() {
    let (router, tx, _stop) = app(SessionState::Connecting);

    let mut update = StatusUpdate::new("voice-test", SessionState::Errored);
    update.detail = Some("Connection error: refused".to_string());
    tx.send_replace(update);

    let response = router
        .oneshot(Request::get("/session/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["session_id"], "voice-test");
    assert_eq!(json["state"], "errored");
    assert_eq!(json["detail"], "Connection error: refused");
}

#[tokio::test]
async fn test_stop_active_session() {
    let (router, _tx, stop) = app(SessionState::Active);

    let response = router
        .oneshot(
            Request::post("/session/stop")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["status"], "stopping");

    // The permit is stored until the session loop waits on it
    tokio::time::timeout(std::time::Duration::from_millis(100), stop.notified())
        .await
        .expect("stop was not signalled");
}

#[tokio::test]
async fn test_stop_closed_session_conflicts() {
    let (router, _tx, _stop) = app(SessionState::Closed);

    let response = router
        .oneshot(
            Request::post("/session/stop")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("Closed"));
}
