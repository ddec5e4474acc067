//! Webhook endpoint handlers.
//!
//! Once a request is authenticated the caller always gets `200 ok`, whatever
//! the payload looks like and whether or not the alert went out. Anything
//! else would make 17TRACK retry the push.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::classify::StatusClassifier;
use crate::notify::{AlertMessage, Notifier};
use crate::track::{TrackingUpdate, WebhookEnvelope};
use crate::web::signature::verify_signature;
use crate::Config;

/// Header carrying the 17TRACK signature.
const HEADER_SIGNATURE: &str = "sign";

/// Largest request body accepted before the request is rejected.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Liveness probe body.
pub const HEALTH_MESSAGE: &str = "OK - 17TRACK alert webhook running";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub classifier: Arc<StatusClassifier>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(config: Config, notifier: Arc<dyn Notifier>) -> Self {
        let classifier = StatusClassifier::from_config(&config);
        Self {
            config: Arc::new(config),
            classifier: Arc::new(classifier),
            notifier,
        }
    }
}

/// Reasons a webhook is rejected before its payload is looked at.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("request body could not be read as text")]
    UnreadableBody,

    #[error("invalid signature")]
    InvalidSignature,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        // Callers get the same answer whatever the reason.
        (StatusCode::UNAUTHORIZED, "invalid signature").into_response()
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Liveness probe.
pub async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, HEALTH_MESSAGE)
}

// =============================================================================
// 17TRACK Webhook
// =============================================================================

/// 17TRACK push endpoint.
///
/// This endpoint:
/// 1. Verifies the `sign` header against the raw body
/// 2. Ignores anything but `TRACKING_UPDATED` events
/// 3. Emails an alert when the latest status is an alertable failure
/// 4. Returns 200 OK
pub async fn track17_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let body = body.map_err(|e| {
        warn!(error = %e, status = %e.status(), "track17_body_unreadable");
        WebhookError::UnreadableBody
    })?;

    info!(
        body_length = body.len(),
        has_signature = headers.contains_key(HEADER_SIGNATURE),
        "track17_webhook_received"
    );

    let received = headers.get(HEADER_SIGNATURE).ok_or_else(|| {
        warn!("track17_signature_missing");
        WebhookError::MissingSignature
    })?;

    let received = received.to_str().map_err(|_| {
        warn!("track17_signature_not_ascii");
        WebhookError::InvalidSignature
    })?;

    let raw_body = std::str::from_utf8(&body).map_err(|e| {
        warn!(error = %e, "track17_body_not_utf8");
        WebhookError::UnreadableBody
    })?;

    if !verify_signature(raw_body, received, &state.config.track17_api_key) {
        warn!(body_length = body.len(), "track17_signature_invalid");
        return Err(WebhookError::InvalidSignature);
    }

    let envelope = WebhookEnvelope::parse(&body);
    if !envelope.is_tracking_update() {
        info!(event = ?envelope.event(), "track17_event_ignored");
        return Ok((StatusCode::OK, "ok"));
    }

    let update = envelope.tracking_update();
    let alertable = state
        .classifier
        .is_alertable(update.main_status.as_deref(), update.sub_status.as_deref());

    info!(
        tracking_number = %update.number_text(),
        main_status = ?update.main_status,
        sub_status = ?update.sub_status,
        alertable = alertable,
        "track17_tracking_updated"
    );

    if alertable {
        dispatch_alert(state.notifier.as_ref(), &update).await;
    }

    Ok((StatusCode::OK, "ok"))
}

/// Send the alert for `update`, logging rather than returning any failure.
async fn dispatch_alert(notifier: &dyn Notifier, update: &TrackingUpdate) {
    let alert = AlertMessage::shipment_issue(update);

    match notifier.send(&alert).await {
        Ok(()) => info!(
            channel = notifier.channel_type(),
            tracking_number = %update.number_text(),
            "alert_sent"
        ),
        Err(e) => error!(
            channel = notifier.channel_type(),
            tracking_number = %update.number_text(),
            error = %e,
            "alert_send_failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::AlertPolicy;
    use crate::notify::testing::RecordingNotifier;
    use crate::web::build_router;
    use crate::web::signature::sign;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    fn test_state(notifier: Arc<RecordingNotifier>) -> AppState {
        AppState::new(Config::for_tests(), notifier)
    }

    fn secret() -> String {
        Config::for_tests().track17_api_key
    }

    fn webhook_request(body: &str, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhook/17track")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("sign", signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn signed_request(body: &str) -> Request<Body> {
        webhook_request(body, Some(&sign(body, &secret())))
    }

    fn tracking_body(number: &str, status: &str, sub_status: &str) -> String {
        json!({
            "event": "TRACKING_UPDATED",
            "data": {
                "number": number,
                "track_info": {
                    "latest_status": {
                        "status": status,
                        "sub_status": sub_status
                    }
                }
            }
        })
        .to_string()
    }

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, String) {
        let response = build_router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    // ─── Health ───

    #[tokio::test]
    async fn health_returns_running_message() {
        let state = test_state(Arc::new(RecordingNotifier::default()));
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();

        let (status, body) = send(state, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, HEALTH_MESSAGE);
    }

    // ─── Authentication ───

    #[tokio::test]
    async fn missing_signature_returns_401() {
        let notifier = Arc::new(RecordingNotifier::default());
        let body = tracking_body("TN123", "DeliveryFailure", "DeliveryFailure_Rejected");

        let (status, text) = send(test_state(notifier.clone()), webhook_request(&body, None)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(text, "invalid signature");
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn wrong_signature_returns_401() {
        let notifier = Arc::new(RecordingNotifier::default());
        let body = tracking_body("TN123", "DeliveryFailure", "DeliveryFailure_Rejected");
        let forged = sign(&body, "wrong-secret");

        let (status, text) = send(
            test_state(notifier.clone()),
            webhook_request(&body, Some(&forged)),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(text, "invalid signature");
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn empty_signature_returns_401() {
        let notifier = Arc::new(RecordingNotifier::default());
        let body = tracking_body("TN123", "Exception", "Exception_Lost");

        let (status, _) = send(test_state(notifier.clone()), webhook_request(&body, Some(" "))).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn signature_header_is_case_insensitive() {
        let notifier = Arc::new(RecordingNotifier::default());
        let body = tracking_body("TN123", "InTransit", "");
        let signature = sign(&body, &secret()).to_uppercase();

        let request = Request::builder()
            .method("POST")
            .uri("/webhook/17track")
            .header("Sign", format!(" {} ", signature))
            .body(Body::from(body))
            .unwrap();

        let (status, _) = send(test_state(notifier), request).await;

        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn signature_covers_raw_body_not_reserialized_json() {
        let notifier = Arc::new(RecordingNotifier::default());
        let raw = "{\n  \"event\": \"TRACKING_UPDATED\",\n  \"data\": {\"number\": \"TN9\"}\n}";
        let compact = serde_json::from_str::<serde_json::Value>(raw)
            .unwrap()
            .to_string();

        let (status, _) = send(test_state(notifier.clone()), signed_request(raw)).await;
        assert_eq!(status, StatusCode::OK);

        let request = webhook_request(raw, Some(&sign(&compact, &secret())));
        let (status, _) = send(test_state(notifier), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_utf8_body_returns_401() {
        let notifier = Arc::new(RecordingNotifier::default());
        let request = Request::builder()
            .method("POST")
            .uri("/webhook/17track")
            .header("sign", sign("", &secret()))
            .body(Body::from(vec![0xff, 0xfe, 0xfd]))
            .unwrap();

        let (status, _) = send(test_state(notifier.clone()), request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn oversized_body_returns_401() {
        let notifier = Arc::new(RecordingNotifier::default());
        let body = json!({
            "event": "TRACKING_UPDATED",
            "pad": "a".repeat(MAX_BODY_BYTES + 1024 * 1024)
        })
        .to_string();

        let (status, text) = send(test_state(notifier.clone()), signed_request(&body)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(text, "invalid signature");
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn body_at_limit_is_accepted() {
        let notifier = Arc::new(RecordingNotifier::default());
        let prefix = r#"{"event":"OTHER","pad":""#;
        let suffix = r#""}"#;
        let pad = "a".repeat(MAX_BODY_BYTES - prefix.len() - suffix.len());
        let body = format!("{prefix}{pad}{suffix}");
        assert_eq!(body.len(), MAX_BODY_BYTES);

        let (status, _) = send(test_state(notifier), signed_request(&body)).await;

        assert_eq!(status, StatusCode::OK);
    }

    // ─── Payload handling ───

    #[tokio::test]
    async fn alertable_update_sends_one_email() {
        let notifier = Arc::new(RecordingNotifier::default());
        let body = tracking_body("TN123", "DeliveryFailure", "DeliveryFailure_Rejected");

        let (status, text) = send(test_state(notifier.clone()), signed_request(&body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "ok");

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].subject.contains("TN123"));
        assert!(sent[0].body.contains("Main status: DeliveryFailure\n"));
        assert!(sent[0].body.contains("Sub status: DeliveryFailure_Rejected\n"));
    }

    #[tokio::test]
    async fn non_failure_update_sends_nothing() {
        let notifier = Arc::new(RecordingNotifier::default());
        let body = tracking_body("TN123", "InTransit", "");

        let (status, text) = send(test_state(notifier.clone()), signed_request(&body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "ok");
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn unlisted_sub_status_sends_nothing() {
        let notifier = Arc::new(RecordingNotifier::default());
        let body = tracking_body("TN123", "Exception", "Exception_Other");

        let (status, _) = send(test_state(notifier.clone()), signed_request(&body)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn other_event_is_acknowledged_without_alert() {
        let notifier = Arc::new(RecordingNotifier::default());
        let body = json!({
            "event": "TRACKING_STOPPED",
            "data": {
                "number": "TN123",
                "track_info": {
                    "latest_status": {
                        "status": "DeliveryFailure",
                        "sub_status": "DeliveryFailure_Rejected"
                    }
                }
            }
        })
        .to_string();

        let (status, text) = send(test_state(notifier.clone()), signed_request(&body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "ok");
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn malformed_json_is_acknowledged() {
        let notifier = Arc::new(RecordingNotifier::default());

        let (status, text) = send(
            test_state(notifier.clone()),
            signed_request("{\"event\": \"TRACKING_UPDATED\", "),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "ok");
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn missing_fields_are_acknowledged() {
        let notifier = Arc::new(RecordingNotifier::default());
        let body = json!({ "event": "TRACKING_UPDATED", "data": { "track_info": null } }).to_string();

        let (status, _) = send(test_state(notifier.clone()), signed_request(&body)).await;

        assert_eq!(status, StatusCode::OK);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn notifier_failure_still_returns_200() {
        let notifier = Arc::new(RecordingNotifier::failing());
        let body = tracking_body("TN123", "Exception", "Exception_Returned");

        let (status, text) = send(test_state(notifier.clone()), signed_request(&body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(text, "ok");
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn any_failure_policy_alerts_on_unlisted_sub_status() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut config = Config::for_tests();
        config.alert_policy = AlertPolicy::AnyFailure;
        let state = AppState::new(config, notifier.clone());

        let body = tracking_body("TN777", "Exception", "Exception_Other");
        let (status, _) = send(state, signed_request(&body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(notifier.sent().len(), 1);
        assert!(notifier.sent()[0].subject.contains("TN777"));
    }

    #[tokio::test]
    async fn concurrent_requests_are_independent() {
        let notifier = Arc::new(RecordingNotifier::default());
        let state = test_state(notifier.clone());

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let state = state.clone();
                let sub = if i % 2 == 0 { "Exception_Lost" } else { "Exception_Other" };
                let body = tracking_body(&format!("TN{i}"), "Exception", sub);
                tokio::spawn(async move { send(state, signed_request(&body)).await })
            })
            .collect();

        for task in tasks {
            let (status, _) = task.await.unwrap();
            assert_eq!(status, StatusCode::OK);
        }

        assert_eq!(notifier.sent().len(), 4);
    }
}
