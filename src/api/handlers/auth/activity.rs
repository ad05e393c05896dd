//! Request interception for the auth surface.
//!
//! Every completed request against a recognized auth endpoint produces an
//! audit entry, and authentication failures feed the failed-attempt tracker.
//! Recording happens after the handler ran and never changes its response;
//! the only traffic this layer rejects itself is a body too large to buffer.

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{Method, StatusCode, header::CONTENT_LENGTH},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use super::utils::{error_response, extract_client_ip, normalize_email};
use crate::guard::{AuditEntry, AuditRecorder, FailedAttemptTracker};

/// Auth bodies are small; anything beyond this is not a legitimate request.
const MAX_CAPTURE_BYTES: usize = 64 * 1024;
const MAX_ERROR_CHARS: usize = 256;

const UNKNOWN_SOURCE: &str = "unknown";
const UNKNOWN_IDENTITY: &str = "unknown";

pub struct ActivityMonitor {
    recorder: Arc<dyn AuditRecorder>,
    tracker: FailedAttemptTracker,
}

impl ActivityMonitor {
    pub fn new(recorder: Arc<dyn AuditRecorder>, tracker: FailedAttemptTracker) -> Self {
        Self { recorder, tracker }
    }
}

/// Best-effort identity pulled from a request body before the handler
/// validates it; a missing or unreadable email is recorded as absent.
#[derive(Deserialize)]
struct IdentityProbe {
    email: Option<String>,
}

#[derive(Deserialize)]
struct ErrorProbe {
    error: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WatchedEndpoint {
    Register,
    Login,
    Refresh,
    Logout,
    LogoutAll,
    Sessions,
}

impl WatchedEndpoint {
    fn match_request(method: &Method, path: &str) -> Option<Self> {
        if *method == Method::POST {
            match path {
                "/v1/auth/register" => Some(Self::Register),
                "/v1/auth/login" => Some(Self::Login),
                "/v1/auth/refresh" => Some(Self::Refresh),
                "/v1/auth/logout" => Some(Self::Logout),
                "/v1/auth/logout-all" => Some(Self::LogoutAll),
                _ => None,
            }
        } else if *method == Method::GET && path == "/v1/auth/sessions" {
            Some(Self::Sessions)
        } else {
            None
        }
    }

    /// Only endpoints where a failure means bad credentials feed the
    /// tracker; token endpoints are audited but not counted.
    const fn counts_failures(self) -> bool {
        matches!(self, Self::Register | Self::Login)
    }

    const fn carries_identity(self) -> bool {
        matches!(self, Self::Register | Self::Login)
    }
}

pub async fn track(
    State(monitor): State<Arc<ActivityMonitor>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let Some(endpoint) = WatchedEndpoint::match_request(&method, &path) else {
        return next.run(request).await;
    };

    let source = extract_client_ip(request.headers());
    let user_agent = request
        .headers()
        .get("user-agent")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let (request, identity) = if endpoint.carries_identity() {
        match buffer_identity(request).await {
            Ok(buffered) => buffered,
            Err(rejection) => return rejection,
        }
    } else {
        (request, None)
    };

    let response = next.run(request).await;
    let (response, error) = capture_error(response).await;
    let status = response.status();

    monitor.recorder.record(AuditEntry {
        method: method.to_string(),
        path,
        status: status.as_u16(),
        identity: identity.clone(),
        source_address: source.as_deref().and_then(|ip| ip.parse().ok()),
        user_agent,
        error,
        recorded_at: Utc::now(),
    });

    if endpoint.counts_failures() {
        let source_key = source.as_deref().unwrap_or(UNKNOWN_SOURCE);
        let identity_key = identity.as_deref().unwrap_or(UNKNOWN_IDENTITY);
        if status.is_client_error() {
            monitor
                .tracker
                .record_failure(source_key, identity_key)
                .await;
        } else if status.is_success() {
            monitor
                .tracker
                .record_success(source_key, identity_key)
                .await;
        }
    }

    response
}

/// Buffer the request body to probe the claimed identity, then hand the
/// handler an identical request.
async fn buffer_identity(request: Request) -> Result<(Request, Option<String>), Response> {
    let (parts, body) = request.into_parts();
    let Ok(bytes) = to_bytes(body, MAX_CAPTURE_BYTES).await else {
        return Err(error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "Payload too large",
        ));
    };

    let identity = serde_json::from_slice::<IdentityProbe>(&bytes)
        .ok()
        .and_then(|probe| probe.email)
        .map(|email| normalize_email(&email));

    Ok((Request::from_parts(parts, Body::from(bytes)), identity))
}

/// Pull the error message out of a failed response, putting the body back
/// as found. Successful responses pass through unread.
async fn capture_error(response: Response) -> (Response, Option<String>) {
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return (response, None);
    }

    let (mut parts, body) = response.into_parts();
    let Ok(bytes) = to_bytes(body, MAX_CAPTURE_BYTES).await else {
        parts.headers.remove(CONTENT_LENGTH);
        return (Response::from_parts(parts, Body::empty()), None);
    };

    let error = if bytes.is_empty() {
        None
    } else if let Ok(probe) = serde_json::from_slice::<ErrorProbe>(&bytes) {
        Some(probe.error)
    } else {
        let text = String::from_utf8_lossy(&bytes);
        Some(text.chars().take(MAX_ERROR_CHARS).collect())
    };

    (Response::from_parts(parts, Body::from(bytes)), error)
}

#[cfg(test)]
mod tests {
    use super::super::types::ErrorResponse;
    use super::*;
    use crate::guard::{
        AlertSeverity, MemoryAlertDispatcher, MemoryAttemptStore, MemoryAuditRecorder,
        TrackerConfig,
    };
    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router, middleware};
    use tower::ServiceExt;

    struct Harness {
        router: Router,
        recorder: Arc<MemoryAuditRecorder>,
        alerts: Arc<MemoryAlertDispatcher>,
    }

    fn harness() -> Harness {
        let recorder = Arc::new(MemoryAuditRecorder::new());
        let alerts = Arc::new(MemoryAlertDispatcher::new());
        let config = TrackerConfig::new();
        let tracker = FailedAttemptTracker::new(
            Arc::new(MemoryAttemptStore::new(config.window_seconds())),
            alerts.clone(),
            config,
        );
        let monitor = Arc::new(ActivityMonitor::new(recorder.clone(), tracker));

        let router = Router::new()
            .route("/v1/auth/login", post(stub_login))
            .route("/health", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(monitor, track));

        Harness {
            router,
            recorder,
            alerts,
        }
    }

    async fn stub_login(headers: HeaderMap, body: Option<Json<serde_json::Value>>) -> Response {
        if headers.contains_key("x-pass") {
            let email = body
                .and_then(|Json(value)| {
                    value
                        .get("email")
                        .and_then(serde_json::Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or_default();
            return (StatusCode::OK, email).into_response();
        }
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Invalid credentials".to_string(),
            }),
        )
            .into_response()
    }

    fn login_request(pass: bool) -> Request {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/v1/auth/login")
            .header("content-type", "application/json")
            .header("x-real-ip", "203.0.113.9")
            .header("user-agent", "curl/8");
        if pass {
            builder = builder.header("x-pass", "1");
        }
        builder
            .body(Body::from(
                r#"{"email":" Alice@Example.COM ","password":"pw"}"#,
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn audit_entry_captures_request_and_outcome() {
        let h = harness();
        let response = h.router.clone().oneshot(login_request(false)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let entries = h.recorder.entries();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.method, "POST");
        assert_eq!(entry.path, "/v1/auth/login");
        assert_eq!(entry.status, 401);
        assert_eq!(entry.identity.as_deref(), Some("alice@example.com"));
        assert_eq!(entry.source_address, "203.0.113.9".parse().ok());
        assert_eq!(entry.user_agent.as_deref(), Some("curl/8"));
        assert_eq!(entry.error.as_deref(), Some("Invalid credentials"));
    }

    #[tokio::test]
    async fn five_failures_raise_one_high_alert() {
        let h = harness();
        for _ in 0..5 {
            let response = h.router.clone().oneshot(login_request(false)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
        assert_eq!(h.alerts.count_of(AlertSeverity::High), 1);
        assert_eq!(h.alerts.count_of(AlertSeverity::Critical), 0);
    }

    #[tokio::test]
    async fn success_clears_the_failure_counter() {
        let h = harness();
        for _ in 0..4 {
            h.router.clone().oneshot(login_request(false)).await.unwrap();
        }
        let response = h.router.clone().oneshot(login_request(true)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        for _ in 0..4 {
            h.router.clone().oneshot(login_request(false)).await.unwrap();
        }
        assert!(h.alerts.sent().is_empty());
    }

    #[tokio::test]
    async fn unwatched_paths_pass_through_untouched() {
        let h = harness();
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = h.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(h.recorder.entries().is_empty());
    }

    #[tokio::test]
    async fn downstream_handler_still_reads_the_body() {
        let h = harness();
        let response = h.router.clone().oneshot(login_request(true)).await.unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b" Alice@Example.COM ");
    }

    #[tokio::test]
    async fn oversized_identity_payload_is_rejected() {
        let h = harness();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/auth/login")
            .body(Body::from(vec![b'a'; MAX_CAPTURE_BYTES + 1]))
            .unwrap();
        let response = h.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn endpoint_matching_is_method_aware() {
        assert_eq!(
            WatchedEndpoint::match_request(&Method::POST, "/v1/auth/login"),
            Some(WatchedEndpoint::Login)
        );
        assert_eq!(
            WatchedEndpoint::match_request(&Method::GET, "/v1/auth/login"),
            None
        );
        assert_eq!(
            WatchedEndpoint::match_request(&Method::GET, "/v1/auth/sessions"),
            Some(WatchedEndpoint::Sessions)
        );
        assert_eq!(
            WatchedEndpoint::match_request(&Method::POST, "/v1/other"),
            None
        );
        assert!(!WatchedEndpoint::Refresh.counts_failures());
        assert!(WatchedEndpoint::Register.counts_failures());
    }
}
