pub mod health;

use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};

use crate::admin::{auth::require_admin, handlers as admin};
use crate::analytics::handlers as analytics;
use crate::chat::handlers as chat;
use crate::forms::handlers as forms;
use crate::roi::handlers as roi;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    // Everything here requires a valid `admin_session` cookie.
    let console = Router::new()
        .route("/api/admin/me", get(admin::handle_me))
        // Chat console
        .route(
            "/api/admin/conversations",
            get(chat::handle_list_conversations),
        )
        .route(
            "/api/admin/conversations/:id",
            get(chat::handle_get_conversation),
        )
        .route(
            "/api/admin/conversations/:id/reply",
            post(chat::handle_agent_reply),
        )
        .route(
            "/api/admin/conversations/:id/resolve",
            post(chat::handle_resolve),
        )
        // Leads
        .route(
            "/api/admin/submissions",
            get(forms::handle_list_submissions),
        )
        .route(
            "/api/admin/submissions/:id",
            patch(forms::handle_update_submission),
        )
        // Users and 2FA
        .route(
            "/api/admin/users",
            get(admin::handle_list_users).post(admin::handle_create_user),
        )
        .route("/api/admin/users/:id", delete(admin::handle_delete_user))
        .route("/api/admin/2fa/setup", post(admin::handle_totp_setup))
        .route("/api/admin/2fa/enable", post(admin::handle_totp_enable))
        .route("/api/admin/2fa/disable", post(admin::handle_totp_disable))
        // Dashboard
        .route("/api/admin/analytics", get(analytics::handle_summary))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(health::health_handler))
        // Marketing forms
        .route("/api/contact", post(forms::handle_contact))
        .route("/api/demo", post(forms::handle_demo))
        // Chat widget
        .route("/api/chat", post(chat::handle_chat))
        .route("/api/chat/handoff", post(chat::handle_handoff))
        .route(
            "/api/chat/:session_id/messages",
            get(chat::handle_session_messages),
        )
        // ROI calculator
        .route("/api/roi/calculate", post(roi::handle_calculate))
        .route("/api/roi/request-code", post(roi::handle_request_code))
        .route("/api/roi/verify", post(roi::handle_verify))
        // Analytics beacon
        .route("/api/analytics/track", post(analytics::handle_track))
        // Console sign-in
        .route("/api/admin/login", post(admin::handle_login))
        .route("/api/admin/logout", post(admin::handle_logout))
        .merge(console)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::email::testing::RecordingMailer;

    fn app() -> Router {
        build_router(AppState::for_tests(Arc::new(RecordingMailer::default())))
    }

    fn json_request(method: Method, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "site-api");
    }

    #[tokio::test]
    async fn test_contact_validation_error_shape() {
        let response = app()
            .oneshot(json_request(
                Method::POST,
                "/api/contact",
                r#"{"first_name":"","last_name":"Lee","email":"nope","message":"hi"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_console_requires_session_cookie() {
        for uri in ["/api/admin/me", "/api/admin/analytics", "/api/admin/users"] {
            let response = app()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_roi_calculate() {
        let response = app()
            .oneshot(json_request(
                Method::POST,
                "/api/roi/calculate",
                r#"{"inputs":{"annual_revenue":36500000,"current_dso":60,"monthly_invoices":1000}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["preview"]["cash_released"], 1_800_000.0);
    }

    #[tokio::test]
    async fn test_track_drops_admin_paths_without_storing() {
        let response = app()
            .oneshot(json_request(
                Method::POST,
                "/api/analytics/track",
                r#"{"visitor_id":"v1","path":"/admin/login"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_chat_rejects_bad_session_id() {
        let response = app()
            .oneshot(json_request(
                Method::POST,
                "/api/chat",
                r#"{"session_id":"has spaces","message":"hello"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
