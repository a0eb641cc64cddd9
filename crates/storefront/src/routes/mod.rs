//! HTTP route handlers for the storefront API.
//!
//! # Route Structure
//!
//! ```text
//! GET   /health                  - Liveness check
//! GET   /health/ready            - Readiness check (database)
//!
//! # Session identity
//! POST  /api/auth/guest          - Start a guest session
//! POST  /api/auth/register       - Create account, carry guest session forward
//! POST  /api/auth/login          - Sign in, carry guest session forward
//! POST  /api/auth/refresh        - Rotate credentials
//! POST  /api/auth/logout         - Revoke session (Bearer)
//! GET   /api/auth/session        - Current subject + delivery preference (Bearer)
//! PATCH /api/auth/update-session - Save delivery location (Bearer)
//!
//! # Delivery lookups
//! GET   /api/delivery/states     - Fixed state lookup
//! GET   /api/delivery/zones      - Active zones, `?state=<code>`
//! GET   /api/delivery/zones/{id} - One active zone, uncached
//! ```

pub mod auth;
pub mod delivery;
pub mod health;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// Create the session identity routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/guest", post(auth::guest))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/session", get(auth::session))
        .route("/update-session", patch(auth::update_session))
}

/// Create the delivery lookup routes router.
pub fn delivery_routes() -> Router<AppState> {
    Router::new()
        .route("/states", get(delivery::states))
        .route("/zones", get(delivery::zones))
        .route("/zones/{id}", get(delivery::zone))
}

fn assemble(auth: Router<AppState>, delivery: Router<AppState>) -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/auth", auth)
        .nest("/api/delivery", delivery)
}

/// Create all routes without rate limiting.
pub fn routes() -> Router<AppState> {
    assemble(auth_routes(), delivery_routes())
}

/// Create all routes with per-IP rate limits on the API.
pub fn rate_limited_routes() -> Router<AppState> {
    assemble(
        auth_routes().layer(auth_rate_limiter()),
        delivery_routes().layer(api_rate_limiter()),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode, header},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use luzimarket_core::{DeliveryZone, DeliveryZoneId, StateCode};

    use super::*;
    use crate::config::test_config;
    use crate::state::Stores;

    fn zone(id: i32, state: &str, name: &str, fee: i64) -> DeliveryZone {
        DeliveryZone {
            id: DeliveryZoneId::new(id),
            state_code: StateCode::parse(state).unwrap(),
            name: name.to_string(),
            fee,
        }
    }

    fn app() -> Router {
        let stores = Stores::in_memory(vec![
            zone(1, "nuevo-leon", "Monterrey", 5000),
            zone(2, "coahuila", "Saltillo", 7500),
            zone(3, "coahuila", "Torreón", 9000),
        ]);
        let state = AppState::with_stores(test_config(), None, stores).unwrap();
        routes().with_state(state)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    fn token(pair: &Value, field: &str) -> String {
        pair[field].as_str().unwrap().to_string()
    }

    async fn register(app: &Router, email: &str, bearer: Option<&str>) -> Value {
        let (status, pair) = send(
            app,
            Method::POST,
            "/api/auth/register",
            bearer,
            Some(json!({"email": email, "password": "long-enough-pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        pair
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, _) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::GET, "/health/ready", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_guest_bootstrap_and_session() {
        let app = app();
        let (status, pair) = send(&app, Method::POST, "/api/auth/guest", None, None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(pair["subjectType"], "guest");

        let (status, session) = send(
            &app,
            Method::GET,
            "/api/auth/session",
            Some(&token(&pair, "accessToken")),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(session["sessionId"], pair["sessionId"]);
        assert_eq!(session["delivery"]["status"], "none");
        assert!(session.get("userId").is_none());
    }

    #[tokio::test]
    async fn test_missing_and_invalid_bearer() {
        let app = app();
        let body = json!({"deliveryZoneId": 2, "stateCode": "coahuila"});

        let (status, missing) = send(
            &app,
            Method::PATCH,
            "/api/auth/update-session",
            None,
            Some(body.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(missing["error"], "No active session");

        let (status, invalid) = send(
            &app,
            Method::PATCH,
            "/api/auth/update-session",
            Some("forged.token"),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(invalid["error"], "Unauthorized");
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_replay_fails() {
        let app = app();
        let (_, pair) = send(&app, Method::POST, "/api/auth/guest", None, None).await;
        let refresh = token(&pair, "refreshToken");

        let (status, rotated) = send(
            &app,
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({"refreshToken": refresh})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rotated["sessionId"], pair["sessionId"]);

        let (status, replay) = send(
            &app,
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({"refreshToken": refresh})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(replay["error"], "Unauthorized");

        let (status, garbage) = send(
            &app,
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({"refreshToken": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(garbage, replay);
    }

    #[tokio::test]
    async fn test_authenticated_save_round_trips() {
        let app = app();
        let pair = register(&app, "shopper@example.com", None).await;
        let access = token(&pair, "accessToken");

        let (status, saved) = send(
            &app,
            Method::PATCH,
            "/api/auth/update-session",
            Some(&access),
            Some(json!({"deliveryZoneId": 2, "stateCode": "coahuila"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["message"], "Delivery location saved to your account.");
        assert_eq!(saved["preference"]["stateCode"], "coahuila");
        assert_eq!(saved["preference"]["zoneId"], 2);
        assert_eq!(saved["preference"]["zoneFee"], 7500);

        let (_, session) =
            send(&app, Method::GET, "/api/auth/session", Some(&access), None).await;
        assert_eq!(session["subjectType"], "authenticated");
        assert_eq!(session["delivery"]["status"], "valid");
        assert_eq!(session["delivery"]["preference"]["zoneId"], 2);
    }

    #[tokio::test]
    async fn test_update_rejects_mismatched_state() {
        let app = app();
        let (_, pair) = send(&app, Method::POST, "/api/auth/guest", None, None).await;
        let access = token(&pair, "accessToken");

        for body in [
            json!({"deliveryZoneId": 2, "stateCode": "nuevo-leon"}),
            json!({"deliveryZoneId": 42}),
            json!({"deliveryZoneId": 1, "stateCode": "atlantis"}),
        ] {
            let (status, error) = send(
                &app,
                Method::PATCH,
                "/api/auth/update-session",
                Some(&access),
                Some(body),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(error["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_login_merges_guest_preference() {
        let app = app();

        // Account with a durable preference saved from another session.
        let account = register(&app, "merge@example.com", None).await;
        send(
            &app,
            Method::PATCH,
            "/api/auth/update-session",
            Some(&token(&account, "accessToken")),
            Some(json!({"deliveryZoneId": 3, "stateCode": "coahuila"})),
        )
        .await;

        // A guest picks a different location, then logs in.
        let (_, guest) = send(&app, Method::POST, "/api/auth/guest", None, None).await;
        let guest_access = token(&guest, "accessToken");
        let (status, saved) = send(
            &app,
            Method::PATCH,
            "/api/auth/update-session",
            Some(&guest_access),
            Some(json!({"deliveryZoneId": 1, "stateCode": "nuevo-leon"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(saved["message"], "Delivery location saved for this visit.");

        let (status, authed) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            Some(&guest_access),
            Some(json!({"email": "merge@example.com", "password": "long-enough-pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(authed["sessionId"], guest["sessionId"]);

        let (_, session) = send(
            &app,
            Method::GET,
            "/api/auth/session",
            Some(&token(&authed, "accessToken")),
            None,
        )
        .await;
        assert_eq!(session["delivery"]["status"], "valid");
        assert_eq!(session["delivery"]["preference"]["stateCode"], "nuevo-leon");
        assert_eq!(session["delivery"]["preference"]["zoneId"], 1);

        // The guest access credential died with the upgrade.
        let (status, _) =
            send(&app, Method::GET, "/api/auth/session", Some(&guest_access), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_revokes_both_credentials() {
        let app = app();
        let pair = register(&app, "bye@example.com", None).await;
        let access = token(&pair, "accessToken");

        let (status, _) = send(&app, Method::POST, "/api/auth/logout", Some(&access), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, Method::GET, "/api/auth/session", Some(&access), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({"refreshToken": token(&pair, "refreshToken")})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_login_failures_are_uniform() {
        let app = app();
        register(&app, "known@example.com", None).await;

        let (status_a, body_a) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": "known@example.com", "password": "wrong-password"})),
        )
        .await;
        let (status_b, body_b) = send(
            &app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({"email": "unknown@example.com", "password": "long-enough-pw"})),
        )
        .await;
        assert_eq!(status_a, StatusCode::UNAUTHORIZED);
        assert_eq!(status_a, status_b);
        assert_eq!(body_a, body_b);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({"email": "known@example.com", "password": "long-enough-pw"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_delivery_lookups() {
        let app = app();

        let (status, states) = send(&app, Method::GET, "/api/delivery/states", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(states.as_array().unwrap().len(), 32);
        assert!(
            states
                .as_array()
                .unwrap()
                .iter()
                .any(|s| s["value"] == "coahuila" && s["label"] == "Coahuila")
        );

        let (status, zones) = send(
            &app,
            Method::GET,
            "/api/delivery/zones?state=coahuila",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let zones = zones.as_array().unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[0]["name"], "Saltillo");
        assert_eq!(zones[0]["fee"], 7500);

        let (status, _) = send(
            &app,
            Method::GET,
            "/api/delivery/zones?state=texas",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, zone) = send(&app, Method::GET, "/api/delivery/zones/3", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(zone["stateCode"], "coahuila");
        assert_eq!(zone["fee"], 9000);

        let (status, body) = send(&app, Method::GET, "/api/delivery/zones/99", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Delivery zone 99 is not available.");
    }
}
