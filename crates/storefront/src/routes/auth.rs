//! Session and account route handlers.
//!
//! Every credential-issuing endpoint answers with a [`TokenPair`]. Register
//! and login carry a presented guest session forward, so the session ID and
//! the guest's delivery choice survive the upgrade.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::instrument;

use luzimarket_core::{
    DeliveryUpdate, DeliveryZoneId, SessionSummary, StateCode, SubjectContext, SubjectType,
    TokenPair,
};

use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::{OptionalSubject, RequireSubject};
use crate::models::User;
use crate::services::delivery::DeliveryError;
use crate::state::AppState;

// =============================================================================
// Request / Response Types
// =============================================================================

/// Email + password body for register and login.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// Body of a refresh request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Body of a delivery preference update.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    pub delivery_zone_id: DeliveryZoneId,
    #[serde(default)]
    pub state_code: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Start a guest session.
#[instrument(skip(state))]
pub async fn guest(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let pair = state
        .identity()
        .issue(SubjectType::Guest, None, None)
        .await?;
    Ok((StatusCode::CREATED, Json(pair)))
}

/// Create an account and sign it in.
#[instrument(skip(state, current, body), fields(email = %body.email))]
pub async fn register(
    State(state): State<AppState>,
    OptionalSubject(current): OptionalSubject,
    Json(body): Json<CredentialsRequest>,
) -> Result<impl IntoResponse> {
    let user = state.auth().register(&body.email, &body.password).await?;
    tracing::info!(user_id = %user.id, "account registered");

    let pair = sign_in(&state, current, &user).await?;
    Ok((StatusCode::CREATED, Json(pair)))
}

/// Sign in with email and password.
#[instrument(skip(state, current, body), fields(email = %body.email))]
pub async fn login(
    State(state): State<AppState>,
    OptionalSubject(current): OptionalSubject,
    Json(body): Json<CredentialsRequest>,
) -> Result<Json<TokenPair>> {
    let user = state.auth().login(&body.email, &body.password).await?;
    let pair = sign_in(&state, current, &user).await?;
    Ok(Json(pair))
}

/// Merge the caller's guest state into `user` and issue credentials.
async fn sign_in(
    state: &AppState,
    current: Option<SubjectContext>,
    user: &User,
) -> Result<TokenPair> {
    let guest_session = current
        .filter(|subject| !subject.is_authenticated())
        .map(|subject| subject.session_id());

    if let Some(session_id) = guest_session {
        state.delivery().merge_on_login(session_id, user.id).await?;
    }

    let pair = state
        .identity()
        .issue(SubjectType::Authenticated, Some(user.id), guest_session)
        .await?;

    set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(pair)
}

/// Exchange a rotation credential for a fresh pair.
#[instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenPair>> {
    let pair = state.identity().refresh(&body.refresh_token).await?;
    Ok(Json(pair))
}

/// End the session, invalidating both credentials.
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    RequireSubject(subject): RequireSubject,
) -> Result<StatusCode> {
    state.identity().revoke(subject.session_id()).await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// Describe the current subject and restore its delivery preference.
#[instrument(skip_all)]
pub async fn session(
    State(state): State<AppState>,
    RequireSubject(subject): RequireSubject,
) -> Result<Json<SessionSummary>> {
    let delivery = state.delivery().current_preference(&subject).await?;
    Ok(Json(SessionSummary {
        session_id: subject.session_id(),
        subject_type: subject.subject_type(),
        user_id: subject.user_id(),
        delivery,
    }))
}

/// Save the delivery location of the current subject.
#[instrument(skip(state, subject), fields(zone_id = %body.delivery_zone_id))]
pub async fn update_session(
    State(state): State<AppState>,
    RequireSubject(subject): RequireSubject,
    Json(body): Json<UpdateSessionRequest>,
) -> Result<Json<DeliveryUpdate>> {
    let state_code = body
        .state_code
        .as_deref()
        .map(StateCode::parse)
        .transpose()
        .map_err(|e| AppError::Delivery(DeliveryError::InvalidSelection(format!("{e}."))))?;

    let saved = state
        .delivery()
        .update_preference(&subject, state_code, body.delivery_zone_id)
        .await?;

    Ok(Json(DeliveryUpdate {
        message: saved.message.to_string(),
        preference: saved.preference,
    }))
}
