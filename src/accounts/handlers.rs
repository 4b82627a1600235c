use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    accounts::{
        dto::{
            ChangePasswordRequest, LoginRequest, OkResponse, Profile, ProfileQuery, PublicUser,
            RegisterRequest, UserResponse,
        },
        services,
    },
    error::AppError,
    state::AppState,
};

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/profile", get(get_profile))
        .route("/api/change-password", post(change_password))
}

/// Turn axum's plain-text JSON rejection into an envelope.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload.map(|Json(v)| v).map_err(|e| {
        warn!(error = %e, "malformed json body");
        AppError::validation("Invalid request body")
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<OkResponse>, AppError> {
    services::register(&state, json_body(payload)?).await?;
    Ok(Json(OkResponse::ok()))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<UserResponse<PublicUser>>, AppError> {
    let user = services::login(&state, json_body(payload)?).await?;
    Ok(Json(UserResponse::ok(user)))
}

#[instrument(skip(state, query))]
pub async fn get_profile(
    State(state): State<AppState>,
    query: Result<Query<ProfileQuery>, QueryRejection>,
) -> Result<Json<UserResponse<Profile>>, AppError> {
    let Query(query) = query.map_err(|_| AppError::validation(services::USERNAME_REQUIRED))?;
    let profile = services::get_profile(&state, query.username).await?;
    Ok(Json(UserResponse::ok(profile)))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<OkResponse>, AppError> {
    services::change_password(&state, json_body(payload)?).await?;
    Ok(Json(OkResponse::ok()))
}
