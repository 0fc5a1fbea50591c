use crate::security::{CurrentSession, PasswordService};
use crate::state::ServerContext;
use crate::utils::{error::ApiError, response::Envelope};
use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthStatus {
    pub auth_enabled: bool,
    pub authenticated: bool,
}

/// GET /api/auth - report whether the caller's session is authenticated.
pub async fn check_session(
    State(ctx): State<ServerContext>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
) -> Json<Envelope<AuthStatus>> {
    Json(Envelope::with(AuthStatus {
        auth_enabled: ctx.sessions.auth_enabled(),
        authenticated: ctx.sessions.is_authenticated(&session),
    }))
}

/// POST /api/auth - authenticate the caller's session with the server password.
pub async fn login(
    State(ctx): State<ServerContext>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<Envelope>, ApiError> {
    let Json(request) =
        payload.map_err(|_| ApiError::Validation("Password must be specified!".to_string()))?;

    let Some(hash) = ctx.settings.auth.password_hash.as_deref() else {
        return Err(ApiError::Validation("No password has been configured!".to_string()));
    };

    let verified = PasswordService::verify(&request.password, hash).map_err(|e| {
        error!("Configured password hash is unusable: {}", e);
        ApiError::Internal("Server password is misconfigured!".to_string())
    })?;

    if !verified {
        warn!("Failed login attempt");
        return Err(ApiError::Unauthenticated("Incorrect password!".to_string()));
    }

    ctx.sessions.authenticate_session(&session);
    info!("Session authenticated");
    Ok(Json(Envelope::ok()))
}
