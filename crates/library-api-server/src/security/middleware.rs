use crate::library::LibraryLock;
use crate::session::{SessionId, SessionStore, SESSION_COOKIE};
use crate::state::ServerContext;
use crate::utils::error::ApiError;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::error;

/// Per-endpoint gate configuration.
#[derive(Clone)]
pub struct Gate {
    pub ctx: ServerContext,
    pub requires_auth: bool,
}

/// Session of the current request, available to handlers as an extension.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub SessionId);

/// Request gate - CORS, session cookie, auth check, then the handler under
/// the library master lock. CORS and a newly minted cookie are applied to
/// every outcome, including a handler fault.
pub async fn request_gate(
    State(gate): State<Gate>,
    mut request: Request,
    next: Next,
) -> Response {
    let sessions = &gate.ctx.sessions;

    let (session, minted) = match session_from_headers(request.headers()) {
        Some(id) => (id, false),
        None => (sessions.new_session(), true),
    };
    request
        .extensions_mut()
        .insert(CurrentSession(session.clone()));

    let mut response = match admit(sessions, &session, gate.requires_auth) {
        Ok(()) => run_handler(gate.ctx.library.master_lock(), next.run(request)).await,
        Err(rejection) => rejection.into_response(),
    };

    let headers = response.headers_mut();
    apply_cors(headers);
    if minted {
        set_session_cookie(headers, &session);
    }
    response
}

/// Auth decision for a session. Auto-authenticates when auth is disabled.
fn admit(
    sessions: &SessionStore,
    session: &SessionId,
    requires_auth: bool,
) -> Result<(), ApiError> {
    if !sessions.auth_enabled() {
        sessions.authenticate_session(session);
    }
    if requires_auth && !sessions.is_authenticated(session) {
        return Err(ApiError::not_authenticated());
    }
    Ok(())
}

/// Run the handler holding the lock. A panicking handler is logged once the
/// lock has been released and answered with an opaque 500.
async fn run_handler<F>(lock: LibraryLock, handler: F) -> Response
where
    F: Future<Output = Response>,
{
    match AssertUnwindSafe(lock.run(handler)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            error!("Exception handling route: {}", panic_message(panic.as_ref()));
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
}

/// Extract a non-blank `session` cookie.
pub fn session_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == SESSION_COOKIE)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
        .map(SessionId::from)
}

fn set_session_cookie(headers: &mut HeaderMap, session: &SessionId) {
    // Session ids are hex, always a valid header value
    if let Ok(value) = HeaderValue::from_str(&format!("{}={}; Path=/", SESSION_COOKIE, session)) {
        headers.insert(header::SET_COOKIE, value);
    }
}
