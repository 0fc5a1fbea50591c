use axum::{middleware, routing::{get, MethodRouter}, Router};
use tower_http::{
    catch_panic::CatchPanicLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::handlers;
use crate::security::{request_gate, Gate};
use crate::state::ServerContext;

/// A gated route: its path, whether it needs an authenticated session,
/// and the handler(s) behind it.
pub struct Endpoint {
    pub path: &'static str,
    pub requires_auth: bool,
    pub handler: MethodRouter<ServerContext>,
}

impl Endpoint {
    pub fn new(path: &'static str, handler: MethodRouter<ServerContext>) -> Self {
        Self {
            path,
            requires_auth: true,
            handler,
        }
    }

    /// Reachable without an authenticated session.
    pub fn public(mut self) -> Self {
        self.requires_auth = false;
        self
    }
}

pub fn endpoints() -> Vec<Endpoint> {
    vec![
        Endpoint::new("/api/cover/{manga_id}", get(handlers::cover::cover_handler)),
        Endpoint::new(
            "/api/download/{manga_id}/{chapter_id}",
            get(handlers::download::download_chapter),
        ),
        Endpoint::new(
            "/api/auth",
            get(handlers::auth::check_session).post(handlers::auth::login),
        )
        .public(),
    ]
}

/// Wrap every endpoint in the request gate and mount it.
pub fn dispatch(ctx: ServerContext, endpoints: Vec<Endpoint>) -> Router {
    endpoints
        .into_iter()
        .fold(Router::<ServerContext>::new(), |router, endpoint| {
            let gate = Gate {
                ctx: ctx.clone(),
                requires_auth: endpoint.requires_auth,
            };
            router.route(
                endpoint.path,
                endpoint
                    .handler
                    .layer(middleware::from_fn_with_state(gate, request_gate)),
            )
        })
        .with_state(ctx)
}

pub fn build_router(ctx: ServerContext) -> Router {
    let static_dir = ctx.settings.server.static_dir.clone();
    let health = get(handlers::health::health_check).with_state(ctx.clone());

    dispatch(ctx, endpoints())
        // Public routes (not gated)
        .route("/health", health)
        // Static assets, including the placeholder cover
        .fallback_service(ServeDir::new(static_dir))
        // Tracing
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        // Panics outside the gated handlers surface as an opaque 500
        .layer(CatchPanicLayer::new())
}
