use anyhow::{bail, Result};
use std::net::SocketAddr;
use tracing::info;

use library_api_server::{
    config::Settings, logging, routes, security::PasswordService, state::ServerContext,
};

#[tokio::main]
async fn main() -> Result<()> {
    // `library-api-server hash-password <password>` prints a value for auth.password_hash
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("hash-password") {
        let Some(password) = args.get(2) else {
            bail!("usage: library-api-server hash-password <password>");
        };
        println!("{}", PasswordService::hash(password)?);
        return Ok(());
    }

    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    let _log_guard = logging::init(&settings.logging);

    info!("🚀 Starting Library API Server...");

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    let ctx = ServerContext::bootstrap(settings)?;
    info!("✅ Server context initialized");

    let app = routes::build_router(ctx.clone());

    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ctx.shutdown();
    info!("👋 Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
