//! HTTP server facade for shelf with Axum, error handling, and OpenAPI support.

use anyhow::Context;
use axum::{http::HeaderValue, routing::get, Router};

use shelf_kernel::{ModuleRegistry, Settings};

pub mod error;
pub mod extract;
pub mod response;
pub mod router;
pub mod validation;

pub use error::AppError;
pub use extract::{decode_json, JsonBody, QueryParams};
pub use response::ApiResponse;
pub use validation::{FieldError, FieldErrors};

use router::RouterBuilder;

/// Start the HTTP server and block until a shutdown signal arrives
pub async fn start_server(registry: &ModuleRegistry, settings: &Settings) -> anyhow::Result<()> {
    let app = build_router(registry, settings).context("failed to build HTTP router")?;

    let address = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind to {address}"))?;

    tracing::info!(address = %address, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Build the main HTTP router with all module routes mounted
pub fn build_router(registry: &ModuleRegistry, settings: &Settings) -> anyhow::Result<Router> {
    let api_prefix = settings.server.api_prefix.as_str();
    let mut router_builder = RouterBuilder::new().route("/healthz", get(health_check));

    for module in registry.modules() {
        let module_name = module.name();
        tracing::info!(
            module = module_name,
            "mounting module routes under {}/{}",
            api_prefix,
            module_name
        );
        router_builder = router_builder.mount_module(api_prefix, module_name, module.routes());
    }

    let cors_origin = settings
        .server
        .cors_origin
        .as_deref()
        .map(HeaderValue::from_str)
        .transpose()
        .context("server.cors_origin is not a valid header value")?;

    Ok(router_builder
        .with_openapi(registry, api_prefix)
        .with_static_dir("/static", &settings.server.public_dir)
        .with_not_found_fallback()
        .with_timeout(settings.server.request_timeout_ms)
        .with_tracing()
        .with_request_id()
        .with_cors(cors_origin)
        .build())
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
