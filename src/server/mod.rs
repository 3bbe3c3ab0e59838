//! HTTP surface
//!
//! An axum router exposing the upload form and one POST route per
//! transform. Request bodies are capped at the configured upload limit
//! before any pipeline stage runs.

mod error;
pub mod handlers;

use crate::error::Result;
use crate::processor::PhotoProcessor;
use crate::transforms::Operation;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

/// State shared by all handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub processor: Arc<PhotoProcessor>,
    pub max_upload_bytes: usize,
}

/// Build the application router
pub fn router(processor: Arc<PhotoProcessor>) -> Router {
    let max_upload_bytes = processor.config().max_upload_bytes;
    let state = AppState {
        processor,
        max_upload_bytes,
    };

    Router::new()
        .route("/", get(handlers::index).post(handlers::index))
        .route("/health", get(handlers::health))
        .route(
            Operation::RemoveBackground.route(),
            post(handlers::remove_background),
        )
        .route(Operation::Enhance.route(), post(handlers::enhance_image))
        .route(Operation::Compress.route(), post(handlers::compress_image))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Serve the application until `shutdown` resolves
///
/// Creates the upload directory before binding.
///
/// # Errors
/// - Upload directory cannot be created
/// - Bind or accept failures
pub async fn serve<F>(processor: Arc<PhotoProcessor>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    processor.store().ensure_root()?;

    let bind_address = processor.config().bind_address;
    let listener = TcpListener::bind(bind_address).await?;
    info!(
        "Listening on http://{}, uploads in {}",
        listener.local_addr()?,
        processor.store().root().display()
    );

    axum::serve(listener, router(processor))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server stopped");
    Ok(())
}
