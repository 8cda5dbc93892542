//! The caption page, its form endpoints and the JSON API.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use tower_http::limit::RequestBodyLimitLayer;
use tower_sessions::session_store::ExpiredDeletion;
use tower_sessions::{Expiry, SessionManagerLayer};
use tracing::{debug, error, info};

use crate::caption::CaptionGenerator;
use crate::config::ServerConfig;
use crate::constants::{MAX_REQUEST_BYTES, SESSION_SWEEP_SECS};

mod api;
mod csrf;
mod flash;
mod images;
mod prelude;
mod store;
mod views;
mod visitor;

use api::caption_api_handler;
use store::SessionRecords;
use views::{
    copied_handler, copy_failed_handler, edit_caption_handler, generate_handler,
    preview_handler, root_handler, upload_image_handler,
};
use visitor::VisitorStore;

const SESSION_COOKIE_NAME: &str = "captionai_session";

#[derive(Clone, Debug)]
pub(crate) struct AppState {
    generator: Arc<dyn CaptionGenerator>,
    visitors: VisitorStore,
}

impl AppState {
    fn new(generator: Arc<dyn CaptionGenerator>, config: &ServerConfig) -> Self {
        Self {
            generator,
            visitors: VisitorStore::new(config.session_idle.unsigned_abs()),
        }
    }
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::get(root_handler))
        .route("/static/styles.css", axum::routing::get(styles_handler))
        .route("/image", axum::routing::post(upload_image_handler))
        .route("/image/preview", axum::routing::get(preview_handler))
        .route("/generate", axum::routing::post(generate_handler))
        .route("/caption", axum::routing::post(edit_caption_handler))
        .route("/copy/{target}", axum::routing::post(copied_handler))
        .route(
            "/copy/{target}/failed",
            axum::routing::post(copy_failed_handler),
        )
        .route("/api/caption", axum::routing::post(caption_api_handler))
}

/// Router with sessions and body limits, ready to serve.
fn build_app(state: AppState, records: SessionRecords, config: &ServerConfig) -> Router {
    let sessions = SessionManagerLayer::new(records)
        .with_name(SESSION_COOKIE_NAME)
        .with_secure(config.secure_cookies)
        .with_expiry(Expiry::OnInactivity(config.session_idle));

    create_router()
        .layer(sessions)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .with_state(state)
}

/// Drops expired session records and idle visitors, forever.
async fn sweep_sessions(records: SessionRecords, visitors: VisitorStore, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // first tick is immediate
    interval.tick().await;
    loop {
        interval.tick().await;
        if let Err(err) = records.delete_expired().await {
            error!("Failed to delete expired sessions: {}", err);
        }
        let evicted = visitors.evict_idle(Instant::now()).await;
        if evicted > 0 {
            debug!("Evicted {} idle visitors", evicted);
        }
    }
}

async fn styles_handler() -> impl IntoResponse {
    const STYLES: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/styles.css"));
    ([(CONTENT_TYPE, "text/css")], STYLES)
}

/// Binds the listener and serves until shutdown.
pub async fn setup_server(
    config: &ServerConfig,
    generator: Arc<dyn CaptionGenerator>,
) -> Result<(), anyhow::Error> {
    let state = AppState::new(generator, config);
    let records = SessionRecords::default();
    let sweeper = tokio::spawn(sweep_sessions(
        records.clone(),
        state.visitors.clone(),
        Duration::from_secs(SESSION_SWEEP_SECS),
    ));
    let app = build_app(state, records, config);

    let addr = config.bind_address();
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", err);
    }
    sweeper.abort();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
