//! facekitd: HTTP front end for the facekit capabilities.

pub mod config;
pub mod engine;
pub mod errors;
pub mod handlers;
pub mod openapi;
pub mod staging;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use engine::EngineHandle;
use staging::Staging;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Shared per-process state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub staging: Staging,
    pub engine: EngineHandle,
}

/// Build the application router.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/find-face/", post(handlers::find_face))
        .route("/rm-bg/", post(handlers::remove_background))
        .route("/comapre-face/", post(handlers::compare_face))
        .route("/compare-face/", post(handlers::compare_face))
        .route("/healthz", get(|| async { "OK" }))
        .route("/apispec_1.json", get(|| async { Json(openapi::ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/swagger/", openapi::ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
