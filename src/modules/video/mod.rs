use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub mod dto;
pub mod handler;
pub mod memory;
pub mod model;
pub mod range;
pub mod repository;
pub mod service;
pub mod stream_handler;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/videos", get(handler::list_videos).post(handler::upload_video))
        .route("/videos/stream/range/{id}", get(stream_handler::stream_range))
        .route("/videos/{id}", get(handler::get_video))
        .route("/videos/{id}/transcode", post(handler::transcode_video))
        .route("/videos/{id}/{file_name}", get(stream_handler::serve_artifact))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
}
