mod dto;
pub mod handlers;
pub mod services;

use crate::state::AppState;
use axum::Router;

pub fn router(max_picture_bytes: usize) -> Router<AppState> {
    handlers::picture_routes(max_picture_bytes)
}
