use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
#[cfg(test)]
pub(crate) mod memory;
pub mod repo;
pub mod repo_types;
pub mod validation;

pub fn router(state: &AppState) -> Router<AppState> {
    Router::new().merge(handlers::task_routes(state))
}
