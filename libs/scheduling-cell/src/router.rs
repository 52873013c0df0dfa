// libs/scheduling-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::state::AppState;

use crate::handlers;

pub fn slot_routes(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/", get(handlers::list_slots))
        .route("/", post(handlers::create_slot))
        .route("/{slot_id}", put(handlers::update_slot))
        .route("/{slot_id}", delete(handlers::deactivate_slot))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}

pub fn schedule_routes(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/", get(handlers::list_schedules))
        .route("/", post(handlers::bind_schedule))
        .route("/my", get(handlers::my_schedules))
        .route("/doctor/{doctor_id}", get(handlers::doctor_availability))
        .route("/{schedule_id}/status", patch(handlers::update_schedule_status))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
