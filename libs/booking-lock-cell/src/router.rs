// libs/booking-lock-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, post},
    Router,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::state::AppState;

use crate::handlers;

pub fn booking_lock_routes(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/lock", post(handlers::acquire_lock))
        .route("/lock/{lock_id}", delete(handlers::release_lock))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new().merge(protected_routes).with_state(state)
}
