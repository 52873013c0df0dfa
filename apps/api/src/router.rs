use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::router::{appointment_routes, policy_routes};
use booking_lock_cell::router::booking_lock_routes;
use scheduling_cell::router::{schedule_routes, slot_routes};
use shared_utils::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Cradle Clinic API is running!" }))
        .nest("/slots", slot_routes(state.clone()))
        .nest("/schedules", schedule_routes(state.clone()))
        .nest("/booking", booking_lock_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/policies", policy_routes(state))
}
