// libs/booking-lock-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::state::AppState;

use crate::models::{AcquireLockRequest, BookingLock};
use crate::services::lock::BookingLockService;

fn user_uuid(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id).map_err(|_| AppError::Auth("Invalid user id in token".to_string()))
}

#[axum::debug_handler]
pub async fn acquire_lock(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<AcquireLockRequest>,
) -> Result<Json<BookingLock>, AppError> {
    let service = BookingLockService::new(&state.config, state.slot_guards.clone());
    let lock = service
        .acquire(request, user_uuid(&user)?, auth.token())
        .await?;
    Ok(Json(lock))
}

#[axum::debug_handler]
pub async fn release_lock(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(lock_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = BookingLockService::new(&state.config, state.slot_guards.clone());
    service
        .release(lock_id, user_uuid(&user)?, user.is_admin(), auth.token())
        .await?;
    Ok(Json(json!({ "status": "deleted" })))
}
