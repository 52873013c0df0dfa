// libs/scheduling-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_database::audit::log_activity;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::state::AppState;

use crate::models::{
    BindScheduleRequest, CreateSlotRequest, DoctorAvailability, ScheduleEntry, TimeSlot,
    UpdateScheduleStatusRequest, UpdateSlotRequest,
};
use crate::services::schedule::ScheduleBoardService;
use crate::services::slots::SlotCatalogService;

#[derive(Debug, Deserialize)]
pub struct SlotListQuery {
    pub active_only: Option<bool>,
}

fn user_uuid(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id).map_err(|_| AppError::Auth("Invalid user id in token".to_string()))
}

// ==============================================================================
// SLOT CATALOG HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_slots(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Query(params): Query<SlotListQuery>,
) -> Result<Json<Vec<TimeSlot>>, AppError> {
    let service = SlotCatalogService::new(&state.config);
    let slots = service
        .list_slots(params.active_only.unwrap_or(true), auth.token())
        .await?;
    Ok(Json(slots))
}

#[axum::debug_handler]
pub async fn create_slot(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateSlotRequest>,
) -> Result<Json<TimeSlot>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Only admins can create slots".to_string()));
    }

    let service = SlotCatalogService::new(&state.config);
    let slot = service
        .create_slot(request, user_uuid(&user).ok(), auth.token())
        .await?;

    let db = SupabaseClient::new(&state.config);
    log_activity(&db, auth.token(), &user.id, "slot_created", &format!("slot_id={}", slot.id)).await;

    Ok(Json(slot))
}

#[axum::debug_handler]
pub async fn update_slot(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(slot_id): Path<Uuid>,
    Json(request): Json<UpdateSlotRequest>,
) -> Result<Json<TimeSlot>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Only admins can update slots".to_string()));
    }

    let service = SlotCatalogService::new(&state.config);
    let slot = service.update_slot(slot_id, request, auth.token()).await?;

    let db = SupabaseClient::new(&state.config);
    log_activity(&db, auth.token(), &user.id, "slot_updated", &format!("slot_id={}", slot.id)).await;

    Ok(Json(slot))
}

#[axum::debug_handler]
pub async fn deactivate_slot(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Only admins can deactivate slots".to_string()));
    }

    let service = SlotCatalogService::new(&state.config);
    service.deactivate_slot(slot_id, auth.token()).await?;

    let db = SupabaseClient::new(&state.config);
    log_activity(&db, auth.token(), &user.id, "slot_deactivated", &format!("slot_id={}", slot_id)).await;

    Ok(Json(json!({ "status": "deactivated" })))
}

// ==============================================================================
// SCHEDULE BOARD HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_schedules(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<ScheduleEntry>>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Only admins can list all schedules".to_string()));
    }

    let service = ScheduleBoardService::new(&state.config, state.slot_guards.clone());
    let entries = service.list_all(auth.token()).await?;
    Ok(Json(entries))
}

#[axum::debug_handler]
pub async fn my_schedules(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<ScheduleEntry>>, AppError> {
    if !user.is_doctor() && !user.is_admin() {
        return Err(AppError::Forbidden("Forbidden".to_string()));
    }

    let service = ScheduleBoardService::new(&state.config, state.slot_guards.clone());
    let entries = service.list_for_doctor(user_uuid(&user)?, auth.token()).await?;
    Ok(Json(entries))
}

#[axum::debug_handler]
pub async fn doctor_availability(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Vec<DoctorAvailability>>, AppError> {
    let service = ScheduleBoardService::new(&state.config, state.slot_guards.clone());
    let availability = service.list_available(doctor_id, auth.token()).await?;
    Ok(Json(availability))
}

#[axum::debug_handler]
pub async fn bind_schedule(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BindScheduleRequest>,
) -> Result<Json<ScheduleEntry>, AppError> {
    if !user.is_doctor() && !user.is_admin() {
        return Err(AppError::Forbidden("Forbidden".to_string()));
    }

    // Admins may bind on behalf of any doctor; doctors only bind themselves.
    let doctor_id = match (user.is_admin(), request.doctor_id) {
        (true, Some(doctor_id)) => doctor_id,
        _ => user_uuid(&user)?,
    };

    let service = ScheduleBoardService::new(&state.config, state.slot_guards.clone());
    let entry = service
        .bind_slot(doctor_id, request.slot_id, request.status, auth.token())
        .await?;

    if user.is_admin() {
        let db = SupabaseClient::new(&state.config);
        log_activity(
            &db,
            auth.token(),
            &user.id,
            "schedule_created",
            &format!("doctor_id={},slot_id={}", doctor_id, request.slot_id),
        )
        .await;
    }

    Ok(Json(entry))
}

#[axum::debug_handler]
pub async fn update_schedule_status(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(schedule_id): Path<Uuid>,
    Json(request): Json<UpdateScheduleStatusRequest>,
) -> Result<Json<ScheduleEntry>, AppError> {
    if !user.is_doctor() && !user.is_admin() {
        return Err(AppError::Forbidden("Forbidden".to_string()));
    }

    let service = ScheduleBoardService::new(&state.config, state.slot_guards.clone());

    if user.is_doctor() {
        let entry = service.get_entry(schedule_id, auth.token()).await?;
        if entry.doctor_id != user_uuid(&user)? {
            return Err(AppError::Forbidden("Not your schedule entry".to_string()));
        }
    }

    let entry = service
        .set_status(schedule_id, request.status, auth.token())
        .await?;

    if user.is_admin() {
        let db = SupabaseClient::new(&state.config);
        log_activity(
            &db,
            auth.token(),
            &user.id,
            "schedule_status_updated",
            &format!("schedule_id={},status={}", schedule_id, entry.status),
        )
        .await;
    }

    Ok(Json(entry))
}
