// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_database::audit::log_activity;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::state::AppState;

use crate::models::{
    Appointment, AppointmentOut, AppointmentStatus, CancellationPolicy, CancellationPolicyRequest,
    MyAppointmentsQuery, ReserveAppointmentRequest, UpdateAppointmentStatusRequest,
};
use crate::services::policy::CancellationPolicyEngine;
use crate::services::reservation::ReservationService;

fn user_uuid(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id).map_err(|_| AppError::Auth("Invalid user id in token".to_string()))
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn reserve_appointment(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ReserveAppointmentRequest>,
) -> Result<Json<AppointmentOut>, AppError> {
    if !user.is_patient() {
        return Err(AppError::Forbidden("Only patients can book appointments".to_string()));
    }

    let service = ReservationService::new(&state.config, state.slot_guards.clone());
    let appointment = service
        .reserve(request, user_uuid(&user)?, user.email.as_deref(), auth.token())
        .await?;

    Ok(Json(appointment))
}

#[axum::debug_handler]
pub async fn my_appointments(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(params): Query<MyAppointmentsQuery>,
) -> Result<Json<Vec<AppointmentOut>>, AppError> {
    let service = ReservationService::new(&state.config, state.slot_guards.clone());
    let appointments = service
        .list_for_patient(user_uuid(&user)?, params.child_id, auth.token())
        .await?;
    Ok(Json(appointments))
}

#[axum::debug_handler]
pub async fn doctor_appointments(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Appointment>>, AppError> {
    if !user.is_doctor() && !user.is_admin() {
        return Err(AppError::Forbidden("Forbidden".to_string()));
    }

    let service = ReservationService::new(&state.config, state.slot_guards.clone());
    let appointments = if user.is_admin() {
        service.list_all(auth.token()).await?
    } else {
        service.list_for_doctor(user_uuid(&user)?, auth.token()).await?
    };

    Ok(Json(appointments))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let service = ReservationService::new(&state.config, state.slot_guards.clone());
    let appointment = service.get_appointment(appointment_id, auth.token()).await?;

    // The assigned doctor and admins may apply any valid transition; the
    // owning patient may only cancel.
    let caller_id = user_uuid(&user)?;
    let allowed = user.is_admin()
        || (user.is_doctor() && appointment.doctor_id == caller_id)
        || (user.is_patient()
            && appointment.patient_id == caller_id
            && request.status == AppointmentStatus::Cancelled);
    if !allowed {
        return Err(AppError::Forbidden("Forbidden".to_string()));
    }

    let (updated, cancellation) = service
        .set_status(appointment_id, request.status, auth.token())
        .await?;

    if user.is_admin() {
        let db = SupabaseClient::new(&state.config);
        log_activity(
            &db,
            auth.token(),
            &user.id,
            "appointment_status_updated",
            &format!("appointment_id={},status={}", appointment_id, updated.status),
        )
        .await;
    }

    Ok(Json(json!({
        "appointment": updated,
        "cancellation": cancellation,
    })))
}

// ==============================================================================
// CANCELLATION POLICY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_policies(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Vec<CancellationPolicy>>, AppError> {
    let engine = CancellationPolicyEngine::new(&state.config);
    let policies = engine.list_policies(auth.token()).await?;
    Ok(Json(policies))
}

#[axum::debug_handler]
pub async fn create_policy(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CancellationPolicyRequest>,
) -> Result<Json<CancellationPolicy>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Only admins can manage policies".to_string()));
    }

    let engine = CancellationPolicyEngine::new(&state.config);
    let policy = engine.create_policy(request, auth.token()).await?;
    Ok(Json(policy))
}

#[axum::debug_handler]
pub async fn update_policy(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(policy_id): Path<Uuid>,
    Json(request): Json<CancellationPolicyRequest>,
) -> Result<Json<CancellationPolicy>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Only admins can manage policies".to_string()));
    }

    let engine = CancellationPolicyEngine::new(&state.config);
    let policy = engine.update_policy(policy_id, request, auth.token()).await?;
    Ok(Json(policy))
}

#[axum::debug_handler]
pub async fn delete_policy(
    State(state): State<Arc<AppState>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(policy_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Forbidden("Only admins can manage policies".to_string()));
    }

    let engine = CancellationPolicyEngine::new(&state.config);
    engine.delete_policy(policy_id, auth.token()).await?;
    Ok(Json(json!({ "status": "deleted" })))
}
