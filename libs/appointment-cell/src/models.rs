// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// Durable record of a booking. Appointments are never deleted; every later
/// change is a status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub child_id: Option<Uuid>,
    pub doctor_id: Uuid,
    pub slot_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    #[serde(alias = "canceled")]
    Cancelled,
    #[serde(rename = "no-show")]
    NoShow,
}

impl AppointmentStatus {
    /// Terminal statuses admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no-show"),
        }
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ReserveAppointmentRequest {
    pub doctor_id: Uuid,
    pub child_id: Option<Uuid>,
    /// Reserve against a catalog slot; its start time is authoritative.
    pub slot_id: Option<Uuid>,
    /// Ad-hoc scheduling when no slot is given. Kept as a raw string so a
    /// malformed value surfaces as a validation error, not a decode failure.
    pub scheduled_at: Option<String>,
    pub reason: Option<String>,
    pub note: Option<String>,
}

/// Appointment as served to clients, enriched with the doctor's phone when
/// it can be resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentOut {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub child_id: Option<Uuid>,
    pub doctor_id: Uuid,
    pub slot_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub doctor_phone: Option<String>,
}

impl AppointmentOut {
    pub fn from_appointment(appointment: Appointment, doctor_phone: Option<String>) -> Self {
        Self {
            id: appointment.id,
            patient_id: appointment.patient_id,
            child_id: appointment.child_id,
            doctor_id: appointment.doctor_id,
            slot_id: appointment.slot_id,
            scheduled_at: appointment.scheduled_at,
            status: appointment.status,
            reason: appointment.reason,
            note: appointment.note,
            created_at: appointment.created_at,
            doctor_phone,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateAppointmentStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MyAppointmentsQuery {
    pub child_id: Option<Uuid>,
}

// ==============================================================================
// CANCELLATION POLICY MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationPolicy {
    pub id: Uuid,
    pub min_hours_before: i32,
    pub fee_percent: f64,
    pub applies_to: PolicyScope,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyScope {
    Online,
    Offline,
    All,
}

impl fmt::Display for PolicyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyScope::Online => write!(f, "online"),
            PolicyScope::Offline => write!(f, "offline"),
            PolicyScope::All => write!(f, "all"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancellationPolicyRequest {
    pub min_hours_before: i32,
    pub fee_percent: f64,
    pub applies_to: PolicyScope,
}

/// Outcome of consulting the cancellation policies for one cancellation.
/// `within_notice` is false when the cancellation lands closer to the
/// appointment than the policy's minimum notice, making the fee applicable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationAssessment {
    pub policy_id: Option<Uuid>,
    pub fee_percent: f64,
    pub within_notice: bool,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Child not found")]
    ChildNotFound,

    #[error("Slot not found")]
    SlotNotFound,

    #[error("Slot not available")]
    SlotNotAvailable,

    #[error("Slot already booked")]
    SlotAlreadyBooked,

    #[error("Slot locked by another user")]
    SlotLockedByAnother,

    #[error("scheduled_at required if slot_id not provided")]
    MissingTimestamp,

    #[error("Invalid datetime format, use ISO 8601")]
    InvalidTimestamp,

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AppointmentError> for shared_models::error::AppError {
    fn from(err: AppointmentError) -> Self {
        use shared_models::error::AppError;
        match err {
            AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
            AppointmentError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
            AppointmentError::ChildNotFound => AppError::NotFound("Child not found".to_string()),
            AppointmentError::SlotNotFound => AppError::NotFound("Slot not found".to_string()),
            AppointmentError::SlotNotAvailable => AppError::Conflict("Slot not available".to_string()),
            AppointmentError::SlotAlreadyBooked => AppError::Conflict("Slot already booked".to_string()),
            AppointmentError::SlotLockedByAnother => {
                AppError::Conflict("Slot locked by another user".to_string())
            }
            AppointmentError::MissingTimestamp => {
                AppError::ValidationError("scheduled_at required if slot_id not provided".to_string())
            }
            AppointmentError::InvalidTimestamp => {
                AppError::ValidationError("Invalid datetime format, use ISO 8601".to_string())
            }
            AppointmentError::InvalidStatusTransition { from, to } => {
                AppError::Conflict(format!("Appointment cannot move from {} to {}", from, to))
            }
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
