// libs/scheduling-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// SLOT CATALOG MODELS
// ==============================================================================

/// A bookable calendar interval. Slots are catalog entries shared across
/// doctors; a doctor offers one by binding it on their schedule board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub slot_type: SlotType,
    pub created_by: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotType {
    Working,
    Block,
}

impl Default for SlotType {
    fn default() -> Self {
        SlotType::Working
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotType::Working => write!(f, "working"),
            SlotType::Block => write!(f, "block"),
        }
    }
}

// ==============================================================================
// SCHEDULE BOARD MODELS
// ==============================================================================

/// Binding of one slot to one doctor, with its availability state. This is
/// the allocation ledger a reservation flips from `available` to `booked`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub slot_id: Uuid,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Available,
    Booked,
    Blocked,
}

impl Default for ScheduleStatus {
    fn default() -> Self {
        ScheduleStatus::Available
    }
}

impl fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleStatus::Available => write!(f, "available"),
            ScheduleStatus::Booked => write!(f, "booked"),
            ScheduleStatus::Blocked => write!(f, "blocked"),
        }
    }
}

/// An available schedule entry projected together with its slot, as served
/// to patients browsing a doctor's calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorAvailability {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub slot_id: Uuid,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
    pub slot: TimeSlot,
}

impl DoctorAvailability {
    pub fn from_parts(entry: ScheduleEntry, slot: TimeSlot) -> Self {
        Self {
            id: entry.id,
            doctor_id: entry.doctor_id,
            slot_id: entry.slot_id,
            status: entry.status,
            created_at: entry.created_at,
            slot,
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSlotRequest {
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: Option<i32>,
    #[serde(default)]
    pub slot_type: SlotType,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSlotRequest {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub duration_minutes: Option<i32>,
    pub slot_type: Option<SlotType>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BindScheduleRequest {
    pub slot_id: Uuid,
    /// Admins may bind on behalf of a doctor; doctors always bind themselves.
    pub doctor_id: Option<Uuid>,
    #[serde(default)]
    pub status: ScheduleStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateScheduleStatusRequest {
    pub status: ScheduleStatus,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Slot not found")]
    SlotNotFound,

    #[error("Schedule entry not found")]
    EntryNotFound,

    #[error("end_time must be after start_time")]
    InvalidTimeRange,

    #[error("Invalid datetime format, use ISO 8601")]
    InvalidTimestamp,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<ScheduleError> for shared_models::error::AppError {
    fn from(err: ScheduleError) -> Self {
        use shared_models::error::AppError;
        match err {
            ScheduleError::SlotNotFound => AppError::NotFound("Slot not found".to_string()),
            ScheduleError::EntryNotFound => AppError::NotFound("Schedule not found".to_string()),
            ScheduleError::InvalidTimeRange => {
                AppError::ValidationError("end_time must be after start_time".to_string())
            }
            ScheduleError::InvalidTimestamp => {
                AppError::ValidationError("Invalid datetime format, use ISO 8601".to_string())
            }
            ScheduleError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
