// libs/booking-lock-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Advisory, time-boxed claim on a slot while a client walks through the
/// multi-step booking flow. Expired locks are inert: they are purged lazily
/// and every read filters on the expiry, so no background sweeper is needed
/// for correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingLock {
    pub id: Uuid,
    pub slot_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub locked_by: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl BookingLock {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcquireLockRequest {
    pub slot_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub expires_in_minutes: Option<i64>,
}

/// Upper bound on a requested lock lifetime. Locks are meant to cover a UI
/// flow, not to park a slot.
pub const MAX_LOCK_TTL_MINUTES: i64 = 60;
