// libs/booking-lock-cell/src/services/lock.rs
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use scheduling_cell::models::ScheduleError;
use scheduling_cell::services::slots::SlotCatalogService;
use shared_config::AppConfig;
use shared_database::supabase::{representation_headers, SupabaseClient};
use shared_utils::guards::SlotGuards;

use crate::error::BookingLockError;
use crate::models::{AcquireLockRequest, BookingLock, MAX_LOCK_TTL_MINUTES};

/// Issues short-lived advisory locks on slots. A lock only influences
/// booking through the explicit probe the reservation protocol makes; there
/// is no storage-level exclusivity behind it.
pub struct BookingLockService {
    supabase: SupabaseClient,
    slots: SlotCatalogService,
    slot_guards: SlotGuards,
    default_ttl_minutes: i64,
}

impl BookingLockService {
    pub fn new(config: &AppConfig, slot_guards: SlotGuards) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            slots: SlotCatalogService::new(config),
            slot_guards,
            default_ttl_minutes: config.booking_lock_ttl_minutes,
        }
    }

    /// Claim a slot for `holder`. Acquisition never waits: it succeeds,
    /// returns the holder's own unexpired lock unchanged, or fails with
    /// `AlreadyLocked` immediately.
    pub async fn acquire(
        &self,
        request: AcquireLockRequest,
        holder: Uuid,
        auth_token: &str,
    ) -> Result<BookingLock, BookingLockError> {
        let ttl_minutes = request.expires_in_minutes.unwrap_or(self.default_ttl_minutes);
        if ttl_minutes <= 0 || ttl_minutes > MAX_LOCK_TTL_MINUTES {
            return Err(BookingLockError::InvalidTtl(format!(
                "expires_in_minutes must be between 1 and {}",
                MAX_LOCK_TTL_MINUTES
            )));
        }

        self.slots
            .get_active_slot(request.slot_id, auth_token)
            .await
            .map_err(|e| match e {
                ScheduleError::SlotNotFound => BookingLockError::SlotNotFound,
                other => BookingLockError::DatabaseError(other.to_string()),
            })?;

        let _guard = self.slot_guards.acquire(request.slot_id).await;
        let now = Utc::now();

        self.purge_expired(now, auth_token).await?;

        if let Some(existing) = self.find_active(request.slot_id, now, auth_token).await? {
            if existing.locked_by != holder {
                debug!(
                    "Slot {} already locked by {} until {}",
                    request.slot_id, existing.locked_by, existing.expires_at
                );
                return Err(BookingLockError::AlreadyLocked);
            }
            // Re-acquisition by the holder is idempotent and does not extend
            // the expiry; renewal takes a fresh call after it lapses.
            return Ok(existing);
        }

        let lock_data = json!({
            "id": Uuid::new_v4(),
            "slot_id": request.slot_id,
            "doctor_id": request.doctor_id,
            "locked_by": holder,
            "expires_at": (now + Duration::minutes(ttl_minutes)).to_rfc3339(),
            "created_at": now.to_rfc3339(),
        });

        let created: Vec<BookingLock> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/booking_locks",
                Some(auth_token),
                Some(lock_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| BookingLockError::DatabaseError(e.to_string()))?;

        let lock = created.into_iter().next().ok_or_else(|| {
            BookingLockError::DatabaseError("Lock creation returned no row".to_string())
        })?;

        info!(
            "Slot {} locked by {} until {}",
            lock.slot_id, lock.locked_by, lock.expires_at
        );
        Ok(lock)
    }

    /// Release a lock. Only the holder may release it, unless the caller
    /// asserts an administrative override.
    pub async fn release(
        &self,
        lock_id: Uuid,
        requester: Uuid,
        admin_override: bool,
        auth_token: &str,
    ) -> Result<(), BookingLockError> {
        let lock = self.get_lock(lock_id, auth_token).await?;

        if !admin_override && lock.locked_by != requester {
            return Err(BookingLockError::NotHolder);
        }

        let _guard = self.slot_guards.acquire(lock.slot_id).await;

        let path = format!("/rest/v1/booking_locks?id=eq.{}", lock_id);
        let _: Vec<BookingLock> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                Some(auth_token),
                None,
                Some(representation_headers()),
            )
            .await
            .map_err(|e| BookingLockError::DatabaseError(e.to_string()))?;

        info!("Lock {} on slot {} released", lock_id, lock.slot_id);
        Ok(())
    }

    /// The reservation protocol's probe: is this slot claimed by someone
    /// other than `requester` right now?
    pub async fn is_held_by_other(
        &self,
        slot_id: Uuid,
        requester: Uuid,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<bool, BookingLockError> {
        let held = self
            .find_active(slot_id, now, auth_token)
            .await?
            .map(|lock| lock.locked_by != requester)
            .unwrap_or(false);
        Ok(held)
    }

    /// Drop every lock `holder` has on `slot_id`; a successful reservation
    /// consumes the lock that protected it.
    pub async fn consume_for_holder(
        &self,
        slot_id: Uuid,
        holder: Uuid,
        auth_token: &str,
    ) -> Result<(), BookingLockError> {
        let path = format!(
            "/rest/v1/booking_locks?slot_id=eq.{}&locked_by=eq.{}",
            slot_id, holder
        );
        let _: Vec<BookingLock> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                Some(auth_token),
                None,
                Some(representation_headers()),
            )
            .await
            .map_err(|e| BookingLockError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    /// The unexpired lock on a slot, if any. At most one can exist.
    pub async fn find_active(
        &self,
        slot_id: Uuid,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Option<BookingLock>, BookingLockError> {
        let path = format!(
            "/rest/v1/booking_locks?slot_id=eq.{}&expires_at=gt.{}",
            slot_id,
            urlencoding::encode(&now.to_rfc3339())
        );
        let result: Vec<BookingLock> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingLockError::DatabaseError(e.to_string()))?;

        // Expired rows are inert regardless of what the storage filter
        // returned; they are never trusted.
        Ok(result.into_iter().find(|lock| !lock.is_expired(now)))
    }

    async fn get_lock(&self, lock_id: Uuid, auth_token: &str) -> Result<BookingLock, BookingLockError> {
        let path = format!("/rest/v1/booking_locks?id=eq.{}", lock_id);
        let result: Vec<BookingLock> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| BookingLockError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(BookingLockError::LockNotFound)
    }

    /// Lazy expiry: clear out every lapsed lock. Needed only for storage
    /// hygiene; reads already filter on the expiry timestamp.
    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<(), BookingLockError> {
        let path = format!(
            "/rest/v1/booking_locks?expires_at=lt.{}",
            urlencoding::encode(&now.to_rfc3339())
        );
        let purged: Vec<BookingLock> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                Some(auth_token),
                None,
                Some(representation_headers()),
            )
            .await
            .map_err(|e| BookingLockError::DatabaseError(e.to_string()))?;

        if !purged.is_empty() {
            debug!("Purged {} expired booking locks", purged.len());
        }
        Ok(())
    }
}
