// libs/scheduling-cell/src/services/schedule.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{representation_headers, SupabaseClient};
use shared_utils::guards::SlotGuards;

use crate::models::{DoctorAvailability, ScheduleEntry, ScheduleError, ScheduleStatus};
use crate::services::slots::SlotCatalogService;

/// Per-doctor allocation ledger: which slots a doctor offers and whether
/// each one is available, booked, or blocked.
pub struct ScheduleBoardService {
    supabase: SupabaseClient,
    slots: SlotCatalogService,
    slot_guards: SlotGuards,
}

impl ScheduleBoardService {
    pub fn new(config: &AppConfig, slot_guards: SlotGuards) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            slots: SlotCatalogService::new(config),
            slot_guards,
        }
    }

    /// Bind a slot onto a doctor's board. Rebinding the same (doctor, slot)
    /// pair returns the existing entry unchanged, which tolerates duplicate
    /// client submissions.
    pub async fn bind_slot(
        &self,
        doctor_id: Uuid,
        slot_id: Uuid,
        status: ScheduleStatus,
        auth_token: &str,
    ) -> Result<ScheduleEntry, ScheduleError> {
        self.slots.get_active_slot(slot_id, auth_token).await?;

        let _guard = self.slot_guards.acquire(slot_id).await;

        if let Some(existing) = self.find_entry(doctor_id, slot_id, auth_token).await? {
            debug!(
                "Schedule entry already exists for doctor {} slot {}, returning it",
                doctor_id, slot_id
            );
            return Ok(existing);
        }

        let entry_data = json!({
            "id": Uuid::new_v4(),
            "doctor_id": doctor_id,
            "slot_id": slot_id,
            "status": status.to_string(),
            "created_at": Utc::now().to_rfc3339(),
        });

        let created: Vec<ScheduleEntry> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/doctor_schedules",
                Some(auth_token),
                Some(entry_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let entry = created.into_iter().next().ok_or_else(|| {
            ScheduleError::DatabaseError("Schedule creation returned no row".to_string())
        })?;

        info!("Slot {} bound to doctor {} as {}", slot_id, doctor_id, entry.status);
        Ok(entry)
    }

    pub async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<ScheduleEntry>, ScheduleError> {
        let path = format!("/rest/v1/doctor_schedules?doctor_id=eq.{}", doctor_id);
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))
    }

    pub async fn list_all(&self, auth_token: &str) -> Result<Vec<ScheduleEntry>, ScheduleError> {
        self.supabase
            .request(Method::GET, "/rest/v1/doctor_schedules", Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))
    }

    /// A doctor's open capacity: available entries whose slot is still
    /// active, each projected with its slot payload.
    pub async fn list_available(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<DoctorAvailability>, ScheduleError> {
        let path = format!(
            "/rest/v1/doctor_schedules?doctor_id=eq.{}&status=eq.available",
            doctor_id
        );
        let entries: Vec<ScheduleEntry> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let mut availability = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.slots.get_active_slot(entry.slot_id, auth_token).await {
                Ok(slot) => availability.push(DoctorAvailability::from_parts(entry, slot)),
                // Deactivated slots drop out of the listing but stay bound.
                Err(ScheduleError::SlotNotFound) => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(availability)
    }

    pub async fn get_entry(
        &self,
        schedule_id: Uuid,
        auth_token: &str,
    ) -> Result<ScheduleEntry, ScheduleError> {
        let path = format!("/rest/v1/doctor_schedules?id=eq.{}", schedule_id);
        let result: Vec<ScheduleEntry> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(ScheduleError::EntryNotFound)
    }

    pub async fn find_entry(
        &self,
        doctor_id: Uuid,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<ScheduleEntry>, ScheduleError> {
        let path = format!(
            "/rest/v1/doctor_schedules?doctor_id=eq.{}&slot_id=eq.{}",
            doctor_id, slot_id
        );
        let result: Vec<ScheduleEntry> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        Ok(result.into_iter().next())
    }

    /// The only status mutator. Runs under the slot's guard so it cannot
    /// interleave with a reservation flipping the same entry.
    pub async fn set_status(
        &self,
        schedule_id: Uuid,
        new_status: ScheduleStatus,
        auth_token: &str,
    ) -> Result<ScheduleEntry, ScheduleError> {
        let entry = self.get_entry(schedule_id, auth_token).await?;

        let _guard = self.slot_guards.acquire(entry.slot_id).await;

        let path = format!("/rest/v1/doctor_schedules?id=eq.{}", schedule_id);
        let updated: Vec<ScheduleEntry> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(json!({ "status": new_status.to_string() })),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let entry = updated.into_iter().next().ok_or(ScheduleError::EntryNotFound)?;

        info!("Schedule entry {} set to {}", schedule_id, entry.status);
        Ok(entry)
    }
}
