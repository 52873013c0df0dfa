// libs/scheduling-cell/src/services/slots.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{representation_headers, SupabaseClient};
use shared_utils::time::parse_client_timestamp;

use crate::models::{CreateSlotRequest, ScheduleError, TimeSlot, UpdateSlotRequest};

/// Catalog of bookable time intervals. Slots are created and edited by
/// administrators and only ever deactivated, never deleted, so past
/// appointments keep a valid reference.
pub struct SlotCatalogService {
    supabase: SupabaseClient,
}

impl SlotCatalogService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn create_slot(
        &self,
        request: CreateSlotRequest,
        created_by: Option<Uuid>,
        auth_token: &str,
    ) -> Result<TimeSlot, ScheduleError> {
        let start = parse_client_timestamp(&request.start_time)
            .ok_or(ScheduleError::InvalidTimestamp)?;
        let end = parse_client_timestamp(&request.end_time)
            .ok_or(ScheduleError::InvalidTimestamp)?;

        if end <= start {
            return Err(ScheduleError::InvalidTimeRange);
        }

        let duration_minutes = request
            .duration_minutes
            .unwrap_or_else(|| (end - start).num_minutes() as i32);

        let slot_data = json!({
            "id": Uuid::new_v4(),
            "start_time": start.to_rfc3339(),
            "end_time": end.to_rfc3339(),
            "duration_minutes": duration_minutes,
            "slot_type": request.slot_type.to_string(),
            "created_by": created_by,
            "is_active": request.is_active,
            "created_at": Utc::now().to_rfc3339(),
        });

        let created: Vec<TimeSlot> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/time_slots",
                Some(auth_token),
                Some(slot_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let slot = created
            .into_iter()
            .next()
            .ok_or_else(|| ScheduleError::DatabaseError("Slot creation returned no row".to_string()))?;

        info!("Slot {} created ({} - {})", slot.id, slot.start_time, slot.end_time);
        Ok(slot)
    }

    pub async fn update_slot(
        &self,
        slot_id: Uuid,
        request: UpdateSlotRequest,
        auth_token: &str,
    ) -> Result<TimeSlot, ScheduleError> {
        let existing = self.get_slot(slot_id, auth_token).await?;

        let mut update_data = Map::new();

        let start = match &request.start_time {
            Some(raw) => {
                let parsed = parse_client_timestamp(raw).ok_or(ScheduleError::InvalidTimestamp)?;
                update_data.insert("start_time".to_string(), json!(parsed.to_rfc3339()));
                parsed
            }
            None => existing.start_time,
        };
        let end = match &request.end_time {
            Some(raw) => {
                let parsed = parse_client_timestamp(raw).ok_or(ScheduleError::InvalidTimestamp)?;
                update_data.insert("end_time".to_string(), json!(parsed.to_rfc3339()));
                parsed
            }
            None => existing.end_time,
        };

        // The merged interval must stay valid even on a partial update.
        if end <= start {
            return Err(ScheduleError::InvalidTimeRange);
        }

        if let Some(duration) = request.duration_minutes {
            update_data.insert("duration_minutes".to_string(), json!(duration));
        }
        if let Some(slot_type) = request.slot_type {
            update_data.insert("slot_type".to_string(), json!(slot_type.to_string()));
        }
        if let Some(is_active) = request.is_active {
            update_data.insert("is_active".to_string(), json!(is_active));
        }

        if update_data.is_empty() {
            return Ok(existing);
        }

        let path = format!("/rest/v1/time_slots?id=eq.{}", slot_id);
        let updated: Vec<TimeSlot> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update_data)),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        updated
            .into_iter()
            .next()
            .ok_or(ScheduleError::SlotNotFound)
    }

    /// Logical deletion. Existing appointments and schedule entries keep
    /// their references; only new bindings are blocked.
    pub async fn deactivate_slot(&self, slot_id: Uuid, auth_token: &str) -> Result<(), ScheduleError> {
        self.get_slot(slot_id, auth_token).await?;

        let path = format!("/rest/v1/time_slots?id=eq.{}", slot_id);
        let _: Vec<TimeSlot> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(json!({ "is_active": false })),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        info!("Slot {} deactivated", slot_id);
        Ok(())
    }

    pub async fn list_slots(
        &self,
        active_only: bool,
        auth_token: &str,
    ) -> Result<Vec<TimeSlot>, ScheduleError> {
        let mut path = String::from("/rest/v1/time_slots?");
        if active_only {
            path.push_str("is_active=eq.true&");
        }
        path.push_str("order=start_time.asc");

        debug!("Listing slots (active_only: {})", active_only);

        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))
    }

    pub async fn get_slot(&self, slot_id: Uuid, auth_token: &str) -> Result<TimeSlot, ScheduleError> {
        let path = format!("/rest/v1/time_slots?id=eq.{}", slot_id);
        let result: Vec<TimeSlot> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(ScheduleError::SlotNotFound)
    }

    /// Lookup restricted to active slots, the form every new binding or
    /// reservation must use.
    pub async fn get_active_slot(
        &self,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<TimeSlot, ScheduleError> {
        let path = format!("/rest/v1/time_slots?id=eq.{}&is_active=eq.true", slot_id);
        let result: Vec<TimeSlot> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(ScheduleError::SlotNotFound)
    }
}
