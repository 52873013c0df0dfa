// libs/appointment-cell/src/services/reservation.rs
//
// The reservation protocol: converts an available schedule entry into a
// pending appointment. The read-check-write sequence for a slot runs under
// that slot's guard, so two concurrent reservations (or a reservation racing
// a lock or schedule change) can never both see the slot as free.
use std::collections::HashMap;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use booking_lock_cell::services::lock::BookingLockService;
use scheduling_cell::models::{ScheduleError, ScheduleStatus};
use scheduling_cell::services::schedule::ScheduleBoardService;
use scheduling_cell::services::slots::SlotCatalogService;
use shared_config::AppConfig;
use shared_database::audit::log_activity;
use shared_database::supabase::{representation_headers, DbError, SupabaseClient};
use shared_utils::guards::SlotGuards;
use shared_utils::time::parse_client_timestamp;

use crate::models::{
    Appointment, AppointmentError, AppointmentOut, AppointmentStatus, CancellationAssessment,
    ReserveAppointmentRequest,
};
use crate::services::events::notify_doctor_of_booking;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::policy::CancellationPolicyEngine;

pub struct ReservationService {
    supabase: SupabaseClient,
    slots: SlotCatalogService,
    board: ScheduleBoardService,
    locks: BookingLockService,
    lifecycle: AppointmentLifecycleService,
    policies: CancellationPolicyEngine,
    slot_guards: SlotGuards,
}

impl ReservationService {
    pub fn new(config: &AppConfig, slot_guards: SlotGuards) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            slots: SlotCatalogService::new(config),
            board: ScheduleBoardService::new(config, slot_guards.clone()),
            locks: BookingLockService::new(config, slot_guards.clone()),
            lifecycle: AppointmentLifecycleService::new(),
            policies: CancellationPolicyEngine::new(config),
            slot_guards,
        }
    }

    /// Reserve an appointment for `patient_id`, slot-backed or ad-hoc.
    pub async fn reserve(
        &self,
        request: ReserveAppointmentRequest,
        patient_id: Uuid,
        patient_email: Option<&str>,
        auth_token: &str,
    ) -> Result<AppointmentOut, AppointmentError> {
        info!(
            "Reserving appointment for patient {} with doctor {}",
            patient_id, request.doctor_id
        );

        let doctor = self.verify_doctor(request.doctor_id, auth_token).await?;

        if let Some(child_id) = request.child_id {
            self.verify_child(child_id, patient_id, auth_token).await?;
        }

        let appointment = match request.slot_id {
            Some(slot_id) => {
                self.reserve_slot(&request, slot_id, patient_id, auth_token)
                    .await?
            }
            None => {
                let raw = request
                    .scheduled_at
                    .as_deref()
                    .ok_or(AppointmentError::MissingTimestamp)?;
                let when =
                    parse_client_timestamp(raw).ok_or(AppointmentError::InvalidTimestamp)?;
                self.insert_appointment(&request, patient_id, None, when, auth_token)
                    .await?
            }
        };

        // Best-effort side effects; a failure here never unwinds the booking.
        notify_doctor_of_booking(&self.supabase, auth_token, request.doctor_id, patient_email).await;
        log_activity(
            &self.supabase,
            auth_token,
            &patient_id.to_string(),
            "appointment_created",
            &format!("appointment_id={}", appointment.id),
        )
        .await;

        let doctor_phone = doctor["phone"].as_str().map(str::to_string);
        Ok(AppointmentOut::from_appointment(appointment, doctor_phone))
    }

    /// The slot-backed path: every check and write between reading the
    /// schedule entry and consuming the lock happens under the slot's guard.
    async fn reserve_slot(
        &self,
        request: &ReserveAppointmentRequest,
        slot_id: Uuid,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let _guard = self.slot_guards.acquire(slot_id).await;
        let now = Utc::now();

        let slot = self
            .slots
            .get_active_slot(slot_id, auth_token)
            .await
            .map_err(|e| match e {
                ScheduleError::SlotNotFound => AppointmentError::SlotNotFound,
                other => AppointmentError::DatabaseError(other.to_string()),
            })?;

        let entry = self
            .board
            .find_entry(request.doctor_id, slot_id, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?
            .filter(|entry| entry.status == ScheduleStatus::Available)
            .ok_or(AppointmentError::SlotNotAvailable)?;

        if self.slot_is_booked(slot_id, auth_token).await? {
            return Err(AppointmentError::SlotAlreadyBooked);
        }

        let held_by_other = self
            .locks
            .is_held_by_other(slot_id, patient_id, now, auth_token)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
        if held_by_other {
            return Err(AppointmentError::SlotLockedByAnother);
        }

        // The slot's start time is authoritative over anything the client sent.
        let appointment = self
            .insert_appointment(request, patient_id, Some(slot_id), slot.start_time, auth_token)
            .await?;

        self.mark_entry_booked(entry.id, auth_token).await?;

        if let Err(e) = self
            .locks
            .consume_for_holder(slot_id, patient_id, auth_token)
            .await
        {
            // The reservation stands; the leftover lock dies at its expiry.
            warn!("Failed to consume booking lock on slot {}: {}", slot_id, e);
        }

        Ok(appointment)
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    /// A patient's appointments, newest first, optionally narrowed to one
    /// child, each enriched with the doctor's phone where resolvable.
    pub async fn list_for_patient(
        &self,
        patient_id: Uuid,
        child_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<AppointmentOut>, AppointmentError> {
        let mut path = format!("/rest/v1/appointments?patient_id=eq.{}", patient_id);
        if let Some(child_id) = child_id {
            path.push_str(&format!("&child_id=eq.{}", child_id));
        }
        path.push_str("&order=scheduled_at.desc");

        let appointments: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let mut phones: HashMap<Uuid, Option<String>> = HashMap::new();
        let mut result = Vec::with_capacity(appointments.len());
        for appointment in appointments {
            let phone = match phones.get(&appointment.doctor_id) {
                Some(cached) => cached.clone(),
                None => {
                    let fetched = self.doctor_phone(appointment.doctor_id, auth_token).await;
                    phones.insert(appointment.doctor_id, fetched.clone());
                    fetched
                }
            };
            result.push(AppointmentOut::from_appointment(appointment, phone));
        }

        Ok(result)
    }

    pub async fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&order=scheduled_at.desc",
            doctor_id
        );
        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    pub async fn list_all(&self, auth_token: &str) -> Result<Vec<Appointment>, AppointmentError> {
        self.supabase
            .request(
                Method::GET,
                "/rest/v1/appointments?order=scheduled_at.desc",
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    /// Transition an appointment's status. Cancelling a slot-backed
    /// appointment reopens its schedule entry and consults the cancellation
    /// policies; the assessment is reported alongside the updated record.
    pub async fn set_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<(Appointment, Option<CancellationAssessment>), AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        self.lifecycle
            .validate_status_transition(&appointment.status, &new_status)?;

        if new_status == AppointmentStatus::Cancelled {
            if let Some(slot_id) = appointment.slot_id {
                return self
                    .cancel_with_slot(&appointment, slot_id, auth_token)
                    .await;
            }
        }

        let updated = self
            .patch_appointment_status(appointment_id, new_status, auth_token)
            .await?;
        Ok((updated, None))
    }

    /// Cancellation of a slot-backed appointment: status flip and capacity
    /// reopen execute under the slot's guard, so a concurrent reservation
    /// sees either a booked entry or a free one, never a half-way state.
    async fn cancel_with_slot(
        &self,
        appointment: &Appointment,
        slot_id: Uuid,
        auth_token: &str,
    ) -> Result<(Appointment, Option<CancellationAssessment>), AppointmentError> {
        let _guard = self.slot_guards.acquire(slot_id).await;
        let now = Utc::now();

        // Policy evaluation informs the caller; it never blocks cancellation.
        let assessment = match self
            .policies
            .evaluate(appointment.scheduled_at, now, auth_token)
            .await
        {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!("Cancellation policy evaluation failed: {}", e);
                None
            }
        };

        let updated = self
            .patch_appointment_status(appointment.id, AppointmentStatus::Cancelled, auth_token)
            .await?;

        // Reopen capacity for the next reservation.
        let path = format!(
            "/rest/v1/doctor_schedules?doctor_id=eq.{}&slot_id=eq.{}",
            appointment.doctor_id, slot_id
        );
        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(json!({ "status": ScheduleStatus::Available.to_string() })),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        info!(
            "Appointment {} cancelled, slot {} reopened",
            appointment.id, slot_id
        );
        Ok((updated, assessment))
    }

    // ==========================================================================
    // PRIVATE HELPERS
    // ==========================================================================

    async fn doctor_phone(&self, doctor_id: Uuid, auth_token: &str) -> Option<String> {
        match self.verify_doctor(doctor_id, auth_token).await {
            Ok(doctor) => doctor["phone"].as_str().map(str::to_string),
            Err(_) => None,
        }
    }

    async fn verify_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Value, AppointmentError> {
        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        result.into_iter().next().ok_or(AppointmentError::DoctorNotFound)
    }

    async fn verify_child(
        &self,
        child_id: Uuid,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let path = format!(
            "/rest/v1/children?id=eq.{}&user_id=eq.{}",
            child_id, patient_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if result.is_empty() {
            return Err(AppointmentError::ChildNotFound);
        }
        Ok(())
    }

    /// The primary double-booking guard: any non-cancelled appointment
    /// already referencing the slot blocks a new one.
    async fn slot_is_booked(&self, slot_id: Uuid, auth_token: &str) -> Result<bool, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?slot_id=eq.{}&status=neq.cancelled",
            slot_id
        );
        let existing: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(!existing.is_empty())
    }

    async fn insert_appointment(
        &self,
        request: &ReserveAppointmentRequest,
        patient_id: Uuid,
        slot_id: Option<Uuid>,
        scheduled_at: chrono::DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment_data = json!({
            "id": Uuid::new_v4(),
            "patient_id": patient_id,
            "child_id": request.child_id,
            "doctor_id": request.doctor_id,
            "slot_id": slot_id,
            "scheduled_at": scheduled_at.to_rfc3339(),
            "status": AppointmentStatus::Pending.to_string(),
            "reason": request.reason,
            "note": request.note,
            "created_at": Utc::now().to_rfc3339(),
        });

        let created: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| match e {
                // The storage layer's unique constraint on live slot
                // references backstops the pre-check; its violation is a
                // booking conflict, not an internal failure.
                DbError::Conflict(_) => AppointmentError::SlotAlreadyBooked,
                other => AppointmentError::DatabaseError(other.to_string()),
            })?;

        let appointment = created.into_iter().next().ok_or_else(|| {
            AppointmentError::DatabaseError("Appointment creation returned no row".to_string())
        })?;

        debug!("Appointment {} created as {}", appointment.id, appointment.status);
        Ok(appointment)
    }

    async fn mark_entry_booked(&self, entry_id: Uuid, auth_token: &str) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/doctor_schedules?id=eq.{}", entry_id);
        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(json!({ "status": ScheduleStatus::Booked.to_string() })),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    async fn patch_appointment_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let updated: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(json!({ "status": new_status.to_string() })),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        updated.into_iter().next().ok_or(AppointmentError::NotFound)
    }
}
