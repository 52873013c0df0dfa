// libs/appointment-cell/tests/reservation_test.rs
//
// Exercises the reservation protocol against a mocked storage API, including
// the concurrency property: two simultaneous reservations of the same slot
// must resolve to exactly one booking.
use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{AppointmentError, AppointmentStatus, ReserveAppointmentRequest};
use appointment_cell::services::reservation::ReservationService;
use shared_utils::guards::SlotGuards;
use shared_utils::test_utils::TestConfig;

const AUTH_TOKEN: &str = "test-token";
const SLOT_START: &str = "2026-09-01T09:00:00+00:00";
const SLOT_END: &str = "2026-09-01T09:30:00+00:00";

struct Fixture {
    doctor_id: Uuid,
    slot_id: Uuid,
    entry_id: Uuid,
}

impl Fixture {
    fn new() -> Self {
        Self {
            doctor_id: Uuid::new_v4(),
            slot_id: Uuid::new_v4(),
            entry_id: Uuid::new_v4(),
        }
    }

    fn doctor_json(&self) -> serde_json::Value {
        json!({
            "id": self.doctor_id,
            "first_name": "Jane",
            "last_name": "Smith",
            "phone": "+15550100"
        })
    }

    fn slot_json(&self) -> serde_json::Value {
        json!({
            "id": self.slot_id,
            "start_time": SLOT_START,
            "end_time": SLOT_END,
            "duration_minutes": 30,
            "slot_type": "working",
            "created_by": null,
            "is_active": true,
            "created_at": "2026-08-01T08:00:00+00:00"
        })
    }

    fn entry_json(&self, status: &str) -> serde_json::Value {
        json!({
            "id": self.entry_id,
            "doctor_id": self.doctor_id,
            "slot_id": self.slot_id,
            "status": status,
            "created_at": "2026-08-01T08:00:00+00:00"
        })
    }

    fn appointment_json(&self, id: Uuid, patient_id: Uuid, status: &str) -> serde_json::Value {
        json!({
            "id": id,
            "patient_id": patient_id,
            "child_id": null,
            "doctor_id": self.doctor_id,
            "slot_id": self.slot_id,
            "scheduled_at": SLOT_START,
            "status": status,
            "reason": null,
            "note": null,
            "created_at": "2026-08-20T12:00:00+00:00"
        })
    }

    fn reserve_request(&self) -> ReserveAppointmentRequest {
        ReserveAppointmentRequest {
            doctor_id: self.doctor_id,
            child_id: None,
            slot_id: Some(self.slot_id),
            scheduled_at: None,
            reason: Some("checkup".to_string()),
            note: None,
        }
    }
}

async fn service_for(server: &MockServer) -> ReservationService {
    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    ReservationService::new(&config, SlotGuards::new())
}

async fn mount_doctor(server: &MockServer, fixture: &Fixture) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![fixture.doctor_json()]))
        .mount(server)
        .await;
}

async fn mount_slot_and_entry(server: &MockServer, fixture: &Fixture, entry_status: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![fixture.slot_json()]))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![fixture.entry_json(entry_status)]))
        .mount(server)
        .await;
}

async fn mount_side_effects(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/notifications"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/activity_logs"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_reserve_slot_happy_path() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;
    let fixture = Fixture::new();
    let patient_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    mount_doctor(&server, &fixture).await;
    mount_slot_and_entry(&server, &fixture, "available").await;
    mount_side_effects(&server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/booking_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![fixture.appointment_json(
            appointment_id,
            patient_id,
            "pending",
        )]))
        .expect(1)
        .mount(&server)
        .await;

    // The schedule entry flips to booked as part of the reservation.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctor_schedules"))
        .and(body_partial_json(json!({ "status": "booked" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![fixture.entry_json("booked")]))
        .expect(1)
        .mount(&server)
        .await;

    // The requester's own lock is consumed.
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/booking_locks"))
        .and(query_param("locked_by", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let appointment = service
        .reserve(fixture.reserve_request(), patient_id, Some("parent@example.com"), AUTH_TOKEN)
        .await
        .expect("reservation should succeed");

    assert_eq!(appointment.id, appointment_id);
    assert_eq!(appointment.status, AppointmentStatus::Pending);
    // Slot time is authoritative for the appointment timestamp.
    assert_eq!(appointment.scheduled_at.to_rfc3339(), SLOT_START);
    assert_eq!(appointment.doctor_phone.as_deref(), Some("+15550100"));
}

#[tokio::test]
async fn test_reserve_unknown_doctor() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;
    let fixture = Fixture::new();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = service
        .reserve(fixture.reserve_request(), Uuid::new_v4(), None, AUTH_TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::DoctorNotFound));
}

#[tokio::test]
async fn test_reserve_unknown_child() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;
    let fixture = Fixture::new();

    mount_doctor(&server, &fixture).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/children"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let mut request = fixture.reserve_request();
    request.child_id = Some(Uuid::new_v4());

    let result = service.reserve(request, Uuid::new_v4(), None, AUTH_TOKEN).await;
    assert_matches!(result, Err(AppointmentError::ChildNotFound));
}

#[tokio::test]
async fn test_reserve_inactive_slot() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;
    let fixture = Fixture::new();

    mount_doctor(&server, &fixture).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = service
        .reserve(fixture.reserve_request(), Uuid::new_v4(), None, AUTH_TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::SlotNotFound));
}

#[tokio::test]
async fn test_reserve_slot_not_available() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;
    let fixture = Fixture::new();

    mount_doctor(&server, &fixture).await;
    mount_slot_and_entry(&server, &fixture, "blocked").await;

    let result = service
        .reserve(fixture.reserve_request(), Uuid::new_v4(), None, AUTH_TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::SlotNotAvailable));
}

#[tokio::test]
async fn test_reserve_slot_already_booked() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;
    let fixture = Fixture::new();

    mount_doctor(&server, &fixture).await;
    mount_slot_and_entry(&server, &fixture, "available").await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![fixture.appointment_json(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "pending",
        )]))
        .mount(&server)
        .await;

    let result = service
        .reserve(fixture.reserve_request(), Uuid::new_v4(), None, AUTH_TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::SlotAlreadyBooked));
}

#[tokio::test]
async fn test_reserve_slot_locked_by_another_user() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;
    let fixture = Fixture::new();
    let patient_id = Uuid::new_v4();

    mount_doctor(&server, &fixture).await;
    mount_slot_and_entry(&server, &fixture, "available").await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/booking_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": Uuid::new_v4(),
            "slot_id": fixture.slot_id,
            "doctor_id": null,
            "locked_by": Uuid::new_v4(),
            "expires_at": (Utc::now() + Duration::minutes(5)).to_rfc3339(),
            "created_at": Utc::now().to_rfc3339()
        }])))
        .mount(&server)
        .await;

    let result = service
        .reserve(fixture.reserve_request(), patient_id, None, AUTH_TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::SlotLockedByAnother));
}

#[tokio::test]
async fn test_reserve_maps_storage_conflict_to_already_booked() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;
    let fixture = Fixture::new();

    mount_doctor(&server, &fixture).await;
    mount_slot_and_entry(&server, &fixture, "available").await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/booking_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    // The unique constraint fires even though the pre-check passed; the
    // client must still see a booking conflict, not an internal error.
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key value"))
        .mount(&server)
        .await;

    let result = service
        .reserve(fixture.reserve_request(), Uuid::new_v4(), None, AUTH_TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::SlotAlreadyBooked));
}

#[tokio::test]
async fn test_reserve_ad_hoc_without_slot() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;
    let fixture = Fixture::new();
    let patient_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    mount_doctor(&server, &fixture).await;
    mount_side_effects(&server).await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "slot_id": null })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
            "id": appointment_id,
            "patient_id": patient_id,
            "child_id": null,
            "doctor_id": fixture.doctor_id,
            "slot_id": null,
            "scheduled_at": "2026-09-02T14:00:00+00:00",
            "status": "pending",
            "reason": null,
            "note": null,
            "created_at": "2026-08-20T12:00:00+00:00"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let request = ReserveAppointmentRequest {
        doctor_id: fixture.doctor_id,
        child_id: None,
        slot_id: None,
        scheduled_at: Some("2026-09-02T14:00:00".to_string()),
        reason: None,
        note: None,
    };

    let appointment = service
        .reserve(request, patient_id, None, AUTH_TOKEN)
        .await
        .expect("ad-hoc reservation should succeed");

    assert_eq!(appointment.id, appointment_id);
    assert_eq!(appointment.slot_id, None);
}

#[tokio::test]
async fn test_reserve_ad_hoc_requires_timestamp() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;
    let fixture = Fixture::new();

    mount_doctor(&server, &fixture).await;

    let request = ReserveAppointmentRequest {
        doctor_id: fixture.doctor_id,
        child_id: None,
        slot_id: None,
        scheduled_at: None,
        reason: None,
        note: None,
    };

    let result = service.reserve(request, Uuid::new_v4(), None, AUTH_TOKEN).await;
    assert_matches!(result, Err(AppointmentError::MissingTimestamp));
}

#[tokio::test]
async fn test_reserve_ad_hoc_rejects_bad_timestamp() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;
    let fixture = Fixture::new();

    mount_doctor(&server, &fixture).await;

    let request = ReserveAppointmentRequest {
        doctor_id: fixture.doctor_id,
        child_id: None,
        slot_id: None,
        scheduled_at: Some("tomorrow at noon".to_string()),
        reason: None,
        note: None,
    };

    let result = service.reserve(request, Uuid::new_v4(), None, AUTH_TOKEN).await;
    assert_matches!(result, Err(AppointmentError::InvalidTimestamp));
}

#[tokio::test]
async fn test_concurrent_reservations_one_wins() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;
    let fixture = Fixture::new();
    let patient_a = Uuid::new_v4();
    let patient_b = Uuid::new_v4();

    mount_doctor(&server, &fixture).await;
    mount_slot_and_entry(&server, &fixture, "available").await;
    mount_side_effects(&server).await;

    // The slot probe finds no appointment exactly once; whichever caller
    // enters the critical section second sees the winner's row instead.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![fixture.appointment_json(
            Uuid::new_v4(),
            patient_a,
            "pending",
        )]))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/booking_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![fixture.appointment_json(
            Uuid::new_v4(),
            patient_a,
            "pending",
        )]))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctor_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![fixture.entry_json("booked")]))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/booking_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let (first, second) = tokio::join!(
        service.reserve(fixture.reserve_request(), patient_a, None, AUTH_TOKEN),
        service.reserve(fixture.reserve_request(), patient_b, None, AUTH_TOKEN),
    );

    let successes = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1, "exactly one concurrent reservation must win");

    let loser = if first.is_err() {
        first.unwrap_err()
    } else {
        second.unwrap_err()
    };
    assert_matches!(loser, AppointmentError::SlotAlreadyBooked);
}

#[tokio::test]
async fn test_cancellation_reopens_capacity() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;
    let fixture = Fixture::new();
    let patient_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let policy_id = Uuid::new_v4();

    // Appointment two hours out; the 24-hour policy below makes this a
    // late cancellation.
    let scheduled_at = (Utc::now() + Duration::hours(2)).to_rfc3339();
    let stored = json!({
        "id": appointment_id,
        "patient_id": patient_id,
        "child_id": null,
        "doctor_id": fixture.doctor_id,
        "slot_id": fixture.slot_id,
        "scheduled_at": scheduled_at,
        "status": "pending",
        "reason": null,
        "note": null,
        "created_at": "2026-08-20T12:00:00+00:00"
    });
    let mut cancelled = stored.clone();
    cancelled["status"] = json!("cancelled");

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![stored]))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/cancellation_policies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": policy_id,
            "min_hours_before": 24,
            "fee_percent": 50.0,
            "applies_to": "all",
            "created_at": "2026-08-01T08:00:00+00:00"
        }])))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "status": "cancelled" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![cancelled]))
        .expect(1)
        .mount(&server)
        .await;

    // Capacity reopens: the (doctor, slot) entry goes back to available.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctor_schedules"))
        .and(query_param("doctor_id", format!("eq.{}", fixture.doctor_id)))
        .and(query_param("slot_id", format!("eq.{}", fixture.slot_id)))
        .and(body_partial_json(json!({ "status": "available" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![fixture.entry_json("available")]))
        .expect(1)
        .mount(&server)
        .await;

    let (updated, assessment) = service
        .set_status(appointment_id, AppointmentStatus::Cancelled, AUTH_TOKEN)
        .await
        .expect("cancellation should succeed");

    assert_eq!(updated.status, AppointmentStatus::Cancelled);

    let assessment = assessment.expect("an applicable policy must be reported");
    assert!(!assessment.within_notice);
    assert_eq!(assessment.fee_percent, 50.0);
    assert_eq!(assessment.policy_id, Some(policy_id));
}

#[tokio::test]
async fn test_set_status_rejects_terminal_transitions() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;
    let fixture = Fixture::new();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![fixture.appointment_json(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "completed",
        )]))
        .mount(&server)
        .await;

    let result = service
        .set_status(Uuid::new_v4(), AppointmentStatus::Confirmed, AUTH_TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidStatusTransition { .. }));
}

#[tokio::test]
async fn test_set_status_missing_appointment() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = service
        .set_status(Uuid::new_v4(), AppointmentStatus::Confirmed, AUTH_TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::NotFound));
}

#[tokio::test]
async fn test_list_for_patient_enriches_doctor_phone() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;
    let fixture = Fixture::new();
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("patient_id", format!("eq.{}", patient_id)))
        .and(query_param("order", "scheduled_at.desc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            fixture.appointment_json(Uuid::new_v4(), patient_id, "pending"),
            fixture.appointment_json(Uuid::new_v4(), patient_id, "confirmed"),
        ]))
        .mount(&server)
        .await;

    // Both rows share one doctor; the phone lookup happens once.
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![fixture.doctor_json()]))
        .expect(1)
        .mount(&server)
        .await;

    let appointments = service
        .list_for_patient(patient_id, None, AUTH_TOKEN)
        .await
        .expect("listing should succeed");

    assert_eq!(appointments.len(), 2);
    assert!(appointments
        .iter()
        .all(|a| a.doctor_phone.as_deref() == Some("+15550100")));
}
