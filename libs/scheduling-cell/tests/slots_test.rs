// libs/scheduling-cell/tests/slots_test.rs
use assert_matches::assert_matches;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scheduling_cell::models::{ScheduleError, SlotType};
use scheduling_cell::services::slots::SlotCatalogService;
use scheduling_cell::CreateSlotRequest;
use shared_utils::test_utils::TestConfig;

const AUTH_TOKEN: &str = "test-token";

fn slot_json(id: Uuid, start: &str, end: &str, active: bool) -> serde_json::Value {
    json!({
        "id": id,
        "start_time": start,
        "end_time": end,
        "duration_minutes": 30,
        "slot_type": "working",
        "created_by": null,
        "is_active": active,
        "created_at": "2026-08-01T08:00:00+00:00"
    })
}

fn create_request(start: &str, end: &str) -> CreateSlotRequest {
    CreateSlotRequest {
        start_time: start.to_string(),
        end_time: end.to_string(),
        duration_minutes: None,
        slot_type: SlotType::Working,
        is_active: true,
    }
}

async fn service_for(server: &MockServer) -> SlotCatalogService {
    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    SlotCatalogService::new(&config)
}

#[tokio::test]
async fn test_create_slot_rejects_inverted_range() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;

    let request = create_request("2026-09-01T10:00:00Z", "2026-09-01T09:30:00Z");
    let result = service.create_slot(request, None, AUTH_TOKEN).await;

    assert_matches!(result, Err(ScheduleError::InvalidTimeRange));
}

#[tokio::test]
async fn test_create_slot_rejects_equal_endpoints() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;

    let request = create_request("2026-09-01T10:00:00Z", "2026-09-01T10:00:00Z");
    let result = service.create_slot(request, None, AUTH_TOKEN).await;

    assert_matches!(result, Err(ScheduleError::InvalidTimeRange));
}

#[tokio::test]
async fn test_create_slot_rejects_bad_timestamp() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;

    let request = create_request("next tuesday", "2026-09-01T10:00:00Z");
    let result = service.create_slot(request, None, AUTH_TOKEN).await;

    assert_matches!(result, Err(ScheduleError::InvalidTimestamp));
}

#[tokio::test]
async fn test_create_slot_derives_duration() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;
    let slot_id = Uuid::new_v4();

    // The 09:00-09:30 interval must be stored as 30 minutes when the client
    // omits the duration.
    Mock::given(method("POST"))
        .and(path("/rest/v1/time_slots"))
        .and(body_partial_json(json!({ "duration_minutes": 30 })))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![slot_json(
            slot_id,
            "2026-09-01T09:00:00+00:00",
            "2026-09-01T09:30:00+00:00",
            true,
        )]))
        .expect(1)
        .mount(&server)
        .await;

    let request = create_request("2026-09-01T09:00:00Z", "2026-09-01T09:30:00Z");
    let slot = service
        .create_slot(request, None, AUTH_TOKEN)
        .await
        .expect("slot should be created");

    assert_eq!(slot.id, slot_id);
    assert_eq!(slot.duration_minutes, Some(30));
    assert!(slot.is_active);
}

#[tokio::test]
async fn test_list_slots_orders_by_start_time_and_filters_active() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .and(query_param("is_active", "eq.true"))
        .and(query_param("order", "start_time.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            slot_json(Uuid::new_v4(), "2026-09-01T09:00:00+00:00", "2026-09-01T09:30:00+00:00", true),
            slot_json(Uuid::new_v4(), "2026-09-01T10:00:00+00:00", "2026-09-01T10:30:00+00:00", true),
        ]))
        .expect(1)
        .mount(&server)
        .await;

    let slots = service
        .list_slots(true, AUTH_TOKEN)
        .await
        .expect("listing should succeed");

    assert_eq!(slots.len(), 2);
    assert!(slots[0].start_time < slots[1].start_time);
}

#[tokio::test]
async fn test_list_slots_includes_inactive_when_requested() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .and(query_param("order", "start_time.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![slot_json(
            Uuid::new_v4(),
            "2026-09-01T09:00:00+00:00",
            "2026-09-01T09:30:00+00:00",
            false,
        )]))
        .mount(&server)
        .await;

    let slots = service
        .list_slots(false, AUTH_TOKEN)
        .await
        .expect("listing should succeed");

    assert_eq!(slots.len(), 1);
    assert!(!slots[0].is_active);
}

#[tokio::test]
async fn test_get_active_slot_missing() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    let result = service.get_active_slot(Uuid::new_v4(), AUTH_TOKEN).await;
    assert_matches!(result, Err(ScheduleError::SlotNotFound));
}

#[tokio::test]
async fn test_deactivate_slot_flips_flag_only() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;
    let slot_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![slot_json(
            slot_id,
            "2026-09-01T09:00:00+00:00",
            "2026-09-01T09:30:00+00:00",
            true,
        )]))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/time_slots"))
        .and(body_partial_json(json!({ "is_active": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![slot_json(
            slot_id,
            "2026-09-01T09:00:00+00:00",
            "2026-09-01T09:30:00+00:00",
            false,
        )]))
        .expect(1)
        .mount(&server)
        .await;

    service
        .deactivate_slot(slot_id, AUTH_TOKEN)
        .await
        .expect("deactivation should succeed");
}

#[tokio::test]
async fn test_update_slot_validates_merged_range() {
    let server = MockServer::start().await;
    let service = service_for(&server).await;
    let slot_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/time_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![slot_json(
            slot_id,
            "2026-09-01T09:00:00+00:00",
            "2026-09-01T09:30:00+00:00",
            true,
        )]))
        .mount(&server)
        .await;

    // Moving the end before the existing start must fail even though only
    // one endpoint changed.
    let request = scheduling_cell::UpdateSlotRequest {
        end_time: Some("2026-09-01T08:00:00Z".to_string()),
        ..Default::default()
    };
    let result = service.update_slot(slot_id, request, AUTH_TOKEN).await;

    assert_matches!(result, Err(ScheduleError::InvalidTimeRange));
}
