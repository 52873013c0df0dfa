// libs/appointment-cell/src/services/events.rs
//
// Best-effort side effects emitted after a successful reservation. Failures
// here are logged and never roll back the booking.
use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

/// Queue a booking notification for the doctor.
pub async fn notify_doctor_of_booking(
    supabase: &SupabaseClient,
    auth_token: &str,
    doctor_id: Uuid,
    patient_email: Option<&str>,
) {
    let body = match patient_email {
        Some(email) => format!("New appointment requested by {}", email),
        None => "New appointment requested".to_string(),
    };

    let notification = json!({
        "id": Uuid::new_v4(),
        "user_id": doctor_id,
        "type": "booking",
        "title": "New appointment booked",
        "body": body,
        "sent_at": Utc::now().to_rfc3339(),
    });

    if let Err(e) = supabase
        .request::<Value>(Method::POST, "/rest/v1/notifications", Some(auth_token), Some(notification))
        .await
    {
        warn!("Failed to queue booking notification for doctor {}: {}", doctor_id, e);
    }
}
