use reqwest::Method;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::supabase::SupabaseClient;

/// Best-effort audit trail write. Administrative actions record what happened
/// and by whom; a failed write is logged and never fails the calling
/// operation.
pub async fn log_activity(
    client: &SupabaseClient,
    auth_token: &str,
    user_id: &str,
    action: &str,
    detail: &str,
) {
    let entry = json!({
        "id": Uuid::new_v4(),
        "user_id": user_id,
        "action": action,
        "detail": detail,
        "created_at": chrono::Utc::now().to_rfc3339(),
    });

    if let Err(e) = client
        .request::<Value>(Method::POST, "/rest/v1/activity_logs", Some(auth_token), Some(entry))
        .await
    {
        warn!("Failed to record audit entry '{}': {}", action, e);
    }
}
