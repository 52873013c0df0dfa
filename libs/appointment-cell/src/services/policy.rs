// libs/appointment-cell/src/services/policy.rs
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{representation_headers, SupabaseClient};

use crate::models::{
    AppointmentError, CancellationAssessment, CancellationPolicy, CancellationPolicyRequest,
    PolicyScope,
};

/// Administratively configured cancellation rules, consulted as a pluggable
/// step whenever an appointment is cancelled. The assessment is reported to
/// the caller; it never blocks the cancellation itself.
pub struct CancellationPolicyEngine {
    supabase: SupabaseClient,
}

impl CancellationPolicyEngine {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn list_policies(&self, auth_token: &str) -> Result<Vec<CancellationPolicy>, AppointmentError> {
        self.supabase
            .request(Method::GET, "/rest/v1/cancellation_policies", Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    pub async fn create_policy(
        &self,
        request: CancellationPolicyRequest,
        auth_token: &str,
    ) -> Result<CancellationPolicy, AppointmentError> {
        let policy_data = json!({
            "id": Uuid::new_v4(),
            "min_hours_before": request.min_hours_before,
            "fee_percent": request.fee_percent,
            "applies_to": request.applies_to.to_string(),
            "created_at": Utc::now().to_rfc3339(),
        });

        let created: Vec<CancellationPolicy> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/cancellation_policies",
                Some(auth_token),
                Some(policy_data),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let policy = created.into_iter().next().ok_or_else(|| {
            AppointmentError::DatabaseError("Policy creation returned no row".to_string())
        })?;

        info!("Cancellation policy {} created", policy.id);
        Ok(policy)
    }

    pub async fn update_policy(
        &self,
        policy_id: Uuid,
        request: CancellationPolicyRequest,
        auth_token: &str,
    ) -> Result<CancellationPolicy, AppointmentError> {
        let path = format!("/rest/v1/cancellation_policies?id=eq.{}", policy_id);
        let updated: Vec<CancellationPolicy> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(json!({
                    "min_hours_before": request.min_hours_before,
                    "fee_percent": request.fee_percent,
                    "applies_to": request.applies_to.to_string(),
                })),
                Some(representation_headers()),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        updated.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    pub async fn delete_policy(&self, policy_id: Uuid, auth_token: &str) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/cancellation_policies?id=eq.{}", policy_id);
        let deleted: Vec<CancellationPolicy> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                Some(auth_token),
                None,
                Some(representation_headers()),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if deleted.is_empty() {
            return Err(AppointmentError::NotFound);
        }
        Ok(())
    }

    /// Evaluate the stored policies against a cancellation happening at
    /// `now` for an appointment scheduled at `scheduled_at`.
    pub async fn evaluate(
        &self,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Option<CancellationAssessment>, AppointmentError> {
        let policies = self.list_policies(auth_token).await?;
        let assessment = assess_cancellation(&policies, scheduled_at, now);
        debug!("Cancellation assessment: {:?}", assessment);
        Ok(assessment)
    }
}

/// Pure policy evaluation. Only `all`-scoped policies apply: the ledger does
/// not record a consultation mode, so mode-scoped rules have nothing to
/// match against yet. Of the applicable policies the one with the highest
/// violated fee wins; with no violation the strictest notice window is
/// reported as honored.
pub fn assess_cancellation(
    policies: &[CancellationPolicy],
    scheduled_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<CancellationAssessment> {
    let applicable: Vec<&CancellationPolicy> = policies
        .iter()
        .filter(|p| p.applies_to == PolicyScope::All)
        .collect();

    if applicable.is_empty() {
        return None;
    }

    let violated = applicable
        .iter()
        .filter(|p| scheduled_at - now < Duration::hours(p.min_hours_before as i64))
        .max_by(|a, b| {
            a.fee_percent
                .partial_cmp(&b.fee_percent)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

    if let Some(policy) = violated {
        return Some(CancellationAssessment {
            policy_id: Some(policy.id),
            fee_percent: policy.fee_percent,
            within_notice: false,
        });
    }

    let strictest = applicable.iter().max_by_key(|p| p.min_hours_before)?;

    Some(CancellationAssessment {
        policy_id: Some(strictest.id),
        fee_percent: 0.0,
        within_notice: true,
    })
}
