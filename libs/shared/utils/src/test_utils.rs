use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;

type HmacSha256 = Hmac<Sha256>;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    /// Test config whose storage requests go to `base_url` (a mock server).
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            supabase_url: base_url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            booking_lock_ttl_minutes: 5,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "user".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn patient() -> Self {
        Self::new("patient@example.com", "user")
    }

    pub fn doctor() -> Self {
        Self::new("doctor@example.com", "doctor")
    }

    pub fn admin() -> Self {
        Self::new("admin@example.com", "admin")
    }

    /// Mint a signed HS256 token for this user, valid for one hour.
    pub fn to_token(&self, jwt_secret: &str) -> String {
        let exp = (Utc::now() + Duration::hours(1)).timestamp();
        self.to_token_with_exp(jwt_secret, exp)
    }

    /// Mint a token with an explicit expiry, for exercising rejection paths.
    pub fn to_token_with_exp(&self, jwt_secret: &str, exp: i64) -> String {
        let now = Utc::now();
        let header = json!({ "alg": "HS256", "typ": "JWT" });
        let claims = json!({
            "sub": self.id,
            "email": self.email,
            "role": self.role,
            "iat": now.timestamp(),
            "exp": exp,
        });

        let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string());
        let claims_b64 = URL_SAFE_NO_PAD.encode(claims.to_string());
        let signing_input = format!("{}.{}", header_b64, claims_b64);

        let mut mac = HmacSha256::new_from_slice(jwt_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{}.{}", signing_input, signature)
    }
}
