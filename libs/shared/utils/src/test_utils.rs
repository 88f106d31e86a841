use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{ClinicRole, User};

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
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// A clinic staff member for tests. `role` is the clinic role string placed
/// in `app_metadata.clinic_role`.
pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
    pub clinic_id: Uuid,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "ADMIN".to_string(),
            clinic_id: Uuid::new_v4(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
            clinic_id: Uuid::new_v4(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "DOCTOR")
    }

    pub fn nurse(email: &str) -> Self {
        Self::new(email, "NURSE")
    }

    pub fn receptionist(email: &str) -> Self {
        Self::new(email, "RECEPTIONIST")
    }

    pub fn in_clinic(mut self, clinic_id: Uuid) -> Self {
        self.clinic_id = clinic_id;
        self
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some("authenticated".to_string()),
            clinic_id: Some(self.clinic_id),
            clinic_role: self.role.parse::<ClinicRole>().ok(),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "app_metadata": {
                "clinic_id": user.clinic_id.to_string(),
                "clinic_role": user.role,
            },
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn appointment_row(clinic_id: Uuid, doctor_id: Uuid, start: &str, end: &str, status: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "clinic_id": clinic_id,
            "patient_id": Uuid::new_v4(),
            "doctor_id": doctor_id,
            "start_time": start,
            "end_time": end,
            "status": status,
            "reason": null,
            "notes": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn patient_row(clinic_id: Uuid, patient_id: Uuid) -> serde_json::Value {
        json!({
            "id": patient_id,
            "clinic_id": clinic_id
        })
    }

    /// Row shaped like PostgREST returns `invoices`; numerics come back as JSON numbers.
    pub fn invoice_row(clinic_id: Uuid, number: &str, total: i64, amount_paid: i64, status: &str, version: i64) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "clinic_id": clinic_id,
            "patient_id": Uuid::new_v4(),
            "invoice_number": number,
            "issue_date": "2024-03-04",
            "due_date": null,
            "subtotal": total,
            "discount": 0,
            "line_discount_total": 0,
            "tax": 0,
            "total": total,
            "amount_paid": amount_paid,
            "status": status,
            "notes": null,
            "version": version,
            "created_at": "2024-03-04T09:00:00Z",
            "updated_at": "2024-03-04T09:00:00Z"
        })
    }

    pub fn postgrest_error(code: &str, message: &str) -> serde_json::Value {
        json!({
            "code": code,
            "message": message,
            "details": null,
            "hint": null
        })
    }
}
