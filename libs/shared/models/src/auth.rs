use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

/// Authenticated caller as resolved from the bearer token.
///
/// `clinic_id` and `clinic_role` come from the token's `app_metadata`; the
/// Supabase `role` claim (usually `authenticated`) is kept separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub clinic_id: Option<Uuid>,
    pub clinic_role: Option<ClinicRole>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClinicRole {
    Admin,
    Doctor,
    Nurse,
    Receptionist,
}

impl ClinicRole {
    pub const ALL: [ClinicRole; 4] = [
        ClinicRole::Admin,
        ClinicRole::Doctor,
        ClinicRole::Nurse,
        ClinicRole::Receptionist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClinicRole::Admin => "ADMIN",
            ClinicRole::Doctor => "DOCTOR",
            ClinicRole::Nurse => "NURSE",
            ClinicRole::Receptionist => "RECEPTIONIST",
        }
    }
}

impl fmt::Display for ClinicRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClinicRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(ClinicRole::Admin),
            "DOCTOR" => Ok(ClinicRole::Doctor),
            "NURSE" => Ok(ClinicRole::Nurse),
            "RECEPTIONIST" | "STAFF" => Ok(ClinicRole::Receptionist),
            other => Err(format!("Unknown clinic role: {}", other)),
        }
    }
}
