use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use chrono::{Utc, TimeZone};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::{ClinicRole, JwtClaims, User};

type HmacSha256 = Hmac<Sha256>;

pub fn validate_token(token: &str, jwt_secret: &str) -> Result<User, String> {
    if jwt_secret.is_empty() {
        return Err("JWT secret is not set".to_string());
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err("Invalid token format".to_string());
    }

    let header_b64 = parts[0];
    let claims_b64 = parts[1];
    let signature_b64 = parts[2];

    let signature = match URL_SAFE_NO_PAD.decode(signature_b64) {
        Ok(sig) => sig,
        Err(e) => {
            debug!("Failed to decode signature: {}", e);
            return Err("Invalid signature encoding".to_string());
        }
    };

    let signature_string = format!("{}.{}", header_b64, claims_b64);

    let mut mac = match HmacSha256::new_from_slice(jwt_secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return Err("Failed to create HMAC".to_string()),
    };

    mac.update(signature_string.as_bytes());

    if mac.verify_slice(&signature).is_err() {
        debug!("Token signature verification failed");
        return Err("Invalid token signature".to_string());
    }

    let claims_json = match URL_SAFE_NO_PAD.decode(claims_b64) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(json_str) => json_str,
            Err(_) => return Err("Invalid claims encoding".to_string()),
        },
        Err(_) => return Err("Invalid claims encoding".to_string()),
    };

    let claims: JwtClaims = match serde_json::from_str(&claims_json) {
        Ok(c) => c,
        Err(e) => {
            debug!("Failed to parse claims: {}", e);
            return Err("Invalid claims format".to_string());
        },
    };

    if let Some(exp) = claims.exp {
        let now = Utc::now().timestamp() as u64;
        if exp < now {
            debug!("Token expired at {} (now: {})", exp, now);
            return Err("Token expired".to_string());
        }
    }

    let created_at = claims.iat
        .and_then(|timestamp| Utc.timestamp_opt(timestamp as i64, 0).single());

    let (clinic_id, clinic_role) = clinic_claims(claims.app_metadata.as_ref())?;

    let user = User {
        id: claims.sub,
        email: claims.email,
        role: claims.role,
        clinic_id,
        clinic_role,
        metadata: claims.user_metadata,
        created_at,
    };

    debug!("Token validated successfully for user: {}", user.id);
    Ok(user)
}

/// Reads `clinic_id` and `clinic_role` from `app_metadata`. Both are optional
/// here; a present but malformed value is rejected.
fn clinic_claims(app_metadata: Option<&Value>) -> Result<(Option<Uuid>, Option<ClinicRole>), String> {
    let Some(metadata) = app_metadata else {
        return Ok((None, None));
    };

    let clinic_id = match metadata.get("clinic_id").and_then(Value::as_str) {
        Some(raw) => Some(Uuid::parse_str(raw).map_err(|_| "Invalid clinic_id claim".to_string())?),
        None => None,
    };

    let clinic_role = match metadata.get("clinic_role").and_then(Value::as_str) {
        Some(raw) => Some(raw.parse::<ClinicRole>()?),
        None => None,
    };

    Ok((clinic_id, clinic_role))
}
