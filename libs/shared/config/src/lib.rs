use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub supabase_service_role_key: Option<String>,
    pub bind_address: String,
    pub payment_retry_attempts: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY").ok()
                .filter(|key| !key.is_empty()),
            bind_address: env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            payment_retry_attempts: env::var("PAYMENT_RETRY_ATTEMPTS")
                .ok()
                .and_then(|value| match value.parse::<u32>() {
                    Ok(attempts) if attempts > 0 => Some(attempts),
                    _ => {
                        warn!("PAYMENT_RETRY_ATTEMPTS={} is not a positive integer, using default", value);
                        None
                    }
                })
                .unwrap_or(DEFAULT_PAYMENT_RETRY_ATTEMPTS),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    /// Supabase-backed persistence is only used when both URL and key are present.
    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    pub fn has_persistent_store(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }
}

pub const DEFAULT_PAYMENT_RETRY_ATTEMPTS: u32 = 3;

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            supabase_service_role_key: None,
            bind_address: "0.0.0.0:3000".to_string(),
            payment_retry_attempts: DEFAULT_PAYMENT_RETRY_ATTEMPTS,
        }
    }
}
