use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// PostgreSQL `exclusion_violation`.
pub const PG_EXCLUSION_VIOLATION: &str = "23P01";
/// PostgreSQL `unique_violation`.
pub const PG_UNIQUE_VIOLATION: &str = "23505";
/// PostgreSQL `serialization_failure`, also raised by our RPCs on stale versions.
pub const PG_SERIALIZATION_FAILURE: &str = "40001";

#[derive(Error, Debug)]
pub enum SupabaseError {
    #[error("API error ({status}): {message}")]
    Api {
        status: StatusCode,
        code: Option<String>,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl SupabaseError {
    /// PostgreSQL error code carried in a PostgREST error body, if any.
    pub fn pg_code(&self) -> Option<&str> {
        match self {
            SupabaseError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            SupabaseError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_exclusion_violation(&self) -> bool {
        self.pg_code() == Some(PG_EXCLUSION_VIOLATION)
    }

    pub fn is_unique_violation(&self) -> bool {
        self.pg_code() == Some(PG_UNIQUE_VIOLATION)
    }

    pub fn is_serialization_failure(&self) -> bool {
        self.pg_code() == Some(PG_SERIALIZATION_FAILURE)
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self.status(), Some(StatusCode::UNAUTHORIZED) | Some(StatusCode::FORBIDDEN))
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    /// Client that authenticates with the service role key instead of the
    /// caller's token (used for writes that bypass row level security).
    pub fn with_api_key(config: &AppConfig, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: api_key.to_string(),
        }
    }

    /// Client for server-side stores: the service role key when configured,
    /// the anon key otherwise. Tenant filters are applied by the caller.
    pub fn backend(config: &AppConfig) -> Self {
        match &config.supabase_service_role_key {
            Some(key) => Self::with_api_key(config, key),
            None => Self::new(config),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, SupabaseError> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.anon_key)
                .map_err(|e| SupabaseError::InvalidHeader(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let bearer = auth_token.unwrap_or(&self.anon_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", bearer))
                .map_err(|e| SupabaseError::InvalidHeader(e.to_string()))?,
        );

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T, SupabaseError>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(&self, method: Method, path: &str,
                                         auth_token: Option<&str>, body: Option<Value>,
                                         extra_headers: Option<HeaderMap>)
                                         -> Result<T, SupabaseError>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            let parsed = serde_json::from_str::<PostgrestErrorBody>(&error_text).ok();
            let (code, message) = match parsed {
                Some(body) => {
                    let message = match (body.message, body.details) {
                        (Some(message), Some(details)) => format!("{} ({})", message, details),
                        (Some(message), None) => message,
                        (None, _) => error_text.clone(),
                    };
                    (body.code, message)
                }
                None => (None, error_text),
            };

            return Err(SupabaseError::Api { status, code, message });
        }

        let bytes = response.bytes().await?;
        let payload = if bytes.is_empty() { b"null".as_slice() } else { bytes.as_ref() };
        serde_json::from_slice::<T>(payload)
            .map_err(|e| SupabaseError::Decode(e.to_string()))
    }

    /// Write request that asks PostgREST to echo the affected rows back.
    pub async fn request_returning<T>(&self, method: Method, path: &str,
                                      auth_token: Option<&str>, body: Option<Value>)
                                      -> Result<T, SupabaseError>
    where T: DeserializeOwned {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        self.request_with_headers(method, path, auth_token, body, Some(headers)).await
    }

    /// Call a PostgreSQL function exposed at `/rest/v1/rpc/{function}`.
    /// The function body runs inside a single transaction.
    pub async fn rpc<T>(&self, function: &str, auth_token: Option<&str>, args: Value)
                        -> Result<T, SupabaseError>
    where T: DeserializeOwned {
        let path = format!("/rest/v1/rpc/{}", function);
        self.request(Method::POST, &path, auth_token, Some(args)).await
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
