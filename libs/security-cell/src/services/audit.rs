// =====================================================================================
// AUDIT SERVICE - FIRE-AND-FORGET MUTATION AUDIT TRAIL
// =====================================================================================

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{AuditEntry, AuditError, AuditOutcome};

/// Destination for audit records. Implementations may fail; the service
/// swallows those failures.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn write(&self, entry: &AuditEntry) -> Result<(), AuditError>;
}

/// Sink that only emits the structured log line.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn write(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        debug!(event_id = %entry.event_id, "Audit entry kept in logs only");
        Ok(())
    }
}

/// Persists entries into the `audit_logs` table.
pub struct SupabaseAuditSink {
    supabase: SupabaseClient,
}

impl SupabaseAuditSink {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::backend(config),
        }
    }

    fn to_row(entry: &AuditEntry) -> Value {
        json!({
            "id": entry.event_id,
            "occurred_at": entry.timestamp,
            "clinic_id": entry.clinic_id,
            "user_id": entry.user_id,
            "action": entry.action,
            "resource_type": entry.resource_type,
            "resource_id": entry.resource_id,
            "outcome": format!("{:?}", entry.outcome).to_uppercase(),
            "details": {
                "event_type": entry.event_type,
                "patient_id": entry.patient_id,
                "context": entry.additional_data,
            },
        })
    }
}

#[async_trait]
impl AuditSink for SupabaseAuditSink {
    async fn write(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.supabase
            .request::<Value>(Method::POST, "/rest/v1/audit_logs", None, Some(Self::to_row(entry)))
            .await
            .map(|_| ())
            .map_err(|e| AuditError::Unavailable(e.to_string()))
    }
}

/// Keeps entries in memory. Used by tests to observe the audit trail.
#[derive(Default, Clone)]
pub struct MemoryAuditSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn write(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| AuditError::Unavailable("audit buffer poisoned".to_string()))?;
        entries.push(entry.clone());
        Ok(())
    }
}

#[derive(Clone)]
pub struct AuditService {
    sink: Arc<dyn AuditSink>,
}

impl AuditService {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        if config.has_persistent_store() {
            Self::new(Arc::new(SupabaseAuditSink::new(config)))
        } else {
            Self::new(Arc::new(TracingAuditSink))
        }
    }

    pub fn tracing_only() -> Self {
        Self::new(Arc::new(TracingAuditSink))
    }

    /// Logs the entry and hands it to the sink on a background task. The
    /// caller never waits for the sink and never sees its errors.
    #[instrument(skip(self, entry), fields(event_id = %entry.event_id))]
    pub fn record(&self, entry: AuditEntry) {
        Self::log_to_tracing(&entry);

        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            if let Err(e) = sink.write(&entry).await {
                warn!(event_id = %entry.event_id, "Failed to persist audit entry: {}", e);
            }
        });
    }

    fn log_to_tracing(entry: &AuditEntry) {
        match entry.outcome {
            AuditOutcome::Success => {
                info!(
                    event_id = %entry.event_id,
                    event_type = ?entry.event_type,
                    clinic_id = ?entry.clinic_id,
                    user_id = ?entry.user_id,
                    resource_type = %entry.resource_type,
                    resource_id = ?entry.resource_id,
                    "AUDIT: {}", entry.action
                );
            }
            AuditOutcome::Failure | AuditOutcome::Denied => {
                warn!(
                    event_id = %entry.event_id,
                    event_type = ?entry.event_type,
                    clinic_id = ?entry.clinic_id,
                    user_id = ?entry.user_id,
                    outcome = ?entry.outcome,
                    "AUDIT FAILURE: {}", entry.action
                );
            }
        }
    }
}
