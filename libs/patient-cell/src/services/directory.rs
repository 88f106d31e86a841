use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Method;
use tokio::sync::RwLock;
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{PatientError, PatientRef};

/// Answers "does patient X exist and belong to clinic Y".
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn find_in_clinic(&self, clinic_id: Uuid, patient_id: Uuid) -> Result<Option<PatientRef>, PatientError>;

    async fn ensure_in_clinic(&self, clinic_id: Uuid, patient_id: Uuid) -> Result<PatientRef, PatientError> {
        self.find_in_clinic(clinic_id, patient_id)
            .await?
            .ok_or(PatientError::NotFound)
    }
}

pub struct SupabasePatientDirectory {
    supabase: SupabaseClient,
}

impl SupabasePatientDirectory {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::backend(config),
        }
    }
}

#[async_trait]
impl PatientDirectory for SupabasePatientDirectory {
    async fn find_in_clinic(&self, clinic_id: Uuid, patient_id: Uuid) -> Result<Option<PatientRef>, PatientError> {
        debug!("Looking up patient {} in clinic {}", patient_id, clinic_id);

        let path = format!(
            "/rest/v1/patients?id=eq.{}&clinic_id=eq.{}&select=id,clinic_id",
            patient_id, clinic_id
        );

        let rows: Vec<PatientRef> = self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(|e| {
                error!("Patient lookup failed: {}", e);
                PatientError::DatabaseError(e.to_string())
            })?;

        Ok(rows.into_iter().next())
    }
}

/// Directory held in process memory. `open()` builds one that accepts any
/// patient id as belonging to the asking clinic, for running without a
/// patients table.
#[derive(Default)]
pub struct InMemoryPatientDirectory {
    patients: RwLock<HashMap<Uuid, Uuid>>,
    open: bool,
}

impl InMemoryPatientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open() -> Self {
        Self {
            patients: RwLock::new(HashMap::new()),
            open: true,
        }
    }

    pub async fn register(&self, clinic_id: Uuid, patient_id: Uuid) {
        self.patients.write().await.insert(patient_id, clinic_id);
    }
}

#[async_trait]
impl PatientDirectory for InMemoryPatientDirectory {
    async fn find_in_clinic(&self, clinic_id: Uuid, patient_id: Uuid) -> Result<Option<PatientRef>, PatientError> {
        let patients = self.patients.read().await;

        let found = match patients.get(&patient_id) {
            Some(owner) if *owner == clinic_id => true,
            Some(_) => false,
            None => self.open,
        };

        Ok(found.then_some(PatientRef { id: patient_id, clinic_id }))
    }
}
