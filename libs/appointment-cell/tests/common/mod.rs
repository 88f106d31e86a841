#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use appointment_cell::models::CreateAppointmentRequest;
use appointment_cell::{AppointmentBookingService, AppointmentStore, InMemoryAppointmentStore};
use patient_cell::InMemoryPatientDirectory;
use security_cell::{AuditService, AuthorizationPolicy, ClinicScope, MemoryAuditSink};
use shared_models::auth::ClinicRole;

pub struct Clinic {
    pub service: Arc<AppointmentBookingService>,
    pub patients: Arc<InMemoryPatientDirectory>,
    pub audit: MemoryAuditSink,
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
}

impl Clinic {
    pub async fn new() -> Self {
        Self::with_store(Arc::new(InMemoryAppointmentStore::new())).await
    }

    pub async fn with_store(store: Arc<dyn AppointmentStore>) -> Self {
        let patients = Arc::new(InMemoryPatientDirectory::new());
        let audit = MemoryAuditSink::new();
        let service = Arc::new(AppointmentBookingService::new(
            store,
            patients.clone(),
            Arc::new(AuthorizationPolicy::standard()),
            AuditService::new(Arc::new(audit.clone())),
        ));

        let clinic_id = Uuid::new_v4();
        let patient_id = Uuid::new_v4();
        patients.register(clinic_id, patient_id).await;

        Self {
            service,
            patients,
            audit,
            clinic_id,
            patient_id,
            doctor_id: Uuid::new_v4(),
        }
    }

    pub fn scope(&self, role: ClinicRole) -> ClinicScope {
        ClinicScope::new(self.clinic_id, format!("{}-user", role.as_str().to_lowercase()), role)
    }

    pub fn admin(&self) -> ClinicScope {
        self.scope(ClinicRole::Admin)
    }

    pub fn booking(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            start_time: start,
            end_time: end,
            reason: Some("Consultation".to_string()),
            notes: None,
        }
    }
}

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, hour, minute, 0).unwrap()
}
