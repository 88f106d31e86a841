// libs/appointment-cell/src/store/supabase.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, error, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{Appointment, AppointmentError, AppointmentSearchQuery};
use crate::store::AppointmentStore;

pub struct SupabaseAppointmentStore {
    supabase: SupabaseClient,
}

impl SupabaseAppointmentStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::backend(config),
        }
    }

    fn map_error(err: SupabaseError) -> AppointmentError {
        if err.is_exclusion_violation() {
            warn!("Exclusion constraint rejected overlapping appointment");
            return AppointmentError::ConflictDetected;
        }
        error!("Appointment store error: {}", err);
        AppointmentError::DatabaseError(err.to_string())
    }

    fn timestamp(value: DateTime<Utc>) -> String {
        urlencoding::encode(&value.to_rfc3339()).into_owned()
    }

    fn first_row(rows: Vec<Appointment>) -> Result<Appointment, AppointmentError> {
        rows.into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("No appointment row returned".to_string()))
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        debug!("Inserting appointment {}", appointment.id);

        let body = serde_json::to_value(&appointment)
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let rows: Vec<Appointment> = self.supabase
            .request_returning(Method::POST, "/rest/v1/appointments", None, Some(body))
            .await
            .map_err(Self::map_error)?;

        Self::first_row(rows)
    }

    async fn get(&self, clinic_id: Uuid, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&clinic_id=eq.{}",
            appointment_id, clinic_id
        );

        let rows: Vec<Appointment> = self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(Self::map_error)?;

        Ok(rows.into_iter().next())
    }

    async fn update(&self, expected: &Appointment, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        debug!("Updating appointment {}", appointment.id);

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&clinic_id=eq.{}&status=eq.{}&updated_at=eq.{}",
            appointment.id,
            appointment.clinic_id,
            expected.status,
            Self::timestamp(expected.updated_at)
        );
        let body = json!({
            "doctor_id": appointment.doctor_id,
            "start_time": appointment.start_time,
            "end_time": appointment.end_time,
            "status": appointment.status,
            "reason": appointment.reason,
            "notes": appointment.notes,
            "updated_at": appointment.updated_at,
        });

        let rows: Vec<Appointment> = self.supabase
            .request_returning(Method::PATCH, &path, None, Some(body))
            .await
            .map_err(Self::map_error)?;

        rows.into_iter().next().ok_or_else(|| {
            warn!("Appointment {} changed since it was read", appointment.id);
            AppointmentError::ConcurrentModification
        })
    }

    async fn find_active_overlapping(
        &self,
        clinic_id: Uuid,
        doctor_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut query_parts = vec![
            format!("clinic_id=eq.{}", clinic_id),
            format!("doctor_id=eq.{}", doctor_id),
            "status=neq.CANCELLED".to_string(),
            format!("start_time=lt.{}", Self::timestamp(end_time)),
            format!("end_time=gt.{}", Self::timestamp(start_time)),
        ];

        if let Some(exclude_id) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!("/rest/v1/appointments?{}&order=start_time.asc", query_parts.join("&"));

        self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(Self::map_error)
    }

    async fn list(&self, clinic_id: Uuid, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, AppointmentError> {
        let mut query_parts = vec![format!("clinic_id=eq.{}", clinic_id)];

        if let Some(doctor_id) = query.doctor_id {
            query_parts.push(format!("doctor_id=eq.{}", doctor_id));
        }
        if let Some(patient_id) = query.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from) = query.from {
            query_parts.push(format!("start_time=gte.{}", Self::timestamp(from)));
        }
        if let Some(to) = query.to {
            query_parts.push(format!("start_time=lt.{}", Self::timestamp(to)));
        }

        query_parts.push("order=start_time.asc,id.asc".to_string());
        query_parts.push(format!("limit={}", query.page_size()));
        query_parts.push(format!("offset={}", query.page_offset()));

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));

        self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(Self::map_error)
    }
}
