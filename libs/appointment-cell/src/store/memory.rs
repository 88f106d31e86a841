// libs/appointment-cell/src/store/memory.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentSearchQuery};
use crate::store::AppointmentStore;

/// Process-local store. The overlap rule is re-checked under the write lock,
/// standing in for the database exclusion constraint.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collides(existing: &HashMap<Uuid, Appointment>, candidate: &Appointment) -> bool {
        candidate.is_active()
            && existing.values().any(|other| {
                other.id != candidate.id
                    && other.clinic_id == candidate.clinic_id
                    && other.doctor_id == candidate.doctor_id
                    && other.is_active()
                    && other.overlaps(candidate.start_time, candidate.end_time)
            })
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.write().await;

        if Self::collides(&appointments, &appointment) {
            warn!("Rejected overlapping insert for doctor {}", appointment.doctor_id);
            return Err(AppointmentError::ConflictDetected);
        }

        debug!("Stored appointment {}", appointment.id);
        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn get(&self, clinic_id: Uuid, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let appointments = self.appointments.read().await;
        Ok(appointments
            .get(&appointment_id)
            .filter(|appointment| appointment.clinic_id == clinic_id)
            .cloned())
    }

    async fn update(&self, expected: &Appointment, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let mut appointments = self.appointments.write().await;

        match appointments.get(&appointment.id) {
            Some(existing) if existing.clinic_id == appointment.clinic_id => {
                if existing.status != expected.status || existing.updated_at != expected.updated_at {
                    warn!("Appointment {} changed since it was read", appointment.id);
                    return Err(AppointmentError::ConcurrentModification);
                }
            }
            _ => return Err(AppointmentError::NotFound),
        }

        if Self::collides(&appointments, &appointment) {
            warn!("Rejected overlapping update for appointment {}", appointment.id);
            return Err(AppointmentError::ConflictDetected);
        }

        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn find_active_overlapping(
        &self,
        clinic_id: Uuid,
        doctor_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.read().await;

        let mut overlapping: Vec<Appointment> = appointments
            .values()
            .filter(|a| a.clinic_id == clinic_id && a.doctor_id == doctor_id)
            .filter(|a| Some(a.id) != exclude_appointment_id)
            .filter(|a| a.is_active() && a.overlaps(start_time, end_time))
            .cloned()
            .collect();

        overlapping.sort_by_key(|a| a.start_time);
        Ok(overlapping)
    }

    async fn list(&self, clinic_id: Uuid, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, AppointmentError> {
        let appointments = self.appointments.read().await;

        let mut matching: Vec<Appointment> = appointments
            .values()
            .filter(|a| a.clinic_id == clinic_id && query.matches(a))
            .cloned()
            .collect();

        matching.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));

        Ok(matching
            .into_iter()
            .skip(query.page_offset() as usize)
            .take(query.page_size() as usize)
            .collect())
    }
}
