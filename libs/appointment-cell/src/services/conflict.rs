use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, ConflictCheckResponse};
use crate::store::AppointmentStore;

/// Two half-open ranges overlap iff `start1 < end2 && start2 < end1`.
/// Back-to-back ranges do not overlap.
pub fn appointments_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}

pub fn validate_time_range(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Result<(), AppointmentError> {
    if end_time <= start_time {
        return Err(AppointmentError::ValidationError(
            "end_time must be after start_time".to_string(),
        ));
    }
    Ok(())
}

pub struct ConflictDetectionService {
    store: Arc<dyn AppointmentStore>,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    /// Active appointments of the doctor that overlap `[start, end)`.
    pub async fn find_conflicts(
        &self,
        clinic_id: Uuid,
        doctor_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        validate_time_range(start_time, end_time)?;

        debug!("Checking conflicts for doctor {} from {} to {}", doctor_id, start_time, end_time);

        let candidates = self.store
            .find_active_overlapping(clinic_id, doctor_id, start_time, end_time, exclude_appointment_id)
            .await?;

        // Store query is a pre-filter; the predicate below is authoritative.
        let conflicts: Vec<Appointment> = candidates
            .into_iter()
            .filter(|a| a.clinic_id == clinic_id && a.doctor_id == doctor_id)
            .filter(|a| Some(a.id) != exclude_appointment_id)
            .filter(|a| a.is_active())
            .filter(|a| appointments_overlap(start_time, end_time, a.start_time, a.end_time))
            .collect();

        if !conflicts.is_empty() {
            warn!(
                "Conflict detected for doctor {} - {} conflicting appointments",
                doctor_id,
                conflicts.len()
            );
        }

        Ok(conflicts)
    }

    pub async fn has_conflict(
        &self,
        clinic_id: Uuid,
        doctor_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<bool, AppointmentError> {
        let conflicts = self
            .find_conflicts(clinic_id, doctor_id, start_time, end_time, exclude_appointment_id)
            .await?;
        Ok(!conflicts.is_empty())
    }

    pub async fn ensure_available(
        &self,
        clinic_id: Uuid,
        doctor_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<(), AppointmentError> {
        if self.has_conflict(clinic_id, doctor_id, start_time, end_time, exclude_appointment_id).await? {
            return Err(AppointmentError::ConflictDetected);
        }
        Ok(())
    }

    pub async fn check_conflicts(
        &self,
        clinic_id: Uuid,
        doctor_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        let conflicting_appointments = self
            .find_conflicts(clinic_id, doctor_id, start_time, end_time, exclude_appointment_id)
            .await?;

        Ok(ConflictCheckResponse {
            has_conflict: !conflicting_appointments.is_empty(),
            conflicting_appointments,
        })
    }
}
