// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use patient_cell::{PatientDirectory, PatientError};
use security_cell::{
    AuditEntry, AuditEventType, AuditOutcome, AuditService, AuthorizationPolicy, ClinicScope, Operation,
};

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus, CancelAppointmentRequest,
    ClinicalNoteEvent, ConflictCheckQuery, ConflictCheckResponse, CreateAppointmentRequest,
    UpdateAppointmentRequest,
};
use crate::services::conflict::{validate_time_range, ConflictDetectionService};
use crate::services::consistency::SchedulingLocks;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::store::AppointmentStore;

/// Re-reads after a lost write race before giving up with a conflict.
const WRITE_RETRY_ATTEMPTS: usize = 3;

pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    patients: Arc<dyn PatientDirectory>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    locks: SchedulingLocks,
    policy: Arc<AuthorizationPolicy>,
    audit: AuditService,
}

impl AppointmentBookingService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        patients: Arc<dyn PatientDirectory>,
        policy: Arc<AuthorizationPolicy>,
        audit: AuditService,
    ) -> Self {
        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&store)),
            lifecycle_service: AppointmentLifecycleService::new(),
            locks: SchedulingLocks::new(),
            store,
            patients,
            policy,
            audit,
        }
    }

    // ==============================================================================
    // BOOKING
    // ==============================================================================

    #[instrument(skip(self, scope, request), fields(clinic_id = %scope.clinic_id))]
    pub async fn create_appointment(
        &self,
        scope: &ClinicScope,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        self.policy.authorize(scope, Operation::CreateAppointment)?;

        validate_time_range(request.start_time, request.end_time)?;
        if request.doctor_id.is_nil() || request.patient_id.is_nil() {
            return Err(AppointmentError::ValidationError(
                "doctor_id and patient_id are required".to_string(),
            ));
        }

        self.patients
            .ensure_in_clinic(scope.clinic_id, request.patient_id)
            .await
            .map_err(patient_error)?;

        let created = {
            let _guard = self.locks.acquire(scope.clinic_id, request.doctor_id).await?;

            self.conflict_service
                .ensure_available(scope.clinic_id, request.doctor_id, request.start_time, request.end_time, None)
                .await?;

            let now = Utc::now();
            let appointment = Appointment {
                id: Uuid::new_v4(),
                clinic_id: scope.clinic_id,
                patient_id: request.patient_id,
                doctor_id: request.doctor_id,
                start_time: request.start_time,
                end_time: request.end_time,
                status: AppointmentStatus::Scheduled,
                reason: request.reason,
                notes: request.notes,
                created_at: now,
                updated_at: now,
            };

            self.store.insert(appointment).await?
        };

        info!("Appointment {} booked for doctor {}", created.id, created.doctor_id);
        self.audit.record(
            audit_entry(scope, AuditEventType::AppointmentCreated, &created, "Created appointment")
                .add_context("start_time", created.start_time)
                .add_context("end_time", created.end_time),
        );

        Ok(created)
    }

    #[instrument(skip(self, scope, request), fields(clinic_id = %scope.clinic_id))]
    pub async fn update_appointment(
        &self,
        scope: &ClinicScope,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        self.policy.authorize(scope, Operation::UpdateAppointment)?;

        for attempt in 0..=WRITE_RETRY_ATTEMPTS {
            let current = self.load(scope, appointment_id).await?;

            let start_time = request.start_time.unwrap_or(current.start_time);
            let end_time = request.end_time.unwrap_or(current.end_time);
            let doctor_id = request.doctor_id.unwrap_or(current.doctor_id);

            validate_time_range(start_time, end_time)?;
            if doctor_id.is_nil() {
                return Err(AppointmentError::ValidationError("doctor_id must not be nil".to_string()));
            }

            let next_status = match request.status {
                Some(requested) => self.lifecycle_service.staff_status_change(current.status, requested)?,
                None => None,
            };

            let schedule_changed = start_time != current.start_time
                || end_time != current.end_time
                || doctor_id != current.doctor_id;

            if schedule_changed {
                self.lifecycle_service.ensure_reschedulable(current.status)?;
            }

            let mut updated = current.clone();
            updated.start_time = start_time;
            updated.end_time = end_time;
            updated.doctor_id = doctor_id;
            if let Some(status) = next_status {
                updated.status = status;
            }
            if request.reason.is_some() {
                updated.reason = request.reason.clone();
            }
            if request.notes.is_some() {
                updated.notes = request.notes.clone();
            }

            if updated == current {
                debug!("Update of appointment {} changes nothing", appointment_id);
                return Ok(current);
            }
            updated.updated_at = Utc::now();

            let written = if schedule_changed && updated.is_active() {
                let _guard = self.locks.acquire(scope.clinic_id, doctor_id).await?;
                self.conflict_service
                    .ensure_available(scope.clinic_id, doctor_id, start_time, end_time, Some(appointment_id))
                    .await?;
                self.store.update(&current, updated).await
            } else {
                self.store.update(&current, updated).await
            };

            let saved = match written {
                Err(AppointmentError::ConcurrentModification) => {
                    debug!("Retrying update of appointment {} (attempt {})", appointment_id, attempt + 1);
                    continue;
                }
                other => other?,
            };

            let event_type = if saved.status != current.status {
                AuditEventType::AppointmentStatusChanged
            } else {
                AuditEventType::AppointmentUpdated
            };
            self.audit.record(
                audit_entry(scope, event_type, &saved, "Updated appointment")
                    .add_context("previous_status", current.status)
                    .add_context("rescheduled", schedule_changed),
            );

            return Ok(saved);
        }

        Err(concurrent_writes_exhausted(appointment_id))
    }

    #[instrument(skip(self, scope, request), fields(clinic_id = %scope.clinic_id))]
    pub async fn cancel_appointment(
        &self,
        scope: &ClinicScope,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        self.policy.authorize(scope, Operation::CancelAppointment)?;

        for attempt in 0..=WRITE_RETRY_ATTEMPTS {
            let current = self.load(scope, appointment_id).await?;

            let Some(status) = self.lifecycle_service.cancellation(current.status)? else {
                debug!("Appointment {} already cancelled", appointment_id);
                return Ok(current);
            };

            let mut updated = current.clone();
            updated.status = status;
            updated.updated_at = Utc::now();

            let saved = match self.store.update(&current, updated).await {
                Err(AppointmentError::ConcurrentModification) => {
                    debug!("Retrying cancellation of appointment {} (attempt {})", appointment_id, attempt + 1);
                    continue;
                }
                other => other?,
            };

            info!("Appointment {} cancelled", appointment_id);
            self.audit.record(
                audit_entry(scope, AuditEventType::AppointmentCancelled, &saved, "Cancelled appointment")
                    .add_context("reason", &request.reason),
            );

            return Ok(saved);
        }

        Err(concurrent_writes_exhausted(appointment_id))
    }

    // ==============================================================================
    // QUERIES
    // ==============================================================================

    pub async fn get_appointment(&self, scope: &ClinicScope, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.policy.authorize(scope, Operation::ViewAppointment)?;
        self.load(scope, appointment_id).await
    }

    pub async fn list_appointments(
        &self,
        scope: &ClinicScope,
        query: AppointmentSearchQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.policy.authorize(scope, Operation::ListAppointments)?;

        if let (Some(from), Some(to)) = (query.from, query.to) {
            if to < from {
                return Err(AppointmentError::ValidationError("to must not be before from".to_string()));
            }
        }

        let appointments = self.store.list(scope.clinic_id, &query).await?;
        Ok(appointments.into_iter().filter(|a| scope.owns(a.clinic_id)).collect())
    }

    pub async fn check_conflicts(
        &self,
        scope: &ClinicScope,
        query: ConflictCheckQuery,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        self.policy.authorize(scope, Operation::CheckConflicts)?;

        self.conflict_service
            .check_conflicts(
                scope.clinic_id,
                query.doctor_id,
                query.start_time,
                query.end_time,
                query.exclude_appointment_id,
            )
            .await
    }

    // ==============================================================================
    // CLINICAL NOTE WORKFLOW
    // ==============================================================================

    #[instrument(skip(self, scope), fields(clinic_id = %scope.clinic_id))]
    pub async fn apply_note_event(
        &self,
        scope: &ClinicScope,
        appointment_id: Uuid,
        event: ClinicalNoteEvent,
        note_id: Option<Uuid>,
    ) -> Result<Appointment, AppointmentError> {
        self.policy.authorize(scope, Operation::RecordClinicalNoteEvent)?;

        for attempt in 0..=WRITE_RETRY_ATTEMPTS {
            let current = self.load(scope, appointment_id).await?;

            let Some(status) = self.lifecycle_service.note_event_transition(current.status, event)? else {
                return Ok(current);
            };

            let mut updated = current.clone();
            updated.status = status;
            updated.updated_at = Utc::now();

            let saved = match self.store.update(&current, updated).await {
                Err(AppointmentError::ConcurrentModification) => {
                    debug!("Retrying note event on appointment {} (attempt {})", appointment_id, attempt + 1);
                    continue;
                }
                other => other?,
            };

            self.audit.record(
                audit_entry(scope, AuditEventType::AppointmentStatusChanged, &saved, "Clinical note event")
                    .add_context("event", event)
                    .add_context("note_id", note_id)
                    .add_context("previous_status", current.status),
            );

            return Ok(saved);
        }

        Err(concurrent_writes_exhausted(appointment_id))
    }

    async fn load(&self, scope: &ClinicScope, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let found = self.store.get(scope.clinic_id, appointment_id).await?;
        scope.scoped(found).ok_or(AppointmentError::NotFound)
    }
}

fn concurrent_writes_exhausted(appointment_id: Uuid) -> AppointmentError {
    warn!("Appointment {} kept changing underneath the write", appointment_id);
    AppointmentError::ConcurrentModification
}

fn patient_error(err: PatientError) -> AppointmentError {
    match err {
        PatientError::NotFound => AppointmentError::PatientNotFound,
        PatientError::DatabaseError(msg) => AppointmentError::DatabaseError(msg),
    }
}

fn audit_entry(scope: &ClinicScope, event_type: AuditEventType, appointment: &Appointment, action: &str) -> AuditEntry {
    AuditEntry::new(event_type, "appointment", action.to_string(), AuditOutcome::Success)
        .with_clinic(scope.clinic_id)
        .with_user(scope.user_id.clone())
        .with_patient(appointment.patient_id)
        .with_resource(appointment.id)
        .add_context("status", appointment.status)
        .add_context("doctor_id", appointment.doctor_id)
}
