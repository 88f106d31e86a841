// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, info, warn};

use crate::models::{AppointmentError, AppointmentStatus, ClinicalNoteEvent};

use AppointmentStatus::{Cancelled, Completed, Confirmed, InProgress, NoShow, Scheduled};

#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// All valid next statuses for a given current status.
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> &'static [AppointmentStatus] {
        match current_status {
            Scheduled => &[Confirmed, Cancelled, NoShow],
            Confirmed => &[InProgress, Cancelled, NoShow],
            InProgress => &[Completed],
            Completed | Cancelled | NoShow => &[],
        }
    }

    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        Ok(())
    }

    /// Status a staff edit may request. Returns `None` when the request is a
    /// no-op. `IN_PROGRESS` and `COMPLETED` belong to the clinical-note
    /// workflow and are refused here.
    pub fn staff_status_change(
        &self,
        current_status: AppointmentStatus,
        requested: AppointmentStatus,
    ) -> Result<Option<AppointmentStatus>, AppointmentError> {
        if requested == current_status {
            return Ok(None);
        }

        if matches!(requested, InProgress | Completed) {
            warn!("Staff update requested {} directly", requested);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: requested,
            });
        }

        self.validate_status_transition(current_status, requested)?;
        Ok(Some(requested))
    }

    pub fn ensure_reschedulable(&self, current_status: AppointmentStatus) -> Result<(), AppointmentError> {
        if !current_status.allows_reschedule() {
            return Err(AppointmentError::NotReschedulable(current_status));
        }
        Ok(())
    }

    /// `None` means the appointment is already cancelled.
    pub fn cancellation(&self, current_status: AppointmentStatus) -> Result<Option<AppointmentStatus>, AppointmentError> {
        match current_status {
            Cancelled => Ok(None),
            Scheduled | Confirmed => Ok(Some(Cancelled)),
            other => Err(AppointmentError::InvalidStatusTransition { from: other, to: Cancelled }),
        }
    }

    /// Target status for a clinical-note event, or `None` when the
    /// appointment is already at or past it.
    pub fn note_event_transition(
        &self,
        current_status: AppointmentStatus,
        event: ClinicalNoteEvent,
    ) -> Result<Option<AppointmentStatus>, AppointmentError> {
        let next = match (event, current_status) {
            (ClinicalNoteEvent::NoteOpened, Scheduled | Confirmed) => Some(InProgress),
            (ClinicalNoteEvent::NoteOpened, InProgress | Completed) => None,
            (ClinicalNoteEvent::NoteFinalized, Scheduled | Confirmed | InProgress) => Some(Completed),
            (ClinicalNoteEvent::NoteFinalized, Completed) => None,
            (event, Cancelled | NoShow) => {
                let to = match event {
                    ClinicalNoteEvent::NoteOpened => InProgress,
                    ClinicalNoteEvent::NoteFinalized => Completed,
                };
                warn!("Clinical note event {:?} on {} appointment", event, current_status);
                return Err(AppointmentError::InvalidStatusTransition { from: current_status, to });
            }
        };

        if let Some(next) = next {
            info!("Clinical note event {:?} moves appointment {} -> {}", event, current_status, next);
        }
        Ok(next)
    }
}
