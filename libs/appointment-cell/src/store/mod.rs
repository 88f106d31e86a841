// libs/appointment-cell/src/store/mod.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentSearchQuery};

pub mod memory;
pub mod supabase;

pub use memory::InMemoryAppointmentStore;
pub use supabase::SupabaseAppointmentStore;

/// Persistence for appointments. Every read is filtered by clinic; writes
/// must reject a second active appointment overlapping the same doctor with
/// `AppointmentError::ConflictDetected`.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError>;

    async fn get(&self, clinic_id: Uuid, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    /// Writes `appointment` only while the stored row still has the status and
    /// `updated_at` of `expected`; otherwise `AppointmentError::ConcurrentModification`.
    async fn update(&self, expected: &Appointment, appointment: Appointment) -> Result<Appointment, AppointmentError>;

    /// Active appointments of the doctor whose `[start, end)` intersects the
    /// given range, ordered by start.
    async fn find_active_overlapping(
        &self,
        clinic_id: Uuid,
        doctor_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    async fn list(&self, clinic_id: Uuid, query: &AppointmentSearchQuery) -> Result<Vec<Appointment>, AppointmentError>;
}
