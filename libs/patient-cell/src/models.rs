use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The slice of a patient record this core reads: identity and owning clinic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatientRef {
    pub id: Uuid,
    pub clinic_id: Uuid,
}

#[derive(Error, Debug)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
