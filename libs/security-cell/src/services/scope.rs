// =====================================================================================
// TENANT SCOPE GUARD
// =====================================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::{ClinicRole, User};

use crate::models::SecurityError;

/// Entities that belong to exactly one clinic.
pub trait ClinicOwned {
    fn clinic_id(&self) -> Uuid;
}

/// The acting user, already bound to one clinic and one role. Every service
/// operation receives one of these and never resolves identity itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClinicScope {
    pub clinic_id: Uuid,
    pub user_id: String,
    pub role: ClinicRole,
}

impl ClinicScope {
    pub fn new(clinic_id: Uuid, user_id: impl Into<String>, role: ClinicRole) -> Self {
        Self {
            clinic_id,
            user_id: user_id.into(),
            role,
        }
    }

    pub fn from_user(user: &User) -> Result<Self, SecurityError> {
        let clinic_id = user.clinic_id.ok_or(SecurityError::MissingClinic)?;
        let role = user.clinic_role.ok_or(SecurityError::MissingRole)?;

        Ok(Self::new(clinic_id, user.id.clone(), role))
    }

    pub fn owns(&self, clinic_id: Uuid) -> bool {
        self.clinic_id == clinic_id
    }

    /// Passes the entity through only when it belongs to this clinic. A
    /// foreign entity comes back as `None`, the same as a missing one, so the
    /// caller cannot tell the two apart.
    pub fn scoped<T: ClinicOwned>(&self, entity: Option<T>) -> Option<T> {
        match entity {
            Some(entity) if self.owns(entity.clinic_id()) => Some(entity),
            Some(entity) => {
                debug!(
                    "Hiding entity of clinic {} from scope of clinic {}",
                    entity.clinic_id(), self.clinic_id
                );
                None
            }
            None => None,
        }
    }
}
