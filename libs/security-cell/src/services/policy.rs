// =====================================================================================
// AUTHORIZATION POLICY TABLE
// =====================================================================================

use std::collections::HashSet;

use tracing::warn;

use shared_models::auth::ClinicRole;

use crate::models::{Operation, SecurityError};
use crate::services::scope::ClinicScope;

use ClinicRole::{Admin, Doctor, Nurse, Receptionist};

const ALL_STAFF: &[ClinicRole] = &[Admin, Doctor, Nurse, Receptionist];
const CLINICIANS: &[ClinicRole] = &[Admin, Doctor];
const BILLING_READERS: &[ClinicRole] = &[Admin, Doctor, Receptionist];

/// Which roles may run which operation. Anything not listed is denied.
const STANDARD_POLICY: &[(Operation, &[ClinicRole])] = &[
    (Operation::CreateAppointment, ALL_STAFF),
    (Operation::UpdateAppointment, ALL_STAFF),
    (Operation::CancelAppointment, ALL_STAFF),
    (Operation::ViewAppointment, ALL_STAFF),
    (Operation::ListAppointments, ALL_STAFF),
    (Operation::CheckConflicts, ALL_STAFF),
    (Operation::RecordClinicalNoteEvent, CLINICIANS),
    (Operation::CreateInvoice, CLINICIANS),
    (Operation::UpdateInvoice, CLINICIANS),
    (Operation::DeleteInvoice, CLINICIANS),
    (Operation::ApplyPayment, CLINICIANS),
    (Operation::RecomputeInvoice, CLINICIANS),
    (Operation::ViewInvoice, BILLING_READERS),
    (Operation::ListInvoices, BILLING_READERS),
];

/// Declarative `(role, operation)` allow-list consulted before any scheduling
/// or billing operation touches the store.
#[derive(Debug, Clone)]
pub struct AuthorizationPolicy {
    allowed: HashSet<(ClinicRole, Operation)>,
}

impl AuthorizationPolicy {
    pub fn standard() -> Self {
        Self::from_rules(STANDARD_POLICY)
    }

    pub fn from_rules(rules: &[(Operation, &[ClinicRole])]) -> Self {
        let allowed = rules
            .iter()
            .flat_map(|(operation, roles)| roles.iter().map(move |role| (*role, *operation)))
            .collect();

        Self { allowed }
    }

    pub fn is_allowed(&self, role: ClinicRole, operation: Operation) -> bool {
        self.allowed.contains(&(role, operation))
    }

    pub fn authorize(&self, scope: &ClinicScope, operation: Operation) -> Result<(), SecurityError> {
        if self.is_allowed(scope.role, operation) {
            return Ok(());
        }

        warn!(
            user_id = %scope.user_id,
            clinic_id = %scope.clinic_id,
            role = %scope.role,
            operation = %operation,
            "Operation denied by authorization policy"
        );
        Err(SecurityError::Forbidden { role: scope.role, operation })
    }
}

impl Default for AuthorizationPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_every_role_may_schedule() {
        let policy = AuthorizationPolicy::standard();
        for role in ClinicRole::ALL {
            assert!(policy.is_allowed(role, Operation::CreateAppointment));
            assert!(policy.is_allowed(role, Operation::CancelAppointment));
            assert!(policy.is_allowed(role, Operation::ListAppointments));
        }
    }

    #[test]
    fn test_only_admin_and_doctor_mutate_invoices() {
        let policy = AuthorizationPolicy::standard();
        for operation in [
            Operation::CreateInvoice,
            Operation::UpdateInvoice,
            Operation::DeleteInvoice,
            Operation::ApplyPayment,
        ] {
            assert!(policy.is_allowed(ClinicRole::Admin, operation));
            assert!(policy.is_allowed(ClinicRole::Doctor, operation));
            assert!(!policy.is_allowed(ClinicRole::Nurse, operation));
            assert!(!policy.is_allowed(ClinicRole::Receptionist, operation));
        }
    }

    #[test]
    fn test_receptionist_can_read_invoices_but_nurse_cannot() {
        let policy = AuthorizationPolicy::standard();
        assert!(policy.is_allowed(ClinicRole::Receptionist, Operation::ListInvoices));
        assert!(!policy.is_allowed(ClinicRole::Nurse, Operation::ListInvoices));
    }

    #[test]
    fn test_authorize_reports_role_and_operation() {
        let policy = AuthorizationPolicy::standard();
        let scope = ClinicScope::new(Uuid::new_v4(), "nurse-1", ClinicRole::Nurse);

        let err = policy.authorize(&scope, Operation::RecordClinicalNoteEvent).unwrap_err();
        assert_eq!(
            err,
            SecurityError::Forbidden {
                role: ClinicRole::Nurse,
                operation: Operation::RecordClinicalNoteEvent
            }
        );
    }

    #[test]
    fn test_custom_rules_replace_the_table() {
        let policy = AuthorizationPolicy::from_rules(&[(Operation::ViewInvoice, &[ClinicRole::Nurse])]);
        assert!(policy.is_allowed(ClinicRole::Nurse, Operation::ViewInvoice));
        assert!(!policy.is_allowed(ClinicRole::Admin, Operation::ViewInvoice));
    }
}
