// =====================================================================================
// SECURITY CELL MODELS
// =====================================================================================

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_models::auth::ClinicRole;
use shared_models::error::AppError;

// =====================================================================================
// AUTHORIZATION MODELS
// =====================================================================================

/// Every operation of the scheduling and billing core that the policy table
/// knows about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateAppointment,
    UpdateAppointment,
    CancelAppointment,
    ViewAppointment,
    ListAppointments,
    CheckConflicts,
    RecordClinicalNoteEvent,
    CreateInvoice,
    UpdateInvoice,
    DeleteInvoice,
    ViewInvoice,
    ListInvoices,
    ApplyPayment,
    RecomputeInvoice,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateAppointment => "create_appointment",
            Operation::UpdateAppointment => "update_appointment",
            Operation::CancelAppointment => "cancel_appointment",
            Operation::ViewAppointment => "view_appointment",
            Operation::ListAppointments => "list_appointments",
            Operation::CheckConflicts => "check_conflicts",
            Operation::RecordClinicalNoteEvent => "record_clinical_note_event",
            Operation::CreateInvoice => "create_invoice",
            Operation::UpdateInvoice => "update_invoice",
            Operation::DeleteInvoice => "delete_invoice",
            Operation::ViewInvoice => "view_invoice",
            Operation::ListInvoices => "list_invoices",
            Operation::ApplyPayment => "apply_payment",
            Operation::RecomputeInvoice => "recompute_invoice",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    #[error("Session is not bound to a clinic")]
    MissingClinic,

    #[error("Session has no clinic role")]
    MissingRole,

    #[error("Role {role} may not perform {operation}")]
    Forbidden { role: ClinicRole, operation: Operation },
}

impl From<SecurityError> for AppError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::MissingClinic | SecurityError::MissingRole => AppError::Auth(err.to_string()),
            SecurityError::Forbidden { .. } => AppError::Forbidden(err.to_string()),
        }
    }
}

// =====================================================================================
// AUDIT MODELS
// =====================================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditEventType {
    AppointmentCreated,
    AppointmentUpdated,
    AppointmentCancelled,
    AppointmentStatusChanged,
    InvoiceCreated,
    InvoiceUpdated,
    InvoiceCancelled,
    InvoiceReconciled,
    PaymentRecorded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub clinic_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub patient_id: Option<Uuid>,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub action: String,
    pub outcome: AuditOutcome,
    pub additional_data: HashMap<String, serde_json::Value>,
}

impl AuditEntry {
    pub fn new(
        event_type: AuditEventType,
        resource_type: &str,
        action: String,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            clinic_id: None,
            user_id: None,
            patient_id: None,
            resource_type: resource_type.to_string(),
            resource_id: None,
            action,
            outcome,
            additional_data: HashMap::new(),
        }
    }

    pub fn with_clinic(mut self, clinic_id: Uuid) -> Self {
        self.clinic_id = Some(clinic_id);
        self
    }

    pub fn with_user(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_patient(mut self, patient_id: Uuid) -> Self {
        self.patient_id = Some(patient_id);
        self
    }

    pub fn with_resource(mut self, resource_id: impl ToString) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn add_context<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(serialized) = serde_json::to_value(value) {
            self.additional_data.insert(key.to_string(), serialized);
        }
        self
    }
}

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
}
