// libs/billing-cell/src/services/invoice.rs
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use patient_cell::{PatientDirectory, PatientError};
use security_cell::{
    AuditEntry, AuditEventType, AuditOutcome, AuditService, AuthorizationPolicy, ClinicScope, Operation,
};

use crate::models::{
    BillingError, CreateInvoiceRequest, Invoice, InvoiceDetails, InvoiceSearchQuery, InvoiceStatus, Payment,
    UpdateInvoiceRequest,
};
use crate::services::ledger::compute_invoice;
use crate::store::{InvoiceStore, NewInvoice};

pub struct InvoiceService {
    store: Arc<dyn InvoiceStore>,
    patients: Arc<dyn PatientDirectory>,
    policy: Arc<AuthorizationPolicy>,
    audit: AuditService,
    retry_attempts: u32,
}

impl InvoiceService {
    /// `retry_attempts` bounds how often an edit that lost a version race is
    /// re-read and re-validated.
    pub fn new(
        store: Arc<dyn InvoiceStore>,
        patients: Arc<dyn PatientDirectory>,
        policy: Arc<AuthorizationPolicy>,
        audit: AuditService,
        retry_attempts: u32,
    ) -> Self {
        Self {
            store,
            patients,
            policy,
            audit,
            retry_attempts,
        }
    }

    #[instrument(skip(self, scope, request), fields(clinic_id = %scope.clinic_id))]
    pub async fn create_invoice(
        &self,
        scope: &ClinicScope,
        request: CreateInvoiceRequest,
    ) -> Result<InvoiceDetails, BillingError> {
        self.policy.authorize(scope, Operation::CreateInvoice)?;

        let (lines, totals) = compute_invoice(&request.items, request.discount)?;

        let issue_date = Utc::now().date_naive();
        validate_due_date(issue_date, request.due_date)?;

        self.patients
            .ensure_in_clinic(scope.clinic_id, request.patient_id)
            .await
            .map_err(patient_error)?;

        let (invoice, items) = self
            .store
            .create_invoice(NewInvoice {
                clinic_id: scope.clinic_id,
                patient_id: request.patient_id,
                issue_date,
                due_date: request.due_date,
                notes: request.notes,
                totals,
                lines,
            })
            .await?;

        info!("Invoice {} created with total {}", invoice.invoice_number, invoice.total);
        self.audit.record(
            invoice_audit_entry(scope, AuditEventType::InvoiceCreated, &invoice, "Created invoice")
                .add_context("total", invoice.total)
                .add_context("item_count", items.len()),
        );

        Ok(InvoiceDetails {
            balance: invoice.balance(),
            invoice,
            items,
            payments: Vec::new(),
        })
    }

    pub async fn get_invoice(&self, scope: &ClinicScope, invoice_id: Uuid) -> Result<InvoiceDetails, BillingError> {
        self.policy.authorize(scope, Operation::ViewInvoice)?;

        let invoice = load_invoice(self.store.as_ref(), scope, invoice_id).await?;
        let items = self.store.list_items(invoice.id).await?;
        let payments = self.store.list_payments(scope.clinic_id, invoice.id).await?;

        Ok(InvoiceDetails {
            balance: invoice.balance(),
            invoice,
            items,
            payments,
        })
    }

    pub async fn list_invoices(
        &self,
        scope: &ClinicScope,
        query: InvoiceSearchQuery,
    ) -> Result<Vec<Invoice>, BillingError> {
        self.policy.authorize(scope, Operation::ListInvoices)?;

        if let (Some(from), Some(to)) = (query.from, query.to) {
            if to < from {
                return Err(BillingError::ValidationError("to must not be before from".to_string()));
            }
        }

        let invoices = self.store.list_invoices(scope.clinic_id, &query).await?;
        Ok(invoices.into_iter().filter(|invoice| scope.owns(invoice.clinic_id)).collect())
    }

    /// Metadata edits plus the one status a caller may choose: `CANCELLED`.
    /// Payment statuses are owned by the reconciler.
    #[instrument(skip(self, scope, request), fields(clinic_id = %scope.clinic_id))]
    pub async fn update_invoice(
        &self,
        scope: &ClinicScope,
        invoice_id: Uuid,
        request: UpdateInvoiceRequest,
    ) -> Result<Invoice, BillingError> {
        self.policy.authorize(scope, Operation::UpdateInvoice)?;

        for attempt in 0..=self.retry_attempts {
            let current = load_invoice(self.store.as_ref(), scope, invoice_id).await?;

            let cancelling = match request.status {
                Some(status) if status == current.status => false,
                Some(InvoiceStatus::Cancelled) => true,
                Some(status) => {
                    return Err(BillingError::InvalidState(format!(
                        "Status {} is derived from payments and cannot be set to {}",
                        current.status, status
                    )))
                }
                None => false,
            };

            if current.status == InvoiceStatus::Cancelled && (request.due_date.is_some() || request.notes.is_some()) {
                return Err(BillingError::InvalidState(format!(
                    "Invoice {} is cancelled",
                    current.invoice_number
                )));
            }

            if cancelling {
                let payments = self.store.list_payments(scope.clinic_id, invoice_id).await?;
                ensure_cancellable(&current, &payments)?;
            }

            let mut updated = current.clone();
            if cancelling {
                updated.status = InvoiceStatus::Cancelled;
            }
            if let Some(due_date) = request.due_date {
                validate_due_date(current.issue_date, Some(due_date))?;
                updated.due_date = Some(due_date);
            }
            if request.notes.is_some() {
                updated.notes = request.notes.clone();
            }

            if updated == current {
                debug!("Update of invoice {} changes nothing", current.invoice_number);
                return Ok(current);
            }

            let saved = match self.store.update_invoice(current.version, updated).await {
                Err(BillingError::StaleVersion) => {
                    warn!("Invoice {} changed during update, attempt {}", invoice_id, attempt + 1);
                    continue;
                }
                other => other?,
            };

            let event_type = if cancelling {
                AuditEventType::InvoiceCancelled
            } else {
                AuditEventType::InvoiceUpdated
            };
            self.audit.record(
                invoice_audit_entry(scope, event_type, &saved, "Updated invoice")
                    .add_context("previous_status", current.status),
            );

            return Ok(saved);
        }

        Err(BillingError::StaleVersion)
    }

    /// Soft delete: the invoice is cancelled so its number is never reused.
    /// A payment that lands mid-delete is seen on the re-read and blocks it.
    #[instrument(skip(self, scope), fields(clinic_id = %scope.clinic_id))]
    pub async fn delete_invoice(&self, scope: &ClinicScope, invoice_id: Uuid) -> Result<Invoice, BillingError> {
        self.policy.authorize(scope, Operation::DeleteInvoice)?;

        for attempt in 0..=self.retry_attempts {
            let current = load_invoice(self.store.as_ref(), scope, invoice_id).await?;
            if current.status == InvoiceStatus::Cancelled {
                debug!("Invoice {} already cancelled", current.invoice_number);
                return Ok(current);
            }

            let payments = self.store.list_payments(scope.clinic_id, invoice_id).await?;
            ensure_cancellable(&current, &payments)?;

            let mut cancelled = current.clone();
            cancelled.status = InvoiceStatus::Cancelled;
            let saved = match self.store.update_invoice(current.version, cancelled).await {
                Err(BillingError::StaleVersion) => {
                    warn!("Invoice {} changed during delete, attempt {}", invoice_id, attempt + 1);
                    continue;
                }
                other => other?,
            };

            info!("Invoice {} cancelled", saved.invoice_number);
            self.audit.record(
                invoice_audit_entry(scope, AuditEventType::InvoiceCancelled, &saved, "Deleted invoice")
                    .add_context("previous_status", current.status),
            );

            return Ok(saved);
        }

        Err(BillingError::StaleVersion)
    }
}

/// Invoices that have taken money stay on the books.
pub fn ensure_cancellable(invoice: &Invoice, payments: &[Payment]) -> Result<(), BillingError> {
    if invoice.status == InvoiceStatus::Paid {
        return Err(BillingError::InvalidState(format!(
            "Invoice {} is paid and cannot be deleted",
            invoice.invoice_number
        )));
    }
    if !payments.is_empty() {
        return Err(BillingError::InvalidState(format!(
            "Invoice {} has {} recorded payment(s) and cannot be deleted",
            invoice.invoice_number,
            payments.len()
        )));
    }
    Ok(())
}

fn validate_due_date(issue_date: NaiveDate, due_date: Option<NaiveDate>) -> Result<(), BillingError> {
    match due_date {
        Some(due) if due < issue_date => Err(BillingError::ValidationError(format!(
            "Due date {} is before issue date {}",
            due, issue_date
        ))),
        _ => Ok(()),
    }
}

pub(crate) async fn load_invoice(
    store: &dyn InvoiceStore,
    scope: &ClinicScope,
    invoice_id: Uuid,
) -> Result<Invoice, BillingError> {
    let found = store.get_invoice(scope.clinic_id, invoice_id).await?;
    scope.scoped(found).ok_or(BillingError::NotFound)
}

pub(crate) fn invoice_audit_entry(
    scope: &ClinicScope,
    event_type: AuditEventType,
    invoice: &Invoice,
    action: &str,
) -> AuditEntry {
    AuditEntry::new(event_type, "invoice", action.to_string(), AuditOutcome::Success)
        .with_clinic(scope.clinic_id)
        .with_user(scope.user_id.clone())
        .with_patient(invoice.patient_id)
        .with_resource(invoice.id)
        .add_context("invoice_number", &invoice.invoice_number)
        .add_context("status", invoice.status)
}

fn patient_error(err: PatientError) -> BillingError {
    match err {
        PatientError::NotFound => BillingError::PatientNotFound,
        PatientError::DatabaseError(msg) => BillingError::DatabaseError(msg),
    }
}
