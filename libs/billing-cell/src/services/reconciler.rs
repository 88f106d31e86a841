// libs/billing-cell/src/services/reconciler.rs
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use security_cell::{AuditEventType, AuditService, AuthorizationPolicy, ClinicScope, Operation};

use crate::models::{ApplyPaymentRequest, BillingError, Invoice, InvoiceStatus, Payment};
use crate::services::invoice::{invoice_audit_entry, load_invoice};
use crate::services::ledger::sum_amounts;
use crate::store::InvoiceStore;

/// Status implied by the ledger. Depends only on the total, the sum of the
/// payments and whether the invoice was cancelled, so applying the same
/// payments in any order lands on the same status.
pub fn derive_status(total: Decimal, amount_paid: Decimal, current: InvoiceStatus) -> InvoiceStatus {
    if current == InvoiceStatus::Cancelled {
        return InvoiceStatus::Cancelled;
    }

    let balance = total - amount_paid;
    if balance <= Decimal::ZERO {
        InvoiceStatus::Paid
    } else if balance < total {
        InvoiceStatus::Partial
    } else {
        InvoiceStatus::Pending
    }
}

pub struct PaymentReconciler {
    store: Arc<dyn InvoiceStore>,
    policy: Arc<AuthorizationPolicy>,
    audit: AuditService,
    retry_attempts: u32,
}

impl PaymentReconciler {
    /// `retry_attempts` is how many times a write that lost a version race
    /// is retried before the failure surfaces.
    pub fn new(
        store: Arc<dyn InvoiceStore>,
        policy: Arc<AuthorizationPolicy>,
        audit: AuditService,
        retry_attempts: u32,
    ) -> Self {
        Self {
            store,
            policy,
            audit,
            retry_attempts,
        }
    }

    #[instrument(skip(self, scope, request), fields(clinic_id = %scope.clinic_id))]
    pub async fn apply_payment(
        &self,
        scope: &ClinicScope,
        invoice_id: Uuid,
        request: ApplyPaymentRequest,
    ) -> Result<Invoice, BillingError> {
        self.policy.authorize(scope, Operation::ApplyPayment)?;

        if request.amount <= Decimal::ZERO {
            return Err(BillingError::ValidationError("Payment amount must be positive".to_string()));
        }

        let payment_date = request.payment_date.unwrap_or_else(Utc::now);

        for attempt in 0..=self.retry_attempts {
            let invoice = load_invoice(self.store.as_ref(), scope, invoice_id).await?;

            if invoice.status == InvoiceStatus::Cancelled {
                return Err(BillingError::InvalidState(format!(
                    "Invoice {} is cancelled",
                    invoice.invoice_number
                )));
            }

            let new_amount_paid = match invoice.amount_paid.checked_add(request.amount) {
                Some(sum) if sum <= invoice.total => sum,
                _ => {
                    return Err(BillingError::InvalidState(format!(
                        "Payment of {} exceeds outstanding balance {}",
                        request.amount,
                        invoice.balance()
                    )))
                }
            };

            let new_status = derive_status(invoice.total, new_amount_paid, invoice.status);
            let payment = Payment {
                id: Uuid::new_v4(),
                invoice_id,
                clinic_id: scope.clinic_id,
                amount: request.amount,
                method: request.method,
                reference: request.reference.clone(),
                notes: request.notes.clone(),
                payment_date,
                recorded_by: Some(scope.user_id.clone()),
            };

            match self.store.record_payment(invoice.version, payment, new_amount_paid, new_status).await {
                Ok(saved) => {
                    info!(
                        "Payment of {} applied to {}, status {}",
                        request.amount, saved.invoice_number, saved.status
                    );
                    self.audit.record(
                        invoice_audit_entry(scope, AuditEventType::PaymentRecorded, &saved, "Recorded payment")
                            .add_context("amount", request.amount)
                            .add_context("method", request.method)
                            .add_context("previous_status", invoice.status),
                    );
                    return Ok(saved);
                }
                Err(BillingError::StaleVersion) => {
                    warn!("Invoice {} changed during payment, attempt {}", invoice_id, attempt + 1);
                }
                Err(err) => return Err(err),
            }
        }

        Err(BillingError::StaleVersion)
    }

    /// Re-derives `amount_paid` and status from the payment rows. Writes only
    /// when something differs.
    #[instrument(skip(self, scope), fields(clinic_id = %scope.clinic_id))]
    pub async fn recompute_status(&self, scope: &ClinicScope, invoice_id: Uuid) -> Result<Invoice, BillingError> {
        self.policy.authorize(scope, Operation::RecomputeInvoice)?;

        for attempt in 0..=self.retry_attempts {
            let invoice = load_invoice(self.store.as_ref(), scope, invoice_id).await?;
            let payments = self.store.list_payments(scope.clinic_id, invoice_id).await?;

            let amount_paid = sum_amounts(payments.iter().map(|payment| payment.amount), "Payment total")?;
            let status = derive_status(invoice.total, amount_paid, invoice.status);

            if amount_paid == invoice.amount_paid && status == invoice.status {
                debug!("Invoice {} already consistent with its payments", invoice.invoice_number);
                return Ok(invoice);
            }

            let previous_status = invoice.status;
            let mut corrected = invoice.clone();
            corrected.amount_paid = amount_paid;
            corrected.status = status;

            match self.store.update_invoice(invoice.version, corrected).await {
                Ok(saved) => {
                    info!("Invoice {} reconciled to {}", saved.invoice_number, saved.status);
                    self.audit.record(
                        invoice_audit_entry(scope, AuditEventType::InvoiceReconciled, &saved, "Reconciled invoice")
                            .add_context("previous_status", previous_status)
                            .add_context("payment_count", payments.len()),
                    );
                    return Ok(saved);
                }
                Err(BillingError::StaleVersion) => {
                    warn!("Invoice {} changed during reconcile, attempt {}", invoice_id, attempt + 1);
                }
                Err(err) => return Err(err),
            }
        }

        Err(BillingError::StaleVersion)
    }

    pub async fn list_payments(&self, scope: &ClinicScope, invoice_id: Uuid) -> Result<Vec<Payment>, BillingError> {
        self.policy.authorize(scope, Operation::ViewInvoice)?;

        load_invoice(self.store.as_ref(), scope, invoice_id).await?;
        self.store.list_payments(scope.clinic_id, invoice_id).await
    }
}
