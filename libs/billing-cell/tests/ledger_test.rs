mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use futures::future::join_all;
use rust_decimal::Decimal;
use uuid::Uuid;

use billing_cell::models::{InvoiceSearchQuery, UpdateInvoiceRequest};
use billing_cell::services::parse_invoice_number;
use billing_cell::{
    BillingError, InMemoryInvoiceStore, Invoice, InvoiceItem, InvoiceStatus, InvoiceStore, NewInvoice, Payment,
    PaymentMethod,
};
use security_cell::{AuditEventType, ClinicScope};
use shared_models::auth::ClinicRole;

use common::{cash, item, Clinic};

// ==============================================================================
// INVOICE CREATION
// ==============================================================================

#[tokio::test]
async fn test_first_invoice_of_a_clinic() {
    let clinic = Clinic::new().await;

    let created = clinic.billing.invoices.create_invoice(&clinic.admin(), clinic.invoice_for(&[300])).await.unwrap();

    assert_eq!(created.invoice.invoice_number, "INV-000001");
    assert_eq!(created.invoice.subtotal, Decimal::from(300));
    assert_eq!(created.invoice.total, Decimal::from(300));
    assert_eq!(created.invoice.status, InvoiceStatus::Pending);
    assert_eq!(created.balance, Decimal::from(300));
    assert_eq!(created.items.len(), 1);
    assert!(created.payments.is_empty());
}

#[tokio::test]
async fn test_totals_with_line_and_invoice_discounts() {
    let clinic = Clinic::new().await;
    let mut request = clinic.invoice_for(&[]);
    request.items = vec![
        item(2, Decimal::from(100), Decimal::from(20)),
        item(1, Decimal::from(50), Decimal::from(50)),
    ];
    request.discount = Some(Decimal::from(30));

    let created = clinic.billing.invoices.create_invoice(&clinic.admin(), request).await.unwrap();
    let invoice = &created.invoice;

    assert_eq!(invoice.subtotal, Decimal::from(180));
    assert_eq!(invoice.line_discount_total, Decimal::from(70));
    assert_eq!(invoice.total, invoice.subtotal - invoice.discount + invoice.tax);
    assert_eq!(invoice.subtotal, created.items.iter().map(|i| i.total).sum::<Decimal>());
    assert_eq!(created.items[1].total, Decimal::ZERO);
    assert_eq!(created.items.iter().map(|i| i.position).collect::<Vec<_>>(), vec![1, 2]);
}

#[tokio::test]
async fn test_invalid_invoices_are_rejected_without_consuming_a_number() {
    let clinic = Clinic::new().await;
    let admin = clinic.admin();

    assert_matches!(
        clinic.billing.invoices.create_invoice(&admin, clinic.invoice_for(&[])).await,
        Err(BillingError::ValidationError(_))
    );

    let mut stranger = clinic.invoice_for(&[100]);
    stranger.patient_id = Uuid::new_v4();
    assert_matches!(
        clinic.billing.invoices.create_invoice(&admin, stranger).await,
        Err(BillingError::PatientNotFound)
    );

    let created = clinic.billing.invoices.create_invoice(&admin, clinic.invoice_for(&[100])).await.unwrap();
    assert_eq!(created.invoice.invoice_number, "INV-000001");
}

#[tokio::test]
async fn test_oversized_invoice_is_rejected_without_panicking() {
    let clinic = Clinic::new().await;
    let admin = clinic.admin();

    let mut request = clinic.invoice_for(&[]);
    request.items = vec![item(1, Decimal::MAX, Decimal::ZERO), item(1, Decimal::MAX, Decimal::ZERO)];
    assert_matches!(
        clinic.billing.invoices.create_invoice(&admin, request).await,
        Err(BillingError::ValidationError(_))
    );

    let created = clinic.billing.invoices.create_invoice(&admin, clinic.invoice_for(&[100])).await.unwrap();
    assert_eq!(created.invoice.invoice_number, "INV-000001");
}

#[tokio::test]
async fn test_concurrent_creation_numbers_are_unique_and_increasing() {
    let clinic = Clinic::new().await;
    let admin = clinic.admin();

    let attempts = (0..25).map(|_| {
        let invoices = clinic.billing.invoices.clone();
        let admin = admin.clone();
        let request = clinic.invoice_for(&[100]);
        async move { invoices.create_invoice(&admin, request).await }
    });

    let mut sequences: Vec<u64> = join_all(attempts)
        .await
        .into_iter()
        .map(|result| parse_invoice_number(&result.unwrap().invoice.invoice_number).unwrap())
        .collect();

    let unique: HashSet<u64> = sequences.iter().copied().collect();
    assert_eq!(unique.len(), 25);

    sequences.sort_unstable();
    assert_eq!(sequences, (1..=25).collect::<Vec<u64>>());
}

#[tokio::test]
async fn test_numbering_is_per_clinic() {
    let first = Clinic::new().await;
    let second_clinic = Uuid::new_v4();
    let second_patient = Uuid::new_v4();
    first.patients.register(second_clinic, second_patient).await;
    let second_scope = ClinicScope::new(second_clinic, "admin-2", ClinicRole::Admin);

    first.billing.invoices.create_invoice(&first.admin(), first.invoice_for(&[10])).await.unwrap();
    first.billing.invoices.create_invoice(&first.admin(), first.invoice_for(&[10])).await.unwrap();

    let mut request = first.invoice_for(&[10]);
    request.patient_id = second_patient;
    let other = first.billing.invoices.create_invoice(&second_scope, request).await.unwrap();

    assert_eq!(other.invoice.invoice_number, "INV-000001");
}

// ==============================================================================
// PAYMENTS
// ==============================================================================

#[tokio::test]
async fn test_full_payment_marks_invoice_paid() {
    let clinic = Clinic::new().await;
    let admin = clinic.admin();
    let invoice = clinic.billing.invoices.create_invoice(&admin, clinic.invoice_for(&[450])).await.unwrap().invoice;

    let paid = clinic.billing.reconciler.apply_payment(&admin, invoice.id, cash(450)).await.unwrap();

    assert_eq!(paid.status, InvoiceStatus::Paid);
    assert_eq!(paid.balance(), Decimal::ZERO);
}

#[tokio::test]
async fn test_partial_payment_leaves_balance() {
    let clinic = Clinic::new().await;
    let admin = clinic.admin();
    let invoice = clinic.billing.invoices.create_invoice(&admin, clinic.invoice_for(&[450])).await.unwrap().invoice;

    let partial = clinic.billing.reconciler.apply_payment(&admin, invoice.id, cash(200)).await.unwrap();

    assert_eq!(partial.status, InvoiceStatus::Partial);
    assert_eq!(partial.balance(), Decimal::from(250));

    let details = clinic.billing.invoices.get_invoice(&admin, invoice.id).await.unwrap();
    assert_eq!(details.balance, Decimal::from(250));
    assert_eq!(details.payments.len(), 1);
    assert_eq!(details.payments[0].recorded_by.as_deref(), Some("admin-user"));
}

#[tokio::test]
async fn test_payment_order_does_not_change_status() {
    let clinic = Clinic::new().await;
    let admin = clinic.admin();

    let mut outcomes = Vec::new();
    for order in [[10, 20], [20, 10]] {
        let invoice = clinic.billing.invoices.create_invoice(&admin, clinic.invoice_for(&[100])).await.unwrap().invoice;
        let mut last = None;
        for amount in order {
            last = Some(clinic.billing.reconciler.apply_payment(&admin, invoice.id, cash(amount)).await.unwrap());
        }
        let last = last.unwrap();
        outcomes.push((last.status, last.amount_paid));
    }

    assert_eq!(outcomes[0], outcomes[1]);
    assert_eq!(outcomes[0], (InvoiceStatus::Partial, Decimal::from(30)));
}

#[tokio::test]
async fn test_invalid_payments_are_rejected() {
    let clinic = Clinic::new().await;
    let admin = clinic.admin();
    let invoice = clinic.billing.invoices.create_invoice(&admin, clinic.invoice_for(&[100])).await.unwrap().invoice;

    assert_matches!(
        clinic.billing.reconciler.apply_payment(&admin, invoice.id, cash(0)).await,
        Err(BillingError::ValidationError(_))
    );
    assert_matches!(
        clinic.billing.reconciler.apply_payment(&admin, invoice.id, cash(101)).await,
        Err(BillingError::InvalidState(_))
    );
    assert_matches!(
        clinic.billing.reconciler.apply_payment(&admin, Uuid::new_v4(), cash(10)).await,
        Err(BillingError::NotFound)
    );

    let payments = clinic.billing.reconciler.list_payments(&admin, invoice.id).await.unwrap();
    assert!(payments.is_empty());
}

#[tokio::test]
async fn test_oversized_payment_is_an_overpayment() {
    let clinic = Clinic::new().await;
    let admin = clinic.admin();
    let invoice = clinic.billing.invoices.create_invoice(&admin, clinic.invoice_for(&[450])).await.unwrap().invoice;
    clinic.billing.reconciler.apply_payment(&admin, invoice.id, cash(1)).await.unwrap();

    let mut huge = cash(0);
    huge.amount = Decimal::MAX;
    assert_matches!(
        clinic.billing.reconciler.apply_payment(&admin, invoice.id, huge).await,
        Err(BillingError::InvalidState(msg)) if msg.contains("exceeds")
    );

    let details = clinic.billing.invoices.get_invoice(&admin, invoice.id).await.unwrap();
    assert_eq!(details.invoice.amount_paid, Decimal::ONE);
    assert_eq!(details.payments.len(), 1);
}

#[tokio::test]
async fn test_cancelled_invoice_takes_no_payments() {
    let clinic = Clinic::new().await;
    let admin = clinic.admin();
    let invoice = clinic.billing.invoices.create_invoice(&admin, clinic.invoice_for(&[100])).await.unwrap().invoice;

    clinic.billing.invoices.delete_invoice(&admin, invoice.id).await.unwrap();

    assert_matches!(
        clinic.billing.reconciler.apply_payment(&admin, invoice.id, cash(10)).await,
        Err(BillingError::InvalidState(_))
    );
}

#[tokio::test]
async fn test_concurrent_payments_never_overpay() {
    let clinic = Clinic::new().await;
    let admin = clinic.admin();
    let invoice = clinic.billing.invoices.create_invoice(&admin, clinic.invoice_for(&[100])).await.unwrap().invoice;

    let attempts = (0..8).map(|_| {
        let reconciler = clinic.billing.reconciler.clone();
        let admin = admin.clone();
        async move { reconciler.apply_payment(&admin, invoice.id, cash(25)).await }
    });
    let results = join_all(attempts).await;

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 4);

    let details = clinic.billing.invoices.get_invoice(&admin, invoice.id).await.unwrap();
    assert_eq!(details.invoice.amount_paid, Decimal::from(100));
    assert_eq!(details.invoice.status, InvoiceStatus::Paid);
    assert_eq!(details.payments.len(), 4);
}

#[tokio::test]
async fn test_recompute_is_idempotent() {
    let clinic = Clinic::new().await;
    let admin = clinic.admin();
    let invoice = clinic.billing.invoices.create_invoice(&admin, clinic.invoice_for(&[100])).await.unwrap().invoice;
    let paid = clinic.billing.reconciler.apply_payment(&admin, invoice.id, cash(40)).await.unwrap();

    let once = clinic.billing.reconciler.recompute_status(&admin, invoice.id).await.unwrap();
    let twice = clinic.billing.reconciler.recompute_status(&admin, invoice.id).await.unwrap();

    assert_eq!(once, paid);
    assert_eq!(once, twice);
    assert_eq!(twice.status, InvoiceStatus::Partial);
}

// ==============================================================================
// OPTIMISTIC VERSION RETRY
// ==============================================================================

/// Rejects the first `failures` payment writes as stale.
struct RacingStore {
    inner: InMemoryInvoiceStore,
    failures: AtomicU32,
}

#[async_trait]
impl InvoiceStore for RacingStore {
    async fn create_invoice(&self, invoice: NewInvoice) -> Result<(Invoice, Vec<InvoiceItem>), BillingError> {
        self.inner.create_invoice(invoice).await
    }

    async fn get_invoice(&self, clinic_id: Uuid, invoice_id: Uuid) -> Result<Option<Invoice>, BillingError> {
        self.inner.get_invoice(clinic_id, invoice_id).await
    }

    async fn list_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, BillingError> {
        self.inner.list_items(invoice_id).await
    }

    async fn list_invoices(&self, clinic_id: Uuid, query: &InvoiceSearchQuery) -> Result<Vec<Invoice>, BillingError> {
        self.inner.list_invoices(clinic_id, query).await
    }

    async fn list_payments(&self, clinic_id: Uuid, invoice_id: Uuid) -> Result<Vec<Payment>, BillingError> {
        self.inner.list_payments(clinic_id, invoice_id).await
    }

    async fn record_payment(
        &self,
        expected_version: i64,
        payment: Payment,
        new_amount_paid: Decimal,
        new_status: InvoiceStatus,
    ) -> Result<Invoice, BillingError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BillingError::StaleVersion);
        }
        self.inner.record_payment(expected_version, payment, new_amount_paid, new_status).await
    }

    async fn update_invoice(&self, expected_version: i64, invoice: Invoice) -> Result<Invoice, BillingError> {
        self.inner.update_invoice(expected_version, invoice).await
    }
}

fn racing(failures: u32) -> Arc<RacingStore> {
    Arc::new(RacingStore {
        inner: InMemoryInvoiceStore::new(),
        failures: AtomicU32::new(failures),
    })
}

#[tokio::test]
async fn test_stale_payment_write_is_retried() {
    let clinic = Clinic::with_store(racing(3)).await;
    let admin = clinic.admin();
    let invoice = clinic.billing.invoices.create_invoice(&admin, clinic.invoice_for(&[100])).await.unwrap().invoice;

    let paid = clinic.billing.reconciler.apply_payment(&admin, invoice.id, cash(100)).await.unwrap();
    assert_eq!(paid.status, InvoiceStatus::Paid);
}

#[tokio::test]
async fn test_stale_payment_write_surfaces_after_retries() {
    let clinic = Clinic::with_store(racing(4)).await;
    let admin = clinic.admin();
    let invoice = clinic.billing.invoices.create_invoice(&admin, clinic.invoice_for(&[100])).await.unwrap().invoice;

    assert_matches!(
        clinic.billing.reconciler.apply_payment(&admin, invoice.id, cash(100)).await,
        Err(BillingError::StaleVersion)
    );
    let payments = clinic.billing.reconciler.list_payments(&admin, invoice.id).await.unwrap();
    assert!(payments.is_empty());
}

// ==============================================================================
// UPDATE AND DELETE
// ==============================================================================

#[tokio::test]
async fn test_delete_guard() {
    let clinic = Clinic::new().await;
    let admin = clinic.admin();
    let service = &clinic.billing.invoices;

    let untouched = service.create_invoice(&admin, clinic.invoice_for(&[100])).await.unwrap().invoice;
    let cancelled = service.delete_invoice(&admin, untouched.id).await.unwrap();
    assert_eq!(cancelled.status, InvoiceStatus::Cancelled);
    assert_eq!(cancelled.invoice_number, untouched.invoice_number);

    let again = service.delete_invoice(&admin, untouched.id).await.unwrap();
    assert_eq!(again.status, InvoiceStatus::Cancelled);

    let partial = service.create_invoice(&admin, clinic.invoice_for(&[100])).await.unwrap().invoice;
    clinic.billing.reconciler.apply_payment(&admin, partial.id, cash(10)).await.unwrap();
    assert_matches!(service.delete_invoice(&admin, partial.id).await, Err(BillingError::InvalidState(_)));

    let paid = service.create_invoice(&admin, clinic.invoice_for(&[100])).await.unwrap().invoice;
    clinic.billing.reconciler.apply_payment(&admin, paid.id, cash(100)).await.unwrap();
    assert_matches!(service.delete_invoice(&admin, paid.id).await, Err(BillingError::InvalidState(_)));

    let next = service.create_invoice(&admin, clinic.invoice_for(&[100])).await.unwrap().invoice;
    assert_eq!(next.invoice_number, "INV-000004");
}

#[tokio::test]
async fn test_update_allows_metadata_and_cancellation_only() {
    let clinic = Clinic::new().await;
    let admin = clinic.admin();
    let service = &clinic.billing.invoices;
    let invoice = service.create_invoice(&admin, clinic.invoice_for(&[100])).await.unwrap().invoice;

    let noted = service
        .update_invoice(
            &admin,
            invoice.id,
            UpdateInvoiceRequest {
                notes: Some("Insurance pending".to_string()),
                status: Some(InvoiceStatus::Pending),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(noted.notes.as_deref(), Some("Insurance pending"));
    assert_eq!(noted.version, invoice.version + 1);

    let forced = UpdateInvoiceRequest {
        status: Some(InvoiceStatus::Paid),
        ..Default::default()
    };
    assert_matches!(
        service.update_invoice(&admin, invoice.id, forced).await,
        Err(BillingError::InvalidState(_))
    );

    let cancel = UpdateInvoiceRequest {
        status: Some(InvoiceStatus::Cancelled),
        ..Default::default()
    };
    let cancelled = service.update_invoice(&admin, invoice.id, cancel).await.unwrap();
    assert_eq!(cancelled.status, InvoiceStatus::Cancelled);

    let late_note = UpdateInvoiceRequest {
        notes: Some("too late".to_string()),
        ..Default::default()
    };
    assert_matches!(
        service.update_invoice(&admin, invoice.id, late_note).await,
        Err(BillingError::InvalidState(_))
    );
}

/// Records a payment right before the first invoice edit, as a concurrent
/// cashier would between the edit's read and its write.
struct PaymentDuringEditStore {
    inner: InMemoryInvoiceStore,
    armed: AtomicBool,
}

#[async_trait]
impl InvoiceStore for PaymentDuringEditStore {
    async fn create_invoice(&self, invoice: NewInvoice) -> Result<(Invoice, Vec<InvoiceItem>), BillingError> {
        self.inner.create_invoice(invoice).await
    }

    async fn get_invoice(&self, clinic_id: Uuid, invoice_id: Uuid) -> Result<Option<Invoice>, BillingError> {
        self.inner.get_invoice(clinic_id, invoice_id).await
    }

    async fn list_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, BillingError> {
        self.inner.list_items(invoice_id).await
    }

    async fn list_invoices(&self, clinic_id: Uuid, query: &InvoiceSearchQuery) -> Result<Vec<Invoice>, BillingError> {
        self.inner.list_invoices(clinic_id, query).await
    }

    async fn list_payments(&self, clinic_id: Uuid, invoice_id: Uuid) -> Result<Vec<Payment>, BillingError> {
        self.inner.list_payments(clinic_id, invoice_id).await
    }

    async fn record_payment(
        &self,
        expected_version: i64,
        payment: Payment,
        new_amount_paid: Decimal,
        new_status: InvoiceStatus,
    ) -> Result<Invoice, BillingError> {
        self.inner.record_payment(expected_version, payment, new_amount_paid, new_status).await
    }

    async fn update_invoice(&self, expected_version: i64, invoice: Invoice) -> Result<Invoice, BillingError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            let payment = Payment {
                id: Uuid::new_v4(),
                invoice_id: invoice.id,
                clinic_id: invoice.clinic_id,
                amount: Decimal::from(10),
                method: PaymentMethod::Card,
                reference: None,
                notes: None,
                payment_date: chrono::Utc::now(),
                recorded_by: Some("front-desk".to_string()),
            };
            self.inner
                .record_payment(expected_version, payment, invoice.amount_paid + Decimal::from(10), InvoiceStatus::Partial)
                .await?;
        }
        self.inner.update_invoice(expected_version, invoice).await
    }
}

async fn payment_during_edit() -> (Clinic, Invoice) {
    let store = Arc::new(PaymentDuringEditStore {
        inner: InMemoryInvoiceStore::new(),
        armed: AtomicBool::new(false),
    });
    let clinic = Clinic::with_store(store.clone()).await;
    let invoice = clinic
        .billing
        .invoices
        .create_invoice(&clinic.admin(), clinic.invoice_for(&[100]))
        .await
        .unwrap()
        .invoice;
    store.armed.store(true, Ordering::SeqCst);
    (clinic, invoice)
}

#[tokio::test]
async fn test_delete_rechecks_guard_after_concurrent_payment() {
    let (clinic, invoice) = payment_during_edit().await;
    let admin = clinic.admin();

    assert_matches!(
        clinic.billing.invoices.delete_invoice(&admin, invoice.id).await,
        Err(BillingError::InvalidState(msg)) if msg.contains("recorded payment")
    );

    let details = clinic.billing.invoices.get_invoice(&admin, invoice.id).await.unwrap();
    assert_eq!(details.invoice.status, InvoiceStatus::Partial);
    assert_eq!(details.payments.len(), 1);
}

#[tokio::test]
async fn test_cancel_via_update_rechecks_guard_after_concurrent_payment() {
    let (clinic, invoice) = payment_during_edit().await;
    let admin = clinic.admin();

    let cancel = UpdateInvoiceRequest {
        status: Some(InvoiceStatus::Cancelled),
        ..Default::default()
    };
    assert_matches!(
        clinic.billing.invoices.update_invoice(&admin, invoice.id, cancel).await,
        Err(BillingError::InvalidState(_))
    );
}

#[tokio::test]
async fn test_notes_edit_retries_past_concurrent_payment() {
    let (clinic, invoice) = payment_during_edit().await;
    let admin = clinic.admin();

    let note = UpdateInvoiceRequest {
        notes: Some("Card on file".to_string()),
        ..Default::default()
    };
    let saved = clinic.billing.invoices.update_invoice(&admin, invoice.id, note).await.unwrap();
    assert_eq!(saved.notes.as_deref(), Some("Card on file"));
    assert_eq!(saved.status, InvoiceStatus::Partial);
    assert_eq!(saved.amount_paid, Decimal::from(10));
}

// ==============================================================================
// TENANT SCOPE AND POLICY
// ==============================================================================

#[tokio::test]
async fn test_other_clinic_sees_not_found() {
    let clinic = Clinic::new().await;
    let invoice = clinic.billing.invoices.create_invoice(&clinic.admin(), clinic.invoice_for(&[100])).await.unwrap().invoice;
    let outsider = ClinicScope::new(Uuid::new_v4(), "intruder", ClinicRole::Admin);

    assert_matches!(
        clinic.billing.invoices.get_invoice(&outsider, invoice.id).await,
        Err(BillingError::NotFound)
    );
    assert_matches!(
        clinic.billing.reconciler.apply_payment(&outsider, invoice.id, cash(10)).await,
        Err(BillingError::NotFound)
    );
    assert_matches!(
        clinic.billing.invoices.delete_invoice(&outsider, invoice.id).await,
        Err(BillingError::NotFound)
    );
    let listed = clinic.billing.invoices.list_invoices(&outsider, InvoiceSearchQuery::default()).await.unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_policy_table_governs_billing() {
    let clinic = Clinic::new().await;
    let invoice = clinic.billing.invoices.create_invoice(&clinic.admin(), clinic.invoice_for(&[100])).await.unwrap().invoice;

    let nurse = clinic.scope(ClinicRole::Nurse);
    assert_matches!(
        clinic.billing.invoices.create_invoice(&nurse, clinic.invoice_for(&[100])).await,
        Err(BillingError::Unauthorized(_))
    );
    assert_matches!(
        clinic.billing.invoices.list_invoices(&nurse, InvoiceSearchQuery::default()).await,
        Err(BillingError::Unauthorized(_))
    );

    let receptionist = clinic.scope(ClinicRole::Receptionist);
    assert!(clinic.billing.invoices.get_invoice(&receptionist, invoice.id).await.is_ok());
    assert_matches!(
        clinic.billing.reconciler.apply_payment(&receptionist, invoice.id, cash(10)).await,
        Err(BillingError::Unauthorized(_))
    );

    let doctor = clinic.scope(ClinicRole::Doctor);
    assert!(clinic.billing.reconciler.apply_payment(&doctor, invoice.id, cash(10)).await.is_ok());
}

// ==============================================================================
// LISTING AND AUDIT
// ==============================================================================

#[tokio::test]
async fn test_list_filters_newest_first() {
    let clinic = Clinic::new().await;
    let admin = clinic.admin();
    let service = &clinic.billing.invoices;

    let first = service.create_invoice(&admin, clinic.invoice_for(&[100])).await.unwrap().invoice;
    let second = service.create_invoice(&admin, clinic.invoice_for(&[200])).await.unwrap().invoice;
    clinic.billing.reconciler.apply_payment(&admin, second.id, cash(200)).await.unwrap();

    let all = service.list_invoices(&admin, InvoiceSearchQuery::default()).await.unwrap();
    assert_eq!(all.iter().map(|i| i.id).collect::<Vec<_>>(), vec![second.id, first.id]);

    let paid = InvoiceSearchQuery { status: Some(InvoiceStatus::Paid), ..Default::default() };
    let paid = service.list_invoices(&admin, paid).await.unwrap();
    assert_eq!(paid.len(), 1);
    assert_eq!(paid[0].id, second.id);

    let inverted = InvoiceSearchQuery {
        from: first.issue_date.succ_opt(),
        to: Some(first.issue_date),
        ..Default::default()
    };
    assert_matches!(service.list_invoices(&admin, inverted).await, Err(BillingError::ValidationError(_)));
}

#[tokio::test]
async fn test_billing_mutations_are_audited() {
    let clinic = Clinic::new().await;
    let admin = clinic.admin();
    let invoice = clinic.billing.invoices.create_invoice(&admin, clinic.invoice_for(&[100])).await.unwrap().invoice;
    clinic.billing.reconciler.apply_payment(&admin, invoice.id, cash(100)).await.unwrap();

    for _ in 0..50 {
        if clinic.audit.entries().len() >= 2 {
            break;
        }
        tokio::task::yield_now().await;
    }

    let events: Vec<_> = clinic.audit.entries().into_iter().map(|e| e.event_type).collect();
    assert!(events.contains(&AuditEventType::InvoiceCreated));
    assert!(events.contains(&AuditEventType::PaymentRecorded));
}
