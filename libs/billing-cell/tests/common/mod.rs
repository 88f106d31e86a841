#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use billing_cell::models::{ApplyPaymentRequest, CreateInvoiceRequest, InvoiceItemInput};
use billing_cell::{BillingState, InMemoryInvoiceStore, InvoiceStore, PaymentMethod};
use patient_cell::InMemoryPatientDirectory;
use security_cell::{AuditService, AuthorizationPolicy, ClinicScope, MemoryAuditSink};
use shared_models::auth::ClinicRole;

pub struct Clinic {
    pub billing: BillingState,
    pub patients: Arc<InMemoryPatientDirectory>,
    pub audit: MemoryAuditSink,
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
}

impl Clinic {
    pub async fn new() -> Self {
        Self::with_store(Arc::new(InMemoryInvoiceStore::new())).await
    }

    pub async fn with_store(store: Arc<dyn InvoiceStore>) -> Self {
        let patients = Arc::new(InMemoryPatientDirectory::new());
        let audit = MemoryAuditSink::new();
        let billing = BillingState::new(
            store,
            patients.clone(),
            Arc::new(AuthorizationPolicy::standard()),
            AuditService::new(Arc::new(audit.clone())),
            3,
        );

        let clinic_id = Uuid::new_v4();
        let patient_id = Uuid::new_v4();
        patients.register(clinic_id, patient_id).await;

        Self {
            billing,
            patients,
            audit,
            clinic_id,
            patient_id,
        }
    }

    pub fn scope(&self, role: ClinicRole) -> ClinicScope {
        ClinicScope::new(self.clinic_id, format!("{}-user", role.as_str().to_lowercase()), role)
    }

    pub fn admin(&self) -> ClinicScope {
        self.scope(ClinicRole::Admin)
    }

    /// One line per price, quantity 1, no discounts.
    pub fn invoice_for(&self, prices: &[i64]) -> CreateInvoiceRequest {
        CreateInvoiceRequest {
            patient_id: self.patient_id,
            items: prices.iter().map(|price| item(1, Decimal::from(*price), Decimal::ZERO)).collect(),
            due_date: None,
            notes: None,
            discount: None,
        }
    }
}

pub fn item(quantity: i32, unit_price: Decimal, discount: Decimal) -> InvoiceItemInput {
    InvoiceItemInput {
        description: "Consultation".to_string(),
        service_id: None,
        quantity,
        unit_price,
        discount,
    }
}

pub fn cash(amount: i64) -> ApplyPaymentRequest {
    ApplyPaymentRequest {
        amount: Decimal::from(amount),
        method: PaymentMethod::Cash,
        reference: None,
        notes: None,
        payment_date: None,
    }
}
