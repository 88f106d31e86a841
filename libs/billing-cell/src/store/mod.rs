// libs/billing-cell/src/store/mod.rs
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{BillingError, Invoice, InvoiceItem, InvoiceSearchQuery, InvoiceStatus, Payment};
use crate::services::ledger::{InvoiceTotals, LineItem};

pub mod memory;
pub mod supabase;

pub use memory::InMemoryInvoiceStore;
pub use supabase::SupabaseInvoiceStore;

/// Invoice header and lines computed by the ledger, not yet numbered.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub totals: InvoiceTotals,
    pub lines: Vec<LineItem>,
}

/// Persistence for invoices and payments.
///
/// `create_invoice` takes the next number from a per-clinic counter and writes
/// header and items as one unit. Writes guarded by `expected_version` fail
/// with `BillingError::StaleVersion` when the stored invoice has moved on, and
/// bump the version when they succeed.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn create_invoice(&self, invoice: NewInvoice) -> Result<(Invoice, Vec<InvoiceItem>), BillingError>;

    async fn get_invoice(&self, clinic_id: Uuid, invoice_id: Uuid) -> Result<Option<Invoice>, BillingError>;

    /// Items in their original order.
    async fn list_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, BillingError>;

    /// Newest first.
    async fn list_invoices(&self, clinic_id: Uuid, query: &InvoiceSearchQuery) -> Result<Vec<Invoice>, BillingError>;

    /// Oldest first.
    async fn list_payments(&self, clinic_id: Uuid, invoice_id: Uuid) -> Result<Vec<Payment>, BillingError>;

    /// Inserts the payment and moves `amount_paid`/`status` in the same write.
    async fn record_payment(
        &self,
        expected_version: i64,
        payment: Payment,
        new_amount_paid: Decimal,
        new_status: InvoiceStatus,
    ) -> Result<Invoice, BillingError>;

    /// Writes status, due date, notes and amount paid.
    async fn update_invoice(&self, expected_version: i64, invoice: Invoice) -> Result<Invoice, BillingError>;
}
