// libs/billing-cell/src/store/memory.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{BillingError, Invoice, InvoiceItem, InvoiceSearchQuery, InvoiceStatus, Payment};
use crate::services::numbering::{format_invoice_number, parse_invoice_number};
use crate::store::{InvoiceStore, NewInvoice};

#[derive(Default)]
struct Ledger {
    counters: HashMap<Uuid, u64>,
    invoices: HashMap<Uuid, Invoice>,
    items: HashMap<Uuid, Vec<InvoiceItem>>,
    payments: Vec<Payment>,
}

impl Ledger {
    fn current(&self, clinic_id: Uuid, invoice_id: Uuid, expected_version: i64) -> Result<&Invoice, BillingError> {
        let invoice = self
            .invoices
            .get(&invoice_id)
            .filter(|invoice| invoice.clinic_id == clinic_id)
            .ok_or(BillingError::NotFound)?;

        if invoice.version != expected_version {
            warn!(
                "Invoice {} is at version {}, write expected {}",
                invoice_id, invoice.version, expected_version
            );
            return Err(BillingError::StaleVersion);
        }
        Ok(invoice)
    }
}

/// Process-local store. Every write runs under one lock, so numbering and
/// version checks are atomic with the rows they guard.
#[derive(Default)]
pub struct InMemoryInvoiceStore {
    ledger: RwLock<Ledger>,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceStore for InMemoryInvoiceStore {
    async fn create_invoice(&self, new: NewInvoice) -> Result<(Invoice, Vec<InvoiceItem>), BillingError> {
        let mut ledger = self.ledger.write().await;

        let counter = ledger.counters.entry(new.clinic_id).or_insert(0);
        *counter += 1;
        let invoice_number = format_invoice_number(*counter);

        let now = Utc::now();
        let invoice = Invoice {
            id: Uuid::new_v4(),
            clinic_id: new.clinic_id,
            patient_id: new.patient_id,
            invoice_number,
            issue_date: new.issue_date,
            due_date: new.due_date,
            subtotal: new.totals.subtotal,
            discount: new.totals.discount,
            line_discount_total: new.totals.line_discount_total,
            tax: new.totals.tax,
            total: new.totals.total,
            amount_paid: Decimal::ZERO,
            status: InvoiceStatus::Pending,
            notes: new.notes,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let items: Vec<InvoiceItem> = new
            .lines
            .into_iter()
            .enumerate()
            .map(|(index, line)| InvoiceItem {
                id: Uuid::new_v4(),
                invoice_id: invoice.id,
                description: line.description,
                service_id: line.service_id,
                quantity: line.quantity,
                unit_price: line.unit_price,
                discount: line.discount,
                total: line.total,
                position: index as i32 + 1,
            })
            .collect();

        debug!("Stored invoice {} as {}", invoice.id, invoice.invoice_number);
        ledger.invoices.insert(invoice.id, invoice.clone());
        ledger.items.insert(invoice.id, items.clone());

        Ok((invoice, items))
    }

    async fn get_invoice(&self, clinic_id: Uuid, invoice_id: Uuid) -> Result<Option<Invoice>, BillingError> {
        let ledger = self.ledger.read().await;
        Ok(ledger
            .invoices
            .get(&invoice_id)
            .filter(|invoice| invoice.clinic_id == clinic_id)
            .cloned())
    }

    async fn list_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, BillingError> {
        let ledger = self.ledger.read().await;
        Ok(ledger.items.get(&invoice_id).cloned().unwrap_or_default())
    }

    async fn list_invoices(&self, clinic_id: Uuid, query: &InvoiceSearchQuery) -> Result<Vec<Invoice>, BillingError> {
        let ledger = self.ledger.read().await;

        let mut matching: Vec<Invoice> = ledger
            .invoices
            .values()
            .filter(|invoice| invoice.clinic_id == clinic_id && query.matches(invoice))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            b.issue_date
                .cmp(&a.issue_date)
                .then_with(|| parse_invoice_number(&b.invoice_number).cmp(&parse_invoice_number(&a.invoice_number)))
        });

        Ok(matching
            .into_iter()
            .skip(query.page_offset() as usize)
            .take(query.page_size() as usize)
            .collect())
    }

    async fn list_payments(&self, clinic_id: Uuid, invoice_id: Uuid) -> Result<Vec<Payment>, BillingError> {
        let ledger = self.ledger.read().await;
        Ok(ledger
            .payments
            .iter()
            .filter(|payment| payment.invoice_id == invoice_id && payment.clinic_id == clinic_id)
            .cloned()
            .collect())
    }

    async fn record_payment(
        &self,
        expected_version: i64,
        payment: Payment,
        new_amount_paid: Decimal,
        new_status: InvoiceStatus,
    ) -> Result<Invoice, BillingError> {
        let mut ledger = self.ledger.write().await;

        let current = ledger.current(payment.clinic_id, payment.invoice_id, expected_version)?;
        if current.status == InvoiceStatus::Cancelled {
            return Err(BillingError::StaleVersion);
        }

        let mut updated = current.clone();
        updated.amount_paid = new_amount_paid;
        updated.status = new_status;
        updated.version += 1;
        updated.updated_at = Utc::now();

        ledger.invoices.insert(updated.id, updated.clone());
        ledger.payments.push(payment);

        Ok(updated)
    }

    async fn update_invoice(&self, expected_version: i64, invoice: Invoice) -> Result<Invoice, BillingError> {
        let mut ledger = self.ledger.write().await;

        let current = ledger.current(invoice.clinic_id, invoice.id, expected_version)?;

        let mut updated = current.clone();
        updated.status = invoice.status;
        updated.due_date = invoice.due_date;
        updated.notes = invoice.notes;
        updated.amount_paid = invoice.amount_paid;
        updated.version += 1;
        updated.updated_at = Utc::now();

        ledger.invoices.insert(updated.id, updated.clone());
        Ok(updated)
    }
}
