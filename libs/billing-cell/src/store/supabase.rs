// libs/billing-cell/src/store/supabase.rs
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, error, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{BillingError, Invoice, InvoiceItem, InvoiceSearchQuery, InvoiceStatus, Payment};
use crate::store::{InvoiceStore, NewInvoice};

pub struct SupabaseInvoiceStore {
    supabase: SupabaseClient,
}

impl SupabaseInvoiceStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::backend(config),
        }
    }

    fn map_error(err: SupabaseError) -> BillingError {
        if err.is_serialization_failure() {
            warn!("Invoice write lost a version race: {}", err);
            return BillingError::StaleVersion;
        }
        error!("Invoice store error: {}", err);
        BillingError::DatabaseError(err.to_string())
    }

    fn single(rows: Vec<Invoice>, function: &str) -> Result<Invoice, BillingError> {
        rows.into_iter()
            .next()
            .ok_or_else(|| BillingError::DatabaseError(format!("{} returned no invoice", function)))
    }
}

#[async_trait]
impl InvoiceStore for SupabaseInvoiceStore {
    async fn create_invoice(&self, new: NewInvoice) -> Result<(Invoice, Vec<InvoiceItem>), BillingError> {
        debug!("Creating invoice for patient {} in clinic {}", new.patient_id, new.clinic_id);

        let items = serde_json::to_value(&new.lines).map_err(|e| BillingError::DatabaseError(e.to_string()))?;
        let args = json!({
            "p_clinic_id": new.clinic_id,
            "p_patient_id": new.patient_id,
            "p_issue_date": new.issue_date,
            "p_due_date": new.due_date,
            "p_notes": new.notes,
            "p_subtotal": new.totals.subtotal,
            "p_discount": new.totals.discount,
            "p_line_discount_total": new.totals.line_discount_total,
            "p_tax": new.totals.tax,
            "p_total": new.totals.total,
            "p_items": items,
        });

        let rows: Vec<Invoice> = self.supabase
            .rpc("create_invoice_with_items", None, args)
            .await
            .map_err(Self::map_error)?;
        let invoice = Self::single(rows, "create_invoice_with_items")?;

        let items = self.list_items(invoice.id).await?;
        Ok((invoice, items))
    }

    async fn get_invoice(&self, clinic_id: Uuid, invoice_id: Uuid) -> Result<Option<Invoice>, BillingError> {
        let path = format!("/rest/v1/invoices?id=eq.{}&clinic_id=eq.{}", invoice_id, clinic_id);

        let rows: Vec<Invoice> = self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(Self::map_error)?;

        Ok(rows.into_iter().next())
    }

    async fn list_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, BillingError> {
        let path = format!("/rest/v1/invoice_items?invoice_id=eq.{}&order=position.asc", invoice_id);

        self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(Self::map_error)
    }

    async fn list_invoices(&self, clinic_id: Uuid, query: &InvoiceSearchQuery) -> Result<Vec<Invoice>, BillingError> {
        let mut query_parts = vec![format!("clinic_id=eq.{}", clinic_id)];

        if let Some(patient_id) = query.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(status) = query.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from) = query.from {
            query_parts.push(format!("issue_date=gte.{}", from));
        }
        if let Some(to) = query.to {
            query_parts.push(format!("issue_date=lte.{}", to));
        }

        query_parts.push("order=issue_date.desc,invoice_number.desc".to_string());
        query_parts.push(format!("limit={}", query.page_size()));
        query_parts.push(format!("offset={}", query.page_offset()));

        let path = format!("/rest/v1/invoices?{}", query_parts.join("&"));

        self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(Self::map_error)
    }

    async fn list_payments(&self, clinic_id: Uuid, invoice_id: Uuid) -> Result<Vec<Payment>, BillingError> {
        let path = format!(
            "/rest/v1/payments?invoice_id=eq.{}&clinic_id=eq.{}&order=payment_date.asc,created_at.asc",
            invoice_id, clinic_id
        );

        self.supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(Self::map_error)
    }

    async fn record_payment(
        &self,
        expected_version: i64,
        payment: Payment,
        new_amount_paid: Decimal,
        new_status: InvoiceStatus,
    ) -> Result<Invoice, BillingError> {
        debug!("Recording payment of {} on invoice {}", payment.amount, payment.invoice_id);

        let args = json!({
            "p_invoice_id": payment.invoice_id,
            "p_clinic_id": payment.clinic_id,
            "p_expected_version": expected_version,
            "p_amount": payment.amount,
            "p_method": payment.method,
            "p_reference": payment.reference,
            "p_notes": payment.notes,
            "p_payment_date": payment.payment_date,
            "p_recorded_by": payment.recorded_by,
            "p_new_amount_paid": new_amount_paid,
            "p_new_status": new_status,
        });

        let rows: Vec<Invoice> = self.supabase
            .rpc("record_invoice_payment", None, args)
            .await
            .map_err(Self::map_error)?;

        Self::single(rows, "record_invoice_payment")
    }

    async fn update_invoice(&self, expected_version: i64, invoice: Invoice) -> Result<Invoice, BillingError> {
        debug!("Updating invoice {} at version {}", invoice.id, expected_version);

        let path = format!(
            "/rest/v1/invoices?id=eq.{}&clinic_id=eq.{}&version=eq.{}",
            invoice.id, invoice.clinic_id, expected_version
        );
        let body = json!({
            "status": invoice.status,
            "due_date": invoice.due_date,
            "notes": invoice.notes,
            "amount_paid": invoice.amount_paid,
            "version": expected_version + 1,
            "updated_at": Utc::now(),
        });

        let rows: Vec<Invoice> = self.supabase
            .request_returning(Method::PATCH, &path, None, Some(body))
            .await
            .map_err(Self::map_error)?;

        // No row back means the version filter excluded it.
        rows.into_iter().next().ok_or(BillingError::StaleVersion)
    }
}
