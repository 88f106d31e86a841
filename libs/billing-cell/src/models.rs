// libs/billing-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use security_cell::{ClinicOwned, SecurityError};
use shared_models::error::AppError;

// ==============================================================================
// INVOICES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub invoice_number: String,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    /// Sum of the discounted line totals.
    pub subtotal: Decimal,
    /// Invoice-wide discount taken off `subtotal`. This is NOT the sum of the
    /// item discounts; that aggregate is `line_discount_total`.
    pub discount: Decimal,
    /// Sum of the per-item discounts, already reflected in `subtotal`.
    pub line_discount_total: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub status: InvoiceStatus,
    pub notes: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// `total - amount_paid`. Never negative once payments are validated.
    pub fn balance(&self) -> Decimal {
        self.total - self.amount_paid
    }
}

impl ClinicOwned for Invoice {
    fn clinic_id(&self) -> Uuid {
        self.clinic_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Pending,
    Partial,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "PENDING",
            InvoiceStatus::Partial => "PARTIAL",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub service_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    #[serde(default)]
    pub position: i32,
}

// ==============================================================================
// PAYMENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
    Insurance,
    MobileMoney,
    Check,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub clinic_id: Uuid,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub payment_date: DateTime<Utc>,
    pub recorded_by: Option<String>,
}

/// Invoice as returned to callers: header, items, payments and balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceDetails {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub balance: Decimal,
    pub items: Vec<InvoiceItem>,
    pub payments: Vec<Payment>,
}

// ==============================================================================
// REQUESTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceItemInput {
    pub description: String,
    pub service_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvoiceRequest {
    pub patient_id: Uuid,
    pub items: Vec<InvoiceItemInput>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    /// Invoice-wide discount applied on top of the line totals. Item
    /// discounts go on the items; their sum is reported as
    /// `line_discount_total`, not here.
    pub discount: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateInvoiceRequest {
    pub status: Option<InvoiceStatus>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyPaymentRequest {
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub payment_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceSearchQuery {
    pub patient_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 200;

impl InvoiceSearchQuery {
    pub fn page_size(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn page_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    pub fn matches(&self, invoice: &Invoice) -> bool {
        self.patient_id.map_or(true, |id| invoice.patient_id == id)
            && self.status.map_or(true, |status| invoice.status == status)
            && self.from.map_or(true, |from| invoice.issue_date >= from)
            && self.to.map_or(true, |to| invoice.issue_date <= to)
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("Invoice not found")]
    NotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid invoice state: {0}")]
    InvalidState(String),

    #[error("Invoice was modified concurrently")]
    StaleVersion,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<SecurityError> for BillingError {
    fn from(err: SecurityError) -> Self {
        BillingError::Unauthorized(err.to_string())
    }
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::NotFound | BillingError::PatientNotFound => AppError::NotFound(err.to_string()),
            BillingError::ValidationError(msg) => AppError::ValidationError(msg),
            BillingError::InvalidState(msg) => AppError::InvalidState(msg),
            BillingError::Unauthorized(msg) => AppError::Forbidden(msg),
            BillingError::StaleVersion => AppError::Conflict(err.to_string()),
            BillingError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
