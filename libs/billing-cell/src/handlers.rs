// libs/billing-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use patient_cell::PatientDirectory;
use security_cell::{AuditService, AuthorizationPolicy, ClinicScope};
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{ApplyPaymentRequest, CreateInvoiceRequest, InvoiceSearchQuery, UpdateInvoiceRequest};
use crate::services::{InvoiceService, PaymentReconciler};
use crate::store::InvoiceStore;

#[derive(Clone)]
pub struct BillingState {
    pub invoices: Arc<InvoiceService>,
    pub reconciler: Arc<PaymentReconciler>,
}

impl BillingState {
    pub fn new(
        store: Arc<dyn InvoiceStore>,
        patients: Arc<dyn PatientDirectory>,
        policy: Arc<AuthorizationPolicy>,
        audit: AuditService,
        payment_retry_attempts: u32,
    ) -> Self {
        Self {
            invoices: Arc::new(InvoiceService::new(
                Arc::clone(&store),
                patients,
                Arc::clone(&policy),
                audit.clone(),
                payment_retry_attempts,
            )),
            reconciler: Arc::new(PaymentReconciler::new(store, policy, audit, payment_retry_attempts)),
        }
    }
}

fn scope_of(user: &User) -> Result<ClinicScope, AppError> {
    ClinicScope::from_user(user).map_err(AppError::from)
}

#[axum::debug_handler]
pub async fn create_invoice(
    State(state): State<BillingState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let scope = scope_of(&user)?;
    let invoice = state.invoices.create_invoice(&scope, request).await?;

    Ok((StatusCode::CREATED, Json(json!(invoice))))
}

#[axum::debug_handler]
pub async fn list_invoices(
    State(state): State<BillingState>,
    Extension(user): Extension<User>,
    Query(query): Query<InvoiceSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_of(&user)?;
    let invoices = state.invoices.list_invoices(&scope, query).await?;

    Ok(Json(json!({
        "invoices": invoices,
        "total": invoices.len(),
    })))
}

#[axum::debug_handler]
pub async fn get_invoice(
    State(state): State<BillingState>,
    Extension(user): Extension<User>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_of(&user)?;
    let invoice = state.invoices.get_invoice(&scope, invoice_id).await?;

    Ok(Json(json!(invoice)))
}

#[axum::debug_handler]
pub async fn update_invoice(
    State(state): State<BillingState>,
    Extension(user): Extension<User>,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<UpdateInvoiceRequest>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_of(&user)?;
    let invoice = state.invoices.update_invoice(&scope, invoice_id, request).await?;

    Ok(Json(json!(invoice)))
}

#[axum::debug_handler]
pub async fn delete_invoice(
    State(state): State<BillingState>,
    Extension(user): Extension<User>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_of(&user)?;
    let invoice = state.invoices.delete_invoice(&scope, invoice_id).await?;

    Ok(Json(json!({
        "message": "Invoice cancelled",
        "invoice": invoice,
    })))
}

#[axum::debug_handler]
pub async fn apply_payment(
    State(state): State<BillingState>,
    Extension(user): Extension<User>,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<ApplyPaymentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let scope = scope_of(&user)?;
    let invoice = state.reconciler.apply_payment(&scope, invoice_id, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "invoice": invoice,
            "balance": invoice.balance(),
        })),
    ))
}

#[axum::debug_handler]
pub async fn list_payments(
    State(state): State<BillingState>,
    Extension(user): Extension<User>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_of(&user)?;
    let payments = state.reconciler.list_payments(&scope, invoice_id).await?;

    Ok(Json(json!({
        "payments": payments,
        "total": payments.len(),
    })))
}

#[axum::debug_handler]
pub async fn reconcile_invoice(
    State(state): State<BillingState>,
    Extension(user): Extension<User>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_of(&user)?;
    let invoice = state.reconciler.recompute_status(&scope, invoice_id).await?;

    Ok(Json(json!(invoice)))
}
