// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use security_cell::ClinicScope;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentSearchQuery, CancelAppointmentRequest, ClinicalNoteEventRequest, ConflictCheckQuery,
    CreateAppointmentRequest, UpdateAppointmentRequest,
};
use crate::services::AppointmentBookingService;

pub type AppointmentState = Arc<AppointmentBookingService>;

fn scope_of(user: &User) -> Result<ClinicScope, AppError> {
    ClinicScope::from_user(user).map_err(AppError::from)
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(service): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let scope = scope_of(&user)?;
    let appointment = service.create_appointment(&scope, request).await?;

    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(service): State<AppointmentState>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_of(&user)?;
    let appointments = service.list_appointments(&scope, query).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(service): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_of(&user)?;
    let appointment = service.get_appointment(&scope, appointment_id).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(service): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_of(&user)?;
    let appointment = service.update_appointment(&scope, appointment_id, request).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(service): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let scope = scope_of(&user)?;
    // The body is optional for a plain cancel.
    let request: CancelAppointmentRequest = if body.is_empty() {
        CancelAppointmentRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(format!("Invalid request body: {}", e)))?
    };
    let appointment = service.cancel_appointment(&scope, appointment_id, request).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn check_appointment_conflicts(
    State(service): State<AppointmentState>,
    Extension(user): Extension<User>,
    Query(query): Query<ConflictCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_of(&user)?;
    let report = service.check_conflicts(&scope, query).await?;

    Ok(Json(json!(report)))
}

#[axum::debug_handler]
pub async fn record_clinical_note_event(
    State(service): State<AppointmentState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<ClinicalNoteEventRequest>,
) -> Result<Json<Value>, AppError> {
    let scope = scope_of(&user)?;
    let appointment = service
        .apply_note_event(&scope, appointment_id, request.event, request.note_id)
        .await?;

    Ok(Json(json!(appointment)))
}
