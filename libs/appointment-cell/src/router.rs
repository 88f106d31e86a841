// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AppointmentState};

pub fn appointment_routes(config: Arc<AppConfig>, service: AppointmentState) -> Router {
    Router::new()
        .route("/", post(handlers::create_appointment).get(handlers::list_appointments))
        .route("/conflicts/check", get(handlers::check_appointment_conflicts))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment).put(handlers::update_appointment),
        )
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route(
            "/{appointment_id}/clinical-note-events",
            post(handlers::record_clinical_note_event),
        )
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(service)
}
