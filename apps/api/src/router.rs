use std::sync::Arc;

use axum::{routing::get, Router};

use appointment_cell::appointment_routes;
use appointment_cell::handlers::AppointmentState;
use billing_cell::{billing_routes, BillingState};
use shared_config::AppConfig;

pub struct AppServices {
    pub appointments: AppointmentState,
    pub billing: BillingState,
}

pub fn create_router(config: Arc<AppConfig>, services: AppServices) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic ledger API is running!" }))
        .nest("/appointments", appointment_routes(config.clone(), services.appointments))
        .nest("/invoices", billing_routes(config, services.billing))
}
