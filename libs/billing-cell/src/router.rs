// libs/billing-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, BillingState};

pub fn billing_routes(config: Arc<AppConfig>, state: BillingState) -> Router {
    Router::new()
        .route("/", post(handlers::create_invoice).get(handlers::list_invoices))
        .route(
            "/{invoice_id}",
            get(handlers::get_invoice)
                .patch(handlers::update_invoice)
                .delete(handlers::delete_invoice),
        )
        .route(
            "/{invoice_id}/payments",
            post(handlers::apply_payment).get(handlers::list_payments),
        )
        .route("/{invoice_id}/reconcile", post(handlers::reconcile_invoice))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}
