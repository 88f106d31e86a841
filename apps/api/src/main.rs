use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::{AppointmentBookingService, InMemoryAppointmentStore, SupabaseAppointmentStore};
use billing_cell::{BillingState, InMemoryInvoiceStore, SupabaseInvoiceStore};
use patient_cell::{InMemoryPatientDirectory, PatientDirectory, SupabasePatientDirectory};
use security_cell::{AuditService, AuthorizationPolicy};
use shared_config::AppConfig;

use crate::router::AppServices;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic ledger API server");

    let config = Arc::new(AppConfig::from_env());
    let services = build_services(&config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(config.clone(), services)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let listener = TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    info!("Listening on {}", config.bind_address);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

fn build_services(config: &AppConfig) -> AppServices {
    let policy = Arc::new(AuthorizationPolicy::standard());
    let audit = AuditService::from_config(config);

    if config.has_persistent_store() {
        info!("Using Supabase stores at {}", config.supabase_url);
        let patients: Arc<dyn PatientDirectory> = Arc::new(SupabasePatientDirectory::new(config));

        AppServices {
            appointments: Arc::new(AppointmentBookingService::new(
                Arc::new(SupabaseAppointmentStore::new(config)),
                patients.clone(),
                policy.clone(),
                audit.clone(),
            )),
            billing: BillingState::new(
                Arc::new(SupabaseInvoiceStore::new(config)),
                patients,
                policy,
                audit,
                config.payment_retry_attempts,
            ),
        }
    } else {
        warn!("Supabase is not configured; using in-memory stores. Data is lost on restart and any patient id is accepted");
        let patients: Arc<dyn PatientDirectory> = Arc::new(InMemoryPatientDirectory::open());

        AppServices {
            appointments: Arc::new(AppointmentBookingService::new(
                Arc::new(InMemoryAppointmentStore::new()),
                patients.clone(),
                policy.clone(),
                audit.clone(),
            )),
            billing: BillingState::new(
                Arc::new(InMemoryInvoiceStore::new()),
                patients,
                policy,
                audit,
                config.payment_retry_attempts,
            ),
        }
    }
}
