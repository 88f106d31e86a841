// libs/billing-cell/src/lib.rs
//
// Invoice ledger: line-item totals, per-clinic invoice numbering and the
// payment reconciler that keeps balance and status in step.
//

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use handlers::BillingState;
pub use models::{BillingError, Invoice, InvoiceItem, InvoiceStatus, Payment, PaymentMethod};
pub use router::billing_routes;
pub use services::{InvoiceService, PaymentReconciler};
pub use store::{InMemoryInvoiceStore, InvoiceStore, NewInvoice, SupabaseInvoiceStore};
