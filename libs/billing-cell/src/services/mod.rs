pub mod invoice;
pub mod ledger;
pub mod numbering;
pub mod reconciler;

pub use invoice::InvoiceService;
pub use ledger::{compute_invoice, compute_line, InvoiceTotals, LineItem};
pub use numbering::{format_invoice_number, parse_invoice_number};
pub use reconciler::{derive_status, PaymentReconciler};
