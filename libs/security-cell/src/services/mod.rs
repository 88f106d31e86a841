pub mod audit;
pub mod policy;
pub mod scope;

pub use audit::{AuditService, AuditSink, MemoryAuditSink, SupabaseAuditSink, TracingAuditSink};
pub use policy::AuthorizationPolicy;
pub use scope::{ClinicOwned, ClinicScope};
