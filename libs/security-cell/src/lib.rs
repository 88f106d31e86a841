// =====================================================================================
// SECURITY CELL - TENANT SCOPE, AUTHORIZATION POLICY & AUDIT
// =====================================================================================
//
// Cross-cutting guards shared by the scheduling and billing cells:
// - ClinicScope binds every operation to the caller's clinic
// - AuthorizationPolicy holds the (role, operation) allow-list
// - AuditService records mutations without blocking the caller
//
// =====================================================================================

pub mod models;
pub mod services;

pub use models::{AuditEntry, AuditError, AuditEventType, AuditOutcome, Operation, SecurityError};

pub use services::{
    AuditService, AuditSink, AuthorizationPolicy, ClinicOwned, ClinicScope, MemoryAuditSink,
    SupabaseAuditSink, TracingAuditSink,
};
