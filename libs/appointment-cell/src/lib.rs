// libs/appointment-cell/src/lib.rs
//
// Appointment scheduling: conflict detection, status lifecycle and the
// clinical-note events that drive appointments to completion.
//

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use models::{Appointment, AppointmentError, AppointmentStatus, ClinicalNoteEvent};
pub use router::appointment_routes;
pub use services::AppointmentBookingService;
pub use store::{AppointmentStore, InMemoryAppointmentStore, SupabaseAppointmentStore};
