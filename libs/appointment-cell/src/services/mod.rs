pub mod booking;
pub mod conflict;
pub mod consistency;
pub mod lifecycle;

pub use booking::AppointmentBookingService;
pub use conflict::ConflictDetectionService;
pub use consistency::SchedulingLocks;
pub use lifecycle::AppointmentLifecycleService;
