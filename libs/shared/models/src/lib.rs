pub mod auth;
pub mod error;

pub use auth::{ClinicRole, User};
pub use error::AppError;
