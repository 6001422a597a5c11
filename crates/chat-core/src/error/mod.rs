//! Domain errors and the error taxonomy

mod domain_error;
mod taxonomy;

pub use domain_error::DomainError;
pub use taxonomy::{ErrorCategory, RecoveryAction, Severity};
