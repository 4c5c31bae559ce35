//! Deposit registration and operator requests.

mod control;
mod handler;

pub use control::OperatorControl;
pub use handler::{DepositHandler, RegistrationError};
