pub mod customer;
pub mod helper;

pub use customer::CustomerSession;
pub use helper::{HelperIdentity, HelperSession, HelperWake};
