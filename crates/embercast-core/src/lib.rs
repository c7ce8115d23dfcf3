pub mod config;
pub mod errors;
pub mod types;

pub use config::ReceiverConfig;
pub use errors::{EmbercastError, TransportError};
pub use types::*;
