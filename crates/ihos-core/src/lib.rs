pub mod config;
pub mod error;

pub use config::IhosConfig;
pub use error::{IhosError, Result};
