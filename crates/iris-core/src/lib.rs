pub mod config;
pub mod error;
pub mod types;

pub use config::IrisConfig;
pub use error::{IrisError, Result};
pub use types::ImagePayload;
