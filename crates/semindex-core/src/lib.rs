pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod sanitize;
pub mod types;

pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use identity::record_id;
pub use sanitize::Sanitizer;
pub use types::*;
