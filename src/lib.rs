pub mod config;
pub mod error;
pub mod types;
pub mod session;
pub mod server;
pub mod providers;
pub mod metrics;

pub use error::RelayError;
pub type Result<T> = std::result::Result<T, RelayError>;
