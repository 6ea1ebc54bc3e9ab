pub mod config;
pub mod entry_point;
pub mod error;

pub use config::{BuildConfig, Config, PoolConfig, RuntimeConfig, ServerConfig};
pub use entry_point::EntryPoint;
pub use error::WharfError;
