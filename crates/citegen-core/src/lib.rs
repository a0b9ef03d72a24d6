pub mod config;
pub mod error;

pub use config::{AppConfig, CacheConfig, NetworkConfig, ProvidersConfig, RenderConfig};
pub use error::{CoreError, Result};
