pub mod config;
pub mod error;
pub mod file_config;
pub mod types;

pub use config::AppConfig;
pub use error::DashwatchError;
pub use file_config::{load_config, load_config_or_default, FileConfig};
pub use types::*;
