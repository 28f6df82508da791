pub mod loader;
pub mod validation;

pub use loader::{load_config, load_config_with_env, ConfigError};
