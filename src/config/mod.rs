//! Config module - coordinator configuration and settings

pub mod toml_config;

pub use toml_config::{
    apply_env_overrides, get_config_path, load_config, load_from, save_config, save_config_to,
    BusConfig, CoordinatorConfig, StorageBackend, StorageConfig, CONFIG_PATH_ENV,
};
