//! Core configuration types for quarry.
//!
//! This crate holds everything the retrieval layer needs to be configured:
//! TOML settings, environment secrets, and the resolved `RetrievalSettings`
//! view consumed by `quarry-knowledge`.

pub mod config;

pub use config::{
    Config, ConfigError, RetrievalSettings, SearchDefaults, Secrets, SecretsError, Settings,
    SettingsError,
};
