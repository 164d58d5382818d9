//! Shared types, error model, and configuration for the YouMind client.
//!
//! This crate is the foundation depended on by all other youmind crates.
//! It provides:
//! - [`YoumindError`] — the unified error type
//! - Domain types ([`BoardRecord`], [`Library`], [`AuthArtifact`], [`BoardId`])
//! - Configuration ([`AppConfig`], config loading, data paths)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DiscoveryConfig, SelectorsConfig, ServiceConfig, TimeoutsConfig, WebDriverConfig,
    auth_state_path, config_dir, config_file_path, data_dir, init_config, library_path,
    load_config, load_config_from,
};
pub use error::{Result, YoumindError};
pub use types::{
    AuthArtifact, AuthStatus, BoardId, BoardRecord, BoardTarget, CURRENT_SCHEMA_VERSION, Cookie,
    Library,
};
