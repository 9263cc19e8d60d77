//! Configuration module for tessera.
//!
//! Handles compiler settings and environment variable expansion.

mod settings;

pub use settings::{
    expand_env_vars, CompilerSettings, PreaggSettings, Settings, SettingsError, CONFIG_ENV,
    CONFIG_FILE,
};
