//! # Burn-in Common Library
//!
//! Shared code for the burn-in monitor binaries:
//! - Configuration loading (TOML + CLI/env overrides)
//! - Database schema initialization and row models
//! - Results/telemetry file naming rules
//! - Session token signing and verification
//! - Logging initialization

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod firmware;
pub mod logging;
pub mod naming;

pub use error::{Error, Result};
pub use firmware::{is_debug_firmware, DEBUG_FIRMWARE};
