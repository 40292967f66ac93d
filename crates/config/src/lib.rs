//! Configuration module for xfade-concat
//!
//! Handles loading the JSON config file and environment variable overrides.

pub mod config;

pub use config::*;
