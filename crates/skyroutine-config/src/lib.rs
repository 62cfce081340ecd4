//! Configuration management for skyroutine
//!
//! Hierarchical configuration with discovery and precedence: CLI > file > defaults.
//! The file is `.skyroutine/config.toml`, found by walking upward from the
//! current directory unless `--config` names one explicitly.

mod config;

pub use config::*;
