//! Command-line front end for the file store.
//!
//! Provides commands for:
//! - Uploading, downloading and deleting files
//! - Inspecting file metadata and listings
//! - Probing storage node health
//! - Inspecting ring placement

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult};
pub use config::{CliConfig, NodeSpec};
