//! CLI, configuration and terminal console for the vivcal engine.
//!
//! This crate provides the `vivcal` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod console;
pub mod error;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
