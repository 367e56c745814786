//! CLI module
//!
//! Command-line interface for probing APIs through the engine.
//!
//! # Commands
//!
//! - `request` - Send one request and print the JSON response
//! - `iterate` - Follow cursor pagination and print one item per line

mod commands;
mod runner;

pub use commands::{parse_key_val, AuthArgs, Cli, Commands};
pub use runner::Runner;
