//! CLI commands and argument parsing

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Probe JSON/HTTP APIs through the bibliofabric engine
#[derive(Parser, Debug)]
#[command(name = "bibliofabric")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Base URL of the API
    #[arg(short, long, global = true)]
    pub base_url: Option<String>,

    /// Client settings file (YAML)
    #[arg(short, long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(flatten)]
    pub auth: AuthArgs,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Authentication flags
#[derive(Args, Debug, Default)]
pub struct AuthArgs {
    /// Static bearer token
    #[arg(long, global = true, conflicts_with = "client_id")]
    pub token: Option<String>,

    /// OAuth2 client ID
    #[arg(long, global = true, requires_all = ["client_secret", "token_url"])]
    pub client_id: Option<String>,

    /// OAuth2 client secret
    #[arg(long, global = true)]
    pub client_secret: Option<String>,

    /// OAuth2 token endpoint
    #[arg(long, global = true)]
    pub token_url: Option<String>,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a single request and print the JSON response
    Request {
        /// Path relative to the base URL
        path: String,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,

        /// Inline JSON request body
        #[arg(long)]
        body: Option<String>,
    },

    /// Follow cursor pagination and print one JSON item per line
    Iterate {
        /// Path relative to the base URL
        path: String,

        /// Query parameter as key=value (repeatable)
        #[arg(short, long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,

        /// Sort expression
        #[arg(long)]
        sort_by: Option<String>,

        /// Results per page
        #[arg(long)]
        page_size: Option<u32>,

        /// Stop after this many items
        #[arg(long)]
        limit: Option<usize>,

        /// Dotted path to the results array
        #[arg(long, default_value = "results")]
        results_path: String,

        /// Dotted path to the next cursor
        #[arg(long, default_value = "header.nextCursor")]
        cursor_path: String,
    },
}

/// Parse a `key=value` pair
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("invalid key=value pair: '{s}'")),
    }
}
