//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Certificate authentication proxy - signed assertions from client-certificate TLS
#[derive(Parser, Debug)]
#[command(name = "cert-auth-proxy")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "CERT_PROXY_CONFIG_FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "CERT_PROXY_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "CERT_PROXY_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "CERT_PROXY_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "CERT_PROXY_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the proxy server (default)
    Serve,

    /// Signing-key management commands
    #[command(subcommand)]
    Key(KeyCommand),
}

/// Signing-key subcommands
#[derive(Subcommand, Debug)]
pub enum KeyCommand {
    /// Print the public half of the signing key as PEM
    Show,

    /// Delete the persisted key and generate a fresh one
    Rotate,
}
