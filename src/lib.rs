//! Certificate Authentication Proxy
//!
//! Turns attributes extracted from a client's mutually-authenticated TLS
//! handshake into a signed assertion that a relying party can verify without
//! terminating TLS itself or trusting the web front end.
//!
//! # Components
//!
//! - **KeyStore**: RSA signing keypair lifecycle — generate, persist with
//!   owner-only permissions, rotate by deletion
//! - **Assertion protocol**: canonical byte-exact signing input, RSA
//!   signatures, ordered policy checks, pinned-TLS public-key fetch with
//!   multi-source CA fallback
//! - **HTTP surface**: `/auth`, `/auth.json`, `/pubkey.pem`, `/pubkey.json`
//!
//! # Protocol version
//!
//! Version 2: flat query keys (`dn=...`, not `auth[dn]=...`) and SHA-256 as
//! the default signing digest. SHA-1 remains available through configuration
//! for legacy verifiers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod assertion;
pub mod cli;
pub mod config;
pub mod error;
pub mod keystore;
pub mod server;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Assertion protocol version implemented by this proxy
pub const PROTOCOL_VERSION: u32 = 2;

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
