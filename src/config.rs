//! Configuration management

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::assertion::signer::SignatureDigest;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP listener configuration
    pub server: ServerConfig,
    /// Proxy identity and signing configuration
    pub proxy: ProxyConfig,
    /// CA trust sources for the relying-party key fetch
    pub trust: TrustConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8444,
        }
    }
}

/// Proxy identity and signing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Base URI of the deployed proxy. Relying parties fetch the public key
    /// from `<base_uri>pubkey.pem`, so this must end with a slash.
    pub base_uri: String,

    /// Trusted issuer DN prefix. An assertion is rejected unless its
    /// `issuer_dn` starts with this exact, case-sensitive string.
    pub issuer_dn_prefix: String,

    /// Digest used for RSA signing (`sha256` default, `sha1` for legacy
    /// verifiers). A deployment constant: the verifier must be configured
    /// with the same digest.
    pub digest: SignatureDigest,

    /// Path to the PEM-encoded private signing key. Absence triggers
    /// generation on startup.
    pub key_path: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            base_uri: "https://localhost:8444/cert_auth/".to_string(),
            issuer_dn_prefix:
                "/C=US/ST=Massachusetts/O=Massachusetts Institute of Technology/OU=Client"
                    .to_string(),
            digest: SignatureDigest::default(),
            key_path: "config/signkey.priv".to_string(),
        }
    }
}

/// CA trust sources used by the relying-party key fetch, tried in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Bundled CA certificate files, tried in listed order before the
    /// system trust store. Deployments behind a private CA put its bundle
    /// first.
    pub ca_bundles: Vec<String>,
    /// Whether to fall back to the host's default trust store after the
    /// bundled CA files.
    pub system_roots: bool,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            ca_bundles: vec![
                "ca/scripts-ca.pem".to_string(),
                "ca/issuer-ca.crt".to_string(),
            ],
            system_roots: true,
        }
    }
}

impl Config {
    /// Load configuration from an optional YAML file plus `CERT_PROXY_`
    /// environment variable overrides (nested keys split on `__`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("CERT_PROXY_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let base = Url::parse(&self.proxy.base_uri)
            .map_err(|e| Error::Config(format!("proxy.base_uri is not a valid URL: {e}")))?;
        if !base.path().ends_with('/') {
            return Err(Error::Config(
                "proxy.base_uri must end with a slash so pubkey.pem resolves under it"
                    .to_string(),
            ));
        }
        if self.proxy.issuer_dn_prefix.is_empty() {
            return Err(Error::Config(
                "proxy.issuer_dn_prefix must not be empty".to_string(),
            ));
        }
        if self.proxy.key_path.is_empty() {
            return Err(Error::Config("proxy.key_path must not be empty".to_string()));
        }
        Ok(())
    }

    /// The parsed proxy base URI.
    ///
    /// Infallible after [`Config::validate`]; callers holding an unvalidated
    /// config get the error surfaced here instead.
    pub fn base_uri(&self) -> Result<Url> {
        Url::parse(&self.proxy.base_uri)
            .map_err(|e| Error::Config(format!("proxy.base_uri is not a valid URL: {e}")))
    }
}
