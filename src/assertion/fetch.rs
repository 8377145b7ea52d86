//! Pinned-TLS fetch of the proxy's public signing key.
//!
//! A relying party does not trust its own front end to hand it the proxy's
//! key; it fetches `pubkey.pem` over a TLS connection pinned to an ordered
//! list of CA trust sources. Bundled CA files come first (the proxy's
//! issuing path is often a private CA the host trust store does not know),
//! the host's default trust store last. A source that fails the handshake
//! falls through to the next; exhaustion is [`Error::NoTrustedKey`].
//!
//! The first successful fetch is cached for the process lifetime — a
//! restart is required to pick up a rotated proxy key.

use std::fs;
use std::path::PathBuf;

use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use crate::{Error, Result};

/// One CA trust source for the pinned fetch.
#[derive(Debug, Clone)]
pub enum TrustSource {
    /// A bundled CA certificate file; built-in roots are disabled when this
    /// source is in use, so only certificates chaining to this bundle pass.
    CaBundle(PathBuf),
    /// The host's default trust store.
    SystemRoots,
}

/// Fetches and caches the proxy's public signing key.
///
/// An explicit, constructible service rather than process-global state.
/// The `OnceCell` gives single-flight semantics: concurrent callers before
/// the first successful fetch coordinate on one network round trip, and
/// every later call is a lock-free read of the cached key.
#[derive(Debug)]
pub struct SigningKeyFetcher {
    pubkey_url: Option<Url>,
    sources: Vec<TrustSource>,
    cached: OnceCell<RsaPublicKey>,
}

impl SigningKeyFetcher {
    /// Create a fetcher for the proxy at `base_uri`, trying `sources` in
    /// order.
    pub fn new(base_uri: &Url, sources: Vec<TrustSource>) -> Result<Self> {
        let pubkey_url = base_uri.join("pubkey.pem")?;
        Ok(Self {
            pubkey_url: Some(pubkey_url),
            sources,
            cached: OnceCell::new(),
        })
    }

    /// A fetcher pre-populated with a known public key. No network access
    /// will ever happen; used when the relying party was handed the key out
    /// of band, and by tests.
    #[must_use]
    pub fn with_key(key: RsaPublicKey) -> Self {
        Self {
            pubkey_url: None,
            sources: Vec::new(),
            cached: OnceCell::new_with(Some(key)),
        }
    }

    /// The proxy's public signing key, fetching it on first use.
    pub async fn signing_key(&self) -> Result<&RsaPublicKey> {
        self.cached.get_or_try_init(|| self.fetch()).await
    }

    /// Try each trust source in order until one yields a key.
    async fn fetch(&self) -> Result<RsaPublicKey> {
        let Some(url) = &self.pubkey_url else {
            return Err(Error::NoTrustedKey);
        };

        for source in &self.sources {
            match self.fetch_with_source(url, source).await {
                Ok(key) => {
                    info!(%url, ?source, "Fetched proxy signing key");
                    return Ok(key);
                }
                Err(e) => {
                    debug!(%url, ?source, error = %e, "Trust source failed, trying next");
                }
            }
        }

        Err(Error::NoTrustedKey)
    }

    /// Fetch the key over TLS pinned to a single trust source.
    async fn fetch_with_source(&self, url: &Url, source: &TrustSource) -> Result<RsaPublicKey> {
        let client = match source {
            TrustSource::CaBundle(path) => {
                let pem = fs::read(path)?;
                let certs = reqwest::Certificate::from_pem_bundle(&pem)?;
                reqwest::Client::builder().tls_certs_only(certs).build()?
            }
            TrustSource::SystemRoots => reqwest::Client::new(),
        };

        let body = client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        RsaPublicKey::from_public_key_pem(body.trim())
            .map_err(|e| Error::KeyParse(e.to_string()))
    }
}

/// Build the ordered trust-source list from configuration: bundled CA files
/// first, system roots last when enabled.
#[must_use]
pub fn trust_sources(ca_bundles: &[String], system_roots: bool) -> Vec<TrustSource> {
    let mut sources: Vec<TrustSource> = ca_bundles
        .iter()
        .map(|path| TrustSource::CaBundle(PathBuf::from(path)))
        .collect();
    if system_roots {
        sources.push(TrustSource::SystemRoots);
    }
    sources
}
