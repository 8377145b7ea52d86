//! Authentication assertions — the attribute record, its canonical byte
//! form, signing, verification, and the pinned-TLS public-key fetch.
//!
//! An assertion starts as TLS session attributes extracted by the web front
//! end, gains a `nonce` before signing and a `signature` after, and is then
//! either accepted or rejected by a relying party. Verification is a pure
//! predicate: an assertion never remembers its own outcome.

pub mod canonical;
pub mod fetch;
pub mod signer;
pub mod verifier;

use serde::{Deserialize, Serialize};

pub use canonical::canonical_blob;
pub use fetch::{SigningKeyFetcher, TrustSource};
pub use signer::{SignatureDigest, Signer, random_nonce, redirect_url};
pub use verifier::Verifier;

/// TLS session and protocol attributes carried by an assertion.
///
/// A structured record rather than a free-form map: inbound fields the
/// record does not name are dropped before signing, so an attacker cannot
/// smuggle extra signed fields through the front end. Absent fields are
/// omitted from JSON output and from the canonical blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthAttributes {
    /// Client certificate subject DN
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dn: Option<String>,
    /// Client certificate issuer DN
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer_dn: Option<String>,
    /// Client certificate serial number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    /// Start of the certificate validity window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<String>,
    /// End of the certificate validity window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,
    /// TLS handshake verification result (`SUCCESS` marker on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<String>,
    /// Signature algorithm of the client certificate itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_sig: Option<String>,
    /// Negotiated TLS protocol version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Negotiated cipher suite
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher: Option<String>,
    /// Caller-supplied freshness nonce, added before signing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Base64 RSA signature over the canonical blob, added by signing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl AuthAttributes {
    /// All present fields as `(name, value)` pairs, in declaration order.
    ///
    /// Includes `signature` when set; [`canonical_blob`] excludes it itself.
    #[must_use]
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        let named: [(&'static str, &Option<String>); 11] = [
            ("dn", &self.dn),
            ("issuer_dn", &self.issuer_dn),
            ("serial", &self.serial),
            ("valid_from", &self.valid_from),
            ("valid_until", &self.valid_until),
            ("verify", &self.verify),
            ("ssl_sig", &self.ssl_sig),
            ("protocol", &self.protocol),
            ("cipher", &self.cipher),
            ("nonce", &self.nonce),
            ("signature", &self.signature),
        ];
        named
            .into_iter()
            .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
            .collect()
    }
}

/// The decoded output of a successfully verified assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Full name from the certificate subject's `CN` segment
    pub name: Option<String>,
    /// E-mail address from the subject's `emailAddress` segment
    pub email: Option<String>,
    /// The assertion's nonce; the relying party checks it for freshness
    pub nonce: String,
}

/// Parse a `/key=value/key=value...` distinguished name into its segments,
/// returning the value for `wanted` if present.
#[must_use]
pub fn dn_segment(dn: &str, wanted: &str) -> Option<String> {
    dn.split('/')
        .filter(|segment| !segment.is_empty())
        .filter_map(|segment| segment.split_once('='))
        .find(|(key, _)| *key == wanted)
        .map(|(_, value)| value.to_string())
}
