//! Assertion signing, nonce generation, and redirect-URL construction.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngExt;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::sha2::Sha256;
use rsa::signature::{SignatureEncoding, Signer as _};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use url::Url;

use super::AuthAttributes;
use super::canonical::canonical_blob;
use crate::{Error, Result};

/// Digest used in the RSA PKCS#1 v1.5 signature scheme.
///
/// A configuration option, not a hidden constant: the assertion must
/// interoperate with whichever digest the deployment's verifiers expect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureDigest {
    /// SHA-256 (protocol version 2 default)
    #[default]
    Sha256,
    /// SHA-1, for legacy verifiers only
    Sha1,
}

/// Signs assertions with the proxy's private key.
#[derive(Debug, Clone)]
pub struct Signer {
    key: RsaPrivateKey,
    digest: SignatureDigest,
}

impl Signer {
    /// Create a signer from the proxy's private key and configured digest.
    #[must_use]
    pub fn new(key: RsaPrivateKey, digest: SignatureDigest) -> Self {
        Self { key, digest }
    }

    /// Sign the attributes in place: compute the canonical blob, sign it,
    /// and store the base64 signature under the `signature` field.
    ///
    /// Deterministic per (key, digest, field set) — PKCS#1 v1.5 signing has
    /// no randomness.
    pub fn sign(&self, attrs: &mut AuthAttributes) {
        let blob = canonical_blob(attrs);
        let raw = match self.digest {
            SignatureDigest::Sha256 => rsa::pkcs1v15::SigningKey::<Sha256>::new(self.key.clone())
                .sign(blob.as_bytes())
                .to_vec(),
            SignatureDigest::Sha1 => rsa::pkcs1v15::SigningKey::<Sha1>::new(self.key.clone())
                .sign(blob.as_bytes())
                .to_vec(),
        };
        attrs.signature = Some(BASE64.encode(raw));
    }

    /// The public half of the signing key.
    #[must_use]
    pub fn public_key(&self) -> RsaPublicKey {
        self.key.to_public_key()
    }

    /// The public half as a PEM (SPKI) string, served at `pubkey.pem`.
    pub fn public_key_pem(&self) -> Result<String> {
        self.public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| Error::Crypto(e.to_string()))
    }
}

/// A random nonce for invoking the authentication service.
///
/// Base64 of 16 bytes from the process CSPRNG. The nonce is included in the
/// signed assertion; tracking consumed nonces for replay protection is the
/// relying party's job.
#[must_use]
pub fn random_nonce() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    BASE64.encode(bytes)
}

/// Append a signed assertion's fields to `base_url` as query parameters.
///
/// Keys are flat (`dn=...`, protocol version 2), keys and values are
/// percent-encoded, and the encoded `key=value` pairs are sorted before
/// joining. The sort exists solely to make output deterministic for testing
/// and caching.
pub fn redirect_url(base_url: &str, attrs: &AuthAttributes) -> Result<Url> {
    let mut url = Url::parse(base_url)?;

    let mut encoded: Vec<String> = attrs
        .fields()
        .into_iter()
        .map(|(name, value)| {
            url::form_urlencoded::Serializer::new(String::new())
                .append_pair(name, value)
                .finish()
        })
        .collect();
    encoded.sort_unstable();
    let appended = encoded.join("&");

    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{appended}"),
        _ => appended,
    };
    url.set_query(Some(&query));
    Ok(url)
}

/// An URL to the authentication service that results in an HTTP redirect
/// carrying the signed assertion. Most useful in iframes.
pub fn auth_url_redirecting_to(base_uri: &Url, redirect_to: &str, nonce: &str) -> Result<Url> {
    let mut url = base_uri.join("auth")?;
    url.query_pairs_mut()
        .append_pair("redirect_to", redirect_to)
        .append_pair("nonce", nonce);
    Ok(url)
}

/// An URL to the authentication service that returns JSONP. Most useful in
/// `<script>` tags.
pub fn auth_url_calling(base_uri: &Url, callback: &str, nonce: &str) -> Result<Url> {
    let mut url = base_uri.join("auth.json")?;
    url.query_pairs_mut()
        .append_pair("callback", callback)
        .append_pair("nonce", nonce);
    Ok(url)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::OnceLock;

    use rsa::rand_core::OsRng;

    /// One shared test key: RSA generation dominates test runtime otherwise.
    pub(crate) fn test_key() -> &'static RsaPrivateKey {
        static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 2048).unwrap())
    }

    fn sample_attrs() -> AuthAttributes {
        AuthAttributes {
            dn: Some("/CN=Jane Doe/emailAddress=jane@example.com".to_string()),
            nonce: Some("N".to_string()),
            ..AuthAttributes::default()
        }
    }

    #[test]
    fn sign_sets_a_base64_signature() {
        let signer = Signer::new(test_key().clone(), SignatureDigest::Sha256);
        let mut attrs = sample_attrs();

        signer.sign(&mut attrs);

        let sig = attrs.signature.as_deref().unwrap();
        // RSA-2048 signatures are 256 bytes
        assert_eq!(BASE64.decode(sig).unwrap().len(), 256);
    }

    #[test]
    fn signing_is_deterministic_per_key_and_fields() {
        let signer = Signer::new(test_key().clone(), SignatureDigest::Sha256);
        let mut a = sample_attrs();
        let mut b = sample_attrs();

        signer.sign(&mut a);
        signer.sign(&mut b);

        assert_eq!(a.signature, b.signature);
    }

    #[test]
    fn sha1_and_sha256_signatures_differ() {
        let mut a = sample_attrs();
        let mut b = sample_attrs();

        Signer::new(test_key().clone(), SignatureDigest::Sha256).sign(&mut a);
        Signer::new(test_key().clone(), SignatureDigest::Sha1).sign(&mut b);

        assert_ne!(a.signature, b.signature);
    }

    #[test]
    fn public_key_pem_has_spki_header() {
        let signer = Signer::new(test_key().clone(), SignatureDigest::Sha256);
        let pem = signer.public_key_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
    }

    #[test]
    fn random_nonces_are_distinct() {
        // 1000 draws of 128 random bits must not collide
        let nonces: HashSet<String> = (0..1000).map(|_| random_nonce()).collect();
        assert_eq!(nonces.len(), 1000);
    }

    #[test]
    fn redirect_url_sorts_and_percent_encodes() {
        // GIVEN: a signed-ish record with characters needing escaping
        let attrs = AuthAttributes {
            dn: Some("/CN=Jane/emailAddress=costan@mit.edu".to_string()),
            nonce: Some("N".to_string()),
            signature: Some("c2ln+/=".to_string()),
            ..AuthAttributes::default()
        };

        // WHEN: building the redirect URL
        let url = redirect_url("http://example.com/auth", &attrs).unwrap();

        // THEN: keys sorted, reserved characters escaped
        assert_eq!(
            url.as_str(),
            "http://example.com/auth?dn=%2FCN%3DJane%2FemailAddress%3Dcostan%40mit.edu&nonce=N&signature=c2ln%2B%2F%3D"
        );
    }

    #[test]
    fn redirect_url_appends_to_existing_query() {
        let attrs = AuthAttributes {
            nonce: Some("N".to_string()),
            ..AuthAttributes::default()
        };
        let url = redirect_url("http://example.com/auth?app=1", &attrs).unwrap();
        assert_eq!(url.as_str(), "http://example.com/auth?app=1&nonce=N");
    }

    #[test]
    fn redirect_url_rejects_invalid_base() {
        let result = redirect_url("::not a url::", &AuthAttributes::default());
        assert!(matches!(result, Err(Error::Url(_))));
    }

    #[test]
    fn auth_urls_resolve_under_the_base_uri() {
        let base = Url::parse("https://proxy.example.com:8444/cert_auth/").unwrap();

        let redirecting =
            auth_url_redirecting_to(&base, "http://app.example.com/login", "N").unwrap();
        assert_eq!(
            redirecting.as_str(),
            "https://proxy.example.com:8444/cert_auth/auth?redirect_to=http%3A%2F%2Fapp.example.com%2Flogin&nonce=N"
        );

        let calling = auth_url_calling(&base, "onAuth", "N").unwrap();
        assert_eq!(
            calling.as_str(),
            "https://proxy.example.com:8444/cert_auth/auth.json?callback=onAuth&nonce=N"
        );
    }
}
