//! Assertion verification — the relying party's policy checks.
//!
//! Checks run in a fixed order and every failure collapses to the single
//! [`Error::Rejected`]. The caller never learns which check tripped; telling
//! an adversary which check is closest to passing is an oracle.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rsa::RsaPublicKey;
use rsa::sha2::Sha256;
use rsa::signature::Verifier as _;
use sha1::Sha1;
use tracing::{debug, warn};

use super::canonical::canonical_blob;
use super::fetch::{SigningKeyFetcher, trust_sources};
use super::signer::SignatureDigest;
use super::{AuthAttributes, IdentityRecord, dn_segment};
use crate::config::Config;
use crate::{Error, Result};

/// The literal marker the front end sets when the TLS handshake verified
/// the client certificate.
pub const VERIFY_SUCCESS: &str = "SUCCESS";

/// Verifies assertions against the proxy's public key and policy.
pub struct Verifier {
    issuer_dn_prefix: String,
    digest: SignatureDigest,
    fetcher: Arc<SigningKeyFetcher>,
}

impl Verifier {
    /// Create a verifier.
    ///
    /// `digest` must match the proxy's configured signing digest;
    /// `issuer_dn_prefix` is the exact, case-sensitive prefix every accepted
    /// certificate's issuer DN must carry.
    #[must_use]
    pub fn new(
        issuer_dn_prefix: impl Into<String>,
        digest: SignatureDigest,
        fetcher: Arc<SigningKeyFetcher>,
    ) -> Self {
        Self {
            issuer_dn_prefix: issuer_dn_prefix.into(),
            digest,
            fetcher,
        }
    }

    /// Build a verifier for the proxy named in `config`.
    ///
    /// The signing key is fetched lazily from `<base_uri>pubkey.pem` over
    /// TLS pinned to the configured trust sources.
    pub fn from_config(config: &Config) -> Result<Self> {
        let sources = trust_sources(&config.trust.ca_bundles, config.trust.system_roots);
        let fetcher = SigningKeyFetcher::new(&config.base_uri()?, sources)?;
        Ok(Self::new(
            config.proxy.issuer_dn_prefix.clone(),
            config.proxy.digest,
            Arc::new(fetcher),
        ))
    }

    /// Apply the policy checks to a signed assertion.
    ///
    /// Returns the decoded [`IdentityRecord`] on acceptance. Every policy
    /// failure — missing fields, expired certificate, wrong issuer, bad
    /// signature, even an unreachable signing key — returns the same
    /// undifferentiated [`Error::Rejected`].
    pub async fn verify(&self, attrs: &AuthAttributes) -> Result<IdentityRecord> {
        self.verify_at(attrs, Utc::now()).await
    }

    /// [`Verifier::verify`] with an explicit "now", so the time-window check
    /// is testable without clock games.
    pub async fn verify_at(
        &self,
        attrs: &AuthAttributes,
        now: DateTime<Utc>,
    ) -> Result<IdentityRecord> {
        // Step 1: TLS handshake status.
        if attrs.verify.as_deref() != Some(VERIFY_SUCCESS) {
            return Err(Error::Rejected);
        }

        // Step 2: every required field present.
        if !has_required_fields(attrs) {
            return Err(Error::Rejected);
        }

        // Step 3: certificate validity window, boundaries inclusive.
        let (Some(from), Some(until)) = (
            attrs.valid_from.as_deref().and_then(parse_timestamp),
            attrs.valid_until.as_deref().and_then(parse_timestamp),
        ) else {
            return Err(Error::Rejected);
        };
        if now < from || now > until {
            return Err(Error::Rejected);
        }

        // Step 4: issuer DN prefix, case-sensitive.
        let issuer_dn = attrs.issuer_dn.as_deref().unwrap_or_default();
        if !issuer_dn.starts_with(&self.issuer_dn_prefix) {
            return Err(Error::Rejected);
        }

        // Step 5: signature over the recomputed canonical blob.
        if !self.signature_verifies(attrs).await {
            return Err(Error::Rejected);
        }

        // CRL verification would happen here.

        // Blacklist checking would happen here.

        decode_identity(attrs).ok_or(Error::Rejected)
    }

    /// Check the assertion's signature against the fetched public key.
    async fn signature_verifies(&self, attrs: &AuthAttributes) -> bool {
        let key = match self.fetcher.signing_key().await {
            Ok(key) => key,
            Err(e) => {
                // An unreachable key is an operational failure, but to the
                // remote caller it is still just a rejection.
                warn!(error = %e, "Cannot obtain proxy signing key");
                return false;
            }
        };

        let Some(encoded) = attrs.signature.as_deref() else {
            return false;
        };
        let Ok(raw) = BASE64.decode(encoded) else {
            debug!("Signature field is not valid base64");
            return false;
        };

        let blob = canonical_blob(attrs);
        verify_signature(key, self.digest, blob.as_bytes(), &raw)
    }
}

/// Fields an assertion must carry to be considered at all.
const REQUIRED_FIELDS: [&str; 10] = [
    "cipher",
    "dn",
    "issuer_dn",
    "nonce",
    "protocol",
    "serial",
    "signature",
    "ssl_sig",
    "valid_from",
    "valid_until",
];

fn has_required_fields(attrs: &AuthAttributes) -> bool {
    let present: Vec<&str> = attrs.fields().into_iter().map(|(name, _)| name).collect();
    REQUIRED_FIELDS.iter().all(|field| present.contains(field))
}

/// Raw RSA PKCS#1 v1.5 verification with the configured digest.
fn verify_signature(
    key: &RsaPublicKey,
    digest: SignatureDigest,
    message: &[u8],
    raw_signature: &[u8],
) -> bool {
    let Ok(signature) = rsa::pkcs1v15::Signature::try_from(raw_signature) else {
        return false;
    };
    match digest {
        SignatureDigest::Sha256 => rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key.clone())
            .verify(message, &signature)
            .is_ok(),
        SignatureDigest::Sha1 => rsa::pkcs1v15::VerifyingKey::<Sha1>::new(key.clone())
            .verify(message, &signature)
            .is_ok(),
    }
}

/// Parse a certificate validity timestamp.
///
/// Accepts the formats the deployed stack emits: RFC 3339, the OpenSSL
/// environment-variable form (`May 18 22:31:40 2009 GMT`), and the
/// UTC-to-string form older proxies produced (`2009-05-18 22:31:40 UTC`).
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%b %e %H:%M:%S %Y GMT", "%Y-%m-%d %H:%M:%S UTC"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Extract the caller-facing identity from an accepted assertion.
///
/// Only called after every policy check passed; callers outside this module
/// go through [`Verifier::verify`] so the checks cannot be skipped.
fn decode_identity(attrs: &AuthAttributes) -> Option<IdentityRecord> {
    let dn = attrs.dn.as_deref()?;
    let nonce = attrs.nonce.clone()?;
    Some(IdentityRecord {
        name: dn_segment(dn, "CN"),
        email: dn_segment(dn, "emailAddress"),
        nonce,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::assertion::signer::{Signer, tests::test_key};

    const ISSUER_PREFIX: &str =
        "/C=US/ST=Massachusetts/O=Massachusetts Institute of Technology/OU=Client";

    /// A complete, correctly signed assertion valid around `Utc::now()`.
    fn signed_assertion(nonce: &str) -> AuthAttributes {
        let now = Utc::now();
        let mut attrs = AuthAttributes {
            dn: Some(format!(
                "{ISSUER_PREFIX} CA v1/CN=Jane Doe/emailAddress=jane@example.com"
            )),
            issuer_dn: Some(format!("{ISSUER_PREFIX} CA v1")),
            verify: Some(VERIFY_SUCCESS.to_string()),
            serial: Some("D376EC2AE81A03E10743D175CB659F58".to_string()),
            nonce: Some(nonce.to_string()),
            valid_from: Some((now - Duration::seconds(120)).to_rfc3339()),
            valid_until: Some((now + Duration::seconds(120)).to_rfc3339()),
            cipher: Some("TLS_AES_256_GCM_SHA384".to_string()),
            protocol: Some("TLSv1.3".to_string()),
            ssl_sig: Some("sha256WithRSAEncryption".to_string()),
            signature: None,
        };
        Signer::new(test_key().clone(), SignatureDigest::Sha256).sign(&mut attrs);
        attrs
    }

    fn verifier() -> Verifier {
        let fetcher = Arc::new(SigningKeyFetcher::with_key(test_key().to_public_key()));
        Verifier::new(ISSUER_PREFIX, SignatureDigest::Sha256, fetcher)
    }

    #[tokio::test]
    async fn valid_assertion_decodes_to_identity() {
        let attrs = signed_assertion("fresh-nonce");

        let identity = verifier().verify(&attrs).await.unwrap();

        assert_eq!(identity.name.as_deref(), Some("Jane Doe"));
        assert_eq!(identity.email.as_deref(), Some("jane@example.com"));
        assert_eq!(identity.nonce, "fresh-nonce");
    }

    #[tokio::test]
    async fn handshake_failure_marker_rejects() {
        let mut attrs = signed_assertion("N");
        attrs.verify = Some("NONE".to_string());

        assert!(matches!(
            verifier().verify(&attrs).await,
            Err(Error::Rejected)
        ));
    }

    #[tokio::test]
    async fn each_missing_required_field_rejects() {
        // Removing any one required field alone must reject, even though
        // the signature was valid when it was produced.
        let strip: [fn(&mut AuthAttributes); 10] = [
            |a| a.cipher = None,
            |a| a.dn = None,
            |a| a.issuer_dn = None,
            |a| a.nonce = None,
            |a| a.protocol = None,
            |a| a.serial = None,
            |a| a.signature = None,
            |a| a.ssl_sig = None,
            |a| a.valid_from = None,
            |a| a.valid_until = None,
        ];

        for remove in strip {
            let mut attrs = signed_assertion("N");
            remove(&mut attrs);
            assert!(
                matches!(verifier().verify(&attrs).await, Err(Error::Rejected)),
                "assertion with a stripped field must be rejected"
            );
        }
    }

    #[tokio::test]
    async fn expired_certificate_rejects_despite_valid_signature() {
        // GIVEN: an assertion whose window closed one second ago, re-signed
        // so the signature itself is valid
        let mut attrs = signed_assertion("N");
        attrs.valid_until = Some((Utc::now() - Duration::seconds(1)).to_rfc3339());
        attrs.signature = None;
        Signer::new(test_key().clone(), SignatureDigest::Sha256).sign(&mut attrs);

        assert!(matches!(
            verifier().verify(&attrs).await,
            Err(Error::Rejected)
        ));
    }

    #[tokio::test]
    async fn not_yet_valid_certificate_rejects() {
        let mut attrs = signed_assertion("N");
        attrs.valid_from = Some((Utc::now() + Duration::seconds(60)).to_rfc3339());
        attrs.signature = None;
        Signer::new(test_key().clone(), SignatureDigest::Sha256).sign(&mut attrs);

        assert!(matches!(
            verifier().verify(&attrs).await,
            Err(Error::Rejected)
        ));
    }

    #[tokio::test]
    async fn window_boundaries_are_inclusive() {
        let now = Utc::now();
        let mut attrs = signed_assertion("N");
        attrs.valid_from = Some(now.to_rfc3339());
        attrs.valid_until = Some(now.to_rfc3339());
        attrs.signature = None;
        Signer::new(test_key().clone(), SignatureDigest::Sha256).sign(&mut attrs);

        assert!(verifier().verify_at(&attrs, now).await.is_ok());
    }

    #[tokio::test]
    async fn wrong_issuer_prefix_rejects() {
        let mut attrs = signed_assertion("N");
        attrs.issuer_dn = Some("/C=US/O=Some Other University/OU=Client CA v1".to_string());
        attrs.signature = None;
        Signer::new(test_key().clone(), SignatureDigest::Sha256).sign(&mut attrs);

        assert!(matches!(
            verifier().verify(&attrs).await,
            Err(Error::Rejected)
        ));
    }

    #[tokio::test]
    async fn issuer_prefix_match_is_case_sensitive() {
        let mut attrs = signed_assertion("N");
        attrs.issuer_dn = Some(ISSUER_PREFIX.to_lowercase());
        attrs.signature = None;
        Signer::new(test_key().clone(), SignatureDigest::Sha256).sign(&mut attrs);

        assert!(matches!(
            verifier().verify(&attrs).await,
            Err(Error::Rejected)
        ));
    }

    #[tokio::test]
    async fn any_tampered_field_invalidates_the_signature() {
        let mutations: [fn(&mut AuthAttributes); 5] = [
            |a| a.dn = Some("/CN=Mallory/emailAddress=mallory@evil.test".to_string()),
            |a| a.nonce = Some("replayed".to_string()),
            |a| a.serial = Some("00".to_string()),
            |a| a.cipher = Some("NULL-MD5".to_string()),
            |a| a.signature = Some(BASE64.encode([0u8; 256])),
        ];

        for tamper in mutations {
            let mut attrs = signed_assertion("N");
            tamper(&mut attrs);
            assert!(
                matches!(verifier().verify(&attrs).await, Err(Error::Rejected)),
                "tampered assertion must be rejected"
            );
        }
    }

    #[tokio::test]
    async fn signature_from_a_different_key_rejects() {
        // GIVEN: an assertion signed by some other keypair
        let mut attrs = signed_assertion("N");
        let other = rsa::RsaPrivateKey::new(&mut rsa::rand_core::OsRng, 2048).unwrap();
        attrs.signature = None;
        Signer::new(other, SignatureDigest::Sha256).sign(&mut attrs);

        assert!(matches!(
            verifier().verify(&attrs).await,
            Err(Error::Rejected)
        ));
    }

    #[tokio::test]
    async fn digest_mismatch_rejects() {
        // Signed with SHA-1, verified with a SHA-256 verifier.
        let mut attrs = signed_assertion("N");
        attrs.signature = None;
        Signer::new(test_key().clone(), SignatureDigest::Sha1).sign(&mut attrs);

        assert!(matches!(
            verifier().verify(&attrs).await,
            Err(Error::Rejected)
        ));
    }

    #[tokio::test]
    async fn garbage_base64_signature_rejects() {
        let mut attrs = signed_assertion("N");
        attrs.signature = Some("!!! not base64 !!!".to_string());

        assert!(matches!(
            verifier().verify(&attrs).await,
            Err(Error::Rejected)
        ));
    }

    #[tokio::test]
    async fn unreachable_signing_key_is_a_rejection_not_a_crash() {
        // GIVEN: a verifier whose fetcher has no key and no sources
        let base = url::Url::parse("https://localhost:1/cert_auth/").unwrap();
        let fetcher = Arc::new(SigningKeyFetcher::new(&base, Vec::new()).unwrap());
        let verifier = Verifier::new(ISSUER_PREFIX, SignatureDigest::Sha256, fetcher);

        let attrs = signed_assertion("N");
        assert!(matches!(verifier.verify(&attrs).await, Err(Error::Rejected)));
    }

    #[test]
    fn from_config_builds_with_defaults() {
        let config = Config::default();
        assert!(Verifier::from_config(&config).is_ok());
    }

    #[test]
    fn parse_timestamp_accepts_deployed_formats() {
        for input in [
            "2009-05-18T22:31:40+00:00",
            "May 18 22:31:40 2009 GMT",
            "May  8 09:01:02 2009 GMT",
            "2009-05-18 22:31:40 UTC",
        ] {
            assert!(parse_timestamp(input).is_some(), "should parse: {input}");
        }
        assert!(parse_timestamp("yesterday-ish").is_none());
    }

    #[test]
    fn sha1_round_trip_verifies_with_matching_digest() {
        let mut attrs = AuthAttributes {
            dn: Some("/CN=Jane".to_string()),
            nonce: Some("N".to_string()),
            ..AuthAttributes::default()
        };
        Signer::new(test_key().clone(), SignatureDigest::Sha1).sign(&mut attrs);

        let raw = BASE64.decode(attrs.signature.as_deref().unwrap()).unwrap();
        let blob = canonical_blob(&attrs);
        assert!(verify_signature(
            &test_key().to_public_key(),
            SignatureDigest::Sha1,
            blob.as_bytes(),
            &raw
        ));
    }
}
