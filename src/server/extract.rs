//! TLS attribute extraction from front-end headers.
//!
//! The web front end terminates the mutually-authenticated TLS connection
//! and forwards the handshake's environment variables (`SSL_CLIENT_S_DN`
//! and friends) as request headers. Only the fixed set of known headers is
//! translated; anything else the front end forwards is ignored and can
//! therefore never end up inside a signed assertion.

use axum::http::HeaderMap;

use crate::assertion::AuthAttributes;

/// Translate forwarded TLS environment headers into an attribute record.
///
/// Accepts both the hyphenated form proxies emit on the wire and the raw
/// underscore form of the original environment variable names.
#[must_use]
pub fn attributes_from_headers(headers: &HeaderMap) -> AuthAttributes {
    let take = |hyphenated: &str, raw: &str| {
        header_str(headers, hyphenated)
            .or_else(|| header_str(headers, raw))
            .map(str::to_owned)
    };

    AuthAttributes {
        dn: take("ssl-client-s-dn", "ssl_client_s_dn"),
        issuer_dn: take("ssl-client-i-dn", "ssl_client_i_dn"),
        serial: take("ssl-client-m-serial", "ssl_client_m_serial"),
        valid_from: take("ssl-client-v-start", "ssl_client_v_start"),
        valid_until: take("ssl-client-v-end", "ssl_client_v_end"),
        verify: take("ssl-client-verify", "ssl_client_verify"),
        ssl_sig: take("ssl-client-a-sig", "ssl_client_a_sig"),
        protocol: take("ssl-protocol", "ssl_protocol"),
        cipher: take("ssl-cipher", "ssl_cipher"),
        nonce: None,
        signature: None,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
