//! Canonical byte form of an assertion — the signing and verification input.
//!
//! Signature interop depends on byte-exact reproduction across processes and
//! implementations, so the rules are fixed: take every present field except
//! `signature` as a `(name, value)` pair, sort the pairs lexicographically
//! (name first, value as tie-break), then join all names and values with a
//! single `\n`. `{dn: "x", nonce: "N"}` canonicalizes to `"dn\nx\nnonce\nN"`.

use super::AuthAttributes;

/// Compute the deterministic blob an assertion's signature covers.
///
/// Pure function: identical field sets produce identical bytes regardless of
/// how the record was populated or serialized in between.
#[must_use]
pub fn canonical_blob(attrs: &AuthAttributes) -> String {
    let mut pairs: Vec<(&str, &str)> = attrs
        .fields()
        .into_iter()
        .filter(|(name, _)| *name != "signature")
        .collect();
    pairs.sort_unstable();

    let parts: Vec<&str> = pairs.into_iter().flat_map(|(name, value)| [name, value]).collect();
    parts.join("\n")
}
