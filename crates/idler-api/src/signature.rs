//! Webhook signature and shared-secret checks.
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "sha256";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,

    #[error("malformed signature header")]
    Malformed,

    #[error("unsupported signature algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("signature is not valid hex")]
    InvalidHex,

    #[error("signature mismatch")]
    Mismatch,
}

/// Check an `X-Hub-Signature-256` value (`sha256=<hex>`) against HMAC-SHA256 of `body`.
///
/// The digest comparison is constant time.
pub fn verify_signature(
    secret: &[u8],
    body: &[u8],
    header: Option<&str>,
) -> Result<(), SignatureError> {
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(SignatureError::Missing)?;
    let (algorithm, digest) = header.split_once('=').ok_or(SignatureError::Malformed)?;
    if algorithm != PREFIX {
        return Err(SignatureError::UnsupportedAlgorithm(algorithm.to_string()));
    }
    let digest = hex::decode(digest).map_err(|_| SignatureError::InvalidHex)?;

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::Mismatch)?;
    mac.update(body);
    mac.verify_slice(&digest)
        .map_err(|_| SignatureError::Mismatch)
}

/// Constant-time equality of a configured secret and a presented one.
///
/// Only the length may leak.
pub fn secrets_match(expected: &str, provided: &str) -> bool {
    !expected.is_empty() && bool::from(expected.as_bytes().ct_eq(provided.as_bytes()))
}

/// `sha256=<hex>` header value for `body`.
#[cfg(test)]
pub(crate) fn sign(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).unwrap();
    mac.update(body);
    format!("{PREFIX}={}", hex::encode(mac.finalize().into_bytes()))
}
