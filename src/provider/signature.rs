//! Webhook signature check.
//!
//! Header format: `Wave-Signature: t=<unix ts>,v1=<hex hmac>[,v1=<hex hmac>...]`
//! where each `v1` is HMAC-SHA256 over `<ts>` immediately followed by the raw
//! body. Several `v1` entries appear while a secret is being rotated.
//! Deliveries whose `t` is more than [`SIGNATURE_TOLERANCE_SECS`] away from
//! the local clock are refused so a captured request cannot be replayed.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "wave-signature";
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingSignature,
    #[error("invalid signature format")]
    InvalidSignatureFormat,
    #[error("invalid webhook secret configuration")]
    InvalidSecret,
    #[error("signature verification failed")]
    SignatureMismatch,
    #[error("signature timestamp outside the accepted window")]
    StaleTimestamp,
}

/// `now` is the current unix time in seconds.
pub fn verify_signature(
    secret: &str,
    body: &[u8],
    signature_header: Option<&str>,
    now: i64,
) -> Result<(), SignatureError> {
    let header = signature_header.ok_or(SignatureError::MissingSignature)?;

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::InvalidSignatureFormat)?;
    if signatures.is_empty() {
        return Err(SignatureError::InvalidSignatureFormat);
    }

    for candidate in signatures {
        let expected =
            hex::decode(candidate).map_err(|_| SignatureError::InvalidSignatureFormat)?;

        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
        mac.update(timestamp.as_bytes());
        mac.update(body);

        // constant-time comparison
        if mac.verify_slice(&expected).is_ok() {
            return check_freshness(timestamp, now);
        }
    }

    Err(SignatureError::SignatureMismatch)
}

fn check_freshness(timestamp: &str, now: i64) -> Result<(), SignatureError> {
    let signed_at: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidSignatureFormat)?;
    if (now - signed_at).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::StaleTimestamp);
    }
    Ok(())
}

/// Builds a header value the way the provider does.
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(body);
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}
