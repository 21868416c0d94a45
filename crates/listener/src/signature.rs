//! Webhook signature verification.
//!
//! Gitea and GitHub both sign the raw request body with HMAC and the shared
//! secret configured on the hook. Three headers are recognised, checked in
//! this order; the first one present is the only one verified:
//!
//! | Header | Format | Algorithm |
//! |--------|--------|-----------|
//! | `X-Gitea-Signature` | bare hex | HMAC-SHA256 |
//! | `X-Hub-Signature-256` | `sha256=<hex>` | HMAC-SHA256 |
//! | `X-Hub-Signature` | `sha1=<hex>` | HMAC-SHA1 |
//!
//! Comparison is constant-time through [`Mac::verify_slice`].

use hmac::{Hmac, Mac};
use pipeline::WebhookHeaders;
use sha1::Sha1;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// Gitea's signature header.
pub const GITEA_SIGNATURE: &str = "X-Gitea-Signature";
/// GitHub's SHA-256 signature header.
pub const HUB_SIGNATURE_256: &str = "X-Hub-Signature-256";
/// GitHub's legacy SHA-1 signature header.
pub const HUB_SIGNATURE: &str = "X-Hub-Signature";

/// Why a request's signature was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("no signature header in request")]
    Missing,

    #[error("malformed {header} header")]
    Malformed { header: &'static str },

    #[error("{header} does not match the request body")]
    Mismatch { header: &'static str },
}

#[derive(Clone, Copy)]
enum Algorithm {
    Sha256,
    Sha1,
}

/// Verifies the signature of `payload` against `secret`.
pub fn verify(headers: &WebhookHeaders, payload: &[u8], secret: &[u8]) -> Result<(), SignatureError> {
    let (header, value, algorithm) = if let Some(value) = headers.get(GITEA_SIGNATURE) {
        (GITEA_SIGNATURE, value, Algorithm::Sha256)
    } else if let Some(value) = headers.get(HUB_SIGNATURE_256) {
        let digest = value
            .strip_prefix("sha256=")
            .ok_or(SignatureError::Malformed {
                header: HUB_SIGNATURE_256,
            })?;
        (HUB_SIGNATURE_256, digest, Algorithm::Sha256)
    } else if let Some(value) = headers.get(HUB_SIGNATURE) {
        let digest = value.strip_prefix("sha1=").ok_or(SignatureError::Malformed {
            header: HUB_SIGNATURE,
        })?;
        (HUB_SIGNATURE, digest, Algorithm::Sha1)
    } else {
        return Err(SignatureError::Missing);
    };

    let expected = hex::decode(value.trim()).map_err(|_| SignatureError::Malformed { header })?;

    let matches = match algorithm {
        Algorithm::Sha256 => HmacSha256::new_from_slice(secret)
            .map(|mut mac| {
                mac.update(payload);
                mac.verify_slice(&expected).is_ok()
            })
            .unwrap_or(false),
        Algorithm::Sha1 => HmacSha1::new_from_slice(secret)
            .map(|mut mac| {
                mac.update(payload);
                mac.verify_slice(&expected).is_ok()
            })
            .unwrap_or(false),
    };

    if matches {
        Ok(())
    } else {
        Err(SignatureError::Mismatch { header })
    }
}

/// Hex HMAC-SHA256 of `payload`, as Gitea sends it.
#[cfg(test)]
pub(crate) fn sign_sha256(payload: &[u8], secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).unwrap();
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}
