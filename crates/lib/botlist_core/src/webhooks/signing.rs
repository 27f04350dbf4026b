//! HMAC-SHA-256 body signatures and the headers that carry them.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_SIGNATURE: &str = "X-Signature";
pub const HEADER_TIMESTAMP: &str = "X-Timestamp";
pub const HEADER_NONCE: &str = "X-Nonce";

/// Why a received delivery was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    BadSignature,
    Stale,
}

/// Hex HMAC-SHA-256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Receiver-side check: signature matches and `timestamp` is within
/// `window_secs` of `now`.
pub fn verify(
    secret: &str,
    body: &[u8],
    signature: &str,
    timestamp: i64,
    now: i64,
    window_secs: i64,
) -> Result<(), VerifyError> {
    if (now - timestamp).abs() > window_secs {
        return Err(VerifyError::Stale);
    }
    let expected = hex::decode(signature).map_err(|_| VerifyError::BadSignature)?;
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| VerifyError::BadSignature)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| VerifyError::BadSignature)
}

/// Headers for one attempt. With `simple_auth` the secret is sent as
/// `Authorization` and no signature is computed.
pub fn headers(
    secret: &str,
    simple_auth: bool,
    body: &[u8],
    timestamp: i64,
) -> Vec<(&'static str, String)> {
    let mut headers = vec![
        (HEADER_TIMESTAMP, timestamp.to_string()),
        (HEADER_NONCE, Uuid::new_v4().to_string()),
    ];
    if simple_auth {
        headers.push(("Authorization", secret.to_string()));
    } else {
        headers.push((HEADER_SIGNATURE, sign(secret, body)));
    }
    headers
}
