//! Webhook HMAC signing
//!
//! Signature: `HMAC-SHA256(secret, "{timestamp}.{body}")`, sent as
//! `sha256=<hex>`. Inbound headers may also carry bare hex or base64.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{SettlementError, SettlementResult};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Timestamp";
pub const NONCE_HEADER: &str = "X-Nonce";
pub const EVENT_HEADER: &str = "X-Event";

fn mac_for(secret: &str, timestamp: i64, body: &[u8]) -> SettlementResult<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SettlementError::Internal(format!("HMAC key error: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Hex signature of a payload
pub fn sign_payload(secret: &str, timestamp: i64, body: &[u8]) -> SettlementResult<String> {
    Ok(hex::encode(mac_for(secret, timestamp, body)?.finalize().into_bytes()))
}

/// Header value for outbound requests
pub fn signature_header(secret: &str, timestamp: i64, body: &[u8]) -> SettlementResult<String> {
    Ok(format!("sha256={}", sign_payload(secret, timestamp, body)?))
}

/// Decode a signature header into raw MAC bytes
fn decode_signature(header: &str) -> Option<Vec<u8>> {
    let value = header.trim();
    let value = value.strip_prefix("sha256=").unwrap_or(value);
    if value.len() == 64 {
        if let Ok(bytes) = hex::decode(value) {
            return Some(bytes);
        }
    }
    BASE64.decode(value).ok().filter(|bytes| bytes.len() == 32)
}

/// Constant-time check of a signature header
pub fn verify_signature(
    secret: &str,
    timestamp: i64,
    body: &[u8],
    header: &str,
) -> SettlementResult<()> {
    let provided = decode_signature(header).ok_or(SettlementError::InvalidSignature)?;
    mac_for(secret, timestamp, body)?
        .verify_slice(&provided)
        .map_err(|_| SettlementError::InvalidSignature)
}

/// Parse `X-Timestamp` and check it against the freshness window
pub fn check_timestamp(header: &str, now: i64, window_secs: i64) -> SettlementResult<i64> {
    let timestamp: i64 = header
        .trim()
        .parse()
        .map_err(|_| SettlementError::Unauthorized("malformed timestamp".to_string()))?;
    let window = u64::try_from(window_secs).unwrap_or(0);
    if now.abs_diff(timestamp) > window {
        return Err(SettlementError::StaleTimestamp(timestamp));
    }
    Ok(timestamp)
}
