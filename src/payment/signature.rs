//! Stripe webhook signature (HMAC-SHA256)
//!
//! Header format: `t=<unix seconds>,v1=<hex>[,v1=<hex>...]`. The MAC covers
//! `"{t}.{raw body}"`; several `v1` entries appear while a secret is rotated.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{EcommerceError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Events older (or newer) than this are rejected as replays.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

fn mac_for(payload: &[u8], timestamp: &str, secret: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| EcommerceError::SignatureInvalid("HMAC key error".into()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Verifies `header` against the raw `payload` bytes.
pub fn verify(payload: &[u8], header: &str, secret: &str, now: i64, tolerance_secs: i64) -> Result<()> {
    let invalid = |msg: &str| EcommerceError::SignatureInvalid(msg.to_string());

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(v) = part.strip_prefix("v1=") {
            signatures.push(v);
        }
    }
    let timestamp = timestamp.filter(|t| !t.is_empty()).ok_or_else(|| invalid("missing timestamp"))?;
    if signatures.is_empty() {
        return Err(invalid("missing v1 signature"));
    }

    let mac = mac_for(payload, timestamp, secret)?;
    let matched = signatures.iter().any(|sig| {
        hex::decode(sig)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if !matched {
        return Err(invalid("signature mismatch"));
    }

    let ts: i64 = timestamp.parse().map_err(|_| invalid("invalid timestamp"))?;
    if (now - ts).abs() > tolerance_secs {
        return Err(invalid("timestamp outside tolerance"));
    }
    Ok(())
}

/// Builds a header the way the provider does; used by tests and local tooling.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let ts = timestamp.to_string();
    let mac = mac_for(payload, &ts, secret)?;
    Ok(format!("t={ts},v1={}", hex::encode(mac.finalize().into_bytes())))
}
