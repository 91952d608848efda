//! services/webhook_signature.rs
//! Firma HMAC-SHA256 de webhooks: `t=<unix>,v0=<hex(hmac("<t>.<body>"))>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &str, timestamp: i64, body: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Some(mac)
}

/// Genera el header de firma (lo usa el proveedor; acá, los tests).
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let digest = mac_for(secret, timestamp, body)
        .map(|m| hex::encode(m.finalize().into_bytes()))
        .unwrap_or_default();
    format!("t={},v0={}", timestamp, digest)
}

/// Verifica firma y antigüedad. Comparación en tiempo constante.
pub fn verify(secret: &str, header: &str, body: &[u8], now_unix: i64, tolerance_secs: i64) -> bool {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v0", v)) => signature = hex::decode(v).ok(),
            _ => {}
        }
    }

    let (timestamp, signature) = match (timestamp, signature) {
        (Some(t), Some(s)) => (t, s),
        _ => return false,
    };
    if (now_unix - timestamp).abs() > tolerance_secs {
        log::warn!("(webhook_signature::verify) Firma fuera de tolerancia (t={})", timestamp);
        return false;
    }

    match mac_for(secret, timestamp, body) {
        Some(mac) => mac.verify_slice(&signature).is_ok(),
        None => false,
    }
}
