use crate::error::WebhookError;
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Line-Signature";

/// Checks the webhook signature header: base64 of HMAC-SHA256 over the raw
/// body, keyed with the channel secret.
pub fn verify_signature(
    channel_secret: &str,
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), WebhookError> {
    let signature = signature.ok_or(WebhookError::MissingSignature)?;
    let received = STANDARD
        .decode(signature.trim())
        .map_err(|_| WebhookError::MalformedSignature)?;
    let computed = compute_hash(channel_secret, body);
    if bool::from(computed.as_slice().ct_eq(received.as_slice())) {
        Ok(())
    } else {
        Err(WebhookError::InvalidSignature)
    }
}

#[cfg(test)]
pub fn compute_signature(channel_secret: &str, body: &[u8]) -> String {
    STANDARD.encode(compute_hash(channel_secret, body))
}

fn compute_hash(channel_secret: &str, body: &[u8]) -> Vec<u8> {
    let mut hmac_hasher = HmacSha256::new_from_slice(channel_secret.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any size");
    hmac_hasher.update(body);
    hmac_hasher.finalize().into_bytes().to_vec()
}
