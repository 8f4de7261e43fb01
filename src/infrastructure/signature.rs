use crate::domain::ports::WebhookVerifier;
use crate::error::SignatureError;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::sync::RwLock;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Verifies `t=<unix>,v1=<hex hmac>` signature headers.
///
/// The signed payload is `<t>.<body>`, keyed with the endpoint secret.
/// Several `v1` entries may be present while a secret is being rolled.
pub struct StripeSignatureVerifier {
    keyed: RwLock<HmacSha256>,
    tolerance: Duration,
}

fn keyed(secret: &SecretString) -> Result<HmacSha256, SignatureError> {
    HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| SignatureError::InvalidSecret)
}

impl StripeSignatureVerifier {
    pub fn new(secret: &SecretString, tolerance: Duration) -> Result<Self, SignatureError> {
        Ok(Self {
            keyed: RwLock::new(keyed(secret)?),
            tolerance,
        })
    }

    /// Builds a header for `payload` at `timestamp`.
    pub fn sign_with_timestamp(&self, payload: &[u8], timestamp: i64) -> String {
        let mac = self.mac(timestamp, payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn mac(&self, timestamp: i64, payload: &[u8]) -> HmacSha256 {
        let mut mac = self
            .keyed
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac
    }

    fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), SignatureError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp: i64 = timestamp
            .ok_or_else(|| SignatureError::Malformed("missing timestamp".to_string()))?
            .parse()
            .map_err(|_| SignatureError::Malformed("timestamp is not an integer".to_string()))?;
        if signatures.is_empty() {
            return Err(SignatureError::Malformed("missing v1 signature".to_string()));
        }

        let age = now.abs_diff(timestamp);
        if age > self.tolerance.as_secs() {
            return Err(SignatureError::Expired(age));
        }

        let matched = signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .is_ok_and(|bytes| self.mac(timestamp, payload).verify_slice(&bytes).is_ok())
        });
        if matched {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

impl WebhookVerifier for StripeSignatureVerifier {
    fn verify(&self, payload: &[u8], signature_header: &str) -> Result<(), SignatureError> {
        self.verify_at(payload, signature_header, chrono::Utc::now().timestamp())
    }

    fn rotate_secret(&self, secret: &SecretString) -> Result<(), SignatureError> {
        let rotated = keyed(secret)?;
        *self
            .keyed
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = rotated;
        Ok(())
    }
}
