// src/signature.rs

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// HMAC-SHA256 over the raw webhook body, keyed with the provider secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self) -> Option<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).ok()
    }

    /// Hex signature for `body`.
    pub fn sign(&self, body: &[u8]) -> String {
        let Some(mut mac) = self.mac() else {
            return String::new();
        };
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Checks `supplied` against the raw, unparsed body.
    ///
    /// Accepts hex (optionally `sha256=`-prefixed) or base64. The comparison
    /// is constant-time.
    pub fn verify(&self, raw_body: &[u8], supplied: &str) -> bool {
        if self.secret.is_empty() {
            log::error!("webhook secret is empty, rejecting signature");
            return false;
        }

        let supplied = supplied.trim();
        let supplied = supplied.strip_prefix("sha256=").unwrap_or(supplied);
        let Some(expected) = decode_signature(supplied) else {
            log::debug!("webhook signature is neither hex nor base64");
            return false;
        };

        let Some(mut mac) = self.mac() else {
            return false;
        };
        mac.update(raw_body);
        mac.verify_slice(&expected).is_ok()
    }
}

fn decode_signature(s: &str) -> Option<Vec<u8>> {
    if s.is_empty() {
        return None;
    }
    hex::decode(s).ok().or_else(|| BASE64.decode(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"event":"payment.succeeded","object":{"id":"p-1","status":"succeeded"}}"#;

    #[test]
    fn accepts_own_signature_in_every_encoding() {
        let verifier = WebhookVerifier::new("whsec_test");
        let hex_sig = verifier.sign(BODY);
        assert!(verifier.verify(BODY, &hex_sig));
        assert!(verifier.verify(BODY, &format!("sha256={hex_sig}")));

        let b64 = BASE64.encode(hex::decode(&hex_sig).unwrap());
        assert!(verifier.verify(BODY, &b64));
    }

    #[test]
    fn rejects_tampered_body_and_wrong_key() {
        let verifier = WebhookVerifier::new("whsec_test");
        let sig = verifier.sign(BODY);
        assert!(!verifier.verify(b"{\"event\":\"payment.canceled\"}", &sig));
        assert!(!WebhookVerifier::new("other").verify(BODY, &sig));
    }

    #[test]
    fn bare_digest_is_not_a_signature() {
        use sha2::Digest;
        let digest = BASE64.encode(Sha256::digest(BODY));
        assert!(!WebhookVerifier::new("whsec_test").verify(BODY, &digest));
    }

    #[test]
    fn empty_or_garbage_signatures_fail() {
        let verifier = WebhookVerifier::new("whsec_test");
        assert!(!verifier.verify(BODY, ""));
        assert!(!verifier.verify(BODY, "not a signature!"));
        assert!(!WebhookVerifier::new("").verify(BODY, "00"));
    }
}
