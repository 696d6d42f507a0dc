//! Gateway callback signatures.
//!
//! The gateway signs `"{gateway_order_id}|{gateway_payment_id}"` with
//! HMAC-SHA256 under the merchant secret and sends the hex digest back with
//! the payment reference.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies payment signatures with the merchant's shared secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    keyed: HmacSha256,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(secret: &[u8]) -> Result<Self, hmac::digest::InvalidLength> {
        Ok(Self {
            keyed: HmacSha256::new_from_slice(secret)?,
        })
    }

    fn mac(&self, gateway_order_id: &str, gateway_payment_id: &str) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(gateway_order_id.as_bytes());
        mac.update(b"|");
        mac.update(gateway_payment_id.as_bytes());
        mac
    }

    /// Hex-encoded signature the gateway would send for this pair.
    pub fn sign(&self, gateway_order_id: &str, gateway_payment_id: &str) -> String {
        hex::encode(
            self.mac(gateway_order_id, gateway_payment_id)
                .finalize()
                .into_bytes(),
        )
    }

    /// Checks `signature` in constant time. Malformed hex never verifies.
    pub fn verify(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature.trim()) else {
            return false;
        };
        self.mac(gateway_order_id, gateway_payment_id)
            .verify_slice(&expected)
            .is_ok()
    }
}
