use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 request signature, hex encoded, as used by Binance/OKX/Bitget REST auth.
pub fn hmac_sha256_hex(secret: &str, payload: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_for_same_inputs() {
        let a = hmac_sha256_hex("secret", "payload");
        let b = hmac_sha256_hex("secret", "payload");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
