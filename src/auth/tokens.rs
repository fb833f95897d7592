use rand::RngCore;
use sha2::{Digest, Sha256};

/// Generate a password-reset token. Returns the plain token (emailed to the
/// user) and the SHA-256 hex digest (the only form that touches the database).
pub fn generate_reset_token() -> (String, String) {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let plain = hex::encode(bytes);
    let digest = hash_reset_token(&plain);
    (plain, digest)
}

pub fn hash_reset_token(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let (plain, digest) = generate_reset_token();
        assert_eq!(hash_reset_token(&plain), digest);
    }

    #[test]
    fn plain_token_never_equals_digest() {
        let (plain, digest) = generate_reset_token();
        assert_ne!(plain, digest);
    }

    #[test]
    fn tokens_are_unique() {
        let (a, _) = generate_reset_token();
        let (b, _) = generate_reset_token();
        assert_ne!(a, b);
    }

    #[test]
    fn token_and_digest_are_64_hex_chars() {
        let (plain, digest) = generate_reset_token();
        assert_eq!(plain.len(), 64);
        assert_eq!(digest.len(), 64);
        assert!(plain.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
