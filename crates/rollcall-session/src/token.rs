//! Unguessable token generation for QR and share links.

use rand::Rng;

/// URL-safe alphabet (RFC 4648 base64url characters).
const TOKEN_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// 43 characters of base64url carry ~258 bits of alphabet choice, matching
/// the entropy footprint of a 32-byte token.
const TOKEN_LEN: usize = 43;

/// Generate a fresh URL-safe random token.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LEN)
        .map(|_| TOKEN_CHARS[rng.gen_range(0..TOKEN_CHARS.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_length_and_charset() {
        let t = generate();
        assert_eq!(t.len(), TOKEN_LEN);
        assert!(t.bytes().all(|b| TOKEN_CHARS.contains(&b)));
    }

    #[test]
    fn tokens_do_not_repeat() {
        // Collision over 64^43 space would indicate a broken RNG.
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
    }
}
