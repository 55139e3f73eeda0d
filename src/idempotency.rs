//! Retry tokens that let the service deduplicate replayed create/action calls.

use rand::RngExt;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const TOKEN_LEN: usize = 32;
/// Longest token the service accepts.
pub const MAX_RETRY_TOKEN_LEN: usize = 64;

/// Fresh random alphanumeric token, unique per logical call.
pub fn generate_retry_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LEN)
        .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
        .collect()
}

/// Caller supplied tokens must be non-empty printable ASCII of bounded length.
pub fn is_valid_retry_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_RETRY_TOKEN_LEN
        && token.bytes().all(|byte| byte.is_ascii_graphic())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{MAX_RETRY_TOKEN_LEN, generate_retry_token, is_valid_retry_token};

    #[test]
    fn generated_tokens_are_alphanumeric_and_distinct() {
        let tokens = (0..64).map(|_| generate_retry_token()).collect::<HashSet<_>>();
        assert_eq!(tokens.len(), 64);
        for token in &tokens {
            assert_eq!(token.len(), 32);
            assert!(token.chars().all(|ch| ch.is_ascii_alphanumeric()));
            assert!(is_valid_retry_token(token));
        }
    }

    #[test]
    fn caller_tokens_are_bounded() {
        assert!(is_valid_retry_token("client-token-1"));
        assert!(!is_valid_retry_token(""));
        assert!(!is_valid_retry_token("has space"));
        assert!(!is_valid_retry_token(&"x".repeat(MAX_RETRY_TOKEN_LEN + 1)));
    }
}
