//! SHA-256 helpers shared by the instrumenter and the archive builder

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`
pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let result = Sha256::digest(data);
    format!("{result:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(sha256_hex(b"abc").len(), 64);
    }
}
