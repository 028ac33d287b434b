//! Ledger checksums

use sha2::{Digest, Sha256};

use crate::migration::MigrationError;

/// Hex SHA-256 of a step's SQL text, as stored in the ledger.
pub fn checksum(sql_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql_text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// # Errors
///
/// Returns `MigrationError::ChecksumMismatch` when the values differ.
pub fn validate_checksum(id: u64, stored: &str, current: &str) -> Result<(), MigrationError> {
    if stored == current {
        Ok(())
    } else {
        Err(MigrationError::ChecksumMismatch {
            id,
            stored: stored.to_string(),
            current: current.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_stable_hex() {
        let sum = checksum("CREATE TABLE t (id UUID)");
        assert_eq!(sum.len(), 64);
        assert_eq!(sum, checksum("CREATE TABLE t (id UUID)"));
        assert_ne!(sum, checksum("CREATE TABLE t (id UUID) "));
        assert_eq!(
            checksum(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_validate_checksum() {
        assert!(validate_checksum(1, "abc", "abc").is_ok());
        assert!(matches!(
            validate_checksum(3, "abc", "abd"),
            Err(MigrationError::ChecksumMismatch { id: 3, .. })
        ));
    }
}
