//! Content-addressed identity for entities.
//!
//! A fingerprint is the hex SHA-256 of the entity's canonical JSON form with
//! volatile fields masked. Storage deduplicates on it and producers derive
//! batch ids from it.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Hex SHA-256 of the JSON encoding of `value`
pub fn hash_struct<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Entities that carry their own fingerprint field
pub trait Fingerprint: Serialize + Clone {
    /// Stored fingerprint, empty until computed
    fn fingerprint(&self) -> &str;

    fn store_fingerprint(&mut self, fingerprint: String);

    /// Copy with every field that must not participate in identity cleared.
    /// The fingerprint field itself is always cleared.
    fn masked(&self) -> Self {
        let mut masked = self.clone();
        masked.store_fingerprint(String::new());
        masked
    }

    fn compute_fingerprint(&self) -> Result<String> {
        hash_struct(&self.masked())
    }

    /// Computes and stores the fingerprint, returning it
    fn set_fingerprint(&mut self) -> Result<&str> {
        let fingerprint = self.compute_fingerprint()?;
        self.store_fingerprint(fingerprint);
        Ok(self.fingerprint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_struct_is_stable_hex_sha256() {
        let digest = hash_struct("abc").unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_struct("abc").unwrap());
        assert_ne!(digest, hash_struct("abd").unwrap());
    }
}
