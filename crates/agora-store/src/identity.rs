//! Replica identity derived from an ed25519 key.

use ed25519_dalek::{SigningKey, VerifyingKey};

/// Identity id of a public key: `b3b3/` followed by the hex BLAKE3 digest
/// of the BLAKE3 digest of the raw key bytes.
pub fn compute_identity_id(pubkey: &VerifyingKey) -> String {
    let hash1 = blake3::hash(pubkey.as_bytes());
    let hash2 = blake3::hash(hash1.as_bytes());
    format!("b3b3/{}", hex::encode(hash2.as_bytes()))
}

/// The identity a replicator writes under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    id: String,
    public_key: VerifyingKey,
}

impl Identity {
    /// Derive the identity of a signing key.
    pub fn from_signing_key(key: &SigningKey) -> Self {
        let public_key = key.verifying_key();
        Self {
            id: compute_identity_id(&public_key),
            public_key,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn public_key(&self) -> &VerifyingKey {
        &self.public_key
    }

    /// Short form of the id for log lines.
    pub fn short_id(&self) -> &str {
        let hash = self.id.strip_prefix("b3b3/").unwrap_or(&self.id);
        &hash[..hash.len().min(12)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_id_deterministic() {
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let a = Identity::from_signing_key(&key);
        let b = Identity::from_signing_key(&key);
        assert_eq!(a, b);
        assert!(a.id().starts_with("b3b3/"));
        assert_eq!(a.id().len(), "b3b3/".len() + 64);
    }

    #[test]
    fn id_is_hash_of_key_hash() {
        let key = SigningKey::from_bytes(&[5u8; 32]).verifying_key();
        let inner = blake3::hash(key.as_bytes());
        let outer = blake3::hash(inner.as_bytes());
        assert_eq!(compute_identity_id(&key), format!("b3b3/{}", outer.to_hex()));
        assert_ne!(
            compute_identity_id(&key),
            format!("b3b3/{}", inner.to_hex())
        );
    }

    #[test]
    fn different_keys_different_ids() {
        let a = Identity::from_signing_key(&SigningKey::from_bytes(&[1u8; 32]));
        let b = Identity::from_signing_key(&SigningKey::from_bytes(&[2u8; 32]));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn short_id_is_hash_prefix() {
        let identity = Identity::from_signing_key(&SigningKey::from_bytes(&[3u8; 32]));
        assert_eq!(identity.short_id().len(), 12);
        assert!(identity.id().contains(identity.short_id()));
    }
}
