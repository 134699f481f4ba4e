//! Holder commitment: the hiding value a certificate is bound to.

use crate::crypto::encrypt::EncryptionPublicKey;
use crate::crypto::field::FieldElement;
use crate::error::IssuerError;

/// A holder's commitment hash together with the key certificates are
/// encrypted to. The commitment preimage is known only to the holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderCommitment {
    pub commitment_hash: FieldElement,
    pub encryption_key: EncryptionPublicKey,
}

impl HolderCommitment {
    /// Validate and assemble a commitment from wire data.
    pub fn new(commitment_hash: FieldElement, encryption_key: Vec<u8>) -> Result<Self, IssuerError> {
        let encryption_key: EncryptionPublicKey =
            encryption_key.try_into().map_err(|b: Vec<u8>| {
                IssuerError::InvalidInput(format!(
                    "encryption key must be 32 bytes, got {}",
                    b.len()
                ))
            })?;
        Ok(Self {
            commitment_hash,
            encryption_key,
        })
    }
}
