//! Issuer key material.
//!
//! Two keys per process: the secp256k1 chain key (signs transactions,
//! derives the provider address) and the Baby-Jubjub key (signs
//! certificates). The certificate key comes from `SIGNING_KEY` when set;
//! otherwise it is derived from the chain key by signing a fixed message
//! and hashing the signature, so the same chain key always yields the same
//! certificate key. Malformed material refuses startup.

use alloy::primitives::{keccak256, Address};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;

use crate::crypto::eddsa::SigningKey;
use crate::error::{IssuerError, Result};

const DERIVATION_MESSAGE: &[u8] = b"Signature request to derive the certificate signing key";

pub struct KeyMaterial {
    provider_key: PrivateKeySigner,
    signing_key: SigningKey,
}

impl KeyMaterial {
    /// Build key material from an ECDSA hex key (no 0x prefix) and an
    /// optional 32-byte EdDSA hex key.
    pub fn new(ethereum_private_key: &str, cert_signing_key: Option<&str>) -> Result<Self> {
        let provider_key: PrivateKeySigner = ethereum_private_key
            .parse()
            .map_err(|e| IssuerError::InvalidKey(format!("prepare provider key: {e}")))?;

        let signing_key = match cert_signing_key {
            Some(hex_key) if !hex_key.is_empty() => SigningKey::from_hex(hex_key)?,
            _ => derive_signing_key(&provider_key)?,
        };

        Ok(Self {
            provider_key,
            signing_key,
        })
    }

    /// Read `PRIVATE_KEY` and optional `SIGNING_KEY` from the environment.
    pub fn from_env() -> Result<Self> {
        let ethereum_private_key = std::env::var("PRIVATE_KEY")
            .map_err(|_| IssuerError::InvalidKey("PRIVATE_KEY is not set".into()))?;
        let cert_signing_key = std::env::var("SIGNING_KEY").ok();
        Self::new(&ethereum_private_key, cert_signing_key.as_deref())
    }

    /// The guardian address the registry whitelists.
    pub fn provider_address(&self) -> Address {
        self.provider_key.address()
    }

    pub fn provider_key(&self) -> &PrivateKeySigner {
        &self.provider_key
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

fn derive_signing_key(provider_key: &PrivateKeySigner) -> Result<SigningKey> {
    let signature = provider_key
        .sign_message_sync(DERIVATION_MESSAGE)
        .map_err(|e| IssuerError::InvalidKey(format!("derive certificate signing key: {e}")))?;
    let seed = keccak256(signature.as_bytes());
    Ok(SigningKey::from_bytes(seed.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key.
    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn loads_provider_key_and_address() {
        let keys = KeyMaterial::new(TEST_KEY, None).unwrap();
        assert_eq!(
            keys.provider_address().to_string().to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = KeyMaterial::new(TEST_KEY, None).unwrap();
        let b = KeyMaterial::new(TEST_KEY, None).unwrap();
        assert_eq!(
            a.signing_key().public().ax(),
            b.signing_key().public().ax()
        );
        assert_eq!(
            a.signing_key().public().ay(),
            b.signing_key().public().ay()
        );
    }

    #[test]
    fn explicit_signing_key_overrides_derivation() {
        let explicit = hex::encode([5u8; 32]);
        let with_explicit = KeyMaterial::new(TEST_KEY, Some(&explicit)).unwrap();
        let derived = KeyMaterial::new(TEST_KEY, None).unwrap();
        assert_ne!(
            with_explicit.signing_key().public().ax(),
            derived.signing_key().public().ax()
        );
    }

    #[test]
    fn empty_signing_key_falls_back_to_derivation() {
        let fallback = KeyMaterial::new(TEST_KEY, Some("")).unwrap();
        let derived = KeyMaterial::new(TEST_KEY, None).unwrap();
        assert_eq!(
            fallback.signing_key().public().ax(),
            derived.signing_key().public().ax()
        );
    }

    #[test]
    fn malformed_keys_are_fatal() {
        assert!(KeyMaterial::new("not-hex", None).is_err());
        assert!(KeyMaterial::new(TEST_KEY, Some("abcd")).is_err());
        assert!(KeyMaterial::new(TEST_KEY, Some("zz".repeat(32).as_str())).is_err());
    }
}
