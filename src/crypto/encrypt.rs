//! Encryption of issued certificates to the holder.
//!
//! Hybrid construction: a random data-encryption key encrypts the padded
//! JSON payload with AES-256-GCM, and the DEK is wrapped for the holder's
//! X25519 key with HPKE (DHKEM-X25519/HKDF-SHA256/AES-256-GCM). The HPKE
//! encapsulation doubles as the ephemeral public key on the wire. Payloads
//! are padded with trailing whitespace to a fixed block multiple, which is
//! invisible to JSON parsers.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hpke::aead::AesGcm256;
use hpke::kdf::HkdfSha256;
use hpke::kem::X25519HkdfSha256;
use hpke::{Deserializable, Kem, OpModeR, OpModeS, Serializable};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::field::FieldElement;
use crate::error::IssuerError;

type HpkeKem = X25519HkdfSha256;
type HpkeKdf = HkdfSha256;
type HpkeAead = AesGcm256;

/// Holder encryption public key (X25519, 32 bytes).
pub type EncryptionPublicKey = [u8; 32];

/// Holder encryption secret key (X25519, 32 bytes).
pub type EncryptionSecretKey = [u8; 32];

pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

/// Payloads are padded up to a multiple of this before encryption.
pub const PAD_BLOCK: usize = 256;

const WRAP_INFO: &[u8] = b"zkcert-holder-encryption-v1";

/// The encrypted payload addressed to the holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedMessage {
    /// AES-256-GCM ciphertext with appended tag, base64.
    pub ciphertext: String,
    /// HPKE encapsulated (ephemeral) public key, base64.
    pub ephemeral_public_key: String,
    /// AES-GCM nonce, base64.
    pub nonce: String,
    /// HPKE-wrapped data encryption key, base64.
    pub wrapped_key: String,
}

/// An issued certificate encrypted for its holder, keyed by the holder
/// commitment so the holder can match it to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedCert {
    #[serde(flatten)]
    pub message: EncryptedMessage,
    #[serde(rename = "holderCommitment")]
    pub holder_commitment: FieldElement,
}

/// Encrypt a JSON-serializable payload for the holder.
pub fn encrypt_certificate<T: Serialize>(
    holder_key: &EncryptionPublicKey,
    holder_commitment: FieldElement,
    payload: &T,
) -> Result<EncryptedCert, IssuerError> {
    let mut plaintext = serde_json::to_vec(payload)
        .map_err(|e| IssuerError::Encryption(format!("encode payload: {e}")))?;
    // Trailing whitespace is insignificant to JSON, so padding survives
    // the decrypt-then-parse path unchanged.
    while plaintext.len() % PAD_BLOCK != 0 {
        plaintext.push(b' ');
    }

    let mut dek = [0u8; 32];
    OsRng.fill_bytes(&mut dek);
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let cipher =
        Aes256Gcm::new_from_slice(&dek).map_err(|e| IssuerError::Encryption(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_ref())
        .map_err(|e| IssuerError::Encryption(e.to_string()))?;

    let (encapsulated, wrapped_key) = wrap_dek(&dek, holder_key)?;

    Ok(EncryptedCert {
        message: EncryptedMessage {
            ciphertext: b64_encode(&ciphertext),
            ephemeral_public_key: b64_encode(&encapsulated),
            nonce: b64_encode(&nonce_bytes),
            wrapped_key: b64_encode(&wrapped_key),
        },
        holder_commitment,
    })
}

/// Decrypt an [`EncryptedCert`] with the holder's secret key.
pub fn decrypt_certificate<T: DeserializeOwned>(
    holder_secret: &EncryptionSecretKey,
    encrypted: &EncryptedCert,
) -> Result<T, IssuerError> {
    let encapsulated = b64_decode(&encrypted.message.ephemeral_public_key)?;
    let wrapped_key = b64_decode(&encrypted.message.wrapped_key)?;
    let dek = unwrap_dek(&encapsulated, &wrapped_key, holder_secret)?;

    let nonce_bytes = b64_decode(&encrypted.message.nonce)?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(IssuerError::Encryption("invalid nonce length".into()));
    }
    let ciphertext = b64_decode(&encrypted.message.ciphertext)?;

    let cipher =
        Aes256Gcm::new_from_slice(&dek).map_err(|e| IssuerError::Encryption(e.to_string()))?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|e| IssuerError::Encryption(format!("decrypt payload: {e}")))?;

    serde_json::from_slice(&plaintext)
        .map_err(|e| IssuerError::Encryption(format!("decode payload: {e}")))
}

/// Generate a holder encryption keypair. Intended for clients and tests.
pub fn generate_encryption_keypair() -> (EncryptionSecretKey, EncryptionPublicKey) {
    let (sk, pk) = HpkeKem::gen_keypair(&mut OsRng);
    let mut secret = [0u8; 32];
    let mut public = [0u8; 32];
    secret.copy_from_slice(&sk.to_bytes());
    public.copy_from_slice(&pk.to_bytes());
    (secret, public)
}

fn wrap_dek(
    dek: &[u8; 32],
    holder_key: &EncryptionPublicKey,
) -> Result<(Vec<u8>, Vec<u8>), IssuerError> {
    let pk = <HpkeKem as Kem>::PublicKey::from_bytes(holder_key)
        .map_err(|e| IssuerError::Encryption(format!("invalid holder encryption key: {e:?}")))?;

    let (encapsulated, mut sender_ctx) = hpke::setup_sender::<HpkeAead, HpkeKdf, HpkeKem, _>(
        &OpModeS::Base,
        &pk,
        WRAP_INFO,
        &mut OsRng,
    )
    .map_err(|e| IssuerError::Encryption(format!("HPKE setup failed: {e:?}")))?;

    let wrapped = sender_ctx
        .seal(dek, b"")
        .map_err(|e| IssuerError::Encryption(format!("HPKE seal failed: {e:?}")))?;

    Ok((encapsulated.to_bytes().to_vec(), wrapped))
}

fn unwrap_dek(
    encapsulated: &[u8],
    wrapped: &[u8],
    holder_secret: &EncryptionSecretKey,
) -> Result<[u8; 32], IssuerError> {
    let encapped_key = <HpkeKem as Kem>::EncappedKey::from_bytes(encapsulated)
        .map_err(|e| IssuerError::Encryption(format!("invalid encapsulated key: {e:?}")))?;
    let sk = <HpkeKem as Kem>::PrivateKey::from_bytes(holder_secret)
        .map_err(|e| IssuerError::Encryption(format!("invalid holder secret key: {e:?}")))?;

    let mut receiver_ctx = hpke::setup_receiver::<HpkeAead, HpkeKdf, HpkeKem>(
        &OpModeR::Base,
        &sk,
        &encapped_key,
        WRAP_INFO,
    )
    .map_err(|e| IssuerError::Encryption(format!("HPKE receiver setup failed: {e:?}")))?;

    let dek_bytes = receiver_ctx
        .open(wrapped, b"")
        .map_err(|e| IssuerError::Encryption(format!("HPKE open failed: {e:?}")))?;

    dek_bytes
        .try_into()
        .map_err(|_| IssuerError::Encryption("invalid DEK length".into()))
}

fn b64_encode(data: &[u8]) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, data)
}

fn b64_decode(s: &str) -> Result<Vec<u8>, IssuerError> {
    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, s)
        .map_err(|e| IssuerError::Encryption(format!("invalid base64: {e}")))
}
