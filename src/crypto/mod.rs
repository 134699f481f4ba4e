//! Cryptographic building blocks for certificate issuance.
//!
//! - [`field`] - BN254 scalar field elements and wire encodings
//! - [`poseidon`] - ZK-friendly hash over the field
//! - [`eddsa`] - Baby-Jubjub EdDSA for certificate signatures
//! - [`encrypt`] - hybrid encryption of issued certificates to the holder

pub mod eddsa;
pub mod encrypt;
pub mod field;
pub mod poseidon;

pub use field::FieldElement;
