//! KYC attestation issuer.
//!
//! Turns a verified identity profile into a zero-knowledge certificate
//! anchored in an on-chain Merkle registry: the profile is finite-field
//! encoded, Poseidon-hashed, EdDSA-signed, queued through the registry's
//! admission protocol, appended to the tree, and finally returned encrypted
//! to the holder's key.
//!
//! ## Modules
//!
//! - [`domain`] - commitments, KYC profiles, certificates
//! - [`crypto`] - field elements, Poseidon, Baby-Jubjub EdDSA, encryption
//! - [`queue`] - single-consumer task queue with retry and expiry
//! - [`chain`] - registry contract adapter
//! - [`proof`] - Merkle proof service client
//! - [`issuer`] - certificate builder and issuance pipeline
//! - [`store`] - TTL-bound pending certificate store
//! - [`keys`] - issuer key material
//! - [`api`] - HTTP front-end
//! - [`config`] / [`server`] - configuration and process lifecycle

pub mod api;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod issuer;
pub mod keys;
pub mod proof;
pub mod queue;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use crypto::FieldElement;
pub use domain::{
    Certificate, HolderCommitment, IssuedCertificate, KycContent, KycInputs, MerkleProof,
    RegistrationDetails,
};
pub use error::{ErrorKind, IssuerError, Result};
