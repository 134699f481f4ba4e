//! Core domain types: commitments, KYC profiles, certificates.

pub mod certificate;
pub mod commitment;
pub mod kyc;

pub use certificate::{Certificate, IssuedCertificate, MerkleProof, RegistrationDetails};
pub use commitment::HolderCommitment;
pub use kyc::{nationality_to_alpha3, KycContent, KycInputs};
