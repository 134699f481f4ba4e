//! Request and response bodies for the certificate endpoints.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    Pending,
    Done,
}

#[derive(Debug, Deserialize)]
pub struct GenerateCertRequest {
    /// Holder commitment hash, decimal big-integer string.
    pub holder_commitment: String,
    /// Holder encryption public key, base64 of 32 bytes.
    pub encryption_pub_key: String,
    pub user_id: String,
    pub profile: Profile,
}

#[derive(Debug, Deserialize)]
pub struct Profile {
    pub firstname: String,
    pub lastname: String,
    /// `YYYY-MM-DD`.
    pub date_of_birth: String,
    /// ISO-3166 alpha-2 code.
    pub nationality: String,
    pub postcode: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateCertResponse {
    pub status: CertificateStatus,
}

#[derive(Debug, Deserialize)]
pub struct GetCertRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct GetCertResponse {
    pub status: CertificateStatus,
    /// The encrypted certificate JSON, null while pending.
    pub certificate: Option<Box<RawValue>>,
}
