//! HTTP front-end for the issuer.

mod error;
mod rest;
mod types;

pub use error::{ApiError, ErrorResponse};
pub use rest::{router, AppState, MAX_USER_ID_LEN};
pub use types::{
    CertificateStatus, GenerateCertRequest, GenerateCertResponse, GetCertRequest, GetCertResponse,
    Profile,
};
