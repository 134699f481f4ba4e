//! Certificate endpoints.
//!
//! `POST /cert/generate` validates the request, builds and signs the
//! certificate synchronously, queues it for on-chain issuance and marks the
//! user's entry pending. The completion callback encrypts the issued
//! certificate to the holder and replaces the pending marker.
//! `POST /cert/get` reports the entry's state.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use chrono::{Datelike, NaiveDate};
use futures::FutureExt;
use serde_json::value::RawValue;
use tracing::{error, info};

use super::error::ApiError;
use super::types::{
    CertificateStatus, GenerateCertRequest, GenerateCertResponse, GetCertRequest, GetCertResponse,
};
use crate::crypto::encrypt;
use crate::crypto::field::FieldElement;
use crate::domain::{nationality_to_alpha3, HolderCommitment, KycInputs};
use crate::error::IssuerError;
use crate::issuer::{IssueCallback, IssuerService};
use crate::store::PendingStore;

pub const MAX_USER_ID_LEN: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<IssuerService>,
    pub store: Arc<PendingStore>,
}

/// Build the `/cert` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cert/generate", post(generate_cert))
        .route("/cert/get", post(get_cert))
}

async fn generate_cert(
    State(state): State<AppState>,
    Json(request): Json<GenerateCertRequest>,
) -> Result<Json<GenerateCertResponse>, ApiError> {
    if request.user_id.is_empty() || request.user_id.len() > MAX_USER_ID_LEN {
        return Err(ApiError::bad_request(format!(
            "user_id must be between 1 and {MAX_USER_ID_LEN} characters"
        )));
    }

    info!(
        holder_commitment = %request.holder_commitment,
        user_id = %request.user_id,
        "certificate request"
    );

    let commitment_hash = FieldElement::from_decimal(&request.holder_commitment)
        .map_err(|e| ApiError::bad_request(format!("parsing commitment hash failed: {e}")))?;

    let encryption_key = base64::engine::general_purpose::STANDARD
        .decode(&request.encryption_pub_key)
        .map_err(|e| ApiError::bad_request(format!("decode pub key string failed: {e}")))?;

    let holder = HolderCommitment::new(commitment_hash, encryption_key)
        .map_err(|e| ApiError::bad_request(format!("validating holder commitment failed: {e}")))?;

    let date = NaiveDate::parse_from_str(&request.profile.date_of_birth, "%Y-%m-%d")
        .map_err(|e| ApiError::bad_request(format!("parsing profile date failed: {e}")))?;

    let alpha3 = nationality_to_alpha3(&request.profile.nationality).map_err(ApiError::from)?;

    let inputs = KycInputs {
        surname: request.profile.firstname.clone(),
        forename: request.profile.lastname.clone(),
        year_of_birth: date.year() as u16,
        month_of_birth: date.month() as u8,
        day_of_birth: date.day() as u8,
        citizenship: alpha3.clone(),
        postcode: request.profile.postcode.clone(),
        country: alpha3,
    };

    let certificate = state
        .issuer
        .create_certificate(&holder, inputs)
        .map_err(ApiError::from)?;

    info!(
        holder_commitment = %short_hash(&certificate.holder_commitment),
        user_id = %request.user_id,
        content_hash = %certificate.content_hash,
        "certificate created"
    );

    let callback = completion_callback(state.store.clone(), holder, request.user_id.clone());
    state
        .issuer
        .enqueue(certificate, callback)
        .await
        .map_err(|e| ApiError::internal(format!("adding cert to queue failed: {e}")))?;

    // An accepted request is pending until the completion callback
    // overwrites the marker with the encrypted certificate.
    state.store.mark_pending(&request.user_id).await;

    Ok(Json(GenerateCertResponse {
        status: CertificateStatus::Pending,
    }))
}

async fn get_cert(
    State(state): State<AppState>,
    Json(request): Json<GetCertRequest>,
) -> Result<Json<GetCertResponse>, ApiError> {
    info!(user_id = %request.user_id, "certificate status request");

    match state.store.get(&request.user_id).await {
        None => Err(ApiError::internal(
            "reading cert status failed: certificate not found",
        )),
        Some(bytes) if bytes.is_empty() => Ok(Json(GetCertResponse {
            status: CertificateStatus::Pending,
            certificate: None,
        })),
        Some(bytes) => {
            let certificate: Box<RawValue> = serde_json::from_slice(&bytes)
                .map_err(|e| ApiError::internal(format!("reading cert status failed: {e}")))?;
            Ok(Json(GetCertResponse {
                status: CertificateStatus::Done,
                certificate: Some(certificate),
            }))
        }
    }
}

/// The pipeline's completion callback: encrypt to the holder, JSON-encode,
/// replace the pending marker. Failures are logged, never propagated; the
/// pending entry then simply times out.
fn completion_callback(
    store: Arc<PendingStore>,
    holder: HolderCommitment,
    user_id: String,
) -> IssueCallback {
    Arc::new(move |result| {
        let store = store.clone();
        let holder = holder.clone();
        let user_id = user_id.clone();
        async move {
            let issued = match result {
                Ok(issued) => issued,
                Err(err) => {
                    error!(user_id = %user_id, error = %err, "certificate issuance failed");
                    return;
                }
            };

            info!(
                holder_commitment = %short_hash(&holder.commitment_hash),
                user_id = %user_id,
                "certificate issued"
            );

            let encrypted = match encrypt::encrypt_certificate(
                &holder.encryption_key,
                holder.commitment_hash,
                &issued,
            ) {
                Ok(encrypted) => encrypted,
                Err(err) => {
                    error!(user_id = %user_id, error = %err, "encrypting cert");
                    return;
                }
            };

            let bytes = match serde_json::to_vec(&encrypted) {
                Ok(bytes) => bytes,
                Err(err) => {
                    let err = IssuerError::Store(format!("marshaling cert: {err}"));
                    error!(user_id = %user_id, error = %err, "persisting cert");
                    return;
                }
            };

            store.put(&user_id, bytes).await;
            info!(user_id = %user_id, "certificate added to store");
        }
        .boxed()
    })
}

/// First few digits of a commitment, enough to correlate log lines.
fn short_hash(element: &FieldElement) -> String {
    let decimal = element.to_decimal();
    decimal.chars().take(6).collect()
}
