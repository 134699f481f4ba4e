//! KYC profile inputs and their finite-field encoding.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::crypto::field::FieldElement;
use crate::crypto::poseidon;
use crate::error::IssuerError;

/// Strings up to this many bytes fit a single field element without
/// reduction.
const STRING_CHUNK: usize = 31;

/// Cleartext KYC profile. Nationality fields carry ISO-3166 alpha-3 codes;
/// the alpha-2 form used on the wire is mapped at the API boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KycInputs {
    pub surname: String,
    pub forename: String,
    pub year_of_birth: u16,
    pub month_of_birth: u8,
    pub day_of_birth: u8,
    pub citizenship: String,
    pub postcode: String,
    pub country: String,
}

impl KycInputs {
    pub fn validate(&self) -> Result<(), IssuerError> {
        if self.surname.trim().is_empty() {
            return Err(IssuerError::InvalidInput("surname must not be empty".into()));
        }
        if self.forename.trim().is_empty() {
            return Err(IssuerError::InvalidInput(
                "forename must not be empty".into(),
            ));
        }
        NaiveDate::from_ymd_opt(
            i32::from(self.year_of_birth),
            u32::from(self.month_of_birth),
            u32::from(self.day_of_birth),
        )
        .ok_or_else(|| {
            IssuerError::InvalidInput(format!(
                "not a calendar date: {:04}-{:02}-{:02}",
                self.year_of_birth, self.month_of_birth, self.day_of_birth
            ))
        })?;
        validate_alpha3(&self.citizenship)?;
        validate_alpha3(&self.country)?;
        Ok(())
    }

    /// Deterministically encode the profile into field elements.
    pub fn ff_encode(&self) -> Result<KycContent, IssuerError> {
        self.validate()?;
        Ok(KycContent {
            surname: encode_string(&self.surname),
            forename: encode_string(&self.forename),
            year_of_birth: self.year_of_birth,
            month_of_birth: self.month_of_birth,
            day_of_birth: self.day_of_birth,
            citizenship: encode_string(&self.citizenship),
            postcode: encode_string(&self.postcode),
            country: encode_string(&self.country),
        })
    }
}

/// The finite-field encoded profile carried inside a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KycContent {
    pub surname: FieldElement,
    pub forename: FieldElement,
    pub year_of_birth: u16,
    pub month_of_birth: u8,
    pub day_of_birth: u8,
    pub citizenship: FieldElement,
    pub postcode: FieldElement,
    pub country: FieldElement,
}

impl KycContent {
    /// Poseidon hash over the encoded fields in declaration order.
    pub fn hash(&self) -> FieldElement {
        poseidon::hash(&[
            self.surname,
            self.forename,
            FieldElement::from_u64(u64::from(self.year_of_birth)),
            FieldElement::from_u64(u64::from(self.month_of_birth)),
            FieldElement::from_u64(u64::from(self.day_of_birth)),
            self.citizenship,
            self.postcode,
            self.country,
        ])
    }
}

/// Map an ISO-3166 alpha-2 country code to its alpha-3 form.
pub fn nationality_to_alpha3(alpha2: &str) -> Result<String, IssuerError> {
    isocountry::CountryCode::for_alpha2(alpha2)
        .map(|country| country.alpha3().to_string())
        .map_err(|_| IssuerError::InvalidInput(format!("unknown nationality code {alpha2:?}")))
}

fn validate_alpha3(code: &str) -> Result<(), IssuerError> {
    if code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(IssuerError::InvalidInput(format!(
            "not an ISO-3166 alpha-3 code: {code:?}"
        )))
    }
}

/// Injective for strings up to 31 bytes; longer strings are chunked and
/// compressed with Poseidon.
fn encode_string(s: &str) -> FieldElement {
    let bytes = s.as_bytes();
    if bytes.len() <= STRING_CHUNK {
        return FieldElement::from_be_bytes_mod_order(bytes);
    }
    let chunks: Vec<FieldElement> = bytes
        .chunks(STRING_CHUNK)
        .map(FieldElement::from_be_bytes_mod_order)
        .collect();
    poseidon::hash(&chunks)
}
