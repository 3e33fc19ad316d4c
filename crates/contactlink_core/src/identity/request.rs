//! Normalized identify input.

use super::IdentifyError;

/// Validated identifiers of one identify submission.
///
/// Empty strings count as absent. Everything else is kept verbatim, since
/// matching is exact: no trimming and no case folding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyRequest {
    email: Option<String>,
    phone_number: Option<String>,
}

impl IdentifyRequest {
    /// # Errors
    /// - `InvalidInput` when both identifiers are absent or empty.
    pub fn new(email: Option<&str>, phone_number: Option<&str>) -> Result<Self, IdentifyError> {
        let email = normalize_identifier(email);
        let phone_number = normalize_identifier(phone_number);
        if email.is_none() && phone_number.is_none() {
            return Err(IdentifyError::InvalidInput);
        }
        Ok(Self {
            email,
            phone_number,
        })
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }
}

fn normalize_identifier(value: Option<&str>) -> Option<String> {
    value
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
