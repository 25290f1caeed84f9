//! Six-digit e-mail verification codes.

use rand::Rng;
use serde::{Deserialize, Serialize};
use woodhop_core::DomainError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationCode(String);

impl VerificationCode {
    pub const LEN: usize = 6;

    /// Accepts exactly six ASCII digits (surrounding whitespace ignored).
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let code = raw.trim();
        if code.len() != Self::LEN || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation("verification code must be six digits"));
        }
        Ok(Self(code.to_string()))
    }

    /// Join per-digit form inputs (`code_1` .. `code_6`) into one code.
    pub fn from_digits<'a>(digits: impl IntoIterator<Item = &'a str>) -> Result<Self, DomainError> {
        let joined: String = digits.into_iter().map(str::trim).collect();
        Self::parse(&joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for VerificationCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn generate_verification_code() -> VerificationCode {
    let n: u32 = rand::rng().random_range(100_000..=999_999);
    VerificationCode(n.to_string())
}
