use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role carried in session tokens.
///
/// Storefront accounts get exactly one role named after their customer type;
/// the configured operator account gets `admin`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const INDIVIDUAL: Role = Role(Cow::Borrowed("individual"));
    pub const BUSINESS: Role = Role(Cow::Borrowed("business"));
    pub const CONTRACTOR: Role = Role(Cow::Borrowed("contractor"));
    pub const RETAILER: Role = Role(Cow::Borrowed("retailer"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
