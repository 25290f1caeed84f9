//! `woodhop-auth`: authentication and authorization boundary.
//!
//! Token signing/verification, password hashing and verification codes live
//! here; the HTTP layer only extracts headers and maps errors.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod verification;

pub use authorize::{AuthzError, CommandAuthorization, Principal, authorize, authorize_owner};
pub use claims::{JwtClaims, LoginLinkClaims, TokenValidationError, validate_claims};
pub use jwt::{AuthError, Hs256JwtValidator, JwtValidator, TokenIssuer};
pub use password::{PasswordHasher, hash_password, verify_password};
pub use permissions::Permission;
pub use principal::PrincipalId;
pub use roles::Role;
pub use verification::{VerificationCode, generate_verification_code};
