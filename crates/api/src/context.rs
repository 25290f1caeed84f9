use uuid::Uuid;

use woodhop_auth::{Principal, PrincipalId, Role};
use woodhop_core::CustomerId;

/// Authenticated caller of a request (from a validated session token).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
    email: String,
    roles: Vec<Role>,
    token_id: Uuid,
}

impl PrincipalContext {
    pub fn new(principal_id: PrincipalId, email: String, roles: Vec<Role>, token_id: Uuid) -> Self {
        Self {
            principal_id,
            email,
            roles,
            token_id,
        }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    /// The caller's customer account (meaningless for the operator account).
    pub fn customer_id(&self) -> CustomerId {
        self.principal_id.as_customer_id()
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn token_id(&self) -> Uuid {
        self.token_id
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::ADMIN)
    }

    pub fn principal(&self) -> Principal {
        Principal {
            principal_id: self.principal_id,
            roles: self.roles.clone(),
            permissions: crate::authz::permissions_from_roles(&self.roles),
        }
    }
}
