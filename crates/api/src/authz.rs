//! API-side authorization guard for commands.
//!
//! Enforced at the command boundary (before dispatch); domain aggregates and
//! infra stay auth-agnostic.

use woodhop_auth::{AuthzError, CommandAuthorization, Permission, PrincipalId, Role, authorize, authorize_owner};
use woodhop_core::CustomerId;
use woodhop_parties::CustomerType;

use crate::context::PrincipalContext;

pub const CATALOG_WRITE: &str = "catalog.products.write";
pub const INVENTORY_WRITE: &str = "inventory.write";
pub const STAFF_WRITE: &str = "parties.staff.write";
pub const ORDERS_PLACE: &str = "sales.orders.place";
pub const BULK_ORDER: &str = "sales.orders.bulk";
pub const SUPPLIERS_WRITE: &str = "parties.suppliers.write";
pub const DIRECTORY_READ: &str = "parties.customers.read";
pub const DELIVERIES_MANAGE: &str = "sales.deliveries.manage";
pub const ORDERS_MANAGE: &str = "sales.orders.manage";

/// Check every permission a command needs in the current request context.
pub fn authorize_command<C: CommandAuthorization>(principal: &PrincipalContext, command: &C) -> Result<(), AuthzError> {
    let principal = principal.principal();
    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }
    Ok(())
}

/// Owner-or-admin check for a vendor resource.
pub fn authorize_vendor(principal: &PrincipalContext, vendor: Option<CustomerId>) -> Result<(), AuthzError> {
    authorize_owner(&principal.principal(), vendor.map(PrincipalId::from))
}

/// Owner-or-admin check for a customer's own records (orders, profile).
pub fn authorize_account(principal: &PrincipalContext, owner: CustomerId) -> Result<(), AuthzError> {
    authorize_owner(&principal.principal(), Some(PrincipalId::from(owner)))
}

/// The session role of a storefront account.
pub fn role_for(customer_type: CustomerType) -> Role {
    match customer_type {
        CustomerType::Individual => Role::INDIVIDUAL,
        CustomerType::Business => Role::BUSINESS,
        CustomerType::Contractor => Role::CONTRACTOR,
        CustomerType::Retailer => Role::RETAILER,
    }
}

/// Role → permission mapping.
///
/// `admin` grants everything. Every storefront account can order; vendors
/// (Business accounts) manage their catalog, stock and staff; trade accounts
/// can place bulk orders.
pub fn permissions_from_roles(roles: &[Role]) -> Vec<Permission> {
    if roles.contains(&Role::ADMIN) {
        return vec![Permission::WILDCARD];
    }

    let mut perms = Vec::new();
    let customer_roles = [Role::INDIVIDUAL, Role::BUSINESS, Role::CONTRACTOR, Role::RETAILER];
    if roles.iter().any(|r| customer_roles.contains(r)) {
        perms.push(Permission::new(ORDERS_PLACE));
    }
    if roles.contains(&Role::BUSINESS) {
        perms.extend([CATALOG_WRITE, INVENTORY_WRITE, STAFF_WRITE].map(Permission::new));
    }
    if roles.iter().any(|r| [Role::BUSINESS, Role::CONTRACTOR, Role::RETAILER].contains(r)) {
        perms.push(Permission::new(BULK_ORDER));
    }
    perms
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ctx(role: Role) -> PrincipalContext {
        PrincipalContext::new(PrincipalId::new(), "a@b.test".to_string(), vec![role], Uuid::now_v7())
    }

    struct Needs(Vec<Permission>);

    impl CommandAuthorization for Needs {
        fn required_permissions(&self) -> &[Permission] {
            &self.0
        }
    }

    #[test]
    fn vendors_manage_catalog_shoppers_do_not() {
        let create = Needs(vec![Permission::new(CATALOG_WRITE)]);
        assert!(authorize_command(&ctx(Role::BUSINESS), &create).is_ok());
        assert!(authorize_command(&ctx(Role::ADMIN), &create).is_ok());
        assert_eq!(
            authorize_command(&ctx(Role::INDIVIDUAL), &create),
            Err(AuthzError::Forbidden(CATALOG_WRITE.to_string()))
        );
    }

    #[test]
    fn bulk_orders_need_a_trade_account() {
        let bulk = Needs(vec![Permission::new(BULK_ORDER)]);
        assert!(authorize_command(&ctx(Role::CONTRACTOR), &bulk).is_ok());
        assert!(authorize_command(&ctx(Role::INDIVIDUAL), &bulk).is_err());
    }

    #[test]
    fn only_the_vendor_touches_its_products() {
        let vendor = ctx(Role::BUSINESS);
        assert!(authorize_vendor(&vendor, Some(vendor.customer_id())).is_ok());
        assert_eq!(authorize_vendor(&vendor, Some(CustomerId::new())), Err(AuthzError::NotOwner));
        assert_eq!(authorize_vendor(&vendor, None), Err(AuthzError::NotOwner));
        assert!(authorize_vendor(&ctx(Role::ADMIN), None).is_ok());
    }

    #[test]
    fn accounts_see_only_their_own_records() {
        let shopper = ctx(Role::INDIVIDUAL);
        assert!(authorize_account(&shopper, shopper.customer_id()).is_ok());
        assert_eq!(authorize_account(&shopper, CustomerId::new()), Err(AuthzError::NotOwner));
        assert_eq!(role_for(CustomerType::Retailer), Role::RETAILER);
    }
}
