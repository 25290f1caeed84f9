//! Parties domain module: customer accounts (with vendor staff) and suppliers.
//!
//! Pure domain logic; passwords arrive pre-hashed and codes pre-generated.

pub mod customer;
pub mod supplier;

pub use customer::{
    AccountVerified, AddStaff, Customer, CustomerCommand, CustomerEvent, CustomerRegistered,
    CustomerType, IssueVerificationCode, ProfileUpdated, RegisterCustomer, StaffAdded, StaffId,
    StaffMember, UpdateProfile, VerificationCodeIssued, VerifyAccount, normalize_email,
};
pub use supplier::{
    LinkProduct, ProductLinked, RegisterSupplier, SuppliedProduct, Supplier, SupplierCommand,
    SupplierEvent, SupplierId, SupplierRegistered, SupplierUpdated, UpdateSupplier,
};
