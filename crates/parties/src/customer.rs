use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use woodhop_core::{Aggregate, AggregateId, AggregateRoot, CustomerId, DomainError, Entity};
use woodhop_events::Event;

/// Account type; decides which dashboard a customer sees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomerType {
    #[default]
    Individual,
    Business,
    Contractor,
    Retailer,
}

impl CustomerType {
    pub const ALL: [CustomerType; 4] = [
        CustomerType::Individual,
        CustomerType::Business,
        CustomerType::Contractor,
        CustomerType::Retailer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CustomerType::Individual => "Individual",
            CustomerType::Business => "Business",
            CustomerType::Contractor => "Contractor",
            CustomerType::Retailer => "Retailer",
        }
    }

    /// Business accounts are vendors: they own products and employ staff.
    pub fn is_vendor(self) -> bool {
        self == CustomerType::Business
    }
}

impl core::fmt::Display for CustomerType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for CustomerType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CustomerType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown customer type '{s}'")))
    }
}

/// Staff member identifier (unique within the employing customer).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaffId(pub AggregateId);

impl StaffId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for StaffId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A person employed by a Business customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub staff_id: StaffId,
    pub fullname: String,
    pub role: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_joined: DateTime<Utc>,
}

impl Entity for StaffMember {
    type Id = StaffId;

    fn id(&self) -> &Self::Id {
        &self.staff_id
    }
}

/// Aggregate root: Customer (an account, possibly a vendor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    id: CustomerId,
    fullname: String,
    email: String,
    password_hash: String,
    customer_type: CustomerType,
    location: String,
    verification_code: Option<String>,
    verified: bool,
    staff: Vec<StaffMember>,
    registered_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Customer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CustomerId) -> Self {
        Self {
            id,
            fullname: String::new(),
            email: String::new(),
            password_hash: String::new(),
            customer_type: CustomerType::default(),
            location: String::new(),
            verification_code: None,
            verified: false,
            staff: Vec::new(),
            registered_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn customer_type(&self) -> CustomerType {
        self.customer_type
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn verification_code(&self) -> Option<&str> {
        self.verification_code.as_deref()
    }

    pub fn is_verified(&self) -> bool {
        self.verified
    }

    pub fn staff(&self) -> &[StaffMember] {
        &self.staff
    }

    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterCustomer.
///
/// The password arrives already hashed; hashing belongs to the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCustomer {
    pub customer_id: CustomerId,
    pub fullname: String,
    pub email: String,
    pub password_hash: String,
    pub customer_type: CustomerType,
    pub location: String,
    pub verification_code: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: IssueVerificationCode (resend, or accounts that never had one).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueVerificationCode {
    pub customer_id: CustomerId,
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyAccount {
    pub customer_id: CustomerId,
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProfile {
    pub customer_id: CustomerId,
    pub fullname: Option<String>,
    pub location: Option<String>,
    pub customer_type: Option<CustomerType>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddStaff {
    pub customer_id: CustomerId,
    pub staff_id: StaffId,
    pub fullname: String,
    pub role: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerCommand {
    RegisterCustomer(RegisterCustomer),
    IssueVerificationCode(IssueVerificationCode),
    VerifyAccount(VerifyAccount),
    UpdateProfile(UpdateProfile),
    AddStaff(AddStaff),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRegistered {
    pub customer_id: CustomerId,
    pub fullname: String,
    pub email: String,
    pub password_hash: String,
    pub customer_type: CustomerType,
    pub location: String,
    pub verification_code: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCodeIssued {
    pub customer_id: CustomerId,
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountVerified {
    pub customer_id: CustomerId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProfileUpdated (full snapshot of the editable fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdated {
    pub customer_id: CustomerId,
    pub fullname: String,
    pub location: String,
    pub customer_type: CustomerType,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffAdded {
    pub customer_id: CustomerId,
    pub staff: StaffMember,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustomerEvent {
    CustomerRegistered(CustomerRegistered),
    VerificationCodeIssued(VerificationCodeIssued),
    AccountVerified(AccountVerified),
    ProfileUpdated(ProfileUpdated),
    StaffAdded(StaffAdded),
}

impl CustomerEvent {
    pub fn customer_id(&self) -> CustomerId {
        match self {
            CustomerEvent::CustomerRegistered(e) => e.customer_id,
            CustomerEvent::VerificationCodeIssued(e) => e.customer_id,
            CustomerEvent::AccountVerified(e) => e.customer_id,
            CustomerEvent::ProfileUpdated(e) => e.customer_id,
            CustomerEvent::StaffAdded(e) => e.customer_id,
        }
    }
}

impl Event for CustomerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::CustomerRegistered(_) => "parties.customer.registered",
            CustomerEvent::VerificationCodeIssued(_) => "parties.customer.verification_code_issued",
            CustomerEvent::AccountVerified(_) => "parties.customer.verified",
            CustomerEvent::ProfileUpdated(_) => "parties.customer.profile_updated",
            CustomerEvent::StaffAdded(_) => "parties.customer.staff_added",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CustomerEvent::CustomerRegistered(e) => e.occurred_at,
            CustomerEvent::VerificationCodeIssued(e) => e.occurred_at,
            CustomerEvent::AccountVerified(e) => e.occurred_at,
            CustomerEvent::ProfileUpdated(e) => e.occurred_at,
            CustomerEvent::StaffAdded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Customer {
    type Command = CustomerCommand;
    type Event = CustomerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CustomerEvent::CustomerRegistered(e) => {
                self.id = e.customer_id;
                self.fullname = e.fullname.clone();
                self.email = e.email.clone();
                self.password_hash = e.password_hash.clone();
                self.customer_type = e.customer_type;
                self.location = e.location.clone();
                self.verification_code = Some(e.verification_code.clone());
                self.verified = false;
                self.registered_at = Some(e.occurred_at);
                self.created = true;
            }
            CustomerEvent::VerificationCodeIssued(e) => {
                self.verification_code = Some(e.code.clone());
            }
            CustomerEvent::AccountVerified(_) => {
                self.verified = true;
                self.verification_code = None;
            }
            CustomerEvent::ProfileUpdated(e) => {
                self.fullname = e.fullname.clone();
                self.location = e.location.clone();
                self.customer_type = e.customer_type;
            }
            CustomerEvent::StaffAdded(e) => {
                self.staff.push(e.staff.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CustomerCommand::RegisterCustomer(cmd) => self.handle_register(cmd),
            CustomerCommand::IssueVerificationCode(cmd) => self.handle_issue_code(cmd),
            CustomerCommand::VerifyAccount(cmd) => self.handle_verify(cmd),
            CustomerCommand::UpdateProfile(cmd) => self.handle_update_profile(cmd),
            CustomerCommand::AddStaff(cmd) => self.handle_add_staff(cmd),
        }
    }
}

fn ensure_six_digits(code: &str) -> Result<(), DomainError> {
    if code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(DomainError::validation("verification code must be six digits"))
    }
}

/// Lower-cased, trimmed e-mail; rejects values without an `@`.
pub fn normalize_email(email: &str) -> Result<String, DomainError> {
    let email = email.trim().to_ascii_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(DomainError::validation("email must look like name@domain")),
    }
}

impl Customer {
    fn ensure_existing(&self, customer_id: CustomerId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != customer_id {
            return Err(DomainError::invariant("customer_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("customer already exists"));
        }
        if cmd.fullname.trim().is_empty() {
            return Err(DomainError::validation("fullname cannot be empty"));
        }
        let email = normalize_email(&cmd.email)?;
        if cmd.password_hash.is_empty() {
            return Err(DomainError::validation("password hash cannot be empty"));
        }
        ensure_six_digits(&cmd.verification_code)?;

        Ok(vec![CustomerEvent::CustomerRegistered(CustomerRegistered {
            customer_id: cmd.customer_id,
            fullname: cmd.fullname.trim().to_string(),
            email,
            password_hash: cmd.password_hash.clone(),
            customer_type: cmd.customer_type,
            location: cmd.location.trim().to_string(),
            verification_code: cmd.verification_code.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_issue_code(&self, cmd: &IssueVerificationCode) -> Result<Vec<CustomerEvent>, DomainError> {
        self.ensure_existing(cmd.customer_id)?;
        if self.verified {
            return Err(DomainError::conflict("account is already verified"));
        }
        ensure_six_digits(&cmd.code)?;

        Ok(vec![CustomerEvent::VerificationCodeIssued(VerificationCodeIssued {
            customer_id: cmd.customer_id,
            code: cmd.code.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_verify(&self, cmd: &VerifyAccount) -> Result<Vec<CustomerEvent>, DomainError> {
        self.ensure_existing(cmd.customer_id)?;
        if self.verified {
            return Err(DomainError::conflict("account is already verified"));
        }
        if self.verification_code.as_deref() != Some(cmd.code.trim()) {
            return Err(DomainError::validation("invalid verification code"));
        }

        Ok(vec![CustomerEvent::AccountVerified(AccountVerified {
            customer_id: cmd.customer_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_profile(&self, cmd: &UpdateProfile) -> Result<Vec<CustomerEvent>, DomainError> {
        self.ensure_existing(cmd.customer_id)?;

        if cmd.fullname.is_none() && cmd.location.is_none() && cmd.customer_type.is_none() {
            return Ok(vec![]);
        }

        let fullname = cmd
            .fullname
            .as_deref()
            .map(str::trim)
            .unwrap_or(&self.fullname)
            .to_string();
        if fullname.is_empty() {
            return Err(DomainError::validation("fullname cannot be empty"));
        }

        let customer_type = cmd.customer_type.unwrap_or(self.customer_type);
        if !customer_type.is_vendor() && !self.staff.is_empty() {
            return Err(DomainError::invariant(
                "a customer with staff must stay a Business account",
            ));
        }

        Ok(vec![CustomerEvent::ProfileUpdated(ProfileUpdated {
            customer_id: cmd.customer_id,
            fullname,
            location: cmd
                .location
                .as_deref()
                .map(str::trim)
                .unwrap_or(&self.location)
                .to_string(),
            customer_type,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_staff(&self, cmd: &AddStaff) -> Result<Vec<CustomerEvent>, DomainError> {
        self.ensure_existing(cmd.customer_id)?;
        if !self.customer_type.is_vendor() {
            return Err(DomainError::invariant("only Business customers can add staff"));
        }
        if cmd.fullname.trim().is_empty() {
            return Err(DomainError::validation("staff fullname cannot be empty"));
        }
        if cmd.role.trim().is_empty() {
            return Err(DomainError::validation("staff role cannot be empty"));
        }
        if self.staff.iter().any(|s| s.id() == &cmd.staff_id) {
            return Err(DomainError::conflict("staff member already exists"));
        }

        Ok(vec![CustomerEvent::StaffAdded(StaffAdded {
            customer_id: cmd.customer_id,
            staff: StaffMember {
                staff_id: cmd.staff_id,
                fullname: cmd.fullname.trim().to_string(),
                role: cmd.role.trim().to_string(),
                email: cmd.email.clone().filter(|e| !e.trim().is_empty()),
                phone: cmd.phone.clone().filter(|p| !p.trim().is_empty()),
                date_joined: cmd.occurred_at,
            },
            occurred_at: cmd.occurred_at,
        })])
    }
}
