use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use woodhop_core::{AggregateId, CustomerId};
use woodhop_events::EventEnvelope;
use woodhop_parties::{CustomerEvent, CustomerType, StaffMember};

use super::cursor::{ProjectionError, StreamCursors, decode};
use super::Projection;
use crate::aggregate_types;
use crate::read_model::ReadStore;

/// Directory entry for an account. Credentials and pending codes stay on the
/// aggregate and never reach the read side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerView {
    pub customer_id: CustomerId,
    pub fullname: String,
    pub email: String,
    pub customer_type: CustomerType,
    pub location: String,
    pub verified: bool,
    pub staff: Vec<StaffMember>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CustomerDirectoryProjection<S>
where
    S: ReadStore<CustomerId, CustomerView>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> CustomerDirectoryProjection<S>
where
    S: ReadStore<CustomerId, CustomerView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, customer_id: &CustomerId) -> Option<CustomerView> {
        self.store.get(customer_id)
    }

    /// Accounts in registration order.
    pub fn list(&self) -> Vec<CustomerView> {
        let mut all = self.store.list();
        all.sort_by_key(|c| (c.registered_at, c.customer_id));
        all
    }

    /// Lookup by e-mail; the argument is compared case-insensitively.
    pub fn find_by_email(&self, email: &str) -> Option<CustomerView> {
        let wanted = email.trim().to_lowercase();
        self.store.list().into_iter().find(|c| c.email == wanted)
    }

    fn apply_event(&self, event: CustomerEvent) -> Result<(), ProjectionError> {
        if let CustomerEvent::CustomerRegistered(e) = event {
            self.store.upsert(
                e.customer_id,
                CustomerView {
                    customer_id: e.customer_id,
                    fullname: e.fullname,
                    email: e.email,
                    customer_type: e.customer_type,
                    location: e.location,
                    verified: false,
                    staff: vec![],
                    registered_at: e.occurred_at,
                },
            );
            return Ok(());
        }

        let customer_id = event.customer_id();
        let Some(mut view) = self.store.get(&customer_id) else {
            return Err(ProjectionError::StreamMismatch(format!(
                "event for unregistered customer {customer_id}"
            )));
        };

        match event {
            CustomerEvent::CustomerRegistered(_) | CustomerEvent::VerificationCodeIssued(_) => {}
            CustomerEvent::AccountVerified(_) => view.verified = true,
            CustomerEvent::ProfileUpdated(e) => {
                view.fullname = e.fullname;
                view.location = e.location;
                view.customer_type = e.customer_type;
            }
            CustomerEvent::StaffAdded(e) => view.staff.push(e.staff),
        }

        self.store.upsert(customer_id, view);
        Ok(())
    }
}

impl<S> Projection for CustomerDirectoryProjection<S>
where
    S: ReadStore<CustomerId, CustomerView>,
{
    fn name(&self) -> &'static str {
        "customers"
    }

    fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != aggregate_types::CUSTOMER {
            return Ok(());
        }

        self.cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number(), || {
                let event: CustomerEvent = decode(envelope)?;
                if AggregateId::from_uuid(*event.customer_id().as_uuid()) != envelope.aggregate_id() {
                    return Err(ProjectionError::StreamMismatch(
                        "customer_id does not match envelope aggregate_id".to_string(),
                    ));
                }
                self.apply_event(event)
            })
    }

    fn reset(&self) {
        self.cursors.clear();
        self.store.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projections::test_support::envelope;
    use crate::read_model::InMemoryReadStore;
    use woodhop_parties::{AccountVerified, CustomerRegistered, StaffAdded, StaffId, VerificationCodeIssued};

    fn registered(customer_id: CustomerId) -> CustomerEvent {
        CustomerEvent::CustomerRegistered(CustomerRegistered {
            customer_id,
            fullname: "Amina Okello".to_string(),
            email: "amina@woodhop.test".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            customer_type: CustomerType::Business,
            location: "Kampala".to_string(),
            verification_code: "123456".to_string(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn directory_tracks_verification_and_staff_without_secrets() {
        let p = CustomerDirectoryProjection::new(InMemoryReadStore::new());
        let customer_id = CustomerId::new();
        let agg = AggregateId::from_uuid(*customer_id.as_uuid());

        let events = vec![
            registered(customer_id),
            CustomerEvent::VerificationCodeIssued(VerificationCodeIssued {
                customer_id,
                code: "654321".to_string(),
                occurred_at: Utc::now(),
            }),
            CustomerEvent::AccountVerified(AccountVerified { customer_id, occurred_at: Utc::now() }),
            CustomerEvent::StaffAdded(StaffAdded {
                customer_id,
                staff: StaffMember {
                    staff_id: StaffId(AggregateId::new()),
                    fullname: "Joel".to_string(),
                    role: "Sawyer".to_string(),
                    email: None,
                    phone: None,
                    date_joined: Utc::now(),
                },
                occurred_at: Utc::now(),
            }),
        ];
        for (i, ev) in events.iter().enumerate() {
            p.apply_envelope(&envelope(aggregate_types::CUSTOMER, agg, i as u64 + 1, ev)).unwrap();
        }

        let view = p.find_by_email("  AMINA@woodhop.test ").unwrap();
        assert!(view.verified);
        assert_eq!(view.staff.len(), 1);

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("verification_code").is_none());
    }

    #[test]
    fn events_before_registration_are_rejected() {
        let p = CustomerDirectoryProjection::new(InMemoryReadStore::new());
        let customer_id = CustomerId::new();
        let agg = AggregateId::from_uuid(*customer_id.as_uuid());
        let ev = CustomerEvent::AccountVerified(AccountVerified { customer_id, occurred_at: Utc::now() });

        let err = p.apply_envelope(&envelope(aggregate_types::CUSTOMER, agg, 1, &ev)).unwrap_err();
        assert!(matches!(err, ProjectionError::StreamMismatch(_)));
        assert!(p.list().is_empty());
    }
}
