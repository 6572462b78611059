//! Customer domain events.
//!
//! Payloads are replayed for the life of the stream, so field names never
//! change; fields added later must default when absent.

use common::AggregateId;
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{Address, Contact, LifecycleState, Person};

/// Events that can occur on a customer aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CustomerEvent {
    CustomerCreated(CustomerCreated),
    PersonChanged(PersonChanged),
    ContactChanged(ContactChanged),
    AddressChanged(AddressChanged),
    CustomerDeleted(CustomerDeleted),
}

impl DomainEvent for CustomerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::CustomerCreated(_) => "CustomerCreated",
            CustomerEvent::PersonChanged(_) => "PersonChanged",
            CustomerEvent::ContactChanged(_) => "ContactChanged",
            CustomerEvent::AddressChanged(_) => "AddressChanged",
            CustomerEvent::CustomerDeleted(_) => "CustomerDeleted",
        }
    }

    fn aggregate_id(&self) -> AggregateId {
        match self {
            CustomerEvent::CustomerCreated(e) => e.aggregate_id,
            CustomerEvent::PersonChanged(e) => e.aggregate_id,
            CustomerEvent::ContactChanged(e) => e.aggregate_id,
            CustomerEvent::AddressChanged(e) => e.aggregate_id,
            CustomerEvent::CustomerDeleted(e) => e.aggregate_id,
        }
    }

    fn version(&self) -> Version {
        match self {
            CustomerEvent::CustomerCreated(e) => e.version,
            CustomerEvent::PersonChanged(e) => e.version,
            CustomerEvent::ContactChanged(e) => e.version,
            CustomerEvent::AddressChanged(e) => e.version,
            CustomerEvent::CustomerDeleted(e) => e.version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerCreated {
    pub aggregate_id: AggregateId,
    pub version: Version,
    pub person: Person,
    pub contact: Contact,
    pub address: Address,
    #[serde(default)]
    pub state: LifecycleState,
}

/// Replaces the name and identity documents. The date of birth is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonChanged {
    pub aggregate_id: AggregateId,
    pub version: Version,
    pub first_name: String,
    pub last_name: String,
    pub id_card: String,
    pub id_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactChanged {
    pub aggregate_id: AggregateId,
    pub version: Version,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressChanged {
    pub aggregate_id: AggregateId,
    pub version: Version,
    pub street: String,
    pub house_number: String,
    pub zip: String,
    pub city: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerDeleted {
    pub aggregate_id: AggregateId,
    pub version: Version,
    #[serde(default = "closed")]
    pub state: LifecycleState,
}

fn closed() -> LifecycleState {
    LifecycleState::Closed
}
