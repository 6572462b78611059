//! Customer aggregate.

use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, AggregateError, AggregateRoot, DomainEvent};

use super::{
    Address, Contact, CustomerEvent, LifecycleState, Person,
    events::{
        AddressChanged, ContactChanged, CustomerCreated, CustomerDeleted, PersonChanged,
    },
};

/// State of a bank customer.
///
/// Identity and version live on the [`AggregateRoot`] driving it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    person: Person,
    contact: Contact,
    address: Address,
    state: LifecycleState,
}

impl Aggregate for Customer {
    type Event = CustomerEvent;

    fn aggregate_type() -> &'static str {
        "Customer"
    }

    fn init(event: &CustomerEvent) -> Result<Self, AggregateError> {
        match event {
            CustomerEvent::CustomerCreated(data) => Ok(Customer {
                person: data.person.clone(),
                contact: data.contact.clone(),
                address: data.address.clone(),
                state: data.state,
            }),
            other => Err(AggregateError::Uninitialized {
                event_type: other.event_type(),
            }),
        }
    }

    fn apply(&mut self, event: &CustomerEvent) -> Result<(), AggregateError> {
        match event {
            CustomerEvent::CustomerCreated(data) => {
                return Err(AggregateError::AlreadyCreated {
                    aggregate_id: data.aggregate_id,
                });
            }
            CustomerEvent::PersonChanged(data) => {
                self.person.first_name = data.first_name.clone();
                self.person.last_name = data.last_name.clone();
                self.person.id_card = data.id_card.clone();
                self.person.id_number = data.id_number.clone();
            }
            CustomerEvent::ContactChanged(data) => {
                self.contact = Contact::new(&data.email, &data.phone);
            }
            CustomerEvent::AddressChanged(data) => {
                self.address = Address::new(
                    &data.street,
                    &data.house_number,
                    &data.zip,
                    &data.city,
                    &data.state,
                );
            }
            CustomerEvent::CustomerDeleted(data) => {
                self.state = data.state;
            }
        }
        Ok(())
    }
}

// Query methods
impl Customer {
    pub fn person(&self) -> &Person {
        &self.person
    }

    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }
}

// Intent operations. Each records exactly one event stamped with the
// version it establishes. Business rules are checked by the caller.
impl AggregateRoot<Customer> {
    /// Brings a brand-new customer to life in the `Open` state.
    pub fn create(
        &mut self,
        id: AggregateId,
        person: Person,
        contact: Contact,
        address: Address,
    ) -> Result<(), AggregateError> {
        let event = CustomerEvent::CustomerCreated(CustomerCreated {
            aggregate_id: id,
            version: self.next_version(),
            person,
            contact,
            address,
            state: LifecycleState::Open,
        });
        self.record(event)
    }

    pub fn change_person(
        &mut self,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        id_card: impl Into<String>,
        id_number: impl Into<String>,
    ) -> Result<(), AggregateError> {
        let event = CustomerEvent::PersonChanged(PersonChanged {
            aggregate_id: self.stream_id("PersonChanged")?,
            version: self.next_version(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            id_card: id_card.into(),
            id_number: id_number.into(),
        });
        self.record(event)
    }

    pub fn change_contact(
        &mut self,
        email: impl Into<String>,
        phone: impl Into<String>,
    ) -> Result<(), AggregateError> {
        let event = CustomerEvent::ContactChanged(ContactChanged {
            aggregate_id: self.stream_id("ContactChanged")?,
            version: self.next_version(),
            email: email.into(),
            phone: phone.into(),
        });
        self.record(event)
    }

    pub fn change_address(&mut self, address: Address) -> Result<(), AggregateError> {
        let event = CustomerEvent::AddressChanged(AddressChanged {
            aggregate_id: self.stream_id("AddressChanged")?,
            version: self.next_version(),
            street: address.street,
            house_number: address.house_number,
            zip: address.zip,
            city: address.city,
            state: address.state,
        });
        self.record(event)
    }

    /// Closes the customer. History stays readable.
    pub fn delete(&mut self) -> Result<(), AggregateError> {
        let event = CustomerEvent::CustomerDeleted(CustomerDeleted {
            aggregate_id: self.stream_id("CustomerDeleted")?,
            version: self.next_version(),
            state: LifecycleState::Closed,
        });
        self.record(event)
    }

    fn stream_id(&self, event_type: &'static str) -> Result<AggregateId, AggregateError> {
        self.id()
            .ok_or(AggregateError::Uninitialized { event_type })
    }
}
