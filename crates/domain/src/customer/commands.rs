//! Customer commands.

use common::AggregateId;

use super::{Address, Contact, CustomerError, Person};

fn require(field: &'static str, value: &str) -> Result<(), CustomerError> {
    if value.trim().is_empty() {
        return Err(CustomerError::Required { field });
    }
    Ok(())
}

/// Command to register a new customer.
#[derive(Debug, Clone)]
pub struct CreateCustomer {
    pub customer_id: AggregateId,
    pub person: Person,
    pub contact: Contact,
    pub address: Address,
}

impl CreateCustomer {
    pub fn new(customer_id: AggregateId, person: Person, contact: Contact, address: Address) -> Self {
        Self {
            customer_id,
            person,
            contact,
            address,
        }
    }

    /// Creates the command with a generated customer ID.
    pub fn generate(person: Person, contact: Contact, address: Address) -> Self {
        Self::new(AggregateId::new(), person, contact, address)
    }

    pub(crate) fn validate(&self) -> Result<(), CustomerError> {
        require("first_name", &self.person.first_name)?;
        require("last_name", &self.person.last_name)?;
        require("email", &self.contact.email)
    }
}

/// Command to replace a customer's name and identity documents.
#[derive(Debug, Clone)]
pub struct ChangePerson {
    pub customer_id: AggregateId,
    pub first_name: String,
    pub last_name: String,
    pub id_card: String,
    pub id_number: String,
}

impl ChangePerson {
    pub fn new(
        customer_id: AggregateId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        id_card: impl Into<String>,
        id_number: impl Into<String>,
    ) -> Self {
        Self {
            customer_id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            id_card: id_card.into(),
            id_number: id_number.into(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), CustomerError> {
        require("first_name", &self.first_name)?;
        require("last_name", &self.last_name)
    }
}

#[derive(Debug, Clone)]
pub struct ChangeContact {
    pub customer_id: AggregateId,
    pub email: String,
    pub phone: String,
}

impl ChangeContact {
    pub fn new(customer_id: AggregateId, email: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            customer_id,
            email: email.into(),
            phone: phone.into(),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), CustomerError> {
        require("email", &self.email)
    }
}

#[derive(Debug, Clone)]
pub struct ChangeAddress {
    pub customer_id: AggregateId,
    pub address: Address,
}

impl ChangeAddress {
    pub fn new(customer_id: AggregateId, address: Address) -> Self {
        Self {
            customer_id,
            address,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeleteCustomer {
    pub customer_id: AggregateId,
}

impl DeleteCustomer {
    pub fn new(customer_id: AggregateId) -> Self {
        Self { customer_id }
    }
}
