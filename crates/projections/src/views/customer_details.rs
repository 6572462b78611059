//! Customer details, read from the reconstructed aggregate.

use chrono::NaiveDate;
use common::AggregateId;
use domain::{AggregateRoot, Customer, LifecycleState, Reconstructor};
use event_store::{EventStore, Version};
use serde::Serialize;

use crate::{ProjectionError, Result};

/// Flat view of a customer's latest state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerReadModel {
    pub aggregate_id: AggregateId,
    pub version: Version,
    pub state: LifecycleState,
    pub first_name: String,
    pub last_name: String,
    pub id_card: String,
    pub id_number: String,
    pub date_of_birth: NaiveDate,
    pub email: String,
    pub phone: String,
    pub street: String,
    pub house_number: String,
    pub zip: String,
    pub city: String,
    pub region: String,
}

impl CustomerReadModel {
    /// `None` for a root that has not been created.
    pub fn from_root(root: &AggregateRoot<Customer>) -> Option<Self> {
        let (aggregate_id, version, customer) = (root.id()?, root.version()?, root.state()?);
        let person = customer.person();
        let contact = customer.contact();
        let address = customer.address();

        Some(Self {
            aggregate_id,
            version,
            state: customer.state(),
            first_name: person.first_name.clone(),
            last_name: person.last_name.clone(),
            id_card: person.id_card.clone(),
            id_number: person.id_number.clone(),
            date_of_birth: person.date_of_birth,
            email: contact.email.clone(),
            phone: contact.phone.clone(),
            street: address.street.clone(),
            house_number: address.house_number.clone(),
            zip: address.zip.clone(),
            city: address.city.clone(),
            region: address.state.clone(),
        })
    }
}

/// Point lookups that always reflect the log, with no projection lag.
pub struct CustomerQueries<S> {
    reconstructor: Reconstructor<S, Customer>,
}

impl<S: EventStore> CustomerQueries<S> {
    pub fn new(store: S) -> Self {
        Self {
            reconstructor: Reconstructor::new(store),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_customer_by_id(&self, aggregate_id: AggregateId) -> Result<CustomerReadModel> {
        self.reconstructor
            .reconstruct_if_exists(aggregate_id)
            .await?
            .as_ref()
            .and_then(CustomerReadModel::from_root)
            .ok_or(ProjectionError::CustomerNotFound(aggregate_id))
    }
}
