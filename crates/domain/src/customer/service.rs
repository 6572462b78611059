//! Customer service: the business rules in front of the aggregate.

use common::AggregateId;
use event_store::EventStore;

use crate::aggregate::{AggregateRoot, SnapshotPolicy};
use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;

use super::{
    ChangeAddress, ChangeContact, ChangePerson, CreateCustomer, Customer, CustomerError,
    DeleteCustomer,
};

/// Service for managing customers.
///
/// The aggregate records whatever it is asked to; this service is where a
/// closed customer stops accepting changes and a customer can only be
/// created once.
pub struct CustomerService<S: EventStore> {
    handler: CommandHandler<S, Customer>,
}

impl<S: EventStore> CustomerService<S> {
    /// Creates a new customer service with the given event store.
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn with_snapshot_policy(store: S, policy: SnapshotPolicy) -> Self {
        Self {
            handler: CommandHandler::new(store).with_snapshot_policy(policy),
        }
    }

    /// Returns a reference to the underlying command handler.
    pub fn handler(&self) -> &CommandHandler<S, Customer> {
        &self.handler
    }

    #[tracing::instrument(skip(self, cmd), fields(customer_id = %cmd.customer_id))]
    pub async fn create_customer(
        &self,
        cmd: CreateCustomer,
    ) -> Result<CommandResult<Customer>, DomainError> {
        cmd.validate()?;
        let CreateCustomer {
            customer_id,
            person,
            contact,
            address,
        } = cmd;

        self.handler
            .execute(customer_id, |root| {
                if root.is_created() {
                    return Err(CustomerError::AlreadyCreated {
                        aggregate_id: customer_id,
                    }
                    .into());
                }
                root.create(customer_id, person, contact, address)?;
                Ok(())
            })
            .await
    }

    #[tracing::instrument(skip(self, cmd), fields(customer_id = %cmd.customer_id))]
    pub async fn change_person(
        &self,
        cmd: ChangePerson,
    ) -> Result<CommandResult<Customer>, DomainError> {
        cmd.validate()?;
        self.handler
            .execute(cmd.customer_id, |root| {
                ensure_open(root, cmd.customer_id)?;
                root.change_person(cmd.first_name, cmd.last_name, cmd.id_card, cmd.id_number)?;
                Ok(())
            })
            .await
    }

    #[tracing::instrument(skip(self, cmd), fields(customer_id = %cmd.customer_id))]
    pub async fn change_contact(
        &self,
        cmd: ChangeContact,
    ) -> Result<CommandResult<Customer>, DomainError> {
        cmd.validate()?;
        self.handler
            .execute(cmd.customer_id, |root| {
                ensure_open(root, cmd.customer_id)?;
                root.change_contact(cmd.email, cmd.phone)?;
                Ok(())
            })
            .await
    }

    #[tracing::instrument(skip(self, cmd), fields(customer_id = %cmd.customer_id))]
    pub async fn change_address(
        &self,
        cmd: ChangeAddress,
    ) -> Result<CommandResult<Customer>, DomainError> {
        self.handler
            .execute(cmd.customer_id, |root| {
                ensure_open(root, cmd.customer_id)?;
                root.change_address(cmd.address)?;
                Ok(())
            })
            .await
    }

    #[tracing::instrument(skip(self, cmd), fields(customer_id = %cmd.customer_id))]
    pub async fn delete_customer(
        &self,
        cmd: DeleteCustomer,
    ) -> Result<CommandResult<Customer>, DomainError> {
        self.handler
            .execute(cmd.customer_id, |root| {
                ensure_open(root, cmd.customer_id)?;
                root.delete()?;
                Ok(())
            })
            .await
    }

    /// Loads a customer by ID.
    ///
    /// Returns None if the customer doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_customer(
        &self,
        customer_id: AggregateId,
    ) -> Result<Option<AggregateRoot<Customer>>, DomainError> {
        self.handler
            .reconstructor()
            .reconstruct_if_exists(customer_id)
            .await
    }
}

fn ensure_open(root: &AggregateRoot<Customer>, customer_id: AggregateId) -> Result<(), DomainError> {
    match root.state() {
        None => Err(DomainError::NotFound {
            aggregate_type: "Customer",
            aggregate_id: customer_id,
        }),
        Some(customer) if customer.is_closed() => Err(CustomerError::Closed {
            aggregate_id: customer_id,
        }
        .into()),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use event_store::{InMemoryEventStore, Version};

    use super::*;
    use crate::customer::{Address, Contact, Person};

    /// Collects every field recorded on a new span as `name=value`.
    #[derive(Clone, Default)]
    struct SpanFields(std::sync::Arc<std::sync::Mutex<Vec<String>>>);

    impl tracing::field::Visit for SpanFields {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            self.0.lock().unwrap().push(format!("{}={:?}", field.name(), value));
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SpanFields {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::span::Id,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            attrs.record(&mut self.clone());
        }
    }

    fn create_command() -> CreateCustomer {
        CreateCustomer::generate(
            Person::new(
                "Ada",
                "Lovelace",
                NaiveDate::from_ymd_opt(1815, 12, 10).unwrap(),
                "X1",
                "N1",
            ),
            Contact::new("ada@x.io", "555"),
            Address::new("Main", "1", "1000", "Springfield", "Open"),
        )
    }

    #[tokio::test]
    async fn create_twice_is_rejected() {
        let service = CustomerService::new(InMemoryEventStore::new());
        let cmd = create_command();
        service.create_customer(cmd.clone()).await.unwrap();

        let err = service.create_customer(cmd).await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::Customer(CustomerError::AlreadyCreated { .. })
        ));
    }

    #[tokio::test]
    async fn closed_customer_rejects_changes() {
        let store = InMemoryEventStore::new();
        let service = CustomerService::new(store.clone());
        let cmd = create_command();
        let id = cmd.customer_id;
        service.create_customer(cmd).await.unwrap();
        service.delete_customer(DeleteCustomer::new(id)).await.unwrap();

        let err = service
            .change_contact(ChangeContact::new(id, "late@x.io", "000"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Customer(CustomerError::Closed { .. })));
        assert!(!err.is_retryable());

        let err = service
            .delete_customer(DeleteCustomer::new(id))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Customer(CustomerError::Closed { .. })));
        assert_eq!(store.event_count().await, 2);
    }

    #[tokio::test]
    async fn change_of_unknown_customer_is_not_found() {
        let service = CustomerService::new(InMemoryEventStore::new());
        let err = service
            .change_person(ChangePerson::new(AggregateId::new(), "A", "B", "C", "D"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn get_customer_reflects_changes() {
        let service = CustomerService::new(InMemoryEventStore::new());
        let cmd = create_command();
        let id = cmd.customer_id;
        service.create_customer(cmd).await.unwrap();
        service
            .change_address(ChangeAddress::new(
                id,
                Address::new("Elm", "7", "2000", "Shelbyville", "North"),
            ))
            .await
            .unwrap();

        let root = service.get_customer(id).await.unwrap().unwrap();
        assert_eq!(root.version(), Some(Version::new(1)));
        assert_eq!(root.state().unwrap().address().street, "Elm");
        assert!(service.get_customer(AggregateId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn command_spans_record_only_the_customer_id() {
        use tracing_subscriber::layer::SubscriberExt;

        let fields = SpanFields::default();
        let _guard =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(fields.clone()));

        let service = CustomerService::new(InMemoryEventStore::new());
        let cmd = create_command();
        let id = cmd.customer_id;
        service.create_customer(cmd).await.unwrap();
        service
            .change_contact(ChangeContact::new(id, "private@x.io", "999"))
            .await
            .unwrap();

        let recorded = fields.0.lock().unwrap().join(" ");
        assert!(recorded.contains(&format!("customer_id={id}")));
        assert!(!recorded.contains("cmd="));
        assert!(!recorded.contains("Lovelace"));
        assert!(!recorded.contains("private@x.io"));
    }
}
