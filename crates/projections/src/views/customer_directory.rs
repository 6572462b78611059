//! Customer directory read model: one summary row per customer.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use domain::{Aggregate, Customer, CustomerEvent, LifecycleState};
use event_store::{EventEnvelope, Version};
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, StreamPositions};
use crate::read_model::ReadModel;

/// A customer as listed in the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerSummary {
    pub aggregate_id: AggregateId,
    pub version: Version,
    pub first_name: String,
    pub last_name: String,
    pub state: LifecycleState,
}

impl CustomerSummary {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Default)]
struct DirectoryState {
    customers: HashMap<AggregateId, CustomerSummary>,
    positions: StreamPositions,
}

/// List view of all customers, including closed ones.
#[derive(Clone, Default)]
pub struct CustomerDirectoryView {
    state: Arc<RwLock<DirectoryState>>,
}

impl CustomerDirectoryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, aggregate_id: AggregateId) -> Option<CustomerSummary> {
        self.state.read().await.customers.get(&aggregate_id).cloned()
    }

    /// All customers ordered by last name, then first name.
    pub async fn list_customers(&self) -> Vec<CustomerSummary> {
        let state = self.state.read().await;
        let mut customers: Vec<_> = state.customers.values().cloned().collect();
        customers.sort_by(|a, b| {
            (&a.last_name, &a.first_name, a.aggregate_id)
                .cmp(&(&b.last_name, &b.first_name, b.aggregate_id))
        });
        customers
    }

    /// Customers in the given lifecycle state.
    pub async fn list_by_state(&self, lifecycle: LifecycleState) -> Vec<CustomerSummary> {
        self.list_customers()
            .await
            .into_iter()
            .filter(|c| c.state == lifecycle)
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.state.read().await.customers.len()
    }
}

#[async_trait]
impl Projection for CustomerDirectoryView {
    fn name(&self) -> &'static str {
        "CustomerDirectoryView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        if event.aggregate_type != Customer::aggregate_type() {
            return Ok(());
        }

        let customer_event: CustomerEvent = serde_json::from_value(event.payload.clone())?;
        let id = event.aggregate_id;

        let mut state = self.state.write().await;
        if !state.positions.advance(id, event.version) {
            tracing::debug!(aggregate_id = %id, version = %event.version, "duplicate event ignored");
            return Ok(());
        }

        match customer_event {
            CustomerEvent::CustomerCreated(data) => {
                state.customers.insert(
                    id,
                    CustomerSummary {
                        aggregate_id: id,
                        version: event.version,
                        first_name: data.person.first_name,
                        last_name: data.person.last_name,
                        state: data.state,
                    },
                );
            }
            CustomerEvent::PersonChanged(data) => {
                if let Some(summary) = state.customers.get_mut(&id) {
                    summary.first_name = data.first_name;
                    summary.last_name = data.last_name;
                    summary.version = event.version;
                }
            }
            CustomerEvent::CustomerDeleted(data) => {
                if let Some(summary) = state.customers.get_mut(&id) {
                    summary.state = data.state;
                    summary.version = event.version;
                }
            }
            // Not listed; only the version moves.
            CustomerEvent::ContactChanged(_) | CustomerEvent::AddressChanged(_) => {
                if let Some(summary) = state.customers.get_mut(&id) {
                    summary.version = event.version;
                }
            }
        }

        Ok(())
    }

    async fn last_seen(&self, aggregate_id: AggregateId) -> Option<Version> {
        self.state.read().await.positions.last_seen(aggregate_id)
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.customers.clear();
        state.positions.clear();
        Ok(())
    }
}

impl ReadModel for CustomerDirectoryView {
    fn name(&self) -> &'static str {
        "CustomerDirectoryView"
    }

    fn count(&self) -> usize {
        // Synchronous count is best-effort; prefer the async count() method.
        self.state.try_read().map(|s| s.customers.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use domain::{Address, AggregateRoot, Contact, DomainEvent, Person};

    fn to_envelope(event: &CustomerEvent) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(event.aggregate_id())
            .aggregate_type("Customer")
            .event_type(event.event_type())
            .version(event.version())
            .payload(event)
            .unwrap()
            .build()
            .unwrap()
    }

    fn created(id: AggregateId, first: &str, last: &str) -> AggregateRoot<Customer> {
        let mut root = AggregateRoot::<Customer>::new();
        root.create(
            id,
            Person::new(
                first,
                last,
                NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
                "C1",
                "N1",
            ),
            Contact::new("a@b.c", "1"),
            Address::new("Main", "1", "1000", "Springfield", "North"),
        )
        .unwrap();
        root
    }

    #[tokio::test]
    async fn created_customer_is_listed() {
        let view = CustomerDirectoryView::new();
        let id = AggregateId::new();
        let mut root = created(id, "Ada", "Lovelace");

        for event in root.take_uncommitted() {
            view.handle(&to_envelope(&event)).await.unwrap();
        }

        let summary = view.get(id).await.unwrap();
        assert_eq!(summary.full_name(), "Ada Lovelace");
        assert_eq!(summary.version, Version::first());
        assert_eq!(summary.state, LifecycleState::Open);
        assert_eq!(view.count().await, 1);
        assert_eq!(ReadModel::count(&view), 1);
        assert_eq!(ReadModel::name(&view), "CustomerDirectoryView");
    }

    #[tokio::test]
    async fn person_change_and_delete_update_summary() {
        let view = CustomerDirectoryView::new();
        let id = AggregateId::new();
        let mut root = created(id, "Ada", "Lovelace");
        root.change_contact("new@b.c", "2").unwrap();
        root.change_person("Ada", "King", "C1", "N1").unwrap();
        root.delete().unwrap();

        for event in root.take_uncommitted() {
            view.handle(&to_envelope(&event)).await.unwrap();
        }

        let summary = view.get(id).await.unwrap();
        assert_eq!(summary.last_name, "King");
        assert_eq!(summary.version, Version::new(3));
        assert_eq!(summary.state, LifecycleState::Closed);
        assert_eq!(view.list_by_state(LifecycleState::Open).await.len(), 0);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_ignored() {
        let view = CustomerDirectoryView::new();
        let id = AggregateId::new();
        let mut root = created(id, "Ada", "Lovelace");
        root.change_person("Augusta", "Lovelace", "C1", "N1").unwrap();
        let envelopes: Vec<_> = root.take_uncommitted().iter().map(to_envelope).collect();

        for envelope in &envelopes {
            view.handle(envelope).await.unwrap();
        }
        // Replaying the creation must not overwrite the later name.
        view.handle(&envelopes[0]).await.unwrap();

        assert_eq!(view.get(id).await.unwrap().first_name, "Augusta");
        assert_eq!(view.last_seen(id).await, Some(Version::new(1)));
    }

    #[tokio::test]
    async fn list_is_sorted_by_name() {
        let view = CustomerDirectoryView::new();
        for (first, last) in [("Grace", "Hopper"), ("Ada", "Lovelace"), ("Alan", "Hopper")] {
            let mut root = created(AggregateId::new(), first, last);
            for event in root.take_uncommitted() {
                view.handle(&to_envelope(&event)).await.unwrap();
            }
        }

        let names: Vec<_> = view
            .list_customers()
            .await
            .iter()
            .map(CustomerSummary::full_name)
            .collect();
        assert_eq!(names, vec!["Alan Hopper", "Grace Hopper", "Ada Lovelace"]);
    }

    #[tokio::test]
    async fn other_aggregate_types_are_skipped() {
        let view = CustomerDirectoryView::new();
        let envelope = EventEnvelope::builder()
            .aggregate_id(AggregateId::new())
            .aggregate_type("Account")
            .event_type("AccountOpened")
            .version(Version::first())
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap();

        view.handle(&envelope).await.unwrap();
        assert_eq!(view.count().await, 0);
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let view = CustomerDirectoryView::new();
        let id = AggregateId::new();
        let mut root = created(id, "Ada", "Lovelace");
        for event in root.take_uncommitted() {
            view.handle(&to_envelope(&event)).await.unwrap();
        }

        view.reset().await.unwrap();
        assert_eq!(view.count().await, 0);
        assert_eq!(view.last_seen(id).await, None);
    }
}
