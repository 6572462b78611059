use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, Commit, CommitId, EventEnvelope, Result, Snapshot, Version,
    store::{
        AppendOptions, EventStore, EventStream, check_append_position, ensure_contiguous,
        validate_events_for_append,
    },
};

#[derive(Debug, Clone)]
struct StoredCommit {
    commit: Commit,
    dispatched: bool,
}

/// In-memory event log for tests and embedding.
///
/// Commits are kept in append order; snapshots are kept per stream, keyed
/// by version, so older snapshots stay addressable.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    commits: Arc<RwLock<Vec<StoredCommit>>>,
    snapshots: Arc<RwLock<HashMap<AggregateId, BTreeMap<Version, Snapshot>>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.commits
            .read()
            .await
            .iter()
            .map(|c| c.commit.len())
            .sum()
    }

    pub async fn commit_count(&self) -> usize {
        self.commits.read().await.len()
    }

    /// Number of snapshots held for one stream.
    pub async fn snapshot_count(&self, aggregate_id: AggregateId) -> usize {
        self.snapshots
            .read()
            .await
            .get(&aggregate_id)
            .map_or(0, BTreeMap::len)
    }

    /// Clears all commits and snapshots.
    pub async fn clear(&self) {
        self.commits.write().await.clear();
        self.snapshots.write().await.clear();
    }

    fn stream_version(commits: &[StoredCommit], aggregate_id: AggregateId) -> Option<Version> {
        commits
            .iter()
            .filter(|c| c.commit.aggregate_id == aggregate_id)
            .map(|c| c.commit.stream_revision)
            .max()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Commit> {
        validate_events_for_append(&events)?;
        let aggregate_id = events[0].aggregate_id;

        let mut commits = self.commits.write().await;
        let current = Self::stream_version(&commits, aggregate_id);
        check_append_position(
            aggregate_id,
            current,
            events[0].version,
            options.expected_version,
        )?;

        let commit = Commit::from_events(events);
        commits.push(StoredCommit {
            commit: commit.clone(),
            dispatched: false,
        });

        Ok(commit)
    }

    async fn get_events(
        &self,
        aggregate_id: AggregateId,
        from: Version,
        to: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let commits = self.commits.read().await;
        let mut events: Vec<_> = commits
            .iter()
            .filter(|c| c.commit.aggregate_id == aggregate_id)
            .flat_map(|c| c.commit.events.iter())
            .filter(|e| e.version >= from && e.version <= to)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);

        ensure_contiguous(aggregate_id, from, &events)?;
        Ok(events)
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::stream;

        let events: Vec<_> = self
            .commits
            .read()
            .await
            .iter()
            .flat_map(|c| c.commit.events.clone())
            .collect();

        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let commits = self.commits.read().await;
        Ok(Self::stream_version(&commits, aggregate_id))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        snapshots
            .entry(snapshot.aggregate_id)
            .or_default()
            .insert(snapshot.version, snapshot);
        Ok(())
    }

    async fn get_snapshot(
        &self,
        aggregate_id: AggregateId,
        max_version: Version,
    ) -> Result<Option<Snapshot>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .get(&aggregate_id)
            .and_then(|by_version| by_version.range(..=max_version).next_back())
            .map(|(_, snapshot)| snapshot.clone()))
    }

    async fn get_undispatched_commits(&self) -> Result<Vec<Commit>> {
        let commits = self.commits.read().await;
        Ok(commits
            .iter()
            .filter(|c| !c.dispatched)
            .map(|c| c.commit.clone())
            .collect())
    }

    async fn mark_commit_dispatched(&self, commit_id: CommitId) -> Result<()> {
        let mut commits = self.commits.write().await;
        if let Some(stored) = commits.iter_mut().find(|c| c.commit.commit_id == commit_id) {
            stored.dispatched = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventStoreError;
    use crate::store::EventStoreExt;

    fn create_test_event(aggregate_id: AggregateId, version: i64, event_type: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("Customer")
            .event_type(event_type)
            .version(Version::new(version))
            .payload_raw(serde_json::json!({"test": true}))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn append_returns_commit() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();

        let commit = store
            .append(
                vec![
                    create_test_event(aggregate_id, 0, "CustomerCreated"),
                    create_test_event(aggregate_id, 1, "ContactChanged"),
                ],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();

        assert_eq!(commit.aggregate_id, aggregate_id);
        assert_eq!(commit.aggregate_type, "Customer");
        assert_eq!(commit.stream_revision, Version::new(1));
        assert_eq!(commit.first_version(), Version::first());
        assert_eq!(commit.len(), 2);
        assert_eq!(store.event_count().await, 2);
    }

    #[tokio::test]
    async fn conflict_when_stream_already_exists() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();
        store
            .append(
                vec![create_test_event(aggregate_id, 0, "CustomerCreated")],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();

        let result = store
            .append(
                vec![create_test_event(aggregate_id, 0, "CustomerCreated")],
                AppendOptions::expect_new(),
            )
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { .. })
        ));
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn conflict_when_expected_version_is_stale() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();
        store
            .append(
                vec![
                    create_test_event(aggregate_id, 0, "CustomerCreated"),
                    create_test_event(aggregate_id, 1, "ContactChanged"),
                ],
                AppendOptions::new(),
            )
            .await
            .unwrap();

        let result = store
            .append(
                vec![create_test_event(aggregate_id, 1, "AddressChanged")],
                AppendOptions::expect_version(Version::first()),
            )
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict {
                expected: Some(e),
                actual: Some(a),
                ..
            }) if e == Version::first() && a == Version::new(1)
        ));
    }

    #[tokio::test]
    async fn append_with_matching_expectation_succeeds() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();
        store
            .append(
                vec![create_test_event(aggregate_id, 0, "CustomerCreated")],
                AppendOptions::expect_new(),
            )
            .await
            .unwrap();

        let commit = store
            .append(
                vec![create_test_event(aggregate_id, 1, "PersonChanged")],
                AppendOptions::expect_version(Version::first()),
            )
            .await
            .unwrap();

        assert_eq!(commit.stream_revision, Version::new(1));
    }

    #[tokio::test]
    async fn skipping_a_version_is_rejected() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();
        store
            .append(
                vec![create_test_event(aggregate_id, 0, "CustomerCreated")],
                AppendOptions::new(),
            )
            .await
            .unwrap();

        let result = store
            .append(
                vec![create_test_event(aggregate_id, 2, "PersonChanged")],
                AppendOptions::new(),
            )
            .await;

        assert!(matches!(
            result,
            Err(EventStoreError::ConcurrencyConflict { .. })
        ));
    }

    #[tokio::test]
    async fn get_events_honours_range() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();
        store
            .append(
                (0..4)
                    .map(|v| create_test_event(aggregate_id, v, "Event"))
                    .collect(),
                AppendOptions::new(),
            )
            .await
            .unwrap();

        let tail = store
            .get_events(aggregate_id, Version::new(2), Version::MAX)
            .await
            .unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].version, Version::new(2));

        let middle = store
            .get_events(aggregate_id, Version::new(1), Version::new(2))
            .await
            .unwrap();
        assert_eq!(middle.len(), 2);

        let beyond = store
            .get_events(aggregate_id, Version::new(10), Version::MAX)
            .await
            .unwrap();
        assert!(beyond.is_empty());
    }

    #[tokio::test]
    async fn events_of_other_streams_are_not_returned() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        for id in [a, b] {
            store
                .append(
                    vec![create_test_event(id, 0, "CustomerCreated")],
                    AppendOptions::new(),
                )
                .await
                .unwrap();
        }

        assert_eq!(store.get_all_events(a).await.unwrap().len(), 1);
        assert_eq!(store.get_aggregate_version(b).await.unwrap(), Some(Version::first()));
        assert!(store.aggregate_exists(a).await.unwrap());
        assert!(!store.aggregate_exists(AggregateId::new()).await.unwrap());
    }

    #[tokio::test]
    async fn snapshot_lookup_respects_max_version() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();
        for version in [4, 9] {
            store
                .save_snapshot(Snapshot::new(
                    aggregate_id,
                    "Customer",
                    Version::new(version),
                    serde_json::json!({"at": version}),
                ))
                .await
                .unwrap();
        }

        let latest = store
            .get_snapshot(aggregate_id, Version::MAX)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.version, Version::new(9));

        let older = store
            .get_snapshot(aggregate_id, Version::new(8))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(older.version, Version::new(4));

        assert!(
            store
                .get_snapshot(aggregate_id, Version::new(3))
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(store.snapshot_count(aggregate_id).await, 2);
    }

    #[tokio::test]
    async fn commits_stay_undispatched_until_marked() {
        let store = InMemoryEventStore::new();
        let aggregate_id = AggregateId::new();
        let first = store
            .append(
                vec![create_test_event(aggregate_id, 0, "CustomerCreated")],
                AppendOptions::new(),
            )
            .await
            .unwrap();
        let second = store
            .append(
                vec![create_test_event(aggregate_id, 1, "ContactChanged")],
                AppendOptions::new(),
            )
            .await
            .unwrap();

        let pending = store.get_undispatched_commits().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].commit_id, first.commit_id);

        store.mark_commit_dispatched(first.commit_id).await.unwrap();

        let pending = store.get_undispatched_commits().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].commit_id, second.commit_id);
    }

    #[tokio::test]
    async fn stream_all_events_follows_append_order() {
        use futures_util::StreamExt;

        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();
        store
            .append(vec![create_test_event(a, 0, "CustomerCreated")], AppendOptions::new())
            .await
            .unwrap();
        store
            .append(vec![create_test_event(b, 0, "CustomerCreated")], AppendOptions::new())
            .await
            .unwrap();
        store
            .append(vec![create_test_event(a, 1, "CustomerDeleted")], AppendOptions::new())
            .await
            .unwrap();

        let events: Vec<_> = store
            .stream_all_events()
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;
        let order: Vec<_> = events.iter().map(|e| (e.aggregate_id, e.version)).collect();
        assert_eq!(
            order,
            vec![
                (a, Version::first()),
                (b, Version::first()),
                (a, Version::new(1))
            ]
        );
    }
}
