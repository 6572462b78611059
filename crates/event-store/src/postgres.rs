use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, Commit, CommitId, EventEnvelope, EventId, EventStoreError, Result, Snapshot,
    Version,
    store::{
        AppendOptions, EventStore, EventStream, check_append_position, ensure_contiguous,
        validate_events_for_append,
    },
};

macro_rules! event_columns {
    () => {
        "id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata"
    };
}

const STREAM_PAGE_SIZE: i64 = 500;

/// PostgreSQL-backed event log.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }

    async fn events_of_commit(&self, commit_id: CommitId) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            event_columns!(),
            " FROM events WHERE commit_id = $1 ORDER BY version ASC"
        ))
        .bind(commit_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Commit> {
        validate_events_for_append(&events)?;
        let aggregate_id = events[0].aggregate_id;

        let mut tx = self.pool.begin().await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;
        let current = current.map(Version::new);
        check_append_position(
            aggregate_id,
            current,
            events[0].version,
            options.expected_version,
        )?;

        let commit = Commit::from_events(events);

        sqlx::query(
            r#"
            INSERT INTO commits (commit_id, aggregate_id, aggregate_type, stream_revision, timestamp)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(commit.commit_id.as_uuid())
        .bind(aggregate_id.as_uuid())
        .bind(&commit.aggregate_type)
        .bind(commit.stream_revision.as_i64())
        .bind(commit.timestamp)
        .execute(&mut *tx)
        .await?;

        for event in &commit.events {
            let metadata_json = serde_json::to_value(&event.metadata)?;

            sqlx::query(
                r#"
                INSERT INTO events (id, commit_id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(commit.commit_id.as_uuid())
            .bind(&event.event_type)
            .bind(event.aggregate_id.as_uuid())
            .bind(&event.aggregate_type)
            .bind(event.version.as_i64())
            .bind(event.timestamp)
            .bind(&event.payload)
            .bind(metadata_json)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // A racing writer took the same version between our read and insert.
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_aggregate_version")
                {
                    return EventStoreError::ConcurrencyConflict {
                        aggregate_id,
                        expected: current,
                        actual: Some(event.version),
                    };
                }
                EventStoreError::Database(e)
            })?;
        }

        tx.commit().await?;
        Ok(commit)
    }

    async fn get_events(
        &self,
        aggregate_id: AggregateId,
        from: Version,
        to: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            event_columns!(),
            " FROM events",
            " WHERE aggregate_id = $1 AND version >= $2 AND version <= $3",
            " ORDER BY version ASC"
        ))
        .bind(aggregate_id.as_uuid())
        .bind(from.as_i64())
        .bind(to.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let events = rows
            .into_iter()
            .map(Self::row_to_event)
            .collect::<Result<Vec<_>>>()?;
        ensure_contiguous(aggregate_id, from, &events)?;
        Ok(events)
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::{TryStreamExt, stream};

        // Pages by global position so the stream owns its pool handle.
        let pool = self.pool.clone();
        let pages = stream::try_unfold(
            (pool, 0_i64, false),
            |(pool, after, exhausted)| async move {
                if exhausted {
                    return Ok::<_, EventStoreError>(None);
                }

                let rows = sqlx::query(concat!(
                    "SELECT position, ",
                    event_columns!(),
                    " FROM events WHERE position > $1 ORDER BY position ASC LIMIT $2"
                ))
                .bind(after)
                .bind(STREAM_PAGE_SIZE)
                .fetch_all(&pool)
                .await?;

                let exhausted = (rows.len() as i64) < STREAM_PAGE_SIZE;
                let last = match rows.last() {
                    Some(row) => row.try_get::<i64, _>("position")?,
                    None => after,
                };
                let events = rows
                    .into_iter()
                    .map(Self::row_to_event)
                    .collect::<Result<Vec<_>>>()?;

                Ok(Some((
                    stream::iter(events.into_iter().map(Ok::<_, EventStoreError>)),
                    (pool, last, exhausted),
                )))
            },
        );

        Ok(Box::pin(pages.try_flatten()))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (aggregate_id, aggregate_type, version, timestamp, state)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (aggregate_id, version) DO UPDATE SET
                aggregate_type = EXCLUDED.aggregate_type,
                timestamp = EXCLUDED.timestamp,
                state = EXCLUDED.state
            "#,
        )
        .bind(snapshot.aggregate_id.as_uuid())
        .bind(&snapshot.aggregate_type)
        .bind(snapshot.version.as_i64())
        .bind(snapshot.timestamp)
        .bind(&snapshot.state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_snapshot(
        &self,
        aggregate_id: AggregateId,
        max_version: Version,
    ) -> Result<Option<Snapshot>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT aggregate_id, aggregate_type, version, timestamp, state
            FROM snapshots
            WHERE aggregate_id = $1 AND version <= $2
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .bind(max_version.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Snapshot {
                aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
                aggregate_type: row.try_get("aggregate_type")?,
                version: Version::new(row.try_get("version")?),
                timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
                state: row.try_get("state")?,
            })),
            None => Ok(None),
        }
    }

    async fn get_undispatched_commits(&self) -> Result<Vec<Commit>> {
        let rows = sqlx::query(
            r#"
            SELECT commit_id, aggregate_id, aggregate_type, stream_revision, timestamp
            FROM commits
            WHERE NOT dispatched
            ORDER BY position ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut commits = Vec::with_capacity(rows.len());
        for row in rows {
            let commit_id = CommitId::from_uuid(row.try_get::<Uuid, _>("commit_id")?);
            commits.push(Commit {
                commit_id,
                aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
                aggregate_type: row.try_get("aggregate_type")?,
                stream_revision: Version::new(row.try_get("stream_revision")?),
                timestamp: row.try_get("timestamp")?,
                events: self.events_of_commit(commit_id).await?,
            });
        }

        Ok(commits)
    }

    async fn mark_commit_dispatched(&self, commit_id: CommitId) -> Result<()> {
        sqlx::query("UPDATE commits SET dispatched = TRUE WHERE commit_id = $1")
            .bind(commit_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
