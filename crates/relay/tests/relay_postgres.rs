//! End-to-end relay tests against PostgreSQL.
//!
//! These tests need a Docker daemon and are ignored by default. Run with:
//!
//! ```bash
//! cargo test -p relay --test relay_postgres -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::AggregateId;
use dispatcher::{CommitDispatcher, DispatcherConfig, OutboundMessage, PostgresQueueTransport};
use event_store::{
    AppendOptions, Commit, DispatchCommits, DispatchError, DispatchingEventStore, EventEnvelope,
    EventStore, Handoff, PostgresEventStore, Version,
};
use relay::Relay;
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresEventStore::new(pool.clone())
                .run_migrations()
                .await
                .unwrap();
            pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;
    let pool = PgPool::connect(&info.connection_string).await.unwrap();
    sqlx::query("TRUNCATE TABLE outbound_messages, events, commits, snapshots")
        .execute(&pool)
        .await
        .unwrap();
    pool
}

fn created_event(aggregate_id: AggregateId) -> EventEnvelope {
    EventEnvelope::builder()
        .aggregate_id(aggregate_id)
        .aggregate_type("Customer")
        .event_type("CustomerCreated")
        .version(Version::first())
        .payload_raw(serde_json::json!({}))
        .build()
        .unwrap()
}

/// Stands in for a process that crashed before handing commits off.
struct Offline;

#[async_trait]
impl DispatchCommits for Offline {
    async fn dispatch(&self, _commit: Commit) -> Result<Handoff, DispatchError> {
        Err(DispatchError::Closed)
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires Docker"]
async fn pending_commits_reach_the_outbound_queue_after_restart() {
    let pool = get_test_pool().await;

    // First run: appends succeed but nothing is handed off.
    let offline = DispatchingEventStore::new(PostgresEventStore::new(pool.clone()), Arc::new(Offline));
    let mut ids = Vec::new();
    for _ in 0..3 {
        let id = AggregateId::new();
        offline
            .append(vec![created_event(id)], AppendOptions::expect_new())
            .await
            .unwrap();
        ids.push(id);
    }
    assert_eq!(offline.get_undispatched_commits().await.unwrap().len(), 3);

    // Second run: the relay redelivers on its first pass.
    let transport = PostgresQueueTransport::new(pool.clone(), "bankaccount-tx");
    let log = PostgresEventStore::new(pool);
    let (dispatcher, worker) = CommitDispatcher::spawn(
        transport.clone(),
        DispatcherConfig::default(),
        Arc::new(log.clone()),
    );
    let relay = Relay::new(
        DispatchingEventStore::new(log.clone(), Arc::new(dispatcher)),
        Duration::from_millis(50),
    );
    assert_eq!(relay.run_once().await.unwrap(), 3);
    drop(relay);
    worker.shutdown().await.unwrap();
    assert!(log.get_undispatched_commits().await.unwrap().is_empty());

    let delivered: Vec<_> = transport
        .queued_payloads()
        .await
        .unwrap()
        .iter()
        .map(|p| OutboundMessage::from_bytes(p).unwrap().aggregate_id)
        .collect();
    assert_eq!(delivered, ids);
}
