use async_trait::async_trait;
use sqlx::{Connection, PgPool, Postgres, pool::PoolConnection};

use crate::{
    error::TransportError,
    transport::{Channel, Transport},
};

/// Outbound queue stored in the `outbound_messages` table.
///
/// Each channel holds one pooled connection; every send runs in its own
/// transaction.
#[derive(Clone)]
pub struct PostgresQueueTransport {
    pool: PgPool,
    queue: String,
}

impl PostgresQueueTransport {
    pub fn new(pool: PgPool, queue: impl Into<String>) -> Self {
        Self {
            pool,
            queue: queue.into(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Payloads enqueued on this queue, oldest first.
    pub async fn queued_payloads(&self) -> Result<Vec<Vec<u8>>, TransportError> {
        let payloads = sqlx::query_scalar(
            "SELECT payload FROM outbound_messages WHERE queue = $1 ORDER BY id ASC",
        )
        .bind(&self.queue)
        .fetch_all(&self.pool)
        .await?;

        Ok(payloads)
    }
}

#[async_trait]
impl Transport for PostgresQueueTransport {
    async fn open(&self) -> Result<Box<dyn Channel>, TransportError> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PostgresChannel {
            conn,
            queue: self.queue.clone(),
        }))
    }
}

/// Returns its connection to the pool when dropped.
struct PostgresChannel {
    conn: PoolConnection<Postgres>,
    queue: String,
}

#[async_trait]
impl Channel for PostgresChannel {
    async fn send_transactional(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let mut tx = self.conn.begin().await?;

        sqlx::query("INSERT INTO outbound_messages (queue, payload) VALUES ($1, $2)")
            .bind(&self.queue)
            .bind(payload)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
