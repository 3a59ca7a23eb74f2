use async_std::sync::Mutex;
use log::*;
use redis::aio::MultiplexedConnection;
use redis::{RedisError, RedisResult};
use std::future::Future;
use std::sync::Arc;

/**
 * One multiplexed redis connection shared by every request handler
 *
 * The connection is opened on first use and dropped again when redis reports it broken, so the
 * next caller reconnects instead of failing forever.
 */
#[derive(Clone)]
pub struct SharedConnection {
    client: redis::Client,
    conn: Arc<Mutex<Option<MultiplexedConnection>>>,
}

impl SharedConnection {
    pub fn new(client: redis::Client) -> Self {
        SharedConnection {
            client,
            conn: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn get(&self) -> RedisResult<MultiplexedConnection> {
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_async_std_connection().await?;
        debug!("opened multiplexed redis connection");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn forget_if_broken(&self, err: &RedisError) {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            warn!("dropping broken redis connection: {}", err);
            *self.conn.lock().await = None;
        }
    }

    /**
     * Run `op` against the shared connection
     */
    pub async fn run<T, F, Fut>(&self, op: F) -> RedisResult<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let result = match self.get().await {
            Ok(conn) => op(conn).await,
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            self.forget_if_broken(err).await;
        }
        result
    }
}
