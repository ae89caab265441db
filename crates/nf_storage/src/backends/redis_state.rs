use async_trait::async_trait;
use nf_core::{Error, Result, StateStore};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::time::Duration;
use tracing::debug;

/// [`StateStore`] shared between processes through Redis.
///
/// Expiry is delegated to Redis, so the injected clock does not apply here.
pub struct RedisStateStore {
    connection: MultiplexedConnection,
    key_prefix: String,
}

fn map_redis(err: redis::RedisError) -> Error {
    Error::State(err.to_string())
}

/// Expiry in whole milliseconds, at least 1.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl RedisStateStore {
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| Error::State(format!("Failed to create Redis client: {e}")))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::State(format!("Failed to connect to Redis: {e}")))?;

        Ok(Self {
            connection,
            key_prefix: key_prefix.into(),
        })
    }

    fn key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let full_key = self.key(key);
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(&full_key).await.map_err(map_redis)?;
        debug!(key = %full_key, hit = value.is_some(), "State get");
        Ok(value)
    }

    async fn put_raw(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let full_key = self.key(key);
        let mut conn = self.connection.clone();
        match ttl {
            Some(ttl) => {
                let _: () = conn
                    .pset_ex(&full_key, value, ttl_millis(ttl))
                    .await
                    .map_err(map_redis)?;
            }
            None => {
                let _: () = conn.set(&full_key, value).await.map_err(map_redis)?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let full_key = self.key(key);
        let mut conn = self.connection.clone();
        let deleted: i64 = conn.del(&full_key).await.map_err(map_redis)?;
        Ok(deleted > 0)
    }
}
