pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "redis")]
pub mod redis_state;

pub use memory::{InMemoryStateStore, InMemoryStorage};

#[cfg(feature = "sqlite")]
pub use sqlite::SQLiteStorage;

#[cfg(feature = "redis")]
pub use redis_state::RedisStateStore;
