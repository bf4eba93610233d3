//! Redis-backed implementation of the hash contract

use super::{HashStore, RemoteConfig};
use crate::core::Result;
use parking_lot::Mutex;
use redis::Commands;
use std::collections::HashMap;
use tracing::info;

/// Hash store backed by a redis server.
///
/// Holds one synchronous connection behind a mutex; callers are passive and
/// synchronous, so a single multiplexed connection is enough. Connection
/// timeouts belong to the client configuration and surface as ordinary
/// store errors to the in-flight operation.
pub struct RedisStore {
    connection: Mutex<redis::Connection>,
}

impl RedisStore {
    /// Connect and verify the server with a ping
    pub fn connect(config: &RemoteConfig) -> Result<Self> {
        let client = redis::Client::open(config.url())?;
        let mut connection = client.get_connection()?;
        redis::cmd("PING").query::<String>(&mut connection)?;
        info!("connected to remote store at {}:{}", config.host, config.port);
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }
}

impl HashStore for RedisStore {
    fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection.lock();
        let value: Option<Vec<u8>> = conn.hget(key, field)?;
        Ok(value)
    }

    fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Vec<u8>>> {
        let mut conn = self.connection.lock();
        let entries: HashMap<String, Vec<u8>> = conn.hgetall(key)?;
        Ok(entries)
    }

    fn hash_set(&self, key: &str, field: &str, value: &[u8]) -> Result<()> {
        let mut conn = self.connection.lock();
        let _: () = conn.hset(key, field, value)?;
        Ok(())
    }

    fn hash_set_many(&self, key: &str, entries: &[(String, Vec<u8>)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection.lock();
        let _: () = conn.hset_multiple(key, entries)?;
        Ok(())
    }

    fn hash_del(&self, key: &str, field: &str) -> Result<bool> {
        let mut conn = self.connection.lock();
        let removed: i64 = conn.hdel(key, field)?;
        Ok(removed > 0)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.lock();
        let removed: i64 = conn.del(key)?;
        Ok(removed > 0)
    }

    fn ping(&self) -> Result<()> {
        let mut conn = self.connection.lock();
        redis::cmd("PING").query::<String>(&mut *conn)?;
        Ok(())
    }
}
