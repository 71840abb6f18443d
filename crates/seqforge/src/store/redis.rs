use std::{collections::HashSet, time::Duration};

use redis::{Commands, Connection};

use super::{KeyTtl, StoreClient, StoreError, StoreResult, Ttl};
use crate::{ClientFactory, Connector, Endpoint, MessageListener, Result, StopToken};

/// Connect, read and write timeout applied to every Redis connection.
pub const DEFAULT_REDIS_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Read timeout while subscribed, bounding how long a cancelled subscription
/// takes to notice.
const SUBSCRIBE_POLL: Duration = Duration::from_millis(100);

/// A synchronous connection to a Redis server.
pub struct RedisClient {
    conn: Connection,
    timeout: Duration,
}

impl RedisClient {
    /// Connects to `endpoint`, authenticating when it carries a password.
    ///
    /// # Errors
    /// Returns [`StoreError::Redis`] if the server cannot be reached or
    /// rejects the credentials.
    pub fn connect(endpoint: &Endpoint, timeout: Duration) -> StoreResult<Self> {
        let client = redis::Client::open((endpoint.host.as_str(), endpoint.port))?;
        let mut conn = client.get_connection_with_timeout(timeout)?;
        conn.set_read_timeout(Some(timeout))?;
        conn.set_write_timeout(Some(timeout))?;

        if let Some(password) = endpoint.password.as_deref() {
            let mut auth = redis::cmd("AUTH");
            if let Some(username) = endpoint.username.as_deref() {
                auth.arg(username);
            }
            auth.arg(password).query::<()>(&mut conn)?;
        }

        Ok(Self { conn, timeout })
    }
}

impl StoreClient for RedisClient {
    fn ping(&mut self) -> StoreResult<()> {
        let pong: String = redis::cmd("PING").query(&mut self.conn)?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Protocol {
                reason: format!("unexpected PING reply {pong:?}"),
            })
        }
    }

    fn get(&mut self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.conn.get(key)?)
    }

    fn set(&mut self, key: &str, value: &str, ttl: Ttl) -> StoreResult<()> {
        match ttl {
            Ttl::Seconds(secs) => self.conn.set_ex::<_, _, ()>(key, value, secs)?,
            Ttl::Unchanged | Ttl::Persistent => self.conn.set::<_, _, ()>(key, value)?,
        }
        Ok(())
    }

    fn get_set(&mut self, key: &str, value: &str) -> StoreResult<Option<String>> {
        Ok(self.conn.getset(key, value)?)
    }

    fn delete(&mut self, keys: &[&str]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        Ok(self.conn.del(keys)?)
    }

    fn expire(&mut self, key: &str, ttl: Ttl) -> StoreResult<bool> {
        match ttl {
            Ttl::Unchanged => Ok(false),
            Ttl::Persistent => Ok(self.conn.persist(key)?),
            Ttl::Seconds(secs) => {
                let secs = i64::try_from(secs).unwrap_or(i64::MAX);
                Ok(self.conn.expire(key, secs)?)
            }
        }
    }

    fn ttl(&mut self, key: &str) -> StoreResult<KeyTtl> {
        let remaining: i64 = self.conn.ttl(key)?;
        Ok(match remaining {
            -2 => KeyTtl::Missing,
            s if s < 0 => KeyTtl::Persistent,
            s => KeyTtl::Seconds(s as u64),
        })
    }

    fn incr_by(&mut self, key: &str, delta: i64) -> StoreResult<i64> {
        Ok(self.conn.incr(key, delta)?)
    }

    fn decr_by(&mut self, key: &str, delta: i64) -> StoreResult<i64> {
        Ok(self.conn.decr(key, delta)?)
    }

    fn hash_get(&mut self, map: &str, field: &str) -> StoreResult<Option<String>> {
        Ok(self.conn.hget(map, field)?)
    }

    fn hash_set(&mut self, map: &str, field: &str, value: &str, ttl: Ttl) -> StoreResult<()> {
        self.conn.hset::<_, _, _, ()>(map, field, value)?;
        self.expire(map, ttl)?;
        Ok(())
    }

    fn hash_incr_by(&mut self, map: &str, field: &str, delta: i64) -> StoreResult<i64> {
        Ok(self.conn.hincr(map, field, delta)?)
    }

    fn hash_delete(&mut self, map: &str, fields: &[&str]) -> StoreResult<u64> {
        if fields.is_empty() {
            return Ok(0);
        }
        Ok(self.conn.hdel(map, fields)?)
    }

    fn hash_len(&mut self, map: &str) -> StoreResult<u64> {
        Ok(self.conn.hlen(map)?)
    }

    fn set_add(&mut self, name: &str, members: &[&str], ttl: Ttl) -> StoreResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        let added = self.conn.sadd(name, members)?;
        self.expire(name, ttl)?;
        Ok(added)
    }

    fn set_remove(&mut self, name: &str, members: &[&str]) -> StoreResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }
        Ok(self.conn.srem(name, members)?)
    }

    fn set_pop(&mut self, name: &str) -> StoreResult<Option<String>> {
        Ok(self.conn.spop(name)?)
    }

    fn set_members(&mut self, name: &str) -> StoreResult<HashSet<String>> {
        Ok(self.conn.smembers(name)?)
    }

    fn set_is_member(&mut self, name: &str, member: &str) -> StoreResult<bool> {
        Ok(self.conn.sismember(name, member)?)
    }

    fn set_len(&mut self, name: &str) -> StoreResult<u64> {
        Ok(self.conn.scard(name)?)
    }

    fn list_push(&mut self, name: &str, values: &[&str], ttl: Ttl) -> StoreResult<u64> {
        if values.is_empty() {
            return self.list_len(name);
        }
        let len = self.conn.lpush(name, values)?;
        self.expire(name, ttl)?;
        Ok(len)
    }

    fn list_pop(&mut self, name: &str) -> StoreResult<Option<String>> {
        Ok(self.conn.rpop(name, None)?)
    }

    fn list_members(&mut self, name: &str) -> StoreResult<Vec<String>> {
        Ok(self.conn.lrange(name, 0, -1)?)
    }

    fn list_len(&mut self, name: &str) -> StoreResult<u64> {
        Ok(self.conn.llen(name)?)
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> StoreResult<u64> {
        Ok(self.conn.publish(topic, payload)?)
    }

    fn subscribe(
        &mut self,
        topic: &str,
        listener: &dyn MessageListener,
        stop: &StopToken,
    ) -> StoreResult<()> {
        let timeout = self.timeout;
        let mut pubsub = self.conn.as_pubsub();
        pubsub.subscribe(topic)?;
        pubsub.set_read_timeout(Some(SUBSCRIBE_POLL))?;

        let outcome = loop {
            if stop.is_cancelled() {
                break Ok(());
            }
            match pubsub.get_message() {
                Ok(msg) => listener.on_message(msg.get_channel_name(), msg.get_payload_bytes()),
                Err(e) if e.is_timeout() => {}
                Err(e) => break Err(StoreError::from(e)),
            }
        };

        if outcome.is_ok() {
            pubsub.unsubscribe(topic)?;
            pubsub.set_read_timeout(Some(timeout))?;
        }
        outcome
    }
}

/// Opens [`RedisClient`]s for one endpoint.
#[derive(Debug, Clone)]
pub struct RedisFactory {
    endpoint: Endpoint,
    timeout: Duration,
}

impl RedisFactory {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }
}

impl ClientFactory for RedisFactory {
    type Client = RedisClient;

    fn create(&self) -> StoreResult<RedisClient> {
        RedisClient::connect(&self.endpoint, self.timeout)
    }

    fn validate(&self, client: &mut RedisClient) -> bool {
        client.ping().is_ok()
    }
}

/// Builds [`RedisFactory`]s for any endpoint.
#[derive(Debug, Clone, Copy)]
pub struct RedisConnector {
    timeout: Duration,
}

impl Default for RedisConnector {
    fn default() -> Self {
        Self::new(DEFAULT_REDIS_TIMEOUT)
    }
}

impl RedisConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Connector for RedisConnector {
    type Factory = RedisFactory;

    fn factory(&self, endpoint: &Endpoint) -> Result<RedisFactory> {
        Ok(RedisFactory::new(endpoint.clone(), self.timeout))
    }
}
