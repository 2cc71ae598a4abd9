use crate::publish::BrokerError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Publish side of a message broker
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publishes a payload on a channel
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BrokerError>;
}

/// Redis pub/sub broker
///
/// Backed by a [`ConnectionManager`], which reconnects on its own after
/// transient failures; a publish made while Redis is down fails and is not
/// retried.
#[derive(Clone)]
pub struct RedisBroker {
    conn: ConnectionManager,
}

impl RedisBroker {
    /// Connects to Redis and verifies the server answers `PING`
    pub async fn connect(redis_url: &str) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url)?;
        let mut conn = client.get_connection_manager().await?;

        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(BrokerError::Unavailable(format!(
                "unexpected PING reply '{}'",
                pong
            )));
        }
        tracing::info!("Connected to Redis");

        Ok(Self { conn })
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(channel, payload).await?;
        tracing::trace!(channel, receivers, "Published message");
        Ok(())
    }
}
