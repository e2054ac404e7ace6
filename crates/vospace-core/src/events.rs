//! Node change notifications
//!
//! Every publish acquires a channel from a [`ChannelPool`], declares the
//! fanout exchange (non-durable), publishes one JSON message and releases the
//! channel by dropping it. Failures are logged and never reach the caller.

use crate::{Result, VoError};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use vospace_storage::NodeAddress;

/// Default exchange for node change events
pub const DEFAULT_EXCHANGE: &str = "vospace.exchange.nodechanged";

/// Payload of a node change message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEvent {
    pub uri: String,
    pub owner: String,
    /// Storage path of the changed node's parent
    pub container: String,
}

impl NodeEvent {
    pub fn for_node(address: &NodeAddress, owner: &str) -> Self {
        Self {
            uri: address.to_string(),
            owner: owner.to_string(),
            container: address.path().parent().storage_path(),
        }
    }
}

/// A channel borrowed from a [`ChannelPool`]
#[async_trait]
pub trait EventChannel: Send {
    /// Declare a fanout exchange; declaring an existing exchange is a no-op
    async fn declare_fanout(&mut self, exchange: &str, durable: bool) -> Result<()>;

    async fn publish(&mut self, exchange: &str, routing_key: &str, payload: Bytes) -> Result<()>;
}

/// Source of broker channels
#[async_trait]
pub trait ChannelPool: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn EventChannel>>;
}

/// Fire-and-forget publisher of [`NodeEvent`]s
#[derive(Clone)]
pub struct EventPublisher {
    pool: Option<Arc<dyn ChannelPool>>,
    exchange: String,
}

impl EventPublisher {
    pub fn new(pool: Arc<dyn ChannelPool>, exchange: impl Into<String>) -> Self {
        Self {
            pool: Some(pool),
            exchange: exchange.into(),
        }
    }

    /// A publisher that drops every event
    pub fn disabled() -> Self {
        Self {
            pool: None,
            exchange: DEFAULT_EXCHANGE.to_string(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Publish one event. Errors are logged, not returned.
    pub async fn publish(&self, event: &NodeEvent) {
        let Some(pool) = &self.pool else {
            return;
        };
        match self.try_publish(pool.as_ref(), event).await {
            Ok(()) => debug!(uri = %event.uri, exchange = %self.exchange, "published node event"),
            Err(e) => warn!(uri = %event.uri, error = %e, "failed to publish node event"),
        }
    }

    async fn try_publish(&self, pool: &dyn ChannelPool, event: &NodeEvent) -> Result<()> {
        let payload = Bytes::from(serde_json::to_vec(event)?);
        let mut channel = pool.acquire().await?;
        channel.declare_fanout(&self.exchange, false).await?;
        channel.publish(&self.exchange, "", payload).await
    }
}

type Exchanges = Arc<DashMap<String, broadcast::Sender<Bytes>>>;

/// In-process pool whose exchanges are tokio broadcast channels
#[derive(Clone)]
pub struct BroadcastPool {
    exchanges: Exchanges,
    capacity: usize,
}

impl BroadcastPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            exchanges: Arc::new(DashMap::new()),
            capacity,
        }
    }

    /// Receive everything published to `exchange` from now on
    pub fn subscribe(&self, exchange: &str) -> broadcast::Receiver<Bytes> {
        self.exchanges
            .entry(exchange.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

impl Default for BroadcastPool {
    fn default() -> Self {
        Self::new(1024)
    }
}

struct BroadcastChannel {
    exchanges: Exchanges,
    capacity: usize,
}

#[async_trait]
impl EventChannel for BroadcastChannel {
    async fn declare_fanout(&mut self, exchange: &str, _durable: bool) -> Result<()> {
        let capacity = self.capacity;
        self.exchanges
            .entry(exchange.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0);
        Ok(())
    }

    async fn publish(&mut self, exchange: &str, _routing_key: &str, payload: Bytes) -> Result<()> {
        let sender = self
            .exchanges
            .get(exchange)
            .map(|s| s.value().clone())
            .ok_or_else(|| {
                VoError::InternalServerError(format!("exchange {} not declared", exchange))
            })?;
        // no subscribers is not a failure for a fanout exchange
        let _ = sender.send(payload);
        Ok(())
    }
}

#[async_trait]
impl ChannelPool for BroadcastPool {
    async fn acquire(&self) -> Result<Box<dyn EventChannel>> {
        Ok(Box::new(BroadcastChannel {
            exchanges: Arc::clone(&self.exchanges),
            capacity: self.capacity,
        }))
    }
}

/// Decode every event currently queued on `receiver`
pub fn drain_events(receiver: &mut broadcast::Receiver<Bytes>) -> Vec<NodeEvent> {
    let mut events = Vec::new();
    while let Ok(payload) = receiver.try_recv() {
        if let Ok(event) = serde_json::from_slice(&payload) {
            events.push(event);
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingPool;

    #[async_trait]
    impl ChannelPool for FailingPool {
        async fn acquire(&self) -> Result<Box<dyn EventChannel>> {
            Err(VoError::InternalServerError("broker down".into()))
        }
    }

    #[test]
    fn test_event_payload() {
        let address = NodeAddress::parse("vos://auth/A/sub/f").unwrap();
        let event = NodeEvent::for_node(&address, "alice");
        assert_eq!(event.container, "/A/sub");

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["uri"], "vos://auth/A/sub/f");
        assert_eq!(json["owner"], "alice");
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let pool = BroadcastPool::default();
        let mut rx = pool.subscribe(DEFAULT_EXCHANGE);
        let publisher = EventPublisher::new(Arc::new(pool), DEFAULT_EXCHANGE);

        let address = NodeAddress::parse("vos://auth/B").unwrap();
        publisher.publish(&NodeEvent::for_node(&address, "bob")).await;

        let events = drain_events(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].container, "/");
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let publisher = EventPublisher::new(Arc::new(FailingPool), DEFAULT_EXCHANGE);
        let address = NodeAddress::parse("vos://auth/B").unwrap();
        publisher.publish(&NodeEvent::for_node(&address, "bob")).await;

        EventPublisher::disabled()
            .publish(&NodeEvent::for_node(&address, "bob"))
            .await;
    }
}
