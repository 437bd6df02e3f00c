//! Subscription event routing.
//!
//! The router consumes topic frames from the event channel in arrival order
//! and runs the registered handler for each to completion before touching
//! the next frame, so handlers never observe reordered or concurrent events.
//! Payload problems never propagate: malformed frames and frames without a
//! handler are logged and dropped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::client::DaemonClient;
use crate::protocol::STATUS_TOPIC;
use crate::transport::secure::SecureSubscriber;

/// A subscription event handler.
///
/// Handlers registered for ordinary topics receive the `data` member of the
/// event envelope; the handler registered under [`STATUS_TOPIC`] receives
/// the full status envelope instead.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, client: DaemonClient, payload: Value);
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(DaemonClient, Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ()> + Send,
{
    async fn handle(&self, client: DaemonClient, payload: Value) {
        (self.0)(client, payload).await;
    }
}

/// Topic-to-handler mapping, fixed at client construction.
///
/// Every topic except the reserved [`STATUS_TOPIC`] is subscribed on the
/// event channel during bootstrap.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a topic.
    pub fn with(mut self, topic: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.insert(topic.into(), handler);
        self
    }

    /// Register a closure as a handler for a topic.
    pub fn with_fn<F, Fut>(self, topic: impl Into<String>, handler: F) -> Self
    where
        F: Fn(DaemonClient, Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.with(topic, Arc::new(FnHandler(handler)))
    }

    pub fn get(&self, topic: &str) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(topic)
    }

    /// Topics to subscribe on the event channel: everything except the
    /// reserved status topic.
    pub fn event_topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self
            .handlers
            .keys()
            .map(String::as_str)
            .filter(|t| *t != STATUS_TOPIC)
            .collect();
        topics.sort_unstable();
        topics
    }
}

/// Drives handler dispatch for one connection cycle's event channel.
pub(crate) struct EventRouter {
    registry: Arc<HandlerRegistry>,
    client: DaemonClient,
}

impl EventRouter {
    pub fn new(registry: Arc<HandlerRegistry>, client: DaemonClient) -> Self {
        Self { registry, client }
    }

    /// Consume the event channel until it closes.
    pub async fn run(self, mut subscriber: SecureSubscriber) {
        loop {
            match subscriber.next().await {
                Ok((topic, payload)) => self.dispatch(&topic, &payload).await,
                Err(e) => {
                    debug!("event channel closed: {e}");
                    break;
                }
            }
        }
    }

    /// Handle one topic frame. Runs the handler to completion, keeping
    /// dispatch strictly sequential.
    pub(crate) async fn dispatch(&self, topic: &str, payload: &[u8]) {
        let parsed: Value = match serde_json::from_slice(payload) {
            Ok(v) => v,
            Err(e) => {
                error!("emberd sent invalid JSON on a subscription for {topic}: {e}");
                return;
            }
        };

        debug!(topic, "received subscription event");

        if parsed.pointer("/meta/status").and_then(Value::as_i64) != Some(200) {
            error!("emberd sent an event for topic {topic} with a non-200 status: {parsed}");
        }

        match self.registry.get(topic) {
            Some(handler) => {
                let data = parsed.get("data").cloned().unwrap_or(Value::Null);
                handler.handle(self.client.clone(), data).await;
            }
            None => {
                warn!("received subscription event with topic {topic:?}, but no handler exists");
            }
        }
    }
}
