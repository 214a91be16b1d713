//! Agent message bus
//!
//! Publish/subscribe transport between agents and the coordinator.
//! Publishing only enqueues; a single dispatch task drains the queue in
//! FIFO order and hands each message to every subscriber whose key matches
//! (see `AgentMessage::routing_keys`). Delivery is at-most-once to whoever
//! is registered at dispatch time: no persistence, no acks, no retries.

pub mod message;

pub use message::{AgentMessage, MessagePriority, MessageType, SubscriptionKey};

use crate::error::{AgentError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

/// Default bound for channel-backed subscriptions
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Callback invoked by the dispatch loop. Errors are logged and do not stop
/// delivery to other subscribers.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, message: &AgentMessage) -> anyhow::Result<()>;
}

impl<F> MessageHandler for F
where
    F: Fn(&AgentMessage) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, message: &AgentMessage) -> anyhow::Result<()> {
        self(message)
    }
}

type Registry = HashMap<SubscriptionKey, Vec<(u64, Arc<dyn MessageHandler>)>>;

enum BusCommand {
    Deliver(AgentMessage),
    Flush(oneshot::Sender<()>),
}

/// Counters exposed by `MessageBus::stats`
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BusStats {
    pub published: u64,
    pub delivered: u64,
    pub undelivered: u64,
    pub failed_callbacks: u64,
    pub subscriptions: usize,
}

struct Shared {
    registry: RwLock<Registry>,
    next_subscription: AtomicU64,
    paused: watch::Sender<bool>,
    published: AtomicU64,
    delivered: AtomicU64,
    undelivered: AtomicU64,
    failed_callbacks: AtomicU64,
}

/// Cheap-to-clone handle to one bus instance
#[derive(Clone)]
pub struct MessageBus {
    shared: Arc<Shared>,
    queue_tx: mpsc::UnboundedSender<BusCommand>,
    cancel: CancellationToken,
    channel_capacity: usize,
}

impl MessageBus {
    /// Create a bus and start its dispatch loop. Must run inside a tokio runtime.
    pub fn new(channel_capacity: usize) -> Self {
        let (paused, paused_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            registry: RwLock::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
            paused,
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            undelivered: AtomicU64::new(0),
            failed_callbacks: AtomicU64::new(0),
        });
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let shared_clone = Arc::clone(&shared);
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            Self::dispatch_loop(shared_clone, queue_rx, paused_rx, cancel_clone).await;
        });

        Self {
            shared,
            queue_tx,
            cancel,
            channel_capacity: channel_capacity.max(1),
        }
    }

    // -------------------------------------------------------------------------
    // Publishing
    // -------------------------------------------------------------------------

    /// Enqueue a message for delivery; returns its id
    pub fn publish(&self, mut message: AgentMessage) -> Result<String> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::Bus("message bus is closed".to_string()));
        }

        message.stamp();
        let id = message.message_id.clone();

        self.queue_tx
            .send(BusCommand::Deliver(message))
            .map_err(|_| AgentError::Bus("dispatch loop is not running".to_string()))?;
        self.shared.published.fetch_add(1, Ordering::Relaxed);

        Ok(id)
    }

    /// Publish to every type subscriber, ignoring any direct recipient
    pub fn broadcast(&self, mut message: AgentMessage) -> Result<String> {
        message.to = None;
        self.publish(message)
    }

    /// Resolves once every message published before this call was dispatched
    pub async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.queue_tx
            .send(BusCommand::Flush(done_tx))
            .map_err(|_| AgentError::Bus("dispatch loop is not running".to_string()))?;
        done_rx
            .await
            .map_err(|_| AgentError::Bus("bus closed before flush completed".to_string()))
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Subscribe to a message type, optionally scoped to one recipient agent
    pub fn subscribe<H>(&self, message_type: MessageType, agent_id: Option<&str>, handler: H) -> Subscription
    where
        H: MessageHandler + 'static,
    {
        self.subscribe_key(SubscriptionKey::new(agent_id, Some(&message_type)), Arc::new(handler))
    }

    /// Subscribe to every message addressed to `agent_id`, whatever its type
    pub fn subscribe_agent<H>(&self, agent_id: &str, handler: H) -> Subscription
    where
        H: MessageHandler + 'static,
    {
        self.subscribe_key(SubscriptionKey::new(Some(agent_id), None), Arc::new(handler))
    }

    /// Subscribe to everything that passes through the bus
    pub fn subscribe_all<H>(&self, handler: H) -> Subscription
    where
        H: MessageHandler + 'static,
    {
        self.subscribe_key(SubscriptionKey::All, Arc::new(handler))
    }

    /// Subscribe with a bounded channel instead of a callback.
    ///
    /// A full channel drops the message and counts as a failed callback.
    pub fn subscribe_channel(
        &self,
        message_type: Option<MessageType>,
        agent_id: Option<&str>,
    ) -> (Subscription, mpsc::Receiver<AgentMessage>) {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let key = SubscriptionKey::new(agent_id, message_type.as_ref());
        let handler = move |message: &AgentMessage| -> anyhow::Result<()> {
            tx.try_send(message.clone())
                .map_err(|e| anyhow::anyhow!("subscriber channel unavailable: {}", e))
        };
        (self.subscribe_key(key, Arc::new(handler)), rx)
    }

    fn subscribe_key(&self, key: SubscriptionKey, handler: Arc<dyn MessageHandler>) -> Subscription {
        let id = self.shared.next_subscription.fetch_add(1, Ordering::Relaxed);
        match self.shared.registry.write() {
            Ok(mut registry) => registry.entry(key.clone()).or_default().push((id, handler)),
            Err(_) => tracing::error!(key = %key, "Subscriber registry poisoned, subscription dropped"),
        }
        tracing::debug!(key = %key, id, "Subscribed");

        Subscription {
            key,
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared
            .registry
            .read()
            .map(|r| r.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    // -------------------------------------------------------------------------
    // Control
    // -------------------------------------------------------------------------

    /// Stop draining the queue; queued messages are kept
    pub fn pause_processing(&self) {
        self.shared.paused.send_replace(true);
        tracing::debug!("Message bus paused");
    }

    pub fn resume_processing(&self) {
        self.shared.paused.send_replace(false);
        tracing::debug!("Message bus resumed");
    }

    pub fn is_paused(&self) -> bool {
        *self.shared.paused.borrow()
    }

    /// Stop the dispatch loop. Messages still queued are discarded.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.shared.published.load(Ordering::Relaxed),
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            undelivered: self.shared.undelivered.load(Ordering::Relaxed),
            failed_callbacks: self.shared.failed_callbacks.load(Ordering::Relaxed),
            subscriptions: self.subscriber_count(),
        }
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    async fn dispatch_loop(
        shared: Arc<Shared>,
        mut queue_rx: mpsc::UnboundedReceiver<BusCommand>,
        mut paused: watch::Receiver<bool>,
        cancel: CancellationToken,
    ) {
        loop {
            if !Self::wait_until_resumed(&mut paused, &cancel).await {
                break;
            }

            let command = tokio::select! {
                _ = cancel.cancelled() => break,
                command = queue_rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            // A pause may have landed while we were waiting on the queue
            if !Self::wait_until_resumed(&mut paused, &cancel).await {
                break;
            }

            match command {
                BusCommand::Deliver(message) => Self::deliver(&shared, &message),
                BusCommand::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }

        tracing::debug!("Message bus dispatch loop stopped");
    }

    /// Returns false if the bus was closed while waiting
    async fn wait_until_resumed(paused: &mut watch::Receiver<bool>, cancel: &CancellationToken) -> bool {
        loop {
            let is_paused = *paused.borrow_and_update();
            if !is_paused {
                return true;
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                changed = paused.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    fn deliver(shared: &Shared, message: &AgentMessage) {
        let handlers: Vec<Arc<dyn MessageHandler>> = match shared.registry.read() {
            Ok(registry) => message
                .routing_keys()
                .iter()
                .filter_map(|key| registry.get(key))
                .flat_map(|subs| subs.iter().map(|(_, h)| Arc::clone(h)))
                .collect(),
            Err(_) => {
                tracing::error!("Subscriber registry poisoned, dropping message");
                return;
            }
        };

        if handlers.is_empty() {
            shared.undelivered.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                message_type = %message.message_type,
                to = ?message.to,
                sender = %message.sender,
                "No subscribers for message"
            );
            return;
        }

        for handler in handlers {
            match handler.handle(message) {
                Ok(()) => {
                    shared.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    shared.failed_callbacks.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        message_id = %message.message_id,
                        message_type = %message.message_type,
                        "Subscriber callback failed: {}",
                        e
                    );
                }
            }
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// Handle returned by every subscribe call
#[derive(Debug)]
pub struct Subscription {
    key: SubscriptionKey,
    id: u64,
    shared: Weak<Shared>,
}

impl Subscription {
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Remove the subscription; returns false if it was already gone
    pub fn unsubscribe(self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let Ok(mut registry) = shared.registry.write() else {
            return false;
        };

        let Some(subs) = registry.get_mut(&self.key) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|(id, _)| *id != self.id);
        let removed = subs.len() != before;
        if subs.is_empty() {
            registry.remove(&self.key);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&AgentMessage) -> anyhow::Result<()> + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let handler = move |m: &AgentMessage| -> anyhow::Result<()> {
            seen_clone.lock().unwrap().push(m.payload.to_string());
            Ok(())
        };
        (seen, handler)
    }

    fn msg(ty: MessageType, payload: i64) -> AgentMessage {
        AgentMessage::new("tester", ty, serde_json::json!(payload))
    }

    #[tokio::test]
    async fn test_direct_message_reaches_recipient_only() {
        let bus = MessageBus::default();
        let (alice, alice_handler) = recorder();
        let (bob, bob_handler) = recorder();
        bus.subscribe(MessageType::Feedback, Some("alice"), alice_handler);
        bus.subscribe(MessageType::Feedback, Some("bob"), bob_handler);

        bus.publish(msg(MessageType::Feedback, 1).to("alice")).unwrap();
        bus.flush().await.unwrap();

        assert_eq!(alice.lock().unwrap().as_slice(), ["1"]);
        assert!(bob.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_type_subscribers() {
        let bus = MessageBus::default();
        let (first, first_handler) = recorder();
        let (second, second_handler) = recorder();
        let (direct, direct_handler) = recorder();
        bus.subscribe(MessageType::Recommendation, None, first_handler);
        bus.subscribe(MessageType::Recommendation, None, second_handler);
        bus.subscribe(MessageType::Recommendation, Some("alice"), direct_handler);

        bus.broadcast(msg(MessageType::Recommendation, 7).to("alice")).unwrap();
        bus.flush().await.unwrap();

        assert_eq!(first.lock().unwrap().len(), 1);
        assert_eq!(second.lock().unwrap().len(), 1);
        // broadcast clears the recipient, so direct subscribers are not matched
        assert!(direct.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_agent_and_catch_all_keys() {
        let bus = MessageBus::default();
        let (any_type, any_handler) = recorder();
        let (all, all_handler) = recorder();
        bus.subscribe_agent("alice", any_handler);
        bus.subscribe_all(all_handler);

        bus.publish(msg(MessageType::Error, 1).to("alice")).unwrap();
        bus.publish(msg(MessageType::Error, 2)).unwrap();
        bus.flush().await.unwrap();

        assert_eq!(any_type.lock().unwrap().as_slice(), ["1"]);
        assert_eq!(all.lock().unwrap().as_slice(), ["1", "2"]);
    }

    #[tokio::test]
    async fn test_agent_named_like_type_gets_no_broadcasts() {
        let bus = MessageBus::default();
        let (inbox, inbox_handler) = recorder();
        let (errors, errors_handler) = recorder();
        bus.subscribe_agent("error", inbox_handler);
        bus.subscribe(MessageType::Error, None, errors_handler);

        bus.publish(msg(MessageType::Error, 1)).unwrap();
        bus.publish(msg(MessageType::Feedback, 2).to("error")).unwrap();
        bus.flush().await.unwrap();

        assert_eq!(inbox.lock().unwrap().as_slice(), ["2"]);
        assert_eq!(errors.lock().unwrap().as_slice(), ["1"]);
    }

    #[tokio::test]
    async fn test_no_subscribers_is_non_fatal() {
        let bus = MessageBus::default();
        bus.publish(msg(MessageType::Error, 1)).unwrap();
        bus.flush().await.unwrap();
        let stats = bus.stats();
        assert_eq!(stats.published, 1);
        assert_eq!(stats.undelivered, 1);
        assert_eq!(stats.delivered, 0);
    }

    #[tokio::test]
    async fn test_failing_callback_does_not_block_others() {
        let bus = MessageBus::default();
        bus.subscribe(MessageType::Error, None, |_: &AgentMessage| -> anyhow::Result<()> {
            anyhow::bail!("subscriber exploded")
        });
        let (seen, handler) = recorder();
        bus.subscribe(MessageType::Error, None, handler);

        bus.publish(msg(MessageType::Error, 3)).unwrap();
        bus.flush().await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
        let stats = bus.stats();
        assert_eq!(stats.failed_callbacks, 1);
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test]
    async fn test_publish_order_preserved() {
        let bus = MessageBus::default();
        let (seen, handler) = recorder();
        bus.subscribe(MessageType::StateTransition, None, handler);

        for i in 0..50 {
            bus.publish(msg(MessageType::StateTransition, i)).unwrap();
        }
        bus.flush().await.unwrap();

        let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(*seen.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_pause_preserves_queue() {
        let bus = MessageBus::default();
        let (seen, handler) = recorder();
        bus.subscribe(MessageType::Feedback, None, handler);

        bus.pause_processing();
        bus.publish(msg(MessageType::Feedback, 1)).unwrap();
        bus.publish(msg(MessageType::Feedback, 2)).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert!(seen.lock().unwrap().is_empty());

        bus.resume_processing();
        bus.flush().await.unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), ["1", "2"]);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let bus = MessageBus::default();
        let (seen, handler) = recorder();
        let sub = bus.subscribe(MessageType::Feedback, None, handler);
        assert_eq!(bus.subscriber_count(), 1);
        assert!(sub.unsubscribe());
        assert_eq!(bus.subscriber_count(), 0);

        bus.publish(msg(MessageType::Feedback, 1)).unwrap();
        bus.flush().await.unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_channel_subscription() {
        let bus = MessageBus::new(1);
        let (_sub, mut rx) = bus.subscribe_channel(None, Some("alice"));

        bus.publish(msg(MessageType::Feedback, 1).to("alice")).unwrap();
        bus.publish(msg(MessageType::Feedback, 2).to("alice")).unwrap();
        bus.flush().await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.payload, serde_json::json!(1));
        // capacity 1: second message was dropped
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.stats().failed_callbacks, 1);
    }

    #[tokio::test]
    async fn test_closed_bus_rejects_publish() {
        let bus = MessageBus::default();
        bus.close();
        assert!(bus.is_closed());
        assert!(matches!(
            bus.publish(msg(MessageType::Error, 1)),
            Err(AgentError::Bus(_))
        ));
    }
}
