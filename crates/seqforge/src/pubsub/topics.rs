use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use super::MessageListener;
use crate::{ClientFactory, Connector, Namespace, PoolHandle, Result, StopToken, StoreClient};

/// Listener identity: the address of its shared allocation.
type ListenerKey = usize;

fn listener_key(listener: &Arc<dyn MessageListener>) -> ListenerKey {
    Arc::as_ptr(listener).cast::<()>() as usize
}

/// Tracks which listeners follow which topics and owns the stop token of
/// every live subscription.
///
/// A subscription occupies one pooled client for as long as it runs, so size
/// the pool behind the handle for the expected number of concurrent
/// subscriptions plus regular traffic.
///
/// ## Cancellation
/// [`Subscription::run`] and [`TopicRegistry::subscribe_blocking`] block the
/// calling thread until the subscription ends. It ends when a peer calls
/// [`TopicRegistry::unsubscribe`] or [`Subscription::cancel`] (or a clone of
/// its [`Subscription::canceller`]) from another thread, or when the store
/// connection fails.
pub struct TopicRegistry<C: Connector> {
    handle: PoolHandle<C>,
    topics: Mutex<HashMap<String, HashMap<ListenerKey, StopToken>>>,
}

impl<C> TopicRegistry<C>
where
    C: Connector,
    <C::Factory as ClientFactory>::Client: StoreClient,
{
    pub fn new(handle: PoolHandle<C>) -> Arc<Self> {
        Arc::new(Self {
            handle,
            topics: Mutex::new(HashMap::new()),
        })
    }

    /// Registers `listener` for `topic` and returns the subscription to run.
    ///
    /// Returns `None` when the listener already follows the topic.
    ///
    /// # Errors
    /// [`Error::InvalidNamespace`](crate::Error::InvalidNamespace) for a
    /// malformed topic name.
    pub fn subscribe(
        self: &Arc<Self>,
        topic: &str,
        listener: Arc<dyn MessageListener>,
    ) -> Result<Option<Subscription<C>>> {
        let topic = Namespace::parse(topic)?.as_str().to_owned();
        let key = listener_key(&listener);
        let stop = StopToken::new();
        {
            let mut topics = self.topics.lock();
            let listeners = topics.entry(topic.clone()).or_default();
            if listeners.contains_key(&key) {
                return Ok(None);
            }
            listeners.insert(key, stop.clone());
        }
        Ok(Some(Subscription {
            registry: Arc::clone(self),
            topic,
            listener,
            key,
            stop,
        }))
    }

    /// Subscribes and blocks until the subscription ends.
    ///
    /// Returns `Ok(false)` without blocking if the listener already follows
    /// the topic.
    pub fn subscribe_blocking(self: &Arc<Self>, topic: &str, listener: Arc<dyn MessageListener>) -> Result<bool> {
        match self.subscribe(topic, listener)? {
            Some(subscription) => subscription.run().map(|()| true),
            None => Ok(false),
        }
    }

    /// Stops delivery of `topic` to `listener`. Returns `false` if the
    /// listener was not registered.
    pub fn unsubscribe(&self, topic: &str, listener: &Arc<dyn MessageListener>) -> bool {
        let key = listener_key(listener);
        let mut topics = self.topics.lock();
        let Some(listeners) = topics.get_mut(topic) else {
            return false;
        };
        let Some(stop) = listeners.remove(&key) else {
            return false;
        };
        if listeners.is_empty() {
            topics.remove(topic);
        }
        stop.cancel();
        true
    }

    /// Cancels every subscription. Returns how many were cancelled.
    pub fn unsubscribe_all(&self) -> usize {
        let drained: Vec<_> = self.topics.lock().drain().collect();
        drained
            .into_iter()
            .flat_map(|(_, listeners)| listeners.into_values())
            .map(|stop| stop.cancel())
            .count()
    }

    /// Publishes `payload` on `topic`. Returns the number of subscribers the
    /// store delivered it to.
    pub fn publish(&self, topic: &str, payload: &[u8]) -> Result<u64> {
        let topic = Namespace::parse(topic)?;
        self.handle.borrow()?.call(|client| client.publish(topic.as_str(), payload))
    }

    /// Topics with at least one registered listener.
    pub fn topics(&self) -> Vec<String> {
        self.topics.lock().keys().cloned().collect()
    }

    pub fn listener_count(&self, topic: &str) -> usize {
        self.topics.lock().get(topic).map_or(0, HashMap::len)
    }

    pub fn handle(&self) -> &PoolHandle<C> {
        &self.handle
    }
}

impl<C: Connector> TopicRegistry<C> {
    /// Drops the bookkeeping entry if it still belongs to `stop`.
    fn forget(&self, topic: &str, key: ListenerKey, stop: &StopToken) {
        let mut topics = self.topics.lock();
        if let Some(listeners) = topics.get_mut(topic) {
            if listeners.get(&key).is_some_and(|current| current.same_token(stop)) {
                listeners.remove(&key);
            }
            if listeners.is_empty() {
                topics.remove(topic);
            }
        }
    }
}

impl<C: Connector> core::fmt::Debug for TopicRegistry<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TopicRegistry")
            .field("handle", &self.handle)
            .field("topics", &self.topics.lock().len())
            .finish()
    }
}

/// One registered listener on one topic, ready to run.
///
/// Dropping a subscription without running it releases its registration.
pub struct Subscription<C: Connector> {
    registry: Arc<TopicRegistry<C>>,
    topic: String,
    listener: Arc<dyn MessageListener>,
    key: ListenerKey,
    stop: StopToken,
}

impl<C> Subscription<C>
where
    C: Connector,
    <C::Factory as ClientFactory>::Client: StoreClient,
{
    /// Borrows a dedicated client and delivers messages to the listener
    /// until cancelled.
    ///
    /// # Errors
    /// - Pool errors from borrowing the client.
    /// - [`Error::BackendUnavailable`](crate::Error::BackendUnavailable) if
    ///   the connection fails mid-subscription.
    pub fn run(self) -> Result<()> {
        if self.stop.is_cancelled() {
            return Ok(());
        }
        let mut client = self.registry.handle.borrow()?;

        #[cfg(feature = "tracing")]
        tracing::debug!(topic = %self.topic, client = client.id(), "subscription started");

        let outcome = client.call(|c| c.subscribe(&self.topic, self.listener.as_ref(), &self.stop));

        #[cfg(feature = "tracing")]
        tracing::debug!(topic = %self.topic, ok = outcome.is_ok(), "subscription ended");

        outcome
    }
}

impl<C: Connector> Subscription<C> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// A token that ends this subscription when cancelled from any thread.
    pub fn canceller(&self) -> StopToken {
        self.stop.clone()
    }

    pub fn cancel(&self) {
        self.stop.cancel();
    }
}

impl<C: Connector> Drop for Subscription<C> {
    fn drop(&mut self) {
        self.registry.forget(&self.topic, self.key, &self.stop);
    }
}

impl<C: Connector> core::fmt::Debug for Subscription<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("stop", &self.stop)
            .finish_non_exhaustive()
    }
}
