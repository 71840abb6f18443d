/// Receives messages delivered on a subscribed topic.
///
/// Listeners are invoked on the subscription's own thread, one message at a
/// time, in the order the store delivered them.
pub trait MessageListener: Send + Sync {
    fn on_message(&self, topic: &str, payload: &[u8]);
}

impl<F> MessageListener for F
where
    F: Fn(&str, &[u8]) + Send + Sync,
{
    fn on_message(&self, topic: &str, payload: &[u8]) {
        self(topic, payload)
    }
}
