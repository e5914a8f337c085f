/// Receiver of raw channel messages.
///
/// The channel driver (MQTT listener, tests) owns the subscription and calls
/// `on_message` once per inbound message, in arrival order.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, channel: &str, payload: &[u8]);
}

impl<T: MessageHandler + ?Sized> MessageHandler for std::sync::Arc<T> {
    fn on_message(&self, channel: &str, payload: &[u8]) {
        (**self).on_message(channel, payload)
    }
}
