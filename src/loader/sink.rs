use tokio::sync::mpsc;
use tracing::warn;

/// Receiver of a list view's state changes and user notifications.
///
/// Calls arrive while the loader holds its state lock, so implementations
/// must not call back into the loader.
pub trait ListSink<T>: Send + Sync + 'static {
    fn set_loading(&self, loading: bool);
    fn set_items(&self, items: Vec<T>);
    fn notify_error(&self, message: &str);
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent<T> {
    Loading(bool),
    Items(Vec<T>),
    Error(String),
}

/// Forwards every sink call as a [`ViewEvent`] over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink<T> {
    tx: mpsc::UnboundedSender<ViewEvent<T>>,
}

impl<T> ChannelSink<T> {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ViewEvent<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ViewEvent<T>) {
        if self.tx.send(event).is_err() {
            warn!("list view receiver dropped; event discarded");
        }
    }
}

impl<T: Send + 'static> ListSink<T> for ChannelSink<T> {
    fn set_loading(&self, loading: bool) {
        self.send(ViewEvent::Loading(loading));
    }

    fn set_items(&self, items: Vec<T>) {
        self.send(ViewEvent::Items(items));
    }

    fn notify_error(&self, message: &str) {
        self.send(ViewEvent::Error(message.to_string()));
    }
}
