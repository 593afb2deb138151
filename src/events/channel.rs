//! Event channel built on crossbeam-channel.

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::Event;

/// Sending half, cloned into every stage that reports progress.
#[derive(Clone)]
pub struct EventSender {
    inner: Sender<Event>,
}

impl EventSender {
    /// Send an event. If the receiver is gone the event is dropped, so
    /// progress reporting stays optional.
    pub fn send(&self, event: Event) {
        let _ = self.inner.send(event);
    }
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender").finish_non_exhaustive()
    }
}

/// Receiving half, held by the front-end.
pub struct EventReceiver {
    inner: Receiver<Event>,
}

impl EventReceiver {
    /// Block until the next event; `None` once every sender is dropped
    pub fn recv(&self) -> Option<Event> {
        self.inner.recv().ok()
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.inner.try_recv().ok()
    }

    /// Iterate until every sender is dropped
    pub fn iter(&self) -> impl Iterator<Item = Event> + '_ {
        self.inner.iter()
    }
}

/// Factory for sender/receiver pairs.
pub struct EventChannel;

impl EventChannel {
    /// Unbounded channel. Events are small; workers never wait on the UI.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (EventSender, EventReceiver) {
        let (sender, receiver) = unbounded();
        (
            EventSender { inner: sender },
            EventReceiver { inner: receiver },
        )
    }
}

/// Sender whose receiver is already gone. Used when nobody listens.
pub fn null_sender() -> EventSender {
    let (sender, _receiver) = EventChannel::new();
    sender
}
