//! Notification port.
//!
//! Delivery (mail, push, whatever) belongs to an external dispatch
//! collaborator; the saga only emits events, fire-and-forget. The port
//! is injected into the orchestrator and reconciler at construction,
//! so its lifecycle is owned by the process bootstrap, not by any
//! global handle.

use std::sync::{Arc, Mutex};

use domain::{Money, OrderCode};
use tokio::sync::mpsc;

/// Events emitted after a checkout is durably finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    /// Tell the buyer their order went through.
    OrderConfirmation {
        order_code: OrderCode,
        email: String,
        full_name: String,
        total: Money,
    },

    /// Hand a first-time guest the credentials for the account that was
    /// created for them during checkout.
    GuestCredentials {
        order_code: OrderCode,
        email: String,
        full_name: String,
        one_time_password: String,
    },
}

/// Fire-and-forget notification sink.
pub trait NotificationPort: Send + Sync {
    /// Emits an event. Must not fail the checkout: errors are the
    /// implementation's problem to log and drop.
    fn notify(&self, event: NotificationEvent);
}

/// Forwards events over a channel to whatever dispatcher the bootstrap
/// wired up.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<NotificationEvent>,
}

impl ChannelNotifier {
    /// Creates the notifier and the receiving end for the dispatcher.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NotificationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationPort for ChannelNotifier {
    fn notify(&self, event: NotificationEvent) {
        if self.tx.send(event).is_err() {
            tracing::warn!("notification dropped: dispatcher receiver is gone");
        }
    }
}

/// Records events for assertions in tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything emitted so far.
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("notifier lock poisoned").clone()
    }

    /// Returns the number of emitted events.
    pub fn count(&self) -> usize {
        self.events.lock().expect("notifier lock poisoned").len()
    }
}

impl NotificationPort for RecordingNotifier {
    fn notify(&self, event: NotificationEvent) {
        self.events
            .lock()
            .expect("notifier lock poisoned")
            .push(event);
    }
}
