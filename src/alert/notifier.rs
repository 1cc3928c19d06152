//! Notification surface.
//!
//! Whatever shows alerts to the user implements `Notifier` and is handed to
//! the pipeline explicitly. Two implementations ship: one that writes to the
//! service log (the CLI), one that forwards onto a channel for embedding
//! hosts and tests.

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::logging::{self, Component};
use crate::model::{AlertMessage, Severity};

pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, alert: AlertMessage);
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, alert: AlertMessage) {
        (**self).notify(alert)
    }
}

/// Writes each alert to the service log at a level matching its severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, alert: AlertMessage) {
        match alert.severity {
            Severity::Error => logging::error(Component::Evaluator, None, &alert.text),
            Severity::Info => logging::info(Component::Evaluator, None, &alert.text),
        }
    }
}

/// Forwards alerts to an unbounded channel. Alerts raised after the receiver
/// is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<AlertMessage>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AlertMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, alert: AlertMessage) {
        if self.tx.send(alert).is_err() {
            logging::debug(Component::Evaluator, None, "alert dropped: notification receiver closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_notifier_delivers_in_order() {
        let (notifier, mut rx) = ChannelNotifier::channel();
        notifier.notify(AlertMessage::error("first"));
        notifier.notify(AlertMessage { text: "second".into(), severity: Severity::Info });

        assert_eq!(rx.try_recv().unwrap().text, "first");
        let second = rx.try_recv().unwrap();
        assert_eq!(second.text, "second");
        assert_eq!(second.severity, Severity::Info);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_notifier_survives_closed_receiver() {
        let (notifier, rx) = ChannelNotifier::channel();
        drop(rx);
        notifier.notify(AlertMessage::error("nobody listening"));
    }

    #[test]
    fn test_shared_notifier_forwards_through_arc() {
        let (notifier, mut rx) = ChannelNotifier::channel();
        let shared: Arc<dyn Notifier> = Arc::new(notifier);
        shared.notify(AlertMessage::error("via arc"));
        assert_eq!(rx.try_recv().unwrap().text, "via arc");
    }
}
