//! Shared UI state: the published emotion label and the shutdown flag.

use moodlens_core::Emotion;
use std::sync::Arc;
use tokio::sync::watch;

/// Single-writer publisher for the dominant-emotion label.
///
/// Owned by the sampling loop; the view only ever sees the receiver.
/// `None` means no result has arrived yet (the view shows a placeholder).
pub struct LabelState {
    tx: watch::Sender<Option<Emotion>>,
}

impl LabelState {
    pub fn new() -> (Self, watch::Receiver<Option<Emotion>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }

    pub fn publish(&self, emotion: Emotion) {
        self.tx.send_replace(Some(emotion));
    }
}

/// Cooperative shutdown flag shared by every task.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_starts_empty_and_replaces() {
        let (label, rx) = LabelState::new();
        assert_eq!(*rx.borrow(), None);
        label.publish(Emotion::Happy);
        assert_eq!(*rx.borrow(), Some(Emotion::Happy));
        label.publish(Emotion::Sad);
        assert_eq!(*rx.borrow(), Some(Emotion::Sad));
    }

    #[test]
    fn test_shutdown_flag_visible_to_all_subscribers() {
        let shutdown = Shutdown::new();
        let rx1 = shutdown.subscribe();
        let rx2 = shutdown.clone().subscribe();
        assert!(!*rx1.borrow());
        shutdown.trigger();
        assert!(*rx1.borrow());
        assert!(*rx2.borrow());
    }
}
