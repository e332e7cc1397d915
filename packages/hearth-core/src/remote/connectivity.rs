//! Connectivity hint.
//!
//! Mirrors the platform's online/offline signal. It is only a hint: a request
//! can still fail while "online", and the sync layer treats failures the same
//! either way, except for which notice it shows.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared online/offline flag
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    /// Create with an initial state
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Current state
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update the state. Returns true if it changed.
    pub fn set_online(&self, online: bool) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        })
    }

    /// Watch for transitions
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transitions() {
        let conn = Connectivity::default();
        let mut rx = conn.subscribe();

        assert!(conn.is_online());
        assert!(!conn.set_online(true));
        assert!(conn.set_online(false));

        rx.changed().await.unwrap();
        assert!(!*rx.borrow());
        assert!(!conn.is_online());
    }
}
