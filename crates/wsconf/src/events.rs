//
// events.rs
//
// Ordered fan-out of notifications to channel subscribers
//

use std::sync::Mutex;

use tokio::sync::mpsc;

/// A list of subscribers that receive every published item in registration
/// order. Subscribers whose receiver was dropped are pruned on the next send.
#[derive(Debug)]
pub struct Subscribers<T> {
    senders: Mutex<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone> Subscribers<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut senders) = self.senders.lock() {
            senders.push(tx);
        }
        rx
    }

    /// Deliver `item` to every live subscriber. Returns how many received it.
    pub fn send(&self, item: &T) -> usize {
        let Ok(mut senders) = self.senders.lock() else {
            return 0;
        };
        senders.retain(|tx| tx.send(item.clone()).is_ok());
        senders.len()
    }

    /// Drop every subscriber; their receivers observe end-of-stream
    pub fn clear(&self) {
        if let Ok(mut senders) = self.senders.lock() {
            senders.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.senders.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
