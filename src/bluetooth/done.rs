// Per-attempt connection lifecycle signals

use std::collections::HashMap;

use log::debug;
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// One oneshot slot per connection attempt, keyed by peripheral identifier.
/// A signal with no armed slot is discarded, so a late disconnection never
/// completes a different attempt.
#[derive(Default)]
pub struct DoneSignals {
    slots: Mutex<HashMap<String, oneshot::Sender<()>>>,
}

impl DoneSignals {
    pub fn arm(&self, id: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        if self.slots.lock().insert(id.to_owned(), tx).is_some() {
            debug!("Replaced stale done slot for {}", id);
        }
        rx
    }

    /// Deliver the signal for `id`. Returns `false` when nobody is waiting.
    pub fn signal(&self, id: &str) -> bool {
        match self.slots.lock().remove(id) {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn disarm(&self, id: &str) {
        self.slots.lock().remove(id);
    }

    pub fn pending(&self) -> usize {
        self.slots.lock().len()
    }
}
