//! Shared storage for receive/close callbacks

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{CloseCallback, ReceiveCallback};

/// Receive and close callback slots shared between a transport and its
/// reader (thread, notification handler, mock responder)
///
/// The close callback fires at most once per connection.
#[derive(Default)]
pub struct CallbackSlots {
    receive: Mutex<Option<ReceiveCallback>>,
    close: Mutex<Option<CloseCallback>>,
    closed: AtomicBool,
}

impl CallbackSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_receive(&self, callback: Option<ReceiveCallback>) {
        *self.receive.lock() = callback;
    }

    pub fn set_close(&self, callback: Option<CloseCallback>) {
        *self.close.lock() = callback;
    }

    /// Deliver an inbound report to the receive callback, if any
    pub fn dispatch(&self, report: &[u8]) {
        // Clone out so the callback may replace itself
        let callback = self.receive.lock().clone();
        if let Some(callback) = callback {
            callback(report);
        }
    }

    /// Fire the close callback unless it already fired
    pub fn notify_closed(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let callback = self.close.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Whether the close callback already fired
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_close_fires_once() {
        let slots = CallbackSlots::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        slots.set_close(Some(Arc::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        })));

        slots.notify_closed();
        slots.notify_closed();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(slots.is_closed());
    }

    #[test]
    fn test_dispatch_without_callback_is_noop() {
        let slots = CallbackSlots::new();
        slots.dispatch(&[1, 2, 3]);
    }

    #[test]
    fn test_dispatch_delivers_report() {
        let slots = CallbackSlots::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        slots.set_receive(Some(Arc::new(move |r: &[u8]| {
            seen_clone.lock().push(r.to_vec());
        })));
        slots.dispatch(&[0xAA]);
        slots.dispatch(&[0xBB]);
        assert_eq!(*seen.lock(), vec![vec![0xAA], vec![0xBB]]);
    }
}
