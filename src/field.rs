// field.rs — Single-slot hand-off of the camera luminance plane.
//
// The capture callback runs on its own serial thread and may deliver frames
// far faster (or slower) than the display refreshes. Only the newest frame
// matters, so the channel holds at most one value:
//
//   capture thread:  publisher.publish(luma)      replace, drop the old one
//   frame driver:    receiver.take_latest()       non-blocking, once per frame
//
// The driver keeps the `Arc` it took for the whole frame, so a publish that
// races with a frame in flight never invalidates what the frame is using.
// When every publisher is gone (camera denied, device unplugged) the
// receiver simply stops seeing new values.

use std::sync::{Arc, Mutex, TryLockError, Weak};

use crate::image::Image;

/// A camera luminance plane, shared immutably once published.
pub type ParameterField = Arc<Image<u8>>;

#[derive(Default)]
struct Slot {
    latest: Option<ParameterField>,
    /// Number of values ever published.
    published: u64,
}

/// Create a connected publisher/receiver pair.
pub fn channel() -> (FieldPublisher, FieldReceiver) {
    let slot = Arc::new(Mutex::new(Slot::default()));
    (FieldPublisher { slot: Arc::downgrade(&slot) }, FieldReceiver { slot })
}

/// Capture-side handle. Cheap to clone; `Send + Sync`.
#[derive(Clone)]
pub struct FieldPublisher {
    slot: Weak<Mutex<Slot>>,
}

impl FieldPublisher {
    /// Replace the pending field with `luma`.
    ///
    /// Returns `false` if the receiver is gone, so capture can shut down.
    pub fn publish(&self, luma: Image<u8>) -> bool {
        self.publish_shared(Arc::new(luma))
    }

    /// Like [`publish`](Self::publish) for an already shared plane.
    pub fn publish_shared(&self, luma: ParameterField) -> bool {
        let Some(slot) = self.slot.upgrade() else {
            return false;
        };
        // A poisoned slot still holds a valid Option; keep delivering.
        let mut guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.latest = Some(luma);
        guard.published += 1;
        true
    }
}

/// Driver-side handle.
pub struct FieldReceiver {
    slot: Arc<Mutex<Slot>>,
}

impl FieldReceiver {
    /// Take the newest unread field, if any, without blocking.
    ///
    /// If a publisher holds the lock right now this returns `None`; the
    /// value stays in the slot and is picked up next frame.
    pub fn take_latest(&self) -> Option<ParameterField> {
        match self.slot.try_lock() {
            Ok(mut guard) => guard.latest.take(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().latest.take(),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Total number of fields published so far.
    pub fn published(&self) -> u64 {
        match self.slot.lock() {
            Ok(guard) => guard.published,
            Err(poisoned) => poisoned.into_inner().published,
        }
    }

    /// `true` while at least one publisher is alive.
    pub fn is_connected(&self) -> bool {
        Arc::weak_count(&self.slot) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(value: u8) -> Image<u8> {
        Image::filled(4, 3, value)
    }

    #[test]
    fn test_empty_until_published() {
        let (_tx, rx) = channel();
        assert!(rx.take_latest().is_none());
    }

    #[test]
    fn test_only_latest_is_kept() {
        let (tx, rx) = channel();
        assert!(tx.publish(plane(1)));
        assert!(tx.publish(plane(2)));
        assert!(tx.publish(plane(3)));
        let got = rx.take_latest().expect("a field was published");
        assert_eq!(got.get(0, 0), 3);
        // Taken: nothing pending until the next publish.
        assert!(rx.take_latest().is_none());
        assert_eq!(rx.published(), 3);
    }

    #[test]
    fn test_held_field_survives_replacement() {
        let (tx, rx) = channel();
        tx.publish(plane(10));
        let held = rx.take_latest().unwrap();
        tx.publish(plane(20));
        assert_eq!(held.get(0, 0), 10);
        assert_eq!(rx.take_latest().unwrap().get(0, 0), 20);
    }

    #[test]
    fn test_publisher_drop_disconnects() {
        let (tx, rx) = channel();
        let tx2 = tx.clone();
        tx.publish(plane(5));
        drop(tx);
        assert!(rx.is_connected());
        drop(tx2);
        assert!(!rx.is_connected());
        // The last value is still delivered.
        assert_eq!(rx.take_latest().unwrap().get(0, 0), 5);
    }

    #[test]
    fn test_publish_after_receiver_drop() {
        let (tx, rx) = channel();
        drop(rx);
        assert!(!tx.publish(plane(1)));
    }

    #[test]
    fn test_cross_thread_delivery() {
        let (tx, rx) = channel();
        let handle = std::thread::spawn(move || {
            for v in 0..50u8 {
                tx.publish(plane(v));
            }
        });
        handle.join().unwrap();
        assert_eq!(rx.take_latest().unwrap().get(0, 0), 49);
    }
}
