//! Outbound event channel (§9).
//!
//! Replaces the source's subscribe/emit callback API with a fixed, closed
//! `Event` enum delivered over a bounded `crossbeam_channel` — the producer
//! never blocks on a slow consumer beyond the channel's capacity, and the
//! consumer decides whether to poll or drain.

use crossbeam_channel::{Receiver, Sender};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    BundleLoading { bundle_name: String },
    BundleLoaded { bundle_name: String, bundle_version: String, merkle_root: String },
    BundleError { bundle_name: String, reason: String },
    AssetCached { relative_path: String, locale: String },
    AssetEvicted { relative_path: String, locale: String },
    CacheFull { capacity: u64 },
    PatchApplied { bundle_name: String, from_version: String, to_version: String },
}

/// Default channel capacity. A slow consumer applies backpressure to the
/// producer once this many events are buffered rather than the producer
/// growing an unbounded queue.
pub const DEFAULT_CAPACITY: usize = 256;

pub fn channel() -> (Sender<Event>, Receiver<Event>) {
    crossbeam_channel::bounded(DEFAULT_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_delivered_in_send_order() {
        let (tx, rx) = channel();
        tx.send(Event::BundleLoading { bundle_name: "main".into() }).unwrap();
        tx.send(Event::BundleLoaded {
            bundle_name: "main".into(),
            bundle_version: "1.0.0".into(),
            merkle_root: "abc".into(),
        })
        .unwrap();
        drop(tx);

        let first = rx.recv().unwrap();
        assert_eq!(first, Event::BundleLoading { bundle_name: "main".into() });
        let second = rx.recv().unwrap();
        assert!(matches!(second, Event::BundleLoaded { .. }));
        assert!(rx.recv().is_err());
    }
}
