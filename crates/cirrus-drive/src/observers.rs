//! Multicast delivery of change batches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use cirrus_core::RootRelativePath;

/// Receives batches of changed paths.
///
/// Delivery happens on the monitor's task; implementations must not block,
/// or they stall delivery to observers registered after them. Hand heavy
/// work to your own scheduling context.
pub trait DriveObserver: Send + Sync {
    fn paths_changed(&self, paths: &[RootRelativePath]);
}

/// Handle returned by [`ObserverRegistry::add`]; pass it back to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Registry of weakly-held observers.
///
/// Observers are stored as `Weak`, so dropping the last caller-side `Arc`
/// unregisters implicitly; a dead observer is silently skipped and pruned
/// at the next delivery.
#[derive(Default)]
pub struct ObserverRegistry {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ObserverId, Weak<dyn DriveObserver>)>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Registration does not replay past batches.
    pub fn add(&self, observer: Arc<dyn DriveObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.entries.lock().expect("observer registry poisoned");
        entries.push((id, Arc::downgrade(&observer)));
        id
    }

    /// Unregister; returns false if the id was already gone.
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut entries = self.entries.lock().expect("observer registry poisoned");
        let before = entries.len();
        entries.retain(|(eid, _)| *eid != id);
        entries.len() != before
    }

    /// Deliver one batch to every live observer, in registration order.
    pub fn deliver(&self, paths: &[RootRelativePath]) {
        // Snapshot under the lock, call outside it, so an observer that
        // adds or removes registrations during delivery cannot deadlock.
        let targets: Vec<Arc<dyn DriveObserver>> = {
            let mut entries = self.entries.lock().expect("observer registry poisoned");
            entries.retain(|(_, weak)| weak.strong_count() > 0);
            entries
                .iter()
                .filter_map(|(_, weak)| weak.upgrade())
                .collect()
        };
        for observer in targets {
            observer.paths_changed(paths);
        }
    }

    /// Number of currently live observers.
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().expect("observer registry poisoned");
        entries
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        batches: Mutex<Vec<Vec<RootRelativePath>>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
            })
        }
    }

    impl DriveObserver for Recorder {
        fn paths_changed(&self, paths: &[RootRelativePath]) {
            self.batches.lock().unwrap().push(paths.to_vec());
        }
    }

    fn batch(names: &[&str]) -> Vec<RootRelativePath> {
        names
            .iter()
            .map(|n| RootRelativePath::parse(n).unwrap())
            .collect()
    }

    #[test]
    fn delivers_in_registration_order() {
        let registry = ObserverRegistry::new();
        let a = Recorder::new();
        let b = Recorder::new();
        registry.add(a.clone());
        registry.add(b.clone());

        registry.deliver(&batch(&["x.txt"]));
        assert_eq!(a.batches.lock().unwrap().len(), 1);
        assert_eq!(b.batches.lock().unwrap().len(), 1);
    }

    #[test]
    fn removed_observer_is_skipped() {
        let registry = ObserverRegistry::new();
        let a = Recorder::new();
        let id = registry.add(a.clone());
        assert!(registry.remove(id));
        assert!(!registry.remove(id), "second removal is a no-op");

        registry.deliver(&batch(&["x.txt"]));
        assert!(a.batches.lock().unwrap().is_empty());
    }

    #[test]
    fn dropped_observer_is_silently_skipped() {
        let registry = ObserverRegistry::new();
        let a = Recorder::new();
        registry.add(a.clone());
        let b = Recorder::new();
        registry.add(b.clone());
        drop(a);

        registry.deliver(&batch(&["x.txt"]));
        assert_eq!(registry.len(), 1);
        assert_eq!(b.batches.lock().unwrap().len(), 1);
    }

    #[test]
    fn delivery_with_no_observers_is_fine() {
        let registry = ObserverRegistry::new();
        registry.deliver(&batch(&["x.txt"]));
        assert!(registry.is_empty());
    }
}
