//! Listener registry with copy-on-iterate fan-out.
//!
//! Callbacks may add or remove listeners (or trigger further sends) while a
//! notification is in flight: `notify` clones the current list under the lock,
//! releases it, then calls out. A listener removed mid-fan-out still sees the
//! event that was already being delivered; one added mid-fan-out sees the next.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned on registration, used to unregister later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Shared, cloneable set of listeners of type `L` (usually a trait object).
pub struct ListenerSet<L: ?Sized> {
    entries: Arc<RwLock<Vec<(ListenerId, Arc<L>)>>>,
}

impl<L: ?Sized> Clone for ListenerSet<L> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> ListenerSet<L> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn add(&self, listener: Arc<L>) -> ListenerId {
        let id = ListenerId::next();
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Returns false if the id was not registered here.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| l.clone())
            .collect()
    }

    /// Call `f` for every listener registered at the time of the call.
    pub fn notify<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&L),
    {
        let snapshot = self.snapshot();
        for listener in &snapshot {
            f(listener);
        }
        snapshot.len()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    trait Probe: Send + Sync {
        fn hit(&self, value: u32);
    }

    struct Recorder(Mutex<Vec<u32>>);

    impl Probe for Recorder {
        fn hit(&self, value: u32) {
            self.0.lock().unwrap().push(value);
        }
    }

    /// Removes itself and registers a replacement the first time it fires.
    struct SelfRemoving {
        set: ListenerSet<dyn Probe>,
        id: Mutex<Option<ListenerId>>,
        replacement: Arc<Recorder>,
    }

    impl Probe for SelfRemoving {
        fn hit(&self, _value: u32) {
            if let Some(id) = self.id.lock().unwrap().take() {
                self.set.remove(id);
                self.set.add(self.replacement.clone());
            }
        }
    }

    #[test]
    fn add_remove_and_notify() {
        let set: ListenerSet<dyn Probe> = ListenerSet::new();
        let a = Arc::new(Recorder(Mutex::new(Vec::new())));
        let id = set.add(a.clone());

        assert_eq!(set.notify(|l| l.hit(1)), 1);
        assert!(set.remove(id));
        assert!(!set.remove(id));
        assert_eq!(set.notify(|l| l.hit(2)), 0);
        assert_eq!(*a.0.lock().unwrap(), vec![1]);
    }

    #[test]
    fn mutation_during_fan_out_does_not_skip_others() {
        let set: ListenerSet<dyn Probe> = ListenerSet::new();
        let before = Arc::new(Recorder(Mutex::new(Vec::new())));
        let after = Arc::new(Recorder(Mutex::new(Vec::new())));
        let replacement = Arc::new(Recorder(Mutex::new(Vec::new())));

        set.add(before.clone());
        let remover = Arc::new(SelfRemoving {
            set: set.clone(),
            id: Mutex::new(None),
            replacement: replacement.clone(),
        });
        let remover_id = set.add(remover.clone());
        *remover.id.lock().unwrap() = Some(remover_id);
        set.add(after.clone());

        assert_eq!(set.notify(|l| l.hit(7)), 3);
        assert_eq!(*before.0.lock().unwrap(), vec![7]);
        assert_eq!(*after.0.lock().unwrap(), vec![7]);
        // Added during fan-out: sees only the next event
        assert!(replacement.0.lock().unwrap().is_empty());

        set.notify(|l| l.hit(8));
        assert_eq!(*replacement.0.lock().unwrap(), vec![8]);
        assert_eq!(set.len(), 3);
    }
}
