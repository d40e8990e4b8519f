//! Tracking of the external resources a widget acquires.

use maybe_sync::MaybeSend;
use parking_lot::Mutex;

/// Opaque token for one registered resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

/// Release action of one registered resource.
pub trait ReleaseFn: MaybeSend {
    /// Releases the resource, consuming the action.
    fn release(self: Box<Self>);
}

impl<F> ReleaseFn for F
where
    F: FnOnce() + MaybeSend,
{
    fn release(self: Box<Self>) {
        self()
    }
}

struct Entry {
    handle: SubscriptionHandle,
    release: Box<dyn ReleaseFn>,
}

/// Registry of every subscription and pending wait a widget holds.
///
/// Each registered release action runs exactly once: either through
/// [`SubscriptionRegistry::release`] or through
/// [`SubscriptionRegistry::release_all`] on widget teardown, whichever comes
/// first. Entries are released in registration order.
#[derive(Default)]
pub struct SubscriptionRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: u64,
    entries: Vec<Entry>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a release action and returns its handle.
    pub fn register(&self, release: impl ReleaseFn + 'static) -> SubscriptionHandle {
        let mut inner = self.inner.lock();
        let handle = SubscriptionHandle(inner.next_id);
        inner.next_id += 1;
        inner.entries.push(Entry {
            handle,
            release: Box::new(release),
        });
        handle
    }

    /// Releases one resource. Releasing an already released or unknown
    /// handle is a no-op.
    pub fn release(&self, handle: SubscriptionHandle) {
        let entry = {
            let mut inner = self.inner.lock();
            match inner.entries.iter().position(|e| e.handle == handle) {
                Some(idx) => inner.entries.remove(idx),
                None => {
                    log::debug!("release of unknown subscription {handle:?} ignored");
                    return;
                }
            }
        };
        entry.release.release();
    }

    /// Releases every remaining resource in registration order.
    pub fn release_all(&self) {
        // The lock is not held while the release actions run: an action may
        // register or release other subscriptions.
        let entries: Vec<_> = std::mem::take(&mut self.inner.lock().entries);
        for entry in entries {
            entry.release.release();
        }
    }

    /// Number of resources currently held.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the registry holds no resources.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}
