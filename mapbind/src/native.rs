//! Traits describing the surface of the external API that the runtime
//! consumes.
//!
//! The runtime never introspects native objects. Everything it needs from an
//! entity is expressed here: subscribing to named events and, optionally, an
//! explicit disposal call. Mutators specific to a widget (moving a panorama
//! player, changing a placemark geometry) are invoked through the typed field
//! appliers of the widget's [`WidgetBinding`](crate::WidgetBinding), not
//! through this trait.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use maybe_sync::{MaybeSend, MaybeSync};

/// Raw payload of a native event, passed through the bridge untouched.
pub type RawNativeEvent = serde_json::Value;

/// Identifier of one native event listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeListenerId(pub u64);

/// Identity of the container a native entity is constructed into.
///
/// A fresh identity is generated for every construction, so a re-created
/// widget never aliases the container of its previous incarnation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(String);

static NEXT_CONTAINER: AtomicU64 = AtomicU64::new(0);

impl ContainerId {
    /// Generates a fresh container identity with the given prefix.
    pub fn fresh(prefix: &str) -> Self {
        let n = NEXT_CONTAINER.fetch_add(1, Ordering::Relaxed);
        Self(format!("{prefix}-{n}"))
    }

    /// The identity as a string, usable as a DOM element id or similar.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Callback invoked when a subscribed native event fires.
///
/// The first argument is the concrete event name the native entity fired,
/// since one registration may cover several names.
pub trait NativeEventHandler: MaybeSend + MaybeSync {
    /// Handles one native event occurrence.
    fn handle(&self, event_name: &str, event: &RawNativeEvent);
}

impl<F> NativeEventHandler for F
where
    F: Fn(&str, &RawNativeEvent) + MaybeSend + MaybeSync,
{
    fn handle(&self, event_name: &str, event: &RawNativeEvent) {
        self(event_name, event)
    }
}

/// A constructed native object owned by exactly one widget.
pub trait NativeEntity: MaybeSend + MaybeSync + 'static {
    /// Subscribes the handler to one or more named events on this entity,
    /// mirroring the external API's `events.add(nameOrNames, handler)` call.
    fn add_listener(
        &self,
        names: &[&str],
        handler: std::sync::Arc<dyn NativeEventHandler>,
    ) -> NativeListenerId;

    /// Removes a previously added listener. Removing an unknown listener is a
    /// no-op.
    fn remove_listener(&self, listener: NativeListenerId);

    /// Whether the external API exposes an explicit disposal method for this
    /// entity.
    fn supports_destroy(&self) -> bool {
        false
    }

    /// Releases the native entity. Called at most once, and only when
    /// [`NativeEntity::supports_destroy`] returns `true`.
    fn destroy(&self) {}
}

/// Scripted native entity used for tests: records listener registrations and
/// lets the test fire events by hand.
#[cfg(feature = "_tests")]
#[derive(Clone, Default)]
pub struct TestEntity {
    state: std::sync::Arc<TestEntityState>,
}

#[cfg(feature = "_tests")]
#[derive(Default)]
struct TestEntityState {
    next_listener: AtomicU64,
    listeners: parking_lot::Mutex<ListenerTable>,
    destroyable: std::sync::atomic::AtomicBool,
    destroyed: std::sync::atomic::AtomicBool,
}

#[cfg(feature = "_tests")]
type ListenerTable = Vec<(
    NativeListenerId,
    Vec<String>,
    std::sync::Arc<dyn NativeEventHandler>,
)>;

#[cfg(feature = "_tests")]
impl TestEntity {
    /// Creates an entity without an explicit disposal method.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an entity that reports an explicit disposal method.
    pub fn destroyable() -> Self {
        let entity = Self::default();
        entity.state.destroyable.store(true, Ordering::SeqCst);
        entity
    }

    /// Fires a native event, invoking every subscribed handler in
    /// registration order.
    pub fn fire(&self, name: &str, raw: RawNativeEvent) {
        let matched: Vec<_> = self
            .state
            .listeners
            .lock()
            .iter()
            .filter(|(_, names, _)| names.iter().any(|n| n == name))
            .map(|(_, _, handler)| handler.clone())
            .collect();
        for handler in matched {
            handler.handle(name, &raw);
        }
    }

    /// Number of currently registered listeners.
    pub fn listener_count(&self) -> usize {
        self.state.listeners.lock().len()
    }

    /// Whether [`NativeEntity::destroy`] has been called.
    pub fn is_destroyed(&self) -> bool {
        self.state.destroyed.load(Ordering::SeqCst)
    }
}

#[cfg(feature = "_tests")]
impl NativeEntity for TestEntity {
    fn add_listener(
        &self,
        names: &[&str],
        handler: std::sync::Arc<dyn NativeEventHandler>,
    ) -> NativeListenerId {
        let id = NativeListenerId(self.state.next_listener.fetch_add(1, Ordering::Relaxed));
        self.state.listeners.lock().push((
            id,
            names.iter().map(|n| n.to_string()).collect(),
            handler,
        ));
        id
    }

    fn remove_listener(&self, listener: NativeListenerId) {
        self.state.listeners.lock().retain(|(id, _, _)| *id != listener);
    }

    fn supports_destroy(&self) -> bool {
        self.state.destroyable.load(Ordering::SeqCst)
    }

    fn destroy(&self) {
        self.state.destroyed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_ids_are_unique() {
        let a = ContainerId::fresh("widget");
        let b = ContainerId::fresh("widget");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("widget-"));
    }
}
