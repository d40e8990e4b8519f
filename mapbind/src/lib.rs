//! Mapbind is a runtime for wrapping entities of an imperative, externally
//! loaded mapping API into declarative widgets of a reactive host framework.
//!
//! The external API arrives as a script that must be fetched at runtime; its
//! objects are created imperatively, mutated through methods and observed
//! through named events. A reactive host framework expects the opposite:
//! declarative properties, typed output channels and automatic cleanup. This
//! crate owns the translation between the two worlds:
//!
//! * [`ScriptLoader`] fetches the external API exactly once per process, no
//!   matter how many widgets ask for it, and fails fast on conflicting load
//!   configurations.
//! * [`WidgetController`] drives the lifecycle of one widget through a small
//!   state machine (`Uninitialized -> AwaitingScript -> Constructing ->
//!   Ready -> Destroyed`, with an absorbing `Failed` stage) and guarantees
//!   that disposing the widget at any point is race-free.
//! * [`reconcile`] applies declarative property changes onto the native
//!   entity under per-field mutability policies, all-or-nothing.
//! * [`EventBridge`] republishes native events on typed output channels
//!   through the host [`Scheduler`], dropping events that arrive after the
//!   widget was disposed.
//! * [`SubscriptionRegistry`] records every acquired subscription so that
//!   teardown releases each exactly once.
//!
//! A concrete widget supplies the static description of its kind by
//! implementing [`WidgetBinding`]: how to validate and construct, which
//! fields may mutate and which native events map to which channels. See the
//! `mapbind-panorama` crate for a complete widget built on this runtime.

#![warn(clippy::unwrap_used)]
#![warn(missing_docs)]

pub(crate) mod async_runtime;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod loader;
pub mod native;
pub mod reconcile;
pub mod registry;
pub mod scheduler;

pub use config::{CoordOrder, Lang, LoadConfiguration, LoadMode};
pub use error::BridgeError;
pub use events::{DeliveryGate, EventBridge, EventEnvelope, EventRoute, EventSink};
pub use lifecycle::{
    FailureSink, ReadyEvent, ReadySink, WidgetBinding, WidgetController, WidgetOutputs,
    WidgetState,
};
pub use loader::{LoadObserver, LoadSignal, LoadState, LoadWaiter, ScriptFetcher, ScriptLoader};
pub use native::{ContainerId, NativeEntity, NativeEventHandler, NativeListenerId, RawNativeEvent};
pub use reconcile::{
    apply_change_set, apply_nothing, ApplyFn, FieldChange, FieldRule, InputChangeSet, Mutability,
};
pub use registry::{SubscriptionHandle, SubscriptionRegistry};
pub use scheduler::{DispatchMode, InlineScheduler, QueueScheduler, Scheduler, SchedulerTask};
