//! Per-widget lifecycle: waiting for the script, constructing the native
//! entity and tearing it down safely.
//!
//! One [`WidgetController`] owns exactly one native entity. Its life is a
//! state machine:
//!
//! ```text
//! Uninitialized -> AwaitingScript -> Constructing -> Ready -> Destroyed
//!                        |                |
//!                        +----> Failed <--+
//! ```
//!
//! Every asynchronous callback (script readiness, construction completion,
//! native events) re-checks the current state under the controller lock
//! before acting, so disposing a widget at any point is race-free: a
//! readiness callback arriving after disposal is a no-op, and an entity
//! finishing construction after disposal is destroyed immediately instead of
//! resurrecting the widget.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use maybe_sync::{MaybeSend, MaybeSync};
use parking_lot::Mutex;

use crate::async_runtime;
use crate::config::LoadConfiguration;
use crate::error::BridgeError;
use crate::events::{DeliveryGate, EventBridge, EventEnvelope, EventRoute, EventSink};
use crate::loader::ScriptLoader;
use crate::native::{ContainerId, NativeEntity, RawNativeEvent};
use crate::reconcile::{apply_change_set, FieldRule, InputChangeSet};
use crate::registry::SubscriptionRegistry;
use crate::scheduler::{DispatchMode, Scheduler};

/// Description of one widget kind: its declarative surface and how it maps
/// onto the external API.
///
/// A binding is the static part of a widget: property validation, the native
/// locate/construct call, the per-field mutability table and the native
/// event table. The dynamic part (state machine, subscriptions, teardown) is
/// shared by all widgets and lives in [`WidgetController`].
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait WidgetBinding: MaybeSend + MaybeSync + 'static {
    /// Handle of the loaded external API namespace.
    type Api: Clone + MaybeSend + MaybeSync + 'static;
    /// The native entity this widget wraps.
    type Entity: NativeEntity + Clone;
    /// Output channel enumeration of the widget's native events.
    type Channel: Copy + MaybeSend + MaybeSync + 'static;
    /// Declarative property record of the widget.
    type Props: Clone + MaybeSend + MaybeSync + 'static;

    /// Prefix used for fresh container identities.
    fn container_prefix(&self) -> &'static str {
        "widget"
    }

    /// Checks that every required declarative property is present. Called
    /// synchronously at mount, before any native call.
    fn validate(&self, props: &Self::Props) -> Result<(), BridgeError>;

    /// Locates and constructs the native entity from the current property
    /// values. Initial values are consumed here, not reconciled.
    async fn construct(
        &self,
        api: &Self::Api,
        container: &ContainerId,
        props: &Self::Props,
    ) -> Result<Self::Entity, BridgeError>;

    /// Mutability table of the declarative surface.
    fn field_rules(&self) -> &'static [FieldRule<Self::Entity>];

    /// Static native-event-name to output-channel table.
    fn event_routes(&self) -> &'static [EventRoute<Self::Channel>];

    /// Native event that signals the entity destroyed itself, if the
    /// external API documents one. The controller performs its teardown when
    /// this event fires.
    fn destroy_event(&self) -> Option<&'static str> {
        None
    }
}

/// Observable lifecycle stage of a widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetState {
    /// Created but not mounted.
    Uninitialized,
    /// Mounted, waiting for the external API to load.
    AwaitingScript,
    /// The native locate/construct call is in flight.
    Constructing,
    /// The native entity exists and reconciliation is active.
    Ready,
    /// The widget was disposed and every resource released.
    Destroyed,
    /// Script load or construction failed. Absorbing.
    Failed,
}

/// Payload of the widget's one-time ready output.
pub struct ReadyEvent<B: WidgetBinding> {
    /// Handle of the loaded external API.
    pub api: B::Api,
    /// The freshly constructed native entity.
    pub target: B::Entity,
}

/// Consumer of the one-time ready output.
pub trait ReadySink<B: WidgetBinding>: MaybeSend + MaybeSync {
    /// Delivers the ready notification.
    fn ready(&self, event: ReadyEvent<B>);
}

impl<B, F> ReadySink<B> for F
where
    B: WidgetBinding,
    F: Fn(ReadyEvent<B>) + MaybeSend + MaybeSync,
{
    fn ready(&self, event: ReadyEvent<B>) {
        self(event)
    }
}

/// Consumer of asynchronous widget failures (script load or construction).
pub trait FailureSink: MaybeSend + MaybeSync {
    /// Delivers the failure.
    fn failed(&self, error: BridgeError);
}

impl<F> FailureSink for F
where
    F: Fn(BridgeError) + MaybeSend + MaybeSync,
{
    fn failed(&self, error: BridgeError) {
        self(error)
    }
}

/// Output callbacks of a widget, wired once before mounting.
pub struct WidgetOutputs<B: WidgetBinding> {
    ready: Option<Box<dyn ReadySink<B>>>,
    event: Option<Box<dyn EventSink<B::Api, B::Entity, B::Channel>>>,
    failure: Option<Box<dyn FailureSink>>,
}

impl<B: WidgetBinding> Default for WidgetOutputs<B> {
    fn default() -> Self {
        Self {
            ready: None,
            event: None,
            failure: None,
        }
    }
}

impl<B: WidgetBinding> WidgetOutputs<B> {
    /// Creates outputs with no callbacks attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the callback for the one-time ready output.
    pub fn on_ready(mut self, sink: impl ReadySink<B> + 'static) -> Self {
        self.ready = Some(Box::new(sink));
        self
    }

    /// Sets the callback receiving event envelopes on their channels.
    pub fn on_event(
        mut self,
        sink: impl EventSink<B::Api, B::Entity, B::Channel> + 'static,
    ) -> Self {
        self.event = Some(Box::new(sink));
        self
    }

    /// Sets the callback receiving asynchronous failures.
    pub fn on_failure(mut self, sink: impl FailureSink + 'static) -> Self {
        self.failure = Some(Box::new(sink));
        self
    }
}

enum State<B: WidgetBinding> {
    Uninitialized,
    AwaitingScript { props: B::Props },
    Constructing,
    Ready { api: B::Api, entity: B::Entity },
    Destroyed,
    Failed,
}

struct ControllerShared<B: WidgetBinding> {
    binding: B,
    loader: ScriptLoader<B::Api>,
    scheduler: Arc<dyn Scheduler>,
    config: LoadConfiguration,
    registry: SubscriptionRegistry,
    outputs: WidgetOutputs<B>,
    state: Mutex<State<B>>,
}

/// Lifecycle controller of one widget.
pub struct WidgetController<B: WidgetBinding> {
    shared: Arc<ControllerShared<B>>,
}

impl<B: WidgetBinding> WidgetController<B> {
    /// Creates an unmounted controller.
    ///
    /// The load configuration is the one this widget submits to the shared
    /// [`ScriptLoader`]; if another widget already started the load with a
    /// conflicting configuration, mounting fails.
    pub fn new(
        binding: B,
        loader: ScriptLoader<B::Api>,
        scheduler: Arc<dyn Scheduler>,
        config: LoadConfiguration,
        outputs: WidgetOutputs<B>,
    ) -> Self {
        Self {
            shared: Arc::new(ControllerShared {
                binding,
                loader,
                scheduler,
                config,
                registry: SubscriptionRegistry::new(),
                outputs,
                state: Mutex::new(State::Uninitialized),
            }),
        }
    }

    /// Current lifecycle stage.
    pub fn state(&self) -> WidgetState {
        match *self.shared.state.lock() {
            State::Uninitialized => WidgetState::Uninitialized,
            State::AwaitingScript { .. } => WidgetState::AwaitingScript,
            State::Constructing => WidgetState::Constructing,
            State::Ready { .. } => WidgetState::Ready,
            State::Destroyed => WidgetState::Destroyed,
            State::Failed => WidgetState::Failed,
        }
    }

    /// Mounts the widget: validates the required properties and starts
    /// waiting for the external API.
    ///
    /// Fails synchronously with [`BridgeError::Configuration`] if a required
    /// property is missing or the process-wide load configuration conflicts;
    /// in both cases no native call is made and the widget parks in
    /// [`WidgetState::Failed`].
    pub fn mount(&self, props: B::Props) -> Result<(), BridgeError> {
        {
            let mut state = self.shared.state.lock();
            if !matches!(*state, State::Uninitialized) {
                return Err(BridgeError::Configuration(
                    "widget is already mounted".into(),
                ));
            }
            if let Err(error) = self.shared.binding.validate(&props) {
                *state = State::Failed;
                return Err(error);
            }
            *state = State::AwaitingScript { props };
        }

        let signal = match self.shared.loader.ensure_loaded(&self.shared.config) {
            Ok(signal) => signal,
            Err(error) => {
                self.shared.enter_failed();
                self.shared.registry.release_all();
                return Err(error);
            }
        };

        let weak = Arc::downgrade(&self.shared);
        let waiter = signal.subscribe(move |outcome: Result<B::Api, BridgeError>| {
            if let Some(shared) = weak.upgrade() {
                ControllerShared::on_script_outcome(&shared, outcome);
            }
        });
        self.shared.registry.register(move || waiter.cancel());

        Ok(())
    }

    /// Applies a declarative change set reported by the host framework.
    ///
    /// A no-op unless the widget is [`WidgetState::Ready`]: while the script
    /// or the entity is still pending, the latest property values are picked
    /// up by construction itself.
    pub fn update(&self, set: &InputChangeSet) -> Result<(), BridgeError> {
        let entity = {
            let state = self.shared.state.lock();
            match &*state {
                State::Ready { entity, .. } => entity.clone(),
                State::AwaitingScript { .. } | State::Constructing => return Ok(()),
                _ => {
                    log::debug!("change set ignored: widget is not live");
                    return Ok(());
                }
            }
        };
        apply_change_set(&entity, self.shared.binding.field_rules(), set)
    }

    /// Disposes the widget, releasing the native entity (if the external API
    /// exposes a disposal method) and every subscription. Idempotent.
    ///
    /// Disposing while the script is still loading cancels the pending wait:
    /// no entity will ever be constructed for this widget.
    pub fn dispose(&self) {
        let entity = {
            let mut state = self.shared.state.lock();
            match std::mem::replace(&mut *state, State::Destroyed) {
                State::Ready { entity, .. } => Some(entity),
                State::Uninitialized | State::AwaitingScript { .. } | State::Constructing => None,
                old @ State::Destroyed => {
                    *state = old;
                    return;
                }
                State::Failed => {
                    // Failure already performed the teardown.
                    *state = State::Failed;
                    return;
                }
            }
        };

        if let Some(entity) = entity {
            if entity.supports_destroy() {
                entity.destroy();
            }
        }
        self.shared.registry.release_all();
    }
}

impl<B: WidgetBinding> ControllerShared<B> {
    /// Marks the widget failed. Returns `false` if it is already in a
    /// terminal state.
    fn enter_failed(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            State::Destroyed | State::Failed => false,
            _ => {
                *state = State::Failed;
                true
            }
        }
    }

    fn fail_async(self: &Arc<Self>, error: BridgeError) {
        if !self.enter_failed() {
            return;
        }
        self.registry.release_all();

        let shared = self.clone();
        self.scheduler.run(
            DispatchMode::Immediate,
            Box::new(move || {
                if let Some(sink) = &shared.outputs.failure {
                    sink.failed(error);
                }
            }),
        );
    }

    fn on_script_outcome(self: &Arc<Self>, outcome: Result<B::Api, BridgeError>) {
        let api = match outcome {
            Ok(api) => api,
            Err(error) => {
                self.fail_async(error);
                return;
            }
        };

        let props = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, State::Constructing) {
                State::AwaitingScript { props } => props,
                other => {
                    // Disposed (or failed) before the script became ready;
                    // the readiness callback must not resurrect the widget.
                    *state = other;
                    return;
                }
            }
        };

        let container = ContainerId::fresh(self.binding.container_prefix());
        let shared = self.clone();
        async_runtime::spawn(async move {
            let result = shared.binding.construct(&api, &container, &props).await;
            ControllerShared::on_constructed(&shared, api, result);
        });
    }

    fn on_constructed(
        self: &Arc<Self>,
        api: B::Api,
        result: Result<B::Entity, BridgeError>,
    ) {
        let entity = match result {
            Ok(entity) => entity,
            Err(error) => {
                self.fail_async(error);
                return;
            }
        };

        // The widget may have been disposed while construction was in
        // flight. The fresh entity must then be released, not adopted.
        if !matches!(*self.state.lock(), State::Constructing) {
            if entity.supports_destroy() {
                entity.destroy();
            }
            return;
        }

        self.attach_bridge(&api, &entity);

        let adopted = {
            let mut state = self.state.lock();
            match *state {
                State::Constructing => {
                    *state = State::Ready {
                        api: api.clone(),
                        entity: entity.clone(),
                    };
                    true
                }
                _ => false,
            }
        };

        if !adopted {
            // Disposal raced the attachment; undo it.
            self.registry.release_all();
            if entity.supports_destroy() {
                entity.destroy();
            }
            return;
        }

        let shared = self.clone();
        let event = ReadyEvent {
            api,
            target: entity,
        };
        self.scheduler.run(
            DispatchMode::Immediate,
            Box::new(move || {
                if let Some(sink) = &shared.outputs.ready {
                    sink.ready(event);
                }
            }),
        );
    }

    /// Registers the widget's event routes and, if the binding names one,
    /// the native destroy event. Called without the state lock held: a
    /// native entity may invoke handlers synchronously during registration.
    fn attach_bridge(self: &Arc<Self>, api: &B::Api, entity: &B::Entity) {
        let gate: Arc<dyn DeliveryGate> = Arc::new(ControllerGate(Arc::downgrade(self)));
        let sink: Arc<dyn EventSink<B::Api, B::Entity, B::Channel>> =
            Arc::new(ControllerEventSink(Arc::downgrade(self)));

        EventBridge::attach(
            api,
            entity,
            self.binding.event_routes(),
            &self.scheduler,
            &sink,
            &gate,
            &self.registry,
        );

        if let Some(name) = self.binding.destroy_event() {
            let weak = Arc::downgrade(self);
            let handler = Arc::new(move |_: &str, _: &RawNativeEvent| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_native_destroy();
                }
            });
            let listener = entity.add_listener(&[name], handler);
            let entity = entity.clone();
            self.registry
                .register(move || entity.remove_listener(listener));
        }
    }

    /// The entity reported its own destruction: perform the widget teardown
    /// without calling the disposal method again.
    fn on_native_destroy(&self) {
        {
            let mut state = self.state.lock();
            match *state {
                State::Ready { .. } => *state = State::Destroyed,
                _ => return,
            }
        }
        self.registry.release_all();
    }
}

struct ControllerGate<B: WidgetBinding>(Weak<ControllerShared<B>>);

impl<B: WidgetBinding> DeliveryGate for ControllerGate<B> {
    fn is_open(&self) -> bool {
        self.0
            .upgrade()
            .map(|shared| matches!(*shared.state.lock(), State::Ready { .. }))
            .unwrap_or(false)
    }
}

struct ControllerEventSink<B: WidgetBinding>(Weak<ControllerShared<B>>);

impl<B: WidgetBinding> EventSink<B::Api, B::Entity, B::Channel> for ControllerEventSink<B> {
    fn deliver(&self, channel: B::Channel, envelope: EventEnvelope<B::Api, B::Entity>) {
        if let Some(shared) = self.0.upgrade() {
            if let Some(sink) = &shared.outputs.event {
                sink.deliver(channel, envelope);
            }
        }
    }
}
