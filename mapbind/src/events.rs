//! Bridging of native entity events into typed host channels.
//!
//! A widget declares a static table of [`EventRoute`]s: which native event
//! names it listens to and which output channel each name republishes on.
//! The mapping is explicit and total; nothing is dispatched by reflection.
//! When a subscribed event fires, the bridge builds a fresh
//! [`EventEnvelope`] and hands it to the host [`Scheduler`]. Events that
//! arrive after the widget was disposed are dropped, not queued.

use std::sync::Arc;

use maybe_sync::{MaybeSend, MaybeSync};

use crate::native::{NativeEntity, RawNativeEvent};
use crate::registry::SubscriptionRegistry;
use crate::scheduler::{DispatchMode, Scheduler};

/// One row of a widget's event table: native event name(s) and the output
/// channel they republish on.
pub struct EventRoute<C> {
    /// Native event names covered by this route. One registration is made
    /// for all of them.
    pub names: &'static [&'static str],
    /// Output channel the envelopes are delivered on.
    pub channel: C,
    /// How envelope delivery is marshalled into the host scheduler.
    pub mode: DispatchMode,
}

/// A native event republished into the host framework.
///
/// Envelopes are immutable and constructed fresh for every dispatched
/// occurrence.
#[derive(Debug, Clone)]
pub struct EventEnvelope<A, E> {
    /// Handle of the loaded external API.
    pub api: A,
    /// The entity the event fired on.
    pub target: E,
    /// The concrete native event name that fired.
    pub native_event_type: String,
    /// Raw native event payload, passed through untouched.
    pub raw: RawNativeEvent,
}

/// Consumer of republished events (typically the widget's output channels).
pub trait EventSink<A, E, C>: MaybeSend + MaybeSync {
    /// Delivers one envelope on its mapped channel.
    fn deliver(&self, channel: C, envelope: EventEnvelope<A, E>);
}

impl<A, E, C, F> EventSink<A, E, C> for F
where
    F: Fn(C, EventEnvelope<A, E>) + MaybeSend + MaybeSync,
{
    fn deliver(&self, channel: C, envelope: EventEnvelope<A, E>) {
        self(channel, envelope)
    }
}

/// Liveness check consulted before delivering an envelope.
pub trait DeliveryGate: MaybeSend + MaybeSync {
    /// Whether the widget still accepts event deliveries.
    fn is_open(&self) -> bool;
}

/// Subscription/translation layer from native events to typed channels.
pub struct EventBridge;

impl EventBridge {
    /// Registers one native listener per route and wires it to the sink.
    ///
    /// Listener removals are recorded in the registry, so widget teardown
    /// detaches everything. Liveness is decided when the native event fires:
    /// an event arriving after disposal is dropped rather than delivered
    /// late, while an envelope fired on a live widget is still delivered
    /// even if teardown runs before the host's next scheduling tick.
    pub fn attach<A, E, C>(
        api: &A,
        entity: &E,
        routes: &'static [EventRoute<C>],
        scheduler: &Arc<dyn Scheduler>,
        sink: &Arc<dyn EventSink<A, E, C>>,
        gate: &Arc<dyn DeliveryGate>,
        registry: &SubscriptionRegistry,
    ) where
        A: Clone + MaybeSend + MaybeSync + 'static,
        E: NativeEntity + Clone,
        C: Copy + MaybeSend + MaybeSync + 'static,
    {
        for route in routes {
            let api = api.clone();
            let target = entity.clone();
            let scheduler = scheduler.clone();
            let sink = sink.clone();
            let gate = gate.clone();

            let handler = Arc::new(move |name: &str, raw: &RawNativeEvent| {
                if !gate.is_open() {
                    log::warn!("dropping native event `{name}`: widget is not live");
                    return;
                }

                let envelope = EventEnvelope {
                    api: api.clone(),
                    target: target.clone(),
                    native_event_type: name.to_string(),
                    raw: raw.clone(),
                };

                let channel = route.channel;
                let sink = sink.clone();
                scheduler.run(
                    route.mode,
                    Box::new(move || sink.deliver(channel, envelope)),
                );
            });

            let listener = entity.add_listener(route.names, handler);
            let entity = entity.clone();
            registry.register(move || entity.remove_listener(listener));
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::native::TestEntity;
    use crate::scheduler::{InlineScheduler, QueueScheduler};

    type Api = Arc<str>;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Channel {
        Ping,
        Pong,
    }

    static ROUTES: &[EventRoute<Channel>] = &[
        EventRoute {
            names: &["ping", "ping2"],
            channel: Channel::Ping,
            mode: DispatchMode::Coalesced,
        },
        EventRoute {
            names: &["pong"],
            channel: Channel::Pong,
            mode: DispatchMode::Coalesced,
        },
    ];

    struct OpenGate;

    impl DeliveryGate for OpenGate {
        fn is_open(&self) -> bool {
            true
        }
    }

    struct FlagGate(std::sync::atomic::AtomicBool);

    impl DeliveryGate for FlagGate {
        fn is_open(&self) -> bool {
            self.0.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    fn recording_sink(
        log: &Arc<Mutex<Vec<(Channel, String)>>>,
    ) -> Arc<dyn EventSink<Api, TestEntity, Channel>> {
        let log = log.clone();
        Arc::new(move |channel: Channel, envelope: EventEnvelope<Api, TestEntity>| {
            log.lock().push((channel, envelope.native_event_type));
        })
    }

    #[test]
    fn each_occurrence_delivers_one_envelope_in_firing_order() {
        let api: Api = Arc::from("api");
        let entity = TestEntity::new();
        let registry = SubscriptionRegistry::new();
        let scheduler: Arc<dyn Scheduler> = Arc::new(InlineScheduler);
        let gate: Arc<dyn DeliveryGate> = Arc::new(OpenGate);
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = recording_sink(&delivered);

        EventBridge::attach(&api, &entity, ROUTES, &scheduler, &sink, &gate, &registry);
        assert_eq!(entity.listener_count(), 2);

        entity.fire("ping", json!({"n": 1}));
        entity.fire("pong", json!({"n": 2}));
        entity.fire("ping2", json!({"n": 3}));
        entity.fire("ping", json!({"n": 4}));

        assert_eq!(
            *delivered.lock(),
            vec![
                (Channel::Ping, "ping".to_string()),
                (Channel::Pong, "pong".to_string()),
                (Channel::Ping, "ping2".to_string()),
                (Channel::Ping, "ping".to_string()),
            ]
        );
    }

    #[test]
    fn unsubscribed_events_are_ignored() {
        let api: Api = Arc::from("api");
        let entity = TestEntity::new();
        let registry = SubscriptionRegistry::new();
        let scheduler: Arc<dyn Scheduler> = Arc::new(InlineScheduler);
        let gate: Arc<dyn DeliveryGate> = Arc::new(OpenGate);
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = recording_sink(&delivered);

        EventBridge::attach(&api, &entity, ROUTES, &scheduler, &sink, &gate, &registry);
        entity.fire("unknown", json!(null));
        assert!(delivered.lock().is_empty());
    }

    #[test]
    fn closed_gate_drops_events_instead_of_queueing() {
        let api: Api = Arc::from("api");
        let entity = TestEntity::new();
        let registry = SubscriptionRegistry::new();
        let scheduler: Arc<dyn Scheduler> = Arc::new(InlineScheduler);
        let flag = Arc::new(FlagGate(std::sync::atomic::AtomicBool::new(true)));
        let gate: Arc<dyn DeliveryGate> = flag.clone();
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = recording_sink(&delivered);

        EventBridge::attach(&api, &entity, ROUTES, &scheduler, &sink, &gate, &registry);

        entity.fire("ping", json!(1));
        flag.0.store(false, std::sync::atomic::Ordering::SeqCst);
        entity.fire("ping", json!(2));

        assert_eq!(delivered.lock().len(), 1);
    }

    #[test]
    fn envelopes_fired_while_live_survive_a_later_teardown() {
        let api: Api = Arc::from("api");
        let entity = TestEntity::new();
        let registry = SubscriptionRegistry::new();
        let queue = Arc::new(QueueScheduler::new());
        let scheduler: Arc<dyn Scheduler> = queue.clone();
        let flag = Arc::new(FlagGate(std::sync::atomic::AtomicBool::new(true)));
        let gate: Arc<dyn DeliveryGate> = flag.clone();
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = recording_sink(&delivered);

        EventBridge::attach(&api, &entity, ROUTES, &scheduler, &sink, &gate, &registry);

        entity.fire("ping", json!(1));
        assert_eq!(queue.pending(), 1);

        // The widget was live when the event fired; a teardown between the
        // native callback and the host tick must not swallow the envelope.
        flag.0.store(false, std::sync::atomic::Ordering::SeqCst);
        queue.flush();
        assert_eq!(*delivered.lock(), vec![(Channel::Ping, "ping".to_string())]);

        // But an event firing after teardown is dropped.
        entity.fire("ping", json!(2));
        assert_eq!(queue.pending(), 0);
        assert_eq!(delivered.lock().len(), 1);
    }

    #[test]
    fn releasing_the_registry_detaches_all_listeners() {
        let api: Api = Arc::from("api");
        let entity = TestEntity::new();
        let registry = SubscriptionRegistry::new();
        let scheduler: Arc<dyn Scheduler> = Arc::new(InlineScheduler);
        let gate: Arc<dyn DeliveryGate> = Arc::new(OpenGate);
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = recording_sink(&delivered);

        EventBridge::attach(&api, &entity, ROUTES, &scheduler, &sink, &gate, &registry);
        registry.release_all();

        assert_eq!(entity.listener_count(), 0);
        entity.fire("ping", json!(1));
        assert!(delivered.lock().is_empty());
    }
}
