//! The panorama player widget: declarative surface and its binding onto the
//! external API.

use async_trait::async_trait;
use mapbind::reconcile::FieldChange;
use mapbind::{
    apply_nothing, BridgeError, ContainerId, DispatchMode, EventRoute, FieldRule, InputChangeSet,
    Mutability, WidgetBinding,
};
use serde::Serialize;

use crate::api::{PanoramaApiHandle, PanoramaMode, PlayerHandle, Point};

/// Declarative properties of the panorama widget.
///
/// `point` is required at mount. `mode` selects the panorama flavor and may
/// later change only together with `point`. `options` is an opaque bag passed
/// to the native constructor untouched and frozen afterwards.
#[derive(Debug, Clone, Default)]
pub struct PanoramaProps {
    /// Point the panorama is located at.
    pub point: Option<Point>,
    /// Panorama flavor. Defaults to [`PanoramaMode::Ground`].
    pub mode: Option<PanoramaMode>,
    /// Opaque player options, never introspected.
    pub options: Option<serde_json::Value>,
}

impl PanoramaProps {
    /// Diffs two property records into a change set, in declaration order.
    pub fn changes_since(&self, previous: &Self) -> InputChangeSet {
        let mut set = InputChangeSet::new();
        if self.point != previous.point {
            set.push("point", to_json(&previous.point), to_json(&self.point));
        }
        if self.mode != previous.mode {
            set.push("mode", to_json(&previous.mode), to_json(&self.mode));
        }
        if self.options != previous.options {
            set.push("options", to_json(&previous.options), to_json(&self.options));
        }
        set
    }
}

fn to_json<T: Serialize>(value: &Option<T>) -> serde_json::Value {
    value
        .as_ref()
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or(serde_json::Value::Null)
}

/// Output channels of the widget, one per documented native player event.
///
/// Native runtime errors reported by the player arrive as ordinary envelopes
/// on [`PanoramaChannel::Error`]; they are recoverable conditions, not
/// failures of the widget itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanoramaChannel {
    /// The player destroyed itself.
    Destroy,
    /// The view direction changed.
    DirectionChange,
    /// The player reported a runtime error.
    Error,
    /// Fullscreen mode was entered.
    FullscreenEnter,
    /// Fullscreen mode was left.
    FullscreenExit,
    /// An expanded marker collapsed.
    MarkerCollapse,
    /// A marker was expanded.
    MarkerExpand,
    /// The shown panorama changed.
    PanoramaChange,
    /// The view span changed.
    SpanChange,
}

static EVENT_ROUTES: &[EventRoute<PanoramaChannel>] = &[
    EventRoute {
        names: &["destroy"],
        channel: PanoramaChannel::Destroy,
        mode: DispatchMode::Coalesced,
    },
    EventRoute {
        names: &["directionchange"],
        channel: PanoramaChannel::DirectionChange,
        mode: DispatchMode::Coalesced,
    },
    EventRoute {
        names: &["error"],
        channel: PanoramaChannel::Error,
        mode: DispatchMode::Coalesced,
    },
    EventRoute {
        names: &["fullscreenenter"],
        channel: PanoramaChannel::FullscreenEnter,
        mode: DispatchMode::Coalesced,
    },
    EventRoute {
        names: &["fullscreenexit"],
        channel: PanoramaChannel::FullscreenExit,
        mode: DispatchMode::Coalesced,
    },
    EventRoute {
        names: &["markercollapse"],
        channel: PanoramaChannel::MarkerCollapse,
        mode: DispatchMode::Coalesced,
    },
    EventRoute {
        names: &["markerexpand"],
        channel: PanoramaChannel::MarkerExpand,
        mode: DispatchMode::Coalesced,
    },
    EventRoute {
        names: &["panoramachange"],
        channel: PanoramaChannel::PanoramaChange,
        mode: DispatchMode::Coalesced,
    },
    EventRoute {
        names: &["spanchange"],
        channel: PanoramaChannel::SpanChange,
        mode: DispatchMode::Coalesced,
    },
];

static FIELD_RULES: &[FieldRule<PlayerHandle>] = &[
    FieldRule {
        field: "point",
        mutability: Mutability::Direct,
        check: Some(check_point),
        apply: apply_point,
    },
    FieldRule {
        field: "mode",
        mutability: Mutability::RequiresCompanion("point"),
        check: Some(check_mode),
        apply: apply_nothing,
    },
    FieldRule {
        field: "options",
        mutability: Mutability::Frozen,
        check: None,
        apply: apply_nothing,
    },
];

fn check_point(change: &FieldChange, _set: &InputChangeSet) -> Result<(), BridgeError> {
    parse_field::<Point>("point", &change.current).map(|_| ())
}

fn check_mode(change: &FieldChange, _set: &InputChangeSet) -> Result<(), BridgeError> {
    parse_field::<PanoramaMode>("mode", &change.current).map(|_| ())
}

/// Moves the player. A mode change in the same set rides along as the second
/// argument of the single native call. Values were already parsed by the
/// checks, so errors here come from the native call itself.
fn apply_point(
    player: &PlayerHandle,
    change: &FieldChange,
    set: &InputChangeSet,
) -> Result<(), BridgeError> {
    let point: Point = parse_field("point", &change.current)?;
    let mode = match set.get("mode") {
        Some(mode_change) => Some(parse_field("mode", &mode_change.current)?),
        None => None,
    };
    player.move_to(point, mode)
}

fn parse_field<T: serde::de::DeserializeOwned>(
    field: &str,
    value: &serde_json::Value,
) -> Result<T, BridgeError> {
    serde_json::from_value(value.clone()).map_err(|error| BridgeError::UnsupportedMutation {
        field: field.to_string(),
        reason: format!("malformed value: {error}"),
    })
}

/// Binding of the panorama widget onto the external API.
pub struct PanoramaBinding;

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl WidgetBinding for PanoramaBinding {
    type Api = PanoramaApiHandle;
    type Entity = PlayerHandle;
    type Channel = PanoramaChannel;
    type Props = PanoramaProps;

    fn container_prefix(&self) -> &'static str {
        "panorama-player"
    }

    fn validate(&self, props: &PanoramaProps) -> Result<(), BridgeError> {
        if props.point.is_none() {
            return Err(BridgeError::Configuration(
                "the `point` property is required".into(),
            ));
        }
        Ok(())
    }

    async fn construct(
        &self,
        api: &PanoramaApiHandle,
        container: &ContainerId,
        props: &PanoramaProps,
    ) -> Result<PlayerHandle, BridgeError> {
        let point = props.point.ok_or_else(|| {
            BridgeError::Configuration("the `point` property is required".into())
        })?;
        let mode = props.mode.unwrap_or_default();

        let found = api.locate(point, mode).await?;
        log::debug!("located {} panorama(s) at the requested point", found.len());
        let panorama = found.first().ok_or_else(|| {
            BridgeError::NativeConstruction("no panorama found at the requested point".into())
        })?;

        api.create_player(container, panorama, props.options.as_ref())
    }

    fn field_rules(&self) -> &'static [FieldRule<PlayerHandle>] {
        FIELD_RULES
    }

    fn event_routes(&self) -> &'static [EventRoute<PanoramaChannel>] {
        EVENT_ROUTES
    }

    fn destroy_event(&self) -> Option<&'static str> {
        Some("destroy")
    }
}
