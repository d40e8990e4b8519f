//! Surface of the external panorama API consumed by the widget.
//!
//! The widget never talks to a real script directly; the host supplies an
//! implementation of [`PanoramaApi`] (the namespace handle the script fetcher
//! resolves with) and of [`PanoramaPlayer`] (the constructed native entity).

use std::sync::Arc;

use async_trait::async_trait;
use mapbind::{BridgeError, ContainerId, NativeEntity, NativeEventHandler, NativeListenerId};
use maybe_sync::{MaybeSend, MaybeSync};
use serde::{Deserialize, Serialize};

/// Geographic point, serialized as a two-element array in the coordinate
/// order the external API was configured with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point(pub f64, pub f64);

/// Panorama flavor understood by the locator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PanoramaMode {
    /// Street-level panorama.
    #[default]
    #[serde(rename = "yandex#panorama")]
    Ground,
    /// Aerial panorama.
    #[serde(rename = "yandex#airPanorama")]
    Air,
}

/// One located panorama. Opaque to the widget: it is only ever passed back
/// into [`PanoramaApi::create_player`].
#[derive(Debug, Clone)]
pub struct Panorama(pub serde_json::Value);

/// Handle of the loaded panorama namespace.
pub type PanoramaApiHandle = Arc<dyn PanoramaApi>;

/// The namespace of the external panorama API: a locator resolving
/// asynchronously with zero or more matches, and a player constructor.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait PanoramaApi: MaybeSend + MaybeSync {
    /// Searches for panoramas at the given point.
    async fn locate(
        &self,
        point: Point,
        mode: PanoramaMode,
    ) -> Result<Vec<Panorama>, BridgeError>;

    /// Creates a player showing the given panorama inside the container.
    /// The options bag is passed through without introspection.
    fn create_player(
        &self,
        container: &ContainerId,
        panorama: &Panorama,
        options: Option<&serde_json::Value>,
    ) -> Result<PlayerHandle, BridgeError>;
}

/// A constructed native panorama player.
pub trait PanoramaPlayer: NativeEntity {
    /// Moves the player to a new point, optionally switching the panorama
    /// flavor in the same call. `None` keeps the current flavor.
    fn move_to(&self, point: Point, mode: Option<PanoramaMode>) -> Result<(), BridgeError>;
}

/// Clonable handle of one native player, shared between the lifecycle
/// controller and the event bridge.
#[derive(Clone)]
pub struct PlayerHandle(Arc<dyn PanoramaPlayer>);

impl PlayerHandle {
    /// Wraps a player implementation.
    pub fn new(player: impl PanoramaPlayer) -> Self {
        Self(Arc::new(player))
    }

    /// See [`PanoramaPlayer::move_to`].
    pub fn move_to(&self, point: Point, mode: Option<PanoramaMode>) -> Result<(), BridgeError> {
        self.0.move_to(point, mode)
    }
}

impl NativeEntity for PlayerHandle {
    fn add_listener(
        &self,
        names: &[&str],
        handler: Arc<dyn NativeEventHandler>,
    ) -> NativeListenerId {
        self.0.add_listener(names, handler)
    }

    fn remove_listener(&self, listener: NativeListenerId) {
        self.0.remove_listener(listener)
    }

    fn supports_destroy(&self) -> bool {
        self.0.supports_destroy()
    }

    fn destroy(&self) {
        self.0.destroy()
    }
}
