//! A panorama player widget built on the `mapbind` runtime.
//!
//! This crate instantiates the generic binding pattern for one concrete
//! widget: a player showing street-level or aerial panoramas from an
//! externally loaded mapping API. It supplies the static description of the
//! widget kind ([`PanoramaBinding`]): how a player is located and
//! constructed, which declarative fields may mutate and how, and which
//! native player events map to which output channels. Everything dynamic
//! (script waiting, state machine, reconciliation, event dispatch, teardown)
//! comes from `mapbind`.
//!
//! The host drives the widget through a
//! [`WidgetController<PanoramaBinding>`](mapbind::WidgetController): `mount`
//! with [`PanoramaProps`], `update` with change sets produced by
//! [`PanoramaProps::changes_since`], `dispose` on unmount.

#![warn(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod api;
pub mod widget;

pub use api::{Panorama, PanoramaApi, PanoramaApiHandle, PanoramaMode, PanoramaPlayer, PlayerHandle, Point};
pub use widget::{PanoramaBinding, PanoramaChannel, PanoramaProps};
