//! Process-wide configuration of the external API.

use serde::{Deserialize, Serialize};

/// Locale the external API is initialized with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lang {
    /// Russian (Russia).
    #[serde(rename = "ru_RU")]
    RuRu,
    /// English (United States).
    #[serde(rename = "en_US")]
    EnUs,
    /// English (Russia).
    #[serde(rename = "en_RU")]
    EnRu,
    /// Russian (Ukraine).
    #[serde(rename = "ru_UA")]
    RuUa,
    /// Ukrainian (Ukraine).
    #[serde(rename = "uk_UA")]
    UkUa,
    /// Turkish (Turkey).
    #[serde(rename = "tr_TR")]
    TrTr,
}

/// Order of coordinates in geographic positions accepted by the external API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordOrder {
    /// Latitude first, then longitude.
    LatLong,
    /// Longitude first, then latitude.
    LongLat,
}

/// Build flavor of the external API bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Minified production bundle.
    Release,
    /// Bundle with debugging facilities.
    Debug,
}

/// Configuration the external API is initialized with.
///
/// At most one configuration is ever consumed per process: the first call to
/// [`ScriptLoader::ensure_loaded`](crate::ScriptLoader::ensure_loaded) wins,
/// and any later call with a conflicting configuration fails fast with
/// [`BridgeError::Configuration`](crate::BridgeError::Configuration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadConfiguration {
    /// API key used by the external service, if any.
    pub apikey: Option<String>,
    /// Locale of the API. Required.
    pub lang: Lang,
    /// Coordinate order used by the API.
    pub coordorder: Option<CoordOrder>,
    /// List of API packages to load, in the format the external API expects.
    pub load: Option<String>,
    /// Build flavor of the bundle.
    pub mode: Option<LoadMode>,
    /// Whether the enterprise flavor of the API should be used.
    pub enterprise: bool,
    /// Version of the API bundle to load.
    pub version: Option<String>,
}

impl LoadConfiguration {
    /// Creates a configuration with the given locale and all optional fields
    /// unset.
    pub fn new(lang: Lang) -> Self {
        Self {
            apikey: None,
            lang,
            coordorder: None,
            load: None,
            mode: None,
            enterprise: false,
            version: None,
        }
    }

    /// Sets the API key.
    pub fn with_apikey(mut self, apikey: impl Into<String>) -> Self {
        self.apikey = Some(apikey.into());
        self
    }

    /// Sets the coordinate order.
    pub fn with_coordorder(mut self, coordorder: CoordOrder) -> Self {
        self.coordorder = Some(coordorder);
        self
    }

    /// Sets the bundle version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}
