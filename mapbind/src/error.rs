//! Error types used by the crate.

use thiserror::Error;

/// Mapbind error type.
///
/// Native runtime errors reported by an already constructed entity are not
/// represented here: they are delivered as ordinary envelopes on the widget's
/// mapped error channel, since they describe a recoverable condition the host
/// may want to display.
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// A required declarative property is missing, or the process-wide load
    /// configuration conflicts with the one the external API was already
    /// initialized with.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The external API bundle failed to load or initialize. This error is
    /// sticky for the process: every widget awaiting the script observes it.
    #[error("failed to load external API script: {0}")]
    ScriptLoad(String),

    /// A reconciliation pass touched a field that cannot be changed on the
    /// constructed entity. The native entity is left untouched.
    #[error("unsupported mutation of `{field}`: {reason}")]
    UnsupportedMutation {
        /// Name of the declarative property that was rejected.
        field: String,
        /// Why the mutation cannot be applied.
        reason: String,
    },

    /// The native locate/construct call failed. The widget transitions to its
    /// failed state; sibling widgets and the loader are unaffected.
    #[error("native construction failed: {0}")]
    NativeConstruction(String),
}

impl BridgeError {
    pub(crate) fn unsupported_mutation(
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        BridgeError::UnsupportedMutation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
