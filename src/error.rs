//! Error types for the dimming controller and its collaborators.

/// Errors that can occur while driving the software dimmer.
///
/// None of these are fatal: the controller logs them and keeps the last good
/// overlay state, or falls back to the software brightness setting.
#[derive(Debug, thiserror::Error)]
pub enum DimmerError {
    /// The brightness indicator could not be located in the panel menu.
    #[error("Cannot find brightness indicator slot")]
    SlotNotFound,

    /// The `monitors` setting holds a value we do not know how to handle.
    #[error("Unhandled \"monitors\" setting: {0:?}")]
    UnknownMonitorSelection(String),

    /// The backlight channel has not reported a level or went away.
    #[error("Backlight channel unavailable")]
    BacklightUnavailable,

    /// A backlight level outside 0-100 was written or reported.
    #[error("Backlight level {0} out of range (expected 0-100)")]
    BacklightOutOfRange(u32),

    /// A brightness value that is not a finite number.
    #[error("Invalid brightness value {0}")]
    InvalidBrightness(f64),

    /// A settings key name that the store does not recognize.
    #[error("Unknown setting key: {0}")]
    UnknownSettingKey(String),

    /// A setting was read or written with the wrong type.
    #[error("Setting {key} is not a {expected}")]
    SettingType {
        /// The key that was accessed.
        key: &'static str,
        /// The type the key actually holds.
        expected: &'static str,
    },
}
