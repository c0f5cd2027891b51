//! Brightness values, source selection and conversions.
//!
//! Brightness is a real number in `0.0..=1.0` where `1.0` means no dimming.
//! The backlight channel speaks integer percent (`0..=100`), and overlays
//! speak an 8-bit alpha (`0..=255`).

use crate::error::DimmerError;

/// Brightness at or above which no overlay is shown.
pub const FULL_BRIGHTNESS: f64 = 1.0;

/// Highest level the backlight channel accepts.
pub const MAX_BACKLIGHT_LEVEL: u32 = 100;

// Absorbs float noise such as `0.07 * 100.0 == 7.000000000000001`.
const LEVEL_EPSILON: f64 = 1e-9;

/// Which source holds the authoritative brightness value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// The hardware backlight channel is read and written.
    UseBacklight,
    /// The persisted `current-brightness` setting is read and written.
    UseSoftwareSetting,
}

impl SourceMode {
    /// Resolve the effective mode from the `use-backlight` setting and the
    /// channel's availability. Backlight mode is demoted to the software
    /// setting while the channel has no concrete level.
    pub fn resolve(use_backlight: bool, backlight_available: bool) -> Self {
        if use_backlight && backlight_available {
            Self::UseBacklight
        } else {
            Self::UseSoftwareSetting
        }
    }
}

/// How a brightness value is quantized into a backlight level.
///
/// Both policies round upward, so the level read back never maps below the
/// value that was written. Floor enforcement relies on this.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BacklightRounding {
    /// `min(100, round(v * 100) + 1)`, the legacy channel conversion.
    #[default]
    Biased,
    /// `min(100, ceil(v * 100))`, the smallest level not below `v`.
    Ceiling,
}

impl BacklightRounding {
    /// Convert a brightness value to a backlight level.
    pub fn to_level(self, value: f64) -> u32 {
        let scaled = clamp_unit(value) * f64::from(MAX_BACKLIGHT_LEVEL);
        let level = match self {
            Self::Biased => scaled.round() + 1.0,
            Self::Ceiling => (scaled - LEVEL_EPSILON).ceil(),
        };
        let level = (level.max(0.0) as u32).min(MAX_BACKLIGHT_LEVEL);
        // The epsilon must never push the read-back below the value.
        if level < MAX_BACKLIGHT_LEVEL && level_to_brightness(level) < clamp_unit(value) {
            level + 1
        } else {
            level
        }
    }
}

/// Map a backlight level to a brightness value.
pub fn level_to_brightness(level: u32) -> f64 {
    f64::from(level) / f64::from(MAX_BACKLIGHT_LEVEL)
}

/// Overlay alpha for `brightness`, or `None` when no overlay is needed.
///
/// ```
/// use softdim_core::opacity_for;
///
/// assert_eq!(opacity_for(0.5), Some(128));
/// assert_eq!(opacity_for(0.0), Some(255));
/// assert_eq!(opacity_for(1.0), None);
/// assert_eq!(opacity_for(f64::NAN), None);
/// ```
pub fn opacity_for(brightness: f64) -> Option<u8> {
    if brightness.is_nan() || brightness >= FULL_BRIGHTNESS {
        return None;
    }
    let alpha = ((FULL_BRIGHTNESS - brightness.max(0.0)) * 255.0).round();
    Some(alpha as u8)
}

/// Validate user input and clamp it into `0.0..=1.0`.
///
/// # Errors
/// Returns [`DimmerError::InvalidBrightness`] for NaN or infinite values.
pub fn validate(value: f64) -> Result<f64, DimmerError> {
    if !value.is_finite() {
        return Err(DimmerError::InvalidBrightness(value));
    }
    Ok(clamp_unit(value))
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, FULL_BRIGHTNESS)
}
