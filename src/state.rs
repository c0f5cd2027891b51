//! Controller state snapshot.

use crate::brightness::SourceMode;

/// A snapshot of the controller's current state.
///
/// Use [`BrightnessController::snapshot`](crate::BrightnessController::snapshot)
/// to obtain one.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSnapshot {
    /// Whether the controller is enabled.
    pub enabled: bool,
    /// Whether initialization waits for the backlight's first report.
    pub awaiting_backlight: bool,
    /// Which source is authoritative right now.
    pub source_mode: SourceMode,
    /// Brightness read from the authoritative source (0.0-1.0).
    pub effective_brightness: f64,
    /// Opacity of the shown overlays, `None` when hidden.
    pub opacity: Option<u8>,
    /// Number of live overlays.
    pub overlay_count: usize,
    /// Number of entries in the subscription table.
    pub live_subscriptions: usize,
}
