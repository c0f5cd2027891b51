//! Hardware backlight channel interface.

use crate::callbacks::CallbackId;
use crate::error::DimmerError;

/// The read/write brightness property of the hardware backlight.
///
/// The channel is asynchronous: it may not have reported a level yet when
/// the controller starts, and it may change on its own (for example when
/// brightness keys are pressed).
pub trait BacklightChannel {
    /// The current level in `0..=100`, or `None` while unavailable.
    fn level(&self) -> Option<u32>;

    /// Request a new level.
    ///
    /// # Errors
    /// [`DimmerError::BacklightUnavailable`] when the channel went away and
    /// [`DimmerError::BacklightOutOfRange`] for levels above 100.
    fn set_level(&self, level: u32) -> Result<(), DimmerError>;

    /// Call `callback` whenever the level changes.
    fn connect_changed(&self, callback: Box<dyn Fn()>) -> CallbackId;

    /// Remove a listener added with [`connect_changed`](Self::connect_changed).
    fn disconnect(&self, id: CallbackId) -> bool;
}
