//! The brightness slider exposed in the host's panel menu.

use crate::callbacks::CallbackId;
use crate::error::DimmerError;

/// UI binding for the brightness slider.
///
/// `install` swaps the host's stock brightness item for ours and `restore`
/// puts the stock item back. Setting the value programmatically must not fire
/// the user-edit listeners.
pub trait BrightnessControl {
    /// Replace the stock brightness item with this control.
    ///
    /// # Errors
    /// [`DimmerError::SlotNotFound`] when the stock item cannot be located.
    /// The menu must be left untouched in that case.
    fn install(&self) -> Result<(), DimmerError>;

    /// Put the stock brightness item back.
    fn restore(&self);

    /// The slider position in `0.0..=1.0`.
    fn value(&self) -> f64;

    /// Move the slider without notifying user-edit listeners.
    fn set_value(&self, value: f64);

    /// Call `callback` with the new value when the user drags the slider.
    fn connect_user_edit(&self, callback: Box<dyn Fn(f64)>) -> CallbackId;

    /// Remove a listener added with [`connect_user_edit`](Self::connect_user_edit).
    fn disconnect(&self, id: CallbackId) -> bool;
}
