//! Display regions and the topology source.

use crate::callbacks::CallbackId;

/// One active display, in global layout coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRegion {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Whether this is the primary (built-in) display.
    pub is_primary: bool,
}

impl DisplayRegion {
    /// Create a region.
    pub fn new(x: i32, y: i32, width: u32, height: u32, is_primary: bool) -> Self {
        Self {
            x,
            y,
            width,
            height,
            is_primary,
        }
    }
}

impl std::fmt::Display for DisplayRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}@{},{}", self.width, self.height, self.x, self.y)
    }
}

/// Source of the current display layout.
pub trait DisplayTopology {
    /// The active display regions.
    fn regions(&self) -> Vec<DisplayRegion>;

    /// Call `callback` when displays are added, removed or resized.
    fn connect_changed(&self, callback: Box<dyn Fn()>) -> CallbackId;

    /// Remove a listener added with [`connect_changed`](Self::connect_changed).
    fn disconnect(&self, id: CallbackId) -> bool;
}
