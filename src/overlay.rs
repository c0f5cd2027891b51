//! Overlay surfaces and their per-display placement.

use log::debug;

use crate::error::DimmerError;
use crate::settings::MonitorSelection;
use crate::topology::{DisplayRegion, DisplayTopology};

/// Z position that keeps overlays just above normal content.
pub const OVERLAY_Z_POSITION: f32 = 0.00001;

/// A black, full-region surface painted above screen content.
///
/// Dropping the surface removes it from the screen.
pub trait OverlaySurface {
    /// Move and resize the surface to cover `region`.
    fn set_geometry(&mut self, region: &DisplayRegion);

    /// Set the stacking position.
    fn set_z_position(&mut self, z: f32);

    /// Set the alpha, 0 transparent to 255 opaque black.
    fn set_opacity(&mut self, opacity: u8);
}

/// Graphics primitive that produces overlay surfaces.
pub trait OverlayFactory {
    /// Create a new surface attached to the host's UI group.
    fn create(&self) -> Box<dyn OverlaySurface>;
}

struct Overlay {
    region: DisplayRegion,
    surface: Box<dyn OverlaySurface>,
}

/// Owns every overlay surface.
///
/// The set is built lazily on the first [`show_overlays`](Self::show_overlays)
/// and only ever torn down as a whole.
pub struct OverlayManager {
    factory: Box<dyn OverlayFactory>,
    // `Some(vec![])` is a built but empty set, e.g. "External" with one display.
    overlays: Option<Vec<Overlay>>,
    opacity: Option<u8>,
}

impl OverlayManager {
    /// Create a manager with no overlays.
    pub fn new(factory: Box<dyn OverlayFactory>) -> Self {
        Self {
            factory,
            overlays: None,
            opacity: None,
        }
    }

    /// Show overlays at `opacity` on the displays picked by `selection`.
    ///
    /// When no set exists yet one overlay is created per selected region of
    /// `topology`. An existing set is reused and only its opacity changes.
    ///
    /// # Errors
    /// [`DimmerError::UnknownMonitorSelection`] when a set must be built and
    /// `selection` is not a known value. Nothing is changed in that case.
    pub fn show_overlays(
        &mut self,
        opacity: u8,
        selection: &str,
        topology: &dyn DisplayTopology,
    ) -> Result<(), DimmerError> {
        if self.overlays.is_none() {
            let selection: MonitorSelection = selection.parse()?;
            debug!("show_overlays(): monitors={selection}");
            let overlays = selection
                .select(&topology.regions())
                .into_iter()
                .enumerate()
                .map(|(index, region)| {
                    debug!("create overlay #{index}: {region}");
                    let mut surface = self.factory.create();
                    surface.set_geometry(&region);
                    surface.set_z_position(OVERLAY_Z_POSITION);
                    Overlay { region, surface }
                })
                .collect();
            self.overlays = Some(overlays);
        }

        if let Some(overlays) = self.overlays.as_mut() {
            for (index, overlay) in overlays.iter_mut().enumerate() {
                debug!("set opacity {opacity} on overlay #{index}");
                overlay.surface.set_opacity(opacity);
            }
        }
        self.opacity = Some(opacity);
        Ok(())
    }

    /// Destroy every overlay. Does nothing when none exist.
    pub fn hide_overlays(&mut self) {
        if let Some(overlays) = self.overlays.take() {
            debug!("drop overlays, count={}", overlays.len());
        }
        self.opacity = None;
    }

    /// Number of live overlays.
    pub fn count(&self) -> usize {
        self.overlays.as_ref().map_or(0, Vec::len)
    }

    /// Opacity applied to the current set, if one is shown.
    pub fn opacity(&self) -> Option<u8> {
        self.opacity
    }

    /// Regions covered by the current set.
    pub fn regions(&self) -> Vec<DisplayRegion> {
        self.overlays
            .iter()
            .flatten()
            .map(|overlay| overlay.region)
            .collect()
    }
}

impl std::fmt::Debug for OverlayManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayManager")
            .field("count", &self.count())
            .field("opacity", &self.opacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{RecordingOverlayFactory, SimulatedDisplays};

    fn dual_head() -> SimulatedDisplays {
        SimulatedDisplays::new(vec![
            DisplayRegion::new(0, 0, 1920, 1080, true),
            DisplayRegion::new(1920, 0, 2560, 1440, false),
        ])
    }

    #[test]
    fn test_show_creates_one_overlay_per_region() {
        let factory = RecordingOverlayFactory::new();
        let mut manager = OverlayManager::new(Box::new(factory.clone()));

        manager.show_overlays(128, "All", &dual_head()).unwrap();

        let live = factory.live();
        assert_eq!(live.len(), 2);
        assert_eq!(live[0].region, Some(DisplayRegion::new(0, 0, 1920, 1080, true)));
        assert_eq!(live[1].region, Some(DisplayRegion::new(1920, 0, 2560, 1440, false)));
        assert!(live.iter().all(|o| o.opacity == 128));
        assert!(live.iter().all(|o| o.z_position == OVERLAY_Z_POSITION));
    }

    #[test]
    fn test_show_reuses_existing_set() {
        let factory = RecordingOverlayFactory::new();
        let mut manager = OverlayManager::new(Box::new(factory.clone()));
        let displays = dual_head();

        manager.show_overlays(200, "All", &displays).unwrap();
        manager.show_overlays(50, "All", &displays).unwrap();

        assert_eq!(factory.created_total(), 2);
        assert!(factory.live().iter().all(|o| o.opacity == 50));
        assert_eq!(manager.opacity(), Some(50));
    }

    #[test]
    fn test_selection_filters_regions() {
        let factory = RecordingOverlayFactory::new();
        let mut manager = OverlayManager::new(Box::new(factory.clone()));

        manager.show_overlays(10, "External", &dual_head()).unwrap();
        assert_eq!(
            manager.regions(),
            vec![DisplayRegion::new(1920, 0, 2560, 1440, false)]
        );

        manager.hide_overlays();
        manager.show_overlays(10, "Built-in", &dual_head()).unwrap();
        assert_eq!(
            manager.regions(),
            vec![DisplayRegion::new(0, 0, 1920, 1080, true)]
        );
    }

    #[test]
    fn test_unknown_selection_keeps_state() {
        let factory = RecordingOverlayFactory::new();
        let mut manager = OverlayManager::new(Box::new(factory.clone()));

        let err = manager.show_overlays(10, "Projector", &dual_head());
        assert!(matches!(err, Err(DimmerError::UnknownMonitorSelection(_))));
        assert_eq!(manager.count(), 0);
        assert_eq!(manager.opacity(), None);
        assert_eq!(factory.created_total(), 0);
    }

    #[test]
    fn test_hide_destroys_everything() {
        let factory = RecordingOverlayFactory::new();
        let mut manager = OverlayManager::new(Box::new(factory.clone()));

        manager.hide_overlays();
        manager.show_overlays(90, "All", &dual_head()).unwrap();
        manager.hide_overlays();

        assert_eq!(manager.count(), 0);
        assert!(factory.live().is_empty());
        assert_eq!(factory.destroyed_total(), 2);
    }
}
