//! Software display dimming below the hardware backlight floor.
//!
//! Some panels cannot be dimmed below a usable-but-too-bright minimum. This
//! crate extends the range downward by painting a semi-transparent black
//! overlay over every selected display, with an opacity derived from the
//! desired brightness.
//!
//! The heart of the crate is [`BrightnessController`]. It decides whether the
//! hardware backlight or the persisted `current-brightness` setting is
//! authoritative, enforces the `min-brightness` floor, and keeps one overlay
//! per selected display in sync with the result.
//!
//! Everything the controller talks to is a trait so a host can plug in its
//! own implementation:
//!
//! - [`SettingsStore`]: flat key-value settings with change notification
//! - [`BacklightChannel`]: the hardware brightness property
//! - [`DisplayTopology`]: the current display layout
//! - [`BrightnessControl`]: the slider in the host's panel menu
//! - [`OverlayFactory`]: the graphics primitive that paints an overlay
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use softdim_core::{
//!     BrightnessController, Collaborators, ControllerOptions, DisplayRegion, MemorySettings,
//!     RecordingOverlayFactory, SettingKey, SettingsStore, SimulatedBacklight, SimulatedControl,
//!     SimulatedDisplays,
//! };
//!
//! fn main() -> Result<(), softdim_core::DimmerError> {
//!     let settings = Rc::new(MemorySettings::new());
//!     let control = Rc::new(SimulatedControl::new());
//!     let overlays = RecordingOverlayFactory::new();
//!
//!     let controller = BrightnessController::new(
//!         Collaborators {
//!             settings: settings.clone(),
//!             backlight: Rc::new(SimulatedBacklight::new(Some(100))),
//!             displays: Rc::new(SimulatedDisplays::new(vec![
//!                 DisplayRegion::new(0, 0, 1920, 1080, true),
//!                 DisplayRegion::new(1920, 0, 2560, 1440, false),
//!             ])),
//!             control: control.clone(),
//!             overlays: Box::new(overlays.clone()),
//!         },
//!         ControllerOptions::default(),
//!     );
//!     controller.enable()?;
//!
//!     // The user drags the slider down to 25%.
//!     control.drag(0.25);
//!     assert_eq!(overlays.live().len(), 2);
//!     assert_eq!(controller.snapshot().opacity, Some(191));
//!
//!     // Only dim the external display from now on.
//!     settings.set_string(SettingKey::Monitors, "External")?;
//!     assert_eq!(overlays.live().len(), 1);
//!
//!     controller.disable();
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! [`MemorySettings`], [`SimulatedBacklight`], [`SimulatedDisplays`],
//! [`SimulatedControl`] and [`RecordingOverlayFactory`] run the controller
//! without a desktop shell. They deliver notifications synchronously, just
//! like the shell's own settings and property bindings.

#![warn(missing_docs)]

mod backlight;
mod brightness;
mod callbacks;
mod control;
mod controller;
mod error;
mod mock;
mod overlay;
mod settings;
mod state;
mod topology;

// Re-export public API
pub use backlight::BacklightChannel;
pub use brightness::{
    BacklightRounding, FULL_BRIGHTNESS, MAX_BACKLIGHT_LEVEL, SourceMode, level_to_brightness,
    opacity_for,
};
pub use callbacks::{CallbackId, Callbacks};
pub use control::BrightnessControl;
pub use controller::{BrightnessController, Collaborators, ControllerOptions};
pub use error::DimmerError;
pub use mock::{
    MemorySettings, OverlayRecord, RecordingOverlayFactory, SimulatedBacklight, SimulatedControl,
    SimulatedDisplays,
};
pub use overlay::{OVERLAY_Z_POSITION, OverlayFactory, OverlayManager, OverlaySurface};
pub use settings::{
    DEFAULT_CURRENT_BRIGHTNESS, DEFAULT_MIN_BRIGHTNESS, MonitorSelection, SettingKey, SettingKind,
    SettingsStore,
};
pub use state::ControllerSnapshot;
pub use topology::{DisplayRegion, DisplayTopology};

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Session {
        settings: Rc<MemorySettings>,
        backlight: Rc<SimulatedBacklight>,
        displays: Rc<SimulatedDisplays>,
        overlays: RecordingOverlayFactory,
        controller: BrightnessController,
    }

    fn laptop_with_monitor() -> Vec<DisplayRegion> {
        vec![
            DisplayRegion::new(0, 0, 1920, 1080, true),
            DisplayRegion::new(1920, 0, 2560, 1440, false),
        ]
    }

    fn session(backlight: Option<u32>) -> Session {
        let settings = Rc::new(MemorySettings::new());
        let backlight = Rc::new(SimulatedBacklight::new(backlight));
        let displays = Rc::new(SimulatedDisplays::new(laptop_with_monitor()));
        let overlays = RecordingOverlayFactory::new();
        let controller = BrightnessController::new(
            Collaborators {
                settings: settings.clone(),
                backlight: backlight.clone(),
                displays: displays.clone(),
                control: Rc::new(SimulatedControl::new()),
                overlays: Box::new(overlays.clone()),
            },
            ControllerOptions::default(),
        );
        Session {
            settings,
            backlight,
            displays,
            overlays,
            controller,
        }
    }

    fn opacities(overlays: &RecordingOverlayFactory) -> Vec<u8> {
        overlays.live().iter().map(|o| o.opacity).collect()
    }

    #[test]
    fn test_effective_brightness_never_below_floor() {
        for floor in [0.0, 0.1, 0.35, 0.8] {
            for value in [0.0, 0.05, 0.2, 0.5, 0.9, 1.0] {
                let s = session(None);
                s.settings
                    .set_double(SettingKey::MinBrightness, floor)
                    .unwrap();
                s.controller.enable().unwrap();

                s.settings
                    .set_double(SettingKey::CurrentBrightness, value)
                    .unwrap();

                let effective = s.controller.snapshot().effective_brightness;
                assert!(
                    effective >= floor,
                    "value {value} with floor {floor} left {effective}"
                );
            }
        }
    }

    #[test]
    fn test_full_brightness_has_no_overlays() {
        let s = session(None);
        s.settings
            .set_double(SettingKey::CurrentBrightness, 0.4)
            .unwrap();
        s.controller.enable().unwrap();
        assert_eq!(s.overlays.live().len(), 2);

        s.settings
            .set_double(SettingKey::CurrentBrightness, 1.0)
            .unwrap();

        assert!(s.overlays.live().is_empty());
        assert_eq!(s.controller.snapshot().opacity, None);
    }

    #[test]
    fn test_dimmed_opacity_per_region() {
        let s = session(None);
        s.settings
            .set_double(SettingKey::MinBrightness, 0.0)
            .unwrap();
        s.controller.enable().unwrap();

        s.settings
            .set_double(SettingKey::CurrentBrightness, 0.5)
            .unwrap();
        assert_eq!(opacities(&s.overlays), vec![128, 128]);

        s.settings
            .set_double(SettingKey::CurrentBrightness, 0.0)
            .unwrap();
        assert_eq!(opacities(&s.overlays), vec![255, 255]);

        let regions: Vec<_> = s.overlays.live().iter().filter_map(|o| o.region).collect();
        assert_eq!(regions, laptop_with_monitor());
        assert_eq!(s.overlays.created_total(), 2);
    }

    #[test]
    fn test_source_mode_round_trip() {
        let s = session(Some(90));
        s.settings
            .set_double(SettingKey::CurrentBrightness, 0.37)
            .unwrap();
        s.controller.enable().unwrap();

        s.settings
            .set_boolean(SettingKey::UseBacklight, true)
            .unwrap();
        assert_eq!(s.controller.source_mode(), SourceMode::UseBacklight);
        let level = s.backlight.level().unwrap();
        assert!((level_to_brightness(level) - 0.37).abs() <= 0.0100001);

        s.settings
            .set_boolean(SettingKey::UseBacklight, false)
            .unwrap();
        assert_eq!(s.controller.source_mode(), SourceMode::UseSoftwareSetting);
        let stored = s
            .settings
            .get_double(SettingKey::CurrentBrightness)
            .unwrap();
        assert_eq!(stored, level_to_brightness(s.backlight.level().unwrap()));
        assert!((stored - 0.37).abs() <= 0.0100001);
    }

    #[test]
    fn test_builtin_only_keeps_primary_overlay() {
        let s = session(None);
        s.settings
            .set_double(SettingKey::CurrentBrightness, 0.6)
            .unwrap();
        s.controller.enable().unwrap();
        assert_eq!(s.overlays.live().len(), 2);

        s.settings
            .set_string(SettingKey::Monitors, MonitorSelection::BuiltinOnly.as_str())
            .unwrap();

        let live = s.overlays.live();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].region, Some(DisplayRegion::new(0, 0, 1920, 1080, true)));
        assert_eq!(live[0].opacity, 102);
    }

    #[test]
    fn test_hotplug_adds_overlay_at_same_opacity() {
        let s = session(None);
        s.settings
            .set_double(SettingKey::CurrentBrightness, 0.2)
            .unwrap();
        s.controller.enable().unwrap();

        s.displays
            .add(DisplayRegion::new(4480, 0, 1920, 1080, false));

        assert_eq!(opacities(&s.overlays), vec![204, 204, 204]);

        s.settings
            .set_string(SettingKey::Monitors, "External")
            .unwrap();
        assert_eq!(opacities(&s.overlays), vec![204, 204]);

        s.displays.remove(1);
        let live = s.overlays.live();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].region, Some(DisplayRegion::new(4480, 0, 1920, 1080, false)));
    }

    #[test]
    fn test_pending_notification_after_disable_is_dropped() {
        let s = session(None);
        s.settings
            .set_double(SettingKey::CurrentBrightness, 0.5)
            .unwrap();

        // Registered ahead of the controller, so it runs first in the same
        // dispatch and disables the controller while its listener is queued.
        let slot: Rc<RefCell<Option<Rc<BrightnessController>>>> = Rc::new(RefCell::new(None));
        let slot_clone = slot.clone();
        s.settings.connect_changed(
            SettingKey::CurrentBrightness,
            Box::new(move || {
                if let Some(controller) = slot_clone.borrow().as_ref() {
                    controller.disable();
                }
            }),
        );

        let controller = Rc::new(s.controller);
        *slot.borrow_mut() = Some(controller.clone());
        controller.enable().unwrap();
        assert_eq!(s.overlays.live().len(), 2);

        s.settings
            .set_double(SettingKey::CurrentBrightness, 0.2)
            .unwrap();

        assert!(!controller.is_enabled());
        assert!(s.overlays.live().is_empty());
        assert_eq!(s.overlays.created_total(), 2);
        assert_eq!(s.overlays.destroyed_total(), 2);
        assert_eq!(controller.snapshot().live_subscriptions, 0);

        s.displays.add(DisplayRegion::new(0, 1080, 800, 600, false));
        assert_eq!(s.overlays.created_total(), 2);

        slot.borrow_mut().take();
    }

    #[test]
    fn test_below_floor_written_back_once() {
        let s = session(None);
        s.settings
            .set_double(SettingKey::MinBrightness, 0.2)
            .unwrap();
        s.controller.enable().unwrap();
        let writes_before = s.settings.write_count(SettingKey::CurrentBrightness);

        s.settings
            .set_double(SettingKey::CurrentBrightness, 0.05)
            .unwrap();

        // Our write plus exactly one write-back.
        assert_eq!(
            s.settings.write_count(SettingKey::CurrentBrightness),
            writes_before + 2
        );
        assert_eq!(
            s.settings.get_double(SettingKey::CurrentBrightness).unwrap(),
            0.2
        );
        assert_eq!(opacities(&s.overlays), vec![204, 204]);

        s.controller.recompute_effective();
        assert_eq!(
            s.settings.write_count(SettingKey::CurrentBrightness),
            writes_before + 2
        );
    }

    #[test]
    fn test_raising_floor_pulls_brightness_up() {
        let s = session(None);
        s.settings
            .set_double(SettingKey::CurrentBrightness, 0.15)
            .unwrap();
        s.controller.enable().unwrap();

        s.settings
            .set_double(SettingKey::MinBrightness, 0.5)
            .unwrap();

        assert_eq!(
            s.settings.get_double(SettingKey::CurrentBrightness).unwrap(),
            0.5
        );
        assert_eq!(opacities(&s.overlays), vec![128, 128]);
    }

    #[test]
    fn test_unknown_monitor_selection_is_skipped() {
        let s = session(None);
        s.settings
            .set_double(SettingKey::CurrentBrightness, 0.5)
            .unwrap();
        s.controller.enable().unwrap();

        s.settings
            .set_string(SettingKey::Monitors, "Projector")
            .unwrap();
        assert!(s.overlays.live().is_empty());
        assert!(s.controller.is_enabled());

        s.settings
            .set_string(SettingKey::Monitors, "All")
            .unwrap();
        assert_eq!(opacities(&s.overlays), vec![128, 128]);
    }

    #[test]
    fn test_backlight_change_from_hardware_keys() {
        let s = session(Some(70));
        s.settings
            .set_boolean(SettingKey::UseBacklight, true)
            .unwrap();
        s.controller.enable().unwrap();
        assert_eq!(opacities(&s.overlays), vec![77, 77]);

        s.backlight.report(Some(100));
        assert!(s.overlays.live().is_empty());

        s.backlight.report(None);
        assert_eq!(s.controller.source_mode(), SourceMode::UseSoftwareSetting);
    }
}
