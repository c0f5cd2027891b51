//! The brightness-state controller.
//!
//! The controller decides which source holds the authoritative brightness,
//! enforces the minimum floor, and keeps the overlay set in line with the
//! result. It runs entirely inside notification callbacks delivered one at a
//! time by the host's event loop.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use log::{LevelFilter, debug, error, info, warn};

use crate::backlight::BacklightChannel;
use crate::brightness::{
    self, BacklightRounding, MAX_BACKLIGHT_LEVEL, SourceMode, level_to_brightness, opacity_for,
};
use crate::callbacks::CallbackId;
use crate::control::BrightnessControl;
use crate::error::DimmerError;
use crate::overlay::{OverlayFactory, OverlayManager};
use crate::settings::{
    DEFAULT_CURRENT_BRIGHTNESS, DEFAULT_MIN_BRIGHTNESS, MonitorSelection, SettingKey,
    SettingsStore,
};
use crate::state::ControllerSnapshot;
use crate::topology::DisplayTopology;

/// Tunables that are not persisted settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerOptions {
    /// How brightness values are quantized into backlight levels.
    pub rounding: BacklightRounding,
}

/// The external collaborators the controller drives.
pub struct Collaborators {
    /// Persisted settings.
    pub settings: Rc<dyn SettingsStore>,
    /// Hardware backlight.
    pub backlight: Rc<dyn BacklightChannel>,
    /// Display layout.
    pub displays: Rc<dyn DisplayTopology>,
    /// Panel slider.
    pub control: Rc<dyn BrightnessControl>,
    /// Overlay surface primitive.
    pub overlays: Box<dyn OverlayFactory>,
}

#[derive(Debug, Clone, Copy)]
enum Subscription {
    Setting(SettingKey, CallbackId),
    Displays(CallbackId),
    Backlight(CallbackId),
    UserEdit(CallbackId),
}

/// The software dimming controller.
///
/// Construct it with its collaborators, then [`enable`](Self::enable) it.
/// Every subscription made on enable is released on
/// [`disable`](Self::disable), and dropping an enabled controller disables it.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use softdim_core::{
///     BrightnessController, Collaborators, ControllerOptions, DisplayRegion, MemorySettings,
///     RecordingOverlayFactory, SettingKey, SettingsStore, SimulatedBacklight, SimulatedControl,
///     SimulatedDisplays,
/// };
///
/// let settings = Rc::new(MemorySettings::new());
/// let overlays = RecordingOverlayFactory::new();
/// let controller = BrightnessController::new(
///     Collaborators {
///         settings: settings.clone(),
///         backlight: Rc::new(SimulatedBacklight::new(None)),
///         displays: Rc::new(SimulatedDisplays::new(vec![DisplayRegion::new(
///             0, 0, 1920, 1080, true,
///         )])),
///         control: Rc::new(SimulatedControl::new()),
///         overlays: Box::new(overlays.clone()),
///     },
///     ControllerOptions::default(),
/// );
///
/// controller.enable()?;
/// settings.set_double(SettingKey::CurrentBrightness, 0.5)?;
/// assert_eq!(overlays.live()[0].opacity, 128);
///
/// controller.disable();
/// assert!(overlays.live().is_empty());
/// # Ok::<(), softdim_core::DimmerError>(())
/// ```
pub struct BrightnessController {
    inner: Rc<Inner>,
}

struct Inner {
    settings: Rc<dyn SettingsStore>,
    backlight: Rc<dyn BacklightChannel>,
    displays: Rc<dyn DisplayTopology>,
    control: Rc<dyn BrightnessControl>,
    overlays: RefCell<OverlayManager>,
    subscriptions: RefCell<Vec<Subscription>>,
    rounding: BacklightRounding,
    enabled: Cell<bool>,
    awaiting_backlight: Cell<bool>,
    enforcing_floor: Cell<bool>,
    // Host log level to restore once `debug` is turned off again.
    host_log_level: Cell<Option<LevelFilter>>,
}

impl BrightnessController {
    /// Create a disabled controller.
    pub fn new(collaborators: Collaborators, options: ControllerOptions) -> Self {
        let Collaborators {
            settings,
            backlight,
            displays,
            control,
            overlays,
        } = collaborators;

        Self {
            inner: Rc::new(Inner {
                settings,
                backlight,
                displays,
                control,
                overlays: RefCell::new(OverlayManager::new(overlays)),
                subscriptions: RefCell::new(Vec::new()),
                rounding: options.rounding,
                enabled: Cell::new(false),
                awaiting_backlight: Cell::new(false),
                enforcing_floor: Cell::new(false),
                host_log_level: Cell::new(None),
            }),
        }
    }

    /// Install the slider, subscribe to every change source and apply the
    /// current brightness.
    ///
    /// In backlight mode with a channel that has not reported yet, applying
    /// the brightness is deferred to the channel's first report.
    ///
    /// While the `debug` setting is on, the process-wide `log` max level is
    /// raised to `Debug`. The host's level is restored when `debug` is turned
    /// off or the controller is disabled, and it is never lowered.
    ///
    /// # Errors
    /// [`DimmerError::SlotNotFound`] when the slider cannot be installed.
    /// Nothing is subscribed in that case.
    pub fn enable(&self) -> Result<(), DimmerError> {
        let inner = &self.inner;
        if inner.enabled.get() {
            debug!("enable(): already enabled, skipping");
            return Ok(());
        }

        inner.apply_debug();
        debug!("enable()");

        if let Err(e) = inner.control.install() {
            error!("enable(): {e}");
            inner.restore_log_level();
            return Err(e);
        }

        inner.enabled.set(true);
        self.subscribe();

        if inner.use_backlight() && inner.backlight_level().is_none() {
            info!("backlight has not reported a level yet, deferring initialization");
            inner.awaiting_backlight.set(true);
        } else {
            inner.sync();
        }

        info!("brightness controller enabled");
        Ok(())
    }

    /// Release every subscription, destroy all overlays and restore the
    /// stock slider. Logs a warning when not enabled.
    pub fn disable(&self) {
        let inner = &self.inner;
        if !inner.enabled.replace(false) {
            warn!("disable() called when not enabled");
            return;
        }
        debug!("disable()");

        let table = std::mem::take(&mut *inner.subscriptions.borrow_mut());
        for subscription in table {
            let (source, released) = match subscription {
                Subscription::Setting(key, id) => (key.name(), inner.settings.disconnect(id)),
                Subscription::Displays(id) => ("displays", inner.displays.disconnect(id)),
                Subscription::Backlight(id) => ("backlight", inner.backlight.disconnect(id)),
                Subscription::UserEdit(id) => ("user-edit", inner.control.disconnect(id)),
            };
            if !released {
                warn!("{source} listener was already disconnected");
            }
        }

        inner.awaiting_backlight.set(false);
        inner.overlays.borrow_mut().hide_overlays();
        inner.control.restore();
        inner.restore_log_level();
        info!("brightness controller disabled");
    }

    /// Whether the controller is enabled.
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.get()
    }

    /// Apply a brightness chosen by the user.
    ///
    /// The value is written to the authoritative source; the floor is enforced
    /// when that write comes back as a change notification.
    ///
    /// # Errors
    /// [`DimmerError::InvalidBrightness`] for non-finite values.
    pub fn on_user_adjust(&self, value: f64) -> Result<(), DimmerError> {
        let value = brightness::validate(value)?;
        if self.guard("on_user_adjust") {
            self.inner.on_user_adjust(value);
        }
        Ok(())
    }

    /// Re-read the brightness, enforce the floor and update the overlays.
    pub fn recompute_effective(&self) {
        if self.guard("recompute_effective") {
            self.inner.recompute_effective();
        }
    }

    /// Hand the brightness over to the newly selected source.
    pub fn on_source_mode_change(&self) {
        if self.guard("on_source_mode_change") {
            self.inner.on_use_backlight_change();
        }
    }

    /// Rebuild the overlays for a new `monitors` selection.
    pub fn on_monitor_selection_change(&self) {
        if self.guard("on_monitor_selection_change") {
            self.inner.on_monitors_change();
        }
    }

    /// Rebuild the overlays for a new display layout.
    pub fn on_topology_change(&self) {
        if self.guard("on_topology_change") {
            self.inner.on_monitors_change();
        }
    }

    /// Follow a new hardware level, finishing a deferred enable if needed.
    pub fn on_hardware_change(&self) {
        if self.guard("on_hardware_change") {
            self.inner.on_backlight_change();
        }
    }

    /// Re-apply the `debug` setting to the `log` max level.
    pub fn on_debug_change(&self) {
        if self.guard("on_debug_change") {
            self.inner.on_debug_change();
        }
    }

    /// Brightness from the authoritative source.
    pub fn read_brightness(&self) -> f64 {
        self.inner.read_brightness()
    }

    /// Write `value` to the authoritative source.
    pub fn store_brightness(&self, value: f64) {
        self.inner.store_brightness(value);
    }

    /// The source that is authoritative right now.
    pub fn source_mode(&self) -> SourceMode {
        self.inner.resolve_source().0
    }

    /// Get a snapshot of the controller state.
    pub fn snapshot(&self) -> ControllerSnapshot {
        let inner = &self.inner;
        let overlays = inner.overlays.borrow();
        ControllerSnapshot {
            enabled: inner.enabled.get(),
            awaiting_backlight: inner.awaiting_backlight.get(),
            source_mode: self.source_mode(),
            effective_brightness: inner.read_brightness(),
            opacity: overlays.opacity(),
            overlay_count: overlays.count(),
            live_subscriptions: inner.subscriptions.borrow().len(),
        }
    }

    fn guard(&self, operation: &str) -> bool {
        let enabled = self.inner.enabled.get();
        if !enabled {
            warn!("{operation}() called while disabled, ignoring");
        }
        enabled
    }

    fn subscribe(&self) {
        let inner = &self.inner;
        let mut table = Vec::with_capacity(8);

        let setting_handlers: [(SettingKey, fn(&Inner)); 5] = [
            (SettingKey::MinBrightness, Inner::on_brightness_change),
            (SettingKey::CurrentBrightness, Inner::on_brightness_change),
            (SettingKey::Monitors, Inner::on_monitors_change),
            (SettingKey::UseBacklight, Inner::on_use_backlight_change),
            (SettingKey::Debug, Inner::on_debug_change),
        ];
        for (key, handler) in setting_handlers {
            let id = inner.settings.connect_changed(key, bind(inner, handler));
            table.push(Subscription::Setting(key, id));
        }

        let id = inner
            .displays
            .connect_changed(bind(inner, Inner::on_monitors_change));
        table.push(Subscription::Displays(id));

        let id = inner
            .backlight
            .connect_changed(bind(inner, Inner::on_backlight_change));
        table.push(Subscription::Backlight(id));

        let weak = Rc::downgrade(inner);
        let id = inner.control.connect_user_edit(Box::new(move |value| {
            if let Some(inner) = upgrade_live(&weak) {
                match brightness::validate(value) {
                    Ok(value) => inner.on_user_adjust(value),
                    Err(e) => warn!("ignoring slider value: {e}"),
                }
            }
        }));
        table.push(Subscription::UserEdit(id));

        debug!("subscribed to {} change sources", table.len());
        *inner.subscriptions.borrow_mut() = table;
    }
}

impl Drop for BrightnessController {
    fn drop(&mut self) {
        if self.inner.enabled.get() {
            self.disable();
        }
    }
}

impl std::fmt::Debug for BrightnessController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrightnessController")
            .field("enabled", &self.inner.enabled.get())
            .field("rounding", &self.inner.rounding)
            .field("overlays", &self.inner.overlays)
            .finish_non_exhaustive()
    }
}

/// Wrap a handler so it only runs while the controller is alive and enabled.
fn bind(inner: &Rc<Inner>, handler: fn(&Inner)) -> Box<dyn Fn()> {
    let weak = Rc::downgrade(inner);
    Box::new(move || {
        if let Some(inner) = upgrade_live(&weak) {
            handler(&inner);
        }
    })
}

fn upgrade_live(weak: &Weak<Inner>) -> Option<Rc<Inner>> {
    let inner = weak.upgrade().filter(|inner| inner.enabled.get());
    if inner.is_none() {
        debug!("dropping notification for disabled controller");
    }
    inner
}

impl Inner {
    // =========================================================================
    // Source resolution
    // =========================================================================

    fn use_backlight(&self) -> bool {
        self.settings
            .get_boolean(SettingKey::UseBacklight)
            .unwrap_or_else(|e| {
                warn!("{e}, assuming software brightness");
                false
            })
    }

    fn debug(&self) -> bool {
        self.settings
            .get_boolean(SettingKey::Debug)
            .unwrap_or(false)
    }

    fn min_brightness(&self) -> f64 {
        self.finite_double(SettingKey::MinBrightness, DEFAULT_MIN_BRIGHTNESS)
    }

    fn stored_brightness(&self) -> f64 {
        self.finite_double(SettingKey::CurrentBrightness, DEFAULT_CURRENT_BRIGHTNESS)
    }

    /// Read a brightness setting; unreadable or non-finite values yield `default`.
    fn finite_double(&self, key: SettingKey, default: f64) -> f64 {
        match self.settings.get_double(key) {
            Ok(value) if value.is_finite() => value,
            Ok(value) => {
                warn!("{key} holds {value}, using {default}");
                default
            }
            Err(e) => {
                warn!("{e}, using {default}");
                default
            }
        }
    }

    fn monitors(&self) -> String {
        self.settings
            .get_string(SettingKey::Monitors)
            .unwrap_or_else(|e| {
                warn!("{e}, covering all monitors");
                MonitorSelection::All.as_str().to_string()
            })
    }

    /// The channel's level, with out-of-range reports treated as unavailable.
    fn backlight_level(&self) -> Option<u32> {
        self.backlight
            .level()
            .filter(|level| *level <= MAX_BACKLIGHT_LEVEL)
    }

    /// The authoritative source and the level it was resolved against.
    fn resolve_source(&self) -> (SourceMode, Option<u32>) {
        let level = self.backlight_level();
        let mode = SourceMode::resolve(self.use_backlight(), level.is_some());
        (mode, level)
    }

    fn read_brightness(&self) -> f64 {
        match self.resolve_source() {
            (SourceMode::UseBacklight, Some(level)) => {
                let value = level_to_brightness(level);
                debug!("read_brightness() by backlight = {value} <- {level}");
                value
            }
            _ => {
                let value = self.stored_brightness();
                debug!("read_brightness() by setting = {value}");
                value
            }
        }
    }

    fn store_brightness(&self, value: f64) {
        if let (SourceMode::UseBacklight, Some(_)) = self.resolve_source() {
            let level = self.rounding.to_level(value);
            debug!("store_brightness({value}) by backlight -> {level}");
            match self.backlight.set_level(level) {
                Ok(()) => return,
                Err(e) => warn!("backlight write failed, using setting: {e}"),
            }
        }

        debug!("store_brightness({value}) by setting");
        if let Err(e) = self
            .settings
            .set_double(SettingKey::CurrentBrightness, value)
        {
            error!("cannot store brightness: {e}");
        }
    }

    // =========================================================================
    // Reactions
    // =========================================================================

    fn recompute_effective(&self) {
        let current = self.read_brightness();
        let min = self.min_brightness();
        debug!("recompute_effective(): current-brightness={current}, min-brightness={min}");

        if current < min {
            if self.enforcing_floor.get() {
                warn!("brightness source kept {current} below floor {min}");
                return;
            }
            if self.resolve_source().0 == SourceMode::UseSoftwareSetting {
                self.control.set_value(min);
            }
            // The write notifies us again; that pass applies the overlays.
            self.enforcing_floor.set(true);
            self.store_brightness(min);
            self.enforcing_floor.set(false);
            return;
        }

        match opacity_for(current) {
            None => self.overlays.borrow_mut().hide_overlays(),
            Some(opacity) => {
                debug!("recompute_effective(): opacity={opacity}");
                let monitors = self.monitors();
                let shown = self.overlays.borrow_mut().show_overlays(
                    opacity,
                    &monitors,
                    &*self.displays,
                );
                if let Err(e) = shown {
                    error!("show_overlays(): {e}");
                }
            }
        }
    }

    /// Apply the current brightness and move the slider to match.
    fn sync(&self) {
        self.recompute_effective();
        self.control.set_value(self.read_brightness());
    }

    fn on_user_adjust(&self, value: f64) {
        debug!("on_user_adjust({value})");
        self.store_brightness(value);
    }

    fn on_brightness_change(&self) {
        self.recompute_effective();
    }

    fn on_monitors_change(&self) {
        debug!("on_monitors_change()");
        self.overlays.borrow_mut().hide_overlays();
        self.recompute_effective();
    }

    fn on_use_backlight_change(&self) {
        debug!("on_use_backlight_change()");
        if self.use_backlight() {
            self.store_brightness(self.stored_brightness());
        } else if let Some(level) = self.backlight_level() {
            self.store_brightness(level_to_brightness(level));
        }
        self.awaiting_backlight.set(false);
        self.sync();
    }

    fn on_backlight_change(&self) {
        debug!("on_backlight_change()");
        if self.awaiting_backlight.get() {
            if self.backlight_level().is_none() {
                debug!("backlight still unavailable");
                return;
            }
            info!("backlight reported, finishing initialization");
            self.awaiting_backlight.set(false);
        }
        self.sync();
    }

    fn on_debug_change(&self) {
        self.apply_debug();
        info!("debug = {}", self.debug());
    }

    /// Raise the `log` max level to `Debug` while `debug` is on.
    fn apply_debug(&self) {
        if !self.debug() {
            self.restore_log_level();
            return;
        }
        let current = log::max_level();
        if self.host_log_level.get().is_none() && current < LevelFilter::Debug {
            self.host_log_level.set(Some(current));
            log::set_max_level(LevelFilter::Debug);
        }
    }

    fn restore_log_level(&self) {
        if let Some(level) = self.host_log_level.take() {
            log::set_max_level(level);
        }
    }
}
