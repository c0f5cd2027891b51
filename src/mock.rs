//! In-memory collaborators for testing and simulation.
//!
//! These let the controller run without a desktop shell, a settings daemon or
//! a real backlight. Like the shell they stand in for, they deliver every
//! notification synchronously from inside the mutating call.
//!
//! # Example
//!
//! ```
//! use softdim_core::{MemorySettings, SettingKey, SettingsStore};
//!
//! let settings = MemorySettings::new();
//! settings.set_double(SettingKey::CurrentBrightness, 0.4).unwrap();
//! assert_eq!(settings.get_double(SettingKey::CurrentBrightness).unwrap(), 0.4);
//! ```

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::backlight::BacklightChannel;
use crate::brightness::MAX_BACKLIGHT_LEVEL;
use crate::callbacks::{CallbackId, Callbacks};
use crate::control::BrightnessControl;
use crate::error::DimmerError;
use crate::overlay::{OverlayFactory, OverlaySurface};
use crate::settings::{
    DEFAULT_CURRENT_BRIGHTNESS, DEFAULT_MIN_BRIGHTNESS, MonitorSelection, SettingKey,
    SettingsStore,
};
use crate::topology::{DisplayRegion, DisplayTopology};

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Double(f64),
    Boolean(bool),
    String(String),
}

/// A settings store held in memory.
#[derive(Debug)]
pub struct MemorySettings {
    values: RefCell<BTreeMap<SettingKey, Value>>,
    writes: RefCell<BTreeMap<SettingKey, usize>>,
    changed: Callbacks<SettingKey>,
}

impl MemorySettings {
    /// Create a store holding the default value of every key.
    pub fn new() -> Self {
        let values = BTreeMap::from([
            (SettingKey::MinBrightness, Value::Double(DEFAULT_MIN_BRIGHTNESS)),
            (
                SettingKey::CurrentBrightness,
                Value::Double(DEFAULT_CURRENT_BRIGHTNESS),
            ),
            (
                SettingKey::Monitors,
                Value::String(MonitorSelection::default().as_str().to_string()),
            ),
            (SettingKey::UseBacklight, Value::Boolean(false)),
            (SettingKey::Debug, Value::Boolean(false)),
        ]);
        Self {
            values: RefCell::new(values),
            writes: RefCell::new(BTreeMap::new()),
            changed: Callbacks::new(),
        }
    }

    /// Number of writes to `key` since creation.
    pub fn write_count(&self, key: SettingKey) -> usize {
        self.writes.borrow().get(&key).copied().unwrap_or(0)
    }

    /// Number of connected listeners across all keys.
    pub fn listener_count(&self) -> usize {
        self.changed.len()
    }

    fn read(&self, key: SettingKey) -> Value {
        // Every key is seeded in `new`, and writes keep the kind.
        self.values
            .borrow()
            .get(&key)
            .cloned()
            .unwrap_or(Value::Boolean(false))
    }

    fn write(&self, key: SettingKey, value: Value) {
        self.values.borrow_mut().insert(key, value);
        *self.writes.borrow_mut().entry(key).or_insert(0) += 1;
        self.changed.notify(&key);
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for MemorySettings {
    fn get_double(&self, key: SettingKey) -> Result<f64, DimmerError> {
        match self.read(key) {
            Value::Double(value) => Ok(value),
            _ => Err(key.type_error()),
        }
    }

    fn set_double(&self, key: SettingKey, value: f64) -> Result<(), DimmerError> {
        match self.read(key) {
            Value::Double(_) => {
                self.write(key, Value::Double(value));
                Ok(())
            }
            _ => Err(key.type_error()),
        }
    }

    fn get_boolean(&self, key: SettingKey) -> Result<bool, DimmerError> {
        match self.read(key) {
            Value::Boolean(value) => Ok(value),
            _ => Err(key.type_error()),
        }
    }

    fn set_boolean(&self, key: SettingKey, value: bool) -> Result<(), DimmerError> {
        match self.read(key) {
            Value::Boolean(_) => {
                self.write(key, Value::Boolean(value));
                Ok(())
            }
            _ => Err(key.type_error()),
        }
    }

    fn get_string(&self, key: SettingKey) -> Result<String, DimmerError> {
        match self.read(key) {
            Value::String(value) => Ok(value),
            _ => Err(key.type_error()),
        }
    }

    fn set_string(&self, key: SettingKey, value: &str) -> Result<(), DimmerError> {
        match self.read(key) {
            Value::String(_) => {
                self.write(key, Value::String(value.to_string()));
                Ok(())
            }
            _ => Err(key.type_error()),
        }
    }

    fn connect_changed(&self, key: SettingKey, callback: Box<dyn Fn()>) -> CallbackId {
        self.changed.register(move |changed: &SettingKey| {
            if *changed == key {
                callback();
            }
        })
    }

    fn disconnect(&self, id: CallbackId) -> bool {
        self.changed.unregister(id)
    }
}

// =============================================================================
// Backlight
// =============================================================================

/// A backlight whose level is driven by the test or the simulator.
#[derive(Debug, Default)]
pub struct SimulatedBacklight {
    level: Cell<Option<u32>>,
    writes: Cell<usize>,
    failing: Cell<bool>,
    changed: Callbacks<()>,
}

impl SimulatedBacklight {
    /// Create a channel reporting `level`, or not yet connected for `None`.
    pub fn new(level: Option<u32>) -> Self {
        Self {
            level: Cell::new(level),
            writes: Cell::new(0),
            failing: Cell::new(false),
            changed: Callbacks::new(),
        }
    }

    /// Simulate the hardware reporting a new level (or going away).
    pub fn report(&self, level: Option<u32>) {
        self.level.set(level);
        self.changed.notify(&());
    }

    /// Make every write fail while the level keeps being reported.
    pub fn fail_writes(&self, failing: bool) {
        self.failing.set(failing);
    }

    /// Number of successful [`set_level`](BacklightChannel::set_level) calls.
    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    /// Number of connected listeners.
    pub fn listener_count(&self) -> usize {
        self.changed.len()
    }
}

impl BacklightChannel for SimulatedBacklight {
    fn level(&self) -> Option<u32> {
        self.level.get()
    }

    fn set_level(&self, level: u32) -> Result<(), DimmerError> {
        if self.level.get().is_none() || self.failing.get() {
            return Err(DimmerError::BacklightUnavailable);
        }
        if level > MAX_BACKLIGHT_LEVEL {
            return Err(DimmerError::BacklightOutOfRange(level));
        }
        self.writes.set(self.writes.get() + 1);
        self.report(Some(level));
        Ok(())
    }

    fn connect_changed(&self, callback: Box<dyn Fn()>) -> CallbackId {
        self.changed.register(move |_| callback())
    }

    fn disconnect(&self, id: CallbackId) -> bool {
        self.changed.unregister(id)
    }
}

// =============================================================================
// Displays
// =============================================================================

/// A display layout that can be hot-plugged at will.
#[derive(Debug, Default)]
pub struct SimulatedDisplays {
    regions: RefCell<Vec<DisplayRegion>>,
    changed: Callbacks<()>,
}

impl SimulatedDisplays {
    /// Create a layout with the given regions.
    pub fn new(regions: Vec<DisplayRegion>) -> Self {
        Self {
            regions: RefCell::new(regions),
            changed: Callbacks::new(),
        }
    }

    /// Plug in a display.
    pub fn add(&self, region: DisplayRegion) {
        self.regions.borrow_mut().push(region);
        self.changed.notify(&());
    }

    /// Unplug the display at `index`, returning it.
    pub fn remove(&self, index: usize) -> Option<DisplayRegion> {
        let removed = {
            let mut regions = self.regions.borrow_mut();
            (index < regions.len()).then(|| regions.remove(index))
        };
        if removed.is_some() {
            self.changed.notify(&());
        }
        removed
    }

    /// Replace the whole layout.
    pub fn set_regions(&self, regions: Vec<DisplayRegion>) {
        *self.regions.borrow_mut() = regions;
        self.changed.notify(&());
    }

    /// Number of connected listeners.
    pub fn listener_count(&self) -> usize {
        self.changed.len()
    }
}

impl DisplayTopology for SimulatedDisplays {
    fn regions(&self) -> Vec<DisplayRegion> {
        self.regions.borrow().clone()
    }

    fn connect_changed(&self, callback: Box<dyn Fn()>) -> CallbackId {
        self.changed.register(move |_| callback())
    }

    fn disconnect(&self, id: CallbackId) -> bool {
        self.changed.unregister(id)
    }
}

// =============================================================================
// Overlays
// =============================================================================

/// State of one live overlay as seen by [`RecordingOverlayFactory`].
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRecord {
    /// Creation order, starting at 0.
    pub id: u64,
    /// Geometry, once set.
    pub region: Option<DisplayRegion>,
    /// Stacking position.
    pub z_position: f32,
    /// Current alpha.
    pub opacity: u8,
}

#[derive(Debug, Default)]
struct OverlayLedger {
    live: BTreeMap<u64, OverlayRecord>,
    created: usize,
    destroyed: usize,
}

/// An overlay factory that records what would be painted.
///
/// Clones share the same ledger, so a test can keep one handle while the
/// controller owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingOverlayFactory {
    ledger: Rc<RefCell<OverlayLedger>>,
}

impl RecordingOverlayFactory {
    /// Create a factory with an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Live overlays in creation order.
    pub fn live(&self) -> Vec<OverlayRecord> {
        self.ledger.borrow().live.values().cloned().collect()
    }

    /// Surfaces created since construction.
    pub fn created_total(&self) -> usize {
        self.ledger.borrow().created
    }

    /// Surfaces destroyed since construction.
    pub fn destroyed_total(&self) -> usize {
        self.ledger.borrow().destroyed
    }
}

impl OverlayFactory for RecordingOverlayFactory {
    fn create(&self) -> Box<dyn OverlaySurface> {
        let mut ledger = self.ledger.borrow_mut();
        let id = ledger.created as u64;
        ledger.created += 1;
        ledger.live.insert(
            id,
            OverlayRecord {
                id,
                region: None,
                z_position: 0.0,
                opacity: 0,
            },
        );
        Box::new(RecordedSurface {
            id,
            ledger: self.ledger.clone(),
        })
    }
}

struct RecordedSurface {
    id: u64,
    ledger: Rc<RefCell<OverlayLedger>>,
}

impl RecordedSurface {
    fn update(&self, apply: impl FnOnce(&mut OverlayRecord)) {
        if let Some(record) = self.ledger.borrow_mut().live.get_mut(&self.id) {
            apply(record);
        }
    }
}

impl OverlaySurface for RecordedSurface {
    fn set_geometry(&mut self, region: &DisplayRegion) {
        let region = *region;
        self.update(|record| record.region = Some(region));
    }

    fn set_z_position(&mut self, z: f32) {
        self.update(|record| record.z_position = z);
    }

    fn set_opacity(&mut self, opacity: u8) {
        self.update(|record| record.opacity = opacity);
    }
}

impl Drop for RecordedSurface {
    fn drop(&mut self) {
        let mut ledger = self.ledger.borrow_mut();
        if ledger.live.remove(&self.id).is_some() {
            ledger.destroyed += 1;
        }
    }
}

// =============================================================================
// Slider
// =============================================================================

/// A brightness slider living in an imaginary panel menu.
#[derive(Debug)]
pub struct SimulatedControl {
    slot_present: bool,
    installed: Cell<bool>,
    value: Cell<f64>,
    user_edit: Callbacks<f64>,
}

impl SimulatedControl {
    /// Create a control whose menu has a stock brightness item to replace.
    pub fn new() -> Self {
        Self {
            slot_present: true,
            installed: Cell::new(false),
            value: Cell::new(DEFAULT_CURRENT_BRIGHTNESS),
            user_edit: Callbacks::new(),
        }
    }

    /// Create a control whose menu lacks the stock brightness item.
    pub fn without_slot() -> Self {
        Self {
            slot_present: false,
            ..Self::new()
        }
    }

    /// Simulate the user dragging the slider to `value`.
    pub fn drag(&self, value: f64) {
        self.value.set(value);
        self.user_edit.notify(&value);
    }

    /// Whether our control currently replaces the stock item.
    pub fn is_installed(&self) -> bool {
        self.installed.get()
    }

    /// Number of connected listeners.
    pub fn listener_count(&self) -> usize {
        self.user_edit.len()
    }
}

impl Default for SimulatedControl {
    fn default() -> Self {
        Self::new()
    }
}

impl BrightnessControl for SimulatedControl {
    fn install(&self) -> Result<(), DimmerError> {
        if !self.slot_present {
            return Err(DimmerError::SlotNotFound);
        }
        self.installed.set(true);
        Ok(())
    }

    fn restore(&self) {
        self.installed.set(false);
    }

    fn value(&self) -> f64 {
        self.value.get()
    }

    fn set_value(&self, value: f64) {
        self.value.set(value);
    }

    fn connect_user_edit(&self, callback: Box<dyn Fn(f64)>) -> CallbackId {
        self.user_edit.register(move |value: &f64| callback(*value))
    }

    fn disconnect(&self, id: CallbackId) -> bool {
        self.user_edit.unregister(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_reject_wrong_type() {
        let settings = MemorySettings::new();
        assert!(matches!(
            settings.get_boolean(SettingKey::MinBrightness),
            Err(DimmerError::SettingType { key: "min-brightness", expected: "double" })
        ));
        assert!(settings.set_double(SettingKey::Monitors, 1.0).is_err());
        assert_eq!(settings.write_count(SettingKey::Monitors), 0);
    }

    #[test]
    fn test_settings_notify_only_matching_key() {
        let settings = MemorySettings::new();
        let hits = Rc::new(Cell::new(0));

        let hits_clone = hits.clone();
        let id = settings.connect_changed(
            SettingKey::MinBrightness,
            Box::new(move || hits_clone.set(hits_clone.get() + 1)),
        );

        settings.set_double(SettingKey::CurrentBrightness, 0.5).unwrap();
        settings.set_double(SettingKey::MinBrightness, 0.2).unwrap();
        assert_eq!(hits.get(), 1);

        assert!(settings.disconnect(id));
        assert_eq!(settings.listener_count(), 0);
    }

    #[test]
    fn test_backlight_rejects_writes_while_unavailable() {
        let backlight = SimulatedBacklight::new(None);
        assert!(matches!(
            backlight.set_level(50),
            Err(DimmerError::BacklightUnavailable)
        ));

        backlight.report(Some(40));
        assert!(matches!(
            backlight.set_level(101),
            Err(DimmerError::BacklightOutOfRange(101))
        ));
        backlight.set_level(60).unwrap();
        assert_eq!(backlight.level(), Some(60));
        assert_eq!(backlight.write_count(), 1);
    }

    #[test]
    fn test_backlight_failing_writes_keep_level() {
        let backlight = SimulatedBacklight::new(Some(70));
        backlight.fail_writes(true);
        assert!(backlight.set_level(30).is_err());
        assert_eq!(backlight.level(), Some(70));
        assert_eq!(backlight.write_count(), 0);

        backlight.fail_writes(false);
        backlight.set_level(30).unwrap();
        assert_eq!(backlight.level(), Some(30));
    }

    #[test]
    fn test_displays_remove_out_of_range() {
        let displays = SimulatedDisplays::new(vec![DisplayRegion::new(0, 0, 800, 600, true)]);
        assert_eq!(displays.remove(3), None);
        assert!(displays.remove(0).is_some());
        assert!(displays.regions().is_empty());
    }

    #[test]
    fn test_control_without_slot() {
        let control = SimulatedControl::without_slot();
        assert!(matches!(control.install(), Err(DimmerError::SlotNotFound)));
        assert!(!control.is_installed());
    }
}
