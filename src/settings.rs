//! Persisted configuration keys and the settings store interface.

use std::fmt;
use std::str::FromStr;

use crate::callbacks::CallbackId;
use crate::error::DimmerError;
use crate::topology::DisplayRegion;

/// Default floor for the effective brightness.
pub const DEFAULT_MIN_BRIGHTNESS: f64 = 0.1;
/// Default software brightness (no dimming).
pub const DEFAULT_CURRENT_BRIGHTNESS: f64 = 1.0;

/// A key in the flat settings store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingKey {
    /// `min-brightness`: floor enforced by the controller.
    MinBrightness,
    /// `current-brightness`: brightness used in software mode.
    CurrentBrightness,
    /// `monitors`: which displays receive an overlay.
    Monitors,
    /// `use-backlight`: read and write the hardware backlight.
    UseBacklight,
    /// `debug`: verbose logging.
    Debug,
}

/// Value type held by a [`SettingKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    /// A float.
    Double,
    /// A boolean.
    Boolean,
    /// A string.
    String,
}

impl SettingKey {
    /// Every key, in schema order.
    pub const ALL: [Self; 5] = [
        Self::MinBrightness,
        Self::CurrentBrightness,
        Self::Monitors,
        Self::UseBacklight,
        Self::Debug,
    ];

    /// The key name as stored.
    pub fn name(self) -> &'static str {
        match self {
            Self::MinBrightness => "min-brightness",
            Self::CurrentBrightness => "current-brightness",
            Self::Monitors => "monitors",
            Self::UseBacklight => "use-backlight",
            Self::Debug => "debug",
        }
    }

    /// The value type this key holds.
    pub fn kind(self) -> SettingKind {
        match self {
            Self::MinBrightness | Self::CurrentBrightness => SettingKind::Double,
            Self::Monitors => SettingKind::String,
            Self::UseBacklight | Self::Debug => SettingKind::Boolean,
        }
    }

    /// Build the error for accessing this key with the wrong type.
    pub fn type_error(self) -> DimmerError {
        DimmerError::SettingType {
            key: self.name(),
            expected: match self.kind() {
                SettingKind::Double => "double",
                SettingKind::Boolean => "boolean",
                SettingKind::String => "string",
            },
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SettingKey {
    type Err = DimmerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.name() == s)
            .ok_or_else(|| DimmerError::UnknownSettingKey(s.to_string()))
    }
}

/// Which display regions receive an overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MonitorSelection {
    /// Every display.
    #[default]
    All,
    /// Only the primary (built-in) display.
    BuiltinOnly,
    /// Every display except the primary one.
    ExternalOnly,
}

impl MonitorSelection {
    /// The value as stored in the `monitors` key.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "All",
            Self::BuiltinOnly => "Built-in",
            Self::ExternalOnly => "External",
        }
    }

    /// Pick the regions this selection covers, preserving topology order.
    pub fn select(self, regions: &[DisplayRegion]) -> Vec<DisplayRegion> {
        regions
            .iter()
            .filter(|region| match self {
                Self::All => true,
                Self::BuiltinOnly => region.is_primary,
                Self::ExternalOnly => !region.is_primary,
            })
            .copied()
            .collect()
    }
}

impl fmt::Display for MonitorSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitorSelection {
    type Err = DimmerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "All" => Ok(Self::All),
            "Built-in" => Ok(Self::BuiltinOnly),
            "External" => Ok(Self::ExternalOnly),
            other => Err(DimmerError::UnknownMonitorSelection(other.to_string())),
        }
    }
}

/// A flat key-value settings store with per-key change notification.
///
/// Setters notify the key's listeners synchronously, which may re-enter the
/// caller. Implementations must not hold internal borrows while notifying.
pub trait SettingsStore {
    /// Read a float key.
    fn get_double(&self, key: SettingKey) -> Result<f64, DimmerError>;

    /// Write a float key.
    fn set_double(&self, key: SettingKey, value: f64) -> Result<(), DimmerError>;

    /// Read a boolean key.
    fn get_boolean(&self, key: SettingKey) -> Result<bool, DimmerError>;

    /// Write a boolean key.
    fn set_boolean(&self, key: SettingKey, value: bool) -> Result<(), DimmerError>;

    /// Read a string key.
    fn get_string(&self, key: SettingKey) -> Result<String, DimmerError>;

    /// Write a string key.
    fn set_string(&self, key: SettingKey, value: &str) -> Result<(), DimmerError>;

    /// Call `callback` whenever `key` is written.
    fn connect_changed(&self, key: SettingKey, callback: Box<dyn Fn()>) -> CallbackId;

    /// Remove a listener added with [`connect_changed`](Self::connect_changed).
    fn disconnect(&self, id: CallbackId) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: i32, is_primary: bool) -> DisplayRegion {
        DisplayRegion {
            x,
            y: 0,
            width: 1920,
            height: 1080,
            is_primary,
        }
    }

    #[test]
    fn test_key_names_round_trip() {
        for key in SettingKey::ALL {
            assert_eq!(key.name().parse::<SettingKey>().unwrap(), key);
        }
        assert!(matches!(
            "brightness".parse::<SettingKey>(),
            Err(DimmerError::UnknownSettingKey(_))
        ));
    }

    #[test]
    fn test_monitor_selection_parse() {
        assert_eq!(
            "Built-in".parse::<MonitorSelection>().unwrap(),
            MonitorSelection::BuiltinOnly
        );
        assert_eq!(
            "External".parse::<MonitorSelection>().unwrap(),
            MonitorSelection::ExternalOnly
        );
        assert!(matches!(
            "Internal".parse::<MonitorSelection>(),
            Err(DimmerError::UnknownMonitorSelection(value)) if value == "Internal"
        ));
    }

    #[test]
    fn test_monitor_selection_select() {
        let regions = [region(0, false), region(1920, true), region(3840, false)];

        assert_eq!(MonitorSelection::All.select(&regions).len(), 3);
        assert_eq!(
            MonitorSelection::BuiltinOnly.select(&regions),
            vec![region(1920, true)]
        );
        assert_eq!(
            MonitorSelection::ExternalOnly.select(&regions),
            vec![region(0, false), region(3840, false)]
        );
    }

    #[test]
    fn test_builtin_without_primary_is_empty() {
        let regions = [region(0, false)];
        assert!(MonitorSelection::BuiltinOnly.select(&regions).is_empty());
    }
}
