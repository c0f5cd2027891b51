use std::rc::Rc;

use iced::keyboard::{self, Event as KeyboardEvent, Key};
use iced::widget::{button, column, container, row, slider, text, toggler};
use iced::{Element, Subscription, Task, Theme};
use log::{info, warn};
use softdim_core::{
    BacklightChannel, BrightnessControl, BrightnessController, Collaborators, ControllerOptions,
    DisplayRegion, DisplayTopology, MemorySettings, MonitorSelection, RecordingOverlayFactory,
    SettingKey, SettingsStore, SimulatedBacklight, SimulatedControl, SimulatedDisplays,
};

/// Brightness step for the keyboard shortcuts, in percent.
const STEP_PERCENT: i32 = 5;

pub fn main() -> iced::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    iced::application(SoftdimApp::default, SoftdimApp::update, SoftdimApp::view)
        .title("Softdim - Software Display Dimming")
        .subscription(SoftdimApp::subscription)
        .theme(SoftdimApp::theme)
        .run()
}

/// The control panel hosts the controller against simulated collaborators:
/// the panel slider, a hot-pluggable display layout and a backlight that can
/// be connected, disconnected or moved by "hardware keys".
struct SoftdimApp {
    settings: Rc<MemorySettings>,
    backlight: Rc<SimulatedBacklight>,
    displays: Rc<SimulatedDisplays>,
    control: Rc<SimulatedControl>,
    overlays: RecordingOverlayFactory,
    controller: BrightnessController,
    status_message: Option<String>,
}

#[derive(Debug, Clone)]
enum Message {
    // Panel slider
    BrightnessChanged(i32),
    IncreaseBrightness,
    DecreaseBrightness,

    // Settings
    MinBrightnessChanged(i32),
    SetMonitors(MonitorSelection),
    ToggleBacklight(bool),
    ToggleDebug(bool),

    // Simulated hardware
    BacklightConnected(bool),
    HardwareLevelChanged(i32),
    PlugMonitor,
    UnplugMonitor,

    // Lifecycle
    ToggleEnabled(bool),

    // Keyboard event
    KeyboardEvent(KeyboardEvent),
}

impl Default for SoftdimApp {
    fn default() -> Self {
        let settings = Rc::new(MemorySettings::new());
        let backlight = Rc::new(SimulatedBacklight::new(Some(100)));
        let displays = Rc::new(SimulatedDisplays::new(vec![DisplayRegion::new(
            0, 0, 1920, 1080, true,
        )]));
        let control = Rc::new(SimulatedControl::new());
        let overlays = RecordingOverlayFactory::new();

        let controller = BrightnessController::new(
            Collaborators {
                settings: settings.clone(),
                backlight: backlight.clone(),
                displays: displays.clone(),
                control: control.clone(),
                overlays: Box::new(overlays.clone()),
            },
            ControllerOptions::default(),
        );

        let mut app = Self {
            settings,
            backlight,
            displays,
            control,
            overlays,
            controller,
            status_message: None,
        };

        if let Err(e) = app.controller.enable() {
            app.status_message = Some(format!("Failed to enable: {}", e));
        }

        app
    }
}

impl SoftdimApp {
    fn update(&mut self, message: Message) -> Task<Message> {
        // Clear previous errors on new actions
        if !matches!(message, Message::KeyboardEvent(_)) {
            self.status_message = None;
        }

        match message {
            Message::BrightnessChanged(percent) => {
                self.control.drag(f64::from(percent) / 100.0);
            }

            Message::IncreaseBrightness => {
                let new_value = (self.slider_percent() + STEP_PERCENT).min(100);
                return self.update(Message::BrightnessChanged(new_value));
            }

            Message::DecreaseBrightness => {
                let new_value = (self.slider_percent() - STEP_PERCENT).max(0);
                return self.update(Message::BrightnessChanged(new_value));
            }

            Message::MinBrightnessChanged(percent) => {
                let value = f64::from(percent) / 100.0;
                if let Err(e) = self.settings.set_double(SettingKey::MinBrightness, value) {
                    self.status_message = Some(format!("Setting error: {}", e));
                }
            }

            Message::SetMonitors(selection) => {
                if let Err(e) = self
                    .settings
                    .set_string(SettingKey::Monitors, selection.as_str())
                {
                    self.status_message = Some(format!("Setting error: {}", e));
                }
            }

            Message::ToggleBacklight(enabled) => {
                if let Err(e) = self.settings.set_boolean(SettingKey::UseBacklight, enabled) {
                    self.status_message = Some(format!("Setting error: {}", e));
                }
            }

            Message::ToggleDebug(enabled) => {
                if let Err(e) = self.settings.set_boolean(SettingKey::Debug, enabled) {
                    self.status_message = Some(format!("Setting error: {}", e));
                }
            }

            Message::BacklightConnected(connected) => {
                let level = connected.then(|| self.backlight.level().unwrap_or(100));
                info!("simulated backlight connected={}", connected);
                self.backlight.report(level);
            }

            Message::HardwareLevelChanged(level) => {
                if self.backlight.level().is_some() {
                    self.backlight.report(Some(level.clamp(0, 100) as u32));
                } else {
                    self.status_message = Some("Backlight is disconnected".to_string());
                }
            }

            Message::PlugMonitor => {
                let regions = self.displays.regions();
                let x = regions
                    .iter()
                    .map(|r| r.x + r.width as i32)
                    .max()
                    .unwrap_or(0);
                self.displays
                    .add(DisplayRegion::new(x, 0, 2560, 1440, regions.is_empty()));
            }

            Message::UnplugMonitor => {
                let count = self.displays.regions().len();
                if count > 1 {
                    self.displays.remove(count - 1);
                } else {
                    warn!("refusing to unplug the last display");
                    self.status_message = Some("Cannot unplug the built-in display".to_string());
                }
            }

            Message::ToggleEnabled(enabled) => {
                if enabled {
                    if let Err(e) = self.controller.enable() {
                        self.status_message = Some(format!("Failed to enable: {}", e));
                    }
                } else {
                    self.controller.disable();
                }
            }

            Message::KeyboardEvent(event) => {
                if let KeyboardEvent::KeyPressed { key, modifiers, .. } = event {
                    if modifiers.control() && modifiers.shift() {
                        match key.as_ref() {
                            Key::Character(c) if c == "." || c == ">" => {
                                return self.update(Message::IncreaseBrightness);
                            }
                            Key::Character(c) if c == "," || c == "<" => {
                                return self.update(Message::DecreaseBrightness);
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        Task::none()
    }

    fn view(&self) -> Element<'_, Message> {
        let snapshot = self.controller.snapshot();
        let title = text("Softdim - Software Display Dimming").size(24);

        // Error/status message
        let status = if let Some(ref msg) = self.status_message {
            text(msg).size(14)
        } else {
            text("").size(14)
        };

        let lifecycle = toggler(snapshot.enabled)
            .label("Dimming enabled")
            .on_toggle(Message::ToggleEnabled);

        // Panel slider
        let brightness_section = column![
            text(format!(
                "Brightness: {}% ({:?})",
                self.slider_percent(),
                snapshot.source_mode
            ))
            .size(16),
            slider(0..=100, self.slider_percent(), Message::BrightnessChanged).step(1),
        ]
        .spacing(5);

        let min_percent = self
            .settings
            .get_double(SettingKey::MinBrightness)
            .map(to_percent)
            .unwrap_or(0);
        let min_section = column![
            text(format!("Minimum brightness: {}%", min_percent)).size(14),
            slider(0..=100, min_percent, Message::MinBrightnessChanged).step(1),
        ]
        .spacing(5);

        let current_monitors = self
            .settings
            .get_string(SettingKey::Monitors)
            .ok()
            .and_then(|s| s.parse::<MonitorSelection>().ok());
        let monitor_buttons = row![
            monitors_button("All", MonitorSelection::All, current_monitors),
            monitors_button("Built-in", MonitorSelection::BuiltinOnly, current_monitors),
            monitors_button("External", MonitorSelection::ExternalOnly, current_monitors),
        ]
        .spacing(10);

        let use_backlight = self
            .settings
            .get_boolean(SettingKey::UseBacklight)
            .unwrap_or(false);
        let debug = self.settings.get_boolean(SettingKey::Debug).unwrap_or(false);
        let toggles = column![
            toggler(use_backlight)
                .label("Use backlight")
                .on_toggle(Message::ToggleBacklight),
            toggler(debug).label("Debug logging").on_toggle(Message::ToggleDebug),
        ]
        .spacing(5);

        // Simulated hardware
        let level = self.backlight.level();
        let hardware_section = column![
            toggler(level.is_some())
                .label("Backlight connected")
                .on_toggle(Message::BacklightConnected),
            text(match level {
                Some(level) => format!("Hardware level: {}", level),
                None => "Hardware level: unavailable".to_string(),
            })
            .size(14),
            slider(
                0..=100,
                level.map_or(0, |l| l as i32),
                Message::HardwareLevelChanged
            )
            .step(1),
            row![
                button("Plug monitor").on_press(Message::PlugMonitor),
                button("Unplug monitor").on_press(Message::UnplugMonitor),
            ]
            .spacing(10),
        ]
        .spacing(5);

        let overlay_lines = self
            .overlays
            .live()
            .into_iter()
            .fold(column![].spacing(2), |col, overlay| {
                let region = overlay
                    .region
                    .map_or_else(|| "unplaced".to_string(), |r| r.to_string());
                col.push(text(format!("#{} {} alpha={}", overlay.id, region, overlay.opacity)).size(12))
            });
        let overlay_section = column![
            text(format!(
                "Overlays: {} on {} display(s)",
                snapshot.overlay_count,
                self.displays.regions().len()
            ))
            .size(16),
            overlay_lines,
        ]
        .spacing(5);

        // Keyboard shortcuts hint
        let shortcuts_hint = text("Shortcuts: Ctrl+Shift+< / > (brightness)").size(12);

        // Main layout
        let content = column![
            title,
            status,
            lifecycle,
            brightness_section,
            min_section,
            text("Monitors:").size(16),
            monitor_buttons,
            toggles,
            text("Simulated hardware:").size(16),
            hardware_section,
            overlay_section,
            shortcuts_hint,
        ]
        .spacing(15)
        .padding(20);

        container(content).into()
    }

    fn subscription(&self) -> Subscription<Message> {
        keyboard::listen().map(Message::KeyboardEvent)
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }

    fn slider_percent(&self) -> i32 {
        to_percent(self.control.value())
    }
}

fn to_percent(value: f64) -> i32 {
    (value * 100.0).round() as i32
}

fn monitors_button(
    label: &str,
    selection: MonitorSelection,
    current: Option<MonitorSelection>,
) -> Element<'_, Message> {
    let btn = button(text(label));
    if current == Some(selection) {
        // Selected state - don't allow clicking
        btn.into()
    } else {
        btn.on_press(Message::SetMonitors(selection)).into()
    }
}
