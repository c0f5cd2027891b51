//! Example: drive a simulated dimming session.
//!
//! Run with: `RUST_LOG=debug cargo run --example dim_session`

use std::rc::Rc;

use softdim_core::{
    BrightnessController, Collaborators, ControllerOptions, DimmerError, DisplayRegion,
    MemorySettings, RecordingOverlayFactory, SettingKey, SettingsStore, SimulatedBacklight,
    SimulatedControl, SimulatedDisplays,
};

fn main() -> Result<(), DimmerError> {
    // Initialize logging (optional)
    env_logger::init();

    let settings = Rc::new(MemorySettings::new());
    let backlight = Rc::new(SimulatedBacklight::new(None));
    let displays = Rc::new(SimulatedDisplays::new(vec![DisplayRegion::new(
        0, 0, 1920, 1080, true,
    )]));
    let control = Rc::new(SimulatedControl::new());
    let overlays = RecordingOverlayFactory::new();

    // Use the hardware backlight once it shows up
    settings.set_boolean(SettingKey::UseBacklight, true)?;

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
    controller.enable()?;
    println!("Enabled: {:?}", controller.snapshot());

    // The backlight connects late
    backlight.report(Some(60));
    println!("Backlight connected: {:?}", controller.snapshot());

    // Drag the slider below what the panel can do on its own
    control.drag(0.2);
    println!("Dimmed: {:?}", overlays.live());

    // Plug in an external monitor
    displays.add(DisplayRegion::new(1920, 0, 2560, 1440, false));
    println!("Hot-plugged: {:?}", overlays.live());

    // Switch back to the software setting
    settings.set_boolean(SettingKey::UseBacklight, false)?;
    println!(
        "Software mode: current-brightness={}",
        settings.get_double(SettingKey::CurrentBrightness)?
    );

    controller.disable();
    println!("Disabled, overlays left: {}", overlays.live().len());

    Ok(())
}
