//! # Operator input handling
//!
//! Maps gamepad events onto the actions the control loop performs:
//!
//! | Input | Action |
//! |---|---|
//! | `+` | start recording |
//! | `-` | stop recording |
//! | Home | reset the pose to the start line and capture the gyro bias |
//! | L held | autodrive, released returns to manual |
//! | B | reset the vehicle state and apply the configuration file |
//! | A | save the configuration |
//! | X, Y held | fine and coarse menu steps |
//! | R | next display mode |
//! | D-pad | configuration menu |
//!
//! The configuration file is read by the input poller when B is pressed, so
//! the control loop only ever receives the result.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::path::Path;

// Internal
use crate::config::DriverConfig;
use comms_if::input::{Button, DPad, InputEvent};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Events delivered from the input poller to the control loop.
#[derive(Debug, Clone)]
pub enum OperatorEvent {
    /// An input event needing no preparation
    Input(InputEvent),

    /// Result of reading the configuration file after B was pressed
    ConfigLoaded(Result<DriverConfig, String>),
}

/// Something the control loop should do in response to the operator.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorAction {
    StartRecording,
    StopRecording,
    ResetPose,
    Engage,
    Disengage,

    /// Reset the vehicle state, applying the configuration if it was read
    ResetAndApplyConfig(Option<DriverConfig>),

    SaveConfig,
    Menu(DPad),
    Modifier { button: Button, held: bool },
    NextDisplayMode,
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// The action for an event, if any.
pub fn map_event(event: &OperatorEvent) -> Option<OperatorAction> {
    use OperatorAction::*;

    let input = match event {
        OperatorEvent::ConfigLoaded(Ok(c)) => return Some(ResetAndApplyConfig(Some(*c))),
        OperatorEvent::ConfigLoaded(Err(_)) => return Some(ResetAndApplyConfig(None)),
        OperatorEvent::Input(i) => i,
    };

    match input {
        InputEvent::DPad(d) => Some(Menu(*d)),
        InputEvent::ButtonPress(b) => match b {
            Button::Plus => Some(StartRecording),
            Button::Minus => Some(StopRecording),
            Button::Home => Some(ResetPose),
            Button::L => Some(Engage),
            Button::A => Some(SaveConfig),
            Button::R => Some(NextDisplayMode),
            Button::X | Button::Y => Some(Modifier {
                button: *b,
                held: true,
            }),
            // Turned into `ConfigLoaded` by the poller
            Button::B => None,
        },
        InputEvent::ButtonRelease(b) => match b {
            Button::L => Some(Disengage),
            Button::X | Button::Y => Some(Modifier {
                button: *b,
                held: false,
            }),
            _ => None,
        },
        InputEvent::Axis { .. } => None,
    }
}

/// Build the event for a B press by reading the configuration file.
///
/// This blocks on the disk and must not be called from the frame context.
pub fn load_config_event<P: AsRef<Path>>(path: P) -> OperatorEvent {
    OperatorEvent::ConfigLoaded(DriverConfig::load(path).map_err(|e| e.to_string()))
}

#[cfg(test)]
mod test {
    use super::*;

    fn press(b: Button) -> Option<OperatorAction> {
        map_event(&OperatorEvent::Input(InputEvent::ButtonPress(b)))
    }

    fn release(b: Button) -> Option<OperatorAction> {
        map_event(&OperatorEvent::Input(InputEvent::ButtonRelease(b)))
    }

    #[test]
    fn test_buttons() {
        assert_eq!(press(Button::Plus), Some(OperatorAction::StartRecording));
        assert_eq!(press(Button::Minus), Some(OperatorAction::StopRecording));
        assert_eq!(press(Button::Home), Some(OperatorAction::ResetPose));
        assert_eq!(press(Button::L), Some(OperatorAction::Engage));
        assert_eq!(release(Button::L), Some(OperatorAction::Disengage));
        assert_eq!(press(Button::A), Some(OperatorAction::SaveConfig));
        assert_eq!(press(Button::R), Some(OperatorAction::NextDisplayMode));
        assert_eq!(press(Button::B), None);
        assert_eq!(release(Button::Plus), None);

        assert_eq!(
            press(Button::Y),
            Some(OperatorAction::Modifier { button: Button::Y, held: true })
        );
        assert_eq!(
            release(Button::X),
            Some(OperatorAction::Modifier { button: Button::X, held: false })
        );
    }

    #[test]
    fn test_other_events() {
        assert_eq!(
            map_event(&OperatorEvent::Input(InputEvent::DPad(DPad::Left))),
            Some(OperatorAction::Menu(DPad::Left))
        );
        assert_eq!(
            map_event(&OperatorEvent::Input(InputEvent::Axis { axis: 1, value: 100 })),
            None
        );
    }

    #[test]
    fn test_config_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("driverconf.toml");
        std::fs::write(&path, "max_speed = 120\n").unwrap();

        let mut expected = DriverConfig::default();
        expected.max_speed = 120;
        assert_eq!(
            map_event(&load_config_event(&path)),
            Some(OperatorAction::ResetAndApplyConfig(Some(expected)))
        );

        assert_eq!(
            map_event(&load_config_event(dir.path().join("missing.toml"))),
            Some(OperatorAction::ResetAndApplyConfig(None))
        );
    }
}
