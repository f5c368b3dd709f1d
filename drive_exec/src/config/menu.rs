//! Interactive configuration menu
//!
//! Up and down select a field, wrapping at either end. Left and right
//! adjust the selected field by one hundredth, or by ten with X held or one
//! hundred with Y held.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use comms_if::input::{Button, DPad};

use super::{format_hundredths, DriverConfig, FIELDS};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct ConfigMenu {
    selected: usize,
    x_held: bool,
    y_held: bool,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ConfigMenu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index into `FIELDS` of the selected field.
    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Track the state of the step size modifier buttons.
    ///
    /// Returns false if the button is not a modifier.
    pub fn set_modifier(&mut self, button: Button, held: bool) -> bool {
        match button {
            Button::X => self.x_held = held,
            Button::Y => self.y_held = held,
            _ => return false,
        }
        true
    }

    /// Current adjustment step in hundredths.
    pub fn step(&self) -> i16 {
        if self.y_held {
            100
        } else if self.x_held {
            10
        } else {
            1
        }
    }

    /// Handle a directional pad press.
    ///
    /// Returns true if the configuration was changed.
    pub fn on_dpad(&mut self, dir: DPad, config: &mut DriverConfig) -> bool {
        let n = FIELDS.len();
        let field = &FIELDS[self.selected];
        let value = (field.get)(config);

        match dir {
            DPad::Up => {
                self.selected = (self.selected + n - 1) % n;
                false
            }
            DPad::Down => {
                self.selected = (self.selected + 1) % n;
                false
            }
            DPad::Left => {
                (field.set)(config, value.saturating_sub(self.step()));
                true
            }
            DPad::Right => {
                (field.set)(config, value.saturating_add(self.step()));
                true
            }
        }
    }

    /// Render the menu, one line per field with the selection marked.
    pub fn lines(&self, config: &DriverConfig) -> Vec<String> {
        FIELDS
            .iter()
            .enumerate()
            .map(|(i, f)| {
                format!(
                    "{} {:<15} {:>8}",
                    if i == self.selected { ">" } else { " " },
                    f.name,
                    format_hundredths((f.get)(config))
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_navigation_wraps() {
        let mut menu = ConfigMenu::new();
        let mut c = DriverConfig::default();

        assert!(!menu.on_dpad(DPad::Up, &mut c));
        assert_eq!(menu.selected(), FIELDS.len() - 1);
        menu.on_dpad(DPad::Down, &mut c);
        assert_eq!(menu.selected(), 0);
        menu.on_dpad(DPad::Down, &mut c);
        assert_eq!(menu.selected(), 1);
        assert_eq!(c, DriverConfig::default());
    }

    #[test]
    fn test_adjust_with_modifiers() {
        let mut menu = ConfigMenu::new();
        let mut c = DriverConfig::default();

        // max speed
        menu.on_dpad(DPad::Down, &mut c);

        assert!(menu.on_dpad(DPad::Right, &mut c));
        assert_eq!(c.max_speed, 301);

        menu.set_modifier(Button::X, true);
        menu.on_dpad(DPad::Left, &mut c);
        assert_eq!(c.max_speed, 291);

        // Y takes precedence over X
        menu.set_modifier(Button::Y, true);
        menu.on_dpad(DPad::Left, &mut c);
        assert_eq!(c.max_speed, 191);

        menu.set_modifier(Button::Y, false);
        menu.set_modifier(Button::X, false);
        menu.on_dpad(DPad::Left, &mut c);
        assert_eq!(c.max_speed, 190);

        assert!(!menu.set_modifier(Button::A, true));
    }

    #[test]
    fn test_adjust_saturates() {
        let mut menu = ConfigMenu::new();
        let mut c = DriverConfig::default();
        c.cone_thresh = i16::MAX - 50;

        menu.set_modifier(Button::Y, true);
        menu.on_dpad(DPad::Right, &mut c);
        assert_eq!(c.cone_thresh, i16::MAX);

        c.cone_thresh = i16::MIN + 3;
        menu.on_dpad(DPad::Left, &mut c);
        assert_eq!(c.cone_thresh, i16::MIN);
    }

    #[test]
    fn test_lines() {
        let mut menu = ConfigMenu::new();
        let mut c = DriverConfig::default();
        c.servo_offset = -5;

        for _ in 0..10 {
            menu.on_dpad(DPad::Down, &mut c);
        }

        let lines = menu.lines(&c);
        assert_eq!(lines.len(), FIELDS.len());
        assert!(lines[10].starts_with("> servo offset"));
        assert!(lines[10].ends_with("-0.05"));
        assert!(lines[0].starts_with("  cone thresh"));
    }
}
