//! Dreamcast keyboard.
//!
//! Six-key rollover: the condition payload carries a modifier byte, a
//! lock-LED byte and six key slots.  Games stop scanning the slot list at
//! the first zero, so held keys are packed to the front.

use super::device::{func, pad_label, Cond, DevInfo, KeyboardCond, MapleDevice};

/// Number of simultaneously reported keys.
pub const ROLLOVER: usize = 6;

const DEVICE_NAME: &str = "Keyboard";
const LICENSE: &str = "Produced By or Under License From SEGA ENTERPRISES,LTD.";

pub struct Keyboard {
    key_states: [u8; ROLLOVER],
    mods: u8,
    leds: u8,
}

impl Keyboard {
    pub fn new() -> Self {
        Self {
            key_states: [0; ROLLOVER],
            mods: 0,
            leds: 0,
        }
    }

    /// Press a key by its usage code.  Dropped silently when six keys are
    /// already held, like the real hardware.
    pub fn press_key(&mut self, code: u8) {
        if code == 0 || self.key_states.contains(&code) {
            return;
        }
        if let Some(slot) = self.key_states.iter_mut().find(|slot| **slot == 0) {
            *slot = code;
        }
    }

    pub fn release_key(&mut self, code: u8) {
        for slot in &mut self.key_states {
            if *slot == code {
                *slot = 0;
            }
        }
    }

    pub fn set_modifiers(&mut self, mods: u8) {
        self.mods = mods;
    }

    pub fn set_leds(&mut self, leds: u8) {
        self.leds = leds;
    }
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl MapleDevice for Keyboard {
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn device_type(&self) -> &'static str {
        "keyboard"
    }

    fn dev_info(&mut self) -> Option<DevInfo> {
        Some(DevInfo {
            func: func::KEYBOARD,
            func_data: [0x8000_0502, 0x0000_0000, 0x0000_0000],
            area_code: 1,
            dir: 0,
            dev_name: pad_label(DEVICE_NAME),
            license: pad_label(LICENSE),
            standby_power: 0x012c,
            max_power: 0x0190,
        })
    }

    fn dev_get_cond(&mut self) -> Option<Cond> {
        let mut cond = KeyboardCond {
            mods: self.mods,
            leds: self.leds,
            keys: [0; ROLLOVER],
        };
        // pack held keys in front of the first zero slot
        let mut out = 0;
        for &code in &self.key_states {
            if code != 0 {
                cond.keys[out] = code;
                out += 1;
            }
        }
        Some(Cond::Keyboard(cond))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys_of(kbd: &mut Keyboard) -> [u8; ROLLOVER] {
        match kbd.dev_get_cond().unwrap() {
            Cond::Keyboard(cond) => cond.keys,
            _ => panic!("keyboard must report a keyboard condition"),
        }
    }

    #[test]
    fn test_keys_pack_to_front() {
        let mut kbd = Keyboard::new();
        kbd.press_key(0x04);
        kbd.press_key(0x05);
        kbd.press_key(0x06);
        kbd.release_key(0x05);
        assert_eq!(keys_of(&mut kbd), [0x04, 0x06, 0, 0, 0, 0]);
    }

    #[test]
    fn test_rollover_limit() {
        let mut kbd = Keyboard::new();
        for code in 1..=7u8 {
            kbd.press_key(code);
        }
        let keys = keys_of(&mut kbd);
        assert_eq!(keys, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_duplicate_press_is_idempotent() {
        let mut kbd = Keyboard::new();
        kbd.press_key(0x1c);
        kbd.press_key(0x1c);
        assert_eq!(keys_of(&mut kbd), [0x1c, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_modifiers_and_leds() {
        let mut kbd = Keyboard::new();
        kbd.set_modifiers(0x02);
        kbd.set_leds(0x01);
        match kbd.dev_get_cond().unwrap() {
            Cond::Keyboard(cond) => {
                assert_eq!(cond.mods, 0x02);
                assert_eq!(cond.leds, 0x01);
            }
            _ => unreachable!(),
        }
    }
}
