//! Standard Dreamcast controller.
//!
//! Sixteen digital buttons and six analog axes.  Host input arrives through
//! the press/release/set-axis entry points on the machine; the GETCOND
//! handler snapshots the state with the wire's active-low button polarity.

use super::device::{func, pad_label, Cond, ControllerCond, DevInfo, MapleDevice};

/// Button bits as the guest sees them (before the active-low inversion).
pub mod buttons {
    pub const C: u32 = 1 << 0;
    pub const B: u32 = 1 << 1;
    pub const A: u32 = 1 << 2;
    pub const START: u32 = 1 << 3;
    pub const DPAD_UP: u32 = 1 << 4;
    pub const DPAD_DOWN: u32 = 1 << 5;
    pub const DPAD_LEFT: u32 = 1 << 6;
    pub const DPAD_RIGHT: u32 = 1 << 7;
    pub const Z: u32 = 1 << 8;
    pub const Y: u32 = 1 << 9;
    pub const X: u32 = 1 << 10;
    pub const D: u32 = 1 << 11;
    pub const DPAD2_UP: u32 = 1 << 12;
    pub const DPAD2_DOWN: u32 = 1 << 13;
    pub const DPAD2_LEFT: u32 = 1 << 14;
    pub const DPAD2_RIGHT: u32 = 1 << 15;
}

/// Analog axis indices for [`Controller::set_axis`].
pub mod axis {
    pub const R_TRIG: usize = 0;
    pub const L_TRIG: usize = 1;
    pub const JOY1_X: usize = 2;
    pub const JOY1_Y: usize = 3;
    pub const JOY2_X: usize = 4;
    pub const JOY2_Y: usize = 5;
}

pub const N_AXES: usize = 6;

const DEVICE_NAME: &str = "Dreamcast Controller";
const LICENSE: &str = "Produced By or Under License From SEGA ENTERPRISES,LTD.";

pub struct Controller {
    btns: u32,
    axes: [u8; N_AXES],
}

impl Controller {
    pub fn new() -> Self {
        let mut axes = [0; N_AXES];
        // sticks rest centered, triggers released
        axes[axis::JOY1_X] = 128;
        axes[axis::JOY1_Y] = 128;
        Self { btns: 0, axes }
    }

    pub fn press_btns(&mut self, btns: u32) {
        self.btns |= btns;
    }

    pub fn release_btns(&mut self, btns: u32) {
        self.btns &= !btns;
    }

    pub fn set_axis(&mut self, which: usize, val: u8) {
        if which < N_AXES {
            self.axes[which] = val;
        }
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

impl MapleDevice for Controller {
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn device_type(&self) -> &'static str {
        "controller"
    }

    fn dev_info(&mut self) -> Option<DevInfo> {
        Some(DevInfo {
            func: func::CONTROLLER,
            func_data: [0xfe06_0f00, 0x0000_0000, 0x7244_00ff],
            area_code: 0xff,
            dir: 0,
            dev_name: pad_label(DEVICE_NAME),
            license: pad_label(LICENSE),
            standby_power: 0x01ae,
            max_power: 0x01f4,
        })
    }

    fn dev_get_cond(&mut self) -> Option<Cond> {
        Some(Cond::Controller(ControllerCond {
            // the wire reports buttons active-low
            btn: !(self.btns as u16),
            trig_r: self.axes[axis::R_TRIG],
            trig_l: self.axes[axis::L_TRIG],
            js_x: self.axes[axis::JOY1_X],
            js_y: self.axes[axis::JOY1_Y],
            js_x2: self.axes[axis::JOY2_X],
            js_y2: self.axes[axis::JOY2_Y],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond_of(cont: &mut Controller) -> ControllerCond {
        match cont.dev_get_cond().unwrap() {
            Cond::Controller(cond) => cond,
            _ => panic!("controller must report a controller condition"),
        }
    }

    #[test]
    fn test_idle_condition() {
        let mut cont = Controller::new();
        let cond = cond_of(&mut cont);
        assert_eq!(cond.btn, 0xffff);
        assert_eq!(cond.js_x, 128);
        assert_eq!(cond.js_y, 128);
        assert_eq!(cond.trig_l, 0);
    }

    #[test]
    fn test_buttons_read_active_low() {
        let mut cont = Controller::new();
        cont.press_btns(buttons::A | buttons::START);
        let cond = cond_of(&mut cont);
        assert_eq!(cond.btn & buttons::A as u16, 0);
        assert_eq!(cond.btn & buttons::START as u16, 0);
        assert_ne!(cond.btn & buttons::B as u16, 0);

        cont.release_btns(buttons::A);
        let cond = cond_of(&mut cont);
        assert_ne!(cond.btn & buttons::A as u16, 0);
    }

    #[test]
    fn test_axes() {
        let mut cont = Controller::new();
        cont.set_axis(axis::R_TRIG, 200);
        cont.set_axis(axis::JOY1_X, 10);
        let cond = cond_of(&mut cont);
        assert_eq!(cond.trig_r, 200);
        assert_eq!(cond.js_x, 10);
        // out-of-range axis index is ignored
        cont.set_axis(99, 1);
    }
}
