//! Maple peripheral capability set.
//!
//! Every peripheral on the bus satisfies [`MapleDevice`].  All slots except
//! `device_type` are optional: a device returns `None` from slots it does
//! not implement and the frame processor logs and answers with zeroed data,
//! the same way the real bus tolerates half-implemented peripherals.

/// Function codes advertised in DEVINFO responses.
pub mod func {
    pub const CONTROLLER: u32 = 0x0100_0000;
    pub const KEYBOARD: u32 = 0x4000_0000;
    pub const VIBRATION: u32 = 0x0001_0000;
    pub const STORAGE: u32 = 0x0000_0002;
    pub const LCD: u32 = 0x0000_0004;
    pub const CLOCK: u32 = 0x0000_0008;
}

pub const DEV_NAME_LEN: usize = 30;
pub const DEV_LICENSE_LEN: usize = 60;

/// Size of a compiled DEVINFO payload in bytes.
pub const DEVINFO_SIZE: usize = 4 + 4 * 3 + 1 + 1 + DEV_NAME_LEN + DEV_LICENSE_LEN + 2 + 2;

pub const CONTROLLER_COND_SIZE: usize = 4 + 2 + 6;
pub const KEYBOARD_COND_SIZE: usize = 4 + 8;

/// Device identification block (DEVINFO response payload).
#[derive(Debug, Clone)]
pub struct DevInfo {
    pub func: u32,
    pub func_data: [u32; 3],
    pub area_code: u8,
    pub dir: u8,
    /// Space-padded, not NUL-padded.
    pub dev_name: [u8; DEV_NAME_LEN],
    pub license: [u8; DEV_LICENSE_LEN],
    pub standby_power: u16,
    pub max_power: u16,
}

impl DevInfo {
    pub fn zeroed() -> Self {
        Self {
            func: 0,
            func_data: [0; 3],
            area_code: 0,
            dir: 0,
            dev_name: [0; DEV_NAME_LEN],
            license: [0; DEV_LICENSE_LEN],
            standby_power: 0,
            max_power: 0,
        }
    }

    /// Serialise for the wire; field order and packing match the bus
    /// protocol, no structure padding involved.
    pub fn compile(&self, out: &mut [u8]) -> usize {
        let mut at = 0;
        out[at..at + 4].copy_from_slice(&self.func.to_le_bytes());
        at += 4;
        for word in &self.func_data {
            out[at..at + 4].copy_from_slice(&word.to_le_bytes());
            at += 4;
        }
        out[at] = self.area_code;
        at += 1;
        out[at] = self.dir;
        at += 1;
        out[at..at + DEV_NAME_LEN].copy_from_slice(&self.dev_name);
        at += DEV_NAME_LEN;
        out[at..at + DEV_LICENSE_LEN].copy_from_slice(&self.license);
        at += DEV_LICENSE_LEN;
        out[at..at + 2].copy_from_slice(&self.standby_power.to_le_bytes());
        at += 2;
        out[at..at + 2].copy_from_slice(&self.max_power.to_le_bytes());
        at += 2;
        debug_assert_eq!(at, DEVINFO_SIZE);
        at
    }
}

/// Copy an ASCII label into a fixed space-padded field.
pub fn pad_label<const N: usize>(text: &str) -> [u8; N] {
    let mut out = [b' '; N];
    for (dst, byte) in out.iter_mut().zip(text.bytes()) {
        *dst = byte;
    }
    out
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerCond {
    /// Button mask as it appears on the wire (active low).
    pub btn: u16,
    pub trig_r: u8,
    pub trig_l: u8,
    pub js_x: u8,
    pub js_y: u8,
    pub js_x2: u8,
    pub js_y2: u8,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeyboardCond {
    pub mods: u8,
    pub leds: u8,
    pub keys: [u8; 6],
}

/// GETCOND response payload.
#[derive(Debug, Clone, Copy)]
pub enum Cond {
    Controller(ControllerCond),
    Keyboard(KeyboardCond),
}

impl Cond {
    pub fn compile(&self, out: &mut [u8]) -> usize {
        match self {
            Cond::Controller(cont) => {
                out[0..4].copy_from_slice(&func::CONTROLLER.to_le_bytes());
                out[4..6].copy_from_slice(&cont.btn.to_le_bytes());
                out[6] = cont.trig_r;
                out[7] = cont.trig_l;
                out[8] = cont.js_x;
                out[9] = cont.js_y;
                out[10] = cont.js_x2;
                out[11] = cont.js_y2;
                CONTROLLER_COND_SIZE
            }
            Cond::Keyboard(kbd) => {
                out[0..4].copy_from_slice(&func::KEYBOARD.to_le_bytes());
                out[4] = kbd.mods;
                out[5] = kbd.leds;
                out[6..12].copy_from_slice(&kbd.keys);
                KEYBOARD_COND_SIZE
            }
        }
    }
}

/// BREAD result: the function code, the echoed block address word and the
/// block contents.
pub struct BlockRead {
    pub func: u32,
    pub block_word: u32,
    pub data: Vec<u8>,
}

/// Peripheral capability set: eight optional slots.
pub trait MapleDevice: Send {
    /// Stable name used in log messages.
    fn device_type(&self) -> &'static str;

    /// Concrete-type access for the host-input entry points.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;

    fn dev_info(&mut self) -> Option<DevInfo> {
        None
    }

    fn dev_get_cond(&mut self) -> Option<Cond> {
        None
    }

    fn dev_set_cond(&mut self, _dwords: &[u32]) -> Option<()> {
        None
    }

    fn dev_bwrite(&mut self, _dwords: &[u32]) -> Option<()> {
        None
    }

    fn dev_bread(&mut self, _dwords: &[u32]) -> Option<BlockRead> {
        None
    }

    fn dev_bsync(&mut self, _dwords: &[u32]) -> Option<()> {
        None
    }

    fn dev_meminfo(&mut self) -> Option<Vec<u32>> {
        None
    }

    /// Called once when the device is unplugged or the machine is torn
    /// down.
    fn on_cleanup(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_devinfo_compiles_to_exact_size() {
        let info = DevInfo {
            func: func::CONTROLLER,
            func_data: [0xfe06_0f00, 0, 0x7244_00ff],
            area_code: 0xff,
            dir: 0,
            dev_name: pad_label("Dreamcast Controller"),
            license: pad_label("Produced By or Under License From SEGA ENTERPRISES,LTD."),
            standby_power: 0x01ae,
            max_power: 0x01f4,
        };
        let mut buf = [0u8; DEVINFO_SIZE];
        assert_eq!(info.compile(&mut buf), DEVINFO_SIZE);
        assert_eq!(&buf[0..4], &func::CONTROLLER.to_le_bytes());
        // name field starts after func + func_data + area + dir
        assert_eq!(buf[18], b'D');
    }

    #[test]
    fn test_cond_sizes() {
        let mut buf = [0u8; 64];
        let len = Cond::Controller(ControllerCond::default()).compile(&mut buf);
        assert_eq!(len, CONTROLLER_COND_SIZE);
        let len = Cond::Keyboard(KeyboardCond::default()).compile(&mut buf);
        assert_eq!(len, KEYBOARD_COND_SIZE);
    }

    #[test]
    fn test_pad_label_pads_with_spaces() {
        let label: [u8; 8] = pad_label("ab");
        assert_eq!(&label, b"ab      ");
    }

    struct Bare;

    impl MapleDevice for Bare {
        fn device_type(&self) -> &'static str {
            "bare"
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    #[test]
    fn test_default_slots_are_missing() {
        let mut dev = Bare;
        assert!(dev.dev_info().is_none());
        assert!(dev.dev_get_cond().is_none());
        assert!(dev.dev_bread(&[]).is_none());
    }
}
