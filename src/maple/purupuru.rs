//! Puru Puru (jump) pack.
//!
//! The rumble pack latches whatever vibration program SETCOND or BWRITE
//! hands it; the host can poll the latch to drive force feedback.

use super::device::{func, pad_label, DevInfo, MapleDevice};

const DEVICE_NAME: &str = "Puru Puru Pack";
const LICENSE: &str = "Produced By or Under License From SEGA ENTERPRISES,LTD.";

pub struct Purupuru {
    /// Last vibration control word written by the guest.
    rumble: u32,
}

impl Purupuru {
    pub fn new() -> Self {
        Self { rumble: 0 }
    }

    /// Current vibration control word, for the host's feedback layer.
    pub fn rumble_word(&self) -> u32 {
        self.rumble
    }

    /// Whether any vibration source is currently switched on.
    pub fn is_rumbling(&self) -> bool {
        self.rumble & 0xffff_ff00 != 0
    }
}

impl Default for Purupuru {
    fn default() -> Self {
        Self::new()
    }
}

impl MapleDevice for Purupuru {
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn device_type(&self) -> &'static str {
        "purupuru"
    }

    fn dev_info(&mut self) -> Option<DevInfo> {
        Some(DevInfo {
            func: func::VIBRATION,
            func_data: [0x0000_0101, 0x0000_0000, 0x0000_0000],
            area_code: 0xff,
            dir: 0,
            dev_name: pad_label(DEVICE_NAME),
            license: pad_label(LICENSE),
            standby_power: 0x00c8,
            max_power: 0x0640,
        })
    }

    fn dev_set_cond(&mut self, dwords: &[u32]) -> Option<()> {
        // dword 0 is the function code, dword 1 the vibration program
        if dwords.len() >= 2 && dwords[0] == func::VIBRATION {
            self.rumble = dwords[1];
            log::debug!("purupuru: vibration word {:#010x}", self.rumble);
        }
        Some(())
    }

    fn dev_bwrite(&mut self, dwords: &[u32]) -> Option<()> {
        self.dev_set_cond(dwords)
    }
}
