//! Holly system block: the SH4-side interrupt concentrator.
//!
//! Peripherals on the Holly ASIC do not touch the SH4's IRL pins directly;
//! they set bits in ISTNRM/ISTEXT/ISTERR and the three level-mask register
//! sets decide which pin level (13, 11 or 9) the combined request drives.
//! Status bits are cleared by writing ones back (ISTNRM only; the external
//! bits clear when their device drops the line).

use crate::error::DcResult;
use crate::sh4::{excp, Sh4};

/// ISTNRM bit assignments used by this core.
pub mod istnrm {
    pub const VBLANK_IN: u32 = 1 << 3;
    pub const VBLANK_OUT: u32 = 1 << 4;
    pub const HBLANK: u32 = 1 << 5;
    pub const MAPLE_DMA_COMPLETE: u32 = 1 << 12;
}

mod regs {
    pub const SBREV: u32 = 0x005f_689c;
    pub const ISTNRM: u32 = 0x005f_6900;
    pub const ISTEXT: u32 = 0x005f_6904;
    pub const ISTERR: u32 = 0x005f_6908;
    pub const IML2NRM: u32 = 0x005f_6910;
    pub const IML2EXT: u32 = 0x005f_6914;
    pub const IML2ERR: u32 = 0x005f_6918;
    pub const IML4NRM: u32 = 0x005f_6920;
    pub const IML4EXT: u32 = 0x005f_6924;
    pub const IML4ERR: u32 = 0x005f_6928;
    pub const IML6NRM: u32 = 0x005f_6930;
    pub const IML6EXT: u32 = 0x005f_6934;
    pub const IML6ERR: u32 = 0x005f_6938;
}

/// System-block revision the firmware expects.
const SB_REVISION: u32 = 0x0b;

pub struct SysBlock {
    istnrm: u32,
    istext: u32,
    isterr: u32,
    iml2: [u32; 3],
    iml4: [u32; 3],
    iml6: [u32; 3],
    /// Storage for the rest of the window (DMA protection etc.).
    regs: Vec<u32>,
}

impl SysBlock {
    pub fn new() -> Self {
        Self {
            istnrm: 0,
            istext: 0,
            isterr: 0,
            iml2: [0; 3],
            iml4: [0; 3],
            iml6: [0; 3],
            regs: vec![0; 0x200 / 4],
        }
    }

    fn backing_index(addr: u32) -> usize {
        (((addr - 0x005f_6800) / 4) as usize) % (0x200 / 4)
    }

    /// Drive the SH4 IRL pins from the current status/mask state.  IML6
    /// requests win (pin level 9), then IML4 (11), then IML2 (13).
    fn refresh(&self, sh4: &mut Sh4) {
        let pending = |masks: &[u32; 3]| {
            (self.istnrm & masks[0]) != 0
                || (self.istext & masks[1]) != 0
                || (self.isterr & masks[2]) != 0
        };

        let irl = if pending(&self.iml6) {
            9
        } else if pending(&self.iml4) {
            11
        } else if pending(&self.iml2) {
            13
        } else {
            excp::IRL_NONE
        };
        excp::set_irl_interrupt(sh4, irl);
    }

    /// Latch a normal-interrupt status bit and update the IRL pins.
    pub fn raise_nrm_int(&mut self, sh4: &mut Sh4, bits: u32) {
        self.istnrm |= bits;
        self.refresh(sh4);
    }

    pub fn istnrm(&self) -> u32 {
        self.istnrm
    }

    pub fn read32(&mut self, addr: u32) -> DcResult<u32> {
        Ok(match addr {
            regs::SBREV => SB_REVISION,
            regs::ISTNRM => self.istnrm,
            regs::ISTEXT => self.istext,
            regs::ISTERR => self.isterr,
            regs::IML2NRM => self.iml2[0],
            regs::IML2EXT => self.iml2[1],
            regs::IML2ERR => self.iml2[2],
            regs::IML4NRM => self.iml4[0],
            regs::IML4EXT => self.iml4[1],
            regs::IML4ERR => self.iml4[2],
            regs::IML6NRM => self.iml6[0],
            regs::IML6EXT => self.iml6[1],
            regs::IML6ERR => self.iml6[2],
            _ => self.regs[Self::backing_index(addr)],
        })
    }

    pub fn write32(&mut self, sh4: &mut Sh4, addr: u32, val: u32) -> DcResult<()> {
        match addr {
            // write-one-to-clear
            regs::ISTNRM => self.istnrm &= !val,
            regs::ISTERR => self.isterr &= !val,
            regs::ISTEXT => {
                // external bits follow their device; writes are ignored
                log::trace!("sys: write {val:#x} to ISTEXT ignored");
            }
            regs::IML2NRM => self.iml2[0] = val,
            regs::IML2EXT => self.iml2[1] = val,
            regs::IML2ERR => self.iml2[2] = val,
            regs::IML4NRM => self.iml4[0] = val,
            regs::IML4EXT => self.iml4[1] = val,
            regs::IML4ERR => self.iml4[2] = val,
            regs::IML6NRM => self.iml6[0] = val,
            regs::IML6EXT => self.iml6[1] = val,
            regs::IML6ERR => self.iml6[2] = val,
            _ => {
                log::trace!("sys: write {val:#010x} to {addr:#010x}");
                self.regs[Self::backing_index(addr)] = val;
            }
        }
        self.refresh(sh4);
        Ok(())
    }
}

impl Default for SysBlock {
    fn default() -> Self {
        Self::new()
    }
}
