//! PVR2 graphics processor: register window and sync-pulse generator.
//!
//! Rasterisation belongs to the pluggable rendering backend; what the core
//! models is the part of the PVR2 that drives time: the sync-pulse generator
//! (SPG) walks the display line by line, raises the vertical-blank
//! interrupts, kicks the maple bus one line before vblank and latches the
//! end-of-frame flag the frame driver spins on.

use crate::error::DcResult;
use crate::mem::DeviceIo;
use crate::sched::{CycleStamp, EventHandle, PIXEL_CLOCK_SCALE};

mod regs {
    pub const ID: u32 = 0x005f_8000;
    pub const REVISION: u32 = 0x005f_8004;
    pub const SOFTRESET: u32 = 0x005f_8008;
    pub const SPG_HBLANK_INT: u32 = 0x005f_80c8;
    pub const SPG_VBLANK_INT: u32 = 0x005f_80cc;
    pub const SPG_LOAD: u32 = 0x005f_808c;
    pub const SPG_STATUS: u32 = 0x005f_810c;
}

/// PVR2 device id and revision, as read by the firmware.
const PVR2_ID: u32 = 0x17fd_11db;
const PVR2_REVISION: u32 = 0x0000_0011;

/// NTSC timing: 858 pixel clocks per line, 525 lines per field.
const HCOUNT_DEFAULT: u32 = 857;
const VCOUNT_DEFAULT: u32 = 524;
/// Lines where the vblank interrupts fire by default.
const VBLANK_IN_DEFAULT: u32 = 520;
const VBLANK_OUT_DEFAULT: u32 = 40;

/// What happened on one scan-line step; the frame driver turns these into
/// interrupts and flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpgLineEvents {
    /// One line before vblank-in: maple auto-init window.
    pub pre_vblank: bool,
    pub vblank_in: bool,
    pub vblank_out: bool,
}

/// Sync-pulse generator state.
pub struct Spg {
    pub(crate) line_event: EventHandle,
    vcount: u32,
    lines_per_field: u32,
    clocks_per_line: u32,
    vblank_in_line: u32,
    vblank_out_line: u32,
}

impl Spg {
    fn new(line_event: EventHandle) -> Self {
        Self {
            line_event,
            vcount: 0,
            lines_per_field: VCOUNT_DEFAULT + 1,
            clocks_per_line: HCOUNT_DEFAULT + 1,
            vblank_in_line: VBLANK_IN_DEFAULT,
            vblank_out_line: VBLANK_OUT_DEFAULT,
        }
    }

    /// Scheduler ticks per scan line.
    pub fn line_period(&self) -> CycleStamp {
        self.clocks_per_line as CycleStamp * PIXEL_CLOCK_SCALE
    }

    pub fn vcount(&self) -> u32 {
        self.vcount
    }

    pub fn in_vblank(&self) -> bool {
        self.vcount >= self.vblank_in_line || self.vcount < self.vblank_out_line
    }

    /// Advance one line and report what the frame driver has to do.
    pub fn on_line(&mut self) -> SpgLineEvents {
        self.vcount += 1;
        if self.vcount >= self.lines_per_field {
            self.vcount = 0;
        }
        SpgLineEvents {
            pre_vblank: self.vcount + 1 == self.vblank_in_line,
            vblank_in: self.vcount == self.vblank_in_line,
            vblank_out: self.vcount == self.vblank_out_line,
        }
    }
}

/// The PVR2 as seen from the SH4: the register window plus the SPG.
pub struct Pvr2 {
    pub spg: Spg,
    /// Backing storage for registers the core does not interpret.
    regs: Vec<u32>,
}

impl Pvr2 {
    pub fn new(line_event: EventHandle) -> Self {
        Self {
            spg: Spg::new(line_event),
            regs: vec![0; 0x2000 / 4],
        }
    }

    fn reg_index(addr: u32) -> usize {
        (((addr - regs::ID) / 4) as usize) % (0x2000 / 4)
    }

    fn spg_status(&self) -> u32 {
        let vsync = if self.spg.in_vblank() { 1 << 13 } else { 0 };
        vsync | (self.spg.vcount() & 0x3ff)
    }
}

impl DeviceIo for Pvr2 {
    fn read8(&mut self, addr: u32) -> DcResult<u8> {
        Ok(self.read32(addr & !3)? as u8)
    }

    fn read16(&mut self, addr: u32) -> DcResult<u16> {
        Ok(self.read32(addr & !3)? as u16)
    }

    fn read32(&mut self, addr: u32) -> DcResult<u32> {
        Ok(match addr {
            regs::ID => PVR2_ID,
            regs::REVISION => PVR2_REVISION,
            regs::SPG_STATUS => self.spg_status(),
            _ => self.regs[Self::reg_index(addr)],
        })
    }

    fn write8(&mut self, addr: u32, val: u8) -> DcResult<()> {
        self.write32(addr & !3, val as u32)
    }

    fn write16(&mut self, addr: u32, val: u16) -> DcResult<()> {
        self.write32(addr & !3, val as u32)
    }

    fn write32(&mut self, addr: u32, val: u32) -> DcResult<()> {
        match addr {
            regs::SOFTRESET => {
                log::debug!("pvr2: soft reset {val:#x}");
            }
            regs::SPG_LOAD => {
                self.spg.clocks_per_line = (val & 0x3ff) + 1;
                self.spg.lines_per_field = ((val >> 16) & 0x3ff) + 1;
            }
            regs::SPG_VBLANK_INT => {
                self.spg.vblank_in_line = val & 0x3ff;
                self.spg.vblank_out_line = (val >> 16) & 0x3ff;
            }
            regs::SPG_HBLANK_INT => {
                log::trace!("pvr2: hblank int config {val:#010x}");
            }
            _ => {}
        }
        self.regs[Self::reg_index(addr)] = val;
        Ok(())
    }
}

/// 8 MiB of PVR2 texture memory, reachable through both the 32-bit and
/// 64-bit bus windows.  The core keeps it as flat storage for the renderer.
pub struct TexMem {
    data: Box<[u8]>,
}

pub const TEX_MEM_SIZE: usize = 0x80_0000;

impl TexMem {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; TEX_MEM_SIZE].into_boxed_slice(),
        }
    }

    #[inline]
    fn offset(addr: u32) -> usize {
        (addr as usize) & (TEX_MEM_SIZE - 1)
    }
}

impl Default for TexMem {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceIo for TexMem {
    fn read8(&mut self, addr: u32) -> DcResult<u8> {
        Ok(self.data[Self::offset(addr)])
    }

    fn read16(&mut self, addr: u32) -> DcResult<u16> {
        let at = Self::offset(addr);
        Ok(u16::from_le_bytes([
            self.data[at],
            self.data[(at + 1) & (TEX_MEM_SIZE - 1)],
        ]))
    }

    fn read32(&mut self, addr: u32) -> DcResult<u32> {
        let at = Self::offset(addr);
        let mut bytes = [0u8; 4];
        for (idx, byte) in bytes.iter_mut().enumerate() {
            *byte = self.data[(at + idx) & (TEX_MEM_SIZE - 1)];
        }
        Ok(u32::from_le_bytes(bytes))
    }

    fn write8(&mut self, addr: u32, val: u8) -> DcResult<()> {
        self.data[Self::offset(addr)] = val;
        Ok(())
    }

    fn write16(&mut self, addr: u32, val: u16) -> DcResult<()> {
        let at = Self::offset(addr);
        let bytes = val.to_le_bytes();
        self.data[at] = bytes[0];
        self.data[(at + 1) & (TEX_MEM_SIZE - 1)] = bytes[1];
        Ok(())
    }

    fn write32(&mut self, addr: u32, val: u32) -> DcResult<()> {
        let at = Self::offset(addr);
        for (idx, byte) in val.to_le_bytes().iter().enumerate() {
            self.data[(at + idx) & (TEX_MEM_SIZE - 1)] = *byte;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::{Clock, EventKind};

    fn fresh_pvr2() -> Pvr2 {
        let mut clk = Clock::new();
        let ev = clk.alloc_event(EventKind::SpgLine);
        Pvr2::new(ev)
    }

    #[test]
    fn test_id_and_revision() {
        let mut pvr2 = fresh_pvr2();
        assert_eq!(pvr2.read32(regs::ID).unwrap(), PVR2_ID);
        assert_eq!(pvr2.read32(regs::REVISION).unwrap(), PVR2_REVISION);
    }

    #[test]
    fn test_spg_walks_a_field() {
        let mut pvr2 = fresh_pvr2();
        let mut vblank_in = 0;
        let mut vblank_out = 0;
        let mut pre = 0;
        for _ in 0..(VCOUNT_DEFAULT + 1) {
            let events = pvr2.spg.on_line();
            vblank_in += events.vblank_in as u32;
            vblank_out += events.vblank_out as u32;
            pre += events.pre_vblank as u32;
        }
        assert_eq!(vblank_in, 1);
        assert_eq!(vblank_out, 1);
        assert_eq!(pre, 1);
    }

    #[test]
    fn test_pre_vblank_is_one_line_early() {
        let mut pvr2 = fresh_pvr2();
        loop {
            let events = pvr2.spg.on_line();
            if events.pre_vblank {
                break;
            }
        }
        assert_eq!(pvr2.spg.vcount() + 1, VBLANK_IN_DEFAULT);
        let events = pvr2.spg.on_line();
        assert!(events.vblank_in);
    }

    #[test]
    fn test_spg_status_reports_vcount() {
        let mut pvr2 = fresh_pvr2();
        pvr2.spg.on_line();
        pvr2.spg.on_line();
        let status = pvr2.read32(regs::SPG_STATUS).unwrap();
        assert_eq!(status & 0x3ff, 2);
    }

    #[test]
    fn test_line_period_matches_pixel_clock() {
        let pvr2 = fresh_pvr2();
        assert_eq!(pvr2.spg.line_period(), 858 * PIXEL_CLOCK_SCALE);
    }
}
