//! ARM7DI CPU model (the AICA's sound processor).
//!
//! The ARM7 does not hide its pipelining: R15 always reads two instructions
//! (eight bytes) ahead of the one executing, so the model buffers a two-slot
//! fetched-instruction pipeline and flushes it on every branch.  The SH4
//! holds this CPU in reset through an AICA register; while held, the clock
//! domain still advances but nothing executes and PC stays put.

pub mod exec;

use crate::error::DcResult;
use crate::hw::HwDevices;
use crate::mem::{Area, DeviceIo};

/// CPSR flag bits.
pub mod cpsr {
    pub const N: u32 = 1 << 31;
    pub const Z: u32 = 1 << 30;
    pub const C: u32 = 1 << 29;
    pub const V: u32 = 1 << 28;
    /// IRQ disable.
    pub const I: u32 = 1 << 7;
    /// FIQ disable.
    pub const F: u32 = 1 << 6;
    pub const MODE_MASK: u32 = 0x1f;
}

/// Execution modes (CPSR mode field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Arm7Mode {
    User = 0x10,
    Fiq = 0x11,
    Irq = 0x12,
    Svc = 0x13,
    Abt = 0x17,
    Und = 0x1b,
}

impl Arm7Mode {
    fn from_bits(bits: u32) -> Self {
        match bits & cpsr::MODE_MASK {
            0x11 => Self::Fiq,
            0x12 => Self::Irq,
            0x13 => Self::Svc,
            0x17 => Self::Abt,
            0x1b => Self::Und,
            _ => Self::User,
        }
    }
}

/// Exception sources, by vector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arm7Excp {
    Reset,
    Undefined,
    Swi,
    PrefetchAbort,
    DataAbort,
    Irq,
    Fiq,
}

impl Arm7Excp {
    fn vector(self) -> u32 {
        match self {
            Self::Reset => 0x00,
            Self::Undefined => 0x04,
            Self::Swi => 0x08,
            Self::PrefetchAbort => 0x0c,
            Self::DataAbort => 0x10,
            Self::Irq => 0x18,
            Self::Fiq => 0x1c,
        }
    }

    fn mode(self) -> Arm7Mode {
        match self {
            Self::Reset | Self::Swi => Arm7Mode::Svc,
            Self::Undefined => Arm7Mode::Und,
            Self::PrefetchAbort | Self::DataAbort => Arm7Mode::Abt,
            Self::Irq => Arm7Mode::Irq,
            Self::Fiq => Arm7Mode::Fiq,
        }
    }
}

/// CPSR at reset: SVC mode, both interrupt lines masked.
const CPSR_RESET: u32 = Arm7Mode::Svc as u32 | cpsr::I | cpsr::F;

pub struct Arm7 {
    /// User-view R0-R15 (R15 is the fetch PC).
    r: [u32; 16],
    /// FIQ bank of R8-R14.
    r_fiq: [u32; 7],
    r_svc: [u32; 2],
    r_abt: [u32; 2],
    r_irq: [u32; 2],
    r_und: [u32; 2],
    cpsr: u32,
    spsr_fiq: u32,
    spsr_svc: u32,
    spsr_abt: u32,
    spsr_irq: u32,
    spsr_und: u32,

    /// Fetched-but-not-executed instructions; slot 0 executes next.
    pipeline: [u32; 2],
    pipeline_len: usize,
    /// Address of the instruction most recently handed to the executor.
    exec_addr: u32,

    /// Mirror of the AICA reset gate, maintained by the dispatch loop so a
    /// release edge restarts the CPU cleanly.
    pub enabled: bool,

    pub cycles_executed: u64,
}

impl Arm7 {
    pub fn new() -> Self {
        let mut arm7 = Self {
            r: [0; 16],
            r_fiq: [0; 7],
            r_svc: [0; 2],
            r_abt: [0; 2],
            r_irq: [0; 2],
            r_und: [0; 2],
            cpsr: CPSR_RESET,
            spsr_fiq: 0,
            spsr_svc: 0,
            spsr_abt: 0,
            spsr_irq: 0,
            spsr_und: 0,
            pipeline: [0; 2],
            pipeline_len: 0,
            exec_addr: 0,
            enabled: false,
            cycles_executed: 0,
        };
        arm7.reset();
        arm7
    }

    /// Hardware reset: back to the reset vector in SVC mode.
    pub fn reset(&mut self) {
        self.r = [0; 16];
        self.r_fiq = [0; 7];
        self.r_svc = [0; 2];
        self.r_abt = [0; 2];
        self.r_irq = [0; 2];
        self.r_und = [0; 2];
        self.cpsr = CPSR_RESET;
        self.pipeline_len = 0;
    }

    pub fn mode(&self) -> Arm7Mode {
        Arm7Mode::from_bits(self.cpsr)
    }

    pub fn cpsr(&self) -> u32 {
        self.cpsr
    }

    pub fn set_cpsr(&mut self, val: u32) {
        self.cpsr = val;
    }

    pub fn spsr(&self) -> u32 {
        match self.mode() {
            Arm7Mode::Fiq => self.spsr_fiq,
            Arm7Mode::Svc => self.spsr_svc,
            Arm7Mode::Abt => self.spsr_abt,
            Arm7Mode::Irq => self.spsr_irq,
            Arm7Mode::Und => self.spsr_und,
            // user mode has no SPSR; reads yield CPSR like some cores do
            Arm7Mode::User => self.cpsr,
        }
    }

    pub fn set_spsr(&mut self, val: u32) {
        match self.mode() {
            Arm7Mode::Fiq => self.spsr_fiq = val,
            Arm7Mode::Svc => self.spsr_svc = val,
            Arm7Mode::Abt => self.spsr_abt = val,
            Arm7Mode::Irq => self.spsr_irq = val,
            Arm7Mode::Und => self.spsr_und = val,
            Arm7Mode::User => {}
        }
    }

    /// Read a general register through the current mode's banking.
    pub fn gen_reg(&self, idx: usize) -> u32 {
        debug_assert!(idx < 16);
        match (self.mode(), idx) {
            (Arm7Mode::Fiq, 8..=14) => self.r_fiq[idx - 8],
            (Arm7Mode::Svc, 13..=14) => self.r_svc[idx - 13],
            (Arm7Mode::Abt, 13..=14) => self.r_abt[idx - 13],
            (Arm7Mode::Irq, 13..=14) => self.r_irq[idx - 13],
            (Arm7Mode::Und, 13..=14) => self.r_und[idx - 13],
            _ => self.r[idx],
        }
    }

    pub fn set_gen_reg(&mut self, idx: usize, val: u32) {
        debug_assert!(idx < 16);
        match (self.mode(), idx) {
            (Arm7Mode::Fiq, 8..=14) => self.r_fiq[idx - 8] = val,
            (Arm7Mode::Svc, 13..=14) => self.r_svc[idx - 13] = val,
            (Arm7Mode::Abt, 13..=14) => self.r_abt[idx - 13] = val,
            (Arm7Mode::Irq, 13..=14) => self.r_irq[idx - 13] = val,
            (Arm7Mode::Und, 13..=14) => self.r_und[idx - 13] = val,
            _ => self.r[idx] = val,
        }
    }

    /// The fetch PC (R15 as the programmer sees it).
    pub fn pc(&self) -> u32 {
        self.r[15]
    }

    /// Branch: redirect fetch and flush the pipeline.
    pub fn set_pc(&mut self, target: u32) {
        self.r[15] = target & !3;
        self.pipeline_len = 0;
    }

    /// Address of the instruction currently executing (R15 - 8 once the
    /// pipeline is full).
    pub fn exec_pc(&self) -> u32 {
        self.exec_addr
    }

    /// Address of the next instruction that would execute.
    fn next_pc(&self) -> u32 {
        self.r[15].wrapping_sub(self.pipeline_len as u32 * 4)
    }

    /// Fill the pipeline and take the next instruction to execute.
    pub fn fetch_inst(&mut self, hw: &mut HwDevices) -> DcResult<u32> {
        while self.pipeline_len < 2 {
            self.pipeline[self.pipeline_len] = read_32(hw, self.r[15])?;
            self.r[15] = self.r[15].wrapping_add(4);
            self.pipeline_len += 1;
        }
        self.exec_addr = self.r[15].wrapping_sub(8);
        let inst = self.pipeline[0];
        self.pipeline[0] = self.pipeline[1];
        self.pipeline_len = 1;
        Ok(inst)
    }

    /// Enter an exception: bank the return state, switch mode, mask IRQ
    /// (and FIQ where applicable), jump through the vector.
    pub fn enter_excp(&mut self, excp: Arm7Excp) {
        let old_cpsr = self.cpsr;
        // the return address the handler sees in R14, adjusted so the
        // documented return idiom for each exception lands correctly
        let ret = match excp {
            Arm7Excp::Reset => 0,
            Arm7Excp::Swi | Arm7Excp::Undefined => self.exec_addr.wrapping_add(4),
            Arm7Excp::Irq | Arm7Excp::Fiq | Arm7Excp::PrefetchAbort => {
                self.next_pc().wrapping_add(4)
            }
            Arm7Excp::DataAbort => self.exec_addr.wrapping_add(8),
        };

        let mode = excp.mode();
        self.cpsr = (self.cpsr & !cpsr::MODE_MASK) | mode as u32 | cpsr::I;
        if matches!(excp, Arm7Excp::Fiq | Arm7Excp::Reset) {
            self.cpsr |= cpsr::F;
        }
        self.set_spsr(old_cpsr);
        self.set_gen_reg(14, ret);
        self.set_pc(excp.vector());
    }

    /// Sample the interrupt lines; the delay-slot question does not exist
    /// here because ARM has no delay slots.
    pub fn check_excp(&mut self, fiq: bool, irq: bool) {
        if fiq && self.cpsr & cpsr::F == 0 {
            self.enter_excp(Arm7Excp::Fiq);
        } else if irq && self.cpsr & cpsr::I == 0 {
            self.enter_excp(Arm7Excp::Irq);
        }
    }
}

impl Default for Arm7 {
    fn default() -> Self {
        Self::new()
    }
}

fn arm7_map_miss(address: u32, len: u32) -> crate::error::ErrorRecord {
    crate::error::ErrorRecord::unimplemented("ARM7 access to an unmapped address")
        .address(address)
        .length(len)
}

/// ARM7-side memory access: the map only knows wave memory and the AICA
/// register file.
pub fn read_32(hw: &mut HwDevices, address: u32) -> DcResult<u32> {
    let routed = hw
        .arm7_map
        .route(address)
        .ok_or_else(|| arm7_map_miss(address, 4))?;
    match routed.area {
        Area::AicaWave => hw.aica.wave.read32(routed.offset),
        Area::AicaSys => hw.aica.read32(routed.offset),
        _ => Err(arm7_map_miss(address, 4)),
    }
}

pub fn read_8(hw: &mut HwDevices, address: u32) -> DcResult<u8> {
    let routed = hw
        .arm7_map
        .route(address)
        .ok_or_else(|| arm7_map_miss(address, 1))?;
    match routed.area {
        Area::AicaWave => hw.aica.wave.read8(routed.offset),
        Area::AicaSys => hw.aica.read8(routed.offset),
        _ => Err(arm7_map_miss(address, 1)),
    }
}

pub fn write_32(hw: &mut HwDevices, address: u32, val: u32) -> DcResult<()> {
    let routed = hw
        .arm7_map
        .route(address)
        .ok_or_else(|| arm7_map_miss(address, 4))?;
    match routed.area {
        Area::AicaWave => hw.aica.wave.write32(routed.offset, val),
        Area::AicaSys => hw.aica.write32(routed.offset, val),
        _ => Err(arm7_map_miss(address, 4)),
    }
}

pub fn write_8(hw: &mut HwDevices, address: u32, val: u8) -> DcResult<()> {
    let routed = hw
        .arm7_map
        .route(address)
        .ok_or_else(|| arm7_map_miss(address, 1))?;
    match routed.area {
        Area::AicaWave => hw.aica.wave.write8(routed.offset, val),
        Area::AicaSys => hw.aica.write8(routed.offset, val),
        _ => Err(arm7_map_miss(address, 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot_rom::BootRom;
    use crate::flash_rom::FlashRom;
    use crate::sched::Clock;

    fn fresh_hw() -> HwDevices {
        let mut clk = Clock::new();
        HwDevices::new(
            &mut clk,
            BootRom::from_bytes(vec![0u8; 16]),
            FlashRom::ephemeral(),
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_reset_state() {
        let arm7 = Arm7::new();
        assert_eq!(arm7.mode(), Arm7Mode::Svc);
        assert_eq!(arm7.pc(), 0);
        assert!(arm7.cpsr() & cpsr::I != 0);
        assert!(arm7.cpsr() & cpsr::F != 0);
        assert!(!arm7.enabled);
    }

    #[test]
    fn test_pipeline_reads_ahead() {
        let mut arm7 = Arm7::new();
        let mut hw = fresh_hw();
        hw.aica.wave.write_block(0, &0xe1a0_0000u32.to_le_bytes()); // mov r0, r0
        hw.aica.wave.write_block(4, &0xe1a0_1001u32.to_le_bytes());

        let inst = arm7.fetch_inst(&mut hw).unwrap();
        assert_eq!(inst, 0xe1a0_0000);
        // executing the word at 0; R15 reads 8 ahead
        assert_eq!(arm7.pc(), 8);
        assert_eq!(arm7.exec_pc(), 0);
    }

    #[test]
    fn test_branch_flushes_pipeline() {
        let mut arm7 = Arm7::new();
        let mut hw = fresh_hw();
        arm7.fetch_inst(&mut hw).unwrap();
        arm7.set_pc(0x100);
        assert_eq!(arm7.pc(), 0x100);
        let _ = arm7.fetch_inst(&mut hw).unwrap();
        assert_eq!(arm7.pc(), 0x108);
    }

    #[test]
    fn test_mode_banking() {
        let mut arm7 = Arm7::new();
        // SVC r13 differs from user r13
        arm7.set_gen_reg(13, 0x1111);
        arm7.set_cpsr((arm7.cpsr() & !cpsr::MODE_MASK) | Arm7Mode::User as u32);
        arm7.set_gen_reg(13, 0x2222);
        assert_eq!(arm7.gen_reg(13), 0x2222);

        arm7.set_cpsr((arm7.cpsr() & !cpsr::MODE_MASK) | Arm7Mode::Svc as u32);
        assert_eq!(arm7.gen_reg(13), 0x1111);

        // FIQ banks r8 too
        arm7.set_gen_reg(8, 0x3333);
        arm7.set_cpsr((arm7.cpsr() & !cpsr::MODE_MASK) | Arm7Mode::Fiq as u32);
        arm7.set_gen_reg(8, 0x4444);
        assert_eq!(arm7.gen_reg(8), 0x4444);
        arm7.set_cpsr((arm7.cpsr() & !cpsr::MODE_MASK) | Arm7Mode::Svc as u32);
        assert_eq!(arm7.gen_reg(8), 0x3333);
    }

    #[test]
    fn test_irq_entry_and_masking() {
        let mut arm7 = Arm7::new();
        let mut hw = fresh_hw();
        arm7.set_cpsr(arm7.cpsr() & !cpsr::I);
        arm7.fetch_inst(&mut hw).unwrap();

        arm7.check_excp(false, true);
        assert_eq!(arm7.mode(), Arm7Mode::Irq);
        assert_eq!(arm7.pc(), 0x18);
        assert!(arm7.cpsr() & cpsr::I != 0);

        // masked now; a second request does nothing
        arm7.check_excp(false, true);
        assert_eq!(arm7.pc(), 0x18);
    }

    #[test]
    fn test_arm7_mem_goes_through_aica() {
        let mut hw = fresh_hw();
        write_32(&mut hw, 0x0000_1000, 0xcafe_babe).unwrap();
        assert_eq!(read_32(&mut hw, 0x0000_1000).unwrap(), 0xcafe_babe);
        // the SH4 sees the same cell through its own window
        assert_eq!(hw.aica.wave.read_32(0x1000), 0xcafe_babe);

        // the register file as the ARM7 sees it
        write_32(&mut hw, 0x0080_2c00, 0).unwrap();
        assert!(hw.aica.arm7_enabled());
    }

    #[test]
    fn test_unmapped_arm7_access_reported() {
        let mut hw = fresh_hw();
        assert!(read_32(&mut hw, 0x0400_0000).is_err());
    }
}
