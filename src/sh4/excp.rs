//! SH4 exceptions and the on-chip interrupt controller.
//!
//! Synchronous exceptions (illegal instruction, TRAPA, ...) and external
//! interrupts share the same entry mechanics: save PC/SR/R15 into
//! SPC/SSR/SGR, raise MD/RB/BL, and jump through VBR.  Interrupt acceptance
//! is deferred while BL is set, while the priority does not clear IMASK, and
//! across a delayed branch and its slot (which execute as one atomic unit).

use super::{sr, CtrlReg, ExecState, Sh4, RESET_PC};

/// Exception/interrupt codes as they appear in EXPEVT/INTEVT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Sh4ExceptionCode {
    PowerOnReset = 0x000,
    ManualReset = 0x020,
    TlbMissRead = 0x040,
    TlbMissWrite = 0x060,
    InitialPageWrite = 0x080,
    TlbProtViolRead = 0x0a0,
    TlbProtViolWrite = 0x0c0,
    DataAddrRead = 0x0e0,
    DataAddrWrite = 0x100,
    FpuException = 0x120,
    Trapa = 0x160,
    GeneralIllegalInst = 0x180,
    SlotIllegalInst = 0x1a0,
    Nmi = 0x1c0,
    UserBreak = 0x1e0,
    GeneralFpuDisable = 0x800,
    SlotFpuDisable = 0x820,
    Tmu0Tuni0 = 0x400,
    Tmu1Tuni1 = 0x420,
    Tmu2Tuni2 = 0x440,
    Tmu2Ticpi2 = 0x460,
    ScifEri = 0x700,
    ScifRxi = 0x720,
    ScifBri = 0x740,
    ScifTxi = 0x760,
    /// External IRL interrupt; the INTEVT code is derived from the level.
    ExternalIrl = 0x200,
}

/// Peripheral interrupt lines into the INTC.  IRL is handled separately
/// because its priority comes from the pin level, not from IPR*.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Sh4IrqLine {
    Tmu0 = 0,
    Tmu1 = 1,
    Tmu2 = 2,
    Rtc = 3,
    Scif = 4,
    Dmac = 5,
    Gpio = 6,
}

const IRQ_LINE_COUNT: usize = 7;

/// No interrupt requested on the IRL pins.
pub const IRL_NONE: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingIrq {
    pub code: u32,
    /// `None` means the request came in on the IRL pins.
    pub line: Option<usize>,
}

/// Interrupt-controller state.
#[derive(Debug, Clone)]
pub struct Sh4Intc {
    /// Current IRL pin level (0 = highest priority, 15 = none).
    pub(crate) irl_val: u32,
    pub(crate) irq_lines: [Option<Sh4ExceptionCode>; IRQ_LINE_COUNT],
    pub(crate) pending: Option<PendingIrq>,
}

impl Sh4Intc {
    pub fn new() -> Self {
        Self {
            irl_val: IRL_NONE,
            irq_lines: [None; IRQ_LINE_COUNT],
            pending: None,
        }
    }

    pub fn is_irq_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Default for Sh4Intc {
    fn default() -> Self {
        Self::new()
    }
}

/// INTEVT code for an IRL request at pin level `irl`.
fn irl_intevt_code(irl: u32) -> u32 {
    0x200 + 0x20 * irl
}

/// IPR priority nibble for a peripheral line.
fn line_priority(sh4: &Sh4, line: usize) -> u32 {
    let ipra = sh4.ctrl_reg(CtrlReg::Ipra);
    let iprc = sh4.ctrl_reg(CtrlReg::Iprc);
    match line {
        0 => (ipra >> 12) & 0xf, // TMU0
        1 => (ipra >> 8) & 0xf,  // TMU1
        2 => (ipra >> 4) & 0xf,  // TMU2
        3 => ipra & 0xf,         // RTC
        4 => (iprc >> 4) & 0xf,  // SCIF
        5 => (iprc >> 8) & 0xf,  // DMAC
        _ => (iprc >> 12) & 0xf, // GPIO
    }
}

/// Recompute the accepted-interrupt cache.  Call after anything that can
/// change acceptance: line state, IRL pins, IPR* writes, or SR.
pub(crate) fn refresh_intc(sh4: &mut Sh4) {
    sh4.intc.pending = None;

    if sh4.sr() & sr::BL != 0 {
        return;
    }
    let imask = sh4.imask();

    let mut best: Option<(u32, PendingIrq)> = None;

    if sh4.intc.irl_val < IRL_NONE {
        let priority = 15 - sh4.intc.irl_val;
        if priority > imask {
            best = Some((
                priority,
                PendingIrq {
                    code: irl_intevt_code(sh4.intc.irl_val),
                    line: None,
                },
            ));
        }
    }

    for line in 0..IRQ_LINE_COUNT {
        if let Some(code) = sh4.intc.irq_lines[line] {
            let priority = line_priority(sh4, line);
            if priority > imask && best.map_or(true, |(p, _)| priority > p) {
                best = Some((
                    priority,
                    PendingIrq {
                        code: code as u32,
                        line: Some(line),
                    },
                ));
            }
        }
    }

    sh4.intc.pending = best.map(|(_, irq)| irq);
}

/// Assert a peripheral interrupt line.
pub fn set_interrupt(sh4: &mut Sh4, line: Sh4IrqLine, code: Sh4ExceptionCode) {
    sh4.intc.irq_lines[line as usize] = Some(code);
    refresh_intc(sh4);
}

/// Drop a peripheral interrupt line.
pub fn clear_interrupt(sh4: &mut Sh4, line: Sh4IrqLine) {
    sh4.intc.irq_lines[line as usize] = None;
    refresh_intc(sh4);
}

/// Drive the IRL pins (0 = highest priority request, 15 = none).  The Holly
/// interrupt controller is the only caller on a Dreamcast.
pub fn set_irl_interrupt(sh4: &mut Sh4, irl: u32) {
    sh4.intc.irl_val = irl & 0xf;
    refresh_intc(sh4);
}

/// Common exception-entry mechanics.  `vector` is the offset from VBR.
fn enter(sh4: &mut Sh4, vector: u32) {
    sh4.ssr = sh4.sr();
    sh4.spc = sh4.pc;
    sh4.sgr = sh4.gen_reg(15);
    sh4.set_sr(sh4.sr() | sr::MD | sr::RB | sr::BL);
    sh4.pc = sh4.vbr.wrapping_add(vector);
    sh4.exec_state = ExecState::Norm;
    sh4.block_abort = true;
}

/// Raise a synchronous (guest-visible) exception.  The dispatch loop resumes
/// at the exception vector on the next iteration.
pub fn set_exception(sh4: &mut Sh4, code: Sh4ExceptionCode) {
    match code {
        Sh4ExceptionCode::PowerOnReset | Sh4ExceptionCode::ManualReset => {
            if code == Sh4ExceptionCode::ManualReset {
                super::reg::manual_reset(sh4);
            }
            sh4.set_ctrl_reg(CtrlReg::Expevt, code as u32);
            sh4.set_sr(super::SR_RESET);
            sh4.pc = RESET_PC;
        }
        Sh4ExceptionCode::TlbMissRead | Sh4ExceptionCode::TlbMissWrite => {
            sh4.set_ctrl_reg(CtrlReg::Expevt, code as u32);
            enter(sh4, 0x400);
        }
        _ => {
            sh4.set_ctrl_reg(CtrlReg::Expevt, code as u32);
            enter(sh4, 0x100);
        }
    }
}

/// Accept the cached pending interrupt, if any.  Must not be called between
/// a delayed branch and its slot.
pub(crate) fn accept_pending_irq(sh4: &mut Sh4) {
    let Some(irq) = sh4.intc.pending.take() else {
        return;
    };

    sh4.set_ctrl_reg(CtrlReg::Intevt, irq.code);
    enter(sh4, 0x600);

    match irq.line {
        // clear the served IRL request; Holly re-asserts if still pending
        None => sh4.intc.irl_val = IRL_NONE,
        Some(line) => sh4.intc.irq_lines[line] = None,
    }
    refresh_intc(sh4);
}

/// Check the interrupt lines and enter interrupt state if permitted.  A
/// delayed branch and its slot are atomic, so nothing is accepted in
/// between.
#[inline]
pub(crate) fn check_interrupts(sh4: &mut Sh4) {
    if !sh4.delayed_branch && sh4.intc.pending.is_some() {
        accept_pending_irq(sh4);
    }
}

#[inline]
pub(crate) fn check_interrupts_no_delay_branch_check(sh4: &mut Sh4) {
    if sh4.intc.pending.is_some() {
        accept_pending_irq(sh4);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::Clock;

    fn unmasked_sh4() -> Sh4 {
        let mut clk = Clock::new();
        let mut sh4 = Sh4::new(&mut clk);
        // drop BL and open the interrupt mask
        sh4.set_sr(sh4.sr() & !(sr::BL | sr::IMASK_MASK));
        sh4
    }

    #[test]
    fn test_tmu_interrupt_accepted_when_unmasked() {
        let mut sh4 = unmasked_sh4();
        sh4.vbr = 0x8c00_0000;
        sh4.set_ctrl_reg(CtrlReg::Ipra, 0xf000);
        set_interrupt(&mut sh4, Sh4IrqLine::Tmu0, Sh4ExceptionCode::Tmu0Tuni0);
        assert!(sh4.intc.is_irq_pending());

        let old_pc = sh4.pc;
        check_interrupts(&mut sh4);
        assert_eq!(sh4.pc, 0x8c00_0600);
        assert_eq!(sh4.spc, old_pc);
        assert_eq!(
            sh4.ctrl_reg(CtrlReg::Intevt),
            Sh4ExceptionCode::Tmu0Tuni0 as u32
        );
        assert!(sh4.sr() & sr::BL != 0);
    }

    #[test]
    fn test_bl_blocks_interrupts() {
        let mut sh4 = unmasked_sh4();
        sh4.set_ctrl_reg(CtrlReg::Ipra, 0xf000);
        sh4.set_sr(sh4.sr() | sr::BL);
        set_interrupt(&mut sh4, Sh4IrqLine::Tmu0, Sh4ExceptionCode::Tmu0Tuni0);
        assert!(!sh4.intc.is_irq_pending());

        // lowering BL re-evaluates acceptance
        sh4.set_sr(sh4.sr() & !sr::BL);
        refresh_intc(&mut sh4);
        assert!(sh4.intc.is_irq_pending());
    }

    #[test]
    fn test_imask_blocks_low_priority() {
        let mut sh4 = unmasked_sh4();
        sh4.set_sr((sh4.sr() & !sr::IMASK_MASK) | (8 << sr::IMASK_SHIFT));
        sh4.set_ctrl_reg(CtrlReg::Ipra, 0x8000); // TMU0 priority 8, not > 8
        set_interrupt(&mut sh4, Sh4IrqLine::Tmu0, Sh4ExceptionCode::Tmu0Tuni0);
        assert!(!sh4.intc.is_irq_pending());

        sh4.set_ctrl_reg(CtrlReg::Ipra, 0x9000);
        refresh_intc(&mut sh4);
        assert!(sh4.intc.is_irq_pending());
    }

    #[test]
    fn test_delay_slot_defers_acceptance() {
        let mut sh4 = unmasked_sh4();
        sh4.set_ctrl_reg(CtrlReg::Ipra, 0xf000);
        sh4.delayed_branch = true;
        set_interrupt(&mut sh4, Sh4IrqLine::Tmu0, Sh4ExceptionCode::Tmu0Tuni0);

        let old_pc = sh4.pc;
        check_interrupts(&mut sh4);
        assert_eq!(sh4.pc, old_pc);
        assert!(sh4.intc.is_irq_pending());
    }

    #[test]
    fn test_irl_mapping() {
        let mut sh4 = unmasked_sh4();
        sh4.vbr = 0x8c00_0000;
        set_irl_interrupt(&mut sh4, 9);
        assert!(sh4.intc.is_irq_pending());

        check_interrupts(&mut sh4);
        // IRL 9 -> INTEVT 0x320
        assert_eq!(sh4.ctrl_reg(CtrlReg::Intevt), 0x320);
        assert_eq!(sh4.intc.irl_val, IRL_NONE);
    }

    #[test]
    fn test_trapa_style_exception_entry() {
        let mut sh4 = unmasked_sh4();
        sh4.vbr = 0x8c00_0000;
        sh4.pc = 0x8c01_0000;
        set_exception(&mut sh4, Sh4ExceptionCode::GeneralIllegalInst);
        assert_eq!(sh4.pc, 0x8c00_0100);
        assert_eq!(sh4.spc, 0x8c01_0000);
        assert_eq!(
            sh4.ctrl_reg(CtrlReg::Expevt),
            Sh4ExceptionCode::GeneralIllegalInst as u32
        );
    }
}
