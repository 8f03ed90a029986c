//! SH4 timer unit.
//!
//! Three down-counters (TCNT0-2) with reload registers and per-channel
//! clock dividers.  Rather than ticking every virtual cycle, each channel
//! keeps the SH4 cycle stamp of its last synchronisation plus a residue in
//! sub-divisor units; `sync` folds the elapsed time into the counter.  Sync
//! runs before every observable access to the channel's registers and from
//! the channel's own scheduled underflow event, so no read or write ever
//! sees a stale counter.

use super::{excp, CtrlReg, Sh4, Sh4ExceptionCode, Sh4IrqLine};
use crate::error::{DcResult, ErrorRecord};
use crate::sched::{Clock, EventHandle, SH4_CLOCK_SCALE};

/// TCR fields.
pub mod tcr {
    /// Clock-select (divider) field.
    pub const TPSC_MASK: u32 = 0x7;
    /// Underflow interrupt enable.
    pub const UNIE: u32 = 1 << 5;
    /// Underflow flag.
    pub const UNF: u32 = 1 << 8;
    /// Input-capture flag (channel 2 only).
    pub const ICPF: u32 = 1 << 9;
}

const TCNT_REGS: [CtrlReg; 3] = [CtrlReg::Tcnt0, CtrlReg::Tcnt1, CtrlReg::Tcnt2];
const TCOR_REGS: [CtrlReg; 3] = [CtrlReg::Tcor0, CtrlReg::Tcor1, CtrlReg::Tcor2];
const TCR_REGS: [CtrlReg; 3] = [CtrlReg::Tcr0, CtrlReg::Tcr1, CtrlReg::Tcr2];

#[derive(Debug, Clone)]
pub struct Sh4Tmu {
    stamp_last_sync: [u64; 3],
    chan_accum: [u64; 3],
    chan_unf: [bool; 3],
    chan_event_scheduled: [bool; 3],
    chan_event: [EventHandle; 3],
}

impl Sh4Tmu {
    pub fn new(chan_event: [EventHandle; 3]) -> Self {
        Self {
            stamp_last_sync: [0; 3],
            chan_accum: [0; 3],
            chan_unf: [false; 3],
            chan_event_scheduled: [false; 3],
            chan_event,
        }
    }
}

/// Current time in SH4 cycles.
#[inline]
fn sh4_cycle_stamp(clk: &Clock) -> u64 {
    clk.cycle_stamp() / SH4_CLOCK_SCALE
}

#[inline]
fn chan_enabled(sh4: &Sh4, chan: usize) -> bool {
    sh4.ctrl_reg(CtrlReg::Tstr) & (1 << chan) != 0
}

#[inline]
fn chan_int_enabled(sh4: &Sh4, chan: usize) -> bool {
    sh4.ctrl_reg(TCR_REGS[chan]) & tcr::UNIE != 0
}

/// SH4 cycles per counter decrement for the channel's selected prescaler.
fn chan_clock_div(sh4: &Sh4, chan: usize) -> DcResult<u64> {
    match sh4.ctrl_reg(TCR_REGS[chan]) & tcr::TPSC_MASK {
        0 => Ok(4),
        1 => Ok(16),
        2 => Ok(64),
        3 => Ok(256),
        4 => Ok(1024),
        bad => Err(ErrorRecord::new(crate::error::ErrorKind::InvalidParam)
            .feature("TMU external or RTC clock source")
            .value(bad)),
    }
}

fn chan_raise_int(sh4: &mut Sh4, chan: usize) {
    let (line, code) = match chan {
        0 => (Sh4IrqLine::Tmu0, Sh4ExceptionCode::Tmu0Tuni0),
        1 => (Sh4IrqLine::Tmu1, Sh4ExceptionCode::Tmu1Tuni1),
        _ => (Sh4IrqLine::Tmu2, Sh4ExceptionCode::Tmu2Tuni2),
    };
    excp::set_interrupt(sh4, line, code);
}

/// Fold elapsed time into the channel.  Sets the channel's pending-underflow
/// marker and TCR.UNF but leaves interrupt raising to the event handler.
pub(crate) fn chan_sync(sh4: &mut Sh4, clk: &Clock, chan: usize) -> DcResult<()> {
    let stamp_cur = sh4_cycle_stamp(clk);
    let elapsed = stamp_cur.wrapping_sub(sh4.tmu.stamp_last_sync[chan]);
    sh4.tmu.stamp_last_sync[chan] = stamp_cur;

    if elapsed == 0 || !chan_enabled(sh4, chan) {
        return Ok(());
    }

    let div = chan_clock_div(sh4, chan)?;
    sh4.tmu.chan_accum[chan] += elapsed;

    if sh4.tmu.chan_accum[chan] >= div {
        let chan_cycles = sh4.tmu.chan_accum[chan] / div;
        let tcnt = sh4.ctrl_reg(TCNT_REGS[chan]) as u64;
        if chan_cycles > tcnt {
            sh4.tmu.chan_unf[chan] = true;
            let reload = sh4.ctrl_reg(TCOR_REGS[chan]);
            sh4.set_ctrl_reg(TCNT_REGS[chan], reload);
            let tcr_val = sh4.ctrl_reg(TCR_REGS[chan]);
            sh4.set_ctrl_reg(TCR_REGS[chan], tcr_val | tcr::UNF);
        } else {
            sh4.set_ctrl_reg(TCNT_REGS[chan], (tcnt - chan_cycles) as u32);
        }
        sh4.tmu.chan_accum[chan] %= div;
    }
    Ok(())
}

/// SH4 cycles until the channel's next underflow, assuming current
/// conditions hold.  Callers sync first.
fn next_chan_event(sh4: &Sh4, chan: usize) -> DcResult<u64> {
    let div = chan_clock_div(sh4, chan)?;
    let tcnt = sh4.ctrl_reg(TCNT_REGS[chan]) as u64;
    Ok((tcnt + 1) * div - sh4.tmu.chan_accum[chan])
}

fn chan_event_unsched(sh4: &mut Sh4, clk: &mut Clock, chan: usize) {
    clk.cancel_event(sh4.tmu.chan_event[chan]);
    sh4.tmu.chan_event_scheduled[chan] = false;
}

/// Book the channel's next underflow event.  A channel that is running with
/// interrupts disabled still gets its event: the reload and the UNF flag
/// have to happen on time either way.
fn chan_event_sched_next(sh4: &mut Sh4, clk: &mut Clock, chan: usize) -> DcResult<()> {
    if !chan_enabled(sh4, chan) {
        sh4.tmu.chan_event_scheduled[chan] = false;
        return Ok(());
    }

    let next = next_chan_event(sh4, chan)?;
    let when = (next + sh4_cycle_stamp(clk)) * SH4_CLOCK_SCALE;
    sh4.tmu.chan_event_scheduled[chan] = true;
    clk.sched_event(sh4.tmu.chan_event[chan], when);
    Ok(())
}

/// The channel's scheduled event fired (it is already unlinked).
pub fn on_chan_event(sh4: &mut Sh4, clk: &mut Clock, chan: usize) -> DcResult<()> {
    sh4.tmu.chan_event_scheduled[chan] = false;
    chan_sync(sh4, clk, chan)?;
    chan_event_sched_next(sh4, clk, chan)?;

    if sh4.tmu.chan_unf[chan] {
        sh4.tmu.chan_unf[chan] = false;
        if chan_int_enabled(sh4, chan) {
            chan_raise_int(sh4, chan);
        }
    }
    Ok(())
}

/// TSTR write: sync every channel against the old state, clear the residue
/// of channels being toggled, then rebook events under the new state.
pub fn tstr_write(sh4: &mut Sh4, clk: &mut Clock, val: u32) {
    let new = val & 7;
    let old = sh4.ctrl_reg(CtrlReg::Tstr);

    for chan in 0..3 {
        if chan_sync(sh4, clk, chan).is_err() {
            continue;
        }
        if (old ^ new) & (1 << chan) != 0 {
            sh4.tmu.chan_accum[chan] = 0;
        }
    }

    sh4.set_ctrl_reg(CtrlReg::Tstr, new);

    for chan in 0..3 {
        if sh4.tmu.chan_event_scheduled[chan] {
            chan_event_unsched(sh4, clk, chan);
        }
        let _ = chan_event_sched_next(sh4, clk, chan);
    }
}

pub fn tcr_read(sh4: &mut Sh4, clk: &mut Clock, chan: usize) -> DcResult<u32> {
    chan_sync(sh4, clk, chan)?;
    Ok(sh4.ctrl_reg(TCR_REGS[chan]))
}

pub fn tcr_write(sh4: &mut Sh4, clk: &mut Clock, chan: usize, val: u32) -> DcResult<()> {
    chan_sync(sh4, clk, chan)?;

    let old_val = sh4.ctrl_reg(TCR_REGS[chan]);
    let mut new_val = val & 0xffff;

    // the status flags are clear-only from software
    if new_val & tcr::ICPF != 0 && old_val & tcr::ICPF == 0 {
        new_val &= !tcr::ICPF;
    }
    if new_val & tcr::UNF != 0 && old_val & tcr::UNF == 0 {
        new_val &= !tcr::UNF;
    }

    if (old_val ^ new_val) & tcr::TPSC_MASK != 0 {
        // changing clock source drops the accumulated residue
        sh4.tmu.chan_accum[chan] = 0;
    }

    sh4.set_ctrl_reg(TCR_REGS[chan], new_val);
    chan_sync(sh4, clk, chan)?;

    if sh4.tmu.chan_event_scheduled[chan] {
        chan_event_unsched(sh4, clk, chan);
    }
    chan_event_sched_next(sh4, clk, chan)
}

pub fn tcnt_read(sh4: &mut Sh4, clk: &mut Clock, chan: usize) -> u32 {
    let _ = chan_sync(sh4, clk, chan);
    sh4.ctrl_reg(TCNT_REGS[chan])
}

pub fn tcnt_write(sh4: &mut Sh4, clk: &mut Clock, chan: usize, val: u32) {
    let _ = chan_sync(sh4, clk, chan);
    sh4.set_ctrl_reg(TCNT_REGS[chan], val);
    let _ = chan_sync(sh4, clk, chan);

    if sh4.tmu.chan_event_scheduled[chan] {
        chan_event_unsched(sh4, clk, chan);
    }
    let _ = chan_event_sched_next(sh4, clk, chan);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::EventKind;
    use crate::sh4::sr;

    fn fresh() -> (Sh4, Clock) {
        let mut clk = Clock::new();
        let mut sh4 = Sh4::new(&mut clk);
        sh4.set_sr(sh4.sr() & !(sr::BL | sr::IMASK_MASK));
        sh4.set_ctrl_reg(CtrlReg::Ipra, 0xf000);
        (sh4, clk)
    }

    /// Program channel 0: TCNT=TCOR=count, divider /4, interrupts on.
    fn program_chan0(sh4: &mut Sh4, clk: &mut Clock, count: u32) {
        tcr_write(sh4, clk, 0, tcr::UNIE).unwrap();
        sh4.set_ctrl_reg(CtrlReg::Tcor0, count);
        tcnt_write(sh4, clk, 0, count);
        tstr_write(sh4, clk, 1);
    }

    fn advance_sh4_cycles(sh4: &mut Sh4, clk: &mut Clock, cycles: u64) {
        clk.set_cycle_stamp(clk.cycle_stamp() + cycles * SH4_CLOCK_SCALE);
        while let Some((ev, kind)) = clk.pop_due_event() {
            match kind {
                EventKind::TmuChan(chan) => {
                    assert_eq!(ev, sh4.tmu.chan_event[chan as usize]);
                    on_chan_event(sh4, clk, chan as usize).unwrap();
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn test_underflow_after_16_cycles() {
        let (mut sh4, mut clk) = fresh();
        program_chan0(&mut sh4, &mut clk, 3);

        // the event is booked 16 SH4 cycles (432 ticks) out
        assert_eq!(clk.event_when(sh4.tmu.chan_event[0]), 16 * SH4_CLOCK_SCALE);

        advance_sh4_cycles(&mut sh4, &mut clk, 16);

        assert_ne!(sh4.ctrl_reg(CtrlReg::Tcr0) & tcr::UNF, 0);
        assert_eq!(sh4.ctrl_reg(CtrlReg::Tcnt0), 3);
        // TUNI0 is pending and gets accepted at the next boundary
        excp::check_interrupts(&mut sh4);
        assert_eq!(
            sh4.ctrl_reg(CtrlReg::Intevt),
            Sh4ExceptionCode::Tmu0Tuni0 as u32
        );
    }

    #[test]
    fn test_counter_decrements_without_underflow() {
        let (mut sh4, mut clk) = fresh();
        program_chan0(&mut sh4, &mut clk, 100);

        advance_sh4_cycles(&mut sh4, &mut clk, 40); // ten decrements
        assert_eq!(tcnt_read(&mut sh4, &mut clk, 0), 90);
        assert_eq!(sh4.ctrl_reg(CtrlReg::Tcr0) & tcr::UNF, 0);
    }

    #[test]
    fn test_residue_carries_partial_ticks() {
        let (mut sh4, mut clk) = fresh();
        program_chan0(&mut sh4, &mut clk, 100);

        advance_sh4_cycles(&mut sh4, &mut clk, 6);
        assert_eq!(tcnt_read(&mut sh4, &mut clk, 0), 99);
        advance_sh4_cycles(&mut sh4, &mut clk, 2);
        // 6 + 2 = 8 cycles = two full divider periods
        assert_eq!(tcnt_read(&mut sh4, &mut clk, 0), 98);
    }

    #[test]
    fn test_disabled_channel_does_not_count() {
        let (mut sh4, mut clk) = fresh();
        tcr_write(&mut sh4, &mut clk, 0, 0).unwrap();
        tcnt_write(&mut sh4, &mut clk, 0, 50);

        advance_sh4_cycles(&mut sh4, &mut clk, 400);
        assert_eq!(tcnt_read(&mut sh4, &mut clk, 0), 50);
        assert!(!sh4.tmu.chan_event_scheduled[0]);
    }

    #[test]
    fn test_stopping_clears_pending_event() {
        let (mut sh4, mut clk) = fresh();
        program_chan0(&mut sh4, &mut clk, 3);
        assert!(sh4.tmu.chan_event_scheduled[0]);

        tstr_write(&mut sh4, &mut clk, 0);
        assert!(!sh4.tmu.chan_event_scheduled[0]);
        assert!(!clk.event_is_scheduled(sh4.tmu.chan_event[0]));
    }

    #[test]
    fn test_unf_is_clear_only() {
        let (mut sh4, mut clk) = fresh();
        program_chan0(&mut sh4, &mut clk, 3);
        advance_sh4_cycles(&mut sh4, &mut clk, 16);
        assert_ne!(sh4.ctrl_reg(CtrlReg::Tcr0) & tcr::UNF, 0);

        // writing UNF back clears it; writing it into a clear register
        // cannot set it
        tcr_write(&mut sh4, &mut clk, 0, tcr::UNIE).unwrap();
        assert_eq!(sh4.ctrl_reg(CtrlReg::Tcr0) & tcr::UNF, 0);
        tcr_write(&mut sh4, &mut clk, 0, tcr::UNIE | tcr::UNF).unwrap();
        assert_eq!(sh4.ctrl_reg(CtrlReg::Tcr0) & tcr::UNF, 0);
    }

    #[test]
    fn test_no_interrupt_without_unie() {
        let (mut sh4, mut clk) = fresh();
        tcr_write(&mut sh4, &mut clk, 0, 0).unwrap();
        sh4.set_ctrl_reg(CtrlReg::Tcor0, 3);
        tcnt_write(&mut sh4, &mut clk, 0, 3);
        tstr_write(&mut sh4, &mut clk, 1);

        advance_sh4_cycles(&mut sh4, &mut clk, 16);
        // reload and flag still happen, no interrupt is taken
        assert_ne!(sh4.ctrl_reg(CtrlReg::Tcr0) & tcr::UNF, 0);
        assert_eq!(sh4.ctrl_reg(CtrlReg::Tcnt0), 3);
        excp::check_interrupts(&mut sh4);
        assert_eq!(sh4.ctrl_reg(CtrlReg::Intevt), 0);
    }

    #[test]
    fn test_divider_change_resets_residue() {
        let (mut sh4, mut clk) = fresh();
        program_chan0(&mut sh4, &mut clk, 100);
        advance_sh4_cycles(&mut sh4, &mut clk, 3);
        assert_eq!(sh4.tmu.chan_accum[0], 3);

        tcr_write(&mut sh4, &mut clk, 0, tcr::UNIE | 1).unwrap(); // /16
        assert_eq!(sh4.tmu.chan_accum[0], 0);
    }

    #[test]
    fn test_invalid_clock_source_is_reported() {
        let (mut sh4, mut clk) = fresh();
        assert!(tcr_write(&mut sh4, &mut clk, 0, 7).is_err() || {
            // the write stores TPSC=7 before the resched fails; a following
            // sync on an enabled channel reports it
            sh4.set_ctrl_reg(CtrlReg::Tstr, 1);
            clk.set_cycle_stamp(clk.cycle_stamp() + SH4_CLOCK_SCALE);
            chan_sync(&mut sh4, &clk, 0).is_err()
        });
    }
}
