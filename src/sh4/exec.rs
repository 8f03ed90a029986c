//! SH4 opcode semantics and the fetch-decode-execute driver.
//!
//! Every handler advances PC itself: ordinary instructions step past
//! themselves, immediate branches assign PC outright, and delayed branches
//! arm the pending-branch state so the next instruction executes in the
//! slot before control transfers.  The driver commits the pending branch
//! atomically with the slot instruction; no interrupt is accepted in
//! between.

use super::excp::{self, Sh4ExceptionCode};
use super::inst::{self, Inst, OpDef};
use super::{fpscr, mem, sr, CtrlReg, ExecState, Sh4};
use crate::error::DcResult;
use crate::hw::HwDevices;
use crate::sched::Clock;

/// Writable bits of SR.
const SR_MASK: u32 = 0x7000_83f3;

#[inline]
fn rn(inst: Inst) -> usize {
    ((inst >> 8) & 0xf) as usize
}

#[inline]
fn rm(inst: Inst) -> usize {
    ((inst >> 4) & 0xf) as usize
}

#[inline]
fn imm8_s(inst: Inst) -> i32 {
    (inst & 0xff) as i8 as i32
}

#[inline]
fn imm8_u(inst: Inst) -> u32 {
    (inst & 0xff) as u32
}

#[inline]
fn disp4(inst: Inst) -> u32 {
    (inst & 0xf) as u32
}

#[inline]
fn disp12_s(inst: Inst) -> i32 {
    ((inst as i32) << 20) >> 20
}

/// Execute one instruction.  Returns the cycle cost charged against the
/// clock.  Guest-visible exceptions are folded into the CPU state; only
/// host-level failures surface as errors.
pub fn exec_one(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices) -> DcResult<u32> {
    excp::check_interrupts(sh4);

    let pc = sh4.pc;
    let raw = mem::fetch_inst(sh4, hw, pc)?;
    let op = inst::decode(raw);
    let cycles = inst::count_inst_cycles(sh4, op);
    do_exec_inst(sh4, clk, hw, raw, op)?;
    sh4.cycles_executed += cycles as u64;
    Ok(cycles)
}

/// Run `op` including the delayed-branch commit rules.
pub fn do_exec_inst(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    raw: Inst,
    op: &OpDef,
) -> DcResult<()> {
    if sh4.delayed_branch && op.is_branch {
        // a branch cannot live in a delay slot
        excp::set_exception(sh4, Sh4ExceptionCode::SlotIllegalInst);
        sh4.delayed_branch = false;
        return Ok(());
    }

    let pending_branch = sh4.delayed_branch;
    let pending_branch_addr = sh4.delayed_branch_addr;

    sh4.block_abort = false;
    (op.handler)(sh4, clk, hw, raw)?;

    if sh4.block_abort {
        // an exception redirected PC; any pending branch dies with the
        // interrupted context
        sh4.delayed_branch = false;
    } else if pending_branch {
        sh4.pc = pending_branch_addr;
        sh4.delayed_branch = false;
        // anything raised during the slot was deferred until here
        excp::check_interrupts_no_delay_branch_check(sh4);
    }
    Ok(())
}

pub fn op_invalid(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, raw: Inst) -> DcResult<()> {
    log::debug!(
        "sh4: undecodable instruction {raw:#06x} at {:#010x}",
        sh4.pc
    );
    let code = if sh4.delayed_branch {
        Sh4ExceptionCode::SlotIllegalInst
    } else {
        Sh4ExceptionCode::GeneralIllegalInst
    };
    excp::set_exception(sh4, code);
    Ok(())
}

// ---------------------------------------------------------------------------
// system / flag ops

pub fn op_nop(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, _i: Inst) -> DcResult<()> {
    sh4.next_inst();
    Ok(())
}

pub fn op_clrt(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, _i: Inst) -> DcResult<()> {
    sh4.set_t_flag(false);
    sh4.next_inst();
    Ok(())
}

pub fn op_sett(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, _i: Inst) -> DcResult<()> {
    sh4.set_t_flag(true);
    sh4.next_inst();
    Ok(())
}

pub fn op_clrmac(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, _i: Inst) -> DcResult<()> {
    sh4.mach = 0;
    sh4.macl = 0;
    sh4.next_inst();
    Ok(())
}

pub fn op_clrs(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, _i: Inst) -> DcResult<()> {
    let val = sh4.sr() & !sr::S;
    sh4.set_sr(val);
    sh4.next_inst();
    Ok(())
}

pub fn op_sets(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, _i: Inst) -> DcResult<()> {
    let val = sh4.sr() | sr::S;
    sh4.set_sr(val);
    sh4.next_inst();
    Ok(())
}

pub fn op_sleep(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, _i: Inst) -> DcResult<()> {
    sh4.exec_state = if sh4.ctrl_reg(CtrlReg::Stbcr) & 0x80 != 0 {
        ExecState::Standby
    } else {
        ExecState::Sleeping
    };
    sh4.next_inst();
    Ok(())
}

pub fn op_trapa(sh4: &mut Sh4, _clk: &mut Clock, hw: &mut HwDevices, raw: Inst) -> DcResult<()> {
    if hw.debugger.is_enabled() {
        // the debug frontend plants TRAPA as its soft breakpoints
        hw.debugger.on_softbreak(raw, sh4.pc);
        return Ok(());
    }
    sh4.set_ctrl_reg(CtrlReg::Tra, imm8_u(raw) << 2);
    sh4.next_inst();
    excp::set_exception(sh4, Sh4ExceptionCode::Trapa);
    Ok(())
}

pub fn op_rte(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, _i: Inst) -> DcResult<()> {
    let target = sh4.spc;
    let saved = sh4.ssr;
    sh4.set_sr(saved);
    sh4.delayed_jump(target);
    sh4.next_inst();
    Ok(())
}

// ---------------------------------------------------------------------------
// data transfer

pub fn op_mov_imm_rn(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    sh4.set_gen_reg(rn(i), imm8_s(i) as u32);
    sh4.next_inst();
    Ok(())
}

pub fn op_mov_rm_rn(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rm(i));
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

pub fn op_movt(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    sh4.set_gen_reg(rn(i), sh4.t_flag() as u32);
    sh4.next_inst();
    Ok(())
}

pub fn op_mova(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let addr = (sh4.pc & !3).wrapping_add(4).wrapping_add(imm8_u(i) * 4);
    sh4.set_gen_reg(0, addr);
    sh4.next_inst();
    Ok(())
}

pub fn op_movw_a_disp_pc_rn(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.pc.wrapping_add(4).wrapping_add(imm8_u(i) * 2);
    let val = mem::read_16(sh4, clk, hw, addr)? as i16 as i32;
    sh4.set_gen_reg(rn(i), val as u32);
    sh4.next_inst();
    Ok(())
}

pub fn op_movl_a_disp_pc_rn(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = (sh4.pc & !3).wrapping_add(4).wrapping_add(imm8_u(i) * 4);
    let val = mem::read_32(sh4, clk, hw, addr)?;
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

macro_rules! store_op {
    ($name:ident, $write:ident, $ty:ty) => {
        pub fn $name(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
            let addr = sh4.gen_reg(rn(i));
            let val = sh4.gen_reg(rm(i)) as $ty;
            mem::$write(sh4, clk, hw, addr, val)?;
            sh4.next_inst();
            Ok(())
        }
    };
}

store_op!(op_movb_rm_arn, write_8, u8);
store_op!(op_movw_rm_arn, write_16, u16);
store_op!(op_movl_rm_arn, write_32, u32);

macro_rules! load_op {
    ($name:ident, $read:ident, $conv:ty) => {
        pub fn $name(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
            let addr = sh4.gen_reg(rm(i));
            let val = mem::$read(sh4, clk, hw, addr)? as $conv as i32;
            sh4.set_gen_reg(rn(i), val as u32);
            sh4.next_inst();
            Ok(())
        }
    };
}

load_op!(op_movb_arm_rn, read_8, i8);
load_op!(op_movw_arm_rn, read_16, i16);

pub fn op_movl_arm_rn(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let addr = sh4.gen_reg(rm(i));
    let val = mem::read_32(sh4, clk, hw, addr)?;
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

macro_rules! store_predec_op {
    ($name:ident, $write:ident, $ty:ty, $sz:expr) => {
        pub fn $name(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
            let addr = sh4.gen_reg(rn(i)).wrapping_sub($sz);
            let val = sh4.gen_reg(rm(i)) as $ty;
            mem::$write(sh4, clk, hw, addr, val)?;
            sh4.set_gen_reg(rn(i), addr);
            sh4.next_inst();
            Ok(())
        }
    };
}

store_predec_op!(op_movb_rm_amrn, write_8, u8, 1);
store_predec_op!(op_movw_rm_amrn, write_16, u16, 2);
store_predec_op!(op_movl_rm_amrn, write_32, u32, 4);

macro_rules! load_postinc_op {
    ($name:ident, $read:ident, $conv:ty, $sz:expr) => {
        pub fn $name(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
            let addr = sh4.gen_reg(rm(i));
            let val = mem::$read(sh4, clk, hw, addr)? as $conv as i32;
            if rn(i) != rm(i) {
                sh4.set_gen_reg(rm(i), addr.wrapping_add($sz));
            }
            sh4.set_gen_reg(rn(i), val as u32);
            sh4.next_inst();
            Ok(())
        }
    };
}

load_postinc_op!(op_movb_armp_rn, read_8, i8, 1);
load_postinc_op!(op_movw_armp_rn, read_16, i16, 2);

pub fn op_movl_armp_rn(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let addr = sh4.gen_reg(rm(i));
    let val = mem::read_32(sh4, clk, hw, addr)?;
    if rn(i) != rm(i) {
        sh4.set_gen_reg(rm(i), addr.wrapping_add(4));
    }
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

pub fn op_movl_rm_a_disp_rn(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gen_reg(rn(i)).wrapping_add(disp4(i) * 4);
    let val = sh4.gen_reg(rm(i));
    mem::write_32(sh4, clk, hw, addr, val)?;
    sh4.next_inst();
    Ok(())
}

pub fn op_movl_a_disp_rm_rn(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gen_reg(rm(i)).wrapping_add(disp4(i) * 4);
    let val = mem::read_32(sh4, clk, hw, addr)?;
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

pub fn op_movb_r0_a_disp_rn(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gen_reg(rm(i)).wrapping_add(disp4(i));
    let val = sh4.gen_reg(0) as u8;
    mem::write_8(sh4, clk, hw, addr, val)?;
    sh4.next_inst();
    Ok(())
}

pub fn op_movw_r0_a_disp_rn(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gen_reg(rm(i)).wrapping_add(disp4(i) * 2);
    let val = sh4.gen_reg(0) as u16;
    mem::write_16(sh4, clk, hw, addr, val)?;
    sh4.next_inst();
    Ok(())
}

pub fn op_movb_a_disp_rm_r0(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gen_reg(rm(i)).wrapping_add(disp4(i));
    let val = mem::read_8(sh4, clk, hw, addr)? as i8 as i32;
    sh4.set_gen_reg(0, val as u32);
    sh4.next_inst();
    Ok(())
}

pub fn op_movw_a_disp_rm_r0(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gen_reg(rm(i)).wrapping_add(disp4(i) * 2);
    let val = mem::read_16(sh4, clk, hw, addr)? as i16 as i32;
    sh4.set_gen_reg(0, val as u32);
    sh4.next_inst();
    Ok(())
}

pub fn op_movb_rm_a_r0_rn(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gen_reg(rn(i)).wrapping_add(sh4.gen_reg(0));
    let val = sh4.gen_reg(rm(i)) as u8;
    mem::write_8(sh4, clk, hw, addr, val)?;
    sh4.next_inst();
    Ok(())
}

pub fn op_movw_rm_a_r0_rn(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gen_reg(rn(i)).wrapping_add(sh4.gen_reg(0));
    let val = sh4.gen_reg(rm(i)) as u16;
    mem::write_16(sh4, clk, hw, addr, val)?;
    sh4.next_inst();
    Ok(())
}

pub fn op_movl_rm_a_r0_rn(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gen_reg(rn(i)).wrapping_add(sh4.gen_reg(0));
    let val = sh4.gen_reg(rm(i));
    mem::write_32(sh4, clk, hw, addr, val)?;
    sh4.next_inst();
    Ok(())
}

pub fn op_movb_a_r0_rm_rn(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gen_reg(rm(i)).wrapping_add(sh4.gen_reg(0));
    let val = mem::read_8(sh4, clk, hw, addr)? as i8 as i32;
    sh4.set_gen_reg(rn(i), val as u32);
    sh4.next_inst();
    Ok(())
}

pub fn op_movw_a_r0_rm_rn(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gen_reg(rm(i)).wrapping_add(sh4.gen_reg(0));
    let val = mem::read_16(sh4, clk, hw, addr)? as i16 as i32;
    sh4.set_gen_reg(rn(i), val as u32);
    sh4.next_inst();
    Ok(())
}

pub fn op_movl_a_r0_rm_rn(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gen_reg(rm(i)).wrapping_add(sh4.gen_reg(0));
    let val = mem::read_32(sh4, clk, hw, addr)?;
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

pub fn op_movb_r0_a_disp_gbr(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gbr.wrapping_add(imm8_u(i));
    let val = sh4.gen_reg(0) as u8;
    mem::write_8(sh4, clk, hw, addr, val)?;
    sh4.next_inst();
    Ok(())
}

pub fn op_movw_r0_a_disp_gbr(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gbr.wrapping_add(imm8_u(i) * 2);
    let val = sh4.gen_reg(0) as u16;
    mem::write_16(sh4, clk, hw, addr, val)?;
    sh4.next_inst();
    Ok(())
}

pub fn op_movl_r0_a_disp_gbr(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gbr.wrapping_add(imm8_u(i) * 4);
    let val = sh4.gen_reg(0);
    mem::write_32(sh4, clk, hw, addr, val)?;
    sh4.next_inst();
    Ok(())
}

pub fn op_movb_a_disp_gbr_r0(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gbr.wrapping_add(imm8_u(i));
    let val = mem::read_8(sh4, clk, hw, addr)? as i8 as i32;
    sh4.set_gen_reg(0, val as u32);
    sh4.next_inst();
    Ok(())
}

pub fn op_movw_a_disp_gbr_r0(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gbr.wrapping_add(imm8_u(i) * 2);
    let val = mem::read_16(sh4, clk, hw, addr)? as i16 as i32;
    sh4.set_gen_reg(0, val as u32);
    sh4.next_inst();
    Ok(())
}

pub fn op_movl_a_disp_gbr_r0(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gbr.wrapping_add(imm8_u(i) * 4);
    let val = mem::read_32(sh4, clk, hw, addr)?;
    sh4.set_gen_reg(0, val);
    sh4.next_inst();
    Ok(())
}

pub fn op_movcal(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let addr = sh4.gen_reg(rn(i));
    let val = sh4.gen_reg(0);
    mem::write_32(sh4, clk, hw, addr, val)?;
    sh4.next_inst();
    Ok(())
}

pub fn op_swapb(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rm(i));
    let swapped = (val & 0xffff_0000) | ((val & 0xff) << 8) | ((val >> 8) & 0xff);
    sh4.set_gen_reg(rn(i), swapped);
    sh4.next_inst();
    Ok(())
}

pub fn op_swapw(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rm(i));
    sh4.set_gen_reg(rn(i), val.rotate_left(16));
    sh4.next_inst();
    Ok(())
}

pub fn op_xtrct(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = (sh4.gen_reg(rn(i)) >> 16) | (sh4.gen_reg(rm(i)) << 16);
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

// ---------------------------------------------------------------------------
// arithmetic

pub fn op_add(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rn(i)).wrapping_add(sh4.gen_reg(rm(i)));
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

pub fn op_add_imm_rn(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rn(i)).wrapping_add(imm8_s(i) as u32);
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

pub fn op_addc(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let lhs = sh4.gen_reg(rn(i)) as u64;
    let rhs = sh4.gen_reg(rm(i)) as u64;
    let sum = lhs + rhs + sh4.t_flag() as u64;
    sh4.set_gen_reg(rn(i), sum as u32);
    sh4.set_t_flag(sum > u32::MAX as u64);
    sh4.next_inst();
    Ok(())
}

pub fn op_addv(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let lhs = sh4.gen_reg(rn(i));
    let rhs = sh4.gen_reg(rm(i));
    let sum = lhs.wrapping_add(rhs);
    sh4.set_gen_reg(rn(i), sum);
    sh4.set_t_flag((!(lhs ^ rhs) & (lhs ^ sum)) >> 31 != 0);
    sh4.next_inst();
    Ok(())
}

pub fn op_sub(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rn(i)).wrapping_sub(sh4.gen_reg(rm(i)));
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

pub fn op_subc(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let lhs = sh4.gen_reg(rn(i)) as u64;
    let rhs = sh4.gen_reg(rm(i)) as u64;
    let borrow = rhs + sh4.t_flag() as u64;
    sh4.set_gen_reg(rn(i), lhs.wrapping_sub(borrow) as u32);
    sh4.set_t_flag(borrow > lhs);
    sh4.next_inst();
    Ok(())
}

pub fn op_subv(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let lhs = sh4.gen_reg(rn(i));
    let rhs = sh4.gen_reg(rm(i));
    let diff = lhs.wrapping_sub(rhs);
    sh4.set_gen_reg(rn(i), diff);
    sh4.set_t_flag(((lhs ^ rhs) & (lhs ^ diff)) >> 31 != 0);
    sh4.next_inst();
    Ok(())
}

pub fn op_neg(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = (sh4.gen_reg(rm(i)) as i32).wrapping_neg();
    sh4.set_gen_reg(rn(i), val as u32);
    sh4.next_inst();
    Ok(())
}

pub fn op_negc(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let rhs = sh4.gen_reg(rm(i)) as u64;
    let borrow = rhs + sh4.t_flag() as u64;
    sh4.set_gen_reg(rn(i), 0u64.wrapping_sub(borrow) as u32);
    sh4.set_t_flag(borrow > 0);
    sh4.next_inst();
    Ok(())
}

pub fn op_dt(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rn(i)).wrapping_sub(1);
    sh4.set_gen_reg(rn(i), val);
    sh4.set_t_flag(val == 0);
    sh4.next_inst();
    Ok(())
}

pub fn op_extub(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rm(i)) & 0xff;
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

pub fn op_extuw(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rm(i)) & 0xffff;
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

pub fn op_extsb(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rm(i)) as u8 as i8 as i32;
    sh4.set_gen_reg(rn(i), val as u32);
    sh4.next_inst();
    Ok(())
}

pub fn op_extsw(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rm(i)) as u16 as i16 as i32;
    sh4.set_gen_reg(rn(i), val as u32);
    sh4.next_inst();
    Ok(())
}

// comparisons

pub fn op_cmpeq(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let t = sh4.gen_reg(rn(i)) == sh4.gen_reg(rm(i));
    sh4.set_t_flag(t);
    sh4.next_inst();
    Ok(())
}

pub fn op_cmpeq_imm_r0(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let t = sh4.gen_reg(0) == imm8_s(i) as u32;
    sh4.set_t_flag(t);
    sh4.next_inst();
    Ok(())
}

pub fn op_cmphs(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let t = sh4.gen_reg(rn(i)) >= sh4.gen_reg(rm(i));
    sh4.set_t_flag(t);
    sh4.next_inst();
    Ok(())
}

pub fn op_cmphi(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let t = sh4.gen_reg(rn(i)) > sh4.gen_reg(rm(i));
    sh4.set_t_flag(t);
    sh4.next_inst();
    Ok(())
}

pub fn op_cmpge(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let t = sh4.gen_reg(rn(i)) as i32 >= sh4.gen_reg(rm(i)) as i32;
    sh4.set_t_flag(t);
    sh4.next_inst();
    Ok(())
}

pub fn op_cmpgt(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let t = (sh4.gen_reg(rn(i)) as i32) > sh4.gen_reg(rm(i)) as i32;
    sh4.set_t_flag(t);
    sh4.next_inst();
    Ok(())
}

pub fn op_cmppz(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let t = sh4.gen_reg(rn(i)) as i32 >= 0;
    sh4.set_t_flag(t);
    sh4.next_inst();
    Ok(())
}

pub fn op_cmppl(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let t = (sh4.gen_reg(rn(i)) as i32) > 0;
    sh4.set_t_flag(t);
    sh4.next_inst();
    Ok(())
}

pub fn op_cmpstr(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let diff = sh4.gen_reg(rn(i)) ^ sh4.gen_reg(rm(i));
    let any_byte_eq = diff.to_le_bytes().iter().any(|&byte| byte == 0);
    sh4.set_t_flag(any_byte_eq);
    sh4.next_inst();
    Ok(())
}

// division steps

pub fn op_div0u(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, _i: Inst) -> DcResult<()> {
    let val = sh4.sr() & !(sr::M | sr::Q | sr::T);
    sh4.set_sr(val);
    sh4.next_inst();
    Ok(())
}

pub fn op_div0s(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let q = sh4.gen_reg(rn(i)) >> 31 != 0;
    let m = sh4.gen_reg(rm(i)) >> 31 != 0;
    let mut val = sh4.sr() & !(sr::M | sr::Q | sr::T);
    if q {
        val |= sr::Q;
    }
    if m {
        val |= sr::M;
    }
    if q != m {
        val |= sr::T;
    }
    sh4.set_sr(val);
    sh4.next_inst();
    Ok(())
}

pub fn op_div1(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let old_q = sh4.sr() & sr::Q != 0;
    let m_flag = sh4.sr() & sr::M != 0;

    let mut q = sh4.gen_reg(rn(i)) & 0x8000_0000 != 0;
    let tmp2 = sh4.gen_reg(rm(i));
    let mut val = (sh4.gen_reg(rn(i)) << 1) | sh4.t_flag() as u32;

    let tmp1;
    if !old_q {
        if !m_flag {
            let tmp0 = val;
            val = val.wrapping_sub(tmp2);
            tmp1 = val > tmp0;
            q = if !q { tmp1 } else { !tmp1 };
        } else {
            let tmp0 = val;
            val = val.wrapping_add(tmp2);
            tmp1 = val < tmp0;
            q = if !q { !tmp1 } else { tmp1 };
        }
    } else if !m_flag {
        let tmp0 = val;
        val = val.wrapping_add(tmp2);
        tmp1 = val < tmp0;
        q = if !q { tmp1 } else { !tmp1 };
    } else {
        let tmp0 = val;
        val = val.wrapping_sub(tmp2);
        tmp1 = val > tmp0;
        q = if !q { !tmp1 } else { tmp1 };
    }
    sh4.set_gen_reg(rn(i), val);

    let mut new_sr = sh4.sr() & !(sr::Q | sr::T);
    if q {
        new_sr |= sr::Q;
    }
    if q == m_flag {
        new_sr |= sr::T;
    }
    sh4.set_sr(new_sr);
    sh4.next_inst();
    Ok(())
}

// multiplies

pub fn op_mull(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    sh4.macl = sh4.gen_reg(rn(i)).wrapping_mul(sh4.gen_reg(rm(i)));
    sh4.next_inst();
    Ok(())
}

pub fn op_muluw(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    sh4.macl = (sh4.gen_reg(rn(i)) & 0xffff).wrapping_mul(sh4.gen_reg(rm(i)) & 0xffff);
    sh4.next_inst();
    Ok(())
}

pub fn op_mulsw(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let lhs = sh4.gen_reg(rn(i)) as i16 as i32;
    let rhs = sh4.gen_reg(rm(i)) as i16 as i32;
    sh4.macl = lhs.wrapping_mul(rhs) as u32;
    sh4.next_inst();
    Ok(())
}

pub fn op_dmulul(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let prod = sh4.gen_reg(rn(i)) as u64 * sh4.gen_reg(rm(i)) as u64;
    sh4.mach = (prod >> 32) as u32;
    sh4.macl = prod as u32;
    sh4.next_inst();
    Ok(())
}

pub fn op_dmulsl(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let prod = sh4.gen_reg(rn(i)) as i32 as i64 * sh4.gen_reg(rm(i)) as i32 as i64;
    sh4.mach = (prod as u64 >> 32) as u32;
    sh4.macl = prod as u32;
    sh4.next_inst();
    Ok(())
}

pub fn op_macl(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let addr_m = sh4.gen_reg(rm(i));
    let addr_n = sh4.gen_reg(rn(i));
    let val_m = mem::read_32(sh4, clk, hw, addr_m)? as i32 as i64;
    let val_n = mem::read_32(sh4, clk, hw, addr_n)? as i32 as i64;
    sh4.set_gen_reg(rm(i), addr_m.wrapping_add(4));
    sh4.set_gen_reg(rn(i), addr_n.wrapping_add(4));

    let acc = (((sh4.mach as u64) << 32) | sh4.macl as u64) as i64;
    let mut sum = acc.wrapping_add(val_m.wrapping_mul(val_n));
    if sh4.sr() & sr::S != 0 {
        // 48-bit saturation
        const MAX: i64 = 0x0000_7fff_ffff_ffff;
        const MIN: i64 = -0x0000_8000_0000_0000;
        sum = sum.clamp(MIN, MAX);
    }
    sh4.mach = (sum as u64 >> 32) as u32;
    sh4.macl = sum as u32;
    sh4.next_inst();
    Ok(())
}

pub fn op_macw(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let addr_m = sh4.gen_reg(rm(i));
    let addr_n = sh4.gen_reg(rn(i));
    let val_m = mem::read_16(sh4, clk, hw, addr_m)? as i16 as i64;
    let val_n = mem::read_16(sh4, clk, hw, addr_n)? as i16 as i64;
    sh4.set_gen_reg(rm(i), addr_m.wrapping_add(2));
    sh4.set_gen_reg(rn(i), addr_n.wrapping_add(2));

    let prod = val_m * val_n;
    if sh4.sr() & sr::S != 0 {
        // 32-bit saturation into MACL; overflow is recorded in MACH bit 0
        let sum = (sh4.macl as i32 as i64) + prod;
        if sum > i32::MAX as i64 {
            sh4.macl = i32::MAX as u32;
            sh4.mach |= 1;
        } else if sum < i32::MIN as i64 {
            sh4.macl = i32::MIN as u32;
            sh4.mach |= 1;
        } else {
            sh4.macl = sum as u32;
        }
    } else {
        let acc = (((sh4.mach as u64) << 32) | sh4.macl as u64) as i64;
        let sum = acc.wrapping_add(prod);
        sh4.mach = (sum as u64 >> 32) as u32;
        sh4.macl = sum as u32;
    }
    sh4.next_inst();
    Ok(())
}

// ---------------------------------------------------------------------------
// logic

pub fn op_and_rm_rn(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rn(i)) & sh4.gen_reg(rm(i));
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

pub fn op_or_rm_rn(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rn(i)) | sh4.gen_reg(rm(i));
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

pub fn op_xor_rm_rn(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rn(i)) ^ sh4.gen_reg(rm(i));
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

pub fn op_not(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = !sh4.gen_reg(rm(i));
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

pub fn op_tst_rm_rn(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let t = sh4.gen_reg(rn(i)) & sh4.gen_reg(rm(i)) == 0;
    sh4.set_t_flag(t);
    sh4.next_inst();
    Ok(())
}

pub fn op_tst_imm_r0(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let t = sh4.gen_reg(0) & imm8_u(i) == 0;
    sh4.set_t_flag(t);
    sh4.next_inst();
    Ok(())
}

pub fn op_and_imm_r0(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(0) & imm8_u(i);
    sh4.set_gen_reg(0, val);
    sh4.next_inst();
    Ok(())
}

pub fn op_or_imm_r0(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(0) | imm8_u(i);
    sh4.set_gen_reg(0, val);
    sh4.next_inst();
    Ok(())
}

pub fn op_xor_imm_r0(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(0) ^ imm8_u(i);
    sh4.set_gen_reg(0, val);
    sh4.next_inst();
    Ok(())
}

pub fn op_tstb_imm_a_r0_gbr(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    let addr = sh4.gbr.wrapping_add(sh4.gen_reg(0));
    let val = mem::read_8(sh4, clk, hw, addr)? as u32;
    sh4.set_t_flag(val & imm8_u(i) == 0);
    sh4.next_inst();
    Ok(())
}

macro_rules! rmw_gbr_op {
    ($name:ident, $operator:tt) => {
        pub fn $name(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
            let addr = sh4.gbr.wrapping_add(sh4.gen_reg(0));
            let val = mem::read_8(sh4, clk, hw, addr)? as u32;
            mem::write_8(sh4, clk, hw, addr, (val $operator imm8_u(i)) as u8)?;
            sh4.next_inst();
            Ok(())
        }
    };
}

rmw_gbr_op!(op_andb_imm_a_r0_gbr, &);
rmw_gbr_op!(op_orb_imm_a_r0_gbr, |);
rmw_gbr_op!(op_xorb_imm_a_r0_gbr, ^);

pub fn op_tasb(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let addr = sh4.gen_reg(rn(i));
    let val = mem::read_8(sh4, clk, hw, addr)?;
    sh4.set_t_flag(val == 0);
    mem::write_8(sh4, clk, hw, addr, val | 0x80)?;
    sh4.next_inst();
    Ok(())
}

// ---------------------------------------------------------------------------
// shifts

pub fn op_shll(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rn(i));
    sh4.set_t_flag(val >> 31 != 0);
    sh4.set_gen_reg(rn(i), val << 1);
    sh4.next_inst();
    Ok(())
}

pub fn op_shal(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    op_shll(sh4, clk, hw, i)
}

pub fn op_shlr(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rn(i));
    sh4.set_t_flag(val & 1 != 0);
    sh4.set_gen_reg(rn(i), val >> 1);
    sh4.next_inst();
    Ok(())
}

pub fn op_shar(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rn(i));
    sh4.set_t_flag(val & 1 != 0);
    sh4.set_gen_reg(rn(i), ((val as i32) >> 1) as u32);
    sh4.next_inst();
    Ok(())
}

macro_rules! shift_imm_op {
    ($name:ident, $operator:tt, $amount:expr) => {
        pub fn $name(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
            let val = sh4.gen_reg(rn(i)) $operator $amount;
            sh4.set_gen_reg(rn(i), val);
            sh4.next_inst();
            Ok(())
        }
    };
}

shift_imm_op!(op_shll2, <<, 2);
shift_imm_op!(op_shll8, <<, 8);
shift_imm_op!(op_shll16, <<, 16);
shift_imm_op!(op_shlr2, >>, 2);
shift_imm_op!(op_shlr8, >>, 8);
shift_imm_op!(op_shlr16, >>, 16);

pub fn op_rotl(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rn(i));
    sh4.set_t_flag(val >> 31 != 0);
    sh4.set_gen_reg(rn(i), val.rotate_left(1));
    sh4.next_inst();
    Ok(())
}

pub fn op_rotr(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rn(i));
    sh4.set_t_flag(val & 1 != 0);
    sh4.set_gen_reg(rn(i), val.rotate_right(1));
    sh4.next_inst();
    Ok(())
}

pub fn op_rotcl(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rn(i));
    let carry_in = sh4.t_flag() as u32;
    sh4.set_t_flag(val >> 31 != 0);
    sh4.set_gen_reg(rn(i), (val << 1) | carry_in);
    sh4.next_inst();
    Ok(())
}

pub fn op_rotcr(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rn(i));
    let carry_in = (sh4.t_flag() as u32) << 31;
    sh4.set_t_flag(val & 1 != 0);
    sh4.set_gen_reg(rn(i), (val >> 1) | carry_in);
    sh4.next_inst();
    Ok(())
}

pub fn op_shad(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let shift = sh4.gen_reg(rm(i)) as i32;
    let val = sh4.gen_reg(rn(i));
    let out = if shift >= 0 {
        val << (shift & 0x1f)
    } else if shift & 0x1f == 0 {
        ((val as i32) >> 31) as u32
    } else {
        ((val as i32) >> (32 - (shift & 0x1f))) as u32
    };
    sh4.set_gen_reg(rn(i), out);
    sh4.next_inst();
    Ok(())
}

pub fn op_shld(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let shift = sh4.gen_reg(rm(i)) as i32;
    let val = sh4.gen_reg(rn(i));
    let out = if shift >= 0 {
        val << (shift & 0x1f)
    } else if shift & 0x1f == 0 {
        0
    } else {
        val >> (32 - (shift & 0x1f))
    };
    sh4.set_gen_reg(rn(i), out);
    sh4.next_inst();
    Ok(())
}

// ---------------------------------------------------------------------------
// branches

pub fn op_bt(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if sh4.t_flag() {
        sh4.pc = sh4
            .pc
            .wrapping_add(4)
            .wrapping_add((imm8_s(i) * 2) as u32);
    } else {
        sh4.next_inst();
    }
    Ok(())
}

pub fn op_bf(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if !sh4.t_flag() {
        sh4.pc = sh4
            .pc
            .wrapping_add(4)
            .wrapping_add((imm8_s(i) * 2) as u32);
    } else {
        sh4.next_inst();
    }
    Ok(())
}

pub fn op_bts(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if sh4.t_flag() {
        let target = sh4
            .pc
            .wrapping_add(4)
            .wrapping_add((imm8_s(i) * 2) as u32);
        sh4.delayed_jump(target);
    }
    sh4.next_inst();
    Ok(())
}

pub fn op_bfs(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if !sh4.t_flag() {
        let target = sh4
            .pc
            .wrapping_add(4)
            .wrapping_add((imm8_s(i) * 2) as u32);
        sh4.delayed_jump(target);
    }
    sh4.next_inst();
    Ok(())
}

pub fn op_bra(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let target = sh4
        .pc
        .wrapping_add(4)
        .wrapping_add((disp12_s(i) * 2) as u32);
    sh4.delayed_jump(target);
    sh4.next_inst();
    Ok(())
}

pub fn op_bsr(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    sh4.pr = sh4.pc.wrapping_add(4);
    let target = sh4
        .pc
        .wrapping_add(4)
        .wrapping_add((disp12_s(i) * 2) as u32);
    sh4.delayed_jump(target);
    sh4.next_inst();
    Ok(())
}

pub fn op_braf(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let target = sh4.pc.wrapping_add(4).wrapping_add(sh4.gen_reg(rn(i)));
    sh4.delayed_jump(target);
    sh4.next_inst();
    Ok(())
}

pub fn op_bsrf(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    sh4.pr = sh4.pc.wrapping_add(4);
    let target = sh4.pc.wrapping_add(4).wrapping_add(sh4.gen_reg(rn(i)));
    sh4.delayed_jump(target);
    sh4.next_inst();
    Ok(())
}

pub fn op_jmp(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    sh4.delayed_jump(sh4.gen_reg(rn(i)));
    sh4.next_inst();
    Ok(())
}

pub fn op_jsr(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    sh4.pr = sh4.pc.wrapping_add(4);
    sh4.delayed_jump(sh4.gen_reg(rn(i)));
    sh4.next_inst();
    Ok(())
}

pub fn op_rts(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, _i: Inst) -> DcResult<()> {
    sh4.delayed_jump(sh4.pr);
    sh4.next_inst();
    Ok(())
}

// ---------------------------------------------------------------------------
// control-register moves

pub fn op_ldc_rm_sr(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rm(i)) & SR_MASK;
    sh4.set_sr(val);
    sh4.next_inst();
    Ok(())
}

macro_rules! ldc_reg_op {
    ($name:ident, $field:ident) => {
        pub fn $name(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
            sh4.$field = sh4.gen_reg(rm(i));
            sh4.next_inst();
            Ok(())
        }
    };
}

ldc_reg_op!(op_ldc_rm_gbr, gbr);
ldc_reg_op!(op_ldc_rm_vbr, vbr);
ldc_reg_op!(op_ldc_rm_ssr, ssr);
ldc_reg_op!(op_ldc_rm_spc, spc);
ldc_reg_op!(op_ldc_rm_dbr, dbr);
ldc_reg_op!(op_lds_rm_mach, mach);
ldc_reg_op!(op_lds_rm_macl, macl);
ldc_reg_op!(op_lds_rm_pr, pr);
ldc_reg_op!(op_lds_rm_fpul, fpul);

pub fn op_lds_rm_fpscr(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.gen_reg(rm(i));
    sh4.set_fpscr(val);
    sh4.next_inst();
    Ok(())
}

pub fn op_ldc_rm_bank(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    // encoding 0100mmmm1nnn1110: the source register sits in the high field
    let val = sh4.gen_reg(rn(i));
    sh4.set_bank_reg(rm(i) & 0x7, val);
    sh4.next_inst();
    Ok(())
}

macro_rules! stc_reg_op {
    ($name:ident, $field:ident) => {
        pub fn $name(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
            let val = sh4.$field;
            sh4.set_gen_reg(rn(i), val);
            sh4.next_inst();
            Ok(())
        }
    };
}

stc_reg_op!(op_stc_gbr_rn, gbr);
stc_reg_op!(op_stc_vbr_rn, vbr);
stc_reg_op!(op_stc_ssr_rn, ssr);
stc_reg_op!(op_stc_spc_rn, spc);
stc_reg_op!(op_stc_sgr_rn, sgr);
stc_reg_op!(op_stc_dbr_rn, dbr);
stc_reg_op!(op_sts_mach_rn, mach);
stc_reg_op!(op_sts_macl_rn, macl);
stc_reg_op!(op_sts_pr_rn, pr);
stc_reg_op!(op_sts_fpul_rn, fpul);

pub fn op_stc_sr_rn(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.sr();
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

pub fn op_sts_fpscr_rn(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.fpscr();
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

pub fn op_stc_bank_rn(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let val = sh4.bank_reg(rm(i) & 0x7);
    sh4.set_gen_reg(rn(i), val);
    sh4.next_inst();
    Ok(())
}

macro_rules! stcl_op {
    ($name:ident, $getter:expr) => {
        pub fn $name(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
            let addr = sh4.gen_reg(rn(i)).wrapping_sub(4);
            let val = $getter(sh4, i);
            mem::write_32(sh4, clk, hw, addr, val)?;
            sh4.set_gen_reg(rn(i), addr);
            sh4.next_inst();
            Ok(())
        }
    };
}

stcl_op!(op_stcl_sr_amrn, |sh4: &mut Sh4, _i| sh4.sr());
stcl_op!(op_stcl_gbr_amrn, |sh4: &mut Sh4, _i| sh4.gbr);
stcl_op!(op_stcl_vbr_amrn, |sh4: &mut Sh4, _i| sh4.vbr);
stcl_op!(op_stcl_ssr_amrn, |sh4: &mut Sh4, _i| sh4.ssr);
stcl_op!(op_stcl_spc_amrn, |sh4: &mut Sh4, _i| sh4.spc);
stcl_op!(op_stcl_sgr_amrn, |sh4: &mut Sh4, _i| sh4.sgr);
stcl_op!(op_stcl_dbr_amrn, |sh4: &mut Sh4, _i| sh4.dbr);
stcl_op!(op_stsl_mach_amrn, |sh4: &mut Sh4, _i| sh4.mach);
stcl_op!(op_stsl_macl_amrn, |sh4: &mut Sh4, _i| sh4.macl);
stcl_op!(op_stsl_pr_amrn, |sh4: &mut Sh4, _i| sh4.pr);
stcl_op!(op_stsl_fpul_amrn, |sh4: &mut Sh4, _i| sh4.fpul);
stcl_op!(op_stsl_fpscr_amrn, |sh4: &mut Sh4, _i| sh4.fpscr());
stcl_op!(op_stcl_bank_amrn, |sh4: &mut Sh4, i| sh4.bank_reg(rm(i) & 0x7));

pub fn op_ldcl_armp_sr(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let addr = sh4.gen_reg(rm(i));
    let val = mem::read_32(sh4, clk, hw, addr)? & SR_MASK;
    sh4.set_sr(val);
    sh4.set_gen_reg(rm(i), addr.wrapping_add(4));
    sh4.next_inst();
    Ok(())
}

macro_rules! ldcl_op {
    ($name:ident, $setter:expr) => {
        pub fn $name(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
            let addr = sh4.gen_reg(rm(i));
            let val = mem::read_32(sh4, clk, hw, addr)?;
            $setter(sh4, i, val);
            sh4.set_gen_reg(rm(i), addr.wrapping_add(4));
            sh4.next_inst();
            Ok(())
        }
    };
}

ldcl_op!(op_ldcl_armp_gbr, |sh4: &mut Sh4, _i, val| sh4.gbr = val);
ldcl_op!(op_ldcl_armp_vbr, |sh4: &mut Sh4, _i, val| sh4.vbr = val);
ldcl_op!(op_ldcl_armp_ssr, |sh4: &mut Sh4, _i, val| sh4.ssr = val);
ldcl_op!(op_ldcl_armp_spc, |sh4: &mut Sh4, _i, val| sh4.spc = val);
ldcl_op!(op_ldcl_armp_dbr, |sh4: &mut Sh4, _i, val| sh4.dbr = val);
ldcl_op!(op_ldsl_armp_mach, |sh4: &mut Sh4, _i, val| sh4.mach = val);
ldcl_op!(op_ldsl_armp_macl, |sh4: &mut Sh4, _i, val| sh4.macl = val);
ldcl_op!(op_ldsl_armp_pr, |sh4: &mut Sh4, _i, val| sh4.pr = val);
ldcl_op!(op_ldsl_armp_fpul, |sh4: &mut Sh4, _i, val| sh4.fpul = val);
ldcl_op!(op_ldsl_armp_fpscr, |sh4: &mut Sh4, _i, val| sh4.set_fpscr(val));

pub fn op_ldcl_armp_bank(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    // encoding 0100mmmm1nnn0111: the address register sits in the high field
    let addr = sh4.gen_reg(rn(i));
    let val = mem::read_32(sh4, clk, hw, addr)?;
    sh4.set_bank_reg(rm(i) & 0x7, val);
    sh4.set_gen_reg(rn(i), addr.wrapping_add(4));
    sh4.next_inst();
    Ok(())
}

// ---------------------------------------------------------------------------
// cache maintenance

pub fn op_pref(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    let addr = sh4.gen_reg(rn(i));
    if (0xe000_0000..=0xe3ff_ffff).contains(&addr) {
        mem::sq_pref(sh4, clk, hw, addr)?;
    }
    sh4.next_inst();
    Ok(())
}

macro_rules! cache_nop_op {
    ($name:ident) => {
        pub fn $name(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, _i: Inst) -> DcResult<()> {
            sh4.next_inst();
            Ok(())
        }
    };
}

cache_nop_op!(op_ocbi);
cache_nop_op!(op_ocbp);
cache_nop_op!(op_ocbwb);

// ---------------------------------------------------------------------------
// floating point

/// FPU availability gate: SR.FD raises the disable exception instead of
/// executing.  Returns true when the instruction must not run.
fn fpu_disabled(sh4: &mut Sh4) -> bool {
    if sh4.sr() & sr::FD != 0 {
        let code = if sh4.delayed_branch {
            Sh4ExceptionCode::SlotFpuDisable
        } else {
            Sh4ExceptionCode::GeneralFpuDisable
        };
        excp::set_exception(sh4, code);
        true
    } else {
        false
    }
}

pub fn op_fldi0(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    sh4.set_fr_f32(rn(i), 0.0);
    sh4.next_inst();
    Ok(())
}

pub fn op_fldi1(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    sh4.set_fr_f32(rn(i), 1.0);
    sh4.next_inst();
    Ok(())
}

pub fn op_flds(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    sh4.fpul = sh4.fr_bits(rn(i));
    sh4.next_inst();
    Ok(())
}

pub fn op_fsts(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    let bits = sh4.fpul;
    sh4.set_fr_bits(rn(i), bits);
    sh4.next_inst();
    Ok(())
}

pub fn op_float(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    let int_val = sh4.fpul as i32;
    if sh4.fpu_double_prec() {
        sh4.set_dr_f64(rn(i) >> 1, int_val as f64);
    } else {
        sh4.set_fr_f32(rn(i), int_val as f32);
    }
    sh4.next_inst();
    Ok(())
}

pub fn op_ftrc(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    let val = if sh4.fpu_double_prec() {
        sh4.dr_f64(rn(i) >> 1)
    } else {
        sh4.fr_f32(rn(i)) as f64
    };
    // truncate toward zero with saturation
    sh4.fpul = if val.is_nan() {
        0x7fff_ffff
    } else {
        (val.trunc().clamp(i32::MIN as f64, i32::MAX as f64)) as i32 as u32
    };
    sh4.next_inst();
    Ok(())
}

macro_rules! fpu_arith_op {
    ($name:ident, $operator:tt) => {
        pub fn $name(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
            if fpu_disabled(sh4) {
                return Ok(());
            }
            if sh4.fpu_double_prec() {
                let val = sh4.dr_f64(rn(i) >> 1) $operator sh4.dr_f64(rm(i) >> 1);
                sh4.set_dr_f64(rn(i) >> 1, val);
            } else {
                let val = sh4.fr_f32(rn(i)) $operator sh4.fr_f32(rm(i));
                sh4.set_fr_f32(rn(i), val);
            }
            sh4.next_inst();
            Ok(())
        }
    };
}

fpu_arith_op!(op_fadd, +);
fpu_arith_op!(op_fsub, -);
fpu_arith_op!(op_fmul, *);
fpu_arith_op!(op_fdiv, /);

pub fn op_fcmpeq(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    let t = if sh4.fpu_double_prec() {
        sh4.dr_f64(rn(i) >> 1) == sh4.dr_f64(rm(i) >> 1)
    } else {
        sh4.fr_f32(rn(i)) == sh4.fr_f32(rm(i))
    };
    sh4.set_t_flag(t);
    sh4.next_inst();
    Ok(())
}

pub fn op_fcmpgt(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    let t = if sh4.fpu_double_prec() {
        sh4.dr_f64(rn(i) >> 1) > sh4.dr_f64(rm(i) >> 1)
    } else {
        sh4.fr_f32(rn(i)) > sh4.fr_f32(rm(i))
    };
    sh4.set_t_flag(t);
    sh4.next_inst();
    Ok(())
}

pub fn op_fneg(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    let bits = sh4.fr_bits(rn(i)) ^ 0x8000_0000;
    sh4.set_fr_bits(rn(i), bits);
    sh4.next_inst();
    Ok(())
}

pub fn op_fabs(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    let bits = sh4.fr_bits(rn(i)) & 0x7fff_ffff;
    sh4.set_fr_bits(rn(i), bits);
    sh4.next_inst();
    Ok(())
}

pub fn op_fsqrt(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    if sh4.fpu_double_prec() {
        let val = sh4.dr_f64(rn(i) >> 1).sqrt();
        sh4.set_dr_f64(rn(i) >> 1, val);
    } else {
        let val = sh4.fr_f32(rn(i)).sqrt();
        sh4.set_fr_f32(rn(i), val);
    }
    sh4.next_inst();
    Ok(())
}

pub fn op_fmac(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    if sh4.fpu_double_prec() {
        // FMAC has no double form
        excp::set_exception(sh4, Sh4ExceptionCode::GeneralIllegalInst);
        return Ok(());
    }
    let val = sh4.fr_f32(0) * sh4.fr_f32(rm(i)) + sh4.fr_f32(rn(i));
    sh4.set_fr_f32(rn(i), val);
    sh4.next_inst();
    Ok(())
}

pub fn op_frchg(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, _i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    let val = sh4.fpscr() ^ fpscr::FR;
    sh4.set_fpscr(val);
    sh4.next_inst();
    Ok(())
}

pub fn op_fschg(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, _i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    let val = sh4.fpscr() ^ fpscr::SZ;
    sh4.set_fpscr(val);
    sh4.next_inst();
    Ok(())
}

/// One half of a 64-bit FMOV pair: DR registers live in the active bank, XD
/// registers in the inactive one.
fn fmov_pair_get(sh4: &Sh4, reg: usize) -> (u32, u32) {
    if reg & 1 == 0 {
        (sh4.fr_bits(reg), sh4.fr_bits(reg + 1))
    } else {
        let base = reg & !1;
        (sh4.xf_bits(base), sh4.xf_bits(base + 1))
    }
}

fn fmov_pair_set(sh4: &mut Sh4, reg: usize, hi: u32, lo: u32) {
    if reg & 1 == 0 {
        sh4.set_fr_bits(reg, hi);
        sh4.set_fr_bits(reg + 1, lo);
    } else {
        let base = reg & !1;
        sh4.set_xf_bits(base, hi);
        sh4.set_xf_bits(base + 1, lo);
    }
}

pub fn op_fmov_frm_frn(sh4: &mut Sh4, _clk: &mut Clock, _hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    if sh4.fpscr() & fpscr::SZ != 0 {
        let (hi, lo) = fmov_pair_get(sh4, rm(i));
        fmov_pair_set(sh4, rn(i), hi, lo);
    } else {
        let bits = sh4.fr_bits(rm(i));
        sh4.set_fr_bits(rn(i), bits);
    }
    sh4.next_inst();
    Ok(())
}

fn fmov_load(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    reg: usize,
    addr: u32,
) -> DcResult<u32> {
    if sh4.fpscr() & fpscr::SZ != 0 {
        let hi = mem::read_32(sh4, clk, hw, addr)?;
        let lo = mem::read_32(sh4, clk, hw, addr.wrapping_add(4))?;
        fmov_pair_set(sh4, reg, hi, lo);
        Ok(8)
    } else {
        let bits = mem::read_32(sh4, clk, hw, addr)?;
        sh4.set_fr_bits(reg, bits);
        Ok(4)
    }
}

fn fmov_store(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    reg: usize,
    addr: u32,
) -> DcResult<u32> {
    if sh4.fpscr() & fpscr::SZ != 0 {
        let (hi, lo) = fmov_pair_get(sh4, reg);
        mem::write_32(sh4, clk, hw, addr, hi)?;
        mem::write_32(sh4, clk, hw, addr.wrapping_add(4), lo)?;
        Ok(8)
    } else {
        let bits = sh4.fr_bits(reg);
        mem::write_32(sh4, clk, hw, addr, bits)?;
        Ok(4)
    }
}

pub fn op_fmov_arm_frn(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    let addr = sh4.gen_reg(rm(i));
    fmov_load(sh4, clk, hw, rn(i), addr)?;
    sh4.next_inst();
    Ok(())
}

pub fn op_fmov_armp_frn(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    let addr = sh4.gen_reg(rm(i));
    let sz = fmov_load(sh4, clk, hw, rn(i), addr)?;
    sh4.set_gen_reg(rm(i), addr.wrapping_add(sz));
    sh4.next_inst();
    Ok(())
}

pub fn op_fmov_frm_arn(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    let addr = sh4.gen_reg(rn(i));
    fmov_store(sh4, clk, hw, rm(i), addr)?;
    sh4.next_inst();
    Ok(())
}

pub fn op_fmov_frm_amrn(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, i: Inst) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    let sz = if sh4.fpscr() & fpscr::SZ != 0 { 8 } else { 4 };
    let addr = sh4.gen_reg(rn(i)).wrapping_sub(sz);
    fmov_store(sh4, clk, hw, rm(i), addr)?;
    sh4.set_gen_reg(rn(i), addr);
    sh4.next_inst();
    Ok(())
}

pub fn op_fmov_a_r0_rm_frn(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    let addr = sh4.gen_reg(rm(i)).wrapping_add(sh4.gen_reg(0));
    fmov_load(sh4, clk, hw, rn(i), addr)?;
    sh4.next_inst();
    Ok(())
}

pub fn op_fmov_frm_a_r0_rn(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    i: Inst,
) -> DcResult<()> {
    if fpu_disabled(sh4) {
        return Ok(());
    }
    let addr = sh4.gen_reg(rn(i)).wrapping_add(sh4.gen_reg(0));
    fmov_store(sh4, clk, hw, rm(i), addr)?;
    sh4.next_inst();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot_rom::BootRom;
    use crate::flash_rom::FlashRom;

    const BASE: u32 = 0x8c01_0000;

    fn machine_with(program: &[u16]) -> (Sh4, Clock, HwDevices) {
        let mut clk = Clock::new();
        let mut sh4 = Sh4::new(&mut clk);
        let mut hw = HwDevices::new(
            &mut clk,
            BootRom::from_bytes(vec![0u8; 16]),
            FlashRom::ephemeral(),
            None,
            None,
        )
        .unwrap();
        for (idx, &word) in program.iter().enumerate() {
            hw.mem
                .write_16((BASE & 0xff_ffff) + idx as u32 * 2, word);
        }
        sh4.pc = BASE;
        (sh4, clk, hw)
    }

    fn step(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices) {
        exec_one(sh4, clk, hw).unwrap();
    }

    #[test]
    fn test_mov_add_sequence() {
        // mov #5, r1 ; mov #3, r2 ; add r2, r1
        let (mut sh4, mut clk, mut hw) = machine_with(&[0xe105, 0xe203, 0x312c]);
        step(&mut sh4, &mut clk, &mut hw);
        step(&mut sh4, &mut clk, &mut hw);
        step(&mut sh4, &mut clk, &mut hw);
        assert_eq!(sh4.gen_reg(1), 8);
        assert_eq!(sh4.pc, BASE + 6);
    }

    #[test]
    fn test_delayed_branch_executes_slot_then_jumps() {
        // bra +8 ; mov #1, r1 (slot) ; mov #2, r2 (skipped) ...
        // target: mov #3, r3
        let (mut sh4, mut clk, mut hw) = machine_with(&[
            0xa002, // bra base+8
            0xe101, // slot: mov #1, r1
            0xe202, // skipped
            0xe303, // skipped
            0xe304, // base+8: mov #4, r3
        ]);
        step(&mut sh4, &mut clk, &mut hw); // bra arms the branch
        assert!(sh4.delayed_branch);
        step(&mut sh4, &mut clk, &mut hw); // slot + commit
        assert_eq!(sh4.gen_reg(1), 1);
        assert_eq!(sh4.pc, BASE + 8);
        step(&mut sh4, &mut clk, &mut hw);
        assert_eq!(sh4.gen_reg(3), 4);
    }

    #[test]
    fn test_two_step_equals_single_run_for_branch_pair() {
        // the branch/slot pair must leave the same register state as
        // executing the two instructions one at a time
        let program = [
            0xe107, // mov #7, r1
            0xa001, // bra +2
            0x7101, // slot: add #1, r1
            0xe1ff, // skipped
            0x7102, // target: add #2, r1
        ];
        let (mut sh4, mut clk, mut hw) = machine_with(&program);
        for _ in 0..4 {
            step(&mut sh4, &mut clk, &mut hw);
        }
        assert_eq!(sh4.gen_reg(1), 10);
    }

    #[test]
    fn test_branch_in_delay_slot_is_illegal() {
        let (mut sh4, mut clk, mut hw) = machine_with(&[
            0xa002, // bra
            0xa000, // bra in the slot: slot-illegal exception
        ]);
        sh4.vbr = 0x8c00_0000;
        step(&mut sh4, &mut clk, &mut hw);
        step(&mut sh4, &mut clk, &mut hw);
        assert_eq!(
            sh4.ctrl_reg(CtrlReg::Expevt),
            Sh4ExceptionCode::SlotIllegalInst as u32
        );
        assert_eq!(sh4.pc, 0x8c00_0100);
    }

    #[test]
    fn test_bt_bf_conditionals() {
        // sett ; bt +0 ; (skipped) ; target: mov #9, r4
        let (mut sh4, mut clk, mut hw) = machine_with(&[0x0018, 0x8900, 0xe4ff, 0xe409]);
        step(&mut sh4, &mut clk, &mut hw);
        step(&mut sh4, &mut clk, &mut hw);
        assert_eq!(sh4.pc, BASE + 6);
        step(&mut sh4, &mut clk, &mut hw);
        assert_eq!(sh4.gen_reg(4), 9);
    }

    #[test]
    fn test_jsr_rts_roundtrip() {
        let (mut sh4, mut clk, mut hw) = machine_with(&[
            0xd102, // mov.l @(disp 2, pc), r1 -> loads literal at base+12
            0x410b, // jsr @r1
            0x0009, // slot nop
            0xe205, // return point: mov #5, r2
            0, 0, // padding
            0x0020, 0x8c01, // literal: 0x8c010020
        ]);
        // subroutine at base+0x20: rts ; nop
        hw.mem.write_16((BASE & 0xff_ffff) + 0x20, 0x000b);
        hw.mem.write_16((BASE & 0xff_ffff) + 0x22, 0x0009);

        for _ in 0..6 {
            step(&mut sh4, &mut clk, &mut hw);
        }
        assert_eq!(sh4.gen_reg(2), 5);
        assert_eq!(sh4.pr, BASE + 6);
    }

    #[test]
    fn test_memory_addressing_forms() {
        let (mut sh4, mut clk, mut hw) = machine_with(&[
            0x2122, // mov.l r2, @r1
            0x6311, // mov.w @r1, r3 (sign extended)
        ]);
        sh4.set_gen_reg(1, 0x8c02_0000);
        sh4.set_gen_reg(2, 0xffff_8001);
        step(&mut sh4, &mut clk, &mut hw);
        step(&mut sh4, &mut clk, &mut hw);
        assert_eq!(sh4.gen_reg(3), 0xffff_8001);
    }

    #[test]
    fn test_post_increment_and_pre_decrement() {
        let (mut sh4, mut clk, mut hw) = machine_with(&[
            0x2526, // mov.l r2, @-r5
            0x6456, // mov.l @r5+, r4
        ]);
        sh4.set_gen_reg(5, 0x8c03_0000);
        sh4.set_gen_reg(2, 0x1234_5678);
        step(&mut sh4, &mut clk, &mut hw);
        assert_eq!(sh4.gen_reg(5), 0x8c02_fffc);
        step(&mut sh4, &mut clk, &mut hw);
        assert_eq!(sh4.gen_reg(4), 0x1234_5678);
        assert_eq!(sh4.gen_reg(5), 0x8c03_0000);
    }

    #[test]
    fn test_addc_carry_chain() {
        let (mut sh4, mut clk, mut hw) = machine_with(&[0x312e, 0x302e]);
        sh4.set_gen_reg(1, 0xffff_ffff);
        sh4.set_gen_reg(2, 1);
        sh4.set_gen_reg(0, 0);
        sh4.set_t_flag(false);
        step(&mut sh4, &mut clk, &mut hw); // addc r2, r1 -> 0, T=1
        assert_eq!(sh4.gen_reg(1), 0);
        assert!(sh4.t_flag());
        step(&mut sh4, &mut clk, &mut hw); // addc r2, r0 -> r0 + 1 + T = 2
        assert_eq!(sh4.gen_reg(0), 2);
        assert!(!sh4.t_flag());
    }

    #[test]
    fn test_unsigned_division_sequence() {
        // canonical 32/32 unsigned division: r1 / r2 via rotcl+div1
        let (mut sh4, mut clk, mut hw) = machine_with(&[0x0009]);
        sh4.set_gen_reg(1, 100);
        sh4.set_gen_reg(2, 7);
        sh4.set_gen_reg(0, 0);

        op_div0u(&mut sh4, &mut clk, &mut hw, 0x0019).unwrap();
        for _ in 0..32 {
            op_rotcl(&mut sh4, &mut clk, &mut hw, 0x4124).unwrap(); // rotcl r1
            op_div1(&mut sh4, &mut clk, &mut hw, 0x3024).unwrap(); // div1 r2, r0
        }
        op_rotcl(&mut sh4, &mut clk, &mut hw, 0x4124).unwrap();
        assert_eq!(sh4.gen_reg(1), 14); // 100 / 7
    }

    #[test]
    fn test_shifts_and_rotates() {
        let (mut sh4, mut clk, mut hw) = machine_with(&[0x0009]);
        sh4.set_gen_reg(3, 0x8000_0001);

        op_shll(&mut sh4, &mut clk, &mut hw, 0x4300).unwrap();
        assert!(sh4.t_flag());
        assert_eq!(sh4.gen_reg(3), 2);

        sh4.set_gen_reg(3, 0x8000_0000);
        op_shar(&mut sh4, &mut clk, &mut hw, 0x4321).unwrap();
        assert_eq!(sh4.gen_reg(3), 0xc000_0000);

        sh4.set_gen_reg(3, 1);
        sh4.set_t_flag(true);
        op_rotcr(&mut sh4, &mut clk, &mut hw, 0x4325).unwrap();
        assert_eq!(sh4.gen_reg(3), 0x8000_0000);
        assert!(sh4.t_flag());
    }

    #[test]
    fn test_shad_directions() {
        let (mut sh4, mut clk, mut hw) = machine_with(&[0x0009]);
        sh4.set_gen_reg(1, 0x8000_0000);

        sh4.set_gen_reg(2, 4);
        op_shad(&mut sh4, &mut clk, &mut hw, 0x412c).unwrap();
        assert_eq!(sh4.gen_reg(1), 0);

        sh4.set_gen_reg(1, 0x8000_0000);
        sh4.set_gen_reg(2, -4i32 as u32);
        op_shad(&mut sh4, &mut clk, &mut hw, 0x412c).unwrap();
        assert_eq!(sh4.gen_reg(1), 0xf800_0000);
    }

    #[test]
    fn test_trapa_enters_exception() {
        let (mut sh4, mut clk, mut hw) = machine_with(&[0xc320]); // trapa #0x20
        sh4.vbr = 0x8c00_0000;
        step(&mut sh4, &mut clk, &mut hw);
        assert_eq!(sh4.ctrl_reg(CtrlReg::Tra), 0x20 << 2);
        assert_eq!(sh4.ctrl_reg(CtrlReg::Expevt), Sh4ExceptionCode::Trapa as u32);
        assert_eq!(sh4.pc, 0x8c00_0100);
        // SPC points past the trapa
        assert_eq!(sh4.spc, BASE + 2);
    }

    #[test]
    fn test_illegal_instruction_enters_exception() {
        let (mut sh4, mut clk, mut hw) = machine_with(&[0xffff]);
        sh4.vbr = 0x8c00_0000;
        step(&mut sh4, &mut clk, &mut hw);
        assert_eq!(
            sh4.ctrl_reg(CtrlReg::Expevt),
            Sh4ExceptionCode::GeneralIllegalInst as u32
        );
    }

    #[test]
    fn test_sleep_state() {
        let (mut sh4, mut clk, mut hw) = machine_with(&[0x001b]);
        step(&mut sh4, &mut clk, &mut hw);
        assert_eq!(sh4.exec_state, ExecState::Sleeping);
    }

    #[test]
    fn test_gbr_indexed_rmw() {
        let (mut sh4, mut clk, mut hw) = machine_with(&[0xcd0f]); // and.b #0xf, @(r0, gbr)
        sh4.gbr = 0x8c04_0000;
        sh4.set_gen_reg(0, 2);
        hw.mem.write_8(0x04_0002, 0xff);
        step(&mut sh4, &mut clk, &mut hw);
        assert_eq!(hw.mem.read_8(0x04_0002), 0x0f);
    }

    #[test]
    fn test_fpu_single_arithmetic() {
        let (mut sh4, mut clk, mut hw) = machine_with(&[0x0009]);
        sh4.set_fr_f32(1, 1.5);
        sh4.set_fr_f32(2, 2.5);
        op_fadd(&mut sh4, &mut clk, &mut hw, 0xf120).unwrap(); // fadd fr2, fr1
        assert_eq!(sh4.fr_f32(1), 4.0);

        sh4.fpul = 7i32 as u32;
        op_float(&mut sh4, &mut clk, &mut hw, 0xf32d).unwrap();
        assert_eq!(sh4.fr_f32(3), 7.0);

        sh4.set_fr_f32(4, -3.7);
        op_ftrc(&mut sh4, &mut clk, &mut hw, 0xf43d).unwrap();
        assert_eq!(sh4.fpul as i32, -3);
    }

    #[test]
    fn test_fpu_disable_raises() {
        let (mut sh4, mut clk, mut hw) = machine_with(&[0xf000]); // fadd
        sh4.vbr = 0x8c00_0000;
        sh4.set_sr(sh4.sr() | sr::FD);
        step(&mut sh4, &mut clk, &mut hw);
        assert_eq!(
            sh4.ctrl_reg(CtrlReg::Expevt),
            Sh4ExceptionCode::GeneralFpuDisable as u32
        );
    }

    #[test]
    fn test_fmov_memory_roundtrip() {
        let (mut sh4, mut clk, mut hw) = machine_with(&[0x0009]);
        sh4.set_gen_reg(1, 0x8c05_0000);
        sh4.set_fr_f32(6, 123.25);
        op_fmov_frm_arn(&mut sh4, &mut clk, &mut hw, 0xf16a).unwrap(); // fmov fr6, @r1
        op_fmov_arm_frn(&mut sh4, &mut clk, &mut hw, 0xf718).unwrap(); // fmov @r1, fr7
        assert_eq!(sh4.fr_f32(7), 123.25);
    }

    #[test]
    fn test_banked_register_moves() {
        let (mut sh4, mut clk, mut hw) = machine_with(&[0x0009]);
        sh4.set_gen_reg(1, 0xdead);
        op_ldc_rm_bank(&mut sh4, &mut clk, &mut hw, 0x41be).unwrap(); // ldc r1, r3_bank
        assert_eq!(sh4.bank_reg(3), 0xdead);
        op_stc_bank_rn(&mut sh4, &mut clk, &mut hw, 0x05b2).unwrap(); // stc r3_bank, r5
        assert_eq!(sh4.gen_reg(5), 0xdead);
    }

    #[test]
    fn test_interrupt_not_taken_between_branch_and_slot() {
        use crate::sh4::excp::{set_interrupt, Sh4IrqLine};

        let (mut sh4, mut clk, mut hw) = machine_with(&[
            0xa002, // bra
            0xe101, // slot
            0xe2ff, 0xe2fe,
            0xe303, // target
        ]);
        sh4.vbr = 0x8c00_0000;
        sh4.set_sr(sh4.sr() & !(sr::BL | sr::IMASK_MASK));
        sh4.set_ctrl_reg(CtrlReg::Ipra, 0xf000);

        step(&mut sh4, &mut clk, &mut hw); // bra executed, slot pending
        set_interrupt(&mut sh4, Sh4IrqLine::Tmu0, Sh4ExceptionCode::Tmu0Tuni0);
        step(&mut sh4, &mut clk, &mut hw); // slot + branch commit, then irq

        // the interrupt hit only after the branch committed: SPC is the
        // branch target, and the slot's write happened
        assert_eq!(sh4.gen_reg(1), 1);
        assert_eq!(sh4.spc, BASE + 8);
        assert_eq!(sh4.pc, 0x8c00_0600);
    }
}
