//! SH4 memory-mapped on-chip registers (the P4 window).
//!
//! Every register is one row in a static table: address, strict access
//! length, an optional storage slot in the CPU state, a read handler, a
//! write handler and its reset values.  A balanced tree over the addresses
//! is built once and consulted on every P4 control-register access; the two
//! address-encoded oddballs (SDMR2/SDMR3) are matched by their 64 KiB mirror
//! ranges after the tree lookup fails.
//!
//! Handler flavours range from "copy into the slot" through "store it in
//! the scratch area and never think about it again" (bus-state controller,
//! UBC, the on-chip RTC nobody uses) up to genuinely magic: PDTRA feeds the
//! firmware's video-cable detection, CCR invalidates the basic-block cache,
//! and the TMU registers synchronise their channels around every access.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::{excp, tmu, CtrlReg, Sh4};
use crate::error::{DcResult, ErrorRecord};
use crate::sched::Clock;

type RegReadFn = fn(&mut Sh4, &mut Clock, &Sh4MemMappedReg, usize) -> DcResult<u32>;
type RegWriteFn = fn(&mut Sh4, &mut Clock, &Sh4MemMappedReg, usize, u32) -> DcResult<()>;

pub struct Sh4MemMappedReg {
    pub name: &'static str,
    pub addr: u32,
    /// Required access width in bytes.
    pub len: u32,
    /// Storage slot, or `None` for registers backed by the scratch area.
    pub slot: Option<CtrlReg>,
    pub on_read: RegReadFn,
    pub on_write: RegWriteFn,
    pub poweron_reset_val: u32,
    pub manual_reset_val: u32,
}

const SDMR2_ADDR: u32 = 0xff90_0000;
const SDMR3_ADDR: u32 = 0xff94_0000;
const SDMR_RANGE_MASK: u32 = 0xffff_0000;

/// Identity word the boot firmware reads from 0xFF000030.
const SUPERH_ID: u32 = 0x040205c1;

// ---------------------------------------------------------------------------
// handlers

fn default_read(sh4: &mut Sh4, _clk: &mut Clock, entry: &Sh4MemMappedReg, _idx: usize) -> DcResult<u32> {
    Ok(sh4.ctrl_reg(entry.slot.expect("default_read requires a slot")))
}

fn default_write(
    sh4: &mut Sh4,
    _clk: &mut Clock,
    entry: &Sh4MemMappedReg,
    _idx: usize,
    val: u32,
) -> DcResult<()> {
    sh4.set_ctrl_reg(entry.slot.expect("default_write requires a slot"), val);
    Ok(())
}

fn ignore_read(sh4: &mut Sh4, _clk: &mut Clock, _entry: &Sh4MemMappedReg, idx: usize) -> DcResult<u32> {
    Ok(sh4.reg_area[idx])
}

fn ignore_write(
    sh4: &mut Sh4,
    _clk: &mut Clock,
    _entry: &Sh4MemMappedReg,
    idx: usize,
    val: u32,
) -> DcResult<()> {
    sh4.reg_area[idx] = val;
    Ok(())
}

fn warn_read(sh4: &mut Sh4, clk: &mut Clock, entry: &Sh4MemMappedReg, idx: usize) -> DcResult<u32> {
    let val = default_read(sh4, clk, entry, idx)?;
    log::debug!("sh4: reading {val:#x} from register {}", entry.name);
    Ok(val)
}

fn warn_write(
    sh4: &mut Sh4,
    clk: &mut Clock,
    entry: &Sh4MemMappedReg,
    idx: usize,
    val: u32,
) -> DcResult<()> {
    log::debug!("sh4: writing {val:#x} to register {}", entry.name);
    default_write(sh4, clk, entry, idx, val)
}

fn read_only_write(
    _sh4: &mut Sh4,
    _clk: &mut Clock,
    entry: &Sh4MemMappedReg,
    _idx: usize,
    val: u32,
) -> DcResult<()> {
    Err(ErrorRecord::unimplemented("write to a read-only on-chip register")
        .address(entry.addr)
        .value(val))
}

fn write_only_read(
    _sh4: &mut Sh4,
    _clk: &mut Clock,
    entry: &Sh4MemMappedReg,
    _idx: usize,
) -> DcResult<u32> {
    Err(ErrorRecord::unimplemented("read from a write-only on-chip register").address(entry.addr))
}

fn id_read(_sh4: &mut Sh4, _clk: &mut Clock, _entry: &Sh4MemMappedReg, _idx: usize) -> DcResult<u32> {
    Ok(SUPERH_ID)
}

/// EXPEVT only ever holds exception codes; software writes the reset codes
/// back while bootstrapping.
fn expevt_write(
    sh4: &mut Sh4,
    _clk: &mut Clock,
    _entry: &Sh4MemMappedReg,
    _idx: usize,
    val: u32,
) -> DcResult<()> {
    if val != 0 && val != 0x20 {
        return Err(ErrorRecord::unimplemented("non-reset value written to EXPEVT").value(val));
    }
    sh4.set_ctrl_reg(CtrlReg::Expevt, val);
    Ok(())
}

/// DMA channel 0 belongs to hardware; software zeroing it is tolerated.
fn zero_only_write(
    _sh4: &mut Sh4,
    _clk: &mut Clock,
    entry: &Sh4MemMappedReg,
    _idx: usize,
    val: u32,
) -> DcResult<()> {
    if val != 0 {
        return Err(
            ErrorRecord::unimplemented("non-zero write to a hardware-owned register")
                .address(entry.addr)
                .value(val),
        );
    }
    Ok(())
}

fn mmucr_write(
    sh4: &mut Sh4,
    _clk: &mut Clock,
    _entry: &Sh4MemMappedReg,
    _idx: usize,
    val: u32,
) -> DcResult<()> {
    if val & 1 != 0 {
        return Err(ErrorRecord::unimplemented("SH4 MMU address translation"));
    }
    sh4.set_ctrl_reg(CtrlReg::Mmucr, val);
    Ok(())
}

/// Writing CCR restructures the caches, which moves code out from under the
/// block cache.
fn ccr_write(
    sh4: &mut Sh4,
    _clk: &mut Clock,
    _entry: &Sh4MemMappedReg,
    _idx: usize,
    val: u32,
) -> DcResult<()> {
    sh4.jit_cache.invalidate_all();
    sh4.set_ctrl_reg(CtrlReg::Ccr, val);
    Ok(())
}

/// The boot firmware detects the video cable by writing patterns to PDTRA
/// and reading back a response.  The lower nibble table was dumped from an
/// NTSC-U console on composite video; firmware that does not see these
/// values hangs very early in bootup.
fn pdtra_read(sh4: &mut Sh4, _clk: &mut Clock, _entry: &Sh4MemMappedReg, _idx: usize) -> DcResult<u32> {
    let pctra = sh4.ctrl_reg(CtrlReg::Pctra);
    let pdtra = sh4.ctrl_reg(CtrlReg::Pdtra);

    let mut n_input_mask: u16 = 0;
    for bit_no in 0..16 {
        let n_input = (pctra >> (bit_no * 2)) & 1;
        n_input_mask |= (n_input as u16) << bit_no;
    }

    let mut out_val: u32 = 0xe0;
    out_val |= 0x300; // cable type: composite NTSC

    const TBL: [[u32; 4]; 16] = [
        [0x03, 0x03, 0x03, 0x03],
        [0x00, 0x03, 0x00, 0x03],
        [0x03, 0x03, 0x03, 0x03],
        [0x00, 0x03, 0x00, 0x03],
        [0x00, 0x00, 0x03, 0x03],
        [0x00, 0x01, 0x02, 0x03],
        [0x00, 0x00, 0x03, 0x03],
        [0x00, 0x01, 0x02, 0x03],
        [0x03, 0x03, 0x03, 0x03],
        [0x00, 0x03, 0x00, 0x03],
        [0x03, 0x03, 0x03, 0x03],
        [0x00, 0x03, 0x00, 0x03],
        [0x00, 0x00, 0x03, 0x03],
        [0x00, 0x01, 0x02, 0x03],
        [0x00, 0x00, 0x03, 0x03],
        [0x00, 0x01, 0x02, 0x03],
    ];
    out_val |= TBL[(pctra & 0xf) as usize][(pdtra & 3) as usize];

    // bits configured as outputs read back what was last written to them
    let merged = (out_val & !(n_input_mask as u32)) | (pdtra & n_input_mask as u32);
    log::trace!("sh4: reading {merged:#06x} from register PDTRA");
    Ok(merged)
}

fn pdtra_write(
    sh4: &mut Sh4,
    _clk: &mut Clock,
    _entry: &Sh4MemMappedReg,
    _idx: usize,
    val: u32,
) -> DcResult<()> {
    log::trace!("sh4: writing {val:#06x} to register PDTRA");
    sh4.set_ctrl_reg(CtrlReg::Pdtra, val & 0xffff);
    Ok(())
}

fn tmu_tocr_read(_sh4: &mut Sh4, _clk: &mut Clock, _entry: &Sh4MemMappedReg, _idx: usize) -> DcResult<u32> {
    // TCLK is not connected on a Dreamcast; the bit reads as 1
    Ok(1)
}

fn tmu_tocr_write(
    sh4: &mut Sh4,
    _clk: &mut Clock,
    _entry: &Sh4MemMappedReg,
    _idx: usize,
    _val: u32,
) -> DcResult<()> {
    sh4.set_ctrl_reg(CtrlReg::Tocr, 1);
    Ok(())
}

fn tmu_tstr_write(
    sh4: &mut Sh4,
    clk: &mut Clock,
    _entry: &Sh4MemMappedReg,
    _idx: usize,
    val: u32,
) -> DcResult<()> {
    tmu::tstr_write(sh4, clk, val);
    Ok(())
}

fn tmu_chan_of(entry: &Sh4MemMappedReg) -> usize {
    match entry.slot {
        Some(CtrlReg::Tcr0) | Some(CtrlReg::Tcnt0) => 0,
        Some(CtrlReg::Tcr1) | Some(CtrlReg::Tcnt1) => 1,
        _ => 2,
    }
}

fn tmu_tcr_read(sh4: &mut Sh4, clk: &mut Clock, entry: &Sh4MemMappedReg, _idx: usize) -> DcResult<u32> {
    tmu::tcr_read(sh4, clk, tmu_chan_of(entry))
}

fn tmu_tcr_write(
    sh4: &mut Sh4,
    clk: &mut Clock,
    entry: &Sh4MemMappedReg,
    _idx: usize,
    val: u32,
) -> DcResult<()> {
    tmu::tcr_write(sh4, clk, tmu_chan_of(entry), val)
}

fn tmu_tcnt_read(sh4: &mut Sh4, clk: &mut Clock, entry: &Sh4MemMappedReg, _idx: usize) -> DcResult<u32> {
    Ok(tmu::tcnt_read(sh4, clk, tmu_chan_of(entry)))
}

fn tmu_tcnt_write(
    sh4: &mut Sh4,
    clk: &mut Clock,
    entry: &Sh4MemMappedReg,
    _idx: usize,
    val: u32,
) -> DcResult<()> {
    tmu::tcnt_write(sh4, clk, tmu_chan_of(entry), val);
    Ok(())
}

// serial port: the transmit FIFO feeds the host-facing TX ring, the receive
// register drains the RX ring

fn scif_tdr_write(
    sh4: &mut Sh4,
    _clk: &mut Clock,
    _entry: &Sh4MemMappedReg,
    _idx: usize,
    val: u32,
) -> DcResult<()> {
    if !sh4.serial.tx.push(val as u8) {
        log::warn!("scif: tx ring full, byte {val:#04x} dropped");
    }
    Ok(())
}

fn scif_rdr_read(sh4: &mut Sh4, _clk: &mut Clock, _entry: &Sh4MemMappedReg, _idx: usize) -> DcResult<u32> {
    Ok(sh4.serial.rx.pop().unwrap_or(0) as u32)
}

fn scif_fsr_read(sh4: &mut Sh4, _clk: &mut Clock, _entry: &Sh4MemMappedReg, _idx: usize) -> DcResult<u32> {
    // TDFE | TEND always (the ring never backs up into the guest), RDF when
    // receive data is waiting
    let mut val = 0x60;
    if !sh4.serial.rx.is_empty() {
        val |= 0x2;
    }
    Ok(val)
}

fn scif_fsr_write(
    sh4: &mut Sh4,
    _clk: &mut Clock,
    _entry: &Sh4MemMappedReg,
    _idx: usize,
    val: u32,
) -> DcResult<()> {
    // flag-clearing writes; nothing sticky to clear here
    sh4.set_ctrl_reg(CtrlReg::Scfsr2, val & 0xffff);
    Ok(())
}

fn scif_fdr_read(sh4: &mut Sh4, _clk: &mut Clock, _entry: &Sh4MemMappedReg, _idx: usize) -> DcResult<u32> {
    Ok((sh4.serial.rx.len().min(16) as u32) & 0x1f)
}

// interrupt-priority writes re-evaluate acceptance

fn intc_write(
    sh4: &mut Sh4,
    _clk: &mut Clock,
    entry: &Sh4MemMappedReg,
    _idx: usize,
    val: u32,
) -> DcResult<()> {
    sh4.set_ctrl_reg(entry.slot.expect("intc registers have slots"), val);
    excp::refresh_intc(sh4);
    Ok(())
}

// ---------------------------------------------------------------------------
// the table

macro_rules! row {
    ($name:expr, $addr:expr, $len:expr, $slot:expr, $read:expr, $write:expr) => {
        row!($name, $addr, $len, $slot, $read, $write, 0, 0)
    };
    ($name:expr, $addr:expr, $len:expr, $slot:expr, $read:expr, $write:expr, $poweron:expr, $manual:expr) => {
        Sh4MemMappedReg {
            name: $name,
            addr: $addr,
            len: $len,
            slot: $slot,
            on_read: $read,
            on_write: $write,
            poweron_reset_val: $poweron,
            manual_reset_val: $manual,
        }
    };
}

static MEM_MAPPED_REGS: &[Sh4MemMappedReg] = &[
    row!("EXPEVT", 0xff00_0024, 4, Some(CtrlReg::Expevt), default_read, expevt_write, 0, 0x20),
    row!("INTEVT", 0xff00_0028, 4, Some(CtrlReg::Intevt), default_read, default_write, 0, 0x20),
    row!("MMUCR", 0xff00_0010, 4, Some(CtrlReg::Mmucr), default_read, mmucr_write),
    row!("CCR", 0xff00_001c, 4, Some(CtrlReg::Ccr), default_read, ccr_write),
    row!("QACR0", 0xff00_0038, 4, Some(CtrlReg::Qacr0), default_read, default_write),
    row!("QACR1", 0xff00_003c, 4, Some(CtrlReg::Qacr1), default_read, default_write),
    row!("PTEH", 0xff00_0000, 4, Some(CtrlReg::Pteh), default_read, default_write),
    row!("PTEL", 0xff00_0004, 4, Some(CtrlReg::Ptel), default_read, default_write),
    row!("TTB", 0xff00_0008, 4, Some(CtrlReg::Ttb), default_read, default_write),
    row!("TEA", 0xff00_000c, 4, Some(CtrlReg::Tea), default_read, default_write),
    row!("PTEA", 0xff00_0034, 4, Some(CtrlReg::Ptea), default_read, default_write),
    row!("TRA", 0xff00_0020, 4, Some(CtrlReg::Tra), default_read, default_write),
    // undocumented CPU-model identity word the firmware insists on checking
    row!("SUPERH-ID", 0xff00_0030, 4, None, id_read, read_only_write),
    // bus-state controller: low-level DRAM timing nobody needs modelled
    row!("BCR1", 0xff80_0000, 4, None, ignore_read, ignore_write),
    row!("BCR2", 0xff80_0004, 2, None, ignore_read, ignore_write, 0, 0x3ffc),
    row!("WCR1", 0xff80_0008, 4, None, ignore_read, ignore_write, 0, 0x7777_7777),
    row!("WCR2", 0xff80_000c, 4, None, ignore_read, ignore_write, 0, 0xfffe_efff),
    row!("WCR3", 0xff80_0010, 4, None, ignore_read, ignore_write, 0, 0x0777_7777),
    row!("MCR", 0xff80_0014, 4, None, ignore_read, ignore_write),
    row!("PCR", 0xff80_0018, 2, None, ignore_read, ignore_write),
    row!("RTCSR", 0xff80_001c, 2, None, ignore_read, ignore_write),
    row!("RTCNT", 0xff80_0020, 2, None, ignore_read, ignore_write),
    row!("RTCOR", 0xff80_0024, 2, None, ignore_read, ignore_write),
    row!("RFCR", 0xff80_0028, 2, None, ignore_read, ignore_write),
    row!("PCTRA", 0xff80_002c, 4, Some(CtrlReg::Pctra), warn_read, warn_write),
    row!("PDTRA", 0xff80_0030, 2, Some(CtrlReg::Pdtra), pdtra_read, pdtra_write),
    row!("PCTRB", 0xff80_0040, 4, Some(CtrlReg::Pctrb), warn_read, warn_write),
    row!("PDTRB", 0xff80_0044, 2, Some(CtrlReg::Pdtrb), warn_read, warn_write),
    row!("GPIOIC", 0xff80_0048, 2, None, ignore_read, ignore_write),
    // the SH4's own RTC; the Dreamcast uses the AICA's battery-backed one
    row!("R64CNT", 0xffc8_0000, 1, None, ignore_read, read_only_write),
    row!("RSECCNT", 0xffc8_0004, 1, None, ignore_read, ignore_write),
    row!("RMINCNT", 0xffc8_0008, 1, None, ignore_read, ignore_write),
    row!("RHRCNT", 0xffc8_000c, 1, None, ignore_read, ignore_write),
    row!("RWKCNT", 0xffc8_0010, 1, None, ignore_read, ignore_write),
    row!("RDAYCNT", 0xffc8_0014, 1, None, ignore_read, ignore_write),
    row!("RMONCNT", 0xffc8_0018, 1, None, ignore_read, ignore_write),
    row!("RYRCNT", 0xffc8_001c, 2, None, ignore_read, ignore_write),
    row!("RSECAR", 0xffc8_0020, 1, None, ignore_read, ignore_write),
    row!("RMINAR", 0xffc8_0024, 1, None, ignore_read, ignore_write),
    row!("RHRAR", 0xffc8_0028, 1, None, ignore_read, ignore_write),
    row!("RWKAR", 0xffc8_002c, 1, None, ignore_read, ignore_write),
    row!("RDAYAR", 0xffc8_0030, 1, None, ignore_read, ignore_write),
    row!("RMONAR", 0xffc8_0034, 1, None, ignore_read, ignore_write),
    row!("RCR1", 0xffc8_0038, 1, None, ignore_read, ignore_write),
    row!("RCR2", 0xffc8_003c, 1, None, ignore_read, ignore_write),
    row!("STBCR", 0xffc0_0004, 1, Some(CtrlReg::Stbcr), default_read, default_write),
    row!("STBCR2", 0xffc0_0010, 1, None, ignore_read, ignore_write),
    row!("WTCNT", 0xffc0_0008, 2, None, ignore_read, ignore_write),
    row!("WTCSR", 0xffc0_000c, 2, None, ignore_read, ignore_write),
    // timer unit
    row!("TOCR", 0xffd8_0000, 1, Some(CtrlReg::Tocr), tmu_tocr_read, tmu_tocr_write, 1, 1),
    row!("TSTR", 0xffd8_0004, 1, Some(CtrlReg::Tstr), default_read, tmu_tstr_write),
    row!("TCOR0", 0xffd8_0008, 4, Some(CtrlReg::Tcor0), default_read, default_write, !0, !0),
    row!("TCNT0", 0xffd8_000c, 4, Some(CtrlReg::Tcnt0), tmu_tcnt_read, tmu_tcnt_write, !0, !0),
    row!("TCR0", 0xffd8_0010, 2, Some(CtrlReg::Tcr0), tmu_tcr_read, tmu_tcr_write),
    row!("TCOR1", 0xffd8_0014, 4, Some(CtrlReg::Tcor1), default_read, default_write, !0, !0),
    row!("TCNT1", 0xffd8_0018, 4, Some(CtrlReg::Tcnt1), tmu_tcnt_read, tmu_tcnt_write, !0, !0),
    row!("TCR1", 0xffd8_001c, 2, Some(CtrlReg::Tcr1), tmu_tcr_read, tmu_tcr_write),
    row!("TCOR2", 0xffd8_0020, 4, Some(CtrlReg::Tcor2), default_read, default_write, !0, !0),
    row!("TCNT2", 0xffd8_0024, 4, Some(CtrlReg::Tcnt2), tmu_tcnt_read, tmu_tcnt_write, !0, !0),
    row!("TCR2", 0xffd8_0028, 2, Some(CtrlReg::Tcr2), tmu_tcr_read, tmu_tcr_write),
    row!("TCPR2", 0xffd8_002c, 4, Some(CtrlReg::Tcpr2), default_read, default_write),
    // DMA channel 0 is hardware-owned; zeroing it is the only tolerated write
    row!("SAR0", 0xffa0_0000, 4, None, write_only_read, zero_only_write),
    row!("DAR0", 0xffa0_0004, 4, None, write_only_read, zero_only_write),
    row!("DMATCR0", 0xffa0_0008, 4, None, write_only_read, zero_only_write),
    row!("CHCR0", 0xffa0_000c, 4, None, write_only_read, zero_only_write),
    row!("SAR1", 0xffa0_0010, 4, Some(CtrlReg::Sar1), default_read, default_write),
    row!("DAR1", 0xffa0_0014, 4, Some(CtrlReg::Dar1), default_read, default_write),
    row!("DMATCR1", 0xffa0_0018, 4, Some(CtrlReg::Dmatcr1), default_read, default_write),
    row!("CHCR1", 0xffa0_001c, 4, Some(CtrlReg::Chcr1), default_read, default_write),
    row!("SAR2", 0xffa0_0020, 4, Some(CtrlReg::Sar2), default_read, default_write),
    row!("DAR2", 0xffa0_0024, 4, Some(CtrlReg::Dar2), default_read, default_write),
    row!("DMATCR2", 0xffa0_0028, 4, Some(CtrlReg::Dmatcr2), default_read, default_write),
    row!("CHCR2", 0xffa0_002c, 4, Some(CtrlReg::Chcr2), default_read, default_write),
    row!("SAR3", 0xffa0_0030, 4, Some(CtrlReg::Sar3), default_read, default_write),
    row!("DAR3", 0xffa0_0034, 4, Some(CtrlReg::Dar3), default_read, default_write),
    row!("DMATCR3", 0xffa0_0038, 4, Some(CtrlReg::Dmatcr3), default_read, default_write),
    row!("CHCR3", 0xffa0_003c, 4, Some(CtrlReg::Chcr3), default_read, default_write),
    row!("DMAOR", 0xffa0_0040, 4, Some(CtrlReg::Dmaor), warn_read, warn_write),
    // SCI, the "other" UART; kept write-only so any use shows up in the logs
    row!("SCBRR1", 0xffe0_0004, 1, None, write_only_read, ignore_write),
    // SCIF serial port
    row!("SCSMR2", 0xffe8_0000, 2, Some(CtrlReg::Scsmr2), default_read, default_write),
    row!("SCBRR2", 0xffe8_0004, 1, Some(CtrlReg::Scbrr2), default_read, default_write, 0xff, 0xff),
    row!("SCSCR2", 0xffe8_0008, 2, Some(CtrlReg::Scscr2), default_read, default_write),
    row!("SCFTDR2", 0xffe8_000c, 1, None, write_only_read, scif_tdr_write, 0xff, 0xff),
    row!("SCFSR2", 0xffe8_0010, 2, Some(CtrlReg::Scfsr2), scif_fsr_read, scif_fsr_write, 0x60, 0x60),
    row!("SCFRDR2", 0xffe8_0014, 1, None, scif_rdr_read, read_only_write),
    row!("SCFCR2", 0xffe8_0018, 2, Some(CtrlReg::Scfcr2), default_read, default_write),
    row!("SCFDR2", 0xffe8_001c, 2, None, scif_fdr_read, read_only_write),
    row!("SCSPTR2", 0xffe8_0020, 2, Some(CtrlReg::Scsptr2), default_read, default_write),
    row!("SCLSR2", 0xffe8_0024, 2, Some(CtrlReg::Sclsr2), default_read, default_write),
    // interrupt controller
    row!("ICR", 0xffd0_0000, 2, Some(CtrlReg::Icr), default_read, intc_write),
    row!("IPRA", 0xffd0_0004, 2, Some(CtrlReg::Ipra), default_read, intc_write),
    row!("IPRB", 0xffd0_0008, 2, Some(CtrlReg::Iprb), default_read, intc_write),
    row!("IPRC", 0xffd0_000c, 2, Some(CtrlReg::Iprc), default_read, intc_write),
    row!("IPRD", 0xffd0_0010, 2, Some(CtrlReg::Iprd), default_read, intc_write, 0xda74, 0xda74),
    // padding adjacent to the IPR registers that IP.BIN insists on zeroing
    row!("IPR_PAD_ffd00002", 0xffd0_0002, 2, None, write_only_read, zero_only_write),
    row!("IPR_PAD_ffd00006", 0xffd0_0006, 2, None, write_only_read, zero_only_write),
    row!("IPR_PAD_ffd0000a", 0xffd0_000a, 2, None, write_only_read, zero_only_write),
    row!("IPR_PAD_ffd0000e", 0xffd0_000e, 2, None, write_only_read, zero_only_write),
    // undocumented register some games (VF3tb, Shenmue) poke
    row!("UNKNOWN_ff100008", 0xff10_0008, 4, Some(CtrlReg::UnknownFf100008), warn_read, warn_write),
    // user break controller; this emulator brings its own debugger
    row!("BARA", 0xff20_0000, 4, None, ignore_read, ignore_write),
    row!("BAMRA", 0xff20_0004, 1, None, ignore_read, ignore_write),
    row!("BBRA", 0xff20_0008, 2, None, ignore_read, ignore_write),
    row!("BARB", 0xff20_000c, 4, None, ignore_read, ignore_write),
    row!("BAMRB", 0xff20_0010, 1, None, ignore_read, ignore_write),
    row!("BBRB", 0xff20_0014, 2, None, ignore_read, ignore_write),
    row!("BDRB", 0xff20_0018, 4, None, ignore_read, ignore_write),
    row!("BDMRB", 0xff20_001c, 4, None, ignore_read, ignore_write),
    row!("BRCR", 0xff20_0020, 2, None, ignore_read, ignore_write),
    // performance-monitoring unit base register, per the Linux kernel
    row!("PM_CR_BASE", 0xff00_0084, 2, None, ignore_read, ignore_write),
];

pub(crate) fn table_len() -> usize {
    MEM_MAPPED_REGS.len()
}

fn reg_tree() -> &'static BTreeMap<u32, usize> {
    static TREE: OnceLock<BTreeMap<u32, usize>> = OnceLock::new();
    TREE.get_or_init(|| {
        MEM_MAPPED_REGS
            .iter()
            .enumerate()
            .map(|(idx, entry)| (entry.addr, idx))
            .collect()
    })
}

/// Apply every register's power-on reset value.
pub(crate) fn poweron_reset(sh4: &mut Sh4) {
    for (idx, entry) in MEM_MAPPED_REGS.iter().enumerate() {
        match entry.slot {
            Some(slot) => sh4.set_ctrl_reg(slot, entry.poweron_reset_val),
            None => sh4.reg_area[idx] = entry.poweron_reset_val,
        }
    }

    // R15 is formally undefined at reset, but direct-booted software expects
    // the value the firmware would have left behind.
    sh4.set_gen_reg(15, 0x8c00_f400);
}

/// Apply every register's manual-reset value (a reset without power loss).
pub(crate) fn manual_reset(sh4: &mut Sh4) {
    for (idx, entry) in MEM_MAPPED_REGS.iter().enumerate() {
        match entry.slot {
            Some(slot) => sh4.set_ctrl_reg(slot, entry.manual_reset_val),
            None => sh4.reg_area[idx] = entry.manual_reset_val,
        }
    }
}

fn lookup(address: u32) -> Option<usize> {
    reg_tree().get(&address).copied()
}

fn width_mismatch(entry: &Sh4MemMappedReg, len: u32) -> ErrorRecord {
    ErrorRecord::unimplemented("on-chip register access with the wrong width")
        .address(entry.addr)
        .length(len)
        .expected_length(entry.len)
}

fn unknown_reg(address: u32, len: u32) -> ErrorRecord {
    ErrorRecord::unimplemented("access to an unknown SH4 on-chip register")
        .address(address)
        .length(len)
}

/// Read from the on-chip register block.
pub fn read(sh4: &mut Sh4, clk: &mut Clock, address: u32, len: u32) -> DcResult<u32> {
    match lookup(address) {
        Some(idx) => {
            let entry = &MEM_MAPPED_REGS[idx];
            if len != entry.len {
                return Err(width_mismatch(entry, len));
            }
            (entry.on_read)(sh4, clk, entry, idx)
        }
        None => {
            // SDMR2/SDMR3 encode their data in the address; any access in
            // their 64 KiB mirrors matches
            if address & SDMR_RANGE_MASK == SDMR2_ADDR || address & SDMR_RANGE_MASK == SDMR3_ADDR {
                return Err(
                    ErrorRecord::unimplemented("read from the write-only SDMR registers")
                        .address(address),
                );
            }
            Err(unknown_reg(address, len))
        }
    }
}

/// Write into the on-chip register block.
pub fn write(sh4: &mut Sh4, clk: &mut Clock, address: u32, len: u32, val: u32) -> DcResult<()> {
    match lookup(address) {
        Some(idx) => {
            let entry = &MEM_MAPPED_REGS[idx];
            if len != entry.len {
                return Err(width_mismatch(entry, len));
            }
            (entry.on_write)(sh4, clk, entry, idx, val)
        }
        None => {
            if address & SDMR_RANGE_MASK == SDMR2_ADDR || address & SDMR_RANGE_MASK == SDMR3_ADDR {
                // address-as-data SDRAM mode writes; nothing to model
                log::trace!("sh4: SDMR write through {address:#010x}");
                return Ok(());
            }
            Err(unknown_reg(address, len))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> (Sh4, Clock) {
        let mut clk = Clock::new();
        let sh4 = Sh4::new(&mut clk);
        (sh4, clk)
    }

    #[test]
    fn test_default_slot_roundtrip() {
        let (mut sh4, mut clk) = fresh();
        write(&mut sh4, &mut clk, 0xff00_0008, 4, 0x8c00_0000).unwrap(); // TTB
        assert_eq!(read(&mut sh4, &mut clk, 0xff00_0008, 4).unwrap(), 0x8c00_0000);
    }

    #[test]
    fn test_width_mismatch_is_reported() {
        let (mut sh4, mut clk) = fresh();
        let err = write(&mut sh4, &mut clk, 0xff00_0024, 1, 0).unwrap_err();
        assert_eq!(err.expected_length, Some(4));
        assert_eq!(err.length, Some(1));
    }

    #[test]
    fn test_superh_id() {
        let (mut sh4, mut clk) = fresh();
        assert_eq!(read(&mut sh4, &mut clk, 0xff00_0030, 4).unwrap(), SUPERH_ID);
        assert!(write(&mut sh4, &mut clk, 0xff00_0030, 4, 0).is_err());
    }

    #[test]
    fn test_zero_only_dma_regs() {
        let (mut sh4, mut clk) = fresh();
        write(&mut sh4, &mut clk, 0xffa0_0000, 4, 0).unwrap();
        let err = write(&mut sh4, &mut clk, 0xffa0_0000, 4, 1).unwrap_err();
        assert_eq!(err.value, Some(1));
    }

    #[test]
    fn test_mmucr_enable_is_unimplemented() {
        let (mut sh4, mut clk) = fresh();
        write(&mut sh4, &mut clk, 0xff00_0010, 4, 0x204).unwrap();
        assert!(write(&mut sh4, &mut clk, 0xff00_0010, 4, 1).is_err());
    }

    #[test]
    fn test_sdmr_mirror_write_passes() {
        let (mut sh4, mut clk) = fresh();
        write(&mut sh4, &mut clk, 0xff90_00a4, 1, 0).unwrap();
        write(&mut sh4, &mut clk, 0xff94_88f0, 1, 0).unwrap();
        assert!(read(&mut sh4, &mut clk, 0xff90_00a4, 1).is_err());
    }

    #[test]
    fn test_unknown_register_is_reported() {
        let (mut sh4, mut clk) = fresh();
        let err = read(&mut sh4, &mut clk, 0xffee_0000, 4).unwrap_err();
        assert_eq!(err.address, Some(0xffee_0000));
    }

    #[test]
    fn test_pdtra_composite_ntsc_magic() {
        let (mut sh4, mut clk) = fresh();

        // all pins inputs, output latch zero: table row 0 selects 0x3
        write(&mut sh4, &mut clk, 0xff80_002c, 4, 0).unwrap();
        assert_eq!(read(&mut sh4, &mut clk, 0xff80_0030, 2).unwrap(), 0x3e3);

        // the firmware's detection loop: PCTRA 0x5 makes bits 0-1 outputs,
        // so they read back as written (0x2) and the table row agrees
        write(&mut sh4, &mut clk, 0xff80_002c, 4, 0x5).unwrap();
        write(&mut sh4, &mut clk, 0xff80_0030, 2, 0x2).unwrap();
        assert_eq!(read(&mut sh4, &mut clk, 0xff80_0030, 2).unwrap(), 0x3e2);
    }

    #[test]
    fn test_scif_rings() {
        let (mut sh4, mut clk) = fresh();

        write(&mut sh4, &mut clk, 0xffe8_000c, 1, b'H' as u32).unwrap();
        write(&mut sh4, &mut clk, 0xffe8_000c, 1, b'i' as u32).unwrap();
        assert_eq!(sh4.serial.tx.pop(), Some(b'H'));
        assert_eq!(sh4.serial.tx.pop(), Some(b'i'));

        // no rx data: RDF clear
        assert_eq!(read(&mut sh4, &mut clk, 0xffe8_0010, 2).unwrap() & 0x2, 0);
        sh4.serial.rx.push(b'x');
        assert_eq!(read(&mut sh4, &mut clk, 0xffe8_0010, 2).unwrap() & 0x2, 0x2);
        assert_eq!(read(&mut sh4, &mut clk, 0xffe8_0014, 1).unwrap(), b'x' as u32);
    }

    #[test]
    fn test_poweron_values() {
        let (mut sh4, mut clk) = fresh();
        // TCOR/TCNT reset to all-ones
        assert_eq!(read(&mut sh4, &mut clk, 0xffd8_0008, 4).unwrap(), !0u32);
        // TOCR reads back 1
        assert_eq!(read(&mut sh4, &mut clk, 0xffd8_0000, 1).unwrap(), 1);
        // IPRD carries its documented reset value
        assert_eq!(read(&mut sh4, &mut clk, 0xffd0_0010, 2).unwrap(), 0xda74);
        // the direct-boot stack expectation
        assert_eq!(sh4.gen_reg(15), 0x8c00_f400);
    }
}
