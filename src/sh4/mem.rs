//! SH4 memory access paths.
//!
//! Every load and store funnels through here: watchpoint checks first, then
//! the P4 on-chip dispatch or the guest-physical memory map.  Instruction
//! fetches have their own entry with a fast path for the overwhelmingly
//! common case of executing out of main RAM.

use super::{reg, Sh4};
use crate::error::{DcResult, ErrorRecord};
use crate::hw::HwDevices;
use crate::mem::{addr, Area, DeviceIo};
use crate::sched::Clock;

/// Store-queue window inside P4.
const SQ_AREA_FIRST: u32 = 0xe000_0000;
const SQ_AREA_LAST: u32 = 0xe3ff_ffff;
/// Cache and TLB maintenance arrays.
const CACHE_ARRAY_FIRST: u32 = 0xf000_0000;
const CACHE_ARRAY_LAST: u32 = 0xf7ff_ffff;
/// Memory-mapped control registers.
const CTRL_REG_FIRST: u32 = 0xfc00_0000;

/// Fetch the 16-bit instruction at `pc_addr`.
///
/// Fetches bypass the map for the RAM case; everything else (boot ROM,
/// flash) takes the routed path.  Watchpoints do not apply to fetches.
#[inline]
pub fn fetch_inst(sh4: &mut Sh4, hw: &mut HwDevices, pc_addr: u32) -> DcResult<u16> {
    let _ = sh4;
    let phys = pc_addr & addr::PHYS_MASK;
    if (addr::AREA3_FIRST..=addr::AREA3_LAST).contains(&phys) {
        return Ok(hw.mem.read_16(phys & addr::AREA3_MASK));
    }

    let routed = hw.sh4_map.route(pc_addr).ok_or_else(|| {
        ErrorRecord::unimplemented(
            "reading sh4 program instructions from areas other than the RAM and the firmware",
        )
        .address(pc_addr)
        .length(2)
    })?;
    match routed.area {
        Area::BootRom => hw.boot_rom.read16(routed.offset),
        Area::Flash => hw.flash.read16(routed.offset),
        Area::Ram => Ok(hw.mem.read_16(routed.offset)),
        _ => Err(ErrorRecord::unimplemented(
            "reading sh4 program instructions from areas other than the RAM and the firmware",
        )
        .address(pc_addr)
        .length(2)),
    }
}

/// Passive devices reachable through the plain [`DeviceIo`] capability.
fn device_of<'a>(hw: &'a mut HwDevices, area: Area) -> Option<&'a mut dyn DeviceIo> {
    Some(match area {
        Area::Ram => &mut hw.mem,
        Area::BootRom => &mut hw.boot_rom,
        Area::Flash => &mut hw.flash,
        Area::TexMem32 | Area::TexMem64 => &mut hw.tex_mem,
        Area::Pvr2Reg => &mut hw.pvr2,
        Area::G1 => &mut hw.g1,
        Area::G2 => &mut hw.g2,
        Area::Gdrom => &mut hw.gdrom,
        Area::AicaWave => &mut hw.aica.wave,
        Area::AicaSys => &mut hw.aica,
        _ => return None,
    })
}

fn map_miss(address: u32, len: u32) -> ErrorRecord {
    ErrorRecord::unimplemented("memory access to an unmapped address")
        .address(address)
        .length(len)
}

fn p4_unhandled(address: u32, len: u32) -> ErrorRecord {
    ErrorRecord::unimplemented("this part of the SH4 P4 area")
        .address(address)
        .length(len)
}

/// P4-window read dispatch.
fn p4_read(sh4: &mut Sh4, clk: &mut Clock, address: u32, len: u32) -> DcResult<u32> {
    match address {
        SQ_AREA_FIRST..=SQ_AREA_LAST if len == 4 => Ok(sh4.sq_read(address)),
        CACHE_ARRAY_FIRST..=CACHE_ARRAY_LAST => {
            log::trace!("sh4: read from cache/TLB array {address:#010x}");
            Ok(0)
        }
        _ if address >= CTRL_REG_FIRST => reg::read(sh4, clk, address, len),
        _ => Err(p4_unhandled(address, len)),
    }
}

/// P4-window write dispatch.
fn p4_write(sh4: &mut Sh4, clk: &mut Clock, address: u32, len: u32, val: u32) -> DcResult<()> {
    match address {
        SQ_AREA_FIRST..=SQ_AREA_LAST if len == 4 => {
            sh4.sq_write(address, val);
            Ok(())
        }
        CACHE_ARRAY_FIRST..=CACHE_ARRAY_LAST => {
            log::trace!("sh4: write {val:#x} to cache/TLB array {address:#010x}");
            Ok(())
        }
        _ if address >= CTRL_REG_FIRST => reg::write(sh4, clk, address, len, val),
        _ => Err(p4_unhandled(address, len)),
    }
}

macro_rules! define_read {
    ($name:ident, $ty:ty, $len:expr, $dev_fn:ident) => {
        #[inline]
        pub fn $name(
            sh4: &mut Sh4,
            clk: &mut Clock,
            hw: &mut HwDevices,
            address: u32,
        ) -> DcResult<$ty> {
            if hw.debugger.is_enabled() {
                hw.debugger.check_r_watch(address, $len);
            }
            let routed = hw
                .sh4_map
                .route(address)
                .ok_or_else(|| map_miss(address, $len))?;
            match routed.area {
                Area::Sh4OnChip => Ok(p4_read(sh4, clk, address, $len)? as $ty),
                Area::Sh4OcRam => Ok(oc_ram_read(sh4, address, $len) as $ty),
                Area::AicaRtc => {
                    if $len == 4 {
                        Ok(hw.rtc.read_32(routed.offset)? as $ty)
                    } else {
                        Err(hw.rtc.bad_width(routed.offset, $len))
                    }
                }
                Area::SysBlock => {
                    if $len == 4 {
                        Ok(hw.sys.read32(routed.offset)? as $ty)
                    } else {
                        Err(ErrorRecord::unimplemented("narrow system-block access")
                            .address(address)
                            .length($len))
                    }
                }
                Area::Maple => {
                    if $len == 4 {
                        Ok(hw.maple.read_32(routed.offset)? as $ty)
                    } else {
                        Err(ErrorRecord::unimplemented("narrow maple register access")
                            .address(address)
                            .length($len))
                    }
                }
                Area::Pvr2Core => Ok(0),
                area => device_of(hw, area)
                    .ok_or_else(|| map_miss(address, $len))?
                    .$dev_fn(routed.offset),
            }
        }
    };
}

define_read!(read_8, u8, 1, read8);
define_read!(read_16, u16, 2, read16);
define_read!(read_32, u32, 4, read32);

macro_rules! define_write {
    ($name:ident, $ty:ty, $len:expr, $dev_fn:ident) => {
        #[inline]
        pub fn $name(
            sh4: &mut Sh4,
            clk: &mut Clock,
            hw: &mut HwDevices,
            address: u32,
            val: $ty,
        ) -> DcResult<()> {
            if hw.debugger.is_enabled() {
                hw.debugger.check_w_watch(address, $len);
            }
            let routed = hw
                .sh4_map
                .route(address)
                .ok_or_else(|| map_miss(address, $len))?;
            match routed.area {
                Area::Sh4OnChip => p4_write(sh4, clk, address, $len, val as u32),
                Area::Sh4OcRam => {
                    oc_ram_write(sh4, address, $len, val as u32);
                    Ok(())
                }
                Area::AicaRtc => {
                    if $len == 4 {
                        hw.rtc.write_32(clk, routed.offset, val as u32)
                    } else {
                        Err(hw.rtc.bad_width(routed.offset, $len))
                    }
                }
                Area::SysBlock => {
                    if $len == 4 {
                        hw.sys.write32(sh4, routed.offset, val as u32)
                    } else {
                        Err(ErrorRecord::unimplemented("narrow system-block access")
                            .address(address)
                            .length($len))
                    }
                }
                Area::Maple => {
                    if $len == 4 {
                        let HwDevices { maple, mem, .. } = hw;
                        maple.write_32(mem, clk, routed.offset, val as u32)
                    } else {
                        Err(ErrorRecord::unimplemented("narrow maple register access")
                            .address(address)
                            .length($len))
                    }
                }
                Area::Pvr2Core => {
                    // TA FIFO traffic; rasterisation is the renderer's job
                    log::trace!("pvr2: TA fifo write {:#x}", val);
                    Ok(())
                }
                area => device_of(hw, area)
                    .ok_or_else(|| map_miss(address, $len))?
                    .$dev_fn(routed.offset, val),
            }
        }
    };
}

define_write!(write_8, u8, 1, write8);
define_write!(write_16, u16, 2, write16);
define_write!(write_32, u32, 4, write32);

pub fn read_float(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, address: u32) -> DcResult<f32> {
    Ok(f32::from_bits(read_32(sh4, clk, hw, address)?))
}

pub fn write_float(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    address: u32,
    val: f32,
) -> DcResult<()> {
    write_32(sh4, clk, hw, address, val.to_bits())
}

pub fn read_double(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    address: u32,
) -> DcResult<f64> {
    if hw.debugger.is_enabled() {
        hw.debugger.check_r_watch(address, 8);
    }
    let routed = hw.sh4_map.route(address).ok_or_else(|| map_miss(address, 8))?;
    let _ = (sh4, clk);
    match device_of(hw, routed.area) {
        Some(dev) => dev.read_double(routed.offset),
        None => Err(p4_unhandled(address, 8)),
    }
}

pub fn write_double(
    sh4: &mut Sh4,
    clk: &mut Clock,
    hw: &mut HwDevices,
    address: u32,
    val: f64,
) -> DcResult<()> {
    if hw.debugger.is_enabled() {
        hw.debugger.check_w_watch(address, 8);
    }
    let routed = hw.sh4_map.route(address).ok_or_else(|| map_miss(address, 8))?;
    let _ = (sh4, clk);
    match device_of(hw, routed.area) {
        Some(dev) => dev.write_double(routed.offset, val),
        None => Err(p4_unhandled(address, 8)),
    }
}

fn oc_ram_read(sh4: &Sh4, address: u32, len: u32) -> u32 {
    let base = (address as usize) & (sh4.oc_ram.len() - 1);
    let mut val = 0u32;
    for idx in 0..len as usize {
        val |= (sh4.oc_ram[(base + idx) & (sh4.oc_ram.len() - 1)] as u32) << (idx * 8);
    }
    val
}

fn oc_ram_write(sh4: &mut Sh4, address: u32, len: u32, val: u32) {
    let base = (address as usize) & (sh4.oc_ram.len() - 1);
    let mask = sh4.oc_ram.len() - 1;
    for idx in 0..len as usize {
        sh4.oc_ram[(base + idx) & mask] = (val >> (idx * 8)) as u8;
    }
}

/// PREF to the store-queue window: burst one 32-byte queue out to the
/// physical address selected by the matching QACR register.
pub fn sq_pref(sh4: &mut Sh4, clk: &mut Clock, hw: &mut HwDevices, address: u32) -> DcResult<()> {
    let sq = (address >> 5) & 1;
    let qacr = if sq == 0 {
        sh4.ctrl_reg(super::CtrlReg::Qacr0)
    } else {
        sh4.ctrl_reg(super::CtrlReg::Qacr1)
    };
    let dest = (address & 0x03ff_ffe0) | (((qacr >> 2) & 0x7) << 26);

    for word in 0..8 {
        let val = sh4.sq_read((sq << 5) | (word * 4));
        write_32(sh4, clk, hw, dest + word * 4, val)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot_rom::BootRom;
    use crate::flash_rom::FlashRom;
    use crate::sched::Clock;

    fn fresh_machine() -> (Sh4, Clock, HwDevices) {
        let mut clk = Clock::new();
        let sh4 = Sh4::new(&mut clk);
        let hw = HwDevices::new(
            &mut clk,
            BootRom::from_bytes(vec![0x09, 0x00, 0x0b, 0x00]),
            FlashRom::ephemeral(),
            None,
            None,
        )
        .unwrap();
        (sh4, clk, hw)
    }

    #[test]
    fn test_ram_mirrors_share_storage() {
        let (mut sh4, mut clk, mut hw) = fresh_machine();
        write_32(&mut sh4, &mut clk, &mut hw, 0x8c00_1000, 0x1234_5678).unwrap();
        assert_eq!(
            read_32(&mut sh4, &mut clk, &mut hw, 0xac00_1000).unwrap(),
            0x1234_5678
        );
        assert_eq!(
            read_32(&mut sh4, &mut clk, &mut hw, 0x0c00_1000).unwrap(),
            0x1234_5678
        );
    }

    #[test]
    fn test_fetch_fast_path_and_boot_rom() {
        let (mut sh4, mut clk, mut hw) = fresh_machine();
        write_16(&mut sh4, &mut clk, &mut hw, 0x8c01_0000, 0xe10f).unwrap();
        assert_eq!(fetch_inst(&mut sh4, &mut hw, 0x8c01_0000).unwrap(), 0xe10f);

        // first fetch of a firmware boot comes from the rom image
        assert_eq!(fetch_inst(&mut sh4, &mut hw, 0xa000_0000).unwrap(), 0x0009);
    }

    #[test]
    fn test_boot_rom_write_is_rejected() {
        let (mut sh4, mut clk, mut hw) = fresh_machine();
        assert!(write_32(&mut sh4, &mut clk, &mut hw, 0x0000_0000, 1).is_err());
    }

    #[test]
    fn test_store_queue_rw() {
        let (mut sh4, mut clk, mut hw) = fresh_machine();
        write_32(&mut sh4, &mut clk, &mut hw, 0xe000_0010, 0xaabb_ccdd).unwrap();
        assert_eq!(
            read_32(&mut sh4, &mut clk, &mut hw, 0xe000_0010).unwrap(),
            0xaabb_ccdd
        );
    }

    #[test]
    fn test_sq_pref_bursts_to_ram() {
        let (mut sh4, mut clk, mut hw) = fresh_machine();
        // QACR0 area bits select area 3 (RAM)
        reg::write(&mut sh4, &mut clk, 0xff00_0038, 4, 0x0c).unwrap();
        for word in 0..8u32 {
            write_32(&mut sh4, &mut clk, &mut hw, 0xe000_0000 + word * 4, word + 1).unwrap();
        }
        sq_pref(&mut sh4, &mut clk, &mut hw, 0xe000_1000).unwrap();
        for word in 0..8u32 {
            assert_eq!(
                read_32(&mut sh4, &mut clk, &mut hw, 0x0c00_1000 + word * 4).unwrap(),
                word + 1
            );
        }
    }

    #[test]
    fn test_oc_ram_window() {
        let (mut sh4, mut clk, mut hw) = fresh_machine();
        write_32(&mut sh4, &mut clk, &mut hw, 0x7c00_0100, 0xfeed_f00d).unwrap();
        assert_eq!(
            read_32(&mut sh4, &mut clk, &mut hw, 0x7c00_0100).unwrap(),
            0xfeed_f00d
        );
        assert_eq!(
            read_8(&mut sh4, &mut clk, &mut hw, 0x7c00_0103).unwrap(),
            0xfe
        );
    }

    #[test]
    fn test_watchpoint_triggers_on_store() {
        let (mut sh4, mut clk, mut hw) = fresh_machine();
        struct Null;
        impl crate::debugger::DebugFrontend for Null {}
        hw.debugger.attach(Box::new(Null));
        hw.debugger.add_w_watch(0x8c00_f000, 4);

        write_16(&mut sh4, &mut clk, &mut hw, 0x8c00_f002, 1).unwrap();
        assert_eq!(hw.debugger.state(), crate::debugger::DebugState::PreWatch);
        // the store still committed
        assert_eq!(
            read_16(&mut sh4, &mut clk, &mut hw, 0x8c00_f002).unwrap(),
            1
        );
    }
}
