//! The device complex: everything on the far side of a CPU memory access.
//!
//! Owning all devices in one struct lets the CPU cores borrow themselves,
//! their clock and the hardware as three disjoint pieces of the machine,
//! which is how a memory access that pokes a device that pokes the
//! interrupt controller stays borrow-clean.

use std::path::Path;

use crate::aica::rtc::AicaRtc;
use crate::aica::Aica;
use crate::boot_rom::BootRom;
use crate::debugger::Debugger;
use crate::error::DcResult;
use crate::flash_rom::FlashRom;
use crate::gbus::GBusRegs;
use crate::gdrom::{DiscSource, GdRom};
use crate::maple::Maple;
use crate::mem::{addr, Area, Memory, MemoryMap, RegionKind};
use crate::pvr2::{Pvr2, TexMem};
use crate::sched::{Clock, EventKind};
use crate::sys::SysBlock;

pub struct HwDevices {
    pub mem: Memory,
    pub boot_rom: BootRom,
    pub flash: FlashRom,
    pub aica: Aica,
    pub rtc: AicaRtc,
    pub pvr2: Pvr2,
    pub tex_mem: TexMem,
    pub sys: SysBlock,
    pub maple: Maple,
    pub gdrom: GdRom,
    pub g1: GBusRegs,
    pub g2: GBusRegs,
    pub sh4_map: MemoryMap,
    pub arm7_map: MemoryMap,
    pub debugger: Debugger,
}

impl HwDevices {
    /// Bring up every device in leaf-first order.  Both CPUs' event slots
    /// must already exist on their clocks; this allocates the device events.
    pub fn new(
        sh4_clock: &mut Clock,
        boot_rom: BootRom,
        flash: FlashRom,
        disc: Option<Box<dyn DiscSource>>,
        rtc_path: Option<&Path>,
    ) -> DcResult<Self> {
        let spg_line_event = sh4_clock.alloc_event(EventKind::SpgLine);

        let mut hw = Self {
            mem: Memory::new(),
            boot_rom,
            flash,
            aica: Aica::new(),
            rtc: AicaRtc::new(sh4_clock, rtc_path),
            pvr2: Pvr2::new(spg_line_event),
            tex_mem: TexMem::new(),
            sys: SysBlock::new(),
            maple: Maple::new(sh4_clock),
            gdrom: GdRom::new(disc),
            g1: GBusRegs::new("g1", addr::G1_FIRST, addr::G1_LAST),
            g2: GBusRegs::new("g2", addr::G2_FIRST, addr::G2_LAST),
            sh4_map: MemoryMap::new(),
            arm7_map: MemoryMap::new(),
            debugger: Debugger::new(),
        };
        construct_sh4_mem_map(&mut hw.sh4_map);
        construct_arm7_mem_map(&mut hw.arm7_map);
        Ok(hw)
    }
}

/// Build the SH4's view of the guest-physical space.
///
/// The P4 window absolutely has to be the first entry: its only
/// discriminator is the top three address bits being all ones, and every
/// other region's `range_mask` would otherwise match.  RAM follows for hit
/// rate; everything carrying the area-0 mirror mask sits at the back so the
/// mirroring cannot swallow addresses that belong to other regions.
pub fn construct_sh4_mem_map(map: &mut MemoryMap) {
    map.add(
        addr::P4_FIRST,
        addr::P4_LAST,
        0xffff_ffff,
        0xffff_ffff,
        RegionKind::Mmio,
        Area::Sh4OnChip,
    );
    map.add(
        addr::AREA3_FIRST,
        addr::AREA3_LAST,
        addr::PHYS_MASK,
        addr::AREA3_MASK,
        RegionKind::Ram,
        Area::Ram,
    );
    map.add(
        addr::TEX32_FIRST,
        addr::TEX32_LAST,
        addr::PHYS_MASK,
        addr::PHYS_MASK,
        RegionKind::Unknown,
        Area::TexMem32,
    );
    map.add(
        addr::TEX64_FIRST,
        addr::TEX64_LAST,
        addr::PHYS_MASK,
        addr::PHYS_MASK,
        RegionKind::Unknown,
        Area::TexMem64,
    );
    map.add(
        addr::PVR2_CORE_FIRST,
        addr::PVR2_CORE_LAST,
        addr::PHYS_MASK,
        addr::PHYS_MASK,
        RegionKind::Unknown,
        Area::Pvr2Core,
    );
    map.add(
        addr::OC_RAM_FIRST,
        addr::OC_RAM_LAST,
        0xffff_ffff,
        0xffff_ffff,
        RegionKind::Unknown,
        Area::Sh4OcRam,
    );

    // everything below carries the area-0 mirror mask
    map.add(
        addr::BIOS_FIRST,
        addr::BIOS_LAST,
        addr::AREA0_MASK,
        addr::AREA0_MASK,
        RegionKind::Unknown,
        Area::BootRom,
    );
    map.add(
        addr::FLASH_FIRST,
        addr::FLASH_LAST,
        addr::AREA0_MASK,
        addr::AREA0_MASK,
        RegionKind::Unknown,
        Area::Flash,
    );
    map.add(
        addr::SYS_FIRST,
        addr::SYS_LAST,
        addr::AREA0_MASK,
        addr::AREA0_MASK,
        RegionKind::Unknown,
        Area::SysBlock,
    );
    map.add(
        addr::MAPLE_FIRST,
        addr::MAPLE_LAST,
        addr::AREA0_MASK,
        addr::AREA0_MASK,
        RegionKind::Unknown,
        Area::Maple,
    );
    map.add(
        addr::GDROM_FIRST,
        addr::GDROM_LAST,
        addr::AREA0_MASK,
        addr::AREA0_MASK,
        RegionKind::Unknown,
        Area::Gdrom,
    );
    map.add(
        addr::G1_FIRST,
        addr::G1_LAST,
        addr::AREA0_MASK,
        addr::AREA0_MASK,
        RegionKind::Unknown,
        Area::G1,
    );
    map.add(
        addr::G2_FIRST,
        addr::G2_LAST,
        addr::AREA0_MASK,
        addr::AREA0_MASK,
        RegionKind::Unknown,
        Area::G2,
    );
    map.add(
        addr::PVR2_FIRST,
        addr::PVR2_LAST,
        addr::AREA0_MASK,
        addr::AREA0_MASK,
        RegionKind::Unknown,
        Area::Pvr2Reg,
    );
    map.add(
        addr::AICA_SYS_FIRST,
        addr::AICA_SYS_LAST,
        addr::AREA0_MASK,
        0xffff_ffff,
        RegionKind::Unknown,
        Area::AicaSys,
    );
    map.add(
        addr::AICA_RTC_FIRST,
        addr::AICA_RTC_LAST,
        addr::AREA0_MASK,
        addr::AREA0_MASK,
        RegionKind::Unknown,
        Area::AicaRtc,
    );
    map.add(
        addr::AICA_WAVE_FIRST,
        addr::AICA_WAVE_LAST,
        addr::AREA0_MASK,
        addr::AICA_WAVE_MASK,
        RegionKind::Unknown,
        Area::AicaWave,
    );
}

/// Build the ARM7's view: wave memory at zero, the register file above it.
pub fn construct_arm7_mem_map(map: &mut MemoryMap) {
    map.add(
        addr::ARM7_WAVE_FIRST,
        addr::ARM7_WAVE_LAST,
        0xffff_ffff,
        addr::AICA_WAVE_MASK,
        RegionKind::Ram,
        Area::AicaWave,
    );
    map.add(
        addr::ARM7_SYS_FIRST,
        addr::ARM7_SYS_LAST,
        0xffff_ffff,
        0xffff_ffff,
        RegionKind::Unknown,
        Area::AicaSys,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sh4_map_region_precedence() {
        let mut map = MemoryMap::new();
        construct_sh4_mem_map(&mut map);

        // P4 wins over everything
        assert_eq!(map.route(0xff00_0024).unwrap().area, Area::Sh4OnChip);
        // P0/P1/P2 RAM mirrors
        assert_eq!(map.route(0x8c00_0000).unwrap().area, Area::Ram);
        assert_eq!(map.route(0xac00_0000).unwrap().area, Area::Ram);
        // area-0 devices, including the +0x0200_0000 mirror
        assert_eq!(map.route(0x0000_0000).unwrap().area, Area::BootRom);
        assert_eq!(map.route(0x0200_0000).unwrap().area, Area::BootRom);
        assert_eq!(map.route(0x005f_6900).unwrap().area, Area::SysBlock);
        assert_eq!(map.route(0x005f_6c04).unwrap().area, Area::Maple);
        assert_eq!(map.route(0x0071_0000).unwrap().area, Area::AicaRtc);
        assert_eq!(map.route(0x0080_0000).unwrap().area, Area::AicaWave);
    }

    #[test]
    fn test_arm7_map_wave_at_zero() {
        let mut map = MemoryMap::new();
        construct_arm7_mem_map(&mut map);

        let routed = map.route(0x0000_1000).unwrap();
        assert_eq!(routed.area, Area::AicaWave);
        assert_eq!(routed.offset, 0x1000);
        assert_eq!(map.route(0x0080_2c00).unwrap().area, Area::AicaSys);
        assert_eq!(map.route(0x0100_0000), None);
    }
}
