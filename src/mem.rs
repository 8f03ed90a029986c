//! Main memory and the guest-physical memory map.
//!
//! Every CPU load/store is routed through a [`MemoryMap`]: an ordered list of
//! address-range → device bindings.  `range_mask` is applied to the incoming
//! address *before* the range check, which is how the 29-bit physical space
//! mirrors into the SH4's P0/P1/P2/P3 windows; `mask` is applied *after*
//! selection, so a device only ever sees offsets into its own window.
//!
//! Region order is significant.  The SH4 on-chip window has to come first
//! because its only discriminator is the top three address bits being all
//! ones and every other region's `range_mask` would otherwise swallow it;
//! main RAM comes next for hit rate on the hot path; the area-0 peripherals
//! carry the mirror mask and sit at the back of the list.
//!
//! # SH4 memory map (29-bit physical)
//!
//! | Range                     | Device              |
//! |---------------------------|---------------------|
//! | 0x00000000 - 0x001FFFFF   | boot ROM            |
//! | 0x00200000 - 0x0021FFFF   | flash               |
//! | 0x005F6800 - 0x005F69FF   | system block        |
//! | 0x005F6C00 - 0x005F6CFF   | maple               |
//! | 0x005F7080 - 0x005F70FF   | GD-ROM              |
//! | 0x005F7000 - 0x005F73FF   | G1 bus regs         |
//! | 0x005F7400 - 0x005F77FF   | G2 bus regs         |
//! | 0x005F8000 - 0x005F9FFF   | PVR2 regs           |
//! | 0x00700000 - 0x00707FFF   | AICA system regs    |
//! | 0x00710000 - 0x0071000B   | AICA RTC            |
//! | 0x00800000 - 0x009FFFFF   | AICA wave memory    |
//! | 0x04000000 - 0x057FFFFF   | PVR2 texture memory |
//! | 0x0C000000 - 0x0FFFFFFF   | main RAM (16 MiB)   |
//! | 0x10000000 - 0x107FFFFF   | PVR2 core / TA FIFO |
//! | 0x7C000000 - 0x7FFFFFFF   | SH4 operand-cache RAM |
//! | 0xE0000000 - 0xFFFFFFFF   | SH4 P4 on-chip regs |

use crate::error::{DcResult, ErrorRecord};

/// Address constants for the guest-physical map.
pub mod addr {
    /// Mirror mask for area-0 peripherals (the whole area repeats once at
    /// +0x0200_0000).
    pub const AREA0_MASK: u32 = 0x01ff_ffff;

    pub const BIOS_FIRST: u32 = 0x0000_0000;
    pub const BIOS_LAST: u32 = 0x001f_ffff;

    pub const FLASH_FIRST: u32 = 0x0020_0000;
    pub const FLASH_LAST: u32 = 0x0021_ffff;

    pub const SYS_FIRST: u32 = 0x005f_6800;
    pub const SYS_LAST: u32 = 0x005f_69ff;

    pub const MAPLE_FIRST: u32 = 0x005f_6c00;
    pub const MAPLE_LAST: u32 = 0x005f_6cff;

    /// GD-ROM drive registers; carved out of the front of the G1 window, so
    /// this region must be registered before G1.
    pub const GDROM_FIRST: u32 = 0x005f_7080;
    pub const GDROM_LAST: u32 = 0x005f_70ff;

    pub const G1_FIRST: u32 = 0x005f_7000;
    pub const G1_LAST: u32 = 0x005f_73ff;

    pub const G2_FIRST: u32 = 0x005f_7400;
    pub const G2_LAST: u32 = 0x005f_77ff;

    pub const PVR2_FIRST: u32 = 0x005f_8000;
    pub const PVR2_LAST: u32 = 0x005f_9fff;

    pub const AICA_SYS_FIRST: u32 = 0x0070_0000;
    pub const AICA_SYS_LAST: u32 = 0x0070_7fff;

    pub const AICA_RTC_FIRST: u32 = 0x0071_0000;
    pub const AICA_RTC_LAST: u32 = 0x0071_000b;

    pub const AICA_WAVE_FIRST: u32 = 0x0080_0000;
    pub const AICA_WAVE_LAST: u32 = 0x009f_ffff;
    /// 2 MiB of wave memory.
    pub const AICA_WAVE_MASK: u32 = 0x001f_ffff;

    pub const TEX64_FIRST: u32 = 0x0400_0000;
    pub const TEX64_LAST: u32 = 0x047f_ffff;
    pub const TEX32_FIRST: u32 = 0x0500_0000;
    pub const TEX32_LAST: u32 = 0x057f_ffff;

    pub const AREA3_FIRST: u32 = 0x0c00_0000;
    pub const AREA3_LAST: u32 = 0x0fff_ffff;
    /// 16 MiB of main RAM, mirrored through the 64 MiB area-3 window.
    pub const AREA3_MASK: u32 = 0x00ff_ffff;

    pub const PVR2_CORE_FIRST: u32 = 0x1000_0000;
    pub const PVR2_CORE_LAST: u32 = 0x107f_ffff;

    pub const OC_RAM_FIRST: u32 = 0x7c00_0000;
    pub const OC_RAM_LAST: u32 = 0x7fff_ffff;

    pub const P4_FIRST: u32 = 0xe000_0000;
    pub const P4_LAST: u32 = 0xffff_ffff;

    /// Physical-address mask for the P0-P3 mirrors (top three bits off).
    pub const PHYS_MASK: u32 = 0x1fff_ffff;

    // Guest-RAM load addresses used by the ip_bin / direct boot modes.
    pub const SYSCALLS: u32 = 0x8c00_0000;
    pub const SYSCALLS_LEN: u32 = 0x8000;
    pub const IP_BIN: u32 = 0x8c00_8000;
    pub const BOOTSTRAP: u32 = 0x8c00_8300;
    pub const FIRST_READ_BIN: u32 = 0x8c01_0000;

    // ARM7 view of the AICA complex.
    pub const ARM7_WAVE_FIRST: u32 = 0x0000_0000;
    pub const ARM7_WAVE_LAST: u32 = 0x001f_ffff;
    pub const ARM7_SYS_FIRST: u32 = 0x0080_0000;
    pub const ARM7_SYS_LAST: u32 = 0x0080_7fff;
}

/// Width-typed read/write capability every passive memory-mapped device
/// satisfies.  The float/double slots exist because SH4 FPU loads and stores
/// go through the same map; devices that cannot service them inherit the
/// bit-pattern defaults.
pub trait DeviceIo {
    fn read8(&mut self, addr: u32) -> DcResult<u8>;
    fn read16(&mut self, addr: u32) -> DcResult<u16>;
    fn read32(&mut self, addr: u32) -> DcResult<u32>;
    fn write8(&mut self, addr: u32, val: u8) -> DcResult<()>;
    fn write16(&mut self, addr: u32, val: u16) -> DcResult<()>;
    fn write32(&mut self, addr: u32, val: u32) -> DcResult<()>;

    fn read_float(&mut self, addr: u32) -> DcResult<f32> {
        Ok(f32::from_bits(self.read32(addr)?))
    }

    fn write_float(&mut self, addr: u32, val: f32) -> DcResult<()> {
        self.write32(addr, val.to_bits())
    }

    fn read_double(&mut self, addr: u32) -> DcResult<f64> {
        Err(ErrorRecord::unimplemented("64-bit read from this device")
            .address(addr)
            .length(8))
    }

    fn write_double(&mut self, addr: u32, _val: f64) -> DcResult<()> {
        Err(ErrorRecord::unimplemented("64-bit write to this device")
            .address(addr)
            .length(8))
    }
}

/// Which device a region routes to.  The router matches on this; it is the
/// crate's replacement for the C context pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    /// SH4 P4 window (on-chip registers); must be the first region.
    Sh4OnChip,
    /// Main RAM fast path.
    Ram,
    /// SH4 operand-cache RAM (8 KiB window).
    Sh4OcRam,
    BootRom,
    Flash,
    SysBlock,
    Maple,
    Gdrom,
    G1,
    G2,
    Pvr2Reg,
    Pvr2Core,
    TexMem32,
    TexMem64,
    AicaWave,
    AicaSys,
    AicaRtc,
}

/// Region classification, used by the fetch fast path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Ram,
    Mmio,
    Unknown,
}

#[derive(Debug, Clone, Copy)]
struct MapRegion {
    first_addr: u32,
    last_addr: u32,
    range_mask: u32,
    mask: u32,
    kind: RegionKind,
    area: Area,
}

/// A successful map lookup: the owning area plus the address as the device
/// will see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Routed {
    pub area: Area,
    pub kind: RegionKind,
    /// Original address AND-ed with the region's `mask`.
    pub offset: u32,
}

/// Ordered region list.  Built once at machine init; read-only afterwards
/// and never allocates at access time.
#[derive(Debug, Clone, Default)]
pub struct MemoryMap {
    regions: Vec<MapRegion>,
}

impl MemoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a region.  Insertion order is lookup order.
    pub fn add(
        &mut self,
        first_addr: u32,
        last_addr: u32,
        range_mask: u32,
        mask: u32,
        kind: RegionKind,
        area: Area,
    ) {
        self.regions.push(MapRegion {
            first_addr,
            last_addr,
            range_mask,
            mask,
            kind,
            area,
        });
    }

    /// Find the first region containing `addr` (after its `range_mask`).
    pub fn route(&self, addr: u32) -> Option<Routed> {
        for region in &self.regions {
            let masked = addr & region.range_mask;
            if masked >= region.first_addr && masked <= region.last_addr {
                return Some(Routed {
                    area: region.area,
                    kind: region.kind,
                    offset: addr & region.mask,
                });
            }
        }
        None
    }
}

/// 16 MiB of main system RAM (area 3).  Addresses arriving here have already
/// been masked down to the RAM window by the memory map.
pub struct Memory {
    data: Box<[u8]>,
}

/// Main RAM size in bytes.
pub const MEMORY_SIZE: usize = 16 * 1024 * 1024;

impl Memory {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; MEMORY_SIZE].into_boxed_slice(),
        }
    }

    #[inline]
    fn offset(addr: u32) -> usize {
        (addr as usize) & (MEMORY_SIZE - 1)
    }

    #[inline]
    pub fn read_8(&self, addr: u32) -> u8 {
        self.data[Self::offset(addr)]
    }

    #[inline]
    pub fn read_16(&self, addr: u32) -> u16 {
        let at = Self::offset(addr);
        u16::from_le_bytes([self.data[at], self.data[(at + 1) & (MEMORY_SIZE - 1)]])
    }

    #[inline]
    pub fn read_32(&self, addr: u32) -> u32 {
        let at = Self::offset(addr);
        if at + 4 <= MEMORY_SIZE {
            u32::from_le_bytes(self.data[at..at + 4].try_into().unwrap())
        } else {
            let mut bytes = [0u8; 4];
            for (idx, byte) in bytes.iter_mut().enumerate() {
                *byte = self.data[(at + idx) & (MEMORY_SIZE - 1)];
            }
            u32::from_le_bytes(bytes)
        }
    }

    #[inline]
    pub fn write_8(&mut self, addr: u32, val: u8) {
        self.data[Self::offset(addr)] = val;
    }

    #[inline]
    pub fn write_16(&mut self, addr: u32, val: u16) {
        let at = Self::offset(addr);
        let bytes = val.to_le_bytes();
        self.data[at] = bytes[0];
        self.data[(at + 1) & (MEMORY_SIZE - 1)] = bytes[1];
    }

    #[inline]
    pub fn write_32(&mut self, addr: u32, val: u32) {
        let at = Self::offset(addr);
        let bytes = val.to_le_bytes();
        for (idx, byte) in bytes.iter().enumerate() {
            self.data[(at + idx) & (MEMORY_SIZE - 1)] = *byte;
        }
    }

    /// Bulk copy into RAM, used by the boot-mode preloaders.
    pub fn write_block(&mut self, addr: u32, data: &[u8]) {
        for (idx, &byte) in data.iter().enumerate() {
            self.data[(Self::offset(addr) + idx) & (MEMORY_SIZE - 1)] = byte;
        }
    }

    /// Bulk copy out of RAM, used by the maple DMA list walker.
    pub fn read_block(&self, addr: u32, out: &mut [u8]) {
        for (idx, byte) in out.iter_mut().enumerate() {
            *byte = self.data[(Self::offset(addr) + idx) & (MEMORY_SIZE - 1)];
        }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceIo for Memory {
    fn read8(&mut self, addr: u32) -> DcResult<u8> {
        Ok(self.read_8(addr))
    }

    fn read16(&mut self, addr: u32) -> DcResult<u16> {
        Ok(self.read_16(addr))
    }

    fn read32(&mut self, addr: u32) -> DcResult<u32> {
        Ok(self.read_32(addr))
    }

    fn write8(&mut self, addr: u32, val: u8) -> DcResult<()> {
        self.write_8(addr, val);
        Ok(())
    }

    fn write16(&mut self, addr: u32, val: u16) -> DcResult<()> {
        self.write_16(addr, val);
        Ok(())
    }

    fn write32(&mut self, addr: u32, val: u32) -> DcResult<()> {
        self.write_32(addr, val);
        Ok(())
    }

    fn read_double(&mut self, addr: u32) -> DcResult<f64> {
        let lo = self.read_32(addr) as u64;
        let hi = self.read_32(addr.wrapping_add(4)) as u64;
        Ok(f64::from_bits(lo | (hi << 32)))
    }

    fn write_double(&mut self, addr: u32, val: f64) -> DcResult<()> {
        let bits = val.to_bits();
        self.write_32(addr, bits as u32);
        self.write_32(addr.wrapping_add(4), (bits >> 32) as u32);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> MemoryMap {
        let mut map = MemoryMap::new();
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
            addr::BIOS_FIRST,
            addr::BIOS_LAST,
            addr::AREA0_MASK,
            addr::AREA0_MASK,
            RegionKind::Unknown,
            Area::BootRom,
        );
        map
    }

    #[test]
    fn test_mirrored_windows_route_to_same_ram_cell() {
        let map = sample_map();
        // P0/P1/P2/P3 images of the same physical RAM address.
        for base in [0x0c00_1000u32, 0x8c00_1000, 0xac00_1000, 0xcc00_1000] {
            let routed = map.route(base).expect("must hit RAM");
            assert_eq!(routed.area, Area::Ram);
            assert_eq!(routed.offset, 0x1000);
        }
    }

    #[test]
    fn test_p4_routes_exclusively_to_on_chip() {
        let map = sample_map();
        let routed = map.route(0xff00_0024).unwrap();
        assert_eq!(routed.area, Area::Sh4OnChip);
        // ...and nothing below P4 lands there.
        let routed = map.route(0x8c00_0024).unwrap();
        assert_eq!(routed.area, Area::Ram);
    }

    #[test]
    fn test_interface_sees_masked_offset() {
        let map = sample_map();
        // BIOS mirror at +0x0200_0000 still yields the area-0 offset.
        let routed = map.route(0x0200_1234).unwrap();
        assert_eq!(routed.area, Area::BootRom);
        assert_eq!(routed.offset, 0x1234);
    }

    #[test]
    fn test_unmapped_address_misses() {
        let map = sample_map();
        assert_eq!(map.route(0x03a0_0000), None);
    }

    #[test]
    fn test_memory_rw_widths() {
        let mut mem = Memory::new();
        mem.write_32(0x100, 0xdead_beef);
        assert_eq!(mem.read_32(0x100), 0xdead_beef);
        assert_eq!(mem.read_16(0x100), 0xbeef);
        assert_eq!(mem.read_8(0x103), 0xde);

        mem.write_16(0x200, 0x1234);
        assert_eq!(mem.read_8(0x200), 0x34);
        assert_eq!(mem.read_8(0x201), 0x12);
    }

    #[test]
    fn test_memory_mirrors_past_16mib() {
        let mut mem = Memory::new();
        mem.write_8(0x0100_0000, 0x55);
        assert_eq!(mem.read_8(0x0000_0000), 0x55);
    }

    #[test]
    fn test_block_roundtrip() {
        let mut mem = Memory::new();
        mem.write_block(0x8000, &[1, 2, 3, 4]);
        let mut out = [0u8; 4];
        mem.read_block(0x8000, &mut out);
        assert_eq!(out, [1, 2, 3, 4]);
    }
}
