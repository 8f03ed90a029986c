//! Dreamcast boot ROM (firmware).
//!
//! 2 MiB of mask ROM at the bottom of area 0.  Loaded from a host file at
//! init; strictly read-only from the guest's point of view.

use std::path::Path;

use crate::error::{DcResult, ErrorKind, ErrorRecord};
use crate::hostfile;
use crate::mem::DeviceIo;

/// Size of every production BIOS image.
pub const BIOS_SZ_EXPECT: usize = 0x20_0000;

pub struct BootRom {
    data: Vec<u8>,
}

impl BootRom {
    pub fn from_file(path: &Path) -> DcResult<Self> {
        let data = hostfile::read_binary_required(path)?;
        if data.is_empty() {
            return Err(ErrorRecord::file_io(path).context("empty bios image"));
        }
        Ok(Self::from_bytes(data))
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        if data.len() != BIOS_SZ_EXPECT {
            log::warn!(
                "unexpected bios size (expected {}, got {}); the image will \
                 still be loaded but it could cause issues",
                BIOS_SZ_EXPECT,
                data.len()
            );
        }
        Self { data }
    }

    fn check_bounds(&self, addr: u32, len: u32) -> DcResult<usize> {
        let at = addr as usize;
        if at + len as usize > self.data.len() {
            return Err(ErrorRecord::new(ErrorKind::MemOutOfBounds)
                .address(addr)
                .length(len)
                .context("boot rom"));
        }
        Ok(at)
    }

    fn write_rejected(&self, addr: u32, len: u32) -> ErrorRecord {
        ErrorRecord::unimplemented("guest write to the boot rom")
            .address(addr)
            .length(len)
    }
}

impl DeviceIo for BootRom {
    fn read8(&mut self, addr: u32) -> DcResult<u8> {
        let at = self.check_bounds(addr, 1)?;
        Ok(self.data[at])
    }

    fn read16(&mut self, addr: u32) -> DcResult<u16> {
        let at = self.check_bounds(addr, 2)?;
        Ok(u16::from_le_bytes(self.data[at..at + 2].try_into().unwrap()))
    }

    fn read32(&mut self, addr: u32) -> DcResult<u32> {
        let at = self.check_bounds(addr, 4)?;
        Ok(u32::from_le_bytes(self.data[at..at + 4].try_into().unwrap()))
    }

    fn write8(&mut self, addr: u32, _val: u8) -> DcResult<()> {
        Err(self.write_rejected(addr, 1))
    }

    fn write16(&mut self, addr: u32, _val: u16) -> DcResult<()> {
        Err(self.write_rejected(addr, 2))
    }

    fn write32(&mut self, addr: u32, _val: u32) -> DcResult<()> {
        Err(self.write_rejected(addr, 4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_little_endian() {
        let mut rom = BootRom::from_bytes(vec![0x11, 0x22, 0x33, 0x44]);
        assert_eq!(rom.read8(0).unwrap(), 0x11);
        assert_eq!(rom.read16(0).unwrap(), 0x2211);
        assert_eq!(rom.read32(0).unwrap(), 0x4433_2211);
    }

    #[test]
    fn test_out_of_bounds_read_is_reported() {
        let mut rom = BootRom::from_bytes(vec![0u8; 16]);
        let err = rom.read32(14).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MemOutOfBounds);
        assert_eq!(err.address, Some(14));
    }

    #[test]
    fn test_writes_rejected() {
        let mut rom = BootRom::from_bytes(vec![0u8; 16]);
        let err = rom.write16(0, 0xbeef).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unimplemented);
        assert_eq!(err.length, Some(2));
    }
}
