//! Dreamcast flash memory.
//!
//! 128 KiB of settings flash (system time zone, language, ISP settings...).
//! Unlike the boot ROM this is the user's property: writes are accepted and
//! the image is flushed back to the host file on shutdown and on error
//! paths.

use std::path::{Path, PathBuf};

use crate::error::DcResult;
use crate::hostfile;
use crate::mem::DeviceIo;

/// Size of the flash image.
pub const FLASH_SIZE: usize = 0x2_0000;

pub struct FlashRom {
    data: Vec<u8>,
    path: Option<PathBuf>,
    dirty: bool,
}

impl FlashRom {
    /// Load the image from `path`, or start from an erased (0xFF) image if
    /// the file does not exist yet.
    pub fn from_file(path: &Path) -> DcResult<Self> {
        let mut flash = match hostfile::read_binary(path)? {
            Some(data) => {
                if data.len() != FLASH_SIZE {
                    log::warn!(
                        "flash image {} has size {}, expected {}; padding/truncating",
                        path.display(),
                        data.len(),
                        FLASH_SIZE
                    );
                }
                let mut data = data;
                data.resize(FLASH_SIZE, 0xff);
                Self {
                    data,
                    path: Some(path.to_path_buf()),
                    dirty: false,
                }
            }
            None => {
                log::info!(
                    "no flash image at {}; starting from an erased image",
                    path.display()
                );
                Self {
                    data: vec![0xff; FLASH_SIZE],
                    path: Some(path.to_path_buf()),
                    dirty: false,
                }
            }
        };
        flash.data.truncate(FLASH_SIZE);
        Ok(flash)
    }

    /// In-memory image with no backing file (tests, throwaway sessions).
    pub fn ephemeral() -> Self {
        Self {
            data: vec![0xff; FLASH_SIZE],
            path: None,
            dirty: false,
        }
    }

    #[inline]
    fn offset(addr: u32) -> usize {
        (addr as usize) & (FLASH_SIZE - 1)
    }

    /// Persist the image if anything changed since the last flush.
    pub fn flush(&mut self) -> DcResult<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(path) = &self.path {
            log::info!("saving flash image to {}", path.display());
            hostfile::write_binary(path, &self.data)?;
        }
        self.dirty = false;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl Drop for FlashRom {
    fn drop(&mut self) {
        if self.flush().is_err() {
            log::error!("flash image was not saved");
        }
    }
}

impl DeviceIo for FlashRom {
    fn read8(&mut self, addr: u32) -> DcResult<u8> {
        Ok(self.data[Self::offset(addr)])
    }

    fn read16(&mut self, addr: u32) -> DcResult<u16> {
        let at = Self::offset(addr);
        Ok(u16::from_le_bytes([
            self.data[at],
            self.data[(at + 1) & (FLASH_SIZE - 1)],
        ]))
    }

    fn read32(&mut self, addr: u32) -> DcResult<u32> {
        let at = Self::offset(addr);
        let mut bytes = [0u8; 4];
        for (idx, byte) in bytes.iter_mut().enumerate() {
            *byte = self.data[(at + idx) & (FLASH_SIZE - 1)];
        }
        Ok(u32::from_le_bytes(bytes))
    }

    fn write8(&mut self, addr: u32, val: u8) -> DcResult<()> {
        self.data[Self::offset(addr)] = val;
        self.dirty = true;
        Ok(())
    }

    fn write16(&mut self, addr: u32, val: u16) -> DcResult<()> {
        let at = Self::offset(addr);
        let bytes = val.to_le_bytes();
        self.data[at] = bytes[0];
        self.data[(at + 1) & (FLASH_SIZE - 1)] = bytes[1];
        self.dirty = true;
        Ok(())
    }

    fn write32(&mut self, addr: u32, val: u32) -> DcResult<()> {
        let at = Self::offset(addr);
        for (idx, byte) in val.to_le_bytes().iter().enumerate() {
            self.data[(at + idx) & (FLASH_SIZE - 1)] = *byte;
        }
        self.dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_flash_reads_erased() {
        let mut flash = FlashRom::ephemeral();
        assert_eq!(flash.read8(0).unwrap(), 0xff);
        assert_eq!(flash.read32(0x1000).unwrap(), 0xffff_ffff);
    }

    #[test]
    fn test_write_marks_dirty() {
        let mut flash = FlashRom::ephemeral();
        assert!(!flash.is_dirty());
        flash.write16(0x10, 0x1234).unwrap();
        assert!(flash.is_dirty());
        assert_eq!(flash.read16(0x10).unwrap(), 0x1234);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let mut path = std::env::temp_dir();
        path.push(format!("dc-core-test-flash-{}", std::process::id()));

        {
            let mut flash = FlashRom::from_file(&path).unwrap();
            flash.write32(0x40, 0xcafe_f00d).unwrap();
            flash.flush().unwrap();
        }
        {
            let mut flash = FlashRom::from_file(&path).unwrap();
            assert_eq!(flash.read32(0x40).unwrap(), 0xcafe_f00d);
        }
        let _ = std::fs::remove_file(&path);
    }
}
