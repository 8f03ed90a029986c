//! GD-ROM device boundary.
//!
//! Disc parsing is a separate subsystem; the core only consumes sector data
//! through the [`DiscSource`] trait and exposes the drive's ATA-style
//! register window to the guest.  Without a disc the drive reports itself
//! ready with an open tray, which is all the firmware needs to finish
//! booting to the menu.

use crate::error::DcResult;
use crate::mem::DeviceIo;

/// Raw sector size for GD-ROM data tracks.
pub const SECTOR_SIZE: usize = 2352;

/// Track data provider, implemented by the GDI file-set parser that lives
/// outside this crate.
pub trait DiscSource: Send {
    /// Number of the first and last track.
    fn track_range(&self) -> (u32, u32);

    /// Read one raw sector by absolute LBA.
    fn read_sector(&mut self, lba: u32, out: &mut [u8; SECTOR_SIZE]) -> DcResult<()>;
}

mod regs {
    pub const DATA: u32 = 0x005f_7080;
    pub const ERROR: u32 = 0x005f_7084;
    pub const SEC_CNT: u32 = 0x005f_7088;
    pub const SEC_NUM: u32 = 0x005f_708c;
    /// Status on read, command on write.
    pub const STATUS: u32 = 0x005f_709c;
}

/// Drive status: DRDY | DSC.
const STAT_READY: u32 = 0x50;
/// Disc-status nibble: open tray (no disc mounted).
const DISC_STATE_OPEN: u32 = 0x0;
/// Disc-status nibble: GD-ROM present.
const DISC_STATE_GDROM: u32 = 0x8;

pub struct GdRom {
    disc: Option<Box<dyn DiscSource>>,
    sec_cnt: u32,
}

impl GdRom {
    pub fn new(disc: Option<Box<dyn DiscSource>>) -> Self {
        Self { disc, sec_cnt: 0 }
    }

    pub fn has_disc(&self) -> bool {
        self.disc.is_some()
    }

    pub fn disc_mut(&mut self) -> Option<&mut (dyn DiscSource + '_)> {
        match &mut self.disc {
            Some(b) => Some(b.as_mut()),
            None => None,
        }
    }

    fn status(&self) -> u32 {
        STAT_READY
    }

    fn sec_num(&self) -> u32 {
        // state "standby" in the low nibble, disc type above it
        let disc = if self.disc.is_some() {
            DISC_STATE_GDROM << 4
        } else {
            DISC_STATE_OPEN << 4
        };
        disc | 0x1
    }
}

impl DeviceIo for GdRom {
    fn read8(&mut self, addr: u32) -> DcResult<u8> {
        Ok(self.read32(addr)? as u8)
    }

    fn read16(&mut self, addr: u32) -> DcResult<u16> {
        Ok(self.read32(addr)? as u16)
    }

    fn read32(&mut self, addr: u32) -> DcResult<u32> {
        let val = match addr {
            regs::STATUS => self.status(),
            regs::SEC_NUM => self.sec_num(),
            regs::SEC_CNT => self.sec_cnt,
            regs::ERROR | regs::DATA => 0,
            _ => 0,
        };
        log::trace!("gdrom: read {val:#x} from {addr:#010x}");
        Ok(val)
    }

    fn write8(&mut self, addr: u32, val: u8) -> DcResult<()> {
        self.write32(addr, val as u32)
    }

    fn write16(&mut self, addr: u32, val: u16) -> DcResult<()> {
        self.write32(addr, val as u32)
    }

    fn write32(&mut self, addr: u32, val: u32) -> DcResult<()> {
        log::trace!("gdrom: write {val:#x} to {addr:#010x}");
        if addr == regs::SEC_CNT {
            self.sec_cnt = val & 0xff;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_drive_reports_open_tray() {
        let mut gdrom = GdRom::new(None);
        assert!(!gdrom.has_disc());
        assert_eq!(gdrom.read32(regs::STATUS).unwrap(), STAT_READY);
        assert_eq!(gdrom.read32(regs::SEC_NUM).unwrap() >> 4, DISC_STATE_OPEN);
    }

    struct OneTrack;

    impl DiscSource for OneTrack {
        fn track_range(&self) -> (u32, u32) {
            (1, 1)
        }

        fn read_sector(&mut self, _lba: u32, out: &mut [u8; SECTOR_SIZE]) -> DcResult<()> {
            out.fill(0xaa);
            Ok(())
        }
    }

    #[test]
    fn test_mounted_disc_changes_disc_state() {
        let mut gdrom = GdRom::new(Some(Box::new(OneTrack)));
        assert!(gdrom.has_disc());
        assert_eq!(gdrom.read32(regs::SEC_NUM).unwrap() >> 4, DISC_STATE_GDROM);

        let mut sector = [0u8; SECTOR_SIZE];
        gdrom
            .disc_mut()
            .unwrap()
            .read_sector(0, &mut sector)
            .unwrap();
        assert_eq!(sector[0], 0xaa);
    }
}
