//! Visual Memory Unit.
//!
//! 256 blocks of 512 bytes, persisted to a host file.  The storage function
//! reads whole blocks (BREAD) and writes quarter blocks (BWRITE, four
//! phases); BSYNC flushes to disk; MEMINFO reports the fixed filesystem
//! geometry.  Block addresses arrive byte-swapped on the wire.

use std::path::{Path, PathBuf};

use super::device::{func, pad_label, BlockRead, DevInfo, MapleDevice};
use crate::error::DcResult;
use crate::hostfile;

pub const BLOCK_SZ: usize = 512;
pub const N_BLOCKS: usize = 256;
const STORE_SIZE: usize = BLOCK_SZ * N_BLOCKS;

/// Dwords in a BWRITE request: function + block word + a quarter block.
const BWRITE_N_DWORDS: usize = 2 + 128 / 4;

const DEVICE_NAME: &str = "Visual Memory";
const LICENSE: &str = "Produced By or Under License From SEGA ENTERPRISES,LTD.";

pub struct Vmu {
    data: Vec<u8>,
    path: Option<PathBuf>,
    dirty: bool,
}

impl Vmu {
    /// Open the backing image, or format a fresh card if there is none.
    pub fn from_file(path: &Path) -> DcResult<Self> {
        match hostfile::read_binary(path)? {
            Some(mut data) => {
                if data.len() != STORE_SIZE {
                    log::warn!(
                        "vmu image {} has size {}, expected {}; padding/truncating",
                        path.display(),
                        data.len(),
                        STORE_SIZE
                    );
                    data.resize(STORE_SIZE, 0);
                }
                Ok(Self {
                    data,
                    path: Some(path.to_path_buf()),
                    dirty: false,
                })
            }
            None => {
                log::info!("no vmu image at {}; formatting a new card", path.display());
                let mut vmu = Self {
                    data: vec![0u8; STORE_SIZE],
                    path: Some(path.to_path_buf()),
                    dirty: true,
                };
                vmu.format();
                Ok(vmu)
            }
        }
    }

    /// In-memory card with no backing file.
    pub fn ephemeral() -> Self {
        let mut vmu = Self {
            data: vec![0u8; STORE_SIZE],
            path: None,
            dirty: false,
        };
        vmu.format();
        vmu
    }

    /// Lay down the root block (255) and the FAT (254) of an empty card.
    fn format(&mut self) {
        let mut root = [0u32; BLOCK_SZ / 4];
        root[0] = 0x5555_5555;
        root[1] = 0x5555_5555;
        root[2] = 0x5555_5555;
        root[3] = 0x5555_5555;
        root[4] = 0xffff_ff01;
        root[5] = 0xff;
        root[12] = 0x2711_9819;
        root[13] = 0x0414_0000;
        root[16] = 0xff;
        root[17] = 0x00fe_00ff;
        root[18] = 0x00f1_0001;
        root[19] = 0xd;
        root[20] = 0xc8;
        root[21] = 0x0080_0000;

        let mut fat = [0xfffc_fffcu32; BLOCK_SZ / 4];
        fat[120] = 0x00fd_fffc;
        fat[121] = 0x00f2_fffa;
        fat[122] = 0x00f4_00f3;
        fat[123] = 0x00f6_00f5;
        fat[124] = 0x00f8_00f7;
        fat[125] = 0x00fa_00f9;
        fat[126] = 0x00fc_00fb;
        fat[127] = 0xfffa_fffa;

        self.write_block_words(254, &fat);
        self.write_block_words(255, &root);
    }

    fn write_block_words(&mut self, block: usize, words: &[u32; BLOCK_SZ / 4]) {
        let base = block * BLOCK_SZ;
        for (idx, word) in words.iter().enumerate() {
            self.data[base + idx * 4..base + idx * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
    }

    pub fn block(&self, block: usize) -> &[u8] {
        &self.data[block * BLOCK_SZ..(block + 1) * BLOCK_SZ]
    }

    pub fn flush(&mut self) -> DcResult<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(path) = &self.path {
            log::info!("saving vmu image to {}", path.display());
            hostfile::write_binary(path, &self.data)?;
        }
        self.dirty = false;
        Ok(())
    }
}

impl MapleDevice for Vmu {
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn device_type(&self) -> &'static str {
        "vmu"
    }

    fn dev_info(&mut self) -> Option<DevInfo> {
        Some(DevInfo {
            func: func::STORAGE | func::LCD | func::CLOCK,
            func_data: [0x403f_7e7e, 0x0010_0500, 0x0041_0f00],
            area_code: 0xff,
            dir: 0,
            dev_name: pad_label(DEVICE_NAME),
            license: pad_label(LICENSE),
            standby_power: 0x01ae,
            max_power: 0x01f4,
        })
    }

    fn dev_bwrite(&mut self, dwords: &[u32]) -> Option<()> {
        if dwords.len() < 2 {
            log::error!("vmu: malformed BWRITE (not enough data)");
            return Some(());
        }
        if dwords[0] != func::STORAGE {
            log::error!("vmu: BWRITE to unknown function {:#010x}", dwords[0]);
            return Some(());
        }
        if dwords.len() != BWRITE_N_DWORDS {
            log::error!("vmu: unsupported BWRITE length {} dwords", dwords.len());
            return Some(());
        }

        let blkid = dwords[1].swap_bytes();
        let block = (blkid & 0xff) as usize;
        let phase = ((blkid >> 16) & 3) as usize;
        log::debug!("vmu: write block {block:#04x} phase {phase}");

        let base = BLOCK_SZ * block + 128 * phase;
        for (idx, word) in dwords[2..].iter().enumerate() {
            self.data[base + idx * 4..base + idx * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
        self.dirty = true;
        Some(())
    }

    fn dev_bread(&mut self, dwords: &[u32]) -> Option<BlockRead> {
        if dwords.len() < 2 {
            log::error!("vmu: malformed BREAD (not enough data)");
            return None;
        }
        if dwords[0] != func::STORAGE {
            log::error!("vmu: BREAD from unknown function {:#010x}", dwords[0]);
            return None;
        }

        let block = (dwords[1].swap_bytes() & 0xffff) as usize;
        log::debug!("vmu: read block {block:#04x}");
        if block >= N_BLOCKS {
            log::error!("vmu: BREAD past the end of the card ({block})");
            return None;
        }

        Some(BlockRead {
            func: func::STORAGE,
            block_word: dwords[1],
            data: self.block(block).to_vec(),
        })
    }

    fn dev_bsync(&mut self, _dwords: &[u32]) -> Option<()> {
        if self.flush().is_err() {
            log::error!("vmu: BSYNC flush failed");
        }
        Some(())
    }

    fn dev_meminfo(&mut self) -> Option<Vec<u32>> {
        // fixed card geometry: 256 blocks, FAT at 254, directory at 241
        // running down 13 blocks, 200 user blocks
        let (blkmax, blkmin) = (255u32, 0u32);
        let (infpos, fatpos) = (255u32, 254u32);
        let (fatsz, dirpos) = (1u32, 241u32);
        let (dirsz, icon) = (13u32, 0u32);
        let datasz = 200u32;
        Some(vec![
            func::STORAGE,
            blkmax | (blkmin << 16),
            infpos | (fatpos << 16),
            fatsz | (dirpos << 16),
            dirsz | (icon << 16),
            datasz,
        ])
    }

    fn on_cleanup(&mut self) {
        if self.flush().is_err() {
            log::error!("vmu: image was not saved");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_card_is_formatted() {
        let vmu = Vmu::ephemeral();
        let root = vmu.block(255);
        assert_eq!(&root[0..4], &0x5555_5555u32.to_le_bytes());
        let fat = vmu.block(254);
        assert_eq!(&fat[0..4], &0xfffc_fffcu32.to_le_bytes());
    }

    #[test]
    fn test_bwrite_then_bread_roundtrip() {
        let mut vmu = Vmu::ephemeral();

        // write phase 1 of block 0x10
        let blkid = (0x0001_0010u32).swap_bytes();
        let mut req = vec![func::STORAGE, blkid];
        req.extend((0u32..32).map(|word| 0x0101_0101 * (word + 1)));
        vmu.dev_bwrite(&req).unwrap();

        let read_req = [func::STORAGE, (0x10u32).swap_bytes()];
        let result = vmu.dev_bread(&read_req).unwrap();
        assert_eq!(result.func, func::STORAGE);
        assert_eq!(result.data.len(), BLOCK_SZ);
        // phase 1 covers bytes 128..256
        assert_eq!(&result.data[128..132], &0x0101_0101u32.to_le_bytes());
        assert_eq!(&result.data[0..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_bread_out_of_range() {
        let mut vmu = Vmu::ephemeral();
        let req = [func::STORAGE, 0x0001_0000u32]; // swaps to block 0x100
        assert!(vmu.dev_bread(&req).is_none());
    }

    #[test]
    fn test_meminfo_geometry() {
        let mut vmu = Vmu::ephemeral();
        let info = vmu.dev_meminfo().unwrap();
        assert_eq!(info[0], func::STORAGE);
        assert_eq!(info[1] & 0xffff, 255);
        assert_eq!(info[2] >> 16, 254);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let mut path = std::env::temp_dir();
        path.push(format!("dc-core-test-vmu-{}", std::process::id()));

        {
            let mut vmu = Vmu::from_file(&path).unwrap();
            let blkid = (0x0000_0020u32).swap_bytes();
            let mut req = vec![func::STORAGE, blkid];
            req.extend(std::iter::repeat(0xdead_beefu32).take(32));
            vmu.dev_bwrite(&req).unwrap();
            vmu.dev_bsync(&[]).unwrap();
        }
        {
            let vmu = Vmu::from_file(&path).unwrap();
            assert_eq!(&vmu.block(0x20)[0..4], &0xdead_beefu32.to_le_bytes());
        }
        let _ = std::fs::remove_file(&path);
    }
}
