//! Maple bus: the Dreamcast's peripheral bus.
//!
//! Software builds a command list in RAM (three header DWORDs plus payload
//! per frame) and kicks the DMA engine, either directly through SB_MDST or
//! automatically one line before vblank.  The frame processor walks the
//! list, dispatches each frame to the addressed device, DMAs the response
//! back to the caller's receive address and signals completion with a
//! deferred Holly interrupt.

pub mod controller;
pub mod device;
pub mod keyboard;
pub mod purupuru;
pub mod vmu;

use crate::error::{DcResult, ErrorRecord};
use crate::mem::Memory;
use crate::sched::{Clock, CycleStamp, EventHandle, EventKind};
use crate::sh4::dmac;

use device::{DevInfo, MapleDevice, CONTROLLER_COND_SIZE, DEVINFO_SIZE, KEYBOARD_COND_SIZE};

pub const PORT_COUNT: usize = 4;
pub const UNIT_COUNT: usize = 6;

/// How long after the last response the DMA-complete interrupt fires.
/// Hardware measurements put this around 1 ms, but several games break with
/// a non-zero value here, so it stays at zero until that is understood.
pub const DMA_COMPLETE_DELAY: CycleStamp = 0;

/// Command codes (frame header word 2, low nibble).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapleCmd {
    Devinfo = 1,
    AllInfo = 2,
    Reset = 3,
    Kill = 4,
    Nop = 7,
    GetCond = 9,
    MemInfo = 10,
    BRead = 11,
    BWrite = 12,
    BSync = 13,
    SetCond = 14,
}

impl MapleCmd {
    fn from_bits(bits: u32) -> Option<Self> {
        Some(match bits {
            1 => Self::Devinfo,
            2 => Self::AllInfo,
            3 => Self::Reset,
            4 => Self::Kill,
            7 => Self::Nop,
            9 => Self::GetCond,
            10 => Self::MemInfo,
            11 => Self::BRead,
            12 => Self::BWrite,
            13 => Self::BSync,
            14 => Self::SetCond,
            _ => return None,
        })
    }
}

/// Response codes.
mod resp {
    pub const NONE: u32 = 0xff;
    pub const DEVINFO: u32 = 5;
    pub const DATATRF: u32 = 8;
}

mod regs {
    pub const MDSTAR: u32 = 0x005f_6c04;
    pub const MDTSEL: u32 = 0x005f_6c10;
    pub const MDEN: u32 = 0x005f_6c14;
    pub const MDST: u32 = 0x005f_6c18;
    pub const MSYS: u32 = 0x005f_6c80;
    pub const MDAPRO: u32 = 0x005f_6c8c;
}

pub const FRAME_DATA_LEN: usize = 1024;

/// One decoded command frame plus its response buffer.
pub struct MapleFrame {
    pub port: u32,
    pub ptrn: u32,
    pub recv_addr: u32,
    pub last_frame: bool,
    pub cmd: MapleCmd,
    pub maple_addr: u32,
    pub pack_len: u32,
    pub input_len: usize,
    pub input_data: [u8; FRAME_DATA_LEN],
    pub output_len: usize,
    pub output_data: [u8; FRAME_DATA_LEN],
}

impl MapleFrame {
    /// Decode the three header DWORDs.
    fn decode(dat: [u32; 3]) -> DcResult<Self> {
        let input_len = ((dat[0] & 0xff) * 4) as usize;
        let port = (dat[0] >> 16) & 3;
        let ptrn = (dat[0] >> 8) & 7;
        let last_frame = dat[0] >> 31 != 0;

        let cmd_bits = dat[2] & 0xf;
        let cmd = MapleCmd::from_bits(cmd_bits).ok_or_else(|| {
            ErrorRecord::unimplemented("no handler for maplebus command frame").value(cmd_bits)
        })?;
        let maple_addr = (dat[2] >> 8) & 0xff;
        let pack_len = (dat[2] >> 24) & 0xff;

        if input_len != (4 * pack_len) as usize {
            return Err(
                ErrorRecord::unimplemented("maple frames with differing lengths")
                    .length(input_len as u32)
                    .expected_length(4 * pack_len),
            );
        }
        if input_len > FRAME_DATA_LEN {
            return Err(ErrorRecord::unimplemented("oversized maple frame payload")
                .length(input_len as u32));
        }

        Ok(Self {
            port,
            ptrn,
            recv_addr: dat[1],
            last_frame,
            cmd,
            maple_addr,
            pack_len,
            input_len,
            input_data: [0; FRAME_DATA_LEN],
            output_len: 0,
            output_data: [0; FRAME_DATA_LEN],
        })
    }

    /// Input payload as DWORDs.
    fn input_dwords(&self) -> Vec<u32> {
        self.input_data[..self.input_len]
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes(chunk.try_into().unwrap()))
            .collect()
    }
}

/// Pack a (port, unit) pair into the wire's device-address byte: bits 6-7
/// carry the port, the low five bits carry the unit as a bit set (unit 0 is
/// the hub at 0x20).
pub fn addr_pack(port: u32, unit: u32) -> u32 {
    assert!(
        (port as usize) < PORT_COUNT && (unit as usize) < UNIT_COUNT,
        "maple address out of range: port {port} unit {unit}"
    );
    let low = if unit > 0 { (1 << (unit - 1)) & 0x1f } else { 0x20 };
    low | (port << 6)
}

/// Inverse of [`addr_pack`].  Any other low-bit pattern is malformed guest
/// data.
pub fn addr_unpack(addr: u32) -> DcResult<(u32, u32)> {
    let unit = if addr & 0x3f == 0x20 {
        0
    } else {
        match addr & 0x1f {
            1 => 1,
            2 => 2,
            4 => 3,
            8 => 4,
            16 => 5,
            _ => {
                return Err(ErrorRecord::integrity("malformed maple device address").value(addr));
            }
        }
    };
    Ok(((addr >> 6) & 3, unit))
}

pub struct Maple {
    devs: [[Option<Box<dyn MapleDevice>>; UNIT_COUNT]; PORT_COUNT],

    dma_complete_event: EventHandle,
    dma_complete_scheduled: bool,

    mdstar: u32,
    dma_en: bool,
    /// MDTSEL bit 0: initiate DMA automatically on the pre-vblank line.
    vblank_autoinit: bool,
    /// One-shot arm from writing MDST while MDTSEL selects vblank.
    vblank_init_unlocked: bool,
    msys: u32,
    mdapro: u32,
}

impl Maple {
    pub fn new(clk: &mut Clock) -> Self {
        Self {
            devs: Default::default(),
            dma_complete_event: clk.alloc_event(EventKind::MapleDmaComplete),
            dma_complete_scheduled: false,
            mdstar: 0,
            dma_en: false,
            vblank_autoinit: false,
            vblank_init_unlocked: false,
            msys: 0,
            mdapro: (0x1 << 27) | (0x7f << 20),
        }
    }

    /// Plug a device into (port, unit).
    pub fn plug(&mut self, port: usize, unit: usize, dev: Box<dyn MapleDevice>) {
        assert!(
            self.devs[port][unit].is_none(),
            "maple port {port} unit {unit} is already occupied"
        );
        log::info!("maple: {} plugged into port {port} unit {unit}", dev.device_type());
        self.devs[port][unit] = Some(dev);
    }

    /// Unplug and clean up whatever occupies (port, unit).
    pub fn unplug(&mut self, port: usize, unit: usize) {
        if let Some(mut dev) = self.devs[port][unit].take() {
            dev.on_cleanup();
        }
    }

    pub fn device_mut(&mut self, port: usize, unit: usize) -> Option<&mut (dyn MapleDevice + '_)> {
        match &mut self.devs[port][unit] {
            Some(b) => Some(b.as_mut()),
            None => None,
        }
    }

    /// Tear down every plugged device (reverse of machine init).
    pub fn cleanup(&mut self) {
        for port in 0..PORT_COUNT {
            for unit in 0..UNIT_COUNT {
                self.unplug(port, unit);
            }
        }
    }

    fn subdevice_mask(&self, port: usize) -> u32 {
        let mut subdevs = 0;
        if self.devs[port][1].is_some() {
            subdevs |= 1;
        }
        if self.devs[port][2].is_some() {
            subdevs |= 2;
        }
        subdevs
    }

    /// MMIO read from the maple register window.
    pub fn read_32(&mut self, addr: u32) -> DcResult<u32> {
        Ok(match addr {
            regs::MDSTAR => self.mdstar,
            regs::MDTSEL => self.vblank_autoinit as u32,
            regs::MDEN => self.dma_en as u32,
            // DMA transfers complete within the triggering write
            regs::MDST => 0,
            regs::MSYS => self.msys,
            regs::MDAPRO => self.mdapro,
            _ => {
                log::trace!("maple: read from unmodelled register {addr:#010x}");
                0
            }
        })
    }

    /// MMIO write to the maple register window.  Writing SB_MDST kicks the
    /// frame processor.
    pub fn write_32(
        &mut self,
        mem: &mut Memory,
        clk: &mut Clock,
        addr: u32,
        val: u32,
    ) -> DcResult<()> {
        match addr {
            regs::MDSTAR => self.mdstar = val & 0x1fff_ffe0,
            regs::MDTSEL => self.vblank_autoinit = val & 1 != 0,
            regs::MDEN => self.dma_en = val & 1 != 0,
            regs::MDST => {
                if val & 1 != 0 && self.dma_en {
                    if self.vblank_autoinit {
                        // armed; the transfer happens on the pre-vblank line
                        self.vblank_init_unlocked = true;
                    } else {
                        self.process_dma(mem, clk, self.mdstar)?;
                    }
                }
            }
            regs::MSYS => self.msys = val,
            regs::MDAPRO => self.mdapro = val,
            _ => log::trace!("maple: write {val:#010x} to unmodelled register {addr:#010x}"),
        }
        Ok(())
    }

    /// The SPG is one line short of vblank; run the armed or automatic DMA.
    pub fn notify_pre_vblank(&mut self, mem: &mut Memory, clk: &mut Clock) -> DcResult<()> {
        if (self.vblank_init_unlocked || self.vblank_autoinit) && self.dma_en {
            log::trace!("maple: auto-initiating DMA on incoming vblank");
            self.process_dma(mem, clk, self.mdstar)?;
            if !self.vblank_autoinit {
                self.vblank_init_unlocked = false;
            }
        }
        Ok(())
    }

    /// Walk the command list at `src_addr` and service every frame.
    pub fn process_dma(&mut self, mem: &mut Memory, clk: &mut Clock, src_addr: u32) -> DcResult<()> {
        let mut src = src_addr;
        loop {
            let word0 = dmac::read_dword(mem, src)?;
            let xfer_complete = word0 >> 31 != 0;
            let ptrn = (word0 >> 8) & 7;
            src += 4;

            match ptrn {
                0 => {}
                7 => {
                    if xfer_complete {
                        break;
                    }
                    continue;
                }
                _ => {
                    return Err(
                        ErrorRecord::unimplemented("maple frame pattern").value(ptrn)
                    );
                }
            }

            let word1 = dmac::read_dword(mem, src)?;
            let word2 = dmac::read_dword(mem, src + 4)?;
            src += 8;

            let mut frame = MapleFrame::decode([word0, word1, word2])?;
            if frame.input_len > 0 {
                let len = frame.input_len;
                dmac::transfer_from_mem(mem, src, &mut frame.input_data[..len])?;
                src += frame.input_len as u32;
            }

            self.handle_frame(mem, clk, &mut frame)?;

            if xfer_complete {
                break;
            }
        }
        Ok(())
    }

    fn handle_frame(
        &mut self,
        mem: &mut Memory,
        clk: &mut Clock,
        frame: &mut MapleFrame,
    ) -> DcResult<()> {
        log::trace!(
            "maple: {:?} frame for address {:#04x} on port {} ({} payload bytes)",
            frame.cmd,
            frame.maple_addr,
            frame.port,
            frame.input_len
        );

        let (port, unit) = addr_unpack(frame.maple_addr)?;
        let plugged = self.devs[port as usize][unit as usize].is_some();

        match frame.cmd {
            MapleCmd::Devinfo => {
                if plugged {
                    let dev = self.devs[port as usize][unit as usize].as_mut().unwrap();
                    let info = dev.dev_info().unwrap_or_else(|| {
                        log::warn!("maple: no dev_info slot on {}", dev.device_type());
                        DevInfo::zeroed()
                    });
                    frame.output_len = info.compile(&mut frame.output_data[..DEVINFO_SIZE]);
                    self.write_frame_resp(mem, frame, resp::DEVINFO)?;
                } else {
                    // nothing plugged in at this port/unit
                    frame.output_len = 0;
                    self.write_frame_resp(mem, frame, resp::NONE)?;
                }
            }
            MapleCmd::GetCond => {
                if !plugged {
                    return Err(ErrorRecord::unimplemented(
                        "proper response to GETCOND on an empty maple port",
                    ));
                }
                let dev = self.devs[port as usize][unit as usize].as_mut().unwrap();
                match dev.dev_get_cond() {
                    Some(cond) => {
                        frame.output_len = cond.compile(&mut frame.output_data);
                        debug_assert!(
                            frame.output_len == CONTROLLER_COND_SIZE
                                || frame.output_len == KEYBOARD_COND_SIZE
                        );
                    }
                    None => {
                        log::warn!("maple: no get_cond slot on {}", dev.device_type());
                        frame.output_len = CONTROLLER_COND_SIZE;
                        frame.output_data[..frame.output_len].fill(0);
                    }
                }
                self.write_frame_resp(mem, frame, resp::DATATRF)?;
            }
            MapleCmd::BWrite => {
                if !plugged {
                    return Err(ErrorRecord::unimplemented(
                        "proper response to BWRITE on an empty maple port",
                    ));
                }
                let dwords = frame.input_dwords();
                let dev = self.devs[port as usize][unit as usize].as_mut().unwrap();
                if dev.dev_bwrite(&dwords).is_none() {
                    log::warn!("maple: no bwrite slot on {}", dev.device_type());
                }
                frame.output_len = 0;
                self.write_frame_resp(mem, frame, resp::DATATRF)?;
            }
            MapleCmd::SetCond => {
                if !plugged {
                    return Err(ErrorRecord::unimplemented(
                        "proper response to SETCOND on an empty maple port",
                    ));
                }
                let dwords = frame.input_dwords();
                let dev = self.devs[port as usize][unit as usize].as_mut().unwrap();
                if dev.dev_set_cond(&dwords).is_none() {
                    log::warn!("maple: no set_cond slot on {}", dev.device_type());
                }
                frame.output_len = 0;
                self.write_frame_resp(mem, frame, resp::DATATRF)?;
            }
            MapleCmd::BRead => {
                if !plugged {
                    return Err(ErrorRecord::unimplemented(
                        "proper response to BREAD on an empty maple port",
                    ));
                }
                let dwords = frame.input_dwords();
                let dev = self.devs[port as usize][unit as usize].as_mut().unwrap();
                match dev.dev_bread(&dwords) {
                    Some(block) => {
                        frame.output_data[0..4].copy_from_slice(&block.func.to_le_bytes());
                        frame.output_data[4..8].copy_from_slice(&block.block_word.to_le_bytes());
                        frame.output_data[8..8 + block.data.len()].copy_from_slice(&block.data);
                        frame.output_len = 8 + block.data.len();
                        self.write_frame_resp(mem, frame, resp::DATATRF)?;
                    }
                    None => {
                        frame.output_len = 0;
                        self.write_frame_resp(mem, frame, resp::NONE)?;
                    }
                }
            }
            MapleCmd::BSync => {
                if !plugged {
                    return Err(ErrorRecord::unimplemented(
                        "proper response to BSYNC on an empty maple port",
                    ));
                }
                let dwords = frame.input_dwords();
                let dev = self.devs[port as usize][unit as usize].as_mut().unwrap();
                if dev.dev_bsync(&dwords).is_none() {
                    log::warn!("maple: no bsync slot on {}", dev.device_type());
                }
                frame.output_len = 0;
                self.write_frame_resp(mem, frame, resp::DATATRF)?;
            }
            MapleCmd::MemInfo => {
                if !plugged {
                    return Err(ErrorRecord::unimplemented(
                        "proper response to MEMINFO on an empty maple port",
                    ));
                }
                let dev = self.devs[port as usize][unit as usize].as_mut().unwrap();
                let words = dev.dev_meminfo().unwrap_or_else(|| {
                    log::warn!("maple: no meminfo slot on {}", dev.device_type());
                    vec![0; 6]
                });
                for (idx, word) in words.iter().enumerate() {
                    frame.output_data[idx * 4..idx * 4 + 4].copy_from_slice(&word.to_le_bytes());
                }
                frame.output_len = words.len() * 4;
                self.write_frame_resp(mem, frame, resp::DATATRF)?;
            }
            MapleCmd::AllInfo | MapleCmd::Reset | MapleCmd::Kill | MapleCmd::Nop => {
                return Err(
                    ErrorRecord::unimplemented("no handler for maplebus command frame")
                        .value(frame.cmd as u32),
                );
            }
        }

        self.dma_complete(clk);
        Ok(())
    }

    /// DMA the response header and payload back to the caller.
    fn write_frame_resp(
        &mut self,
        mem: &mut Memory,
        frame: &MapleFrame,
        resp_code: u32,
    ) -> DcResult<()> {
        let (port, unit) = addr_unpack(frame.maple_addr)?;
        let subdevs = if unit == 0 {
            self.subdevice_mask(port as usize)
        } else {
            0
        };

        let len_words = (frame.output_len / 4) as u32;
        let pkt_hdr = (resp_code & 0xff)
            | ((frame.maple_addr & 0xff) << 8)
            | (subdevs << 16)
            | (len_words << 24);

        dmac::transfer_to_mem(mem, frame.recv_addr, &pkt_hdr.to_le_bytes())?;
        if frame.output_len > 0 {
            dmac::transfer_to_mem(
                mem,
                frame.recv_addr + 4,
                &frame.output_data[..frame.output_len],
            )?;
        }
        Ok(())
    }

    /// Book the deferred completion interrupt (at most one outstanding).
    fn dma_complete(&mut self, clk: &mut Clock) {
        if !self.dma_complete_scheduled {
            self.dma_complete_scheduled = true;
            clk.sched_event_in(self.dma_complete_event, DMA_COMPLETE_DELAY);
        }
    }

    /// The completion event fired; the caller raises the Holly interrupt.
    pub fn on_dma_complete_event(&mut self) {
        self.dma_complete_scheduled = false;
    }
}
