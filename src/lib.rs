//! Sega Dreamcast emulator core.
//!
//! This crate models the console's two CPUs (the 200 MHz SH4 and the AICA's
//! 45 MHz ARM7), their shared notion of virtual time, and the event-driven
//! machinery that keeps the peripheral devices in step with CPU execution.
//! Rendering, audio synthesis and disc parsing live in pluggable
//! collaborators behind narrow interfaces; everything that determines the
//! timing model is in here.
//!
//! # Architecture
//!
//! - `sched`: cycle stamps, the per-domain event scheduler, clock domains
//! - `mem`: main RAM and the guest-physical memory map
//! - `sh4`, `arm7`: the CPU models and their dispatch loops
//! - `aica`, `pvr2`, `sys`, `maple`, `gdrom`, `gbus`: the device complex
//! - `dreamcast`: the machine struct, frame driver and system state machine
//!
//! # SH4 memory map (29-bit physical)
//!
//! | Address Range           | Region                |
//! |-------------------------|-----------------------|
//! | 0x00000000 - 0x001FFFFF | boot ROM              |
//! | 0x00200000 - 0x0021FFFF | flash                 |
//! | 0x005F6800 - 0x005F69FF | system block          |
//! | 0x005F6C00 - 0x005F6CFF | maple                 |
//! | 0x005F7000 - 0x005F73FF | G1 bus / GD-ROM       |
//! | 0x005F7400 - 0x005F77FF | G2 bus                |
//! | 0x005F8000 - 0x005F9FFF | PVR2 regs             |
//! | 0x00700000 - 0x00707FFF | AICA system regs      |
//! | 0x00710000 - 0x0071000B | AICA RTC              |
//! | 0x00800000 - 0x009FFFFF | AICA wave memory      |
//! | 0x0C000000 - 0x0FFFFFFF | main RAM (16 MiB)     |
//! | 0xE0000000 - 0xFFFFFFFF | SH4 on-chip (P4)      |

pub mod aica;
pub mod arm7;
pub mod boot_rom;
pub mod config;
pub mod debugger;
pub mod dreamcast;
pub mod error;
pub mod flash_rom;
pub mod gbus;
pub mod gdrom;
pub mod hostfile;
pub mod hw;
pub mod maple;
pub mod mem;
pub mod pvr2;
pub mod ring;
pub mod sched;
pub mod sh4;
pub mod sys;

pub use config::{BootMode, Config};
pub use dreamcast::{DcFlags, DcState, Dreamcast, PerfStats, TermReason};
pub use error::{DcResult, ErrorKind, ErrorRecord};
pub use gdrom::DiscSource;
