//! Emulator configuration.
//!
//! The configuration surface is a plain struct filled in by whatever
//! front-end embeds the core; command-line parsing is somebody else's
//! problem.  JSON load/save helpers are provided so front-ends can persist a
//! profile without inventing their own format.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DcResult, ErrorRecord};

/// How the machine comes up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootMode {
    /// Boot the firmware from the beginning, like a real console.
    #[default]
    Firmware,
    /// Preload IP.BIN + syscalls and start at the bootstrap entry point.
    IpBin,
    /// Preload 1ST_READ.BIN + syscalls and jump straight into it.
    Direct,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub boot_mode: BootMode,

    /// Use the basic-block decode cache instead of straight interpretation.
    pub jit: bool,
    /// Request the native code generator.  No native back-end is built into
    /// this crate, but per the original semantics setting this forces `jit`.
    pub native_jit: bool,
    /// Advisory: inline memory fast paths inside compiled blocks.
    pub inline_mem: bool,

    /// Run the SH4 under the debugger-aware dispatch backend.
    pub dbg_enable: bool,
    /// I/O-thread service toggles.  The services themselves live outside the
    /// core; the core only honours the flags when wiring the serial rings.
    pub ser_srv_enable: bool,
    pub enable_cmd_tcp: bool,

    pub dc_bios_path: PathBuf,
    pub dc_flash_path: PathBuf,
    pub dc_path_rtc: Option<PathBuf>,
    pub syscall_path: Option<PathBuf>,
    pub ip_bin_path: Option<PathBuf>,
    pub exec_bin_path: Option<PathBuf>,
    pub gdi_image: Option<PathBuf>,
}

impl Config {
    /// Whether any jit backend is in play (`native_jit` implies `jit`).
    pub fn jit_enabled(&self) -> bool {
        self.jit || self.native_jit
    }

    pub fn load(path: &Path) -> DcResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            log::error!("unable to read config {}: {err}", path.display());
            ErrorRecord::file_io(path)
        })?;
        serde_json::from_str(&text).map_err(|err| {
            log::error!("config {} is malformed: {err}", path.display());
            ErrorRecord::file_io(path).context("config parse")
        })
    }

    pub fn save(&self, path: &Path) -> DcResult<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|_| ErrorRecord::integrity("config serialize"))?;
        std::fs::write(path, text).map_err(|err| {
            log::error!("unable to write config {}: {err}", path.display());
            ErrorRecord::file_io(path)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_jit_forces_jit() {
        let config = Config {
            native_jit: true,
            ..Config::default()
        };
        assert!(config.jit_enabled());
        assert!(!config.jit);
    }

    #[test]
    fn test_default_boot_mode_is_firmware() {
        assert_eq!(Config::default().boot_mode, BootMode::Firmware);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = Config {
            boot_mode: BootMode::Direct,
            jit: true,
            exec_bin_path: Some(PathBuf::from("/tmp/1st_read.bin")),
            ..Config::default()
        };
        let text = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&text).unwrap();
        assert_eq!(back.boot_mode, BootMode::Direct);
        assert!(back.jit);
        assert_eq!(back.exec_bin_path, Some(PathBuf::from("/tmp/1st_read.bin")));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let back: Config = serde_json::from_str(r#"{"boot_mode":"ip_bin"}"#).unwrap();
        assert_eq!(back.boot_mode, BootMode::IpBin);
        assert!(!back.jit);
    }
}
