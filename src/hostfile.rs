//! Host-file persistence helpers.
//!
//! A handful of devices survive across runs through plain files on the host:
//! the AICA RTC (a single ASCII decimal integer followed by whitespace), the
//! VMU block store and the flash image (raw binary).  The formats are treated
//! as opaque by everything above this module.

use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::{DcResult, ErrorRecord};

/// Longest RTC integer we accept; anything bigger than ten digits cannot be a
/// u32 anyway.
const TEXT_U32_MAX_CHARS: usize = 15;

/// Read an ASCII decimal integer from `path`.
///
/// Returns `Ok(None)` when the file does not exist or does not parse; a
/// missing or garbled state file just means starting fresh.
pub fn read_text_u32(path: &Path) -> Option<u32> {
    let mut file = fs::File::open(path).ok()?;
    let mut text = String::new();
    file.read_to_string(&mut text).ok()?;

    let digits: String = text
        .chars()
        .take_while(|ch| !ch.is_whitespace())
        .take(TEXT_U32_MAX_CHARS)
        .collect();
    if digits.is_empty() || !digits.chars().all(|ch| ch.is_ascii_digit()) {
        log::warn!("state file {} is not a decimal integer", path.display());
        return None;
    }
    digits.parse().ok()
}

/// Write an ASCII decimal integer (newline-terminated) to `path`.
pub fn write_text_u32(path: &Path, val: u32) -> DcResult<()> {
    fs::write(path, format!("{val}\n")).map_err(|err| {
        log::error!("unable to write {}: {err}", path.display());
        ErrorRecord::file_io(path)
    })
}

/// Read a whole binary image.  Returns `Ok(None)` when the file does not
/// exist (first run); any other I/O failure is an error.
pub fn read_binary(path: &Path) -> DcResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => {
            log::error!("unable to read {}: {err}", path.display());
            Err(ErrorRecord::file_io(path))
        }
    }
}

/// Read a whole binary image that must exist (boot ROM, syscall image).
pub fn read_binary_required(path: &Path) -> DcResult<Vec<u8>> {
    fs::read(path).map_err(|err| {
        log::error!("unable to read {}: {err}", path.display());
        ErrorRecord::file_io(path)
    })
}

/// Write a whole binary image.
pub fn write_binary(path: &Path, data: &[u8]) -> DcResult<()> {
    fs::write(path, data).map_err(|err| {
        log::error!("unable to write {}: {err}", path.display());
        ErrorRecord::file_io(path)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("dc-core-test-{}-{}", std::process::id(), name));
        path
    }

    #[test]
    fn test_text_u32_roundtrip() {
        let path = scratch_path("rtc-roundtrip");
        write_text_u32(&path, 0x1234_5678u32 as u32).unwrap();
        assert_eq!(read_text_u32(&path), Some(0x1234_5678));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_text_u32_missing_file() {
        let path = scratch_path("rtc-missing");
        assert_eq!(read_text_u32(&path), None);
    }

    #[test]
    fn test_text_u32_rejects_garbage() {
        let path = scratch_path("rtc-garbage");
        fs::write(&path, "not-a-number\n").unwrap();
        assert_eq!(read_text_u32(&path), None);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_text_u32_stops_at_whitespace() {
        let path = scratch_path("rtc-whitespace");
        fs::write(&path, "42 junk after\n").unwrap();
        assert_eq!(read_text_u32(&path), Some(42));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_binary_missing_is_none() {
        let path = scratch_path("bin-missing");
        assert_eq!(read_binary(&path).unwrap(), None);
    }

    #[test]
    fn test_binary_roundtrip() {
        let path = scratch_path("bin-roundtrip");
        write_binary(&path, &[1, 2, 3]).unwrap();
        assert_eq!(read_binary(&path).unwrap(), Some(vec![1, 2, 3]));
        let _ = fs::remove_file(&path);
    }
}
