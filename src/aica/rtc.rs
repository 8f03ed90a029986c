//! AICA real-time clock.
//!
//! Three 16-bit registers hold a 32-bit seconds counter (high word, low
//! word) and a write-enable latch.  A one-second scheduler event drives the
//! counter; writing the low word restarts the countdown so the guest's
//! just-written value survives a full second.  The counter persists across
//! runs as an ASCII decimal in a host file; with no file it seeds from the
//! host clock, counted from the Dreamcast epoch (1950-01-01).

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};

use crate::error::{DcResult, ErrorRecord};
use crate::hostfile;
use crate::sched::{Clock, EventHandle, EventKind, SCHED_FREQUENCY};

const RTC_ADDR_HIGH: u32 = 0x0071_0000;
const RTC_ADDR_LOW: u32 = 0x0071_0004;
const RTC_ADDR_ENABLE: u32 = 0x0071_0008;

/// Seconds between the Dreamcast epoch and now, by the host's clock.
fn host_seconds_since_epoch() -> u32 {
    let epoch = Utc.with_ymd_and_hms(1950, 1, 1, 0, 0, 0).unwrap();
    let delta = Utc::now().signed_duration_since(epoch).num_seconds();
    delta.clamp(0, u32::MAX as i64) as u32
}

pub struct AicaRtc {
    seconds: u32,
    write_enable: bool,
    tick_event: EventHandle,
    path: Option<PathBuf>,
}

impl AicaRtc {
    /// Bring up the RTC and book its first tick.
    pub fn new(clk: &mut Clock, path: Option<&Path>) -> Self {
        let seconds = match path.and_then(hostfile::read_text_u32) {
            Some(stored) => {
                log::info!("restored real-time clock: {stored} seconds");
                stored
            }
            None => {
                let now = host_seconds_since_epoch();
                log::info!("no saved real-time clock state; seeding from the host clock ({now})");
                now
            }
        };

        let tick_event = clk.alloc_event(EventKind::RtcTick);
        let rtc = Self {
            seconds,
            write_enable: false,
            tick_event,
            path: path.map(Path::to_path_buf),
        };
        clk.sched_event_in(tick_event, SCHED_FREQUENCY);
        rtc
    }

    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    /// One second of virtual time has elapsed.
    pub fn on_tick(&mut self, clk: &mut Clock) {
        self.seconds = self.seconds.wrapping_add(1);
        log::trace!("rtc: the time is now {:#010x} seconds", self.seconds);
        clk.sched_event_in(self.tick_event, SCHED_FREQUENCY);
    }

    /// Persist the counter.  Called at shutdown.
    pub fn save(&self) -> DcResult<()> {
        if let Some(path) = &self.path {
            log::info!(
                "saving real-time clock state ({} seconds) to {}",
                self.seconds,
                path.display()
            );
            hostfile::write_text_u32(path, self.seconds)?;
        }
        Ok(())
    }

    pub fn read_32(&self, addr: u32) -> DcResult<u32> {
        match addr {
            RTC_ADDR_HIGH => Ok(self.seconds >> 16),
            RTC_ADDR_LOW => Ok(self.seconds & 0xffff),
            RTC_ADDR_ENABLE => Ok(self.write_enable as u32),
            _ => Err(ErrorRecord::integrity("rtc register decode").address(addr)),
        }
    }

    pub fn write_32(&mut self, clk: &mut Clock, addr: u32, val: u32) -> DcResult<()> {
        match addr {
            RTC_ADDR_HIGH => {
                if self.write_enable {
                    self.seconds = (val << 16) | (self.seconds & 0xffff);
                } else {
                    log::debug!("rtc: high-word write ignored, enable latch clear");
                }
            }
            RTC_ADDR_LOW => {
                if self.write_enable {
                    self.seconds = (self.seconds & !0xffff) | (val & 0xffff);
                    // restart the countdown so the guest keeps its value for
                    // a full second
                    clk.cancel_event(self.tick_event);
                    clk.sched_event_in(self.tick_event, SCHED_FREQUENCY);
                } else {
                    log::debug!("rtc: low-word write ignored, enable latch clear");
                }
            }
            RTC_ADDR_ENABLE => {
                self.write_enable = val & 1 != 0;
            }
            _ => return Err(ErrorRecord::integrity("rtc register decode").address(addr)),
        }
        Ok(())
    }

    /// Narrow accesses are not a thing the hardware documents; report them.
    pub fn bad_width(&self, addr: u32, len: u32) -> ErrorRecord {
        ErrorRecord::unimplemented("narrow access to an AICA RTC register")
            .address(addr)
            .length(len)
    }

    #[cfg(test)]
    pub(crate) fn tick_event(&self) -> EventHandle {
        self.tick_event
    }
}
