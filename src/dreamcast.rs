//! The machine: both CPUs, both clock domains, the device complex, the
//! frame driver and the system state machine.
//!
//! One frame of emulation interleaves the two clock domains at timeslice
//! granularity: the SH4 runs to its next event deadline, its due events are
//! serviced, then the ARM7 does the same, until the display raises the
//! end-of-frame flag.  Cross-domain ordering is therefore bounded by one
//! timeslice rather than being cycle-exact, which is plenty for hardware
//! that only talks through FIFOs and interrupts.
//!
//! State transitions are explicit (old, new) pairs and anything else is a
//! bug worth dying loudly over.  Requests from other threads come in as
//! atomic flags that the loop polls at instruction and frame boundaries;
//! nothing blocks across the emulation boundary.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::arm7::{self, Arm7};
use crate::boot_rom::BootRom;
use crate::config::{BootMode, Config};
use crate::error::{DcResult, ErrorKind, ErrorRecord};
use crate::flash_rom::FlashRom;
use crate::gdrom::DiscSource;
use crate::hostfile;
use crate::hw::HwDevices;
use crate::maple::controller::Controller;
use crate::maple::keyboard::Keyboard;
use crate::maple::purupuru::Purupuru;
use crate::maple::vmu::Vmu;
use crate::mem::addr;
use crate::sched::{
    Clock, CycleStamp, EventHandle, EventKind, ARM7_CLOCK_SCALE, SCHED_FREQUENCY, SH4_CLOCK_SCALE,
};
use crate::sh4::{excp, exec, jit, tmu, ExecState, Sh4};
use crate::sys::istnrm;

/// Period of the low-frequency housekeeping event.  Short enough that the
/// serial port stays responsive; nothing depends on the exact figure.
const PERIODIC_EVENT_PERIOD: CycleStamp = SCHED_FREQUENCY / 100;

/// AICA sample-timer sync interval (one 44.1 kHz sample, rounded down).
const AICA_SAMPLE_INTERVAL: CycleStamp = SCHED_FREQUENCY / 44_100;

/// Whole-machine lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DcState {
    NotRunning = 0,
    Running = 1,
    Suspend = 2,
    Debug = 3,
}

impl DcState {
    fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Self::Running,
            2 => Self::Suspend,
            3 => Self::Debug,
            _ => Self::NotRunning,
        }
    }
}

/// Why the machine stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermReason {
    /// Normal exit (host asked us to stop).
    Norm,
    /// User-initiated interruption.
    Interrupted,
    /// An unrecoverable error record surfaced from the dispatch loop.
    Error,
}

/// Process-wide atomic state shared with the I/O and UI threads.  All
/// cross-thread signalling goes through here; no mutex ever crosses the
/// emulation boundary.
pub struct DcFlags {
    state: AtomicU8,
    is_running: AtomicBool,
    end_of_frame: AtomicBool,
    frame_stop: AtomicBool,
    signal_exit: AtomicBool,
}

impl DcFlags {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(DcState::NotRunning as u8),
            is_running: AtomicBool::new(true),
            end_of_frame: AtomicBool::new(false),
            frame_stop: AtomicBool::new(false),
            signal_exit: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> DcState {
        DcState::from_bits(self.state.load(Ordering::Acquire))
    }

    /// Explicit (old, new) state transition.  Panics if the machine is not
    /// in `old`: an unknown transition is a programming error, not a
    /// recoverable condition.
    pub fn transition(&self, new: DcState, old: DcState) {
        if self
            .state
            .compare_exchange(old as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            panic!(
                "illegal state transition: expected {:?} -> {:?}, but the machine is in {:?}",
                old,
                new,
                self.state()
            );
        }
        log::debug!("state transition {old:?} -> {new:?}");
    }

    /// Whether the emulation thread should keep running.
    pub fn emu_thread_is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    /// Whether the process as a whole is still alive (the I/O thread polls
    /// this to unwind its event loop).
    pub fn dc_is_running(&self) -> bool {
        !self.signal_exit.load(Ordering::Relaxed)
    }

    /// Ask the emulator to exit at the next frame boundary.
    pub fn kill(&self) {
        log::info!("shutdown requested");
        self.is_running.store(false, Ordering::Relaxed);
    }

    /// Ask for a suspend at the next frame boundary.
    pub fn request_frame_stop(&self) {
        self.frame_stop.store(true, Ordering::Relaxed);
    }

    /// CLI "begin-execution".
    pub fn begin_execution(&self) {
        self.transition(DcState::Running, DcState::NotRunning);
    }

    /// CLI "resume-execution".
    pub fn resume_execution(&self) {
        self.transition(DcState::Running, DcState::Suspend);
    }

    pub(crate) fn raise_end_of_frame(&self) {
        self.end_of_frame.store(true, Ordering::Release);
    }

    fn take_end_of_frame(&self) -> bool {
        self.end_of_frame
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn take_frame_stop(&self) -> bool {
        self.frame_stop
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn signal_exit_threads(&self) {
        self.signal_exit.store(true, Ordering::Relaxed);
    }
}

/// SH4 dispatch backend, chosen once at run start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sh4Backend {
    Interp,
    Jit,
    Debug,
}

/// Wall-clock vs virtual-time figures for the last completed frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerfStats {
    pub frames: u64,
    /// Host frames per second.
    pub real_fps: f64,
    /// Virtual frames per second (how fast the guest thinks time passes).
    pub virt_fps: f64,
}

impl std::fmt::Debug for Dreamcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dreamcast").finish_non_exhaustive()
    }
}

pub struct Dreamcast {
    pub sh4: Sh4,
    pub arm7: Arm7,
    pub(crate) sh4_clock: Clock,
    pub(crate) arm7_clock: Clock,
    pub hw: HwDevices,

    config: Config,
    flags: Arc<DcFlags>,
    sh4_backend: Sh4Backend,

    periodic_event: EventHandle,
    aica_tick_event: EventHandle,

    term_reason: TermReason,
    perf: PerfStats,
    start_time: Instant,
    last_frame_realtime: Instant,
    last_frame_virttime: CycleStamp,

    /// Pluggable rendering backend, invoked once per frame with the PVR2's
    /// texture/framebuffer memory.
    render_cb: Option<Box<dyn FnMut(&mut crate::pvr2::TexMem) + Send>>,
}

impl Dreamcast {
    /// Bring the machine up, leaf-first: memory and ROMs, clocks, CPUs,
    /// devices, memory maps, then the boot-mode preload.
    pub fn new(config: Config) -> DcResult<Self> {
        Self::with_disc(config, None)
    }

    pub fn with_disc(config: Config, disc: Option<Box<dyn DiscSource>>) -> DcResult<Self> {
        let boot_rom = BootRom::from_file(&config.dc_bios_path)?;
        let flash = FlashRom::from_file(&config.dc_flash_path)?;

        let mut sh4_clock = Clock::new();
        let mut arm7_clock = Clock::new();

        let sh4 = Sh4::new(&mut sh4_clock);
        let arm7 = Arm7::new();

        let mut hw = HwDevices::new(
            &mut sh4_clock,
            boot_rom,
            flash,
            disc,
            config.dc_path_rtc.as_deref(),
        )?;

        let periodic_event = sh4_clock.alloc_event(EventKind::Periodic);
        let aica_tick_event = arm7_clock.alloc_event(EventKind::AicaSampleTick);

        // every console ships with a controller in port A
        hw.maple.plug(0, 0, Box::new(Controller::new()));

        // first scan line; the SPG re-books itself forever after
        let line_period = hw.pvr2.spg.line_period();
        sh4_clock.sched_event_in(hw.pvr2.spg.line_event, line_period);
        arm7_clock.sched_event_in(aica_tick_event, AICA_SAMPLE_INTERVAL);

        let mut dc = Self {
            sh4,
            arm7,
            sh4_clock,
            arm7_clock,
            hw,
            sh4_backend: if config.dbg_enable {
                Sh4Backend::Debug
            } else if config.jit_enabled() {
                Sh4Backend::Jit
            } else {
                Sh4Backend::Interp
            },
            config,
            flags: Arc::new(DcFlags::new()),
            periodic_event,
            aica_tick_event,
            term_reason: TermReason::Norm,
            perf: PerfStats::default(),
            start_time: Instant::now(),
            last_frame_realtime: Instant::now(),
            last_frame_virttime: 0,
            render_cb: None,
        };

        if dc.config.native_jit && !dc.config.jit {
            log::info!("native jit requested; enabling the jit");
        }

        dc.apply_boot_mode()?;

        // with no remote cmd session attached, start running immediately
        if !dc.config.enable_cmd_tcp {
            dc.flags.transition(DcState::Running, DcState::NotRunning);
        }

        Ok(dc)
    }

    /// Boot-mode preloading and entry-point selection.
    fn apply_boot_mode(&mut self) -> DcResult<()> {
        let boot_mode = self.config.boot_mode;
        if boot_mode == BootMode::Firmware {
            return Ok(());
        }

        if let Some(ip_bin_path) = self.config.ip_bin_path.clone() {
            let ip_bin = hostfile::read_binary_required(&ip_bin_path)?;
            self.hw
                .mem
                .write_block(addr::IP_BIN & addr::AREA3_MASK, &ip_bin);
        }

        if let Some(exec_bin_path) = self.config.exec_bin_path.clone() {
            let exec_bin = hostfile::read_binary_required(&exec_bin_path)?;
            self.hw
                .mem
                .write_block(addr::FIRST_READ_BIN & addr::AREA3_MASK, &exec_bin);
        }

        let syscall_path = self.config.syscall_path.clone().ok_or_else(|| {
            ErrorRecord::new(ErrorKind::FileIo).context("ip_bin/direct boot requires syscall_path")
        })?;
        let syscalls = hostfile::read_binary_required(&syscall_path)?;
        if syscalls.len() != addr::SYSCALLS_LEN as usize {
            return Err(ErrorRecord::new(ErrorKind::InvalidFileLen)
                .path(syscall_path)
                .length(syscalls.len() as u32)
                .expected_length(addr::SYSCALLS_LEN));
        }
        self.hw
            .mem
            .write_block(addr::SYSCALLS & addr::AREA3_MASK, &syscalls);

        self.sh4.pc = match boot_mode {
            BootMode::Direct => addr::FIRST_READ_BIN,
            _ => addr::BOOTSTRAP,
        };
        // what the VBR holds by the time IP.BIN gets control of a real
        // firmware boot; obtained empirically
        self.sh4.vbr = 0x8c00_f400;
        Ok(())
    }

    pub fn flags(&self) -> Arc<DcFlags> {
        Arc::clone(&self.flags)
    }

    pub fn state(&self) -> DcState {
        self.flags.state()
    }

    pub fn term_reason(&self) -> TermReason {
        self.term_reason
    }

    pub fn perf_stats(&self) -> PerfStats {
        self.perf
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // -----------------------------------------------------------------
    // host input

    fn controller_mut(&mut self, port: usize) -> Option<&mut Controller> {
        self.hw
            .maple
            .device_mut(port, 0)
            .and_then(|dev| dev.as_any_mut().downcast_mut::<Controller>())
    }

    pub fn press_buttons(&mut self, port: usize, btns: u32) {
        match self.controller_mut(port) {
            Some(pad) => pad.press_btns(btns),
            None => log::error!("no controller plugged into port {port}"),
        }
    }

    pub fn release_buttons(&mut self, port: usize, btns: u32) {
        match self.controller_mut(port) {
            Some(pad) => pad.release_btns(btns),
            None => log::error!("no controller plugged into port {port}"),
        }
    }

    pub fn set_axis(&mut self, port: usize, which: usize, val: u8) {
        match self.controller_mut(port) {
            Some(pad) => pad.set_axis(which, val),
            None => log::error!("no controller plugged into port {port}"),
        }
    }

    // -----------------------------------------------------------------
    // peripheral plugging

    pub fn plug_keyboard(&mut self, port: usize) {
        self.hw.maple.plug(port, 0, Box::new(Keyboard::new()));
    }

    pub fn plug_purupuru(&mut self, port: usize, unit: usize) {
        self.hw.maple.plug(port, unit, Box::new(Purupuru::new()));
    }

    pub fn plug_vmu(&mut self, port: usize, unit: usize, image: Option<&Path>) -> DcResult<()> {
        let vmu = match image {
            Some(path) => Vmu::from_file(path)?,
            None => Vmu::ephemeral(),
        };
        self.hw.maple.plug(port, unit, Box::new(vmu));
        Ok(())
    }

    // -----------------------------------------------------------------
    // the run loop

    /// Run until the host asks for an exit (or an error record surfaces).
    pub fn run(&mut self) -> DcResult<TermReason> {
        self.sh4_clock
            .sched_event_in(self.periodic_event, PERIODIC_EVENT_PERIOD);

        // with a cmd session attached, hang here until begin-execution
        while self.flags.emu_thread_is_running() && self.flags.state() == DcState::NotRunning {
            std::thread::sleep(std::time::Duration::from_millis(100));
        }

        self.start_time = Instant::now();
        self.last_frame_realtime = Instant::now();
        log::info!("execution begins ({:?} backend)", self.sh4_backend);

        let outcome = self.main_loop();

        if let Err(record) = &outcome {
            self.term_reason = TermReason::Error;
            log::error!("unrecoverable error: {record}");
            // the flash image is the user's property; flush it even on the
            // error path
            let _ = self.hw.flash.flush();
        }

        self.print_perf_stats();
        self.flags.signal_exit_threads();

        match self.term_reason {
            TermReason::Norm => log::info!("program execution ended normally"),
            TermReason::Interrupted => {
                log::info!("program execution ended due to user-initiated interruption")
            }
            TermReason::Error => {
                log::info!("program execution ended due to an unrecoverable error")
            }
        }

        outcome?;
        self.cleanup()?;
        Ok(self.term_reason)
    }

    fn main_loop(&mut self) -> DcResult<()> {
        while self.flags.emu_thread_is_running() {
            self.run_one_frame()?;

            if self.flags.take_frame_stop() {
                if self.flags.state() == DcState::Running {
                    self.flags.transition(DcState::Suspend, DcState::Running);
                    self.suspend_loop();
                } else {
                    log::warn!(
                        "unable to suspend execution at frame stop: system is not running"
                    );
                }
            }
        }
        Ok(())
    }

    /// Run both clock domains until the display signals the end of frame.
    ///
    /// The ARM7 domain is run until it has caught up with the SH4's stamp,
    /// so the divergence between the two notions of "now" never exceeds one
    /// timeslice.
    pub fn run_one_frame(&mut self) -> DcResult<()> {
        while !self.flags.take_end_of_frame() {
            if !self.flags.emu_thread_is_running() {
                return Ok(());
            }
            if self.run_sh4_timeslice()? {
                return Ok(());
            }
            while self.arm7_clock.cycle_stamp() < self.sh4_clock.cycle_stamp() {
                if self.run_arm7_timeslice()? {
                    return Ok(());
                }
            }
            if self.config.jit_enabled() {
                self.sh4.jit_cache.gc();
            }
        }
        Ok(())
    }

    /// One SH4 timeslice: dispatch to the clock target, then service every
    /// event that came due.  Returns true if the emulator should exit.
    fn run_sh4_timeslice(&mut self) -> DcResult<bool> {
        let exit = match self.sh4_backend {
            Sh4Backend::Interp => self.run_to_next_sh4_event()?,
            Sh4Backend::Jit => self.run_to_next_sh4_event_jit()?,
            Sh4Backend::Debug => self.run_to_next_sh4_event_debugger()?,
        };

        self.service_sh4_events()?;
        Ok(exit)
    }

    pub(crate) fn service_sh4_events(&mut self) -> DcResult<()> {
        while let Some((_ev, kind)) = self.sh4_clock.pop_due_event() {
            self.handle_sh4_event(kind)?;
        }
        Ok(())
    }

    fn handle_sh4_event(&mut self, kind: EventKind) -> DcResult<()> {
        match kind {
            EventKind::TmuChan(chan) => {
                tmu::on_chan_event(&mut self.sh4, &mut self.sh4_clock, chan as usize)?;
            }
            EventKind::RtcTick => {
                self.hw.rtc.on_tick(&mut self.sh4_clock);
            }
            EventKind::SpgLine => {
                let events = self.hw.pvr2.spg.on_line();
                let line_period = self.hw.pvr2.spg.line_period();
                self.sh4_clock
                    .sched_event_in(self.hw.pvr2.spg.line_event, line_period);

                if events.pre_vblank {
                    let HwDevices { maple, mem, .. } = &mut self.hw;
                    maple.notify_pre_vblank(mem, &mut self.sh4_clock)?;
                }
                if events.vblank_in {
                    self.hw
                        .sys
                        .raise_nrm_int(&mut self.sh4, istnrm::VBLANK_IN);
                    self.end_frame();
                }
                if events.vblank_out {
                    self.hw
                        .sys
                        .raise_nrm_int(&mut self.sh4, istnrm::VBLANK_OUT);
                }
            }
            EventKind::MapleDmaComplete => {
                self.hw.maple.on_dma_complete_event();
                self.hw
                    .sys
                    .raise_nrm_int(&mut self.sh4, istnrm::MAPLE_DMA_COMPLETE);
            }
            EventKind::Periodic => {
                // low-frequency housekeeping with no hard timing promises
                self.sh4_clock
                    .sched_event_in(self.periodic_event, PERIODIC_EVENT_PERIOD);
            }
            EventKind::AicaSampleTick => {
                // belongs to the ARM7 clock; seeing it here is a wiring bug
                return Err(ErrorRecord::integrity("aica event on the sh4 clock"));
            }
        }
        Ok(())
    }

    /// Whether the SH4 is in a SLEEP state with nothing pending to wake it.
    /// An accepted interrupt drops the CPU back to normal execution.
    fn sh4_is_asleep(&mut self) -> bool {
        if self.sh4.exec_state != ExecState::Norm {
            excp::check_interrupts(&mut self.sh4);
        }
        self.sh4.exec_state != ExecState::Norm
    }

    /// Interpreter dispatch: run instructions up to, never past, the target
    /// stamp.  An event that would land mid-instruction fires at the
    /// boundary instead; virtual time never lags.
    fn run_to_next_sh4_event(&mut self) -> DcResult<bool> {
        let mut tgt_stamp = self.sh4_clock.target_stamp();

        while tgt_stamp > self.sh4_clock.cycle_stamp() {
            if self.sh4_is_asleep() {
                // asleep: drag time forward and let an event wake us
                self.sh4_clock.set_cycle_stamp(tgt_stamp);
                break;
            }

            let inst_cycles = exec::exec_one(&mut self.sh4, &mut self.sh4_clock, &mut self.hw)?;
            let mut cycles_after =
                self.sh4_clock.cycle_stamp() + inst_cycles as u64 * SH4_CLOCK_SCALE;

            // re-read: the instruction may have scheduled something sooner
            tgt_stamp = self.sh4_clock.target_stamp();
            if cycles_after > tgt_stamp {
                cycles_after = tgt_stamp;
            }
            self.sh4_clock.set_cycle_stamp(cycles_after);
        }

        Ok(false)
    }

    /// Jit dispatch: whole basic blocks at a time with precomputed costs.
    fn run_to_next_sh4_event_jit(&mut self) -> DcResult<bool> {
        let mut tgt_stamp = self.sh4_clock.target_stamp();

        while tgt_stamp > self.sh4_clock.cycle_stamp() {
            if self.sh4_is_asleep() {
                self.sh4_clock.set_cycle_stamp(tgt_stamp);
                break;
            }

            excp::check_interrupts(&mut self.sh4);

            let blk_addr = self.sh4.pc;
            let block = match self.sh4.jit_cache.find(blk_addr) {
                Some(block) => block,
                None => {
                    let block =
                        std::rc::Rc::new(jit::compile(&mut self.sh4, &mut self.hw, blk_addr)?);
                    self.sh4.jit_cache.insert(blk_addr, std::rc::Rc::clone(&block));
                    block
                }
            };

            jit::exec_block(&mut self.sh4, &mut self.sh4_clock, &mut self.hw, &block)?;

            let cycles_after =
                self.sh4_clock.cycle_stamp() + block.cycle_count as u64 * SH4_CLOCK_SCALE;
            self.sh4_clock.set_cycle_stamp(cycles_after);
            tgt_stamp = self.sh4_clock.target_stamp();
        }

        // a block may overshoot; snap back so no event gets skipped
        if self.sh4_clock.cycle_stamp() > tgt_stamp {
            self.sh4_clock.set_cycle_stamp(tgt_stamp);
        }

        Ok(false)
    }

    /// Debugger-aware dispatch: one instruction at a time with breakpoint,
    /// watchpoint and single-step handling woven in.
    fn run_to_next_sh4_event_debugger(&mut self) -> DcResult<bool> {
        let mut tgt_stamp = self.sh4_clock.target_stamp();

        while tgt_stamp > self.sh4_clock.cycle_stamp() {
            if self.check_debugger() {
                return Ok(true);
            }
            if self.sh4_is_asleep() {
                self.sh4_clock.set_cycle_stamp(tgt_stamp);
                break;
            }

            let inst_cycles = exec::exec_one(&mut self.sh4, &mut self.sh4_clock, &mut self.hw)?;
            let mut cycles_after =
                self.sh4_clock.cycle_stamp() + inst_cycles as u64 * SH4_CLOCK_SCALE;

            tgt_stamp = self.sh4_clock.target_stamp();
            if cycles_after > tgt_stamp {
                cycles_after = tgt_stamp;
            }
            self.sh4_clock.set_cycle_stamp(cycles_after);
        }

        Ok(false)
    }

    /// Advance the debug state machine and, if the debugger is holding the
    /// machine, poll the frontend until it lets go.  Returns true when the
    /// emulator should exit instead.
    fn check_debugger(&mut self) -> bool {
        self.hw.debugger.poll_requests();
        self.hw.debugger.notify_inst(self.sh4.pc);

        if self.hw.debugger.is_holding() {
            if self.flags.state() == DcState::Running {
                self.flags.transition(DcState::Debug, DcState::Running);
            }
            while self.flags.emu_thread_is_running() && self.hw.debugger.is_holding() {
                self.hw.debugger.run_once();
                self.hw.debugger.poll_requests();
                if self.hw.debugger.is_holding() {
                    std::thread::sleep(std::time::Duration::from_millis(10));
                }
            }
            if self.flags.state() == DcState::Debug {
                self.flags.transition(DcState::Running, DcState::Debug);
            }
        }
        !self.flags.emu_thread_is_running()
    }

    /// One ARM7 timeslice.  While the SH4 holds the ARM7 in reset, its
    /// cycle stamp still has to reach the clock target so the devices in
    /// this domain do not fall behind; only execution is skipped.
    fn run_arm7_timeslice(&mut self) -> DcResult<bool> {
        // apply reset-gate edges from the AICA register
        let gate_open = self.hw.aica.arm7_enabled();
        if gate_open != self.arm7.enabled {
            if gate_open {
                self.arm7.reset();
            }
            self.arm7.enabled = gate_open;
        }

        let mut tgt_stamp = self.arm7_clock.target_stamp();

        if self.arm7.enabled {
            while tgt_stamp > self.arm7_clock.cycle_stamp() {
                let inst_cycles = arm7::exec::step(&mut self.arm7, &mut self.hw)?;
                let mut cycles_after =
                    self.arm7_clock.cycle_stamp() + inst_cycles as u64 * ARM7_CLOCK_SCALE;

                tgt_stamp = self.arm7_clock.target_stamp();
                if cycles_after > tgt_stamp {
                    cycles_after = tgt_stamp;
                }
                self.arm7_clock.set_cycle_stamp(cycles_after);
            }
        } else {
            self.arm7_clock.set_cycle_stamp(tgt_stamp);
        }

        while let Some((_ev, kind)) = self.arm7_clock.pop_due_event() {
            match kind {
                EventKind::AicaSampleTick => {
                    self.arm7_clock
                        .sched_event_in(self.aica_tick_event, AICA_SAMPLE_INTERVAL);
                }
                other => {
                    log::error!("event {other:?} fired on the arm7 clock");
                    return Err(ErrorRecord::integrity("unexpected event on the arm7 clock"));
                }
            }
        }

        Ok(false)
    }

    /// Install the rendering backend called once per completed frame.
    pub fn set_render_callback(
        &mut self,
        cb: Box<dyn FnMut(&mut crate::pvr2::TexMem) + Send>,
    ) {
        self.render_cb = Some(cb);
    }

    /// The display finished a field: render, latch the flag and update the
    /// rate figures the shutdown report prints.
    fn end_frame(&mut self) {
        if let Some(render) = &mut self.render_cb {
            render(&mut self.hw.tex_mem);
        }
        self.flags.raise_end_of_frame();

        let now = Instant::now();
        let virt_now = self.sh4_clock.cycle_stamp();
        let real_dt = now.duration_since(self.last_frame_realtime).as_secs_f64();
        let virt_dt = (virt_now - self.last_frame_virttime) as f64 / SCHED_FREQUENCY as f64;

        self.perf.frames += 1;
        if real_dt > 0.0 {
            self.perf.real_fps = 1.0 / real_dt;
        }
        if virt_dt > 0.0 {
            self.perf.virt_fps = 1.0 / virt_dt;
        }
        self.last_frame_realtime = now;
        self.last_frame_virttime = virt_now;
    }

    fn suspend_loop(&mut self) {
        log::info!("execution suspended");
        while self.flags.emu_thread_is_running() && self.flags.state() == DcState::Suspend {
            std::thread::sleep(std::time::Duration::from_millis(16));
        }
        if self.flags.emu_thread_is_running() {
            log::info!("execution resumed");
        }
    }

    fn print_perf_stats(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }
        let sh4_cycles = self.sh4.get_cycles();
        let hz = sh4_cycles as f64 / elapsed;
        log::info!(
            "total elapsed time: {elapsed:.3} seconds; {sh4_cycles} SH4 cycles executed"
        );
        log::info!(
            "performance is {:.3} MHz ({:.1}%)",
            hz / 1_000_000.0,
            hz / 2_000_000.0
        );
    }

    /// Orderly teardown, reverse of init: peripherals first, persistent
    /// state last.
    fn cleanup(&mut self) -> DcResult<()> {
        self.hw.maple.cleanup();
        self.hw.rtc.save()?;
        self.hw.flash.flush()?;
        Ok(())
    }
}

impl Drop for Dreamcast {
    fn drop(&mut self) {
        // cleanup() is idempotent; make sure the persistent devices land on
        // disk even if run() never completed
        self.hw.maple.cleanup();
        let _ = self.hw.rtc.save();
        let _ = self.hw.flash.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_walk() {
        let flags = DcFlags::new();
        assert_eq!(flags.state(), DcState::NotRunning);

        flags.begin_execution();
        assert_eq!(flags.state(), DcState::Running);

        flags.transition(DcState::Suspend, DcState::Running);
        flags.resume_execution();
        assert_eq!(flags.state(), DcState::Running);

        flags.transition(DcState::Debug, DcState::Running);
        flags.transition(DcState::Running, DcState::Debug);
        assert_eq!(flags.state(), DcState::Running);
    }

    #[test]
    #[should_panic(expected = "illegal state transition")]
    fn test_bad_transition_panics() {
        let flags = DcFlags::new();
        flags.transition(DcState::Suspend, DcState::Running);
    }

    #[test]
    fn test_kill_and_exit_signalling() {
        let flags = DcFlags::new();
        assert!(flags.emu_thread_is_running());
        assert!(flags.dc_is_running());

        flags.kill();
        assert!(!flags.emu_thread_is_running());
        // the I/O thread keeps running until the emu thread unwinds
        assert!(flags.dc_is_running());

        flags.signal_exit_threads();
        assert!(!flags.dc_is_running());
    }

    #[test]
    fn test_end_of_frame_is_consumed_once() {
        let flags = DcFlags::new();
        assert!(!flags.take_end_of_frame());
        flags.raise_end_of_frame();
        assert!(flags.take_end_of_frame());
        assert!(!flags.take_end_of_frame());
    }

    #[test]
    fn test_frame_stop_is_consumed_once() {
        let flags = DcFlags::new();
        flags.request_frame_stop();
        assert!(flags.take_frame_stop());
        assert!(!flags.take_frame_stop());
    }
}
