//! Hardware-level debugger state machine.
//!
//! The debugger-aware dispatch backend notifies this module before every
//! instruction and from the memory path on every watched access.  The state
//! machine distinguishes a triggered-but-unreported watchpoint (PreWatch),
//! the held states the frontend sees (Break, Watch), and the one-instruction
//! grace state after resuming from a watchpoint (PostWatch) so the same
//! watchpoint does not immediately re-fire.
//!
//! Frontends (a GDB stub, a local console) live outside the core and attach
//! through [`DebugFrontend`]; resume/step/break requests cross the thread
//! boundary as atomic flags.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const N_BREAKPOINTS: usize = 16;
pub const N_W_WATCHPOINTS: usize = 16;
pub const N_R_WATCHPOINTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugState {
    /// Not suspending the machine.
    Norm,
    /// One more instruction may run, then break.
    Step,
    /// Held at a breakpoint, waiting for the frontend.
    Break,
    /// A watchpoint triggered mid-access; the frontend has not been told.
    PreWatch,
    /// Held at a watchpoint, waiting for the frontend.
    Watch,
    /// Just resumed from a watchpoint; lasts exactly one instruction.
    PostWatch,
}

/// Frontend callback table.  Every slot is optional behaviour; the default
/// impls do nothing.
pub trait DebugFrontend: Send {
    fn attach(&mut self) {}
    fn on_break(&mut self, _pc: u32) {}
    fn on_read_watchpoint(&mut self, _addr: u32) {}
    fn on_write_watchpoint(&mut self, _addr: u32) {}
    fn on_softbreak(&mut self, _inst: u16, _pc: u32) {}
    fn on_cleanup(&mut self) {}
    /// Polled while the machine is held so the frontend can pump its own
    /// I/O.  Must not block.
    fn run_once(&mut self) {}
}

/// Resume/step/break requests from the frontend's thread.
#[derive(Default)]
pub struct DebugRequests {
    pub break_req: AtomicBool,
    pub step_req: AtomicBool,
    pub continue_req: AtomicBool,
    pub detach_req: AtomicBool,
}

impl DebugRequests {
    fn take(flag: &AtomicBool) -> bool {
        flag.swap(false, Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Breakpoint {
    addr: u32,
    enabled: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Watchpoint {
    addr: u32,
    len: u32,
    enabled: bool,
}

impl Watchpoint {
    fn overlaps(&self, addr: u32, len: u32) -> bool {
        self.enabled && addr < self.addr.wrapping_add(self.len) && self.addr < addr.wrapping_add(len)
    }
}

pub struct Debugger {
    /// Whether the debugger-aware dispatch backend is selected; the memory
    /// path tests this single flag before anything else.
    enabled: bool,
    state: DebugState,

    breakpoints: [Breakpoint; N_BREAKPOINTS],
    w_watchpoints: [Watchpoint; N_W_WATCHPOINTS],
    r_watchpoints: [Watchpoint; N_R_WATCHPOINTS],

    /// Address and direction of the most recent watchpoint hit.
    last_watch_addr: u32,
    last_watch_was_write: bool,

    frontend: Option<Box<dyn DebugFrontend>>,
    requests: Arc<DebugRequests>,
}

impl Debugger {
    pub fn new() -> Self {
        Self {
            enabled: false,
            state: DebugState::Norm,
            breakpoints: [Breakpoint::default(); N_BREAKPOINTS],
            w_watchpoints: [Watchpoint::default(); N_W_WATCHPOINTS],
            r_watchpoints: [Watchpoint::default(); N_R_WATCHPOINTS],
            last_watch_addr: 0,
            last_watch_was_write: false,
            frontend: None,
            requests: Arc::new(DebugRequests::default()),
        }
    }

    pub fn attach(&mut self, mut frontend: Box<dyn DebugFrontend>) {
        frontend.attach();
        self.frontend = Some(frontend);
        self.enabled = true;
    }

    pub fn detach(&mut self) {
        if let Some(frontend) = &mut self.frontend {
            frontend.on_cleanup();
        }
        self.frontend = None;
        self.enabled = false;
        self.state = DebugState::Norm;
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> DebugState {
        self.state
    }

    /// Shared request flags, cloneable across the thread boundary.
    pub fn requests(&self) -> Arc<DebugRequests> {
        Arc::clone(&self.requests)
    }

    pub fn last_watch(&self) -> (u32, bool) {
        (self.last_watch_addr, self.last_watch_was_write)
    }

    /// Whether the machine is held for the frontend.
    pub fn is_holding(&self) -> bool {
        matches!(self.state, DebugState::Break | DebugState::Watch)
    }

    pub fn add_break(&mut self, addr: u32) -> bool {
        if let Some(slot) = self.breakpoints.iter_mut().find(|bp| !bp.enabled) {
            *slot = Breakpoint { addr, enabled: true };
            true
        } else {
            false
        }
    }

    pub fn remove_break(&mut self, addr: u32) -> bool {
        for slot in &mut self.breakpoints {
            if slot.enabled && slot.addr == addr {
                slot.enabled = false;
                return true;
            }
        }
        false
    }

    pub fn add_w_watch(&mut self, addr: u32, len: u32) -> bool {
        Self::add_watch(&mut self.w_watchpoints, addr, len)
    }

    pub fn remove_w_watch(&mut self, addr: u32, len: u32) -> bool {
        Self::remove_watch(&mut self.w_watchpoints, addr, len)
    }

    pub fn add_r_watch(&mut self, addr: u32, len: u32) -> bool {
        Self::add_watch(&mut self.r_watchpoints, addr, len)
    }

    pub fn remove_r_watch(&mut self, addr: u32, len: u32) -> bool {
        Self::remove_watch(&mut self.r_watchpoints, addr, len)
    }

    fn add_watch(table: &mut [Watchpoint], addr: u32, len: u32) -> bool {
        if let Some(slot) = table.iter_mut().find(|wp| !wp.enabled) {
            *slot = Watchpoint {
                addr,
                len,
                enabled: true,
            };
            true
        } else {
            false
        }
    }

    fn remove_watch(table: &mut [Watchpoint], addr: u32, len: u32) -> bool {
        for slot in table.iter_mut() {
            if slot.enabled && slot.addr == addr && slot.len == len {
                slot.enabled = false;
                return true;
            }
        }
        false
    }

    /// Called from the memory path on every store while enabled.  Returns
    /// true if a watchpoint triggered.
    pub fn check_w_watch(&mut self, addr: u32, len: u32) -> bool {
        // the grace instruction after a resume never re-triggers
        if self.state == DebugState::PostWatch {
            return false;
        }
        if self.w_watchpoints.iter().any(|wp| wp.overlaps(addr, len)) {
            self.state = DebugState::PreWatch;
            self.last_watch_addr = addr;
            self.last_watch_was_write = true;
            return true;
        }
        false
    }

    /// Called from the memory path on every load while enabled.
    pub fn check_r_watch(&mut self, addr: u32, len: u32) -> bool {
        if self.state == DebugState::PostWatch {
            return false;
        }
        if self.r_watchpoints.iter().any(|wp| wp.overlaps(addr, len)) {
            self.state = DebugState::PreWatch;
            self.last_watch_addr = addr;
            self.last_watch_was_write = false;
            return true;
        }
        false
    }

    /// TRAPA reached while the debugger is attached: report a soft break.
    pub fn on_softbreak(&mut self, inst: u16, pc: u32) {
        if let Some(frontend) = &mut self.frontend {
            frontend.on_softbreak(inst, pc);
        }
        self.state = DebugState::Break;
    }

    /// Per-instruction notification from the debug dispatch backend, before
    /// the fetch at `pc`.  Advances the state machine and reports to the
    /// frontend.
    pub fn notify_inst(&mut self, pc: u32) {
        match self.state {
            DebugState::Step => {
                self.state = DebugState::Break;
                if let Some(frontend) = &mut self.frontend {
                    frontend.on_break(pc);
                }
            }
            DebugState::PreWatch => {
                self.state = DebugState::Watch;
                if let Some(frontend) = &mut self.frontend {
                    if self.last_watch_was_write {
                        frontend.on_write_watchpoint(self.last_watch_addr);
                    } else {
                        frontend.on_read_watchpoint(self.last_watch_addr);
                    }
                }
            }
            DebugState::PostWatch => {
                self.state = DebugState::Norm;
            }
            DebugState::Norm => {
                if self
                    .breakpoints
                    .iter()
                    .any(|bp| bp.enabled && bp.addr == pc)
                {
                    self.state = DebugState::Break;
                    if let Some(frontend) = &mut self.frontend {
                        frontend.on_break(pc);
                    }
                }
            }
            DebugState::Break | DebugState::Watch => {}
        }
    }

    /// Drain the cross-thread request flags.  Called while held and once
    /// per instruction.
    pub fn poll_requests(&mut self) {
        if DebugRequests::take(&self.requests.detach_req) {
            self.detach();
            return;
        }
        if DebugRequests::take(&self.requests.break_req) && self.state == DebugState::Norm {
            self.state = DebugState::Break;
            if let Some(frontend) = &mut self.frontend {
                frontend.run_once();
            }
        }
        if DebugRequests::take(&self.requests.continue_req) {
            self.resume();
        }
        if DebugRequests::take(&self.requests.step_req) && self.state == DebugState::Break {
            // run exactly one instruction, then break again
            self.state = DebugState::Step;
        }
    }

    /// Resume after a break or watchpoint hold.
    pub fn resume(&mut self) {
        match self.state {
            DebugState::Break => self.state = DebugState::Norm,
            DebugState::Watch => self.state = DebugState::PostWatch,
            _ => {}
        }
    }

    /// Pump the frontend while the machine is held.
    pub fn run_once(&mut self) {
        if let Some(frontend) = &mut self.frontend {
            frontend.run_once();
        }
    }
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullFrontend;
    impl DebugFrontend for NullFrontend {}

    #[test]
    fn test_watchpoint_state_walk() {
        let mut dbg = Debugger::new();
        dbg.attach(Box::new(NullFrontend));
        assert!(dbg.add_w_watch(0x8c00_f000, 4));

        // 2-byte store overlapping the watched word
        assert!(dbg.check_w_watch(0x8c00_f002, 2));
        assert_eq!(dbg.state(), DebugState::PreWatch);

        dbg.notify_inst(0x8c01_0000);
        assert_eq!(dbg.state(), DebugState::Watch);
        assert!(dbg.is_holding());
        assert_eq!(dbg.last_watch(), (0x8c00_f002, true));

        // "continue" resumes into the one-instruction grace state
        dbg.resume();
        assert_eq!(dbg.state(), DebugState::PostWatch);
        // the same store does not re-trigger during the grace instruction
        assert!(!dbg.check_w_watch(0x8c00_f002, 2));
        dbg.notify_inst(0x8c01_0002);
        assert_eq!(dbg.state(), DebugState::Norm);
        // ...but it does afterwards
        assert!(dbg.check_w_watch(0x8c00_f002, 2));
    }

    #[test]
    fn test_watch_requires_overlap() {
        let mut dbg = Debugger::new();
        assert!(dbg.add_w_watch(0x8c00_f000, 4));
        assert!(!dbg.check_w_watch(0x8c00_f004, 4));
        assert!(!dbg.check_w_watch(0x8c00_effc, 4));
        assert!(dbg.check_w_watch(0x8c00_f003, 1));
    }

    #[test]
    fn test_breakpoint_holds_and_steps() {
        let mut dbg = Debugger::new();
        dbg.attach(Box::new(NullFrontend));
        assert!(dbg.add_break(0x8c00_1000));

        dbg.notify_inst(0x8c00_0ffe);
        assert_eq!(dbg.state(), DebugState::Norm);

        dbg.notify_inst(0x8c00_1000);
        assert_eq!(dbg.state(), DebugState::Break);

        // single step: one instruction runs, then we hold again
        dbg.requests().step_req.store(true, Ordering::Relaxed);
        dbg.poll_requests();
        assert_eq!(dbg.state(), DebugState::Step);
        dbg.notify_inst(0x8c00_1002);
        assert_eq!(dbg.state(), DebugState::Break);
    }

    #[test]
    fn test_read_watch_direction() {
        let mut dbg = Debugger::new();
        assert!(dbg.add_r_watch(0x8c00_2000, 4));
        assert!(!dbg.check_w_watch(0x8c00_2000, 4));
        assert!(dbg.check_r_watch(0x8c00_2000, 4));
        assert_eq!(dbg.last_watch(), (0x8c00_2000, false));
    }

    #[test]
    fn test_slot_exhaustion() {
        let mut dbg = Debugger::new();
        for idx in 0..N_BREAKPOINTS {
            assert!(dbg.add_break(idx as u32 * 2));
        }
        assert!(!dbg.add_break(0x1000));
        assert!(dbg.remove_break(0));
        assert!(dbg.add_break(0x1000));
    }
}
