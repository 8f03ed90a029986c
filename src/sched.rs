//! Event scheduler and clock domains.
//!
//! All virtual time is counted in scheduler ticks at 5.4 GHz, the least
//! common multiple of the 200 MHz SH4 clock, the 45 MHz ARM7 clock and the
//! 13.5 MHz pixel clock.  Each CPU's native cycle therefore converts to an
//! integer number of ticks.
//!
//! Every clock domain owns one [`Scheduler`]: a min-ordered intrusive list of
//! pending events.  Event storage lives in an arena inside the scheduler and
//! is handed out once per device as an [`EventHandle`]; scheduling and
//! cancelling never allocate, which matters for the per-scanline events that
//! fire more than a thousand times per emulated frame.

use std::sync::Once;

/// Monotonic virtual-time stamp, in scheduler ticks.
pub type CycleStamp = u64;

/// Scheduler tick rate: 5,400,000,000 Hz.
pub const SCHED_FREQUENCY: u64 = 5_400_000_000;

/// Scheduler ticks per SH4 cycle (200 MHz).
pub const SH4_CLOCK_SCALE: CycleStamp = SCHED_FREQUENCY / 200_000_000;

/// Scheduler ticks per ARM7 cycle (45 MHz).
pub const ARM7_CLOCK_SCALE: CycleStamp = SCHED_FREQUENCY / 45_000_000;

/// Scheduler ticks per PVR2 pixel clock (13.5 MHz).
pub const PIXEL_CLOCK_SCALE: CycleStamp = SCHED_FREQUENCY / 13_500_000;

/// How far the CPU is allowed to run when its scheduler is empty.  It is not
/// clear this can happen outside of tests since the SPG and the housekeeping
/// event are always booked, but if it does the CPU still has to make forward
/// progress without drastically overrunning anything scheduled later.
pub const EMPTY_SCHED_EPSILON: CycleStamp = 16;

const _: () = assert!(SCHED_FREQUENCY % 200_000_000 == 0);
const _: () = assert!(SCHED_FREQUENCY % 45_000_000 == 0);
const _: () = assert!(SCHED_FREQUENCY % 13_500_000 == 0);

/// What a scheduled event means.  The dispatch loop matches on this to route
/// a fired event to its device; the scheduler itself never looks inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// SH4 timer-unit channel underflow (channel 0..=2).
    TmuChan(u8),
    /// AICA real-time clock one-second tick.
    RtcTick,
    /// PVR2 scan-line advance.
    SpgLine,
    /// Deferred maple DMA-completion interrupt.
    MapleDmaComplete,
    /// Low-frequency housekeeping (serial ring drain, suspend polling).
    Periodic,
    /// AICA sample-timer sync on the ARM7 clock.
    AicaSampleTick,
}

const NIL: u32 = u32::MAX;

#[derive(Debug, Clone)]
struct EventSlot {
    when: CycleStamp,
    kind: EventKind,
    linked: bool,
    prev: u32,
    next: u32,
}

/// Handle to one arena slot.  Allocated once at device init and reused for
/// the lifetime of the scheduler; re-inserting the same handle from inside
/// its own handler is the normal way to build a periodic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHandle(u32);

/// Min-ordered pending-event queue for one clock domain.
///
/// Invariant: if the list is non-empty, `target_stamp` equals the head's
/// `when`; otherwise `target_stamp` is the current stamp plus
/// [`EMPTY_SCHED_EPSILON`] as of the last mutation.
#[derive(Debug, Clone)]
pub struct Scheduler {
    slots: Vec<EventSlot>,
    head: u32,
    target_stamp: CycleStamp,
}

static EMPTY_FALLBACK_WARN: Once = Once::new();

impl Scheduler {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            head: NIL,
            target_stamp: EMPTY_SCHED_EPSILON,
        }
    }

    /// Allocate an arena slot for `kind`.  Done once per event at device
    /// init; the scheduler never frees slots.
    pub fn alloc(&mut self, kind: EventKind) -> EventHandle {
        let idx = self.slots.len() as u32;
        self.slots.push(EventSlot {
            when: 0,
            kind,
            linked: false,
            prev: NIL,
            next: NIL,
        });
        EventHandle(idx)
    }

    /// Link `event` so that it fires at stamp `when`.  Events with equal
    /// stamps fire in scheduling order.
    ///
    /// Panics if `event` is already linked; that is a programming error in
    /// the owning device, not a recoverable condition.
    pub fn schedule(&mut self, current: CycleStamp, event: EventHandle, when: CycleStamp) {
        let idx = event.0 as usize;
        if self.slots[idx].linked {
            panic!(
                "scheduling an already-linked event ({:?} at stamp {})",
                self.slots[idx].kind, when
            );
        }

        // Walk to the first entry strictly later than the new stamp and link
        // in front of it, so equal stamps resolve FIFO.
        let mut prev = NIL;
        let mut next = self.head;
        while next != NIL && self.slots[next as usize].when <= when {
            prev = next;
            next = self.slots[next as usize].next;
        }

        {
            let slot = &mut self.slots[idx];
            slot.when = when;
            slot.linked = true;
            slot.prev = prev;
            slot.next = next;
        }
        if prev == NIL {
            self.head = idx as u32;
        } else {
            self.slots[prev as usize].next = idx as u32;
        }
        if next != NIL {
            self.slots[next as usize].prev = idx as u32;
        }

        self.update_target(current);
    }

    /// Unlink `event` without firing it.  Cancelling an event that is not
    /// linked is a no-op (a device may cancel defensively before rebooking).
    pub fn cancel(&mut self, current: CycleStamp, event: EventHandle) {
        let idx = event.0 as usize;
        if !self.slots[idx].linked {
            return;
        }
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.slots[prev as usize].next = next;
        }
        if next != NIL {
            self.slots[next as usize].prev = prev;
        }
        let slot = &mut self.slots[idx];
        slot.linked = false;
        slot.prev = NIL;
        slot.next = NIL;

        self.update_target(current);
    }

    /// Remove and return the head event, or `None` if the list is empty.
    pub fn pop(&mut self, current: CycleStamp) -> Option<EventHandle> {
        if self.head == NIL {
            self.update_target(current);
            return None;
        }
        let idx = self.head;
        self.head = self.slots[idx as usize].next;
        if self.head != NIL {
            self.slots[self.head as usize].prev = NIL;
        }
        let slot = &mut self.slots[idx as usize];
        slot.linked = false;
        slot.prev = NIL;
        slot.next = NIL;

        self.update_target(current);
        Some(EventHandle(idx))
    }

    /// Return the head event without modifying anything.
    pub fn peek(&self) -> Option<EventHandle> {
        if self.head == NIL {
            None
        } else {
            Some(EventHandle(self.head))
        }
    }

    pub fn is_linked(&self, event: EventHandle) -> bool {
        self.slots[event.0 as usize].linked
    }

    pub fn when(&self, event: EventHandle) -> CycleStamp {
        self.slots[event.0 as usize].when
    }

    pub fn kind(&self, event: EventHandle) -> EventKind {
        self.slots[event.0 as usize].kind
    }

    /// Stamp of the next event, or the forward-progress fallback if nothing
    /// is pending.
    pub fn target_stamp(&self) -> CycleStamp {
        self.target_stamp
    }

    fn update_target(&mut self, current: CycleStamp) {
        if self.head != NIL {
            self.target_stamp = self.slots[self.head as usize].when;
        } else {
            EMPTY_FALLBACK_WARN.call_once(|| {
                log::warn!(
                    "scheduler is empty; falling back to {} ticks of CPU progress",
                    EMPTY_SCHED_EPSILON
                );
            });
            self.target_stamp = current + EMPTY_SCHED_EPSILON;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// One clock domain: a monotonic cycle counter plus the scheduler driven by
/// it.  The SH4 and the ARM7 each own one.
///
/// Invariant: `cycle_stamp <= target_stamp` immediately after a dispatch
/// function returns.
#[derive(Debug, Clone, Default)]
pub struct Clock {
    stamp: CycleStamp,
    sched: Scheduler,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycle_stamp(&self) -> CycleStamp {
        self.stamp
    }

    /// Record how far the CPU advanced.  Only the dispatch loop calls this.
    pub fn set_cycle_stamp(&mut self, stamp: CycleStamp) {
        self.stamp = stamp;
    }

    /// The "run until this stamp" deadline handed to the CPU model.
    pub fn target_stamp(&self) -> CycleStamp {
        self.sched.target_stamp()
    }

    pub fn alloc_event(&mut self, kind: EventKind) -> EventHandle {
        self.sched.alloc(kind)
    }

    pub fn sched_event(&mut self, event: EventHandle, when: CycleStamp) {
        self.sched.schedule(self.stamp, event, when);
    }

    /// Schedule `event` to fire `delay` ticks from now.
    pub fn sched_event_in(&mut self, event: EventHandle, delay: CycleStamp) {
        self.sched.schedule(self.stamp, event, self.stamp + delay);
    }

    pub fn cancel_event(&mut self, event: EventHandle) {
        self.sched.cancel(self.stamp, event);
    }

    pub fn event_is_scheduled(&self, event: EventHandle) -> bool {
        self.sched.is_linked(event)
    }

    pub fn event_kind(&self, event: EventHandle) -> EventKind {
        self.sched.kind(event)
    }

    pub fn event_when(&self, event: EventHandle) -> CycleStamp {
        self.sched.when(event)
    }

    pub fn pop_event(&mut self) -> Option<EventHandle> {
        self.sched.pop(self.stamp)
    }

    pub fn peek_event(&self) -> Option<EventHandle> {
        self.sched.peek()
    }

    /// Pop the head event if its stamp has been reached.  The dispatch loop
    /// drains due events with this after every timeslice.
    pub fn pop_due_event(&mut self) -> Option<(EventHandle, EventKind)> {
        let head = self.sched.peek()?;
        if self.sched.when(head) > self.stamp {
            return None;
        }
        let ev = self.sched.pop(self.stamp)?;
        Some((ev, self.sched.kind(ev)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clock_scales() {
        assert_eq!(SH4_CLOCK_SCALE, 27);
        assert_eq!(ARM7_CLOCK_SCALE, 120);
        assert_eq!(PIXEL_CLOCK_SCALE, 400);
    }

    #[test]
    fn test_schedule_and_pop_in_order() {
        let mut sched = Scheduler::new();
        let a = sched.alloc(EventKind::RtcTick);
        let b = sched.alloc(EventKind::SpgLine);
        let c = sched.alloc(EventKind::Periodic);

        sched.schedule(0, a, 300);
        sched.schedule(0, b, 100);
        sched.schedule(0, c, 200);

        assert_eq!(sched.pop(0), Some(b));
        assert_eq!(sched.pop(0), Some(c));
        assert_eq!(sched.pop(0), Some(a));
        assert_eq!(sched.pop(0), None);
    }

    #[test]
    fn test_equal_stamps_resolve_fifo() {
        // Events at {100, 100, 50} must pop as (50, first-100, second-100).
        let mut sched = Scheduler::new();
        let first = sched.alloc(EventKind::TmuChan(0));
        let second = sched.alloc(EventKind::TmuChan(1));
        let early = sched.alloc(EventKind::SpgLine);

        sched.schedule(0, first, 100);
        sched.schedule(0, second, 100);
        sched.schedule(0, early, 50);

        assert_eq!(sched.pop(0), Some(early));
        assert_eq!(sched.pop(0), Some(first));
        assert_eq!(sched.pop(0), Some(second));
    }

    #[test]
    fn test_cancelled_event_never_pops() {
        let mut sched = Scheduler::new();
        let a = sched.alloc(EventKind::RtcTick);
        let b = sched.alloc(EventKind::SpgLine);
        sched.schedule(0, a, 10);
        sched.schedule(0, b, 20);
        sched.cancel(0, a);

        assert_eq!(sched.pop(0), Some(b));
        assert_eq!(sched.pop(0), None);
    }

    #[test]
    fn test_cancel_head_updates_target() {
        let mut sched = Scheduler::new();
        let a = sched.alloc(EventKind::RtcTick);
        let b = sched.alloc(EventKind::SpgLine);
        sched.schedule(0, a, 10);
        sched.schedule(0, b, 20);
        assert_eq!(sched.target_stamp(), 10);
        sched.cancel(0, a);
        assert_eq!(sched.target_stamp(), 20);
    }

    #[test]
    fn test_empty_target_is_epsilon_past_current() {
        let mut sched = Scheduler::new();
        let a = sched.alloc(EventKind::RtcTick);
        sched.schedule(1000, a, 2000);
        sched.cancel(1500, a);
        assert_eq!(sched.target_stamp(), 1500 + EMPTY_SCHED_EPSILON);
    }

    #[test]
    #[should_panic(expected = "already-linked")]
    fn test_double_schedule_panics() {
        let mut sched = Scheduler::new();
        let a = sched.alloc(EventKind::RtcTick);
        sched.schedule(0, a, 10);
        sched.schedule(0, a, 20);
    }

    #[test]
    fn test_reschedule_after_pop() {
        // A periodic handler pops its own event and immediately re-inserts
        // it; the event must fire again at the new stamp.
        let mut sched = Scheduler::new();
        let a = sched.alloc(EventKind::RtcTick);
        sched.schedule(0, a, 10);
        assert_eq!(sched.pop(10), Some(a));
        sched.schedule(10, a, 20);
        assert!(sched.is_linked(a));
        assert_eq!(sched.target_stamp(), 20);
        assert_eq!(sched.pop(20), Some(a));
    }

    #[test]
    fn test_clock_pop_due() {
        let mut clk = Clock::new();
        let a = clk.alloc_event(EventKind::SpgLine);
        clk.sched_event(a, 100);

        assert_eq!(clk.pop_due_event(), None);
        clk.set_cycle_stamp(99);
        assert_eq!(clk.pop_due_event(), None);
        clk.set_cycle_stamp(100);
        assert_eq!(clk.pop_due_event(), Some((a, EventKind::SpgLine)));
        assert_eq!(clk.pop_due_event(), None);
    }

    proptest! {
        /// Interleaved schedule/cancel/pop: pops between two schedule
        /// operations come out in non-decreasing stamp order, and the
        /// target-stamp invariant holds after every operation.
        #[test]
        fn prop_pop_sequence_is_sorted(ops in proptest::collection::vec((0u8..3, 0u64..1000), 1..200)) {
            let mut sched = Scheduler::new();
            let handles: Vec<_> = (0..8).map(|_| sched.alloc(EventKind::Periodic)).collect();
            let mut last_popped: Option<CycleStamp> = None;

            for (idx, &(op, stamp)) in ops.iter().enumerate() {
                let ev = handles[idx % handles.len()];
                match op {
                    0 => {
                        if !sched.is_linked(ev) {
                            sched.schedule(0, ev, stamp);
                            // a fresh event may legally sort before anything
                            // already popped
                            last_popped = None;
                        }
                    }
                    1 => sched.cancel(0, ev),
                    _ => {
                        if let Some(popped) = sched.pop(0) {
                            let when = sched.when(popped);
                            if let Some(last) = last_popped {
                                prop_assert!(when >= last);
                            }
                            last_popped = Some(when);
                        }
                    }
                }
                match sched.peek() {
                    Some(head) => prop_assert_eq!(sched.target_stamp(), sched.when(head)),
                    None => prop_assert_eq!(sched.target_stamp(), EMPTY_SCHED_EPSILON),
                }
            }
        }

        /// Whatever is still linked after a random mix of operations drains
        /// in fully sorted order.
        #[test]
        fn prop_drain_is_sorted(stamps in proptest::collection::vec(0u64..10_000, 1..16)) {
            let mut sched = Scheduler::new();
            for &stamp in &stamps {
                let ev = sched.alloc(EventKind::Periodic);
                sched.schedule(0, ev, stamp);
            }
            let mut drained = Vec::new();
            while let Some(ev) = sched.pop(0) {
                drained.push(sched.when(ev));
            }
            let mut sorted = drained.clone();
            sorted.sort_unstable();
            prop_assert_eq!(drained, sorted);
        }
    }
}
