//! Repaint scheduler: decides *when* to push accumulated damage to the
//! panel, and with *which* waveform.

use crate::clock::Clock;
use crate::damage::DamageAccumulator;
use crate::geometry::Rect;
use crate::panel::{next_marker, Panel, UpdateData, UpdateMode, Waveform};
use std::time::{Duration, Instant};

/// Inter-repaint delay and waveform used while the mode is `Standard`.
const STANDARD_DELAY: Duration = Duration::from_millis(400);
/// Inter-repaint delay and waveform used while the mode is `Fast`.
const FAST_DELAY: Duration = Duration::from_millis(50);

/// Controls the waveform used and the inter-repaint delay.
///
/// Switched by the pen handler on pen-down (`Fast`) and pen-up (`Standard`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RepaintMode {
    /// `GC16` waveform, 400ms delay. Very low ghosting.
    #[default]
    Standard,
    /// `DU` waveform, 50ms delay. Higher ghosting, used while dragging.
    Fast,
}

impl RepaintMode {
    fn delay(self) -> Duration {
        match self {
            RepaintMode::Standard => STANDARD_DELAY,
            RepaintMode::Fast => FAST_DELAY,
        }
    }

    fn waveform(self) -> Waveform {
        match self {
            RepaintMode::Standard => Waveform::Gc16,
            RepaintMode::Fast => Waveform::Du,
        }
    }
}

/// Owns the outstanding damage rectangle and decides when and how to flush
/// it to the panel.
pub struct Scheduler<C: Clock> {
    panel: Box<dyn Panel>,
    clock: C,
    damage: DamageAccumulator,
    mode: RepaintMode,
    last_repaint: Instant,
    marker: u8,
    xres: u32,
    yres: u32,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(panel: Box<dyn Panel>, clock: C, xres: u32, yres: u32) -> Self {
        let now = clock.now();
        Self {
            panel,
            clock,
            damage: DamageAccumulator::new(xres, yres),
            mode: RepaintMode::Standard,
            last_repaint: now,
            marker: 1,
            xres,
            yres,
        }
    }

    /// Record a server-sent damage rectangle.
    pub fn record_damage(&mut self, x: i32, y: i32, w: i32, h: i32) {
        self.damage.record(x, y, w, h, self.clock.now());
    }

    /// Current repaint mode.
    #[must_use]
    pub fn mode(&self) -> RepaintMode {
        self.mode
    }

    /// Switch repaint mode. On `Fast -> Standard`, immediately performs one
    /// standard repaint to clean up any DU ghosting residue.
    pub fn set_mode(&mut self, mode: RepaintMode) {
        if self.mode == RepaintMode::Fast && mode == RepaintMode::Standard {
            if let Some(rect) = self.damage.peek() {
                self.push_update(rect, RepaintMode::Standard.waveform(), UpdateMode::Partial);
                self.damage.take_and_clear();
            }
        }
        self.mode = mode;
    }

    /// Poll the scheduler. Returns the desired next wakeup timeout, or
    /// `None` if there is nothing to wait for (wait indefinitely).
    pub fn tick(&mut self) -> Option<Duration> {
        let Some(rect) = self.damage.peek() else {
            return None;
        };
        let now = self.clock.now();
        let deadline = self.last_repaint + self.mode.delay();

        if deadline <= now {
            self.push_update(rect, self.mode.waveform(), UpdateMode::Partial);
            if self.mode == RepaintMode::Standard {
                self.damage.take_and_clear();
            }
            None
        } else {
            Some(deadline - now)
        }
    }

    /// Full-screen refresh with `GC16`/`Full`, regardless of damage state.
    /// Used by the home-button handler.
    pub fn force_repaint(&mut self) {
        let full = Rect {
            x: 0,
            y: 0,
            w: self.xres,
            h: self.yres,
        };
        self.push_update(full, Waveform::Gc16, UpdateMode::Full);
        self.damage.take_and_clear();
    }

    fn push_update(&mut self, rect: Rect, waveform: Waveform, mode: UpdateMode) {
        if rect.is_empty() {
            return;
        }
        self.marker = next_marker(self.marker);
        let update = UpdateData {
            rect,
            waveform,
            mode,
            marker: self.marker,
        };
        // A fatal ioctl failure here has no local recovery (spec.md §7);
        // propagating would require threading Result through every input
        // handler's tick, so callers that need that precision should use
        // try_tick/try_force_repaint below instead.
        let _ = self.panel.submit(&update);
    }

    /// Direct access to the panel for operations that need precise error
    /// propagation (used by the event loop at startup and for the initial
    /// full-screen paint).
    pub fn panel_mut(&mut self) -> &mut dyn Panel {
        self.panel.as_mut()
    }

    #[must_use]
    pub fn xres(&self) -> u32 {
        self.xres
    }

    #[must_use]
    pub fn yres(&self) -> u32 {
        self.yres
    }

    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FakeClock};
    use crate::panel::Panel;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct RecordedSubmit {
        rect: Rect,
        waveform: Waveform,
        mode: UpdateMode,
    }

    struct FakePanel {
        buf: Vec<u8>,
        submits: Rc<RefCell<Vec<RecordedSubmit>>>,
    }

    impl Panel for FakePanel {
        fn framebuffer(&mut self) -> &mut [u8] {
            &mut self.buf
        }
        fn stride(&self) -> u32 {
            0
        }
        fn submit(&mut self, update: &UpdateData) -> Result<(), crate::error::CoreError> {
            self.submits.borrow_mut().push(RecordedSubmit {
                rect: update.rect,
                waveform: update.waveform,
                mode: update.mode,
            });
            Ok(())
        }
    }

    fn scheduler() -> (Scheduler<FakeClock>, Rc<RefCell<Vec<RecordedSubmit>>>) {
        let submits = Rc::new(RefCell::new(Vec::new()));
        let panel = FakePanel {
            buf: vec![0; 16],
            submits: submits.clone(),
        };
        (
            Scheduler::new(Box::new(panel), FakeClock::new(), 1000, 1000),
            submits,
        )
    }

    #[test]
    fn coalesced_redraws_repaint_once_at_deadline() {
        let (mut sched, submits) = scheduler();
        let start = sched.clock.now();

        sched.record_damage(10, 10, 5, 5);
        sched.clock.set_millis_from_start(start, 100);
        sched.record_damage(12, 12, 5, 5);
        sched.clock.set_millis_from_start(start, 200);
        sched.record_damage(0, 0, 2, 2);

        // At t=200, not yet at the 400ms deadline.
        let wait = sched.tick();
        assert_eq!(wait, Some(Duration::from_millis(200)));
        assert!(submits.borrow().is_empty());

        sched.clock.set_millis_from_start(start, 400);
        let wait = sched.tick();
        assert_eq!(wait, None);
        let submits = submits.borrow();
        assert_eq!(submits.len(), 1);
        assert_eq!(
            submits[0].rect,
            Rect {
                x: 0,
                y: 0,
                w: 17,
                h: 17
            }
        );
        assert_eq!(submits[0].waveform, Waveform::Gc16);
        assert!(!sched.damage.has_update());
    }

    #[test]
    fn fast_mode_repaints_with_du_and_keeps_damage() {
        let (mut sched, submits) = scheduler();
        sched.set_mode(RepaintMode::Fast);
        let start = sched.clock.now();
        sched.record_damage(100, 100, 50, 50);

        sched.clock.set_millis_from_start(start, 60);
        sched.tick();

        let submits_ref = submits.borrow();
        assert_eq!(submits_ref.len(), 1);
        assert_eq!(submits_ref[0].waveform, Waveform::Du);
        drop(submits_ref);
        assert!(sched.damage.has_update());
    }

    #[test]
    fn fast_to_standard_transition_cleans_up_immediately() {
        let (mut sched, submits) = scheduler();
        sched.set_mode(RepaintMode::Fast);
        sched.record_damage(100, 100, 50, 50);
        sched.clock.advance(Duration::from_millis(60));
        sched.tick(); // one DU repaint, damage still outstanding

        sched.set_mode(RepaintMode::Standard);

        let submits = submits.borrow();
        assert_eq!(submits.len(), 2);
        assert_eq!(submits[1].waveform, Waveform::Gc16);
        assert_eq!(submits[1].mode, UpdateMode::Partial);
        assert_eq!(submits[1].rect, submits[0].rect);
    }

    #[test]
    fn no_damage_means_no_deadline() {
        let (mut sched, _submits) = scheduler();
        assert_eq!(sched.tick(), None);
    }

    #[test]
    fn force_repaint_is_full_screen_gc16() {
        let (mut sched, submits) = scheduler();
        sched.force_repaint();
        let submits = submits.borrow();
        assert_eq!(submits.len(), 1);
        assert_eq!(submits[0].waveform, Waveform::Gc16);
        assert_eq!(submits[0].mode, UpdateMode::Full);
        assert_eq!(
            submits[0].rect,
            Rect {
                x: 0,
                y: 0,
                w: 1000,
                h: 1000
            }
        );
    }
}
