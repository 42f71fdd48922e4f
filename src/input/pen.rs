//! Pen intent handler: tracks the electromagnetic digitizer and drives the
//! repaint scheduler's fast/standard toggle while the nib is in contact.

use super::{
    AxisRange, RawEvent, ABS_DISTANCE, ABS_PRESSURE, ABS_TILT_X, ABS_TILT_Y, ABS_X, ABS_Y,
    BTN_TOOL_PEN, BTN_TOOL_RUBBER, EV_ABS, EV_KEY,
};
use crate::clock::Clock;
use crate::pointer::{Dispatcher, PointerButton};
use crate::repaint::{RepaintMode, Scheduler};

/// Raw pen sample accumulated from one `EV_SYN`-delimited frame, in the
/// digitizer's native axis frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct PenSample {
    pub x: i32,
    pub y: i32,
    pub pressure: i32,
    pub distance: i32,
    pub tilt_x: i32,
    pub tilt_y: i32,
    pub tool_pen: bool,
    pub tool_rubber: bool,
}

impl PenSample {
    pub fn apply_frame(&mut self, frame: &[RawEvent]) {
        for event in frame {
            match (event.type_, event.code) {
                (EV_ABS, ABS_X) => self.x = event.value,
                (EV_ABS, ABS_Y) => self.y = event.value,
                (EV_ABS, ABS_PRESSURE) => self.pressure = event.value,
                (EV_ABS, ABS_DISTANCE) => self.distance = event.value,
                (EV_ABS, ABS_TILT_X) => self.tilt_x = event.value,
                (EV_ABS, ABS_TILT_Y) => self.tilt_y = event.value,
                (EV_KEY, BTN_TOOL_PEN) => self.tool_pen = event.value != 0,
                (EV_KEY, BTN_TOOL_RUBBER) => self.tool_rubber = event.value != 0,
                _ => {}
            }
        }
    }

    #[must_use]
    pub fn tool_active(&self) -> bool {
        self.tool_pen || self.tool_rubber
    }
}

/// Maps a native digitizer sample to screen pixels.
///
/// The digitizer's axes are rotated 90° relative to the screen's: swap axes,
/// then vertically flip the former-x axis. `flip_x`/`flip_y` in the device
/// profile compensate for hardware variants that report pre-rotated
/// coordinates; the output contract is always screen pixels, origin
/// top-left.
#[must_use]
pub fn to_screen(
    pen_x: i32,
    pen_y: i32,
    x_range: AxisRange,
    y_range: AxisRange,
    screen_xres: u32,
    screen_yres: u32,
) -> (i32, i32) {
    let pen_y_max = y_range.maximum.max(1);
    let pen_x_max = x_range.maximum.max(1);
    let screen_x = pen_y * screen_xres as i32 / pen_y_max;
    let screen_y = screen_yres as i32 - screen_yres as i32 * pen_x / pen_x_max;
    (screen_x, screen_y)
}

/// Tracks the pen's previous button state to detect the contact edges that
/// drive the repaint mode.
pub struct Pen {
    prev_pressed: bool,
    active: bool,
}

impl Default for Pen {
    fn default() -> Self {
        Self {
            prev_pressed: false,
            active: false,
        }
    }
}

impl Pen {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True whenever the pen tool was in proximity on the most recent
    /// sample; used by the multiplexer to inhibit the touch component.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Processes one pen sample already converted to screen coordinates.
    /// `sample` is `None` when the tool left proximity entirely.
    pub fn process<C: Clock>(
        &mut self,
        sample: Option<(i32, i32, i32)>,
        scheduler: &mut Scheduler<C>,
        dispatcher: &mut Dispatcher<'_>,
    ) {
        self.active = sample.is_some();

        let Some((screen_x, screen_y, pressure)) = sample else {
            return;
        };

        let pressed = pressure > 0;
        let button = if pressed {
            PointerButton::LEFT
        } else {
            PointerButton::empty()
        };
        dispatcher.send(screen_x, screen_y, button);

        if pressed != self.prev_pressed {
            if pressed {
                scheduler.set_mode(RepaintMode::Fast);
            } else {
                scheduler.set_mode(RepaintMode::Standard);
                scheduler.force_repaint();
            }
        }
        self.prev_pressed = pressed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::error::CoreError;
    use crate::panel::{Panel, UpdateData};
    use crate::rfb::RfbSession;
    use std::os::fd::RawFd;

    struct NullPanel {
        buf: Vec<u8>,
    }

    impl Panel for NullPanel {
        fn framebuffer(&mut self) -> &mut [u8] {
            &mut self.buf
        }
        fn stride(&self) -> u32 {
            0
        }
        fn submit(&mut self, _update: &UpdateData) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingSession {
        events: Vec<(i32, i32, u8)>,
    }

    impl RfbSession for RecordingSession {
        fn socket_fd(&self) -> RawFd {
            -1
        }
        fn poll_update(&mut self) -> Result<Option<(i32, i32, i32, i32)>, CoreError> {
            Ok(None)
        }
        fn send_pointer_event(&mut self, x: i32, y: i32, mask: PointerButton) {
            self.events.push((x, y, mask.bits()));
        }
    }

    fn scheduler() -> Scheduler<FakeClock> {
        Scheduler::new(Box::new(NullPanel { buf: vec![0; 4] }), FakeClock::new(), 100, 100)
    }

    #[test]
    fn rotated_mapping_swaps_axes_and_flips_former_x() {
        let x_range = AxisRange {
            minimum: 0,
            maximum: 1000,
        };
        let y_range = AxisRange {
            minimum: 0,
            maximum: 1000,
        };
        // Pen at native (0, 1000): should map to screen (xres, 0).
        let (sx, sy) = to_screen(0, 1000, x_range, y_range, 200, 300);
        assert_eq!((sx, sy), (200, 300));

        // Pen at native (0, 0): maps to screen (0, yres).
        let (sx, sy) = to_screen(0, 0, x_range, y_range, 200, 300);
        assert_eq!((sx, sy), (0, 300));
    }

    #[test]
    fn pen_down_switches_to_fast_mode() {
        let mut sched = scheduler();
        let mut session = RecordingSession::default();
        let mut pen = Pen::new();
        let mut d = Dispatcher::new(&mut session);

        assert_eq!(sched.mode(), RepaintMode::Standard);
        pen.process(Some((10, 10, 1)), &mut sched, &mut d);
        assert_eq!(sched.mode(), RepaintMode::Fast);
        assert!(pen.is_active());
    }

    #[test]
    fn pen_up_forces_standard_mode_and_repaint() {
        let mut sched = scheduler();
        let mut session = RecordingSession::default();
        let mut pen = Pen::new();

        {
            let mut d = Dispatcher::new(&mut session);
            pen.process(Some((10, 10, 1)), &mut sched, &mut d);
            pen.process(Some((10, 10, 0)), &mut sched, &mut d);
        }

        assert_eq!(sched.mode(), RepaintMode::Standard);
        assert_eq!(
            session.events,
            vec![(10, 10, PointerButton::LEFT.bits()), (10, 10, 0)]
        );
    }

    #[test]
    fn pen_leaving_proximity_clears_active_flag() {
        let mut sched = scheduler();
        let mut session = RecordingSession::default();
        let mut pen = Pen::new();
        let mut d = Dispatcher::new(&mut session);

        pen.process(Some((10, 10, 1)), &mut sched, &mut d);
        assert!(pen.is_active());
        pen.process(None, &mut sched, &mut d);
        assert!(!pen.is_active());
    }
}
