//! Touch intent FSM: turns a stream of multi-touch slot updates into taps,
//! long-press right-clicks, and discrete scroll ticks.

use super::{
    RawEvent, ABS_MT_ORIENTATION, ABS_MT_POSITION_X, ABS_MT_POSITION_Y, ABS_MT_PRESSURE,
    ABS_MT_SLOT, ABS_MT_TRACKING_ID, EV_ABS,
};
use crate::clock::Clock;
use crate::geometry::AxisFlip;
use crate::pointer::{Dispatcher, PointerButton};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Minimal move, in screen pixels, to consider a touch point dragged enough
/// to start scrolling instead of tapping.
const SCROLL_DELTA: i32 = 10;
/// Duration below which a tap-and-release counts as a left click instead of
/// a long-press right click.
const RIGHT_CLICK_TIME: Duration = Duration::from_millis(500);
/// Scroll ticks emitted per screen pixel dragged.
const SCROLL_SPEED: f64 = 0.013;

/// State tracked for one active multi-touch tracking id, in the sensor's
/// native coordinate frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct Slot {
    pub x: i32,
    pub y: i32,
    pub pressure: i32,
    pub orientation: i32,
}

/// Raw multi-touch protocol B decoder: applies buffered `ABS_MT_*` events to
/// a set of tracked slots.
#[derive(Default)]
pub struct SlotTracker {
    current_slot: i32,
    slots: BTreeMap<i32, Slot>,
}

impl SlotTracker {
    pub fn apply_frame(&mut self, frame: &[RawEvent]) {
        for event in frame {
            if event.type_ != EV_ABS {
                continue;
            }
            match event.code {
                ABS_MT_SLOT => self.current_slot = event.value,
                ABS_MT_TRACKING_ID => {
                    if event.value == -1 {
                        self.slots.remove(&self.current_slot);
                    } else {
                        self.slots.entry(self.current_slot).or_default();
                    }
                }
                ABS_MT_POSITION_X => {
                    self.slots.entry(self.current_slot).or_default().x = event.value;
                }
                ABS_MT_POSITION_Y => {
                    self.slots.entry(self.current_slot).or_default().y = event.value;
                }
                ABS_MT_PRESSURE => {
                    self.slots.entry(self.current_slot).or_default().pressure = event.value;
                }
                ABS_MT_ORIENTATION => {
                    self.slots.entry(self.current_slot).or_default().orientation = event.value;
                }
                _ => {}
            }
        }
    }

    #[must_use]
    pub fn slots(&self) -> &BTreeMap<i32, Slot> {
        &self.slots
    }
}

/// Current interaction recognized from the touch centroid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
enum State {
    #[default]
    Inactive,
    Tap,
    ScrollX,
    ScrollY,
}

/// Turns a sequence of touch-slot batches into taps, long presses, and
/// scroll ticks. Exactly one interaction is tracked at a time: the centroid
/// of all live slots.
pub struct Interaction {
    state: State,
    x_initial: i32,
    y_initial: i32,
    touch_start: Instant,
    x_scroll_ticks_sent: i64,
    y_scroll_ticks_sent: i64,
}

impl Default for Interaction {
    fn default() -> Self {
        Self {
            state: State::Inactive,
            x_initial: 0,
            y_initial: 0,
            touch_start: Instant::now(),
            x_scroll_ticks_sent: 0,
            y_scroll_ticks_sent: 0,
        }
    }
}

impl Interaction {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes one batch of active slots (already centroid-averaged into
    /// screen coordinates by the caller), or `None` for an empty batch (all
    /// fingers lifted).
    ///
    /// If `inhibit` is true (e.g. the pen is active), the FSM is forced to
    /// `Inactive` without emitting anything.
    pub fn process(
        &mut self,
        screen_xy: Option<(i32, i32)>,
        inhibit: bool,
        clock: &impl Clock,
        dispatcher: &mut Dispatcher<'_>,
    ) {
        if inhibit {
            self.state = State::Inactive;
            return;
        }

        match screen_xy {
            Some((x, y)) => self.on_update(x, y, clock, dispatcher),
            None => self.on_end(clock, dispatcher),
        }
    }

    fn on_update(
        &mut self,
        x: i32,
        y: i32,
        clock: &impl Clock,
        dispatcher: &mut Dispatcher<'_>,
    ) {
        if self.state == State::Inactive {
            self.state = State::Tap;
            self.touch_start = clock.now();
            self.x_initial = x;
            self.y_initial = y;
            self.x_scroll_ticks_sent = 0;
            self.y_scroll_ticks_sent = 0;
        }

        if self.state == State::Tap {
            if (x - self.x_initial).abs() >= SCROLL_DELTA {
                self.state = State::ScrollX;
            } else if (y - self.y_initial).abs() >= SCROLL_DELTA {
                self.state = State::ScrollY;
            }
        }

        if self.state == State::ScrollX {
            let target = ((x - self.x_initial) as f64 * SCROLL_SPEED).round() as i64;
            self.drain_scroll_ticks(
                target,
                PointerButton::SCROLL_RIGHT,
                PointerButton::SCROLL_LEFT,
                dispatcher,
                true,
            );
        }

        if self.state == State::ScrollY {
            let target = ((y - self.y_initial) as f64 * SCROLL_SPEED).round() as i64;
            self.drain_scroll_ticks(
                target,
                PointerButton::SCROLL_DOWN,
                PointerButton::SCROLL_UP,
                dispatcher,
                false,
            );
        }
    }

    fn drain_scroll_ticks(
        &mut self,
        target: i64,
        positive: PointerButton,
        negative: PointerButton,
        dispatcher: &mut Dispatcher<'_>,
        is_x: bool,
    ) {
        let sent = if is_x {
            &mut self.x_scroll_ticks_sent
        } else {
            &mut self.y_scroll_ticks_sent
        };
        while target > *sent {
            dispatcher.click(self.x_initial, self.y_initial, positive);
            *sent += 1;
        }
        while target < *sent {
            dispatcher.click(self.x_initial, self.y_initial, negative);
            *sent -= 1;
        }
    }

    fn on_end(&mut self, clock: &impl Clock, dispatcher: &mut Dispatcher<'_>) {
        if self.state == State::Tap {
            let held = clock.now().saturating_duration_since(self.touch_start);
            let button = if held < RIGHT_CLICK_TIME {
                PointerButton::LEFT
            } else {
                PointerButton::RIGHT
            };
            dispatcher.click(self.x_initial, self.y_initial, button);
        }
        self.state = State::Inactive;
    }
}

/// Maps a centroid in the touch sensor's native frame to screen coordinates,
/// honoring the device's axis flip table.
#[must_use]
pub fn centroid_to_screen(
    sx: i32,
    sy: i32,
    x_span: i32,
    y_span: i32,
    xres: u32,
    yres: u32,
    flip: AxisFlip,
) -> (i32, i32) {
    let (sx, sy) = if flip.swap_xy { (sy, sx) } else { (sx, sy) };
    let (x_span, y_span) = if flip.swap_xy {
        (y_span, x_span)
    } else {
        (x_span, y_span)
    };

    let mut x = (i64::from(sx) * i64::from(xres) / i64::from(x_span.max(1))) as i32;
    let mut y = (i64::from(sy) * i64::from(yres) / i64::from(y_span.max(1))) as i32;

    if flip.flip_x {
        x = xres as i32 - x;
    }
    if flip.flip_y {
        y = yres as i32 - y;
    }
    (x, y)
}

/// Computes the mean position of all active slots, in the sensor's native
/// frame. Returns `None` if there are no active slots.
#[must_use]
pub fn centroid(slots: &BTreeMap<i32, Slot>) -> Option<(i32, i32)> {
    if slots.is_empty() {
        return None;
    }
    let (sum_x, sum_y) = slots
        .values()
        .fold((0i64, 0i64), |(ax, ay), s| (ax + i64::from(s.x), ay + i64::from(s.y)));
    let n = slots.len() as i64;
    Some(((sum_x / n) as i32, (sum_y / n) as i32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::rfb::RfbSession;

    #[derive(Default)]
    struct RecordingSession {
        events: Vec<(i32, i32, u8)>,
    }

    impl RfbSession for RecordingSession {
        fn socket_fd(&self) -> std::os::fd::RawFd {
            -1
        }
        fn poll_update(
            &mut self,
        ) -> Result<Option<(i32, i32, i32, i32)>, crate::error::CoreError> {
            Ok(None)
        }
        fn send_pointer_event(&mut self, x: i32, y: i32, mask: PointerButton) {
            self.events.push((x, y, mask.bits()));
        }
    }

    #[test]
    fn tap_under_500ms_is_left_click() {
        let mut session = RecordingSession::default();
        let mut interaction = Interaction::new();
        let mut clock = FakeClock::new();
        let start = {
            use crate::clock::Clock;
            clock.now()
        };

        {
            let mut d = Dispatcher::new(&mut session);
            interaction.process(Some((300, 400)), false, &clock, &mut d);
        }
        clock.set_millis_from_start(start, 200);
        {
            let mut d = Dispatcher::new(&mut session);
            interaction.process(Some((302, 401)), false, &clock, &mut d);
            interaction.process(None, false, &clock, &mut d);
        }

        assert_eq!(
            session.events,
            vec![
                (300, 400, PointerButton::LEFT.bits()),
                (300, 400, 0)
            ]
        );
    }

    #[test]
    fn horizontal_scroll_emits_monotonic_tick_count() {
        let mut session = RecordingSession::default();
        let mut interaction = Interaction::new();
        let clock = FakeClock::new();

        {
            let mut d = Dispatcher::new(&mut session);
            interaction.process(Some((500, 500)), false, &clock, &mut d);
            interaction.process(Some((600, 502)), false, &clock, &mut d);
            interaction.process(Some((655, 502)), false, &clock, &mut d);
        }

        let right_count = session
            .events
            .iter()
            .filter(|(_, _, m)| *m == PointerButton::SCROLL_RIGHT.bits())
            .count();
        let left_count = session
            .events
            .iter()
            .filter(|(_, _, m)| *m == PointerButton::SCROLL_LEFT.bits())
            .count();
        assert_eq!(right_count as i64 - left_count as i64, 2);

        {
            let mut d = Dispatcher::new(&mut session);
            interaction.process(Some((575, 502)), false, &clock, &mut d);
        }
        let right_count = session
            .events
            .iter()
            .filter(|(_, _, m)| *m == PointerButton::SCROLL_RIGHT.bits())
            .count();
        let left_count = session
            .events
            .iter()
            .filter(|(_, _, m)| *m == PointerButton::SCROLL_LEFT.bits())
            .count();
        assert_eq!(right_count as i64 - left_count as i64, 1);
    }

    #[test]
    fn inhibited_touch_emits_nothing_and_stays_inactive() {
        let mut session = RecordingSession::default();
        let mut interaction = Interaction::new();
        let clock = FakeClock::new();
        let mut d = Dispatcher::new(&mut session);
        interaction.process(Some((10, 10)), true, &clock, &mut d);
        assert!(session.events.is_empty());
        assert_eq!(interaction.state, State::Inactive);
    }

    #[test]
    fn centroid_of_two_slots_is_their_mean() {
        let mut slots = BTreeMap::new();
        slots.insert(
            0,
            Slot {
                x: 10,
                y: 20,
                pressure: 1,
                orientation: 0,
            },
        );
        slots.insert(
            1,
            Slot {
                x: 30,
                y: 40,
                pressure: 1,
                orientation: 0,
            },
        );
        assert_eq!(centroid(&slots), Some((20, 30)));
    }

    #[test]
    fn centroid_of_empty_slots_is_none() {
        assert_eq!(centroid(&BTreeMap::new()), None);
    }
}
