//! Physical button handler: power quits the application, home forces a
//! full-screen repaint. Both are edge-triggered on release.

use super::{RawEvent, EV_KEY, KEY_HOME, KEY_LEFT, KEY_POWER, KEY_RIGHT};
use crate::clock::Clock;
use crate::repaint::Scheduler;

/// Snapshot of the four physical buttons tracked by the reMarkable frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ButtonState {
    pub left: bool,
    pub right: bool,
    pub home: bool,
    pub power: bool,
}

impl ButtonState {
    pub fn apply_frame(&mut self, frame: &[RawEvent]) {
        for event in frame {
            if event.type_ != EV_KEY {
                continue;
            }
            let pressed = event.value != 0;
            match event.code {
                KEY_LEFT => self.left = pressed,
                KEY_RIGHT => self.right = pressed,
                KEY_HOME => self.home = pressed,
                KEY_POWER => self.power = pressed,
                _ => {}
            }
        }
    }
}

/// What the event loop should do after one tick of button processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonAction {
    None,
    Quit,
}

/// Edge detector over consecutive [`ButtonState`] snapshots.
#[derive(Default)]
pub struct Buttons {
    previous: ButtonState,
}

impl Buttons {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compares `state` to the previous snapshot, forces a repaint on the
    /// home button's falling edge, and reports whether the power button's
    /// falling edge should quit the application.
    pub fn process<C: Clock>(
        &mut self,
        state: ButtonState,
        scheduler: &mut Scheduler<C>,
    ) -> ButtonAction {
        let action = if self.previous.power && !state.power {
            ButtonAction::Quit
        } else {
            ButtonAction::None
        };

        if self.previous.home && !state.home {
            scheduler.force_repaint();
        }

        self.previous = state;
        action
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::error::CoreError;
    use crate::panel::{Panel, UpdateData};
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingPanel {
        buf: Vec<u8>,
        submits: Rc<Cell<u32>>,
    }

    impl Panel for CountingPanel {
        fn framebuffer(&mut self) -> &mut [u8] {
            &mut self.buf
        }
        fn stride(&self) -> u32 {
            0
        }
        fn submit(&mut self, _update: &UpdateData) -> Result<(), CoreError> {
            self.submits.set(self.submits.get() + 1);
            Ok(())
        }
    }

    fn scheduler() -> (Scheduler<FakeClock>, Rc<Cell<u32>>) {
        let submits = Rc::new(Cell::new(0));
        let panel = CountingPanel {
            buf: vec![0; 4],
            submits: submits.clone(),
        };
        (Scheduler::new(Box::new(panel), FakeClock::new(), 10, 10), submits)
    }

    #[test]
    fn power_falling_edge_quits() {
        let (mut sched, _submits) = scheduler();
        let mut buttons = Buttons::new();

        let pressed = ButtonState {
            power: true,
            ..Default::default()
        };
        assert_eq!(buttons.process(pressed, &mut sched), ButtonAction::None);

        let released = ButtonState::default();
        assert_eq!(buttons.process(released, &mut sched), ButtonAction::Quit);
    }

    #[test]
    fn home_falling_edge_forces_repaint() {
        let (mut sched, submits) = scheduler();
        let mut buttons = Buttons::new();

        let pressed = ButtonState {
            home: true,
            ..Default::default()
        };
        buttons.process(pressed, &mut sched);
        assert_eq!(submits.get(), 0);

        buttons.process(ButtonState::default(), &mut sched);
        assert_eq!(submits.get(), 1);
    }

    #[test]
    fn steady_state_produces_no_action() {
        let (mut sched, submits) = scheduler();
        let mut buttons = Buttons::new();
        assert_eq!(
            buttons.process(ButtonState::default(), &mut sched),
            ButtonAction::None
        );
        assert_eq!(submits.get(), 0);
    }
}
