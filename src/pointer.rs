//! Pointer button bitmask and the thin dispatcher that turns high-level
//! button presses into press/release pairs sent to the RFB session.

bitflags::bitflags! {
    /// VNC pointer button mask, one bit per spec.md §3 mask bit.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct PointerButton: u8 {
        const LEFT = 1 << 0;
        const RIGHT = 1 << 1;
        const MIDDLE = 1 << 2;
        const SCROLL_DOWN = 1 << 3;
        const SCROLL_UP = 1 << 4;
        const SCROLL_LEFT = 1 << 5;
        const SCROLL_RIGHT = 1 << 6;
    }
}

/// Sends pointer events to the RFB session.
///
/// For scroll and click buttons, [`Self::send`] issues a *press* (mask with
/// the bit set) immediately followed by a *release* (mask zero). For
/// cursor-move-only calls, pass [`PointerButton::empty`], which is sent as a
/// single mask-zero event. The dispatcher is stateless: input components are
/// responsible for remembering whether they currently hold a button.
pub struct Dispatcher<'a> {
    session: &'a mut dyn crate::rfb::RfbSession,
}

impl<'a> Dispatcher<'a> {
    #[must_use]
    pub fn new(session: &'a mut dyn crate::rfb::RfbSession) -> Self {
        Self { session }
    }

    /// Sends a cursor move with no button activity.
    pub fn move_to(&mut self, x: i32, y: i32) {
        self.session.send_pointer_event(x, y, PointerButton::empty());
    }

    /// Sends a press immediately followed by a release for `button`.
    ///
    /// `button` must not be empty; use [`Self::move_to`] for plain moves.
    pub fn click(&mut self, x: i32, y: i32, button: PointerButton) {
        self.session.send_pointer_event(x, y, button);
        self.session.send_pointer_event(x, y, PointerButton::empty());
    }

    /// Sends a raw mask, for components (like the pen) that track a held
    /// button across ticks themselves.
    pub fn send(&mut self, x: i32, y: i32, mask: PointerButton) {
        self.session.send_pointer_event(x, y, mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn click_sends_press_then_release() {
        let mut session = RecordingSession::default();
        let mut dispatcher = Dispatcher::new(&mut session);
        dispatcher.click(300, 400, PointerButton::LEFT);
        assert_eq!(
            session.events,
            vec![(300, 400, PointerButton::LEFT.bits()), (300, 400, 0)]
        );
    }

    #[test]
    fn move_sends_single_zero_mask_event() {
        let mut session = RecordingSession::default();
        let mut dispatcher = Dispatcher::new(&mut session);
        dispatcher.move_to(1, 2);
        assert_eq!(session.events, vec![(1, 2, 0)]);
    }

    #[test]
    fn every_nonmove_event_is_paired_with_a_release() {
        let mut session = RecordingSession::default();
        {
            let mut dispatcher = Dispatcher::new(&mut session);
            dispatcher.click(1, 1, PointerButton::SCROLL_RIGHT);
            dispatcher.click(2, 2, PointerButton::SCROLL_LEFT);
        }
        // Every odd-indexed event (by pair) must release to mask zero.
        for pair in session.events.chunks(2) {
            assert_eq!(pair[1].2, 0);
        }
    }
}
