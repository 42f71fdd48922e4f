//! Damage accumulator: coalesces server-sent rectangles into one bounding
//! box so the panel only has to refresh once per repaint tick.

use crate::geometry::Rect;
use std::time::Instant;

/// Outstanding damage waiting to be pushed to the panel.
///
/// Remote desktops emit bursts of many small updates; a bounding-box merge
/// is lossless for pixels (every server-updated pixel is contained in the
/// merged rectangle) and far cheaper for the panel than many small
/// refreshes.
#[derive(Debug)]
pub struct DamageAccumulator {
    rect: Rect,
    has_update: bool,
    last_server_update: Option<Instant>,
    xres: u32,
    yres: u32,
}

impl DamageAccumulator {
    #[must_use]
    pub fn new(xres: u32, yres: u32) -> Self {
        Self {
            rect: Rect::default(),
            has_update: false,
            last_server_update: None,
            xres,
            yres,
        }
    }

    /// Merge a server-reported rectangle into the outstanding damage.
    ///
    /// The rectangle is clipped to screen bounds first; empty or
    /// fully-out-of-bounds rectangles are dropped without effect.
    pub fn record(&mut self, x: i32, y: i32, w: i32, h: i32, now: Instant) {
        let clipped = Rect::clipped(x, y, w, h, self.xres, self.yres);
        if clipped.is_empty() {
            return;
        }
        self.rect = if self.has_update {
            self.rect.union(&clipped)
        } else {
            clipped
        };
        self.has_update = true;
        self.last_server_update = Some(now);
    }

    /// Whether any damage is currently outstanding.
    #[must_use]
    pub fn has_update(&self) -> bool {
        self.has_update
    }

    /// Timestamp of the most recent [`Self::record`] call, if any.
    #[must_use]
    pub fn last_server_update(&self) -> Option<Instant> {
        self.last_server_update
    }

    /// The outstanding rectangle without clearing it.
    #[must_use]
    pub fn peek(&self) -> Option<Rect> {
        self.has_update.then_some(self.rect)
    }

    /// Take the outstanding rectangle and clear the accumulator.
    pub fn take_and_clear(&mut self) -> Option<Rect> {
        if !self.has_update {
            return None;
        }
        self.has_update = false;
        Some(std::mem::take(&mut self.rect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(ms: u64) -> Instant {
        Instant::now() + std::time::Duration::from_millis(ms)
    }

    #[test]
    fn coalesces_multiple_rects_into_bounding_box() {
        let mut acc = DamageAccumulator::new(200, 200);
        acc.record(10, 10, 5, 5, t(0));
        acc.record(12, 12, 5, 5, t(100));
        acc.record(0, 0, 2, 2, t(200));
        let r = acc.take_and_clear().unwrap();
        assert_eq!(
            r,
            Rect {
                x: 0,
                y: 0,
                w: 17,
                h: 17
            }
        );
        assert!(!acc.has_update());
    }

    #[test]
    fn record_is_idempotent() {
        let mut a = DamageAccumulator::new(200, 200);
        a.record(10, 10, 5, 5, t(0));
        let after_one = a.peek();

        let mut b = DamageAccumulator::new(200, 200);
        b.record(10, 10, 5, 5, t(0));
        b.record(10, 10, 5, 5, t(0));
        let after_two = b.peek();

        assert_eq!(after_one, after_two);
    }

    #[test]
    fn negative_coordinates_clip_to_zero() {
        let mut acc = DamageAccumulator::new(200, 200);
        acc.record(-5, -5, 10, 10, t(0));
        let r = acc.take_and_clear().unwrap();
        assert_eq!(
            r,
            Rect {
                x: 0,
                y: 0,
                w: 5,
                h: 5
            }
        );
    }

    #[test]
    fn wholly_out_of_bounds_rect_is_dropped() {
        let mut acc = DamageAccumulator::new(200, 200);
        acc.record(1000, 1000, 10, 10, t(0));
        assert!(!acc.has_update());
        assert!(acc.take_and_clear().is_none());
    }

    #[test]
    fn empty_rect_is_dropped() {
        let mut acc = DamageAccumulator::new(200, 200);
        acc.record(5, 5, 0, 10, t(0));
        assert!(!acc.has_update());
    }

    #[test]
    fn coverage_contains_every_recorded_rect_clipped() {
        let mut acc = DamageAccumulator::new(50, 50);
        let inputs = [(1, 1, 3, 3), (40, 40, 20, 20), (-2, 10, 5, 5)];
        for (x, y, w, h) in inputs {
            acc.record(x, y, w, h, t(0));
        }
        let merged = acc.take_and_clear().unwrap();
        for (x, y, w, h) in inputs {
            let clipped = Rect::clipped(x, y, w, h, 50, 50);
            assert!(merged.x <= clipped.x);
            assert!(merged.y <= clipped.y);
            assert!(merged.x + merged.w >= clipped.x + clipped.w);
            assert!(merged.y + merged.h >= clipped.y + clipped.h);
        }
    }
}
