//! Single-threaded, cooperative event-loop multiplexer.
//!
//! Within one tick components are serviced in a fixed order: RFB-in ->
//! scheduler -> pen -> buttons -> touch. See the module-level invariants in
//! `repaint`, `input::pen`, `input::buttons`, and `input::touch` for why
//! that order matters.

use crate::clock::Clock;
use crate::error::CoreError;
use crate::geometry::AxisFlip;
use crate::input::buttons::{ButtonAction, ButtonState, Buttons};
use crate::input::pen::{Pen, PenSample};
use crate::input::touch::{centroid, centroid_to_screen, Interaction, SlotTracker};
use crate::input::{axis_range, AxisRange, EventReader};
use crate::pointer::Dispatcher;
use crate::repaint::Scheduler;
use crate::rfb::RfbSession;
use nix::poll::{poll, PollFd, PollFlags};
use std::os::fd::BorrowedFd;
use std::time::Duration;

/// An optional input component: present only when its device was detected
/// and the corresponding `--no-*` flag was not given.
struct TouchComponent {
    reader: EventReader,
    slots: SlotTracker,
    interaction: Interaction,
    x_range: AxisRange,
    y_range: AxisRange,
    flip: AxisFlip,
}

struct PenComponent {
    reader: EventReader,
    sample: PenSample,
    pen: Pen,
    x_range: AxisRange,
    y_range: AxisRange,
}

struct ButtonsComponent {
    reader: EventReader,
    state: ButtonState,
    buttons: Buttons,
}

/// Owns every live device and drives the cooperative tick loop described in
/// the module docs.
pub struct EventLoop<C: Clock> {
    session: Box<dyn RfbSession>,
    scheduler: Scheduler<C>,
    touch: Option<TouchComponent>,
    pen: Option<PenComponent>,
    buttons: Option<ButtonsComponent>,
}

/// Everything needed to build a touch component, gathered by device
/// detection before the loop starts.
pub struct TouchConfig {
    pub reader: EventReader,
    pub flip: AxisFlip,
}

pub struct PenConfig {
    pub reader: EventReader,
}

pub struct ButtonsConfig {
    pub reader: EventReader,
}

impl<C: Clock> EventLoop<C> {
    pub fn new(
        session: Box<dyn RfbSession>,
        scheduler: Scheduler<C>,
        touch: Option<TouchConfig>,
        pen: Option<PenConfig>,
        buttons: Option<ButtonsConfig>,
    ) -> Result<Self, CoreError> {
        let touch = touch
            .map(|cfg| -> Result<TouchComponent, CoreError> {
                let fd = cfg.reader.fd();
                Ok(TouchComponent {
                    x_range: axis_range(fd, crate::input::ABS_MT_POSITION_X)?,
                    y_range: axis_range(fd, crate::input::ABS_MT_POSITION_Y)?,
                    reader: cfg.reader,
                    slots: SlotTracker::default(),
                    interaction: Interaction::new(),
                    flip: cfg.flip,
                })
            })
            .transpose()?;

        let pen = pen
            .map(|cfg| -> Result<PenComponent, CoreError> {
                let fd = cfg.reader.fd();
                Ok(PenComponent {
                    x_range: axis_range(fd, crate::input::ABS_X)?,
                    y_range: axis_range(fd, crate::input::ABS_Y)?,
                    reader: cfg.reader,
                    sample: PenSample::default(),
                    pen: Pen::new(),
                })
            })
            .transpose()?;

        let buttons = buttons.map(|cfg| ButtonsComponent {
            reader: cfg.reader,
            state: ButtonState::default(),
            buttons: Buttons::new(),
        });

        Ok(Self {
            session,
            scheduler,
            touch,
            pen,
            buttons,
        })
    }

    /// Runs until the power button is released, the user quits, or the RFB
    /// server closes the connection (in which case the error propagates as
    /// [`CoreError::ConnectionClosed`]).
    pub fn run(&mut self) -> Result<(), CoreError> {
        loop {
            if self.tick()? {
                return Ok(());
            }
        }
    }

    /// Runs one iteration. Returns `true` if the loop should stop.
    fn tick(&mut self) -> Result<bool, CoreError> {
        let timeout = self.scheduler.tick();

        let rfb_fd = unsafe { BorrowedFd::borrow_raw(self.session.socket_fd()) };
        let mut fds = vec![PollFd::new(rfb_fd, PollFlags::POLLIN)];
        if let Some(t) = &self.touch {
            fds.push(PollFd::new(t.reader.fd_borrowed(), PollFlags::POLLIN));
        }
        if let Some(p) = &self.pen {
            fds.push(PollFd::new(p.reader.fd_borrowed(), PollFlags::POLLIN));
        }
        if let Some(b) = &self.buttons {
            fds.push(PollFd::new(b.reader.fd_borrowed(), PollFlags::POLLIN));
        }

        let poll_timeout = match timeout {
            None => nix::poll::PollTimeout::NONE,
            Some(d) => nix::poll::PollTimeout::try_from(duration_to_millis_i32(d))
                .unwrap_or(nix::poll::PollTimeout::MAX),
        };

        loop {
            match poll(&mut fds, poll_timeout) {
                Ok(_) => break,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    return Err(CoreError::InputRead {
                        device: "poll",
                        source: std::io::Error::from(e),
                    });
                }
            }
        }

        let mut idx = 0;
        let rfb_readable = fds[idx]
            .revents()
            .map(|r| r.contains(PollFlags::POLLIN))
            .unwrap_or(false);
        idx += 1;

        if rfb_readable {
            match self.session.poll_update() {
                Ok(Some((x, y, w, h))) => self.scheduler.record_damage(x, y, w, h),
                Ok(None) => {}
                Err(CoreError::ConnectionClosed) => return Ok(true),
                Err(e) => return Err(e),
            }
        }

        self.scheduler.tick();

        if let Some(pen) = &mut self.pen {
            let readable = fds
                .get(idx)
                .and_then(|f| f.revents())
                .map(|r| r.contains(PollFlags::POLLIN))
                .unwrap_or(false);
            idx += 1;
            if readable {
                pen.reader.drain(|frame| pen.sample.apply_frame(frame))?;
            }
            let sample = if pen.sample.tool_active() {
                let (sx, sy) = crate::input::pen::to_screen(
                    pen.sample.x,
                    pen.sample.y,
                    pen.x_range,
                    pen.y_range,
                    self.scheduler.xres(),
                    self.scheduler.yres(),
                );
                Some((sx, sy, pen.sample.pressure))
            } else {
                None
            };
            let mut dispatcher = Dispatcher::new(self.session.as_mut());
            pen.pen.process(sample, &mut self.scheduler, &mut dispatcher);
        } else {
            idx += 1;
        }

        if let Some(buttons) = &mut self.buttons {
            let readable = fds
                .get(idx)
                .and_then(|f| f.revents())
                .map(|r| r.contains(PollFlags::POLLIN))
                .unwrap_or(false);
            idx += 1;
            if readable {
                buttons
                    .reader
                    .drain(|frame| buttons.state.apply_frame(frame))?;
            }
            if buttons.buttons.process(buttons.state, &mut self.scheduler) == ButtonAction::Quit {
                return Ok(true);
            }
        } else {
            idx += 1;
        }

        if let Some(touch) = &mut self.touch {
            let readable = fds
                .get(idx)
                .and_then(|f| f.revents())
                .map(|r| r.contains(PollFlags::POLLIN))
                .unwrap_or(false);
            if readable {
                touch.reader.drain(|frame| touch.slots.apply_frame(frame))?;
            }
            let inhibit = self.pen.as_ref().is_some_and(PenComponent::is_active);
            let screen_xy = centroid(touch.slots.slots()).map(|(sx, sy)| {
                centroid_to_screen(
                    sx,
                    sy,
                    touch.x_range.span(),
                    touch.y_range.span(),
                    self.scheduler.xres(),
                    self.scheduler.yres(),
                    touch.flip,
                )
            });
            let mut dispatcher = Dispatcher::new(self.session.as_mut());
            touch
                .interaction
                .process(screen_xy, inhibit, self.scheduler.clock(), &mut dispatcher);
        }

        Ok(false)
    }
}

impl PenComponent {
    fn is_active(&self) -> bool {
        self.pen.is_active()
    }
}

fn duration_to_millis_i32(d: Duration) -> i32 {
    i32::try_from(d.as_millis()).unwrap_or(i32::MAX)
}
