//! Reading `struct input_event` records from Linux character devices.
//!
//! Events are grouped by `EV_SYN` markers: each component buffers events
//! until it sees `EV_SYN`/`SYN_REPORT`, then applies the buffered frame
//! atomically. See the kernel's
//! `Documentation/input/input.txt` and `multi-touch-protocol.txt`.

pub mod buttons;
pub mod pen;
pub mod touch;

use crate::error::CoreError;
use smallvec::SmallVec;
use std::fs::File;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::path::{Path, PathBuf};

pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_ABS: u16 = 0x03;

pub const SYN_REPORT: u16 = 0;

pub const ABS_X: u16 = 0x00;
pub const ABS_Y: u16 = 0x01;
pub const ABS_PRESSURE: u16 = 0x18;
pub const ABS_DISTANCE: u16 = 0x19;
pub const ABS_TILT_X: u16 = 0x1a;
pub const ABS_TILT_Y: u16 = 0x1b;

pub const ABS_MT_SLOT: u16 = 0x2f;
pub const ABS_MT_TOUCH_MAJOR: u16 = 0x30;
pub const ABS_MT_ORIENTATION: u16 = 0x34;
pub const ABS_MT_POSITION_X: u16 = 0x35;
pub const ABS_MT_POSITION_Y: u16 = 0x36;
pub const ABS_MT_TRACKING_ID: u16 = 0x39;
pub const ABS_MT_PRESSURE: u16 = 0x3a;

pub const BTN_TOOL_PEN: u16 = 0x140;
pub const BTN_TOOL_RUBBER: u16 = 0x141;

pub const KEY_LEFT: u16 = 105;
pub const KEY_RIGHT: u16 = 106;
pub const KEY_HOME: u16 = 102;
pub const KEY_POWER: u16 = 116;

/// Layout of `struct input_event` on 64-bit Linux (16-byte `timeval` +
/// 2+2+4 byte type/code/value).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
struct RawInputEvent {
    tv_sec: i64,
    tv_usec: i64,
    type_: u16,
    code: u16,
    value: i32,
}

/// One decoded input event, stripped of its timestamp (the core only needs
/// relative ordering within a frame, which is preserved by read order).
#[derive(Clone, Copy, Debug)]
pub struct RawEvent {
    pub type_: u16,
    pub code: u16,
    pub value: i32,
}

impl From<RawInputEvent> for RawEvent {
    fn from(e: RawInputEvent) -> Self {
        Self {
            type_: e.type_,
            code: e.code,
            value: e.value,
        }
    }
}

/// Non-blocking reader that groups raw input events into `EV_SYN`-delimited
/// frames.
pub struct EventReader {
    file: File,
    name: &'static str,
    pending: SmallVec<[RawEvent; 16]>,
}

impl EventReader {
    /// Opens `path` in non-blocking read-only mode.
    pub fn open(path: &Path, name: &'static str) -> Result<Self, CoreError> {
        use nix::fcntl::{open, OFlag};
        use nix::sys::stat::Mode;
        let fd = open(path, OFlag::O_RDONLY | OFlag::O_NONBLOCK, Mode::empty()).map_err(
            |source| CoreError::DeviceOpen {
                device: name,
                path: path.to_path_buf(),
                source: std::io::Error::from(source),
            },
        )?;
        // Safety: `fd` was just opened above and is owned by this call.
        let file = unsafe { <File as std::os::fd::FromRawFd>::from_raw_fd(fd) };
        Ok(Self {
            file,
            name,
            pending: SmallVec::new(),
        })
    }

    #[must_use]
    pub fn path_hint(&self) -> PathBuf {
        PathBuf::from(format!("/proc/self/fd/{}", self.file.as_raw_fd()))
    }

    pub fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    pub fn fd_borrowed(&self) -> std::os::fd::BorrowedFd<'_> {
        self.file.as_fd()
    }

    /// Drains every available event, calling `on_frame` once per
    /// `EV_SYN`/`SYN_REPORT` boundary encountered. Returns whether at least
    /// one frame was processed (used as the "has data" signal by the
    /// calling component).
    pub fn drain(&mut self, mut on_frame: impl FnMut(&[RawEvent])) -> Result<bool, CoreError> {
        let mut raw = RawInputEvent::default();
        let mut any = false;
        loop {
            let buf = unsafe {
                std::slice::from_raw_parts_mut(
                    std::ptr::addr_of_mut!(raw).cast::<u8>(),
                    std::mem::size_of::<RawInputEvent>(),
                )
            };
            match nix::unistd::read(self.file.as_raw_fd(), buf) {
                Ok(0) => break,
                Ok(n) if n == std::mem::size_of::<RawInputEvent>() => {
                    let event = RawEvent::from(raw);
                    if event.type_ == EV_SYN && event.code == SYN_REPORT {
                        any = true;
                        on_frame(&self.pending);
                        self.pending.clear();
                    } else {
                        self.pending.push(event);
                    }
                }
                Ok(_) => {
                    // Short read: device file is misbehaving, but this is
                    // not fatal to the rest of the event loop.
                    break;
                }
                Err(nix::errno::Errno::EAGAIN) => break,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(source) => {
                    return Err(CoreError::InputRead {
                        device: self.name,
                        source: std::io::Error::from(source),
                    })
                }
            }
        }
        Ok(any)
    }
}

/// Minimum/maximum for one absolute axis, as reported by `EVIOCGABS`.
#[derive(Clone, Copy, Debug, Default)]
pub struct AxisRange {
    pub minimum: i32,
    pub maximum: i32,
}

impl AxisRange {
    #[must_use]
    pub fn span(&self) -> i32 {
        (self.maximum - self.minimum).max(1)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
struct InputAbsInfo {
    value: i32,
    minimum: i32,
    maximum: i32,
    fuzz: i32,
    flat: i32,
    resolution: i32,
}

const EVIOCGABS_BASE: u8 = 0x40;

/// Queries the min/max of absolute axis `code` on `fd` via `EVIOCGABS`.
pub fn axis_range(fd: RawFd, code: u16) -> Result<AxisRange, CoreError> {
    // EVIOCGABS(abs) = _IOR('E', 0x40 + abs, struct input_absinfo)
    let mut info = InputAbsInfo::default();
    let ret = unsafe {
        libc::ioctl(
            fd,
            nix::request_code_read!(
                b'E',
                u32::from(EVIOCGABS_BASE) + u32::from(code),
                std::mem::size_of::<InputAbsInfo>()
            ) as libc::Ioctl,
            std::ptr::addr_of_mut!(info),
        )
    };
    if ret < 0 {
        return Err(CoreError::InputRead {
            device: "axis",
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(AxisRange {
        minimum: info.minimum,
        maximum: info.maximum,
    })
}

/// Capability bit test helper for `EVIOCGBIT`, used by device detection to
/// classify `/dev/input/event*` nodes without relying on fixed indices.
pub fn has_capability_bit(fd: RawFd, ev_type: u16, bit: u16) -> bool {
    const BITS_PER_LONG: usize = usize::BITS as usize;
    let nbits = 1024usize;
    let nlongs = nbits.div_ceil(BITS_PER_LONG);
    let mut bits = vec![0usize; nlongs];
    let buf_len = nlongs * std::mem::size_of::<usize>();
    let ret = unsafe {
        libc::ioctl(
            fd,
            nix::request_code_read!(b'E', 0x20 + ev_type, buf_len) as libc::Ioctl,
            bits.as_mut_ptr(),
        )
    };
    if ret < 0 {
        return false;
    }
    let idx = usize::from(bit) / BITS_PER_LONG;
    let shift = usize::from(bit) % BITS_PER_LONG;
    idx < bits.len() && (bits[idx] >> shift) & 1 == 1
}
