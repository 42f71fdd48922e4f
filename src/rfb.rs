//! The RFB library contract consumed by the core. The real wire protocol
//! lives in [`crate::net`]; this trait is what the event loop, scheduler,
//! and pointer dispatcher actually depend on, so they can be driven by a
//! test double without a real server.

use crate::error::CoreError;
use crate::pointer::PointerButton;
use std::os::fd::RawFd;

/// A live connection to an RFB server.
pub trait RfbSession {
    /// File descriptor to poll for readability.
    fn socket_fd(&self) -> RawFd;

    /// Process any pending server messages. Returns the bounding rectangle
    /// of one `FramebufferUpdate` if the server sent one, `None` if there
    /// was nothing to read right now, or [`CoreError::ConnectionClosed`] if
    /// the server hung up.
    fn poll_update(&mut self) -> Result<Option<(i32, i32, i32, i32)>, CoreError>;

    /// Sends a `PointerEvent` message.
    fn send_pointer_event(&mut self, x: i32, y: i32, mask: PointerButton);
}
