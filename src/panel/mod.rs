//! The e-ink panel update interface: a waveform-tagged partial-refresh
//! ioctl on one hardware family, and a shared-memory + message-queue
//! protocol speaking the same payload on the other.

pub mod mxcfb;
pub mod queue;

use crate::error::CoreError;
use crate::geometry::Rect;

/// E-ink waveform, trading update latency for ghosting.
///
/// Discriminants match the wire values of `mxcfb_update_data.waveform_mode`
/// exactly; do not reorder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::FromRepr)]
#[repr(u32)]
pub enum Waveform {
    /// Completely erases the display to white. Must be paired with `Full`.
    Init = 0,
    /// Binary black/white only, ~260ms, higher ghosting. Used by [`Fast`](crate::repaint::RepaintMode::Fast) mode.
    Du = 1,
    /// Full grayscale, ~450ms, very low ghosting. Used by [`Standard`](crate::repaint::RepaintMode::Standard) mode.
    Gc16 = 2,
    /// Lower-fidelity grayscale tuned for text.
    Gl16 = 3,
    /// Black/white only, fastest, highest ghosting.
    A2 = 4,
}

/// Whether the update covers only the damaged rectangle or the whole panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::FromRepr)]
#[repr(u32)]
pub enum UpdateMode {
    Partial = 0,
    Full = 1,
}

/// One panel refresh request.
#[derive(Clone, Copy, Debug)]
pub struct UpdateData {
    pub rect: Rect,
    pub waveform: Waveform,
    pub mode: UpdateMode,
    /// Client-assigned marker, 1..=255, wraps. Used to wait for completion.
    pub marker: u8,
}

/// Abstracts the two hardware panel variants behind one `submit` call.
///
/// Detection of which implementation to use happens once at startup in
/// [`crate::device::detect`]; the chosen implementation is then stored by
/// value, not behind a trait object, in the device handle, per the design
/// notes about modeling the two panel families as one interface.
pub trait Panel {
    /// Memory-mapped framebuffer the RFB decoder writes pixels into
    /// directly, avoiding a copy.
    fn framebuffer(&mut self) -> &mut [u8];

    /// Byte stride of one row in [`Self::framebuffer`].
    fn stride(&self) -> u32;

    /// Push `update` to the panel. If `wait` is true, blocks until the
    /// panel reports the update with this marker has completed.
    fn submit(&mut self, update: &UpdateData) -> Result<(), CoreError>;
}

/// Next marker value in the `1..=255` wrapping sequence.
#[must_use]
pub fn next_marker(current: u8) -> u8 {
    if current >= 255 {
        1
    } else {
        current + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_wraps_at_255() {
        assert_eq!(next_marker(255), 1);
        assert_eq!(next_marker(254), 255);
        assert_eq!(next_marker(1), 2);
    }

    #[test]
    fn waveform_discriminants_match_wire_format() {
        assert_eq!(Waveform::Init as u32, 0);
        assert_eq!(Waveform::Du as u32, 1);
        assert_eq!(Waveform::Gc16 as u32, 2);
        assert_eq!(Waveform::Gl16 as u32, 3);
        assert_eq!(Waveform::A2 as u32, 4);
    }
}
