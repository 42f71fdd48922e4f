//! Direct `mxcfb` ioctl panel backend, talking to `/dev/fb0`.
//!
//! Struct layout adapted from the reMarkable kernel tree's
//! `include/uapi/linux/mxcfb.h`.

use super::{Panel, UpdateData};
use crate::error::CoreError;
use crate::geometry::ScreenGeometry;
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::Path;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
struct MxcfbRect {
    top: u32,
    left: u32,
    width: u32,
    height: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
struct MxcfbAltBufferData {
    phys_addr: u32,
    width: u32,
    height: u32,
    alt_update_region: MxcfbRect,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
struct MxcfbUpdateData {
    update_region: MxcfbRect,
    waveform_mode: u32,
    update_mode: u32,
    update_marker: u32,
    temp: i32,
    flags: u32,
    dither_mode: i32,
    quant_bit: i32,
    alt_buffer_data: MxcfbAltBufferData,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
struct MxcfbUpdateMarkerData {
    update_marker: u32,
    collision_test: u32,
}

/// Ambient display temperature expected by the panel firmware.
const TEMP_NORMAL: i32 = 0x18;

nix::ioctl_write_ptr!(mxcfb_send_update, b'F', 0x2E, MxcfbUpdateData);
nix::ioctl_readwrite!(mxcfb_wait_for_update_complete, b'F', 0x2F, MxcfbUpdateMarkerData);

/// Panel backend for the first hardware family, which exposes the mxcfb
/// ioctls directly on the kernel framebuffer device.
pub struct MxcfbPanel {
    file: File,
    mmap: MmapMut,
    geometry: ScreenGeometry,
}

impl MxcfbPanel {
    /// Opens and memory-maps `path` (typically `/dev/fb0`).
    pub fn open(path: &Path, geometry: ScreenGeometry) -> Result<Self, CoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| CoreError::DeviceOpen {
                device: "panel",
                path: path.to_path_buf(),
                source,
            })?;
        let mmap = unsafe {
            MmapMut::map_mut(&file).map_err(|source| CoreError::DeviceOpen {
                device: "panel",
                path: path.to_path_buf(),
                source,
            })?
        };
        Ok(Self {
            file,
            mmap,
            geometry,
        })
    }
}

impl Panel for MxcfbPanel {
    fn framebuffer(&mut self) -> &mut [u8] {
        &mut self.mmap[..]
    }

    fn stride(&self) -> u32 {
        self.geometry.stride()
    }

    fn submit(&mut self, update: &UpdateData) -> Result<(), CoreError> {
        let payload = MxcfbUpdateData {
            update_region: MxcfbRect {
                top: update.rect.y,
                left: update.rect.x,
                width: update.rect.w,
                height: update.rect.h,
            },
            waveform_mode: update.waveform as u32,
            update_mode: update.mode as u32,
            update_marker: u32::from(update.marker),
            temp: TEMP_NORMAL,
            flags: 0,
            dither_mode: 0,
            quant_bit: 0,
            alt_buffer_data: MxcfbAltBufferData::default(),
        };

        // Safety: `payload` is a valid, fully-initialized mxcfb_update_data
        // and the fd stays open for the duration of the call.
        unsafe { mxcfb_send_update(self.file.as_raw_fd(), &payload) }
            .map_err(CoreError::PanelIo)?;

        if update.mode == super::UpdateMode::Full {
            let mut marker_data = MxcfbUpdateMarkerData {
                update_marker: u32::from(update.marker),
                collision_test: 0,
            };
            // Safety: same as above.
            unsafe { mxcfb_wait_for_update_complete(self.file.as_raw_fd(), &mut marker_data) }
                .map_err(CoreError::PanelIo)?;
        }

        Ok(())
    }
}
