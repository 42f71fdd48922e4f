//! Alternate panel backend for the second hardware family, which shares a
//! memory region with the display driver and is driven over a SysV message
//! queue instead of an ioctl.

use super::{Panel, UpdateData};
use crate::error::CoreError;
use crate::geometry::ScreenGeometry;
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Message type tag the display driver expects on the queue.
const UPDATE_MSG_TYPE: libc::c_long = 1;

#[repr(C)]
struct QueueMessage {
    mtype: libc::c_long,
    waveform_mode: u32,
    update_mode: u32,
    marker: u32,
    top: u32,
    left: u32,
    width: u32,
    height: u32,
}

/// Panel backend speaking the shared-memory + message-queue protocol.
pub struct QueuePanel {
    _shm_file: File,
    mmap: MmapMut,
    geometry: ScreenGeometry,
    msg_queue_id: libc::c_int,
}

impl QueuePanel {
    /// Opens the shared memory file at `shm_path` and the message queue
    /// identified by `queue_key`.
    pub fn open(
        shm_path: &Path,
        queue_key: libc::key_t,
        geometry: ScreenGeometry,
    ) -> Result<Self, CoreError> {
        let shm_file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(shm_path)
            .map_err(|source| CoreError::DeviceOpen {
                device: "panel",
                path: shm_path.to_path_buf(),
                source,
            })?;
        let mmap = unsafe {
            MmapMut::map_mut(&shm_file).map_err(|source| CoreError::DeviceOpen {
                device: "panel",
                path: shm_path.to_path_buf(),
                source,
            })?
        };

        // Safety: queue_key is a valid SysV IPC key; msgget only reads it.
        let msg_queue_id = unsafe { libc::msgget(queue_key, 0o666) };
        if msg_queue_id == -1 {
            return Err(CoreError::DeviceOpen {
                device: "panel",
                path: shm_path.to_path_buf(),
                source: io::Error::last_os_error(),
            });
        }

        Ok(Self {
            _shm_file: shm_file,
            mmap,
            geometry,
            msg_queue_id,
        })
    }
}

impl Panel for QueuePanel {
    fn framebuffer(&mut self) -> &mut [u8] {
        &mut self.mmap[..]
    }

    fn stride(&self) -> u32 {
        self.geometry.stride()
    }

    fn submit(&mut self, update: &UpdateData) -> Result<(), CoreError> {
        let message = QueueMessage {
            mtype: UPDATE_MSG_TYPE,
            waveform_mode: update.waveform as u32,
            update_mode: update.mode as u32,
            marker: u32::from(update.marker),
            top: update.rect.y,
            left: update.rect.x,
            width: update.rect.w,
            height: update.rect.h,
        };

        // Safety: `message` starts with a valid `mtype` long as required by
        // msgsnd, and its size is passed excluding that leading field.
        let ret = unsafe {
            libc::msgsnd(
                self.msg_queue_id,
                std::ptr::addr_of!(message).cast(),
                std::mem::size_of::<QueueMessage>() - std::mem::size_of::<libc::c_long>(),
                0,
            )
        };
        if ret == -1 {
            return Err(CoreError::PanelIo(nix::Error::last()));
        }
        Ok(())
    }
}
