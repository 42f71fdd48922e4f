//! Minimal RFB (VNC) client: version handshake, security negotiation,
//! `SetPixelFormat`/`SetEncodings`, `FramebufferUpdate` decoding (Raw and
//! CopyRect), and `PointerEvent` sending.
//!
//! Authentication UX and reconnection are explicit non-goals of this
//! client: security type `None` is supported fully; a server that demands
//! VNC authentication is reported as a handshake failure rather than
//! prompted for a password.

mod protocol;

use crate::error::CoreError;
use crate::geometry::{PixelFormat, ScreenGeometry};
use crate::pointer::PointerButton;
use crate::rfb::RfbSession;
use protocol::{
    ClientInit, FramebufferUpdateRequest, PointerEvent, SecurityResult, ServerInit, SetEncodings,
    SetPixelFormat, CLIENT_VERSION, COPY_RECT_ENCODING, RAW_ENCODING, SECURITY_NONE,
};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};

/// A live RFB connection, writing decoded framebuffer contents directly into
/// the panel's memory-mapped buffer.
pub struct TcpRfbSession {
    stream: TcpStream,
    framebuffer: *mut u8,
    framebuffer_len: usize,
    stride: u32,
    bytes_per_pixel: u32,
    geometry: ScreenGeometry,
    read_buf: Vec<u8>,
}

// Safety: the raw pointer only ever aliases the panel's own mmap, which this
// struct does not own; the panel outlives the session for the lifetime of
// the event loop. No other thread touches it: this client is single
// threaded.
unsafe impl Send for TcpRfbSession {}

impl TcpRfbSession {
    /// Connects to `host:port`, performs the RFB handshake, and negotiates
    /// `format`/`geometry` with the server. `framebuffer` must stay valid and
    /// at least `geometry.buffer_len()` bytes for the lifetime of the
    /// session; updates are written directly into it to avoid a copy.
    pub fn connect(
        host: &str,
        port: u16,
        format: PixelFormat,
        geometry: ScreenGeometry,
        framebuffer: &mut [u8],
    ) -> Result<Self, CoreError> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| CoreError::ProtocolInit(format!("invalid address {host}:{port}: {e}")))?
            .next()
            .ok_or_else(|| CoreError::ProtocolInit(format!("no address found for {host}")))?;

        let stream = TcpStream::connect(addr)
            .map_err(|e| CoreError::ProtocolInit(format!("connect to {addr}: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| CoreError::ProtocolInit(format!("set_nodelay: {e}")))?;

        let mut session = Self {
            stream,
            framebuffer: framebuffer.as_mut_ptr(),
            framebuffer_len: framebuffer.len(),
            stride: geometry.stride(),
            bytes_per_pixel: format.bytes_per_pixel(),
            geometry,
            read_buf: Vec::new(),
        };

        session.handshake_version()?;
        session.handshake_security()?;
        session.client_init()?;
        let server_init = session.read_server_init()?;

        if u32::from(server_init.width) != geometry.xres_mem
            || u32::from(server_init.height) > geometry.yres_mem
        {
            return Err(CoreError::UnsupportedServerGeometry {
                server_w: server_init.width,
                server_h: server_init.height,
                panel_w: geometry.xres_mem,
                panel_h: geometry.yres_mem,
            });
        }

        session.send_set_pixel_format(format)?;
        session.send_set_encodings()?;
        session.send_framebuffer_update_request(false, &geometry)?;

        session
            .stream
            .set_nonblocking(true)
            .map_err(|e| CoreError::ProtocolInit(format!("set_nonblocking: {e}")))?;

        Ok(session)
    }

    fn handshake_version(&mut self) -> Result<(), CoreError> {
        let mut server_version = [0u8; 12];
        self.stream
            .read_exact(&mut server_version)
            .map_err(|e| CoreError::ProtocolInit(format!("reading server version: {e}")))?;
        self.stream
            .write_all(CLIENT_VERSION)
            .map_err(|e| CoreError::ProtocolInit(format!("sending client version: {e}")))?;
        Ok(())
    }

    fn handshake_security(&mut self) -> Result<(), CoreError> {
        let mut count = [0u8; 1];
        self.stream
            .read_exact(&mut count)
            .map_err(|e| CoreError::ProtocolInit(format!("reading security count: {e}")))?;
        let count = count[0] as usize;
        if count == 0 {
            let reason = self.read_string()?;
            return Err(CoreError::ProtocolInit(format!(
                "server rejected connection: {reason}"
            )));
        }

        let mut types = vec![0u8; count];
        self.stream
            .read_exact(&mut types)
            .map_err(|e| CoreError::ProtocolInit(format!("reading security types: {e}")))?;

        if !types.contains(&SECURITY_NONE) {
            return Err(CoreError::ProtocolInit(
                "server requires an authentication scheme this client does not support"
                    .to_string(),
            ));
        }

        self.stream
            .write_all(&[SECURITY_NONE])
            .map_err(|e| CoreError::ProtocolInit(format!("selecting security type: {e}")))?;

        let mut result = [0u8; 4];
        self.stream
            .read_exact(&mut result)
            .map_err(|e| CoreError::ProtocolInit(format!("reading security result: {e}")))?;
        if u32::from_be_bytes(result) != SecurityResult::Ok as u32 {
            let reason = self.read_string()?;
            return Err(CoreError::ProtocolInit(format!(
                "security handshake failed: {reason}"
            )));
        }
        Ok(())
    }

    fn read_string(&mut self) -> Result<String, CoreError> {
        let mut len = [0u8; 4];
        self.stream
            .read_exact(&mut len)
            .map_err(|e| CoreError::ProtocolInit(format!("reading string length: {e}")))?;
        let len = u32::from_be_bytes(len) as usize;
        let mut buf = vec![0u8; len];
        self.stream
            .read_exact(&mut buf)
            .map_err(|e| CoreError::ProtocolInit(format!("reading string: {e}")))?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn client_init(&mut self) -> Result<(), CoreError> {
        let init = ClientInit { shared: 1 };
        self.stream
            .write_all(&init.to_bytes())
            .map_err(|e| CoreError::ProtocolInit(format!("sending ClientInit: {e}")))?;
        Ok(())
    }

    fn read_server_init(&mut self) -> Result<ServerInit, CoreError> {
        let mut header = [0u8; ServerInit::FIXED_LEN];
        self.stream
            .read_exact(&mut header)
            .map_err(|e| CoreError::ProtocolInit(format!("reading ServerInit: {e}")))?;
        let name_len = u32::from_be_bytes(header[20..24].try_into().unwrap()) as usize;
        let mut name = vec![0u8; name_len];
        self.stream
            .read_exact(&mut name)
            .map_err(|e| CoreError::ProtocolInit(format!("reading server name: {e}")))?;
        Ok(ServerInit::from_header(&header))
    }

    fn send_set_pixel_format(&mut self, format: PixelFormat) -> Result<(), CoreError> {
        let message = SetPixelFormat::from(format);
        self.stream
            .write_all(&message.to_bytes())
            .map_err(|e| CoreError::ProtocolInit(format!("sending SetPixelFormat: {e}")))?;
        Ok(())
    }

    fn send_set_encodings(&mut self) -> Result<(), CoreError> {
        let message = SetEncodings {
            encodings: vec![RAW_ENCODING, COPY_RECT_ENCODING],
        };
        self.stream
            .write_all(&message.to_bytes())
            .map_err(|e| CoreError::ProtocolInit(format!("sending SetEncodings: {e}")))?;
        Ok(())
    }

    fn send_framebuffer_update_request(
        &mut self,
        incremental: bool,
        geometry: &ScreenGeometry,
    ) -> Result<(), CoreError> {
        let message = FramebufferUpdateRequest {
            incremental: u8::from(incremental),
            x: 0,
            y: 0,
            w: geometry.xres_mem as u16,
            h: geometry.yres_mem as u16,
        };
        self.stream
            .write_all(&message.to_bytes())
            .map_err(|e| CoreError::ProtocolInit(format!("sending FramebufferUpdateRequest: {e}")))?;
        Ok(())
    }

    /// Framebuffer contents, as a mutable slice. Only used by callers (the
    /// panel initializer) that need to zero it ahead of the first update.
    ///
    /// # Safety
    /// The caller must not hold this slice across a call that also touches
    /// the framebuffer through `self` (e.g. `poll_update`).
    unsafe fn framebuffer_mut(&mut self) -> &mut [u8] {
        std::slice::from_raw_parts_mut(self.framebuffer, self.framebuffer_len)
    }

    fn read_exact_buffered(&mut self, len: usize) -> io::Result<()> {
        self.read_buf.resize(len, 0);
        self.stream.read_exact(&mut self.read_buf)
    }
}

impl RfbSession for TcpRfbSession {
    fn socket_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    fn poll_update(&mut self) -> Result<Option<(i32, i32, i32, i32)>, CoreError> {
        let mut header = [0u8; 1];
        match self.stream.read(&mut header) {
            Ok(0) => return Err(CoreError::ConnectionClosed),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(CoreError::ProtocolInit(format!("reading message type: {e}"))),
        }

        // Only FramebufferUpdate (0) is expected once the loop is running;
        // ServerCutText/Bell are swallowed since clipboard/audio are
        // explicit non-goals.
        if header[0] != protocol::SERVER_FRAMEBUFFER_UPDATE {
            return Ok(None);
        }

        let mut rest = [0u8; 3];
        self.stream
            .read_exact(&mut rest)
            .map_err(|e| CoreError::ProtocolInit(format!("reading update header: {e}")))?;
        let rect_count = u16::from_be_bytes([rest[1], rest[2]]);

        let mut bounding: Option<(i32, i32, i32, i32)> = None;
        for _ in 0..rect_count {
            let (x, y, w, h) = self.read_rect()?;
            bounding = Some(match bounding {
                None => (x, y, w, h),
                Some((bx, by, bw, bh)) => {
                    let x0 = bx.min(x);
                    let y0 = by.min(y);
                    let x1 = (bx + bw).max(x + w);
                    let y1 = (by + bh).max(y + h);
                    (x0, y0, x1 - x0, y1 - y0)
                }
            });
        }

        // RFB is client-pull: the server sends nothing further until asked
        // again. Re-request immediately so the mirror keeps moving.
        let geometry = self.geometry;
        self.send_framebuffer_update_request(true, &geometry)?;

        Ok(bounding)
    }

    fn send_pointer_event(&mut self, x: i32, y: i32, mask: PointerButton) {
        let message = PointerEvent {
            mask: mask.bits(),
            x: x.clamp(0, i32::from(u16::MAX)) as u16,
            y: y.clamp(0, i32::from(u16::MAX)) as u16,
        };
        // A send failure here surfaces on the next poll_update as a closed
        // connection; retrying synchronously would block the event loop.
        let _ = self.stream.write_all(&message.to_bytes());
    }
}

impl TcpRfbSession {
    fn read_rect(&mut self) -> Result<(i32, i32, i32, i32), CoreError> {
        let mut header = [0u8; 12];
        self.stream
            .read_exact(&mut header)
            .map_err(|e| CoreError::ProtocolInit(format!("reading rectangle header: {e}")))?;
        let x = u16::from_be_bytes([header[0], header[1]]);
        let y = u16::from_be_bytes([header[2], header[3]]);
        let w = u16::from_be_bytes([header[4], header[5]]);
        let h = u16::from_be_bytes([header[6], header[7]]);
        let encoding = i32::from_be_bytes(header[8..12].try_into().unwrap());

        match encoding {
            RAW_ENCODING => self.read_raw_rect(x, y, w, h)?,
            COPY_RECT_ENCODING => self.read_copy_rect(x, y, w, h)?,
            other => {
                return Err(CoreError::ProtocolInit(format!(
                    "server sent unsupported encoding {other}"
                )))
            }
        }

        Ok((i32::from(x), i32::from(y), i32::from(w), i32::from(h)))
    }

    fn read_raw_rect(&mut self, x: u16, y: u16, w: u16, h: u16) -> Result<(), CoreError> {
        let row_bytes = usize::from(w) * self.bytes_per_pixel as usize;
        self.read_exact_buffered(row_bytes * usize::from(h))
            .map_err(|e| CoreError::ProtocolInit(format!("reading raw rectangle: {e}")))?;

        let stride = self.stride as usize;
        let bpp = self.bytes_per_pixel as usize;
        // Safety: bounds were validated against the negotiated geometry at
        // connect time; ServerInit geometry matches framebuffer_len.
        let fb = unsafe { self.framebuffer_mut() };
        for row in 0..usize::from(h) {
            let dst_offset = (usize::from(y) + row) * stride + usize::from(x) * bpp;
            let src_offset = row * row_bytes;
            let dst_end = dst_offset + row_bytes;
            if dst_end > fb.len() {
                break;
            }
            fb[dst_offset..dst_end].copy_from_slice(&self.read_buf[src_offset..src_offset + row_bytes]);
        }
        Ok(())
    }

    fn read_copy_rect(&mut self, x: u16, y: u16, w: u16, h: u16) -> Result<(), CoreError> {
        let mut src = [0u8; 4];
        self.stream
            .read_exact(&mut src)
            .map_err(|e| CoreError::ProtocolInit(format!("reading CopyRect source: {e}")))?;
        let src_x = u16::from_be_bytes([src[0], src[1]]);
        let src_y = u16::from_be_bytes([src[2], src[3]]);

        let stride = self.stride as usize;
        let bpp = self.bytes_per_pixel as usize;
        let row_bytes = usize::from(w) * bpp;

        // Safety: same bound guarantee as read_raw_rect.
        let fb = unsafe { self.framebuffer_mut() };
        for row in 0..usize::from(h) {
            let src_offset = (usize::from(src_y) + row) * stride + usize::from(src_x) * bpp;
            let dst_offset = (usize::from(y) + row) * stride + usize::from(x) * bpp;
            if src_offset + row_bytes > fb.len() || dst_offset + row_bytes > fb.len() {
                break;
            }
            // CopyRect may overlap; copy through a scratch buffer rather
            // than using copy_within across a raw pointer alias.
            let mut scratch = vec![0u8; row_bytes];
            scratch.copy_from_slice(&fb[src_offset..src_offset + row_bytes]);
            fb[dst_offset..dst_offset + row_bytes].copy_from_slice(&scratch);
        }
        Ok(())
    }
}
