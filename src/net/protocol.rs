//! Wire-format constants and message (de)serialization for the subset of
//! RFC 6143 this client speaks.

use crate::geometry::PixelFormat;

pub const CLIENT_VERSION: &[u8; 12] = b"RFB 003.008\n";

pub const SECURITY_NONE: u8 = 1;

#[repr(u32)]
pub enum SecurityResult {
    Ok = 0,
}

pub const SERVER_FRAMEBUFFER_UPDATE: u8 = 0;

pub const RAW_ENCODING: i32 = 0;
pub const COPY_RECT_ENCODING: i32 = 1;

pub struct ClientInit {
    pub shared: u8,
}

impl ClientInit {
    pub fn to_bytes(&self) -> [u8; 1] {
        [self.shared]
    }
}

/// Fixed-size prefix of ServerInit; the variable-length server name follows
/// and is read separately.
pub struct ServerInit {
    pub width: u16,
    pub height: u16,
}

impl ServerInit {
    pub const FIXED_LEN: usize = 24;

    pub fn from_header(header: &[u8; Self::FIXED_LEN]) -> Self {
        Self {
            width: u16::from_be_bytes([header[0], header[1]]),
            height: u16::from_be_bytes([header[2], header[3]]),
        }
    }
}

pub struct SetPixelFormat {
    pub bits_per_pixel: u8,
    pub red_max: u16,
    pub green_max: u16,
    pub blue_max: u16,
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl From<PixelFormat> for SetPixelFormat {
    fn from(format: PixelFormat) -> Self {
        Self {
            bits_per_pixel: format.bits_per_pixel,
            red_max: format.red.max_value(),
            green_max: format.green.max_value(),
            blue_max: format.blue.max_value(),
            red_shift: format.red.offset,
            green_shift: format.green.offset,
            blue_shift: format.blue.offset,
        }
    }
}

impl SetPixelFormat {
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut buf = [0u8; 20];
        buf[0] = 0; // message-type: SetPixelFormat
        buf[4] = self.bits_per_pixel;
        buf[5] = self.bits_per_pixel; // depth: same as bits-per-pixel for true-color
        buf[6] = 0; // big-endian-flag: false, the wire format below is little-endian
        buf[7] = 1; // true-color-flag
        buf[8..10].copy_from_slice(&self.red_max.to_be_bytes());
        buf[10..12].copy_from_slice(&self.green_max.to_be_bytes());
        buf[12..14].copy_from_slice(&self.blue_max.to_be_bytes());
        buf[14] = self.red_shift;
        buf[15] = self.green_shift;
        buf[16] = self.blue_shift;
        buf
    }
}

pub struct SetEncodings {
    pub encodings: Vec<i32>,
}

impl SetEncodings {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.encodings.len() * 4);
        buf.push(2); // message-type: SetEncodings
        buf.push(0); // padding
        buf.extend_from_slice(&(self.encodings.len() as u16).to_be_bytes());
        for encoding in &self.encodings {
            buf.extend_from_slice(&encoding.to_be_bytes());
        }
        buf
    }
}

pub struct FramebufferUpdateRequest {
    pub incremental: u8,
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
}

impl FramebufferUpdateRequest {
    pub fn to_bytes(&self) -> [u8; 10] {
        let mut buf = [0u8; 10];
        buf[0] = 3; // message-type: FramebufferUpdateRequest
        buf[1] = self.incremental;
        buf[2..4].copy_from_slice(&self.x.to_be_bytes());
        buf[4..6].copy_from_slice(&self.y.to_be_bytes());
        buf[6..8].copy_from_slice(&self.w.to_be_bytes());
        buf[8..10].copy_from_slice(&self.h.to_be_bytes());
        buf
    }
}

pub struct PointerEvent {
    pub mask: u8,
    pub x: u16,
    pub y: u16,
}

impl PointerEvent {
    pub fn to_bytes(&self) -> [u8; 6] {
        let mut buf = [0u8; 6];
        buf[0] = 5; // message-type: PointerEvent
        buf[1] = self.mask;
        buf[2..4].copy_from_slice(&self.x.to_be_bytes());
        buf[4..6].copy_from_slice(&self.y.to_be_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ChannelLayout;

    #[test]
    fn pointer_event_encodes_message_type_five() {
        let event = PointerEvent {
            mask: 0b1,
            x: 300,
            y: 400,
        };
        let bytes = event.to_bytes();
        assert_eq!(bytes[0], 5);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 300);
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), 400);
    }

    #[test]
    fn set_encodings_advertises_raw_and_copy_rect() {
        let message = SetEncodings {
            encodings: vec![RAW_ENCODING, COPY_RECT_ENCODING],
        };
        let bytes = message.to_bytes();
        assert_eq!(bytes[0], 2);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 2);
    }

    #[test]
    fn set_pixel_format_carries_channel_maxima() {
        let format = PixelFormat::new(
            16,
            ChannelLayout {
                offset: 11,
                length: 5,
            },
            ChannelLayout {
                offset: 5,
                length: 6,
            },
            ChannelLayout {
                offset: 0,
                length: 5,
            },
        )
        .unwrap();
        let message = SetPixelFormat::from(format);
        let bytes = message.to_bytes();
        assert_eq!(bytes[4], 16);
        assert_eq!(u16::from_be_bytes([bytes[8], bytes[9]]), 31);
    }
}
