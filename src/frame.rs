use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Pixel layouts delivered by capture sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Semi-planar YUV 4:2:0 in one packed buffer (luma then interleaved VU)
    Nv21,
    /// YUV 4:2:0 as three planes with their own row and pixel strides
    Yuv420,
}

/// One image plane as handed over by the camera
#[derive(Debug, Clone)]
pub struct Plane {
    pub data: Bytes,
    /// Bytes between the starts of two consecutive rows
    pub row_stride: u32,
    /// Bytes between two consecutive samples of a row
    pub pixel_stride: u32,
}

impl Plane {
    pub fn new(data: impl Into<Bytes>, row_stride: u32, pixel_stride: u32) -> Self {
        Self {
            data: data.into(),
            row_stride,
            pixel_stride,
        }
    }
}

/// Pixel storage of a captured frame
#[derive(Debug, Clone)]
pub enum FrameBuffer {
    /// Single packed buffer whose row stride equals the frame width
    Packed(Bytes),
    /// Separate luma and chroma planes
    Planar { y: Plane, u: Plane, v: Plane },
}

/// Immutable snapshot of one camera callback delivery
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Capture sequence number assigned by the source
    pub sequence: u64,
    /// Timestamp when the frame was captured
    pub timestamp: SystemTime,
    pub format: PixelFormat,
    /// Logical width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    pub buffer: FrameBuffer,
}

impl RawFrame {
    /// Create a frame from a single packed NV21 buffer
    pub fn packed(sequence: u64, width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            timestamp: SystemTime::now(),
            format: PixelFormat::Nv21,
            width,
            height,
            buffer: FrameBuffer::Packed(data.into()),
        }
    }

    /// Create a frame from three YUV 4:2:0 planes
    pub fn planar(sequence: u64, width: u32, height: u32, y: Plane, u: Plane, v: Plane) -> Self {
        Self {
            sequence,
            timestamp: SystemTime::now(),
            format: PixelFormat::Yuv420,
            width,
            height,
            buffer: FrameBuffer::Planar { y, u, v },
        }
    }

    /// Row stride of the luma data
    pub fn row_stride(&self) -> u32 {
        match &self.buffer {
            FrameBuffer::Packed(_) => self.width,
            FrameBuffer::Planar { y, .. } => y.row_stride,
        }
    }

    /// Total bytes held by all planes
    pub fn byte_len(&self) -> usize {
        match &self.buffer {
            FrameBuffer::Packed(data) => data.len(),
            FrameBuffer::Planar { y, u, v } => y.data.len() + u.data.len() + v.data.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_frame() {
        let frame = RawFrame::packed(7, 640, 480, vec![0u8; 640 * 480 * 3 / 2]);

        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.format, PixelFormat::Nv21);
        assert_eq!(frame.row_stride(), 640);
        assert_eq!(frame.byte_len(), 640 * 480 * 3 / 2);
    }

    #[test]
    fn test_planar_frame_uses_luma_stride() {
        let y = Plane::new(vec![0u8; 704 * 480], 704, 1);
        let u = Plane::new(vec![0u8; 704 * 240 - 1], 704, 2);
        let v = Plane::new(vec![0u8; 704 * 240 - 1], 704, 2);
        let frame = RawFrame::planar(1, 640, 480, y, u, v);

        assert_eq!(frame.format, PixelFormat::Yuv420);
        assert_eq!(frame.row_stride(), 704);
        assert_eq!(frame.byte_len(), 704 * 480 + 2 * (704 * 240 - 1));
    }
}
