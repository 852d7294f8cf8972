use crate::error::{ProtocolError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Fixed header size preceding every video payload
pub const HEADER_LEN: usize = 13;

/// Zero-filled region after every video payload, reserved for per-frame
/// sensor metadata (three vectors of four floats)
pub const SENSOR_PADDING_LEN: usize = 4 * 3 * 4;

/// Payload kind carried in the 2-byte format tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// Uncompressed YUV 4:2:0 (bytes `16, 1` on the wire)
    Raw,
    /// One encoded access unit in Annex-B byte-stream form
    Encoded,
}

impl WireFormat {
    pub fn tag(&self) -> u16 {
        match self {
            WireFormat::Raw => 0x1001,
            WireFormat::Encoded => 0x1002,
        }
    }
}

impl TryFrom<u16> for WireFormat {
    type Error = ProtocolError;

    fn try_from(tag: u16) -> std::result::Result<Self, Self::Error> {
        match tag {
            0x1001 => Ok(WireFormat::Raw),
            0x1002 => Ok(WireFormat::Encoded),
            tag => Err(ProtocolError::UnknownFormat { tag }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireFrameHeader {
    pub format: WireFormat,
    /// Set when the payload is a synchronization point for the receiver
    pub keyframe: bool,
    pub row_stride: u16,
    pub height: u16,
    /// Logical image width, may be smaller than the row stride
    pub width: u16,
    pub payload_len: u32,
}

impl WireFrameHeader {
    /// Header for an uncompressed frame
    pub fn raw(
        row_stride: u32,
        height: u32,
        width: u32,
    ) -> std::result::Result<Self, ProtocolError> {
        Ok(Self {
            format: WireFormat::Raw,
            keyframe: true,
            row_stride: fit_u16("row_stride", row_stride)?,
            height: fit_u16("height", height)?,
            width: fit_u16("width", width)?,
            payload_len: 0,
        })
    }

    /// Header for an encoded access unit
    pub fn encoded(
        width: u32,
        height: u32,
        keyframe: bool,
    ) -> std::result::Result<Self, ProtocolError> {
        Ok(Self {
            format: WireFormat::Encoded,
            keyframe,
            row_stride: fit_u16("row_stride", width)?,
            height: fit_u16("height", height)?,
            width: fit_u16("width", width)?,
            payload_len: 0,
        })
    }

    /// Total bytes of the frame on the wire, header and reserved region included
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.payload_len as usize + SENSOR_PADDING_LEN
    }

    fn parse(buf: &mut impl Buf) -> std::result::Result<Self, ProtocolError> {
        let format = WireFormat::try_from(buf.get_u16())?;
        let keyframe = buf.get_u8() != 0;
        Ok(Self {
            format,
            keyframe,
            row_stride: buf.get_u16(),
            height: buf.get_u16(),
            width: buf.get_u16(),
            payload_len: buf.get_u32(),
        })
    }
}

fn fit_u16(field: &'static str, value: u32) -> std::result::Result<u16, ProtocolError> {
    u16::try_from(value).map_err(|_| ProtocolError::DimensionOverflow { field, value })
}

/// Serialize one video frame. The length field is taken from `payload`.
pub fn encode_video_frame(
    header: &WireFrameHeader,
    payload: &[u8],
) -> std::result::Result<Bytes, ProtocolError> {
    let payload_len = u32::try_from(payload.len())
        .map_err(|_| ProtocolError::PayloadTooLarge { len: payload.len() })?;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len() + SENSOR_PADDING_LEN);
    buf.put_u16(header.format.tag());
    buf.put_u8(header.keyframe as u8);
    buf.put_u16(header.row_stride);
    buf.put_u16(header.height);
    buf.put_u16(header.width);
    buf.put_u32(payload_len);
    buf.put_slice(payload);
    buf.put_bytes(0, SENSOR_PADDING_LEN);

    Ok(buf.freeze())
}

/// Parse one video frame from the front of `buf`
pub fn decode_video_frame(
    mut buf: Bytes,
) -> std::result::Result<(WireFrameHeader, Bytes), ProtocolError> {
    if buf.len() < HEADER_LEN {
        return Err(ProtocolError::Truncated {
            needed: HEADER_LEN,
            available: buf.len(),
        });
    }

    let header = WireFrameHeader::parse(&mut buf)?;
    let remaining = header.payload_len as usize + SENSOR_PADDING_LEN;
    if buf.len() < remaining {
        return Err(ProtocolError::Truncated {
            needed: header.frame_len(),
            available: HEADER_LEN + buf.len(),
        });
    }

    let payload = buf.split_to(header.payload_len as usize);
    Ok((header, payload))
}

/// Read one video frame from a stream (receiver side and tests)
pub async fn read_video_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<(WireFrameHeader, Bytes)> {
    let mut header_bytes = [0u8; HEADER_LEN];
    reader.read_exact(&mut header_bytes).await?;
    let header = WireFrameHeader::parse(&mut &header_bytes[..])?;

    let mut payload = vec![0u8; header.payload_len as usize];
    reader.read_exact(&mut payload).await?;

    let mut padding = [0u8; SENSOR_PADDING_LEN];
    reader.read_exact(&mut padding).await?;

    Ok((header, Bytes::from(payload)))
}
