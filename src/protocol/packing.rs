use super::header::WireFrameHeader;
use crate::error::ProtocolError;
use crate::frame::{FrameBuffer, Plane, RawFrame};
use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

/// Lay a captured frame out as the raw wire payload.
///
/// Packed buffers already have the wire layout and are shared without a
/// copy. Planar frames are flattened to the luma plane followed by an
/// interleaved chroma region of `(height / 2) * row_stride` bytes.
pub fn pack_frame(frame: &RawFrame) -> Result<(WireFrameHeader, Bytes), ProtocolError> {
    let header = WireFrameHeader::raw(frame.row_stride(), frame.height, frame.width)?;

    let payload = match &frame.buffer {
        FrameBuffer::Packed(data) => data.clone(),
        FrameBuffer::Planar { y, u, v } => {
            let stride = y.row_stride as usize;
            let chroma = pack_chroma(u, v, stride, frame.width as usize, frame.height as usize);

            let mut payload = BytesMut::with_capacity(y.data.len() + chroma.len());
            payload.put_slice(&y.data);
            payload.put_slice(&chroma);
            payload.freeze()
        }
    };

    trace!(
        "Packed frame {} ({}x{}, stride {}) into {} bytes",
        frame.sequence,
        frame.width,
        frame.height,
        header.row_stride,
        payload.len()
    );

    Ok((
        WireFrameHeader {
            payload_len: payload.len() as u32,
            ..header
        },
        payload,
    ))
}

/// Lay a captured frame out as tightly packed YUV 4:2:0 encoder input:
/// `width * height` luma bytes followed by `width * height / 2` bytes of
/// interleaved chroma, with any row stride padding removed.
pub fn pack_encoder_input(frame: &RawFrame) -> Bytes {
    let (width, height) = (frame.width as usize, frame.height as usize);
    let luma_len = width * height;
    let frame_len = luma_len + luma_len / 2;
    let stride = frame.row_stride() as usize;

    let planar_chroma;
    let (luma, chroma): (&[u8], &[u8]) = match &frame.buffer {
        FrameBuffer::Packed(data) if stride == width && data.len() == frame_len => {
            return data.clone();
        }
        FrameBuffer::Packed(data) => data.split_at((height * stride).min(data.len())),
        FrameBuffer::Planar { y, u, v } => {
            planar_chroma = pack_chroma(u, v, stride, width, height);
            (&y.data[..], &planar_chroma[..])
        }
    };

    let mut input = BytesMut::with_capacity(frame_len);
    put_cropped_rows(&mut input, luma, stride, width, height);
    put_cropped_rows(&mut input, chroma, stride, width, height / 2);
    input.resize(frame_len, 0);

    trace!(
        "Cropped frame {} from stride {} to {} encoder input bytes",
        frame.sequence,
        stride,
        input.len()
    );
    input.freeze()
}

/// Copy the first `width` bytes of each of `rows` rows, zero-filling rows
/// the source is too short for
fn put_cropped_rows(out: &mut BytesMut, src: &[u8], stride: usize, width: usize, rows: usize) {
    for row in 0..rows {
        let available = src
            .get(row * stride..)
            .map(|rest| &rest[..rest.len().min(width)])
            .unwrap_or(&[]);
        out.put_slice(available);
        out.put_bytes(0, width - available.len());
    }
}

fn pack_chroma(u: &Plane, v: &Plane, stride: usize, width: usize, height: usize) -> Vec<u8> {
    let rows = height / 2;
    let mut chroma = vec![0u8; rows * stride];

    if u.pixel_stride == 2 {
        // Semi-planar source: the U plane view already holds interleaved
        // samples, except the last sample of every row which lives one byte
        // past the end of the view and has to be fetched from the V plane.
        let len = u.data.len().min(chroma.len());
        chroma[..len].copy_from_slice(&u.data[..len]);

        if width > 0 {
            for row in 0..rows {
                let index = row * stride + width - 1;
                if index == 0 || index >= chroma.len() {
                    continue;
                }
                if let Some(&sample) = v.data.get(index - 1) {
                    chroma[index] = sample;
                }
            }
        }
    } else {
        // Fully planar source: interleave U and V into the semi-planar layout
        let u_stride = u.row_stride as usize;
        let v_stride = v.row_stride as usize;
        for row in 0..rows {
            for col in 0..width / 2 {
                let out = row * stride + col * 2;
                if out + 1 >= chroma.len() {
                    break;
                }
                chroma[out] = u.data.get(row * u_stride + col).copied().unwrap_or(0);
                chroma[out + 1] = v.data.get(row * v_stride + col).copied().unwrap_or(0);
            }
        }
    }

    chroma
}
