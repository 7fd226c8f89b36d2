use crate::format::PixelFormat;

use super::{EngineError, EngineResult};

/// One memory plane of an engine frame. Rows are `stride` bytes apart, of
/// which the first `row_bytes` carry pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePlane {
    pub data: Vec<u8>,
    pub stride: usize,
    pub row_bytes: usize,
    pub rows: usize,
}

impl FramePlane {
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.row_bytes]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let start = y * self.stride;
        &mut self.data[start..start + self.row_bytes]
    }
}

/// Engine-native video frame with aligned, padded planes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFrame {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub pts: i64,
    pub interlaced: bool,
    pub top_field_first: bool,
    pub planes: Vec<FramePlane>,
}

impl EngineFrame {
    /// Allocate zeroed planes whose strides are multiples of `align`.
    pub fn alloc(format: PixelFormat, width: u32, height: u32, align: usize) -> Self {
        let align = align.max(1);
        let planes = format
            .plane_layout(width, height)
            .into_iter()
            .map(|(row_bytes, rows)| {
                let stride = row_bytes.div_ceil(align) * align;
                FramePlane {
                    data: vec![0u8; stride * rows],
                    stride,
                    row_bytes,
                    rows,
                }
            })
            .collect();

        Self {
            format,
            width,
            height,
            pts: 0,
            interlaced: false,
            top_field_first: false,
            planes,
        }
    }

    /// Tightly packed size of this frame's pixels.
    pub fn buffer_size(&self) -> usize {
        self.format.buffer_size(self.width, self.height)
    }

    /// Copy pixels in from a tightly packed buffer.
    pub fn fill_from(&mut self, src: &[u8]) -> EngineResult<()> {
        let needed = self.buffer_size();
        if src.len() < needed {
            return Err(EngineError::InvalidArgument(format!(
                "source buffer holds {} bytes, {} needed for {}x{} {}",
                src.len(),
                needed,
                self.width,
                self.height,
                self.format
            )));
        }

        let mut offset = 0;
        for plane in &mut self.planes {
            for y in 0..plane.rows {
                let row_bytes = plane.row_bytes;
                plane.row_mut(y).copy_from_slice(&src[offset..offset + row_bytes]);
                offset += row_bytes;
            }
        }
        Ok(())
    }

    /// Copy pixels out into a tightly packed buffer. Returns bytes written.
    pub fn copy_to_buffer(&self, dst: &mut [u8]) -> EngineResult<usize> {
        let needed = self.buffer_size();
        if dst.len() < needed {
            return Err(EngineError::InvalidArgument(format!(
                "destination holds {} bytes, {} needed",
                dst.len(),
                needed
            )));
        }

        let mut offset = 0;
        for plane in &self.planes {
            for y in 0..plane.rows {
                dst[offset..offset + plane.row_bytes].copy_from_slice(plane.row(y));
                offset += plane.row_bytes;
            }
        }
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_are_aligned() {
        let frame = EngineFrame::alloc(PixelFormat::Yuv420p, 33, 17, 32);
        assert_eq!(frame.planes.len(), 3);
        assert_eq!(frame.planes[0].stride, 64);
        assert_eq!(frame.planes[0].row_bytes, 33);
        assert_eq!(frame.planes[1].row_bytes, 17);
        assert_eq!(frame.planes[1].rows, 9);
        assert!(frame.planes.iter().all(|p| p.stride % 32 == 0));
    }

    #[test]
    fn packed_copy_skips_padding() {
        let mut frame = EngineFrame::alloc(PixelFormat::Rgb24, 3, 2, 32);
        let src: Vec<u8> = (0..18).collect();
        frame.fill_from(&src).unwrap();
        assert_eq!(frame.planes[0].data[32], 9);

        let mut out = vec![0u8; 18];
        assert_eq!(frame.copy_to_buffer(&mut out).unwrap(), 18);
        assert_eq!(out, src);
    }

    #[test]
    fn short_buffers_fail() {
        let mut frame = EngineFrame::alloc(PixelFormat::Rgba, 2, 2, 32);
        assert!(frame.fill_from(&[0u8; 15]).is_err());
        assert!(frame.copy_to_buffer(&mut [0u8; 15]).is_err());
    }
}
