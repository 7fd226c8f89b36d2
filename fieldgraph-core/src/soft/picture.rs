// PICTURE - planar working representation for the software engine
//
// Every supported pixel format is split into one tightly packed plane per
// component (Y/U/V or R/G/B/A), each at its own subsampled size. Filters work
// plane by plane; the engine packs back into the native layout at the sink.

use crate::engine::{EngineError, EngineFrame, EngineResult};
use crate::format::PixelFormat;
use crate::planner::ScaleAlgorithm;

use super::resample;

// ============================================================================
// Plane
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl Plane {
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, 0)
    }

    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        &mut self.data[y * self.width..(y + 1) * self.width]
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// Copy row `from` over row `to`.
    pub fn copy_row(&mut self, from: usize, to: usize) {
        let w = self.width;
        self.data.copy_within(from * w..(from + 1) * w, to * w);
    }

    /// Rows of one field: `parity` 0 is the top field (even rows).
    pub fn field(&self, parity: usize) -> Plane {
        let rows: Vec<usize> = (parity..self.height).step_by(2).collect();
        let mut out = Plane::new(self.width, rows.len());
        for (dst, &src) in rows.iter().enumerate() {
            out.row_mut(dst).copy_from_slice(self.row(src));
        }
        out
    }

    /// Weave two fields back into one plane of `height` rows.
    pub fn weave(top: &Plane, bottom: &Plane, height: usize) -> Plane {
        let mut out = Plane::new(top.width, height);
        for y in 0..height {
            let (field, row) = if y % 2 == 0 { (top, y / 2) } else { (bottom, y / 2) };
            let row = row.min(field.height.saturating_sub(1));
            out.row_mut(y).copy_from_slice(field.row(row));
        }
        out
    }
}

// ============================================================================
// Picture
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Picture {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub pts: i64,
    pub interlaced: bool,
    pub top_field_first: bool,
    pub planes: Vec<Plane>,
}

impl Picture {
    /// Blank picture; YUV chroma is mid-grey so it reads as black.
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        let planes = (0..format.components())
            .map(|i| {
                let (w, h) = format.component_size(i, width, height);
                let fill = if format.is_yuv() && i > 0 { 128 } else { 0 };
                Plane::filled(w as usize, h as usize, fill)
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

    /// Same metadata, different planes and geometry.
    pub fn with_planes(&self, width: u32, height: u32, planes: Vec<Plane>) -> Self {
        Self {
            format: self.format,
            width,
            height,
            pts: self.pts,
            interlaced: self.interlaced,
            top_field_first: self.top_field_first,
            planes,
        }
    }

    pub fn from_frame(frame: &EngineFrame) -> EngineResult<Self> {
        let mut pic = Picture::new(frame.format, frame.width, frame.height);
        pic.pts = frame.pts;
        pic.interlaced = frame.interlaced;
        pic.top_field_first = frame.top_field_first;

        let (w, h) = (frame.width as usize, frame.height as usize);
        let expected = frame.format.plane_layout(frame.width, frame.height).len();
        if frame.planes.len() != expected {
            return Err(EngineError::InvalidArgument(format!(
                "{} frame has {} planes, expected {}",
                frame.format,
                frame.planes.len(),
                expected
            )));
        }

        match frame.format {
            PixelFormat::Rgb24 | PixelFormat::Rgba => {
                let n = frame.format.components();
                for y in 0..h {
                    let src = frame.planes[0].row(y);
                    for x in 0..w {
                        for c in 0..n {
                            pic.planes[c].data[y * w + x] = src[x * n + c];
                        }
                    }
                }
            }
            PixelFormat::Yuyv422 => {
                let cw = pic.planes[1].width;
                for y in 0..h {
                    let src = frame.planes[0].row(y);
                    for pair in 0..cw {
                        let px = &src[pair * 4..pair * 4 + 4];
                        pic.planes[0].data[y * w + pair * 2] = px[0];
                        if pair * 2 + 1 < w {
                            pic.planes[0].data[y * w + pair * 2 + 1] = px[2];
                        }
                        pic.planes[1].data[y * cw + pair] = px[1];
                        pic.planes[2].data[y * cw + pair] = px[3];
                    }
                }
            }
            PixelFormat::Yuv420p | PixelFormat::Yuv444p => {
                for (plane, src) in pic.planes.iter_mut().zip(&frame.planes) {
                    for y in 0..plane.height {
                        plane.row_mut(y).copy_from_slice(src.row(y));
                    }
                }
            }
        }
        Ok(pic)
    }

    /// Pack into an engine frame with strides aligned to `align`.
    pub fn to_frame(&self, align: usize) -> EngineFrame {
        let mut frame = EngineFrame::alloc(self.format, self.width, self.height, align);
        frame.pts = self.pts;
        frame.interlaced = self.interlaced;
        frame.top_field_first = self.top_field_first;

        let (w, h) = (self.width as usize, self.height as usize);
        match self.format {
            PixelFormat::Rgb24 | PixelFormat::Rgba => {
                let n = self.format.components();
                for y in 0..h {
                    let dst = frame.planes[0].row_mut(y);
                    for x in 0..w {
                        for c in 0..n {
                            dst[x * n + c] = self.planes[c].data[y * w + x];
                        }
                    }
                }
            }
            PixelFormat::Yuyv422 => {
                let cw = self.planes[1].width;
                for y in 0..h {
                    let dst = frame.planes[0].row_mut(y);
                    for pair in 0..cw {
                        let x0 = pair * 2;
                        let x1 = (x0 + 1).min(w - 1);
                        dst[pair * 4] = self.planes[0].data[y * w + x0];
                        dst[pair * 4 + 1] = self.planes[1].data[y * cw + pair];
                        dst[pair * 4 + 2] = self.planes[0].data[y * w + x1];
                        dst[pair * 4 + 3] = self.planes[2].data[y * cw + pair];
                    }
                }
            }
            PixelFormat::Yuv420p | PixelFormat::Yuv444p => {
                for (plane, dst) in self.planes.iter().zip(frame.planes.iter_mut()) {
                    for y in 0..plane.height {
                        dst.row_mut(y).copy_from_slice(plane.row(y));
                    }
                }
            }
        }
        frame
    }

    /// Convert to `target`, resampling chroma with `algorithm`.
    pub fn convert(self, target: PixelFormat, algorithm: ScaleAlgorithm) -> Picture {
        if self.format == target {
            return self;
        }

        match (self.format.is_yuv(), target.is_yuv()) {
            (true, true) => self.resample_chroma(target, algorithm),
            (false, false) => self.with_alpha(target),
            (true, false) => {
                let full = self.resample_chroma(PixelFormat::Yuv444p, algorithm);
                full.yuv444_to_rgb(target)
            }
            (false, true) => {
                let full = self.rgb_to_yuv444();
                full.resample_chroma(target, algorithm)
            }
        }
    }

    fn resample_chroma(self, target: PixelFormat, algorithm: ScaleAlgorithm) -> Picture {
        let mut planes = Vec::with_capacity(3);
        for (i, plane) in self.planes.iter().enumerate().take(3) {
            let (w, h) = target.component_size(i, self.width, self.height);
            planes.push(resample::resample(plane, w as usize, h as usize, algorithm));
        }
        let mut out = self.with_planes(self.width, self.height, planes);
        out.format = target;
        out
    }

    fn with_alpha(self, target: PixelFormat) -> Picture {
        let mut planes = self.planes.clone();
        if target.has_alpha() && planes.len() == 3 {
            planes.push(Plane::filled(self.width as usize, self.height as usize, 255));
        } else if !target.has_alpha() {
            planes.truncate(3);
        }
        let mut out = self.with_planes(self.width, self.height, planes);
        out.format = target;
        out
    }

    fn yuv444_to_rgb(self, target: PixelFormat) -> Picture {
        let matrix = ColorMatrix::bt601();
        let n = self.planes[0].data.len();
        let mut r = vec![0u8; n];
        let mut g = vec![0u8; n];
        let mut b = vec![0u8; n];
        for i in 0..n {
            let (pr, pg, pb) = matrix.to_rgb(
                self.planes[0].data[i],
                self.planes[1].data[i],
                self.planes[2].data[i],
            );
            r[i] = pr;
            g[i] = pg;
            b[i] = pb;
        }

        let (w, h) = (self.width as usize, self.height as usize);
        let mut planes = vec![
            Plane { width: w, height: h, data: r },
            Plane { width: w, height: h, data: g },
            Plane { width: w, height: h, data: b },
        ];
        if target.has_alpha() {
            planes.push(Plane::filled(w, h, 255));
        }
        let mut out = self.with_planes(self.width, self.height, planes);
        out.format = target;
        out
    }

    fn rgb_to_yuv444(self) -> Picture {
        let matrix = ColorMatrix::bt601();
        let n = self.planes[0].data.len();
        let mut y = vec![0u8; n];
        let mut u = vec![0u8; n];
        let mut v = vec![0u8; n];
        for i in 0..n {
            let (py, pu, pv) = matrix.to_yuv(
                self.planes[0].data[i],
                self.planes[1].data[i],
                self.planes[2].data[i],
            );
            y[i] = py;
            u[i] = pu;
            v[i] = pv;
        }

        let (w, h) = (self.width as usize, self.height as usize);
        let planes = vec![
            Plane { width: w, height: h, data: y },
            Plane { width: w, height: h, data: u },
            Plane { width: w, height: h, data: v },
        ];
        let mut out = self.with_planes(self.width, self.height, planes);
        out.format = PixelFormat::Yuv444p;
        out
    }
}

// ============================================================================
// Colour Matrix
// ============================================================================

/// Limited-range YUV <-> RGB with fixed-point lookup tables.
struct ColorMatrix {
    y_table: [i32; 256],
    u_table_g: [i32; 256],
    u_table_b: [i32; 256],
    v_table_r: [i32; 256],
    v_table_g: [i32; 256],
    wr: f32,
    wb: f32,
}

impl ColorMatrix {
    fn bt601() -> Self {
        Self::from_coefficients(0.299, 0.114)
    }

    fn from_coefficients(wr: f32, wb: f32) -> Self {
        let wg = 1.0 - wr - wb;
        // R = Y + 2(1-Wr)Cr, G = Y - 2Wb(1-Wb)/Wg Cb - 2Wr(1-Wr)/Wg Cr,
        // B = Y + 2(1-Wb)Cb; chroma is stretched from 224 to 255 steps.
        let chroma = 255.0 / 224.0;
        let cr_r = 2.0 * (1.0 - wr) * chroma;
        let cb_g = -2.0 * wb * (1.0 - wb) / wg * chroma;
        let cr_g = -2.0 * wr * (1.0 - wr) / wg * chroma;
        let cb_b = 2.0 * (1.0 - wb) * chroma;

        let mut m = Self {
            y_table: [0; 256],
            u_table_g: [0; 256],
            u_table_b: [0; 256],
            v_table_r: [0; 256],
            v_table_g: [0; 256],
            wr,
            wb,
        };
        for i in 0..256 {
            let y = i as i32 - 16;
            let uv = i as f32 - 128.0;
            m.y_table[i] = y * 298; // 255/219 in 8.8 fixed point
            m.u_table_g[i] = (uv * cb_g * 256.0).round() as i32;
            m.u_table_b[i] = (uv * cb_b * 256.0).round() as i32;
            m.v_table_r[i] = (uv * cr_r * 256.0).round() as i32;
            m.v_table_g[i] = (uv * cr_g * 256.0).round() as i32;
        }
        m
    }

    #[inline]
    fn to_rgb(&self, y: u8, u: u8, v: u8) -> (u8, u8, u8) {
        let yc = self.y_table[y as usize];
        let r = (yc + self.v_table_r[v as usize] + 128) >> 8;
        let g = (yc + self.u_table_g[u as usize] + self.v_table_g[v as usize] + 128) >> 8;
        let b = (yc + self.u_table_b[u as usize] + 128) >> 8;
        (clamp_u8(r), clamp_u8(g), clamp_u8(b))
    }

    #[inline]
    fn to_yuv(&self, r: u8, g: u8, b: u8) -> (u8, u8, u8) {
        let (r, g, b) = (r as f32, g as f32, b as f32);
        let wg = 1.0 - self.wr - self.wb;
        let luma = self.wr * r + wg * g + self.wb * b;
        let y = 16.0 + luma * 219.0 / 255.0;
        let u = 128.0 + (b - luma) / (2.0 * (1.0 - self.wb)) * 224.0 / 255.0;
        let v = 128.0 + (r - luma) / (2.0 * (1.0 - self.wr)) * 224.0 / 255.0;
        (
            clamp_u8(y.round() as i32),
            clamp_u8(u.round() as i32),
            clamp_u8(v.round() as i32),
        )
    }
}

#[inline]
fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}
