use crate::engine::{EngineError, EngineResult};
use crate::soft::chain::FilterOptions;
use crate::soft::picture::{Picture, Plane};

use super::{LinkProps, VideoFilter};

/// `crop=w:h:x:y[:exact]`. Missing size keeps the input size, missing offsets
/// centre the window. Unless `exact=1`, offsets are rounded down to the
/// chroma grid.
pub struct Crop {
    width: Option<u32>,
    height: Option<u32>,
    x: Option<u32>,
    y: Option<u32>,
    exact: bool,
    window: Option<(u32, u32, u32, u32)>,
}

impl Crop {
    pub const OPTIONS: &'static [&'static str] = &["w", "h", "x", "y", "exact"];

    pub fn new(width: u32, height: u32, x: u32, y: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            x: Some(x),
            y: Some(y),
            exact: false,
            window: None,
        }
    }

    pub fn from_options(opts: &FilterOptions) -> EngineResult<Self> {
        let dim = |key: &str| -> EngineResult<Option<u32>> {
            match opts.get_i64(key)? {
                None => Ok(None),
                Some(v) if v >= 0 && v <= u32::MAX as i64 => Ok(Some(v as u32)),
                Some(v) => Err(EngineError::InvalidArgument(format!("crop: {} out of range: {}", key, v))),
            }
        };
        Ok(Self {
            width: dim("w")?,
            height: dim("h")?,
            x: dim("x")?,
            y: dim("y")?,
            exact: opts.get_i64("exact")?.unwrap_or(0) != 0,
            window: None,
        })
    }
}

impl VideoFilter for Crop {
    fn name(&self) -> &str {
        "crop"
    }

    fn configure(&mut self, input: LinkProps) -> EngineResult<LinkProps> {
        let w = self.width.unwrap_or(input.width);
        let h = self.height.unwrap_or(input.height);
        if w == 0 || h == 0 || w > input.width || h > input.height {
            return Err(EngineError::InvalidArgument(format!(
                "crop: invalid size {}x{} for {}x{} input",
                w, h, input.width, input.height
            )));
        }

        let mut x = self.x.unwrap_or((input.width - w) / 2);
        let mut y = self.y.unwrap_or((input.height - h) / 2);
        if !self.exact {
            let (sx, sy) = input.format.chroma_shift();
            x &= !((1 << sx) - 1);
            y &= !((1 << sy) - 1);
        }
        if x + w > input.width || y + h > input.height {
            return Err(EngineError::InvalidArgument(format!(
                "crop: window {}x{}+{}+{} exceeds {}x{} input",
                w, h, x, y, input.width, input.height
            )));
        }

        self.window = Some((x, y, w, h));
        Ok(LinkProps {
            width: w,
            height: h,
            ..input
        })
    }

    fn filter_frame(&mut self, picture: Picture) -> EngineResult<Vec<Picture>> {
        let (x, y, w, h) = self.window.ok_or(EngineError::NotConfigured)?;

        let planes = picture
            .planes
            .iter()
            .enumerate()
            .map(|(i, plane)| {
                let (pw, ph) = picture.format.component_size(i, w, h);
                // Offsets scale down with the plane's subsampling
                let px = (x as usize * plane.width) / picture.width as usize;
                let py = (y as usize * plane.height) / picture.height as usize;
                let (pw, ph) = (pw as usize, ph as usize);
                let px = px.min(plane.width - pw.min(plane.width));
                let py = py.min(plane.height - ph.min(plane.height));

                let mut out = Plane::new(pw, ph);
                for row in 0..ph {
                    out.row_mut(row).copy_from_slice(&plane.row(py + row)[px..px + pw]);
                }
                out
            })
            .collect();

        Ok(vec![picture.with_planes(w, h, planes)])
    }
}
