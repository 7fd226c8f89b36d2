use crate::engine::{EngineError, EngineResult};
use crate::planner::ScaleAlgorithm;
use crate::soft::chain::FilterOptions;
use crate::soft::picture::Picture;
use crate::soft::resample;

use super::{GraphOptions, LinkProps, VideoFilter};

/// `scale=w:h[:flags=..][:interl=..]`.
///
/// `w`/`h` of 0 keep the input dimension, -1 derives it from the other one
/// keeping the aspect ratio. `interl=1` scales the two fields separately,
/// `interl=-1` does so only for pictures flagged interlaced.
pub struct Scale {
    width: i64,
    height: i64,
    algorithm: ScaleAlgorithm,
    interlaced: Interl,
    output: Option<(u32, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interl {
    Never,
    Always,
    Auto,
}

impl Scale {
    pub const OPTIONS: &'static [&'static str] = &["w", "h", "flags", "interl"];

    pub fn new(width: u32, height: u32, algorithm: ScaleAlgorithm) -> Self {
        Self {
            width: width as i64,
            height: height as i64,
            algorithm,
            interlaced: Interl::Never,
            output: None,
        }
    }

    pub fn from_options(opts: &FilterOptions, graph: &GraphOptions) -> EngineResult<Self> {
        let algorithm = match opts.get("flags") {
            Some(flags) => flags
                .split('+')
                .find_map(ScaleAlgorithm::from_flag)
                .ok_or_else(|| EngineError::InvalidArgument(format!("scale: unknown flags '{}'", flags)))?,
            None => graph.scale_algorithm,
        };
        let interlaced = match opts.get_i64("interl")? {
            Some(0) => Interl::Never,
            Some(1) => Interl::Always,
            Some(-1) => Interl::Auto,
            Some(other) => {
                return Err(EngineError::InvalidArgument(format!("scale: interl must be -1, 0 or 1, got {}", other)))
            }
            None if graph.interlaced_scaling => Interl::Auto,
            None => Interl::Never,
        };

        Ok(Self {
            width: opts.get_i64("w")?.unwrap_or(0),
            height: opts.get_i64("h")?.unwrap_or(0),
            algorithm,
            interlaced,
            output: None,
        })
    }

    fn resolve(&self, input: &LinkProps) -> EngineResult<(u32, u32)> {
        let (iw, ih) = (input.width as i64, input.height as i64);
        let (w, h) = match (self.width, self.height) {
            (-1, -1) => (iw, ih),
            (-1, h) => {
                let h = if h == 0 { ih } else { h };
                ((iw * h + ih / 2) / ih, h)
            }
            (w, -1) => {
                let w = if w == 0 { iw } else { w };
                (w, (ih * w + iw / 2) / iw)
            }
            (w, h) => (if w == 0 { iw } else { w }, if h == 0 { ih } else { h }),
        };
        if w <= 0 || h <= 0 || w > u32::MAX as i64 || h > u32::MAX as i64 {
            return Err(EngineError::InvalidArgument(format!("scale: invalid output size {}x{}", w, h)));
        }
        Ok((w as u32, h as u32))
    }
}

impl VideoFilter for Scale {
    fn name(&self) -> &str {
        "scale"
    }

    fn configure(&mut self, input: LinkProps) -> EngineResult<LinkProps> {
        let (width, height) = self.resolve(&input)?;
        self.output = Some((width, height));
        Ok(LinkProps { width, height, ..input })
    }

    fn filter_frame(&mut self, picture: Picture) -> EngineResult<Vec<Picture>> {
        let (width, height) = self.output.ok_or(EngineError::NotConfigured)?;
        if (width, height) == (picture.width, picture.height) {
            return Ok(vec![picture]);
        }

        let by_field = match self.interlaced {
            Interl::Never => false,
            Interl::Always => true,
            Interl::Auto => picture.interlaced,
        };

        let planes = picture
            .planes
            .iter()
            .enumerate()
            .map(|(i, plane)| {
                let (w, h) = picture.format.component_size(i, width, height);
                if by_field {
                    resample::resample_fields(plane, w as usize, h as usize, self.algorithm)
                } else {
                    resample::resample(plane, w as usize, h as usize, self.algorithm)
                }
            })
            .collect();

        Ok(vec![picture.with_planes(width, height, planes)])
    }
}
