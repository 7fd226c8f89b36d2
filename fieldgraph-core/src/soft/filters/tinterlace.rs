use crate::engine::{EngineError, EngineResult};
use crate::format::Rational;
use crate::soft::chain::FilterOptions;
use crate::soft::picture::{Picture, Plane};

use super::{LinkProps, VideoFilter};

const MODES: &[(&str, i64)] = &[("interleave_top", 4), ("interleave_bottom", 5)];

/// `tinterlace=mode=4|5`: weave each pair of progressive pictures into one
/// interlaced picture at half the rate. `interleave_top` takes the top field
/// from the first picture of the pair, `interleave_bottom` the bottom field.
pub struct Tinterlace {
    top_field_first: bool,
    pending: Option<Picture>,
}

impl Tinterlace {
    pub const OPTIONS: &'static [&'static str] = &["mode"];

    pub fn new(top_field_first: bool) -> Self {
        Self {
            top_field_first,
            pending: None,
        }
    }

    pub fn from_options(opts: &FilterOptions) -> EngineResult<Self> {
        match opts.get_enum("mode", MODES)? {
            Some(4) => Ok(Self::new(true)),
            Some(5) => Ok(Self::new(false)),
            Some(other) => Err(EngineError::Unsupported(format!("tinterlace mode {}", other))),
            None => Err(EngineError::InvalidArgument("tinterlace: mode not set".into())),
        }
    }

    fn weave(&self, first: &Picture, second: &Picture) -> Picture {
        let planes = first
            .planes
            .iter()
            .zip(&second.planes)
            .map(|(a, b)| {
                let (top, bottom) = if self.top_field_first { (a, b) } else { (b, a) };
                let mut out = Plane::new(a.width, a.height);
                for y in 0..a.height {
                    let source = if y % 2 == 0 { top } else { bottom };
                    out.row_mut(y).copy_from_slice(source.row(y));
                }
                out
            })
            .collect();

        let mut out = first.with_planes(first.width, first.height, planes);
        out.pts = first.pts / 2;
        out.interlaced = true;
        out.top_field_first = self.top_field_first;
        out
    }
}

impl VideoFilter for Tinterlace {
    fn name(&self) -> &str {
        "tinterlace"
    }

    fn configure(&mut self, input: LinkProps) -> EngineResult<LinkProps> {
        Ok(LinkProps {
            frame_rate: Rational::new(input.frame_rate.num, input.frame_rate.den * 2),
            time_base: Rational::new(input.time_base.num * 2, input.time_base.den),
            ..input
        })
    }

    fn filter_frame(&mut self, picture: Picture) -> EngineResult<Vec<Picture>> {
        match self.pending.take() {
            None => {
                self.pending = Some(picture);
                Ok(Vec::new())
            }
            Some(first) => Ok(vec![self.weave(&first, &picture)]),
        }
    }

    fn flush(&mut self) -> EngineResult<Vec<Picture>> {
        // A lone picture is woven with itself
        Ok(self
            .pending
            .take()
            .map(|last| vec![self.weave(&last, &last)])
            .unwrap_or_default())
    }
}
