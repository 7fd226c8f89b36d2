use crate::engine::{EngineError, EngineResult};
use crate::format::PixelFormat;
use crate::planner::ScaleAlgorithm;
use crate::soft::chain::FilterOptions;
use crate::soft::picture::Picture;

use super::{GraphOptions, LinkProps, VideoFilter};

/// `copy` / `null`: pictures pass through untouched.
pub struct Passthrough {
    name: String,
}

impl Passthrough {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl VideoFilter for Passthrough {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, input: LinkProps) -> EngineResult<LinkProps> {
        Ok(input)
    }

    fn filter_frame(&mut self, picture: Picture) -> EngineResult<Vec<Picture>> {
        Ok(vec![picture])
    }
}

/// `format=pix_fmts=a|b`: convert to the first listed format, or keep the
/// input format if it is listed.
pub struct Format {
    formats: Vec<PixelFormat>,
    algorithm: ScaleAlgorithm,
    output: Option<PixelFormat>,
}

impl Format {
    pub const OPTIONS: &'static [&'static str] = &["pix_fmts"];

    pub fn new(formats: Vec<PixelFormat>, algorithm: ScaleAlgorithm) -> Self {
        Self {
            formats,
            algorithm,
            output: None,
        }
    }

    pub fn from_options(opts: &FilterOptions, graph: &GraphOptions) -> EngineResult<Self> {
        let list = opts
            .get("pix_fmts")
            .ok_or_else(|| EngineError::InvalidArgument("format: pix_fmts not set".into()))?;
        let formats = list
            .split('|')
            .map(|name| {
                PixelFormat::parse(name.trim())
                    .ok_or_else(|| EngineError::InvalidArgument(format!("format: unsupported pixel format '{}'", name)))
            })
            .collect::<EngineResult<Vec<_>>>()?;
        Ok(Self::new(formats, graph.scale_algorithm))
    }
}

impl VideoFilter for Format {
    fn name(&self) -> &str {
        "format"
    }

    fn configure(&mut self, input: LinkProps) -> EngineResult<LinkProps> {
        let output = if self.formats.contains(&input.format) {
            input.format
        } else {
            *self
                .formats
                .first()
                .ok_or_else(|| EngineError::Negotiation("format: empty format list".into()))?
        };
        self.output = Some(output);
        Ok(LinkProps { format: output, ..input })
    }

    fn filter_frame(&mut self, picture: Picture) -> EngineResult<Vec<Picture>> {
        let output = self.output.ok_or(EngineError::NotConfigured)?;
        Ok(vec![picture.convert(output, self.algorithm)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft::chain::parse_args;
    use crate::soft::filters::test_support::props;

    #[test]
    fn format_picks_listed_or_first() {
        let opts = FilterOptions::resolve("format", &parse_args("pix_fmts=rgba|yuv420p"), Format::OPTIONS).unwrap();
        let mut filter = Format::from_options(&opts, &GraphOptions::default()).unwrap();

        let out = filter.configure(props(8, 8, PixelFormat::Yuv420p)).unwrap();
        assert_eq!(out.format, PixelFormat::Yuv420p);

        let out = filter.configure(props(8, 8, PixelFormat::Yuyv422)).unwrap();
        assert_eq!(out.format, PixelFormat::Rgba);
        let pics = filter.filter_frame(Picture::new(PixelFormat::Yuyv422, 8, 8)).unwrap();
        assert_eq!(pics[0].format, PixelFormat::Rgba);
        assert_eq!(pics[0].planes.len(), 4);
    }

    #[test]
    fn format_rejects_unknown_names() {
        let opts = FilterOptions::resolve("format", &parse_args("pix_fmts=nv12"), Format::OPTIONS).unwrap();
        assert!(Format::from_options(&opts, &GraphOptions::default()).is_err());
    }
}
