//! # Filter Engine
//!
//! Contract between the graph session and whatever actually runs filter
//! graphs. The session only ever talks to an engine through these traits:
//!
//! 1. allocate a graph (dropping it frees it)
//! 2. instantiate named filters with a `key=value:key=value` argument string
//! 3. parse a textual chain between a source and a sink endpoint
//! 4. configure (link and validate) the graph
//! 5. submit frames to the source, retrieve frames from the sink
//!
//! Retrieval distinguishes "needs more input" and "end of stream" from hard
//! failures, since temporal filters hold frames back before emitting.

mod frame;

pub use frame::{EngineFrame, FramePlane};

use thiserror::Error;

use crate::format::{PixelFormat, Rational};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Resource temporarily unavailable: feed more input
    #[error("Resource temporarily unavailable")]
    Again,
    #[error("End of file")]
    Eof,
    #[error("No such filter: '{0}'")]
    FilterNotFound(String),
    #[error("Option '{option}' not found for filter '{filter}'")]
    OptionNotFound { filter: String, option: String },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Chain syntax error: {0}")]
    Syntax(String),
    #[error("Failed to negotiate formats: {0}")]
    Negotiation(String),
    #[error("Failed to link: {0}")]
    Link(String),
    #[error("Graph is not configured")]
    NotConfigured,
    #[error("Invalid filter node {0:?}")]
    InvalidNode(NodeId),
    #[error("Not supported: {0}")]
    Unsupported(String),
}

impl EngineError {
    /// `Again` or `Eof`: the sink has nothing for us yet.
    pub fn needs_more_input(&self) -> bool {
        matches!(self, Self::Again | Self::Eof)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Handle to a filter instance inside one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

/// Flags for [`FilterGraph::add_frame`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitFlags {
    /// The caller keeps ownership of the submitted frame; the engine must take
    /// its own reference or copy.
    pub keep_ref: bool,
}

impl SubmitFlags {
    pub const KEEP_REF: SubmitFlags = SubmitFlags { keep_ref: true };
}

/// Allocates filter graphs.
pub trait FilterEngine {
    type Graph: FilterGraph;

    fn name(&self) -> &str;

    fn alloc_graph(&self) -> EngineResult<Self::Graph>;
}

/// One filter graph. Dropping it releases everything it owns.
pub trait FilterGraph {
    /// Options applied to scalers the engine inserts on its own.
    fn set_scale_options(&mut self, options: &str) -> EngineResult<()>;

    /// Instantiate filter `filter` under the instance name `name`.
    fn create_filter(&mut self, filter: &str, name: &str, args: Option<&str>) -> EngineResult<NodeId>;

    /// Constrain a sink to the given formats.
    fn set_output_formats(&mut self, sink: NodeId, formats: &[PixelFormat]) -> EngineResult<()>;

    /// Parse `chain` and wire it from `source`'s output to `sink`'s input.
    fn parse(&mut self, chain: &str, source: NodeId, sink: NodeId) -> EngineResult<()>;

    /// Link, negotiate and validate the graph.
    fn configure(&mut self) -> EngineResult<()>;

    fn add_frame(&mut self, source: NodeId, frame: &EngineFrame, flags: SubmitFlags) -> EngineResult<()>;

    /// Signal end of stream on `source`, letting buffering filters flush.
    fn close_source(&mut self, source: NodeId) -> EngineResult<()>;

    /// Next frame from `sink`; `Again` when more input is needed, `Eof` once a
    /// closed source has been fully drained.
    fn get_frame(&mut self, sink: NodeId) -> EngineResult<EngineFrame>;
}

// ============================================================================
// Buffer Source Arguments
// ============================================================================

/// Parameters of a `buffer` source, in the engine's argument grammar:
/// `video_size=WxH:pix_fmt=N:time_base=a/b:frame_rate=a/b:pixel_aspect=a/b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceArgs {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub time_base: Rational,
    pub frame_rate: Rational,
    pub pixel_aspect: Rational,
}

impl SourceArgs {
    /// Time base is the inverse of the frame rate.
    pub fn new(width: u32, height: u32, format: PixelFormat, frame_rate: Rational, pixel_aspect: Rational) -> Self {
        Self {
            width,
            height,
            format,
            time_base: frame_rate.invert(),
            frame_rate,
            pixel_aspect,
        }
    }

    pub fn parse(args: &str) -> EngineResult<Self> {
        let mut size = None;
        let mut format = None;
        let mut time_base = None;
        let mut frame_rate = Rational::new(0, 1);
        let mut pixel_aspect = Rational::new(1, 1);

        for pair in args.split(':').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| EngineError::InvalidArgument(format!("expected key=value, got '{}'", pair)))?;
            match key {
                "video_size" | "size" => {
                    let (w, h) = value
                        .split_once('x')
                        .ok_or_else(|| EngineError::InvalidArgument(format!("bad video_size '{}'", value)))?;
                    let w = w.parse::<u32>().map_err(|e| EngineError::InvalidArgument(e.to_string()))?;
                    let h = h.parse::<u32>().map_err(|e| EngineError::InvalidArgument(e.to_string()))?;
                    size = Some((w, h));
                }
                "pix_fmt" => {
                    format = Some(PixelFormat::parse(value).ok_or_else(|| {
                        EngineError::InvalidArgument(format!("unsupported pix_fmt '{}'", value))
                    })?);
                }
                "time_base" => time_base = Some(parse_rational(value)?),
                "frame_rate" => frame_rate = parse_rational(value)?,
                "pixel_aspect" | "sar" => pixel_aspect = parse_rational(value)?,
                other => {
                    return Err(EngineError::OptionNotFound {
                        filter: "buffer".into(),
                        option: other.into(),
                    })
                }
            }
        }

        let (width, height) = size.ok_or_else(|| EngineError::InvalidArgument("video_size not set".into()))?;
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidArgument(format!("invalid size {}x{}", width, height)));
        }
        let format = format.ok_or_else(|| EngineError::InvalidArgument("pix_fmt not set".into()))?;
        let time_base = time_base.ok_or_else(|| EngineError::InvalidArgument("time_base not set".into()))?;
        if !time_base.is_valid() {
            return Err(EngineError::InvalidArgument(format!("invalid time_base {}", time_base)));
        }

        Ok(Self {
            width,
            height,
            format,
            time_base,
            frame_rate,
            pixel_aspect,
        })
    }
}

impl std::fmt::Display for SourceArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "video_size={}x{}:pix_fmt={}:time_base={}:frame_rate={}:pixel_aspect={}",
            self.width,
            self.height,
            self.format.id(),
            self.time_base,
            self.frame_rate,
            self.pixel_aspect
        )
    }
}

fn parse_rational(value: &str) -> EngineResult<Rational> {
    value.parse::<Rational>().map_err(EngineError::InvalidArgument)
}
