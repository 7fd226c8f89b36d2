//! # Graph Session
//!
//! One configured filter graph bound to a chain and a source/target format,
//! plus the cache slot that decides when it can be reused.
//!
//! A session is reused while the chain, source geometry and formats are
//! unchanged and playback advances by at most one frame. Anything else (a
//! seek, a new plan) drops the graph and builds a fresh one, since temporal
//! filters inside it hold state from the old position.
//!
//! Frames are stamped with the session's own counter rather than the
//! presentation time; temporal filters need strictly increasing stamps.

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::engine::{EngineError, EngineFrame, FilterEngine, FilterGraph, NodeId, SourceArgs, SubmitFlags};
use crate::format::{FormatError, ImageFormat, PixelFormat, Rational};
use crate::frame::{FrameDescriptor, Image};

/// Row alignment of frames submitted to the engine.
pub const MEM_ALIGN: usize = 32;

/// Options for scalers the engine inserts on its own.
pub const SCALE_OPTIONS: &str = "flags=bicubic:interl=1";

/// Resubmissions allowed while a fresh graph fills its lookahead.
pub const DEFAULT_WARMUP_LIMIT: usize = 8;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("Failed to build filter graph at {step}: {source}")]
    Build {
        step: &'static str,
        #[source]
        source: EngineError,
    },
    #[error("Failed to submit frame: {0}")]
    Submit(#[source] EngineError),
    #[error("Filter graph stalled: {0}")]
    Stall(#[source] EngineError),
    #[error("Failed to retrieve frame: {0}")]
    Retrieve(#[source] EngineError),
    #[error("No output after {limit} warm-up frames")]
    WarmupExhausted { limit: usize },
    #[error("Failed to allocate {size} byte output image")]
    Allocation { size: usize },
    #[error("Engine produced {actual}, sink was constrained to {expected}")]
    OutputFormat { expected: PixelFormat, actual: PixelFormat },
}

impl SessionError {
    fn build(step: &'static str) -> impl FnOnce(EngineError) -> SessionError {
        move |source| SessionError::Build { step, source }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No graph has been built yet
    Uninitialized,
    /// Graph configured, nothing produced yet
    Built,
    /// At least one frame has come out
    Steady,
    /// Graph dropped after a failed build, a discontinuity or a new plan
    Invalidated,
}

/// What a session is bound to. Any difference forces a rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    pub chain: String,
    pub width: u32,
    pub height: u32,
    pub source_format: ImageFormat,
    pub target_format: ImageFormat,
    pub frame_rate: Rational,
    pub sample_aspect: Rational,
}

/// Everything `ensure` needs to find or build a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionRequest<'a> {
    pub chain: &'a str,
    pub desc: &'a FrameDescriptor,
    pub target_format: ImageFormat,
    pub frame_rate: Rational,
    pub sample_aspect: Rational,
}

impl SessionRequest<'_> {
    fn key(&self) -> SessionKey {
        SessionKey {
            chain: self.chain.to_string(),
            width: self.desc.width,
            height: self.desc.height,
            source_format: self.desc.format,
            target_format: self.target_format,
            frame_rate: self.frame_rate,
            sample_aspect: self.sample_aspect,
        }
    }
}

/// A processed image with the field state the engine reported for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedImage {
    pub image: Image,
    pub progressive: bool,
    pub top_field_first: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    Processed(ProcessedImage),
    /// The graph is still filling its lookahead and no more input was at hand
    Pending,
}

// ============================================================================
// Session
// ============================================================================

pub struct GraphSession<G: FilterGraph> {
    graph: G,
    source: NodeId,
    sink: NodeId,
    key: SessionKey,
    source_pixel_format: PixelFormat,
    target_pixel_format: PixelFormat,
    pts: i64,
    position: i64,
    produced: u64,
    state: SessionState,
}

impl<G: FilterGraph> GraphSession<G> {
    fn build<E>(engine: &E, request: &SessionRequest<'_>) -> Result<Self, SessionError>
    where
        E: FilterEngine<Graph = G>,
    {
        let key = request.key();
        let source_pixel_format = key.source_format.to_pixel_format()?;
        let target_pixel_format = key.target_format.to_pixel_format()?;

        let mut graph = engine.alloc_graph().map_err(SessionError::build("alloc"))?;
        graph
            .set_scale_options(SCALE_OPTIONS)
            .map_err(SessionError::build("scale options"))?;

        let args = SourceArgs::new(
            key.width,
            key.height,
            source_pixel_format,
            key.frame_rate,
            key.sample_aspect,
        );
        info!("{}", args);

        let source = graph
            .create_filter("buffer", "in", Some(&args.to_string()))
            .map_err(SessionError::build("buffer source"))?;
        let sink = graph
            .create_filter("buffersink", "out", None)
            .map_err(SessionError::build("buffer sink"))?;
        graph
            .set_output_formats(sink, &[target_pixel_format])
            .map_err(SessionError::build("sink formats"))?;
        graph
            .parse(&key.chain, source, sink)
            .map_err(SessionError::build("parse"))?;
        graph.configure().map_err(SessionError::build("configure"))?;

        info!(
            "{} graph ready: {} ({} -> {})",
            engine.name(),
            key.chain,
            source_pixel_format,
            target_pixel_format
        );

        Ok(Self {
            graph,
            source,
            sink,
            key,
            source_pixel_format,
            target_pixel_format,
            pts: -1,
            position: request.desc.position,
            produced: 0,
            state: SessionState::Built,
        })
    }

    /// Same binding and no jump in playback position.
    fn accepts(&self, key: &SessionKey, position: i64) -> bool {
        self.key == *key && matches!(position.checked_sub(self.position), Some(0 | 1))
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    /// Submit `image` and retrieve one processed frame.
    ///
    /// Until the session has produced its first frame, "needs more input" is
    /// warm-up: the next image from `lookahead` is submitted and retrieval
    /// retried, at most `warmup_limit` times. Running out of lookahead yields
    /// [`PushOutcome::Pending`]. Once frames flow, "needs more input" is a
    /// stall.
    pub fn push<'a, I>(
        &mut self,
        image: &Image,
        desc: &FrameDescriptor,
        lookahead: I,
        warmup_limit: usize,
    ) -> Result<PushOutcome, SessionError>
    where
        I: IntoIterator<Item = &'a Image>,
    {
        self.submit(image, desc)?;

        let mut lookahead = lookahead.into_iter();
        let mut resubmitted = 0;
        let frame = loop {
            match self.graph.get_frame(self.sink) {
                Ok(frame) => break frame,
                Err(e) if e.needs_more_input() && self.produced == 0 => {
                    if resubmitted >= warmup_limit {
                        error!("no output after {} warm-up frames", warmup_limit);
                        return Err(SessionError::WarmupExhausted { limit: warmup_limit });
                    }
                    let Some(next) = lookahead.next() else {
                        debug!("graph warming up, {} frames submitted", self.pts + 1);
                        return Ok(PushOutcome::Pending);
                    };
                    self.submit(next, desc)?;
                    resubmitted += 1;
                }
                Err(e) if e.needs_more_input() => {
                    error!("filter graph stalled after {} frames: {}", self.produced, e);
                    return Err(SessionError::Stall(e));
                }
                Err(e) => {
                    error!("failed to retrieve frame: {}", e);
                    return Err(SessionError::Retrieve(e));
                }
            }
        };

        let processed = self.copy_out(&frame)?;
        self.produced += 1;
        self.state = SessionState::Steady;
        Ok(PushOutcome::Processed(processed))
    }

    /// End the stream and collect whatever the graph still holds.
    pub fn drain(&mut self) -> Result<Vec<ProcessedImage>, SessionError> {
        self.graph.close_source(self.source).map_err(SessionError::Submit)?;

        let mut out = Vec::new();
        loop {
            match self.graph.get_frame(self.sink) {
                Ok(frame) => {
                    out.push(self.copy_out(&frame)?);
                    self.produced += 1;
                }
                Err(e) if e.needs_more_input() => break,
                Err(e) => return Err(SessionError::Retrieve(e)),
            }
        }
        debug!("drained {} frames", out.len());
        Ok(out)
    }

    fn submit(&mut self, image: &Image, desc: &FrameDescriptor) -> Result<(), SessionError> {
        let mut frame = EngineFrame::alloc(self.source_pixel_format, image.width, image.height, MEM_ALIGN);
        frame.fill_from(&image.data).map_err(SessionError::Submit)?;
        self.pts += 1;
        frame.pts = self.pts;
        frame.interlaced = !desc.progressive;
        frame.top_field_first = desc.top_field_first;

        self.graph
            .add_frame(self.source, &frame, SubmitFlags::KEEP_REF)
            .map_err(|e| {
                error!("failed to submit frame {}: {}", self.pts, e);
                SessionError::Submit(e)
            })
    }

    /// Copy an engine frame out into a fresh, tightly packed host image sized
    /// for the frame's own dimensions.
    fn copy_out(&self, frame: &EngineFrame) -> Result<ProcessedImage, SessionError> {
        if frame.format != self.target_pixel_format {
            return Err(SessionError::OutputFormat {
                expected: self.target_pixel_format,
                actual: frame.format,
            });
        }

        let format = self.key.target_format;
        let size = format.image_size(frame.width, frame.height);
        let mut data = Vec::new();
        data.try_reserve_exact(size).map_err(|_| {
            error!("failed to allocate {} bytes", size);
            SessionError::Allocation { size }
        })?;
        data.resize(size, 0);
        frame.copy_to_buffer(&mut data).map_err(SessionError::Retrieve)?;

        Ok(ProcessedImage {
            image: Image::new(data, format, frame.width, frame.height),
            progressive: !frame.interlaced,
            top_field_first: frame.top_field_first,
        })
    }
}

// ============================================================================
// Cache Slot
// ============================================================================

/// Holds at most one live session for a filter instance.
pub struct SessionCache<G: FilterGraph> {
    session: Option<GraphSession<G>>,
    state: SessionState,
    builds: u64,
}

impl<G: FilterGraph> Default for SessionCache<G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: FilterGraph> SessionCache<G> {
    pub fn new() -> Self {
        Self {
            session: None,
            state: SessionState::Uninitialized,
            builds: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.as_ref().map_or(self.state, GraphSession::state)
    }

    /// Number of graphs built over the cache's lifetime.
    pub fn builds(&self) -> u64 {
        self.builds
    }

    pub fn session(&self) -> Option<&GraphSession<G>> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut GraphSession<G>> {
        self.session.as_mut()
    }

    /// Flush the live session at end of stream and drop it. The closed graph
    /// cannot take more input, so the next frame builds a fresh one.
    pub fn drain(&mut self) -> Result<Vec<ProcessedImage>, SessionError> {
        let Some(mut session) = self.session.take() else {
            return Ok(Vec::new());
        };
        self.state = SessionState::Invalidated;
        session.drain()
    }

    /// Drop the live session, if any.
    pub fn invalidate(&mut self) {
        if self.session.take().is_some() {
            self.state = SessionState::Invalidated;
        }
    }

    /// Return the live session if it still matches `request`, else build a
    /// new one. A failed build leaves no session behind.
    pub fn ensure<E>(&mut self, engine: &E, request: &SessionRequest<'_>) -> Result<&mut GraphSession<G>, SessionError>
    where
        E: FilterEngine<Graph = G>,
    {
        let key = request.key();
        let position = request.desc.position;

        if let Some(mut old) = self.session.take() {
            if old.accepts(&key, position) {
                old.position = position;
                return Ok(self.session.insert(old));
            }
            if old.key != key {
                warn!("graph binding changed, rebuilding graph: {}", key.chain);
            } else {
                warn!(
                    "position jumped from {} to {}, rebuilding graph",
                    old.position, position
                );
            }
            self.state = SessionState::Invalidated;
        }

        match GraphSession::build(engine, request) {
            Ok(session) => {
                self.builds += 1;
                Ok(self.session.insert(session))
            }
            Err(e) => {
                error!("{}", e);
                self.state = SessionState::Invalidated;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineResult, FilterGraph};
    use std::cell::Cell;
    use std::collections::VecDeque;

    /// Engine whose graphs hold back `latency` frames and can resize output.
    struct MockEngine {
        latency: usize,
        output_size: Option<(u32, u32)>,
        fail_parse: bool,
        allocs: Cell<usize>,
    }

    impl MockEngine {
        fn new(latency: usize) -> Self {
            Self {
                latency,
                output_size: None,
                fail_parse: false,
                allocs: Cell::new(0),
            }
        }
    }

    struct MockGraph {
        id: usize,
        latency: usize,
        output_size: Option<(u32, u32)>,
        fail_parse: bool,
        output: Option<PixelFormat>,
        queue: VecDeque<EngineFrame>,
        closed: bool,
        pts: Vec<i64>,
    }

    impl FilterEngine for MockEngine {
        type Graph = MockGraph;

        fn name(&self) -> &str {
            "mock"
        }

        fn alloc_graph(&self) -> EngineResult<MockGraph> {
            self.allocs.set(self.allocs.get() + 1);
            Ok(MockGraph {
                id: self.allocs.get(),
                latency: self.latency,
                output_size: self.output_size,
                fail_parse: self.fail_parse,
                output: None,
                queue: VecDeque::new(),
                closed: false,
                pts: Vec::new(),
            })
        }
    }

    impl FilterGraph for MockGraph {
        fn set_scale_options(&mut self, options: &str) -> EngineResult<()> {
            assert_eq!(options, SCALE_OPTIONS);
            Ok(())
        }

        fn create_filter(&mut self, filter: &str, name: &str, args: Option<&str>) -> EngineResult<NodeId> {
            match (filter, name) {
                ("buffer", "in") => {
                    SourceArgs::parse(args.unwrap_or_default())?;
                    Ok(NodeId(0))
                }
                ("buffersink", "out") => Ok(NodeId(1)),
                _ => Err(EngineError::FilterNotFound(filter.into())),
            }
        }

        fn set_output_formats(&mut self, _sink: NodeId, formats: &[PixelFormat]) -> EngineResult<()> {
            assert_eq!(formats.len(), 1);
            self.output = Some(formats[0]);
            Ok(())
        }

        fn parse(&mut self, chain: &str, _source: NodeId, _sink: NodeId) -> EngineResult<()> {
            if self.fail_parse {
                return Err(EngineError::FilterNotFound(chain.into()));
            }
            Ok(())
        }

        fn configure(&mut self) -> EngineResult<()> {
            Ok(())
        }

        fn add_frame(&mut self, _source: NodeId, frame: &EngineFrame, flags: SubmitFlags) -> EngineResult<()> {
            assert!(flags.keep_ref);
            self.pts.push(frame.pts);
            let (w, h) = self.output_size.unwrap_or((frame.width, frame.height));
            let format = self.output.ok_or(EngineError::NotConfigured)?;
            let mut out = EngineFrame::alloc(format, w, h, MEM_ALIGN);
            out.pts = frame.pts;
            out.interlaced = frame.interlaced;
            out.top_field_first = frame.top_field_first;
            self.queue.push_back(out);
            Ok(())
        }

        fn close_source(&mut self, _source: NodeId) -> EngineResult<()> {
            self.closed = true;
            Ok(())
        }

        fn get_frame(&mut self, _sink: NodeId) -> EngineResult<EngineFrame> {
            if self.closed || self.queue.len() > self.latency {
                return self.queue.pop_front().ok_or(EngineError::Eof);
            }
            Err(EngineError::Again)
        }
    }

    fn descriptor(position: i64) -> FrameDescriptor {
        FrameDescriptor {
            width: 16,
            height: 8,
            format: ImageFormat::Yuv420p,
            progressive: false,
            top_field_first: true,
            crop: Default::default(),
            position,
            frame_rate: Rational::new(25, 1),
            sample_aspect: Rational::new(1, 1),
        }
    }

    fn request<'a>(chain: &'a str, desc: &'a FrameDescriptor) -> SessionRequest<'a> {
        SessionRequest {
            chain,
            desc,
            target_format: ImageFormat::Yuv420p,
            frame_rate: desc.frame_rate,
            sample_aspect: desc.sample_aspect,
        }
    }

    fn image() -> Image {
        Image::blank(ImageFormat::Yuv420p, 16, 8)
    }

    #[test]
    fn consecutive_positions_reuse_the_graph() {
        let engine = MockEngine::new(0);
        let mut cache = SessionCache::new();
        assert_eq!(cache.state(), SessionState::Uninitialized);

        let id = cache.ensure(&engine, &request("yadif=mode=0", &descriptor(10))).unwrap().graph().id;
        assert_eq!(cache.state(), SessionState::Built);
        let again = cache.ensure(&engine, &request("yadif=mode=0", &descriptor(11))).unwrap().graph().id;
        assert_eq!(id, again);
        let same = cache.ensure(&engine, &request("yadif=mode=0", &descriptor(11))).unwrap().graph().id;
        assert_eq!(id, same);
        assert_eq!(cache.builds(), 1);
        assert_eq!(engine.allocs.get(), 1);
    }

    #[test]
    fn position_jump_rebuilds() {
        let engine = MockEngine::new(0);
        let mut cache = SessionCache::new();
        let first = cache.ensure(&engine, &request("yadif=mode=0", &descriptor(10))).unwrap().graph().id;
        let second = cache.ensure(&engine, &request("yadif=mode=0", &descriptor(15))).unwrap().graph().id;
        assert_ne!(first, second);
        assert_eq!(cache.builds(), 2);

        // Stepping backwards is a discontinuity too
        cache.ensure(&engine, &request("yadif=mode=0", &descriptor(14))).unwrap();
        assert_eq!(cache.builds(), 3);
    }

    #[test]
    fn chain_change_rebuilds() {
        let engine = MockEngine::new(0);
        let mut cache = SessionCache::new();
        cache.ensure(&engine, &request("yadif=mode=0", &descriptor(1))).unwrap();
        let session = cache.ensure(&engine, &request("yadif=mode=1", &descriptor(2))).unwrap();
        assert_eq!(session.key().chain, "yadif=mode=1");
        assert_eq!(cache.builds(), 2);
    }

    #[test]
    fn failed_build_leaves_no_session() {
        let mut engine = MockEngine::new(0);
        let mut cache = SessionCache::new();
        cache.ensure(&engine, &request("copy", &descriptor(0))).unwrap();

        engine.fail_parse = true;
        let err = cache.ensure(&engine, &request("bogus", &descriptor(1))).err().unwrap();
        assert!(matches!(err, SessionError::Build { step: "parse", .. }));
        assert!(cache.session().is_none());
        assert_eq!(cache.state(), SessionState::Invalidated);

        // The next frame retries from scratch
        engine.fail_parse = false;
        cache.ensure(&engine, &request("copy", &descriptor(2))).unwrap();
        assert_eq!(cache.state(), SessionState::Built);
    }

    #[test]
    fn unsupported_formats_never_reach_the_engine() {
        let engine = MockEngine::new(0);
        let mut cache = SessionCache::new();
        let mut desc = descriptor(0);
        desc.format = ImageFormat::None;
        let err = cache.ensure(&engine, &request("copy", &desc)).err().unwrap();
        assert!(matches!(err, SessionError::Format(_)));
        assert_eq!(engine.allocs.get(), 0);
    }

    #[test]
    fn warm_up_absorbs_lookahead() {
        let engine = MockEngine::new(3);
        let mut cache = SessionCache::new();
        let desc = descriptor(0);
        let session = cache.ensure(&engine, &request("yadif=mode=0", &desc)).unwrap();

        let img = image();
        let outcome = session.push(&img, &desc, std::iter::repeat(&img), DEFAULT_WARMUP_LIMIT).unwrap();
        let PushOutcome::Processed(processed) = outcome else {
            panic!("expected a frame");
        };
        assert!(!processed.progressive);
        assert_eq!(session.graph().pts, vec![0, 1, 2, 3]);
        assert_eq!(session.state(), SessionState::Steady);

        // Steady state: one in, one out
        let outcome = session.push(&img, &descriptor(1), std::iter::empty(), DEFAULT_WARMUP_LIMIT).unwrap();
        assert!(matches!(outcome, PushOutcome::Processed(_)));
        assert_eq!(session.graph().pts.last(), Some(&4));
    }

    #[test]
    fn warm_up_without_lookahead_is_pending() {
        let engine = MockEngine::new(1);
        let mut cache = SessionCache::new();
        let desc = descriptor(0);
        let session = cache.ensure(&engine, &request("yadif=mode=0", &desc)).unwrap();
        let img = image();

        let outcome = session.push(&img, &desc, std::iter::empty(), DEFAULT_WARMUP_LIMIT).unwrap();
        assert_eq!(outcome, PushOutcome::Pending);
        assert_eq!(session.state(), SessionState::Built);

        let outcome = session.push(&img, &descriptor(1), std::iter::empty(), DEFAULT_WARMUP_LIMIT).unwrap();
        assert!(matches!(outcome, PushOutcome::Processed(_)));
    }

    #[test]
    fn warm_up_is_bounded() {
        let engine = MockEngine::new(20);
        let mut cache = SessionCache::new();
        let desc = descriptor(0);
        let session = cache.ensure(&engine, &request("yadif=mode=0", &desc)).unwrap();
        let img = image();
        let err = session.push(&img, &desc, std::iter::repeat(&img), 4).err().unwrap();
        assert!(matches!(err, SessionError::WarmupExhausted { limit: 4 }));
    }

    #[test]
    fn starvation_after_first_frame_is_a_stall() {
        let engine = MockEngine::new(0);
        let mut cache = SessionCache::new();
        let desc = descriptor(0);
        let session = cache.ensure(&engine, &request("copy", &desc)).unwrap();
        let img = image();
        session.push(&img, &desc, std::iter::empty(), DEFAULT_WARMUP_LIMIT).unwrap();

        // Make the graph hold frames back from now on
        session.graph.latency = 5;
        let err = session.push(&img, &descriptor(1), std::iter::repeat(&img), DEFAULT_WARMUP_LIMIT).err().unwrap();
        assert!(matches!(err, SessionError::Stall(EngineError::Again)));
    }

    #[test]
    fn output_is_sized_from_returned_dimensions() {
        let mut engine = MockEngine::new(0);
        engine.output_size = Some((10, 6));
        let mut cache = SessionCache::new();
        let desc = descriptor(0);
        let session = cache.ensure(&engine, &request("scale=w=20:h=10", &desc)).unwrap();
        let img = image();
        let PushOutcome::Processed(processed) =
            session.push(&img, &desc, std::iter::empty(), DEFAULT_WARMUP_LIMIT).unwrap()
        else {
            panic!("expected a frame");
        };
        assert_eq!((processed.image.width, processed.image.height), (10, 6));
        assert_eq!(processed.image.data.len(), ImageFormat::Yuv420p.image_size(10, 6));
    }

    #[test]
    fn drain_flushes_held_frames() {
        let engine = MockEngine::new(2);
        let mut cache = SessionCache::new();
        let desc = descriptor(0);
        let session = cache.ensure(&engine, &request("yadif=mode=0", &desc)).unwrap();
        let img = image();
        session.push(&img, &desc, std::iter::repeat(&img), DEFAULT_WARMUP_LIMIT).unwrap();
        let rest = session.drain().unwrap();
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn stream_metadata_change_rebuilds() {
        let engine = MockEngine::new(0);
        let mut cache = SessionCache::new();
        cache.ensure(&engine, &request("yadif=mode=0", &descriptor(0))).unwrap();

        let mut desc = descriptor(1);
        desc.frame_rate = Rational::new(30000, 1001);
        let session = cache.ensure(&engine, &request("yadif=mode=0", &desc)).unwrap();
        assert_eq!(session.key().frame_rate, Rational::new(30000, 1001));
        assert_eq!(cache.builds(), 2);

        let mut desc = descriptor(2);
        desc.sample_aspect = Rational::new(16, 15);
        cache.ensure(&engine, &request("yadif=mode=0", &desc)).unwrap();
        assert_eq!(cache.builds(), 3);
    }

    #[test]
    fn extreme_positions_rebuild_without_overflow() {
        let engine = MockEngine::new(0);
        let mut cache = SessionCache::new();
        cache.ensure(&engine, &request("copy", &descriptor(i64::MIN))).unwrap();
        cache.ensure(&engine, &request("copy", &descriptor(i64::MAX))).unwrap();
        cache.ensure(&engine, &request("copy", &descriptor(i64::MIN))).unwrap();
        assert_eq!(cache.builds(), 3);
    }

    #[test]
    fn cache_drain_drops_the_closed_graph() {
        let engine = MockEngine::new(1);
        let mut cache = SessionCache::new();
        assert!(cache.drain().unwrap().is_empty());

        let desc = descriptor(0);
        let img = image();
        let session = cache.ensure(&engine, &request("yadif=mode=0", &desc)).unwrap();
        session.push(&img, &desc, std::iter::repeat(&img), DEFAULT_WARMUP_LIMIT).unwrap();
        assert_eq!(cache.drain().unwrap().len(), 1);
        assert!(cache.session().is_none());
        assert_eq!(cache.state(), SessionState::Invalidated);

        // The next position gets a fresh graph that accepts input again
        let desc = descriptor(1);
        let session = cache.ensure(&engine, &request("yadif=mode=0", &desc)).unwrap();
        let outcome = session.push(&img, &desc, std::iter::repeat(&img), DEFAULT_WARMUP_LIMIT).unwrap();
        assert!(matches!(outcome, PushOutcome::Processed(_)));
        assert_eq!(cache.builds(), 2);
    }

    #[test]
    fn invalidate_drops_the_session() {
        let engine = MockEngine::new(0);
        let mut cache = SessionCache::new();
        cache.ensure(&engine, &request("copy", &descriptor(0))).unwrap();
        cache.invalidate();
        assert!(cache.session().is_none());
        assert_eq!(cache.state(), SessionState::Invalidated);
    }
}
