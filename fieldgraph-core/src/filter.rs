//! # Graph Filter
//!
//! The per-instance filter a host attaches to its frames. On every image
//! request it plans the stages the frame needs, and either hands the upstream
//! image through untouched or pushes it through the cached graph session.

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ConfigError, FilterConfig, Profile};
use crate::engine::FilterEngine;
use crate::format::{FormatError, ImageFormat};
use crate::frame::{keys, Frame, FrameDescriptor, FrameError, Image, ImageRequest};
use crate::planner::{plan, TargetSpec};
use crate::properties::Properties;
use crate::session::{ProcessedImage, PushOutcome, SessionCache, SessionError, SessionRequest, SessionState};

/// Format used when the consumer does not ask for one.
pub const DEFAULT_FORMAT: ImageFormat = ImageFormat::Yuv422;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The graph needs more input before it can emit its first frame
    #[error("Filter graph is still warming up")]
    Pending,
}

pub struct GraphFilter<E: FilterEngine> {
    engine: E,
    config: FilterConfig,
    cache: SessionCache<E::Graph>,
}

impl<E: FilterEngine> GraphFilter<E> {
    pub fn new(engine: E, config: FilterConfig) -> Self {
        Self {
            engine,
            config,
            cache: SessionCache::new(),
        }
    }

    /// Filter configured from instance properties on top of `profile`.
    pub fn from_properties(engine: E, props: &Properties, profile: Profile) -> Result<Self, FilterError> {
        Ok(Self::new(engine, FilterConfig::from_properties(props, profile)?))
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Replace the configuration. The live graph is kept; a changed chain
    /// rebuilds it on the next frame.
    pub fn set_config(&mut self, config: FilterConfig) {
        self.config = config;
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn session_state(&self) -> SessionState {
        self.cache.state()
    }

    /// Graphs built so far.
    pub fn builds(&self) -> u64 {
        self.cache.builds()
    }

    /// Drop the live graph; the next frame builds a fresh one.
    pub fn reset(&mut self) {
        self.cache.invalidate();
    }

    /// Produce the image for `frame` in the shape `request` asks for.
    ///
    /// A `None` format is read as [`DEFAULT_FORMAT`]; a zero width or height
    /// keeps the source size. `request` is updated with what was delivered
    /// and the frame's image and field properties are replaced with the
    /// processed result.
    pub fn get_image(&mut self, frame: &mut Frame, request: &mut ImageRequest) -> Result<Image, FilterError> {
        if request.format == ImageFormat::None {
            request.format = DEFAULT_FORMAT;
        }

        let mut desc = FrameDescriptor::from_properties(frame.properties())?;
        desc.check_crop()?;
        let target = TargetSpec::from_request(request, &desc, frame.properties());
        let plan = plan(&mut desc, &target, self.config.scale_algorithm);
        // The crop is part of the plan now
        desc.store_crop(frame.properties_mut());

        let Some(chain) = plan.compose(self.config.chain_override()) else {
            return Ok(frame.get_image(request)?);
        };

        let mut source_request = ImageRequest {
            format: ImageFormat::None,
            width: desc.width,
            height: desc.height,
            writable: true,
        };
        let image = frame.get_image(&mut source_request)?;

        let session_request = SessionRequest {
            chain: &chain,
            desc: &desc,
            target_format: request.format,
            frame_rate: desc.frame_rate.or(self.config.profile.frame_rate),
            sample_aspect: desc.sample_aspect.or(self.config.profile.sample_aspect),
        };
        let session = self.cache.ensure(&self.engine, &session_request)?;

        // The host only holds the current frame, so warm-up repeats it
        let outcome = session.push(&image, &desc, std::iter::repeat(&image), self.config.warmup_limit)?;
        match outcome {
            PushOutcome::Processed(processed) => Ok(install(frame, request, processed)),
            PushOutcome::Pending => {
                warn!("no output yet for frame {}", desc.position);
                Err(FilterError::Pending)
            }
        }
    }

    /// Flush the live graph at end of stream. Frames after this get a new
    /// graph.
    pub fn drain(&mut self) -> Result<Vec<ProcessedImage>, FilterError> {
        Ok(self.cache.drain()?)
    }
}

/// Put a processed image on the frame and report it back through `request`.
fn install(frame: &mut Frame, request: &mut ImageRequest, processed: ProcessedImage) -> Image {
    let ProcessedImage {
        image,
        progressive,
        top_field_first,
    } = processed;

    request.format = image.format;
    request.width = image.width;
    request.height = image.height;

    let props = frame.properties_mut();
    props.set_int(keys::PROGRESSIVE, progressive as i64);
    props.set_int(keys::TOP_FIELD_FIRST, top_field_first as i64);
    frame.set_image(image.clone());

    debug!(
        "frame {} -> {}x{} {}",
        frame.position(),
        image.width,
        image.height,
        image.format
    );
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft::SoftwareEngine;

    fn interlaced_frame(format: ImageFormat, width: u32, height: u32, position: i64) -> Frame {
        let mut frame = Frame::with_image(Image::blank(format, width, height), false, true, position);
        let props = frame.properties_mut();
        props.set_int(keys::FRAME_RATE_NUM, 25);
        props.set_int(keys::FRAME_RATE_DEN, 1);
        frame
    }

    fn filter() -> GraphFilter<SoftwareEngine> {
        GraphFilter::new(SoftwareEngine::new(), FilterConfig::default())
    }

    #[test]
    fn matching_request_passes_through() {
        let mut filter = filter();
        let mut frame = interlaced_frame(ImageFormat::Yuv422, 64, 48, 0);
        let mut request = ImageRequest::new(ImageFormat::None, 0, 0);

        let image = filter.get_image(&mut frame, &mut request).unwrap();
        assert_eq!((request.format, request.width, request.height), (ImageFormat::Yuv422, 64, 48));
        assert_eq!(image.data.len(), ImageFormat::Yuv422.image_size(64, 48));
        assert_eq!(filter.builds(), 0);
        assert_eq!(filter.session_state(), SessionState::Uninitialized);
    }

    #[test]
    fn crop_is_applied_once() {
        let mut filter = filter();
        let mut frame = interlaced_frame(ImageFormat::Yuv420p, 64, 48, 0);
        frame.properties_mut().set_int(keys::CROP_LEFT, 8);
        frame.properties_mut().set_int(keys::CROP_RIGHT, 8);

        let mut request = ImageRequest::new(ImageFormat::Yuv420p, 0, 0);
        let image = filter.get_image(&mut frame, &mut request).unwrap();
        assert_eq!((image.width, image.height), (48, 48));
        assert_eq!(frame.properties().get_int(keys::CROP_LEFT), 0);
        assert_eq!(frame.properties().get_int(keys::CROP_RIGHT), 0);
        assert_eq!(frame.properties().get_int(keys::WIDTH), 48);

        // Nothing left to do on the same frame
        let mut request = ImageRequest::new(ImageFormat::Yuv420p, 0, 0);
        let again = filter.get_image(&mut frame, &mut request).unwrap();
        assert_eq!((again.width, again.height), (48, 48));
        assert_eq!(filter.builds(), 1);
    }

    #[test]
    fn interlaced_sd_to_progressive_hd() {
        let mut filter = filter();
        let mut frame = interlaced_frame(ImageFormat::Yuv422, 720, 576, 0);
        frame.properties_mut().set_int(keys::CONSUMER_PROGRESSIVE, 1);

        let mut request = ImageRequest::new(ImageFormat::Yuv422, 1280, 720);
        let image = filter.get_image(&mut frame, &mut request).unwrap();

        assert_eq!((request.width, request.height), (1280, 720));
        assert_eq!(image.data.len(), ImageFormat::Yuv422.image_size(1280, 720));
        let props = frame.properties();
        assert_eq!(props.get_int(keys::PROGRESSIVE), 1);
        assert_eq!(props.get_int(keys::WIDTH), 1280);
        assert_eq!(props.get_int(keys::HEIGHT), 720);
        assert_eq!(filter.session_state(), SessionState::Steady);

        // The next position reuses the graph
        let mut next = interlaced_frame(ImageFormat::Yuv422, 720, 576, 1);
        next.properties_mut().set_int(keys::CONSUMER_PROGRESSIVE, 1);
        let mut request = ImageRequest::new(ImageFormat::Yuv422, 1280, 720);
        filter.get_image(&mut next, &mut request).unwrap();
        assert_eq!(filter.builds(), 1);
    }

    #[test]
    fn seeking_rebuilds_the_graph() {
        let mut filter = filter();
        for position in [0, 1, 40] {
            let mut frame = interlaced_frame(ImageFormat::Yuv420p, 32, 24, position);
            frame.properties_mut().set_int(keys::CONSUMER_PROGRESSIVE, 1);
            let mut request = ImageRequest::new(ImageFormat::Yuv420p, 0, 0);
            filter.get_image(&mut frame, &mut request).unwrap();
        }
        assert_eq!(filter.builds(), 2);
    }

    #[test]
    fn chain_override_forces_a_graph() {
        let config = FilterConfig {
            filter: Some("fieldorder=bff".into()),
            ..FilterConfig::default()
        };
        let mut filter = GraphFilter::new(SoftwareEngine::new(), config);
        let mut frame = interlaced_frame(ImageFormat::Yuv420p, 32, 24, 0);
        let mut request = ImageRequest::new(ImageFormat::Yuv420p, 0, 0);

        filter.get_image(&mut frame, &mut request).unwrap();
        assert_eq!(filter.builds(), 1);
        assert_eq!(frame.properties().get_int(keys::TOP_FIELD_FIRST), 0);
        assert_eq!(frame.properties().get_int(keys::PROGRESSIVE), 0);
    }

    #[test]
    fn bad_override_fails_the_frame_only() {
        let config = FilterConfig {
            filter: Some("nosuchfilter".into()),
            ..FilterConfig::default()
        };
        let mut filter = GraphFilter::new(SoftwareEngine::new(), config);
        let mut frame = interlaced_frame(ImageFormat::Yuv420p, 32, 24, 0);
        let mut request = ImageRequest::new(ImageFormat::Yuv420p, 0, 0);

        let err = filter.get_image(&mut frame, &mut request).unwrap_err();
        assert!(matches!(err, FilterError::Session(SessionError::Build { step: "parse", .. })));
        assert_eq!(filter.session_state(), SessionState::Invalidated);

        filter.set_config(FilterConfig::default());
        let mut request = ImageRequest::new(ImageFormat::Yuv420p, 0, 0);
        assert!(filter.get_image(&mut frame, &mut request).is_ok());
    }

    #[test]
    fn drain_returns_held_frames() {
        let mut filter = filter();
        assert!(filter.drain().unwrap().is_empty());

        let mut frame = interlaced_frame(ImageFormat::Yuv420p, 32, 24, 0);
        frame.properties_mut().set_int(keys::CONSUMER_PROGRESSIVE, 1);
        let mut request = ImageRequest::new(ImageFormat::Yuv420p, 0, 0);
        filter.get_image(&mut frame, &mut request).unwrap();

        // yadif holds the repeated warm-up frame
        assert_eq!(filter.drain().unwrap().len(), 1);
    }

    #[test]
    fn frames_after_drain_get_a_fresh_graph() {
        let mut filter = filter();
        for position in [0, 1] {
            let mut frame = interlaced_frame(ImageFormat::Yuv420p, 32, 24, position);
            frame.properties_mut().set_int(keys::CONSUMER_PROGRESSIVE, 1);
            let mut request = ImageRequest::new(ImageFormat::Yuv420p, 0, 0);
            filter.get_image(&mut frame, &mut request).unwrap();
        }
        assert_eq!(filter.drain().unwrap().len(), 1);
        assert_eq!(filter.session_state(), SessionState::Invalidated);

        for position in [2, 3] {
            let mut frame = interlaced_frame(ImageFormat::Yuv420p, 32, 24, position);
            frame.properties_mut().set_int(keys::CONSUMER_PROGRESSIVE, 1);
            let mut request = ImageRequest::new(ImageFormat::Yuv420p, 0, 0);
            let image = filter.get_image(&mut frame, &mut request).unwrap();
            assert_eq!((image.width, image.height), (32, 24));
        }
        assert_eq!(filter.builds(), 2);
        assert_eq!(filter.session_state(), SessionState::Steady);
    }

    #[test]
    fn oversized_crop_fails_the_frame_only() {
        let mut filter = filter();
        let mut frame = interlaced_frame(ImageFormat::Yuv420p, 64, 48, 0);
        frame.properties_mut().set_int(keys::CROP_LEFT, u32::MAX as i64);
        frame.properties_mut().set_int(keys::CROP_RIGHT, 1);

        let mut request = ImageRequest::new(ImageFormat::Yuv420p, 0, 0);
        let err = filter.get_image(&mut frame, &mut request).unwrap_err();
        assert!(matches!(err, FilterError::Frame(FrameError::CropTooLarge { .. })));
        assert_eq!(filter.builds(), 0);

        let mut next = interlaced_frame(ImageFormat::Yuv420p, 64, 48, 1);
        let mut request = ImageRequest::new(ImageFormat::Yuv420p, 0, 0);
        assert!(filter.get_image(&mut next, &mut request).is_ok());
    }

    #[test]
    fn interlaced_resize_stays_interlaced() {
        let mut filter = filter();
        for position in 0..4 {
            let mut frame = interlaced_frame(ImageFormat::Yuv422, 720, 576, position);
            let props = frame.properties_mut();
            props.set_int(keys::CONSUMER_PROGRESSIVE, 0);
            props.set_int(keys::CONSUMER_TOP_FIELD_FIRST, 0);

            let mut request = ImageRequest::new(ImageFormat::Yuv422, 1920, 1080);
            let image = filter.get_image(&mut frame, &mut request).unwrap();
            assert_eq!((image.width, image.height), (1920, 1080));
            assert_eq!(image.data.len(), ImageFormat::Yuv422.image_size(1920, 1080));

            let props = frame.properties();
            assert_eq!(props.get_int(keys::PROGRESSIVE), 0);
            assert_eq!(props.get_int(keys::TOP_FIELD_FIRST), 0);
        }
        // Double rate in, half rate out: one graph, one frame per input
        assert_eq!(filter.builds(), 1);
        assert_eq!(filter.session_state(), SessionState::Steady);
    }
}
