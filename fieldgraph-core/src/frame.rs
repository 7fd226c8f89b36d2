//! # Frame
//!
//! The host media frame: a property bag plus the image produced upstream.
//! Filters read geometry, interlace and crop state from the properties and
//! install their processed image back onto the frame.

use bytes::Bytes;
use thiserror::Error;

use crate::format::{FormatError, ImageFormat, Rational};
use crate::properties::Properties;

/// Well-known frame property keys.
pub mod keys {
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const FORMAT: &str = "format";
    pub const PROGRESSIVE: &str = "progressive";
    pub const TOP_FIELD_FIRST: &str = "top_field_first";
    pub const POSITION: &str = "_position";
    pub const IMAGE: &str = "image";

    pub const CROP_LEFT: &str = "crop.left";
    pub const CROP_RIGHT: &str = "crop.right";
    pub const CROP_TOP: &str = "crop.top";
    pub const CROP_BOTTOM: &str = "crop.bottom";

    pub const FRAME_RATE_NUM: &str = "meta.media.frame_rate_num";
    pub const FRAME_RATE_DEN: &str = "meta.media.frame_rate_den";
    pub const SAMPLE_ASPECT_NUM: &str = "meta.media.sample_aspect_num";
    pub const SAMPLE_ASPECT_DEN: &str = "meta.media.sample_aspect_den";

    pub const CONSUMER_PROGRESSIVE: &str = "consumer.progressive";
    pub const CONSUMER_TOP_FIELD_FIRST: &str = "consumer.top_field_first";
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame has no image")]
    NoImage,
    #[error("Image is {actual}, requested {requested}")]
    FormatMismatch {
        requested: ImageFormat,
        actual: ImageFormat,
    },
    #[error("Image buffer holds {actual} bytes, {expected} needed for {width}x{height} {format}")]
    ShortBuffer {
        format: ImageFormat,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("Crop of {horizontal}x{vertical} leaves nothing of {width}x{height}")]
    CropTooLarge {
        width: u32,
        height: u32,
        horizontal: u32,
        vertical: u32,
    },
    #[error(transparent)]
    Format(#[from] FormatError),
}

// ============================================================================
// Image
// ============================================================================

/// A tightly packed image buffer with its geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub data: Bytes,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl Image {
    pub fn new(data: impl Into<Bytes>, format: ImageFormat, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            format,
            width,
            height,
        }
    }

    /// Zero-filled image of the right size.
    pub fn blank(format: ImageFormat, width: u32, height: u32) -> Self {
        let size = format.image_size(width, height);
        Self::new(vec![0u8; size], format, width, height)
    }

    pub fn expected_size(&self) -> usize {
        self.format.image_size(self.width, self.height)
    }

    pub fn validate(&self) -> Result<(), FrameError> {
        let expected = self.expected_size();
        if self.data.len() < expected {
            return Err(FrameError::ShortBuffer {
                format: self.format,
                width: self.width,
                height: self.height,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

/// Format and geometry requested from `get_image`. Updated in place with what
/// was actually delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRequest {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub writable: bool,
}

impl ImageRequest {
    pub fn new(format: ImageFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            writable: false,
        }
    }
}

// ============================================================================
// Frame Descriptor
// ============================================================================

/// Pending crop request, in pixels from each edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CropMargins {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl CropMargins {
    pub fn is_empty(&self) -> bool {
        self.left == 0 && self.right == 0 && self.top == 0 && self.bottom == 0
    }

    pub fn horizontal(&self) -> u32 {
        self.left.saturating_add(self.right)
    }

    pub fn vertical(&self) -> u32 {
        self.top.saturating_add(self.bottom)
    }

    /// Take the margins, leaving zeros behind.
    pub fn take(&mut self) -> CropMargins {
        std::mem::take(self)
    }
}

/// Per-frame geometry, interlace and crop state as seen by the planner.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub progressive: bool,
    pub top_field_first: bool,
    pub crop: CropMargins,
    pub position: i64,
    pub frame_rate: Rational,
    pub sample_aspect: Rational,
}

impl FrameDescriptor {
    pub fn from_properties(props: &Properties) -> Result<Self, FrameError> {
        Ok(Self {
            width: non_negative(props.get_int(keys::WIDTH)),
            height: non_negative(props.get_int(keys::HEIGHT)),
            format: ImageFormat::from_id(props.get_int(keys::FORMAT))?,
            progressive: props.get_int(keys::PROGRESSIVE) != 0,
            top_field_first: props.get_int(keys::TOP_FIELD_FIRST) != 0,
            crop: CropMargins {
                left: non_negative(props.get_int(keys::CROP_LEFT)),
                right: non_negative(props.get_int(keys::CROP_RIGHT)),
                top: non_negative(props.get_int(keys::CROP_TOP)),
                bottom: non_negative(props.get_int(keys::CROP_BOTTOM)),
            },
            position: props.get_int(keys::POSITION),
            frame_rate: Rational::new(
                props.get_int(keys::FRAME_RATE_NUM) as i32,
                props.get_int(keys::FRAME_RATE_DEN) as i32,
            ),
            sample_aspect: Rational::new(
                props.get_int(keys::SAMPLE_ASPECT_NUM) as i32,
                props.get_int(keys::SAMPLE_ASPECT_DEN) as i32,
            ),
        })
    }

    /// Reject margins that would crop away the whole width or height.
    pub fn check_crop(&self) -> Result<(), FrameError> {
        let horizontal = self.crop.horizontal();
        let vertical = self.crop.vertical();
        if (horizontal > 0 && horizontal >= self.width) || (vertical > 0 && vertical >= self.height) {
            return Err(FrameError::CropTooLarge {
                width: self.width,
                height: self.height,
                horizontal,
                vertical,
            });
        }
        Ok(())
    }

    /// Write crop margins back so a consumed crop is not applied again.
    pub fn store_crop(&self, props: &mut Properties) {
        props.set_int(keys::CROP_LEFT, self.crop.left as i64);
        props.set_int(keys::CROP_RIGHT, self.crop.right as i64);
        props.set_int(keys::CROP_TOP, self.crop.top as i64);
        props.set_int(keys::CROP_BOTTOM, self.crop.bottom as i64);
    }

    /// Write geometry, format and field state.
    pub fn store_image_state(&self, props: &mut Properties) {
        props.set_int(keys::WIDTH, self.width as i64);
        props.set_int(keys::HEIGHT, self.height as i64);
        props.set_int(keys::FORMAT, self.format.id());
        props.set_int(keys::PROGRESSIVE, self.progressive as i64);
        props.set_int(keys::TOP_FIELD_FIRST, self.top_field_first as i64);
    }
}

fn non_negative(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

// ============================================================================
// Frame
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Frame {
    properties: Properties,
    image: Option<Image>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame carrying `image`, with geometry and field properties filled in.
    pub fn with_image(image: Image, progressive: bool, top_field_first: bool, position: i64) -> Self {
        let mut frame = Self::new();
        frame.properties.set_int(keys::PROGRESSIVE, progressive as i64);
        frame.properties.set_int(keys::TOP_FIELD_FIRST, top_field_first as i64);
        frame.properties.set_int(keys::POSITION, position);
        frame.set_image(image);
        frame
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    pub fn position(&self) -> i64 {
        self.properties.get_int(keys::POSITION)
    }

    pub fn image(&self) -> Option<&Image> {
        self.image.as_ref()
    }

    /// Install an image and update the geometry properties to match.
    pub fn set_image(&mut self, image: Image) {
        self.properties.set_int(keys::WIDTH, image.width as i64);
        self.properties.set_int(keys::HEIGHT, image.height as i64);
        self.properties.set_int(keys::FORMAT, image.format.id());
        self.properties.set_data(keys::IMAGE, image.data.clone());
        self.image = Some(image);
    }

    /// Fetch the upstream image.
    ///
    /// `request` is updated with the delivered geometry. Upstream does not
    /// convert formats, so a request for a different format fails.
    pub fn get_image(&mut self, request: &mut ImageRequest) -> Result<Image, FrameError> {
        let image = self.image.as_ref().ok_or(FrameError::NoImage)?;
        if request.format != ImageFormat::None && request.format != image.format {
            return Err(FrameError::FormatMismatch {
                requested: request.format,
                actual: image.format,
            });
        }
        image.validate()?;

        request.format = image.format;
        request.width = image.width;
        request.height = image.height;
        Ok(image.clone())
    }
}
