// FORMAT - Host image formats and engine pixel formats
//
// The host hands us a small set of image formats. The filter engine speaks
// its own pixel-format enumeration. This module maps between them and knows
// how big a tightly packed image of each format is.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("Invalid format {0}")]
    Unsupported(&'static str),
    #[error("Unknown image format id {0}")]
    UnknownId(i64),
}

// ============================================================================
// Host Image Formats
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    None,
    Rgb24,    // packed RGB, 3 bytes per pixel
    Rgb24a,   // packed RGBA, 4 bytes per pixel
    Yuv422,   // packed YUYV
    Yuv420p,  // Y plane, U plane (quarter size), V plane (quarter size)
    Opengl,   // GPU-resident RGBA texture, read back as RGBA
}

impl ImageFormat {
    /// Numeric id stored in the `format` frame property.
    pub fn id(&self) -> i64 {
        match self {
            Self::None => 0,
            Self::Rgb24 => 1,
            Self::Rgb24a => 2,
            Self::Yuv422 => 3,
            Self::Yuv420p => 4,
            Self::Opengl => 5,
        }
    }

    pub fn from_id(id: i64) -> Result<Self, FormatError> {
        match id {
            0 => Ok(Self::None),
            1 => Ok(Self::Rgb24),
            2 => Ok(Self::Rgb24a),
            3 => Ok(Self::Yuv422),
            4 => Ok(Self::Yuv420p),
            5 => Ok(Self::Opengl),
            other => Err(FormatError::UnknownId(other)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Rgb24 => "rgb24",
            Self::Rgb24a => "rgb24a",
            Self::Yuv422 => "yuv422",
            Self::Yuv420p => "yuv420p",
            Self::Opengl => "opengl",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "rgb24" | "rgb" => Some(Self::Rgb24),
            "rgb24a" | "rgba" => Some(Self::Rgb24a),
            "yuv422" | "yuyv422" => Some(Self::Yuv422),
            "yuv420p" | "i420" => Some(Self::Yuv420p),
            "opengl" => Some(Self::Opengl),
            _ => None,
        }
    }

    /// Size in bytes of a tightly packed image.
    ///
    /// Subsampled chroma is rounded up, so odd dimensions still cover every
    /// pixel. Returns 0 for `None`.
    pub fn image_size(&self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            Self::None => 0,
            Self::Rgb24 => w * h * 3,
            Self::Rgb24a | Self::Opengl => w * h * 4,
            Self::Yuv422 => w.div_ceil(2) * 4 * h,
            Self::Yuv420p => w * h + 2 * w.div_ceil(2) * h.div_ceil(2),
        }
    }

    /// Map to the engine's pixel format.
    ///
    /// Unsupported formats are logged and reported as an error; no graph may
    /// be built from them.
    pub fn to_pixel_format(&self) -> Result<PixelFormat, FormatError> {
        match self {
            Self::Rgb24 => Ok(PixelFormat::Rgb24),
            Self::Rgb24a | Self::Opengl => Ok(PixelFormat::Rgba),
            Self::Yuv422 => Ok(PixelFormat::Yuyv422),
            Self::Yuv420p => Ok(PixelFormat::Yuv420p),
            Self::None => {
                tracing::error!("Invalid image format {}", self.name());
                Err(FormatError::Unsupported(self.name()))
            }
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Engine Pixel Formats
// ============================================================================

/// Pixel formats understood by the filter engine.
///
/// Discriminants are the engine's numeric ids, which is what goes into the
/// `pix_fmt=` argument of a buffer source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Yuv420p = 0,
    Yuyv422 = 1,
    Rgb24 = 2,
    Yuv444p = 5,
    Rgba = 26,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 5] = [
        PixelFormat::Yuv420p,
        PixelFormat::Yuyv422,
        PixelFormat::Rgb24,
        PixelFormat::Yuv444p,
        PixelFormat::Rgba,
    ];

    pub fn id(&self) -> i32 {
        *self as i32
    }

    pub fn from_id(id: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.id() == id)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Yuv420p => "yuv420p",
            Self::Yuyv422 => "yuyv422",
            Self::Rgb24 => "rgb24",
            Self::Yuv444p => "yuv444p",
            Self::Rgba => "rgba",
        }
    }

    /// Accepts either the engine name or the numeric id.
    pub fn parse(value: &str) -> Option<Self> {
        if let Ok(id) = value.parse::<i32>() {
            return Self::from_id(id);
        }
        Self::ALL.into_iter().find(|f| f.name() == value)
    }

    pub fn is_yuv(&self) -> bool {
        matches!(self, Self::Yuv420p | Self::Yuyv422 | Self::Yuv444p)
    }

    pub fn is_rgb(&self) -> bool {
        matches!(self, Self::Rgb24 | Self::Rgba)
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self, Self::Rgba)
    }

    /// Number of colour components (3 or 4).
    pub fn components(&self) -> usize {
        if self.has_alpha() {
            4
        } else {
            3
        }
    }

    /// Horizontal and vertical chroma subsampling shifts.
    pub fn chroma_shift(&self) -> (u32, u32) {
        match self {
            Self::Yuv420p => (1, 1),
            Self::Yuyv422 => (1, 0),
            Self::Yuv444p | Self::Rgb24 | Self::Rgba => (0, 0),
        }
    }

    /// Dimensions of component `index` for a picture of `width` x `height`.
    pub fn component_size(&self, index: usize, width: u32, height: u32) -> (u32, u32) {
        if index == 0 || !self.is_yuv() || index == 3 {
            return (width, height);
        }
        let (sx, sy) = self.chroma_shift();
        (ceil_shift(width, sx), ceil_shift(height, sy))
    }

    /// Memory planes of the engine-native layout: `(row_bytes, rows)` per plane.
    pub fn plane_layout(&self, width: u32, height: u32) -> Vec<(usize, usize)> {
        let (w, h) = (width as usize, height as usize);
        match self {
            Self::Rgb24 => vec![(w * 3, h)],
            Self::Rgba => vec![(w * 4, h)],
            Self::Yuyv422 => vec![(w.div_ceil(2) * 4, h)],
            Self::Yuv420p => {
                let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
                vec![(w, h), (cw, ch), (cw, ch)]
            }
            Self::Yuv444p => vec![(w, h), (w, h), (w, h)],
        }
    }

    /// Tightly packed buffer size (alignment 1).
    pub fn buffer_size(&self, width: u32, height: u32) -> usize {
        self.plane_layout(width, height)
            .iter()
            .map(|(row_bytes, rows)| row_bytes * rows)
            .sum()
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn ceil_shift(value: u32, shift: u32) -> u32 {
    (value + (1 << shift) - 1) >> shift
}

// ============================================================================
// Rational
// ============================================================================

/// Numerator/denominator pair used for frame rates, time bases and aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub fn is_valid(&self) -> bool {
        self.num > 0 && self.den > 0
    }

    pub fn invert(&self) -> Self {
        Self::new(self.den, self.num)
    }

    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /// `self` if valid, else `fallback`.
    pub fn or(self, fallback: Rational) -> Rational {
        if self.is_valid() {
            self
        } else {
            fallback
        }
    }
}

impl std::fmt::Display for Rational {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl std::str::FromStr for Rational {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (num, den) = s
            .split_once('/')
            .ok_or_else(|| format!("Invalid rational: {}", s))?;
        let num = num
            .trim()
            .parse()
            .map_err(|e| format!("Invalid numerator in {}: {}", s, e))?;
        let den = den
            .trim()
            .parse()
            .map_err(|e| format!("Invalid denominator in {}: {}", s, e))?;
        Ok(Self { num, den })
    }
}
