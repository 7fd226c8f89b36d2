//! # Graph Planner
//!
//! Decides whether a frame needs any processing to meet the consumer's
//! request and, if so, which stages in which order. The plan renders to the
//! engine's textual chain grammar.
//!
//! Stage order is fixed: crop first, then the deinterlace/scale/reinterlace
//! group, then field-order correction. Later stages assume the picture already
//! has its final spatial size and field disposition.

use serde::{Deserialize, Serialize};

use crate::format::ImageFormat;
use crate::frame::{keys, CropMargins, FrameDescriptor, ImageRequest};
use crate::properties::Properties;

// ============================================================================
// Target
// ============================================================================

/// What the consumer asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSpec {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub progressive: bool,
    pub top_field_first: bool,
}

impl TargetSpec {
    /// Build the target from an image request and the frame's consumer hints.
    ///
    /// A zero width or height means "keep the post-crop source size". Without
    /// `consumer.progressive` / `consumer.top_field_first` the source's own
    /// field disposition is kept.
    pub fn from_request(request: &ImageRequest, desc: &FrameDescriptor, props: &Properties) -> Self {
        let (width, height) = if request.width == 0 || request.height == 0 {
            (
                desc.width.saturating_sub(desc.crop.horizontal()),
                desc.height.saturating_sub(desc.crop.vertical()),
            )
        } else {
            (request.width, request.height)
        };

        Self {
            width,
            height,
            format: request.format,
            progressive: props.get_int_or(keys::CONSUMER_PROGRESSIVE, desc.progressive as i64) != 0,
            top_field_first: props
                .get_int_or(keys::CONSUMER_TOP_FIELD_FIRST, desc.top_field_first as i64)
                != 0,
        }
    }
}

// ============================================================================
// Stages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleAlgorithm {
    Nearest,
    Bilinear,
    Bicubic,
    #[default]
    Lanczos,
}

impl ScaleAlgorithm {
    /// Name used in `flags=` options.
    pub fn flag(&self) -> &'static str {
        match self {
            Self::Nearest => "neighbor",
            Self::Bilinear => "bilinear",
            Self::Bicubic => "bicubic",
            Self::Lanczos => "lanczos",
        }
    }

    pub fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "neighbor" | "point" | "nearest" => Some(Self::Nearest),
            "bilinear" | "fast_bilinear" => Some(Self::Bilinear),
            "bicubic" => Some(Self::Bicubic),
            "lanczos" => Some(Self::Lanczos),
            _ => None,
        }
    }
}

/// How many progressive frames a deinterlacer emits per interlaced frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRate {
    /// One frame per frame
    Single,
    /// One frame per field
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Crop {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    Deinterlace(FieldRate),
    Scale {
        width: u32,
        height: u32,
        algorithm: ScaleAlgorithm,
        /// Scale the two fields separately
        interlaced: bool,
    },
    Reinterlace {
        top_field_first: bool,
    },
    FieldOrder {
        top_field_first: bool,
    },
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Crop { .. } => "crop",
            Self::Deinterlace(_) => "deinterlace",
            Self::Scale { .. } => "scale",
            Self::Reinterlace { .. } => "reinterlace",
            Self::FieldOrder { .. } => "fieldorder",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Crop {
                x,
                y,
                width,
                height,
            } => write!(f, "crop=w={}:h={}:x={}:y={}", width, height, x, y),
            Self::Deinterlace(FieldRate::Single) => f.write_str("yadif=mode=0"),
            Self::Deinterlace(FieldRate::Double) => f.write_str("yadif=mode=1"),
            Self::Scale {
                width,
                height,
                algorithm,
                interlaced,
            } => {
                write!(f, "scale=w={}:h={}:flags={}", width, height, algorithm.flag())?;
                if *interlaced {
                    f.write_str(":interl=1")?;
                }
                Ok(())
            }
            // interleave_top / interleave_bottom
            Self::Reinterlace { top_field_first } => {
                write!(f, "tinterlace=mode={}", if *top_field_first { 4 } else { 5 })
            }
            Self::FieldOrder { top_field_first } => {
                write!(f, "fieldorder={}", if *top_field_first { "tff" } else { "bff" })
            }
        }
    }
}

// ============================================================================
// Plan
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPlan {
    stages: Vec<Stage>,
    working_width: u32,
    working_height: u32,
    deinterlaced: bool,
    reinterlaced: bool,
}

impl FilterPlan {
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Geometry after the crop stage, before any scaling.
    pub fn working_size(&self) -> (u32, u32) {
        (self.working_width, self.working_height)
    }

    pub fn deinterlaced(&self) -> bool {
        self.deinterlaced
    }

    pub fn reinterlaced(&self) -> bool {
        self.reinterlaced
    }

    pub fn count(&self, name: &str) -> usize {
        self.stages.iter().filter(|s| s.name() == name).count()
    }

    /// Chain text, or `None` for a passthrough plan.
    pub fn chain(&self) -> Option<String> {
        if self.stages.is_empty() {
            return None;
        }
        Some(
            self.stages
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    /// Chain text with a user override appended.
    ///
    /// The identity chains (`copy`, `null`, empty) never force a graph; any
    /// other override does, even when the plan itself is empty.
    pub fn compose(&self, user_chain: Option<&str>) -> Option<String> {
        let user = user_chain.map(str::trim).filter(|c| !is_identity_chain(c));
        match (self.chain(), user) {
            (None, None) => None,
            (Some(planned), None) => Some(planned),
            (None, Some(user)) => Some(user.to_string()),
            (Some(planned), Some(user)) => Some(format!("{},{}", planned, user)),
        }
    }
}

pub fn is_identity_chain(chain: &str) -> bool {
    matches!(chain.trim(), "" | "copy" | "null")
}

/// Plan the stages that turn `desc` into `target`.
///
/// Pending crop margins are consumed: they are cleared on `desc` so that the
/// caller can write them back and the crop is never applied twice.
pub fn plan(desc: &mut FrameDescriptor, target: &TargetSpec, algorithm: ScaleAlgorithm) -> FilterPlan {
    let mut stages = Vec::new();
    let mut width = desc.width;
    let mut height = desc.height;

    let crop: CropMargins = desc.crop.take();
    if !crop.is_empty() {
        width = width.saturating_sub(crop.horizontal());
        height = height.saturating_sub(crop.vertical());
        stages.push(Stage::Crop {
            x: crop.left,
            y: crop.top,
            width,
            height,
        });
    }

    let source_interlaced = !desc.progressive;
    let target_interlaced = !target.progressive;
    let mut deinterlaced = false;
    let mut reinterlaced = false;

    if (width, height) != (target.width, target.height) {
        let scale = Stage::Scale {
            width: target.width,
            height: target.height,
            algorithm,
            interlaced: false,
        };
        if source_interlaced && target_interlaced {
            stages.push(Stage::Deinterlace(FieldRate::Double));
            stages.push(scale);
            stages.push(Stage::Reinterlace {
                top_field_first: target.top_field_first,
            });
            reinterlaced = true;
        } else if source_interlaced {
            stages.push(Stage::Deinterlace(FieldRate::Single));
            stages.push(scale);
            deinterlaced = true;
        } else {
            stages.push(scale);
        }
    } else if desc.format != target.format {
        // Same geometry, different pixel format: a same-size scale converts.
        stages.push(Stage::Scale {
            width,
            height,
            algorithm,
            interlaced: source_interlaced,
        });
    }

    if source_interlaced
        && target_interlaced
        && desc.top_field_first != target.top_field_first
        && !reinterlaced
    {
        stages.push(Stage::FieldOrder {
            top_field_first: target.top_field_first,
        });
    }

    if source_interlaced && !target_interlaced && !deinterlaced {
        stages.push(Stage::Deinterlace(FieldRate::Single));
        deinterlaced = true;
    }

    let plan = FilterPlan {
        stages,
        working_width: width,
        working_height: height,
        deinterlaced,
        reinterlaced,
    };
    if !plan.is_empty() {
        tracing::debug!(
            "Planned {} stage(s) for {}x{} {} -> {}x{} {}",
            plan.len(),
            desc.width,
            desc.height,
            desc.format,
            target.width,
            target.height,
            target.format
        );
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Rational;

    fn descriptor(width: u32, height: u32, progressive: bool, tff: bool) -> FrameDescriptor {
        FrameDescriptor {
            width,
            height,
            format: ImageFormat::Yuv422,
            progressive,
            top_field_first: tff,
            crop: CropMargins::default(),
            position: 0,
            frame_rate: Rational::new(25, 1),
            sample_aspect: Rational::new(1, 1),
        }
    }

    fn target(width: u32, height: u32, progressive: bool, tff: bool) -> TargetSpec {
        TargetSpec {
            width,
            height,
            format: ImageFormat::Yuv422,
            progressive,
            top_field_first: tff,
        }
    }

    #[test]
    fn identical_attributes_pass_through() {
        for (progressive, tff) in [(true, false), (false, true), (false, false)] {
            let mut desc = descriptor(720, 576, progressive, tff);
            let plan = plan(&mut desc, &target(720, 576, progressive, tff), ScaleAlgorithm::Lanczos);
            assert!(plan.is_empty());
            assert_eq!(plan.chain(), None);
        }
    }

    #[test]
    fn progressive_source_satisfies_interlaced_target() {
        let mut desc = descriptor(1920, 1080, true, false);
        let plan = plan(&mut desc, &target(1920, 1080, false, true), ScaleAlgorithm::Lanczos);
        assert!(plan.is_empty());
    }

    #[test]
    fn crop_is_folded_in_and_consumed() {
        let mut desc = descriptor(720, 576, true, false);
        desc.crop = CropMargins {
            left: 8,
            right: 12,
            top: 2,
            bottom: 6,
        };
        let tgt = target(700, 568, true, false);
        let first = plan(&mut desc, &tgt, ScaleAlgorithm::Lanczos);
        assert_eq!(first.working_size(), (700, 568));
        assert_eq!(
            first.stages(),
            &[Stage::Crop {
                x: 8,
                y: 2,
                width: 700,
                height: 568
            }]
        );
        assert!(desc.crop.is_empty());

        let second = plan(&mut desc, &tgt, ScaleAlgorithm::Lanczos);
        assert_eq!(second.count("crop"), 0);
        assert_eq!(second.working_size(), (720, 576));
    }

    #[test]
    fn field_order_mismatch_gets_single_fix() {
        let mut desc = descriptor(720, 576, false, false);
        let plan = plan(&mut desc, &target(720, 576, false, true), ScaleAlgorithm::Lanczos);
        assert_eq!(plan.stages(), &[Stage::FieldOrder { top_field_first: true }]);
        assert_eq!(plan.count("deinterlace"), 0);
        assert_eq!(plan.chain().as_deref(), Some("fieldorder=tff"));
    }

    #[test]
    fn reinterlace_subsumes_field_order_fix() {
        let mut desc = descriptor(720, 576, false, false);
        let planned = plan(&mut desc, &target(1920, 1080, false, true), ScaleAlgorithm::Lanczos);
        assert_eq!(planned.count("fieldorder"), 0);
        assert!(planned.reinterlaced());
        assert_eq!(
            planned.chain().as_deref(),
            Some("yadif=mode=1,scale=w=1920:h=1080:flags=lanczos,tinterlace=mode=4")
        );

        let mut desc = descriptor(1920, 1080, false, true);
        let planned = plan(&mut desc, &target(720, 576, false, false), ScaleAlgorithm::Lanczos);
        assert_eq!(planned.stages().last(), Some(&Stage::Reinterlace { top_field_first: false }));
        assert!(planned.chain().unwrap().ends_with("tinterlace=mode=5"));
    }

    #[test]
    fn interlaced_to_progressive_resize() {
        let mut desc = descriptor(720, 576, false, true);
        let plan = plan(&mut desc, &target(1280, 720, true, false), ScaleAlgorithm::Lanczos);
        assert_eq!(
            plan.stages(),
            &[
                Stage::Deinterlace(FieldRate::Single),
                Stage::Scale {
                    width: 1280,
                    height: 720,
                    algorithm: ScaleAlgorithm::Lanczos,
                    interlaced: false
                }
            ]
        );
        assert!(plan.deinterlaced());
    }

    #[test]
    fn deinterlace_fallback_without_resize() {
        let mut desc = descriptor(720, 576, false, true);
        let plan = plan(&mut desc, &target(720, 576, true, false), ScaleAlgorithm::Lanczos);
        assert_eq!(plan.stages(), &[Stage::Deinterlace(FieldRate::Single)]);
        assert_eq!(plan.chain().as_deref(), Some("yadif=mode=0"));
    }

    #[test]
    fn crop_then_resize_keeps_order() {
        let mut desc = descriptor(720, 576, false, true);
        desc.crop.top = 16;
        desc.crop.bottom = 16;
        let plan = plan(&mut desc, &target(640, 360, true, false), ScaleAlgorithm::Bicubic);
        let names: Vec<_> = plan.stages().iter().map(Stage::name).collect();
        assert_eq!(names, ["crop", "deinterlace", "scale"]);
        assert_eq!(plan.working_size(), (720, 544));
    }

    #[test]
    fn format_change_alone_needs_a_stage() {
        let mut desc = descriptor(720, 576, false, true);
        let mut tgt = target(720, 576, false, true);
        tgt.format = ImageFormat::Rgb24a;
        let plan = plan(&mut desc, &tgt, ScaleAlgorithm::Lanczos);
        assert_eq!(
            plan.chain().as_deref(),
            Some("scale=w=720:h=576:flags=lanczos:interl=1")
        );
    }

    #[test]
    fn user_chain_composition() {
        let mut desc = descriptor(720, 576, true, false);
        let empty = plan(&mut desc, &target(720, 576, true, false), ScaleAlgorithm::Lanczos);
        assert_eq!(empty.compose(None), None);
        assert_eq!(empty.compose(Some("copy")), None);
        assert_eq!(empty.compose(Some(" ")), None);
        assert_eq!(empty.compose(Some("hflip")).as_deref(), Some("hflip"));

        let mut desc = descriptor(720, 576, false, true);
        let planned = plan(&mut desc, &target(720, 576, true, false), ScaleAlgorithm::Lanczos);
        assert_eq!(
            planned.compose(Some("format=pix_fmts=yuv420p")).as_deref(),
            Some("yadif=mode=0,format=pix_fmts=yuv420p")
        );
    }

    #[test]
    fn target_defaults_follow_source() {
        let mut desc = descriptor(720, 576, false, true);
        desc.crop.left = 20;
        let props = Properties::new();
        let request = ImageRequest::new(ImageFormat::Yuv422, 0, 0);
        let tgt = TargetSpec::from_request(&request, &desc, &props);
        assert_eq!((tgt.width, tgt.height), (700, 576));
        assert!(!tgt.progressive);
        assert!(tgt.top_field_first);

        let mut props = Properties::new();
        props.set_int(keys::CONSUMER_PROGRESSIVE, 1);
        let tgt = TargetSpec::from_request(&ImageRequest::new(ImageFormat::Yuv422, 1280, 720), &desc, &props);
        assert_eq!((tgt.width, tgt.height), (1280, 720));
        assert!(tgt.progressive);
    }
}
