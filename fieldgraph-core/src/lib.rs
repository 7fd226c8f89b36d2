//! # fieldgraph Core
//!
//! Adaptive crop, deinterlace, scale, reinterlace and field-order filter
//! graphs, planned from each frame's own state and driven one frame at a time.

// ============================================================================
// Host Substrate
// ============================================================================
pub mod format;
pub mod properties;
pub mod frame;

// ============================================================================
// Planning
// ============================================================================
pub mod planner;

// ============================================================================
// Filter Engines
// ============================================================================
pub mod engine;
pub mod soft;

// ============================================================================
// Graph Sessions / Filter Instance
// ============================================================================
pub mod session;
pub mod filter;
pub mod config;

pub use config::{ConfigError, FilterConfig, Profile};
pub use engine::{EngineError, FilterEngine, FilterGraph};
pub use filter::{FilterError, GraphFilter};
pub use format::{FormatError, ImageFormat, PixelFormat, Rational};
pub use frame::{Frame, FrameDescriptor, FrameError, Image, ImageRequest};
pub use planner::{plan, FilterPlan, ScaleAlgorithm, Stage, TargetSpec};
pub use properties::Properties;
pub use session::{GraphSession, PushOutcome, SessionCache, SessionError, SessionState};
pub use soft::SoftwareEngine;

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
