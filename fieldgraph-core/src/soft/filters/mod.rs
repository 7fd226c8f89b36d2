//! # Software Filters
//!
//! Filter trait and the global registry the software graph instantiates
//! filters from. Built-in filters are registered on first use; hosts can
//! register their own under new names.

mod crop;
mod fieldorder;
mod passthrough;
mod scale;
mod tinterlace;
mod yadif;

pub use crop::Crop;
pub use fieldorder::FieldOrder;
pub use passthrough::{Format, Passthrough};
pub use scale::Scale;
pub use tinterlace::Tinterlace;
pub use yadif::Yadif;

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::engine::{EngineError, EngineResult};
use crate::format::{PixelFormat, Rational};
use crate::planner::ScaleAlgorithm;

use super::chain::{FilterArg, FilterOptions};
use super::picture::Picture;

/// Properties of the link between two filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkProps {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub frame_rate: Rational,
    pub time_base: Rational,
}

/// Graph-wide defaults, set through the scale options string
/// (`flags=bicubic:interl=1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphOptions {
    pub scale_algorithm: ScaleAlgorithm,
    pub interlaced_scaling: bool,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            scale_algorithm: ScaleAlgorithm::Bicubic,
            interlaced_scaling: false,
        }
    }
}

impl GraphOptions {
    pub fn parse(options: &str) -> EngineResult<Self> {
        let mut parsed = Self::default();
        let opts = FilterOptions::resolve("graph", &super::chain::parse_args(options), &["flags", "interl"])?;
        if let Some(flags) = opts.get("flags") {
            // First recognised algorithm in a `+`-joined flag list wins
            parsed.scale_algorithm = flags
                .split('+')
                .find_map(ScaleAlgorithm::from_flag)
                .ok_or_else(|| EngineError::InvalidArgument(format!("unknown scale flags '{}'", flags)))?;
        }
        if let Some(interl) = opts.get_i64("interl")? {
            parsed.interlaced_scaling = interl != 0;
        }
        Ok(parsed)
    }
}

pub trait VideoFilter: Send {
    fn name(&self) -> &str;

    /// Validate the input link and describe the output link.
    fn configure(&mut self, input: LinkProps) -> EngineResult<LinkProps>;

    /// Process one picture. Temporal filters may return nothing yet, or more
    /// than one picture.
    fn filter_frame(&mut self, picture: Picture) -> EngineResult<Vec<Picture>>;

    /// End of stream: emit whatever is still buffered.
    fn flush(&mut self) -> EngineResult<Vec<Picture>> {
        Ok(Vec::new())
    }
}

// ============================================================================
// Registry
// ============================================================================

type FilterFactory = dyn Fn(&FilterOptions, &GraphOptions) -> EngineResult<Box<dyn VideoFilter>> + Send + Sync;

#[derive(Clone)]
struct RegisteredFilter {
    options: &'static [&'static str],
    factory: Arc<FilterFactory>,
}

pub struct FilterRegistry {
    filters: HashMap<String, RegisteredFilter>,
}

impl FilterRegistry {
    pub fn global() -> &'static RwLock<Self> {
        static REGISTRY: Lazy<RwLock<FilterRegistry>> = Lazy::new(|| RwLock::new(FilterRegistry::with_defaults()));
        &REGISTRY
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self {
            filters: HashMap::new(),
        };
        registry.register_builtin_filters();
        registry
    }

    /// Register `name` with its ordered option table. Replaces any filter
    /// already registered under that name.
    pub fn register_filter(
        &mut self,
        name: impl Into<String>,
        options: &'static [&'static str],
        factory: impl Fn(&FilterOptions, &GraphOptions) -> EngineResult<Box<dyn VideoFilter>> + Send + Sync + 'static,
    ) {
        self.filters.insert(
            name.into(),
            RegisteredFilter {
                options,
                factory: Arc::new(factory),
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    pub fn list_filters(&self) -> Vec<String> {
        let mut names: Vec<String> = self.filters.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn create(&self, name: &str, args: &[FilterArg], graph: &GraphOptions) -> EngineResult<Box<dyn VideoFilter>> {
        let entry = self
            .filters
            .get(name)
            .ok_or_else(|| EngineError::FilterNotFound(name.to_string()))?;
        let options = FilterOptions::resolve(name, args, entry.options)?;
        (entry.factory)(&options, graph)
    }

    fn register_builtin_filters(&mut self) {
        self.register_filter("copy", &[], |_, _| Ok(Box::new(Passthrough::new("copy"))));
        self.register_filter("null", &[], |_, _| Ok(Box::new(Passthrough::new("null"))));
        self.register_filter("format", Format::OPTIONS, |opts, graph| {
            Ok(Box::new(Format::from_options(opts, graph)?))
        });
        self.register_filter("crop", Crop::OPTIONS, |opts, _| Ok(Box::new(Crop::from_options(opts)?)));
        self.register_filter("scale", Scale::OPTIONS, |opts, graph| {
            Ok(Box::new(Scale::from_options(opts, graph)?))
        });
        self.register_filter("yadif", Yadif::OPTIONS, |opts, _| Ok(Box::new(Yadif::from_options(opts)?)));
        self.register_filter("tinterlace", Tinterlace::OPTIONS, |opts, _| {
            Ok(Box::new(Tinterlace::from_options(opts)?))
        });
        self.register_filter("fieldorder", FieldOrder::OPTIONS, |opts, _| {
            Ok(Box::new(FieldOrder::from_options(opts)?))
        });
    }
}
