//! # Software Engine
//!
//! Pure Rust implementation of the filter engine contract. Graphs are a
//! single linear chain: one `buffer` source, the parsed filters, one
//! `buffersink`. Frames run through the chain as soon as they are submitted
//! and queue at the sink; the sink converts to its negotiated format.

mod chain;
pub mod filters;
mod picture;
mod resample;

pub use chain::{FilterArg, FilterOptions, FilterSpec};
pub use filters::{FilterRegistry, GraphOptions, LinkProps, VideoFilter};
pub use picture::{Picture, Plane};

use std::collections::VecDeque;

use tracing::debug;

use crate::engine::{
    EngineError, EngineFrame, EngineResult, FilterEngine, FilterGraph, NodeId, SourceArgs, SubmitFlags,
};
use crate::format::PixelFormat;

/// Row alignment of frames handed out by the sink.
pub const FRAME_ALIGN: usize = 32;

#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareEngine;

impl SoftwareEngine {
    pub fn new() -> Self {
        Self
    }
}

impl FilterEngine for SoftwareEngine {
    type Graph = SoftwareGraph;

    fn name(&self) -> &str {
        "software"
    }

    fn alloc_graph(&self) -> EngineResult<SoftwareGraph> {
        Ok(SoftwareGraph::new())
    }
}

// ============================================================================
// Graph
// ============================================================================

enum NodeKind {
    Source {
        args: SourceArgs,
        closed: bool,
    },
    Sink {
        formats: Vec<PixelFormat>,
        output: Option<PixelFormat>,
        queue: VecDeque<EngineFrame>,
    },
    Filter(Box<dyn VideoFilter>),
}

struct Node {
    name: String,
    kind: NodeKind,
}

struct Link {
    source: NodeId,
    filters: Vec<NodeId>,
    sink: NodeId,
}

pub struct SoftwareGraph {
    nodes: Vec<Node>,
    link: Option<Link>,
    options: GraphOptions,
    configured: bool,
}

impl Default for SoftwareGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            link: None,
            options: GraphOptions::default(),
            configured: false,
        }
    }

    pub fn options(&self) -> GraphOptions {
        self.options
    }

    /// Instance names in creation order.
    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    fn add_node(&mut self, name: &str, kind: NodeKind) -> EngineResult<NodeId> {
        if self.configured {
            return Err(EngineError::InvalidArgument("graph is already configured".into()));
        }
        if self.nodes.iter().any(|n| n.name == name) {
            return Err(EngineError::InvalidArgument(format!("duplicate filter name '{}'", name)));
        }
        self.nodes.push(Node {
            name: name.to_string(),
            kind,
        });
        Ok(NodeId(self.nodes.len() - 1))
    }

    fn node_mut(&mut self, id: NodeId) -> EngineResult<&mut Node> {
        self.nodes.get_mut(id.0).ok_or(EngineError::InvalidNode(id))
    }

    fn link(&self) -> EngineResult<&Link> {
        match (&self.link, self.configured) {
            (Some(link), true) => Ok(link),
            _ => Err(EngineError::NotConfigured),
        }
    }

    fn check_source(&self, id: NodeId) -> EngineResult<()> {
        if self.link()?.source != id {
            return Err(EngineError::InvalidNode(id));
        }
        Ok(())
    }

    /// Run pictures through the filters starting at `start`, flushing each
    /// filter on the way when `flush` is set, and queue the results.
    fn run(&mut self, mut pending: Vec<Picture>, flush: bool) -> EngineResult<()> {
        let (filters, sink) = {
            let link = self.link()?;
            (link.filters.clone(), link.sink)
        };

        for id in filters {
            let node = self.node_mut(id)?;
            let NodeKind::Filter(filter) = &mut node.kind else {
                return Err(EngineError::InvalidNode(id));
            };
            let mut out = Vec::with_capacity(pending.len());
            for picture in pending {
                out.extend(filter.filter_frame(picture)?);
            }
            if flush {
                out.extend(filter.flush()?);
            }
            pending = out;
        }

        let algorithm = self.options.scale_algorithm;
        let node = self.node_mut(sink)?;
        let NodeKind::Sink { output, queue, .. } = &mut node.kind else {
            return Err(EngineError::InvalidNode(sink));
        };
        let output = output.ok_or(EngineError::NotConfigured)?;
        for picture in pending {
            queue.push_back(picture.convert(output, algorithm).to_frame(FRAME_ALIGN));
        }
        Ok(())
    }
}

impl FilterGraph for SoftwareGraph {
    fn set_scale_options(&mut self, options: &str) -> EngineResult<()> {
        self.options = GraphOptions::parse(options)?;
        Ok(())
    }

    fn create_filter(&mut self, filter: &str, name: &str, args: Option<&str>) -> EngineResult<NodeId> {
        let kind = match filter {
            "buffer" => {
                let args = args.ok_or_else(|| EngineError::InvalidArgument("buffer needs arguments".into()))?;
                NodeKind::Source {
                    args: SourceArgs::parse(args)?,
                    closed: false,
                }
            }
            "buffersink" => NodeKind::Sink {
                formats: Vec::new(),
                output: None,
                queue: VecDeque::new(),
            },
            other => {
                let args = args.map(chain::parse_args).unwrap_or_default();
                NodeKind::Filter(FilterRegistry::global().read().create(other, &args, &self.options)?)
            }
        };
        self.add_node(name, kind)
    }

    fn set_output_formats(&mut self, sink: NodeId, formats: &[PixelFormat]) -> EngineResult<()> {
        let node = self.node_mut(sink)?;
        match &mut node.kind {
            NodeKind::Sink { formats: allowed, .. } => {
                *allowed = formats.to_vec();
                Ok(())
            }
            _ => Err(EngineError::InvalidNode(sink)),
        }
    }

    fn parse(&mut self, chain: &str, source: NodeId, sink: NodeId) -> EngineResult<()> {
        if self.link.is_some() {
            return Err(EngineError::InvalidArgument("graph already has a chain".into()));
        }
        if !matches!(self.nodes.get(source.0).map(|n| &n.kind), Some(NodeKind::Source { .. })) {
            return Err(EngineError::InvalidNode(source));
        }
        if !matches!(self.nodes.get(sink.0).map(|n| &n.kind), Some(NodeKind::Sink { .. })) {
            return Err(EngineError::InvalidNode(sink));
        }

        let specs = chain::parse_chain(chain)?;
        let mut filters = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            let filter = FilterRegistry::global()
                .read()
                .create(&spec.name, &spec.args, &self.options)?;
            let name = format!("Parsed_{}_{}", spec.name, index);
            filters.push(self.add_node(&name, NodeKind::Filter(filter))?);
        }

        self.link = Some(Link { source, filters, sink });
        Ok(())
    }

    fn configure(&mut self) -> EngineResult<()> {
        let (source, filters, sink) = match &self.link {
            Some(link) => (link.source, link.filters.clone(), link.sink),
            None => return Err(EngineError::Link("no chain between source and sink".into())),
        };

        for (index, node) in self.nodes.iter().enumerate() {
            let id = NodeId(index);
            if id != source && id != sink && !filters.contains(&id) {
                return Err(EngineError::Link(format!("filter '{}' is not connected", node.name)));
            }
        }

        let NodeKind::Source { args, .. } = &self.node_mut(source)?.kind else {
            return Err(EngineError::InvalidNode(source));
        };
        let mut props = LinkProps {
            width: args.width,
            height: args.height,
            format: args.format,
            frame_rate: args.frame_rate,
            time_base: args.time_base,
        };

        for id in &filters {
            let node = self.node_mut(*id)?;
            let name = node.name.clone();
            let NodeKind::Filter(filter) = &mut node.kind else {
                return Err(EngineError::InvalidNode(*id));
            };
            props = filter.configure(props)?;
            debug!(
                "{} -> {}x{} {} @ {}",
                name, props.width, props.height, props.format, props.frame_rate
            );
        }

        let node = self.node_mut(sink)?;
        let NodeKind::Sink { formats, output, .. } = &mut node.kind else {
            return Err(EngineError::InvalidNode(sink));
        };
        let negotiated = if formats.is_empty() || formats.contains(&props.format) {
            props.format
        } else {
            formats[0]
        };
        *output = Some(negotiated);

        self.configured = true;
        Ok(())
    }

    fn add_frame(&mut self, source: NodeId, frame: &EngineFrame, _flags: SubmitFlags) -> EngineResult<()> {
        // Frames are always copied into pictures, so the caller keeps its own
        self.check_source(source)?;
        let NodeKind::Source { args, closed } = &self.node_mut(source)?.kind else {
            return Err(EngineError::InvalidNode(source));
        };
        if *closed {
            return Err(EngineError::Eof);
        }
        if frame.format != args.format || frame.width != args.width || frame.height != args.height {
            return Err(EngineError::InvalidArgument(format!(
                "frame {}x{} {} does not match source {}x{} {}",
                frame.width, frame.height, frame.format, args.width, args.height, args.format
            )));
        }

        let picture = Picture::from_frame(frame)?;
        self.run(vec![picture], false)
    }

    fn close_source(&mut self, source: NodeId) -> EngineResult<()> {
        self.check_source(source)?;
        let NodeKind::Source { closed, .. } = &mut self.node_mut(source)?.kind else {
            return Err(EngineError::InvalidNode(source));
        };
        if *closed {
            return Ok(());
        }
        *closed = true;
        self.run(Vec::new(), true)
    }

    fn get_frame(&mut self, sink: NodeId) -> EngineResult<EngineFrame> {
        let source = self.link()?.source;
        let closed = matches!(
            self.nodes.get(source.0).map(|n| &n.kind),
            Some(NodeKind::Source { closed: true, .. })
        );

        let node = self.node_mut(sink)?;
        let NodeKind::Sink { queue, .. } = &mut node.kind else {
            return Err(EngineError::InvalidNode(sink));
        };
        match queue.pop_front() {
            Some(frame) => Ok(frame),
            None if closed => Err(EngineError::Eof),
            None => Err(EngineError::Again),
        }
    }
}
