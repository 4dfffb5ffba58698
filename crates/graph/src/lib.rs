//! CiteWeave Graph Library
//!
//! The in-memory side of a conversation view:
//! - `model`: arena-backed citation tree with fan-out and dedup rules
//! - `annotations`: per-node keyword tags and pinned metadata fields
//! - `layout`: deterministic, non-overlapping node positions

pub mod annotations;
pub mod layout;
pub mod model;

pub use annotations::{Annotations, MetadataField};
pub use layout::{Layout, LayoutEngine, LayoutNode, NodeLayout, PanelMetrics, PanelSide, PanelSize, Rect};
pub use model::{ExpandOutcome, GraphModel, GraphNode, NodeId};
