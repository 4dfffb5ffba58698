//! Layout engine
//!
//! Pure function from the visible tree (plus annotation panel sizes) to
//! node positions. Passes, in order:
//!
//! 1. `x = depth * level_spacing`
//! 2. seed `y`: previous position if the node was laid out before,
//!    otherwise symmetric around the parent (new siblings of already
//!    placed nodes go below the lowest one)
//! 3. pick panel sides and build bounding boxes
//! 4. bounded pairwise push-apart over all visible nodes, clamped to the viewport
//! 5. flip panels of nodes that still collide when the flip helps
//! 6. sibling minimum gap, cascading to later siblings
//! 7. settle sweep: anything still overlapping moves down
//!
//! Step 7 always terminates with no overlaps, so a crowded tree grows
//! past the viewport rather than overlapping.

use crate::annotations::Annotations;
use crate::model::{GraphModel, NodeId};
use citeweave_common::config::LayoutSettings;
use citeweave_common::metrics;
use citeweave_common::models::Paper;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Distance between a node glyph and its panels
pub const PANEL_GAP: f64 = 6.0;

/// Overlap tolerance for float comparisons
const EPSILON: f64 = 1e-6;

/// Wrapped lines shown per metadata field
const MAX_LINES_PER_FIELD: usize = 4;

/// Axis-aligned rectangle, origin at the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    fn overlaps_x(&self, other: &Rect) -> bool {
        self.x < other.right() - EPSILON && other.x < self.right() - EPSILON
    }

    fn overlaps_y(&self, other: &Rect) -> bool {
        self.y < other.bottom() - EPSILON && other.y < self.bottom() - EPSILON
    }

    /// Positive-area intersection
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.overlaps_x(other) && self.overlaps_y(other)
    }

    pub fn intersection_area(&self, other: &Rect) -> f64 {
        let w = self.right().min(other.right()) - self.x.max(other.x);
        let h = self.bottom().min(other.bottom()) - self.y.max(other.y);
        if w > 0.0 && h > 0.0 {
            w * h
        } else {
            0.0
        }
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(x, y, self.right().max(other.right()) - x, self.bottom().max(other.bottom()) - y)
    }

    fn offset(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelSide {
    Right,
    Left,
    Below,
    Above,
}

impl PanelSide {
    fn flipped(self) -> Self {
        match self {
            PanelSide::Right => PanelSide::Left,
            PanelSide::Left => PanelSide::Right,
            PanelSide::Below => PanelSide::Above,
            PanelSide::Above => PanelSide::Below,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanelSize {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanelPlacement {
    pub side: PanelSide,
    pub rect: Rect,
}

/// Text metrics used to size annotation panels
#[derive(Debug, Clone, Copy)]
pub struct PanelMetrics {
    pub char_width: f64,
    pub line_height: f64,
    pub padding: f64,
    pub max_width: f64,
}

impl Default for PanelMetrics {
    fn default() -> Self {
        Self {
            char_width: 7.0,
            line_height: 18.0,
            padding: 8.0,
            max_width: 240.0,
        }
    }
}

impl PanelMetrics {
    fn chars_per_line(&self) -> usize {
        (((self.max_width - 2.0 * self.padding) / self.char_width).floor() as usize).max(1)
    }

    fn panel(&self, longest_chars: usize, lines: usize) -> Option<PanelSize> {
        if lines == 0 {
            return None;
        }
        let width = (longest_chars as f64 * self.char_width + 2.0 * self.padding).min(self.max_width);
        Some(PanelSize {
            width,
            height: lines as f64 * self.line_height + 2.0 * self.padding,
        })
    }

    /// One line per keyword tag
    pub fn tag_panel(&self, annotations: &Annotations) -> Option<PanelSize> {
        let longest = annotations
            .keyword_tags
            .iter()
            .map(|t| t.chars().count())
            .max()
            .unwrap_or(0);
        self.panel(longest, annotations.keyword_tags.len())
    }

    /// `Label: value` per selected field the paper has, wrapped to the panel width
    pub fn metadata_panel(&self, annotations: &Annotations, paper: &Paper) -> Option<PanelSize> {
        let per_line = self.chars_per_line();
        let mut longest = 0;
        let mut lines = 0;

        for (field, text) in annotations.metadata_lines(paper) {
            let chars = field.label().chars().count() + 2 + text.chars().count();
            longest = longest.max(chars.min(per_line));
            lines += chars.div_ceil(per_line).clamp(1, MAX_LINES_PER_FIELD);
        }
        self.panel(longest, lines)
    }
}

/// One visible node as the engine sees it
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub depth: usize,
    pub tag_panel: Option<PanelSize>,
    pub metadata_panel: Option<PanelSize>,
}

impl LayoutNode {
    /// Visible nodes of a graph in depth-first order
    pub fn from_graph(graph: &GraphModel, metrics: &PanelMetrics) -> Vec<LayoutNode> {
        graph
            .visible_nodes()
            .into_iter()
            .filter_map(|id| graph.node(id).ok())
            .map(|node| {
                let metadata_panel = graph
                    .paper(node.id)
                    .ok()
                    .and_then(|paper| metrics.metadata_panel(&node.annotations, paper));
                LayoutNode {
                    id: node.id,
                    parent: node.parent,
                    depth: node.depth,
                    tag_panel: metrics.tag_panel(&node.annotations),
                    metadata_panel,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeLayout {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    pub bbox: Rect,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_panel: Option<PanelPlacement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_panel: Option<PanelPlacement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub nodes: Vec<NodeLayout>,
    pub edges: Vec<(NodeId, NodeId)>,
    pub bounds: Option<Rect>,
    /// Push-apart iterations used
    pub iterations: usize,
    /// Moves made by the settle sweep
    pub settle_moves: usize,
}

impl Layout {
    pub fn position(&self, id: NodeId) -> Option<(f64, f64)> {
        self.nodes.iter().find(|n| n.id == id).map(|n| (n.x, n.y))
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeLayout> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// First pair of overlapping bounding boxes, if any
    pub fn first_overlap(&self) -> Option<(NodeId, NodeId)> {
        for (i, a) in self.nodes.iter().enumerate() {
            for b in &self.nodes[i + 1..] {
                if a.bbox.overlaps(&b.bbox) {
                    return Some((a.id, b.id));
                }
            }
        }
        None
    }
}

/// Working state for one node during a layout run
struct Slot {
    id: NodeId,
    parent: Option<usize>,
    x: f64,
    y: f64,
    tag: Option<(PanelSize, PanelSide)>,
    metadata: Option<(PanelSize, PanelSide)>,
}

pub struct LayoutEngine {
    settings: LayoutSettings,
    metrics: PanelMetrics,
}

impl LayoutEngine {
    pub fn new(settings: LayoutSettings) -> Self {
        Self {
            settings,
            metrics: PanelMetrics::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: PanelMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn settings(&self) -> &LayoutSettings {
        &self.settings
    }

    /// Fresh layout of the visible tree
    pub fn layout(&self, graph: &GraphModel) -> Layout {
        self.run(graph, None)
    }

    /// Layout after a mutation, keeping previously placed nodes where they were
    pub fn relayout(&self, graph: &GraphModel, previous: &Layout) -> Layout {
        self.run(graph, Some(previous))
    }

    fn run(&self, graph: &GraphModel, previous: Option<&Layout>) -> Layout {
        let nodes = LayoutNode::from_graph(graph, &self.metrics);
        let mut layout = self.compute(&nodes, previous);
        layout.edges = graph.visible_edges();
        layout
    }

    /// Position an explicit node list. Parents must precede their children.
    pub fn compute(&self, nodes: &[LayoutNode], previous: Option<&Layout>) -> Layout {
        if nodes.is_empty() {
            return Layout::default();
        }

        let mut slots = self.seed(nodes, previous);
        for slot in slots.iter_mut() {
            self.choose_sides(slot);
        }

        let iterations = self.push_apart(&mut slots);
        self.flip_colliding_panels(&mut slots);
        self.enforce_sibling_gap(&mut slots);
        let settle_moves = self.settle(&mut slots);

        let nodes: Vec<NodeLayout> = slots.iter().map(|slot| self.node_layout(slot)).collect();
        let bounds = nodes.iter().map(|n| n.bbox).reduce(|a, b| a.union(&b));

        metrics::record_layout(iterations, settle_moves);
        debug!(
            nodes = nodes.len(),
            iterations,
            settle_moves,
            "Layout computed"
        );

        Layout {
            nodes,
            edges: Vec::new(),
            bounds,
            iterations,
            settle_moves,
        }
    }

    /// Horizontal coordinates and seeded vertical ones
    fn seed(&self, nodes: &[LayoutNode], previous: Option<&Layout>) -> Vec<Slot> {
        let s = &self.settings;
        let index: HashMap<NodeId, usize> = nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
        let previous_y = |id: NodeId| previous.and_then(|p| p.position(id)).map(|(_, y)| y);

        let mut slots: Vec<Slot> = nodes
            .iter()
            .map(|n| Slot {
                id: n.id,
                parent: n.parent.and_then(|p| index.get(&p).copied()),
                x: n.depth as f64 * s.level_spacing,
                y: previous_y(n.id).unwrap_or(s.viewport_height / 2.0),
                tag: n.tag_panel.map(|p| (p, PanelSide::Right)),
                metadata: n.metadata_panel.map(|p| (p, PanelSide::Below)),
            })
            .collect();

        // Sibling groups in input order
        let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
        for (i, slot) in slots.iter().enumerate() {
            if let Some(parent) = slot.parent {
                match groups.iter_mut().find(|(p, _)| *p == parent) {
                    Some((_, members)) => members.push(i),
                    None => groups.push((parent, vec![i])),
                }
            }
        }

        // Groups appear in parent order because parents precede children
        for (parent, members) in groups {
            let parent_y = slots[parent].y;
            let placed: Vec<f64> = members.iter().filter_map(|&i| previous_y(slots[i].id)).collect();

            if placed.is_empty() {
                let mid = (members.len() as f64 - 1.0) / 2.0;
                for (k, &i) in members.iter().enumerate() {
                    slots[i].y = parent_y + (k as f64 - mid) * s.sibling_spacing;
                }
            } else {
                let mut lowest = placed.iter().copied().fold(f64::MIN, f64::max);
                for &i in &members {
                    if previous_y(slots[i].id).is_none() {
                        lowest += s.sibling_spacing;
                        slots[i].y = lowest;
                    }
                }
            }
        }
        slots
    }

    fn circle(&self, slot: &Slot) -> Rect {
        let r = self.settings.node_radius;
        Rect::new(slot.x - r, slot.y - r, 2.0 * r, 2.0 * r)
    }

    fn panel_rect(&self, slot: &Slot, size: PanelSize, side: PanelSide) -> Rect {
        let r = self.settings.node_radius;
        match side {
            PanelSide::Right => Rect::new(slot.x + r + PANEL_GAP, slot.y - size.height / 2.0, size.width, size.height),
            PanelSide::Left => Rect::new(
                slot.x - r - PANEL_GAP - size.width,
                slot.y - size.height / 2.0,
                size.width,
                size.height,
            ),
            PanelSide::Below => Rect::new(slot.x - size.width / 2.0, slot.y + r + PANEL_GAP, size.width, size.height),
            PanelSide::Above => Rect::new(
                slot.x - size.width / 2.0,
                slot.y - r - PANEL_GAP - size.height,
                size.width,
                size.height,
            ),
        }
    }

    /// Space left between a panel and the viewport edge it faces
    fn room(&self, rect: &Rect, side: PanelSide) -> f64 {
        match side {
            PanelSide::Right => self.settings.viewport_width - rect.right(),
            PanelSide::Left => rect.x,
            PanelSide::Below => self.settings.viewport_height - rect.bottom(),
            PanelSide::Above => rect.y,
        }
    }

    /// Least overlap with the node's own glyph (and, for metadata, its tag
    /// panel); the default side wins while it fits the viewport, otherwise
    /// the side with more room.
    fn pick_side(&self, slot: &Slot, size: PanelSize, default: PanelSide, own: &[Rect]) -> PanelSide {
        let score = |side: PanelSide| {
            let rect = self.panel_rect(slot, size, side);
            let overlap: f64 = own.iter().map(|o| o.intersection_area(&rect)).sum();
            (overlap, self.room(&rect, side))
        };

        let (first_overlap, first_room) = score(default);
        let (second_overlap, second_room) = score(default.flipped());

        if first_overlap + EPSILON < second_overlap {
            default
        } else if second_overlap + EPSILON < first_overlap {
            default.flipped()
        } else if first_room >= 0.0 || first_room >= second_room {
            default
        } else {
            default.flipped()
        }
    }

    fn choose_sides(&self, slot: &mut Slot) {
        let circle = self.circle(slot);

        if let Some((size, _)) = slot.tag {
            let side = self.pick_side(slot, size, PanelSide::Right, &[circle]);
            slot.tag = Some((size, side));
        }
        if let Some((size, _)) = slot.metadata {
            let mut own = vec![circle];
            if let Some((tag_size, tag_side)) = slot.tag {
                own.push(self.panel_rect(slot, tag_size, tag_side));
            }
            let side = self.pick_side(slot, size, PanelSide::Below, &own);
            slot.metadata = Some((size, side));
        }
    }

    fn bbox(&self, slot: &Slot) -> Rect {
        let mut bbox = self.circle(slot);
        for (size, side) in slot.tag.iter().chain(slot.metadata.iter()) {
            bbox = bbox.union(&self.panel_rect(slot, *size, *side));
        }
        bbox
    }

    /// Keep a box inside the viewport vertically; tall boxes pin to the top
    fn clamp(&self, slot: &mut Slot) {
        let bbox = self.bbox(slot);
        let height = self.settings.viewport_height;
        if bbox.bottom() > height {
            slot.y -= bbox.bottom() - height;
        }
        let bbox = self.bbox(slot);
        if bbox.y < 0.0 {
            slot.y -= bbox.y;
        }
    }

    /// Pairwise push-apart; returns the iterations used
    fn push_apart(&self, slots: &mut [Slot]) -> usize {
        let margin = self.settings.margin;
        let mut iterations = 0;

        while iterations < self.settings.max_iterations {
            iterations += 1;
            let mut moved = false;

            for i in 0..slots.len() {
                for j in (i + 1)..slots.len() {
                    let a = self.bbox(&slots[i]);
                    let b = self.bbox(&slots[j]);
                    if !a.overlaps_x(&b) {
                        continue;
                    }

                    // Lower index stays on top when centers tie
                    let (upper, lower, upper_box, lower_box) = if b.center_y() < a.center_y() {
                        (j, i, b, a)
                    } else {
                        (i, j, a, b)
                    };

                    let shortfall = upper_box.bottom() + margin - lower_box.y;
                    if shortfall > EPSILON {
                        slots[upper].y -= shortfall / 2.0;
                        slots[lower].y += shortfall / 2.0;
                        moved = true;
                    }
                }
            }

            for slot in slots.iter_mut() {
                self.clamp(slot);
            }
            if !moved {
                break;
            }
        }
        iterations
    }

    fn collisions(&self, slots: &[Slot], index: usize, bbox: &Rect) -> usize {
        slots
            .iter()
            .enumerate()
            .filter(|(j, other)| *j != index && bbox.overlaps(&self.bbox(other)))
            .count()
    }

    /// Try the other side for each panel of a still-colliding node
    fn flip_colliding_panels(&self, slots: &mut [Slot]) {
        for i in 0..slots.len() {
            let current = self.collisions(slots, i, &self.bbox(&slots[i]));
            if current == 0 {
                continue;
            }

            let mut best = current;
            for flip_tag in [false, true] {
                for flip_metadata in [false, true] {
                    if !flip_tag && !flip_metadata {
                        continue;
                    }
                    let original = (slots[i].tag, slots[i].metadata);
                    if flip_tag {
                        slots[i].tag = slots[i].tag.map(|(size, side)| (size, side.flipped()));
                    }
                    if flip_metadata {
                        slots[i].metadata = slots[i].metadata.map(|(size, side)| (size, side.flipped()));
                    }

                    let count = self.collisions(slots, i, &self.bbox(&slots[i]));
                    if count < best {
                        best = count;
                    } else {
                        slots[i].tag = original.0;
                        slots[i].metadata = original.1;
                    }
                }
            }
        }
    }

    /// Sorted by box center, each sibling keeps its distance from the
    /// previous one; a shift carries over to every later sibling.
    fn enforce_sibling_gap(&self, slots: &mut [Slot]) {
        let margin = self.settings.margin;
        let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
        for (i, slot) in slots.iter().enumerate() {
            if let Some(parent) = slot.parent {
                groups.entry(parent).or_default().push(i);
            }
        }

        let mut parents: Vec<usize> = groups.keys().copied().collect();
        parents.sort_unstable();

        for parent in parents {
            let mut members = groups.remove(&parent).unwrap_or_default();
            members.sort_by(|&a, &b| {
                self.bbox(&slots[a])
                    .center_y()
                    .total_cmp(&self.bbox(&slots[b]).center_y())
                    .then(a.cmp(&b))
            });

            for k in 1..members.len() {
                let prev = self.bbox(&slots[members[k - 1]]);
                let cur = self.bbox(&slots[members[k]]);
                let min_distance = (prev.height + cur.height) / 2.0 + margin;
                let shortfall = min_distance - (cur.center_y() - prev.center_y());
                if shortfall > EPSILON {
                    for &later in &members[k..] {
                        slots[later].y += shortfall;
                    }
                }
            }
        }
    }

    /// Move every box still overlapping an earlier-settled box below it
    fn settle(&self, slots: &mut [Slot]) -> usize {
        let margin = self.settings.margin;
        let mut order: Vec<usize> = (0..slots.len()).collect();
        order.sort_by(|&a, &b| {
            self.bbox(&slots[a])
                .y
                .total_cmp(&self.bbox(&slots[b]).y)
                .then(a.cmp(&b))
        });

        let mut settled: Vec<Rect> = Vec::with_capacity(slots.len());
        let mut moves = 0;

        for i in order {
            loop {
                let bbox = self.bbox(&slots[i]);
                let floor = settled
                    .iter()
                    .filter(|s| s.overlaps(&bbox))
                    .map(|s| s.bottom())
                    .reduce(f64::max);

                match floor {
                    Some(bottom) => {
                        slots[i].y += bottom + margin - bbox.y;
                        moves += 1;
                    }
                    None => break,
                }
            }
            settled.push(self.bbox(&slots[i]));
        }
        moves
    }

    fn node_layout(&self, slot: &Slot) -> NodeLayout {
        let place = |panel: Option<(PanelSize, PanelSide)>| {
            panel.map(|(size, side)| PanelPlacement {
                side,
                rect: self.panel_rect(slot, size, side),
            })
        };
        NodeLayout {
            id: slot.id,
            x: slot.x,
            y: slot.y,
            bbox: self.bbox(slot),
            tag_panel: place(slot.tag),
            metadata_panel: place(slot.metadata),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::MetadataField;
    use citeweave_common::ids::PaperId;

    fn paper(id: &str) -> Paper {
        Paper::minimal(PaperId::normalize(id).unwrap(), format!("Paper {}", id))
    }

    fn engine() -> LayoutEngine {
        LayoutEngine::new(LayoutSettings::default())
    }

    fn seeded_graph() -> GraphModel {
        let mut graph = GraphModel::with_root(paper("P0"));
        let root = graph.root();
        graph.expand(root, vec![paper("A"), paper("B"), paper("C")]).unwrap();
        graph
    }

    #[test]
    fn test_depth_sets_x_and_siblings_are_symmetric() {
        let graph = seeded_graph();
        let layout = engine().layout(&graph);
        let s = LayoutSettings::default();

        let (root_x, root_y) = layout.position(graph.root()).unwrap();
        assert_eq!(root_x, 0.0);
        assert_eq!(root_y, s.viewport_height / 2.0);

        let children: Vec<f64> = graph
            .node(graph.root())
            .unwrap()
            .children
            .iter()
            .map(|c| layout.position(*c).unwrap().1)
            .collect();
        assert_eq!(children, vec![root_y - s.sibling_spacing, root_y, root_y + s.sibling_spacing]);
        for child in &graph.node(graph.root()).unwrap().children {
            assert_eq!(layout.position(*child).unwrap().0, s.level_spacing);
        }
        assert_eq!(layout.settle_moves, 0);
        assert_eq!(layout.edges.len(), 3);
    }

    #[test]
    fn test_relayout_keeps_untouched_nodes() {
        let mut graph = seeded_graph();
        let engine = engine();
        let before = engine.layout(&graph);

        let first = graph.node(graph.root()).unwrap().children[0];
        let grandchild = graph.expand(first, vec![paper("A1")]).unwrap().added[0];
        let after = engine.relayout(&graph, &before);

        for node in &before.nodes {
            assert_eq!(after.position(node.id), Some((node.x, node.y)));
        }
        let (_, first_y) = after.position(first).unwrap();
        assert_eq!(after.position(grandchild), Some((2.0 * engine.settings().level_spacing, first_y)));
    }

    #[test]
    fn test_new_sibling_goes_below_placed_ones() {
        let mut graph = GraphModel::with_root(paper("P0"));
        let root = graph.root();
        graph.expand(root, vec![paper("A")]).unwrap();
        let engine = engine();
        let before = engine.layout(&graph);

        let added = graph.expand(root, vec![paper("B")]).unwrap().added[0];
        let after = engine.relayout(&graph, &before);

        let a = graph.node(root).unwrap().children[0];
        let (_, a_y) = after.position(a).unwrap();
        assert_eq!(after.position(added).unwrap().1, a_y + engine.settings().sibling_spacing);
    }

    #[test]
    fn test_collapsed_subtree_not_laid_out() {
        let mut graph = seeded_graph();
        graph.collapse(graph.root()).unwrap();
        let layout = engine().layout(&graph);
        assert_eq!(layout.nodes.len(), 1);
        assert!(layout.edges.is_empty());
    }

    #[test]
    fn test_panels_grow_boxes_without_overlap() {
        let mut graph = seeded_graph();
        let children = graph.node(graph.root()).unwrap().children.clone();
        for child in &children {
            let annotations = Annotations::new(
                vec!["graph learning".into(), "message passing".into(), "attention".into(), "benchmarks".into()],
                vec![MetadataField::Tldr],
            )
            .unwrap();
            graph.set_annotations(*child, annotations).unwrap();
        }

        let layout = engine().layout(&graph);
        let child = layout.node(children[0]).unwrap();
        let tag = child.tag_panel.unwrap();
        assert_eq!(tag.side, PanelSide::Right);
        // Tags only, the minimal paper has no TL;DR
        assert!(child.metadata_panel.is_none());
        assert!(child.bbox.height >= tag.rect.height);
        assert_eq!(layout.first_overlap(), None);
    }

    #[test]
    fn test_lateral_panel_flips_at_viewport_edge() {
        let settings = LayoutSettings {
            viewport_width: 300.0,
            ..LayoutSettings::default()
        };
        let nodes = vec![LayoutNode {
            id: NodeId(0),
            parent: None,
            depth: 1,
            tag_panel: Some(PanelSize { width: 100.0, height: 40.0 }),
            metadata_panel: None,
        }];

        let layout = LayoutEngine::new(settings).compute(&nodes, None);
        assert_eq!(layout.nodes[0].tag_panel.unwrap().side, PanelSide::Left);
    }

    #[test]
    fn test_crowded_column_settles_below_viewport() {
        let settings = LayoutSettings {
            viewport_height: 200.0,
            ..LayoutSettings::default()
        };
        let mut nodes = vec![LayoutNode {
            id: NodeId(0),
            parent: None,
            depth: 0,
            tag_panel: None,
            metadata_panel: None,
        }];
        for i in 1..=12 {
            nodes.push(LayoutNode {
                id: NodeId(i),
                parent: Some(NodeId(0)),
                depth: 1,
                tag_panel: None,
                metadata_panel: Some(PanelSize { width: 120.0, height: 60.0 }),
            });
        }

        let layout = LayoutEngine::new(settings).compute(&nodes, None);
        assert_eq!(layout.first_overlap(), None);
        assert!(layout.bounds.unwrap().bottom() > 200.0);
    }

    #[test]
    fn test_metadata_panel_wraps_long_text() {
        let metrics = PanelMetrics::default();
        let mut p = paper("P1");
        p.tldr = Some("x".repeat(1000));
        let annotations = Annotations::new(vec![], vec![MetadataField::Tldr, MetadataField::Year]).unwrap();

        let size = metrics.metadata_panel(&annotations, &p).unwrap();
        assert_eq!(size.width, metrics.max_width);
        assert_eq!(size.height, MAX_LINES_PER_FIELD as f64 * metrics.line_height + 2.0 * metrics.padding);
    }
}
