use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use timewalk_model_provider::HistoricalEvent;
use timewalk_types::create_id;

pub mod layout;

use layout::LayoutPolicy;

pub const ROOT_NODE_ID: &str = "root";
pub const ROOT_TITLE: &str = "Start Your Journey";
pub const ROOT_STATUS: &str = "Upload a clear, front-facing photo to begin.";

/// Status text every freshly spawned era node starts with.
pub const EVENT_STATUS: &str = "Click to generate your scene in this era.";

#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    Event,
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct JourneyNode {
    pub id: String,
    pub kind: NodeKind,
    pub title: String,
    /// Display status line under the title. Empty once an image is shown.
    pub status: String,
    /// Generated (or uploaded, for the root) image as a data URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Base scene prompt this node was spawned from. Event nodes only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub busy: bool,
    pub position: (f32, f32),
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct JourneyEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// Partial update for a single node. Unset fields keep their current value;
/// images are set-only (the root reset path goes through [`JourneyGraph::reset_root`]).
#[derive(Clone, Debug, Default)]
pub struct NodePatch {
    pub title: Option<String>,
    pub status: Option<String>,
    pub image: Option<String>,
    pub prompt: Option<String>,
    pub busy: Option<bool>,
    pub position: Option<(f32, f32)>,
}

/// The session's node-and-edge state. The orchestrator is the only writer;
/// every mutation replaces whole node records so readers never observe a
/// half-applied update.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug)]
pub struct JourneyGraph {
    pub nodes: Vec<JourneyNode>,
    pub edges: Vec<JourneyEdge>,
}

impl Default for JourneyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl JourneyGraph {
    /// A fresh graph containing only the pristine root node.
    pub fn new() -> Self {
        JourneyGraph {
            nodes: vec![Self::pristine_root()],
            edges: Vec::new(),
        }
    }

    fn pristine_root() -> JourneyNode {
        JourneyNode {
            id: ROOT_NODE_ID.to_string(),
            kind: NodeKind::Root,
            title: ROOT_TITLE.to_string(),
            status: ROOT_STATUS.to_string(),
            image: None,
            prompt: None,
            busy: false,
            position: (0.0, 0.0),
        }
    }

    pub fn node(&self, id: &str) -> Option<&JourneyNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn root(&self) -> &JourneyNode {
        self.node(ROOT_NODE_ID).expect("root node always exists")
    }

    /// Merges `patch` into the node's data, preserving identity and all
    /// unspecified fields. Unknown ids are logged and ignored.
    pub fn upsert_node_data(&mut self, id: &str, patch: NodePatch) {
        let Some(index) = self.nodes.iter().position(|node| node.id == id) else {
            tracing::warn!(node = id, "dropping update for unknown node");
            return;
        };

        let mut updated = self.nodes[index].clone();
        if let Some(title) = patch.title {
            updated.title = title;
        }
        if let Some(status) = patch.status {
            updated.status = status;
        }
        if let Some(image) = patch.image {
            updated.image = Some(image);
        }
        if let Some(prompt) = patch.prompt {
            updated.prompt = Some(prompt);
        }
        if let Some(busy) = patch.busy {
            updated.busy = busy;
        }
        if let Some(position) = patch.position {
            updated.position = position;
        }
        self.nodes[index] = updated;
    }

    /// Builds (without inserting) the child nodes and edges one event batch
    /// produces under `parent_id`, positioned by `layout`.
    pub fn subtree(
        &self,
        parent_id: &str,
        events: &[HistoricalEvent],
        layout: &LayoutPolicy,
    ) -> Option<(Vec<JourneyNode>, Vec<JourneyEdge>)> {
        let origin = self.node(parent_id)?.position;
        let mut nodes = Vec::with_capacity(events.len());
        let mut edges = Vec::with_capacity(events.len());

        for (index, event) in events.iter().enumerate() {
            let node = JourneyNode {
                id: create_id(),
                kind: NodeKind::Event,
                title: event.title.clone(),
                status: EVENT_STATUS.to_string(),
                image: None,
                prompt: Some(event.prompt.clone()),
                busy: false,
                position: layout.position(origin, index, events.len()),
            };
            edges.push(JourneyEdge {
                id: format!("e-{}-{}", parent_id, node.id),
                source: parent_id.to_string(),
                target: node.id.clone(),
            });
            nodes.push(node);
        }

        Some((nodes, edges))
    }

    /// Spawns one child node per event under `parent_id` plus the connecting
    /// edges. Append-only: existing records are never touched.
    pub fn add_subtree(
        &mut self,
        parent_id: &str,
        events: &[HistoricalEvent],
        layout: &LayoutPolicy,
    ) {
        let Some((nodes, edges)) = self.subtree(parent_id, events, layout) else {
            tracing::warn!(parent = parent_id, "dropping subtree for unknown parent");
            return;
        };
        self.nodes.extend(nodes);
        self.edges.extend(edges);
    }

    /// Discards every non-root record and installs the given set. Used only
    /// for the very first era ring, guarding against duplicate initial
    /// generation.
    pub fn replace_all_except_root(&mut self, nodes: Vec<JourneyNode>, edges: Vec<JourneyEdge>) {
        self.nodes.retain(|node| node.id == ROOT_NODE_ID);
        self.edges = edges;
        self.nodes.extend(nodes);
    }

    /// Restores the root's display data to its first-run state, keeping its
    /// id and current position.
    pub fn reset_root(&mut self) {
        if let Some(index) = self.nodes.iter().position(|node| node.id == ROOT_NODE_ID) {
            let position = self.nodes[index].position;
            let mut root = Self::pristine_root();
            root.position = position;
            self.nodes[index] = root;
        }
    }

    /// Checks the structural invariants: unique ids, edges referencing
    /// existing nodes, exactly one incoming edge per non-root node, none for
    /// the root, and every node reachable from the root without cycles.
    pub fn is_forest(&self) -> bool {
        use std::collections::{HashMap, HashSet};

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return false;
            }
        }
        if !ids.contains(ROOT_NODE_ID) {
            return false;
        }

        let mut incoming: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            if !ids.contains(edge.source.as_str()) || !ids.contains(edge.target.as_str()) {
                return false;
            }
            incoming.entry(edge.target.as_str()).or_default().push(edge.source.as_str());
        }

        for node in &self.nodes {
            let parents = incoming.get(node.id.as_str()).map_or(0, Vec::len);
            let expected = if node.id == ROOT_NODE_ID { 0 } else { 1 };
            if parents != expected {
                return false;
            }
        }

        // Walk each parent chain to the root; a cycle would loop forever, so
        // bound the walk by the node count.
        for node in &self.nodes {
            let mut current = node.id.as_str();
            let mut steps = 0;
            while current != ROOT_NODE_ID {
                let Some(parents) = incoming.get(current) else {
                    return false;
                };
                current = parents[0];
                steps += 1;
                if steps > self.nodes.len() {
                    return false;
                }
            }
        }

        true
    }
}
