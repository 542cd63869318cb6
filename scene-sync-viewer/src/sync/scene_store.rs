use crate::protocol::messages::{
    FrameProps, GridProps, LabelProps, MeshProps, PointCloudProps, SkinnedMeshProps,
};
use crate::sync::staging::{NodeAttributes, SkinnedMeshState};
use bevy::log::{debug, warn};
use constants::sync::{PATH_SEPARATOR, ROOT_PATH, SYNTHESISED_FRAME_AXES_LENGTH};
use std::collections::HashMap;

/// Shape data of a scene node, discriminated by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Frame(FrameProps),
    Mesh(MeshProps),
    SkinnedMesh(SkinnedMeshProps),
    PointCloud(PointCloudProps),
    Label(LabelProps),
    Grid(GridProps),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub path: String,
    pub kind: NodeKind,
}

impl SceneNode {
    pub fn new(path: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            path: normalize_path(&path.into()).to_string(),
            kind,
        }
    }

    /// Minimal frame standing in for an ancestor that was never sent.
    pub fn empty_frame(path: impl Into<String>) -> Self {
        Self::new(
            path,
            NodeKind::Frame(FrameProps {
                show_axes: false,
                axes_length: SYNTHESISED_FRAME_AXES_LENGTH,
                ..Default::default()
            }),
        )
    }
}

/// What `upsert` did with a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Replaced,
    /// Identical node already stored; attributes untouched.
    Unchanged,
}

#[derive(Debug, Clone)]
struct NodeRecord {
    node: SceneNode,
    children: Vec<String>,
    generation: u64,
}

/// Authoritative path → node table, together with per-path attribute and
/// skeleton state.
///
/// The root (`""`) always exists. Every other stored node has its parent
/// stored as well: missing ancestors are synthesised as empty frames on insert,
/// and removal takes all descendants with it.
#[derive(Debug, Clone)]
pub struct SceneNodeStore {
    records: HashMap<String, NodeRecord>,
    attributes: HashMap<String, NodeAttributes>,
    skinned_meshes: HashMap<String, SkinnedMeshState>,
    next_generation: u64,
}

impl Default for SceneNodeStore {
    fn default() -> Self {
        let mut store = Self {
            records: HashMap::new(),
            attributes: HashMap::new(),
            skinned_meshes: HashMap::new(),
            next_generation: 0,
        };
        store.insert_new(SceneNode::empty_frame(ROOT_PATH));
        store
    }
}

impl SceneNodeStore {
    /// Insert or replace a node, synthesising any missing ancestors first.
    pub fn upsert(&mut self, node: SceneNode) -> UpsertOutcome {
        let path = node.path.clone();
        self.synthesise_ancestors(&path);

        let generation = self.next_generation;
        let outcome = match self.records.get_mut(&path) {
            Some(record) if record.node == node => return UpsertOutcome::Unchanged,
            Some(record) => {
                record.node = node;
                record.generation = generation;
                self.next_generation += 1;
                UpsertOutcome::Replaced
            }
            None => {
                self.insert_new(node);
                UpsertOutcome::Created
            }
        };

        // Staged values carry over to the new object; only its pose cycle restarts.
        self.attributes.entry(path.clone()).or_default().await_object();
        self.refresh_skeleton(&path);
        outcome
    }

    /// Remove a node and all its descendants. Returns how many nodes were removed.
    ///
    /// Missing paths are a no-op: late or duplicate removals are expected.
    pub fn remove(&mut self, path: &str) -> usize {
        let path = normalize_path(path);
        if path == ROOT_PATH {
            warn!("Refusing to remove the scene root, use a scene reset instead");
            return 0;
        }

        let Some(record) = self.records.remove(path) else {
            debug!("Remove for unknown scene node {}", path);
            return 0;
        };

        if let Some(parent) = parent_path(path).and_then(|p| self.records.get_mut(p)) {
            parent.children.retain(|child| child != path);
        }

        let mut removed = 1;
        let mut pending = record.children;
        while let Some(child) = pending.pop() {
            if let Some(child_record) = self.records.remove(&child) {
                removed += 1;
                pending.extend(child_record.children);
            }
        }

        // Staged attributes may exist for descendants that never had a node.
        self.attributes
            .retain(|key, _| !is_self_or_descendant(key, path));
        self.skinned_meshes
            .retain(|key, _| !is_self_or_descendant(key, path));

        removed
    }

    /// Drop every node except the root and clear all attribute state.
    pub fn reset(&mut self) {
        self.records.retain(|path, _| path == ROOT_PATH);
        if let Some(root) = self.records.get_mut(ROOT_PATH) {
            root.children.clear();
        }
        self.attributes.retain(|path, _| path == ROOT_PATH);
        self.skinned_meshes.clear();
    }

    pub fn get(&self, path: &str) -> Option<&SceneNode> {
        self.records.get(normalize_path(path)).map(|r| &r.node)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.records.contains_key(normalize_path(path))
    }

    /// Bumped whenever a different node takes over the path.
    pub fn generation(&self, path: &str) -> Option<u64> {
        self.records.get(normalize_path(path)).map(|r| r.generation)
    }

    pub fn children(&self, path: &str) -> &[String] {
        self.records
            .get(normalize_path(path))
            .map(|r| r.children.as_slice())
            .unwrap_or(&[])
    }

    /// Number of stored nodes, root included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.len() <= 1
    }

    /// Paths in parent-before-child order, starting at the root.
    pub fn walk(&self) -> Vec<&str> {
        let mut order = Vec::with_capacity(self.records.len());
        let mut stack = vec![ROOT_PATH];
        while let Some(path) = stack.pop() {
            order.push(path);
            if let Some(record) = self.records.get(path) {
                stack.extend(record.children.iter().rev().map(String::as_str));
            }
        }
        order
    }

    pub fn attributes(&self, path: &str) -> Option<&NodeAttributes> {
        self.attributes.get(normalize_path(path))
    }

    pub fn attributes_mut(&mut self, path: &str) -> Option<&mut NodeAttributes> {
        self.attributes.get_mut(normalize_path(path))
    }

    /// Attribute entry for a path, created in the `Initial` state if absent.
    /// Never creates a scene node.
    pub fn stage_attributes(&mut self, path: &str) -> &mut NodeAttributes {
        self.attributes
            .entry(normalize_path(path).to_string())
            .or_default()
    }

    pub fn skinned_mesh(&self, path: &str) -> Option<&SkinnedMeshState> {
        self.skinned_meshes.get(normalize_path(path))
    }

    pub fn skinned_mesh_mut(&mut self, path: &str) -> Option<&mut SkinnedMeshState> {
        self.skinned_meshes.get_mut(normalize_path(path))
    }

    fn insert_new(&mut self, node: SceneNode) {
        let path = node.path.clone();
        if let Some(parent) = parent_path(&path).and_then(|p| self.records.get_mut(p)) {
            parent.children.push(path.clone());
        }
        self.records.insert(
            path.clone(),
            NodeRecord {
                node,
                children: Vec::new(),
                generation: self.next_generation,
            },
        );
        self.next_generation += 1;
        self.attributes.entry(path).or_default().await_object();
    }

    // Walk up to the nearest stored ancestor, then insert the missing ones top-down.
    fn synthesise_ancestors(&mut self, path: &str) {
        let mut missing = Vec::new();
        let mut cursor = parent_path(path);
        while let Some(ancestor) = cursor {
            if self.records.contains_key(ancestor) {
                break;
            }
            missing.push(ancestor.to_string());
            cursor = parent_path(ancestor);
        }

        for ancestor in missing.into_iter().rev() {
            debug!("Synthesising missing parent frame {}", ancestor);
            self.insert_new(SceneNode::empty_frame(ancestor));
        }
    }

    fn refresh_skeleton(&mut self, path: &str) {
        match self.records.get(path).map(|r| &r.node.kind) {
            Some(NodeKind::SkinnedMesh(props)) => {
                self.skinned_meshes
                    .insert(path.to_string(), SkinnedMeshState::from_props(props));
            }
            _ => {
                self.skinned_meshes.remove(path);
            }
        }
    }
}

/// Strip trailing separators so `/a/` and `/a` name the same node; `/` is the root.
pub fn normalize_path(path: &str) -> &str {
    path.trim_end_matches(PATH_SEPARATOR)
}

/// Parent of a normalised path; `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == ROOT_PATH {
        return None;
    }
    Some(
        path.rsplit_once(PATH_SEPARATOR)
            .map(|(parent, _)| parent)
            .unwrap_or(ROOT_PATH),
    )
}

/// Segment-wise prefix test: `/a` covers `/a/b` but not `/ab`.
pub fn is_self_or_descendant(candidate: &str, ancestor: &str) -> bool {
    candidate == ancestor
        || (candidate.starts_with(ancestor)
            && candidate[ancestor.len()..].starts_with(PATH_SEPARATOR))
}
