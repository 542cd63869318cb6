//! Scene store materialisation.
//!
//! Every stored path gets a persistent anchor entity carrying the node's pose
//! and visibility. The node's renderable content lives on a child visual that
//! is swapped out whenever the store reports a new generation for the path,
//! so replacing a node never disturbs its children.

/// Frame axes drawn with gizmos.
pub mod gizmos;

/// Screen-space text for label nodes.
pub mod labels;

/// Anchor and visual bookkeeping, pose and bone application.
pub mod materialize;

/// Mesh builders for mesh, skinned mesh, point cloud and grid payloads.
pub mod meshes;
