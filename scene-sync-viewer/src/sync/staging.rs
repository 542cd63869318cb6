use crate::protocol::messages::SkinnedMeshProps;
use crate::sync::error::SkeletonError;
use bevy::math::{Quat, Vec3, Vec4};

/// Where a node's pending pose is in its trip to the rendered object.
///
/// Moves forward only: `WaitForMakeObject → NeedsUpdate → Applied`. A new pose
/// on an `Applied` node starts another cycle at `NeedsUpdate`. Creating or
/// replacing the node goes back to `WaitForMakeObject`, keeping staged values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoseUpdateState {
    /// No node has claimed this path yet.
    #[default]
    Initial,
    /// The node was (re)created and its object is not built yet.
    WaitForMakeObject,
    NeedsUpdate,
    Applied,
}

/// Transient visual state of a node, kept apart from its shape data.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeAttributes {
    pub position: Vec3,
    pub orientation: Quat,
    pub visible: Option<bool>,
    /// Local override, e.g. from a scene tree panel. Wins over `visible`.
    pub visibility_override: Option<bool>,
    pub clickable: bool,
    pose_update_state: PoseUpdateState,
}

impl Default for NodeAttributes {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            visible: None,
            visibility_override: None,
            clickable: false,
            pose_update_state: PoseUpdateState::Initial,
        }
    }
}

impl NodeAttributes {
    /// Fresh attributes for a node whose object has not been built.
    pub fn awaiting_object() -> Self {
        let mut attrs = Self::default();
        attrs.await_object();
        attrs
    }

    /// A new object is about to be built for the node. Staged values stay;
    /// they are applied once the object exists.
    pub fn await_object(&mut self) {
        self.pose_update_state = PoseUpdateState::WaitForMakeObject;
    }

    pub fn pose_update_state(&self) -> PoseUpdateState {
        self.pose_update_state
    }

    pub fn stage_position(&mut self, position: Vec3) {
        self.position = position;
        self.request_pose_update();
    }

    pub fn stage_orientation(&mut self, orientation: Quat) {
        self.orientation = orientation;
        self.request_pose_update();
    }

    pub fn stage_pose(&mut self, orientation: Quat, position: Vec3) {
        self.orientation = orientation;
        self.position = position;
        self.request_pose_update();
    }

    // Pose application waits for the object while it is being rebuilt.
    fn request_pose_update(&mut self) {
        if self.pose_update_state != PoseUpdateState::WaitForMakeObject {
            self.pose_update_state = PoseUpdateState::NeedsUpdate;
        }
    }

    /// Called once the renderer has built the object. Returns false if the
    /// node was not waiting for one.
    pub fn mark_object_made(&mut self) -> bool {
        if self.pose_update_state == PoseUpdateState::WaitForMakeObject {
            self.pose_update_state = PoseUpdateState::NeedsUpdate;
            true
        } else {
            false
        }
    }

    /// Hands out the staged pose exactly once per update cycle.
    pub fn take_pending_pose(&mut self) -> Option<(Vec3, Quat)> {
        if self.pose_update_state == PoseUpdateState::NeedsUpdate {
            self.pose_update_state = PoseUpdateState::Applied;
            Some((self.position, self.orientation))
        } else {
            None
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = Some(visible);
    }

    pub fn effective_visibility(&self) -> bool {
        self.visibility_override.or(self.visible).unwrap_or(true)
    }
}

/// Convert a wire `wxyz` quaternion to a unit `Quat`. Degenerate input maps to identity.
pub fn quat_from_wxyz(wxyz: [f32; 4]) -> Quat {
    let [w, x, y, z] = wxyz;
    Vec4::new(x, y, z, w)
        .try_normalize()
        .map(Quat::from_vec4)
        .unwrap_or(Quat::IDENTITY)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BonePose {
    pub orientation: Quat,
    pub position: Vec3,
}

/// Bone poses of one skinned mesh, mutated in place by per-bone updates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkinnedMeshState {
    poses: Vec<BonePose>,
    dirty: bool,
}

impl SkinnedMeshState {
    /// Bind pose from the mesh definition. The skeleton has one bone per orientation.
    pub fn from_props(props: &SkinnedMeshProps) -> Self {
        let poses = props
            .bone_wxyzs
            .iter()
            .enumerate()
            .map(|(index, wxyz)| BonePose {
                orientation: quat_from_wxyz(*wxyz),
                position: props
                    .bone_positions
                    .get(index)
                    .map(|p| Vec3::from_array(*p))
                    .unwrap_or(Vec3::ZERO),
            })
            .collect();

        Self { poses, dirty: true }
    }

    pub fn poses(&self) -> &[BonePose] {
        &self.poses
    }

    pub fn bone_count(&self) -> usize {
        self.poses.len()
    }

    pub fn set_bone_orientation(
        &mut self,
        path: &str,
        index: usize,
        orientation: Quat,
    ) -> Result<(), SkeletonError> {
        self.bone_mut(path, index)?.orientation = orientation;
        self.dirty = true;
        Ok(())
    }

    pub fn set_bone_position(
        &mut self,
        path: &str,
        index: usize,
        position: Vec3,
    ) -> Result<(), SkeletonError> {
        self.bone_mut(path, index)?.position = position;
        self.dirty = true;
        Ok(())
    }

    /// True if bones changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn bone_mut(&mut self, path: &str, index: usize) -> Result<&mut BonePose, SkeletonError> {
        let bone_count = self.poses.len();
        self.poses
            .get_mut(index)
            .ok_or_else(|| SkeletonError::BoneIndexOutOfRange {
                path: path.to_string(),
                index,
                bone_count,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_bone_props() -> SkinnedMeshProps {
        SkinnedMeshProps {
            vertices: vec![[0.0; 3]; 3],
            faces: vec![[0, 1, 2]],
            color: [255, 0, 0],
            bone_wxyzs: vec![[1.0, 0.0, 0.0, 0.0]; 3],
            bone_positions: vec![[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 2.0]],
            skin_indices: vec![],
            skin_weights: vec![],
        }
    }

    #[test]
    fn pose_update_while_waiting_for_object_keeps_state() {
        let mut attrs = NodeAttributes::awaiting_object();
        attrs.stage_position(Vec3::new(1.0, 2.0, 3.0));

        assert_eq!(attrs.pose_update_state(), PoseUpdateState::WaitForMakeObject);
        assert_eq!(attrs.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(attrs.take_pending_pose(), None);
    }

    #[test]
    fn pose_update_from_initial_or_pending_needs_update() {
        let mut attrs = NodeAttributes::default();
        assert_eq!(attrs.pose_update_state(), PoseUpdateState::Initial);

        attrs.stage_orientation(Quat::from_rotation_z(0.5));
        assert_eq!(attrs.pose_update_state(), PoseUpdateState::NeedsUpdate);

        attrs.stage_position(Vec3::X);
        assert_eq!(attrs.pose_update_state(), PoseUpdateState::NeedsUpdate);
    }

    #[test]
    fn object_creation_releases_staged_pose_once() {
        let mut attrs = NodeAttributes::awaiting_object();
        attrs.stage_pose(Quat::IDENTITY, Vec3::Y);

        assert!(attrs.mark_object_made());
        assert!(!attrs.mark_object_made());
        assert_eq!(attrs.take_pending_pose(), Some((Vec3::Y, Quat::IDENTITY)));
        assert_eq!(attrs.pose_update_state(), PoseUpdateState::Applied);
        assert_eq!(attrs.take_pending_pose(), None);

        attrs.stage_position(Vec3::Z);
        assert_eq!(attrs.pose_update_state(), PoseUpdateState::NeedsUpdate);
    }

    #[test]
    fn visibility_override_wins() {
        let mut attrs = NodeAttributes::default();
        assert!(attrs.effective_visibility());

        attrs.set_visible(false);
        assert!(!attrs.effective_visibility());

        attrs.visibility_override = Some(true);
        assert!(attrs.effective_visibility());
    }

    #[test]
    fn degenerate_quaternion_falls_back_to_identity() {
        assert_eq!(quat_from_wxyz([0.0; 4]), Quat::IDENTITY);
        let q = quat_from_wxyz([2.0, 0.0, 0.0, 0.0]);
        assert!((q.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn bone_index_past_skeleton_is_rejected() {
        let mut skeleton = SkinnedMeshState::from_props(&three_bone_props());
        assert_eq!(skeleton.bone_count(), 3);
        assert!(skeleton.take_dirty());

        let err = skeleton
            .set_bone_orientation("/arm", 5, Quat::IDENTITY)
            .unwrap_err();
        assert_eq!(
            err,
            SkeletonError::BoneIndexOutOfRange {
                path: "/arm".into(),
                index: 5,
                bone_count: 3,
            }
        );
        assert!(!skeleton.take_dirty());

        skeleton.set_bone_position("/arm", 2, Vec3::ONE).unwrap();
        assert_eq!(skeleton.poses()[2].position, Vec3::ONE);
        assert!(skeleton.take_dirty());
    }
}
