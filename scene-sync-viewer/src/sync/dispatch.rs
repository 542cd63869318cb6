use crate::protocol::messages::{NodeCreation, ViewerMessage};
use crate::sync::camera::CameraControl;
use crate::sync::error::DispatchError;
use crate::sync::queue::{
    CaptureBackend, GateDecision, MessageQueue, RenderRequest, RenderRequestSlot, plan_frame,
};
use crate::sync::scene_store::{NodeKind, SceneNode, UpsertOutcome};
use crate::sync::staging::quat_from_wxyz;
use crate::sync::state::ViewerState;
use crate::sync::transfer::{CompletedFile, PartOutcome, TransferHeader, TransferObserver};
use bevy::log::{debug, error, warn};
use bevy::math::Vec3;
use bevy::prelude::Resource;
use std::time::Duration;

/// Everything a dispatched message may mutate.
pub struct DispatchContext<'a> {
    pub state: &'a mut ViewerState,
    pub camera: &'a mut dyn CameraControl,
    pub capture: &'a mut dyn CaptureBackend,
    pub observer: &'a mut dyn TransferObserver,
    /// Frame clock, used to schedule delayed effects.
    pub now: Duration,
}

/// Outcome of one frame's drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    pub dispatched: usize,
    pub failed: usize,
    /// The capture barrier held all traffic this frame.
    pub held: bool,
    pub clickables_applied: usize,
}

/// Inbox of the dispatch loop. The network side calls `enqueue`, the frame
/// loop calls `drain_and_dispatch` once per frame.
#[derive(Resource, Debug, Default)]
pub struct SceneSync {
    queue: MessageQueue,
}

impl SceneSync {
    pub fn enqueue(&mut self, message: ViewerMessage) {
        self.queue.enqueue(message);
    }

    pub fn enqueue_all(&mut self, messages: impl IntoIterator<Item = ViewerMessage>) {
        for message in messages {
            self.queue.enqueue(message);
        }
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// Drain the prefix the frame gate allows and dispatch it in order.
    /// A failing message is logged and the batch carries on.
    pub fn drain_and_dispatch(&mut self, ctx: &mut DispatchContext) -> FrameReport {
        let mut report = FrameReport {
            clickables_applied: ctx.state.apply_due_clickables(ctx.now),
            ..Default::default()
        };

        let count = match plan_frame(&self.queue, &mut ctx.state.render_request, ctx.capture) {
            GateDecision::Hold => {
                report.held = true;
                return report;
            }
            GateDecision::Drain(count) => count,
        };

        for message in self.queue.take_front(count) {
            let kind = message.kind();
            match dispatch(message, ctx) {
                Ok(()) => report.dispatched += 1,
                Err(err) => {
                    error!("{} failed: {}", kind, err);
                    report.failed += 1;
                }
            }
        }

        report
    }
}

/// Apply one message to the collaborators its kind concerns.
pub fn dispatch(message: ViewerMessage, ctx: &mut DispatchContext) -> Result<(), DispatchError> {
    match message {
        ViewerMessage::FrameMessage(creation) => create_node(ctx.state, creation, NodeKind::Frame),
        ViewerMessage::MeshMessage(creation) => create_node(ctx.state, creation, NodeKind::Mesh),
        ViewerMessage::SkinnedMeshMessage(creation) => {
            create_node(ctx.state, creation, NodeKind::SkinnedMesh)
        }
        ViewerMessage::PointCloudMessage(creation) => {
            create_node(ctx.state, creation, NodeKind::PointCloud)
        }
        ViewerMessage::LabelMessage(creation) => create_node(ctx.state, creation, NodeKind::Label),
        ViewerMessage::GridMessage(creation) => create_node(ctx.state, creation, NodeKind::Grid),

        ViewerMessage::SetPositionMessage { path, position } => {
            staged_attributes(ctx.state, &path).stage_position(Vec3::from_array(position));
        }
        ViewerMessage::SetOrientationMessage { path, wxyz } => {
            staged_attributes(ctx.state, &path).stage_orientation(quat_from_wxyz(wxyz));
        }
        ViewerMessage::SetPoseMessage {
            path,
            wxyz,
            position,
        } => {
            staged_attributes(ctx.state, &path)
                .stage_pose(quat_from_wxyz(wxyz), Vec3::from_array(position));
        }
        ViewerMessage::SetSceneNodeVisibilityMessage { path, visible } => {
            staged_attributes(ctx.state, &path).set_visible(visible);
        }
        ViewerMessage::SetSceneNodeClickableMessage { path, clickable } => {
            ctx.state.schedule_clickable(&path, clickable, ctx.now);
        }
        ViewerMessage::SetBoneOrientationMessage {
            path,
            bone_index,
            wxyz,
        } => match ctx.state.scene.skinned_mesh_mut(&path) {
            Some(skeleton) => {
                skeleton.set_bone_orientation(&path, bone_index, quat_from_wxyz(wxyz))?
            }
            None => debug!("Bone update for unknown skinned mesh {}", path),
        },
        ViewerMessage::SetBonePositionMessage {
            path,
            bone_index,
            position,
        } => match ctx.state.scene.skinned_mesh_mut(&path) {
            Some(skeleton) => {
                skeleton.set_bone_position(&path, bone_index, Vec3::from_array(position))?
            }
            None => debug!("Bone update for unknown skinned mesh {}", path),
        },
        ViewerMessage::RemoveSceneNodeMessage { path } => {
            ctx.state.scene.remove(&path);
        }
        ViewerMessage::ResetSceneMessage => ctx.state.reset_scene(),

        ViewerMessage::FileTransferStartMessage {
            transfer_uuid,
            filename,
            mime_type,
            part_count,
            size_bytes,
            save_immediately,
        } => {
            let header = TransferHeader {
                filename,
                mime_type,
                total_size: size_bytes,
                part_count,
                save_immediately,
            };
            if let Some(file) = ctx.state.transfers.start(&transfer_uuid, header) {
                deliver_file(ctx, file);
            }
        }
        ViewerMessage::FileTransferPartMessage {
            transfer_uuid,
            part,
            content,
        } => match ctx
            .state
            .transfers
            .append_part(&transfer_uuid, part as usize, content)?
        {
            PartOutcome::InProgress { downloaded, total } => {
                ctx.observer
                    .download_progress(&transfer_uuid, downloaded, total);
            }
            PartOutcome::Completed(file) => {
                let size = file.bytes.len() as u64;
                ctx.observer.download_progress(&transfer_uuid, size, size);
                deliver_file(ctx, file);
            }
        },
        ViewerMessage::FileTransferPartAckMessage {
            transfer_uuid,
            transferred_bytes,
            total_bytes,
        } => {
            ctx.observer
                .upload_progress(&transfer_uuid, transferred_bytes, total_bytes);
        }

        ViewerMessage::SetCameraPositionMessage { position } => {
            ctx.camera.set_position(Vec3::from_array(position))
        }
        ViewerMessage::SetCameraLookAtMessage { look_at } => {
            ctx.camera.set_look_at(Vec3::from_array(look_at))
        }
        ViewerMessage::SetCameraUpDirectionMessage { up } => {
            ctx.camera.set_up_direction(Vec3::from_array(up))
        }
        ViewerMessage::SetCameraFovMessage { fov } => ctx.camera.set_fov(fov),
        ViewerMessage::SetCameraNearMessage { near } => ctx.camera.set_near(near),
        ViewerMessage::SetCameraFarMessage { far } => ctx.camera.set_far(far),

        message @ ViewerMessage::GetRenderRequestMessage { .. } => {
            if let Some(request) = RenderRequest::from_message(&message) {
                if ctx.state.capture_pending() {
                    warn!("Render request arrived while a capture is pending, replacing it");
                }
                ctx.state.render_request = Some(RenderRequestSlot::triggered(request));
            }
        }

        ViewerMessage::Unknown => warn!("Ignoring message of unknown kind"),
    }

    Ok(())
}

fn create_node<P>(state: &mut ViewerState, creation: NodeCreation<P>, kind: fn(P) -> NodeKind) {
    let NodeCreation {
        path,
        props,
        wxyz,
        position,
        visible,
    } = creation;

    let node = SceneNode::new(path, kind(props));
    let path = node.path.clone();
    // An identical re-send still carries its own pose; only a new value restages it.
    let unchanged = state.scene.upsert(node) == UpsertOutcome::Unchanged;

    let attrs = state.scene.stage_attributes(&path);
    if let Some(orientation) = wxyz.map(quat_from_wxyz) {
        if !unchanged || attrs.orientation != orientation {
            attrs.stage_orientation(orientation);
        }
    }
    if let Some(position) = position.map(Vec3::from_array) {
        if !unchanged || attrs.position != position {
            attrs.stage_position(position);
        }
    }
    if let Some(visible) = visible {
        attrs.set_visible(visible);
    }
}

fn staged_attributes<'s>(
    state: &'s mut ViewerState,
    path: &str,
) -> &'s mut crate::sync::staging::NodeAttributes {
    if !state.scene.contains(path) {
        debug!("Staging attributes for {} before its node exists", path);
    }
    state.scene.stage_attributes(path)
}

fn deliver_file(ctx: &mut DispatchContext, file: CompletedFile) {
    ctx.observer.file_completed(&file);
    if !file.save_immediately {
        ctx.state.downloads.hold(file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{FrameProps, RenderFormat, SkinnedMeshProps};
    use crate::sync::camera::VirtualCamera;
    use crate::sync::error::{SkeletonError, TransferError};
    use crate::sync::queue::CaptureState;
    use crate::sync::staging::PoseUpdateState;

    #[derive(Default)]
    struct NullCapture;

    impl CaptureBackend for NullCapture {
        fn stage_camera(&mut self, _request: &RenderRequest) {}
        fn begin_capture(&mut self, _request: &RenderRequest) {}
    }

    #[derive(Default)]
    struct RecordingObserver {
        downloads: Vec<(String, u64, u64)>,
        uploads: Vec<(String, u64, u64)>,
        completed: Vec<CompletedFile>,
    }

    impl TransferObserver for RecordingObserver {
        fn download_progress(&mut self, transfer_id: &str, downloaded: u64, total: u64) {
            self.downloads
                .push((transfer_id.to_string(), downloaded, total));
        }

        fn upload_progress(&mut self, transfer_id: &str, uploaded: u64, total: u64) {
            self.uploads.push((transfer_id.to_string(), uploaded, total));
        }

        fn file_completed(&mut self, file: &CompletedFile) {
            self.completed.push(file.clone());
        }
    }

    /// Test harness owning every collaborator.
    #[derive(Default)]
    struct Harness {
        sync: SceneSync,
        state: ViewerState,
        camera: VirtualCamera,
        capture: NullCapture,
        observer: RecordingObserver,
    }

    impl Harness {
        fn frame(&mut self, now_ms: u64) -> FrameReport {
            let mut ctx = DispatchContext {
                state: &mut self.state,
                camera: &mut self.camera,
                capture: &mut self.capture,
                observer: &mut self.observer,
                now: Duration::from_millis(now_ms),
            };
            self.sync.drain_and_dispatch(&mut ctx)
        }
    }

    fn frame_node(path: &str) -> ViewerMessage {
        ViewerMessage::FrameMessage(NodeCreation {
            path: path.into(),
            props: FrameProps::default(),
            wxyz: None,
            position: None,
            visible: None,
        })
    }

    fn render_request() -> ViewerMessage {
        ViewerMessage::GetRenderRequestMessage {
            format: RenderFormat::Png,
            width: 32,
            height: 32,
            quality: None,
            wxyz: [1.0, 0.0, 0.0, 0.0],
            position: [0.0, 0.0, 3.0],
            fov: 1.0,
        }
    }

    #[test]
    fn render_request_splits_the_queue_across_frames() {
        let mut h = Harness::default();
        h.sync.enqueue_all([
            frame_node("/a"),
            frame_node("/b"),
            render_request(),
            frame_node("/c"),
            frame_node("/d"),
        ]);

        let report = h.frame(0);
        assert_eq!(report.dispatched, 3);
        assert!(h.state.scene.contains("/a") && h.state.scene.contains("/b"));
        assert!(!h.state.scene.contains("/c"));
        assert_eq!(h.sync.queue().len(), 2);
        assert_eq!(
            h.state.render_request.as_ref().unwrap().state,
            CaptureState::Triggered
        );

        // Pause frame, then capture frame, then waiting on the backend.
        for now in 1..=3 {
            let report = h.frame(now);
            assert!(report.held);
            assert_eq!(h.sync.queue().len(), 2);
        }

        assert!(h.state.complete_capture(vec![1, 2, 3]).is_some());
        let report = h.frame(4);
        assert_eq!(report.dispatched, 2);
        assert!(h.state.scene.contains("/c") && h.state.scene.contains("/d"));
        assert!(h.sync.queue().is_empty());
    }

    #[test]
    fn pose_waits_for_object_after_creation() {
        let mut h = Harness::default();
        h.sync.enqueue_all([
            frame_node("/obj"),
            ViewerMessage::SetPositionMessage {
                path: "/obj".into(),
                position: [1.0, 0.0, 0.0],
            },
            ViewerMessage::SetOrientationMessage {
                path: "/untracked".into(),
                wxyz: [1.0, 0.0, 0.0, 0.0],
            },
        ]);
        h.frame(0);

        let attrs = h.state.scene.attributes("/obj").unwrap();
        assert_eq!(attrs.pose_update_state(), PoseUpdateState::WaitForMakeObject);
        assert_eq!(attrs.position, Vec3::X);

        let staged = h.state.scene.attributes("/untracked").unwrap();
        assert_eq!(staged.pose_update_state(), PoseUpdateState::NeedsUpdate);
        assert!(!h.state.scene.contains("/untracked"));
    }

    #[test]
    fn creation_message_seeds_pose_and_visibility() {
        let mut h = Harness::default();
        h.sync.enqueue(ViewerMessage::FrameMessage(NodeCreation {
            path: "/seeded".into(),
            props: FrameProps::default(),
            wxyz: None,
            position: Some([0.0, 2.0, 0.0]),
            visible: Some(false),
        }));
        h.frame(0);

        let attrs = h.state.scene.attributes("/seeded").unwrap();
        assert_eq!(attrs.position, Vec3::new(0.0, 2.0, 0.0));
        assert!(!attrs.effective_visibility());
        assert_eq!(attrs.pose_update_state(), PoseUpdateState::WaitForMakeObject);
    }

    #[test]
    fn pose_staged_before_creation_survives_it() {
        let mut h = Harness::default();
        h.sync.enqueue_all([
            ViewerMessage::SetPositionMessage {
                path: "/late".into(),
                position: [7.0, 0.0, 0.0],
            },
            frame_node("/late"),
        ]);
        h.frame(0);

        let attrs = h.state.scene.attributes_mut("/late").unwrap();
        assert_eq!(attrs.position, Vec3::new(7.0, 0.0, 0.0));
        assert_eq!(attrs.pose_update_state(), PoseUpdateState::WaitForMakeObject);
        assert!(attrs.mark_object_made());
        assert_eq!(
            attrs.take_pending_pose().map(|(position, _)| position),
            Some(Vec3::new(7.0, 0.0, 0.0))
        );
    }

    #[test]
    fn resent_node_with_new_pose_moves_without_rebuilding() {
        let positioned = |x: f32| {
            ViewerMessage::FrameMessage(NodeCreation {
                path: "/a".into(),
                props: FrameProps::default(),
                wxyz: None,
                position: Some([x, 0.0, 0.0]),
                visible: None,
            })
        };
        let mut h = Harness::default();
        h.sync.enqueue(positioned(1.0));
        h.frame(0);
        let generation = h.state.scene.generation("/a");
        let attrs = h.state.scene.attributes_mut("/a").unwrap();
        attrs.mark_object_made();
        attrs.take_pending_pose();

        // Same node, same pose: nothing to do.
        h.sync.enqueue(positioned(1.0));
        h.frame(1);
        assert_eq!(
            h.state.scene.attributes("/a").unwrap().pose_update_state(),
            PoseUpdateState::Applied
        );

        h.sync.enqueue(positioned(2.0));
        h.frame(2);
        let attrs = h.state.scene.attributes("/a").unwrap();
        assert_eq!(attrs.position, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(attrs.pose_update_state(), PoseUpdateState::NeedsUpdate);
        assert_eq!(h.state.scene.generation("/a"), generation);
    }

    #[test]
    fn bad_bone_index_fails_alone() {
        let mut h = Harness::default();
        h.sync.enqueue_all([
            ViewerMessage::SkinnedMeshMessage(NodeCreation {
                path: "/arm".into(),
                props: SkinnedMeshProps {
                    vertices: vec![],
                    faces: vec![],
                    color: [0, 0, 0],
                    bone_wxyzs: vec![[1.0, 0.0, 0.0, 0.0]; 3],
                    bone_positions: vec![[0.0; 3]; 3],
                    skin_indices: vec![],
                    skin_weights: vec![],
                },
                wxyz: None,
                position: None,
                visible: None,
            }),
            ViewerMessage::SetBoneOrientationMessage {
                path: "/arm".into(),
                bone_index: 5,
                wxyz: [0.0, 1.0, 0.0, 0.0],
            },
            ViewerMessage::SetBonePositionMessage {
                path: "/arm".into(),
                bone_index: 1,
                position: [0.0, 0.0, 4.0],
            },
        ]);

        let report = h.frame(0);
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.failed, 1);

        let skeleton = h.state.scene.skinned_mesh("/arm").unwrap();
        assert_eq!(skeleton.bone_count(), 3);
        assert_eq!(skeleton.poses()[1].position, Vec3::new(0.0, 0.0, 4.0));

        let mut ctx_state = ViewerState::default();
        let mut camera = VirtualCamera::default();
        let mut capture = NullCapture;
        let mut observer = RecordingObserver::default();
        let mut ctx = DispatchContext {
            state: &mut ctx_state,
            camera: &mut camera,
            capture: &mut capture,
            observer: &mut observer,
            now: Duration::ZERO,
        };
        ctx.state.scene.upsert(SceneNode::new(
            "/arm",
            NodeKind::SkinnedMesh(SkinnedMeshProps {
                vertices: vec![],
                faces: vec![],
                color: [0, 0, 0],
                bone_wxyzs: vec![[1.0, 0.0, 0.0, 0.0]; 3],
                bone_positions: vec![[0.0; 3]; 3],
                skin_indices: vec![],
                skin_weights: vec![],
            }),
        ));
        let err = dispatch(
            ViewerMessage::SetBoneOrientationMessage {
                path: "/arm".into(),
                bone_index: 5,
                wxyz: [1.0, 0.0, 0.0, 0.0],
            },
            &mut ctx,
        )
        .unwrap_err();
        assert_eq!(
            err,
            DispatchError::Skeleton(SkeletonError::BoneIndexOutOfRange {
                path: "/arm".into(),
                index: 5,
                bone_count: 3,
            })
        );
    }

    #[test]
    fn clickable_change_lands_after_the_delay() {
        let mut h = Harness::default();
        h.sync.enqueue_all([
            frame_node("/button"),
            ViewerMessage::SetSceneNodeClickableMessage {
                path: "/button".into(),
                clickable: true,
            },
        ]);
        h.frame(0);
        assert!(!h.state.scene.attributes("/button").unwrap().clickable);

        let delay = h.state.clickable_delay().as_millis() as u64;
        assert_eq!(h.frame(delay / 2).clickables_applied, 0);
        assert_eq!(h.frame(delay).clickables_applied, 1);
        assert!(h.state.scene.attributes("/button").unwrap().clickable);
    }

    #[test]
    fn clickable_change_for_removed_node_is_dropped() {
        let mut h = Harness::default();
        h.sync.enqueue_all([
            frame_node("/gone"),
            ViewerMessage::SetSceneNodeClickableMessage {
                path: "/gone".into(),
                clickable: true,
            },
            ViewerMessage::RemoveSceneNodeMessage {
                path: "/gone".into(),
            },
        ]);
        h.frame(0);

        assert_eq!(h.frame(10_000).clickables_applied, 0);
        assert!(h.state.pending_clickable().is_empty());
    }

    #[test]
    fn file_transfer_reports_progress_and_holds_the_result() {
        let mut h = Harness::default();
        h.sync.enqueue(ViewerMessage::FileTransferStartMessage {
            transfer_uuid: "1".into(),
            filename: "x.png".into(),
            mime_type: "image/png".into(),
            part_count: 3,
            size_bytes: 300,
            save_immediately: false,
        });
        for part in 0..3 {
            h.sync.enqueue(ViewerMessage::FileTransferPartMessage {
                transfer_uuid: "1".into(),
                part,
                content: vec![part as u8; 100],
            });
        }
        h.sync.enqueue(ViewerMessage::FileTransferPartAckMessage {
            transfer_uuid: "up".into(),
            transferred_bytes: 50,
            total_bytes: 200,
        });

        let report = h.frame(0);
        assert_eq!(report.failed, 0);
        assert_eq!(
            h.observer.downloads,
            vec![
                ("1".to_string(), 100, 300),
                ("1".to_string(), 200, 300),
                ("1".to_string(), 300, 300),
            ]
        );
        assert_eq!(h.observer.uploads, vec![("up".to_string(), 50, 200)]);
        assert_eq!(h.observer.completed.len(), 1);
        assert_eq!(h.observer.completed[0].bytes.len(), 300);
        assert_eq!(h.state.downloads.get("1").unwrap().file.bytes.len(), 300);
        assert_eq!(h.state.transfers.active_transfers(), 0);
    }

    #[test]
    fn out_of_order_part_is_reported_and_transfer_continues() {
        let mut h = Harness::default();
        h.sync.enqueue_all([
            ViewerMessage::FileTransferStartMessage {
                transfer_uuid: "t".into(),
                filename: "a.bin".into(),
                mime_type: "application/octet-stream".into(),
                part_count: 2,
                size_bytes: 4,
                save_immediately: true,
            },
            ViewerMessage::FileTransferPartMessage {
                transfer_uuid: "t".into(),
                part: 1,
                content: vec![3, 4],
            },
            ViewerMessage::FileTransferPartMessage {
                transfer_uuid: "t".into(),
                part: 0,
                content: vec![1, 2],
            },
            ViewerMessage::FileTransferPartMessage {
                transfer_uuid: "t".into(),
                part: 1,
                content: vec![3, 4],
            },
        ]);

        let report = h.frame(0);
        assert_eq!(report.failed, 1);
        assert_eq!(h.observer.completed[0].bytes, vec![1, 2, 3, 4]);
        assert!(h.state.downloads.is_empty());

        let mut state = ViewerState::default();
        let err = state.transfers.append_part("t", 0, vec![]).unwrap_err();
        assert_eq!(err, TransferError::UnknownTransfer("t".into()));
    }

    #[test]
    fn camera_messages_touch_only_the_camera() {
        let mut h = Harness::default();
        let before = h.camera.revision();
        h.sync.enqueue_all([
            ViewerMessage::SetCameraPositionMessage {
                position: [1.0, 2.0, 3.0],
            },
            ViewerMessage::SetCameraLookAtMessage {
                look_at: [0.0, 0.0, 1.0],
            },
            ViewerMessage::SetCameraFovMessage { fov: 0.7 },
            ViewerMessage::SetCameraNearMessage { near: 0.5 },
            ViewerMessage::SetCameraFarMessage { far: 50.0 },
        ]);
        h.frame(0);

        assert_eq!(h.camera.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(h.camera.look_at, Vec3::Z);
        assert_eq!(h.camera.fov, 0.7);
        assert_eq!(h.camera.near, 0.5);
        assert_eq!(h.camera.far, 50.0);
        assert_eq!(h.camera.revision(), before + 5);
        assert_eq!(h.state.scene.len(), 1);
    }

    #[test]
    fn unknown_kind_and_reset_are_tolerated() {
        let mut h = Harness::default();
        h.sync.enqueue_all([
            frame_node("/a/b"),
            ViewerMessage::Unknown,
            ViewerMessage::RemoveSceneNodeMessage {
                path: "/never".into(),
            },
            ViewerMessage::ResetSceneMessage,
            frame_node("/c"),
        ]);

        let report = h.frame(0);
        assert_eq!(report.dispatched, 5);
        assert_eq!(report.failed, 0);
        assert!(!h.state.scene.contains("/a"));
        assert!(h.state.scene.contains("/c"));
    }
}
