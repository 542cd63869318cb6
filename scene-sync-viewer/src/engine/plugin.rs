use bevy::prelude::*;

use crate::config::ViewerConfig;
use crate::engine::camera::viewport_camera::{spawn_viewer_camera, sync_viewer_camera};
use crate::engine::capture::{CaptureCommands, CaptureRig, finish_captures, run_capture_commands};
use crate::engine::downloads::{
    FileCompletedEvent, TransferNotices, TransferProgressEvent, forward_transfer_progress,
    handle_completed_files,
};
use crate::engine::scene::gizmos::draw_frame_axes;
use crate::engine::scene::labels::position_scene_labels;
use crate::engine::scene::materialize::{
    SceneEntities, apply_bone_poses, apply_staged_poses, materialize_scene_nodes,
};
use crate::engine::systems::transfer_overlay::{
    TransferProgressBoard, spawn_transfer_overlay, track_transfer_progress,
    update_transfer_overlay,
};
use crate::rpc::web_rpc::WebRpcPlugin;
use crate::sync::camera::VirtualCamera;
use crate::sync::dispatch::{DispatchContext, SceneSync};
use crate::sync::state::ViewerState;

/// Per-frame stages, run in this order.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneSyncSet {
    /// Host inbox into the message queue.
    Receive,
    /// Frame gate and dispatcher.
    Dispatch,
    /// Scene store onto entities, then the camera.
    Materialize,
    Capture,
    /// Turn this frame's events into host notifications.
    Notify,
    /// Flush outgoing traffic.
    Present,
}

/// Message handling, scene materialisation and capture. Runs headless.
pub struct SceneSyncPlugin {
    pub config: ViewerConfig,
}

impl Plugin for SceneSyncPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.config.clone())
            .insert_resource(ViewerState::with_clickable_delay(
                self.config.clickable_delay(),
            ))
            .init_resource::<SceneSync>()
            .init_resource::<VirtualCamera>()
            .init_resource::<SceneEntities>()
            .init_resource::<CaptureCommands>()
            .init_resource::<CaptureRig>()
            .init_resource::<TransferProgressBoard>()
            .add_event::<TransferProgressEvent>()
            .add_event::<FileCompletedEvent>()
            .configure_sets(
                Update,
                (
                    SceneSyncSet::Receive,
                    SceneSyncSet::Dispatch,
                    SceneSyncSet::Materialize,
                    SceneSyncSet::Capture,
                    SceneSyncSet::Notify,
                    SceneSyncSet::Present,
                )
                    .chain(),
            )
            .add_plugins(WebRpcPlugin)
            .add_systems(
                Update,
                drain_and_dispatch_system.in_set(SceneSyncSet::Dispatch),
            )
            .add_systems(
                Update,
                (
                    materialize_scene_nodes,
                    apply_staged_poses,
                    apply_bone_poses,
                    sync_viewer_camera,
                )
                    .chain()
                    .in_set(SceneSyncSet::Materialize),
            )
            .add_systems(
                Update,
                (run_capture_commands, finish_captures)
                    .chain()
                    .in_set(SceneSyncSet::Capture),
            )
            .add_systems(
                Update,
                (
                    handle_completed_files,
                    forward_transfer_progress,
                    track_transfer_progress,
                )
                    .in_set(SceneSyncSet::Notify),
            );
    }
}

/// Camera, lighting, gizmos and screen-space text. Needs the render plugins.
pub struct SceneRenderPlugin;

impl Plugin for SceneRenderPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Startup,
            (spawn_viewer_camera, spawn_lighting, spawn_transfer_overlay),
        )
        .add_systems(
            Update,
            (
                draw_frame_axes,
                position_scene_labels,
                update_transfer_overlay,
            )
                .in_set(SceneSyncSet::Present),
        );
    }
}

fn spawn_lighting(mut commands: Commands) {
    commands.spawn((
        DirectionalLight {
            shadows_enabled: false,
            ..default()
        },
        Transform::from_rotation(Quat::from_euler(
            EulerRot::ZYX,
            0.0,
            1.0,
            -std::f32::consts::FRAC_PI_4,
        )),
    ));
}

fn drain_and_dispatch_system(
    time: Res<Time>,
    mut sync: ResMut<SceneSync>,
    mut state: ResMut<ViewerState>,
    mut camera: ResMut<VirtualCamera>,
    mut capture: ResMut<CaptureCommands>,
    mut progress_events: EventWriter<TransferProgressEvent>,
    mut completed_events: EventWriter<FileCompletedEvent>,
) {
    if sync.queue().is_empty() && !state.capture_pending() && state.pending_clickable().is_empty()
    {
        return;
    }

    let mut notices = TransferNotices::default();
    let mut ctx = DispatchContext {
        state: &mut *state,
        camera: &mut *camera,
        capture: &mut *capture,
        observer: &mut notices,
        now: time.elapsed(),
    };
    let report = sync.drain_and_dispatch(&mut ctx);

    if report.dispatched > 0 || report.failed > 0 {
        debug!(
            "Dispatched {} messages ({} failed), {} still queued",
            report.dispatched,
            report.failed,
            sync.queue().len()
        );
    }

    notices.flush(&mut progress_events, &mut completed_events);
}
