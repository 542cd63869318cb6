use serde::{Deserialize, Serialize};

/// Output format of a render capture.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFormat {
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
}

impl RenderFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

/// Coordinate frame, optionally drawn as a set of axes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct FrameProps {
    pub show_axes: bool,
    pub axes_length: f32,
    pub axes_radius: f32,
}

impl Default for FrameProps {
    fn default() -> Self {
        Self {
            show_axes: true,
            axes_length: 0.5,
            axes_radius: 0.025,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MeshProps {
    pub vertices: Vec<[f32; 3]>,
    pub faces: Vec<[u32; 3]>,
    #[serde(default = "default_colour")]
    pub color: [u8; 3],
    #[serde(default)]
    pub wireframe: bool,
    #[serde(default)]
    pub opacity: Option<f32>,
}

/// Mesh with a skeleton. Bone poses are in the mesh's local frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SkinnedMeshProps {
    pub vertices: Vec<[f32; 3]>,
    pub faces: Vec<[u32; 3]>,
    #[serde(default = "default_colour")]
    pub color: [u8; 3],
    pub bone_wxyzs: Vec<[f32; 4]>,
    pub bone_positions: Vec<[f32; 3]>,
    #[serde(default)]
    pub skin_indices: Vec<[u16; 4]>,
    #[serde(default)]
    pub skin_weights: Vec<[f32; 4]>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PointCloudProps {
    pub points: Vec<[f32; 3]>,
    #[serde(default)]
    pub colors: Vec<[u8; 3]>,
    #[serde(default = "default_point_size")]
    pub point_size: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LabelProps {
    pub text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GridProps {
    pub width: f32,
    pub height: f32,
    pub cell_size: f32,
}

impl Default for GridProps {
    fn default() -> Self {
        Self {
            width: 10.0,
            height: 10.0,
            cell_size: 0.5,
        }
    }
}

fn default_colour() -> [u8; 3] {
    [200, 200, 200]
}

fn default_point_size() -> f32 {
    0.01
}

/// Scene node creation payload shared by every node kind.
///
/// The optional pose and visibility fields seed the node's attributes when the
/// node is created or replaced.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NodeCreation<P> {
    pub path: String,
    pub props: P,
    #[serde(default)]
    pub wxyz: Option<[f32; 4]>,
    #[serde(default)]
    pub position: Option<[f32; 3]>,
    #[serde(default)]
    pub visible: Option<bool>,
}

/// Inbound message union. Unrecognised `type` tags decode to `Unknown`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ViewerMessage {
    // Scene node creation.
    FrameMessage(NodeCreation<FrameProps>),
    MeshMessage(NodeCreation<MeshProps>),
    SkinnedMeshMessage(NodeCreation<SkinnedMeshProps>),
    PointCloudMessage(NodeCreation<PointCloudProps>),
    LabelMessage(NodeCreation<LabelProps>),
    GridMessage(NodeCreation<GridProps>),

    // Node attributes.
    SetPositionMessage {
        path: String,
        position: [f32; 3],
    },
    SetOrientationMessage {
        path: String,
        wxyz: [f32; 4],
    },
    SetPoseMessage {
        path: String,
        wxyz: [f32; 4],
        position: [f32; 3],
    },
    SetSceneNodeVisibilityMessage {
        path: String,
        visible: bool,
    },
    SetSceneNodeClickableMessage {
        path: String,
        clickable: bool,
    },
    SetBoneOrientationMessage {
        path: String,
        bone_index: usize,
        wxyz: [f32; 4],
    },
    SetBonePositionMessage {
        path: String,
        bone_index: usize,
        position: [f32; 3],
    },
    RemoveSceneNodeMessage {
        path: String,
    },
    ResetSceneMessage,

    // File transfers.
    FileTransferStartMessage {
        transfer_uuid: String,
        filename: String,
        mime_type: String,
        #[serde(default)]
        part_count: u32,
        size_bytes: u64,
        #[serde(default)]
        save_immediately: bool,
    },
    FileTransferPartMessage {
        transfer_uuid: String,
        part: u32,
        #[serde(with = "crate::protocol::bytes")]
        content: Vec<u8>,
    },
    FileTransferPartAckMessage {
        transfer_uuid: String,
        transferred_bytes: u64,
        total_bytes: u64,
    },

    // Camera.
    SetCameraPositionMessage {
        position: [f32; 3],
    },
    SetCameraLookAtMessage {
        look_at: [f32; 3],
    },
    SetCameraUpDirectionMessage {
        up: [f32; 3],
    },
    SetCameraFovMessage {
        fov: f32,
    },
    SetCameraNearMessage {
        near: f32,
    },
    SetCameraFarMessage {
        far: f32,
    },

    // Render capture.
    GetRenderRequestMessage {
        format: RenderFormat,
        width: u32,
        height: u32,
        #[serde(default)]
        quality: Option<u8>,
        wxyz: [f32; 4],
        position: [f32; 3],
        fov: f32,
    },

    #[serde(other)]
    Unknown,
}

impl ViewerMessage {
    /// Render requests act as a barrier in the frame gate.
    pub fn is_render_request(&self) -> bool {
        matches!(self, Self::GetRenderRequestMessage { .. })
    }

    /// Wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FrameMessage(_) => "FrameMessage",
            Self::MeshMessage(_) => "MeshMessage",
            Self::SkinnedMeshMessage(_) => "SkinnedMeshMessage",
            Self::PointCloudMessage(_) => "PointCloudMessage",
            Self::LabelMessage(_) => "LabelMessage",
            Self::GridMessage(_) => "GridMessage",
            Self::SetPositionMessage { .. } => "SetPositionMessage",
            Self::SetOrientationMessage { .. } => "SetOrientationMessage",
            Self::SetPoseMessage { .. } => "SetPoseMessage",
            Self::SetSceneNodeVisibilityMessage { .. } => "SetSceneNodeVisibilityMessage",
            Self::SetSceneNodeClickableMessage { .. } => "SetSceneNodeClickableMessage",
            Self::SetBoneOrientationMessage { .. } => "SetBoneOrientationMessage",
            Self::SetBonePositionMessage { .. } => "SetBonePositionMessage",
            Self::RemoveSceneNodeMessage { .. } => "RemoveSceneNodeMessage",
            Self::ResetSceneMessage => "ResetSceneMessage",
            Self::FileTransferStartMessage { .. } => "FileTransferStartMessage",
            Self::FileTransferPartMessage { .. } => "FileTransferPartMessage",
            Self::FileTransferPartAckMessage { .. } => "FileTransferPartAckMessage",
            Self::SetCameraPositionMessage { .. } => "SetCameraPositionMessage",
            Self::SetCameraLookAtMessage { .. } => "SetCameraLookAtMessage",
            Self::SetCameraUpDirectionMessage { .. } => "SetCameraUpDirectionMessage",
            Self::SetCameraFovMessage { .. } => "SetCameraFovMessage",
            Self::SetCameraNearMessage { .. } => "SetCameraNearMessage",
            Self::SetCameraFarMessage { .. } => "SetCameraFarMessage",
            Self::GetRenderRequestMessage { .. } => "GetRenderRequestMessage",
            Self::Unknown => "Unknown",
        }
    }
}

/// Messages the viewer sends back to the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    GetRenderResponseMessage {
        #[serde(with = "crate::protocol::bytes")]
        payload: Vec<u8>,
    },
}
