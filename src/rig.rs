use std::sync::Arc;

use glam::{EulerRot, Mat4, Quat, Vec3};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub const BODY_NAME: &str = "body";

/// Camera supplied by the host renderer; it rides on the camera holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub name: String,
    /// Vertical field of view in degrees.
    #[serde(default = "default_fov")]
    pub fov: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
    /// Position relative to the camera holder.
    #[serde(default)]
    pub offset: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            name: "camera".to_string(),
            fov: default_fov(),
            near: default_near(),
            far: default_far(),
            offset: Vec3::ZERO,
        }
    }
}

impl Camera {
    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov.to_radians(), aspect.max(0.01), self.near, self.far)
    }
}

fn default_fov() -> f32 {
    40.0
}

fn default_near() -> f32 {
    2.0
}

fn default_far() -> f32 {
    1000.0
}

/// Pitch-only node nested under the body, carrying the camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraHolder {
    pub pitch: f32,
    pub camera: Camera,
}

#[derive(Debug)]
struct BodyState {
    position: Vec3,
    yaw: f32,
    holder: CameraHolder,
}

/// The navigable first-person node: position and yaw, with the camera holder
/// (pitch) nested inside.
///
/// Clones share the same node, so the controller, the scene and event
/// handlers all observe one transform.
#[derive(Debug, Clone)]
pub struct Body {
    state: Arc<RwLock<BodyState>>,
}

impl Body {
    pub fn new(camera: Camera) -> Self {
        Self {
            state: Arc::new(RwLock::new(BodyState {
                position: Vec3::ZERO,
                yaw: 0.0,
                holder: CameraHolder { pitch: 0.0, camera },
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        BODY_NAME
    }

    pub fn position(&self) -> Vec3 {
        self.state.read().position
    }

    pub fn set_position(&self, position: Vec3) {
        self.state.write().position = position;
    }

    pub fn yaw(&self) -> f32 {
        self.state.read().yaw
    }

    pub fn set_yaw(&self, yaw: f32) {
        self.state.write().yaw = yaw;
    }

    pub fn pitch(&self) -> f32 {
        self.state.read().holder.pitch
    }

    /// Stores the pitch as given; limits are enforced by the controller.
    pub fn set_pitch(&self, pitch: f32) {
        self.state.write().holder.pitch = pitch;
    }

    pub fn camera_holder(&self) -> CameraHolder {
        self.state.read().holder.clone()
    }

    pub fn camera(&self) -> Camera {
        self.state.read().holder.camera.clone()
    }

    /// Moves the body along its own axes, so `-z` is wherever it faces.
    pub fn translate_local(&self, offset: Vec3) {
        let mut state = self.state.write();
        let rotation = Quat::from_rotation_y(state.yaw);
        state.position += rotation * offset;
    }

    /// Unit vector the camera looks along, from yaw and pitch.
    pub fn facing(&self) -> Vec3 {
        let state = self.state.read();
        Quat::from_euler(EulerRot::YXZ, state.yaw, state.holder.pitch, 0.0) * Vec3::NEG_Z
    }

    pub fn transform(&self) -> Mat4 {
        let state = self.state.read();
        Mat4::from_rotation_translation(Quat::from_rotation_y(state.yaw), state.position)
    }

    /// World transform of the camera: body, then holder pitch, then camera offset.
    pub fn camera_transform(&self) -> Mat4 {
        let (pitch, offset) = {
            let state = self.state.read();
            (state.holder.pitch, state.holder.camera.offset)
        };
        self.transform() * Mat4::from_rotation_x(pitch) * Mat4::from_translation(offset)
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.camera_transform().inverse()
    }

    pub fn is_same_node(&self, other: &Body) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}
