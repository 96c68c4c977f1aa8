//! Touch and keyboard first-person navigation for 3D scene viewers.
//!
//! The crate turns virtual-joystick drags, keys and mouse look into camera
//! orientation and body motion, with per-direction movement locks derived
//! from ray hits against the host's scene. Rendering stays outside of the
//! crate; the host supplies a [`SceneGraph`] and drives the frame loop.

pub mod app;
pub mod clock;
pub mod config;
pub mod controls;
pub mod error;
pub mod events;
pub mod frame_loop;
pub mod input;
pub mod joystick;
pub mod rig;
pub mod scene;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use app::{print_final_state, ScriptCommand, ScriptedInput, HEADLESS_VIEWPORT};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ControlsConfig;
pub use controls::{DirectionalHit, MotionState, Orientation, TouchControls};
pub use error::{ControlsError, Result};
pub use events::{EventBus, SubscriptionId};
pub use frame_loop::{FrameInfo, FrameLoop, FrameSource, SimulatedFrames, StopHandle};
pub use input::{Direction, DirectionFlags, InputState, KeyCode, MouseButton, NamedKey};
pub use joystick::{
    HandleState, Joystick, JoystickTiming, PadEvent, PadKind, PadLayout, PadLayouts, Viewport,
};
pub use rig::{Body, Camera, CameraHolder};
pub use scene::{Intersection, Scene, SceneGraph, SceneObject, Shape, Spawn};
