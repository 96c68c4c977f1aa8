//! First-person navigation controller.
//!
//! [`TouchControls`] owns the body/camera rig and both virtual pads. Pad and
//! keyboard events update the shared [`InputState`] or rotate the rig right
//! away; [`TouchControls::update`] runs once per frame to refresh the
//! direction locks from scene ray hits and to integrate velocity.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use glam::{Quat, Vec2, Vec3};
use log::{debug, trace};
use serde::Serialize;

use crate::clock::Clock;
use crate::config::ControlsConfig;
use crate::error::{ControlsError, Result};
use crate::input::{Direction, DirectionFlags, InputState, KeyCode, MouseButton};
use crate::joystick::{Joystick, JoystickTiming, PadEvent, PadKind, PadLayouts};
use crate::rig::{Body, Camera};
use crate::scene::{Intersection, SceneGraph};

/// Fraction of horizontal velocity removed per unit of `delta`.
pub const DAMPING: f32 = 0.75;

/// Horizontal speed under which a body without input counts as resting.
pub const REST_SPEED: f32 = 1e-3;

/// Applies look deltas to a body, keeping pitch inside the configured limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Orientation {
    rotation_factor: f32,
    max_pitch: f32,
}

impl Orientation {
    pub fn new(config: &ControlsConfig) -> Self {
        Self {
            rotation_factor: config.rotation_factor,
            max_pitch: config.max_pitch_radians(),
        }
    }

    /// Pitch limit in radians.
    pub fn max_pitch(&self) -> f32 {
        self.max_pitch
    }

    pub fn clamp_pitch(&self, pitch: f32) -> f32 {
        pitch.clamp(-self.max_pitch, self.max_pitch)
    }

    /// `yaw -= dx * factor`, `pitch = clamp(pitch - dy * factor)`.
    pub fn apply(&self, body: &Body, dx: f32, dy: f32) {
        body.set_yaw(body.yaw() - dx * self.rotation_factor);
        body.set_pitch(self.clamp_pitch(body.pitch() - dy * self.rotation_factor));
    }
}

/// A lock-inducing hit found by the last hit-test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectionalHit {
    pub direction: Direction,
    pub hit: Intersection,
}

/// Coarse navigation state, derived each time it is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MotionState {
    Idle,
    Moving,
    /// Movement input is held but every requested direction is locked.
    LockedMoving,
}

pub struct TouchControls {
    config: ControlsConfig,
    orientation: Orientation,
    body: Body,
    input: Arc<InputState>,
    clock: Arc<dyn Clock>,
    scene: Option<Rc<dyn SceneGraph>>,
    velocity: Vec3,
    locks: DirectionFlags,
    hit_objects: Vec<DirectionalHit>,
    enabled: bool,
    mouse_look: bool,
    rotation_pad: Joystick,
    movement_pad: Joystick,
}

impl TouchControls {
    pub fn new(
        camera: Camera,
        config: ControlsConfig,
        layouts: PadLayouts,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Self::with_timing(camera, config, layouts, JoystickTiming::default(), clock)
    }

    pub fn with_timing(
        camera: Camera,
        config: ControlsConfig,
        layouts: PadLayouts,
        timing: JoystickTiming,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let orientation = Orientation::new(&config);
        let body = Body::new(camera);
        let input = Arc::new(InputState::new());

        let mut rotation_pad =
            Joystick::new(PadKind::Rotation, layouts.rotation, timing, Arc::clone(&clock))?;
        let look_body = body.clone();
        rotation_pad.subscribe(move |event| {
            if let PadEvent::Drag { dx, dy } = *event {
                // Pushing the handle up looks up.
                orientation.apply(&look_body, dx, -dy);
            }
        });

        let mut movement_pad =
            Joystick::new(PadKind::Movement, layouts.movement, timing, Arc::clone(&clock))?;
        let pad_input = Arc::clone(&input);
        movement_pad.subscribe(move |event| match *event {
            PadEvent::Drag { dx, dy } => pad_input.apply_movement_pad(Vec2::new(dx, dy)),
            PadEvent::Stopped => pad_input.stop_movement_pad(),
        });

        debug!(
            "touch controls created (speed {}, hit test {} within {})",
            config.speed_factor, config.hit_test, config.hit_test_distance
        );

        Ok(Self {
            config,
            orientation,
            body,
            input,
            clock,
            scene: None,
            velocity: Vec3::ZERO,
            locks: DirectionFlags::default(),
            hit_objects: Vec::new(),
            enabled: true,
            mouse_look: false,
            rotation_pad,
            movement_pad,
        })
    }

    pub fn config(&self) -> &ControlsConfig {
        &self.config
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// The navigable node. Clones share state with the controller.
    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn input(&self) -> &Arc<InputState> {
        &self.input
    }

    /// Attaches the body to `scene` and uses it for hit-testing.
    pub fn add_to_scene(&mut self, scene: Rc<dyn SceneGraph>) {
        scene.add_node(self.body.clone());
        self.scene = Some(scene);
        debug!("body attached to scene");
    }

    pub fn has_scene(&self) -> bool {
        self.scene.is_some()
    }

    pub fn set_position(&self, position: Vec3) {
        self.body.set_position(position);
    }

    pub fn position(&self) -> Vec3 {
        self.body.position()
    }

    /// Updates whichever angles are given. Pitch is clamped to the limit.
    pub fn set_rotation(&self, pitch: Option<f32>, yaw: Option<f32>) {
        if let Some(pitch) = pitch {
            self.body.set_pitch(self.orientation.clamp_pitch(pitch));
        }
        if let Some(yaw) = yaw {
            self.body.set_yaw(yaw);
        }
    }

    /// `(pitch, yaw)` in radians.
    pub fn rotation(&self) -> (f32, f32) {
        (self.body.pitch(), self.body.yaw())
    }

    /// Runs one frame: hit-test (when enabled), then velocity integration.
    pub fn update(&mut self) -> Result<()> {
        if self.config.hit_test {
            self.hit_test()?;
        }
        self.integrate();
        Ok(())
    }

    /// Advances both pads (repeat emission, release animation) and then runs
    /// [`TouchControls::update`].
    pub fn tick(&mut self) -> Result<()> {
        self.rotation_pad.tick();
        self.movement_pad.tick();
        self.update()
    }

    /// Recomputes the direction locks from four rays cast from the body.
    pub fn hit_test(&mut self) -> Result<&[DirectionalHit]> {
        self.locks.clear();
        self.hit_objects.clear();
        let scene = self.scene.as_ref().ok_or(ControlsError::SceneNotAttached)?;

        let origin = self.body.position();
        let facing = self.body.facing();
        for direction in Direction::ALL {
            let ray = Quat::from_rotation_y(direction.yaw_offset()) * facing;
            let Some(nearest) = scene.intersect_ray(origin, ray).into_iter().next() else {
                continue;
            };
            if nearest.distance < self.config.hit_test_distance {
                trace!(
                    "{direction:?} locked by {} at {:.2}",
                    nearest.object,
                    nearest.distance
                );
                self.locks.set(direction, true);
                self.hit_objects.push(DirectionalHit {
                    direction,
                    hit: nearest,
                });
            }
        }
        Ok(&self.hit_objects)
    }

    fn integrate(&mut self) {
        let delta = self.config.delta;
        self.velocity.x -= self.velocity.x * DAMPING * delta;
        self.velocity.z -= self.velocity.z * DAMPING * delta;

        let magnitude = self.input.magnitude();
        let step = self.config.speed_factor * delta;
        for direction in self.input.movement().active() {
            if self.locks.get(direction) {
                continue;
            }
            match direction {
                Direction::Forward => self.velocity.z -= magnitude.y * step,
                Direction::Backward => self.velocity.z += magnitude.y * step,
                Direction::Left => self.velocity.x -= magnitude.x * step,
                Direction::Right => self.velocity.x += magnitude.x * step,
            }
        }

        self.body.translate_local(self.velocity);
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn movement(&self) -> DirectionFlags {
        self.input.movement()
    }

    pub fn locks(&self) -> DirectionFlags {
        self.locks
    }

    /// Hits recorded by the last hit-test.
    pub fn hit_objects(&self) -> &[DirectionalHit] {
        &self.hit_objects
    }

    pub fn motion_state(&self) -> MotionState {
        let movement = self.input.movement();
        if movement.active().any(|direction| !self.locks.get(direction)) {
            MotionState::Moving
        } else if movement.any() {
            MotionState::LockedMoving
        } else if Vec2::new(self.velocity.x, self.velocity.z).length() > REST_SPEED {
            MotionState::Moving
        } else {
            MotionState::Idle
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disabled controls ignore key presses and look-button presses. Releases
    /// still go through so nothing stays stuck.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.mouse_look = false;
        }
    }

    pub fn key_down(&self, key: KeyCode) -> bool {
        self.enabled && self.input.set_key_down(key)
    }

    pub fn key_up(&self, key: KeyCode) {
        self.input.set_key_up(key);
    }

    /// Returns `true` when the press started mouse look, in which case the
    /// host should suppress the button's default action.
    pub fn mouse_down(&mut self, button: MouseButton) -> bool {
        if !self.enabled {
            return false;
        }
        self.input.set_mouse_button_down(button);
        if button == MouseButton::RIGHT {
            self.mouse_look = true;
            return true;
        }
        false
    }

    pub fn mouse_up(&mut self, button: MouseButton) {
        self.input.set_mouse_button_up(button);
        if button == MouseButton::RIGHT {
            self.stop_mouse_look();
        }
    }

    /// Handles pointer motion over the surface. `client` is the pointer
    /// position, `movement` the raw motion since the last event and
    /// `viewport` the surface size, all in pixels.
    pub fn pointer_move(&mut self, client: Vec2, movement: Vec2, viewport: Vec2) {
        self.input
            .set_pointer_position(client, viewport, self.clock.now());
        if self.mouse_look && self.enabled {
            // Dragging moves the scene under the pointer.
            self.orientation
                .apply(&self.body, -movement.x, -movement.y);
        }
    }

    /// The pointer left the document.
    pub fn mouse_out(&mut self) {
        self.input.set_pointer_over(false);
        self.stop_mouse_look();
    }

    pub fn stop_mouse_look(&mut self) {
        if self.mouse_look {
            debug!("mouse look stopped");
        }
        self.mouse_look = false;
        self.input.set_mouse_button_up(MouseButton::RIGHT);
    }

    pub fn is_mouse_look(&self) -> bool {
        self.mouse_look
    }

    pub fn pointer_ndc(&self) -> Vec2 {
        self.input.pointer_ndc()
    }

    pub fn is_pointer_moving(&self) -> bool {
        self.input.is_pointer_moving(self.clock.now())
    }

    pub fn rotation_pad(&self) -> &Joystick {
        &self.rotation_pad
    }

    pub fn rotation_pad_mut(&mut self) -> &mut Joystick {
        &mut self.rotation_pad
    }

    pub fn movement_pad(&self) -> &Joystick {
        &self.movement_pad
    }

    pub fn movement_pad_mut(&mut self) -> &mut Joystick {
        &mut self.movement_pad
    }

    /// Moves both pads, e.g. after the host surface was resized.
    pub fn set_pad_layouts(&mut self, layouts: PadLayouts) -> Result<()> {
        self.rotation_pad.set_layout(layouts.rotation)?;
        self.movement_pad.set_layout(layouts.movement)
    }

    pub fn pad_mut(&mut self, kind: PadKind) -> &mut Joystick {
        match kind {
            PadKind::Rotation => &mut self.rotation_pad,
            PadKind::Movement => &mut self.movement_pad,
        }
    }
}

impl fmt::Debug for TouchControls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TouchControls")
            .field("config", &self.config)
            .field("body", &self.body)
            .field("velocity", &self.velocity)
            .field("locks", &self.locks)
            .field("scene_attached", &self.scene.is_some())
            .field("enabled", &self.enabled)
            .field("mouse_look", &self.mouse_look)
            .finish()
    }
}
