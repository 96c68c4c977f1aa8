use std::rc::Rc;
use std::sync::Arc;

use glam::Vec2;
use touch_controls::{
    Camera, ControlsConfig, ControlsError, Direction, FrameLoop, KeyCode, ManualClock,
    MotionState, PadLayouts, Scene, SimulatedFrames, TouchControls, Viewport,
};

const CORRIDOR: &str = r#"
<scene>
    <spawn>
        <position>0 0 0</position>
    </spawn>
    <object>
        <name>Walls</name>
        <object>
            <name>EndWall</name>
            <shape>box</shape>
            <position>0 0 -60</position>
            <size>40 40 0.2</size>
        </object>
    </object>
</scene>
"#;

fn controls_with(config: ControlsConfig) -> (TouchControls, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let controls = TouchControls::new(
        Camera::default(),
        config,
        PadLayouts::for_viewport(Viewport::new(800.0, 600.0)),
        clock.clone(),
    )
    .expect("valid controls");
    (controls, clock)
}

#[test]
fn walking_into_a_wall_stops_short_of_it() {
    let scene = Scene::from_xml(CORRIDOR).expect("scene parses");
    let (mut controls, clock) = controls_with(ControlsConfig::default());
    let spawn = scene.spawn().expect("spawn present");
    controls.set_position(spawn.position);
    controls.add_to_scene(Rc::new(scene));
    controls.key_down(KeyCode::Character('W'));

    let mut frames = SimulatedFrames::at_rate(clock, 60, Some(120));
    let count = FrameLoop::new()
        .run(&mut frames, |_| controls.tick())
        .expect("frames run");
    assert_eq!(count, 120);

    let z = controls.position().z;
    assert!(z < -19.0 && z > -21.0, "stopped at {z}");
    assert!(controls.locks().get(Direction::Forward));
    assert_eq!(controls.motion_state(), MotionState::LockedMoving);
    assert_eq!(controls.hit_objects()[0].hit.object, "EndWall");

    // Backing away is still allowed.
    controls.key_up(KeyCode::Character('W'));
    controls.key_down(KeyCode::Character('S'));
    controls.update().expect("update");
    assert!(controls.velocity().z > 0.0);
}

#[test]
fn held_rotation_pad_keeps_turning_between_frames() {
    let (mut controls, clock) = controls_with(ControlsConfig {
        hit_test: false,
        ..ControlsConfig::default()
    });
    let layout = *controls.rotation_pad().layout();
    assert!(controls
        .rotation_pad_mut()
        .press(layout.center + Vec2::new(layout.travel_radius(), 0.0)));
    assert_eq!(controls.rotation_pad().delta(), Vec2::new(2.0, 0.0));

    let mut frames = SimulatedFrames::at_rate(clock.clone(), 60, Some(60));
    FrameLoop::new()
        .run(&mut frames, |_| controls.tick())
        .expect("frames run");
    let yaw = controls.rotation().1;
    assert!(yaw < -0.79 && yaw > -0.81, "yaw {yaw}");
    assert_eq!(controls.rotation().0, 0.0);

    controls.rotation_pad_mut().release();
    let frozen = controls.rotation().1;
    let mut frames = SimulatedFrames::at_rate(clock, 60, Some(30));
    FrameLoop::new()
        .run(&mut frames, |_| controls.tick())
        .expect("frames run");
    assert_eq!(controls.rotation().1, frozen);
    assert_eq!(controls.rotation_pad().handle().offset, Vec2::ZERO);
}

#[test]
fn missing_scene_aborts_the_frame_loop() {
    let (mut controls, clock) = controls_with(ControlsConfig::default());
    let mut frames = SimulatedFrames::at_rate(clock, 60, Some(10));
    let mut frame_loop = FrameLoop::new();
    let result = frame_loop.run(&mut frames, |_| controls.tick());
    assert_eq!(result, Err(ControlsError::SceneNotAttached));
    assert_eq!(frame_loop.frames(), 0);
}

#[test]
fn velocity_settles_after_input_stops() {
    let (mut controls, _) = controls_with(ControlsConfig {
        hit_test: false,
        ..ControlsConfig::default()
    });
    controls.key_down(KeyCode::Character('D'));
    for _ in 0..5 {
        controls.update().expect("update");
    }
    assert!(controls.position().x > 0.0);
    controls.key_up(KeyCode::Character('D'));

    let mut previous = controls.velocity().x;
    for _ in 0..20 {
        controls.update().expect("update");
        let current = controls.velocity().x;
        assert!(current >= 0.0 && current < previous);
        previous = current;
    }
    assert_eq!(controls.motion_state(), MotionState::Idle);
    assert_eq!(controls.velocity().y, 0.0);
    assert_eq!(controls.position().y, 0.0);
    assert!(controls.position().z.abs() < 1e-5);
}
