use anyhow::{anyhow, bail, Context, Result};
use glam::{Vec2, Vec3};

use crate::controls::TouchControls;
use crate::input::{KeyCode, MouseButton};
use crate::joystick::PadKind;

/// Surface size assumed by headless runs, in pixels.
pub const HEADLESS_VIEWPORT: Vec2 = Vec2::new(800.0, 600.0);

/// One input action replayed by a headless run.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptCommand {
    KeyDown(KeyCode),
    KeyUp(KeyCode),
    /// Pad offsets are pixels from the pad center, `y` down like the page.
    Press(PadKind, Vec2),
    Drag(PadKind, Vec2),
    Release(PadKind),
    /// Pointer motion with the look button held.
    Look(Vec2),
    Position(Vec3),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimedCommand {
    pub frame: u64,
    pub command: ScriptCommand,
}

/// Frame-stamped input script.
///
/// One command per line, prefixed by the frame it fires on. Blank lines and
/// `#` comments are skipped.
///
/// ```text
/// 0   key_down W
/// 30  key_up W
/// 31  press movement 0 -35
/// 40  drag rotation 10 0
/// 60  release movement
/// 61  look -40 0
/// 62  position 0 20 300
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    commands: Vec<TimedCommand>,
    cursor: usize,
}

impl ScriptedInput {
    pub fn parse(source: &str) -> Result<Self> {
        let mut commands = Vec::new();
        for (number, line) in source.lines().enumerate() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let command = parse_line(line).with_context(|| format!("script line {}", number + 1))?;
            commands.push(command);
        }
        commands.sort_by_key(|command| command.frame);
        Ok(Self {
            commands,
            cursor: 0,
        })
    }

    pub fn commands(&self) -> &[TimedCommand] {
        &self.commands
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.commands.len()
    }

    /// Applies every pending command stamped at or before `frame`.
    pub fn apply(&mut self, frame: u64, controls: &mut TouchControls) -> usize {
        let start = self.cursor;
        while let Some(timed) = self.commands.get(self.cursor) {
            if timed.frame > frame {
                break;
            }
            apply_command(&timed.command, controls);
            self.cursor += 1;
        }
        self.cursor - start
    }
}

fn apply_command(command: &ScriptCommand, controls: &mut TouchControls) {
    match command {
        ScriptCommand::KeyDown(key) => {
            controls.key_down(*key);
        }
        ScriptCommand::KeyUp(key) => controls.key_up(*key),
        ScriptCommand::Press(kind, offset) => {
            let pad = controls.pad_mut(*kind);
            let point = pad.layout().center + *offset;
            pad.press(point);
        }
        ScriptCommand::Drag(kind, offset) => {
            let pad = controls.pad_mut(*kind);
            let point = pad.layout().center + *offset;
            pad.drag(point);
        }
        ScriptCommand::Release(kind) => controls.pad_mut(*kind).release(),
        ScriptCommand::Look(movement) => {
            let pointer = HEADLESS_VIEWPORT / 2.0;
            controls.mouse_down(MouseButton::RIGHT);
            controls.pointer_move(pointer, *movement, HEADLESS_VIEWPORT);
            controls.mouse_up(MouseButton::RIGHT);
        }
        ScriptCommand::Position(position) => controls.set_position(*position),
    }
}

fn parse_line(line: &str) -> Result<TimedCommand> {
    let mut words = line.split_whitespace();
    let frame = words
        .next()
        .ok_or_else(|| anyhow!("missing frame number"))?
        .parse::<u64>()
        .context("frame number must be a non-negative integer")?;
    let name = words.next().ok_or_else(|| anyhow!("missing command"))?;
    let args: Vec<&str> = words.collect();

    let command = match (name, args.as_slice()) {
        ("key_down", [key]) => ScriptCommand::KeyDown(parse_key(key)?),
        ("key_up", [key]) => ScriptCommand::KeyUp(parse_key(key)?),
        ("press", [pad, x, y]) => ScriptCommand::Press(parse_pad(pad)?, parse_vec2(x, y)?),
        ("drag", [pad, x, y]) => ScriptCommand::Drag(parse_pad(pad)?, parse_vec2(x, y)?),
        ("release", [pad]) => ScriptCommand::Release(parse_pad(pad)?),
        ("look", [dx, dy]) => ScriptCommand::Look(parse_vec2(dx, dy)?),
        ("position", [x, y, z]) => {
            ScriptCommand::Position(Vec3::new(parse_f32(x)?, parse_f32(y)?, parse_f32(z)?))
        }
        ("key_down" | "key_up" | "press" | "drag" | "release" | "look" | "position", _) => {
            bail!("wrong number of arguments for `{name}`")
        }
        (other, _) => bail!("unknown command `{other}`"),
    };
    Ok(TimedCommand { frame, command })
}

fn parse_key(name: &str) -> Result<KeyCode> {
    KeyCode::from_name(name).ok_or_else(|| anyhow!("unknown key `{name}`"))
}

fn parse_pad(name: &str) -> Result<PadKind> {
    match name {
        "rotation" => Ok(PadKind::Rotation),
        "movement" => Ok(PadKind::Movement),
        other => Err(anyhow!("unknown pad `{other}`, expected rotation or movement")),
    }
}

fn parse_vec2(x: &str, y: &str) -> Result<Vec2> {
    Ok(Vec2::new(parse_f32(x)?, parse_f32(y)?))
}

fn parse_f32(value: &str) -> Result<f32> {
    value
        .parse::<f32>()
        .map_err(|err| anyhow!("failed to parse number `{value}`: {err}"))
}

/// Human-readable summary of where the controller ended up.
pub fn final_state_lines(controls: &TouchControls) -> Vec<String> {
    let position = controls.position();
    let velocity = controls.velocity();
    let (pitch, yaw) = controls.rotation();
    let mut lines = vec![
        format!(
            " - position=({:.2}, {:.2}, {:.2})",
            position.x, position.y, position.z
        ),
        format!(
            " - pitch={:.2} yaw={:.2} (degrees)",
            pitch.to_degrees(),
            yaw.to_degrees()
        ),
        format!(
            " - velocity=({:.2}, {:.2}, {:.2})",
            velocity.x, velocity.y, velocity.z
        ),
        format!(" - motion={:?}", controls.motion_state()),
    ];
    for hit in controls.hit_objects() {
        lines.push(format!(
            " - {:?} locked by {} at {:.2}",
            hit.direction, hit.hit.object, hit.hit.distance
        ));
    }
    lines
}

pub fn print_final_state(controls: &TouchControls) {
    println!("Final body state:");
    for line in final_state_lines(controls) {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ControlsConfig;
    use crate::input::{Direction, NamedKey};
    use crate::joystick::{PadLayouts, Viewport};
    use crate::rig::Camera;

    fn controls() -> TouchControls {
        TouchControls::new(
            Camera::default(),
            ControlsConfig {
                hit_test: false,
                ..ControlsConfig::default()
            },
            PadLayouts::for_viewport(Viewport::new(HEADLESS_VIEWPORT.x, HEADLESS_VIEWPORT.y)),
            Arc::new(ManualClock::new()),
        )
        .unwrap()
    }

    #[test]
    fn parses_commands_and_sorts_by_frame() {
        let script = ScriptedInput::parse(
            "# warm up\n\
             10 key_up ArrowUp\n\
             0 key_down ArrowUp   # go\n\
             \n\
             5 press movement 0 -35\n\
             6 look -4 2\n",
        )
        .unwrap();
        let frames: Vec<_> = script.commands().iter().map(|c| c.frame).collect();
        assert_eq!(frames, vec![0, 5, 6, 10]);
        assert_eq!(
            script.commands()[0].command,
            ScriptCommand::KeyDown(KeyCode::Named(NamedKey::Up))
        );
        assert_eq!(
            script.commands()[1].command,
            ScriptCommand::Press(PadKind::Movement, Vec2::new(0.0, -35.0))
        );
    }

    #[test]
    fn rejects_bad_lines_with_line_numbers() {
        let err = ScriptedInput::parse("0 key_down W\n1 jump\n").unwrap_err();
        assert!(format!("{err:#}").contains("script line 2"));
        assert!(ScriptedInput::parse("0 press elbow 1 2").is_err());
        assert!(ScriptedInput::parse("0 key_down").is_err());
        assert!(ScriptedInput::parse("x key_down W").is_err());
    }

    #[test]
    fn applies_commands_when_their_frame_arrives() {
        let mut script = ScriptedInput::parse("0 key_down W\n2 key_up W\n").unwrap();
        let mut controls = controls();
        assert_eq!(script.apply(0, &mut controls), 1);
        assert!(controls.movement().get(Direction::Forward));
        assert_eq!(script.apply(1, &mut controls), 0);
        assert_eq!(script.apply(2, &mut controls), 1);
        assert!(!controls.movement().any());
        assert!(script.is_finished());
    }

    #[test]
    fn pad_commands_use_offsets_from_the_pad_center() {
        let mut script =
            ScriptedInput::parse("0 press movement 0 -35\n1 release movement\n").unwrap();
        let mut controls = controls();
        script.apply(0, &mut controls);
        assert!(controls.movement_pad().is_pressed());
        assert!(controls.movement().get(Direction::Forward));
        script.apply(1, &mut controls);
        assert!(!controls.movement().any());
    }

    #[test]
    fn look_rotates_like_a_right_drag() {
        let mut script = ScriptedInput::parse("0 look 10 0").unwrap();
        let mut controls = controls();
        script.apply(0, &mut controls);
        assert!((controls.rotation().1 - 0.02).abs() < 1e-6);
        assert!(!controls.is_mouse_look());
    }

    #[test]
    fn final_state_lists_position_and_motion() {
        let controls = controls();
        controls.set_position(Vec3::new(1.0, 2.0, 3.0));
        let lines = final_state_lines(&controls);
        assert_eq!(lines[0], " - position=(1.00, 2.00, 3.00)");
        assert_eq!(lines[3], " - motion=Idle");
    }
}
