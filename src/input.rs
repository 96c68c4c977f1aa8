use std::collections::HashSet;
use std::f32::consts::{FRAC_PI_2, PI};
use std::time::Duration;

use glam::Vec2;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::clock::Debounce;

/// How long the pointer counts as moving after its last motion event.
pub const POINTER_IDLE_AFTER: Duration = Duration::from_millis(200);

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
}

impl KeyCode {
    /// Parses DOM `KeyboardEvent.key` values as well as short names such as `Up`.
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        let (Some(ch), None) = (chars.next(), chars.next()) else {
            return None;
        };
        if ch.is_ascii_alphabetic() {
            return Some(Self::Character(ch.to_ascii_uppercase()));
        }
        if ch.is_ascii_digit() {
            return Some(Self::Digit(ch as u8 - b'0'));
        }
        None
    }

    /// Maps legacy DOM `keyCode` numbers.
    pub fn from_legacy_code(code: u32) -> Option<Self> {
        use NamedKey::*;
        let key = match code {
            37 => Self::Named(Left),
            38 => Self::Named(Up),
            39 => Self::Named(Right),
            40 => Self::Named(Down),
            32 => Self::Named(Space),
            27 => Self::Named(Escape),
            48..=57 => Self::Digit((code - 48) as u8),
            65..=90 => Self::Character(char::from(code as u8)),
            _ => return None,
        };
        Some(key)
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" | " " => Space,
        "Enter" | "Return" => Enter,
        "Left" | "ArrowLeft" => Left,
        "Right" | "ArrowRight" => Right,
        "Up" | "ArrowUp" => Up,
        "Down" | "ArrowDown" => Down,
        "Escape" | "Esc" => Escape,
        "Shift" => Shift,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

/// Friendly names for the non-character keys the controls care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Left,
    Right,
    Up,
    Down,
    Escape,
    Shift,
}

/// Identifier for a mouse button, numbered like DOM `MouseEvent.button`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);
    pub const MIDDLE: Self = Self(1);
    /// Holding this button turns pointer motion into look rotation.
    pub const RIGHT: Self = Self(2);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

/// One of the four horizontal movement directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Forward,
        Direction::Backward,
        Direction::Left,
        Direction::Right,
    ];

    pub fn index(self) -> usize {
        match self {
            Direction::Forward => 0,
            Direction::Backward => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }

    /// Rotation about the vertical axis that turns the facing vector into this direction.
    pub fn yaw_offset(self) -> f32 {
        match self {
            Direction::Forward => 0.0,
            Direction::Backward => PI,
            Direction::Left => FRAC_PI_2,
            Direction::Right => -FRAC_PI_2,
        }
    }

    /// WASD and the arrow keys.
    pub fn from_key(key: KeyCode) -> Option<Self> {
        match key {
            KeyCode::Character('W') | KeyCode::Named(NamedKey::Up) => Some(Direction::Forward),
            KeyCode::Character('S') | KeyCode::Named(NamedKey::Down) => Some(Direction::Backward),
            KeyCode::Character('A') | KeyCode::Named(NamedKey::Left) => Some(Direction::Left),
            KeyCode::Character('D') | KeyCode::Named(NamedKey::Right) => Some(Direction::Right),
            _ => None,
        }
    }
}

/// One boolean per [`Direction`]. Used for both movement flags and locks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionFlags([bool; 4]);

impl DirectionFlags {
    pub fn get(&self, direction: Direction) -> bool {
        self.0[direction.index()]
    }

    pub fn set(&mut self, direction: Direction, value: bool) {
        self.0[direction.index()] = value;
    }

    pub fn any(&self) -> bool {
        self.0.iter().any(|flag| *flag)
    }

    pub fn clear(&mut self) {
        self.0 = [false; 4];
    }

    pub fn active(&self) -> impl Iterator<Item = Direction> + '_ {
        Direction::ALL
            .into_iter()
            .filter(move |direction| self.get(*direction))
    }
}

/// Input snapshot shared between event handlers and the per-frame update.
///
/// Keyboard and movement-pad events write the same four movement flags; the
/// last writer wins.
#[derive(Debug)]
pub struct InputState {
    keys: RwLock<HashSet<KeyCode>>,
    mouse_buttons: RwLock<HashSet<MouseButton>>,
    movement: RwLock<DirectionFlags>,
    magnitude: RwLock<Vec2>,
    pointer_ndc: RwLock<Vec2>,
    pointer_over: RwLock<bool>,
    pointer_activity: Mutex<Debounce>,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            keys: RwLock::new(HashSet::new()),
            mouse_buttons: RwLock::new(HashSet::new()),
            movement: RwLock::new(DirectionFlags::default()),
            magnitude: RwLock::new(Vec2::ONE),
            pointer_ndc: RwLock::new(Vec2::ZERO),
            pointer_over: RwLock::new(false),
            pointer_activity: Mutex::new(Debounce::new(POINTER_IDLE_AFTER)),
        }
    }
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` for auto-repeated presses of a key that is already
    /// down. Repeats still re-assert the key's direction, which a pad release
    /// may have cleared.
    pub fn set_key_down(&self, key: KeyCode) -> bool {
        let first = self.keys.write().insert(key);
        if let Some(direction) = Direction::from_key(key) {
            self.movement.write().set(direction, true);
        }
        first
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.keys.write().remove(&key);
        if let Some(direction) = Direction::from_key(key) {
            self.movement.write().set(direction, false);
        }
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.read().contains(&key)
    }

    pub fn set_mouse_button_down(&self, button: MouseButton) {
        self.mouse_buttons.write().insert(button);
    }

    pub fn set_mouse_button_up(&self, button: MouseButton) {
        self.mouse_buttons.write().remove(&button);
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons.read().contains(&button)
    }

    /// Applies a movement-pad delta: the sign picks the direction on each
    /// axis and the magnitude becomes the speed multiplier for that axis.
    pub fn apply_movement_pad(&self, delta: Vec2) {
        let mut movement = self.movement.write();
        let mut magnitude = self.magnitude.write();

        if delta.y == 0.0 {
            magnitude.y = 1.0;
            movement.set(Direction::Forward, false);
            movement.set(Direction::Backward, false);
        } else {
            magnitude.y = delta.y.abs();
            movement.set(Direction::Forward, delta.y > 0.0);
            movement.set(Direction::Backward, delta.y < 0.0);
        }

        if delta.x == 0.0 {
            magnitude.x = 1.0;
            movement.set(Direction::Left, false);
            movement.set(Direction::Right, false);
        } else {
            magnitude.x = delta.x.abs();
            movement.set(Direction::Right, delta.x > 0.0);
            movement.set(Direction::Left, delta.x < 0.0);
        }
    }

    pub fn stop_movement_pad(&self) {
        self.movement.write().clear();
        *self.magnitude.write() = Vec2::ONE;
    }

    pub fn movement(&self) -> DirectionFlags {
        *self.movement.read()
    }

    /// Speed multipliers: `x` for left/right, `y` for forward/backward.
    pub fn magnitude(&self) -> Vec2 {
        *self.magnitude.read()
    }

    /// Records a pointer position in client pixels and converts it to
    /// normalized device coordinates (`y` up).
    pub fn set_pointer_position(&self, client: Vec2, viewport: Vec2, now: Duration) -> Vec2 {
        let size = viewport.max(Vec2::ONE);
        let ndc = Vec2::new(client.x / size.x * 2.0 - 1.0, -(client.y / size.y) * 2.0 + 1.0);
        *self.pointer_ndc.write() = ndc;
        *self.pointer_over.write() = true;
        self.pointer_activity.lock().touch(now);
        ndc
    }

    pub fn pointer_ndc(&self) -> Vec2 {
        *self.pointer_ndc.read()
    }

    pub fn is_pointer_moving(&self, now: Duration) -> bool {
        self.pointer_activity.lock().is_active(now)
    }

    pub fn set_pointer_over(&self, over: bool) {
        *self.pointer_over.write() = over;
    }

    pub fn is_pointer_over(&self) -> bool {
        *self.pointer_over.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_character_keys() {
        assert_eq!(
            KeyCode::from_name("ArrowUp"),
            Some(KeyCode::Named(NamedKey::Up))
        );
        assert_eq!(KeyCode::from_name("w"), Some(KeyCode::Character('W')));
        assert_eq!(KeyCode::from_name("7"), Some(KeyCode::Digit(7)));
        assert_eq!(KeyCode::from_name("Tab"), None);
        assert_eq!(KeyCode::from_legacy_code(87), Some(KeyCode::Character('W')));
        assert_eq!(
            KeyCode::from_legacy_code(40),
            Some(KeyCode::Named(NamedKey::Down))
        );
    }

    #[test]
    fn wasd_and_arrows_map_to_directions() {
        assert_eq!(
            Direction::from_key(KeyCode::Character('A')),
            Some(Direction::Left)
        );
        assert_eq!(
            Direction::from_key(KeyCode::Named(NamedKey::Right)),
            Some(Direction::Right)
        );
        assert_eq!(Direction::from_key(KeyCode::Character('Q')), None);
    }

    #[test]
    fn input_state_tracks_keys() {
        let state = InputState::new();
        assert!(state.set_key_down(KeyCode::Character('W')));
        assert!(!state.set_key_down(KeyCode::Character('W')));
        assert!(state.movement().get(Direction::Forward));
        state.set_key_up(KeyCode::Character('W'));
        assert!(!state.movement().get(Direction::Forward));
        assert!(!state.is_key_down(KeyCode::Character('W')));
    }

    #[test]
    fn movement_pad_sets_exclusive_flags_and_magnitudes() {
        let state = InputState::new();
        state.apply_movement_pad(Vec2::new(-0.5, 1.5));
        let movement = state.movement();
        assert!(movement.get(Direction::Forward));
        assert!(!movement.get(Direction::Backward));
        assert!(movement.get(Direction::Left));
        assert!(!movement.get(Direction::Right));
        assert_eq!(state.magnitude(), Vec2::new(0.5, 1.5));

        state.apply_movement_pad(Vec2::new(0.0, -2.0));
        let movement = state.movement();
        assert!(movement.get(Direction::Backward));
        assert!(!movement.get(Direction::Forward));
        assert!(!movement.get(Direction::Left));
        assert_eq!(state.magnitude(), Vec2::new(1.0, 2.0));
    }

    #[test]
    fn repeated_key_down_restores_a_cleared_direction() {
        let state = InputState::new();
        assert!(state.set_key_down(KeyCode::Character('W')));
        state.stop_movement_pad();
        assert!(!state.movement().get(Direction::Forward));
        assert!(!state.set_key_down(KeyCode::Character('W')));
        assert!(state.movement().get(Direction::Forward));
    }

    #[test]
    fn stopping_the_pad_clears_everything() {
        let state = InputState::new();
        state.apply_movement_pad(Vec2::new(2.0, 2.0));
        state.stop_movement_pad();
        assert!(!state.movement().any());
        assert_eq!(state.magnitude(), Vec2::ONE);
    }

    #[test]
    fn pointer_position_is_converted_to_ndc() {
        let state = InputState::new();
        let ndc = state.set_pointer_position(
            Vec2::new(200.0, 150.0),
            Vec2::new(800.0, 600.0),
            Duration::ZERO,
        );
        assert_eq!(ndc, Vec2::new(-0.5, 0.5));
        assert_eq!(state.pointer_ndc(), ndc);
        assert!(state.is_pointer_over());
        assert!(state.is_pointer_moving(Duration::from_millis(199)));
        assert!(!state.is_pointer_moving(Duration::from_millis(200)));
    }

    #[test]
    fn active_directions_iterate_in_order() {
        let mut flags = DirectionFlags::default();
        flags.set(Direction::Right, true);
        flags.set(Direction::Forward, true);
        let active: Vec<_> = flags.active().collect();
        assert_eq!(active, vec![Direction::Forward, Direction::Right]);
    }
}
