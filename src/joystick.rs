//! On-screen virtual joysticks.
//!
//! A pad is a circular region with a draggable handle. While it is held it
//! reports the handle offset as a normalized `(dx, dy)` pair in `[-2, 2]`,
//! re-sending the last value on a fixed cadence so subscribers can treat it
//! as a continuous analog signal. Positive `dx` points right and positive `dy`
//! points up (forward) for both pads.

use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use glam::Vec2;
use log::debug;

use crate::clock::{Clock, RepeatTimer};
use crate::error::{ControlsError, Result};
use crate::events::{EventBus, SubscriptionId};

pub const DEFAULT_REGION_DIAMETER: f32 = 120.0;
pub const DEFAULT_HANDLE_DIAMETER: f32 = 50.0;

/// Magnitude of a fully deflected pad on either axis.
pub const MAX_DEFLECTION: f32 = 2.0;

/// Which of the two on-screen pads a widget is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadKind {
    Rotation,
    Movement,
}

impl PadKind {
    pub fn name(self) -> &'static str {
        match self {
            PadKind::Rotation => "rotation",
            PadKind::Movement => "movement",
        }
    }
}

/// Event published by a pad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PadEvent {
    Drag { dx: f32, dy: f32 },
    /// Published by the movement pad when it is released.
    Stopped,
}

/// Page-space geometry of a pad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PadLayout {
    pub center: Vec2,
    pub region_diameter: f32,
    pub handle_diameter: f32,
}

impl PadLayout {
    pub fn new(center: Vec2, region_diameter: f32, handle_diameter: f32) -> Self {
        Self {
            center,
            region_diameter,
            handle_diameter,
        }
    }

    /// How far the handle center may travel from the region center.
    pub fn travel_radius(&self) -> f32 {
        self.region_diameter / 2.0 - self.handle_diameter / 2.0
    }

    pub fn contains(&self, point: Vec2) -> bool {
        let radius = self.region_diameter / 2.0;
        point.distance_squared(self.center) <= radius * radius
    }

    /// Maps a pointer position to the clamped handle offset and its normalized delta.
    pub fn resolve(&self, point: Vec2) -> (Vec2, Vec2) {
        let radius = self.travel_radius();
        let mut offset = point - self.center;
        if offset.length_squared() > radius * radius {
            let angle = offset.y.atan2(offset.x);
            offset = Vec2::new(angle.cos(), angle.sin()) * radius;
        }
        let handle = ((self.center + offset) * 10.0).round() / 10.0;
        let offset = handle - self.center;
        let delta = Vec2::new(
            normalize_axis(offset.x, radius),
            // Page y grows downwards; pads report up as positive.
            normalize_axis(-offset.y, radius),
        );
        (offset, delta)
    }

    fn validate(&self, pad: PadKind) -> Result<()> {
        let finite = self.center.is_finite()
            && self.region_diameter.is_finite()
            && self.handle_diameter.is_finite();
        if !finite {
            return Err(invalid_layout(pad, "geometry must be finite"));
        }
        if self.handle_diameter < 0.0 {
            return Err(invalid_layout(pad, "handle diameter must not be negative"));
        }
        if self.travel_radius() <= 0.0 {
            return Err(invalid_layout(
                pad,
                "handle must be smaller than the region it moves in",
            ));
        }
        Ok(())
    }
}

/// Host container geometry in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            width,
            height,
        }
    }
}

/// Layouts for both pads of a controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PadLayouts {
    pub rotation: PadLayout,
    pub movement: PadLayout,
}

impl PadLayouts {
    /// Movement pad in the bottom-left corner, rotation pad in the bottom-right.
    pub fn for_viewport(viewport: Viewport) -> Self {
        Self::for_viewport_with(viewport, DEFAULT_REGION_DIAMETER, DEFAULT_HANDLE_DIAMETER)
    }

    pub fn for_viewport_with(viewport: Viewport, region_diameter: f32, handle_diameter: f32) -> Self {
        let radius = region_diameter / 2.0;
        let center_y = viewport.top + viewport.height - 10.0 - radius;
        Self {
            movement: PadLayout::new(
                Vec2::new(viewport.left + 20.0 + radius, center_y),
                region_diameter,
                handle_diameter,
            ),
            rotation: PadLayout::new(
                Vec2::new(viewport.left + viewport.width - 20.0 - radius, center_y),
                region_diameter,
                handle_diameter,
            ),
        }
    }
}

/// Timing of event repetition and of the release animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JoystickTiming {
    pub repeat_interval: Duration,
    pub return_duration: Duration,
    pub idle_opacity: f32,
}

impl Default for JoystickTiming {
    fn default() -> Self {
        Self {
            repeat_interval: Duration::from_millis(5),
            return_duration: Duration::from_millis(200),
            idle_opacity: 0.1,
        }
    }
}

/// Visual state of the handle: offset from the region center and opacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandleState {
    pub offset: Vec2,
    pub opacity: f32,
}

#[derive(Debug, Clone, Copy)]
struct ReturnAnimation {
    from: HandleState,
    started: Duration,
}

/// A single virtual joystick.
pub struct Joystick {
    kind: PadKind,
    layout: PadLayout,
    timing: JoystickTiming,
    clock: Arc<dyn Clock>,
    pressed: bool,
    delta: Vec2,
    handle: HandleState,
    repeat: RepeatTimer,
    returning: Option<ReturnAnimation>,
    events: EventBus<PadEvent>,
}

impl Joystick {
    pub fn new(
        kind: PadKind,
        layout: PadLayout,
        timing: JoystickTiming,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        layout.validate(kind)?;
        if timing.repeat_interval.is_zero() {
            return Err(invalid_layout(kind, "repeat interval must be non-zero"));
        }
        debug!(
            "{} pad at ({:.1}, {:.1}) with travel radius {:.1}",
            kind.name(),
            layout.center.x,
            layout.center.y,
            layout.travel_radius()
        );
        Ok(Self {
            kind,
            layout,
            timing,
            clock,
            pressed: false,
            delta: Vec2::ZERO,
            handle: HandleState {
                offset: Vec2::ZERO,
                opacity: timing.idle_opacity,
            },
            repeat: RepeatTimer::new(timing.repeat_interval),
            returning: None,
            events: EventBus::new(),
        })
    }

    pub fn kind(&self) -> PadKind {
        self.kind
    }

    pub fn layout(&self) -> &PadLayout {
        &self.layout
    }

    /// Moves the pad, for example after the host surface was resized. A held
    /// pad is released first.
    pub fn set_layout(&mut self, layout: PadLayout) -> Result<()> {
        layout.validate(self.kind)?;
        self.release();
        self.layout = layout;
        Ok(())
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Last normalized delta computed from a pointer position.
    pub fn delta(&self) -> Vec2 {
        self.delta
    }

    pub fn handle(&self) -> HandleState {
        self.handle
    }

    /// Handle center in page coordinates.
    pub fn handle_position(&self) -> Vec2 {
        self.layout.center + self.handle.offset
    }

    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionId
    where
        F: FnMut(&PadEvent) + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Starts a drag. Presses outside the region are ignored and return `false`.
    pub fn press(&mut self, point: Vec2) -> bool {
        if !self.layout.contains(point) {
            return false;
        }
        self.pressed = true;
        self.returning = None;
        self.handle.opacity = 1.0;
        self.track(point);
        true
    }

    /// Follows the pointer anywhere on the page while pressed.
    pub fn drag(&mut self, point: Vec2) {
        if self.pressed {
            self.track(point);
        }
    }

    pub fn release(&mut self) {
        if !self.pressed {
            return;
        }
        self.pressed = false;
        self.repeat.cancel();
        self.returning = Some(ReturnAnimation {
            from: self.handle,
            started: self.clock.now(),
        });
        if self.kind == PadKind::Movement {
            self.events.publish(&PadEvent::Stopped);
        }
    }

    /// Delivers due repeat events and advances the release animation.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        if self.pressed {
            let event = self.drag_event();
            for _ in 0..self.repeat.fire(now) {
                self.events.publish(&event);
            }
        }
        self.advance_return(now);
    }

    fn track(&mut self, point: Vec2) {
        let (offset, delta) = self.layout.resolve(point);
        self.handle.offset = offset;
        self.delta = delta;
        self.repeat.schedule(self.clock.now());
        let event = self.drag_event();
        self.events.publish(&event);
    }

    fn drag_event(&self) -> PadEvent {
        PadEvent::Drag {
            dx: self.delta.x,
            dy: self.delta.y,
        }
    }

    fn advance_return(&mut self, now: Duration) {
        let Some(animation) = self.returning else {
            return;
        };
        let elapsed = now.saturating_sub(animation.started);
        let duration = self.timing.return_duration;
        if elapsed >= duration {
            self.handle = HandleState {
                offset: Vec2::ZERO,
                opacity: self.timing.idle_opacity,
            };
            self.returning = None;
            return;
        }
        let progress = swing(elapsed.as_secs_f32() / duration.as_secs_f32());
        let from = animation.from;
        self.handle = HandleState {
            offset: from.offset * (1.0 - progress),
            opacity: from.opacity + (self.timing.idle_opacity - from.opacity) * progress,
        };
    }
}

impl fmt::Debug for Joystick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Joystick")
            .field("kind", &self.kind)
            .field("layout", &self.layout)
            .field("pressed", &self.pressed)
            .field("delta", &self.delta)
            .field("handle", &self.handle)
            .finish()
    }
}

fn swing(progress: f32) -> f32 {
    0.5 - (progress * PI).cos() / 2.0
}

fn round_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

fn normalize_axis(offset: f32, radius: f32) -> f32 {
    let scaled = -MAX_DEFLECTION + (2.0 * MAX_DEFLECTION) * (offset + radius) / (2.0 * radius);
    round_tenth(scaled).clamp(-MAX_DEFLECTION, MAX_DEFLECTION)
}

fn invalid_layout(pad: PadKind, reason: &str) -> ControlsError {
    ControlsError::InvalidLayout {
        pad: pad.name(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::clock::ManualClock;

    const MS: Duration = Duration::from_millis(1);

    fn layout() -> PadLayout {
        // Travel radius of 40 px around (200, 200).
        PadLayout::new(Vec2::new(200.0, 200.0), 100.0, 20.0)
    }

    fn pad(kind: PadKind) -> (Joystick, Arc<ManualClock>, Rc<RefCell<Vec<PadEvent>>>) {
        let clock = Arc::new(ManualClock::new());
        let mut pad = Joystick::new(kind, layout(), JoystickTiming::default(), clock.clone()).unwrap();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        pad.subscribe(move |event| sink.borrow_mut().push(*event));
        (pad, clock, events)
    }

    #[test]
    fn press_outside_region_is_ignored() {
        let (mut pad, _, events) = pad(PadKind::Rotation);
        assert!(!pad.press(Vec2::new(400.0, 200.0)));
        assert!(!pad.is_pressed());
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn offsets_map_linearly_to_two_units() {
        let (mut pad, _, events) = pad(PadKind::Movement);
        assert!(pad.press(Vec2::new(220.0, 200.0)));
        assert_eq!(pad.delta(), Vec2::new(1.0, 0.0));
        pad.drag(Vec2::new(200.0, 160.0));
        assert_eq!(pad.delta(), Vec2::new(0.0, 2.0));
        pad.drag(Vec2::new(190.0, 210.0));
        assert_eq!(pad.delta(), Vec2::new(-0.5, -0.5));
        assert_eq!(events.borrow().len(), 3);
        assert_eq!(pad.handle().opacity, 1.0);
    }

    #[test]
    fn far_pointer_is_projected_onto_the_boundary() {
        let (mut pad, _, _) = pad(PadKind::Rotation);
        pad.press(Vec2::new(200.0, 200.0));
        pad.drag(Vec2::new(1000.0, 1000.0));
        let handle = pad.handle();
        assert!((handle.offset.length() - 40.0).abs() < 0.1);
        assert_eq!(pad.delta(), Vec2::new(1.4, -1.4));
        pad.drag(Vec2::new(-5000.0, 200.0));
        assert_eq!(pad.delta(), Vec2::new(-2.0, 0.0));
    }

    #[test]
    fn deltas_never_exceed_full_deflection() {
        let (mut pad, _, _) = pad(PadKind::Rotation);
        pad.press(Vec2::new(200.0, 200.0));
        for step in 0..360 {
            let angle = (step as f32).to_radians();
            for distance in [10.0, 39.96, 40.04, 55.0, 900.0] {
                pad.drag(Vec2::new(200.0, 200.0) + Vec2::new(angle.cos(), angle.sin()) * distance);
                let delta = pad.delta();
                assert!(delta.x.abs() <= MAX_DEFLECTION && delta.y.abs() <= MAX_DEFLECTION);
            }
        }
    }

    #[test]
    fn held_pad_repeats_last_delta() {
        let (mut pad, clock, events) = pad(PadKind::Rotation);
        pad.press(Vec2::new(220.0, 200.0));
        clock.advance(MS * 4);
        pad.tick();
        assert_eq!(events.borrow().len(), 1);
        clock.advance(MS);
        pad.tick();
        clock.advance(MS * 5);
        pad.tick();
        let events = events.borrow();
        assert_eq!(events.len(), 3);
        assert!(events
            .iter()
            .all(|event| *event == PadEvent::Drag { dx: 1.0, dy: 0.0 }));
    }

    #[test]
    fn release_stops_emission_and_signals_movement_stop() {
        let (mut pad, clock, events) = pad(PadKind::Movement);
        pad.press(Vec2::new(200.0, 180.0));
        pad.release();
        clock.advance(MS * 50);
        pad.tick();
        assert_eq!(
            *events.borrow(),
            vec![PadEvent::Drag { dx: 0.0, dy: 1.0 }, PadEvent::Stopped]
        );
        assert!(!pad.is_pressed());
    }

    #[test]
    fn rotation_pad_release_is_silent() {
        let (mut pad, _, events) = pad(PadKind::Rotation);
        pad.press(Vec2::new(200.0, 180.0));
        pad.release();
        pad.release();
        assert_eq!(events.borrow().len(), 1);
    }

    #[test]
    fn handle_eases_back_to_center_after_release() {
        let (mut pad, clock, _) = pad(PadKind::Rotation);
        pad.press(Vec2::new(240.0, 200.0));
        pad.release();
        clock.advance(MS * 100);
        pad.tick();
        let midway = pad.handle();
        assert!(midway.offset.x > 0.0 && midway.offset.x < 40.0);
        assert!(midway.opacity < 1.0 && midway.opacity > 0.1);
        clock.advance(MS * 100);
        pad.tick();
        assert_eq!(
            pad.handle(),
            HandleState {
                offset: Vec2::ZERO,
                opacity: 0.1
            }
        );
    }

    #[test]
    fn handle_larger_than_region_is_rejected() {
        let clock = Arc::new(ManualClock::new());
        let layout = PadLayout::new(Vec2::ZERO, 40.0, 60.0);
        let err = Joystick::new(PadKind::Movement, layout, JoystickTiming::default(), clock)
            .unwrap_err();
        assert!(matches!(err, ControlsError::InvalidLayout { pad: "movement", .. }));
    }

    #[test]
    fn relayout_releases_and_moves_the_region() {
        let (mut pad, _, events) = pad(PadKind::Movement);
        pad.press(Vec2::new(200.0, 180.0));
        pad.set_layout(PadLayout::new(Vec2::new(500.0, 500.0), 100.0, 20.0))
            .unwrap();
        assert!(!pad.is_pressed());
        assert_eq!(events.borrow().last(), Some(&PadEvent::Stopped));
        assert!(!pad.press(Vec2::new(200.0, 200.0)));
        assert!(pad.press(Vec2::new(500.0, 500.0)));
        assert!(pad
            .set_layout(PadLayout::new(Vec2::ZERO, 10.0, 20.0))
            .is_err());
    }

    #[test]
    fn viewport_layout_places_pads_in_bottom_corners() {
        let layouts = PadLayouts::for_viewport_with(Viewport::new(800.0, 600.0), 100.0, 40.0);
        assert_eq!(layouts.movement.center, Vec2::new(70.0, 540.0));
        assert_eq!(layouts.rotation.center, Vec2::new(730.0, 540.0));
    }
}
