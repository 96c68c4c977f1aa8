#![cfg(target_arch = "wasm32")]

//! Browser bindings: DOM listeners feeding [`TouchControls`], a host-supplied
//! ray query standing in for the scene graph, and a stoppable
//! `requestAnimationFrame` loop.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use glam::{Vec2, Vec3};
use js_sys::{Array, Function, Object, Reflect};
use log::{debug, error, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{window, Element, Event, EventTarget, KeyboardEvent, MouseEvent, TouchEvent};

use crate::clock::Clock;
use crate::config::ControlsConfig;
use crate::controls::TouchControls;
use crate::frame_loop::StopHandle;
use crate::input::{Direction, KeyCode, MouseButton};
use crate::joystick::{Joystick, PadLayouts, Viewport};
use crate::rig::{Body, Camera};
use crate::scene::{Intersection, SceneGraph};

#[wasm_bindgen(start)]
pub fn init_logging() {
    console_error_panic_hook::set_once();
    // No logger is installed when this fails, so report straight to the console.
    if let Err(err) = console_log::init_with_level(log::Level::Info) {
        web_sys::console::warn_1(&JsValue::from_str(&format!("logging unavailable: {err}")));
    }
}

/// Milliseconds from `performance.now()`, falling back to `Date.now()`.
#[derive(Debug, Clone, Copy)]
struct BrowserClock {
    origin: f64,
}

impl BrowserClock {
    fn new() -> Self {
        Self {
            origin: Self::millis(),
        }
    }

    fn millis() -> f64 {
        window()
            .and_then(|window| window.performance())
            .map(|performance| performance.now())
            .unwrap_or_else(js_sys::Date::now)
    }
}

impl Clock for BrowserClock {
    fn now(&self) -> Duration {
        Duration::from_secs_f64((Self::millis() - self.origin).max(0.0) / 1000.0)
    }
}

/// Scene graph backed by JavaScript callbacks.
///
/// `ray_query(ox, oy, oz, dx, dy, dz)` returns an array of
/// `{ distance, object, point? }`; `on_add(name)` is told about attached nodes.
struct JsScene {
    ray_query: Function,
    on_add: Option<Function>,
}

impl SceneGraph for JsScene {
    fn add_node(&self, body: Body) {
        if let Some(on_add) = &self.on_add {
            if let Err(err) = on_add.call1(&JsValue::NULL, &JsValue::from_str(body.name())) {
                warn!("scene add callback failed: {err:?}");
            }
        }
    }

    fn intersect_ray(&self, origin: Vec3, direction: Vec3) -> Vec<Intersection> {
        let args = Array::new();
        for value in origin.to_array().into_iter().chain(direction.to_array()) {
            args.push(&JsValue::from_f64(f64::from(value)));
        }
        let result = match self.ray_query.apply(&JsValue::NULL, &args) {
            Ok(result) => result,
            Err(err) => {
                warn!("ray query failed: {err:?}");
                return Vec::new();
            }
        };
        let Some(entries) = result.dyn_ref::<Array>() else {
            warn!("ray query must return an array");
            return Vec::new();
        };

        let mut hits: Vec<Intersection> = entries
            .iter()
            .filter_map(|entry| parse_intersection(&entry, origin, direction))
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }
}

fn parse_intersection(entry: &JsValue, origin: Vec3, direction: Vec3) -> Option<Intersection> {
    let distance = Reflect::get(entry, &"distance".into()).ok()?.as_f64()? as f32;
    let object = Reflect::get(entry, &"object".into())
        .ok()
        .and_then(|value| value.as_string())
        .unwrap_or_default();
    let point = Reflect::get(entry, &"point".into())
        .ok()
        .and_then(|value| value.dyn_into::<Array>().ok())
        .and_then(|array| {
            let component = |index| array.get(index).as_f64().map(|value| value as f32);
            Some(Vec3::new(component(0)?, component(1)?, component(2)?))
        })
        .unwrap_or_else(|| origin + direction.normalize_or_zero() * distance);
    Some(Intersection {
        distance,
        point,
        object,
    })
}

/// A DOM listener removed again when dropped.
struct DomListener {
    target: EventTarget,
    kind: &'static str,
    closure: Closure<dyn FnMut(Event)>,
}

impl DomListener {
    fn attach<F>(target: &EventTarget, kind: &'static str, handler: F) -> Result<Self, JsValue>
    where
        F: FnMut(Event) + 'static,
    {
        let closure = Closure::wrap(Box::new(handler) as Box<dyn FnMut(Event)>);
        target.add_event_listener_with_callback(kind, closure.as_ref().unchecked_ref())?;
        Ok(Self {
            target: target.clone(),
            kind,
            closure,
        })
    }
}

impl Drop for DomListener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.kind, self.closure.as_ref().unchecked_ref());
    }
}

impl fmt::Debug for DomListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomListener").field("kind", &self.kind).finish()
    }
}

type FrameCallback = Rc<RefCell<Option<Closure<dyn FnMut()>>>>;

struct AnimationLoop {
    callback: FrameCallback,
    request: Rc<Cell<Option<i32>>>,
    stop: StopHandle,
}

/// Navigation controls bound to a container element.
#[wasm_bindgen]
pub struct WasmControls {
    controls: Rc<RefCell<TouchControls>>,
    container: Element,
    animation: Option<AnimationLoop>,
    _listeners: Vec<DomListener>,
}

#[wasm_bindgen]
impl WasmControls {
    /// `options` is a plain object such as `{ speedFactor: 0.55, hitTest: false }`.
    #[wasm_bindgen(constructor)]
    pub fn new(container_id: &str, options: JsValue) -> Result<WasmControls, JsValue> {
        let config = if options.is_undefined() || options.is_null() {
            ControlsConfig::default()
        } else {
            let json = js_sys::JSON::stringify(&options)?
                .as_string()
                .ok_or_else(|| JsValue::from_str("options are not serializable"))?;
            ControlsConfig::from_json(&json).map_err(js_error)?
        };

        let document = window()
            .and_then(|window| window.document())
            .ok_or_else(|| JsValue::from_str("document not available"))?;
        let container = document
            .get_element_by_id(container_id)
            .ok_or_else(|| JsValue::from_str("container element not found"))?;

        let layouts = PadLayouts::for_viewport(page_viewport(&container));
        let controls = TouchControls::new(
            Camera::default(),
            config,
            layouts,
            std::sync::Arc::new(BrowserClock::new()),
        )
        .map_err(js_error)?;
        let controls = Rc::new(RefCell::new(controls));
        let listeners = attach_listeners(&document, &container, &controls)?;
        debug!("controls bound to #{container_id}");

        Ok(Self {
            controls,
            container,
            animation: None,
            _listeners: listeners,
        })
    }

    /// Uses `ray_query(ox, oy, oz, dx, dy, dz)` for hit-testing. It returns an
    /// array of `{ distance, object, point? }`.
    #[wasm_bindgen(js_name = addToScene)]
    pub fn add_to_scene(&self, ray_query: Function, on_add: Option<Function>) {
        let scene = Rc::new(JsScene { ray_query, on_add });
        self.controls.borrow_mut().add_to_scene(scene);
    }

    #[wasm_bindgen(js_name = setPosition)]
    pub fn set_position(&self, x: f32, y: f32, z: f32) {
        self.controls.borrow().set_position(Vec3::new(x, y, z));
    }

    #[wasm_bindgen(js_name = setRotation)]
    pub fn set_rotation(&self, pitch: Option<f32>, yaw: Option<f32>) {
        self.controls.borrow().set_rotation(pitch, yaw);
    }

    #[wasm_bindgen(js_name = setEnabled)]
    pub fn set_enabled(&self, enabled: bool) {
        self.controls.borrow_mut().set_enabled(enabled);
    }

    /// Runs a single frame; for hosts driving their own loop.
    pub fn update(&self) -> Result<(), JsValue> {
        self.controls.borrow_mut().tick().map_err(js_error)
    }

    /// Starts the `requestAnimationFrame` loop. Does nothing when already running.
    pub fn start(&mut self) -> Result<(), JsValue> {
        if self.animation.is_some() {
            return Ok(());
        }
        let stop = StopHandle::new();
        let request = Rc::new(Cell::new(None));
        let callback: FrameCallback = Rc::new(RefCell::new(None));

        let controls = Rc::clone(&self.controls);
        let frame_stop = stop.clone();
        let frame_request = Rc::clone(&request);
        let next_frame = Rc::clone(&callback);
        *callback.borrow_mut() = Some(Closure::wrap(Box::new(move || {
            if frame_stop.is_stopped() {
                next_frame.borrow_mut().take();
                return;
            }
            if let Err(err) = controls.borrow_mut().tick() {
                error!("frame update failed: {err}");
            }
            match next_frame.borrow().as_ref().map(request_frame) {
                Some(Ok(id)) => frame_request.set(Some(id)),
                Some(Err(err)) => error!("requestAnimationFrame failed: {err:?}"),
                None => {}
            }
        }) as Box<dyn FnMut()>));

        let id = match callback.borrow().as_ref() {
            Some(closure) => request_frame(closure)?,
            None => return Ok(()),
        };
        request.set(Some(id));
        self.animation = Some(AnimationLoop {
            callback,
            request,
            stop,
        });
        debug!("animation loop started");
        Ok(())
    }

    /// Cancels the pending frame and releases the loop.
    pub fn stop(&mut self) {
        let Some(animation) = self.animation.take() else {
            return;
        };
        animation.stop.stop();
        if let (Some(window), Some(id)) = (window(), animation.request.take()) {
            let _ = window.cancel_animation_frame(id);
        }
        animation.callback.borrow_mut().take();
        debug!("animation loop stopped");
    }

    /// Recomputes both pad layouts after the container moved or resized.
    pub fn resize(&mut self) -> Result<(), JsValue> {
        let layouts = PadLayouts::for_viewport(page_viewport(&self.container));
        self.controls
            .borrow_mut()
            .set_pad_layouts(layouts)
            .map_err(js_error)
    }

    pub fn position(&self) -> Vec<f32> {
        self.controls.borrow().position().to_array().to_vec()
    }

    /// `[pitch, yaw]` in radians.
    pub fn rotation(&self) -> Vec<f32> {
        let (pitch, yaw) = self.controls.borrow().rotation();
        vec![pitch, yaw]
    }

    pub fn velocity(&self) -> Vec<f32> {
        self.controls.borrow().velocity().to_array().to_vec()
    }

    /// `{ forward, backward, left, right }`.
    pub fn movement(&self) -> Result<JsValue, JsValue> {
        let movement = self.controls.borrow().movement();
        let object = Object::new();
        for direction in Direction::ALL {
            Reflect::set(
                &object,
                &direction.name().into(),
                &JsValue::from_bool(movement.get(direction)),
            )?;
        }
        Ok(object.into())
    }

    /// Hits from the last frame as `{ direction, object, distance, point }`.
    #[wasm_bindgen(js_name = hitObjects)]
    pub fn hit_objects(&self) -> Result<Array, JsValue> {
        let array = Array::new();
        for hit in self.controls.borrow().hit_objects() {
            let object = Object::new();
            Reflect::set(&object, &"direction".into(), &hit.direction.name().into())?;
            Reflect::set(&object, &"object".into(), &hit.hit.object.as_str().into())?;
            Reflect::set(
                &object,
                &"distance".into(),
                &JsValue::from_f64(f64::from(hit.hit.distance)),
            )?;
            let point = Array::new();
            for value in hit.hit.point.to_array() {
                point.push(&JsValue::from_f64(f64::from(value)));
            }
            Reflect::set(&object, &"point".into(), &point)?;
            array.push(&object);
        }
        Ok(array)
    }

    #[wasm_bindgen(js_name = pointerNdc)]
    pub fn pointer_ndc(&self) -> Vec<f32> {
        self.controls.borrow().pointer_ndc().to_array().to_vec()
    }

    #[wasm_bindgen(js_name = isPointerMoving)]
    pub fn is_pointer_moving(&self) -> bool {
        self.controls.borrow().is_pointer_moving()
    }

    /// Column-major camera view matrix.
    #[wasm_bindgen(js_name = viewMatrix)]
    pub fn view_matrix(&self) -> Vec<f32> {
        self.controls.borrow().body().view_matrix().to_cols_array().to_vec()
    }

    /// Column-major perspective projection of the camera.
    #[wasm_bindgen(js_name = projectionMatrix)]
    pub fn projection_matrix(&self, aspect: f32) -> Vec<f32> {
        self.controls
            .borrow()
            .body()
            .camera()
            .projection(aspect)
            .to_cols_array()
            .to_vec()
    }

    /// `[x, y, opacity]` of the rotation pad handle in page pixels.
    #[wasm_bindgen(js_name = rotationHandle)]
    pub fn rotation_handle(&self) -> Vec<f32> {
        handle_values(self.controls.borrow().rotation_pad())
    }

    #[wasm_bindgen(js_name = movementHandle)]
    pub fn movement_handle(&self) -> Vec<f32> {
        handle_values(self.controls.borrow().movement_pad())
    }
}

impl Drop for WasmControls {
    fn drop(&mut self) {
        self.stop();
    }
}

fn request_frame(callback: &Closure<dyn FnMut()>) -> Result<i32, JsValue> {
    window()
        .ok_or_else(|| JsValue::from_str("window not available"))?
        .request_animation_frame(callback.as_ref().unchecked_ref())
}

fn js_error(err: impl fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn handle_values(pad: &Joystick) -> Vec<f32> {
    let position = pad.handle_position();
    vec![position.x, position.y, pad.handle().opacity]
}

/// Container rectangle in page coordinates.
fn page_viewport(container: &Element) -> Viewport {
    let rect = container.get_bounding_client_rect();
    let (scroll_x, scroll_y) = window()
        .map(|window| {
            (
                window.scroll_x().unwrap_or(0.0),
                window.scroll_y().unwrap_or(0.0),
            )
        })
        .unwrap_or((0.0, 0.0));
    Viewport {
        left: (rect.left() + scroll_x) as f32,
        top: (rect.top() + scroll_y) as f32,
        width: rect.width() as f32,
        height: rect.height() as f32,
    }
}

fn attach_listeners(
    document: &web_sys::Document,
    container: &Element,
    controls: &Rc<RefCell<TouchControls>>,
) -> Result<Vec<DomListener>, JsValue> {
    let mut listeners = Vec::new();
    let document: &EventTarget = document.as_ref();
    let surface: &EventTarget = container.as_ref();

    {
        let controls = Rc::clone(controls);
        listeners.push(DomListener::attach(document, "keydown", move |event| {
            let Some(event) = event.dyn_ref::<KeyboardEvent>() else {
                return;
            };
            if let Some(key) = map_key(event) {
                controls.borrow().key_down(key);
            }
        })?);
    }

    {
        let controls = Rc::clone(controls);
        listeners.push(DomListener::attach(document, "keyup", move |event| {
            let Some(event) = event.dyn_ref::<KeyboardEvent>() else {
                return;
            };
            if let Some(key) = map_key(event) {
                controls.borrow().key_up(key);
            }
        })?);
    }

    listeners.push(DomListener::attach(surface, "contextmenu", |event| {
        event.prevent_default();
    })?);

    {
        let controls = Rc::clone(controls);
        listeners.push(DomListener::attach(surface, "mousedown", move |event| {
            let Some(event) = event.dyn_ref::<MouseEvent>() else {
                return;
            };
            let button = MouseButton::new(event.button() as u8);
            let mut controls = controls.borrow_mut();
            if controls.mouse_down(button) {
                event.prevent_default();
            }
            if button == MouseButton::LEFT {
                let point = Vec2::new(event.page_x() as f32, event.page_y() as f32);
                press_pads(&mut controls, point);
            }
        })?);
    }

    {
        let controls = Rc::clone(controls);
        let container = container.clone();
        listeners.push(DomListener::attach(document, "mousemove", move |event| {
            let Some(event) = event.dyn_ref::<MouseEvent>() else {
                return;
            };
            let rect = container.get_bounding_client_rect();
            let client = Vec2::new(
                event.client_x() as f32 - rect.left() as f32,
                event.client_y() as f32 - rect.top() as f32,
            );
            let movement = Vec2::new(event.movement_x() as f32, event.movement_y() as f32);
            let size = Vec2::new(rect.width() as f32, rect.height() as f32);
            let page = Vec2::new(event.page_x() as f32, event.page_y() as f32);

            let mut controls = controls.borrow_mut();
            controls.pointer_move(client, movement, size);
            controls.rotation_pad_mut().drag(page);
            controls.movement_pad_mut().drag(page);
        })?);
    }

    {
        let controls = Rc::clone(controls);
        listeners.push(DomListener::attach(document, "mouseup", move |event| {
            let Some(event) = event.dyn_ref::<MouseEvent>() else {
                return;
            };
            let mut controls = controls.borrow_mut();
            controls.mouse_up(MouseButton::new(event.button() as u8));
            release_pads(&mut controls);
        })?);
    }

    {
        let controls = Rc::clone(controls);
        listeners.push(DomListener::attach(document, "mouseout", move |event| {
            let Some(event) = event.dyn_ref::<MouseEvent>() else {
                return;
            };
            // No related target means the pointer left the window.
            if event.related_target().is_none() {
                controls.borrow_mut().mouse_out();
            }
        })?);
    }

    {
        let controls = Rc::clone(controls);
        listeners.push(DomListener::attach(surface, "touchstart", move |event| {
            let Some(point) = first_touch(&event) else {
                return;
            };
            let mut controls = controls.borrow_mut();
            if press_pads(&mut controls, point) {
                event.prevent_default();
            }
        })?);
    }

    {
        let controls = Rc::clone(controls);
        listeners.push(DomListener::attach(document, "touchmove", move |event| {
            let Some(point) = first_touch(&event) else {
                return;
            };
            let mut controls = controls.borrow_mut();
            controls.rotation_pad_mut().drag(point);
            controls.movement_pad_mut().drag(point);
        })?);
    }

    for kind in ["touchend", "touchcancel"] {
        let controls = Rc::clone(controls);
        listeners.push(DomListener::attach(document, kind, move |_| {
            release_pads(&mut controls.borrow_mut());
        })?);
    }

    Ok(listeners)
}

/// Presses whichever pad contains `point`.
fn press_pads(controls: &mut TouchControls, point: Vec2) -> bool {
    controls.rotation_pad_mut().press(point) || controls.movement_pad_mut().press(point)
}

fn release_pads(controls: &mut TouchControls) {
    controls.rotation_pad_mut().release();
    controls.movement_pad_mut().release();
}

/// Page position of the first active touch point.
fn first_touch(event: &Event) -> Option<Vec2> {
    let touch = event.dyn_ref::<TouchEvent>()?.touches().get(0)?;
    Some(Vec2::new(touch.page_x() as f32, touch.page_y() as f32))
}

fn map_key(event: &KeyboardEvent) -> Option<KeyCode> {
    KeyCode::from_name(&event.key()).or_else(|| KeyCode::from_legacy_code(event.key_code()))
}
