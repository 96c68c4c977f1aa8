use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use glam::Vec3;
use parking_lot::RwLock;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::rig::Body;

/// A ray hit reported by a scene graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Intersection {
    pub distance: f32,
    pub point: Vec3,
    pub object: String,
}

/// What the navigation controller needs from the host's scene graph.
pub trait SceneGraph {
    /// Attaches the controller's body node.
    fn add_node(&self, body: Body);

    /// Casts a ray against every object in the graph, children included.
    /// Hits come back ordered by distance, nearest first.
    fn intersect_ray(&self, origin: Vec3, direction: Vec3) -> Vec<Intersection>;
}

/// Collision geometry of a scene object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum Shape {
    /// No geometry of its own; only groups its children.
    Group,
    /// Axis-aligned box centered on the object position.
    Box { size: Vec3 },
    Sphere { radius: f32 },
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Group => "group",
            Shape::Box { .. } => "box",
            Shape::Sphere { .. } => "sphere",
        }
    }
}

/// Scene object; `position` is relative to the parent object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    #[serde(flatten)]
    pub shape: Shape,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SceneObject>,
}

impl SceneObject {
    pub fn new(name: impl Into<String>, shape: Shape, position: Vec3) -> Self {
        Self {
            name: name.into(),
            shape,
            position,
            children: Vec::new(),
        }
    }

    fn count(&self) -> usize {
        1 + self.children.iter().map(SceneObject::count).sum::<usize>()
    }

    fn collect_hits(&self, parent: Vec3, origin: Vec3, direction: Vec3, hits: &mut Vec<Intersection>) {
        let center = parent + self.position;
        let distance = match self.shape {
            Shape::Group => None,
            Shape::Box { size } => {
                let half = size * 0.5;
                ray_aabb_intersect(origin, direction, center - half, center + half)
            }
            Shape::Sphere { radius } => ray_sphere_intersect(origin, direction, center, radius),
        };
        if let Some(distance) = distance {
            hits.push(Intersection {
                distance,
                point: origin + direction * distance,
                object: self.name.clone(),
            });
        }
        for child in &self.children {
            child.collect_hits(center, origin, direction, hits);
        }
    }
}

/// Where the body starts; angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spawn {
    pub position: Vec3,
    #[serde(default)]
    pub pitch: f32,
    #[serde(default)]
    pub yaw: f32,
}

/// Obstacle scene answering ray queries for the controller.
///
/// Clones share the same object list and attached nodes.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    objects: Arc<RwLock<Vec<SceneObject>>>,
    nodes: Arc<RwLock<Vec<Body>>>,
    spawn: Option<Spawn>,
}

impl Scene {
    pub fn new(objects: Vec<SceneObject>) -> Self {
        Self {
            objects: Arc::new(RwLock::new(objects)),
            ..Self::default()
        }
    }

    /// Parses a scene description such as
    ///
    /// ```xml
    /// <scene>
    ///   <spawn><position>0 20 300</position><yaw>0</yaw></spawn>
    ///   <object>
    ///     <name>Wall</name>
    ///     <shape>box</shape>
    ///     <position>0 0 -10</position>
    ///     <size>20 20 1</size>
    ///   </object>
    /// </scene>
    /// ```
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();
        if !root.has_tag_name("scene") {
            bail!("expected <scene> root element, found <{}>", root.tag_name().name());
        }

        let objects = root
            .children()
            .filter(|node| node.has_tag_name("object"))
            .map(|node| parse_object(&node))
            .collect::<Result<Vec<_>>>()?;

        let spawn = root
            .children()
            .find(|node| node.has_tag_name("spawn"))
            .map(|node| parse_spawn(&node))
            .transpose()?;

        Ok(Self {
            spawn,
            ..Self::new(objects)
        })
    }

    pub fn spawn(&self) -> Option<Spawn> {
        self.spawn
    }

    /// Snapshot of the top-level objects.
    pub fn objects(&self) -> Vec<SceneObject> {
        self.objects.read().clone()
    }

    pub fn add_object(&self, object: SceneObject) {
        self.objects.write().push(object);
    }

    /// Number of objects, children included.
    pub fn object_count(&self) -> usize {
        self.objects.read().iter().map(SceneObject::count).sum()
    }

    pub fn contains_node(&self, body: &Body) -> bool {
        self.nodes.read().iter().any(|node| node.is_same_node(body))
    }
}

impl SceneGraph for Scene {
    fn add_node(&self, body: Body) {
        let mut nodes = self.nodes.write();
        if !nodes.iter().any(|node| node.is_same_node(&body)) {
            nodes.push(body);
        }
    }

    fn intersect_ray(&self, origin: Vec3, direction: Vec3) -> Vec<Intersection> {
        let Some(direction) = direction.try_normalize() else {
            return Vec::new();
        };
        let mut hits = Vec::new();
        for object in self.objects.read().iter() {
            object.collect_hits(Vec3::ZERO, origin, direction, &mut hits);
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }
}

/// Slab test. Returns the entry distance, or the exit distance when the ray
/// starts inside the box.
pub fn ray_aabb_intersect(origin: Vec3, direction: Vec3, min: Vec3, max: Vec3) -> Option<f32> {
    let inv = Vec3::new(
        inverse_or_max(direction.x),
        inverse_or_max(direction.y),
        inverse_or_max(direction.z),
    );
    let t1 = (min - origin) * inv;
    let t2 = (max - origin) * inv;
    let t_enter = t1.min(t2).max_element();
    let t_exit = t1.max(t2).min_element();

    if t_exit >= t_enter && t_exit >= 0.0 {
        Some(if t_enter >= 0.0 { t_enter } else { t_exit })
    } else {
        None
    }
}

fn inverse_or_max(component: f32) -> f32 {
    if component.abs() > 1e-10 {
        1.0 / component
    } else {
        f32::MAX * component.signum()
    }
}

/// Nearest non-negative distance along a normalized ray to a sphere surface.
pub fn ray_sphere_intersect(origin: Vec3, direction: Vec3, center: Vec3, radius: f32) -> Option<f32> {
    let to_origin = origin - center;
    let b = to_origin.dot(direction);
    let c = to_origin.length_squared() - radius * radius;
    let discriminant = b * b - c;
    if discriminant < 0.0 {
        return None;
    }
    let root = discriminant.sqrt();
    [-b - root, -b + root].into_iter().find(|t| *t >= 0.0)
}

fn parse_object(node: &Node<'_, '_>) -> Result<SceneObject> {
    let name = required_text(node, "name")?;
    let shape = match optional_text(node, "shape").as_deref() {
        None | Some("group") => Shape::Group,
        Some("box") => Shape::Box {
            size: parse_vec3(optional_text(node, "size"), Vec3::ONE)
                .with_context(|| format!("object {name}: bad <size>"))?,
        },
        Some("sphere") => Shape::Sphere {
            radius: parse_f32(optional_text(node, "radius"), 1.0)
                .with_context(|| format!("object {name}: bad <radius>"))?,
        },
        Some(other) => bail!("object {name}: unknown shape `{other}`"),
    };
    let position = parse_vec3(optional_text(node, "position"), Vec3::ZERO)
        .with_context(|| format!("object {name}: bad <position>"))?;
    let children = node
        .children()
        .filter(|child| child.has_tag_name("object"))
        .map(|child| parse_object(&child))
        .collect::<Result<Vec<_>>>()?;

    Ok(SceneObject {
        name,
        shape,
        position,
        children,
    })
}

fn parse_spawn(node: &Node<'_, '_>) -> Result<Spawn> {
    Ok(Spawn {
        position: parse_vec3(optional_text(node, "position"), Vec3::ZERO)
            .context("spawn: bad <position>")?,
        pitch: parse_f32(optional_text(node, "pitch"), 0.0).context("spawn: bad <pitch>")?,
        yaw: parse_f32(optional_text(node, "yaw"), 0.0).context("spawn: bad <yaw>")?,
    })
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    let Some(value) = value else {
        return Ok(default);
    };
    let numbers = value
        .split_whitespace()
        .map(|component| component.parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| anyhow!("failed to parse vector `{value}`: {err}"))?;
    match numbers.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(anyhow!("vector `{value}` must have exactly 3 components")),
    }
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float: {err}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::Camera;

    const SAMPLE: &str = r#"
    <scene>
        <spawn>
            <position>0 20 300</position>
            <yaw>90</yaw>
        </spawn>
        <object>
            <name>Wall</name>
            <shape>box</shape>
            <position>0 0 -10</position>
            <size>20 20 2</size>
        </object>
        <object>
            <name>Orbit</name>
            <position>50 0 0</position>
            <object>
                <name>Moon</name>
                <shape>sphere</shape>
                <radius>5</radius>
                <position>0 0 -30</position>
            </object>
        </object>
    </scene>
    "#;

    #[test]
    fn parse_scene_populates_objects_and_spawn() {
        let scene = Scene::from_xml(SAMPLE).unwrap();
        assert_eq!(scene.object_count(), 3);
        let objects = scene.objects();
        assert_eq!(objects[0].shape, Shape::Box { size: Vec3::new(20.0, 20.0, 2.0) });
        assert_eq!(objects[1].shape, Shape::Group);
        assert_eq!(objects[1].children[0].shape, Shape::Sphere { radius: 5.0 });
        let spawn = scene.spawn().unwrap();
        assert_eq!(spawn.position, Vec3::new(0.0, 20.0, 300.0));
        assert_eq!(spawn.yaw, 90.0);
        assert_eq!(spawn.pitch, 0.0);
    }

    #[test]
    fn missing_name_is_an_error() {
        let bad = "<scene><object><shape>box</shape></object></scene>";
        assert!(Scene::from_xml(bad).is_err());
    }

    #[test]
    fn unknown_shape_is_an_error() {
        let bad = "<scene><object><name>Cone</name><shape>cone</shape></object></scene>";
        let err = Scene::from_xml(bad).unwrap_err();
        assert!(err.to_string().contains("unknown shape"));
    }

    #[test]
    fn short_vector_is_an_error() {
        let bad = "<scene><object><name>A</name><position>1 2</position></object></scene>";
        assert!(Scene::from_xml(bad).is_err());
    }

    #[test]
    fn ray_reports_nearest_hit_first() {
        let scene = Scene::new(vec![
            SceneObject::new("Far", Shape::Box { size: Vec3::splat(2.0) }, Vec3::new(0.0, 0.0, -20.0)),
            SceneObject::new("Near", Shape::Box { size: Vec3::splat(2.0) }, Vec3::new(0.0, 0.0, -10.0)),
        ]);
        let hits = scene.intersect_ray(Vec3::ZERO, Vec3::NEG_Z);
        let names: Vec<_> = hits.iter().map(|hit| hit.object.as_str()).collect();
        assert_eq!(names, vec!["Near", "Far"]);
        assert!((hits[0].distance - 9.0).abs() < 1e-5);
        assert!((hits[0].point.z + 9.0).abs() < 1e-5);
    }

    #[test]
    fn ray_query_descends_into_children() {
        let scene = Scene::from_xml(SAMPLE).unwrap();
        let hits = scene.intersect_ray(Vec3::new(50.0, 0.0, 0.0), Vec3::new(0.0, 0.0, -3.0));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].object, "Moon");
        assert!((hits[0].distance - 25.0).abs() < 1e-4);
    }

    #[test]
    fn misses_and_zero_directions_return_no_hits() {
        let scene = Scene::from_xml(SAMPLE).unwrap();
        assert!(scene.intersect_ray(Vec3::ZERO, Vec3::Z).is_empty());
        assert!(scene.intersect_ray(Vec3::ZERO, Vec3::ZERO).is_empty());
    }

    #[test]
    fn added_objects_take_part_in_ray_queries() {
        let scene = Scene::default();
        assert!(scene.intersect_ray(Vec3::ZERO, Vec3::X).is_empty());
        scene.add_object(SceneObject::new(
            "Ball",
            Shape::Sphere { radius: 1.0 },
            Vec3::new(5.0, 0.0, 0.0),
        ));
        let hits = scene.intersect_ray(Vec3::ZERO, Vec3::X);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].distance - 4.0).abs() < 1e-5);
        assert_eq!(scene.object_count(), 1);
    }

    #[test]
    fn ray_starting_inside_a_box_hits_its_far_side() {
        let distance = ray_aabb_intersect(Vec3::ZERO, Vec3::X, Vec3::splat(-1.0), Vec3::splat(1.0));
        assert_eq!(distance, Some(1.0));
    }

    #[test]
    fn nodes_are_attached_once() {
        let scene = Scene::default();
        let body = Body::new(Camera::default());
        scene.add_node(body.clone());
        scene.add_node(body.clone());
        assert!(scene.contains_node(&body));
        assert_eq!(scene.nodes.read().len(), 1);
    }
}
