//! Scene data model.
//!
//! A scene is a flat mapping from string identifiers to renderable objects.
//! The server owns the single authoritative snapshot; viewers reconstruct
//! their own copy by replaying `Operation`s. Everything here is plain data
//! with value semantics: objects are stored and transmitted by value, so no
//! caller can alias server-internal buffers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::math::{Quat, Vec3};

/// RGBA color, components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    pub const RED: Self = Self::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Self = Self::rgb(0.0, 1.0, 0.0);
    pub const BLUE: Self = Self::rgb(0.0, 0.0, 1.0);
    pub const GRAY: Self = Self::rgb(0.5, 0.5, 0.5);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// World-frame placement of an object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Transform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }
}

/// Shape description for a renderable object.
///
/// Parametric primitives plus polylines and external mesh references; the
/// remote renderer interprets these, the server never rasterizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Sphere { radius: f32 },
    Cuboid { half_extents: Vec3 },
    Capsule { radius: f32, half_height: f32 },
    Line { points: Vec<Vec3> },
    Mesh { path: String, scale: Vec3 },
}

/// One renderable object. The identifier is the snapshot map key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderObject {
    pub geometry: Geometry,
    pub transform: Transform,
    pub color: Color,
}

impl RenderObject {
    pub fn new(geometry: Geometry, transform: Transform, color: Color) -> Self {
        Self {
            geometry,
            transform,
            color,
        }
    }
}

/// One unit of scene change, the unit of transmission.
///
/// Create and Update carry the full object payload so each operation applies
/// without reference to prior history; a viewer that received a Create for an
/// identifier can apply any later Update for it unconditionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Create { id: String, object: RenderObject },
    Update { id: String, object: RenderObject },
    Delete { id: String },
}

impl Operation {
    /// The identifier this operation touches.
    pub fn id(&self) -> &str {
        match self {
            Operation::Create { id, .. } => id,
            Operation::Update { id, .. } => id,
            Operation::Delete { id } => id,
        }
    }
}

/// Full scene state at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SceneSnapshot {
    objects: HashMap<String, RenderObject>,
}

impl SceneSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, object: RenderObject) {
        self.objects.insert(id.into(), object);
    }

    pub fn remove(&mut self, id: &str) -> Option<RenderObject> {
        self.objects.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&RenderObject> {
        self.objects.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RenderObject)> {
        self.objects.iter()
    }

    /// Identifiers in sorted order, for deterministic iteration.
    pub fn sorted_ids(&self) -> Vec<&String> {
        let mut ids: Vec<&String> = self.objects.keys().collect();
        ids.sort();
        ids
    }

    /// Replays one operation against this snapshot.
    ///
    /// Create and Update both insert (Create of an existing identifier is a
    /// replace); Delete of an unknown identifier is a silent no-op.
    pub fn apply(&mut self, op: &Operation) {
        match op {
            Operation::Create { id, object } | Operation::Update { id, object } => {
                self.objects.insert(id.clone(), object.clone());
            }
            Operation::Delete { id } => {
                if self.objects.remove(id).is_none() {
                    debug!(id = %id, "delete for unknown object, ignored");
                }
            }
        }
    }

    /// Emits the full state as Create operations in sorted-id order.
    ///
    /// Replaying the result against an empty snapshot reproduces this one;
    /// this is the full-sync batch a late-joining viewer receives.
    pub fn as_creates(&self) -> Vec<Operation> {
        self.sorted_ids()
            .into_iter()
            .map(|id| Operation::Create {
                id: id.clone(),
                object: self.objects[id].clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball(x: f32) -> RenderObject {
        RenderObject::new(
            Geometry::Sphere { radius: 1.0 },
            Transform::at(Vec3::new(x, 0.0, 0.0)),
            Color::RED,
        )
    }

    #[test]
    fn apply_create_update_delete() {
        let mut snap = SceneSnapshot::new();
        snap.apply(&Operation::Create {
            id: "ball".into(),
            object: ball(0.0),
        });
        assert_eq!(snap.get("ball"), Some(&ball(0.0)));

        snap.apply(&Operation::Update {
            id: "ball".into(),
            object: ball(2.0),
        });
        assert_eq!(snap.get("ball"), Some(&ball(2.0)));

        snap.apply(&Operation::Delete { id: "ball".into() });
        assert!(snap.is_empty());
    }

    #[test]
    fn apply_delete_missing_is_noop() {
        let mut snap = SceneSnapshot::new();
        snap.apply(&Operation::Delete { id: "ghost".into() });
        assert!(snap.is_empty());
    }

    #[test]
    fn as_creates_reproduces_snapshot() {
        let mut snap = SceneSnapshot::new();
        snap.insert("b", ball(1.0));
        snap.insert("a", ball(2.0));

        let mut rebuilt = SceneSnapshot::new();
        for op in snap.as_creates() {
            rebuilt.apply(&op);
        }
        assert_eq!(rebuilt, snap);
    }

    #[test]
    fn as_creates_is_sorted() {
        let mut snap = SceneSnapshot::new();
        snap.insert("b", ball(1.0));
        snap.insert("a", ball(2.0));
        let ids: Vec<String> = snap.as_creates().iter().map(|op| op.id().to_string()).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
