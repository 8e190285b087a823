//! Authoritative scene store.
//!
//! One instance per server. Holds the live object map plus dirty tracking:
//! every mutated identifier is recorded in first-touch order so the diff
//! engine can emit deterministic batches. Mutations are O(1) amortized.

use std::collections::HashSet;

use scene_shared::scene::{RenderObject, SceneSnapshot};
use tracing::debug;

/// In-memory mapping from object identifier to renderable state.
#[derive(Debug, Default)]
pub struct SceneStore {
    live: SceneSnapshot,
    /// Identifiers mutated since the last `take_touched`, in first-touch order.
    touched: Vec<String>,
    touched_set: HashSet<String>,
}

impl SceneStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn touch(&mut self, id: &str) {
        if self.touched_set.insert(id.to_owned()) {
            self.touched.push(id.to_owned());
        }
    }

    /// Creates or replaces an object. The payload is stored by value.
    pub fn upsert(&mut self, id: impl Into<String>, object: RenderObject) {
        let id = id.into();
        self.touch(&id);
        self.live.insert(id, object);
    }

    /// Deletes an object. Removing a missing identifier is a silent no-op
    /// with a diagnostic; it never fails.
    pub fn remove(&mut self, id: &str) {
        if self.live.remove(id).is_some() {
            self.touch(id);
        } else {
            debug!(id, "remove on unknown object, ignored");
        }
    }

    /// Removes all objects.
    pub fn clear(&mut self) {
        let ids: Vec<String> = self.live.sorted_ids().into_iter().cloned().collect();
        for id in ids {
            self.live.remove(&id);
            self.touch(&id);
        }
    }

    /// Immutable view of the live state.
    pub fn live(&self) -> &SceneSnapshot {
        &self.live
    }

    /// Owned deep copy of the current state.
    pub fn snapshot(&self) -> SceneSnapshot {
        self.live.clone()
    }

    /// Whether any mutation happened since the last `take_touched`.
    pub fn is_dirty(&self) -> bool {
        !self.touched.is_empty()
    }

    /// Drains the touched-identifier list, preserving first-touch order.
    pub fn take_touched(&mut self) -> Vec<String> {
        self.touched_set.clear();
        std::mem::take(&mut self.touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene_shared::math::Vec3;
    use scene_shared::scene::{Color, Geometry, Transform};

    fn obj(x: f32) -> RenderObject {
        RenderObject::new(
            Geometry::Sphere { radius: 1.0 },
            Transform::at(Vec3::new(x, 0.0, 0.0)),
            Color::RED,
        )
    }

    #[test]
    fn upsert_marks_dirty_once_in_first_touch_order() {
        let mut store = SceneStore::new();
        store.upsert("b", obj(0.0));
        store.upsert("a", obj(1.0));
        store.upsert("b", obj(2.0));
        assert!(store.is_dirty());
        assert_eq!(store.take_touched(), vec!["b".to_string(), "a".to_string()]);
        assert!(!store.is_dirty());
    }

    #[test]
    fn remove_missing_is_silent_noop() {
        let mut store = SceneStore::new();
        store.remove("ghost");
        assert!(!store.is_dirty());
        assert!(store.live().is_empty());
    }

    #[test]
    fn clear_touches_every_known_id() {
        let mut store = SceneStore::new();
        store.upsert("a", obj(0.0));
        store.upsert("b", obj(1.0));
        store.take_touched();

        store.clear();
        assert!(store.live().is_empty());
        let mut touched = store.take_touched();
        touched.sort();
        assert_eq!(touched, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn snapshot_is_a_deep_copy() {
        let mut store = SceneStore::new();
        store.upsert("a", obj(0.0));
        let snap = store.snapshot();
        store.upsert("a", obj(5.0));
        assert_eq!(snap.get("a"), Some(&obj(0.0)));
    }
}
