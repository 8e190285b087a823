//! Diff engine.
//!
//! Computes the minimal operation batch that takes a baseline snapshot (the
//! last-broadcast state) to the live state. Mutations to one identifier
//! within a batch collapse to at most one operation, and an object created
//! then deleted inside the same batch emits nothing. Batches are emitted in
//! first-touch order so results are deterministic and testable.

use scene_shared::scene::{Operation, SceneSnapshot};

/// Diffs `live` against `baseline` for the given touched identifiers.
///
/// Replaying the result against `baseline` yields exactly `live` restricted
/// to the touched set; identifiers outside `touched` are assumed unchanged.
pub fn diff(baseline: &SceneSnapshot, live: &SceneSnapshot, touched: &[String]) -> Vec<Operation> {
    let mut ops = Vec::new();
    for id in touched {
        match (baseline.get(id), live.get(id)) {
            (None, Some(obj)) => ops.push(Operation::Create {
                id: id.clone(),
                object: obj.clone(),
            }),
            (Some(prev), Some(obj)) => {
                if prev != obj {
                    ops.push(Operation::Update {
                        id: id.clone(),
                        object: obj.clone(),
                    });
                }
            }
            (Some(_), None) => ops.push(Operation::Delete { id: id.clone() }),
            // Created and deleted within the batch: nothing to send.
            (None, None) => {}
        }
    }
    ops
}

/// Full snapshot-vs-snapshot diff over the key union, in sorted-id order.
pub fn diff_full(prev: &SceneSnapshot, next: &SceneSnapshot) -> Vec<Operation> {
    let mut ids: Vec<String> = prev
        .sorted_ids()
        .into_iter()
        .chain(next.sorted_ids())
        .cloned()
        .collect();
    ids.sort();
    ids.dedup();
    diff(prev, next, &ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SceneStore;
    use scene_shared::math::Vec3;
    use scene_shared::scene::{Color, Geometry, RenderObject, Transform};

    fn sphere(x: f32) -> RenderObject {
        RenderObject::new(
            Geometry::Sphere { radius: 1.0 },
            Transform::at(Vec3::new(x, 0.0, 0.0)),
            Color::RED,
        )
    }

    fn flush(store: &mut SceneStore, baseline: &mut SceneSnapshot) -> Vec<Operation> {
        let touched = store.take_touched();
        let ops = diff(baseline, store.live(), &touched);
        for op in &ops {
            baseline.apply(op);
        }
        ops
    }

    #[test]
    fn two_upserts_of_existing_object_collapse_to_one_update() {
        let mut store = SceneStore::new();
        let mut baseline = SceneSnapshot::new();

        store.upsert("ball", sphere(0.0));
        flush(&mut store, &mut baseline);

        store.upsert("ball", sphere(1.0));
        store.upsert("ball", sphere(2.0));
        let ops = flush(&mut store, &mut baseline);
        assert_eq!(
            ops,
            vec![Operation::Update {
                id: "ball".into(),
                object: sphere(2.0),
            }]
        );
    }

    #[test]
    fn upsert_of_new_object_is_a_create() {
        let mut store = SceneStore::new();
        let mut baseline = SceneSnapshot::new();

        store.upsert("ball", sphere(0.0));
        store.upsert("ball", sphere(3.0));
        let ops = flush(&mut store, &mut baseline);
        assert_eq!(
            ops,
            vec![Operation::Create {
                id: "ball".into(),
                object: sphere(3.0),
            }]
        );
    }

    #[test]
    fn create_then_delete_in_one_batch_emits_nothing() {
        let mut store = SceneStore::new();
        let mut baseline = SceneSnapshot::new();

        for i in 0..4 {
            store.upsert(format!("arrow{i}"), sphere(i as f32));
        }
        for i in 0..4 {
            store.remove(&format!("arrow{i}"));
        }
        let ops = flush(&mut store, &mut baseline);
        assert!(ops.is_empty());
    }

    #[test]
    fn unchanged_reupsert_emits_nothing() {
        let mut store = SceneStore::new();
        let mut baseline = SceneSnapshot::new();

        store.upsert("ball", sphere(0.0));
        flush(&mut store, &mut baseline);

        store.upsert("ball", sphere(0.0));
        assert!(flush(&mut store, &mut baseline).is_empty());
    }

    #[test]
    fn ops_emitted_in_first_touch_order() {
        let mut store = SceneStore::new();
        let mut baseline = SceneSnapshot::new();

        store.upsert("z", sphere(0.0));
        store.upsert("a", sphere(1.0));
        store.upsert("m", sphere(2.0));
        let ops = flush(&mut store, &mut baseline);
        let ids: Vec<&str> = ops.iter().map(|op| op.id()).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }

    /// Replay property: a mixed mutation sequence flushed in batches always
    /// reconciles the baseline with the live snapshot.
    #[test]
    fn replaying_flushed_batches_reconstructs_final_state() {
        let mut store = SceneStore::new();
        let mut baseline = SceneSnapshot::new();

        store.upsert("a", sphere(0.0));
        store.upsert("b", sphere(1.0));
        flush(&mut store, &mut baseline);

        store.upsert("a", sphere(5.0));
        store.remove("b");
        store.upsert("c", sphere(2.0));
        store.remove("c");
        store.upsert("d", sphere(3.0));
        flush(&mut store, &mut baseline);

        store.clear();
        store.upsert("e", sphere(4.0));
        flush(&mut store, &mut baseline);

        assert_eq!(baseline, store.snapshot());
    }

    #[test]
    fn diff_full_covers_key_union() {
        let mut prev = SceneSnapshot::new();
        prev.insert("stays", sphere(0.0));
        prev.insert("goes", sphere(1.0));

        let mut next = SceneSnapshot::new();
        next.insert("stays", sphere(9.0));
        next.insert("appears", sphere(2.0));

        let ops = diff_full(&prev, &next);
        let mut replayed = prev.clone();
        for op in &ops {
            replayed.apply(op);
        }
        assert_eq!(replayed, next);
        // Sorted-id order: appears, goes, stays.
        let ids: Vec<&str> = ops.iter().map(|op| op.id()).collect();
        assert_eq!(ids, vec!["appears", "goes", "stays"]);
    }
}
