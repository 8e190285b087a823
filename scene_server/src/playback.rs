//! Trajectory playback.
//!
//! Replays a pre-recorded trajectory through the scene each tick: per-frame
//! object poses plus optional transient annotation objects (contact force
//! lines and the like) that exist for exactly one frame. Transients are
//! created, flushed once with the pose updates, then deleted; with
//! autoflush disabled the delete collapses against the next frame's
//! re-create, so each annotation costs at most one wire operation per tick.

use std::time::Duration;

use scene_shared::scene::{RenderObject, Transform};
use tracing::debug;

use crate::listener::TickListener;
use crate::server::SceneHandle;

/// One frame of a recorded trajectory.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Objects moved this frame; they must already exist in the scene.
    pub poses: Vec<(String, Transform)>,
    /// Objects that exist only for this frame.
    pub transient: Vec<(String, RenderObject)>,
}

/// Tick listener that loops a trajectory through a `SceneHandle`.
pub struct TrajectoryPlayer {
    handle: SceneHandle,
    frames: Vec<Frame>,
    cursor: usize,
    looping: bool,
    /// Transient ids upserted last frame, deleted on the next.
    pending_delete: Vec<String>,
}

impl TrajectoryPlayer {
    /// Frames are copied in; the player holds no reference to caller data.
    pub fn new(handle: SceneHandle, frames: Vec<Frame>) -> Self {
        Self {
            handle,
            frames,
            cursor: 0,
            looping: true,
            pending_delete: Vec::new(),
        }
    }

    /// When false, playback freezes at the current frame instead of
    /// wrapping around.
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn play_frame(&mut self) {
        let frame = &self.frames[self.cursor];

        // Delete last frame's transients first so a same-id re-create this
        // frame collapses to a single Update in the batch.
        for id in self.pending_delete.drain(..) {
            self.handle.remove(&id);
        }
        let current = self.handle.snapshot();
        for (id, transform) in &frame.poses {
            if let Some(mut object) = current.get(id).cloned() {
                object.transform = *transform;
                self.handle.upsert_object(id.clone(), object);
            } else {
                debug!(id, "trajectory pose for unknown object, skipped");
            }
        }
        for (id, object) in &frame.transient {
            self.handle.upsert_object(id.clone(), object.clone());
            self.pending_delete.push(id.clone());
        }
        self.handle.flush();
    }
}

impl TickListener for TrajectoryPlayer {
    fn on_tick(&mut self, _now: Duration) -> anyhow::Result<()> {
        if self.frames.is_empty() {
            return Ok(());
        }
        if self.cursor >= self.frames.len() {
            if !self.looping {
                return Ok(());
            }
            self.cursor = 0;
        }
        self.play_frame();
        self.cursor += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::SceneServer;
    use scene_shared::config::ServerConfig;
    use scene_shared::math::Vec3;
    use scene_shared::scene::{Color, Geometry};

    fn line_object() -> RenderObject {
        RenderObject::new(
            Geometry::Line {
                points: vec![Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0)],
            },
            Transform::default(),
            Color::RED,
        )
    }

    #[test]
    fn playback_moves_objects_and_loops() {
        let server = SceneServer::new(ServerConfig::default());
        server.set_autoflush(false);
        let handle = server.handle();
        handle.upsert(
            "ball",
            Geometry::Sphere { radius: 1.0 },
            Transform::default(),
            Color::RED,
        );
        handle.flush();

        let frames = vec![
            Frame {
                poses: vec![("ball".into(), Transform::at(Vec3::new(1.0, 0.0, 0.0)))],
                transient: vec![],
            },
            Frame {
                poses: vec![("ball".into(), Transform::at(Vec3::new(2.0, 0.0, 0.0)))],
                transient: vec![],
            },
        ];
        let mut player = TrajectoryPlayer::new(handle.clone(), frames);

        player.on_tick(Duration::ZERO).unwrap();
        assert_eq!(
            handle.snapshot().get("ball").unwrap().transform.position,
            Vec3::new(1.0, 0.0, 0.0)
        );

        player.on_tick(Duration::ZERO).unwrap();
        assert_eq!(
            handle.snapshot().get("ball").unwrap().transform.position,
            Vec3::new(2.0, 0.0, 0.0)
        );

        // Wraps to frame 0.
        player.on_tick(Duration::ZERO).unwrap();
        assert_eq!(
            handle.snapshot().get("ball").unwrap().transform.position,
            Vec3::new(1.0, 0.0, 0.0)
        );
    }

    #[test]
    fn transients_live_for_one_frame() {
        let server = SceneServer::new(ServerConfig::default());
        server.set_autoflush(false);
        let handle = server.handle();

        let frames = vec![
            Frame {
                poses: vec![],
                transient: vec![("force0".into(), line_object())],
            },
            Frame::default(),
        ];
        let mut player = TrajectoryPlayer::new(handle.clone(), frames);

        player.on_tick(Duration::ZERO).unwrap();
        assert!(handle.snapshot().contains("force0"));

        player.on_tick(Duration::ZERO).unwrap();
        assert!(!handle.snapshot().contains("force0"));
    }
}
