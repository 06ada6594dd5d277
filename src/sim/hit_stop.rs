//! Freeze-frame controllers
//!
//! Two independent mechanisms stop the world when the player connects:
//!
//! - [`HitStopController`]: the long (200 ms) dramatic freeze fired by the
//!   proximity-detect path. Pauses the player's swing timers along with every
//!   registered body, and hands a [`FreezeEnd`] back to the caller on resume.
//! - [`PipeCutFreeze`]: the barely-perceptible (10 ms) impact freeze fired
//!   when the attack hitbox first bites into an intact cube. Touches no
//!   timers, and on resume forces the player's horizontal velocity back to
//!   the shared forward-run speed instead of the cached value, since the
//!   world pushes the player forward at a constant rate.
//!
//! Both are single-flight: re-triggering while a freeze is pending is a
//! silent no-op, otherwise a second snapshot would capture zeroed velocities
//! and corrupt the restore.

use glam::Vec2;

use crate::sim::body::{BodyId, World};
use crate::sim::schedule::{Action, Scheduler, TimerId};
use crate::sim::tween::Tweens;

/// What the caller asked to happen when a freeze ends.
///
/// The controller never reaches into the player itself; the dash reward is
/// applied by whoever triggered the freeze.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeEnd {
    /// Reward the player with a forward dash
    StartDash,
}

/// Per-body state captured at freeze time
#[derive(Debug, Clone)]
struct Snapshot {
    body: BodyId,
    vel: Vec2,
    gravity: Vec2,
    gravity_enabled: bool,
    moves: bool,
    /// Whether a tween was mid-flight on this body when frozen
    was_animating: bool,
}

fn freeze_bodies(registered: &[BodyId], world: &mut World, tweens: &mut Tweens) -> Vec<Snapshot> {
    let mut snapshots = Vec::with_capacity(registered.len());
    for &id in registered {
        // A registered body may already be gone; skip it
        let Some(body) = world.get_mut(id) else {
            continue;
        };
        snapshots.push(Snapshot {
            body: id,
            vel: body.vel,
            gravity: body.gravity,
            gravity_enabled: body.gravity_enabled,
            moves: body.moves,
            was_animating: tweens.pause_all(id),
        });
        body.vel = Vec2::ZERO;
        body.gravity = Vec2::ZERO;
        body.gravity_enabled = false;
        body.moves = false;
    }
    snapshots
}

fn thaw_bodies(snapshots: &[Snapshot], world: &mut World, tweens: &mut Tweens) {
    for snap in snapshots {
        let Some(body) = world.get_mut(snap.body) else {
            continue;
        };
        body.vel = snap.vel;
        body.gravity = snap.gravity;
        body.gravity_enabled = snap.gravity_enabled;
        body.moves = snap.moves;
        if snap.was_animating {
            tweens.resume_all(snap.body);
        }
    }
}

/// The main freeze-frame controller
#[derive(Debug, Default)]
pub struct HitStopController {
    registered: Vec<BodyId>,
    active: bool,
    snapshots: Vec<Snapshot>,
    /// Timers this freeze paused (never resumes one it didn't pause)
    paused_timers: Vec<TimerId>,
    on_end: Option<FreezeEnd>,
}

impl HitStopController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a body to the freeze set. No side effects while not frozen.
    pub fn register(&mut self, body: BodyId) {
        if !self.registered.contains(&body) {
            self.registered.push(body);
        }
    }

    /// Remove a body from the freeze set
    pub fn unregister(&mut self, body: BodyId) {
        self.registered.retain(|&b| b != body);
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Drop registrations whose bodies no longer exist (recycle path)
    pub fn prune(&mut self, world: &World) {
        self.registered.retain(|&b| world.contains(b));
    }

    /// Freeze the world for `duration_ms`.
    ///
    /// Single-flight: returns false without side effects if a freeze is
    /// already pending. `pausable_timers` are the externally-owned swing
    /// timers; only the ones actually paused here are resumed later.
    pub fn trigger(
        &mut self,
        world: &mut World,
        scheduler: &mut Scheduler,
        tweens: &mut Tweens,
        now: u64,
        pausable_timers: &[TimerId],
        duration_ms: u32,
        on_end: Option<FreezeEnd>,
    ) -> bool {
        if self.active {
            log::debug!("hit-stop re-trigger while active, ignoring");
            return false;
        }
        self.active = true;
        self.on_end = on_end;
        self.snapshots = freeze_bodies(&self.registered, world, tweens);

        self.paused_timers.clear();
        for &timer in pausable_timers {
            if scheduler.pause(timer, now) {
                self.paused_timers.push(timer);
            }
        }

        scheduler.after(now, duration_ms, Action::HitStopResume);
        true
    }

    /// Thaw the world. Restores every cached body state, resumes the timers
    /// this freeze paused, and hands the pending [`FreezeEnd`] back to the
    /// caller.
    pub fn resume(
        &mut self,
        world: &mut World,
        scheduler: &mut Scheduler,
        tweens: &mut Tweens,
        now: u64,
    ) -> Option<FreezeEnd> {
        if !self.active {
            return None;
        }
        thaw_bodies(&self.snapshots, world, tweens);
        self.snapshots.clear();
        for timer in self.paused_timers.drain(..) {
            scheduler.resume(timer, now);
        }
        self.active = false;
        self.on_end.take()
    }
}

/// The short pipe-cut freeze
///
/// Structurally a sibling of [`HitStopController`] but with independent
/// state: it never touches external timers, and the player body resumes at
/// the constant forward-run speed rather than its cached velocity.
#[derive(Debug, Default)]
pub struct PipeCutFreeze {
    registered: Vec<BodyId>,
    active: bool,
    snapshots: Vec<Snapshot>,
}

impl PipeCutFreeze {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, body: BodyId) {
        if !self.registered.contains(&body) {
            self.registered.push(body);
        }
    }

    pub fn unregister(&mut self, body: BodyId) {
        self.registered.retain(|&b| b != body);
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Drop registrations whose bodies no longer exist (recycle path)
    pub fn prune(&mut self, world: &World) {
        self.registered.retain(|&b| world.contains(b));
    }

    /// Freeze for `duration_ms`. Single-flight like the main controller.
    pub fn trigger(
        &mut self,
        world: &mut World,
        scheduler: &mut Scheduler,
        tweens: &mut Tweens,
        now: u64,
        duration_ms: u32,
    ) -> bool {
        if self.active {
            log::debug!("pipe-cut freeze re-trigger while active, ignoring");
            return false;
        }
        self.active = true;
        self.snapshots = freeze_bodies(&self.registered, world, tweens);
        scheduler.after(now, duration_ms, Action::PipeCutResume);
        true
    }

    /// Thaw. The player's horizontal velocity is overwritten with
    /// `run_speed`: the world scrolls the player forward at a constant rate
    /// independent of integration, so the cached vx may be stale.
    pub fn resume(&mut self, world: &mut World, tweens: &mut Tweens, player: BodyId, run_speed: f32) {
        if !self.active {
            return;
        }
        thaw_bodies(&self.snapshots, world, tweens);
        for snap in self.snapshots.drain(..) {
            if snap.body == player
                && let Some(body) = world.get_mut(player)
            {
                body.vel.x = run_speed;
            }
        }
        self.active = false;
    }
}
