//! Scalar property tweens
//!
//! Linear interpolation of a body property (alpha for destruction fades,
//! angle for the platform-sensor tip-over) across simulation ticks. Tweens
//! on a body must be cancelled before the body is despawned or repositioned
//! so a late completion never touches a disposed slot.

use crate::ms_to_ticks;
use crate::sim::body::{BodyId, World};

/// Animatable body property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TweenProp {
    Alpha,
    Angle,
}

#[derive(Debug, Clone)]
struct Tween {
    target: BodyId,
    prop: TweenProp,
    from: f32,
    to: f32,
    elapsed_ticks: u64,
    duration_ticks: u64,
    paused: bool,
}

/// A completed tween, reported so the sim can react (e.g. despawn a
/// fully-faded cube)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TweenFinished {
    pub target: BodyId,
    pub prop: TweenProp,
    pub to: f32,
}

/// Table of in-flight tweens
#[derive(Debug, Default)]
pub struct Tweens {
    active: Vec<Tween>,
}

impl Tweens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Animate `prop` on `target` from its current value to `to` over
    /// `duration_ms`. Silently skipped if the body is gone.
    pub fn animate(
        &mut self,
        world: &World,
        target: BodyId,
        prop: TweenProp,
        to: f32,
        duration_ms: u32,
    ) {
        let Some(body) = world.get(target) else {
            log::debug!("tween target {target:?} is gone, skipping");
            return;
        };
        let from = match prop {
            TweenProp::Alpha => body.alpha,
            TweenProp::Angle => body.angle,
        };
        // Only one tween per (target, prop); a new one replaces it
        self.active
            .retain(|t| !(t.target == target && t.prop == prop));
        self.active.push(Tween {
            target,
            prop,
            from,
            to,
            elapsed_ticks: 0,
            duration_ticks: ms_to_ticks(duration_ms),
            paused: false,
        });
    }

    /// Kill every in-flight tween on `target`
    pub fn cancel_all(&mut self, target: BodyId) {
        self.active.retain(|t| t.target != target);
    }

    /// Suspend every tween on `target`. Returns true if any was running,
    /// so a freeze controller knows whether to resume on thaw.
    pub fn pause_all(&mut self, target: BodyId) -> bool {
        let mut any = false;
        for t in self.active.iter_mut().filter(|t| t.target == target) {
            if !t.paused {
                t.paused = true;
                any = true;
            }
        }
        any
    }

    /// Resume every suspended tween on `target`
    pub fn resume_all(&mut self, target: BodyId) {
        for t in self.active.iter_mut().filter(|t| t.target == target) {
            t.paused = false;
        }
    }

    /// Is an alpha fade currently running on `target`?
    pub fn is_fading(&self, target: BodyId) -> bool {
        self.active
            .iter()
            .any(|t| t.target == target && t.prop == TweenProp::Alpha)
    }

    /// Advance all tweens by one tick, writing interpolated values into the
    /// world. Tweens whose target vanished are dropped without completing.
    pub fn step(&mut self, world: &mut World) -> Vec<TweenFinished> {
        let mut finished = Vec::new();
        self.active.retain_mut(|t| {
            let Some(body) = world.get_mut(t.target) else {
                return false;
            };
            if t.paused {
                return true;
            }
            t.elapsed_ticks += 1;
            let fraction = (t.elapsed_ticks as f32 / t.duration_ticks as f32).min(1.0);
            let value = t.from + (t.to - t.from) * fraction;
            match t.prop {
                TweenProp::Alpha => body.alpha = value,
                TweenProp::Angle => body.angle = value,
            }
            if t.elapsed_ticks >= t.duration_ticks {
                finished.push(TweenFinished {
                    target: t.target,
                    prop: t.prop,
                    to: t.to,
                });
                false
            } else {
                true
            }
        });
        finished
    }

    /// Number of in-flight tweens
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::body::{Body, BodyGroup};
    use glam::Vec2;

    fn world_with_cube() -> (World, BodyId) {
        let mut world = World::new();
        let id = world.spawn(Body::new(Vec2::ZERO, Vec2::splat(16.0), BodyGroup::Cube));
        (world, id)
    }

    #[test]
    fn test_alpha_fade_reaches_zero_and_reports() {
        let (mut world, id) = world_with_cube();
        let mut tweens = Tweens::new();
        tweens.animate(&world, id, TweenProp::Alpha, 0.0, 1000);

        let ticks = crate::ms_to_ticks(1000);
        let mut finished = Vec::new();
        for _ in 0..ticks {
            finished.extend(tweens.step(&mut world));
        }
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].target, id);
        assert!((world.get(id).unwrap().alpha).abs() < 0.001);
        assert!(tweens.is_empty());
    }

    #[test]
    fn test_midpoint_is_interpolated() {
        let (mut world, id) = world_with_cube();
        let mut tweens = Tweens::new();
        tweens.animate(&world, id, TweenProp::Alpha, 0.0, 1000);

        for _ in 0..crate::ms_to_ticks(500) {
            tweens.step(&mut world);
        }
        let alpha = world.get(id).unwrap().alpha;
        assert!((alpha - 0.5).abs() < 0.01, "alpha at midpoint: {alpha}");
        assert!(tweens.is_fading(id));
    }

    #[test]
    fn test_cancel_all_stops_updates() {
        let (mut world, id) = world_with_cube();
        let mut tweens = Tweens::new();
        tweens.animate(&world, id, TweenProp::Alpha, 0.0, 1000);
        tweens.animate(&world, id, TweenProp::Angle, 1.0, 1000);
        tweens.cancel_all(id);
        assert!(tweens.is_empty());
        tweens.step(&mut world);
        assert_eq!(world.get(id).unwrap().alpha, 1.0);
    }

    #[test]
    fn test_despawned_target_drops_tween_without_completion() {
        let (mut world, id) = world_with_cube();
        let mut tweens = Tweens::new();
        tweens.animate(&world, id, TweenProp::Alpha, 0.0, 100);
        world.despawn(id);
        let finished = tweens.step(&mut world);
        assert!(finished.is_empty());
        assert!(tweens.is_empty());
    }

    #[test]
    fn test_pause_freezes_value_until_resume() {
        let (mut world, id) = world_with_cube();
        let mut tweens = Tweens::new();
        tweens.animate(&world, id, TweenProp::Alpha, 0.0, 100);

        assert!(tweens.pause_all(id));
        assert!(!tweens.pause_all(id)); // already paused
        for _ in 0..1000 {
            tweens.step(&mut world);
        }
        assert_eq!(world.get(id).unwrap().alpha, 1.0);

        tweens.resume_all(id);
        for _ in 0..crate::ms_to_ticks(100) {
            tweens.step(&mut world);
        }
        assert!(world.get(id).unwrap().alpha < 0.001);
    }

    #[test]
    fn test_replacing_tween_restarts_from_current_value() {
        let (mut world, id) = world_with_cube();
        let mut tweens = Tweens::new();
        tweens.animate(&world, id, TweenProp::Alpha, 0.0, 1000);
        for _ in 0..crate::ms_to_ticks(500) {
            tweens.step(&mut world);
        }
        tweens.animate(&world, id, TweenProp::Alpha, 1.0, 100);
        assert_eq!(tweens.len(), 1);
    }
}
