//! Player combat hitboxes
//!
//! Three reactive boxes ride along with the player every tick:
//! - proximity-detect: small, leads the swing; the hit-stop trigger lives on
//!   its overlap and it self-destroys the instant it fires so one swing can
//!   never schedule two freezes
//! - attack: spawned only once the first swing frame completes *without* a
//!   hit-stop; carries the actual cube destruction
//! - look-ahead: permanent, a fixed distance ahead; exists purely for lazy
//!   grid generation and the "is anything ahead" test the continuous-cut
//!   and ledge-grab mechanics use
//!
//! All live hitboxes are registered with both freeze controllers so they
//! pause and thaw in lockstep with the rest of the world. The overlap
//! handlers themselves are wired in `combat`, which has the managers and
//! controllers in scope.

use glam::Vec2;

use crate::consts::LOOKAHEAD_OFFSET_X;
use crate::sim::body::{Aabb, Body, BodyGroup, BodyId, World};
use crate::sim::hit_stop::{HitStopController, PipeCutFreeze};

/// Proximity-detect box: small, just ahead of the blade
const PROXIMITY_SIZE: Vec2 = Vec2::new(20.0, 20.0);
const PROXIMITY_OFFSET: Vec2 = Vec2::new(24.0, 0.0);
/// Attack box: the swing's reach
const ATTACK_SIZE: Vec2 = Vec2::new(40.0, 32.0);
const ATTACK_OFFSET: Vec2 = Vec2::new(28.0, 0.0);
/// Look-ahead probe
const LOOKAHEAD_SIZE: Vec2 = Vec2::new(16.0, 32.0);

/// The player's three reactive hitboxes
#[derive(Debug)]
pub struct PlayerHitboxes {
    pub proximity: Option<BodyId>,
    pub attack: Option<BodyId>,
    pub lookahead: BodyId,
}

fn spawn_hitbox(world: &mut World, player_pos: Vec2, offset: Vec2, size: Vec2) -> BodyId {
    let mut body = Body::new(player_pos + offset, size, BodyGroup::Hitbox);
    body.moves = false;
    world.spawn(body)
}

impl PlayerHitboxes {
    pub fn new(
        world: &mut World,
        hit_stop: &mut HitStopController,
        pipe_cut: &mut PipeCutFreeze,
        player_pos: Vec2,
    ) -> Self {
        let lookahead = spawn_hitbox(
            world,
            player_pos,
            Vec2::new(LOOKAHEAD_OFFSET_X, 0.0),
            LOOKAHEAD_SIZE,
        );
        hit_stop.register(lookahead);
        pipe_cut.register(lookahead);
        Self {
            proximity: None,
            attack: None,
            lookahead,
        }
    }

    /// Spawn the proximity-detect hitbox for a fresh swing. Idempotent.
    pub fn create_proximity_hitbox(
        &mut self,
        world: &mut World,
        hit_stop: &mut HitStopController,
        pipe_cut: &mut PipeCutFreeze,
        player_pos: Vec2,
    ) {
        if self.proximity.is_some() {
            return;
        }
        let id = spawn_hitbox(world, player_pos, PROXIMITY_OFFSET, PROXIMITY_SIZE);
        hit_stop.register(id);
        pipe_cut.register(id);
        self.proximity = Some(id);
    }

    /// Tear the proximity hitbox down synchronously. Called the instant its
    /// hit-stop fires, before the same overlap could be evaluated again.
    pub fn destroy_proximity_hitbox(
        &mut self,
        world: &mut World,
        hit_stop: &mut HitStopController,
        pipe_cut: &mut PipeCutFreeze,
    ) {
        if let Some(id) = self.proximity.take() {
            hit_stop.unregister(id);
            pipe_cut.unregister(id);
            world.despawn(id);
        }
    }

    /// Spawn the attack hitbox (first swing frame done, no hit-stop fired)
    pub fn create_attack_hitbox(
        &mut self,
        world: &mut World,
        hit_stop: &mut HitStopController,
        pipe_cut: &mut PipeCutFreeze,
        player_pos: Vec2,
    ) {
        if self.attack.is_some() {
            return;
        }
        let id = spawn_hitbox(world, player_pos, ATTACK_OFFSET, ATTACK_SIZE);
        hit_stop.register(id);
        pipe_cut.register(id);
        self.attack = Some(id);
    }

    pub fn destroy_attack_hitbox(
        &mut self,
        world: &mut World,
        hit_stop: &mut HitStopController,
        pipe_cut: &mut PipeCutFreeze,
    ) {
        if let Some(id) = self.attack.take() {
            hit_stop.unregister(id);
            pipe_cut.unregister(id);
            world.despawn(id);
        }
    }

    /// Re-pin every live hitbox to the player. Called once per tick.
    pub fn update_positions(&self, world: &mut World, player_pos: Vec2) {
        if let Some(id) = self.proximity
            && let Some(body) = world.get_mut(id)
        {
            body.pos = player_pos + PROXIMITY_OFFSET;
        }
        if let Some(id) = self.attack
            && let Some(body) = world.get_mut(id)
        {
            body.pos = player_pos + ATTACK_OFFSET;
        }
        if let Some(body) = world.get_mut(self.lookahead) {
            body.pos = player_pos + Vec2::new(LOOKAHEAD_OFFSET_X, 0.0);
        }
    }

    /// Manual geometric probe: is any still-damaging cube or platform sensor
    /// inside the look-ahead box?
    pub fn something_ahead(&self, world: &World) -> bool {
        let Some(probe) = world.get(self.lookahead).map(Body::aabb) else {
            return false;
        };
        !world.overlapping_group(&probe, BodyGroup::Cube).is_empty()
            || !world
                .overlapping_group(&probe, BodyGroup::PlatformSensor)
                .is_empty()
            || !world
                .overlapping_group(&probe, BodyGroup::Placeholder)
                .is_empty()
    }

    /// Combined reach of the cutting path while holding the swing frame:
    /// player body plus attack box, used by the continuous-cut re-scan.
    pub fn cutting_reach(&self, world: &World, player_aabb: Aabb) -> Aabb {
        let mut reach = player_aabb;
        if let Some(id) = self.attack
            && let Some(body) = world.get(id)
        {
            let b = body.aabb();
            reach.min = reach.min.min(b.min);
            reach.max = reach.max.max(b.max);
        }
        reach
    }

    /// Tear everything down (player death / despawn)
    pub fn destroy(
        &mut self,
        world: &mut World,
        hit_stop: &mut HitStopController,
        pipe_cut: &mut PipeCutFreeze,
    ) {
        self.destroy_proximity_hitbox(world, hit_stop, pipe_cut);
        self.destroy_attack_hitbox(world, hit_stop, pipe_cut);
        hit_stop.unregister(self.lookahead);
        pipe_cut.unregister(self.lookahead);
        world.despawn(self.lookahead);
    }
}
