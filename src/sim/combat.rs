//! Combat simulation orchestrator
//!
//! `CombatSim` owns the whole core: the body world, the action scheduler,
//! the tween table, both freeze controllers, the three column managers, the
//! player state machine, the hitbox set and the chunk spawner. One `tick`
//! advances everything in a fixed order so a given seed and input sequence
//! always replays identically:
//!
//! 1. drain due actions and apply them
//! 2. player input
//! 3. step tweens, despawning fully-faded bodies
//! 4. integrate the world and migrate fast bodies to the falling pool
//! 5. re-pin hitboxes to the player
//! 6. overlap processing (lazy grid generation, hit-stop gate, attack and
//!    dash destruction, landing, damage)
//! 7. spawner advance and recycling
//!
//! Overlap handlers read the gating flags before mutating anything, so a
//! freeze, a cooldown and a swing flag observed in one tick stay coherent
//! for the rest of that tick.

use glam::Vec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use crate::consts::{
    FADE_POLL_MS, GRAVITY_Y, GRID_COLS, PLAYER_HEIGHT, PLAYER_WIDTH, RECYCLE_MARGIN, SIM_DT,
};
use crate::sim::body::{Body, BodyGroup, BodyId, World};
use crate::sim::columns::{ChainTrigger, ColumnId, ColumnKind, ColumnManager};
use crate::sim::hit_stop::{FreezeEnd, HitStopController, PipeCutFreeze};
use crate::sim::hitboxes::PlayerHitboxes;
use crate::sim::player::PlayerCombat;
use crate::sim::schedule::{Action, Scheduler};
use crate::sim::spawner::{ChunkEntry, ChunkSpawner, ChunkTemplate, EntryKind};
use crate::sim::tuning::Tuning;
use crate::sim::tween::{TweenProp, Tweens};

/// Player spawn point, y-down world coordinates
const PLAYER_START: Vec2 = Vec2::new(40.0, 120.0);
/// Gap between the player spawn and the first materialized chunk, px
const FIRST_CHUNK_GAP: f32 = 120.0;

/// Per-tick input the core consumes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickInput {
    pub flap: bool,
}

/// The full combat core
#[derive(Debug)]
pub struct CombatSim {
    world: World,
    scheduler: Scheduler,
    tweens: Tweens,
    hit_stop: HitStopController,
    pipe_cut: PipeCutFreeze,
    upper: ColumnManager,
    lower: ColumnManager,
    floating: ColumnManager,
    player: PlayerCombat,
    hitboxes: PlayerHitboxes,
    spawner: ChunkSpawner,
    rng: Pcg32,
    tuning: Tuning,
    ticks: u64,
    game_over: bool,
}

impl CombatSim {
    pub fn new(seed: u64, tuning: Tuning) -> Self {
        Self::with_templates(seed, tuning, default_templates())
    }

    pub fn with_templates(seed: u64, tuning: Tuning, templates: Vec<ChunkTemplate>) -> Self {
        let mut world = World::new();
        let mut hit_stop = HitStopController::new();
        let mut pipe_cut = PipeCutFreeze::new();

        let mut body = Body::new(
            PLAYER_START,
            Vec2::new(PLAYER_WIDTH, PLAYER_HEIGHT),
            BodyGroup::Player,
        )
        .with_gravity(Vec2::new(0.0, GRAVITY_Y));
        body.vel.x = tuning.run_speed;
        let player_body = world.spawn(body);
        hit_stop.register(player_body);
        pipe_cut.register(player_body);

        let hitboxes = PlayerHitboxes::new(&mut world, &mut hit_stop, &mut pipe_cut, PLAYER_START);

        let mut sim = Self {
            world,
            scheduler: Scheduler::new(),
            tweens: Tweens::new(),
            hit_stop,
            pipe_cut,
            upper: ColumnManager::new(ColumnKind::Upper),
            lower: ColumnManager::new(ColumnKind::Lower),
            floating: ColumnManager::new(ColumnKind::Floating),
            player: PlayerCombat::new(player_body),
            hitboxes,
            spawner: ChunkSpawner::new(templates, PLAYER_START.x + FIRST_CHUNK_GAP),
            rng: Pcg32::seed_from_u64(seed),
            tuning,
            ticks: 0,
            game_over: false,
        };
        sim.spawner.update(
            &mut sim.world,
            &mut sim.upper,
            &mut sim.lower,
            &mut sim.floating,
            PLAYER_START.x,
        );
        sim
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    pub fn health(&self) -> u8 {
        self.player.health()
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn player_pos(&self) -> Option<Vec2> {
        self.world.get(self.player.body).map(|b| b.pos)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Advance the simulation by one fixed step
    pub fn tick(&mut self, input: TickInput) {
        self.ticks += 1;
        let now = self.ticks;

        for action in self.scheduler.drain_due(now) {
            // Body-mutating actions wait out a freeze tick by tick, or the
            // thaw would restore snapshots taken before they ran
            if (self.hit_stop.is_active() || self.pipe_cut.is_active())
                && matches!(
                    action,
                    Action::ChainFall { .. } | Action::GravityBoost { .. } | Action::FadePoll { .. }
                )
            {
                self.scheduler.after(now, 1, action);
                continue;
            }
            self.apply_action(action, now);
        }

        let frozen = self.hit_stop.is_active() || self.pipe_cut.is_active();

        if input.flap && !frozen && !self.game_over {
            self.player.flap(
                &mut self.world,
                &mut self.scheduler,
                &mut self.hitboxes,
                &mut self.hit_stop,
                &mut self.pipe_cut,
                now,
            );
        }

        for done in self.tweens.step(&mut self.world) {
            if done.prop == TweenProp::Alpha && done.to <= 0.0 {
                self.hit_stop.unregister(done.target);
                self.pipe_cut.unregister(done.target);
                self.world.despawn(done.target);
            }
        }

        self.world.step(SIM_DT);
        self.world.migrate_falling();

        if let Some(pos) = self.player_pos() {
            self.hitboxes.update_positions(&mut self.world, pos);
        }

        if !frozen && !self.game_over {
            self.process_overlaps(now);
            self.player.dash_update(&mut self.world, &self.tuning);
            // The world drives the player forward at a constant rate
            // independent of integration; dash and freezes own vx instead.
            if !self.player.dashing
                && !self.hit_stop.is_active()
                && !self.pipe_cut.is_active()
                && let Some(body) = self.world.get_mut(self.player.body)
            {
                body.vel.x = self.tuning.run_speed;
            }
        }

        let player_x = self.player_pos().map_or(0.0, |p| p.x);
        if !frozen {
            self.spawner.update(
                &mut self.world,
                &mut self.upper,
                &mut self.lower,
                &mut self.floating,
                player_x,
            );
        }
        let threshold = player_x - RECYCLE_MARGIN;
        self.lower.recycle(&mut self.world, &mut self.tweens, threshold);
        self.upper.recycle(&mut self.world, &mut self.tweens, threshold);
        self.floating.recycle(&mut self.world, &mut self.tweens, threshold);
        self.spawner.recycle_ground(&mut self.world, threshold);
        self.hit_stop.prune(&self.world);
        self.pipe_cut.prune(&self.world);

        if self.player.is_dead() && !self.game_over {
            self.on_death(now);
        }
    }

    fn apply_action(&mut self, action: Action, now: u64) {
        match action {
            Action::HitStopResume => {
                let end = self
                    .hit_stop
                    .resume(&mut self.world, &mut self.scheduler, &mut self.tweens, now);
                // The forward-burst reward lives here, not in the controller
                if end == Some(FreezeEnd::StartDash) && !self.game_over {
                    self.player
                        .start_dash(&mut self.world, &mut self.scheduler, &self.tuning, now);
                }
            }
            Action::PipeCutResume => {
                self.pipe_cut.resume(
                    &mut self.world,
                    &mut self.tweens,
                    self.player.body,
                    self.tuning.run_speed,
                );
            }
            Action::ChainFall {
                kind,
                column,
                row,
                col,
                trigger,
            } => {
                let mgr = match kind {
                    ColumnKind::Upper => &mut self.upper,
                    ColumnKind::Lower => &mut self.lower,
                    ColumnKind::Floating => &mut self.floating,
                };
                mgr.run_chain_fall(
                    &mut self.world,
                    &mut self.scheduler,
                    &mut self.tweens,
                    &self.tuning,
                    now,
                    column,
                    row,
                    col,
                    trigger,
                );
            }
            Action::GravityBoost { body } => {
                if let Some(b) = self.world.get_mut(body) {
                    b.gravity.y *= self.tuning.gravity_boost_factor;
                }
            }
            Action::FadePoll { body, fade_ms } => match self.world.get(body) {
                None => {}
                // The upward pop must visually complete before the fade
                Some(b) if b.vel.y > 0.0 => {
                    self.tweens
                        .animate(&self.world, body, TweenProp::Alpha, 0.0, fade_ms);
                }
                Some(_) => {
                    self.scheduler
                        .after(now, FADE_POLL_MS, Action::FadePoll { body, fade_ms });
                }
            },
            Action::CooldownExpire => self.player.on_cooldown_expired(),
            Action::InvincibilityExpire => self.player.on_invincibility_expired(&mut self.world),
            Action::FlashToggle => {
                self.player
                    .on_flash_toggle(&mut self.world, &mut self.scheduler, now);
            }
            Action::SpawnAttackHitbox => {
                self.player.on_first_frame_done(
                    &mut self.world,
                    &mut self.hitboxes,
                    &mut self.hit_stop,
                    &mut self.pipe_cut,
                );
            }
            Action::SwingComplete => {
                self.player.on_swing_complete(
                    &mut self.world,
                    &mut self.scheduler,
                    &mut self.hitboxes,
                    &mut self.hit_stop,
                    &mut self.pipe_cut,
                    now,
                );
            }
            Action::HoldRecheck => {
                self.player.on_hold_recheck(
                    &mut self.world,
                    &mut self.scheduler,
                    &mut self.hitboxes,
                    &mut self.hit_stop,
                    &mut self.pipe_cut,
                    now,
                );
            }
            Action::DashEnd => self.player.on_dash_end(&mut self.world, &self.tuning),
        }
    }

    fn process_overlaps(&mut self, now: u64) {
        let Some(player_aabb) = self.world.get(self.player.body).map(Body::aabb) else {
            return;
        };

        // Lazy grid generation: both forward probes reveal the cubes behind
        // a placeholder the moment they touch its grid sensor.
        self.lazy_generate(self.hitboxes.lookahead);
        if let Some(prox) = self.hitboxes.proximity {
            self.lazy_generate(prox);
        }

        // Proximity path: the hit-stop gate. Conditions are read before any
        // mutation; a failed gate leaves the hitbox and flags untouched.
        if let Some(prox) = self.hitboxes.proximity
            && let Some(probe) = self.world.get(prox).map(Body::aabb)
        {
            let gate_open = self.player.jump_count() == 1
                && !self.player.hitstop_triggered_this_swing()
                && !self.player.hitstop_cooldown_active
                && !self.hit_stop.is_active();
            if gate_open {
                let contact = self
                    .world
                    .overlapping_group(&probe, BodyGroup::Cube)
                    .into_iter()
                    .find_map(|b| self.locate_cube_any(b).filter(|_| self.cube_can_damage(b)));
                if let Some((kind, column, _, _)) = contact {
                    let mgr = match kind {
                        ColumnKind::Upper => &mut self.upper,
                        ColumnKind::Lower => &mut self.lower,
                        ColumnKind::Floating => &mut self.floating,
                    };
                    // Area denial first so the column can't double-trigger
                    mgr.disable_column_cubes(column);
                    self.player.mark_hitstop_triggered();
                    self.player
                        .arm_cooldown(&mut self.scheduler, now, self.tuning.hitstop_cooldown_ms);
                    let timers = self.player.pausable_timers();
                    self.hit_stop.trigger(
                        &mut self.world,
                        &mut self.scheduler,
                        &mut self.tweens,
                        now,
                        &timers,
                        self.tuning.hit_stop_ms,
                        Some(FreezeEnd::StartDash),
                    );
                    // Self-destroys on first success: one freeze per swing
                    self.hitboxes.destroy_proximity_hitbox(
                        &mut self.world,
                        &mut self.hit_stop,
                        &mut self.pipe_cut,
                    );
                }
            }
        }

        // Attack destruction, extended to the full cutting reach while the
        // swing frame is held
        if let Some(attack) = self.hitboxes.attack
            && let Some(body) = self.world.get(attack)
        {
            let reach = if self.player.is_holding_swing_frame() {
                self.hitboxes.cutting_reach(&self.world, player_aabb)
            } else {
                body.aabb()
            };
            for cube in self.world.overlapping_group(&reach, BodyGroup::Cube) {
                self.strike_cube(cube, ChainTrigger::Attack, now);
            }
        }

        // Dash contacts destroy but never damage
        if self.player.dashing {
            for cube in self.world.overlapping_group(&player_aabb, BodyGroup::Cube) {
                self.strike_cube(cube, ChainTrigger::Dash, now);
            }
        }

        // Landing on a platform cap or ground slab restores the jump budget
        if self
            .world
            .get(self.player.body)
            .is_some_and(|b| b.vel.y > 0.0)
        {
            let sensor = self
                .world
                .overlapping_group(&player_aabb, BodyGroup::PlatformSensor)
                .into_iter()
                .chain(self.world.overlapping_group(&player_aabb, BodyGroup::Ground))
                .next();
            if let Some(sensor) = sensor {
                let top = self.world.get(sensor).map(|b| b.aabb().min.y);
                if let Some(top) = top
                    && let Some(p) = self.world.get_mut(self.player.body)
                {
                    p.pos.y = top - p.size.y / 2.0;
                    p.vel.y = 0.0;
                }
                self.player.land();
                // Floating columns track their single ledge grab
                let grabbed = self
                    .floating
                    .columns()
                    .iter()
                    .find(|c| c.platform_sensor == sensor)
                    .map(|c| c.id);
                if let Some(id) = grabbed
                    && let Some(column) = self.floating.column_mut(id)
                    && !column.ledge_grab_used
                {
                    column.ledge_grab_used = true;
                }
            }
        }

        // Damage contact last, after all gating flags settled this tick
        if self.player.vulnerable() {
            let contact = self
                .world
                .overlapping_group(&player_aabb, BodyGroup::Cube)
                .into_iter()
                .find(|&b| self.cube_can_damage(b));
            if contact.is_some() {
                self.player.take_hit(&mut self.world, &mut self.scheduler, now);
            }
        }
    }

    /// Reveal the grid of every hazard column whose sensor `probe` touches
    fn lazy_generate(&mut self, probe: BodyId) {
        let Some(aabb) = self.world.get(probe).map(Body::aabb) else {
            return;
        };
        for sensor in self.world.overlapping_group(&aabb, BodyGroup::GridSensor) {
            for kind in [ColumnKind::Lower, ColumnKind::Upper] {
                let mgr = match kind {
                    ColumnKind::Upper => &mut self.upper,
                    _ => &mut self.lower,
                };
                let Some(id) = mgr.column_by_grid_sensor(sensor) else {
                    continue;
                };
                let already = mgr.column(id).is_some_and(|c| c.grid.is_some());
                mgr.generate_grid(&mut self.world, id);
                if already {
                    continue;
                }
                // Fresh cubes join the freeze controllers' registered
                // sets, along with the platform sensor that may tip over
                // and fall with them
                if let Some(column) = mgr.column(id)
                    && let Some(grid) = &column.grid
                {
                    self.hit_stop.register(column.platform_sensor);
                    self.pipe_cut.register(column.platform_sensor);
                    for cube in grid.cubes() {
                        self.hit_stop.register(cube.body);
                        self.pipe_cut.register(cube.body);
                    }
                }
            }
        }
    }

    /// Destroy one cube through the attack/dash path: outward impulse and
    /// fade, column-wide area denial, deferred chain-fall, and (for direct
    /// attacks on a fresh cube) the short pipe-cut freeze.
    fn strike_cube(&mut self, cube: BodyId, trigger: ChainTrigger, now: u64) -> bool {
        let Some((kind, column_id, row, col)) = self.locate_cube_any(cube) else {
            return false;
        };
        let fresh = self.world.get(cube).is_some_and(|b| b.alpha >= 1.0);
        let (impulse_x, impulse_y, fade_ms) = match trigger {
            ChainTrigger::Attack => (
                self.tuning.attack_impulse_x,
                self.tuning.attack_impulse_y,
                self.tuning.attack_fade_ms,
            ),
            _ => (
                self.tuning.chain_impulse_x,
                self.tuning.chain_impulse_y,
                self.tuning.chain_fade_ms,
            ),
        };

        let mgr = match kind {
            ColumnKind::Upper => &mut self.upper,
            ColumnKind::Lower => &mut self.lower,
            ColumnKind::Floating => &mut self.floating,
        };
        let Some(column) = mgr.column_mut(column_id) else {
            return false;
        };
        let Some(grid) = column.grid.as_mut() else {
            return false;
        };
        let destroyed = grid.hit_cube(
            &mut self.world,
            &mut self.tweens,
            &mut self.rng,
            row,
            col,
            impulse_x,
            impulse_y,
            fade_ms,
        );
        if !destroyed {
            return false;
        }
        if trigger == ChainTrigger::Attack
            && let Some(c) = grid.cube_at_mut(row, col)
        {
            c.was_attacked = true;
        }
        grid.disable_all();
        mgr.schedule_chain_fall(
            &mut self.scheduler,
            now,
            self.tuning.chain_fall_delay_ms,
            column_id,
            row,
            col,
            trigger,
        );

        if trigger == ChainTrigger::Attack {
            self.player.note_cube_struck(now);
            // The swing consumed its freeze: close the proximity gate so
            // the other path can't fire a second one this cycle
            self.player.mark_hitstop_triggered();
            self.hitboxes.destroy_proximity_hitbox(
                &mut self.world,
                &mut self.hit_stop,
                &mut self.pipe_cut,
            );
            if fresh {
                self.pipe_cut.trigger(
                    &mut self.world,
                    &mut self.scheduler,
                    &mut self.tweens,
                    now,
                    self.tuning.pipe_cut_freeze_ms,
                );
            }
        }
        true
    }

    fn locate_cube_any(&self, body: BodyId) -> Option<(ColumnKind, ColumnId, usize, usize)> {
        if let Some((id, row, col)) = self.lower.locate_cube(body) {
            return Some((ColumnKind::Lower, id, row, col));
        }
        if let Some((id, row, col)) = self.upper.locate_cube(body) {
            return Some((ColumnKind::Upper, id, row, col));
        }
        None
    }

    fn cube_can_damage(&self, body: BodyId) -> bool {
        let Some((kind, column, row, col)) = self.locate_cube_any(body) else {
            return false;
        };
        let mgr = match kind {
            ColumnKind::Upper => &self.upper,
            ColumnKind::Lower => &self.lower,
            ColumnKind::Floating => &self.floating,
        };
        mgr.column(column)
            .and_then(|c| c.grid.as_ref())
            .and_then(|g| g.cube_at(row, col))
            .is_some_and(|c| c.can_damage)
    }

    /// Terminal transition: every revealed grid crumbles, rotations
    /// suppressed. The external scene owns the restart flow.
    fn on_death(&mut self, now: u64) {
        self.game_over = true;
        log::info!("player died at tick {now}");
        for kind in [ColumnKind::Lower, ColumnKind::Upper] {
            let mgr = match kind {
                ColumnKind::Upper => &mut self.upper,
                _ => &mut self.lower,
            };
            let revealed: Vec<ColumnId> = mgr
                .columns()
                .iter()
                .filter(|c| c.grid.is_some())
                .map(|c| c.id)
                .collect();
            for id in revealed {
                mgr.disable_column_cubes(id);
                // A game-over pass covers every row; the hit row is moot
                for col in 0..GRID_COLS {
                    mgr.schedule_chain_fall(
                        &mut self.scheduler,
                        now,
                        self.tuning.chain_fall_delay_ms,
                        id,
                        0,
                        col,
                        ChainTrigger::GameOver,
                    );
                }
            }
        }
    }
}

fn default_templates() -> Vec<ChunkTemplate> {
    vec![
        ChunkTemplate {
            entries: vec![
                ChunkEntry { kind: EntryKind::Ground, rel_x: 0.0, rel_y: 320.0, height_px: 24.0 },
                ChunkEntry { kind: EntryKind::Ground, rel_x: 128.0, rel_y: 320.0, height_px: 24.0 },
                ChunkEntry { kind: EntryKind::Lower, rel_x: 192.0, rel_y: 224.0, height_px: 96.0 },
            ],
        },
        ChunkTemplate {
            entries: vec![
                ChunkEntry { kind: EntryKind::Upper, rel_x: 64.0, rel_y: 0.0, height_px: 112.0 },
                ChunkEntry { kind: EntryKind::Lower, rel_x: 64.0, rel_y: 208.0, height_px: 112.0 },
                ChunkEntry { kind: EntryKind::Ground, rel_x: 0.0, rel_y: 320.0, height_px: 24.0 },
            ],
        },
        ChunkTemplate {
            entries: vec![
                ChunkEntry { kind: EntryKind::Floating, rel_x: 96.0, rel_y: 192.0, height_px: 16.0 },
                ChunkEntry { kind: EntryKind::Ground, rel_x: 64.0, rel_y: 320.0, height_px: 24.0 },
            ],
        },
    ]
}
