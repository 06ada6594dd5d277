//! Player combat state machine
//!
//! Swing phases, the one-shot hit-stop gate, the continuous-cut
//! ("holding the last swing frame") mode, dash and invincibility. The
//! machine owns its flags and timers; world queries and the overlap wiring
//! live in `combat`, which passes collaborators in explicitly.

use glam::Vec2;

use crate::consts::{
    CUBE_STRUCK_WINDOW_MS, FLASH_INTERVAL_MS, FULL_HEALTH, HOLD_RECHECK_MS,
    HOLD_TIMEOUT_AHEAD_MS, HOLD_TIMEOUT_CLEAR_MS, FLAP_IMPULSE_Y, MAX_JUMPS, SWING_FIRST_FRAME_MS,
    SWING_MS,
};
use crate::ms_to_ticks;
use crate::sim::body::{BodyId, World};
use crate::sim::hit_stop::{HitStopController, PipeCutFreeze};
use crate::sim::hitboxes::PlayerHitboxes;
use crate::sim::schedule::{Action, Scheduler, TimerId};
use crate::sim::tuning::Tuning;

/// Dimmed opacity while the invincibility flash is "off"
const FLASH_DIM_ALPHA: f32 = 0.3;
/// Per-tick decay of the dash overshoot toward run speed
const DASH_DECAY: f32 = 0.88;

/// Swing animation phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwingPhase {
    /// Not swinging (grounded or airborne)
    Idle,
    /// First animation frame playing; the hit-stop window
    FirstFrame,
    /// Rest of the swing animation
    Swinging,
    /// Last frame held: continuous-cut mode
    Holding,
}

/// The player's combat state
#[derive(Debug)]
pub struct PlayerCombat {
    pub body: BodyId,
    health: u8,
    pub invincible: bool,
    pub dashing: bool,
    phase: SwingPhase,
    /// One-shot per swing cycle; reset only when the jump counter returns
    /// to zero
    hitstop_triggered_this_swing: bool,
    /// Guards against re-entrant freezes while one is still resolving
    pub hitstop_cooldown_active: bool,
    cooldown_timer: Option<TimerId>,
    /// Consecutive mid-air jumps since last grounded
    jump_count: u8,
    last_cube_hit_tick: Option<u64>,
    flash_on: bool,
    /// The two well-known timers hit-stop pauses while the world is frozen
    pub attack_spawn_timer: Option<TimerId>,
    pub swing_complete_timer: Option<TimerId>,
    hold_recheck_timer: Option<TimerId>,
}

impl PlayerCombat {
    pub fn new(body: BodyId) -> Self {
        Self {
            body,
            health: FULL_HEALTH,
            invincible: false,
            dashing: false,
            phase: SwingPhase::Idle,
            hitstop_triggered_this_swing: false,
            hitstop_cooldown_active: false,
            cooldown_timer: None,
            jump_count: 0,
            last_cube_hit_tick: None,
            flash_on: false,
            attack_spawn_timer: None,
            swing_complete_timer: None,
            hold_recheck_timer: None,
        }
    }

    pub fn health(&self) -> u8 {
        self.health
    }

    pub fn is_dead(&self) -> bool {
        self.health == 0
    }

    pub fn phase(&self) -> SwingPhase {
        self.phase
    }

    pub fn is_holding_swing_frame(&self) -> bool {
        self.phase == SwingPhase::Holding
    }

    pub fn jump_count(&self) -> u8 {
        self.jump_count
    }

    pub fn hitstop_triggered_this_swing(&self) -> bool {
        self.hitstop_triggered_this_swing
    }

    /// Timers hit-stop may pause, in a fixed order
    pub fn pausable_timers(&self) -> Vec<TimerId> {
        [self.attack_spawn_timer, self.swing_complete_timer]
            .into_iter()
            .flatten()
            .collect()
    }

    /// Flap input.
    ///
    /// Normal path: consume a jump, apply the upward impulse, start the
    /// swing and spawn the proximity hitbox. While holding the swing frame:
    /// restart the animation without tearing down the attack hitbox if the
    /// path ahead is still blocked, otherwise exit holding first and treat
    /// this as a fresh flap. Returns true if a swing (re)started.
    pub fn flap(
        &mut self,
        world: &mut World,
        scheduler: &mut Scheduler,
        hitboxes: &mut PlayerHitboxes,
        hit_stop: &mut HitStopController,
        pipe_cut: &mut PipeCutFreeze,
        now: u64,
    ) -> bool {
        if self.dashing || self.invincible || self.is_dead() {
            return false;
        }

        if self.phase == SwingPhase::Holding {
            if self.jump_count < MAX_JUMPS && hitboxes.something_ahead(world) {
                // Restart the swing from frame one, stay in cutting mode
                self.jump_count += 1;
                self.apply_flap_impulse(world);
                if let Some(t) = self.swing_complete_timer.take() {
                    scheduler.cancel(t);
                }
                self.swing_complete_timer =
                    Some(scheduler.after(now, SWING_MS, Action::SwingComplete));
                return true;
            }
            self.exit_holding(world, scheduler, hitboxes, hit_stop, pipe_cut);
            // fall through to a fresh flap
        }

        if self.phase != SwingPhase::Idle || self.jump_count >= MAX_JUMPS {
            return false;
        }

        self.jump_count += 1;
        self.phase = SwingPhase::FirstFrame;
        self.apply_flap_impulse(world);
        hitboxes.create_proximity_hitbox(world, hit_stop, pipe_cut, self.pos(world));

        self.attack_spawn_timer =
            Some(scheduler.after(now, SWING_FIRST_FRAME_MS, Action::SpawnAttackHitbox));
        self.swing_complete_timer = Some(scheduler.after(now, SWING_MS, Action::SwingComplete));
        true
    }

    fn pos(&self, world: &World) -> Vec2 {
        world.get(self.body).map(|b| b.pos).unwrap_or(Vec2::ZERO)
    }

    fn apply_flap_impulse(&self, world: &mut World) {
        if let Some(body) = world.get_mut(self.body) {
            body.vel.y = FLAP_IMPULSE_Y;
        }
    }

    /// The external jump counter returned to zero: reset the budget and the
    /// one-shot hit-stop flag.
    pub fn land(&mut self) {
        self.jump_count = 0;
        self.hitstop_triggered_this_swing = false;
    }

    /// Record a cube strike (keeps the swing frame held)
    pub fn note_cube_struck(&mut self, now: u64) {
        self.last_cube_hit_tick = Some(now);
    }

    /// Whether a cube was struck within the last `window_ms`
    pub fn struck_within(&self, now: u64, window_ms: u32) -> bool {
        self.last_cube_hit_tick
            .is_some_and(|t| now.saturating_sub(t) <= ms_to_ticks(window_ms))
    }

    /// First swing frame finished. The attack hitbox spawns only if no
    /// hit-stop fired this swing: exactly one of the two paths runs.
    pub fn on_first_frame_done(
        &mut self,
        world: &mut World,
        hitboxes: &mut PlayerHitboxes,
        hit_stop: &mut HitStopController,
        pipe_cut: &mut PipeCutFreeze,
    ) {
        self.attack_spawn_timer = None;
        if self.phase != SwingPhase::FirstFrame {
            return;
        }
        self.phase = SwingPhase::Swinging;
        if !self.hitstop_triggered_this_swing {
            hitboxes.create_attack_hitbox(world, hit_stop, pipe_cut, self.pos(world));
        }
    }

    /// Swing animation completed. Holds the last frame if a cube was struck
    /// recently enough, otherwise tears the swing down.
    pub fn on_swing_complete(
        &mut self,
        world: &mut World,
        scheduler: &mut Scheduler,
        hitboxes: &mut PlayerHitboxes,
        hit_stop: &mut HitStopController,
        pipe_cut: &mut PipeCutFreeze,
        now: u64,
    ) {
        self.swing_complete_timer = None;
        if !matches!(self.phase, SwingPhase::FirstFrame | SwingPhase::Swinging) {
            return;
        }
        if self.struck_within(now, CUBE_STRUCK_WINDOW_MS) {
            self.phase = SwingPhase::Holding;
            self.hold_recheck_timer =
                Some(scheduler.after(now, HOLD_RECHECK_MS, Action::HoldRecheck));
        } else {
            self.phase = SwingPhase::Idle;
            hitboxes.destroy_attack_hitbox(world, hit_stop, pipe_cut);
            hitboxes.destroy_proximity_hitbox(world, hit_stop, pipe_cut);
        }
    }

    /// Periodic continuous-cut re-check. `something_ahead` is the manual
    /// look-ahead probe result for this tick. Returns true if holding
    /// continues (the caller keeps cutting), false once the state exits.
    ///
    /// The timeout is asymmetric: 500 ms while something is still detected
    /// ahead so the state lingers through a run of cubes, 20 ms once the
    /// path is clear so it snaps back quickly.
    pub fn on_hold_recheck(
        &mut self,
        world: &mut World,
        scheduler: &mut Scheduler,
        hitboxes: &mut PlayerHitboxes,
        hit_stop: &mut HitStopController,
        pipe_cut: &mut PipeCutFreeze,
        now: u64,
    ) -> bool {
        self.hold_recheck_timer = None;
        if self.phase != SwingPhase::Holding {
            return false;
        }
        let ahead = hitboxes.something_ahead(world);
        let timeout_ms = if ahead {
            HOLD_TIMEOUT_AHEAD_MS
        } else {
            HOLD_TIMEOUT_CLEAR_MS
        };
        if !ahead && !self.struck_within(now, timeout_ms) {
            self.exit_holding(world, scheduler, hitboxes, hit_stop, pipe_cut);
            return false;
        }
        self.hold_recheck_timer = Some(scheduler.after(now, HOLD_RECHECK_MS, Action::HoldRecheck));
        true
    }

    fn exit_holding(
        &mut self,
        world: &mut World,
        scheduler: &mut Scheduler,
        hitboxes: &mut PlayerHitboxes,
        hit_stop: &mut HitStopController,
        pipe_cut: &mut PipeCutFreeze,
    ) {
        self.phase = SwingPhase::Idle;
        if let Some(t) = self.hold_recheck_timer.take() {
            scheduler.cancel(t);
        }
        hitboxes.destroy_attack_hitbox(world, hit_stop, pipe_cut);
        hitboxes.destroy_proximity_hitbox(world, hit_stop, pipe_cut);
    }

    /// Can a hazard contact deal damage right now?
    pub fn vulnerable(&self) -> bool {
        self.phase == SwingPhase::Idle && !self.dashing && !self.invincible && !self.is_dead()
    }

    /// Apply one point of damage. Returns true if this kills the player.
    ///
    /// The caller is responsible for gating on [`Self::vulnerable`]; calling
    /// this while invincible is a guarded no-op.
    pub fn take_hit(&mut self, world: &mut World, scheduler: &mut Scheduler, now: u64) -> bool {
        if self.invincible || self.is_dead() {
            return false;
        }
        self.health -= 1;
        if let Some(body) = world.get_mut(self.body) {
            body.vel.y = 0.0;
        }
        if self.health == 0 {
            return true;
        }
        self.invincible = true;
        self.flash_on = true;
        scheduler.after(now, crate::consts::INVINCIBILITY_MS, Action::InvincibilityExpire);
        scheduler.after(now, FLASH_INTERVAL_MS, Action::FlashToggle);
        false
    }

    pub fn on_invincibility_expired(&mut self, world: &mut World) {
        self.invincible = false;
        self.flash_on = false;
        if let Some(body) = world.get_mut(self.body) {
            body.alpha = 1.0;
        }
    }

    /// Alternating-opacity flash while invincible; stops rescheduling once
    /// the window expires.
    pub fn on_flash_toggle(&mut self, world: &mut World, scheduler: &mut Scheduler, now: u64) {
        if !self.invincible {
            return;
        }
        self.flash_on = !self.flash_on;
        if let Some(body) = world.get_mut(self.body) {
            body.alpha = if self.flash_on { 1.0 } else { FLASH_DIM_ALPHA };
        }
        scheduler.after(now, FLASH_INTERVAL_MS, Action::FlashToggle);
    }

    /// Arm (or refresh) the hit-stop cooldown window
    pub fn arm_cooldown(&mut self, scheduler: &mut Scheduler, now: u64, duration_ms: u32) {
        if let Some(t) = self.cooldown_timer.take() {
            scheduler.cancel(t);
        }
        self.hitstop_cooldown_active = true;
        self.cooldown_timer = Some(scheduler.after(now, duration_ms, Action::CooldownExpire));
    }

    pub fn on_cooldown_expired(&mut self) {
        self.hitstop_cooldown_active = false;
        self.cooldown_timer = None;
    }

    /// Latch the one-shot hit-stop flag for this swing
    pub fn mark_hitstop_triggered(&mut self) {
        self.hitstop_triggered_this_swing = true;
    }

    /// Enter the dash reward. Only ever called from the hit-stop completion
    /// path. Refreshes the cooldown so a second freeze can't fire while the
    /// dash is still playing out.
    pub fn start_dash(
        &mut self,
        world: &mut World,
        scheduler: &mut Scheduler,
        tuning: &Tuning,
        now: u64,
    ) {
        self.dashing = true;
        if let Some(body) = world.get_mut(self.body) {
            body.vel.x = tuning.dash_speed;
        }
        scheduler.after(now, tuning.dash_ms, Action::DashEnd);
        self.arm_cooldown(scheduler, now, tuning.hitstop_cooldown_dash_ms);
    }

    /// Per-tick dash speed decay toward the nominal run speed
    pub fn dash_update(&mut self, world: &mut World, tuning: &Tuning) {
        if !self.dashing {
            return;
        }
        if let Some(body) = world.get_mut(self.body) {
            body.vel.x = tuning.run_speed + (body.vel.x - tuning.run_speed) * DASH_DECAY;
        }
    }

    pub fn on_dash_end(&mut self, world: &mut World, tuning: &Tuning) {
        self.dashing = false;
        if let Some(body) = world.get_mut(self.body) {
            body.vel.x = tuning.run_speed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::body::{Body, BodyGroup};

    struct Rig {
        world: World,
        scheduler: Scheduler,
        hit_stop: HitStopController,
        pipe_cut: PipeCutFreeze,
        hitboxes: PlayerHitboxes,
        player: PlayerCombat,
    }

    fn rig() -> Rig {
        let mut world = World::new();
        let body = world.spawn(Body::new(
            Vec2::new(0.0, 100.0),
            Vec2::new(34.0, 24.0),
            BodyGroup::Player,
        ));
        let mut hit_stop = HitStopController::new();
        let mut pipe_cut = PipeCutFreeze::new();
        hit_stop.register(body);
        pipe_cut.register(body);
        let hitboxes =
            PlayerHitboxes::new(&mut world, &mut hit_stop, &mut pipe_cut, Vec2::new(0.0, 100.0));
        Rig {
            world,
            scheduler: Scheduler::new(),
            hit_stop,
            pipe_cut,
            hitboxes,
            player: PlayerCombat::new(body),
        }
    }

    impl Rig {
        fn flap(&mut self, now: u64) -> bool {
            self.player.flap(
                &mut self.world,
                &mut self.scheduler,
                &mut self.hitboxes,
                &mut self.hit_stop,
                &mut self.pipe_cut,
                now,
            )
        }
    }

    #[test]
    fn test_flap_starts_swing_and_spawns_proximity() {
        let mut r = rig();
        assert!(r.flap(0));
        assert_eq!(r.player.phase(), SwingPhase::FirstFrame);
        assert_eq!(r.player.jump_count(), 1);
        assert!(r.hitboxes.proximity.is_some());
        assert_eq!(r.world.get(r.player.body).unwrap().vel.y, FLAP_IMPULSE_Y);
        // Both swing timers armed
        assert_eq!(r.player.pausable_timers().len(), 2);
    }

    #[test]
    fn test_jump_budget_capped_at_three() {
        let mut r = rig();
        for i in 0..3 {
            assert!(r.flap(i));
            // finish each swing so the next flap is allowed
            r.player.phase = SwingPhase::Idle;
        }
        assert_eq!(r.player.jump_count(), 3);
        assert!(!r.flap(10));
        r.player.land();
        assert_eq!(r.player.jump_count(), 0);
        assert!(r.flap(11));
    }

    #[test]
    fn test_flap_ignored_while_dashing_or_invincible() {
        let mut r = rig();
        r.player.dashing = true;
        assert!(!r.flap(0));
        r.player.dashing = false;
        r.player.invincible = true;
        assert!(!r.flap(1));
    }

    #[test]
    fn test_attack_spawns_only_without_hitstop() {
        // Proximity fire and attack hitbox are mutually exclusive per swing
        let mut r = rig();
        r.flap(0);
        r.player.mark_hitstop_triggered();
        r.player.on_first_frame_done(
            &mut r.world,
            &mut r.hitboxes,
            &mut r.hit_stop,
            &mut r.pipe_cut,
        );
        assert!(r.hitboxes.attack.is_none());

        let mut r = rig();
        r.flap(0);
        r.player.on_first_frame_done(
            &mut r.world,
            &mut r.hitboxes,
            &mut r.hit_stop,
            &mut r.pipe_cut,
        );
        assert!(r.hitboxes.attack.is_some());
    }

    #[test]
    fn test_swing_complete_holds_after_recent_strike() {
        let mut r = rig();
        r.flap(0);
        r.player.on_first_frame_done(
            &mut r.world,
            &mut r.hitboxes,
            &mut r.hit_stop,
            &mut r.pipe_cut,
        );
        let now = ms_to_ticks(280);
        r.player.note_cube_struck(now - 2);
        r.player.on_swing_complete(
            &mut r.world,
            &mut r.scheduler,
            &mut r.hitboxes,
            &mut r.hit_stop,
            &mut r.pipe_cut,
            now,
        );
        assert!(r.player.is_holding_swing_frame());
        // Attack hitbox stays alive in cutting mode
        assert!(r.hitboxes.attack.is_some());
    }

    #[test]
    fn test_swing_complete_without_strike_tears_down() {
        let mut r = rig();
        r.flap(0);
        r.player.on_first_frame_done(
            &mut r.world,
            &mut r.hitboxes,
            &mut r.hit_stop,
            &mut r.pipe_cut,
        );
        let now = ms_to_ticks(280);
        r.player.on_swing_complete(
            &mut r.world,
            &mut r.scheduler,
            &mut r.hitboxes,
            &mut r.hit_stop,
            &mut r.pipe_cut,
            now,
        );
        assert_eq!(r.player.phase(), SwingPhase::Idle);
        assert!(r.hitboxes.attack.is_none());
        assert!(r.hitboxes.proximity.is_none());
    }

    #[test]
    fn test_hold_exits_quickly_once_path_clear() {
        let mut r = rig();
        r.player.phase = SwingPhase::Holding;
        r.player.note_cube_struck(0);
        // Nothing ahead, last strike long past the 20 ms clear timeout
        let now = ms_to_ticks(100);
        let holding = r.player.on_hold_recheck(
            &mut r.world,
            &mut r.scheduler,
            &mut r.hitboxes,
            &mut r.hit_stop,
            &mut r.pipe_cut,
            now,
        );
        assert!(!holding);
        assert_eq!(r.player.phase(), SwingPhase::Idle);
    }

    #[test]
    fn test_hold_lingers_while_something_ahead() {
        let mut r = rig();
        r.player.phase = SwingPhase::Holding;
        r.player.note_cube_struck(0);
        // Park an active cube inside the look-ahead probe
        r.hitboxes.update_positions(&mut r.world, Vec2::new(0.0, 100.0));
        r.world.spawn(Body::new(
            Vec2::new(crate::consts::LOOKAHEAD_OFFSET_X, 100.0),
            Vec2::splat(16.0),
            BodyGroup::Cube,
        ));
        let now = ms_to_ticks(100);
        let holding = r.player.on_hold_recheck(
            &mut r.world,
            &mut r.scheduler,
            &mut r.hitboxes,
            &mut r.hit_stop,
            &mut r.pipe_cut,
            now,
        );
        assert!(holding);
        assert!(r.player.is_holding_swing_frame());
    }

    #[test]
    fn test_take_hit_at_one_health_is_death() {
        let mut r = rig();
        r.player.health = 1;
        let dead = r.player.take_hit(&mut r.world, &mut r.scheduler, 0);
        assert!(dead);
        assert_eq!(r.player.health(), 0);
        assert!(r.player.is_dead());
    }

    #[test]
    fn test_take_hit_grants_invincibility_and_zeroes_vy() {
        let mut r = rig();
        r.world.get_mut(r.player.body).unwrap().vel.y = 300.0;
        let dead = r.player.take_hit(&mut r.world, &mut r.scheduler, 0);
        assert!(!dead);
        assert_eq!(r.player.health(), FULL_HEALTH - 1);
        assert!(r.player.invincible);
        assert_eq!(r.world.get(r.player.body).unwrap().vel.y, 0.0);
        // Guarded no-op while invincible
        assert!(!r.player.take_hit(&mut r.world, &mut r.scheduler, 1));
        assert_eq!(r.player.health(), FULL_HEALTH - 1);
    }

    #[test]
    fn test_flash_toggles_until_expiry() {
        let mut r = rig();
        r.player.take_hit(&mut r.world, &mut r.scheduler, 0);
        r.player.on_flash_toggle(&mut r.world, &mut r.scheduler, 5);
        assert_eq!(r.world.get(r.player.body).unwrap().alpha, FLASH_DIM_ALPHA);
        r.player.on_flash_toggle(&mut r.world, &mut r.scheduler, 10);
        assert_eq!(r.world.get(r.player.body).unwrap().alpha, 1.0);

        r.player.on_invincibility_expired(&mut r.world);
        assert!(!r.player.invincible);
        assert_eq!(r.world.get(r.player.body).unwrap().alpha, 1.0);
        // No more rescheduling after expiry
        let pending = r.scheduler.pending();
        r.player.on_flash_toggle(&mut r.world, &mut r.scheduler, 20);
        assert_eq!(r.scheduler.pending(), pending);
    }

    #[test]
    fn test_dash_decays_toward_run_speed() {
        let mut r = rig();
        let tuning = Tuning::default();
        r.player.start_dash(&mut r.world, &mut r.scheduler, &tuning, 0);
        assert!(r.player.dashing);
        assert!(r.player.hitstop_cooldown_active);
        assert_eq!(r.world.get(r.player.body).unwrap().vel.x, tuning.dash_speed);

        let mut last = tuning.dash_speed;
        for _ in 0..ms_to_ticks(tuning.dash_ms) {
            r.player.dash_update(&mut r.world, &tuning);
            let vx = r.world.get(r.player.body).unwrap().vel.x;
            assert!(vx <= last && vx >= tuning.run_speed);
            last = vx;
        }
        r.player.on_dash_end(&mut r.world, &tuning);
        assert!(!r.player.dashing);
        assert_eq!(r.world.get(r.player.body).unwrap().vel.x, tuning.run_speed);
    }

    #[test]
    fn test_cooldown_refresh_cancels_previous_timer() {
        // Only one expiry timer is ever live
        let mut r = rig();
        r.player.arm_cooldown(&mut r.scheduler, 0, 1000);
        r.player.arm_cooldown(&mut r.scheduler, 10, 1500);
        assert_eq!(r.scheduler.pending(), 1);
        assert!(r.player.hitstop_cooldown_active);
        r.player.on_cooldown_expired();
        assert!(!r.player.hitstop_cooldown_active);
    }
}
