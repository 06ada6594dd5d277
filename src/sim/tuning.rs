//! Data-driven combat tuning
//!
//! Every documented duration and impulse range, collected in one
//! serde-friendly struct so balance passes don't need a recompile. Defaults
//! mirror the `consts` module. The attack fade and chain fade are separate
//! fields on purpose: nothing says they must stay equal.

use serde::{Deserialize, Serialize};

use crate::consts::*;

/// Inclusive impulse range, px/s
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpulseRange {
    pub min: f32,
    pub max: f32,
}

impl ImpulseRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }
}

/// Combat tuning values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Main hit-stop freeze, ms
    pub hit_stop_ms: u32,
    /// Pipe-cut freeze, ms
    pub pipe_cut_freeze_ms: u32,
    /// Fade applied by a direct attack, ms
    pub attack_fade_ms: u32,
    /// Fade applied to chain-fall cubes, ms
    pub chain_fade_ms: u32,
    /// Defer between a hit and its chain-fall pass, ms
    pub chain_fall_delay_ms: u32,
    /// Defer before the chain gravity multiplier, ms
    pub gravity_boost_delay_ms: u32,
    pub gravity_boost_factor: f32,
    /// Hit-stop cooldown on the proximity path, ms
    pub hitstop_cooldown_ms: u32,
    /// Hit-stop cooldown refreshed at dash start, ms
    pub hitstop_cooldown_dash_ms: u32,
    pub invincibility_ms: u32,
    pub dash_ms: u32,
    pub dash_speed: f32,
    pub run_speed: f32,
    /// Outward impulse from a direct attack
    pub attack_impulse_x: ImpulseRange,
    pub attack_impulse_y: ImpulseRange,
    /// Scatter impulse from chain/dash triggers
    pub chain_impulse_x: ImpulseRange,
    pub chain_impulse_y: ImpulseRange,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            hit_stop_ms: HIT_STOP_MS,
            pipe_cut_freeze_ms: PIPE_CUT_FREEZE_MS,
            attack_fade_ms: ATTACK_FADE_MS,
            chain_fade_ms: CHAIN_FADE_MS,
            chain_fall_delay_ms: CHAIN_FALL_DELAY_MS,
            gravity_boost_delay_ms: GRAVITY_BOOST_DELAY_MS,
            gravity_boost_factor: GRAVITY_BOOST_FACTOR,
            hitstop_cooldown_ms: HITSTOP_COOLDOWN_MS,
            hitstop_cooldown_dash_ms: HITSTOP_COOLDOWN_DASH_MS,
            invincibility_ms: INVINCIBILITY_MS,
            dash_ms: DASH_MS,
            dash_speed: DASH_SPEED,
            run_speed: PLAYER_RUN_SPEED,
            attack_impulse_x: ImpulseRange::new(70.0, 110.0),
            attack_impulse_y: ImpulseRange::new(-170.0, -130.0),
            chain_impulse_x: ImpulseRange::new(-100.0, 100.0),
            chain_impulse_y: ImpulseRange::new(-150.0, -25.0),
        }
    }
}
