//! Slashwing - destructible-grid combat core for a side-scrolling arcade game
//!
//! The player sprints through procedurally recycled obstacle columns built
//! from grids of small destructible cubes, slashing through them or dodging
//! past. This crate implements the combat resolution core:
//! - `sim::grid` / `sim::columns`: cube-grid generation, destruction and
//!   column-wise chain-fall propagation
//! - `sim::hit_stop`: freeze-frame controllers that pause and resume the
//!   whole moving world in lockstep
//! - `sim::hitboxes` / `sim::player`: the attack/detection hitbox lifecycle
//!   and the swing/dash/invincibility state machine
//! - `sim::combat`: the fixed-timestep orchestrator tying it all together
//!
//! Rendering, audio, input and persistence are external; the simulation is
//! pure and deterministic (fixed timestep, seeded RNG, stable ordering).

pub mod sim;

pub use sim::combat::{CombatSim, TickInput};
pub use sim::tuning::Tuning;

/// Game configuration constants
pub mod consts {
    /// Fixed simulation timestep (120 Hz)
    pub const SIM_DT: f32 = 1.0 / 120.0;
    /// Ticks per second
    pub const TICK_HZ: u32 = 120;

    /// Edge length of one destructible cube, pixels
    pub const CUBE_SIZE: f32 = 16.0;
    /// Column count of a hazard grid (pipe width in cubes)
    pub const GRID_COLS: usize = 4;
    /// Boundary column closest to the player for a lower-hazard grid
    pub const LOWER_BOUNDARY_COL: usize = 3;
    /// Boundary column closest to the player for an upper-hazard grid
    pub const UPPER_BOUNDARY_COL: usize = 0;

    /// Constant forward run speed the world pushes the player at, px/s
    pub const PLAYER_RUN_SPEED: f32 = 180.0;
    /// Player bounding box
    pub const PLAYER_WIDTH: f32 = 34.0;
    pub const PLAYER_HEIGHT: f32 = 24.0;
    /// Upward impulse applied on each flap, px/s
    pub const FLAP_IMPULSE_Y: f32 = -260.0;
    /// World gravity, px/s² (y-down)
    pub const GRAVITY_Y: f32 = 600.0;
    /// Mid-air jump budget
    pub const MAX_JUMPS: u8 = 3;
    /// Full player health
    pub const FULL_HEALTH: u8 = 4;

    /// Hit-stop freeze duration, ms
    pub const HIT_STOP_MS: u32 = 200;
    /// Pipe-cut freeze duration, ms (much shorter than hit-stop)
    pub const PIPE_CUT_FREEZE_MS: u32 = 10;
    /// Cube fade-out duration after a direct attack, ms
    pub const ATTACK_FADE_MS: u32 = 1000;
    /// Cube fade-out duration for chain-triggered falls, ms
    pub const CHAIN_FADE_MS: u32 = 1000;
    /// Delay between a hit and its chain-fall pass, ms
    pub const CHAIN_FALL_DELAY_MS: u32 = 50;
    /// Delay before the stronger gravity multiplier kicks in, ms
    pub const GRAVITY_BOOST_DELAY_MS: u32 = 100;
    /// Gravity multiplier applied to chain-falling cubes
    pub const GRAVITY_BOOST_FACTOR: f32 = 3.0;
    /// Retry interval while waiting for a falling cube's vy to turn positive, ms
    pub const FADE_POLL_MS: u32 = 50;
    /// Upward pop applied to lower-grid chain cubes, px/s
    pub const CHAIN_POP_VY: f32 = -50.0;

    /// Hit-stop cooldown after the proximity path fires, ms
    pub const HITSTOP_COOLDOWN_MS: u32 = 1000;
    /// Hit-stop cooldown refreshed when the reward dash starts, ms
    pub const HITSTOP_COOLDOWN_DASH_MS: u32 = 1500;

    /// Invincibility window after taking damage, ms
    pub const INVINCIBILITY_MS: u32 = 1000;
    /// Alternating-opacity flash interval while invincible, ms
    pub const FLASH_INTERVAL_MS: u32 = 40;

    /// Dash duration, ms
    pub const DASH_MS: u32 = 200;
    /// Initial dash speed, decays toward PLAYER_RUN_SPEED
    pub const DASH_SPEED: f32 = 420.0;

    /// Swing first-animation-frame duration, ms
    pub const SWING_FIRST_FRAME_MS: u32 = 80;
    /// Full swing animation duration, ms
    pub const SWING_MS: u32 = 280;
    /// Window after a cube strike that keeps the swing frame held, ms
    pub const CUBE_STRUCK_WINDOW_MS: u32 = 200;
    /// Periodic re-check interval while holding the swing frame, ms
    pub const HOLD_RECHECK_MS: u32 = 5;
    /// Hold timeout while something is still detected ahead, ms
    pub const HOLD_TIMEOUT_AHEAD_MS: u32 = 500;
    /// Hold timeout once the path is clear, ms
    pub const HOLD_TIMEOUT_CLEAR_MS: u32 = 20;

    /// Look-ahead hitbox lead distance, px
    pub const LOOKAHEAD_OFFSET_X: f32 = 48.0;

    /// Speed above which a cube migrates from the active to the falling pool
    pub const POOL_EPSILON: f32 = 1.0;

    /// How far ahead of the player new chunks materialize, px
    pub const SPAWN_LEAD: f32 = 480.0;
    /// How far behind the player a column must be before recycling, px
    pub const RECYCLE_MARGIN: f32 = 240.0;
}

/// Convert a millisecond duration to whole simulation ticks (ceiling, min 1)
#[inline]
pub fn ms_to_ticks(ms: u32) -> u64 {
    let ticks = (u64::from(ms) * u64::from(consts::TICK_HZ)).div_ceil(1000);
    ticks.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ms_to_ticks_known_durations() {
        assert_eq!(ms_to_ticks(200), 24); // hit-stop
        assert_eq!(ms_to_ticks(1000), 120); // fades
        assert_eq!(ms_to_ticks(50), 6); // chain defer / fade poll
        assert_eq!(ms_to_ticks(100), 12); // gravity boost delay
        assert_eq!(ms_to_ticks(10), 2); // pipe-cut freeze
    }

    #[test]
    fn test_ms_to_ticks_never_zero() {
        assert_eq!(ms_to_ticks(0), 1);
        assert_eq!(ms_to_ticks(1), 1);
        assert_eq!(ms_to_ticks(5), 1); // hold re-check is sub-tick at 120 Hz
    }
}
