//! Obstacle columns and chain-fall propagation
//!
//! A column is one obstacle unit: a fixed platform sensor the player can
//! stand on or be deflected by, plus (for the hazard variants) a lazily
//! populated cube grid behind a solid placeholder. Column kind is an
//! explicit discriminant; the managers never sniff sensor fields to decide
//! what a column is.
//!
//! The chain-fall pass is deliberately deferred 50 ms from the initiating
//! hit so the hit cube's own destruction registers first, and each chained
//! cube gets the pop-then-boost treatment: small upward pop, gravity
//! multiplier ×3 after 100 ms, fade held back until the body is actually
//! falling (vy > 0), polled on a 50 ms retry.

use glam::Vec2;

use crate::consts::{
    CHAIN_POP_VY, CUBE_SIZE, FADE_POLL_MS, GRAVITY_BOOST_DELAY_MS, GRAVITY_Y, GRID_COLS,
    LOWER_BOUNDARY_COL, UPPER_BOUNDARY_COL,
};
use crate::sim::body::{Body, BodyGroup, BodyId, World};
use crate::sim::grid::{ChainDirection, CubeGrid};
use crate::sim::schedule::{Action, Scheduler};
use crate::sim::tuning::Tuning;
use crate::sim::tween::{TweenProp, Tweens};

/// Thickness of the platform sensor cap, px
const PLATFORM_SENSOR_H: f32 = 8.0;
/// Platform tip-over rotation target (45°) and duration
const PLATFORM_ROT_RAD: f32 = std::f32::consts::FRAC_PI_4;
const PLATFORM_ROT_MS: u32 = 500;

/// Handle to a column owned by one manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnId(pub(crate) u32);

/// Obstacle column variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Hangs from the top of the screen; grid chains downward
    Upper,
    /// Rises from the floor; grid chains upward
    Lower,
    /// Grid-less platform the player can ledge-grab
    Floating,
}

impl ColumnKind {
    fn chain_direction(self) -> Option<ChainDirection> {
        match self {
            ColumnKind::Upper => Some(ChainDirection::TowardLastRow),
            ColumnKind::Lower => Some(ChainDirection::TowardRowZero),
            ColumnKind::Floating => None,
        }
    }

    /// Boundary column nearest the player's direction of travel
    fn boundary_col(self) -> Option<usize> {
        match self {
            ColumnKind::Upper => Some(UPPER_BOUNDARY_COL),
            ColumnKind::Lower => Some(LOWER_BOUNDARY_COL),
            ColumnKind::Floating => None,
        }
    }
}

/// What set a chain-fall in motion. Death and dash suppress the platform
/// tip-over rotation to avoid fighting other simultaneous animations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainTrigger {
    Attack,
    Dash,
    GameOver,
}

/// One obstacle unit
#[derive(Debug)]
pub struct Column {
    pub id: ColumnId,
    pub kind: ColumnKind,
    /// Top-left corner of the grid footprint (y-down)
    pub origin: Vec2,
    pub height_px: f32,
    pub platform_sensor: BodyId,
    pub grid_sensor: Option<BodyId>,
    /// Solid rectangle shown until the grid is revealed; destroyed exactly
    /// once, at generation
    pub placeholder: Option<BodyId>,
    pub grid: Option<CubeGrid>,
    /// Floating columns: one ledge grab per column
    pub ledge_grab_used: bool,
}

impl Column {
    pub fn width_px(&self) -> f32 {
        GRID_COLS as f32 * CUBE_SIZE
    }
}

/// Owns every column of one kind; there is one manager per [`ColumnKind`]
#[derive(Debug)]
pub struct ColumnManager {
    kind: ColumnKind,
    columns: Vec<Column>,
    next_id: u32,
}

impl ColumnManager {
    pub fn new(kind: ColumnKind) -> Self {
        Self {
            kind,
            columns: Vec::new(),
            next_id: 0,
        }
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn column_mut(&mut self, id: ColumnId) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.id == id)
    }

    /// Spawn a new column at `(x, y)` = top-left of its footprint.
    /// `height_px` is the pipe height for hazard variants, slab height for
    /// floating ones.
    pub fn create_column(&mut self, world: &mut World, x: f32, y: f32, height_px: f32) -> ColumnId {
        let id = ColumnId(self.next_id);
        self.next_id += 1;

        let width = GRID_COLS as f32 * CUBE_SIZE;
        let origin = Vec2::new(x, y);

        // Platform cap: top of a lower pipe, bottom of an upper pipe,
        // the whole slab for a floating column.
        let platform_center = match self.kind {
            ColumnKind::Lower => Vec2::new(x + width / 2.0, y - PLATFORM_SENSOR_H / 2.0),
            ColumnKind::Upper => Vec2::new(x + width / 2.0, y + height_px + PLATFORM_SENSOR_H / 2.0),
            ColumnKind::Floating => Vec2::new(x + width / 2.0, y + height_px / 2.0),
        };
        let platform_size = match self.kind {
            ColumnKind::Floating => Vec2::new(width, height_px),
            _ => Vec2::new(width, PLATFORM_SENSOR_H),
        };
        let platform_sensor = world.spawn(
            Body::new(platform_center, platform_size, BodyGroup::PlatformSensor).immovable(),
        );

        let (grid_sensor, placeholder) = if self.kind == ColumnKind::Floating {
            (None, None)
        } else {
            let footprint_center = Vec2::new(x + width / 2.0, y + height_px / 2.0);
            let footprint = Vec2::new(width, height_px);
            let sensor = world
                .spawn(Body::new(footprint_center, footprint, BodyGroup::GridSensor).immovable());
            let placeholder = world
                .spawn(Body::new(footprint_center, footprint, BodyGroup::Placeholder).immovable());
            (Some(sensor), Some(placeholder))
        };

        self.columns.push(Column {
            id,
            kind: self.kind,
            origin,
            height_px,
            platform_sensor,
            grid_sensor,
            placeholder,
            grid: None,
            ledge_grab_used: false,
        });
        id
    }

    /// Lazily populate a column's cube grid.
    ///
    /// Idempotent: a column that already has cubes returns immediately. A
    /// column kind without a grid (floating) is a precondition-skip, logged
    /// and ignored. The placeholder is destroyed exactly once, at the moment
    /// of generation.
    pub fn generate_grid(&mut self, world: &mut World, id: ColumnId) {
        let kind = self.kind;
        let Some(direction) = kind.chain_direction() else {
            log::debug!("grid generation requested on a {kind:?} column, skipping");
            return;
        };
        let Some(column) = self.column_mut(id) else {
            log::debug!("grid generation on unknown column {id:?}, skipping");
            return;
        };
        if column.grid.is_some() {
            return;
        }

        let grid = CubeGrid::generate(
            world,
            column.origin,
            column.width_px(),
            column.height_px,
            direction,
            kind == ColumnKind::Upper,
        );
        column.grid = Some(grid);

        if let Some(placeholder) = column.placeholder.take() {
            world.despawn(placeholder);
        }
    }

    /// Find the column whose grid sensor is `body`
    pub fn column_by_grid_sensor(&self, body: BodyId) -> Option<ColumnId> {
        self.columns
            .iter()
            .find(|c| c.grid_sensor == Some(body))
            .map(|c| c.id)
    }

    /// Find the column and (row, col) of the cube owning `body`
    pub fn locate_cube(&self, body: BodyId) -> Option<(ColumnId, usize, usize)> {
        for column in &self.columns {
            if let Some(grid) = &column.grid
                && let Some(cube) = grid.cube_by_body(body)
            {
                return Some((column.id, cube.row, cube.col));
            }
        }
        None
    }

    /// Clear `can_damage` across a whole column (area denial so one column
    /// can't double-trigger within a tick)
    pub fn disable_column_cubes(&mut self, id: ColumnId) {
        if let Some(column) = self.column_mut(id)
            && let Some(grid) = &mut column.grid
        {
            grid.disable_all();
        }
    }

    /// Defer a chain-fall pass by the configured delay so the initiating
    /// hit's own effects land first in the same tick.
    pub fn schedule_chain_fall(
        &self,
        scheduler: &mut Scheduler,
        now: u64,
        delay_ms: u32,
        column: ColumnId,
        row: usize,
        col: usize,
        trigger: ChainTrigger,
    ) {
        scheduler.after(
            now,
            delay_ms,
            Action::ChainFall {
                kind: self.kind,
                column,
                row,
                col,
                trigger,
            },
        );
    }

    /// Execute a deferred chain-fall pass.
    ///
    /// Every cube in column `col` with the qualifying row offset falls,
    /// except ones flagged `was_attacked` (destroyed by the player's own
    /// attack, already animating) and ones already departing in the falling
    /// pool. If the hit landed in the boundary column nearest the player,
    /// the platform sensor gets the same pop-then-fall treatment plus a 45°
    /// tip-over, unless the trigger was a death or a dash.
    #[allow(clippy::too_many_arguments)]
    pub fn run_chain_fall(
        &mut self,
        world: &mut World,
        scheduler: &mut Scheduler,
        tweens: &mut Tweens,
        tuning: &Tuning,
        now: u64,
        id: ColumnId,
        row: usize,
        col: usize,
        trigger: ChainTrigger,
    ) {
        let kind = self.kind;
        let Some(column) = self.column_mut(id) else {
            log::debug!("chain-fall on recycled column {id:?}, skipping");
            return;
        };
        let Some(grid) = &mut column.grid else {
            return;
        };

        let pop_vy = match grid.orientation {
            ChainDirection::TowardRowZero => CHAIN_POP_VY,
            ChainDirection::TowardLastRow => 0.0,
        };

        // A death crumbles the whole grid; the hit row only scopes the
        // normal directional pass
        let chain_rows = match trigger {
            ChainTrigger::GameOver => 0..grid.rows,
            _ => grid.chain_rows(row),
        };
        for r in chain_rows {
            let Some(cube) = grid.cube_at_mut(r, col) else {
                continue;
            };
            if cube.was_attacked {
                continue;
            }
            let body_id = cube.body;
            let Some(body) = world.get_mut(body_id) else {
                continue;
            };
            if body.pool == crate::sim::body::Pool::Falling {
                continue;
            }
            cube.can_damage = false;

            body.immovable = false;
            body.moves = true;
            body.gravity = Vec2::new(0.0, GRAVITY_Y);
            body.gravity_enabled = true;
            body.vel.y = pop_vy;

            scheduler.after(
                now,
                tuning.gravity_boost_delay_ms,
                Action::GravityBoost { body: body_id },
            );
            scheduler.after(
                now,
                FADE_POLL_MS,
                Action::FadePoll {
                    body: body_id,
                    fade_ms: tuning.chain_fade_ms,
                },
            );
        }

        if kind.boundary_col() == Some(col) {
            let sensor = column.platform_sensor;
            if let Some(body) = world.get_mut(sensor) {
                body.immovable = false;
                body.moves = true;
                body.gravity = Vec2::new(0.0, GRAVITY_Y);
                body.gravity_enabled = true;
                body.vel.y = CHAIN_POP_VY;

                scheduler.after(
                    now,
                    tuning.gravity_boost_delay_ms,
                    Action::GravityBoost { body: sensor },
                );
                scheduler.after(
                    now,
                    FADE_POLL_MS,
                    Action::FadePoll {
                        body: sensor,
                        fade_ms: tuning.chain_fade_ms,
                    },
                );
                // Death and dash both run their own full-screen animations;
                // the tip-over would visually fight them.
                if trigger == ChainTrigger::Attack {
                    tweens.animate(world, sensor, TweenProp::Angle, PLATFORM_ROT_RAD, PLATFORM_ROT_MS);
                }
            }
        }
    }

    /// Recycle every column entirely behind `threshold_x`: despawn its
    /// bodies, cancel in-flight tweens, drop the column.
    pub fn recycle(&mut self, world: &mut World, tweens: &mut Tweens, threshold_x: f32) {
        let kind = self.kind;
        self.columns.retain_mut(|column| {
            let right_edge = column.origin.x + GRID_COLS as f32 * CUBE_SIZE;
            if right_edge >= threshold_x {
                return true;
            }
            if let Some(grid) = &mut column.grid {
                grid.teardown(world, tweens);
            }
            for body in [
                Some(column.platform_sensor),
                column.grid_sensor,
                column.placeholder,
            ]
            .into_iter()
            .flatten()
            {
                tweens.cancel_all(body);
                world.despawn(body);
            }
            log::info!("recycled {kind:?} column {:?} at x={}", column.id, column.origin.x);
            false
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::body::Pool;
    use proptest::prelude::*;

    fn lower_manager_with_grid(rows: usize) -> (World, ColumnManager, ColumnId) {
        let mut world = World::new();
        let mut mgr = ColumnManager::new(ColumnKind::Lower);
        let id = mgr.create_column(&mut world, 200.0, 120.0, rows as f32 * CUBE_SIZE);
        mgr.generate_grid(&mut world, id);
        (world, mgr, id)
    }

    #[test]
    fn test_generation_idempotent_and_placeholder_destroyed_once() {
        let mut world = World::new();
        let mut mgr = ColumnManager::new(ColumnKind::Lower);
        let id = mgr.create_column(&mut world, 0.0, 100.0, 5.0 * CUBE_SIZE);

        let placeholder = mgr.column(id).unwrap().placeholder.unwrap();
        assert!(world.contains(placeholder));

        mgr.generate_grid(&mut world, id);
        let count = mgr.column(id).unwrap().grid.as_ref().unwrap().len();
        assert_eq!(count, 5 * GRID_COLS);
        assert!(!world.contains(placeholder));
        assert!(mgr.column(id).unwrap().placeholder.is_none());

        // Second generation changes nothing
        mgr.generate_grid(&mut world, id);
        assert_eq!(mgr.column(id).unwrap().grid.as_ref().unwrap().len(), count);
    }

    #[test]
    fn test_floating_column_skips_grid_generation() {
        let mut world = World::new();
        let mut mgr = ColumnManager::new(ColumnKind::Floating);
        let id = mgr.create_column(&mut world, 0.0, 100.0, 24.0);
        mgr.generate_grid(&mut world, id);
        assert!(mgr.column(id).unwrap().grid.is_none());
        assert!(mgr.column(id).unwrap().grid_sensor.is_none());
    }

    #[test]
    fn test_chain_fall_releases_rows_below_strike_only() {
        // 23x4 grid, hit at (10, 2): rows 0..10 in col 2 fall, nothing else.
        let (mut world, mut mgr, id) = lower_manager_with_grid(23);
        let mut sched = Scheduler::new();
        let mut tweens = Tweens::new();
        let tuning = Tuning::default();

        mgr.run_chain_fall(
            &mut world,
            &mut sched,
            &mut tweens,
            &tuning,
            0,
            id,
            10,
            2,
            ChainTrigger::Attack,
        );

        let grid = mgr.column(id).unwrap().grid.as_ref().unwrap();
        let mut falling = 0;
        for r in 0..grid.rows {
            for c in 0..grid.cols {
                let cube = grid.cube_at(r, c).unwrap();
                let body = world.get(cube.body).unwrap();
                if c == 2 && r < 10 {
                    assert!(body.gravity_enabled, "({r},{c}) should fall");
                    assert_eq!(body.vel.y, CHAIN_POP_VY);
                    assert!(!cube.can_damage);
                    falling += 1;
                } else {
                    assert!(body.immovable, "({r},{c}) should be untouched");
                    assert!(cube.can_damage || (r == 10 && c == 2));
                }
            }
        }
        assert_eq!(falling, 10);
        // Each faller got a gravity boost and a fade poll
        assert_eq!(sched.pending(), 20);
    }

    #[test]
    fn test_chain_fall_skips_already_attacked_cubes() {
        let (mut world, mut mgr, id) = lower_manager_with_grid(8);
        let mut sched = Scheduler::new();
        let mut tweens = Tweens::new();
        let tuning = Tuning::default();

        // Cube above the hit, already destroyed by a direct attack
        mgr.column_mut(id)
            .unwrap()
            .grid
            .as_mut()
            .unwrap()
            .cube_at_mut(3, 1)
            .unwrap()
            .was_attacked = true;

        mgr.run_chain_fall(
            &mut world,
            &mut sched,
            &mut tweens,
            &tuning,
            0,
            id,
            6,
            1,
            ChainTrigger::Attack,
        );

        let grid = mgr.column(id).unwrap().grid.as_ref().unwrap();
        let attacked = grid.cube_at(3, 1).unwrap();
        let body = world.get(attacked.body).unwrap();
        assert!(body.immovable);
        assert_eq!(body.vel, Vec2::ZERO);
        // Its neighbors in the pass did fall
        assert!(world.get(grid.cube_at(2, 1).unwrap().body).unwrap().gravity_enabled);
        assert!(world.get(grid.cube_at(4, 1).unwrap().body).unwrap().gravity_enabled);
    }

    #[test]
    fn test_boundary_column_tips_platform_on_attack_only() {
        for (trigger, expect_rotation) in [
            (ChainTrigger::Attack, true),
            (ChainTrigger::Dash, false),
            (ChainTrigger::GameOver, false),
        ] {
            let (mut world, mut mgr, id) = lower_manager_with_grid(6);
            let mut sched = Scheduler::new();
            let mut tweens = Tweens::new();
            let tuning = Tuning::default();

            mgr.run_chain_fall(
                &mut world,
                &mut sched,
                &mut tweens,
                &tuning,
                0,
                id,
                4,
                LOWER_BOUNDARY_COL,
                trigger,
            );

            let sensor = mgr.column(id).unwrap().platform_sensor;
            let body = world.get(sensor).unwrap();
            assert!(body.gravity_enabled, "{trigger:?}: sensor should fall");
            assert_eq!(body.vel.y, CHAIN_POP_VY);
            assert_eq!(
                tweens.len() > 0,
                expect_rotation,
                "{trigger:?}: rotation tween mismatch"
            );
        }
    }

    #[test]
    fn test_non_boundary_column_leaves_platform_alone() {
        let (mut world, mut mgr, id) = lower_manager_with_grid(6);
        let mut sched = Scheduler::new();
        let mut tweens = Tweens::new();
        let tuning = Tuning::default();

        mgr.run_chain_fall(
            &mut world,
            &mut sched,
            &mut tweens,
            &tuning,
            0,
            id,
            4,
            0,
            ChainTrigger::Attack,
        );
        let sensor = mgr.column(id).unwrap().platform_sensor;
        assert!(world.get(sensor).unwrap().immovable);
    }

    #[test]
    fn test_upper_chain_falls_toward_last_row_without_pop() {
        let mut world = World::new();
        let mut mgr = ColumnManager::new(ColumnKind::Upper);
        let id = mgr.create_column(&mut world, 0.0, 0.0, 12.0 * CUBE_SIZE);
        mgr.generate_grid(&mut world, id);

        let mut sched = Scheduler::new();
        let mut tweens = Tweens::new();
        let tuning = Tuning::default();

        mgr.run_chain_fall(
            &mut world,
            &mut sched,
            &mut tweens,
            &tuning,
            0,
            id,
            4,
            UPPER_BOUNDARY_COL,
            ChainTrigger::Attack,
        );

        let grid = mgr.column(id).unwrap().grid.as_ref().unwrap();
        for r in 0..grid.rows {
            let body = world.get(grid.cube_at(r, 0).unwrap().body).unwrap();
            if r > 4 {
                assert!(body.moves, "row {r} should be released");
                assert_eq!(body.vel.y, 0.0); // upper chain has no pop
            } else {
                assert!(!body.moves, "row {r} should be untouched");
            }
        }
    }

    #[test]
    fn test_game_over_pass_fells_every_row_both_orientations() {
        for kind in [ColumnKind::Lower, ColumnKind::Upper] {
            let mut world = World::new();
            let mut mgr = ColumnManager::new(kind);
            let id = mgr.create_column(&mut world, 0.0, 0.0, 6.0 * CUBE_SIZE);
            mgr.generate_grid(&mut world, id);

            let mut sched = Scheduler::new();
            let mut tweens = Tweens::new();
            let tuning = Tuning::default();

            mgr.run_chain_fall(
                &mut world,
                &mut sched,
                &mut tweens,
                &tuning,
                0,
                id,
                0,
                1,
                ChainTrigger::GameOver,
            );

            let grid = mgr.column(id).unwrap().grid.as_ref().unwrap();
            for r in 0..grid.rows {
                let body = world.get(grid.cube_at(r, 1).unwrap().body).unwrap();
                assert!(body.moves, "{kind:?} row {r} should crumble");
            }
        }
    }

    #[test]
    fn test_chain_skips_already_falling_cubes() {
        let (mut world, mut mgr, id) = lower_manager_with_grid(6);
        let mut sched = Scheduler::new();
        let mut tweens = Tweens::new();
        let tuning = Tuning::default();

        // A cube mid-departure from an earlier pass
        let falling_body = mgr
            .column(id)
            .unwrap()
            .grid
            .as_ref()
            .unwrap()
            .cube_at(2, 1)
            .unwrap()
            .body;
        {
            let body = world.get_mut(falling_body).unwrap();
            body.pool = Pool::Falling;
            body.vel = Vec2::new(40.0, 60.0);
        }

        mgr.run_chain_fall(
            &mut world,
            &mut sched,
            &mut tweens,
            &tuning,
            0,
            id,
            5,
            1,
            ChainTrigger::Attack,
        );
        // Untouched: velocity not overwritten by the pop
        assert_eq!(world.get(falling_body).unwrap().vel, Vec2::new(40.0, 60.0));
    }

    #[test]
    fn test_recycle_tears_down_bodies() {
        let (mut world, mut mgr, _id) = lower_manager_with_grid(4);
        let mut tweens = Tweens::new();
        let far_ahead = 10_000.0;
        mgr.recycle(&mut world, &mut tweens, far_ahead);
        assert!(mgr.columns().is_empty());
        assert_eq!(world.len(), 0);
    }

    #[test]
    fn test_recycle_keeps_columns_ahead() {
        let (mut world, mut mgr, id) = lower_manager_with_grid(4);
        let mut tweens = Tweens::new();
        mgr.recycle(&mut world, &mut tweens, 100.0);
        assert!(mgr.column(id).is_some());
    }

    proptest! {
        // Exactly the cubes at rows [0, r) in the hit column fall; no
        // other cube changes state; was_attacked cubes are excluded.
        #[test]
        fn prop_chain_fall_column_scoping(
            rows in 2usize..28,
            hit_row_frac in 0.0f32..1.0,
            hit_col in 0usize..GRID_COLS,
            attacked_frac in 0.0f32..1.0,
        ) {
            let hit_row = ((rows - 1) as f32 * hit_row_frac) as usize;
            let (mut world, mut mgr, id) = lower_manager_with_grid(rows);
            let mut sched = Scheduler::new();
            let mut tweens = Tweens::new();
            let tuning = Tuning::default();

            // Flag one cube in the pass range as already attacked
            let attacked_row = if hit_row > 0 {
                Some(((hit_row - 1) as f32 * attacked_frac) as usize)
            } else {
                None
            };
            if let Some(r) = attacked_row {
                mgr.column_mut(id).unwrap().grid.as_mut().unwrap()
                    .cube_at_mut(r, hit_col).unwrap().was_attacked = true;
            }

            mgr.run_chain_fall(
                &mut world, &mut sched, &mut tweens, &tuning,
                0, id, hit_row, hit_col, ChainTrigger::Attack,
            );

            let grid = mgr.column(id).unwrap().grid.as_ref().unwrap();
            for r in 0..grid.rows {
                for c in 0..grid.cols {
                    let cube = grid.cube_at(r, c).unwrap();
                    let body = world.get(cube.body).unwrap();
                    let in_pass = c == hit_col && r < hit_row && Some(r) != attacked_row;
                    prop_assert_eq!(body.gravity_enabled, in_pass, "({}, {})", r, c);
                }
            }
        }
    }
}
