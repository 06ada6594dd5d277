//! Destructible cube grids
//!
//! Each obstacle column owns at most one grid of unit cubes, populated
//! lazily when the player gets close. Row order is load-bearing: rows grow
//! in the attack-propagation direction, so a lower-hazard grid chains
//! toward row 0 while an upper-hazard grid chains toward the last row. The
//! chain-fall pass itself lives in `columns`; this module owns the cubes,
//! their generation and the single-cube hit.

use glam::Vec2;
use rand::Rng;
use rand_pcg::Pcg32;

use crate::consts::{CUBE_SIZE, GRAVITY_Y};
use crate::sim::body::{Body, BodyGroup, BodyId, World};
use crate::sim::tuning::ImpulseRange;
use crate::sim::tween::{TweenProp, Tweens};

/// Which way a chain-fall cascades through a column of cubes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainDirection {
    /// Lower-hazard grids: rows above the hit row, i.e. [0, hit_row)
    TowardRowZero,
    /// Upper-hazard grids: rows below the hit row, i.e. (hit_row, last]
    TowardLastRow,
}

/// A unit destructible tile
#[derive(Debug, Clone)]
pub struct Cube {
    pub row: usize,
    pub col: usize,
    pub body: BodyId,
    /// True until the cube is hit or chain-triggered
    pub can_damage: bool,
    /// True if destroyed by the player's active attack (excludes the cube
    /// from later chain-fall passes through the same column)
    pub was_attacked: bool,
}

/// One destructible rectangular grid, row-major
#[derive(Debug)]
pub struct CubeGrid {
    pub rows: usize,
    pub cols: usize,
    pub orientation: ChainDirection,
    cubes: Vec<Cube>,
}

impl CubeGrid {
    /// Populate a grid covering `width_px` x `height_px` from `origin`
    /// (top-left corner, y-down). Dimensions round up to whole cubes.
    ///
    /// Upper-variant cubes (`free_falling`) carry gravity from birth so they
    /// drop the instant they are displaced; static variants are immovable
    /// until hit.
    pub fn generate(
        world: &mut World,
        origin: Vec2,
        width_px: f32,
        height_px: f32,
        orientation: ChainDirection,
        free_falling: bool,
    ) -> Self {
        let cols = (width_px / CUBE_SIZE).ceil() as usize;
        let rows = (height_px / CUBE_SIZE).ceil() as usize;
        let mut cubes = Vec::with_capacity(rows * cols);

        for row in 0..rows {
            for col in 0..cols {
                let center = origin
                    + Vec2::new(
                        (col as f32 + 0.5) * CUBE_SIZE,
                        (row as f32 + 0.5) * CUBE_SIZE,
                    );
                let body = Body::new(center, Vec2::splat(CUBE_SIZE), BodyGroup::Cube);
                let body = if free_falling {
                    // moves stays false until displaced
                    let mut b = body.with_gravity(Vec2::new(0.0, GRAVITY_Y));
                    b.moves = false;
                    b
                } else {
                    body.immovable()
                };
                let id = world.spawn(body);
                cubes.push(Cube {
                    row,
                    col,
                    body: id,
                    can_damage: true,
                    was_attacked: false,
                });
            }
        }

        Self {
            rows,
            cols,
            orientation,
            cubes,
        }
    }

    pub fn len(&self) -> usize {
        self.cubes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cubes.is_empty()
    }

    pub fn cubes(&self) -> &[Cube] {
        &self.cubes
    }

    pub fn cube_at(&self, row: usize, col: usize) -> Option<&Cube> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cubes.get(row * self.cols + col)
    }

    pub fn cube_at_mut(&mut self, row: usize, col: usize) -> Option<&mut Cube> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cubes.get_mut(row * self.cols + col)
    }

    /// Locate the cube owning a physics body
    pub fn cube_by_body(&self, body: BodyId) -> Option<&Cube> {
        self.cubes.iter().find(|c| c.body == body)
    }

    pub fn cube_by_body_mut(&mut self, body: BodyId) -> Option<&mut Cube> {
        self.cubes.iter_mut().find(|c| c.body == body)
    }

    /// Rows a chain-fall pass visits for a hit at `row`, per orientation
    pub fn chain_rows(&self, row: usize) -> std::ops::Range<usize> {
        match self.orientation {
            ChainDirection::TowardRowZero => 0..row,
            ChainDirection::TowardLastRow => (row + 1).min(self.rows)..self.rows,
        }
    }

    /// Clear `can_damage` on every cube (column-wide area denial after a
    /// hit-stop or attack connects)
    pub fn disable_all(&mut self) {
        for cube in &mut self.cubes {
            cube.can_damage = false;
        }
    }

    /// Destroy a single cube: guard on `can_damage`, kick it outward with a
    /// bounded random impulse, enable gravity, start the alpha fade.
    ///
    /// Returns false if the cube was already non-damaging (idempotent).
    #[allow(clippy::too_many_arguments)]
    pub fn hit_cube(
        &mut self,
        world: &mut World,
        tweens: &mut Tweens,
        rng: &mut Pcg32,
        row: usize,
        col: usize,
        impulse_x: ImpulseRange,
        impulse_y: ImpulseRange,
        fade_ms: u32,
    ) -> bool {
        let Some(cube) = self.cube_at_mut(row, col) else {
            return false;
        };
        if !cube.can_damage {
            return false;
        }
        cube.can_damage = false;

        let body_id = cube.body;
        if let Some(body) = world.get_mut(body_id) {
            body.immovable = false;
            body.moves = true;
            body.gravity = Vec2::new(0.0, GRAVITY_Y);
            body.gravity_enabled = true;
            body.vel = Vec2::new(
                rng.random_range(impulse_x.min..=impulse_x.max),
                rng.random_range(impulse_y.min..=impulse_y.max),
            );
        }
        tweens.animate(world, body_id, TweenProp::Alpha, 0.0, fade_ms);
        true
    }

    /// Despawn every cube body and cancel its tweens (recycle path)
    pub fn teardown(&mut self, world: &mut World, tweens: &mut Tweens) {
        for cube in self.cubes.drain(..) {
            tweens.cancel_all(cube.body);
            world.despawn(cube.body);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn lower_grid(world: &mut World, rows: usize) -> CubeGrid {
        CubeGrid::generate(
            world,
            Vec2::new(100.0, 300.0),
            4.0 * CUBE_SIZE,
            rows as f32 * CUBE_SIZE,
            ChainDirection::TowardRowZero,
            false,
        )
    }

    #[test]
    fn test_generation_counts_and_positions() {
        let mut world = World::new();
        let grid = lower_grid(&mut world, 23);
        assert_eq!(grid.rows, 23);
        assert_eq!(grid.cols, 4);
        assert_eq!(grid.len(), 92);

        let cube = grid.cube_at(0, 0).unwrap();
        let body = world.get(cube.body).unwrap();
        assert_eq!(body.pos, Vec2::new(100.0 + 8.0, 300.0 + 8.0));
        assert!(body.immovable);
        assert!(cube.can_damage);

        let cube = grid.cube_at(22, 3).unwrap();
        let body = world.get(cube.body).unwrap();
        assert_eq!(
            body.pos,
            Vec2::new(100.0 + 3.5 * CUBE_SIZE, 300.0 + 22.5 * CUBE_SIZE)
        );
    }

    #[test]
    fn test_width_rounds_up_to_whole_cubes() {
        let mut world = World::new();
        let grid = CubeGrid::generate(
            &mut world,
            Vec2::ZERO,
            3.2 * CUBE_SIZE,
            1.5 * CUBE_SIZE,
            ChainDirection::TowardRowZero,
            false,
        );
        assert_eq!(grid.cols, 4);
        assert_eq!(grid.rows, 2);
    }

    #[test]
    fn test_upper_cubes_carry_gravity_from_birth() {
        let mut world = World::new();
        let grid = CubeGrid::generate(
            &mut world,
            Vec2::ZERO,
            CUBE_SIZE,
            CUBE_SIZE,
            ChainDirection::TowardLastRow,
            true,
        );
        let id = grid.cube_at(0, 0).unwrap().body;
        let (pos, gravity_enabled, moves, immovable) = {
            let body = world.get(id).unwrap();
            (body.pos, body.gravity_enabled, body.moves, body.immovable)
        };
        assert!(gravity_enabled);
        assert!(!moves);
        assert!(!immovable);
        // Not displaced yet: integration leaves it alone
        world.step(1.0);
        assert_eq!(world.get(id).unwrap().pos, pos);
    }

    #[test]
    fn test_hit_cube_is_idempotent() {
        let mut world = World::new();
        let mut tweens = Tweens::new();
        let mut rng = Pcg32::seed_from_u64(7);
        let mut grid = lower_grid(&mut world, 4);

        let x = ImpulseRange::new(70.0, 110.0);
        let y = ImpulseRange::new(-170.0, -130.0);
        assert!(grid.hit_cube(&mut world, &mut tweens, &mut rng, 1, 2, x, y, 1000));
        assert!(!grid.hit_cube(&mut world, &mut tweens, &mut rng, 1, 2, x, y, 1000));

        let body = world.get(grid.cube_at(1, 2).unwrap().body).unwrap();
        assert!((70.0..=110.0).contains(&body.vel.x));
        assert!((-170.0..=-130.0).contains(&body.vel.y));
        assert!(body.gravity_enabled);
        assert!(!body.immovable);
        assert_eq!(tweens.len(), 1);
    }

    #[test]
    fn test_chain_rows_directionality() {
        let mut world = World::new();
        let lower = lower_grid(&mut world, 23);
        assert_eq!(lower.chain_rows(10), 0..10);
        assert_eq!(lower.chain_rows(0), 0..0);

        let upper = CubeGrid::generate(
            &mut world,
            Vec2::ZERO,
            4.0 * CUBE_SIZE,
            23.0 * CUBE_SIZE,
            ChainDirection::TowardLastRow,
            true,
        );
        assert_eq!(upper.chain_rows(10), 11..23);
        assert_eq!(upper.chain_rows(22), 23..23);
    }

    #[test]
    fn test_disable_all() {
        let mut world = World::new();
        let mut grid = lower_grid(&mut world, 3);
        grid.disable_all();
        assert!(grid.cubes().iter().all(|c| !c.can_damage));
    }

    #[test]
    fn test_teardown_despawns_bodies() {
        let mut world = World::new();
        let mut tweens = Tweens::new();
        let mut grid = lower_grid(&mut world, 2);
        let first = grid.cube_at(0, 0).unwrap().body;
        grid.teardown(&mut world, &mut tweens);
        assert!(world.get(first).is_none());
        assert!(grid.is_empty());
        assert_eq!(world.len(), 0);
    }
}
