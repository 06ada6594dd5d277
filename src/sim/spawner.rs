//! Chunk templates and the rolling spawner
//!
//! Level geometry is authored as chunks: small declarative templates whose
//! entries place upper pipes, lower pipes, floating platforms and ground
//! slabs at offsets relative to the chunk origin. The spawner cycles through
//! its template rotation and materializes the next chunk whenever the player
//! closes within `SPAWN_LEAD` of the frontier, so geometry always exists
//! just off the right edge of the screen and never further.

use serde::{Deserialize, Serialize};

use glam::Vec2;

use crate::consts::SPAWN_LEAD;
use crate::sim::body::{Body, BodyGroup, BodyId, World};
use crate::sim::columns::ColumnManager;

/// Default pipe height when a template doesn't override it, px
const DEFAULT_PIPE_HEIGHT: f32 = 160.0;
/// Floating platform slab height, px
const FLOATING_SLAB_HEIGHT: f32 = 16.0;
/// Ground slab dimensions, px
const GROUND_WIDTH: f32 = 128.0;
const GROUND_HEIGHT: f32 = 24.0;
/// Horizontal span one chunk occupies, px
const CHUNK_SPAN: f32 = 320.0;

/// What a single template entry places
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Upper,
    Lower,
    Floating,
    Ground,
}

/// One placement inside a chunk, offsets relative to the chunk origin
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub kind: EntryKind,
    pub rel_x: f32,
    pub rel_y: f32,
    /// Pipe or slab height; defaulted when absent in authored data
    #[serde(default = "default_height")]
    pub height_px: f32,
}

fn default_height() -> f32 {
    DEFAULT_PIPE_HEIGHT
}

/// An authored chunk of level geometry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkTemplate {
    pub entries: Vec<ChunkEntry>,
}

/// Cycles templates and materializes them ahead of the player
#[derive(Debug)]
pub struct ChunkSpawner {
    templates: Vec<ChunkTemplate>,
    next_template: usize,
    /// x past which no geometry exists yet
    frontier_x: f32,
    /// Plain ground bodies are owned here, not by a column manager
    ground_bodies: Vec<BodyId>,
}

impl ChunkSpawner {
    pub fn new(templates: Vec<ChunkTemplate>, start_x: f32) -> Self {
        Self {
            templates,
            next_template: 0,
            frontier_x: start_x,
            ground_bodies: Vec::new(),
        }
    }

    pub fn frontier_x(&self) -> f32 {
        self.frontier_x
    }

    pub fn ground_bodies(&self) -> &[BodyId] {
        &self.ground_bodies
    }

    /// Materialize chunks until the frontier leads the player by at least
    /// `SPAWN_LEAD`. Normally at most one chunk spawns per call; the loop
    /// covers teleport-sized advances.
    pub fn update(
        &mut self,
        world: &mut World,
        upper: &mut ColumnManager,
        lower: &mut ColumnManager,
        floating: &mut ColumnManager,
        player_x: f32,
    ) {
        if self.templates.is_empty() {
            return;
        }
        while self.frontier_x - player_x < SPAWN_LEAD {
            let template = self.templates[self.next_template].clone();
            self.next_template = (self.next_template + 1) % self.templates.len();
            self.materialize(world, upper, lower, floating, &template);
            self.frontier_x += CHUNK_SPAN;
        }
    }

    fn materialize(
        &mut self,
        world: &mut World,
        upper: &mut ColumnManager,
        lower: &mut ColumnManager,
        floating: &mut ColumnManager,
        template: &ChunkTemplate,
    ) {
        let origin_x = self.frontier_x;
        for entry in &template.entries {
            let x = origin_x + entry.rel_x;
            let y = entry.rel_y;
            match entry.kind {
                EntryKind::Upper => {
                    upper.create_column(world, x, y, entry.height_px);
                }
                EntryKind::Lower => {
                    lower.create_column(world, x, y, entry.height_px);
                }
                EntryKind::Floating => {
                    floating.create_column(world, x, y, FLOATING_SLAB_HEIGHT);
                }
                EntryKind::Ground => {
                    let center =
                        Vec2::new(x + GROUND_WIDTH / 2.0, y + GROUND_HEIGHT / 2.0);
                    let id = world.spawn(
                        Body::new(center, Vec2::new(GROUND_WIDTH, GROUND_HEIGHT), BodyGroup::Ground)
                            .immovable(),
                    );
                    self.ground_bodies.push(id);
                }
            }
        }
        log::debug!(
            "materialized chunk at x={origin_x} ({} entries), frontier -> {}",
            template.entries.len(),
            origin_x + CHUNK_SPAN
        );
    }

    /// Despawn ground slabs that have scrolled past the recycle threshold
    pub fn recycle_ground(&mut self, world: &mut World, threshold_x: f32) {
        self.ground_bodies.retain(|&id| {
            let keep = world
                .get(id)
                .is_some_and(|b| b.pos.x + b.size.x / 2.0 >= threshold_x);
            if !keep {
                world.despawn(id);
            }
            keep
        });
    }
}
