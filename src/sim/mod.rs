//! Deterministic combat simulation
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by entity ID / insertion)
//! - No rendering or platform dependencies

pub mod body;
pub mod columns;
pub mod combat;
pub mod grid;
pub mod hit_stop;
pub mod hitboxes;
pub mod player;
pub mod schedule;
pub mod spawner;
pub mod tuning;
pub mod tween;

pub use body::{Aabb, Body, BodyGroup, BodyId, Pool, World};
pub use columns::{ChainTrigger, Column, ColumnId, ColumnKind, ColumnManager};
pub use combat::{CombatSim, TickInput};
pub use grid::{ChainDirection, Cube, CubeGrid};
pub use hit_stop::{FreezeEnd, HitStopController, PipeCutFreeze};
pub use hitboxes::PlayerHitboxes;
pub use player::{PlayerCombat, SwingPhase};
pub use schedule::{Action, Scheduler, TimerId};
pub use spawner::{ChunkEntry, ChunkSpawner, ChunkTemplate, EntryKind};
pub use tuning::{ImpulseRange, Tuning};
pub use tween::{TweenProp, Tweens};
