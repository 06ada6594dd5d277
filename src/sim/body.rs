//! Minimal physics body world
//!
//! The combat core only needs a thin slice of a physics engine: axis-aligned
//! bodies with velocity/gravity integration, overlap queries by group, and
//! the active/falling pool split that keeps departing cubes out of damage
//! checks. Bodies are addressed by slot handles; a stale handle simply
//! resolves to `None`, which is what the collision handlers rely on when a
//! hitbox destroys itself mid-tick.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::POOL_EPSILON;

/// Handle to a body slot. Copyable, cheap, may go stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BodyId(pub(crate) u32);

/// Collision group a body belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyGroup {
    Player,
    Cube,
    PlatformSensor,
    GridSensor,
    Hitbox,
    Placeholder,
    Ground,
}

/// Ownership pool for simulated bodies
///
/// A cube moves from `Active` to `Falling` exactly once, when it begins
/// independent motion. Falling bodies are excluded from damage overlap
/// queries so a departing cube is never re-processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pool {
    Active,
    Falling,
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn from_center(center: Vec2, size: Vec2) -> Self {
        let half = size * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
    }
}

/// A simulated body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Body {
    pub pos: Vec2,
    pub vel: Vec2,
    /// Gravity acceleration applied while `gravity_enabled` (y-down positive)
    pub gravity: Vec2,
    pub gravity_enabled: bool,
    /// Whether the body participates in integration at all
    pub moves: bool,
    /// Immovable bodies never integrate, regardless of `moves`
    pub immovable: bool,
    /// Full width/height of the bounding box
    pub size: Vec2,
    /// Visual opacity, 1.0 = intact, animates to 0.0 on destruction
    pub alpha: f32,
    /// Visual rotation, radians
    pub angle: f32,
    pub group: BodyGroup,
    pub pool: Pool,
}

impl Body {
    pub fn new(pos: Vec2, size: Vec2, group: BodyGroup) -> Self {
        Self {
            pos,
            vel: Vec2::ZERO,
            gravity: Vec2::ZERO,
            gravity_enabled: false,
            moves: true,
            immovable: false,
            size,
            alpha: 1.0,
            angle: 0.0,
            group,
            pool: Pool::Active,
        }
    }

    /// Builder-style: mark immovable (static scenery / sensors)
    pub fn immovable(mut self) -> Self {
        self.immovable = true;
        self
    }

    /// Builder-style: enable gravity with the given acceleration
    pub fn with_gravity(mut self, gravity: Vec2) -> Self {
        self.gravity = gravity;
        self.gravity_enabled = true;
        self
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_center(self.pos, self.size)
    }
}

/// Slab of bodies with stable ids
///
/// Slots are never reused within one simulation run, so a handle held across
/// a despawn cannot alias a different body. The id space is plenty for a run
/// (cubes despawn long before u32 wraps).
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct World {
    slots: Vec<Option<Body>>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, body: Body) -> BodyId {
        let id = BodyId(self.slots.len() as u32);
        self.slots.push(Some(body));
        id
    }

    /// Remove a body. Safe to call with a stale id.
    pub fn despawn(&mut self, id: BodyId) {
        if let Some(slot) = self.slots.get_mut(id.0 as usize) {
            *slot = None;
        }
    }

    pub fn get(&self, id: BodyId) -> Option<&Body> {
        self.slots.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.slots.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }

    pub fn contains(&self, id: BodyId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live bodies
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Integrate one fixed timestep
    pub fn step(&mut self, dt: f32) {
        for body in self.slots.iter_mut().flatten() {
            if !body.moves || body.immovable {
                continue;
            }
            if body.gravity_enabled {
                body.vel += body.gravity * dt;
            }
            body.pos += body.vel * dt;
        }
    }

    /// Migrate active cubes that started moving into the falling pool.
    /// Returns the migrated ids (each cube migrates at most once).
    pub fn migrate_falling(&mut self) -> Vec<BodyId> {
        let mut migrated = Vec::new();
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if let Some(body) = slot
                && body.group == BodyGroup::Cube
                && body.pool == Pool::Active
                && body.vel.length() > POOL_EPSILON
            {
                body.pool = Pool::Falling;
                migrated.push(BodyId(i as u32));
            }
        }
        migrated
    }

    /// Do two bodies overlap? Stale ids never overlap.
    pub fn overlaps(&self, a: BodyId, b: BodyId) -> bool {
        match (self.get(a), self.get(b)) {
            (Some(a), Some(b)) => a.aabb().overlaps(&b.aabb()),
            _ => false,
        }
    }

    /// All active-pool bodies of `group` whose box overlaps `aabb`,
    /// in id order for determinism.
    pub fn overlapping_group(&self, aabb: &Aabb, group: BodyGroup) -> Vec<BodyId> {
        let mut hits = Vec::new();
        for (i, slot) in self.slots.iter().enumerate() {
            if let Some(body) = slot
                && body.group == group
                && body.pool == Pool::Active
                && body.aabb().overlaps(aabb)
            {
                hits.push(BodyId(i as u32));
            }
        }
        hits
    }
}
