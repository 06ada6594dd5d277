//! Tick-based action scheduler
//!
//! Every deferred effect in the combat core (hit-stop resume, chain-fall
//! defer, gravity boost, cooldown expiry, swing-frame re-check, ...) is a
//! plain-data [`Action`] fired after a delay. There are no callbacks and no
//! blocking: the orchestrator drains due actions once per tick and applies
//! them with full access to the simulation, which keeps ordering explicit
//! and the whole thing deterministic.
//!
//! Timers can be paused and resumed (hit-stop pauses the player's two swing
//! timers while the world is frozen). Pausing stores the remaining delay;
//! resuming re-arms it relative to the current tick.

use crate::ms_to_ticks;
use crate::sim::body::BodyId;
use crate::sim::columns::{ChainTrigger, ColumnId, ColumnKind};

/// Handle to a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// A deferred simulation effect
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// End the main hit-stop freeze
    HitStopResume,
    /// End the short pipe-cut freeze
    PipeCutResume,
    /// Run a deferred chain-fall pass through one grid column
    ChainFall {
        kind: ColumnKind,
        column: ColumnId,
        row: usize,
        col: usize,
        trigger: ChainTrigger,
    },
    /// Apply the stronger gravity multiplier to a chain-falling body
    GravityBoost { body: BodyId },
    /// Check whether a popped body has started falling (vy > 0) and may fade
    FadePoll { body: BodyId, fade_ms: u32 },
    /// Hit-stop cooldown window ends
    CooldownExpire,
    /// Post-damage invincibility ends
    InvincibilityExpire,
    /// Toggle the invincibility flash opacity
    FlashToggle,
    /// First swing frame done with no hit-stop fired: spawn the attack hitbox
    SpawnAttackHitbox,
    /// Swing animation finished
    SwingComplete,
    /// Periodic continuous-cut re-check while holding the swing frame
    HoldRecheck,
    /// Dash window ends
    DashEnd,
}

#[derive(Debug, Clone)]
struct Timer {
    id: TimerId,
    /// Absolute due tick; meaningless while paused
    due: u64,
    /// Remaining ticks captured at pause time
    paused_remaining: Option<u64>,
    action: Action,
}

/// Delayed-action scheduler over the fixed simulation tick
#[derive(Debug, Default)]
pub struct Scheduler {
    timers: Vec<Timer>,
    next_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `action` to fire `delay_ms` from `now`
    pub fn after(&mut self, now: u64, delay_ms: u32, action: Action) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(Timer {
            id,
            due: now + ms_to_ticks(delay_ms),
            paused_remaining: None,
            action,
        });
        id
    }

    /// Pause a pending timer. Returns false if the timer is missing or
    /// already paused, so a caller can record exactly which timers it paused.
    pub fn pause(&mut self, id: TimerId, now: u64) -> bool {
        match self.timers.iter_mut().find(|t| t.id == id) {
            Some(t) if t.paused_remaining.is_none() => {
                t.paused_remaining = Some(t.due.saturating_sub(now));
                true
            }
            _ => false,
        }
    }

    /// Resume a paused timer, re-arming its remaining delay from `now`
    pub fn resume(&mut self, id: TimerId, now: u64) -> bool {
        match self.timers.iter_mut().find(|t| t.id == id) {
            Some(t) => match t.paused_remaining.take() {
                Some(remaining) => {
                    t.due = now + remaining;
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Cancel a pending timer. Safe on stale ids.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        self.timers.len() != before
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timers.iter().any(|t| t.id == id)
    }

    /// Remove and return all actions due at or before `now`, ordered by
    /// (due tick, insertion). Paused timers never fire.
    pub fn drain_due(&mut self, now: u64) -> Vec<Action> {
        let mut due: Vec<Timer> = Vec::new();
        self.timers.retain(|t| {
            if t.paused_remaining.is_none() && t.due <= now {
                due.push(t.clone());
                false
            } else {
                true
            }
        });
        due.sort_by_key(|t| (t.due, t.id.0));
        due.into_iter().map(|t| t.action).collect()
    }

    /// Number of pending timers (tests)
    pub fn pending(&self) -> usize {
        self.timers.len()
    }
}
