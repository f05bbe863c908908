//! Fade out, swap maps, fade back in.

use engine::Direction;

use crate::grid::GridCoord;
use crate::types::MapName;

pub const DEFAULT_PHASE_SECONDS: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransitionId(u64);

/// Where the hero lands. Missing fields fall back to the destination map's
/// configured hero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapChange {
    pub map: MapName,
    pub hero_position: Option<GridCoord>,
    pub hero_direction: Option<Direction>,
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    Covering {
        id: TransitionId,
        change: MapChange,
        elapsed: f32,
    },
    Revealing {
        elapsed: f32,
    },
}

#[derive(Debug, Clone)]
pub struct MapTransition {
    phase_seconds: f32,
    next_id: u64,
    phase: Phase,
    swapped: Vec<TransitionId>,
}

impl Default for MapTransition {
    fn default() -> Self {
        Self::new(DEFAULT_PHASE_SECONDS)
    }
}

impl MapTransition {
    pub fn new(phase_seconds: f32) -> Self {
        Self {
            phase_seconds: phase_seconds.max(0.0),
            next_id: 0,
            phase: Phase::Idle,
            swapped: Vec::new(),
        }
    }

    pub fn begin(&mut self, change: MapChange) -> TransitionId {
        let id = TransitionId(self.next_id);
        self.next_id += 1;
        self.phase = Phase::Covering {
            id,
            change,
            elapsed: 0.0,
        };
        id
    }

    pub fn is_active(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    /// Advances the fade. Returns the change to perform once the screen is
    /// fully covered; the caller swaps maps and reports back with
    /// [`MapTransition::mark_swapped`].
    pub fn advance(&mut self, fixed_dt_seconds: f32) -> Option<(TransitionId, MapChange)> {
        match &mut self.phase {
            Phase::Idle => None,
            Phase::Covering { elapsed, .. } => {
                *elapsed += fixed_dt_seconds;
                if *elapsed < self.phase_seconds {
                    return None;
                }
                match std::mem::replace(&mut self.phase, Phase::Revealing { elapsed: 0.0 }) {
                    Phase::Covering { id, change, .. } => Some((id, change)),
                    _ => None,
                }
            }
            Phase::Revealing { elapsed } => {
                *elapsed += fixed_dt_seconds;
                if *elapsed >= self.phase_seconds {
                    self.phase = Phase::Idle;
                }
                None
            }
        }
    }

    pub fn mark_swapped(&mut self, id: TransitionId) {
        self.swapped.push(id);
    }

    /// Drops a transition whose swap could not be performed.
    pub fn cancel(&mut self) {
        self.phase = Phase::Idle;
    }

    pub fn take_swapped(&mut self, id: TransitionId) -> bool {
        match self.swapped.iter().position(|done| *done == id) {
            Some(index) => {
                self.swapped.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub fn fade_alpha(&self) -> u8 {
        let coverage = match &self.phase {
            Phase::Idle => 0.0,
            Phase::Covering { elapsed, .. } => self.fraction(*elapsed),
            Phase::Revealing { elapsed } => 1.0 - self.fraction(*elapsed),
        };
        (coverage * 255.0).round() as u8
    }

    fn fraction(&self, elapsed: f32) -> f32 {
        if self.phase_seconds == 0.0 {
            1.0
        } else {
            (elapsed / self.phase_seconds).clamp(0.0, 1.0)
        }
    }
}
