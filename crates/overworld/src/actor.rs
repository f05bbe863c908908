//! Per-actor movement and behavior state.
//!
//! An actor is always in exactly one [`ActorActivity`]. Walks advance one
//! pixel per tick until the next cell is reached; stands count down wall
//! time. Scripted behaviors carry a [`BehaviorTicket`] that is parked in the
//! actor's own completion list when the behavior ends, so a waiting cutscene
//! can only ever observe the completion it asked for.

use engine::{Direction, PixelPoint, CELL_PX};
use serde::{Deserialize, Serialize};

use crate::event::CutsceneScript;
use crate::grid::GridCoord;
use crate::types::ActorId;

/// Ticks needed to cross one cell.
pub const WALK_STEP_TICKS: u8 = CELL_PX as u8;

/// Walk cycle columns on the sprite sheet, indexed by step progress.
const WALK_FRAME_COLUMNS: [u32; 4] = [1, 0, 3, 0];
const WALK_TICKS_PER_FRAME: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BehaviorAction {
    Stand {
        direction: Direction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time: Option<u32>,
    },
    Walk {
        direction: Direction,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        retry: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BehaviorTicket(u64);

impl BehaviorTicket {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorSource {
    Player,
    IdleLoop,
    Scripted(BehaviorTicket),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorRequest {
    pub source: BehaviorSource,
    pub action: BehaviorAction,
}

impl BehaviorRequest {
    pub fn retries(&self) -> bool {
        matches!(self.action, BehaviorAction::Walk { retry: true, .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActorActivity {
    Idle,
    Walking {
        target: GridCoord,
        direction: Direction,
        progress_remaining: u8,
        source: BehaviorSource,
    },
    Standing {
        direction: Direction,
        remaining_seconds: f32,
        source: BehaviorSource,
    },
    /// A retrying walk whose destination was taken; re-attempted every tick.
    Blocked { request: BehaviorRequest },
}

/// What an actor finished during [`ActorState::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Walked { to: GridCoord },
    Stood,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActorState {
    id: ActorId,
    position: GridCoord,
    direction: Direction,
    player_controlled: bool,
    sprite: Option<String>,
    behavior_loop: Vec<BehaviorAction>,
    behavior_loop_index: usize,
    talking: Vec<CutsceneScript>,
    activity: ActorActivity,
    deferred: Option<BehaviorRequest>,
    completed: Vec<BehaviorTicket>,
    idle_suspended: bool,
}

impl ActorState {
    pub fn new(id: ActorId, position: GridCoord, direction: Direction) -> Self {
        Self {
            id,
            position,
            direction,
            player_controlled: false,
            sprite: None,
            behavior_loop: Vec::new(),
            behavior_loop_index: 0,
            talking: Vec::new(),
            activity: ActorActivity::Idle,
            deferred: None,
            completed: Vec::new(),
            idle_suspended: false,
        }
    }

    pub fn with_player_control(mut self, player_controlled: bool) -> Self {
        self.player_controlled = player_controlled;
        self
    }

    pub fn with_sprite(mut self, sprite: Option<String>) -> Self {
        self.sprite = sprite;
        self
    }

    pub fn with_behavior_loop(mut self, behavior_loop: Vec<BehaviorAction>) -> Self {
        self.behavior_loop = behavior_loop;
        self.behavior_loop_index = 0;
        self
    }

    pub fn with_talking(mut self, talking: Vec<CutsceneScript>) -> Self {
        self.talking = talking;
        self
    }

    pub fn id(&self) -> &ActorId {
        &self.id
    }

    pub fn position(&self) -> GridCoord {
        self.position
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_player_controlled(&self) -> bool {
        self.player_controlled
    }

    pub fn sprite(&self) -> Option<&str> {
        self.sprite.as_deref()
    }

    pub fn behavior_loop(&self) -> &[BehaviorAction] {
        &self.behavior_loop
    }

    pub fn talking(&self) -> &[CutsceneScript] {
        &self.talking
    }

    pub(crate) fn talking_mut(&mut self) -> &mut Vec<CutsceneScript> {
        &mut self.talking
    }

    pub fn activity(&self) -> &ActorActivity {
        &self.activity
    }

    pub fn is_idle(&self) -> bool {
        self.activity == ActorActivity::Idle
    }

    pub fn is_walking(&self) -> bool {
        matches!(self.activity, ActorActivity::Walking { .. })
    }

    /// The cell the actor stands on, plus the cell it is stepping into.
    pub fn occupies(&self, coord: GridCoord) -> bool {
        match self.activity {
            ActorActivity::Walking { target, .. } => self.position == coord || target == coord,
            _ => self.position == coord,
        }
    }

    pub fn face(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub(crate) fn place(&mut self, position: GridCoord, direction: Direction) {
        self.position = position;
        self.direction = direction;
        self.activity = ActorActivity::Idle;
        self.deferred = None;
    }

    /// World pixel position including progress through the current step.
    pub fn pixel_position(&self) -> PixelPoint {
        let base = self.position.to_pixels();
        match self.activity {
            ActorActivity::Walking {
                direction,
                progress_remaining,
                ..
            } => {
                let travelled = i32::from(WALK_STEP_TICKS - progress_remaining);
                let (dx, dy) = direction.offset();
                PixelPoint::new(base.x + dx * travelled, base.y + dy * travelled)
            }
            _ => base,
        }
    }

    /// Sprite sheet `(column, row)`: rows follow facing, columns cycle while walking.
    pub fn sprite_frame(&self) -> (u32, u32) {
        let row = match self.direction {
            Direction::Down => 0,
            Direction::Right => 1,
            Direction::Up => 2,
            Direction::Left => 3,
        };
        let column = match self.activity {
            ActorActivity::Walking {
                progress_remaining, ..
            } => {
                let travelled = WALK_STEP_TICKS - progress_remaining;
                WALK_FRAME_COLUMNS[usize::from(travelled / WALK_TICKS_PER_FRAME) % 4]
            }
            _ => 0,
        };
        (column, row)
    }

    pub(crate) fn next_idle_action(&self) -> Option<BehaviorAction> {
        if self.idle_suspended || self.player_controlled {
            return None;
        }
        self.behavior_loop
            .get(self.behavior_loop_index % self.behavior_loop.len().max(1))
            .cloned()
    }

    pub(crate) fn suspend_idle(&mut self) {
        self.idle_suspended = true;
        if let ActorActivity::Blocked { request } = &self.activity {
            if request.source == BehaviorSource::IdleLoop {
                self.activity = ActorActivity::Idle;
            }
        }
    }

    pub(crate) fn rearm_idle(&mut self) {
        self.idle_suspended = false;
    }

    /// True when a scripted request must wait for the current activity.
    pub(crate) fn must_defer(&self, request: &BehaviorRequest) -> bool {
        let BehaviorSource::Scripted(_) = request.source else {
            return !self.is_idle();
        };
        match &self.activity {
            ActorActivity::Idle => false,
            ActorActivity::Walking { .. } => true,
            ActorActivity::Standing { source, .. } => *source != BehaviorSource::IdleLoop,
            ActorActivity::Blocked { request } => request.source != BehaviorSource::IdleLoop,
        }
    }

    pub(crate) fn defer(&mut self, request: BehaviorRequest) {
        self.deferred = Some(request);
    }

    pub(crate) fn take_deferred(&mut self) -> Option<BehaviorRequest> {
        self.deferred.take()
    }

    pub(crate) fn take_blocked(&mut self) -> Option<BehaviorRequest> {
        match std::mem::replace(&mut self.activity, ActorActivity::Idle) {
            ActorActivity::Blocked { request } => Some(request),
            other => {
                self.activity = other;
                None
            }
        }
    }

    pub(crate) fn begin_walk(&mut self, source: BehaviorSource, direction: Direction) {
        self.direction = direction;
        self.activity = ActorActivity::Walking {
            target: self.position.step(direction),
            direction,
            progress_remaining: WALK_STEP_TICKS,
            source,
        };
    }

    pub(crate) fn begin_stand(
        &mut self,
        source: BehaviorSource,
        direction: Direction,
        time_ms: Option<u32>,
    ) {
        self.direction = direction;
        self.activity = ActorActivity::Standing {
            direction,
            remaining_seconds: time_ms.unwrap_or(0) as f32 / 1000.0,
            source,
        };
    }

    pub(crate) fn wait_to_retry(&mut self, request: BehaviorRequest) {
        self.activity = ActorActivity::Blocked { request };
    }

    /// Gives up a blocked walk. Idle loops move on to their next action and
    /// scripted callers are released so their cutscene is not stranded.
    pub(crate) fn abandon(&mut self, request: &BehaviorRequest) {
        self.activity = ActorActivity::Idle;
        self.finish(request.source);
    }

    pub(crate) fn advance(&mut self, fixed_dt_seconds: f32) -> Option<StepOutcome> {
        match &mut self.activity {
            ActorActivity::Walking {
                target,
                progress_remaining,
                source,
                ..
            } => {
                *progress_remaining = progress_remaining.saturating_sub(1);
                if *progress_remaining > 0 {
                    return None;
                }
                let (to, source) = (*target, *source);
                self.position = to;
                self.activity = ActorActivity::Idle;
                self.finish(source);
                Some(StepOutcome::Walked { to })
            }
            ActorActivity::Standing {
                remaining_seconds,
                source,
                ..
            } => {
                *remaining_seconds -= fixed_dt_seconds;
                if *remaining_seconds > 0.0 {
                    return None;
                }
                let source = *source;
                self.activity = ActorActivity::Idle;
                self.finish(source);
                Some(StepOutcome::Stood)
            }
            ActorActivity::Idle | ActorActivity::Blocked { .. } => None,
        }
    }

    fn finish(&mut self, source: BehaviorSource) {
        match source {
            BehaviorSource::Player => {}
            BehaviorSource::IdleLoop => {
                if !self.behavior_loop.is_empty() {
                    self.behavior_loop_index =
                        (self.behavior_loop_index + 1) % self.behavior_loop.len();
                }
            }
            BehaviorSource::Scripted(ticket) => self.completed.push(ticket),
        }
    }

    /// Consumes the completion for `ticket` if this actor has produced it.
    pub fn take_completion(&mut self, ticket: BehaviorTicket) -> bool {
        match self.completed.iter().position(|done| *done == ticket) {
            Some(index) => {
                self.completed.swap_remove(index);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn npc() -> ActorState {
        ActorState::new(ActorId::new("npcA"), GridCoord::new(2, 2), Direction::Down)
    }

    fn run_until_outcome(actor: &mut ActorState) -> (StepOutcome, u32) {
        for tick in 1..=600 {
            if let Some(outcome) = actor.advance(DT) {
                return (outcome, tick);
            }
        }
        panic!("actor never finished its activity");
    }

    #[test]
    fn walk_takes_one_tick_per_pixel_and_snaps_to_target() {
        let mut actor = npc();
        actor.begin_walk(BehaviorSource::Player, Direction::Right);
        assert!(actor.occupies(GridCoord::new(3, 2)));

        for _ in 0..8 {
            assert_eq!(actor.advance(DT), None);
        }
        assert_eq!(actor.pixel_position(), PixelPoint::new(2 * 16 + 8, 2 * 16));

        let (outcome, _) = run_until_outcome(&mut actor);
        assert_eq!(
            outcome,
            StepOutcome::Walked {
                to: GridCoord::new(3, 2)
            }
        );
        assert_eq!(actor.position(), GridCoord::new(3, 2));
        assert!(actor.is_idle());
    }

    #[test]
    fn timed_stand_counts_down_wall_time() {
        let mut actor = npc();
        actor.begin_stand(BehaviorSource::IdleLoop, Direction::Left, Some(500));
        let (outcome, ticks) = run_until_outcome(&mut actor);

        assert_eq!(outcome, StepOutcome::Stood);
        assert!((29..=31).contains(&ticks));
        assert_eq!(actor.direction(), Direction::Left);
    }

    #[test]
    fn untimed_stand_finishes_on_next_tick() {
        let mut actor = npc();
        actor.begin_stand(BehaviorSource::IdleLoop, Direction::Up, None);
        assert_eq!(actor.advance(DT), Some(StepOutcome::Stood));
    }

    #[test]
    fn scripted_completion_is_only_visible_to_its_ticket() {
        let mut actor = npc();
        let mine = BehaviorTicket::new(1);
        let other = BehaviorTicket::new(2);
        actor.begin_stand(BehaviorSource::Scripted(mine), Direction::Up, None);
        run_until_outcome(&mut actor);

        assert!(!actor.take_completion(other));
        assert!(actor.take_completion(mine));
        assert!(!actor.take_completion(mine));
    }

    #[test]
    fn idle_loop_advances_and_wraps() {
        let mut actor = npc().with_behavior_loop(vec![
            BehaviorAction::Stand {
                direction: Direction::Left,
                time: None,
            },
            BehaviorAction::Stand {
                direction: Direction::Right,
                time: None,
            },
        ]);

        for expected in [Direction::Left, Direction::Right, Direction::Left] {
            let Some(BehaviorAction::Stand { direction, time }) = actor.next_idle_action() else {
                panic!("expected a stand action");
            };
            assert_eq!(direction, expected);
            actor.begin_stand(BehaviorSource::IdleLoop, direction, time);
            run_until_outcome(&mut actor);
        }
    }

    #[test]
    fn suspended_idle_yields_no_action_until_rearmed() {
        let mut actor = npc().with_behavior_loop(vec![BehaviorAction::Stand {
            direction: Direction::Up,
            time: Some(100),
        }]);
        actor.suspend_idle();
        assert_eq!(actor.next_idle_action(), None);
        actor.rearm_idle();
        assert!(actor.next_idle_action().is_some());
    }

    #[test]
    fn scripted_request_preempts_idle_stand_but_waits_for_walks() {
        let mut actor = npc();
        let scripted = BehaviorRequest {
            source: BehaviorSource::Scripted(BehaviorTicket::new(7)),
            action: BehaviorAction::Walk {
                direction: Direction::Up,
                retry: true,
            },
        };

        actor.begin_stand(BehaviorSource::IdleLoop, Direction::Left, Some(5000));
        assert!(!actor.must_defer(&scripted));

        actor.begin_walk(BehaviorSource::IdleLoop, Direction::Left);
        assert!(actor.must_defer(&scripted));
    }

    #[test]
    fn abandoning_scripted_walk_still_releases_ticket() {
        let mut actor = npc();
        let ticket = BehaviorTicket::new(3);
        let request = BehaviorRequest {
            source: BehaviorSource::Scripted(ticket),
            action: BehaviorAction::Walk {
                direction: Direction::Up,
                retry: false,
            },
        };
        actor.abandon(&request);
        assert!(actor.take_completion(ticket));
    }

    #[test]
    fn sprite_frame_rows_follow_facing() {
        let mut actor = npc();
        assert_eq!(actor.sprite_frame(), (0, 0));
        actor.face(Direction::Left);
        assert_eq!(actor.sprite_frame(), (0, 3));
        actor.begin_walk(BehaviorSource::Player, Direction::Up);
        assert_eq!(actor.sprite_frame(), (1, 2));
    }

    #[test]
    fn behavior_loop_entries_parse_from_map_json() {
        let parsed: Vec<BehaviorAction> = serde_json::from_str(
            r#"[{ "type": "stand", "direction": "left", "time": 800 },
                { "type": "walk", "direction": "up" }]"#,
        )
        .expect("decode");
        assert_eq!(
            parsed[1],
            BehaviorAction::Walk {
                direction: Direction::Up,
                retry: false
            }
        );
    }
}
