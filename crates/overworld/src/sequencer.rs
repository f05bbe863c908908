//! Runs one cutscene's events strictly in order.
//!
//! The sequencer never blocks the frame loop. Each tick the world calls
//! [`EventSequencer::poll`]; the current step either reports completion, in
//! which case the next event is dispatched in the same poll, or stays
//! pending until a later tick.

use std::collections::VecDeque;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::actor::{BehaviorAction, BehaviorTicket};
use crate::catalog::MapLibrary;
use crate::dialogue::{DialogueOverlay, PromptId};
use crate::event::{EventDescriptor, QuizReward};
use crate::grid::GridCoord;
use crate::map::{CutsceneRequest, MapModel};
use crate::progress::{Badge, Progress};
use crate::transition::{MapChange, MapTransition, TransitionId};
use crate::types::{ActorId, MapName};

/// Debug builds abort a behavior or map-change step that has not finished
/// after this much simulated time.
pub const STEP_STALL_TIMEOUT_SECONDS: f32 = 30.0;

pub const CORRECT_FEEDBACK: &str = "Correct!";
pub const INCORRECT_FEEDBACK: &str = "Incorrect, try again!";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CutsceneError {
    #[error("event {index} ({kind}) references unknown actor {who}")]
    MissingActor {
        index: usize,
        kind: &'static str,
        who: ActorId,
    },
    #[error("event {index} changes to unknown map {map}")]
    UnknownMap { index: usize, map: MapName },
    #[error("event {index} changes to map {map}, which has no player-controlled actor")]
    MissingHero { index: usize, map: MapName },
    #[error("event {index} ({kind}) stalled for {waited_seconds:.1}s")]
    Stalled {
        index: usize,
        kind: &'static str,
        waited_seconds: f32,
    },
}

/// Everything a cutscene step may touch, borrowed from the world for one poll.
pub struct CutsceneContext<'a> {
    pub map: &'a mut MapModel,
    pub library: &'a mut MapLibrary,
    pub dialogue: &'a mut DialogueOverlay,
    pub progress: &'a mut Progress,
    pub transition: &'a mut MapTransition,
    pub fixed_dt_seconds: f32,
}

impl CutsceneContext<'_> {
    /// The world's reward operation. Quiz payouts go through here and
    /// nowhere else.
    pub fn grant(&mut self, reward: QuizReward) -> Option<Badge> {
        self.progress.grant(reward)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutscenePoll {
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizOutcome {
    pub event_index: usize,
    pub is_correct: bool,
    pub user_answer: String,
}

#[derive(Debug, Clone)]
enum PendingStep {
    Behavior {
        who: ActorId,
        ticket: BehaviorTicket,
    },
    Message(PromptId),
    Question {
        prompt: PromptId,
        answer: String,
    },
    Feedback {
        current: PromptId,
        remaining: VecDeque<String>,
    },
    MapChange(TransitionId),
}

#[derive(Debug, Clone)]
pub struct EventSequencer {
    request: CutsceneRequest,
    next_index: usize,
    pending: Option<(usize, PendingStep)>,
    waited_seconds: f32,
    outcomes: Vec<QuizOutcome>,
}

impl EventSequencer {
    pub fn new(request: CutsceneRequest) -> Self {
        info!(
            map = %request.map,
            events = request.script.events.len(),
            "cutscene_started"
        );
        Self {
            request,
            next_index: 0,
            pending: None,
            waited_seconds: 0.0,
            outcomes: Vec::new(),
        }
    }

    /// Index of the event currently waiting for completion.
    pub fn current_step(&self) -> Option<usize> {
        self.pending.as_ref().map(|(index, _)| *index)
    }

    pub fn outcomes(&self) -> &[QuizOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<QuizOutcome> {
        self.outcomes
    }

    pub fn poll(&mut self, ctx: &mut CutsceneContext<'_>) -> Result<CutscenePoll, CutsceneError> {
        loop {
            if let Some((index, step)) = self.pending.take() {
                match self.poll_step(index, step, ctx)? {
                    Some(step) => {
                        self.pending = Some((index, step));
                        return Ok(CutscenePoll::Running);
                    }
                    None => {
                        debug!(index, "cutscene_step_completed");
                        self.waited_seconds = 0.0;
                    }
                }
            }

            let Some(event) = self.request.script.events.get(self.next_index).cloned() else {
                return Ok(CutscenePoll::Finished);
            };
            let index = self.next_index;
            self.next_index += 1;
            debug!(index, kind = event.kind(), "cutscene_step_started");
            let step = self.dispatch(index, event, ctx)?;
            self.pending = Some((index, step));
        }
    }

    fn dispatch(
        &mut self,
        index: usize,
        event: EventDescriptor,
        ctx: &mut CutsceneContext<'_>,
    ) -> Result<PendingStep, CutsceneError> {
        let kind = event.kind();
        let missing = |who: &ActorId| CutsceneError::MissingActor {
            index,
            kind,
            who: who.clone(),
        };

        match event {
            EventDescriptor::Stand {
                who,
                direction,
                time,
            } => {
                let ticket = ctx
                    .map
                    .command(&who, BehaviorAction::Stand { direction, time })
                    .ok_or_else(|| missing(&who))?;
                Ok(PendingStep::Behavior { who, ticket })
            }
            EventDescriptor::Walk { who, direction } => {
                let ticket = ctx
                    .map
                    .command(
                        &who,
                        BehaviorAction::Walk {
                            direction,
                            retry: true,
                        },
                    )
                    .ok_or_else(|| missing(&who))?;
                Ok(PendingStep::Behavior { who, ticket })
            }
            EventDescriptor::TextMessage {
                text,
                link,
                face_hero,
            } => {
                if let Some(who) = face_hero {
                    if !ctx.map.face_hero(&who) {
                        return Err(missing(&who));
                    }
                }
                Ok(PendingStep::Message(ctx.dialogue.show_text(text, link)))
            }
            EventDescriptor::QuestionMessage {
                question,
                answer,
                face_hero,
                ..
            } => {
                if let Some(who) = face_hero {
                    if !ctx.map.face_hero(&who) {
                        return Err(missing(&who));
                    }
                }
                Ok(PendingStep::Question {
                    prompt: ctx.dialogue.ask(question),
                    answer,
                })
            }
            EventDescriptor::ChangeMap {
                map,
                hero_x,
                hero_y,
                direction,
            } => {
                if !ctx.library.contains(&map) {
                    return Err(CutsceneError::UnknownMap { index, map });
                }
                let hero_position = match (hero_x, hero_y) {
                    (Some(x), Some(y)) => Some(GridCoord::new(x, y)),
                    _ => None,
                };
                let id = ctx.transition.begin(MapChange {
                    map,
                    hero_position,
                    hero_direction: direction,
                });
                Ok(PendingStep::MapChange(id))
            }
        }
    }

    /// `Ok(None)` when the step is done, `Ok(Some(step))` while it waits.
    fn poll_step(
        &mut self,
        index: usize,
        step: PendingStep,
        ctx: &mut CutsceneContext<'_>,
    ) -> Result<Option<PendingStep>, CutsceneError> {
        match step {
            PendingStep::Behavior { who, ticket } => {
                if ctx.map.take_completion(&who, ticket) {
                    return Ok(None);
                }
                if !ctx.map.contains_actor(&who) {
                    return Err(CutsceneError::MissingActor {
                        index,
                        kind: self.kind_at(index),
                        who,
                    });
                }
                self.note_wait(index, ctx.fixed_dt_seconds)?;
                Ok(Some(PendingStep::Behavior { who, ticket }))
            }
            PendingStep::Message(prompt) => {
                Ok((!ctx.dialogue.take_dismissed(prompt)).then_some(PendingStep::Message(prompt)))
            }
            PendingStep::Question { prompt, answer } => {
                let Some(user_answer) = ctx.dialogue.take_answer(prompt) else {
                    return Ok(Some(PendingStep::Question { prompt, answer }));
                };
                let is_correct = user_answer == answer;
                info!(index, is_correct, "quiz_answered");
                self.outcomes.push(QuizOutcome {
                    event_index: index,
                    is_correct,
                    user_answer,
                });

                let mut remaining = VecDeque::new();
                if is_correct {
                    if let Some(reward) = self.consume_reward(index, ctx) {
                        if let Some(badge) = ctx.grant(reward) {
                            remaining
                                .push_back(format!("You have collected a badge: {}!", badge.name));
                        }
                    }
                    remaining.push_back(CORRECT_FEEDBACK.to_string());
                } else {
                    remaining.push_back(INCORRECT_FEEDBACK.to_string());
                }
                Ok(Self::next_feedback(remaining, ctx))
            }
            PendingStep::Feedback { current, remaining } => {
                if !ctx.dialogue.take_dismissed(current) {
                    return Ok(Some(PendingStep::Feedback { current, remaining }));
                }
                Ok(Self::next_feedback(remaining, ctx))
            }
            PendingStep::MapChange(id) => {
                if ctx.transition.take_swapped(id) {
                    return Ok(None);
                }
                self.note_wait(index, ctx.fixed_dt_seconds)?;
                Ok(Some(PendingStep::MapChange(id)))
            }
        }
    }

    fn next_feedback(
        mut remaining: VecDeque<String>,
        ctx: &mut CutsceneContext<'_>,
    ) -> Option<PendingStep> {
        let text = remaining.pop_front()?;
        let current = ctx.dialogue.show_text(text, None);
        Some(PendingStep::Feedback { current, remaining })
    }

    /// Empties the reward at `index` everywhere it is stored. While the
    /// cutscene's own map is still active the live map decides whether
    /// anything is left; after a map change the copy taken when the
    /// cutscene started does.
    fn consume_reward(
        &mut self,
        index: usize,
        ctx: &mut CutsceneContext<'_>,
    ) -> Option<QuizReward> {
        let location = &self.request.location;
        let on_origin_map = ctx.map.name() == &self.request.map;
        let live = if on_origin_map {
            ctx.map.take_quiz_reward(location, index)
        } else {
            None
        };
        if let Some(def) = ctx.library.get_mut(&self.request.map) {
            if let Some(script) = def.script_mut(location) {
                script.take_reward(index);
            }
        }
        let local = self.request.script.take_reward(index);
        if on_origin_map {
            live
        } else {
            local
        }
    }

    fn note_wait(&mut self, index: usize, fixed_dt_seconds: f32) -> Result<(), CutsceneError> {
        self.waited_seconds += fixed_dt_seconds;
        if cfg!(debug_assertions) && self.waited_seconds >= STEP_STALL_TIMEOUT_SECONDS {
            let kind = self.kind_at(index);
            error!(
                index,
                kind,
                waited_seconds = self.waited_seconds,
                "cutscene_step_stalled"
            );
            return Err(CutsceneError::Stalled {
                index,
                kind,
                waited_seconds: self.waited_seconds,
            });
        }
        Ok(())
    }

    fn kind_at(&self, index: usize) -> &'static str {
        self.request
            .script
            .events
            .get(index)
            .map_or("unknown", EventDescriptor::kind)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use engine::Direction;

    use super::*;
    use crate::catalog::{MapDef, ScriptLocation};
    use crate::event::CutsceneScript;

    const DT: f32 = 1.0 / 60.0;

    struct Harness {
        map: MapModel,
        library: MapLibrary,
        dialogue: DialogueOverlay,
        progress: Progress,
        transition: MapTransition,
    }

    impl Harness {
        fn new() -> Self {
            let def: MapDef = serde_json::from_str(
                r#"{
                    "gameObjects": {
                        "hero": { "x": 5, "y": 6, "isPlayerControlled": true },
                        "npcA": {
                            "x": 7, "y": 6,
                            "talking": [{ "events": [
                                { "type": "questionMessage", "question": "What is your name?",
                                  "answer": "Bob",
                                  "qsnValue": {
                                      "points": 10, "badge": "Explorer Badge", "image": "img.png"
                                  } }
                            ] }]
                        }
                    }
                }"#,
            )
            .expect("decode room");
            let mut maps = BTreeMap::new();
            maps.insert(MapName::from("DemoRoom"), def.clone());
            let library = MapLibrary::new(MapName::from("DemoRoom"), maps).expect("library");
            let mut map = MapModel::from_def(MapName::from("DemoRoom"), &def).expect("map");
            map.mount();
            Self {
                map,
                library,
                dialogue: DialogueOverlay::new(0.0),
                progress: Progress::default(),
                transition: MapTransition::new(0.0),
            }
        }

        fn poll(&mut self, sequencer: &mut EventSequencer) -> Result<CutscenePoll, CutsceneError> {
            self.map.update(DT, None);
            self.dialogue.tick(DT);
            let mut ctx = CutsceneContext {
                map: &mut self.map,
                library: &mut self.library,
                dialogue: &mut self.dialogue,
                progress: &mut self.progress,
                transition: &mut self.transition,
                fixed_dt_seconds: DT,
            };
            sequencer.poll(&mut ctx)
        }

        fn request(&self, events: Vec<EventDescriptor>) -> CutsceneRequest {
            CutsceneRequest {
                map: self.map.name().clone(),
                location: ScriptLocation::Space {
                    space: GridCoord::new(0, 0),
                    sequence: 0,
                },
                script: CutsceneScript::new(events),
            }
        }

        fn quiz_request(&self) -> CutsceneRequest {
            let actor = ActorId::from("npcA");
            CutsceneRequest {
                map: self.map.name().clone(),
                location: ScriptLocation::Talking {
                    actor: actor.clone(),
                    sequence: 0,
                },
                script: self.map.actor(&actor).expect("npcA").talking()[0].clone(),
            }
        }

        fn answer(&mut self, sequencer: &mut EventSequencer, text: &str) {
            self.poll(sequencer).expect("poll");
            self.dialogue.type_text(text);
            self.dialogue.confirm();
        }

        fn dismiss_all(&mut self, sequencer: &mut EventSequencer) -> Vec<String> {
            let mut shown = Vec::new();
            while self.poll(sequencer).expect("poll") == CutscenePoll::Running {
                if let Some(panel) = self.dialogue.panel() {
                    shown.push(panel.lines[0].clone());
                    self.dialogue.confirm();
                }
            }
            shown
        }
    }

    #[test]
    fn events_run_strictly_in_order() {
        let mut harness = Harness::new();
        let hero = ActorId::hero();
        let npc = ActorId::from("npcA");
        let mut sequencer = EventSequencer::new(harness.request(vec![
            EventDescriptor::Walk {
                who: hero.clone(),
                direction: Direction::Down,
            },
            EventDescriptor::Stand {
                who: npc.clone(),
                direction: Direction::Up,
                time: Some(100),
            },
            EventDescriptor::TextMessage {
                text: "Done".to_string(),
                link: None,
                face_hero: None,
            },
        ]));

        let mut started_at: Vec<Option<u32>> = vec![None; 3];
        let mut hero_arrived_at = None;
        for tick in 0..200u32 {
            let status = harness.poll(&mut sequencer).expect("poll");
            if let Some(step) = sequencer.current_step() {
                started_at[step].get_or_insert(tick);
            }
            if hero_arrived_at.is_none()
                && harness.map.hero().map(|hero| hero.position()) == Some(GridCoord::new(5, 7))
            {
                hero_arrived_at = Some(tick);
            }
            if harness.dialogue.is_active() {
                harness.dialogue.confirm();
            }
            if status == CutscenePoll::Finished {
                break;
            }
        }

        let walk = started_at[0].expect("walk started");
        let stand = started_at[1].expect("stand started");
        let text = started_at[2].expect("text started");
        assert!(walk < stand && stand < text, "{started_at:?}");
        assert!(stand >= hero_arrived_at.expect("hero arrived"));
        assert_eq!(
            harness.map.actor(&npc).map(|actor| actor.direction()),
            Some(Direction::Up)
        );
    }

    #[test]
    fn correct_answer_grants_reward_exactly_once() {
        let mut harness = Harness::new();

        let mut first = EventSequencer::new(harness.quiz_request());
        harness.answer(&mut first, "Bob");
        let shown = harness.dismiss_all(&mut first);
        assert_eq!(
            shown,
            vec!["You have collected a badge: Explorer Badge!", CORRECT_FEEDBACK]
        );
        assert_eq!(harness.progress.money(), 10);
        assert_eq!(harness.progress.badges().len(), 1);
        assert_eq!(
            first.outcomes(),
            &[QuizOutcome {
                event_index: 0,
                is_correct: true,
                user_answer: "Bob".to_string()
            }]
        );

        let mut replay = EventSequencer::new(harness.quiz_request());
        harness.answer(&mut replay, "Bob");
        assert_eq!(harness.dismiss_all(&mut replay), vec![CORRECT_FEEDBACK]);
        assert_eq!(harness.progress.money(), 10);
        assert_eq!(harness.progress.badges().len(), 1);

        let stored = harness
            .library
            .get_mut(&MapName::from("DemoRoom"))
            .and_then(|def| {
                def.script_mut(&ScriptLocation::Talking {
                    actor: ActorId::from("npcA"),
                    sequence: 0,
                })
            })
            .and_then(|script| script.take_reward(0));
        assert_eq!(stored, None);
    }

    #[test]
    fn stale_copy_cannot_pay_twice() {
        let mut harness = Harness::new();
        let stale = harness.quiz_request();

        let mut first = EventSequencer::new(harness.quiz_request());
        harness.answer(&mut first, "Bob");
        harness.dismiss_all(&mut first);

        let mut second = EventSequencer::new(stale);
        harness.answer(&mut second, "Bob");
        harness.dismiss_all(&mut second);
        assert_eq!(harness.progress.money(), 10);
    }

    #[test]
    fn wrong_answer_grants_nothing() {
        let mut harness = Harness::new();
        let mut sequencer = EventSequencer::new(harness.quiz_request());
        harness.answer(&mut sequencer, "bob");

        assert_eq!(harness.dismiss_all(&mut sequencer), vec![INCORRECT_FEEDBACK]);
        assert_eq!(harness.progress.money(), 0);
        assert!(!harness.progress.take_autosave_request());
        assert!(!sequencer.outcomes()[0].is_correct);
    }

    #[test]
    fn unknown_actor_aborts_with_configuration_error() {
        let mut harness = Harness::new();
        let mut sequencer = EventSequencer::new(harness.request(vec![EventDescriptor::Walk {
            who: ActorId::from("ghost"),
            direction: Direction::Up,
        }]));

        assert_eq!(
            harness.poll(&mut sequencer),
            Err(CutsceneError::MissingActor {
                index: 0,
                kind: "walk",
                who: ActorId::from("ghost")
            })
        );
    }

    #[test]
    fn unknown_map_aborts_with_configuration_error() {
        let mut harness = Harness::new();
        let mut sequencer = EventSequencer::new(harness.request(vec![EventDescriptor::ChangeMap {
            map: MapName::from("Nowhere"),
            hero_x: None,
            hero_y: None,
            direction: None,
        }]));

        assert!(matches!(
            harness.poll(&mut sequencer),
            Err(CutsceneError::UnknownMap { index: 0, .. })
        ));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn walk_that_never_clears_reports_stall() {
        let mut harness = Harness::new();
        harness.map.begin_cutscene();
        let mut sequencer = EventSequencer::new(harness.request(vec![EventDescriptor::Walk {
            who: ActorId::hero(),
            direction: Direction::Right,
        }]));
        harness.map.place_hero(GridCoord::new(6, 6), Direction::Right);

        let ticks = (STEP_STALL_TIMEOUT_SECONDS / DT) as u32 + 5;
        let mut result = Ok(CutscenePoll::Running);
        for _ in 0..ticks {
            result = harness.poll(&mut sequencer);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(
            result,
            Err(CutsceneError::Stalled { index: 0, kind: "walk", .. })
        ));
    }
}
