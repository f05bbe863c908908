//! A mounted map: grid, actors and cutscene triggers.

use std::collections::BTreeMap;

use engine::Direction;
use tracing::debug;

use crate::actor::{
    ActorState, BehaviorAction, BehaviorRequest, BehaviorSource, BehaviorTicket, StepOutcome,
};
use crate::catalog::{ActorDef, MapDef, ScriptLocation};
use crate::event::{CutsceneScript, QuizReward};
use crate::grid::{GridCoord, GridIndex};
use crate::save::SaveGame;
use crate::types::{ActorId, MapName, HERO_ID};
use crate::world::WorldError;

/// A cutscene claimed by a trigger, ready to hand to the sequencer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutsceneRequest {
    pub map: MapName,
    pub location: ScriptLocation,
    pub script: CutsceneScript,
}

#[derive(Debug, Clone)]
pub struct MapModel {
    name: MapName,
    lower_src: Option<String>,
    upper_src: Option<String>,
    grid: GridIndex,
    actors: BTreeMap<ActorId, ActorState>,
    hero_id: ActorId,
    cutscene_spaces: BTreeMap<GridCoord, Vec<CutsceneScript>>,
    welcome_space: Option<GridCoord>,
    mounted: bool,
    initial_cutscene_played: bool,
    cutscene_playing: bool,
    next_ticket: u64,
    hero_stepped: bool,
}

fn actor_from_def(id: &ActorId, def: &ActorDef) -> ActorState {
    ActorState::new(id.clone(), def.position(), def.direction)
        .with_player_control(def.is_player_controlled)
        .with_sprite(def.src.clone())
        .with_behavior_loop(def.behavior_loop.clone())
        .with_talking(def.talking.clone())
}

impl MapModel {
    pub fn from_def(name: MapName, def: &MapDef) -> Result<Self, WorldError> {
        let actors: BTreeMap<ActorId, ActorState> = def
            .game_objects
            .iter()
            .map(|(id, actor)| (id.clone(), actor_from_def(id, actor)))
            .collect();
        Self::assemble(
            name,
            def,
            actors,
            GridIndex::new(def.walls.iter().copied(), def.ledges.clone().into_directed()),
            def.cutscene_spaces.clone(),
            false,
        )
    }

    /// Rebuilds the map recorded in `save`, using `def` only for what saves
    /// do not carry (layer images, sprites, which actor is the hero).
    pub fn restore(def: &MapDef, save: &SaveGame) -> Result<Self, WorldError> {
        let actors = save
            .actors
            .iter()
            .map(|(id, saved)| {
                let base = def.game_objects.get(id);
                let actor = ActorState::new(id.clone(), saved.position(), saved.direction)
                    .with_player_control(base.map_or(id.as_str() == HERO_ID, |def| {
                        def.is_player_controlled
                    }))
                    .with_sprite(base.and_then(|def| def.src.clone()))
                    .with_behavior_loop(saved.behavior_loop.clone())
                    .with_talking(saved.talking.clone());
                (id.clone(), actor)
            })
            .collect();
        Self::assemble(
            save.map_name.clone(),
            def,
            actors,
            GridIndex::new(save.walls.iter().copied(), save.ledges.clone()),
            save.cutscene_spaces.clone(),
            save.welcome_played,
        )
    }

    fn assemble(
        name: MapName,
        def: &MapDef,
        actors: BTreeMap<ActorId, ActorState>,
        grid: GridIndex,
        cutscene_spaces: BTreeMap<GridCoord, Vec<CutsceneScript>>,
        initial_cutscene_played: bool,
    ) -> Result<Self, WorldError> {
        let hero_id = actors
            .values()
            .find(|actor| actor.is_player_controlled())
            .map(|actor| actor.id().clone())
            .ok_or_else(|| WorldError::MissingHero { map: name.clone() })?;
        Ok(Self {
            name,
            lower_src: def.lower_src.clone(),
            upper_src: def.upper_src.clone(),
            grid,
            actors,
            hero_id,
            cutscene_spaces,
            welcome_space: def.welcome_space,
            mounted: false,
            initial_cutscene_played,
            cutscene_playing: false,
            next_ticket: 0,
            hero_stepped: false,
        })
    }

    pub fn name(&self) -> &MapName {
        &self.name
    }

    pub fn lower_src(&self) -> Option<&str> {
        self.lower_src.as_deref()
    }

    pub fn upper_src(&self) -> Option<&str> {
        self.upper_src.as_deref()
    }

    pub fn grid(&self) -> &GridIndex {
        &self.grid
    }

    pub fn actors(&self) -> impl Iterator<Item = &ActorState> {
        self.actors.values()
    }

    pub fn actor(&self, id: &ActorId) -> Option<&ActorState> {
        self.actors.get(id)
    }

    pub fn contains_actor(&self, id: &ActorId) -> bool {
        self.actors.contains_key(id)
    }

    pub fn hero(&self) -> Option<&ActorState> {
        self.actors.get(&self.hero_id)
    }

    pub fn hero_id(&self) -> &ActorId {
        &self.hero_id
    }

    pub fn cutscene_spaces(&self) -> &BTreeMap<GridCoord, Vec<CutsceneScript>> {
        &self.cutscene_spaces
    }

    pub fn initial_cutscene_played(&self) -> bool {
        self.initial_cutscene_played
    }

    pub fn mark_welcome_played(&mut self) {
        self.initial_cutscene_played = true;
    }

    /// True when `location` names this map's welcome script.
    pub fn is_welcome(&self, location: &ScriptLocation) -> bool {
        match location {
            ScriptLocation::Space { space, sequence: 0 } => Some(*space) == self.welcome_space,
            _ => false,
        }
    }

    pub fn is_cutscene_playing(&self) -> bool {
        self.cutscene_playing
    }

    /// True when `mover` may not step from `from` toward `direction`.
    pub fn is_space_taken(&self, mover: &ActorId, from: GridCoord, direction: Direction) -> bool {
        if self.grid.is_blocked(from, direction) {
            return true;
        }
        let destination = from.step(direction);
        self.actors
            .values()
            .any(|actor| actor.id() != mover && actor.occupies(destination))
    }

    /// Marks every actor cell as a wall and claims the welcome cutscene the
    /// first time the map is mounted. The caller decides whether it can start
    /// now or must wait behind a running cutscene.
    pub fn mount(&mut self) -> Option<CutsceneRequest> {
        if !self.mounted {
            for actor in self.actors.values() {
                self.grid.add_wall(actor.position());
            }
            self.mounted = true;
            debug!(map = %self.name, actors = self.actors.len(), "map_mounted");
        }
        if self.initial_cutscene_played {
            return None;
        }
        self.initial_cutscene_played = true;
        let space = self.welcome_space?;
        self.request_for_space(space)
    }

    /// Moves the hero before or after mounting, keeping its wall in step.
    pub fn place_hero(&mut self, position: GridCoord, direction: Direction) {
        let mounted = self.mounted;
        let Some(hero) = self.actors.get_mut(&self.hero_id) else {
            return;
        };
        if mounted {
            self.grid.remove_wall(hero.position());
            self.grid.add_wall(position);
        }
        hero.place(position, direction);
    }

    /// Frees the hero's cell on a map that is being left.
    pub fn retire(&mut self) {
        if let Some(hero) = self.actors.get(&self.hero_id) {
            let position = hero.position();
            self.grid.remove_wall(position);
            debug!(map = %self.name, cell = %position, "map_retired");
        }
    }

    pub fn check_for_action_cutscene(&mut self) -> Option<CutsceneRequest> {
        if self.cutscene_playing {
            return None;
        }
        let hero = self.actors.get(&self.hero_id)?;
        if hero.is_walking() {
            return None;
        }
        let ahead = hero.position().step(hero.direction());
        let target = self
            .actors
            .values()
            .find(|actor| actor.id() != &self.hero_id && actor.position() == ahead)?;
        let script = target.talking().first()?.clone();
        let request = CutsceneRequest {
            map: self.name.clone(),
            location: ScriptLocation::Talking {
                actor: target.id().clone(),
                sequence: 0,
            },
            script,
        };
        self.begin_cutscene();
        Some(request)
    }

    pub fn check_for_footstep_cutscene(&mut self) -> Option<CutsceneRequest> {
        if self.cutscene_playing {
            return None;
        }
        let position = self.actors.get(&self.hero_id)?.position();
        if Some(position) == self.welcome_space {
            return None;
        }
        let request = self.request_for_space(position)?;
        self.begin_cutscene();
        Some(request)
    }

    fn request_for_space(&self, space: GridCoord) -> Option<CutsceneRequest> {
        let script = self.cutscene_spaces.get(&space)?.first()?.clone();
        Some(CutsceneRequest {
            map: self.name.clone(),
            location: ScriptLocation::Space { space, sequence: 0 },
            script,
        })
    }

    /// Claims the cutscene slot if it is free.
    pub fn try_begin_cutscene(&mut self) -> bool {
        if self.cutscene_playing {
            return false;
        }
        self.begin_cutscene();
        true
    }

    pub fn begin_cutscene(&mut self) {
        self.cutscene_playing = true;
        for actor in self.actors.values_mut() {
            actor.suspend_idle();
        }
    }

    pub fn finish_cutscene(&mut self) {
        self.cutscene_playing = false;
        for actor in self.actors.values_mut() {
            actor.rearm_idle();
        }
    }

    /// Turns `who` toward the hero, the way an addressed NPC looks back.
    pub fn face_hero(&mut self, who: &ActorId) -> bool {
        let Some(hero_direction) = self.hero().map(ActorState::direction) else {
            return false;
        };
        match self.actors.get_mut(who) {
            Some(actor) => {
                actor.face(hero_direction.opposite());
                true
            }
            None => false,
        }
    }

    /// Queues a scripted behavior and returns the ticket its completion will
    /// carry, or `None` if no such actor is on this map.
    pub fn command(&mut self, who: &ActorId, action: BehaviorAction) -> Option<BehaviorTicket> {
        if !self.actors.contains_key(who) {
            return None;
        }
        let ticket = BehaviorTicket::new(self.next_ticket);
        self.next_ticket += 1;
        let request = BehaviorRequest {
            source: BehaviorSource::Scripted(ticket),
            action,
        };
        self.start_behavior(who, request);
        Some(ticket)
    }

    pub fn take_completion(&mut self, who: &ActorId, ticket: BehaviorTicket) -> bool {
        self.actors
            .get_mut(who)
            .is_some_and(|actor| actor.take_completion(ticket))
    }

    pub fn take_quiz_reward(
        &mut self,
        location: &ScriptLocation,
        event_index: usize,
    ) -> Option<QuizReward> {
        let script = match location {
            ScriptLocation::Talking { actor, sequence } => self
                .actors
                .get_mut(actor)
                .and_then(|actor| actor.talking_mut().get_mut(*sequence)),
            ScriptLocation::Space { space, sequence } => self
                .cutscene_spaces
                .get_mut(space)
                .and_then(|scripts| scripts.get_mut(*sequence)),
        }?;
        script.take_reward(event_index)
    }

    /// True once since the last call if the hero finished a step.
    pub fn take_hero_stepped(&mut self) -> bool {
        std::mem::take(&mut self.hero_stepped)
    }

    /// Advances every actor by one tick. `hero_intent` is the held direction
    /// and is ignored while a cutscene runs.
    pub fn update(&mut self, fixed_dt_seconds: f32, hero_intent: Option<Direction>) {
        let ids: Vec<ActorId> = self.actors.keys().cloned().collect();
        for id in ids {
            self.update_actor(&id, fixed_dt_seconds, hero_intent);
        }
    }

    fn update_actor(
        &mut self,
        id: &ActorId,
        fixed_dt_seconds: f32,
        hero_intent: Option<Direction>,
    ) {
        let cutscene_playing = self.cutscene_playing;
        let Some(actor) = self.actors.get_mut(id) else {
            return;
        };

        if let Some(StepOutcome::Walked { to }) = actor.advance(fixed_dt_seconds) {
            if actor.is_player_controlled() {
                self.hero_stepped = true;
                debug!(map = %self.name, cell = %to, "hero_step_completed");
            }
        }

        if let Some(request) = actor.take_blocked() {
            self.start_behavior(id, request);
            return;
        }
        if !actor.is_idle() {
            return;
        }

        let next = if let Some(request) = actor.take_deferred() {
            Some(request)
        } else if actor.is_player_controlled() {
            hero_intent
                .filter(|_| !cutscene_playing)
                .map(|direction| BehaviorRequest {
                    source: BehaviorSource::Player,
                    action: BehaviorAction::Walk {
                        direction,
                        retry: false,
                    },
                })
        } else {
            actor.next_idle_action().map(|action| BehaviorRequest {
                source: BehaviorSource::IdleLoop,
                action,
            })
        };
        if let Some(request) = next {
            self.start_behavior(id, request);
        }
    }

    fn start_behavior(&mut self, id: &ActorId, request: BehaviorRequest) {
        let Some(actor) = self.actors.get_mut(id) else {
            return;
        };
        if actor.must_defer(&request) {
            actor.defer(request);
            return;
        }

        match request.action {
            BehaviorAction::Stand { direction, time } => {
                actor.begin_stand(request.source, direction, time);
            }
            BehaviorAction::Walk { direction, .. } => {
                actor.face(direction);
                let from = actor.position();
                let taken = self.is_space_taken(id, from, direction);
                let Some(actor) = self.actors.get_mut(id) else {
                    return;
                };
                if taken {
                    if request.retries() {
                        actor.wait_to_retry(request);
                    } else {
                        actor.abandon(&request);
                    }
                    return;
                }
                self.grid.move_wall(from, direction);
                actor.begin_walk(request.source, direction);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventDescriptor;

    const DT: f32 = 1.0 / 60.0;

    fn room() -> MapDef {
        serde_json::from_str(
            r#"{
                "walls": ["5,8"],
                "ledges": { "3,3": "up" },
                "welcomeSpace": "5,6",
                "cutsceneSpaces": {
                    "5,6": [{ "events": [{ "type": "textMessage", "text": "Welcome" }] }],
                    "6,6": [{ "events": [{ "type": "textMessage", "text": "Stepped" }] }]
                },
                "gameObjects": {
                    "hero": { "x": 5, "y": 6, "isPlayerControlled": true },
                    "npcA": {
                        "x": 5, "y": 5,
                        "talking": [{ "events": [{ "type": "textMessage", "text": "Hi" }] }]
                    },
                    "npcB": {
                        "x": 8, "y": 6,
                        "behaviorLoop": [
                            { "type": "walk", "direction": "left" },
                            { "type": "stand", "direction": "up", "time": 100 }
                        ]
                    }
                }
            }"#,
        )
        .expect("decode room")
    }

    fn mounted_room() -> MapModel {
        let mut map = MapModel::from_def(MapName::from("DemoRoom"), &room()).expect("map");
        map.mount();
        map
    }

    fn run(map: &mut MapModel, ticks: u32, intent: Option<Direction>) {
        for _ in 0..ticks {
            map.update(DT, intent);
        }
    }

    #[test]
    fn mount_walls_off_actor_cells_and_claims_welcome_once() {
        let mut map = MapModel::from_def(MapName::from("DemoRoom"), &room()).expect("map");
        let welcome = map.mount().expect("welcome cutscene");

        assert_eq!(
            welcome.location,
            ScriptLocation::Space {
                space: GridCoord::new(5, 6),
                sequence: 0
            }
        );
        assert!(map.grid().is_wall(GridCoord::new(5, 5)));
        assert!(map.grid().is_wall(GridCoord::new(8, 6)));
        assert_eq!(map.mount(), None);
    }

    #[test]
    fn walls_and_actors_block_movement() {
        let map = mounted_room();
        let hero = ActorId::hero();

        assert!(map.is_space_taken(&hero, GridCoord::new(5, 7), Direction::Down));
        assert!(map.is_space_taken(&hero, GridCoord::new(5, 6), Direction::Up));
        assert!(map.is_space_taken(&hero, GridCoord::new(3, 3), Direction::Up));
        assert!(!map.is_space_taken(&hero, GridCoord::new(5, 6), Direction::Left));
    }

    #[test]
    fn hero_walks_one_cell_and_moves_its_wall() {
        let mut map = mounted_room();
        run(&mut map, 1, Some(Direction::Left));
        assert!(map.grid().is_wall(GridCoord::new(4, 6)));
        assert!(!map.grid().is_wall(GridCoord::new(5, 6)));

        run(&mut map, 16, None);
        let hero = map.hero().expect("hero");
        assert_eq!(hero.position(), GridCoord::new(4, 6));
        assert!(map.take_hero_stepped());
        assert!(!map.take_hero_stepped());
    }

    #[test]
    fn blocked_hero_only_turns() {
        let mut map = mounted_room();
        run(&mut map, 1, Some(Direction::Up));
        let hero = map.hero().expect("hero");

        assert_eq!(hero.position(), GridCoord::new(5, 6));
        assert_eq!(hero.direction(), Direction::Up);
        assert!(hero.is_idle());
    }

    #[test]
    fn talk_starts_once_and_guard_blocks_second_trigger() {
        let mut map = mounted_room();
        map.place_hero(GridCoord::new(5, 6), Direction::Up);

        let request = map.check_for_action_cutscene().expect("talk cutscene");
        assert_eq!(
            request.script.events,
            vec![EventDescriptor::TextMessage {
                text: "Hi".to_string(),
                link: None,
                face_hero: None
            }]
        );
        assert!(map.is_cutscene_playing());
        assert_eq!(map.check_for_action_cutscene(), None);
        assert_eq!(map.check_for_footstep_cutscene(), None);

        map.finish_cutscene();
        assert!(map.check_for_action_cutscene().is_some());
    }

    #[test]
    fn footstep_cutscene_fires_on_registered_cell_but_not_welcome_cell() {
        let mut map = mounted_room();
        assert_eq!(map.check_for_footstep_cutscene(), None);

        map.place_hero(GridCoord::new(6, 6), Direction::Right);
        let request = map.check_for_footstep_cutscene().expect("footstep");
        assert_eq!(
            request.location,
            ScriptLocation::Space {
                space: GridCoord::new(6, 6),
                sequence: 0
            }
        );
    }

    #[test]
    fn idle_loop_runs_and_pauses_during_cutscenes() {
        let mut map = mounted_room();
        let npc = ActorId::from("npcB");

        run(&mut map, 17, None);
        assert_eq!(map.actor(&npc).map(ActorState::position), Some(GridCoord::new(7, 6)));

        map.begin_cutscene();
        run(&mut map, 120, None);
        let parked = map.actor(&npc).map(ActorState::position);
        run(&mut map, 120, None);
        assert_eq!(map.actor(&npc).map(ActorState::position), parked);
    }

    #[test]
    fn idle_walk_into_another_actor_is_abandoned() {
        let mut map = mounted_room();
        let npc = ActorId::from("npcB");
        map.place_hero(GridCoord::new(7, 6), Direction::Down);

        run(&mut map, 1, None);
        let actor = map.actor(&npc).expect("npcB");
        assert_eq!(actor.position(), GridCoord::new(8, 6));
        assert_eq!(actor.direction(), Direction::Left);
    }

    #[test]
    fn scripted_walk_waits_until_path_clears() {
        let mut map = mounted_room();
        let npc = ActorId::from("npcA");
        map.begin_cutscene();

        let ticket = map
            .command(
                &npc,
                BehaviorAction::Walk {
                    direction: Direction::Down,
                    retry: true,
                },
            )
            .expect("ticket");
        run(&mut map, 40, None);
        assert!(!map.take_completion(&npc, ticket));

        map.place_hero(GridCoord::new(4, 6), Direction::Left);
        run(&mut map, 17, None);
        assert!(map.take_completion(&npc, ticket));
        assert_eq!(map.actor(&npc).map(ActorState::position), Some(GridCoord::new(5, 6)));
    }

    #[test]
    fn command_for_unknown_actor_yields_no_ticket() {
        let mut map = mounted_room();
        assert_eq!(
            map.command(
                &ActorId::from("ghost"),
                BehaviorAction::Stand {
                    direction: Direction::Up,
                    time: None
                }
            ),
            None
        );
    }

    #[test]
    fn retire_frees_the_hero_cell() {
        let mut map = mounted_room();
        assert!(map.grid().is_wall(GridCoord::new(5, 6)));
        map.retire();
        assert!(!map.grid().is_wall(GridCoord::new(5, 6)));
    }

    #[test]
    fn face_hero_turns_npc_opposite_to_hero() {
        let mut map = mounted_room();
        map.place_hero(GridCoord::new(5, 6), Direction::Up);
        assert!(map.face_hero(&ActorId::from("npcA")));
        assert_eq!(
            map.actor(&ActorId::from("npcA")).map(ActorState::direction),
            Some(Direction::Down)
        );
    }
}
