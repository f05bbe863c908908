//! The live world: active map, running cutscene, score and overlays.

use std::collections::{BTreeSet, VecDeque};

use engine::{FrameDraw, InputSnapshot, LayerDraw, PixelPoint, SpriteDraw, TextPanel, CELL_PX};
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::MapLibrary;
use crate::config::GameConfig;
use crate::dialogue::DialogueOverlay;
use crate::map::{CutsceneRequest, MapModel};
use crate::progress::Progress;
use crate::save::SaveGame;
use crate::sequencer::{CutsceneContext, CutsceneError, CutscenePoll, EventSequencer, QuizOutcome};
use crate::transition::{MapChange, MapTransition};
use crate::types::MapName;

const WALL_COLOR: [u8; 4] = [70, 72, 96, 255];
const LEDGE_COLOR: [u8; 4] = [150, 110, 60, 255];
const HERO_COLOR: [u8; 4] = [60, 140, 230, 255];
const NPC_COLOR: [u8; 4] = [230, 150, 60, 255];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorldError {
    #[error("map {map} is not in the catalog")]
    UnknownMap { map: MapName },
    #[error("map {map} has no player-controlled actor")]
    MissingHero { map: MapName },
}

impl WorldError {
    /// The cutscene failure for a map change requested by event `index`.
    pub fn at_event(self, index: usize) -> CutsceneError {
        match self {
            WorldError::UnknownMap { map } => CutsceneError::UnknownMap { index, map },
            WorldError::MissingHero { map } => CutsceneError::MissingHero { index, map },
        }
    }
}

#[derive(Debug)]
pub struct WorldController {
    library: MapLibrary,
    map: MapModel,
    progress: Progress,
    dialogue: DialogueOverlay,
    transition: MapTransition,
    cutscene: Option<EventSequencer>,
    queued: VecDeque<CutsceneRequest>,
    quiz_outcomes: Vec<QuizOutcome>,
    welcomed: BTreeSet<MapName>,
    paused: bool,
}

impl WorldController {
    /// Starts a fresh game on the library's start map. Its welcome cutscene
    /// begins on the first tick.
    pub fn new_game(library: MapLibrary, config: &GameConfig) -> Result<Self, WorldError> {
        let start = library.start_map().clone();
        let def = library
            .get(&start)
            .ok_or_else(|| WorldError::UnknownMap { map: start.clone() })?;
        let map = MapModel::from_def(start, def)?;
        let mut world = Self::assemble(library, map, Progress::default(), config);
        world.mount_current();
        info!(map = %world.map.name(), "world_started");
        Ok(world)
    }

    /// Rebuilds a world from a decoded save. Nothing is shared with any
    /// running world, so a failure here leaves the caller's state alone.
    pub fn from_save(
        mut library: MapLibrary,
        config: &GameConfig,
        save: &SaveGame,
    ) -> Result<Self, WorldError> {
        let def = library
            .get_mut(&save.map_name)
            .ok_or_else(|| WorldError::UnknownMap {
                map: save.map_name.clone(),
            })?;
        // Saved scripts carry consumed rewards; keep the definition in step
        // so leaving and re-entering the map cannot pay them again.
        def.cutscene_spaces = save.cutscene_spaces.clone();
        for (id, saved) in &save.actors {
            if let Some(actor) = def.game_objects.get_mut(id) {
                actor.talking = saved.talking.clone();
            }
        }
        let map = MapModel::restore(def, save)?;
        let progress = Progress::restored(save.money, save.badges.clone());
        let mut world = Self::assemble(library, map, progress, config);
        world.welcomed = save.welcomed_maps.clone();
        world.mount_current();
        info!(map = %save.map_name, money = save.money, "world_restored");
        Ok(world)
    }

    fn assemble(
        library: MapLibrary,
        map: MapModel,
        progress: Progress,
        config: &GameConfig,
    ) -> Self {
        Self {
            library,
            map,
            progress,
            dialogue: DialogueOverlay::new(config.text_seconds_per_char),
            transition: MapTransition::new(config.transition_phase_seconds),
            cutscene: None,
            queued: VecDeque::new(),
            quiz_outcomes: Vec::new(),
            welcomed: BTreeSet::new(),
            paused: false,
        }
    }

    /// Mounts the active map. A welcome cutscene plays at most once per map
    /// per playthrough, even when the map is rebuilt on re-entry. A welcome
    /// that is queued and then dropped counts as not played.
    fn mount_current(&mut self) {
        if self.welcomed.contains(self.map.name()) {
            self.map.mark_welcome_played();
        } else if self.map.initial_cutscene_played() {
            // Restored from a save taken after the welcome.
            self.welcomed.insert(self.map.name().clone());
        }
        if let Some(welcome) = self.map.mount() {
            self.offer_cutscene(welcome);
        }
    }

    pub fn map(&self) -> &MapModel {
        &self.map
    }

    pub fn library(&self) -> &MapLibrary {
        &self.library
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn dialogue(&self) -> &DialogueOverlay {
        &self.dialogue
    }

    pub fn is_cutscene_running(&self) -> bool {
        self.cutscene.is_some()
    }

    pub fn quiz_outcomes(&self) -> &[QuizOutcome] {
        &self.quiz_outcomes
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            info!(map = %self.map.name(), "world_paused");
        }
    }

    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            info!(map = %self.map.name(), "world_resumed");
        }
    }

    pub fn take_autosave_request(&mut self) -> bool {
        self.progress.take_autosave_request()
    }

    pub fn snapshot(&self) -> SaveGame {
        let mut save = SaveGame::capture(&self.map, &self.progress);
        save.welcomed_maps = self.welcomed.clone();
        save
    }

    /// One fixed step: overlays, triggers, actors, transition, then the
    /// running cutscene.
    pub fn tick(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot) {
        if self.paused {
            return;
        }

        self.dialogue.tick(fixed_dt_seconds);
        if self.dialogue.is_active() {
            self.dialogue.type_text(input.typed_text());
            if input.backspace_pressed() {
                self.dialogue.backspace();
            }
            if input.confirm_pressed() {
                self.dialogue.confirm();
            }
        } else if input.confirm_pressed() && !self.transition.is_active() {
            if let Some(request) = self.map.check_for_action_cutscene() {
                self.start_cutscene(request);
            }
        }

        let hero_intent = if self.transition.is_active() || self.dialogue.is_active() {
            None
        } else {
            input.direction()
        };
        self.map.update(fixed_dt_seconds, hero_intent);

        if self.map.take_hero_stepped() {
            if let Some(request) = self.map.check_for_footstep_cutscene() {
                self.start_cutscene(request);
            }
        }

        if let Some((id, change)) = self.transition.advance(fixed_dt_seconds) {
            match self.change_map(change) {
                Ok(_) => self.transition.mark_swapped(id),
                Err(error) => {
                    self.transition.cancel();
                    let error = self.swap_failure(error);
                    self.abort_cutscene(error);
                }
            }
        }

        self.poll_cutscene(fixed_dt_seconds);
    }

    /// Replaces the active map. The outgoing map is returned with the hero's
    /// cell freed; the incoming map is mounted before anything else runs on it.
    pub fn change_map(&mut self, change: MapChange) -> Result<MapModel, WorldError> {
        let def = self
            .library
            .get(&change.map)
            .ok_or_else(|| WorldError::UnknownMap {
                map: change.map.clone(),
            })?;
        let (default_position, default_direction) = def
            .hero()
            .map(|(_, hero)| (hero.position(), hero.direction))
            .ok_or_else(|| WorldError::MissingHero {
                map: change.map.clone(),
            })?;
        let mut next = MapModel::from_def(change.map.clone(), def)?;
        next.place_hero(
            change.hero_position.unwrap_or(default_position),
            change.hero_direction.unwrap_or(default_direction),
        );
        if self.cutscene.is_some() {
            next.begin_cutscene();
        }

        let mut retired = std::mem::replace(&mut self.map, next);
        retired.retire();
        info!(from = %retired.name(), to = %change.map, "map_changed");
        self.mount_current();
        Ok(retired)
    }

    fn offer_cutscene(&mut self, request: CutsceneRequest) {
        if self.cutscene.is_none() && self.map.try_begin_cutscene() {
            self.start_cutscene(request);
        } else {
            info!(map = %request.map, "cutscene_queued");
            self.queued.push_back(request);
        }
    }

    fn start_cutscene(&mut self, request: CutsceneRequest) {
        if &request.map == self.map.name() && self.map.is_welcome(&request.location) {
            self.welcomed.insert(request.map.clone());
        }
        self.cutscene = Some(EventSequencer::new(request));
    }

    fn poll_cutscene(&mut self, fixed_dt_seconds: f32) {
        let Some(sequencer) = self.cutscene.as_mut() else {
            return;
        };
        let mut ctx = CutsceneContext {
            map: &mut self.map,
            library: &mut self.library,
            dialogue: &mut self.dialogue,
            progress: &mut self.progress,
            transition: &mut self.transition,
            fixed_dt_seconds,
        };
        match sequencer.poll(&mut ctx) {
            Ok(CutscenePoll::Running) => {}
            Ok(CutscenePoll::Finished) => {
                info!(map = %self.map.name(), "cutscene_finished");
                self.end_cutscene();
            }
            Err(error) => self.abort_cutscene(error),
        }
    }

    /// Attributes a failed swap to the map-change step that is waiting on it.
    fn swap_failure(&self, error: WorldError) -> CutsceneError {
        let index = self
            .cutscene
            .as_ref()
            .and_then(EventSequencer::current_step)
            .unwrap_or_default();
        error.at_event(index)
    }

    fn abort_cutscene(&mut self, error: CutsceneError) {
        warn!(map = %self.map.name(), error = %error, "cutscene_aborted");
        self.dialogue.clear();
        self.end_cutscene();
    }

    fn end_cutscene(&mut self) {
        if let Some(sequencer) = self.cutscene.take() {
            self.quiz_outcomes.extend(sequencer.into_outcomes());
        }
        self.map.finish_cutscene();

        while let Some(next) = self.queued.pop_front() {
            if &next.map != self.map.name() {
                info!(map = %next.map, "cutscene_dropped_for_inactive_map");
                continue;
            }
            self.map.begin_cutscene();
            self.start_cutscene(next);
            break;
        }
    }

    /// Draw list for the current state, camera centred on the hero.
    pub fn frame(&self) -> FrameDraw {
        let camera_px = self
            .map
            .hero()
            .map(|hero| {
                let position = hero.pixel_position();
                PixelPoint::new(position.x + CELL_PX / 2, position.y + CELL_PX / 2)
            })
            .unwrap_or_default();

        let occupied = |cell| self.map.actors().any(|actor| actor.occupies(cell));
        let mut fallback_cells: Vec<(PixelPoint, [u8; 4])> = self
            .map
            .grid()
            .walls()
            .filter(|cell| !occupied(*cell))
            .map(|cell| (cell.to_pixels(), WALL_COLOR))
            .collect();
        fallback_cells.extend(
            self.map
                .grid()
                .ledges()
                .keys()
                .map(|cell| (cell.to_pixels(), LEDGE_COLOR)),
        );

        let sprites = self
            .map
            .actors()
            .map(|actor| {
                let (frame_column, frame_row) = actor.sprite_frame();
                SpriteDraw {
                    image_key: actor.sprite().map(str::to_string),
                    position_px: actor.pixel_position(),
                    facing: actor.direction(),
                    frame_column,
                    frame_row,
                    fallback_color: if actor.is_player_controlled() {
                        HERO_COLOR
                    } else {
                        NPC_COLOR
                    },
                }
            })
            .collect();

        let panels: Vec<TextPanel> = self.dialogue.panel().into_iter().collect();
        let mut frame = FrameDraw {
            camera_px,
            lower: LayerDraw {
                image_key: self.map.lower_src().map(str::to_string),
                fallback_cells,
            },
            sprites,
            upper: LayerDraw {
                image_key: self.map.upper_src().map(str::to_string),
                fallback_cells: Vec::new(),
            },
            fade_alpha: self.transition.fade_alpha(),
            panels,
        };
        frame.sort_sprites_by_depth();
        frame
    }
}
