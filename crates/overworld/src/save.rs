//! Persisted game state and its checksummed envelope.
//!
//! The body records the current map wholesale: actors, cutscene spaces,
//! walls and ledges. Loading rebuilds the map from the body alone, so world
//! changes made by cutscenes survive a save.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use engine::{sha256_hex, Direction};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actor::BehaviorAction;
use crate::event::CutsceneScript;
use crate::grid::GridCoord;
use crate::map::MapModel;
use crate::progress::{Badge, Progress};
use crate::types::{ActorId, MapName};

pub const SAVE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to encode save json: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to parse save json: {0}")]
    Parse(String),
    #[error("save checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedActor {
    pub x: i32,
    pub y: i32,
    pub direction: Direction,
    #[serde(default)]
    pub behavior_loop: Vec<BehaviorAction>,
    #[serde(default)]
    pub talking: Vec<CutsceneScript>,
}

impl SavedActor {
    pub fn position(&self) -> GridCoord {
        GridCoord::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveGame {
    pub save_version: u32,
    pub map_name: MapName,
    pub money: u32,
    pub badges: Vec<Badge>,
    pub actors: BTreeMap<ActorId, SavedActor>,
    pub cutscene_spaces: BTreeMap<GridCoord, Vec<CutsceneScript>>,
    pub walls: Vec<GridCoord>,
    pub ledges: BTreeMap<GridCoord, Direction>,
    #[serde(default)]
    pub welcome_played: bool,
    /// Maps whose welcome cutscene already ran in this playthrough.
    #[serde(default)]
    pub welcomed_maps: BTreeSet<MapName>,
}

impl SaveGame {
    /// Snapshots `map` and `progress`. Actor cells are left out of `walls`
    /// because mounting the restored map walls them off again.
    pub fn capture(map: &MapModel, progress: &Progress) -> Self {
        let actors = map
            .actors()
            .map(|actor| {
                let position = actor.position();
                (
                    actor.id().clone(),
                    SavedActor {
                        x: position.x,
                        y: position.y,
                        direction: actor.direction(),
                        behavior_loop: actor.behavior_loop().to_vec(),
                        talking: actor.talking().to_vec(),
                    },
                )
            })
            .collect();
        let walls = map
            .grid()
            .walls()
            .filter(|cell| !map.actors().any(|actor| actor.occupies(*cell)))
            .collect();

        Self {
            save_version: SAVE_VERSION,
            map_name: map.name().clone(),
            money: progress.money(),
            badges: progress.badges().to_vec(),
            actors,
            cutscene_spaces: map.cutscene_spaces().clone(),
            walls,
            ledges: map.grid().ledges().clone(),
            welcome_played: map.initial_cutscene_played(),
            welcomed_maps: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveEnvelope {
    save_version: u32,
    checksum_sha256: String,
    body: String,
}

pub fn encode(save: &SaveGame) -> Result<String, SaveError> {
    let body = serde_json::to_string(save).map_err(SaveError::Encode)?;
    let envelope = SaveEnvelope {
        save_version: save.save_version,
        checksum_sha256: sha256_hex(body.as_bytes()),
        body,
    };
    serde_json::to_string_pretty(&envelope).map_err(SaveError::Encode)
}

pub fn decode(payload: &str) -> Result<SaveGame, SaveError> {
    let envelope: SaveEnvelope = parse_json(payload)?;
    if envelope.save_version != SAVE_VERSION {
        return Err(expected_actual(
            "saveVersion",
            SAVE_VERSION,
            envelope.save_version,
        ));
    }
    let actual = sha256_hex(envelope.body.as_bytes());
    if actual != envelope.checksum_sha256 {
        return Err(SaveError::ChecksumMismatch {
            expected: envelope.checksum_sha256,
            actual,
        });
    }
    let save: SaveGame = parse_json(&envelope.body)?;
    validate(&save)?;
    Ok(save)
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, SaveError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
        let path = error.path().to_string();
        let source = error.into_inner();
        if path.is_empty() || path == "." {
            SaveError::Parse(source.to_string())
        } else {
            SaveError::Parse(format!("at {path}: {source}"))
        }
    })
}

fn validation_err(path: &str, message: impl Into<String>) -> SaveError {
    SaveError::Invalid(format!("validation failed at {path}: {}", message.into()))
}

fn expected_actual(path: &str, expected: impl Display, actual: impl Display) -> SaveError {
    validation_err(path, format!("expected {expected}, got {actual}"))
}

fn validate(save: &SaveGame) -> Result<(), SaveError> {
    if save.save_version != SAVE_VERSION {
        return Err(expected_actual(
            "saveVersion",
            SAVE_VERSION,
            save.save_version,
        ));
    }
    if save.map_name.as_str().is_empty() {
        return Err(validation_err("mapName", "must not be empty"));
    }
    if save.actors.is_empty() {
        return Err(expected_actual("actors", "at least one actor", 0));
    }

    let mut seen: BTreeMap<GridCoord, &ActorId> = BTreeMap::new();
    for (id, actor) in &save.actors {
        if let Some(first) = seen.insert(actor.position(), id) {
            return Err(validation_err(
                &format!("actors.{id}"),
                format!("shares cell {} with actors.{first}", actor.position()),
            ));
        }
    }

    let walls: BTreeSet<GridCoord> = save.walls.iter().copied().collect();
    if let Some((id, actor)) = save
        .actors
        .iter()
        .find(|(_, actor)| walls.contains(&actor.position()))
    {
        return Err(validation_err(
            &format!("actors.{id}"),
            format!("stands inside wall {}", actor.position()),
        ));
    }
    Ok(())
}
