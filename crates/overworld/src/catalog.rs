//! Map definitions loaded from `assets/maps/`.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use engine::Direction;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::actor::BehaviorAction;
use crate::event::{CutsceneScript, EventDescriptor};
use crate::grid::{GridCoord, LedgeTable};
use crate::types::{ActorId, MapName};

pub const CATALOG_FILE_NAME: &str = "catalog.json";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("map {map}: {message}")]
    Invalid { map: MapName, message: String },
    #[error("catalog start map {0} is not listed in maps")]
    UnknownStartMap(MapName),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorDef {
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub is_player_controlled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub behavior_loop: Vec<BehaviorAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub talking: Vec<CutsceneScript>,
}

impl ActorDef {
    pub fn position(&self) -> GridCoord {
        GridCoord::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_src: Option<String>,
    #[serde(default)]
    pub walls: Vec<GridCoord>,
    #[serde(default)]
    pub ledges: LedgeTable,
    #[serde(default)]
    pub cutscene_spaces: BTreeMap<GridCoord, Vec<CutsceneScript>>,
    /// Key into `cutscene_spaces` played once when the map first mounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welcome_space: Option<GridCoord>,
    pub game_objects: BTreeMap<ActorId, ActorDef>,
}

impl MapDef {
    pub fn hero(&self) -> Option<(&ActorId, &ActorDef)> {
        self.game_objects
            .iter()
            .find(|(_, actor)| actor.is_player_controlled)
    }

    pub fn script_mut(&mut self, location: &ScriptLocation) -> Option<&mut CutsceneScript> {
        match location {
            ScriptLocation::Talking { actor, sequence } => self
                .game_objects
                .get_mut(actor)
                .and_then(|def| def.talking.get_mut(*sequence)),
            ScriptLocation::Space { space, sequence } => self
                .cutscene_spaces
                .get_mut(space)
                .and_then(|scripts| scripts.get_mut(*sequence)),
        }
    }

    fn scripts(&self) -> impl Iterator<Item = &CutsceneScript> {
        self.game_objects
            .values()
            .flat_map(|actor| actor.talking.iter())
            .chain(self.cutscene_spaces.values().flatten())
    }
}

/// Where a cutscene script lives inside a map, so consumed rewards can be
/// written back to the exact event that paid them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptLocation {
    Talking { actor: ActorId, sequence: usize },
    Space { space: GridCoord, sequence: usize },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogFile {
    start_map: MapName,
    maps: Vec<MapName>,
}

/// Every map definition known to the game. The world keeps this as a live
/// copy so consumed rewards survive leaving and re-entering a map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapLibrary {
    start_map: MapName,
    maps: BTreeMap<MapName, MapDef>,
}

impl MapLibrary {
    pub fn new(start_map: MapName, maps: BTreeMap<MapName, MapDef>) -> Result<Self, CatalogError> {
        if !maps.contains_key(&start_map) {
            return Err(CatalogError::UnknownStartMap(start_map));
        }
        let library = Self { start_map, maps };
        library.validate()?;
        Ok(library)
    }

    pub fn load_from_dir(maps_dir: &Path) -> Result<Self, CatalogError> {
        let catalog_path = maps_dir.join(CATALOG_FILE_NAME);
        let catalog: CatalogFile = parse_json_file(&catalog_path)?;

        let mut maps = BTreeMap::new();
        for name in catalog.maps {
            let path = maps_dir.join(format!("{name}.json"));
            let def: MapDef = parse_json_file(&path)?;
            maps.insert(name, def);
        }
        info!(
            map_count = maps.len(),
            start_map = %catalog.start_map,
            maps_dir = %maps_dir.display(),
            "map_catalog_loaded"
        );
        Self::new(catalog.start_map, maps)
    }

    pub fn start_map(&self) -> &MapName {
        &self.start_map
    }

    pub fn with_start_map(mut self, start_map: MapName) -> Result<Self, CatalogError> {
        if !self.maps.contains_key(&start_map) {
            return Err(CatalogError::UnknownStartMap(start_map));
        }
        self.start_map = start_map;
        Ok(self)
    }

    pub fn get(&self, name: &MapName) -> Option<&MapDef> {
        self.maps.get(name)
    }

    pub fn get_mut(&mut self, name: &MapName) -> Option<&mut MapDef> {
        self.maps.get_mut(name)
    }

    pub fn contains(&self, name: &MapName) -> bool {
        self.maps.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &MapName> {
        self.maps.keys()
    }

    fn validate(&self) -> Result<(), CatalogError> {
        for (name, def) in &self.maps {
            let heroes = def
                .game_objects
                .values()
                .filter(|actor| actor.is_player_controlled)
                .count();
            if heroes != 1 {
                return Err(expected_actual(
                    name,
                    "gameObjects",
                    "exactly one player-controlled actor",
                    heroes,
                ));
            }
            if let Some(space) = def.welcome_space {
                if !def.cutscene_spaces.contains_key(&space) {
                    return Err(validation_err(
                        name,
                        "welcomeSpace",
                        format!("{space} has no entry in cutsceneSpaces"),
                    ));
                }
            }
            for script in def.scripts() {
                for event in &script.events {
                    if let EventDescriptor::ChangeMap { map, .. } = event {
                        if !self.maps.contains_key(map) {
                            warn!(
                                map = %name,
                                target = %map,
                                "map_catalog_unknown_change_map_target"
                            );
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CatalogError> {
    let raw = fs::read_to_string(path).map_err(|source| CatalogError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let mut deserializer = serde_json::Deserializer::from_str(&raw);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
        let at = error.path().to_string();
        let source = error.into_inner();
        let message = if at.is_empty() || at == "." {
            source.to_string()
        } else {
            format!("at {at}: {source}")
        };
        CatalogError::Parse {
            path: path.to_path_buf(),
            message,
        }
    })
}

fn validation_err(map: &MapName, path: &str, message: impl Into<String>) -> CatalogError {
    CatalogError::Invalid {
        map: map.clone(),
        message: format!("validation failed at {path}: {}", message.into()),
    }
}

fn expected_actual(
    map: &MapName,
    path: &str,
    expected: impl Display,
    actual: impl Display,
) -> CatalogError {
    validation_err(map, path, format!("expected {expected}, got {actual}"))
}
