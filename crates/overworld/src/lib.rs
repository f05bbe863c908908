//! Tile-based overworld: grid movement, scripted cutscenes, quizzes and
//! checksummed saves, hosted by the `engine` crate.

pub mod actor;
pub mod catalog;
pub mod config;
pub mod dialogue;
pub mod event;
pub mod grid;
pub mod map;
pub mod persistence;
pub mod progress;
pub mod save;
pub mod sequencer;
pub mod session;
pub mod transition;
pub mod types;
pub mod world;

pub use catalog::{CatalogError, MapLibrary};
pub use config::GameConfig;
pub use persistence::{AuthBackend, BackendError, LocalProfileBackend, SaveStore};
pub use save::{SaveError, SaveGame};
pub use session::{GameSession, SessionAction, SessionError};
pub use world::{WorldController, WorldError};
