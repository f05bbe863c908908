//! Sign-in, title and pause menus, and save/load around a [`WorldController`].
//!
//! Input handling is synchronous and yields a [`SessionAction`] whenever a
//! collaborator call is needed; the host awaits [`GameSession::perform`].

use std::sync::Arc;

use engine::{FrameDraw, InputSnapshot, PanelAnchor, TextPanel};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::catalog::{CatalogError, MapLibrary};
use crate::config::GameConfig;
use crate::persistence::{AuthBackend, BackendError, SaveStore, UserSession, LOCAL_PROVIDER};
use crate::save::{self, SaveError};
use crate::world::{WorldController, WorldError};

pub const SAVED_NOTICE: &str = "Game saved successfully!";
pub const SAVE_FAILED_NOTICE: &str = "Failed to save game.";
pub const LOADED_NOTICE: &str = "Game loaded successfully!";
pub const NO_SAVE_NOTICE: &str = "No saved game data found.";
pub const LOAD_FAILED_NOTICE: &str = "Failed to load game.";
pub const SIGN_IN_FAILED_NOTICE: &str = "Failed to sign in.";
pub const NEW_GAME_FAILED_NOTICE: &str = "Failed to start a new game.";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Save(#[from] SaveError),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error("no player is signed in")]
    SignedOut,
    #[error("no game is running")]
    NoWorld,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuKind {
    SignIn,
    Title,
    Pause,
}

impl MenuKind {
    fn items(self) -> &'static [&'static str] {
        match self {
            Self::SignIn => &["Sign In", "Quit"],
            Self::Title => &["New Game", "Load Game", "Sign Out"],
            Self::Pause => &["Save Game", "Load Game", "Resume"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    SignIn,
    NewGame,
    LoadGame,
    SaveGame { autosave: bool },
    SignOut,
    /// Close the game. The host owns the window, so performing this is a no-op.
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Menu {
    kind: MenuKind,
    selected: usize,
}

impl Menu {
    fn new(kind: MenuKind) -> Self {
        Self { kind, selected: 0 }
    }

    fn step(&mut self, up: bool) {
        let len = self.kind.items().len();
        self.selected = if up {
            (self.selected + len - 1) % len
        } else {
            (self.selected + 1) % len
        };
    }
}

pub struct GameSession {
    auth: Arc<dyn AuthBackend>,
    store: Arc<dyn SaveStore>,
    catalog: MapLibrary,
    config: GameConfig,
    user: Option<UserSession>,
    world: Option<WorldController>,
    menu: Option<Menu>,
    notice: Option<String>,
}

impl GameSession {
    /// `catalog` is the pristine map library; every new game and every load
    /// starts from a fresh copy of it.
    pub fn new(
        auth: Arc<dyn AuthBackend>,
        store: Arc<dyn SaveStore>,
        catalog: MapLibrary,
        config: GameConfig,
    ) -> Result<Self, SessionError> {
        let catalog = match &config.start_map {
            Some(start) => catalog.with_start_map(start.clone())?,
            None => catalog,
        };
        Ok(Self {
            auth,
            store,
            catalog,
            config,
            user: None,
            world: None,
            menu: Some(Menu::new(MenuKind::SignIn)),
            notice: None,
        })
    }

    pub fn user(&self) -> Option<&UserSession> {
        self.user.as_ref()
    }

    pub fn world(&self) -> Option<&WorldController> {
        self.world.as_ref()
    }

    pub fn menu(&self) -> Option<MenuKind> {
        self.menu.map(|menu| menu.kind)
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// The world only simulates while no menu or notice is up.
    pub fn is_paused(&self) -> bool {
        self.menu.is_some() || self.notice.is_some() || self.world.is_none()
    }

    /// Restores an existing session or signs in before the title screen.
    pub async fn bootstrap(&mut self) {
        match self.auth.get_session().await {
            Ok(Some(session)) => {
                info!(user_id = session.user_id.as_str(), "session_restored");
                self.user = Some(session);
                self.menu = Some(Menu::new(MenuKind::Title));
            }
            Ok(None) => self.sign_in().await,
            Err(err) => {
                warn!(error = %err, "session_lookup_failed");
                self.sign_in().await;
            }
        }
    }

    /// One fixed step of menus, notices and the world.
    pub fn update(
        &mut self,
        fixed_dt_seconds: f32,
        input: &InputSnapshot,
    ) -> Option<SessionAction> {
        if self.notice.is_some() {
            if input.confirm_pressed() {
                self.notice = None;
            }
            return None;
        }

        if let Some(menu) = self.menu.as_mut() {
            if menu.kind == MenuKind::Pause && input.menu_pressed() {
                self.close_pause_menu();
                return None;
            }
            if input.up_pressed() {
                menu.step(true);
            }
            if input.down_pressed() {
                menu.step(false);
            }
            if input.confirm_pressed() {
                let chosen = *menu;
                return self.choose(chosen);
            }
            return None;
        }

        let world = self.world.as_mut()?;
        if input.menu_pressed() {
            world.pause();
            self.menu = Some(Menu::new(MenuKind::Pause));
            return None;
        }
        world.tick(fixed_dt_seconds, input);
        if world.take_autosave_request() && self.config.autosave_on_reward {
            return Some(SessionAction::SaveGame { autosave: true });
        }
        None
    }

    fn choose(&mut self, menu: Menu) -> Option<SessionAction> {
        match (menu.kind, menu.selected) {
            (MenuKind::SignIn, 0) => Some(SessionAction::SignIn),
            (MenuKind::SignIn, _) => Some(SessionAction::Quit),
            (MenuKind::Title, 0) => Some(SessionAction::NewGame),
            (MenuKind::Title, 1) | (MenuKind::Pause, 1) => Some(SessionAction::LoadGame),
            (MenuKind::Title, _) => Some(SessionAction::SignOut),
            (MenuKind::Pause, 0) => Some(SessionAction::SaveGame { autosave: false }),
            (MenuKind::Pause, _) => {
                self.close_pause_menu();
                None
            }
        }
    }

    fn close_pause_menu(&mut self) {
        self.menu = None;
        if let Some(world) = self.world.as_mut() {
            world.resume();
        }
    }

    pub async fn perform(&mut self, action: SessionAction) {
        match action {
            SessionAction::SignIn => self.sign_in().await,
            SessionAction::NewGame => self.new_game(),
            SessionAction::LoadGame => self.load_game().await,
            SessionAction::SaveGame { autosave } => self.save_game(autosave).await,
            SessionAction::SignOut => self.sign_out().await,
            SessionAction::Quit => {}
        }
    }

    async fn sign_in(&mut self) {
        match self.auth.sign_in(LOCAL_PROVIDER).await {
            Ok(session) => {
                self.user = Some(session);
                self.menu = Some(Menu::new(MenuKind::Title));
            }
            Err(err) => {
                warn!(error = %err, "sign_in_failed");
                self.menu = Some(Menu::new(MenuKind::SignIn));
                self.notice = Some(SIGN_IN_FAILED_NOTICE.to_string());
            }
        }
    }

    async fn sign_out(&mut self) {
        if let Err(err) = self.auth.sign_out().await {
            warn!(error = %err, "sign_out_failed");
        }
        self.user = None;
        self.world = None;
        self.menu = Some(Menu::new(MenuKind::SignIn));
    }

    fn new_game(&mut self) {
        match WorldController::new_game(self.catalog.clone(), &self.config) {
            Ok(world) => {
                self.world = Some(world);
                self.menu = None;
            }
            Err(err) => {
                error!(error = %err, "new_game_failed");
                self.notice = Some(NEW_GAME_FAILED_NOTICE.to_string());
            }
        }
    }

    async fn save_game(&mut self, autosave: bool) {
        match self.try_save().await {
            Ok(()) => {
                info!(autosave, "save_written");
                if !autosave {
                    self.notice = Some(SAVED_NOTICE.to_string());
                }
            }
            Err(err) => {
                warn!(autosave, error = %err, "save_failed");
                self.notice = Some(SAVE_FAILED_NOTICE.to_string());
            }
        }
    }

    async fn try_save(&self) -> Result<(), SessionError> {
        let user = self.user.as_ref().ok_or(SessionError::SignedOut)?;
        let world = self.world.as_ref().ok_or(SessionError::NoWorld)?;
        let payload = save::encode(&world.snapshot())?;
        self.store.save_state(&user.user_id, &payload).await?;
        Ok(())
    }

    /// The loaded world is built off to the side and only swapped in once it
    /// is complete, so a failure leaves the running game as it was.
    async fn load_game(&mut self) {
        match self.try_load().await {
            Ok(Some(world)) => {
                info!(map = %world.map().name(), "save_loaded");
                self.world = Some(world);
                self.menu = None;
                self.notice = Some(LOADED_NOTICE.to_string());
            }
            Ok(None) => {
                info!("save_missing");
                self.notice = Some(NO_SAVE_NOTICE.to_string());
            }
            Err(err) => {
                warn!(error = %err, "load_failed");
                self.notice = Some(LOAD_FAILED_NOTICE.to_string());
            }
        }
    }

    async fn try_load(&self) -> Result<Option<WorldController>, SessionError> {
        let user = self.user.as_ref().ok_or(SessionError::SignedOut)?;
        let Some(payload) = self.store.load_state(&user.user_id).await? else {
            return Ok(None);
        };
        if payload.trim().is_empty() {
            return Ok(None);
        }
        let save = save::decode(&payload)?;
        let world = WorldController::from_save(self.catalog.clone(), &self.config, &save)?;
        Ok(Some(world))
    }

    pub fn frame(&self) -> FrameDraw {
        let mut frame = self.world.as_ref().map(WorldController::frame).unwrap_or_default();

        if let Some(menu) = self.menu {
            let mut lines: Vec<String> = menu
                .kind
                .items()
                .iter()
                .map(|item| item.to_string())
                .collect();
            let mut highlighted = menu.selected;
            if menu.kind == MenuKind::Pause {
                if let Some(world) = &self.world {
                    lines.insert(0, format!("Points: {}", world.progress().money()));
                    highlighted += 1;
                }
            }
            frame.panels.push(
                TextPanel::new(PanelAnchor::Center, lines).with_highlighted_line(Some(highlighted)),
            );
        }
        if let Some(notice) = &self.notice {
            frame
                .panels
                .push(TextPanel::new(PanelAnchor::Center, vec![notice.clone()]));
        }
        frame
    }
}
