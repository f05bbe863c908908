use engine::{FrameDraw, InputSnapshot, MetricsHandle, Scene, SceneCommand};
use overworld::{GameSession, SessionAction};
use tokio::runtime::Runtime;
use tracing::info;

/// Hosts a [`GameSession`] in the engine loop. Collaborator calls block the
/// loop only while a menu action is in flight.
pub(crate) struct OverworldScene {
    session: GameSession,
    runtime: Runtime,
    metrics: MetricsHandle,
}

impl OverworldScene {
    pub(crate) fn new(session: GameSession, runtime: Runtime, metrics: MetricsHandle) -> Self {
        Self {
            session,
            runtime,
            metrics,
        }
    }
}

impl Scene for OverworldScene {
    fn load(&mut self) {
        self.runtime.block_on(self.session.bootstrap());
        info!("overworld_scene_loaded");
    }

    fn update(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot) -> SceneCommand {
        match self.session.update(fixed_dt_seconds, input) {
            Some(SessionAction::Quit) => SceneCommand::Quit,
            Some(action) => {
                self.runtime.block_on(self.session.perform(action));
                SceneCommand::None
            }
            None => SceneCommand::None,
        }
    }

    fn frame(&self) -> FrameDraw {
        self.session.frame()
    }

    fn unload(&mut self) {
        info!("overworld_scene_unloaded");
    }

    fn is_paused(&self) -> bool {
        self.session.is_paused()
    }

    fn debug_title(&self) -> Option<String> {
        let world = self.session.world()?;
        let metrics = self.metrics.snapshot();
        Some(format!(
            "{} | points {} | {:.0} fps",
            world.map().name(),
            world.progress().money(),
            metrics.fps
        ))
    }
}
