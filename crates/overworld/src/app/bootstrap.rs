use std::io;
use std::sync::Arc;

use engine::{resolve_app_paths, LoopConfig, MetricsHandle, Scene, StartupError};
use overworld::{
    CatalogError, GameConfig, GameSession, LocalProfileBackend, MapLibrary, SessionError,
};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::scene::OverworldScene;

const LOCAL_USER_ID: &str = "player";

#[derive(Debug, Error)]
pub(crate) enum LaunchError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] io::Error),
}

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) scene: Box<dyn Scene>,
    pub(crate) metrics: MetricsHandle,
}

pub(crate) fn build_app() -> Result<AppWiring, LaunchError> {
    init_tracing();
    info!("=== Overworld Startup ===");

    let paths = resolve_app_paths()?;
    let library = MapLibrary::load_from_dir(&paths.maps_dir)?;
    let game_config = GameConfig::from_env();
    let backend = Arc::new(LocalProfileBackend::new(&paths.profiles_dir, LOCAL_USER_ID));
    let session = GameSession::new(backend.clone(), backend, library, game_config)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(LaunchError::Runtime)?;

    info!(
        root = %paths.root.display(),
        maps_dir = %paths.maps_dir.display(),
        profiles_dir = %paths.profiles_dir.display(),
        "app_paths_resolved"
    );

    let config = LoopConfig {
        asset_root: paths.assets_dir,
        ..LoopConfig::default()
    };
    let metrics = MetricsHandle::default();
    Ok(AppWiring {
        config,
        scene: Box::new(OverworldScene::new(session, runtime, metrics.clone())),
        metrics,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
