use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod storage;

pub use app::{
    run_app, AppError, Direction, FrameDraw, InputSnapshot, LayerDraw, LoopConfig,
    LoopMetricsSnapshot, MetricsHandle, PanelAnchor, PixelPoint, Scene, SceneCommand, SpriteDraw,
    TextPanel, CELL_PX,
};
pub use storage::{sha256_hex, write_json_atomic, write_text_atomic, StorageError};

pub const ROOT_ENV_VAR: &str = "OVERWORLD_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub assets_dir: PathBuf,
    pub maps_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub profiles_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current executable path: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("current executable path has no parent directory: {0}")]
    ExeHasNoParent(PathBuf),
    #[error("failed to create cache directory at {path}: {source}")]
    CreateCacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "OVERWORLD_ROOT is set but does not point to a valid project root: {path}\n\
A valid root must contain Cargo.toml and assets/."
    )]
    InvalidEnvRoot { path: PathBuf },
    #[error(
        "Could not detect project root by walking upward from executable directory: {start_dir}\n\
Expected a directory containing Cargo.toml and assets/.\n\
Set {env_var} explicitly, for example:\n\
Bash/zsh: export {env_var}=\"/path/to/overworld\""
    )]
    RootNotFound {
        start_dir: PathBuf,
        env_var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    app_paths_for_root(root)
}

/// Derives every path from `root` and makes sure the writable ones exist.
pub fn app_paths_for_root(root: PathBuf) -> Result<AppPaths, StartupError> {
    let assets_dir = root.join("assets");
    let maps_dir = assets_dir.join("maps");
    let cache_dir = root.join("cache");
    let profiles_dir = cache_dir.join("profiles");

    for dir in [&cache_dir, &profiles_dir] {
        fs::create_dir_all(dir).map_err(|source| StartupError::CreateCacheDir {
            path: dir.clone(),
            source,
        })?;
    }

    Ok(AppPaths {
        root,
        assets_dir,
        maps_dir,
        cache_dir,
        profiles_dir,
    })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if is_repo_marker(&normalized) {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let exe_dir = exe
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| StartupError::ExeHasNoParent(exe.clone()))?;

            exe_dir
                .ancestors()
                .find(|candidate| is_repo_marker(candidate))
                .map(normalize_path)
                .ok_or_else(|| StartupError::RootNotFound {
                    start_dir: normalize_path(&exe_dir),
                    env_var: ROOT_ENV_VAR,
                })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn is_repo_marker(path: &Path) -> bool {
    path.join("Cargo.toml").is_file() && path.join("assets").is_dir()
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_marker_requires_cargo_toml_and_assets() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(!is_repo_marker(dir.path()));

        fs::write(dir.path().join("Cargo.toml"), "[workspace]\n").expect("write manifest");
        assert!(!is_repo_marker(dir.path()));

        fs::create_dir(dir.path().join("assets")).expect("create assets");
        assert!(is_repo_marker(dir.path()));
    }

    #[test]
    fn app_paths_create_profile_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = app_paths_for_root(dir.path().to_path_buf()).expect("paths");

        assert!(paths.profiles_dir.is_dir());
        assert_eq!(paths.maps_dir, dir.path().join("assets").join("maps"));
    }
}
