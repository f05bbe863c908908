mod input;
mod loop_runner;
mod metrics;
mod rendering;
mod scene;

pub use input::{Direction, InputAction};
pub use loop_runner::{run_app, AppError, LoopConfig};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};
pub use rendering::{
    FrameDraw, LayerDraw, PanelAnchor, PixelPoint, Renderer, SpriteDraw, TextPanel, CELL_PX,
};
pub use scene::{InputSnapshot, Scene, SceneCommand};
