mod font;
mod frame;
mod renderer;
mod transform;

pub use frame::{
    FrameDraw, LayerDraw, PanelAnchor, PixelPoint, SpriteDraw, TextPanel, CELL_PX,
    SPRITE_FRAME_PX,
};
pub use renderer::Renderer;
pub use transform::{world_to_screen_px, Viewport};
