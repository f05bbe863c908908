use super::PixelPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Maps a world pixel to the framebuffer so that `camera` lands on the
/// viewport centre. `scale` is the integer upscale from world to screen.
pub fn world_to_screen_px(
    world: PixelPoint,
    camera: PixelPoint,
    viewport: Viewport,
    scale: i32,
) -> (i32, i32) {
    let scale = scale.max(1);
    let x = (world.x - camera.x) * scale + viewport.width as i32 / 2;
    let y = (world.y - camera.y) * scale + viewport.height as i32 / 2;
    (x, y)
}
