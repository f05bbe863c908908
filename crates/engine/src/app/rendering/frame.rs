use crate::app::Direction;

/// Size of one grid cell in world pixels.
pub const CELL_PX: i32 = 16;
/// Sprite sheets are laid out in square frames of this size.
pub const SPRITE_FRAME_PX: u32 = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A background layer. `image_key` is a path relative to the asset root;
/// when it is missing or fails to load, `fallback_cells` are painted instead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerDraw {
    pub image_key: Option<String>,
    pub fallback_cells: Vec<(PixelPoint, [u8; 4])>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpriteDraw {
    pub image_key: Option<String>,
    /// Top-left of the occupied cell in world pixels.
    pub position_px: PixelPoint,
    pub facing: Direction,
    pub frame_column: u32,
    pub frame_row: u32,
    pub fallback_color: [u8; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelAnchor {
    TopLeft,
    Center,
    Bottom,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextPanel {
    pub anchor: PanelAnchor,
    pub lines: Vec<String>,
    pub highlighted_line: Option<usize>,
}

impl TextPanel {
    pub fn new(anchor: PanelAnchor, lines: Vec<String>) -> Self {
        Self {
            anchor,
            lines,
            highlighted_line: None,
        }
    }

    pub fn with_highlighted_line(mut self, line: Option<usize>) -> Self {
        self.highlighted_line = line;
        self
    }
}

/// Everything the host needs to paint one frame, in painter order:
/// lower layer, sprites, upper layer, fade, then panels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameDraw {
    pub camera_px: PixelPoint,
    pub lower: LayerDraw,
    pub sprites: Vec<SpriteDraw>,
    pub upper: LayerDraw,
    pub fade_alpha: u8,
    pub panels: Vec<TextPanel>,
}

impl FrameDraw {
    /// Stable sort so actors further down the screen overlap those above.
    pub fn sort_sprites_by_depth(&mut self) {
        self.sprites.sort_by_key(|sprite| sprite.position_px.y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sprite_at(y: i32, color: u8) -> SpriteDraw {
        SpriteDraw {
            image_key: None,
            position_px: PixelPoint::new(0, y),
            facing: Direction::Down,
            frame_column: 0,
            frame_row: 0,
            fallback_color: [color, 0, 0, 255],
        }
    }

    #[test]
    fn depth_sort_orders_by_vertical_position_and_is_stable() {
        let mut frame = FrameDraw {
            sprites: vec![sprite_at(48, 1), sprite_at(16, 2), sprite_at(48, 3)],
            ..FrameDraw::default()
        };

        frame.sort_sprites_by_depth();

        let order: Vec<u8> = frame
            .sprites
            .iter()
            .map(|sprite| sprite.fallback_color[0])
            .collect();
        assert_eq!(order, vec![2, 1, 3]);
    }
}
