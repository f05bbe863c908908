use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use image::ImageReader;
use pixels::{Error, Pixels, SurfaceTexture};
use tracing::warn;
use winit::window::Window;

use crate::app::Direction;

use super::font::{blend_pixel, draw_filled_rect, draw_panel};
use super::{
    world_to_screen_px, FrameDraw, LayerDraw, PixelPoint, SpriteDraw, Viewport, CELL_PX,
    SPRITE_FRAME_PX,
};

const CLEAR_COLOR: [u8; 4] = [18, 20, 26, 255];
const FACING_MARK_COLOR: [u8; 4] = [250, 250, 250, 255];
/// Sheet frames are 32px squares anchored so the feet sit on the cell.
const SPRITE_OFFSET_PX: PixelPoint = PixelPoint::new(-8, -18);
const FACING_MARK_PX: i32 = 4;

struct LoadedImage {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl LoadedImage {
    fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let bytes = self.rgba.get(offset..offset + 4)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

#[derive(Debug, Clone, Copy)]
struct ImageRegion {
    src_x: u32,
    src_y: u32,
    width: u32,
    height: u32,
}

pub struct Renderer {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    viewport: Viewport,
    pixel_scale: i32,
    asset_root: PathBuf,
    image_cache: HashMap<String, Option<LoadedImage>>,
    warned_image_keys: HashSet<String>,
}

impl Renderer {
    pub fn new(window: Arc<Window>, asset_root: PathBuf, pixel_scale: u32) -> Result<Self, Error> {
        let size = window.inner_size();
        let pixels = Self::build_pixels(Arc::clone(&window), size.width, size.height)?;
        Ok(Self {
            window,
            pixels,
            viewport: Viewport {
                width: size.width,
                height: size.height,
            },
            pixel_scale: pixel_scale.max(1) as i32,
            asset_root,
            image_cache: HashMap::new(),
            warned_image_keys: HashSet::new(),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels = Self::build_pixels(Arc::clone(&self.window), width, height)?;
        self.viewport = Viewport { width, height };
        Ok(())
    }

    fn build_pixels(
        window: Arc<Window>,
        width: u32,
        height: u32,
    ) -> Result<Pixels<'static>, Error> {
        let surface = SurfaceTexture::new(width, height, window);
        Pixels::new(width, height, surface)
    }

    pub fn render_frame(&mut self, draw: &FrameDraw) -> Result<(), Error> {
        let viewport = self.viewport;
        if viewport.width == 0 || viewport.height == 0 {
            return Ok(());
        }

        let mut images = ImageLookup {
            asset_root: self.asset_root.as_path(),
            cache: &mut self.image_cache,
            warned: &mut self.warned_image_keys,
        };
        let target = Target {
            viewport,
            scale: self.pixel_scale,
            camera: draw.camera_px,
        };
        let frame = self.pixels.frame_mut();

        for chunk in frame.chunks_exact_mut(4) {
            chunk.copy_from_slice(&CLEAR_COLOR);
        }

        draw_layer(frame, target, &draw.lower, &mut images);

        let mut sprite_order: Vec<&SpriteDraw> = draw.sprites.iter().collect();
        sprite_order.sort_by_key(|sprite| sprite.position_px.y);
        for sprite in sprite_order {
            draw_sprite(frame, target, sprite, &mut images);
        }

        draw_layer(frame, target, &draw.upper, &mut images);

        if draw.fade_alpha > 0 {
            draw_filled_rect(
                frame,
                viewport.width,
                viewport.height,
                0,
                0,
                viewport.width as i32,
                viewport.height as i32,
                [0, 0, 0, draw.fade_alpha],
            );
        }

        for panel in &draw.panels {
            draw_panel(frame, viewport.width, viewport.height, panel);
        }

        self.pixels.render()
    }
}

#[derive(Debug, Clone, Copy)]
struct Target {
    viewport: Viewport,
    scale: i32,
    camera: PixelPoint,
}

impl Target {
    fn to_screen(self, world: PixelPoint) -> (i32, i32) {
        world_to_screen_px(world, self.camera, self.viewport, self.scale)
    }
}

struct ImageLookup<'a> {
    asset_root: &'a Path,
    cache: &'a mut HashMap<String, Option<LoadedImage>>,
    warned: &'a mut HashSet<String>,
}

impl ImageLookup<'_> {
    fn get(&mut self, key: &str) -> Option<&LoadedImage> {
        if !self.cache.contains_key(key) {
            let loaded = resolve_image_path(self.asset_root, key).and_then(|path| {
                load_image_rgba(&path).map_err(|reason| format!("{reason} ({})", path.display()))
            });
            let entry = match loaded {
                Ok(image) => Some(image),
                Err(reason) => {
                    if self.warned.insert(key.to_string()) {
                        warn!(
                            image_key = key,
                            reason = %reason,
                            "renderer_image_load_failed_using_fallback"
                        );
                    }
                    None
                }
            };
            self.cache.insert(key.to_string(), entry);
        }
        self.cache.get(key).and_then(Option::as_ref)
    }
}

fn draw_layer(
    frame: &mut [u8],
    target: Target,
    layer: &LayerDraw,
    images: &mut ImageLookup<'_>,
) {
    let image = match layer.image_key.as_deref() {
        Some(key) => images.get(key),
        None => None,
    };
    if let Some(image) = image {
        let (left, top) = target.to_screen(PixelPoint::new(0, 0));
        let region = ImageRegion {
            src_x: 0,
            src_y: 0,
            width: image.width,
            height: image.height,
        };
        blit_region(frame, target, image, region, left, top);
        return;
    }

    for (cell_px, color) in &layer.fallback_cells {
        let (left, top) = target.to_screen(*cell_px);
        draw_filled_rect(
            frame,
            target.viewport.width,
            target.viewport.height,
            left,
            top,
            CELL_PX * target.scale,
            CELL_PX * target.scale,
            *color,
        );
    }
}

fn draw_sprite(
    frame: &mut [u8],
    target: Target,
    sprite: &SpriteDraw,
    images: &mut ImageLookup<'_>,
) {
    let image = match sprite.image_key.as_deref() {
        Some(key) => images.get(key),
        None => None,
    };
    if let Some(image) = image {
        let anchor = PixelPoint::new(
            sprite.position_px.x + SPRITE_OFFSET_PX.x,
            sprite.position_px.y + SPRITE_OFFSET_PX.y,
        );
        let (left, top) = target.to_screen(anchor);
        let region = ImageRegion {
            src_x: sprite.frame_column * SPRITE_FRAME_PX,
            src_y: sprite.frame_row * SPRITE_FRAME_PX,
            width: SPRITE_FRAME_PX,
            height: SPRITE_FRAME_PX,
        };
        blit_region(frame, target, image, region, left, top);
        return;
    }

    let (left, top) = target.to_screen(sprite.position_px);
    let size = CELL_PX * target.scale;
    let (width, height) = (target.viewport.width, target.viewport.height);
    draw_filled_rect(frame, width, height, left, top, size, size, sprite.fallback_color);

    let mark = FACING_MARK_PX * target.scale;
    let (mark_x, mark_y) = match sprite.facing {
        Direction::Up => (left + (size - mark) / 2, top),
        Direction::Down => (left + (size - mark) / 2, top + size - mark),
        Direction::Left => (left, top + (size - mark) / 2),
        Direction::Right => (left + size - mark, top + (size - mark) / 2),
    };
    draw_filled_rect(frame, width, height, mark_x, mark_y, mark, mark, FACING_MARK_COLOR);
}

fn blit_region(
    frame: &mut [u8],
    target: Target,
    image: &LoadedImage,
    region: ImageRegion,
    left: i32,
    top: i32,
) {
    let scale = target.scale;
    let (width, height) = (target.viewport.width as i32, target.viewport.height as i32);

    for sy in 0..region.height {
        let dst_y = top + sy as i32 * scale;
        if dst_y + scale <= 0 || dst_y >= height {
            continue;
        }
        for sx in 0..region.width {
            let dst_x = left + sx as i32 * scale;
            if dst_x + scale <= 0 || dst_x >= width {
                continue;
            }
            let Some(color) = image.pixel(region.src_x + sx, region.src_y + sy) else {
                continue;
            };
            if color[3] == 0 {
                continue;
            }
            for py in dst_y..dst_y + scale {
                for px in dst_x..dst_x + scale {
                    blend_pixel(frame, width as u32, height as u32, px, py, color);
                }
            }
        }
    }
}

/// Image keys are paths relative to the asset root. Absolute paths and
/// parent components are rejected.
fn resolve_image_path(asset_root: &Path, key: &str) -> Result<PathBuf, String> {
    let relative = Path::new(key.trim_start_matches('/'));
    let is_safe = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    if key.is_empty() || !is_safe {
        return Err(format!("invalid_image_key:{key}"));
    }
    Ok(asset_root.join(relative))
}

fn load_image_rgba(path: &Path) -> Result<LoadedImage, String> {
    let reader = ImageReader::open(path).map_err(|error| format!("file_open_failed:{error}"))?;
    let decoded = reader
        .decode()
        .map_err(|error| format!("decode_failed:{error}"))?;
    let image = decoded.to_rgba8();
    Ok(LoadedImage {
        width: image.width(),
        height: image.height(),
        rgba: image.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(width: u32, height: u32, scale: i32) -> Target {
        Target {
            viewport: Viewport { width, height },
            scale,
            camera: PixelPoint::new(0, 0),
        }
    }

    fn checker_image() -> LoadedImage {
        LoadedImage {
            width: 2,
            height: 1,
            rgba: vec![255, 0, 0, 255, 0, 0, 0, 0],
        }
    }

    #[test]
    fn image_keys_resolve_under_asset_root() {
        let root = Path::new("/game/assets");
        assert_eq!(
            resolve_image_path(root, "/images/maps/DemoLower.png").expect("path"),
            root.join("images/maps/DemoLower.png")
        );
        assert!(resolve_image_path(root, "../secrets.png").is_err());
        assert!(resolve_image_path(root, "").is_err());
    }

    #[test]
    fn missing_image_is_cached_as_fallback_and_warned_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = HashMap::new();
        let mut warned = HashSet::new();
        let mut lookup = ImageLookup {
            asset_root: dir.path(),
            cache: &mut cache,
            warned: &mut warned,
        };

        assert!(lookup.get("images/missing.png").is_none());
        assert!(lookup.get("images/missing.png").is_none());

        assert_eq!(warned.len(), 1);
        assert!(cache.contains_key("images/missing.png"));
    }

    #[test]
    fn blit_skips_transparent_pixels_and_scales() {
        let (width, height) = (8u32, 4u32);
        let mut frame = vec![0u8; (width * height * 4) as usize];
        let image = checker_image();
        let region = ImageRegion {
            src_x: 0,
            src_y: 0,
            width: 2,
            height: 1,
        };

        blit_region(&mut frame, target(width, height, 2), &image, region, 0, 0);

        let pixel_at = |x: usize, y: usize| {
            let offset = (y * width as usize + x) * 4;
            frame[offset..offset + 4].to_vec()
        };
        assert_eq!(pixel_at(0, 0), vec![255, 0, 0, 255]);
        assert_eq!(pixel_at(1, 1), vec![255, 0, 0, 255]);
        assert_eq!(pixel_at(2, 0), vec![0, 0, 0, 0]);
    }

    #[test]
    fn fallback_sprite_draws_cell_and_facing_mark() {
        let (width, height) = (64u32, 64u32);
        let mut frame = vec![0u8; (width * height * 4) as usize];
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = HashMap::new();
        let mut warned = HashSet::new();
        let mut lookup = ImageLookup {
            asset_root: dir.path(),
            cache: &mut cache,
            warned: &mut warned,
        };
        let sprite = SpriteDraw {
            image_key: None,
            position_px: PixelPoint::new(0, 0),
            facing: Direction::Down,
            frame_column: 0,
            frame_row: 0,
            fallback_color: [10, 200, 10, 255],
        };

        draw_sprite(&mut frame, target(width, height, 1), &sprite, &mut lookup);

        let pixel_at = |x: usize, y: usize| {
            let offset = (y * width as usize + x) * 4;
            frame[offset..offset + 4].to_vec()
        };
        assert_eq!(pixel_at(33, 33), vec![10, 200, 10, 255]);
        assert_eq!(pixel_at(40, 47), FACING_MARK_COLOR.to_vec());
    }
}
