use super::input::Direction;
use super::rendering::FrameDraw;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneCommand {
    None,
    Quit,
}

/// Input sampled once per fixed tick. Press flags are edge-triggered and
/// only ever true for the first tick after the key went down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputSnapshot {
    direction: Option<Direction>,
    confirm_pressed: bool,
    menu_pressed: bool,
    up_pressed: bool,
    down_pressed: bool,
    backspace_pressed: bool,
    typed_text: String,
}

impl InputSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The held direction, most recently pressed first.
    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn confirm_pressed(&self) -> bool {
        self.confirm_pressed
    }

    pub fn menu_pressed(&self) -> bool {
        self.menu_pressed
    }

    /// Edge-triggered up/down presses, used for menu navigation where the
    /// held direction would repeat every tick.
    pub fn up_pressed(&self) -> bool {
        self.up_pressed
    }

    pub fn down_pressed(&self) -> bool {
        self.down_pressed
    }

    pub fn backspace_pressed(&self) -> bool {
        self.backspace_pressed
    }

    pub fn typed_text(&self) -> &str {
        &self.typed_text
    }

    pub fn with_direction(mut self, direction: Option<Direction>) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_confirm_pressed(mut self, confirm_pressed: bool) -> Self {
        self.confirm_pressed = confirm_pressed;
        self
    }

    pub fn with_menu_pressed(mut self, menu_pressed: bool) -> Self {
        self.menu_pressed = menu_pressed;
        self
    }

    pub fn with_up_pressed(mut self, up_pressed: bool) -> Self {
        self.up_pressed = up_pressed;
        self
    }

    pub fn with_down_pressed(mut self, down_pressed: bool) -> Self {
        self.down_pressed = down_pressed;
        self
    }

    pub fn with_backspace_pressed(mut self, backspace_pressed: bool) -> Self {
        self.backspace_pressed = backspace_pressed;
        self
    }

    pub fn with_typed_text(mut self, typed_text: impl Into<String>) -> Self {
        self.typed_text = typed_text.into();
        self
    }

    /// True when nothing in this snapshot could change a paused scene.
    pub fn is_idle(&self) -> bool {
        !self.confirm_pressed
            && !self.menu_pressed
            && !self.up_pressed
            && !self.down_pressed
            && !self.backspace_pressed
            && self.typed_text.is_empty()
    }
}

pub trait Scene {
    fn load(&mut self);
    fn update(&mut self, fixed_dt_seconds: f32, input: &InputSnapshot) -> SceneCommand;
    fn frame(&self) -> FrameDraw;
    fn unload(&mut self);

    /// While paused the host stops scheduling frames and feeds updates
    /// with zero elapsed time, one per input event.
    fn is_paused(&self) -> bool {
        false
    }

    fn debug_title(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_is_idle() {
        let snapshot = InputSnapshot::empty();
        assert!(snapshot.is_idle());
        assert_eq!(snapshot.direction(), None);
    }

    #[test]
    fn held_direction_alone_keeps_snapshot_idle() {
        let snapshot = InputSnapshot::empty().with_direction(Some(Direction::Left));
        assert!(snapshot.is_idle());
    }

    #[test]
    fn typed_text_or_presses_wake_a_paused_scene() {
        assert!(!InputSnapshot::empty().with_typed_text("b").is_idle());
        assert!(!InputSnapshot::empty().with_confirm_pressed(true).is_idle());
        assert!(!InputSnapshot::empty().with_menu_pressed(true).is_idle());
        assert!(!InputSnapshot::empty().with_down_pressed(true).is_idle());
    }
}
