use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use thiserror::Error;
use tracing::{info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use super::input::HeldDirections;
use super::metrics::MetricsAccumulator;
use super::{InputAction, InputSnapshot, MetricsHandle, Renderer, Scene, SceneCommand};

pub const SLOW_FRAME_ENV_VAR: &str = "OVERWORLD_SLOW_FRAME_MS";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub pixel_scale: u32,
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    pub simulated_slow_frame_ms: u64,
    pub asset_root: PathBuf,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "Overworld".to_string(),
            window_width: 1056,
            window_height: 594,
            pixel_scale: 3,
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            simulated_slow_frame_ms: 0,
            asset_root: PathBuf::from("assets"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

/// Runs the scene until the window closes or it returns
/// [`SceneCommand::Quit`]. Interval metrics are published to `metrics_handle`.
pub fn run_app(
    config: LoopConfig,
    mut scene: Box<dyn Scene>,
    metrics_handle: MetricsHandle,
) -> Result<(), AppError> {
    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.window_width as f64,
                config.window_height as f64,
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let mut renderer = Renderer::new(
        Arc::clone(&window),
        config.asset_root.clone(),
        config.pixel_scale,
    )
    .map_err(AppError::CreateRenderer)?;

    event_loop.set_control_flow(ControlFlow::Poll);

    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();
    let slow_frame_delay = resolve_slow_frame_delay(config.simulated_slow_frame_ms);
    let mut input_collector = InputCollector::default();

    scene.load();
    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        slow_frame_delay_ms = slow_frame_delay.as_millis() as u64,
        pixel_scale = config.pixel_scale,
        "loop_config"
    );

    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval);
    let mut last_applied_title: Option<String> = None;
    let mut was_paused = false;

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => {
                    info!(reason = "window_close", "shutdown_requested");
                    window_target.exit();
                }
                WindowEvent::Resized(new_size) => {
                    if let Err(error) = renderer.resize(new_size.width, new_size.height) {
                        warn!(error = %error, "renderer_resize_failed");
                        window_target.exit();
                    }
                }
                WindowEvent::Focused(false) => input_collector.release_all(),
                WindowEvent::KeyboardInput { event, .. } => {
                    input_collector.handle_keyboard_input(&event);
                }
                WindowEvent::RedrawRequested => {
                    if slow_frame_delay > Duration::ZERO {
                        // Explicit debug perturbation only.
                        thread::sleep(slow_frame_delay);
                    }

                    let now = Instant::now();
                    let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
                    last_frame_instant = now;

                    let paused = scene.is_paused();
                    let mut command = SceneCommand::None;
                    if paused {
                        // Wall-clock time spent paused is never simulated.
                        accumulator = Duration::ZERO;
                        let input_snapshot = input_collector.snapshot_for_tick();
                        if !input_snapshot.is_idle() {
                            command = scene.update(0.0, &input_snapshot);
                        }
                    } else {
                        let clamped_frame_dt = clamp_frame_delta(raw_frame_dt, max_frame_delta);
                        accumulator = accumulator.saturating_add(clamped_frame_dt);

                        let step_plan =
                            plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
                        for _ in 0..step_plan.ticks_to_run {
                            let input_snapshot = input_collector.snapshot_for_tick();
                            command = scene.update(fixed_dt_seconds, &input_snapshot);
                            metrics_accumulator.record_tick();
                            if command == SceneCommand::Quit || scene.is_paused() {
                                break;
                            }
                        }
                        accumulator = step_plan.remaining_accumulator;

                        if step_plan.dropped_backlog > Duration::ZERO {
                            warn!(
                                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                                max_ticks_per_frame, "sim_clamp_triggered"
                            );
                        }
                    }

                    let now_paused = scene.is_paused();
                    if now_paused != was_paused {
                        info!(paused = now_paused, "scene_pause_changed");
                        was_paused = now_paused;
                    }

                    if command == SceneCommand::Quit {
                        info!(reason = "scene_command", "shutdown_requested");
                        window_target.exit();
                        return;
                    }

                    if let Err(error) = renderer.render_frame(&scene.frame()) {
                        warn!(error = %error, "renderer_draw_failed");
                        window_target.exit();
                    }

                    let next_title = scene.debug_title();
                    if next_title != last_applied_title {
                        window.set_title(next_title.as_deref().unwrap_or(&config.window_title));
                        last_applied_title = next_title;
                    }

                    metrics_accumulator.record_frame(raw_frame_dt, paused);
                    if let Some(snapshot) = metrics_accumulator.maybe_snapshot(now) {
                        metrics_handle.publish(snapshot);
                        if snapshot.paused_frames == 0 {
                            info!(
                                fps = snapshot.fps,
                                tps = snapshot.tps,
                                frame_time_ms = snapshot.frame_time_ms,
                                "loop_metrics"
                            );
                        }
                    }
                }
                _ => {}
            },
            Event::AboutToWait => {
                if scene.is_paused() {
                    window_target.set_control_flow(ControlFlow::Wait);
                    if input_collector.has_pending_input() {
                        window.request_redraw();
                    }
                } else {
                    window_target.set_control_flow(ControlFlow::Poll);
                    window.request_redraw();
                }
            }
            Event::LoopExiting => {
                scene.unload();
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

#[derive(Debug, Default)]
struct InputCollector {
    held: HeldDirections,
    confirm_is_down: bool,
    confirm_pressed_edge: bool,
    menu_is_down: bool,
    menu_pressed_edge: bool,
    up_is_down: bool,
    up_pressed_edge: bool,
    down_is_down: bool,
    down_pressed_edge: bool,
    backspace_pressed_edge: bool,
    typed_text: String,
}

impl InputCollector {
    fn handle_keyboard_input(&mut self, key_event: &KeyEvent) {
        let is_pressed = key_event.state == ElementState::Pressed;
        if let Some(action) = action_for_key(key_event.physical_key) {
            self.handle_action(action, is_pressed);
        } else if matches!(key_event.physical_key, PhysicalKey::Code(KeyCode::Backspace)) {
            if is_pressed {
                self.backspace_pressed_edge = true;
            }
        }

        if is_pressed {
            if let Some(text) = key_event.text.as_ref() {
                self.push_typed_text(text);
            }
        }
    }

    fn handle_action(&mut self, action: InputAction, is_pressed: bool) {
        if let Some(direction) = action.direction() {
            if is_pressed {
                self.held.press(direction);
            } else {
                self.held.release(direction);
            }
        }

        let (is_down, pressed_edge) = match action {
            InputAction::Confirm => (&mut self.confirm_is_down, &mut self.confirm_pressed_edge),
            InputAction::Menu => (&mut self.menu_is_down, &mut self.menu_pressed_edge),
            InputAction::MoveUp => (&mut self.up_is_down, &mut self.up_pressed_edge),
            InputAction::MoveDown => (&mut self.down_is_down, &mut self.down_pressed_edge),
            InputAction::MoveLeft | InputAction::MoveRight => return,
        };
        if is_pressed && !*is_down {
            *pressed_edge = true;
        }
        *is_down = is_pressed;
    }

    fn push_typed_text(&mut self, text: &str) {
        self.typed_text.extend(
            text.chars()
                .filter(|ch| ch.is_ascii_graphic() || *ch == ' '),
        );
    }

    fn release_all(&mut self) {
        self.held.clear();
        self.confirm_is_down = false;
        self.menu_is_down = false;
        self.up_is_down = false;
        self.down_is_down = false;
    }

    fn has_pending_input(&self) -> bool {
        self.confirm_pressed_edge
            || self.menu_pressed_edge
            || self.up_pressed_edge
            || self.down_pressed_edge
            || self.backspace_pressed_edge
            || !self.typed_text.is_empty()
    }

    fn snapshot_for_tick(&mut self) -> InputSnapshot {
        let snapshot = InputSnapshot::empty()
            .with_direction(self.held.current())
            .with_confirm_pressed(self.confirm_pressed_edge)
            .with_menu_pressed(self.menu_pressed_edge)
            .with_up_pressed(self.up_pressed_edge)
            .with_down_pressed(self.down_pressed_edge)
            .with_backspace_pressed(self.backspace_pressed_edge)
            .with_typed_text(std::mem::take(&mut self.typed_text));
        self.confirm_pressed_edge = false;
        self.menu_pressed_edge = false;
        self.up_pressed_edge = false;
        self.down_pressed_edge = false;
        self.backspace_pressed_edge = false;
        snapshot
    }
}

fn action_for_key(key: PhysicalKey) -> Option<InputAction> {
    match key {
        PhysicalKey::Code(KeyCode::KeyW) | PhysicalKey::Code(KeyCode::ArrowUp) => {
            Some(InputAction::MoveUp)
        }
        PhysicalKey::Code(KeyCode::KeyS) | PhysicalKey::Code(KeyCode::ArrowDown) => {
            Some(InputAction::MoveDown)
        }
        PhysicalKey::Code(KeyCode::KeyA) | PhysicalKey::Code(KeyCode::ArrowLeft) => {
            Some(InputAction::MoveLeft)
        }
        PhysicalKey::Code(KeyCode::KeyD) | PhysicalKey::Code(KeyCode::ArrowRight) => {
            Some(InputAction::MoveRight)
        }
        PhysicalKey::Code(KeyCode::Enter) | PhysicalKey::Code(KeyCode::NumpadEnter) => {
            Some(InputAction::Confirm)
        }
        PhysicalKey::Code(KeyCode::Escape) => Some(InputAction::Menu),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;
    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    let dropped_backlog = if accumulator >= fixed_dt {
        std::mem::replace(&mut accumulator, Duration::ZERO)
    } else {
        Duration::ZERO
    };
    StepPlan {
        ticks_to_run,
        remaining_accumulator: accumulator,
        dropped_backlog,
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn resolve_slow_frame_delay(config_slow_frame_ms: u64) -> Duration {
    match env::var(SLOW_FRAME_ENV_VAR) {
        Ok(value) => match value.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    env_var = SLOW_FRAME_ENV_VAR,
                    value = value.as_str(),
                    "invalid slow-frame env var value; falling back to config"
                );
                Duration::from_millis(config_slow_frame_ms)
            }
        },
        Err(env::VarError::NotPresent) => Duration::from_millis(config_slow_frame_ms),
        Err(err) => {
            warn!(
                env_var = SLOW_FRAME_ENV_VAR,
                error = %err,
                "unable to read slow-frame env var; falling back to config"
            );
            Duration::from_millis(config_slow_frame_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Direction;

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(250);
        assert_eq!(
            clamp_frame_delta(Duration::from_millis(600), max_frame_delta),
            max_frame_delta
        );
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let result = plan_sim_steps(Duration::from_millis(50), Duration::from_millis(16), 5);
        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::from_millis(2));
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let result = plan_sim_steps(Duration::from_millis(120), Duration::from_millis(16), 3);
        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    #[test]
    fn confirm_is_edge_triggered_for_single_tick() {
        let mut input = InputCollector::default();
        input.handle_action(InputAction::Confirm, true);
        let first = input.snapshot_for_tick();
        input.handle_action(InputAction::Confirm, true);
        let second = input.snapshot_for_tick();
        input.handle_action(InputAction::Confirm, false);
        input.handle_action(InputAction::Confirm, true);
        let third = input.snapshot_for_tick();

        assert!(first.confirm_pressed());
        assert!(!second.confirm_pressed());
        assert!(third.confirm_pressed());
    }

    #[test]
    fn menu_press_is_reported_once() {
        let mut input = InputCollector::default();
        input.handle_action(InputAction::Menu, true);
        assert!(input.has_pending_input());
        assert!(input.snapshot_for_tick().menu_pressed());
        assert!(!input.snapshot_for_tick().menu_pressed());
        assert!(!input.has_pending_input());
    }

    #[test]
    fn held_direction_follows_most_recent_key() {
        let mut input = InputCollector::default();
        input.handle_action(InputAction::MoveLeft, true);
        input.handle_action(InputAction::MoveUp, true);
        assert_eq!(input.snapshot_for_tick().direction(), Some(Direction::Up));
        assert_eq!(input.snapshot_for_tick().direction(), Some(Direction::Up));

        input.handle_action(InputAction::MoveUp, false);
        assert_eq!(input.snapshot_for_tick().direction(), Some(Direction::Left));
    }

    #[test]
    fn up_and_down_presses_are_edges_for_menus() {
        let mut input = InputCollector::default();
        input.handle_action(InputAction::MoveDown, true);
        let first = input.snapshot_for_tick();
        input.handle_action(InputAction::MoveDown, true);
        let second = input.snapshot_for_tick();

        assert!(first.down_pressed());
        assert!(!second.down_pressed());
        assert_eq!(second.direction(), Some(Direction::Down));
    }

    #[test]
    fn typed_text_is_drained_per_tick_and_filters_control_chars() {
        let mut input = InputCollector::default();
        input.push_typed_text("Bo");
        input.push_typed_text("b\r\u{8}");
        assert_eq!(input.snapshot_for_tick().typed_text(), "Bob");
        assert_eq!(input.snapshot_for_tick().typed_text(), "");
    }

    #[test]
    fn focus_loss_releases_held_keys() {
        let mut input = InputCollector::default();
        input.handle_action(InputAction::MoveRight, true);
        input.release_all();
        assert_eq!(input.snapshot_for_tick().direction(), None);
    }

    #[test]
    fn key_mapping_covers_movement_confirm_and_menu() {
        assert_eq!(
            action_for_key(PhysicalKey::Code(KeyCode::KeyW)),
            Some(InputAction::MoveUp)
        );
        assert_eq!(
            action_for_key(PhysicalKey::Code(KeyCode::ArrowRight)),
            Some(InputAction::MoveRight)
        );
        assert_eq!(
            action_for_key(PhysicalKey::Code(KeyCode::Enter)),
            Some(InputAction::Confirm)
        );
        assert_eq!(
            action_for_key(PhysicalKey::Code(KeyCode::Escape)),
            Some(InputAction::Menu)
        );
        assert_eq!(action_for_key(PhysicalKey::Code(KeyCode::KeyQ)), None);
    }
}
