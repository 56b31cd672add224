use std::time::{Duration, Instant};

use anyhow::Result;
use winit::{
    dpi::{LogicalSize, PhysicalSize},
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

use crate::{
    assets::AssetManager,
    config::{BatchConfig, EngineConfig},
    input::InputState,
    math::{Color, Vec2},
    render::{BatchRenderer, Font, Texture, WgpuBackend},
};

/// Main entrypoint for running a Batch2D application.
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }

    pub fn from_config(config: EngineConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.config.title = title.into();
        self
    }

    /// Initial window size in logical pixels.
    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.config.width = width;
        self.config.height = height;
        self
    }

    #[must_use]
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.config.vsync = vsync;
        self
    }

    #[must_use]
    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.config.batch = batch;
        self
    }

    /// Run the provided game until the window is closed or the game requests exit.
    pub fn run<G: Game + 'static>(self, mut game: G) -> Result<()> {
        let config = self.config;
        config.batch.validate()?;

        let event_loop = EventLoop::new()?;
        let mut window_attributes = Window::default_attributes();
        window_attributes.title = config.title.clone();
        window_attributes.inner_size = Some(LogicalSize::new(config.width, config.height).into());
        let window = event_loop.create_window(window_attributes)?;

        // The surface borrows the window for the rest of the program.
        let window: &'static Window = Box::leak(Box::new(window));

        let mut ctx = EngineContext::new(window, &config)?;
        game.init(&mut ctx)?;

        let mut last_frame = Instant::now();
        event_loop.run(move |event, elwt| match event {
            Event::NewEvents(_) => {
                ctx.input.begin_frame();
            }
            Event::WindowEvent { event, .. } => {
                ctx.handle_window_event(&event);

                match event {
                    WindowEvent::CloseRequested => {
                        elwt.exit();
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        if is_escape_pressed(&event) {
                            elwt.exit();
                        }
                    }
                    WindowEvent::Resized(new_size) => {
                        ctx.resize(new_size);
                    }
                    WindowEvent::RedrawRequested => {
                        if let Err(err) = ctx.draw_frame(&mut game) {
                            log::error!("Encountered error during draw: {err:?}");
                            elwt.exit();
                            return;
                        }

                        if ctx.exit_requested {
                            elwt.exit();
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                let now = Instant::now();
                ctx.update_time(now - last_frame);
                last_frame = now;

                if let Err(err) = game.update(&mut ctx) {
                    log::error!("Encountered error during update: {err:?}");
                    elwt.exit();
                    return;
                }

                if ctx.exit_requested {
                    elwt.exit();
                    return;
                }

                ctx.window.request_redraw();
            }
            Event::LoopExiting => {
                ctx.shutdown();
            }
            _ => {}
        })?;

        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn is_escape_pressed(event: &KeyEvent) -> bool {
    event.state == ElementState::Pressed
        && matches!(event.physical_key, PhysicalKey::Code(KeyCode::Escape))
}

/// Shared context provided to game code each frame.
pub struct EngineContext<'window> {
    window: &'window Window,
    delta_time: Duration,
    elapsed_time: Duration,
    exit_requested: bool,
    input: InputState,
    batch: BatchRenderer<WgpuBackend<'window>>,
    assets: AssetManager,
    clear_color: Color,
}

impl<'window> EngineContext<'window> {
    fn new(window: &'window Window, config: &EngineConfig) -> Result<Self> {
        let backend = WgpuBackend::new(window, config.vsync)?;
        let mut batch = BatchRenderer::new(backend, config.batch.clone())?;
        let size = window.inner_size();
        batch.resize(size.width, size.height);

        Ok(Self {
            window,
            delta_time: Duration::ZERO,
            elapsed_time: Duration::ZERO,
            exit_requested: false,
            input: InputState::new(),
            batch,
            assets: AssetManager::new(),
            clear_color: Color::BLACK,
        })
    }

    fn update_time(&mut self, delta: Duration) {
        self.delta_time = delta;
        self.elapsed_time += delta;
    }

    fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => self.input.handle_key(event),
            WindowEvent::MouseInput { state, button, .. } => {
                self.input.handle_mouse_button(*button, *state)
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input.handle_cursor_moved(position.x, position.y)
            }
            _ => {}
        }
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.batch.backend_mut().resize(new_size);
        self.batch.resize(new_size.width, new_size.height);
    }

    fn draw_frame<G: Game>(&mut self, game: &mut G) -> Result<()> {
        let clear = self.clear_color.normalized();
        let backend = self.batch.backend_mut();
        backend.begin_frame()?;
        backend.clear(clear)?;
        let result = game.draw(self);
        if self.batch.is_active() {
            log::warn!("frame ended with an open batch; submitting it");
            self.batch.end()?;
        }
        self.batch.backend_mut().end_frame()?;
        result
    }

    fn shutdown(&mut self) {
        let (batch, assets) = (&mut self.batch, &mut self.assets);
        assets.clear(batch.backend_mut());
        let stats = batch.take_stats();
        log::info!(
            "shutting down after {} draw calls ({} implicit flushes)",
            stats.draw_calls,
            stats.implicit_flushes
        );
    }

    /// Duration between the current and previous frames.
    pub fn delta_time(&self) -> Duration {
        self.delta_time
    }

    /// Total time elapsed since the engine started running.
    pub fn elapsed_time(&self) -> Duration {
        self.elapsed_time
    }

    pub fn window(&self) -> &Window {
        self.window
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    /// Request that the engine exit after the current frame.
    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    /// The batch renderer that draws into the window.
    pub fn batch(&mut self) -> &mut BatchRenderer<WgpuBackend<'window>> {
        &mut self.batch
    }

    pub fn assets(&mut self) -> &mut AssetManager {
        &mut self.assets
    }

    /// Color the window is cleared to before each `Game::draw`.
    pub fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color;
    }

    /// Cursor position in virtual coordinates.
    pub fn cursor_virtual(&self) -> Vec2 {
        self.input.cursor_virtual(self.batch.viewport())
    }

    /// Load a texture through the asset cache; failures come back as a null texture.
    pub fn load_texture(&mut self, path: &str) -> Texture {
        self.assets
            .load_texture_or_null(self.batch.backend_mut(), path)
    }

    pub fn load_texture_from_bytes(&mut self, key: &str, bytes: &[u8]) -> Result<Texture> {
        self.assets
            .load_texture_from_bytes(self.batch.backend_mut(), key, bytes)
    }

    pub fn load_font_from_bytes(&mut self, key: &str, bytes: &[u8], pixel_size: f32) -> Result<&Font> {
        self.assets
            .load_font_from_bytes(self.batch.backend_mut(), key, bytes, pixel_size)
    }
}

/// Trait implemented by user code to hook into the engine lifecycle.
pub trait Game {
    /// Called once after the window is created but before the first frame.
    fn init(&mut self, _ctx: &mut EngineContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Update game state. Called once per frame before drawing.
    fn update(&mut self, ctx: &mut EngineContext<'_>) -> Result<()>;

    /// Draw the current frame between `begin_frame` and `end_frame` of the window.
    fn draw(&mut self, ctx: &mut EngineContext<'_>) -> Result<()>;
}
