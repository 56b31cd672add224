use std::fs;

use anyhow::Result;
use batch2d::{
    AspectMode, BatchConfig, BeginOptions, Color, Engine, EngineContext, FlipFlags, Font, Game,
    KeyCode, MouseButton, OverflowPolicy, Rect, StretchMode, Texture, Vec2,
};

const VIRTUAL_WIDTH: u32 = 960;
const VIRTUAL_HEIGHT: u32 = 540;
const SPRITE_COUNT: usize = 400;
const TARGET_SIZE: u32 = 128;
const MAX_BOUNCERS: usize = 4000;
const MAX_CLICKS: usize = 32;

struct Bouncer {
    position: Vec2,
    velocity: Vec2,
    angle: f32,
    spin: f32,
    tint: Color,
    texture: usize,
}

#[derive(Default)]
struct BatchDemo {
    textures: Vec<Texture>,
    atlas: Option<Texture>,
    target: Option<Texture>,
    font: Option<Font>,
    bouncers: Vec<Bouncer>,
    clicks: Vec<Vec2>,
    stretch: StretchMode,
    aspect: AspectMode,
}

/// Two-color checkerboard with `cell`-pixel squares.
fn checkerboard(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let even = (x / cell + y / cell) % 2 == 0;
            pixels.extend_from_slice(if even { &a } else { &b });
        }
    }
    pixels
}

/// Filled circle with soft alpha at the rim.
fn disc(size: u32) -> Vec<u8> {
    let radius = size as f32 * 0.5;
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 + 0.5 - radius;
            let dy = y as f32 + 0.5 - radius;
            let edge = (radius - (dx * dx + dy * dy).sqrt()).clamp(0.0, 1.0);
            pixels.extend_from_slice(&[255, 255, 255, (edge * 255.0) as u8]);
        }
    }
    pixels
}

/// 2x2 atlas of solid quadrants: red, green, blue, yellow.
fn atlas(size: u32) -> Vec<u8> {
    let half = size / 2;
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let px: [u8; 4] = match (x < half, y < half) {
                (true, true) => [220, 60, 60, 255],
                (false, true) => [60, 200, 90, 255],
                (true, false) => [70, 110, 230, 255],
                (false, false) => [240, 210, 70, 255],
            };
            pixels.extend_from_slice(&px);
        }
    }
    pixels
}

/// Drops the oldest entries so at most `cap` remain.
fn keep_last<T>(items: &mut Vec<T>, cap: usize) {
    if items.len() > cap {
        items.drain(..items.len() - cap);
    }
}

fn random_color() -> Color {
    Color::rgb(
        fastrand::f32() * 155.0 + 100.0,
        fastrand::f32() * 155.0 + 100.0,
        fastrand::f32() * 155.0 + 100.0,
    )
}

impl BatchDemo {
    fn spawn(&mut self, position: Vec2) {
        let speed = 40.0 + fastrand::f32() * 120.0;
        let heading = fastrand::f32() * std::f32::consts::TAU;
        self.bouncers.push(Bouncer {
            position,
            velocity: Vec2::new(heading.cos() * speed, heading.sin() * speed),
            angle: fastrand::f32() * 360.0,
            spin: fastrand::f32() * 180.0 - 90.0,
            tint: random_color(),
            texture: fastrand::usize(..self.textures.len().max(1)),
        });
    }

    /// Marks the click and bursts sprites from it, keeping only the newest.
    fn on_click(&mut self, at: Vec2) {
        self.clicks.push(at);
        for _ in 0..20 {
            self.spawn(at);
        }
        keep_last(&mut self.clicks, MAX_CLICKS);
        keep_last(&mut self.bouncers, MAX_BOUNCERS);
    }

    fn handle_modes(&mut self, ctx: &mut EngineContext<'_>) {
        let input = ctx.input();
        let stretch = [
            (KeyCode::Digit1, StretchMode::None),
            (KeyCode::Digit2, StretchMode::StretchProjection),
            (KeyCode::Digit3, StretchMode::StretchViewport),
        ]
        .into_iter()
        .find(|(key, _)| input.is_key_pressed(*key))
        .map(|(_, mode)| mode);
        let aspect = [
            (KeyCode::KeyQ, AspectMode::None),
            (KeyCode::KeyW, AspectMode::Keep),
            (KeyCode::KeyE, AspectMode::KeepWidth),
            (KeyCode::KeyR, AspectMode::KeepHeight),
        ]
        .into_iter()
        .find(|(key, _)| input.is_key_pressed(*key))
        .map(|(_, mode)| mode);

        if let Some(mode) = stretch {
            log::info!("stretch mode: {mode:?}");
            self.stretch = mode;
            ctx.batch().set_stretch_mode(mode);
        }
        if let Some(mode) = aspect {
            log::info!("aspect mode: {mode:?}");
            self.aspect = mode;
            ctx.batch().set_aspect_mode(mode);
        }
    }

    /// Renders a small spinning pattern into the offscreen target.
    fn draw_target(&self, ctx: &mut EngineContext<'_>, target: Texture) -> Result<()> {
        let t = ctx.elapsed_time().as_secs_f32();
        ctx.batch()
            .backend_mut()
            .clear_target(&target, [0.1, 0.1, 0.15, 1.0])?;

        let batch = ctx.batch();
        batch.begin_with(BeginOptions::new().target(target))?;
        let size = TARGET_SIZE as f32;
        batch.draw_rectangle(0.0, 0.0, size, 4.0, Color::WHITE)?;
        batch.draw_rectangle(0.0, size - 4.0, size, 4.0, Color::WHITE)?;
        if let Some(checker) = self.textures.first() {
            batch.draw_texture_rotated_about(
                checker,
                size * 0.5 - 16.0,
                size * 0.5 - 16.0,
                Vec2::new(size * 0.5, size * 0.5),
                t * 90.0,
            )?;
        }
        batch.end()?;
        Ok(())
    }
}

impl Game for BatchDemo {
    fn init(&mut self, ctx: &mut EngineContext<'_>) -> Result<()> {
        ctx.set_clear_color(Color::rgb(12.0, 12.0, 16.0));

        let backend = ctx.batch().backend_mut();
        let checker = backend.load_texture_from_rgba(
            &checkerboard(32, 8, [255, 255, 255, 255], [90, 90, 90, 255]),
            32,
            32,
        )?;
        let ball = backend.load_texture_from_rgba(&disc(24), 24, 24)?;
        self.textures = vec![checker, ball, checker.flipped(FlipFlags::HORIZONTAL)];
        self.atlas = Some(backend.load_texture_from_rgba(&atlas(64), 64, 64)?);
        self.target = Some(backend.create_render_target(TARGET_SIZE, TARGET_SIZE)?);

        // Text needs a TTF; pass one on the command line to enable it.
        if let Some(path) = std::env::args().nth(1) {
            match fs::read(&path) {
                Ok(bytes) => self.font = Some(backend.load_font_from_bytes(&bytes, 20.0)?),
                Err(err) => log::warn!("could not read font {path}: {err}"),
            }
        }

        for _ in 0..SPRITE_COUNT {
            let position = Vec2::new(
                fastrand::f32() * VIRTUAL_WIDTH as f32,
                fastrand::f32() * VIRTUAL_HEIGHT as f32,
            );
            self.spawn(position);
        }

        log::info!(
            "keys: 1/2/3 stretch mode, Q/W/E/R aspect mode, click to spawn, Esc to quit"
        );
        Ok(())
    }

    fn update(&mut self, ctx: &mut EngineContext<'_>) -> Result<()> {
        self.handle_modes(ctx);

        if ctx.input().is_mouse_pressed(MouseButton::Left) {
            self.on_click(ctx.cursor_virtual());
        }

        let dt = ctx.delta_time().as_secs_f32();
        let (w, h) = (VIRTUAL_WIDTH as f32, VIRTUAL_HEIGHT as f32);
        for b in &mut self.bouncers {
            b.position = b.position + b.velocity * dt;
            if b.position.x < 0.0 || b.position.x > w {
                b.velocity.x = -b.velocity.x;
                b.position.x = b.position.x.clamp(0.0, w);
            }
            if b.position.y < 0.0 || b.position.y > h {
                b.velocity.y = -b.velocity.y;
                b.position.y = b.position.y.clamp(0.0, h);
            }
            b.angle = (b.angle + b.spin * dt) % 360.0;
        }
        Ok(())
    }

    fn draw(&mut self, ctx: &mut EngineContext<'_>) -> Result<()> {
        if let Some(target) = self.target {
            self.draw_target(ctx, target)?;
        }

        let cursor = ctx.cursor_virtual();
        let t = ctx.elapsed_time().as_secs_f32();
        let (w, h) = (VIRTUAL_WIDTH as f32, VIRTUAL_HEIGHT as f32);
        let batch = ctx.batch();
        batch.begin()?;

        // Frame the virtual area so the letterboxing is visible.
        batch.draw_rectangle(0.0, 0.0, w, h, Color::rgb(30.0, 34.0, 44.0))?;
        batch.draw_rectangle(0.0, 0.0, w, 2.0, Color::RED)?;
        batch.draw_rectangle(0.0, h - 2.0, w, 2.0, Color::RED)?;
        batch.draw_rectangle(0.0, 0.0, 2.0, h, Color::RED)?;
        batch.draw_rectangle(w - 2.0, 0.0, 2.0, h, Color::RED)?;

        for b in &self.bouncers {
            let texture = &self.textures[b.texture];
            let (tw, th) = texture.size();
            let (x, y) = (b.position.x - tw * 0.5, b.position.y - th * 0.5);
            let dest = Rect::new(x, y, tw, th);
            let source = Rect::new(0.0, 0.0, tw, th);
            batch.draw_texture_region_rotated(texture, source, dest, b.position, b.angle, b.tint)?;
        }

        if let Some(atlas) = self.atlas {
            for (i, (sx, sy)) in [(0.0, 0.0), (32.0, 0.0), (0.0, 32.0), (32.0, 32.0)]
                .into_iter()
                .enumerate()
            {
                let dest = Rect::new(20.0 + i as f32 * 52.0, 20.0, 48.0, 48.0);
                batch.draw_texture_region(&atlas, Rect::new(sx, sy, 32.0, 32.0), dest)?;
            }
            batch.draw_texture_sized(&atlas, 20.0, 80.0, 96.0, 96.0)?;
            batch.draw_texture_tinted(&atlas, 130.0, 80.0, Color::rgba(255.0, 255.0, 255.0, 128.0))?;
            batch.draw_texture_rotated(&atlas, 210.0, 80.0, t * 45.0)?;
        }

        if let Some(target) = self.target {
            batch.draw_texture(&target, w - TARGET_SIZE as f32 - 20.0, 20.0)?;
        }

        for click in &self.clicks {
            batch.draw_rectangle(click.x - 2.0, click.y - 2.0, 4.0, 4.0, Color::GREEN)?;
        }
        batch.draw_rectangle(cursor.x - 6.0, cursor.y - 1.0, 12.0, 2.0, Color::WHITE)?;
        batch.draw_rectangle(cursor.x - 1.0, cursor.y - 6.0, 2.0, 12.0, Color::WHITE)?;

        if let Some(font) = &self.font {
            let status = format!(
                "stretch {:?}  aspect {:?}\nsprites {}  cursor {:.0},{:.0}",
                self.stretch,
                self.aspect,
                self.bouncers.len(),
                cursor.x,
                cursor.y
            );
            batch.draw_text_tinted(font, &status, 20.0, h - 60.0, Color::rgb(240.0, 240.0, 160.0))?;
        }

        batch.end()?;
        let stats = batch.take_stats();
        log::trace!(
            "{} draw calls, {} implicit flushes, {} quads",
            stats.draw_calls,
            stats.implicit_flushes,
            stats.quads
        );
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = BatchConfig::new(VIRTUAL_WIDTH, VIRTUAL_HEIGHT).with_overflow(OverflowPolicy::Flush);
    Engine::new()
        .with_title("Batch2D demo")
        .with_size(1280, 720)
        .with_batch(config)
        .run(BatchDemo::default())
}
