//! The batch controller: owns the vertex stream and slot table between
//! `begin` and `end` and turns draw calls into as few GPU submissions as the
//! texture-unit limit allows.

use anyhow::anyhow;
use glam::Mat4;

use crate::config::{BatchConfig, OverflowPolicy};
use crate::error::{BatchError, BatchResult};
use crate::math::{orthographic, Color, Rect, Vec2};

use super::backend::{PipelineState, RenderBackend, ShaderId, PROJECTION_UNIFORM, SLOT_UNIFORMS};
use super::geometry::{build_index_table, GeometryBuffer};
use super::quad::{self, UvSet, WHITE};
use super::slots::TextureSlotTable;
use super::text::Font;
use super::texture::{Texture, TextureId};
use super::vertex::{Vertex, INDICES_PER_QUAD, VERTICES_PER_QUAD};
use super::viewport::{AspectMode, StretchMode, ViewportMapper, ViewportRect};

/// Counters accumulated across submissions until [`BatchRenderer::take_stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: u32,
    pub implicit_flushes: u32,
    pub quads: u32,
}

/// How a batch is opened.
#[derive(Clone, Copy, Debug)]
pub struct BeginOptions {
    pub shader: Option<ShaderId>,
    /// Overrides the viewport-derived projection for this batch.
    pub projection: Option<Mat4>,
    pub blending: bool,
    pub depth_test: bool,
    /// Render target to draw into instead of the window.
    pub target: Option<Texture>,
}

impl Default for BeginOptions {
    fn default() -> Self {
        Self {
            shader: None,
            projection: None,
            blending: true,
            depth_test: false,
            target: None,
        }
    }
}

impl BeginOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shader(mut self, shader: ShaderId) -> Self {
        self.shader = Some(shader);
        self
    }

    #[must_use]
    pub fn projection(mut self, projection: Mat4) -> Self {
        self.projection = Some(projection);
        self
    }

    #[must_use]
    pub fn blending(mut self, blending: bool) -> Self {
        self.blending = blending;
        self
    }

    #[must_use]
    pub fn depth_test(mut self, depth_test: bool) -> Self {
        self.depth_test = depth_test;
        self
    }

    #[must_use]
    pub fn target(mut self, target: Texture) -> Self {
        self.target = Some(target);
        self
    }
}

#[derive(Clone, Copy, Debug)]
struct ActivePass {
    shader: ShaderId,
    projection: Option<Mat4>,
    state: PipelineState,
    target: Option<Texture>,
}

/// Sprite batch renderer over a [`RenderBackend`].
pub struct BatchRenderer<B: RenderBackend> {
    backend: B,
    overflow: OverflowPolicy,
    geometry: GeometryBuffer,
    slots: TextureSlotTable,
    index_count: u32,
    viewport: ViewportMapper,
    default_shader: ShaderId,
    active: Option<ActivePass>,
    stats: FrameStats,
}

impl<B: RenderBackend> BatchRenderer<B> {
    /// Allocates the geometry and index buffers and the default shader.
    pub fn new(mut backend: B, config: BatchConfig) -> BatchResult<Self> {
        config.validate()?;

        let indices = build_index_table(config.max_sprites);
        backend.create_geometry(config.max_sprites * VERTICES_PER_QUAD, &indices)?;
        let default_shader = backend.create_default_shader()?;

        let mut viewport = ViewportMapper::new(
            config.virtual_x,
            config.virtual_y,
            config.virtual_width,
            config.virtual_height,
        );
        viewport.set_stretch_mode(config.stretch_mode);
        viewport.set_aspect_mode(config.aspect_mode);

        log::info!(
            "batch renderer ready: {} sprites, virtual {}x{} at ({}, {})",
            config.max_sprites,
            config.virtual_width.max(1),
            config.virtual_height.max(1),
            config.virtual_x,
            config.virtual_y,
        );

        Ok(Self {
            backend,
            overflow: config.overflow,
            geometry: GeometryBuffer::new(config.max_sprites),
            slots: TextureSlotTable::new(),
            index_count: 0,
            viewport,
            default_shader,
            active: None,
            stats: FrameStats::default(),
        })
    }

    /// Renderer for the virtual rectangle `(x, y, width, height)` with default settings.
    pub fn init(
        backend: B,
        virtual_x: f32,
        virtual_y: f32,
        virtual_width: u32,
        virtual_height: u32,
    ) -> BatchResult<Self> {
        let config =
            BatchConfig::new(virtual_width, virtual_height).with_virtual_origin(virtual_x, virtual_y);
        Self::new(backend, config)
    }

    /// Releases the geometry buffers and the default shader, returning the backend.
    pub fn dispose(mut self) -> B {
        if self.active.is_some() {
            log::warn!("batch renderer disposed inside begin/end; buffered quads dropped");
        }
        self.backend.release_geometry();
        self.backend.dispose_shader(self.default_shader);
        log::info!("batch renderer disposed");
        self.backend
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn default_shader(&self) -> ShaderId {
        self.default_shader
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Indices accumulated in the open batch.
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn slot_table(&self) -> &TextureSlotTable {
        &self.slots
    }

    /// Vertices written to the open batch so far.
    pub fn pending_vertices(&self) -> &[Vertex] {
        self.geometry.written()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn take_stats(&mut self) -> FrameStats {
        std::mem::take(&mut self.stats)
    }

    // Viewport

    pub fn viewport(&self) -> &ViewportMapper {
        &self.viewport
    }

    /// Window resize notification, in physical pixels.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport.resize(width, height);
    }

    pub fn set_virtual_resolution(&mut self, width: u32, height: u32) {
        self.viewport.set_virtual_resolution(width, height);
    }

    pub fn set_stretch_mode(&mut self, mode: StretchMode) {
        self.viewport.set_stretch_mode(mode);
    }

    pub fn set_aspect_mode(&mut self, mode: AspectMode) {
        self.viewport.set_aspect_mode(mode);
    }

    pub fn viewport_rect(&self) -> ViewportRect {
        self.viewport.viewport_rect()
    }

    pub fn screen_to_virtual(&self, screen: Vec2) -> Vec2 {
        self.viewport.screen_to_virtual(screen)
    }

    // Begin / end

    pub fn begin(&mut self) -> BatchResult<()> {
        self.begin_with(BeginOptions::default())
    }

    pub fn begin_with_shader(
        &mut self,
        shader: ShaderId,
        blending: bool,
        depth_test: bool,
    ) -> BatchResult<()> {
        self.begin_with(
            BeginOptions::new()
                .shader(shader)
                .blending(blending)
                .depth_test(depth_test),
        )
    }

    pub fn begin_with_projection(&mut self, projection: Mat4) -> BatchResult<()> {
        self.begin_with(BeginOptions::new().projection(projection))
    }

    pub fn begin_with(&mut self, options: BeginOptions) -> BatchResult<()> {
        if self.active.is_some() {
            return Err(BatchError::AlreadyActive);
        }
        self.active = Some(ActivePass {
            shader: options.shader.unwrap_or(self.default_shader),
            projection: options.projection,
            state: PipelineState {
                blending: options.blending,
                depth_test: options.depth_test,
            },
            target: options.target.filter(|t| !t.is_null()),
        });
        self.restart();
        Ok(())
    }

    /// Submits everything buffered since `begin` and closes the batch.
    ///
    /// The batch is closed even when submission fails.
    pub fn end(&mut self) -> BatchResult<()> {
        let result = self.submit();
        self.active = None;
        result
    }

    /// Submits the open batch and reopens it with the same options.
    pub fn flush_and_restart(&mut self) -> BatchResult<()> {
        self.submit()?;
        self.restart();
        Ok(())
    }

    fn restart(&mut self) {
        self.slots.clear();
        self.index_count = 0;
        self.geometry.open();
    }

    fn submit(&mut self) -> BatchResult<()> {
        let pass = self.active.ok_or(BatchError::NotActive)?;
        let vertices = self.geometry.close();
        if self.index_count == 0 {
            self.slots.clear();
            return Ok(());
        }
        self.backend.write_vertices(vertices)?;

        let (viewport, default_projection) = match pass.target {
            Some(target) => (
                ViewportRect::new(0, 0, target.width, target.height),
                orthographic(0.0, target.width as f32, target.height as f32, 0.0),
            ),
            None => (self.viewport.viewport_rect(), self.viewport.projection()),
        };
        let projection = pass.projection.unwrap_or(default_projection);

        self.backend.set_target(pass.target.map(|t| t.id))?;
        self.backend.set_viewport(viewport);
        self.backend.use_shader(pass.shader, pass.state)?;
        self.backend
            .upload_mat4(pass.shader, PROJECTION_UNIFORM, &projection)?;
        for (slot, texture) in self.slots.iter() {
            let unit = slot - 1;
            self.backend.bind_texture(unit, texture)?;
            self.backend
                .upload_int(pass.shader, SLOT_UNIFORMS[unit as usize], unit as i32)?;
        }
        self.backend.draw_indexed(self.index_count)?;
        self.backend.unbind_textures();

        self.stats.draw_calls += 1;
        self.index_count = 0;
        self.slots.clear();
        Ok(())
    }

    // Quad plumbing

    fn ensure_active(&self) -> BatchResult<()> {
        if self.active.is_some() {
            Ok(())
        } else {
            Err(BatchError::NotActive)
        }
    }

    /// Makes room for one quad, flushing or failing per the overflow policy.
    fn reserve_quad(&mut self) -> BatchResult<()> {
        self.ensure_active()?;
        if !self.geometry.is_full() {
            return Ok(());
        }
        match self.overflow {
            OverflowPolicy::Error => Err(BatchError::GeometryOverflow {
                capacity: self.geometry.max_sprites(),
            }),
            OverflowPolicy::Flush => {
                log::debug!(
                    "geometry buffer full at {} sprites, flushing",
                    self.geometry.max_sprites()
                );
                self.flush_and_restart()?;
                self.stats.implicit_flushes += 1;
                Ok(())
            }
        }
    }

    /// Slot for `texture`, flushing first when the table has no room for it.
    fn submit_texture(&mut self, texture: TextureId) -> BatchResult<u32> {
        if let Some(slot) = self.slots.submit(texture) {
            return Ok(slot);
        }
        log::debug!(
            "texture slots exhausted after {} quads, flushing",
            self.geometry.quad_count()
        );
        self.flush_and_restart()?;
        self.stats.implicit_flushes += 1;
        self.slots
            .submit(texture)
            .ok_or_else(|| anyhow!("slot table still full after flush").into())
    }

    fn push_quad(&mut self, quad: [Vertex; VERTICES_PER_QUAD]) -> BatchResult<()> {
        self.geometry.push_quad(&quad)?;
        self.index_count += INDICES_PER_QUAD as u32;
        self.stats.quads += 1;
        Ok(())
    }

    fn emit_textured(
        &mut self,
        texture: &Texture,
        build: impl FnOnce(u32) -> [Vertex; VERTICES_PER_QUAD],
    ) -> BatchResult<()> {
        self.ensure_active()?;
        if texture.is_null() {
            log::trace!("skipping draw of null texture");
            return Ok(());
        }
        self.reserve_quad()?;
        let slot = self.submit_texture(texture.id)?;
        self.push_quad(build(slot))
    }

    // Textures

    /// Draws `texture` at its own size with its top-left corner at `(x, y)`.
    pub fn draw_texture(&mut self, texture: &Texture, x: f32, y: f32) -> BatchResult<()> {
        self.draw_texture_with(texture, x, y, None, None)
    }

    pub fn draw_texture_sized(
        &mut self,
        texture: &Texture,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> BatchResult<()> {
        self.draw_texture_with(texture, x, y, Some((width, height)), None)
    }

    pub fn draw_texture_tinted(
        &mut self,
        texture: &Texture,
        x: f32,
        y: f32,
        tint: Color,
    ) -> BatchResult<()> {
        self.draw_texture_with(texture, x, y, None, Some(tint))
    }

    /// Draws `texture` with an optional size override and tint.
    pub fn draw_texture_with(
        &mut self,
        texture: &Texture,
        x: f32,
        y: f32,
        size: Option<(f32, f32)>,
        tint: Option<Color>,
    ) -> BatchResult<()> {
        let (width, height) = size.unwrap_or_else(|| texture.size());
        let dest = Rect::new(x, y, width, height);
        let color = tint.map_or(WHITE, |c| c.normalized());
        let uvs = quad::uv_table(texture.flip);
        self.emit_textured(texture, |slot| quad::textured_quad(dest, uvs, color, slot))
    }

    /// Draws `texture` rotated by `degrees` about its own center.
    pub fn draw_texture_rotated(
        &mut self,
        texture: &Texture,
        x: f32,
        y: f32,
        degrees: f32,
    ) -> BatchResult<()> {
        let (width, height) = texture.size();
        let origin = quad::center_of(Rect::new(x, y, width, height));
        self.draw_texture_rotated_about(texture, x, y, origin, degrees)
    }

    /// Draws `texture` rotated by `degrees` about `origin`, in the same space as `x`/`y`.
    pub fn draw_texture_rotated_about(
        &mut self,
        texture: &Texture,
        x: f32,
        y: f32,
        origin: Vec2,
        degrees: f32,
    ) -> BatchResult<()> {
        let (width, height) = texture.size();
        let dest = Rect::new(x, y, width, height);
        let uvs = quad::uv_table(texture.flip);
        self.emit_textured(texture, |slot| {
            quad::rotated_quad(dest, origin, degrees, uvs, WHITE, slot)
        })
    }

    // Regions

    /// Draws the `source` pixels of `texture` into `dest`.
    pub fn draw_texture_region(
        &mut self,
        texture: &Texture,
        source: Rect,
        dest: Rect,
    ) -> BatchResult<()> {
        self.draw_texture_region_tinted(texture, source, dest, Color::WHITE)
    }

    pub fn draw_texture_region_tinted(
        &mut self,
        texture: &Texture,
        source: Rect,
        dest: Rect,
        tint: Color,
    ) -> BatchResult<()> {
        let uvs: UvSet = quad::region_uvs(texture, source);
        let color = tint.normalized();
        self.emit_textured(texture, |slot| quad::textured_quad(dest, &uvs, color, slot))
    }

    /// Region draw rotated by `degrees` about `origin`.
    pub fn draw_texture_region_rotated(
        &mut self,
        texture: &Texture,
        source: Rect,
        dest: Rect,
        origin: Vec2,
        degrees: f32,
        tint: Color,
    ) -> BatchResult<()> {
        let uvs: UvSet = quad::region_uvs(texture, source);
        let color = tint.normalized();
        self.emit_textured(texture, |slot| {
            quad::rotated_quad(dest, origin, degrees, &uvs, color, slot)
        })
    }

    // Shapes and text

    pub fn draw_rectangle(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Color,
    ) -> BatchResult<()> {
        self.reserve_quad()?;
        self.push_quad(quad::rect_quad(
            Rect::new(x, y, width, height),
            color.normalized(),
        ))
    }

    /// Draws `text` in white with the first line's top at `y`.
    pub fn draw_text(&mut self, font: &Font, text: &str, x: f32, y: f32) -> BatchResult<()> {
        self.draw_text_tinted(font, text, x, y, Color::WHITE)
    }

    pub fn draw_text_tinted(
        &mut self,
        font: &Font,
        text: &str,
        x: f32,
        y: f32,
        tint: Color,
    ) -> BatchResult<()> {
        self.ensure_active()?;
        let color = tint.normalized();
        for placed in font.layout(text, Vec2::new(x, y)) {
            let (width, height) = placed.texture.size();
            let dest = Rect::new(placed.position.x, placed.position.y, width, height);
            let uvs = quad::uv_table(placed.texture.flip);
            self.emit_textured(&placed.texture, |slot| {
                quad::textured_quad(dest, uvs, color, slot)
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::headless::HeadlessBackend;

    fn renderer(max_sprites: usize) -> BatchRenderer<HeadlessBackend> {
        let config = BatchConfig::new(800, 600).with_max_sprites(max_sprites);
        BatchRenderer::new(HeadlessBackend::new(), config).unwrap()
    }

    #[test]
    fn draws_require_an_open_batch() {
        let mut batch = renderer(4);
        let tex = batch.backend_mut().create_texture(8, 8);
        assert!(matches!(
            batch.draw_texture(&tex, 0.0, 0.0),
            Err(BatchError::NotActive)
        ));
        assert!(matches!(
            batch.draw_rectangle(0.0, 0.0, 1.0, 1.0, Color::RED),
            Err(BatchError::NotActive)
        ));
        assert!(matches!(batch.end(), Err(BatchError::NotActive)));
    }

    #[test]
    fn empty_batch_submits_nothing() {
        let mut batch = renderer(4);
        batch.begin().unwrap();
        batch.end().unwrap();
        assert!(batch.backend().submissions().is_empty());
        assert_eq!(batch.stats().draw_calls, 0);
    }

    #[test]
    fn null_texture_is_a_no_op() {
        let mut batch = renderer(4);
        batch.begin().unwrap();
        batch.draw_texture(&Texture::default(), 1.0, 1.0).unwrap();
        assert_eq!(batch.index_count(), 0);
        assert!(batch.slot_table().is_empty());
        batch.end().unwrap();
    }

    #[test]
    fn overflow_error_leaves_batch_intact() {
        let mut batch = renderer(2);
        batch.begin().unwrap();
        batch.draw_rectangle(0.0, 0.0, 1.0, 1.0, Color::RED).unwrap();
        batch.draw_rectangle(1.0, 0.0, 1.0, 1.0, Color::RED).unwrap();
        let err = batch
            .draw_rectangle(2.0, 0.0, 1.0, 1.0, Color::RED)
            .unwrap_err();
        assert!(matches!(err, BatchError::GeometryOverflow { capacity: 2 }));
        assert_eq!(batch.index_count(), 12);
        batch.end().unwrap();
        assert_eq!(batch.backend().submissions()[0].index_count, 12);
    }

    #[test]
    fn flush_policy_splits_at_capacity() {
        let config = BatchConfig::new(800, 600)
            .with_max_sprites(2)
            .with_overflow(OverflowPolicy::Flush);
        let mut batch = BatchRenderer::new(HeadlessBackend::new(), config).unwrap();
        batch.begin().unwrap();
        for i in 0..5 {
            batch
                .draw_rectangle(i as f32, 0.0, 1.0, 1.0, Color::GREEN)
                .unwrap();
        }
        batch.end().unwrap();
        let counts: Vec<u32> = batch
            .backend()
            .submissions()
            .iter()
            .map(|s| s.index_count)
            .collect();
        assert_eq!(counts, vec![12, 12, 6]);
        assert_eq!(batch.stats().implicit_flushes, 2);
        assert_eq!(batch.stats().quads, 5);
    }

    #[test]
    fn custom_projection_overrides_viewport() {
        let mut batch = renderer(4);
        let projection = orthographic(0.0, 10.0, 10.0, 0.0);
        batch.begin_with_projection(projection).unwrap();
        batch.draw_rectangle(0.0, 0.0, 1.0, 1.0, Color::BLUE).unwrap();
        batch.end().unwrap();
        assert_eq!(batch.backend().submissions()[0].projection, Some(projection));
    }

    #[test]
    fn shader_and_pipeline_state_reach_backend() {
        let mut batch = renderer(4);
        let names = std::iter::once(PROJECTION_UNIFORM).chain(SLOT_UNIFORMS);
        let shader = batch.backend_mut().create_shader(names);
        batch.begin_with_shader(shader, false, true).unwrap();
        batch.draw_rectangle(0.0, 0.0, 1.0, 1.0, Color::BLUE).unwrap();
        batch.end().unwrap();
        let sub = &batch.backend().submissions()[0];
        assert_eq!(sub.shader, shader);
        assert!(!sub.state.blending);
        assert!(sub.state.depth_test);
    }

    #[test]
    fn render_target_uses_its_own_viewport() {
        let mut batch = renderer(4);
        let target = batch.backend_mut().create_texture(64, 32);
        batch.begin_with(BeginOptions::new().target(target)).unwrap();
        batch.draw_rectangle(0.0, 0.0, 1.0, 1.0, Color::BLUE).unwrap();
        batch.end().unwrap();
        let sub = &batch.backend().submissions()[0];
        assert_eq!(sub.target, Some(target.id));
        assert_eq!(sub.viewport, ViewportRect::new(0, 0, 64, 32));
    }

    #[test]
    fn dispose_releases_backend_resources() {
        let batch = renderer(4);
        let backend = batch.dispose();
        assert!(!backend.has_geometry());
        assert_eq!(backend.shader_count(), 0);
    }
}
