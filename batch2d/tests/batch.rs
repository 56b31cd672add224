use batch2d::render::quad::{DEFAULT_UVS, FLIP_BOTH_UVS, FLIP_HORIZONTAL_UVS, FLIP_VERTICAL_UVS};
use batch2d::render::{letterbox, Glyph, ViewportMapper, Vertex, PROJECTION_UNIFORM};
use batch2d::{
    AspectMode, BatchConfig, BatchError, BatchRenderer, BeginOptions, Color, FlipFlags, Font,
    HeadlessBackend, OverflowPolicy, StretchMode, Texture, Vec2,
};

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}

fn approx_v(a: [f32; 2], b: [f32; 2]) -> bool {
    approx(a[0], b[0]) && approx(a[1], b[1])
}

/// Backend with `count` registered 32x32 textures.
fn backend_with_textures(count: usize) -> (HeadlessBackend, Vec<Texture>) {
    let mut backend = HeadlessBackend::new();
    let textures = (0..count).map(|_| backend.create_texture(32, 32)).collect();
    (backend, textures)
}

fn slots_of(vertices: &[Vertex]) -> Vec<f32> {
    vertices.chunks(4).map(|quad| quad[0].texture_slot).collect()
}

#[test]
fn rectangle_and_texture_share_one_draw() {
    let (backend, textures) = backend_with_textures(1);
    let tex_a = textures[0];
    let mut batch = BatchRenderer::init(backend, 0.0, 0.0, 800, 600).unwrap();

    batch.begin().unwrap();
    batch
        .draw_rectangle(10.0, 10.0, 50.0, 50.0, Color::RED)
        .unwrap();
    batch.draw_texture(&tex_a, 100.0, 100.0).unwrap();
    assert_eq!(batch.index_count(), 12);
    batch.end().unwrap();

    let submissions = batch.backend().submissions();
    assert_eq!(submissions.len(), 1);
    let draw = &submissions[0];
    assert_eq!(draw.index_count, 12);
    assert_eq!(draw.bound_texture_count(), 1);
    assert_eq!(draw.bound_textures[0], Some(tex_a.id));
    assert_eq!(draw.slot_units.get("tex1"), Some(&0));
    assert!(draw.projection.is_some());
    assert_eq!(draw.target, None);

    for v in &draw.vertices[..4] {
        assert_eq!(v.color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(v.texture_slot, 0.0);
    }
    for v in &draw.vertices[4..8] {
        assert_eq!(v.color, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(v.texture_slot, 1.0);
    }
    assert_eq!(draw.vertices[4].position, [100.0, 100.0]);
    assert_eq!(draw.vertices[6].position, [132.0, 132.0]);
}

#[test]
fn repeated_textures_reuse_their_slot() {
    let (backend, t) = backend_with_textures(3);
    let mut batch = BatchRenderer::init(backend, 0.0, 0.0, 800, 600).unwrap();

    batch.begin().unwrap();
    for texture in [t[0], t[1], t[0], t[2], t[1]] {
        batch.draw_texture(&texture, 0.0, 0.0).unwrap();
    }
    assert_eq!(
        slots_of(batch.pending_vertices()),
        vec![1.0, 2.0, 1.0, 3.0, 2.0]
    );
    assert_eq!(batch.slot_table().lookup(t[2].id), Some(3));
    batch.end().unwrap();

    let draw = &batch.backend().submissions()[0];
    assert_eq!(draw.bound_texture_count(), 3);
    assert_eq!(draw.slot_units.get("tex3"), Some(&2));
    assert!(!draw.slot_units.contains_key("tex4"));
}

#[test]
fn seventeenth_texture_flushes_once() {
    let (backend, textures) = backend_with_textures(17);
    let mut batch = BatchRenderer::init(backend, 0.0, 0.0, 800, 600).unwrap();

    batch.begin().unwrap();
    for texture in &textures[..16] {
        batch.draw_texture(texture, 0.0, 0.0).unwrap();
    }
    assert_eq!(batch.index_count(), 16 * 6);
    assert!(batch.backend().submissions().is_empty());

    batch.draw_texture(&textures[16], 0.0, 0.0).unwrap();
    assert_eq!(batch.backend().submissions().len(), 1);
    assert_eq!(batch.slot_table().lookup(textures[16].id), Some(1));
    assert_eq!(batch.index_count(), 6);
    assert_eq!(batch.stats().implicit_flushes, 1);

    batch.end().unwrap();
    let submissions = batch.backend_mut().take_submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[0].index_count, 96);
    assert_eq!(submissions[0].bound_texture_count(), 16);
    assert_eq!(submissions[1].index_count, 6);
    assert_eq!(submissions[1].bound_textures[0], Some(textures[16].id));
    assert_eq!(submissions[1].bound_texture_count(), 1);
    assert_eq!(batch.stats().draw_calls, 2);
}

#[test]
fn full_geometry_buffer_flushes_under_flush_policy() {
    let (backend, textures) = backend_with_textures(1);
    let config = BatchConfig::new(800, 600)
        .with_max_sprites(4)
        .with_overflow(OverflowPolicy::Flush);
    let mut batch = BatchRenderer::new(backend, config).unwrap();

    batch.begin().unwrap();
    for i in 0..10 {
        batch.draw_texture(&textures[0], i as f32, 0.0).unwrap();
    }
    batch.end().unwrap();

    let counts: Vec<u32> = batch
        .backend()
        .submissions()
        .iter()
        .map(|s| s.index_count)
        .collect();
    assert_eq!(counts, vec![24, 24, 12]);
    assert_eq!(batch.stats().implicit_flushes, 2);
}

#[test]
fn full_geometry_buffer_errors_by_default() {
    let (backend, textures) = backend_with_textures(1);
    let config = BatchConfig::new(800, 600).with_max_sprites(2);
    let mut batch = BatchRenderer::new(backend, config).unwrap();

    batch.begin().unwrap();
    batch.draw_texture(&textures[0], 0.0, 0.0).unwrap();
    batch.draw_rectangle(0.0, 0.0, 1.0, 1.0, Color::BLUE).unwrap();
    let err = batch.draw_texture(&textures[0], 0.0, 0.0).unwrap_err();
    assert!(matches!(err, BatchError::GeometryOverflow { capacity: 2 }));
    batch.end().unwrap();
    assert_eq!(batch.backend().submissions()[0].index_count, 12);
}

#[test]
fn flip_flags_pick_uv_tables() {
    let (backend, textures) = backend_with_textures(1);
    let base = textures[0];
    let mut batch = BatchRenderer::init(backend, 0.0, 0.0, 800, 600).unwrap();

    let cases = [
        (FlipFlags::empty(), DEFAULT_UVS),
        (FlipFlags::HORIZONTAL, FLIP_HORIZONTAL_UVS),
        (FlipFlags::VERTICAL, FLIP_VERTICAL_UVS),
        (FlipFlags::HORIZONTAL | FlipFlags::VERTICAL, FLIP_BOTH_UVS),
    ];
    for (flip, expected) in cases {
        batch.begin().unwrap();
        batch.draw_texture(&base.flipped(flip), 0.0, 0.0).unwrap();
        let uvs: Vec<[f32; 2]> = batch.pending_vertices().iter().map(|v| v.uv).collect();
        assert_eq!(uvs, expected.to_vec(), "flip {flip:?}");
        batch.end().unwrap();
    }
}

#[test]
fn double_flip_matches_half_turn() {
    let (backend, textures) = backend_with_textures(1);
    let base = textures[0];
    let mut batch = BatchRenderer::init(backend, 0.0, 0.0, 800, 600).unwrap();

    batch.begin().unwrap();
    batch
        .draw_texture(
            &base.flipped(FlipFlags::HORIZONTAL | FlipFlags::VERTICAL),
            40.0,
            20.0,
        )
        .unwrap();
    batch.draw_texture_rotated(&base, 40.0, 20.0, 180.0).unwrap();
    let vertices = batch.pending_vertices().to_vec();
    batch.end().unwrap();

    let (flipped, rotated) = vertices.split_at(4);
    for v in flipped {
        let twin = rotated
            .iter()
            .find(|r| approx_v(r.position, v.position))
            .expect("rotated quad covers the same corners");
        assert!(approx_v(twin.uv, v.uv), "{:?} vs {:?}", twin.uv, v.uv);
    }
}

#[test]
fn zero_rotation_matches_plain_draw() {
    let (backend, textures) = backend_with_textures(1);
    let mut batch = BatchRenderer::init(backend, 0.0, 0.0, 800, 600).unwrap();

    batch.begin().unwrap();
    batch.draw_texture(&textures[0], 12.5, 7.0).unwrap();
    batch.draw_texture_rotated(&textures[0], 12.5, 7.0, 0.0).unwrap();
    let (plain, rotated) = batch.pending_vertices().split_at(4);
    assert_eq!(plain, rotated);
    batch.end().unwrap();
}

#[test]
fn region_draw_maps_source_pixels() {
    let mut backend = HeadlessBackend::new();
    let sheet = backend.create_texture(64, 32);
    let mut batch = BatchRenderer::init(backend, 0.0, 0.0, 800, 600).unwrap();

    batch.begin().unwrap();
    batch
        .draw_texture_region(
            &sheet,
            batch2d::Rect::new(16.0, 8.0, 16.0, 16.0),
            batch2d::Rect::new(0.0, 0.0, 48.0, 48.0),
        )
        .unwrap();
    let quad = batch.pending_vertices();
    assert!(approx_v(quad[0].uv, [0.25, 0.25]));
    assert!(approx_v(quad[2].uv, [0.5, 0.75]));
    assert_eq!(quad[2].position, [48.0, 48.0]);
    batch.end().unwrap();
}

#[test]
fn letterbox_keeps_aspect_inside_window() {
    let sizes = [
        (960, 540),
        (1280, 1024),
        (800, 600),
        (1920, 800),
        (333, 777),
        (1, 1),
    ];
    for (w, h) in sizes {
        let mut mapper = ViewportMapper::new(0.0, 0.0, 960, 540);
        mapper.resize(w, h);
        let content = mapper.content_rect();
        let rect = mapper.viewport_rect();

        assert!(content.x >= -0.5 && content.y >= -0.5, "{w}x{h}: {content:?}");
        assert!(content.right() <= w as f32 + 0.5, "{w}x{h}: {content:?}");
        assert!(content.bottom() <= h as f32 + 0.5, "{w}x{h}: {content:?}");
        // Either the width or the height fills the window.
        assert!(rect.width == w || rect.height == h, "{w}x{h}: {rect:?}");
        if w > 100 && h > 100 {
            assert!((rect.aspect() - 960.0 / 540.0).abs() < 0.01, "{w}x{h}: {rect:?}");
        }
    }
}

#[test]
fn letterbox_modes() {
    let keep_width = letterbox(800.0, 800.0, 2.0, AspectMode::KeepWidth);
    assert_eq!((keep_width.width, keep_width.height), (800.0, 400.0));
    assert_eq!(keep_width.y, 200.0);

    let keep_height = letterbox(800.0, 800.0, 2.0, AspectMode::KeepHeight);
    assert_eq!((keep_height.width, keep_height.height), (1600.0, 800.0));
    assert_eq!(keep_height.x, -400.0);

    let none = letterbox(800.0, 800.0, 2.0, AspectMode::None);
    assert_eq!((none.x, none.y, none.width, none.height), (0.0, 0.0, 800.0, 800.0));
}

#[test]
fn pointer_round_trips_in_every_mode() {
    let stretches = [
        StretchMode::None,
        StretchMode::StretchViewport,
        StretchMode::StretchProjection,
    ];
    let aspects = [
        AspectMode::None,
        AspectMode::Keep,
        AspectMode::KeepWidth,
        AspectMode::KeepHeight,
    ];
    let points = [
        Vec2::new(0.0, 0.0),
        Vec2::new(640.0, 512.0),
        Vec2::new(1279.0, 3.0),
    ];
    for stretch in stretches {
        for aspect in aspects {
            let mut mapper = ViewportMapper::new(0.0, 0.0, 960, 540);
            mapper.set_stretch_mode(stretch);
            mapper.set_aspect_mode(aspect);
            mapper.resize(1280, 1024);
            for p in points {
                let back = mapper.virtual_to_screen(mapper.screen_to_virtual(p));
                assert!(
                    approx(back.x, p.x) && approx(back.y, p.y),
                    "{stretch:?}/{aspect:?}: {p:?} -> {back:?}"
                );
            }
        }
    }
}

#[test]
fn letterboxed_center_maps_to_virtual_center() {
    let backend = HeadlessBackend::new();
    let mut batch = BatchRenderer::init(backend, 0.0, 0.0, 960, 540).unwrap();
    batch.resize(1280, 1024);
    let center = batch.screen_to_virtual(Vec2::new(640.0, 512.0));
    assert!(approx(center.x, 480.0) && approx(center.y, 270.0));

    batch.begin().unwrap();
    batch
        .draw_rectangle(0.0, 0.0, 10.0, 10.0, Color::WHITE)
        .unwrap();
    batch.end().unwrap();
    let draw = &batch.backend().submissions()[0];
    assert_eq!(draw.viewport, batch.viewport_rect());
    assert_eq!(draw.viewport.y, 152);
    assert_eq!(draw.viewport.height, 720);
}

#[test]
fn overscanned_batch_stays_inside_window_and_matches_pointer() {
    let config = BatchConfig::new(960, 540).with_aspect_mode(AspectMode::KeepWidth);
    let mut batch = BatchRenderer::new(HeadlessBackend::new(), config).unwrap();
    batch.resize(1000, 400);

    batch.begin().unwrap();
    batch
        .draw_rectangle(0.0, 0.0, 960.0, 540.0, Color::WHITE)
        .unwrap();
    batch.end().unwrap();

    let draw = &batch.backend().submissions()[0];
    let rect = draw.viewport;
    assert!(rect.x >= 0 && rect.y >= 0);
    assert!(rect.x as u32 + rect.width <= 1000 && rect.y as u32 + rect.height <= 400);

    // The pointer on the bottom window edge hits the virtual point drawn there.
    let projection = draw.projection.unwrap();
    let virt = batch.screen_to_virtual(Vec2::new(500.0, 400.0));
    let clip = projection.project_point3(glam::Vec3::new(virt.x, virt.y, 0.0));
    let drawn_y = rect.y as f32 + (1.0 - clip.y) * 0.5 * rect.height as f32;
    assert!((drawn_y - 400.0).abs() < 1e-2, "{virt:?} drawn at y={drawn_y}");
}

#[test]
fn begin_twice_is_rejected() {
    let mut batch = BatchRenderer::init(HeadlessBackend::new(), 0.0, 0.0, 800, 600).unwrap();
    batch.begin().unwrap();
    assert!(matches!(batch.begin(), Err(BatchError::AlreadyActive)));
    batch.end().unwrap();
    assert!(matches!(batch.end(), Err(BatchError::NotActive)));
    assert!(matches!(
        batch.draw_rectangle(0.0, 0.0, 1.0, 1.0, Color::WHITE),
        Err(BatchError::NotActive)
    ));
}

#[test]
fn render_target_pass_uses_target_viewport() {
    let mut backend = HeadlessBackend::new();
    let target = backend.create_texture(64, 32);
    let sprite = backend.create_texture(8, 8);
    let mut batch = BatchRenderer::init(backend, 0.0, 0.0, 800, 600).unwrap();

    batch.begin_with(BeginOptions::new().target(target)).unwrap();
    batch.draw_texture(&sprite, 1.0, 1.0).unwrap();
    batch.end().unwrap();

    let draw = &batch.backend().submissions()[0];
    assert_eq!(draw.target, Some(target.id));
    assert_eq!((draw.viewport.width, draw.viewport.height), (64, 32));
}

#[test]
fn shader_without_slot_uniforms_fails_and_closes_batch() {
    let mut backend = HeadlessBackend::new();
    let sprite = backend.create_texture(8, 8);
    let bare = backend.create_shader([PROJECTION_UNIFORM]);
    let mut batch = BatchRenderer::init(backend, 0.0, 0.0, 800, 600).unwrap();

    batch.begin_with_shader(bare, false, true).unwrap();
    batch.draw_texture(&sprite, 0.0, 0.0).unwrap();
    let err = batch.end().unwrap_err();
    assert!(matches!(err, BatchError::UnknownUniform { ref name } if name == "tex1"));
    assert!(!batch.is_active());
    batch.begin().unwrap();
    batch.end().unwrap();
}

#[test]
fn text_places_glyphs_on_a_shared_top_line() {
    let mut backend = HeadlessBackend::new();
    let t_tex = backend.create_texture(10, 12);
    let a_tex = backend.create_texture(8, 8);
    let glyph = |texture: Texture, bearing: (f32, f32), advance_px: u32| Glyph {
        texture,
        bearing: Vec2::new(bearing.0, bearing.1),
        advance: advance_px << 6,
    };
    let font = Font::from_glyphs(
        [
            ('T', glyph(t_tex, (0.0, 12.0), 11)),
            ('a', glyph(a_tex, (1.0, 8.0), 9)),
            (' ', glyph(Texture::default(), (0.0, 0.0), 5)),
        ],
        16.0,
    );
    let mut batch = BatchRenderer::init(backend, 0.0, 0.0, 800, 600).unwrap();

    batch.begin().unwrap();
    batch.draw_text(&font, "Ta a\nT", 100.0, 50.0).unwrap();
    let positions: Vec<[f32; 2]> = batch
        .pending_vertices()
        .chunks(4)
        .map(|quad| quad[0].position)
        .collect();
    batch.end().unwrap();

    assert_eq!(
        positions,
        vec![
            [100.0, 51.0],
            [112.0, 55.0],
            [126.0, 55.0],
            [100.0, 67.0],
        ]
    );
    let draw = &batch.backend().submissions()[0];
    assert_eq!(draw.quad_count(), 4);
    assert_eq!(draw.bound_texture_count(), 2);
}

#[test]
fn dispose_releases_backend_resources() {
    let batch = BatchRenderer::init(HeadlessBackend::new(), 0.0, 0.0, 800, 600).unwrap();
    assert!(batch.backend().has_geometry());
    assert_eq!(batch.backend().index_table()[..6], [0, 1, 2, 2, 3, 0]);
    let backend = batch.dispose();
    assert!(!backend.has_geometry());
    assert_eq!(backend.shader_count(), 0);
}
