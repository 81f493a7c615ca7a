use image::{Rgba, RgbaImage};

use tegaki::brush::line_stamps;
use tegaki::coords::Mat4;
use tegaki::{
    BackendKind, BlendMode, Brush, ConstantPressure, DirtyRect, DrawingBackend, Engine, EngineConfig,
    EngineError, EngineStatus, Layer, LinearPressure, SoftwareBackend, StrokePhase, init_engine,
};

fn engine(w: u32, h: u32) -> Engine<SoftwareBackend> {
    engine_with(w, h, EngineConfig::default())
}

fn engine_with(w: u32, h: u32, config: EngineConfig) -> Engine<SoftwareBackend> {
    let backend = SoftwareBackend::new(w, h, &config).unwrap();
    Engine::new(backend, config).unwrap()
}

fn gradient(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 8) as u8, (y * 8) as u8, 128, 255]))
}

fn max_channel_diff(a: &RgbaImage, b: &RgbaImage) -> u8 {
    a.pixels()
        .zip(b.pixels())
        .flat_map(|(p, q)| (0..4).map(move |c| p[c].abs_diff(q[c])))
        .max()
        .unwrap_or(0)
}

#[test]
fn upload_then_full_sync_round_trips() {
    let mut e = engine(16, 16);
    let original = gradient(16, 16);
    let mut layer = Layer::from_pixels("gradient", original.clone());
    assert!(e.composite(std::slice::from_mut(&mut layer), DirtyRect::full(16, 16)));
    assert!(e.sync_dirty_region_to_cpu(&mut layer, DirtyRect::full(16, 16)));
    assert!(max_channel_diff(&original, layer.pixels()) <= 2);
}

fn hard_edge(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, _| {
        if x < w / 2 { Rgba([255, 255, 255, 255]) } else { Rgba([0, 0, 0, 255]) }
    })
}

fn supersampled(w: u32, h: u32, ss: f32) -> Engine<SoftwareBackend> {
    engine_with(w, h, EngineConfig { supersample: ss, ..EngineConfig::default() })
}

/// Force a CPU → GPU upload, then pull the whole layer back.
fn upload_and_sync(e: &mut Engine<SoftwareBackend>, layer: &mut Layer) {
    let (w, h) = (layer.width(), layer.height());
    layer.mark_dirty();
    assert!(e.composite(std::slice::from_mut(layer), DirtyRect::full(w, h)));
    assert!(e.sync_dirty_region_to_cpu(layer, DirtyRect::full(w, h)));
}

#[test]
fn hard_edge_round_trips_at_integer_and_fractional_supersampling() {
    for ss in [2.0, 1.5, 3.0] {
        let mut e = supersampled(16, 16, ss);
        let original = hard_edge(16, 16);
        let mut layer = Layer::from_pixels("edge", original.clone());
        upload_and_sync(&mut e, &mut layer);
        let diff = max_channel_diff(&original, layer.pixels());
        assert!(diff <= 2, "ss {ss}: max diff {diff}, edge {:?}", layer.pixels().get_pixel(7, 0));
    }
}

#[test]
fn repeated_upload_sync_cycles_do_not_blur() {
    let mut e = engine(16, 16);
    let original = hard_edge(16, 16);
    let mut layer = Layer::from_pixels("edge", original.clone());
    for _ in 0..5 {
        upload_and_sync(&mut e, &mut layer);
    }
    assert!(max_channel_diff(&original, layer.pixels()) <= 2);
}

#[test]
fn smooth_gradient_round_trips_at_fractional_supersampling() {
    let mut e = supersampled(5, 5, 1.5);
    let original = RgbaImage::from_fn(5, 5, |x, y| Rgba([(x * 60) as u8, (y * 60) as u8, 128, 255]));
    let mut layer = Layer::from_pixels("ramp", original.clone());
    upload_and_sync(&mut e, &mut layer);
    assert!(max_channel_diff(&original, layer.pixels()) <= 2);
}

#[test]
fn semi_transparent_round_trip_keeps_straight_colour() {
    let mut e = engine(8, 8);
    let mut layer = Layer::new_filled("wash", 8, 8, Rgba([200, 100, 50, 128]));
    let original = layer.pixels().clone();
    assert!(e.composite(std::slice::from_mut(&mut layer), DirtyRect::full(8, 8)));
    assert!(e.sync_dirty_region_to_cpu(&mut layer, DirtyRect::full(8, 8)));
    assert!(max_channel_diff(&original, layer.pixels()) <= 2);
}

#[test]
fn compositing_twice_is_bit_identical() {
    let mut e = engine(24, 24);
    let mut top = Layer::new_filled("top", 24, 24, Rgba([40, 120, 220, 160]));
    top.blend_mode = BlendMode::Screen;
    let mut layers = vec![Layer::from_pixels("bottom", gradient(24, 24)), top];
    let first = e.export_full_image(&mut layers).unwrap();
    let second = e.export_full_image(&mut layers).unwrap();
    assert_eq!(first, second);
}

#[test]
fn layer_order_changes_multiply_result() {
    let mut e = engine(8, 8);
    let bottom = Layer::new_filled("a", 8, 8, Rgba([200, 60, 30, 255]));
    let mut top = Layer::new_filled("b", 8, 8, Rgba([40, 120, 220, 160]));
    top.blend_mode = BlendMode::Multiply;

    let mut layers = vec![bottom, top];
    let forward = e.export_full_image(&mut layers).unwrap();
    layers.reverse();
    let reversed = e.export_full_image(&mut layers).unwrap();

    assert_ne!(forward.get_pixel(4, 4), reversed.get_pixel(4, 4));
    // Multiply over nothing leaves nothing; the opaque layer then covers it.
    assert_eq!(reversed.get_pixel(4, 4), &Rgba([200, 60, 30, 255]));
}

#[test]
fn eraser_only_touches_its_footprint() {
    let mut e = engine(64, 64);
    let mut layer = Layer::new_filled("paper", 64, 64, Rgba([200, 100, 50, 255]));
    let before = layer.pixels().clone();
    let (cx, cy, r) = (20.0f32, 20.0f32, 4.0f32);

    e.begin_stroke(&layer);
    assert!(e.stamp_circle(&mut layer, [cx, cy], r, &Brush::eraser()));
    assert!(e.end_stroke(&mut layer));

    for (x, y, p) in layer.pixels().enumerate_pixels() {
        let old = before.get_pixel(x, y);
        assert!(p[3] <= old[3]);
        let dx = x as f32 + 0.5 - cx;
        let dy = y as f32 + 0.5 - cy;
        if (dx * dx + dy * dy).sqrt() > r + 3.0 {
            assert_eq!(p, old, "pixel ({x}, {y}) changed outside the eraser");
        }
    }
    assert_eq!(layer.pixels().get_pixel(20, 20)[3], 0);
}

#[test]
fn zero_length_line_is_one_stamp() {
    let config = EngineConfig::default();
    let stamps = line_stamps([12.0, 9.0], [12.0, 9.0], 10.0, [0.25, 0.5], &LinearPressure, &config).unwrap();
    assert_eq!(stamps.len(), 1);
    assert_eq!(stamps[0].radius, 2.5);

    let mut e = engine(24, 24);
    let brush = Brush::paint(Rgba([10, 200, 10, 255]));
    let mut by_line = Layer::new("line", 24, 24);
    let mut by_circle = Layer::new("circle", 24, 24);

    e.begin_stroke(&by_line);
    assert!(e.stamp_line(&mut by_line, [12.0, 9.0], [12.0, 9.0], 10.0, &brush, [0.25, 0.5], &LinearPressure));
    assert!(e.end_stroke(&mut by_line));

    e.begin_stroke(&by_circle);
    assert!(e.stamp_circle(&mut by_circle, [12.0, 9.0], 2.5, &brush));
    assert!(e.end_stroke(&mut by_circle));

    assert_eq!(by_line.pixels(), by_circle.pixels());
}

#[test]
fn inverted_dirty_rect_sync_is_a_no_op() {
    let mut e = engine(16, 16);
    let mut layer = Layer::new("ink", 16, 16);
    assert!(e.stamp_circle(&mut layer, [8.0, 8.0], 3.0, &Brush::paint(Rgba([0, 0, 0, 255]))));
    let before = layer.pixels().clone();

    assert!(!e.sync_dirty_region_to_cpu(&mut layer, DirtyRect::new(10.0, 0.0, 5.0, 16.0)));
    assert_eq!(layer.pixels(), &before);
    assert!(layer.needs_cpu_refresh());
}

#[test]
fn eraser_disc_on_red_canvas() {
    let mut e = engine(100, 100);
    let mut layers = vec![Layer::new_filled("red", 100, 100, Rgba([255, 0, 0, 255]))];

    e.begin_stroke(&layers[0]);
    assert!(e.stamp_circle(&mut layers[0], [50.0, 50.0], 10.0, &Brush::eraser()));
    assert!(e.frame(&mut layers).is_some());
    let image = e.export_full_image(&mut layers).unwrap();

    assert_eq!(image.get_pixel(50, 50)[3], 0);
    assert_eq!(image.get_pixel(50, 57)[3], 0);
    assert_eq!(image.get_pixel(43, 50)[3], 0);
    assert_eq!(image.get_pixel(50, 64), &Rgba([255, 0, 0, 255]));
    assert_eq!(image.get_pixel(36, 50), &Rgba([255, 0, 0, 255]));
    assert_eq!(image.get_pixel(5, 5), &Rgba([255, 0, 0, 255]));
    // No colour fringe in the anti-aliased band.
    for p in image.pixels().filter(|p| p[3] > 0) {
        assert_eq!((p[0], p[1], p[2]), (255, 0, 0));
    }

    assert!(e.end_stroke(&mut layers[0]));
    assert_eq!(layers[0].pixels().get_pixel(50, 50)[3], 0);
    assert_eq!(layers[0].pixels().get_pixel(90, 90), &Rgba([255, 0, 0, 255]));
}

#[test]
fn resize_mid_session_reallocates_composite() {
    let mut e = engine(400, 400);
    let mut layers = vec![
        Layer::new_filled("paper", 400, 400, Rgba([255, 255, 255, 255])),
        Layer::new("ink", 400, 400),
    ];
    assert!(e.stamp_circle(&mut layers[1], [100.0, 100.0], 8.0, &Brush::paint(Rgba([0, 0, 0, 255]))));
    assert!(e.frame(&mut layers).is_some());

    e.resize(800, 300).unwrap();
    assert_eq!(e.backend().composite_size(), (1600, 600));
    assert_eq!(e.canvas_size(), (800, 300));
    assert!(e.redraw_pending());

    for layer in &mut layers {
        layer.resize(800, 300);
    }
    assert!(e.stamp_circle(&mut layers[1], [700.0, 250.0], 6.0, &Brush::paint(Rgba([0, 0, 0, 255]))));
    assert!(e.frame(&mut layers).is_some());

    let image = e.export_full_image(&mut layers).unwrap();
    assert_eq!(image.dimensions(), (800, 300));
    assert_eq!(image.get_pixel(700, 250), &Rgba([0, 0, 0, 255]));
    assert_eq!(image.get_pixel(300, 50), &Rgba([255, 255, 255, 255]));
    // Growing a layer pads it with transparency.
    assert_eq!(image.get_pixel(600, 50)[3], 0);
}

#[test]
fn repeated_allocation_failures_disable_drawing() {
    let config = EngineConfig {
        max_texture_dimension: 32,
        max_allocation_failures: 3,
        ..EngineConfig::default()
    };
    let mut e = init_engine(BackendKind::Software, 8, 8, config).unwrap();
    let mut too_big = Layer::new_filled("poster", 40, 40, Rgba([0, 0, 255, 255]));
    let brush = Brush::paint(Rgba([0, 0, 0, 255]));
    for _ in 0..3 {
        assert!(!e.stamp_circle(&mut too_big, [4.0, 4.0], 2.0, &brush));
    }
    match e.status() {
        EngineStatus::Disabled { reason } => assert!(reason.contains("allocation")),
        EngineStatus::Ready => panic!("engine should be disabled"),
    }
    let mut ok = vec![Layer::new("ok", 8, 8)];
    assert!(e.frame(&mut ok).is_none());
    assert!(matches!(e.resize(16, 16), Err(EngineError::Disabled(_))));
}

#[test]
fn non_finite_input_is_ignored() {
    let mut e = engine(16, 16);
    let mut layer = Layer::new("ink", 16, 16);
    let brush = Brush::paint(Rgba([0, 0, 0, 255]));
    assert!(!e.stamp_line(&mut layer, [f32::NAN, 1.0], [4.0, 4.0], 3.0, &brush, [1.0, 1.0], &ConstantPressure));
    assert!(!e.stamp_circle(&mut layer, [4.0, 4.0], f32::INFINITY, &brush));
    assert!(!e.redraw_pending());
    assert!(!layer.needs_cpu_refresh());
    assert!(e.is_enabled());
}

#[test]
fn many_stamps_coalesce_into_one_frame() {
    let mut e = engine(64, 64);
    let mut layers = vec![Layer::new("ink", 64, 64)];
    let brush = Brush::paint(Rgba([0, 0, 0, 255]));
    assert!(e.stamp_circle(&mut layers[0], [5.0, 5.0], 2.0, &brush));
    assert!(e.stamp_circle(&mut layers[0], [50.0, 40.0], 2.0, &brush));
    e.request_redraw(DirtyRect::EMPTY);

    let drawn = e.frame(&mut layers).unwrap();
    assert!(drawn.min_x <= 3.0 && drawn.max_x >= 52.0);
    assert!(drawn.min_y <= 3.0 && drawn.max_y >= 42.0);
    assert!(e.frame(&mut layers).is_none());
}

#[test]
fn translated_layer_composites_and_syncs_in_local_space() {
    let mut e = engine(32, 32);
    let ss = e.config().supersample;
    let mut layer = Layer::new_filled("card", 16, 32, Rgba([0, 0, 255, 255]));
    layer.model = Mat4::translation(8.0 * ss, 0.0);
    let mut layers = vec![layer];

    let image = e.export_full_image(&mut layers).unwrap();
    assert_eq!(image.get_pixel(3, 16)[3], 0);
    assert_eq!(image.get_pixel(16, 16), &Rgba([0, 0, 255, 255]));
    assert_eq!(image.get_pixel(28, 16)[3], 0);

    e.begin_stroke(&layers[0]);
    assert!(e.stamp_circle(&mut layers[0], [16.0, 16.0], 3.0, &Brush::paint(Rgba([0, 0, 0, 255]))));
    assert!(e.end_stroke(&mut layers[0]));
    assert_eq!(layers[0].pixels().get_pixel(8, 16), &Rgba([0, 0, 0, 255]));
    assert_eq!(layers[0].pixels().get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
}

#[test]
fn rotated_layer_stroke_syncs_through_the_inverse_model() {
    let mut e = engine(64, 64);
    let ss = e.config().supersample;
    let mut layer = Layer::new("turned", 32, 32);
    // Local (u, v) lands at world (32·ss − v, u): a quarter turn clockwise.
    layer.model = Mat4::translation(32.0 * ss, 0.0) * Mat4::rotation(std::f32::consts::FRAC_PI_2);
    let mut layers = vec![layer];

    e.begin_stroke(&layers[0]);
    assert!(e.stamp_circle(&mut layers[0], [24.5, 8.5], 3.0, &Brush::paint(Rgba([0, 0, 0, 255]))));
    assert!(e.end_stroke(&mut layers[0]));

    let pixels = layers[0].pixels();
    // World (24.5, 8.5) is local (8.5, 7.5).
    assert_eq!(pixels.get_pixel(8, 7), &Rgba([0, 0, 0, 255]));
    assert_eq!(pixels.get_pixel(10, 7), &Rgba([0, 0, 0, 255]));
    assert_eq!(pixels.get_pixel(24, 8)[3], 0);
    assert!(layers[0].snapshot().is_ok());

    let image = e.export_full_image(&mut layers).unwrap();
    assert_eq!(image.get_pixel(24, 8), &Rgba([0, 0, 0, 255]));
}

#[test]
fn scaled_layer_stroke_syncs_at_local_resolution() {
    let mut e = engine(64, 64);
    let mut layer = Layer::new("zoomed", 16, 16);
    layer.model = Mat4::scale(2.0, 2.0);
    let mut layers = vec![layer];

    e.begin_stroke(&layers[0]);
    assert!(e.stamp_circle(&mut layers[0], [21.0, 21.0], 4.0, &Brush::paint(Rgba([200, 40, 40, 255]))));
    assert!(e.end_stroke(&mut layers[0]));

    let pixels = layers[0].pixels();
    // Twice the size on screen: radius 4 in world is radius 2 in the layer.
    assert_eq!(pixels.get_pixel(10, 10), &Rgba([200, 40, 40, 255]));
    assert_eq!(pixels.get_pixel(11, 10), &Rgba([200, 40, 40, 255]));
    assert_eq!(pixels.get_pixel(10, 14)[3], 0);
    assert_eq!(pixels.get_pixel(5, 5)[3], 0);

    let image = e.export_full_image(&mut layers).unwrap();
    assert_eq!(image.get_pixel(21, 21), &Rgba([200, 40, 40, 255]));
    assert_eq!(image.get_pixel(50, 50)[3], 0);
}

#[test]
fn add_layer_sums_colour_end_to_end() {
    let mut e = engine(8, 8);
    let bottom = Layer::new_filled("base", 8, 8, Rgba([100, 50, 20, 255]));
    let mut glow = Layer::new_filled("glow", 8, 8, Rgba([60, 100, 250, 255]));
    glow.blend_mode = BlendMode::Add;
    let mut layers = vec![bottom, glow];

    let image = e.export_full_image(&mut layers).unwrap();
    assert_eq!(image.get_pixel(4, 4), &Rgba([160, 150, 255, 255]));

    layers[1].opacity = 0.5;
    let image = e.export_full_image(&mut layers).unwrap();
    assert_eq!(image.get_pixel(4, 4), &Rgba([130, 100, 145, 255]));
}

#[test]
fn snapshot_requires_synced_layer_and_restores() {
    let mut e = engine(16, 16);
    let mut layers = vec![Layer::new_filled("paper", 16, 16, Rgba([255, 255, 255, 255]))];
    let clean = layers[0].snapshot().unwrap();

    e.begin_stroke(&layers[0]);
    assert!(e.stamp_circle(&mut layers[0], [8.0, 8.0], 3.0, &Brush::paint(Rgba([255, 0, 0, 255]))));
    assert!(matches!(layers[0].snapshot(), Err(EngineError::StaleCpuBuffer(_))));
    assert!(e.end_stroke(&mut layers[0]));
    let painted = layers[0].snapshot().unwrap();
    assert_ne!(painted, clean);

    layers[0].restore(&clean).unwrap();
    assert!(layers[0].is_dirty());
    let image = e.export_full_image(&mut layers).unwrap();
    assert_eq!(image.get_pixel(8, 8), &Rgba([255, 255, 255, 255]));
}

#[test]
fn cancelled_stroke_keeps_drawn_stamps() {
    let mut e = engine(16, 16);
    let mut layer = Layer::new("ink", 16, 16);
    e.begin_stroke(&layer);
    assert!(e.stamp_circle(&mut layer, [8.0, 8.0], 3.0, &Brush::paint(Rgba([0, 255, 0, 255]))));
    assert!(e.cancel_stroke(&mut layer));
    assert_eq!(e.stroke_phase(), StrokePhase::Idle);
    assert_eq!(layer.pixels().get_pixel(8, 8), &Rgba([0, 255, 0, 255]));
}

#[test]
fn offscreen_render_scales_to_requested_size() {
    let mut e = engine(32, 16);
    let mut layers = vec![Layer::new_filled("paper", 32, 16, Rgba([10, 20, 30, 255]))];
    let thumb = e.render_to_offscreen(&mut layers, 8, 4).unwrap();
    assert_eq!(thumb.dimensions(), (8, 4));
    assert!(thumb.pixels().all(|p| *p == Rgba([10, 20, 30, 255])));
}

#[test]
fn released_layer_is_reallocated_on_next_use() {
    let mut e = engine(8, 8);
    let mut layers = vec![Layer::new_filled("paper", 8, 8, Rgba([0, 0, 0, 255]))];
    assert!(e.frame(&mut layers).is_none());
    e.request_redraw(DirtyRect::full(8, 8));
    assert!(e.frame(&mut layers).is_some());
    assert!(e.backend().has_layer(layers[0].id()));

    e.release_layer(layers[0].id());
    assert!(!e.backend().has_layer(layers[0].id()));
    let image = e.export_full_image(&mut layers).unwrap();
    assert_eq!(image.get_pixel(4, 4), &Rgba([0, 0, 0, 255]));
}

#[test]
fn cpu_edits_are_reuploaded_and_visible_on_display() {
    let mut e = engine(8, 8);
    let mut layers = vec![Layer::new_filled("paper", 8, 8, Rgba([255, 255, 255, 255]))];
    e.request_redraw(DirtyRect::full(8, 8));
    assert!(e.frame(&mut layers).is_some());
    assert_eq!(e.display_pixel(2, 2).unwrap(), Rgba([255, 255, 255, 255]));

    layers[0].replace_pixels(RgbaImage::from_pixel(8, 8, Rgba([0, 128, 0, 255])));
    assert!(layers[0].is_dirty());
    e.request_redraw(DirtyRect::full(8, 8));
    assert!(e.frame(&mut layers).is_some());
    assert!(!layers[0].is_dirty());
    assert_eq!(e.display_pixel(2, 2).unwrap(), Rgba([0, 128, 0, 255]));

    layers[0].pixels_mut().put_pixel(5, 5, Rgba([255, 0, 0, 255]));
    layers[0].mark_dirty();
    let image = e.export_full_image(&mut layers).unwrap();
    assert_eq!(image.get_pixel(0, 0), &Rgba([0, 128, 0, 255]));
    assert!(image.get_pixel(5, 5)[0] > 100);
    // Outside the canvas reads as transparent.
    assert_eq!(e.display_pixel(50, 50).unwrap(), Rgba([0, 0, 0, 0]));
}

#[test]
fn backend_can_be_driven_directly() {
    let mut e = engine(8, 8);
    let id = tegaki::LayerId::next();
    e.backend_mut().allocate_layer(id, 16, 16).unwrap();
    assert_eq!(e.backend().layer_size(id), Some((16, 16)));
    assert!(id.raw() > 0);
    e.release_layer(id);
    assert!(!e.backend().has_layer(id));
}
