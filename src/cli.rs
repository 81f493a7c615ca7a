// ============================================================================
// Tegaki CLI — headless demo renderer
// ============================================================================
//
// Usage examples:
//   tegaki --output demo.png
//   tegaki -o demo.png --backend gpu --width 800 --height 600
//   tegaki -o thumb.png --export-width 200 --export-height 150
//   tegaki -o demo.png --config engine.json --verbose
//
// Builds a small scene (background, a pressure-varying stroke, a multiply
// layer, an eraser pass), runs it through the engine and writes the result
// as PNG.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use image::{Rgba, RgbaImage};

use crate::backend::{BackendKind, DrawingBackend};
use crate::brush::{Brush, GammaPressure};
use crate::canvas::{BlendMode, Layer};
use crate::config::EngineConfig;
use crate::engine::{init_engine, Engine};
use crate::error::{EngineError, EngineResult};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Software,
    Gpu,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Software => BackendKind::Software,
            BackendArg::Gpu => BackendKind::Gpu,
        }
    }
}

/// Tegaki demo renderer.
///
/// Paints a fixed scene through the raster pipeline and saves it as PNG.
#[derive(Parser, Debug)]
#[command(
    name = "tegaki",
    about = "Tegaki raster pipeline demo renderer",
    long_about = "Paint a fixed demo scene through the Tegaki compositing pipeline\n\
                  and write the result as a PNG.\n\n\
                  Example:\n  \
                  tegaki --output demo.png --backend gpu --width 800 --height 600"
)]
pub struct CliArgs {
    /// Output PNG path.
    #[arg(short, long, value_name = "FILE.png")]
    pub output: PathBuf,

    /// Raster backend.
    #[arg(short, long, value_enum, default_value_t = BackendArg::Software)]
    pub backend: BackendArg,

    /// Canvas width in pixels.
    #[arg(long, default_value_t = 512)]
    pub width: u32,

    /// Canvas height in pixels.
    #[arg(long, default_value_t = 384)]
    pub height: u32,

    /// Engine configuration (JSON).  Missing keys take their defaults.
    #[arg(short, long, value_name = "FILE.json")]
    pub config: Option<PathBuf>,

    /// Override the supersampling factor from the config.
    #[arg(long, value_name = "1-4")]
    pub supersample: Option<f32>,

    /// Render through an off-screen target of this width instead of the
    /// display target.  Requires --export-height.
    #[arg(long, requires = "export_height")]
    pub export_width: Option<u32>,

    #[arg(long, requires = "export_width")]
    pub export_height: Option<u32>,

    /// Debug-level logging and timing output.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// `0` on success, `1` on any failure.
pub fn run(args: CliArgs) -> ExitCode {
    let start = Instant::now();
    match render(&args) {
        Ok(()) => {
            if args.verbose {
                println!(
                    "  → {} ({:.0}ms)",
                    args.output.display(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("demo render failed: {e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>, supersample: Option<f32>) -> EngineResult<EngineConfig> {
    let mut config = match path {
        Some(p) => EngineConfig::load(p)?,
        None => EngineConfig::default(),
    };
    if let Some(ss) = supersample {
        config.supersample = ss;
    }
    config.validate()?;
    Ok(config)
}

fn render(args: &CliArgs) -> EngineResult<()> {
    let config = load_config(args.config.as_deref(), args.supersample)?;
    let mut engine = init_engine(args.backend.into(), args.width, args.height, config)?;
    tracing::info!("rendering demo scene on {} backend", engine.backend().name());

    let mut layers = paint_demo_scene(&mut engine, args.width, args.height);

    let image = match (args.export_width, args.export_height) {
        (Some(w), Some(h)) => engine.render_to_offscreen(&mut layers, w, h)?,
        _ => engine.export_full_image(&mut layers)?,
    };
    write_png(&image, &args.output)
}

fn write_png(image: &RgbaImage, path: &Path) -> EngineResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    image
        .save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| EngineError::Io(std::io::Error::other(e)))
}

// ============================================================================
// Demo scene
// ============================================================================

/// Background, a pressure stroke, a multiply disc and an eraser pass.
/// Strokes are synced back to their layers as a host would on pointer-up.
pub fn paint_demo_scene<B: DrawingBackend>(engine: &mut Engine<B>, width: u32, height: u32) -> Vec<Layer> {
    let (w, h) = (width as f32, height as f32);
    let background = Layer::new_filled("Background", width, height, Rgba([250, 246, 238, 255]));
    let mut ink = Layer::new("Ink", width, height);
    let mut tint = Layer::new("Tint", width, height);
    tint.blend_mode = BlendMode::Multiply;
    tint.opacity = 0.8;

    let curve = GammaPressure { gamma: 1.6, min_factor: 0.15 };
    let ink_brush = Brush::paint(Rgba([30, 60, 160, 255]));
    let size = (w.min(h) * 0.08).max(2.0);
    let points = 48;
    engine.begin_stroke(&ink);
    let mut prev = [w * 0.1, h * 0.5];
    for i in 1..=points {
        let t = i as f32 / points as f32;
        let next = [
            w * (0.1 + 0.8 * t),
            h * (0.5 + 0.3 * (t * std::f32::consts::TAU).sin()),
        ];
        let p0 = ((i - 1) as f32 / points as f32 * std::f32::consts::PI).sin();
        let p1 = (t * std::f32::consts::PI).sin();
        engine.stamp_line(&mut ink, prev, next, size, &ink_brush, [p0, p1], &curve);
        prev = next;
    }
    engine.end_stroke(&mut ink);

    engine.begin_stroke(&tint);
    let tint_brush = Brush::paint(Rgba([230, 120, 40, 255]));
    engine.stamp_circle(&mut tint, [w * 0.65, h * 0.4], w.min(h) * 0.22, &tint_brush);
    engine.end_stroke(&mut tint);

    engine.begin_stroke(&ink);
    let eraser = Brush::eraser();
    engine.stamp_line(
        &mut ink,
        [w * 0.45, h * 0.1],
        [w * 0.55, h * 0.9],
        size * 0.6,
        &eraser,
        [1.0, 1.0],
        &crate::brush::ConstantPressure,
    );
    engine.end_stroke(&mut ink);

    vec![background, ink, tint]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_and_export_size() {
        let args = CliArgs::try_parse_from([
            "tegaki",
            "-o",
            "out.png",
            "--backend",
            "gpu",
            "--export-width",
            "64",
            "--export-height",
            "32",
        ])
        .unwrap();
        assert_eq!(args.backend, BackendArg::Gpu);
        assert_eq!(args.export_width, Some(64));
        assert_eq!(BackendKind::from(args.backend), BackendKind::Gpu);
    }

    #[test]
    fn export_width_needs_height() {
        assert!(CliArgs::try_parse_from(["tegaki", "-o", "x.png", "--export-width", "4"]).is_err());
    }

    #[test]
    fn supersample_override_is_validated() {
        assert!(load_config(None, Some(2.0)).is_ok());
        assert!(load_config(None, Some(9.0)).is_err());
    }

    #[test]
    fn demo_scene_renders_to_png() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("demo.png");
        let args = CliArgs::try_parse_from([
            "tegaki",
            "-o",
            out.to_str().unwrap(),
            "--width",
            "48",
            "--height",
            "32",
        ])
        .unwrap();
        assert_eq!(run(args), ExitCode::SUCCESS);
        let img = image::open(&out).unwrap().into_rgba8();
        assert_eq!(img.dimensions(), (48, 32));
        // The background is opaque everywhere.
        assert!(img.pixels().all(|p| p[3] == 255));
    }
}
