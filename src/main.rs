use clap::Parser;
use crossterm::style::{self, Stylize};
use pagelight::orchestrator::{DisplaySurface, RenderOrchestrator};
use pagelight::presets::PagePreset;
use pagelight::renderer::{CpuRenderer, Framebuffer, RenderSettings};
use std::io::{self, Write};
use std::process::ExitCode;

/// pagelight — ray-trace page compositions in your terminal
#[derive(Parser, Debug)]
#[command(
    name = "pagelight",
    version,
    about = "Render DOM-like page compositions as ray-traced 3D scenes 🦀",
    long_about = "Renders page compositions — stacks of rounded, colored, possibly \
                  translucent boxes — as orthographic ray-traced scenes with analytical \
                  lights, soft shadows, and refraction, straight into your terminal.",
    after_help = "EXAMPLES:\n  \
                  pagelight --preset cards --mode halfblock\n  \
                  pagelight --preset stress --scroll 400\n  \
                  pagelight --preset hero --shadow-blur 3 --out hero.ppm"
)]
struct Cli {
    /// Page preset to render
    #[arg(short, long, value_enum, default_value_t = PagePreset::Cards)]
    preset: PagePreset,

    /// Terminal output encoding mode
    #[arg(short, long, value_enum, default_value_t = CliOutputMode::Halfblock)]
    mode: CliOutputMode,

    /// Vertical scroll offset into the content canvas, in pixels
    #[arg(long, default_value_t = 0.0)]
    scroll: f32,

    /// Override the scene's shadow blur radius (0 = hard shadows)
    #[arg(long)]
    shadow_blur: Option<f32>,

    /// Tile row height for the cache, in pixels
    #[arg(long, default_value_t = 200)]
    tile_height: u32,

    /// Also write the composited viewport to a PPM image file
    #[arg(long)]
    out: Option<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliOutputMode {
    /// Full-block characters with 24-bit true color
    Truecolor,
    /// Half-block characters (▀) — 2 vertical pixels per cell
    Halfblock,
    /// ASCII grayscale density ramp
    Ascii,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let mut page = cli.preset.build();
    if let Some(blur) = cli.shadow_blur {
        page.scene.shadow_blur = Some(blur);
    }

    let settings = RenderSettings {
        tile_height: cli.tile_height,
        ..RenderSettings::default()
    };
    let renderer = match CpuRenderer::create(settings) {
        Ok(renderer) => renderer,
        Err(e) => {
            eprintln!("pagelight: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut orchestrator = RenderOrchestrator::new(renderer, DisplaySurface::new());
    let result = orchestrator.update_scene(
        page.scene,
        page.camera,
        page.content_w,
        page.content_h,
        page.viewport_w,
        page.viewport_h,
        cli.scroll,
    );
    if let Err(e) = result {
        eprintln!("pagelight: render failed: {e}");
        return ExitCode::FAILURE;
    }

    if let Some(stats) = orchestrator.last_stats() {
        eprintln!(
            "  Time: {:.2}s | {:.2}M rays | {:.2} Mrays/s",
            stats.elapsed_secs,
            stats.primary_rays as f64 / 1e6,
            stats.mrays_per_sec()
        );
    }

    let surface = &orchestrator.compositor;
    eprintln!(
        "  {} — content {}×{}, viewport {}×{} @ scroll {}",
        page.name, page.content_w, page.content_h, surface.width, surface.height, cli.scroll
    );

    match cli.mode {
        CliOutputMode::Truecolor => display_truecolor(surface),
        CliOutputMode::Halfblock => display_halfblock(surface),
        CliOutputMode::Ascii => display_ascii(surface),
    }

    if let Some(path) = cli.out {
        match surface_to_framebuffer(surface) {
            Ok(fb) => {
                if let Err(e) = fb.write_ppm(&path) {
                    eprintln!("pagelight: cannot write {path}: {e}");
                    return ExitCode::FAILURE;
                }
                eprintln!("  wrote {path}");
            }
            Err(e) => {
                eprintln!("pagelight: {e}");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

fn surface_to_framebuffer(
    surface: &DisplaySurface,
) -> Result<Framebuffer, pagelight::renderer::RendererError> {
    let mut fb = Framebuffer::new(surface.width, surface.height)?;
    fb.pixels.copy_from_slice(&surface.pixels);
    Ok(fb)
}

// ─── Terminal Display ───────────────────────────────────────────────────────

fn display_truecolor(surface: &DisplaySurface) {
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    for y in 0..surface.height {
        for x in 0..surface.width {
            let [r, g, b, _] = surface.get(x, y);
            let _ = write!(out, "{}", "█".with(style::Color::Rgb { r, g, b }));
        }
        let _ = writeln!(out);
    }
    let _ = out.flush();
}

fn display_halfblock(surface: &DisplaySurface) {
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let rows = surface.height / 2;
    for row in 0..rows {
        for x in 0..surface.width {
            let [tr, tg, tb, _] = surface.get(x, row * 2);
            let [br, bg, bb, _] = surface.get(x, row * 2 + 1);
            let _ = write!(
                out,
                "{}",
                "▀".with(style::Color::Rgb {
                    r: tr,
                    g: tg,
                    b: tb
                })
                .on(style::Color::Rgb {
                    r: br,
                    g: bg,
                    b: bb
                })
            );
        }
        let _ = writeln!(out);
    }
    let _ = out.flush();
}

fn display_ascii(surface: &DisplaySurface) {
    const RAMP: &[u8] = b" .:-=+*#%@";
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    for y in 0..surface.height {
        for x in 0..surface.width {
            let [r, g, b, _] = surface.get(x, y);
            let lum = 0.2126 * r as f32 + 0.7152 * g as f32 + 0.0722 * b as f32;
            let idx = ((lum / 256.0).clamp(0.0, 0.999) * RAMP.len() as f32) as usize;
            let _ = write!(out, "{}", RAMP[idx] as char);
        }
        let _ = writeln!(out);
    }
    let _ = out.flush();
}
