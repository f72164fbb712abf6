use crate::camera::OrthographicCamera;
use crate::compile::{compile_with, CompileOptions, RenderScene};
use crate::intersect::SELF_SHADOW_OFFSET;
use crate::math::*;
use crate::scene::Scene;
use log::debug;
use rayon::prelude::*;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

// Transport constants shared with any shader port; divergence between a
// CPU and GPU path on any of these is a correctness bug.
pub const MAX_BOUNCES: u32 = 4;
pub const TRANSMITTANCE_CUTOFF: f32 = 0.01;
pub const GAMMA: f32 = 2.2;
/// PCF kernel half-width: taps at {-1, 0, 1} × shadow_blur on each axis.
pub const PCF_RADIUS: i32 = 1;

// ─── Errors ─────────────────────────────────────────────────────────────────

/// Construction-time failures. Per-ray numeric edge cases are handled
/// locally and never surface here.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("no rendering backend available: {0}")]
    CapabilityMissing(String),
    #[error("cannot allocate a {width}×{height} framebuffer")]
    AllocationFailed { width: u32, height: u32 },
}

// ─── Render Settings ────────────────────────────────────────────────────────

/// The embedder-facing configuration knobs. Scene-level shadow blur lives
/// on the `Scene`; the numeric transport contract lives in the module
/// constants above and in `intersect`.
#[derive(Debug, Clone, Copy)]
pub struct RenderSettings {
    pub max_bounces: u32,
    pub gamma: f32,
    pub shadow_distance: f32,
    pub grid_min_boxes: usize,
    pub tile_height: u32,
    pub enable_idle_rendering: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            max_bounces: MAX_BOUNCES,
            gamma: GAMMA,
            shadow_distance: crate::compile::DEFAULT_SHADOW_DISTANCE,
            grid_min_boxes: crate::compile::DEFAULT_GRID_MIN_BOXES,
            tile_height: crate::tile::DEFAULT_TILE_HEIGHT,
            enable_idle_rendering: true,
        }
    }
}

/// sRGB → linear for the background color (surface colors arrive linear).
#[inline]
pub fn linearize(c: Color, gamma: f32) -> Color {
    c.powf(gamma)
}

/// Linear → sRGB for the final framebuffer write.
#[inline]
pub fn gamma_encode(c: Color, gamma: f32) -> Color {
    c.saturate().powf(1.0 / gamma)
}

// ─── Framebuffer ────────────────────────────────────────────────────────────

/// An 8-bit RGBA framebuffer, row-major with row 0 at the top. Alpha is
/// always 255.
pub struct Framebuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32) -> Result<Self, RendererError> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4))
            .ok_or(RendererError::AllocationFailed { width, height })?;
        Ok(Self {
            width,
            height,
            pixels: vec![0u8; len],
        })
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    /// A contiguous slice of `h` full rows starting at row `y` — how the
    /// tile cache carves the one-pass render into tile buffers.
    pub fn rows(&self, y: u32, h: u32) -> &[u8] {
        let start = (y * self.width * 4) as usize;
        let end = ((y + h) * self.width * 4) as usize;
        &self.pixels[start..end]
    }

    /// Export as a PPM (Portable Pixmap) image file. P6 binary format:
    /// RGB triplets, one byte per channel, no compression; the alpha
    /// channel is dropped.
    pub fn write_ppm(&self, path: &str) -> io::Result<()> {
        let mut file = io::BufWriter::new(std::fs::File::create(path)?);
        write!(file, "P6\n{} {}\n255\n", self.width, self.height)?;
        for rgba in self.pixels.chunks_exact(4) {
            file.write_all(&rgba[..3])?;
        }
        file.flush()?;
        Ok(())
    }
}

// ─── Render Statistics ──────────────────────────────────────────────────────

/// Aggregate statistics collected during a rendering pass.
#[derive(Debug, Clone, Copy)]
pub struct RenderStats {
    pub primary_rays: u64,
    pub elapsed_secs: f64,
    pub width: u32,
    pub height: u32,
}

impl RenderStats {
    pub fn mrays_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.primary_rays as f64 / self.elapsed_secs / 1e6
    }
}

// ─── Cancellation ───────────────────────────────────────────────────────────

/// A ticket tying one render to the orchestrator's monotonically
/// increasing render version. The shared counter advances when a newer
/// render supersedes this one; in-flight rows notice and stop, and the
/// result is dropped instead of published.
#[derive(Debug, Clone)]
pub struct RenderTicket {
    version: u64,
    latest: Arc<AtomicU64>,
}

impl RenderTicket {
    pub fn new(version: u64, latest: Arc<AtomicU64>) -> Self {
        Self { version, latest }
    }

    #[inline]
    pub fn cancelled(&self) -> bool {
        self.latest.load(Ordering::Relaxed) != self.version
    }
}

// ─── CPU Renderer ───────────────────────────────────────────────────────────

/// The CPU ray-trace backend. Pixel rows are independent, so the image is
/// rendered with a rayon parallel iterator over rows.
pub struct CpuRenderer {
    pub settings: RenderSettings,
}

impl CpuRenderer {
    /// The CPU backend has no external capability requirements; `create`
    /// exists so callers handle construction uniformly with backends that
    /// do (GPU contexts), and so settings are validated in one place.
    pub fn create(settings: RenderSettings) -> Result<Self, RendererError> {
        if !settings.gamma.is_finite() || settings.gamma <= 0.0 {
            return Err(RendererError::CapabilityMissing(format!(
                "invalid gamma {}",
                settings.gamma
            )));
        }
        Ok(Self { settings })
    }

    /// Compiles and renders a scene in one call.
    pub fn render_scene(
        &self,
        scene: &Scene,
        camera: &OrthographicCamera,
        width: u32,
        height: u32,
    ) -> Result<(Framebuffer, RenderStats), RendererError> {
        let options = CompileOptions {
            shadow_distance: self.settings.shadow_distance,
            grid_min_boxes: self.settings.grid_min_boxes,
            ..CompileOptions::default()
        };
        let compiled = compile_with(scene, Some(camera), &options);
        self.render(&compiled, camera, width, height)
    }

    /// Renders a compiled scene into a fresh framebuffer.
    pub fn render(
        &self,
        scene: &RenderScene,
        camera: &OrthographicCamera,
        width: u32,
        height: u32,
    ) -> Result<(Framebuffer, RenderStats), RendererError> {
        match self.render_inner(scene, camera, width, height, None) {
            Some(result) => Ok(result?),
            // Unreachable without a ticket; keep the contract total.
            None => Err(RendererError::CapabilityMissing(
                "render dropped without a cancellation ticket".into(),
            )),
        }
    }

    /// Like `render`, but checks the ticket between rows and before
    /// returning. A superseded render yields `None` and publishes nothing.
    pub fn render_cancellable(
        &self,
        scene: &RenderScene,
        camera: &OrthographicCamera,
        width: u32,
        height: u32,
        ticket: &RenderTicket,
    ) -> Result<Option<(Framebuffer, RenderStats)>, RendererError> {
        self.render_inner(scene, camera, width, height, Some(ticket))
            .transpose()
    }

    fn render_inner(
        &self,
        scene: &RenderScene,
        camera: &OrthographicCamera,
        width: u32,
        height: u32,
        ticket: Option<&RenderTicket>,
    ) -> Option<Result<(Framebuffer, RenderStats), RendererError>> {
        let t0 = std::time::Instant::now();
        let mut fb = match Framebuffer::new(width, height) {
            Ok(fb) => fb,
            Err(e) => return Some(Err(e)),
        };

        let settings = self.settings;
        let row_bytes = width as usize * 4;
        if row_bytes > 0 {
            fb.pixels
                .par_chunks_exact_mut(row_bytes)
                .enumerate()
                .for_each(|(row, buf)| {
                    if ticket.is_some_and(|t| t.cancelled()) {
                        return;
                    }
                    // Row 0 is the top of the image; film v runs bottom-up.
                    let v = 1.0 - (row as f32 + 0.5) / height as f32;
                    for x in 0..width as usize {
                        let u = (x as f32 + 0.5) / width as f32;
                        let ray = camera.ray(u, v);
                        let linear = trace(scene, ray, &settings);
                        let (r, g, b) = gamma_encode(linear, settings.gamma).to_rgb8();
                        let i = x * 4;
                        buf[i] = r;
                        buf[i + 1] = g;
                        buf[i + 2] = b;
                        buf[i + 3] = 255;
                    }
                });
        }

        if ticket.is_some_and(|t| t.cancelled()) {
            return None;
        }

        let stats = RenderStats {
            primary_rays: width as u64 * height as u64,
            elapsed_secs: t0.elapsed().as_secs_f64(),
            width,
            height,
        };
        debug!(
            "rendered {}×{} in {:.3}s ({:.2} Mrays/s)",
            width,
            height,
            stats.elapsed_secs,
            stats.mrays_per_sec()
        );
        Some(Ok((fb, stats)))
    }
}

// ─── Shading & Transport ────────────────────────────────────────────────────

/// Traces one primary ray through up to `max_bounces` transparency and
/// refraction events, accumulating linear radiance.
pub fn trace(scene: &RenderScene, mut ray: Ray, settings: &RenderSettings) -> Color {
    let mut accum = Color::zero();
    let mut transmittance = 1.0f32;
    let mut current_ior = 1.0f32;

    for _ in 0..settings.max_bounces {
        let Some(hit) = scene.hit(&ray, f32::INFINITY) else {
            accum += linearize(scene.background, settings.gamma) * transmittance;
            break;
        };

        let point = ray.at(hit.t);
        let surface = shade(scene, point, hit.normal, hit.color);

        if hit.alpha >= 1.0 {
            accum += surface * transmittance;
            break;
        }
        accum += surface * (transmittance * hit.alpha);
        transmittance *= 1.0 - hit.alpha;
        if transmittance < TRANSMITTANCE_CUTOFF {
            break;
        }

        // Entering vs exiting decides the refraction normal and the ratio
        // of indices; exits return the medium to air.
        let cos_i = -ray.direction.dot(hit.normal);
        let (refract_normal, eta, next_ior) = if cos_i > 0.0 {
            (hit.normal, current_ior / hit.ior, hit.ior)
        } else {
            (-hit.normal, current_ior, 1.0)
        };
        let direction = match ray.direction.refract(refract_normal, eta) {
            Some(refracted) => {
                current_ior = next_ior;
                refracted.normalized()
            }
            // Total internal reflection keeps the ray in its medium.
            None => ray.direction.reflect(refract_normal).normalized(),
        };
        ray = Ray::new(point + direction * SELF_SHADOW_OFFSET, direction);
    }
    accum
}

/// Surface shading at a hit point, in linear RGB: the ambient term plus
/// each directional light's Lambertian contribution scaled by the shadow
/// visibility.
fn shade(scene: &RenderScene, point: Point3, normal: Vec3, surface: Color) -> Color {
    let mut color = surface.hadamard(scene.ambient.color) * scene.ambient.intensity;
    for light in &scene.directionals {
        let to_light = -light.direction;
        let n_dot_l = normal.dot(to_light).max(0.0);
        if n_dot_l <= 0.0 {
            continue;
        }
        let visibility = shadow_visibility(scene, point, normal, to_light);
        if visibility > 0.0 {
            color += surface.hadamard(light.color) * (light.intensity * n_dot_l * visibility);
        }
    }
    color
}

/// Shadow visibility in [0,1] from `point` toward the light. A zero blur
/// is a single binary ray; otherwise a 3×3 PCF over a lattice on the
/// plane perpendicular to the light direction.
fn shadow_visibility(scene: &RenderScene, point: Point3, normal: Vec3, to_light: Vec3) -> f32 {
    let origin = point + normal * SELF_SHADOW_OFFSET;
    if scene.shadow_blur <= 0.0 {
        return if scene.occluded(&Ray::new(origin, to_light)) {
            0.0
        } else {
            1.0
        };
    }

    let (tangent, bitangent) = to_light.orthonormal_basis();
    let mut hits = 0u32;
    let mut taps = 0u32;
    for i in -PCF_RADIUS..=PCF_RADIUS {
        for j in -PCF_RADIUS..=PCF_RADIUS {
            let offset = tangent * (i as f32 * scene.shadow_blur)
                + bitangent * (j as f32 * scene.shadow_blur);
            taps += 1;
            if scene.occluded(&Ray::new(origin + offset, to_light)) {
                hits += 1;
            }
        }
    }
    1.0 - hits as f32 / taps as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::scene::*;

    fn unit_box(center: Point3, color: Color) -> Primitive {
        Primitive::new(Geometry::Box(BoxGeometry::new(center, Vec3::ones())), color)
    }

    fn camera(width: f32, height: f32) -> OrthographicCamera {
        OrthographicCamera::new(
            Point3::new(0.0, 0.0, -5.0),
            Point3::zero(),
            Vec3::unit_y(),
            width,
            height,
        )
    }

    fn render(scene: &Scene, cam: &OrthographicCamera, w: u32, h: u32) -> Framebuffer {
        let rs = compile(scene, Some(cam));
        let renderer = CpuRenderer::create(RenderSettings::default()).unwrap();
        renderer.render(&rs, cam, w, h).unwrap().0
    }

    #[test]
    fn single_red_box_center_pixel() {
        let mut scene = Scene::new(
            vec![unit_box(Point3::zero(), Color::new(1.0, 0.0, 0.0))],
            vec![Light::Ambient(AmbientLight::new(Color::ones(), 1.0))],
        );
        scene.background_color = Some(Color::new(0.04, 0.04, 0.10));
        let cam = camera(2.0, 2.0);
        let fb = render(&scene, &cam, 5, 5);

        assert_eq!(fb.get(2, 2), [255, 0, 0, 255]);

        // A corner pixel misses the box and shows the background.
        let corner = fb.get(0, 0);
        assert!(corner[0] < 30 && corner[2] > corner[0]);
    }

    #[test]
    fn hard_shadow_is_ambient_only() {
        // White ground plane facing the camera, a box floating in front,
        // light travelling obliquely so the shadow clears the box.
        let plane = Primitive::new(
            Geometry::Plane(PlaneGeometry::new(
                Point3::zero(),
                Vec3::new(0.0, 0.0, -1.0),
            )),
            Color::ones(),
        );
        let occluder = unit_box(Point3::new(0.0, 0.0, -2.0), Color::ones());
        let light = DirectionalLight::new(Vec3::new(0.4, 0.0, 1.0), Color::ones(), 0.7);
        let scene = Scene::new(
            vec![plane, occluder],
            vec![
                Light::Ambient(AmbientLight::new(Color::ones(), 0.3)),
                Light::Directional(light),
            ],
        );
        let cam = camera(6.0, 6.0);
        let fb = render(&scene, &cam, 60, 60);

        // World x maps to pixel: x = (u - 0.5) * 6 → u = x/6 + 0.5.
        let px = |x: f32| ((x / 6.0 + 0.5) * 60.0) as u32;
        let shadowed = fb.get(px(0.8), 30);
        let lit = fb.get(px(-1.5), 30);

        let expected_ambient = (gamma_encode(Color::splat(0.3), GAMMA).x * 255.999) as i32;
        assert!((shadowed[0] as i32 - expected_ambient).abs() <= 1);
        assert!(lit[0] > shadowed[0] + 40);
    }

    #[test]
    fn pcf_blur_softens_the_boundary() {
        let plane = Primitive::new(
            Geometry::Plane(PlaneGeometry::new(
                Point3::zero(),
                Vec3::new(0.0, 0.0, -1.0),
            )),
            Color::ones(),
        );
        let occluder = unit_box(Point3::new(0.0, 0.0, -2.0), Color::ones());
        let light = DirectionalLight::new(Vec3::new(0.4, 0.0, 1.0), Color::ones(), 0.7);
        let mut scene = Scene::new(
            vec![plane, occluder],
            vec![
                Light::Ambient(AmbientLight::new(Color::ones(), 0.3)),
                Light::Directional(light),
            ],
        );
        scene.shadow_blur = Some(0.2);
        let cam = camera(6.0, 6.0);
        let fb = render(&scene, &cam, 60, 60);

        let px = |x: f32| ((x / 6.0 + 0.5) * 60.0) as u32;
        let deep = fb.get(px(0.8), 30)[0];
        let lit = fb.get(px(-1.5), 30)[0];
        // The far edge of the cast shadow for this layout sits near
        // x = 1.5; with blur on, a pixel just inside straddles the
        // boundary and must land strictly between full shadow and light.
        let edge = fb.get(px(1.3), 30)[0];
        assert!(edge > deep, "edge {edge} should be brighter than deep {deep}");
        assert!(edge < lit, "edge {edge} should be darker than lit {lit}");
    }

    #[test]
    fn refraction_displaces_what_the_ray_sees() {
        // Half red / half green backdrop behind a glass sphere.
        let red = Primitive::new(
            Geometry::Box(BoxGeometry::new(
                Point3::new(-2.5, 0.0, 3.0),
                Vec3::new(5.0, 10.0, 0.2),
            )),
            Color::new(1.0, 0.0, 0.0),
        );
        let green = Primitive::new(
            Geometry::Box(BoxGeometry::new(
                Point3::new(2.5, 0.0, 3.0),
                Vec3::new(5.0, 10.0, 0.2),
            )),
            Color::new(0.0, 1.0, 0.0),
        );
        let glass = Primitive::new(
            Geometry::Sphere(SphereGeometry {
                center: Point3::zero(),
                radius: 1.0,
            }),
            Color::ones(),
        )
        .with_alpha(0.1)
        .with_ior(1.5);

        let lights = vec![Light::Ambient(AmbientLight::new(Color::ones(), 1.0))];
        let with_glass = Scene::new(vec![red, green, glass], lights.clone());
        let without_glass = Scene::new(vec![red, green], lights);

        let cam = camera(4.0, 4.0);
        let a = render(&with_glass, &cam, 41, 41);
        let b = render(&without_glass, &cam, 41, 41);

        // A ray through the sphere off-axis bends; the same pixel sees a
        // different part of the backdrop than it would unobstructed.
        let x = ((0.45 / 4.0 + 0.5) * 41.0) as u32;
        let through = a.get(x, 20);
        let direct = b.get(x, 20);
        let delta = (through[0] as i32 - direct[0] as i32).abs()
            + (through[1] as i32 - direct[1] as i32).abs();
        assert!(delta > 30, "refraction changed nothing: {through:?} vs {direct:?}");
    }

    #[test]
    fn transmittance_bounds_energy() {
        // Stacked translucent sheets: accumulated radiance stays below the
        // brightest surface and above zero.
        let sheets: Vec<Primitive> = (0..3)
            .map(|i| {
                unit_box(Point3::new(0.0, 0.0, i as f32 * 2.0), Color::ones()).with_alpha(0.4)
            })
            .collect();
        let scene = Scene::new(
            sheets,
            vec![Light::Ambient(AmbientLight::new(Color::ones(), 1.0))],
        );
        let rs = compile(&scene, None);
        let settings = RenderSettings::default();
        let c = trace(
            &rs,
            Ray::new(Point3::new(0.0, 0.0, -5.0), Vec3::unit_z()),
            &settings,
        );
        assert!(c.x >= 0.0 && c.x <= 1.0 + 1e-4);
        assert!(c.y >= 0.0 && c.z >= 0.0);
    }

    #[test]
    fn zero_sized_image_renders_empty() {
        let scene = Scene::default();
        let rs = compile(&scene, None);
        let renderer = CpuRenderer::create(RenderSettings::default()).unwrap();
        let (fb, _) = renderer.render(&rs, &camera(2.0, 2.0), 0, 0).unwrap();
        assert!(fb.pixels.is_empty());
    }

    #[test]
    fn cancelled_ticket_drops_the_result() {
        let scene = Scene::default();
        let rs = compile(&scene, None);
        let renderer = CpuRenderer::create(RenderSettings::default()).unwrap();
        let latest = Arc::new(AtomicU64::new(2));
        // Ticket for version 1 while the latest is already 2.
        let ticket = RenderTicket::new(1, latest);
        let out = renderer
            .render_cancellable(&rs, &camera(2.0, 2.0), 8, 8, &ticket)
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn invalid_gamma_fails_construction() {
        let settings = RenderSettings {
            gamma: 0.0,
            ..RenderSettings::default()
        };
        assert!(CpuRenderer::create(settings).is_err());
    }
}
