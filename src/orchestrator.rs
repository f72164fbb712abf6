use crate::camera::OrthographicCamera;
use crate::compile::{compile_with, CompileOptions, RenderScene};
use crate::renderer::{CpuRenderer, RenderStats, RenderTicket, RendererError};
use crate::scene::Scene;
use crate::tile::TileCache;
use log::{debug, trace};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ─── Compositor capability ──────────────────────────────────────────────────

/// The display-surface capability the orchestrator drives. Implementations
/// blit tile pixel buffers at viewport-relative positions; the orchestrator
/// is monomorphised over the concrete type, so composition stays free of
/// dynamic dispatch.
pub trait Compositor {
    fn set_size(&mut self, width: u32, height: u32);
    fn clear(&mut self);
    /// Blits a `w × h` RGBA buffer with its top-left corner at `(x, y)` in
    /// surface coordinates. Off-surface regions are clipped.
    fn composite_tile(&mut self, pixels: &[u8], w: u32, h: u32, x: i32, y: i32);
}

/// An owned RGBA surface sized to the viewport — the in-memory display
/// target the CLI previews and tests read back.
#[derive(Debug, Clone, Default)]
pub struct DisplaySurface {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DisplaySurface {
    pub fn new() -> Self {
        Self::default()
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
}

impl Compositor for DisplaySurface {
    fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels = vec![0u8; (width as usize) * (height as usize) * 4];
    }

    fn clear(&mut self) {
        self.pixels.fill(0);
    }

    fn composite_tile(&mut self, pixels: &[u8], w: u32, h: u32, x: i32, y: i32) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let dst_x0 = x.max(0);
        let dst_y0 = y.max(0);
        let dst_x1 = (x + w as i32).min(self.width as i32);
        let dst_y1 = (y + h as i32).min(self.height as i32);
        if dst_x0 >= dst_x1 || dst_y0 >= dst_y1 {
            return;
        }
        let copy_w = (dst_x1 - dst_x0) as usize * 4;
        for dy in dst_y0..dst_y1 {
            let src_row = (dy - y) as usize;
            let src_col = (dst_x0 - x) as usize;
            let src = (src_row * w as usize + src_col) * 4;
            let dst = ((dy as usize) * self.width as usize + dst_x0 as usize) * 4;
            self.pixels[dst..dst + copy_w].copy_from_slice(&pixels[src..src + copy_w]);
        }
    }
}

// ─── Render strategy ────────────────────────────────────────────────────────

/// How a scene change turns into pixels. One fullscreen pass over the
/// content canvas is strictly faster and is the default; per-tile
/// rendering with re-framed sub-cameras exists as the fallback for
/// incremental (idle-budget) rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStrategy {
    FullPass,
    PerTile,
}

// ─── Orchestrator ───────────────────────────────────────────────────────────

/// Owns the renderer, the tile cache, and the display surface, and turns
/// scene/viewport updates into renders and composites. All methods run on
/// one control thread; the only parallelism is inside a render call.
pub struct RenderOrchestrator<C: Compositor> {
    renderer: CpuRenderer,
    pub compositor: C,
    cache: TileCache,
    strategy: RenderStrategy,
    scene: Scene,
    camera: OrthographicCamera,
    content_w: u32,
    content_h: u32,
    viewport_w: u32,
    viewport_h: u32,
    scroll_y: f32,
    /// The latest issued version; in-flight work holding an older ticket
    /// is superseded and must not publish.
    latest_version: Arc<AtomicU64>,
    version: u64,
    /// Statistics of the last completed render pass (per-tile passes
    /// accumulate across their tiles).
    last_stats: Option<RenderStats>,
    disposed: bool,
}

impl<C: Compositor> RenderOrchestrator<C> {
    pub fn new(renderer: CpuRenderer, compositor: C) -> Self {
        let tile_height = renderer.settings.tile_height;
        Self {
            renderer,
            compositor,
            cache: TileCache::new(0, 0, tile_height),
            strategy: RenderStrategy::FullPass,
            scene: Scene::default(),
            camera: OrthographicCamera::default(),
            content_w: 0,
            content_h: 0,
            viewport_w: 0,
            viewport_h: 0,
            scroll_y: 0.0,
            latest_version: Arc::new(AtomicU64::new(0)),
            version: 0,
            last_stats: None,
            disposed: false,
        }
    }

    pub fn with_strategy(mut self, strategy: RenderStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn render_version(&self) -> u64 {
        self.version
    }

    /// Statistics of the last completed (non-cancelled) render, if any.
    pub fn last_stats(&self) -> Option<RenderStats> {
        self.last_stats
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    fn bump_version(&mut self) -> RenderTicket {
        self.version = self.latest_version.fetch_add(1, Ordering::Relaxed) + 1;
        RenderTicket::new(self.version, Arc::clone(&self.latest_version))
    }

    /// A scene change: everything re-renders. Content-size changes also
    /// rebuild the tile grid; plain scene changes only invalidate it.
    #[allow(clippy::too_many_arguments)]
    pub fn update_scene(
        &mut self,
        scene: Scene,
        camera: OrthographicCamera,
        content_w: u32,
        content_h: u32,
        viewport_w: u32,
        viewport_h: u32,
        scroll_y: f32,
    ) -> Result<(), RendererError> {
        if self.disposed {
            return Ok(());
        }
        let ticket = self.bump_version();
        debug!(
            "update_scene v{}: content {}×{}, viewport {}×{} @ scroll {}",
            self.version, content_w, content_h, viewport_w, viewport_h, scroll_y
        );

        if content_w != self.content_w || content_h != self.content_h {
            self.cache.rebuild(content_w, content_h);
            self.content_w = content_w;
            self.content_h = content_h;
        } else {
            self.cache.invalidate_all();
        }
        self.scene = scene;
        self.camera = camera;
        self.viewport_w = viewport_w;
        self.viewport_h = viewport_h;
        self.scroll_y = scroll_y;

        self.render_dirty(&ticket)?;
        self.composite();
        Ok(())
    }

    /// A scroll or viewport-height change: no re-render, only a composite
    /// of the cached tiles at the new offset.
    pub fn update_viewport(&mut self, scroll_y: f32, viewport_h: u32) {
        if self.disposed {
            return;
        }
        trace!("update_viewport: scroll {} height {}", scroll_y, viewport_h);
        self.scroll_y = scroll_y;
        self.viewport_h = viewport_h;
        self.composite();
    }

    /// Invalidates and re-renders everything with the current scene.
    pub fn force_render_all(&mut self) -> Result<(), RendererError> {
        if self.disposed {
            return Ok(());
        }
        let ticket = self.bump_version();
        self.cache.invalidate_all();
        self.render_dirty(&ticket)?;
        self.composite();
        Ok(())
    }

    /// Renders one deferred dirty tile, if any. The host calls this from
    /// its idle budget when the per-tile strategy defers offscreen tiles.
    /// Returns whether dirty tiles remain.
    pub fn render_idle_tile(&mut self) -> Result<bool, RendererError> {
        if self.disposed || !self.renderer.settings.enable_idle_rendering {
            return Ok(false);
        }
        let Some(&id) = self.cache.dirty_ids().first() else {
            return Ok(false);
        };
        let ticket = RenderTicket::new(self.version, Arc::clone(&self.latest_version));
        let compiled = self.compile_current();
        self.render_one_tile(&compiled, id, &ticket)?;
        self.composite();
        Ok(!self.cache.dirty_ids().is_empty())
    }

    /// Cancels pending work, drops cached pixels, and blanks the surface.
    pub fn dispose(&mut self) {
        self.bump_version();
        self.cache.clear();
        self.compositor.set_size(0, 0);
        self.disposed = true;
    }

    // ── internals ──

    fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            shadow_distance: self.renderer.settings.shadow_distance,
            grid_min_boxes: self.renderer.settings.grid_min_boxes,
            ..CompileOptions::default()
        }
    }

    /// The camera re-framed from the caller's viewport to the full content
    /// canvas: same basis, film grown to the content size, and the center
    /// slid down so content row 0 stays at the canvas top.
    fn content_camera(&self) -> OrthographicCamera {
        let dy = (self.viewport_h as f32 - self.content_h as f32) * 0.5;
        self.camera
            .with_film(self.content_w as f32, self.content_h as f32)
            .panned(0.0, dy)
    }

    /// A sub-camera framing exactly one tile row of the content canvas.
    fn tile_camera(&self, tile_y: u32, tile_h: u32) -> OrthographicCamera {
        let dy = self.viewport_h as f32 * 0.5 - tile_y as f32 - tile_h as f32 * 0.5;
        self.camera
            .with_film(self.content_w as f32, tile_h as f32)
            .panned(0.0, dy)
    }

    fn compile_current(&self) -> RenderScene {
        let content_camera = self.content_camera();
        compile_with(&self.scene, Some(&content_camera), &self.compile_options())
    }

    fn render_dirty(&mut self, ticket: &RenderTicket) -> Result<(), RendererError> {
        if self.content_w == 0 || self.content_h == 0 {
            return Ok(());
        }
        let compiled = self.compile_current();

        match self.strategy {
            RenderStrategy::FullPass => {
                let camera = self.content_camera();
                let outcome = self.renderer.render_cancellable(
                    &compiled,
                    &camera,
                    self.content_w,
                    self.content_h,
                    ticket,
                )?;
                if let Some((fb, stats)) = outcome {
                    debug!(
                        "full pass v{} complete: {:.2} Mrays/s",
                        self.version,
                        stats.mrays_per_sec()
                    );
                    self.last_stats = Some(stats);
                    self.cache.store_full(&fb);
                }
            }
            RenderStrategy::PerTile => {
                // Visible tiles first; the rest render now unless idle
                // rendering defers them to the host's idle budget.
                self.last_stats = None;
                let visible = self
                    .cache
                    .grid()
                    .visible_ids(self.scroll_y, self.viewport_h);
                for id in visible {
                    self.render_one_tile(&compiled, id, ticket)?;
                }
                if !self.renderer.settings.enable_idle_rendering {
                    for id in self.cache.dirty_ids() {
                        self.render_one_tile(&compiled, id, ticket)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn render_one_tile(
        &mut self,
        compiled: &RenderScene,
        id: usize,
        ticket: &RenderTicket,
    ) -> Result<(), RendererError> {
        let Some(tile) = self.cache.grid().get(id).copied() else {
            return Ok(());
        };
        self.cache.begin_render(id);
        let camera = self.tile_camera(tile.y, tile.h);
        let outcome = self
            .renderer
            .render_cancellable(compiled, &camera, tile.w, tile.h, ticket)?;
        match outcome {
            Some((fb, stats)) => {
                self.record_stats(stats);
                self.cache.store(id, fb.pixels);
            }
            // Superseded mid-render: the tile stays pending.
            None => self.cache.mark_dirty(id),
        }
        Ok(())
    }

    /// Folds one tile's statistics into the pass total, reporting the
    /// content canvas as the covered area.
    fn record_stats(&mut self, stats: RenderStats) {
        self.last_stats = Some(match self.last_stats {
            Some(prev) => RenderStats {
                primary_rays: prev.primary_rays + stats.primary_rays,
                elapsed_secs: prev.elapsed_secs + stats.elapsed_secs,
                width: self.content_w,
                height: self.content_h,
            },
            None => RenderStats {
                width: self.content_w,
                height: self.content_h,
                ..stats
            },
        });
    }

    /// Sizes the surface to the viewport, clears it, and blits every tile
    /// with cached pixels that intersects the view strip, offset by the
    /// scroll position.
    fn composite(&mut self) {
        self.compositor.set_size(self.viewport_w, self.viewport_h);
        self.compositor.clear();
        let scroll = self.scroll_y.round() as i32;
        for tile in self.cache.grid().tiles() {
            let y = tile.y as i32 - scroll;
            if y + tile.h as i32 <= 0 || y >= self.viewport_h as i32 {
                continue;
            }
            if let Some(pixels) = self.cache.pixels(tile.id) {
                self.compositor
                    .composite_tile(pixels, tile.w, tile.h, tile.x as i32, y);
            }
        }
    }
}
