use crate::renderer::Framebuffer;

/// Default tile row height in pixels.
pub const DEFAULT_TILE_HEIGHT: u32 = 200;

/// Lifecycle of one tile. New and invalidated tiles are dirty; a tile is
/// clean once pixels for the current scene have been stored for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    Dirty,
    Rendering,
    Clean,
}

/// A full-width horizontal slice of the content canvas.
#[derive(Debug, Clone, Copy)]
pub struct Tile {
    pub id: usize,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub state: TileState,
}

/// The tile partition of the content canvas: a single column of
/// full-width rows of `tile_height`, the last row shortened to fit.
#[derive(Debug, Clone)]
pub struct TileGrid {
    pub content_w: u32,
    pub content_h: u32,
    pub tile_height: u32,
    tiles: Vec<Tile>,
}

impl TileGrid {
    pub fn new(content_w: u32, content_h: u32, tile_height: u32) -> Self {
        let tile_height = tile_height.max(1);
        let rows = content_h.div_ceil(tile_height);
        let tiles = (0..rows)
            .map(|row| {
                let y = row * tile_height;
                Tile {
                    id: row as usize,
                    x: 0,
                    y,
                    w: content_w,
                    h: (content_h - y).min(tile_height),
                    state: TileState::Dirty,
                }
            })
            .collect();
        Self {
            content_w,
            content_h,
            tile_height,
            tiles,
        }
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn get(&self, id: usize) -> Option<&Tile> {
        self.tiles.get(id)
    }

    pub fn set_state(&mut self, id: usize, state: TileState) {
        if let Some(tile) = self.tiles.get_mut(id) {
            tile.state = state;
        }
    }

    pub fn mark_all_dirty(&mut self) {
        for tile in &mut self.tiles {
            tile.state = TileState::Dirty;
        }
    }

    /// Ids of the tiles intersecting the viewport strip
    /// `[scroll_y, scroll_y + viewport_h)`.
    pub fn visible_ids(&self, scroll_y: f32, viewport_h: u32) -> Vec<usize> {
        let top = scroll_y;
        let bottom = scroll_y + viewport_h as f32;
        self.tiles
            .iter()
            .filter(|t| (t.y + t.h) as f32 > top && (t.y as f32) < bottom)
            .map(|t| t.id)
            .collect()
    }
}

/// The tile cache: the grid plus exclusive ownership of each tile's
/// rendered RGBA pixels. Buffers survive invalidation (a stale tile is
/// still the best available image until its replacement is published) but
/// are dropped on rebuild, when their dimensions no longer match.
#[derive(Debug, Clone)]
pub struct TileCache {
    grid: TileGrid,
    buffers: Vec<Option<Vec<u8>>>,
}

impl TileCache {
    pub fn new(content_w: u32, content_h: u32, tile_height: u32) -> Self {
        let grid = TileGrid::new(content_w, content_h, tile_height);
        let buffers = vec![None; grid.len()];
        Self { grid, buffers }
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// Content size changed: regenerate the grid and drop every buffer.
    pub fn rebuild(&mut self, content_w: u32, content_h: u32) {
        self.grid = TileGrid::new(content_w, content_h, self.grid.tile_height);
        self.buffers = vec![None; self.grid.len()];
    }

    /// Scene changed: every tile needs re-rendering, but existing pixels
    /// remain available to composite until they are replaced.
    pub fn invalidate_all(&mut self) {
        self.grid.mark_all_dirty();
    }

    pub fn begin_render(&mut self, id: usize) {
        self.grid.set_state(id, TileState::Rendering);
    }

    /// Returns a tile to the dirty pool, e.g. when its render was
    /// superseded before publishing.
    pub fn mark_dirty(&mut self, id: usize) {
        self.grid.set_state(id, TileState::Dirty);
    }

    /// Publishes pixels for one tile and marks it clean. The buffer length
    /// must match the tile dimensions.
    pub fn store(&mut self, id: usize, pixels: Vec<u8>) {
        if let Some(tile) = self.grid.get(id) {
            debug_assert_eq!(pixels.len(), (tile.w * tile.h * 4) as usize);
            self.buffers[id] = Some(pixels);
            self.grid.set_state(id, TileState::Clean);
        }
    }

    /// Carves a full-content framebuffer into the per-tile buffers and
    /// marks everything clean — the publish step of the one-pass render.
    pub fn store_full(&mut self, fb: &Framebuffer) {
        if fb.width != self.grid.content_w || fb.height != self.grid.content_h {
            return;
        }
        for id in 0..self.grid.len() {
            let (y, h) = {
                let tile = &self.grid.tiles()[id];
                (tile.y, tile.h)
            };
            self.buffers[id] = Some(fb.rows(y, h).to_vec());
            self.grid.set_state(id, TileState::Clean);
        }
    }

    pub fn pixels(&self, id: usize) -> Option<&[u8]> {
        self.buffers.get(id).and_then(|b| b.as_deref())
    }

    pub fn dirty_ids(&self) -> Vec<usize> {
        self.grid
            .tiles()
            .iter()
            .filter(|t| t.state == TileState::Dirty)
            .map(|t| t.id)
            .collect()
    }

    /// Drops every buffer without touching the grid shape.
    pub fn clear(&mut self) {
        for buffer in &mut self.buffers {
            *buffer = None;
        }
        self.grid.mark_all_dirty();
    }
}
