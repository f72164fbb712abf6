use crate::camera::OrthographicCamera;
use crate::math::*;
use crate::scene::*;

/// World-space thickness of an element box.
const ELEMENT_DEPTH: f32 = 1.0;
/// Depth units per stacking level; deeper elements sit further from the
/// camera along +z.
const DEPTH_STEP: f32 = 2.0;

/// One laid-out element as emitted by the DOM parser: a viewport-space
/// rectangle with a background color, a stacking depth, and an optional
/// corner radius. `opacity` is the parsed effective opacity (1 = opaque).
#[derive(Debug, Clone, Copy)]
pub struct ParsedElement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub background_color: Color,
    pub depth: u32,
    pub border_radius: Option<f32>,
    pub opacity: f32,
}

impl ParsedElement {
    pub fn new(x: f32, y: f32, width: f32, height: f32, color: Color, depth: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            background_color: color,
            depth,
            border_radius: None,
            opacity: 1.0,
        }
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.border_radius = Some(radius.max(0.0));
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }
}

/// Maps a viewport-space point to world space:
///   wx = px − vw/2,  wy = −(py − vh/2)
/// Viewport y grows downward, world y grows upward.
#[inline]
pub fn to_world(px: f32, py: f32, viewport_w: f32, viewport_h: f32) -> (f32, f32) {
    (px - viewport_w * 0.5, -(py - viewport_h * 0.5))
}

/// World z of a stacking depth: `wz = (max_depth − depth) · 2`, so the
/// deepest elements land at z = 0 plus the background behind everything.
#[inline]
pub fn depth_to_z(depth: u32, max_depth: u32) -> f32 {
    (max_depth.saturating_sub(depth)) as f32 * DEPTH_STEP
}

/// Converts parsed elements into a scene: one box per element and a
/// background plane behind the deepest of them. Lights are the caller's
/// business (the compiler substitutes a white ambient if none are added).
pub fn scene_from_elements(
    elements: &[ParsedElement],
    viewport_w: f32,
    viewport_h: f32,
    background: Color,
) -> Scene {
    let max_depth = elements.iter().map(|e| e.depth).max().unwrap_or(0);

    let mut objects: Vec<Primitive> = elements
        .iter()
        .map(|e| element_to_box(e, viewport_w, viewport_h, max_depth))
        .collect();

    // The page backdrop: an infinite plane just behind the deepest layer,
    // facing the camera.
    let plane_z = (max_depth as f32 + 2.0) * DEPTH_STEP;
    objects.push(Primitive::new(
        Geometry::Plane(PlaneGeometry::new(
            Point3::new(0.0, 0.0, plane_z),
            Vec3::new(0.0, 0.0, -1.0),
        )),
        background,
    ));

    let mut scene = Scene::new(objects, Vec::new());
    scene.background_color = Some(background);
    scene
}

fn element_to_box(
    element: &ParsedElement,
    viewport_w: f32,
    viewport_h: f32,
    max_depth: u32,
) -> Primitive {
    let (wx, wy) = to_world(
        element.x + element.width * 0.5,
        element.y + element.height * 0.5,
        viewport_w,
        viewport_h,
    );
    let center = Point3::new(wx, wy, depth_to_z(element.depth, max_depth));

    let geometry = match element.border_radius {
        Some(radius) if radius > 0.0 => {
            // Rounding inflates the surface outward by r; shrink the core
            // box so the on-screen footprint stays the element rect.
            let r = radius.min(element.width.min(element.height) * 0.5);
            let size = Vec3::new(
                (element.width - 2.0 * r).max(0.01),
                (element.height - 2.0 * r).max(0.01),
                (ELEMENT_DEPTH - 2.0 * r).max(0.01),
            );
            BoxGeometry::rounded(center, size, r)
        }
        _ => BoxGeometry::new(
            center,
            Vec3::new(element.width, element.height, ELEMENT_DEPTH),
        ),
    };

    Primitive::new(Geometry::Box(geometry), element.background_color).with_alpha(element.opacity)
}

/// The page camera for a viewport: behind the page at z = −10, looking
/// toward +z, y up, film sized to the viewport.
pub fn camera_for_viewport(viewport_w: f32, viewport_h: f32) -> OrthographicCamera {
    OrthographicCamera::new(
        Point3::new(0.0, 0.0, -10.0),
        Point3::zero(),
        Vec3::unit_y(),
        viewport_w,
        viewport_h,
    )
}
