use crate::math::*;

/// An orthographic camera. Every primary ray travels along `forward`; the
/// pixel position only moves the ray origin across the film plane, which
/// is `width × height` world units centered on `position`.
///
/// The orthonormal basis is derived look-at style:
///   forward = normalize(look_at - position)
///   right   = normalize(up × forward)
///   up'     = forward × right
#[derive(Debug, Clone, Copy)]
pub struct OrthographicCamera {
    pub position: Point3,
    pub look_at: Point3,
    pub up: Vec3,
    pub width: f32,
    pub height: f32,
    forward: Vec3,
    right: Vec3,
    up_basis: Vec3,
}

impl OrthographicCamera {
    /// Default near/far planes of the orthographic view volume.
    pub const NEAR: f32 = 0.0;
    pub const FAR: f32 = 1e4;

    pub fn new(position: Point3, look_at: Point3, up: Vec3, width: f32, height: f32) -> Self {
        let mut camera = Self {
            position,
            look_at,
            up,
            width: width.max(0.0),
            height: height.max(0.0),
            forward: Vec3::unit_z(),
            right: Vec3::unit_x(),
            up_basis: Vec3::unit_y(),
        };
        camera.derive_basis();
        camera
    }

    /// Rebuilds the basis from the look-at parameters. A degenerate setup
    /// (camera on top of its target, up parallel to forward, non-finite
    /// input) falls back to the identity basis instead of failing.
    fn derive_basis(&mut self) {
        let gaze = self.look_at - self.position;
        if gaze.near_zero() || !gaze.is_finite() || !self.up.is_finite() {
            self.set_identity_basis();
            return;
        }
        let forward = gaze.normalized();
        let right = self.up.cross(forward);
        if right.near_zero() {
            self.set_identity_basis();
            return;
        }
        self.forward = forward;
        self.right = right.normalized();
        self.up_basis = forward.cross(self.right);
    }

    fn set_identity_basis(&mut self) {
        self.forward = Vec3::unit_z();
        self.right = Vec3::unit_x();
        self.up_basis = Vec3::unit_y();
    }

    #[inline(always)]
    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    #[inline(always)]
    pub fn right(&self) -> Vec3 {
        self.right
    }

    #[inline(always)]
    pub fn up_basis(&self) -> Vec3 {
        self.up_basis
    }

    /// Generates the primary ray for film coordinates (u, v) in [0,1]².
    /// v = 0 is the bottom edge of the film; the renderer flips image rows
    /// so that row 0 samples v near 1.
    #[inline]
    pub fn ray(&self, u: f32, v: f32) -> Ray {
        let origin = self.position
            + self.right * ((u - 0.5) * self.width)
            + self.up_basis * ((v - 0.5) * self.height);
        Ray::new(origin, self.forward)
    }

    /// The view volume as a world-space AABB: the eight corners of the
    /// orthographic box from `near` to `far` along the gaze.
    pub fn frustum(&self, near: f32, far: f32) -> Aabb {
        let hw = self.right * (self.width * 0.5);
        let hh = self.up_basis * (self.height * 0.5);
        let corners = (0..8).map(|i| {
            let w = if i & 1 == 0 { -1.0 } else { 1.0 };
            let h = if i & 2 == 0 { -1.0 } else { 1.0 };
            let d = if i & 4 == 0 { near } else { far };
            self.position + hw * w + hh * h + self.forward * d
        });
        Aabb::from_points(corners)
    }

    /// The same camera with a different film size (used to re-frame the
    /// full content canvas or a single tile row).
    pub fn with_film(&self, width: f32, height: f32) -> Self {
        Self::new(self.position, self.look_at, self.up, width, height)
    }

    /// The camera slid across its own film plane by (dx, dy) world units
    /// along the right and up' axes. The gaze direction is unchanged.
    pub fn panned(&self, dx: f32, dy: f32) -> Self {
        let offset = self.right * dx + self.up_basis * dy;
        Self::new(
            self.position + offset,
            self.look_at + offset,
            self.up,
            self.width,
            self.height,
        )
    }
}

impl Default for OrthographicCamera {
    /// The page camera: behind the viewport plane looking toward +z.
    fn default() -> Self {
        Self::new(
            Point3::new(0.0, 0.0, -10.0),
            Point3::zero(),
            Vec3::unit_y(),
            800.0,
            600.0,
        )
    }
}
