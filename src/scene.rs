use crate::math::*;

// ─── Geometry ───────────────────────────────────────────────────────────────

/// An infinite or finite rectangular plane. `extent` is the finite
/// (width, height) in the plane's local frame; `None` means unbounded.
#[derive(Debug, Clone, Copy)]
pub struct PlaneGeometry {
    pub point: Point3,
    pub normal: Vec3,
    pub extent: Option<(f32, f32)>,
}

impl PlaneGeometry {
    pub fn new(point: Point3, normal: Vec3) -> Self {
        Self {
            point,
            normal: normal.normalized(),
            extent: None,
        }
    }

    pub fn finite(point: Point3, normal: Vec3, width: f32, height: f32) -> Self {
        Self {
            point,
            normal: normal.normalized(),
            extent: Some((width.max(0.0), height.max(0.0))),
        }
    }
}

/// A box rotation holding the Euler angles it was built from together with
/// the rotation matrix and its transpose. The transpose is the inverse for
/// orthonormal matrices; storing both avoids recomputation when rays are
/// taken into box-local space and normals are brought back out.
#[derive(Debug, Clone, Copy)]
pub struct Rotation {
    pub euler: Vec3,
    pub mat: Mat3,
    pub inv: Mat3,
}

impl Rotation {
    /// Intrinsic Euler XYZ angles in radians.
    pub fn from_euler(euler: Vec3) -> Self {
        let mat = Mat3::from_euler_xyz(euler.x, euler.y, euler.z);
        Self {
            euler,
            mat,
            inv: mat.transpose(),
        }
    }
}

/// A box centered at `center` with full extents `size`, optionally rotated
/// and optionally rounded. A `radius` of 0 is a sharp oriented box; r > 0
/// inflates the surface outward by r with spherical corners.
#[derive(Debug, Clone, Copy)]
pub struct BoxGeometry {
    pub center: Point3,
    pub size: Vec3,
    pub rotation: Option<Rotation>,
    pub radius: f32,
}

impl BoxGeometry {
    pub fn new(center: Point3, size: Vec3) -> Self {
        Self {
            center,
            size: size.max(Vec3::zero()),
            rotation: None,
            radius: 0.0,
        }
    }

    pub fn rounded(center: Point3, size: Vec3, radius: f32) -> Self {
        Self {
            radius: radius.max(0.0),
            ..Self::new(center, size)
        }
    }

    pub fn rotated(center: Point3, size: Vec3, euler: Vec3) -> Self {
        Self {
            rotation: Some(Rotation::from_euler(euler)),
            ..Self::new(center, size)
        }
    }

    pub fn with_rotation(mut self, euler: Vec3) -> Self {
        self.rotation = Some(Rotation::from_euler(euler));
        self
    }

    #[inline]
    pub fn half_size(&self) -> Vec3 {
        self.size * 0.5
    }

    /// Half-extent of the surface including the corner rounding.
    #[inline]
    pub fn outer_half_size(&self) -> Vec3 {
        self.half_size() + Vec3::splat(self.radius)
    }
}

/// A capsule: the set of points within `radius` of the segment AB.
#[derive(Debug, Clone, Copy)]
pub struct CapsuleGeometry {
    pub a: Point3,
    pub b: Point3,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct SphereGeometry {
    pub center: Point3,
    pub radius: f32,
}

/// The geometry of a renderable primitive. Page compositions are mostly
/// boxes; planes carry backgrounds, capsules and spheres decorations.
#[derive(Debug, Clone, Copy)]
pub enum Geometry {
    Plane(PlaneGeometry),
    Box(BoxGeometry),
    Capsule(CapsuleGeometry),
    Sphere(SphereGeometry),
}

impl Geometry {
    /// World-space bounds, or `None` for unbounded geometry (infinite
    /// planes). Unbounded primitives are exempt from frustum culling.
    pub fn aabb(&self) -> Option<Aabb> {
        match *self {
            Geometry::Plane(ref p) => {
                let (w, h) = p.extent?;
                let (u, v) = p.normal.orthonormal_basis();
                let hw = u * (w * 0.5);
                let hh = v * (h * 0.5);
                // A hair of thickness along the normal keeps the box
                // non-degenerate for overlap tests.
                let n = p.normal * 1e-3;
                Some(Aabb::from_points([
                    p.point + hw + hh + n,
                    p.point + hw + hh - n,
                    p.point + hw - hh + n,
                    p.point + hw - hh - n,
                    p.point - hw + hh + n,
                    p.point - hw + hh - n,
                    p.point - hw - hh + n,
                    p.point - hw - hh - n,
                ]))
            }
            Geometry::Box(ref b) => {
                let h = b.outer_half_size();
                match b.rotation {
                    None => Some(Aabb::new(b.center - h, b.center + h)),
                    Some(rot) => {
                        let corners = (0..8).map(|i| {
                            let c = Vec3::new(
                                if i & 1 == 0 { -h.x } else { h.x },
                                if i & 2 == 0 { -h.y } else { h.y },
                                if i & 4 == 0 { -h.z } else { h.z },
                            );
                            b.center + rot.mat * c
                        });
                        Some(Aabb::from_points(corners))
                    }
                }
            }
            Geometry::Capsule(ref c) => {
                let r = Vec3::splat(c.radius);
                Some(Aabb::new(c.a.min(c.b) - r, c.a.max(c.b) + r))
            }
            Geometry::Sphere(ref s) => {
                let r = Vec3::splat(s.radius.abs());
                Some(Aabb::new(s.center - r, s.center + r))
            }
        }
    }
}

// ─── Primitive ──────────────────────────────────────────────────────────────

/// A renderable object: geometry plus the surface fields the shader needs.
/// `color` is an sRGB-encoded triple in [0,1]³; `alpha` 0 is fully
/// transparent (dropped by the compiler); `ior` 1 is air.
#[derive(Debug, Clone, Copy)]
pub struct Primitive {
    pub geometry: Geometry,
    pub color: Color,
    pub alpha: f32,
    pub ior: f32,
}

impl Primitive {
    pub fn new(geometry: Geometry, color: Color) -> Self {
        Self {
            geometry,
            color,
            alpha: 1.0,
            ior: 1.0,
        }
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha.clamp(0.0, 1.0);
        self
    }

    pub fn with_ior(mut self, ior: f32) -> Self {
        self.ior = ior.max(1.0);
        self
    }

    /// A primitive is well-formed when all of its numeric fields are
    /// finite. Malformed ones are skipped by the compiler rather than
    /// surfaced as errors.
    pub fn is_well_formed(&self) -> bool {
        let geometry_ok = match self.geometry {
            Geometry::Plane(p) => p.point.is_finite() && p.normal.is_finite(),
            Geometry::Box(b) => b.center.is_finite() && b.size.is_finite() && b.radius.is_finite(),
            Geometry::Capsule(c) => c.a.is_finite() && c.b.is_finite() && c.radius.is_finite(),
            Geometry::Sphere(s) => s.center.is_finite() && s.radius.is_finite(),
        };
        geometry_ok && self.color.is_finite() && self.alpha.is_finite() && self.ior.is_finite()
    }
}

// ─── Lights ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct AmbientLight {
    pub color: Color,
    pub intensity: f32,
}

impl AmbientLight {
    pub const fn new(color: Color, intensity: f32) -> Self {
        Self { color, intensity }
    }
}

impl Default for AmbientLight {
    /// White at full intensity — the substitute when a scene carries no
    /// ambient light at all.
    fn default() -> Self {
        Self::new(Color::ones(), 1.0)
    }
}

/// A directional light. `direction` points toward where the light travels,
/// i.e. from the (infinitely far) source into the scene.
#[derive(Debug, Clone, Copy)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Color,
    pub intensity: f32,
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Color, intensity: f32) -> Self {
        Self {
            direction: direction.normalized(),
            color,
            intensity,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Light {
    Ambient(AmbientLight),
    Directional(DirectionalLight),
}

// ─── Scene ──────────────────────────────────────────────────────────────────

/// The immutable scene aggregate handed to `compile`. At most one ambient
/// light is honoured (the first); the compiler substitutes defaults for
/// missing lights, background, and shadow blur.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    pub objects: Vec<Primitive>,
    pub lights: Vec<Light>,
    pub background_color: Option<Color>,
    pub shadow_blur: Option<f32>,
}

impl Scene {
    pub fn new(objects: Vec<Primitive>, lights: Vec<Light>) -> Self {
        Self {
            objects,
            lights,
            background_color: None,
            shadow_blur: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infinite_plane_is_unbounded() {
        let g = Geometry::Plane(PlaneGeometry::new(Point3::zero(), Vec3::unit_z()));
        assert!(g.aabb().is_none());
    }

    #[test]
    fn finite_plane_bounds_match_extent() {
        let g = Geometry::Plane(PlaneGeometry::finite(
            Point3::zero(),
            Vec3::unit_z(),
            4.0,
            2.0,
        ));
        let aabb = g.aabb().unwrap();
        assert!((aabb.max.x - aabb.min.x - 4.0).abs() < 1e-3);
        assert!((aabb.max.y - aabb.min.y - 2.0).abs() < 1e-3);
    }

    #[test]
    fn rotated_box_bounds_cover_all_corners() {
        let g = Geometry::Box(BoxGeometry::rotated(
            Point3::zero(),
            Vec3::splat(2.0),
            Vec3::new(0.0, 0.0, std::f32::consts::FRAC_PI_4),
        ));
        let aabb = g.aabb().unwrap();
        // A unit half-size box rotated 45° about z spans √2 in x and y.
        let s = std::f32::consts::SQRT_2;
        assert!((aabb.max.x - s).abs() < 1e-4);
        assert!((aabb.max.y - s).abs() < 1e-4);
        assert!((aabb.max.z - 1.0).abs() < 1e-4);
    }

    #[test]
    fn rounded_box_bounds_include_radius() {
        let g = Geometry::Box(BoxGeometry::rounded(Point3::zero(), Vec3::splat(2.0), 0.25));
        let aabb = g.aabb().unwrap();
        assert!((aabb.max.x - 1.25).abs() < 1e-5);
    }

    #[test]
    fn capsule_bounds_span_both_caps() {
        let g = Geometry::Capsule(CapsuleGeometry {
            a: Point3::new(0.0, -1.0, 0.0),
            b: Point3::new(0.0, 2.0, 0.0),
            radius: 0.5,
        });
        let aabb = g.aabb().unwrap();
        assert_eq!(aabb.min, Vec3::new(-0.5, -1.5, -0.5));
        assert_eq!(aabb.max, Vec3::new(0.5, 2.5, 0.5));
    }

    #[test]
    fn material_defaults_and_clamps() {
        let p = Primitive::new(
            Geometry::Sphere(SphereGeometry {
                center: Point3::zero(),
                radius: 1.0,
            }),
            Color::ones(),
        );
        assert_eq!(p.alpha, 1.0);
        assert_eq!(p.ior, 1.0);
        let p = p.with_alpha(2.0).with_ior(0.5);
        assert_eq!(p.alpha, 1.0);
        assert_eq!(p.ior, 1.0);
    }

    #[test]
    fn non_finite_primitive_is_malformed() {
        let p = Primitive::new(
            Geometry::Sphere(SphereGeometry {
                center: Point3::new(f32::NAN, 0.0, 0.0),
                radius: 1.0,
            }),
            Color::ones(),
        );
        assert!(!p.is_well_formed());
    }
}
