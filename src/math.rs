use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Index, Mul, MulAssign, Neg, Sub};

/// A 3-component vector used for positions, directions, and colors.
///
/// This type implements all standard arithmetic operations with operator
/// overloading, and provides the geometric utilities (dot product, cross
/// product, reflection, refraction) needed for analytical light transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

pub type Point3 = Vec3;
pub type Color = Vec3;

impl Vec3 {
    #[inline(always)]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline(always)]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    #[inline(always)]
    pub const fn ones() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }

    #[inline(always)]
    pub const fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    #[inline(always)]
    pub const fn unit_x() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }

    #[inline(always)]
    pub const fn unit_y() -> Self {
        Self::new(0.0, 1.0, 0.0)
    }

    #[inline(always)]
    pub const fn unit_z() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }

    /// Squared Euclidean length — avoids the sqrt for performance-critical
    /// paths such as BVH traversal and intersection culling.
    #[inline(always)]
    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    #[inline(always)]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Returns the unit vector. Panics on zero-length vectors in debug mode.
    #[inline(always)]
    pub fn normalized(self) -> Self {
        let len = self.length();
        debug_assert!(len > 1e-12, "Attempted to normalize a zero-length vector");
        self / len
    }

    /// The standard Euclidean inner product, fundamental to all geometric
    /// queries (projection, angle computation, Lambertian shading).
    #[inline(always)]
    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    /// Cross product — used for constructing orthonormal camera bases and
    /// the tangent frames of finite planes and PCF filter kernels.
    #[inline(always)]
    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    /// Specular reflection of `self` about the surface normal `n`.
    /// Implements the GLSL `reflect` formula: I - 2·dot(I, N)·N
    #[inline(always)]
    pub fn reflect(self, normal: Self) -> Self {
        self - normal * 2.0 * self.dot(normal)
    }

    /// Snell's law refraction. Returns `None` for total internal reflection
    /// when the discriminant is negative, which occurs at grazing angles when
    /// transitioning from a denser to a rarer medium (η > 1).
    #[inline]
    pub fn refract(self, normal: Self, eta_ratio: f32) -> Option<Self> {
        let cos_theta = (-self).dot(normal).min(1.0);
        let r_perp = (self + normal * cos_theta) * eta_ratio;
        let discriminant = 1.0 - r_perp.length_squared();
        if discriminant < 0.0 {
            return None;
        }
        let r_parallel = normal * -(discriminant.sqrt());
        Some(r_perp + r_parallel)
    }

    /// Component-wise (Hadamard) product — used for color modulation where
    /// each channel is attenuated independently by the surface albedo.
    #[inline(always)]
    pub fn hadamard(self, rhs: Self) -> Self {
        Self::new(self.x * rhs.x, self.y * rhs.y, self.z * rhs.z)
    }

    /// Component-wise linear interpolation: self·(1-t) + other·t
    #[inline(always)]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        self * (1.0 - t) + other * t
    }

    /// Clamps each component to [0, 1] — used before quantizing linear
    /// radiance values to 8-bit sRGB.
    #[inline(always)]
    pub fn saturate(self) -> Self {
        Self::new(
            self.x.clamp(0.0, 1.0),
            self.y.clamp(0.0, 1.0),
            self.z.clamp(0.0, 1.0),
        )
    }

    /// Component-wise power — the building block for the γ = 2.2 transfer
    /// functions shared by the CPU path and any shader port.
    #[inline(always)]
    pub fn powf(self, e: f32) -> Self {
        Self::new(self.x.powf(e), self.y.powf(e), self.z.powf(e))
    }

    #[inline(always)]
    pub fn abs(self) -> Self {
        Self::new(self.x.abs(), self.y.abs(), self.z.abs())
    }

    #[inline(always)]
    pub fn max(self, rhs: Self) -> Self {
        Self::new(self.x.max(rhs.x), self.y.max(rhs.y), self.z.max(rhs.z))
    }

    #[inline(always)]
    pub fn min(self, rhs: Self) -> Self {
        Self::new(self.x.min(rhs.x), self.y.min(rhs.y), self.z.min(rhs.z))
    }

    #[inline(always)]
    pub fn max_component(self) -> f32 {
        self.x.max(self.y).max(self.z)
    }

    /// Checks if the vector is near-zero in all components, used to avoid
    /// degenerate directions that would produce NaN in subsequent math.
    #[inline(always)]
    pub fn near_zero(self) -> bool {
        const EPS: f32 = 1e-8;
        self.x.abs() < EPS && self.y.abs() < EPS && self.z.abs() < EPS
    }

    #[inline(always)]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Converts a [0,1] color to an 8-bit RGB triple.
    pub fn to_rgb8(self) -> (u8, u8, u8) {
        let c = self.saturate();
        (
            (c.x * 255.999) as u8,
            (c.y * 255.999) as u8,
            (c.z * 255.999) as u8,
        )
    }

    /// An orthonormal basis (t, b) perpendicular to this unit vector.
    /// Used for finite-plane local frames and the PCF sample lattice.
    pub fn orthonormal_basis(self) -> (Vec3, Vec3) {
        let helper = if self.y.abs() > 0.9 {
            Vec3::unit_x()
        } else {
            Vec3::unit_y()
        };
        let t = helper.cross(self).normalized();
        let b = self.cross(t);
        (t, b)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    #[inline(always)]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Add for Vec3 {
    type Output = Self;
    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    #[inline(always)]
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl Sub for Vec3 {
    type Output = Self;
    #[inline(always)]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    #[inline(always)]
    fn mul(self, t: f32) -> Self {
        Self::new(self.x * t, self.y * t, self.z * t)
    }
}

impl Mul<Vec3> for f32 {
    type Output = Vec3;
    #[inline(always)]
    fn mul(self, v: Vec3) -> Vec3 {
        v * self
    }
}

impl MulAssign<f32> for Vec3 {
    #[inline(always)]
    fn mul_assign(&mut self, t: f32) {
        self.x *= t;
        self.y *= t;
        self.z *= t;
    }
}

impl Div<f32> for Vec3 {
    type Output = Self;
    #[inline(always)]
    fn div(self, t: f32) -> Self {
        let inv = 1.0 / t;
        Self::new(self.x * inv, self.y * inv, self.z * inv)
    }
}

impl DivAssign<f32> for Vec3 {
    #[inline(always)]
    fn div_assign(&mut self, t: f32) {
        let inv = 1.0 / t;
        self.x *= inv;
        self.y *= inv;
        self.z *= inv;
    }
}

impl Index<usize> for Vec3 {
    type Output = f32;
    fn index(&self, i: usize) -> &f32 {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("Vec3 index out of bounds: {i}"),
        }
    }
}

/// Reciprocal that degrades gracefully at zero: returns a signed infinity
/// instead of NaN so slab tests and DDA stepping stay well ordered.
#[inline(always)]
pub fn safe_recip(x: f32) -> f32 {
    if x.abs() < 1e-12 {
        f32::INFINITY.copysign(x)
    } else {
        1.0 / x
    }
}

// ─── Ray ────────────────────────────────────────────────────────────────────

/// A parametric ray R(t) = origin + t · direction, the fundamental geometric
/// primitive for all intersection queries.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Point3,
    pub direction: Vec3,
}

impl Ray {
    #[inline(always)]
    pub const fn new(origin: Point3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Evaluates the ray at parameter t. Positive t gives points ahead of the origin.
    #[inline(always)]
    pub fn at(self, t: f32) -> Point3 {
        self.origin + self.direction * t
    }
}

// ─── 3×3 Rotation Matrix ────────────────────────────────────────────────────

/// A row-major 3×3 matrix used exclusively for box rotations.
///
/// Rotation matrices are orthonormal, so the inverse is the transpose;
/// oriented boxes store both to transform rays into local space and
/// normals back out without recomputation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat3 {
    pub rows: [Vec3; 3],
}

impl Mat3 {
    pub const IDENTITY: Mat3 = Mat3 {
        rows: [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        ],
    };

    /// Builds the rotation for intrinsic Euler XYZ angles (radians):
    /// R = Rx(x) · Ry(y) · Rz(z).
    pub fn from_euler_xyz(x: f32, y: f32, z: f32) -> Self {
        let (sx, cx) = x.sin_cos();
        let (sy, cy) = y.sin_cos();
        let (sz, cz) = z.sin_cos();

        let rx = Mat3 {
            rows: [
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, cx, -sx),
                Vec3::new(0.0, sx, cx),
            ],
        };
        let ry = Mat3 {
            rows: [
                Vec3::new(cy, 0.0, sy),
                Vec3::new(0.0, 1.0, 0.0),
                Vec3::new(-sy, 0.0, cy),
            ],
        };
        let rz = Mat3 {
            rows: [
                Vec3::new(cz, -sz, 0.0),
                Vec3::new(sz, cz, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
            ],
        };
        rx * ry * rz
    }

    pub fn transpose(self) -> Self {
        Mat3 {
            rows: [
                Vec3::new(self.rows[0].x, self.rows[1].x, self.rows[2].x),
                Vec3::new(self.rows[0].y, self.rows[1].y, self.rows[2].y),
                Vec3::new(self.rows[0].z, self.rows[1].z, self.rows[2].z),
            ],
        }
    }
}

impl Mul<Vec3> for Mat3 {
    type Output = Vec3;
    #[inline(always)]
    fn mul(self, v: Vec3) -> Vec3 {
        Vec3::new(
            self.rows[0].dot(v),
            self.rows[1].dot(v),
            self.rows[2].dot(v),
        )
    }
}

impl Mul for Mat3 {
    type Output = Mat3;
    fn mul(self, rhs: Mat3) -> Mat3 {
        let t = rhs.transpose();
        Mat3 {
            rows: [
                Vec3::new(
                    self.rows[0].dot(t.rows[0]),
                    self.rows[0].dot(t.rows[1]),
                    self.rows[0].dot(t.rows[2]),
                ),
                Vec3::new(
                    self.rows[1].dot(t.rows[0]),
                    self.rows[1].dot(t.rows[1]),
                    self.rows[1].dot(t.rows[2]),
                ),
                Vec3::new(
                    self.rows[2].dot(t.rows[0]),
                    self.rows[2].dot(t.rows[1]),
                    self.rows[2].dot(t.rows[2]),
                ),
            ],
        }
    }
}

// ─── Axis-Aligned Bounding Box ──────────────────────────────────────────────

/// An axis-aligned bounding box (AABB) used as the bounding volume of the
/// BVH and the uniform grid, and as the orthographic view frustum.
/// Ray intersection is tested via the slab method, which checks overlap of
/// the ray's parameter intervals across all three axes simultaneously.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3,
    pub max: Point3,
}

impl Aabb {
    pub const fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// The inverted-empty box: unioning anything into it yields that thing.
    pub const fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    /// Smallest box enclosing a point set — used for the eight corners of
    /// the orthographic view volume.
    pub fn from_points(points: impl IntoIterator<Item = Point3>) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.min = aabb.min.min(p);
            aabb.max = aabb.max.max(p);
        }
        aabb
    }

    /// Slab-method ray-AABB intersection. Returns the clipped `(t_near, t_far)`
    /// parameter interval, or `None` on a miss. The safe-reciprocal
    /// formulation handles axis-aligned rays without producing NaN.
    pub fn hit(&self, ray: &Ray, mut t_min: f32, mut t_max: f32) -> Option<(f32, f32)> {
        for axis in 0..3 {
            let inv_d = safe_recip(ray.direction[axis]);
            let mut t0 = (self.min[axis] - ray.origin[axis]) * inv_d;
            let mut t1 = (self.max[axis] - ray.origin[axis]) * inv_d;
            if inv_d < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t0.max(t_min);
            t_max = t1.min(t_max);
            if t_max <= t_min {
                return None;
            }
        }
        Some((t_min, t_max))
    }

    /// Computes the union of two AABBs — used during BVH construction and
    /// frustum expansion to find the enclosing volume.
    pub fn surrounding(a: &Aabb, b: &Aabb) -> Aabb {
        Aabb::new(a.min.min(b.min), a.max.max(b.max))
    }

    /// Box-vs-box overlap test used by frustum culling and grid binning.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// The same box displaced by `offset` — frustum expansion unions the
    /// view volume with translates of itself toward each light.
    pub fn translated(&self, offset: Vec3) -> Aabb {
        Aabb::new(self.min + offset, self.max + offset)
    }

    pub fn center(&self) -> Point3 {
        (self.min + self.max) * 0.5
    }

    /// Returns the index of the longest axis (0=x, 1=y, 2=z) — used as the
    /// split dimension during top-down BVH construction.
    pub fn longest_axis(&self) -> usize {
        let d = self.max - self.min;
        if d.x > d.y && d.x > d.z {
            0
        } else if d.y > d.z {
            1
        } else {
            2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn cross_follows_right_hand_rule() {
        let c = Vec3::unit_x().cross(Vec3::unit_y());
        assert!(close(c.x, 0.0) && close(c.y, 0.0) && close(c.z, 1.0));
    }

    #[test]
    fn refract_straight_through_at_normal_incidence() {
        let d = Vec3::new(0.0, 0.0, 1.0);
        let n = Vec3::new(0.0, 0.0, -1.0);
        let r = d.refract(n, 1.0 / 1.5).unwrap();
        assert!(close(r.x, 0.0) && close(r.y, 0.0));
        assert!(r.z > 0.0);
    }

    #[test]
    fn refract_reports_total_internal_reflection() {
        // Dense → rare past the critical angle has no transmitted ray.
        let d = Vec3::new(0.9, 0.0, 0.436).normalized();
        let n = Vec3::new(0.0, 0.0, -1.0);
        assert!(d.refract(n, 1.5).is_none());
    }

    #[test]
    fn safe_recip_keeps_sign_at_zero() {
        assert_eq!(safe_recip(0.0), f32::INFINITY);
        assert_eq!(safe_recip(-0.0), f32::NEG_INFINITY);
        assert!(close(safe_recip(4.0), 0.25));
    }

    #[test]
    fn euler_identity_and_inverse() {
        let r = Mat3::from_euler_xyz(0.0, 0.0, 0.0);
        assert_eq!(r, Mat3::IDENTITY);

        let r = Mat3::from_euler_xyz(0.3, -0.7, 1.1);
        let v = Vec3::new(0.2, -1.3, 0.5);
        let back = r.transpose() * (r * v);
        assert!(close(back.x, v.x) && close(back.y, v.y) && close(back.z, v.z));
    }

    #[test]
    fn euler_z_rotates_x_to_y() {
        let r = Mat3::from_euler_xyz(0.0, 0.0, std::f32::consts::FRAC_PI_2);
        let v = r * Vec3::unit_x();
        assert!(close(v.x, 0.0) && close(v.y, 1.0) && close(v.z, 0.0));
    }

    #[test]
    fn aabb_slab_hit_and_miss() {
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::unit_z());
        let (t0, t1) = aabb.hit(&ray, 0.0, f32::INFINITY).unwrap();
        assert!(close(t0, 4.0) && close(t1, 6.0));

        let miss = Ray::new(Vec3::new(3.0, 0.0, -5.0), Vec3::unit_z());
        assert!(aabb.hit(&miss, 0.0, f32::INFINITY).is_none());
    }

    #[test]
    fn aabb_hit_handles_axis_parallel_ray() {
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        // Zero x component with the origin inside the x slab.
        let ray = Ray::new(Vec3::new(0.5, -4.0, 0.0), Vec3::unit_y());
        assert!(aabb.hit(&ray, 0.0, f32::INFINITY).is_some());
        // Origin outside the x slab never enters.
        let ray = Ray::new(Vec3::new(2.0, -4.0, 0.0), Vec3::unit_y());
        assert!(aabb.hit(&ray, 0.0, f32::INFINITY).is_none());
    }

    #[test]
    fn aabb_union_and_overlap() {
        let a = Aabb::new(Vec3::zero(), Vec3::ones());
        let b = Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0));
        assert!(!a.intersects(&b));
        let u = Aabb::surrounding(&a, &b);
        assert!(u.intersects(&a) && u.intersects(&b));
        assert_eq!(u.min, Vec3::zero());
        assert_eq!(u.max, Vec3::splat(3.0));
    }

    #[test]
    fn from_points_matches_extremes() {
        let aabb = Aabb::from_points([
            Vec3::new(1.0, -2.0, 0.5),
            Vec3::new(-1.0, 4.0, 0.0),
            Vec3::new(0.0, 0.0, -3.0),
        ]);
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 4.0, 0.5));
    }
}
