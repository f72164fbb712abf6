use crate::math::*;
use crate::scene::*;

// Numeric contract shared by every kernel (and any shader port — the
// constants must not diverge between implementations).
pub const EPS_PARALLEL: f32 = 1e-6;
pub const MARCH_MIN_DIST: f32 = 1e-4;
pub const MARCH_MAX_STEPS: u32 = 128;
pub const SELF_SHADOW_OFFSET: f32 = 1e-3;

// ─── Hit Record ─────────────────────────────────────────────────────────────

/// The result of a primary-ray intersection: the nearest positive t, the
/// outward geometric normal there, and the surface fields shading needs.
#[derive(Debug, Clone, Copy)]
pub struct Hit {
    pub t: f32,
    pub normal: Vec3,
    pub color: Color,
    pub alpha: f32,
    pub ior: f32,
}

/// Intersects a full primitive, attaching its material fields to the
/// geometric hit.
#[inline]
pub fn intersect(primitive: &Primitive, ray: &Ray, t_max: f32) -> Option<Hit> {
    let (t, normal) = intersect_geometry(&primitive.geometry, ray, t_max)?;
    Some(Hit {
        t,
        normal,
        color: primitive.color,
        alpha: primitive.alpha,
        ior: primitive.ior,
    })
}

/// Dispatches to the per-shape kernel. Every kernel returns the nearest
/// positive t (entry when outside, exit when the origin is inside) and the
/// outward normal, or `None` on a miss.
pub fn intersect_geometry(geometry: &Geometry, ray: &Ray, t_max: f32) -> Option<(f32, Vec3)> {
    match geometry {
        Geometry::Plane(p) => plane_intersect(p, ray, t_max),
        Geometry::Box(b) => {
            if b.radius > 0.0 {
                round_box_intersect(b, ray, t_max)
            } else {
                obb_intersect(b, ray, t_max)
            }
        }
        Geometry::Capsule(c) => capsule_intersect(c, ray, t_max),
        Geometry::Sphere(s) => sphere_intersect(s, ray, t_max),
    }
}

/// Shadow-ray occlusion query: does anything lie at positive t along the
/// ray? Normals are discarded.
#[inline]
pub fn occludes(geometry: &Geometry, ray: &Ray) -> bool {
    intersect_geometry(geometry, ray, f32::INFINITY).is_some()
}

// ─── Plane ──────────────────────────────────────────────────────────────────

fn plane_intersect(plane: &PlaneGeometry, ray: &Ray, t_max: f32) -> Option<(f32, Vec3)> {
    let denom = ray.direction.dot(plane.normal);
    if denom.abs() < EPS_PARALLEL {
        return None;
    }
    let t = (plane.point - ray.origin).dot(plane.normal) / denom;
    if t < 0.0 || t > t_max {
        return None;
    }
    if let Some((w, h)) = plane.extent {
        let local = ray.at(t) - plane.point;
        let (u_axis, v_axis) = plane.normal.orthonormal_basis();
        if local.dot(u_axis).abs() > w * 0.5 || local.dot(v_axis).abs() > h * 0.5 {
            return None;
        }
    }
    Some((t, plane.normal))
}

// ─── Sharp box (OBB) ────────────────────────────────────────────────────────

/// Takes the ray into box-local space, slab-tests against ±size/2, and
/// maps the local face normal back through the rotation. The entry t is
/// preferred; a ray starting inside takes the exit.
fn obb_intersect(b: &BoxGeometry, ray: &Ray, t_max: f32) -> Option<(f32, Vec3)> {
    let (ro, rd) = to_local(b, ray);
    let half = b.half_size();

    let mut t_near = f32::NEG_INFINITY;
    let mut t_far = f32::INFINITY;
    for axis in 0..3 {
        let inv = safe_recip(rd[axis]);
        let mut t0 = (-half[axis] - ro[axis]) * inv;
        let mut t1 = (half[axis] - ro[axis]) * inv;
        if inv < 0.0 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_near = t_near.max(t0);
        t_far = t_far.min(t1);
        if t_far < t_near {
            return None;
        }
    }

    let t = if t_near > 0.0 { t_near } else { t_far };
    if t <= 0.0 || t > t_max {
        return None;
    }

    // The hit face is the axis where the local point presses hardest
    // against its slab.
    let p = ro + rd * t;
    let mut axis = 0;
    let mut best = f32::NEG_INFINITY;
    for i in 0..3 {
        let d = p[i].abs() - half[i];
        if d > best {
            best = d;
            axis = i;
        }
    }
    let mut local_normal = Vec3::zero();
    match axis {
        0 => local_normal.x = p.x.signum(),
        1 => local_normal.y = p.y.signum(),
        _ => local_normal.z = p.z.signum(),
    }
    Some((t, from_local_normal(b, local_normal)))
}

#[inline]
fn to_local(b: &BoxGeometry, ray: &Ray) -> (Vec3, Vec3) {
    match b.rotation {
        Some(rot) => (rot.inv * (ray.origin - b.center), rot.inv * ray.direction),
        None => (ray.origin - b.center, ray.direction),
    }
}

#[inline]
fn from_local_normal(b: &BoxGeometry, n: Vec3) -> Vec3 {
    match b.rotation {
        Some(rot) => rot.mat * n,
        None => n,
    }
}

// ─── Round box (SDF sphere-trace) ───────────────────────────────────────────

/// Signed distance to a box of half-extents `half` whose surface is pushed
/// outward by `r` with spherical corners.
#[inline]
fn sd_round_box(p: Vec3, half: Vec3, r: f32) -> f32 {
    let q = p.abs() - half;
    q.max(Vec3::zero()).length() + q.max_component().min(0.0) - r
}

/// Sphere-traces the rounded-box SDF in box-local space. The expanded AABB
/// (±(half+r)) bounds the march: rays that never enter it are rejected
/// outright, and marching stops past its exit parameter.
fn round_box_intersect(b: &BoxGeometry, ray: &Ray, t_max: f32) -> Option<(f32, Vec3)> {
    let (ro, rd) = to_local(b, ray);
    let half = b.half_size();
    let outer = half + Vec3::splat(b.radius);

    let local_ray = Ray::new(ro, rd);
    let bounds = Aabb::new(-outer, outer);
    let (t_enter, t_exit) = bounds.hit(&local_ray, 0.0, t_max)?;

    let mut t = t_enter.max(0.0);
    // A ray born inside the surface marches toward the exit instead.
    let inside = sd_round_box(ro + rd * t, half, b.radius) < 0.0;

    for _ in 0..MARCH_MAX_STEPS {
        let p = ro + rd * t;
        let mut d = sd_round_box(p, half, b.radius);
        if inside {
            d = -d;
        }
        if d < MARCH_MIN_DIST {
            if t <= 0.0 || t > t_max {
                return None;
            }
            return Some((t, from_local_normal(b, round_box_normal(p, half, b.radius))));
        }
        t += d;
        if t > t_exit {
            return None;
        }
    }
    None
}

/// Outward normal via central differences of the SDF.
fn round_box_normal(p: Vec3, half: Vec3, r: f32) -> Vec3 {
    let h = MARCH_MIN_DIST;
    let dx = sd_round_box(p + Vec3::new(h, 0.0, 0.0), half, r)
        - sd_round_box(p - Vec3::new(h, 0.0, 0.0), half, r);
    let dy = sd_round_box(p + Vec3::new(0.0, h, 0.0), half, r)
        - sd_round_box(p - Vec3::new(0.0, h, 0.0), half, r);
    let dz = sd_round_box(p + Vec3::new(0.0, 0.0, h), half, r)
        - sd_round_box(p - Vec3::new(0.0, 0.0, h), half, r);
    let g = Vec3::new(dx, dy, dz);
    if g.near_zero() {
        Vec3::unit_z()
    } else {
        g.normalized()
    }
}

// ─── Capsule ────────────────────────────────────────────────────────────────

/// Cylinder-with-hemispheres test: quadratic against the infinite cylinder
/// clipped to the segment span, then the two cap spheres restricted to the
/// hemispheres past the segment ends.
fn capsule_intersect(c: &CapsuleGeometry, ray: &Ray, t_max: f32) -> Option<(f32, Vec3)> {
    let ba = c.b - c.a;
    let baba = ba.dot(ba);
    if baba < 1e-12 {
        // Degenerate segment collapses to a sphere.
        let s = SphereGeometry {
            center: c.a,
            radius: c.radius,
        };
        return sphere_intersect(&s, ray, t_max);
    }

    let oa = ray.origin - c.a;
    let bard = ba.dot(ray.direction);
    let baoa = ba.dot(oa);
    let rdoa = ray.direction.dot(oa);
    let oaoa = oa.dot(oa);

    let a = baba - bard * bard;
    let b = baba * rdoa - baoa * bard;
    let cq = baba * oaoa - baoa * baoa - c.radius * c.radius * baba;

    let mut best: Option<f32> = None;

    if a.abs() > 1e-12 {
        let disc = b * b - a * cq;
        if disc >= 0.0 {
            let sq = disc.sqrt();
            // Near root first; the far root covers rays starting inside.
            for t in [(-b - sq) / a, (-b + sq) / a] {
                if t > 0.0 && t <= t_max {
                    let y = baoa + t * bard;
                    if (0.0..=baba).contains(&y) {
                        best = Some(t);
                        break;
                    }
                }
            }
        }
    }

    for (cap, low_end) in [(c.a, true), (c.b, false)] {
        let oc = ray.origin - cap;
        let b2 = ray.direction.dot(oc);
        let c2 = oc.dot(oc) - c.radius * c.radius;
        let disc = b2 * b2 - c2;
        if disc < 0.0 {
            continue;
        }
        let sq = disc.sqrt();
        for t in [-b2 - sq, -b2 + sq] {
            if t <= 0.0 || t > t_max || best.is_some_and(|bt| bt <= t) {
                continue;
            }
            let y = baoa + t * bard;
            let on_hemisphere = if low_end { y <= 0.0 } else { y >= baba };
            if on_hemisphere {
                best = Some(t);
            }
        }
    }

    let t = best?;
    let p = ray.at(t);
    let h = ((p - c.a).dot(ba) / baba).clamp(0.0, 1.0);
    let on_axis = c.a + ba * h;
    Some((t, ((p - on_axis) / c.radius).normalized()))
}

// ─── Sphere ─────────────────────────────────────────────────────────────────

fn sphere_intersect(s: &SphereGeometry, ray: &Ray, t_max: f32) -> Option<(f32, Vec3)> {
    let oc = ray.origin - s.center;
    let a = ray.direction.length_squared();
    let half_b = oc.dot(ray.direction);
    let c = oc.length_squared() - s.radius * s.radius;
    let discriminant = half_b * half_b - a * c;

    if discriminant < 0.0 {
        return None;
    }

    let sqrtd = discriminant.sqrt();
    let mut root = (-half_b - sqrtd) / a;
    if root <= 0.0 || root > t_max {
        root = (-half_b + sqrtd) / a;
        if root <= 0.0 || root > t_max {
            return None;
        }
    }

    let normal = (ray.at(root) - s.center) / s.radius;
    Some((root, normal))
}
