use crate::accel::Accelerator;
use crate::camera::OrthographicCamera;
use crate::intersect::{intersect, occludes, Hit};
use crate::math::*;
use crate::scene::*;
use log::debug;

/// Background when the scene does not name one: dark navy.
pub const DEFAULT_BACKGROUND: Color = Color::new(0.04, 0.04, 0.10);

/// How far a shadow caster may sit outside the view volume, per light,
/// before culling is allowed to drop it.
pub const DEFAULT_SHADOW_DISTANCE: f32 = 1000.0;

/// Box count at which building a spatial accelerator starts paying off.
pub const DEFAULT_GRID_MIN_BOXES: usize = 16;

/// Tunables of the compilation pass. The defaults match the rendering
/// contract; they are exposed for tests and embedders.
#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    pub near: f32,
    pub far: f32,
    pub shadow_distance: f32,
    pub grid_min_boxes: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            near: OrthographicCamera::NEAR,
            far: OrthographicCamera::FAR,
            shadow_distance: DEFAULT_SHADOW_DISTANCE,
            grid_min_boxes: DEFAULT_GRID_MIN_BOXES,
        }
    }
}

// ─── RenderScene ────────────────────────────────────────────────────────────

/// The compiler's partitioned, culled, accelerator-ready view over a
/// `Scene`. Derived per render call and discarded afterwards.
#[derive(Debug, Clone)]
pub struct RenderScene {
    pub planes: Vec<Primitive>,
    pub boxes: Vec<Primitive>,
    pub capsules: Vec<Primitive>,
    pub spheres: Vec<Primitive>,
    pub ambient: AmbientLight,
    pub directionals: Vec<DirectionalLight>,
    pub background: Color,
    pub shadow_blur: f32,
    pub accelerator: Option<Accelerator>,
}

impl RenderScene {
    /// Nearest primary hit across all object arrays. Boxes go through the
    /// accelerator when one was built; everything else is scanned.
    pub fn hit(&self, ray: &Ray, t_max: f32) -> Option<Hit> {
        let mut best: Option<Hit> = None;
        let mut best_t = t_max;

        match &self.accelerator {
            Some(accel) => {
                if let Some(hit) = accel.intersect(&self.boxes, ray, best_t) {
                    best_t = hit.t;
                    best = Some(hit);
                }
            }
            None => {
                for primitive in &self.boxes {
                    if let Some(hit) = intersect(primitive, ray, best_t) {
                        best_t = hit.t;
                        best = Some(hit);
                    }
                }
            }
        }

        for array in [&self.planes, &self.capsules, &self.spheres] {
            for primitive in array {
                if let Some(hit) = intersect(primitive, ray, best_t) {
                    best_t = hit.t;
                    best = Some(hit);
                }
            }
        }
        best
    }

    /// Any-hit occlusion query for shadow rays.
    pub fn occluded(&self, ray: &Ray) -> bool {
        let boxes_hit = match &self.accelerator {
            Some(accel) => accel.occluded(&self.boxes, ray),
            None => self.boxes.iter().any(|p| occludes(&p.geometry, ray)),
        };
        boxes_hit
            || self.planes.iter().any(|p| occludes(&p.geometry, ray))
            || self.capsules.iter().any(|p| occludes(&p.geometry, ray))
            || self.spheres.iter().any(|p| occludes(&p.geometry, ray))
    }

    pub fn object_count(&self) -> usize {
        self.planes.len() + self.boxes.len() + self.capsules.len() + self.spheres.len()
    }
}

// ─── compile ────────────────────────────────────────────────────────────────

/// Compiles a scene for rendering: splits lights, partitions objects by
/// variant, prunes invisible and malformed primitives, frustum-culls
/// against the camera (expanded by shadow-caster margins), and builds the
/// box accelerator past the threshold. Pure; never fails.
pub fn compile(scene: &Scene, camera: Option<&OrthographicCamera>) -> RenderScene {
    compile_with(scene, camera, &CompileOptions::default())
}

pub fn compile_with(
    scene: &Scene,
    camera: Option<&OrthographicCamera>,
    options: &CompileOptions,
) -> RenderScene {
    // Lights: the first ambient wins; a missing one becomes white-1.0.
    let mut ambient = None;
    let mut directionals = Vec::new();
    for light in &scene.lights {
        match light {
            Light::Ambient(a) => {
                if ambient.is_none() {
                    ambient = Some(*a);
                }
            }
            Light::Directional(d) => directionals.push(*d),
        }
    }
    let ambient = ambient.unwrap_or_default();

    // Partition by variant, dropping fully transparent and malformed
    // primitives up front.
    let mut planes = Vec::new();
    let mut boxes = Vec::new();
    let mut capsules = Vec::new();
    let mut spheres = Vec::new();
    for primitive in &scene.objects {
        if primitive.alpha <= 0.0 || !primitive.is_well_formed() {
            continue;
        }
        match primitive.geometry {
            Geometry::Plane(_) => planes.push(*primitive),
            Geometry::Box(_) => boxes.push(*primitive),
            Geometry::Capsule(_) => capsules.push(*primitive),
            Geometry::Sphere(_) => spheres.push(*primitive),
        }
    }
    let before_cull = planes.len() + boxes.len() + capsules.len() + spheres.len();

    if let Some(camera) = camera {
        let mut region = camera.frustum(options.near, options.far);
        // Shadow casters can sit outside the view volume, up to
        // shadow_distance back along each light's travel direction.
        let visible = region;
        for light in &directionals {
            region = Aabb::surrounding(
                &region,
                &visible.translated(-light.direction * options.shadow_distance),
            );
        }
        let keep = |primitive: &Primitive| match primitive.geometry.aabb() {
            // Unbounded geometry is always kept.
            None => true,
            Some(aabb) => aabb.intersects(&region),
        };
        planes.retain(keep);
        boxes.retain(keep);
        capsules.retain(keep);
        spheres.retain(keep);
    }

    let accelerator = if boxes.len() >= options.grid_min_boxes {
        let items: Vec<(Aabb, u32)> = boxes
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.geometry.aabb().map(|aabb| (aabb, i as u32)))
            .collect();
        let all_axis_aligned = boxes.iter().all(|p| match p.geometry {
            Geometry::Box(b) => b.rotation.is_none(),
            _ => true,
        });
        Accelerator::build(&items, all_axis_aligned)
    } else {
        None
    };

    let accel_label = match &accelerator {
        Some(Accelerator::Bvh(_)) => "bvh",
        Some(Accelerator::Grid(_)) => "grid",
        None => "none",
    };
    let compiled = RenderScene {
        planes,
        boxes,
        capsules,
        spheres,
        ambient,
        directionals,
        background: scene.background_color.unwrap_or(DEFAULT_BACKGROUND),
        shadow_blur: scene.shadow_blur.unwrap_or(0.0).max(0.0),
        accelerator,
    };
    debug!(
        "compiled scene: {}/{} objects kept, {} directional light(s), accelerator: {}",
        compiled.object_count(),
        before_cull,
        compiled.directionals.len(),
        accel_label
    );
    compiled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_camera() -> OrthographicCamera {
        OrthographicCamera::new(
            Point3::new(0.0, 0.0, -10.0),
            Point3::zero(),
            Vec3::unit_y(),
            100.0,
            100.0,
        )
    }

    fn box_at(center: Point3) -> Primitive {
        Primitive::new(
            Geometry::Box(BoxGeometry::new(center, Vec3::splat(2.0))),
            Color::ones(),
        )
    }

    #[test]
    fn first_ambient_wins_and_default_substitutes() {
        let scene = Scene::new(
            vec![],
            vec![
                Light::Ambient(AmbientLight::new(Color::new(0.5, 0.5, 0.5), 0.3)),
                Light::Ambient(AmbientLight::new(Color::ones(), 9.0)),
            ],
        );
        let rs = compile(&scene, None);
        assert_eq!(rs.ambient.intensity, 0.3);

        let rs = compile(&Scene::default(), None);
        assert_eq!(rs.ambient.color, Color::ones());
        assert_eq!(rs.ambient.intensity, 1.0);
    }

    #[test]
    fn alpha_zero_is_pruned() {
        let scene = Scene::new(
            vec![
                box_at(Point3::zero()).with_alpha(0.0),
                box_at(Point3::new(5.0, 0.0, 0.0)),
            ],
            vec![],
        );
        let rs = compile(&scene, None);
        assert_eq!(rs.boxes.len(), 1);
        assert_eq!(rs.boxes[0].geometry.aabb().unwrap().center().x, 5.0);
    }

    #[test]
    fn malformed_primitives_are_skipped() {
        let scene = Scene::new(
            vec![Primitive::new(
                Geometry::Sphere(SphereGeometry {
                    center: Point3::new(f32::NAN, 0.0, 0.0),
                    radius: 1.0,
                }),
                Color::ones(),
            )],
            vec![],
        );
        assert_eq!(compile(&scene, None).object_count(), 0);
    }

    #[test]
    fn frustum_culling_keeps_visible_drops_distant() {
        let scene = Scene::new(
            vec![
                box_at(Point3::new(0.0, 0.0, 5.0)),
                box_at(Point3::new(4000.0, 0.0, 5.0)),
            ],
            vec![],
        );
        let rs = compile(&scene, Some(&page_camera()));
        assert_eq!(rs.boxes.len(), 1);
    }

    #[test]
    fn unbounded_planes_survive_culling() {
        let scene = Scene::new(
            vec![Primitive::new(
                Geometry::Plane(PlaneGeometry::new(
                    Point3::new(0.0, 0.0, 1e6),
                    Vec3::unit_z(),
                )),
                Color::ones(),
            )],
            vec![],
        );
        let rs = compile(&scene, Some(&page_camera()));
        assert_eq!(rs.planes.len(), 1);
    }

    #[test]
    fn shadow_margin_keeps_offscreen_casters() {
        // The box sits far outside the view volume, back along the light's
        // travel direction, so it can still throw a shadow into view.
        let light = DirectionalLight::new(Vec3::new(0.0, -1.0, 0.0), Color::ones(), 1.0);
        let caster = box_at(Point3::new(0.0, 500.0, 5.0));
        let scene = Scene::new(vec![caster], vec![Light::Directional(light)]);

        let rs = compile(&scene, Some(&page_camera()));
        assert_eq!(rs.boxes.len(), 1);

        // Without the light the same box is culled.
        let scene = Scene::new(vec![box_at(Point3::new(0.0, 500.0, 5.0))], vec![]);
        let rs = compile(&scene, Some(&page_camera()));
        assert_eq!(rs.boxes.len(), 0);
    }

    #[test]
    fn accelerator_respects_threshold() {
        let few: Vec<Primitive> = (0..15)
            .map(|i| box_at(Point3::new(i as f32 * 3.0 - 20.0, 0.0, 5.0)))
            .collect();
        let rs = compile(&Scene::new(few, vec![]), None);
        assert!(rs.accelerator.is_none());

        let many: Vec<Primitive> = (0..16)
            .map(|i| box_at(Point3::new(i as f32 * 3.0 - 20.0, 0.0, 5.0)))
            .collect();
        let rs = compile(&Scene::new(many, vec![]), None);
        assert!(matches!(rs.accelerator, Some(Accelerator::Grid(_))));
    }

    #[test]
    fn rotated_boxes_select_the_bvh() {
        let objects: Vec<Primitive> = (0..16)
            .map(|i| {
                let b = BoxGeometry::rotated(
                    Point3::new(i as f32 * 3.0 - 20.0, 0.0, 5.0),
                    Vec3::splat(2.0),
                    Vec3::new(0.0, 0.0, 0.4),
                );
                Primitive::new(Geometry::Box(b), Color::ones())
            })
            .collect();
        let rs = compile(&Scene::new(objects, vec![]), None);
        assert!(matches!(rs.accelerator, Some(Accelerator::Bvh(_))));
    }

    #[test]
    fn defaults_fill_background_and_blur() {
        let rs = compile(&Scene::default(), None);
        assert_eq!(rs.background, DEFAULT_BACKGROUND);
        assert_eq!(rs.shadow_blur, 0.0);
    }

    #[test]
    fn hit_spans_all_type_arrays() {
        let mut scene = Scene::new(
            vec![
                box_at(Point3::new(0.0, 0.0, 8.0)),
                Primitive::new(
                    Geometry::Sphere(SphereGeometry {
                        center: Point3::new(0.0, 0.0, 4.0),
                        radius: 1.0,
                    }),
                    Color::new(0.0, 1.0, 0.0),
                ),
            ],
            vec![],
        );
        scene.objects.push(Primitive::new(
            Geometry::Plane(PlaneGeometry::new(
                Point3::new(0.0, 0.0, 20.0),
                Vec3::new(0.0, 0.0, -1.0),
            )),
            Color::new(0.0, 0.0, 1.0),
        ));
        let rs = compile(&scene, None);
        let ray = Ray::new(Point3::new(0.0, 0.0, -10.0), Vec3::unit_z());
        // Nearest is the sphere at z=4 (t=13).
        let hit = rs.hit(&ray, f32::INFINITY).unwrap();
        assert!((hit.t - 13.0).abs() < 1e-3);
        assert_eq!(hit.color, Color::new(0.0, 1.0, 0.0));
    }
}
