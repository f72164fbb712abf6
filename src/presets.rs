use crate::adapter::{camera_for_viewport, scene_from_elements, ParsedElement};
use crate::camera::OrthographicCamera;
use crate::math::*;
use crate::scene::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// A complete page description bundling the scene, camera, and canvas
/// dimensions. Presets let the CLI render showcase pages without a DOM
/// parser in front.
pub struct PageDescription {
    pub name: &'static str,
    pub scene: Scene,
    pub camera: OrthographicCamera,
    pub content_w: u32,
    pub content_h: u32,
    pub viewport_w: u32,
    pub viewport_h: u32,
}

/// Available built-in page presets.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum PagePreset {
    /// A header bar over a grid of rounded cards with soft shadows.
    Cards,
    /// A hero banner with a glass overlay panel, a pill button, and a
    /// floating sphere ornament.
    Hero,
    /// A stress layout of many random tiles to exercise the accelerator.
    Stress,
}

impl PagePreset {
    pub fn build(self) -> PageDescription {
        match self {
            PagePreset::Cards => build_cards(),
            PagePreset::Hero => build_hero(),
            PagePreset::Stress => build_stress(),
        }
    }
}

const PAGE_BG: Color = Color::new(0.07, 0.07, 0.11);

fn page_lights(scene: &mut Scene, shadow_blur: f32) {
    scene
        .lights
        .push(Light::Ambient(AmbientLight::new(Color::ones(), 0.55)));
    scene.lights.push(Light::Directional(DirectionalLight::new(
        Vec3::new(0.35, -0.45, 1.0),
        Color::new(1.0, 0.97, 0.9),
        0.6,
    )));
    scene.shadow_blur = Some(shadow_blur);
}

fn build_cards() -> PageDescription {
    let (vw, vh) = (320.0, 240.0);
    let mut elements = vec![
        // Header bar.
        ParsedElement::new(0.0, 0.0, vw, 40.0, Color::new(0.16, 0.18, 0.30), 1),
        // Accent stripe inside the header.
        ParsedElement::new(12.0, 14.0, 80.0, 12.0, Color::new(0.95, 0.55, 0.20), 2)
            .with_radius(4.0),
    ];

    let palette = [
        Color::new(0.82, 0.30, 0.32),
        Color::new(0.30, 0.68, 0.45),
        Color::new(0.30, 0.45, 0.80),
        Color::new(0.80, 0.70, 0.30),
        Color::new(0.58, 0.36, 0.72),
        Color::new(0.30, 0.66, 0.70),
    ];
    for (i, color) in palette.iter().enumerate() {
        let col = (i % 3) as f32;
        let row = (i / 3) as f32;
        elements.push(
            ParsedElement::new(
                16.0 + col * 100.0,
                60.0 + row * 100.0,
                88.0,
                84.0,
                *color,
                2,
            )
            .with_radius(8.0),
        );
    }

    let mut scene = scene_from_elements(&elements, vw, vh, PAGE_BG);
    page_lights(&mut scene, 2.0);

    PageDescription {
        name: "cards",
        scene,
        camera: camera_for_viewport(vw, vh),
        content_w: vw as u32,
        content_h: 280,
        viewport_w: vw as u32,
        viewport_h: vh as u32,
    }
}

fn build_hero() -> PageDescription {
    let (vw, vh) = (320.0, 240.0);
    let elements = vec![
        ParsedElement::new(0.0, 0.0, vw, 140.0, Color::new(0.20, 0.26, 0.52), 1),
        // A frosted panel floating over the banner.
        ParsedElement::new(40.0, 40.0, 160.0, 70.0, Color::new(0.9, 0.92, 0.98), 3)
            .with_radius(10.0)
            .with_opacity(0.15),
        ParsedElement::new(0.0, 150.0, vw, 90.0, Color::new(0.13, 0.13, 0.18), 1),
    ];
    let mut scene = scene_from_elements(&elements, vw, vh, PAGE_BG);

    // Decorations the parser cannot express: a pill button and a glass
    // sphere ornament.
    scene.objects.push(Primitive::new(
        Geometry::Capsule(CapsuleGeometry {
            a: Point3::new(-40.0, -60.0, 3.0),
            b: Point3::new(20.0, -60.0, 3.0),
            radius: 10.0,
        }),
        Color::new(0.95, 0.45, 0.30),
    ));
    scene.objects.push(
        Primitive::new(
            Geometry::Sphere(SphereGeometry {
                center: Point3::new(100.0, 40.0, 2.0),
                radius: 24.0,
            }),
            Color::new(0.85, 0.9, 1.0),
        )
        .with_alpha(0.12)
        .with_ior(1.5),
    );
    page_lights(&mut scene, 1.5);

    PageDescription {
        name: "hero",
        scene,
        camera: camera_for_viewport(vw, vh),
        content_w: vw as u32,
        content_h: vh as u32,
        viewport_w: vw as u32,
        viewport_h: vh as u32,
    }
}

fn build_stress() -> PageDescription {
    let (vw, vh) = (320.0, 240.0);
    let content_h = 720.0;
    let mut rng = SmallRng::seed_from_u64(0x9a6e);

    let mut elements = Vec::new();
    for row in 0..12 {
        for col in 0..8 {
            // Jittered tile grid with occasional gaps, like a dense feed.
            if rng.gen::<f32>() < 0.12 {
                continue;
            }
            let x = col as f32 * 40.0 + rng.gen_range(2.0..6.0);
            let y = row as f32 * 60.0 + rng.gen_range(2.0..8.0);
            let color = Color::new(
                rng.gen_range(0.2..0.9),
                rng.gen_range(0.2..0.9),
                rng.gen_range(0.2..0.9),
            );
            let mut e = ParsedElement::new(
                x,
                y,
                rng.gen_range(26.0..34.0),
                rng.gen_range(40.0..52.0),
                color,
                rng.gen_range(1..4),
            );
            if rng.gen::<f32>() < 0.5 {
                e = e.with_radius(rng.gen_range(2.0..6.0));
            }
            elements.push(e);
        }
    }

    // Elements keep viewport-space coordinates even below the fold; the
    // tile renderer re-frames the camera over the full content canvas.
    let mut scene = scene_from_elements(&elements, vw, vh, PAGE_BG);
    page_lights(&mut scene, 0.0);

    PageDescription {
        name: "stress",
        scene,
        camera: camera_for_viewport(vw, vh),
        content_w: vw as u32,
        content_h: content_h as u32,
        viewport_w: vw as u32,
        viewport_h: vh as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;

    #[test]
    fn every_preset_builds_a_non_empty_scene() {
        for preset in [PagePreset::Cards, PagePreset::Hero, PagePreset::Stress] {
            let page = preset.build();
            assert!(!page.scene.objects.is_empty(), "{} is empty", page.name);
            assert!(page.content_h >= page.viewport_h);
            let rs = compile(&page.scene, Some(&page.camera));
            assert!(rs.object_count() > 0);
        }
    }

    #[test]
    fn stress_preset_exceeds_the_accelerator_threshold() {
        let page = PagePreset::Stress.build();
        let rs = compile(&page.scene, None);
        assert!(rs.boxes.len() >= 16);
        assert!(rs.accelerator.is_some());
    }

    #[test]
    fn hero_preset_carries_glass_and_a_capsule() {
        let page = PagePreset::Hero.build();
        let has_glass = page
            .scene
            .objects
            .iter()
            .any(|p| p.ior > 1.0 && p.alpha < 1.0);
        let has_capsule = page
            .scene
            .objects
            .iter()
            .any(|p| matches!(p.geometry, Geometry::Capsule(_)));
        assert!(has_glass && has_capsule);
    }
}
