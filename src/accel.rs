use crate::intersect::{intersect, Hit};
use crate::math::*;
use crate::scene::Primitive;

/// Bounded traversal stack. Median splits keep the tree balanced, so the
/// live path never approaches this for any realistic primitive count.
const MAX_STACK: usize = 32;

// ─── Bounding Volume Hierarchy ──────────────────────────────────────────────

/// One node of the flattened BVH. Leaves hold exactly one object index;
/// interior nodes reference both children.
#[derive(Debug, Clone, Copy)]
struct BvhNode {
    aabb: Aabb,
    left: u32,
    right: u32,
    /// Index into the object array for leaves, -1 for interior nodes.
    object: i32,
}

/// A binary BVH over object bounds, stored as a flat node array and
/// traversed iteratively. Built top-down by splitting the node's objects
/// at the centroid median of its longest axis.
#[derive(Debug, Clone)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    root: u32,
}

impl Bvh {
    /// Builds over `(bounds, object index)` pairs. Returns `None` for an
    /// empty set.
    pub fn build(items: &[(Aabb, u32)]) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        let mut scratch: Vec<(Aabb, Point3, u32)> = items
            .iter()
            .map(|&(aabb, index)| (aabb, aabb.center(), index))
            .collect();
        let mut nodes = Vec::with_capacity(2 * items.len());
        let root = Self::build_node(&mut scratch, &mut nodes);
        Some(Self { nodes, root })
    }

    fn build_node(items: &mut [(Aabb, Point3, u32)], nodes: &mut Vec<BvhNode>) -> u32 {
        if items.len() == 1 {
            let (aabb, _, index) = items[0];
            nodes.push(BvhNode {
                aabb,
                left: 0,
                right: 0,
                object: index as i32,
            });
            return (nodes.len() - 1) as u32;
        }

        let centroid_bounds = Aabb::from_points(items.iter().map(|&(_, c, _)| c));
        let axis = centroid_bounds.longest_axis();
        let mid = items.len() / 2;
        items.select_nth_unstable_by(mid, |a, b| {
            a.1[axis]
                .partial_cmp(&b.1[axis])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let (lo, hi) = items.split_at_mut(mid);
        let left = Self::build_node(lo, nodes);
        let right = Self::build_node(hi, nodes);
        let aabb = Aabb::surrounding(&nodes[left as usize].aabb, &nodes[right as usize].aabb);
        nodes.push(BvhNode {
            aabb,
            left,
            right,
            object: -1,
        });
        (nodes.len() - 1) as u32
    }

    /// Nearest primary hit among the indexed objects. Children are pushed
    /// farther-first so the nearer subtree is visited first, and subtrees
    /// whose entry parameter exceeds the current best are skipped by
    /// clipping the slab interval to `best_t`.
    pub fn intersect(&self, objects: &[Primitive], ray: &Ray, t_max: f32) -> Option<Hit> {
        let mut best: Option<Hit> = None;
        let mut best_t = t_max;

        let mut stack = [0u32; MAX_STACK];
        let mut sp = 0usize;
        if self.nodes[self.root as usize]
            .aabb
            .hit(ray, 0.0, best_t)
            .is_some()
        {
            stack[sp] = self.root;
            sp += 1;
        }

        while sp > 0 {
            sp -= 1;
            let node = self.nodes[stack[sp] as usize];

            if node.object >= 0 {
                if let Some(hit) = intersect(&objects[node.object as usize], ray, best_t) {
                    best_t = hit.t;
                    best = Some(hit);
                }
                continue;
            }

            let l = self.nodes[node.left as usize].aabb.hit(ray, 0.0, best_t);
            let r = self.nodes[node.right as usize].aabb.hit(ray, 0.0, best_t);
            let mut push = |index: u32, sp: &mut usize| {
                if *sp < MAX_STACK {
                    stack[*sp] = index;
                    *sp += 1;
                }
            };
            match (l, r) {
                (Some((tl, _)), Some((tr, _))) => {
                    if tl < tr {
                        push(node.right, &mut sp);
                        push(node.left, &mut sp);
                    } else {
                        push(node.left, &mut sp);
                        push(node.right, &mut sp);
                    }
                }
                (Some(_), None) => push(node.left, &mut sp),
                (None, Some(_)) => push(node.right, &mut sp),
                (None, None) => {}
            }
        }
        best
    }

    /// Any-hit query for shadow rays: visits subtrees in arbitrary order
    /// and returns on the first positive-t intersection.
    pub fn occluded(&self, objects: &[Primitive], ray: &Ray) -> bool {
        let mut stack = [0u32; MAX_STACK];
        let mut sp = 0usize;
        if self.nodes[self.root as usize]
            .aabb
            .hit(ray, 0.0, f32::INFINITY)
            .is_some()
        {
            stack[sp] = self.root;
            sp += 1;
        }

        while sp > 0 {
            sp -= 1;
            let node = self.nodes[stack[sp] as usize];

            if node.object >= 0 {
                if intersect(&objects[node.object as usize], ray, f32::INFINITY).is_some() {
                    return true;
                }
                continue;
            }

            for child in [node.left, node.right] {
                if self.nodes[child as usize]
                    .aabb
                    .hit(ray, 0.0, f32::INFINITY)
                    .is_some()
                    && sp < MAX_STACK
                {
                    stack[sp] = child;
                    sp += 1;
                }
            }
        }
        false
    }
}

// ─── 2D Uniform Grid ────────────────────────────────────────────────────────

/// A uniform grid over the xy extents of the indexed boxes, for page
/// layouts where every box is axis-aligned and shallow in z. Each cell
/// stores a `(start, count)` slice into a flat index array holding every
/// box whose bounds overlap the cell; rays walk cells with a 2D DDA.
#[derive(Debug, Clone)]
pub struct UniformGrid2d {
    bounds: Aabb,
    cells_x: usize,
    cells_y: usize,
    cell_w: f32,
    cell_h: f32,
    cell_starts: Vec<u32>,
    indices: Vec<u32>,
}

impl UniformGrid2d {
    /// Builds over `(bounds, object index)` pairs. Cell counts are chosen
    /// so the expected occupancy per cell is about √N.
    pub fn build(items: &[(Aabb, u32)]) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        let bounds = items
            .iter()
            .fold(Aabb::empty(), |acc, (aabb, _)| Aabb::surrounding(&acc, aabb));

        let n = items.len() as f32;
        let target_cells = n.sqrt().ceil().max(1.0);
        let width = (bounds.max.x - bounds.min.x).max(1e-3);
        let height = (bounds.max.y - bounds.min.y).max(1e-3);
        let aspect = width / height;
        let cells_x = (target_cells * aspect).sqrt().round().max(1.0) as usize;
        let cells_y = ((target_cells / cells_x as f32).round().max(1.0)) as usize;
        let cell_w = width / cells_x as f32;
        let cell_h = height / cells_y as f32;

        let cell_of = |aabb: &Aabb| -> (usize, usize, usize, usize) {
            let x0 = (((aabb.min.x - bounds.min.x) / cell_w) as usize).min(cells_x - 1);
            let x1 = (((aabb.max.x - bounds.min.x) / cell_w) as usize).min(cells_x - 1);
            let y0 = (((aabb.min.y - bounds.min.y) / cell_h) as usize).min(cells_y - 1);
            let y1 = (((aabb.max.y - bounds.min.y) / cell_h) as usize).min(cells_y - 1);
            (x0, x1, y0, y1)
        };

        // CSR layout in two passes: count, then fill.
        let cell_count = cells_x * cells_y;
        let mut counts = vec![0u32; cell_count];
        for (aabb, _) in items {
            let (x0, x1, y0, y1) = cell_of(aabb);
            for y in y0..=y1 {
                for x in x0..=x1 {
                    counts[y * cells_x + x] += 1;
                }
            }
        }
        let mut cell_starts = vec![0u32; cell_count + 1];
        for i in 0..cell_count {
            cell_starts[i + 1] = cell_starts[i] + counts[i];
        }
        let mut cursors = cell_starts[..cell_count].to_vec();
        let mut indices = vec![0u32; cell_starts[cell_count] as usize];
        for (aabb, index) in items {
            let (x0, x1, y0, y1) = cell_of(aabb);
            for y in y0..=y1 {
                for x in x0..=x1 {
                    let cell = y * cells_x + x;
                    indices[cursors[cell] as usize] = *index;
                    cursors[cell] += 1;
                }
            }
        }

        Some(Self {
            bounds,
            cells_x,
            cells_y,
            cell_w,
            cell_h,
            cell_starts,
            indices,
        })
    }

    fn cell_objects(&self, x: usize, y: usize) -> &[u32] {
        let cell = y * self.cells_x + x;
        let start = self.cell_starts[cell] as usize;
        let end = self.cell_starts[cell + 1] as usize;
        &self.indices[start..end]
    }

    /// Walks the cells the ray's xy projection passes through and runs
    /// `visit` on each; `visit` returns `true` to stop the walk early.
    fn walk(&self, ray: &Ray, mut visit: impl FnMut(&[u32]) -> bool) {
        // Clip the ray against the grid's xy slabs only; z is handled by
        // the per-object kernels.
        let mut t0 = 0.0f32;
        let mut t1 = f32::INFINITY;
        for axis in 0..2 {
            let inv = safe_recip(ray.direction[axis]);
            let mut a = (self.bounds.min[axis] - ray.origin[axis]) * inv;
            let mut b = (self.bounds.max[axis] - ray.origin[axis]) * inv;
            if inv < 0.0 {
                std::mem::swap(&mut a, &mut b);
            }
            t0 = t0.max(a);
            t1 = t1.min(b);
            if t1 < t0 {
                return;
            }
        }

        let entry = ray.at(t0);
        let mut cx = (((entry.x - self.bounds.min.x) / self.cell_w) as isize)
            .clamp(0, self.cells_x as isize - 1);
        let mut cy = (((entry.y - self.bounds.min.y) / self.cell_h) as isize)
            .clamp(0, self.cells_y as isize - 1);

        let step_x: isize = if ray.direction.x > 0.0 { 1 } else { -1 };
        let step_y: isize = if ray.direction.y > 0.0 { 1 } else { -1 };
        let t_delta_x = (self.cell_w * safe_recip(ray.direction.x)).abs();
        let t_delta_y = (self.cell_h * safe_recip(ray.direction.y)).abs();

        let next_boundary = |cell: isize, step: isize, min: f32, size: f32| -> f32 {
            let edge = if step > 0 { cell + 1 } else { cell };
            min + edge as f32 * size
        };
        let mut t_max_x = (next_boundary(cx, step_x, self.bounds.min.x, self.cell_w)
            - ray.origin.x)
            * safe_recip(ray.direction.x);
        let mut t_max_y = (next_boundary(cy, step_y, self.bounds.min.y, self.cell_h)
            - ray.origin.y)
            * safe_recip(ray.direction.y);
        if !t_max_x.is_finite() {
            t_max_x = f32::INFINITY;
        }
        if !t_max_y.is_finite() {
            t_max_y = f32::INFINITY;
        }

        loop {
            if visit(self.cell_objects(cx as usize, cy as usize)) {
                return;
            }
            if t_max_x < t_max_y {
                if t_max_x > t1 {
                    return;
                }
                cx += step_x;
                if cx < 0 || cx >= self.cells_x as isize {
                    return;
                }
                t_max_x += t_delta_x;
            } else {
                if t_max_y > t1 {
                    return;
                }
                cy += step_y;
                if cy < 0 || cy >= self.cells_y as isize {
                    return;
                }
                t_max_y += t_delta_y;
            }
        }
    }

    pub fn intersect(&self, objects: &[Primitive], ray: &Ray, t_max: f32) -> Option<Hit> {
        let mut best: Option<Hit> = None;
        let mut best_t = t_max;
        self.walk(ray, |candidates| {
            for &index in candidates {
                if let Some(hit) = intersect(&objects[index as usize], ray, best_t) {
                    best_t = hit.t;
                    best = Some(hit);
                }
            }
            false
        });
        best
    }

    pub fn occluded(&self, objects: &[Primitive], ray: &Ray) -> bool {
        let mut hit = false;
        self.walk(ray, |candidates| {
            for &index in candidates {
                if intersect(&objects[index as usize], ray, f32::INFINITY).is_some() {
                    hit = true;
                    return true;
                }
            }
            false
        });
        hit
    }
}

// ─── Accelerator choice ─────────────────────────────────────────────────────

/// The spatial accelerator built over the scene's boxes. The BVH is the
/// general default; shallow page layouts where every box is axis-aligned
/// use the 2D grid instead.
#[derive(Debug, Clone)]
pub enum Accelerator {
    Bvh(Bvh),
    Grid(UniformGrid2d),
}

impl Accelerator {
    /// `items` pairs each box's world AABB with its index into the box
    /// array; `all_axis_aligned` selects the grid.
    pub fn build(items: &[(Aabb, u32)], all_axis_aligned: bool) -> Option<Self> {
        if all_axis_aligned {
            UniformGrid2d::build(items).map(Accelerator::Grid)
        } else {
            Bvh::build(items).map(Accelerator::Bvh)
        }
    }

    pub fn intersect(&self, objects: &[Primitive], ray: &Ray, t_max: f32) -> Option<Hit> {
        match self {
            Accelerator::Bvh(bvh) => bvh.intersect(objects, ray, t_max),
            Accelerator::Grid(grid) => grid.intersect(objects, ray, t_max),
        }
    }

    pub fn occluded(&self, objects: &[Primitive], ray: &Ray) -> bool {
        match self {
            Accelerator::Bvh(bvh) => bvh.occluded(objects, ray),
            Accelerator::Grid(grid) => grid.occluded(objects, ray),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{BoxGeometry, Geometry};
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn random_boxes(count: usize, seed: u64) -> Vec<Primitive> {
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                let center = Point3::new(
                    rng.gen_range(-50.0..50.0),
                    rng.gen_range(-50.0..50.0),
                    rng.gen_range(0.0..20.0),
                );
                let size = Vec3::new(
                    rng.gen_range(0.5..8.0),
                    rng.gen_range(0.5..8.0),
                    rng.gen_range(0.5..4.0),
                );
                Primitive::new(Geometry::Box(BoxGeometry::new(center, size)), Color::ones())
            })
            .collect()
    }

    fn items_of(boxes: &[Primitive]) -> Vec<(Aabb, u32)> {
        boxes
            .iter()
            .enumerate()
            .map(|(i, p)| (p.geometry.aabb().unwrap(), i as u32))
            .collect()
    }

    fn linear_best(boxes: &[Primitive], ray: &Ray) -> Option<f32> {
        boxes
            .iter()
            .filter_map(|p| crate::intersect::intersect(p, ray, f32::INFINITY))
            .map(|h| h.t)
            .min_by(|a, b| a.partial_cmp(b).unwrap())
    }

    fn test_rays(seed: u64) -> Vec<Ray> {
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..200)
            .map(|_| {
                let origin = Point3::new(
                    rng.gen_range(-80.0..80.0),
                    rng.gen_range(-80.0..80.0),
                    rng.gen_range(-30.0..-10.0),
                );
                let direction = Vec3::new(
                    rng.gen_range(-0.4..0.4),
                    rng.gen_range(-0.4..0.4),
                    1.0,
                )
                .normalized();
                Ray::new(origin, direction)
            })
            .collect()
    }

    #[test]
    fn bvh_matches_linear_scan() {
        let boxes = random_boxes(60, 7);
        let bvh = Bvh::build(&items_of(&boxes)).unwrap();
        for ray in test_rays(11) {
            let expected = linear_best(&boxes, &ray);
            let got = bvh.intersect(&boxes, &ray, f32::INFINITY).map(|h| h.t);
            match (expected, got) {
                (None, None) => {}
                (Some(a), Some(b)) => assert!((a - b).abs() < 1e-3, "t mismatch: {a} vs {b}"),
                other => panic!("hit/miss disagreement: {other:?}"),
            }
        }
    }

    #[test]
    fn grid_matches_linear_scan() {
        let boxes = random_boxes(60, 13);
        let grid = UniformGrid2d::build(&items_of(&boxes)).unwrap();
        for ray in test_rays(17) {
            let expected = linear_best(&boxes, &ray);
            let got = grid.intersect(&boxes, &ray, f32::INFINITY).map(|h| h.t);
            match (expected, got) {
                (None, None) => {}
                (Some(a), Some(b)) => assert!((a - b).abs() < 1e-3, "t mismatch: {a} vs {b}"),
                other => panic!("hit/miss disagreement: {other:?}"),
            }
        }
    }

    #[test]
    fn shadow_queries_agree_with_linear_scan() {
        let boxes = random_boxes(40, 23);
        let bvh = Bvh::build(&items_of(&boxes)).unwrap();
        let grid = UniformGrid2d::build(&items_of(&boxes)).unwrap();
        for ray in test_rays(29) {
            let expected = linear_best(&boxes, &ray).is_some();
            assert_eq!(bvh.occluded(&boxes, &ray), expected);
            assert_eq!(grid.occluded(&boxes, &ray), expected);
        }
    }

    #[test]
    fn single_box_builds_a_leaf() {
        let boxes = random_boxes(1, 31);
        let bvh = Bvh::build(&items_of(&boxes)).unwrap();
        let aabb = boxes[0].geometry.aabb().unwrap();
        let ray = Ray::new(
            Point3::new(aabb.center().x, aabb.center().y, -100.0),
            Vec3::unit_z(),
        );
        assert!(bvh.intersect(&boxes, &ray, f32::INFINITY).is_some());
    }

    #[test]
    fn empty_input_builds_nothing() {
        assert!(Bvh::build(&[]).is_none());
        assert!(UniformGrid2d::build(&[]).is_none());
        assert!(Accelerator::build(&[], true).is_none());
    }

    #[test]
    fn accelerator_picks_grid_for_axis_aligned() {
        let boxes = random_boxes(20, 37);
        let accel = Accelerator::build(&items_of(&boxes), true).unwrap();
        assert!(matches!(accel, Accelerator::Grid(_)));
        let accel = Accelerator::build(&items_of(&boxes), false).unwrap();
        assert!(matches!(accel, Accelerator::Bvh(_)));
    }
}
