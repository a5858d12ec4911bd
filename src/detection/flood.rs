//! Breadth-first grouping with index-addressed visited state

use crate::types::{Mask, Rect};
use bitvec::prelude::*;
use std::collections::VecDeque;

/// Group of sample points produced by [`cluster_points`]
#[derive(Debug, Clone)]
pub struct PointCluster {
    /// Indices into the input point slice
    pub members: Vec<usize>,
    /// Inclusive bounds of the member coordinates
    pub bounds: Rect,
}

impl PointCluster {
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of image borders the bounds come within `margin` pixels of
    #[must_use]
    pub fn borders_touched(&self, width: u32, height: u32, margin: u32) -> usize {
        let b = &self.bounds;
        [
            b.x <= margin,
            b.y <= margin,
            b.right() + margin >= width,
            b.bottom() + margin >= height,
        ]
        .iter()
        .filter(|&&touch| touch)
        .count()
    }
}

/// Distance-bounded clustering
///
/// A point joins a cluster when it lies within `radius` (Euclidean) of any
/// member already in it. Points are located through a dense index grid so
/// each expansion only scans the `(2r+1)^2` window around a member.
#[must_use]
pub fn cluster_points(points: &[(u32, u32)], width: u32, height: u32, radius: u32) -> Vec<PointCluster> {
    if points.is_empty() || width == 0 || height == 0 {
        return Vec::new();
    }

    let mut grid = vec![u32::MAX; width as usize * height as usize];
    for (i, &(x, y)) in points.iter().enumerate() {
        grid[y as usize * width as usize + x as usize] = i as u32;
    }

    let mut visited = bitvec![0; points.len()];
    let mut queue = VecDeque::new();
    let mut clusters = Vec::new();
    let r = i64::from(radius);
    let r2 = r * r;

    for seed in 0..points.len() {
        if visited.replace(seed, true) {
            continue;
        }

        let mut members = vec![seed];
        let (sx, sy) = points[seed];
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (sx, sy, sx, sy);
        queue.push_back(seed);

        while let Some(current) = queue.pop_front() {
            let (cx, cy) = (i64::from(points[current].0), i64::from(points[current].1));
            for dy in -r..=r {
                let ny = cy + dy;
                if ny < 0 || ny >= i64::from(height) {
                    continue;
                }
                for dx in -r..=r {
                    let nx = cx + dx;
                    if nx < 0 || nx >= i64::from(width) || dx * dx + dy * dy > r2 {
                        continue;
                    }
                    let slot = grid[ny as usize * width as usize + nx as usize];
                    if slot == u32::MAX {
                        continue;
                    }
                    let neighbor = slot as usize;
                    if visited.replace(neighbor, true) {
                        continue;
                    }
                    let (px, py) = points[neighbor];
                    min_x = min_x.min(px);
                    min_y = min_y.min(py);
                    max_x = max_x.max(px);
                    max_y = max_y.max(py);
                    members.push(neighbor);
                    queue.push_back(neighbor);
                }
            }
        }

        clusters.push(PointCluster {
            members,
            bounds: Rect::from_corners(min_x, min_y, max_x, max_y),
        });
    }

    clusters
}

/// Bounding boxes of the background components reachable from the image border
///
/// Flood-fills (4-connectivity) every pixel still at `Mask::BACKGROUND`
/// starting from each border pixel, one component per unvisited seed.
#[must_use]
pub fn border_background_regions(mask: &Mask) -> Vec<Rect> {
    let (width, height) = mask.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let w = width as usize;
    let data = mask.as_slice();
    let mut visited = bitvec![0; data.len()];
    let mut queue = VecDeque::new();
    let mut regions = Vec::new();

    let border_seeds = (0..width)
        .flat_map(|x| [(x, 0), (x, height - 1)])
        .chain((0..height).flat_map(|y| [(0, y), (width - 1, y)]));

    for (sx, sy) in border_seeds {
        let seed = sy as usize * w + sx as usize;
        if data[seed] != Mask::BACKGROUND || visited.replace(seed, true) {
            continue;
        }

        let (mut min_x, mut min_y, mut max_x, mut max_y) = (sx, sy, sx, sy);
        queue.push_back(seed);

        while let Some(idx) = queue.pop_front() {
            let x = (idx % w) as u32;
            let y = (idx / w) as u32;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);

            let mut visit = |n: usize| {
                if data[n] == Mask::BACKGROUND && !visited.replace(n, true) {
                    queue.push_back(n);
                }
            };
            if x > 0 {
                visit(idx - 1);
            }
            if x + 1 < width {
                visit(idx + 1);
            }
            if y > 0 {
                visit(idx - w);
            }
            if y + 1 < height {
                visit(idx + w);
            }
        }

        regions.push(Rect::from_corners(min_x, min_y, max_x, max_y));
    }

    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_radius_bridges_gaps() {
        // Two rows of points spaced by 2, plus a far-away singleton.
        let mut points: Vec<(u32, u32)> = (0..5).map(|i| (i * 2, 0)).collect();
        points.push((30, 30));

        let clusters = cluster_points(&points, 40, 40, 2);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].len(), 5);
        assert_eq!(clusters[0].bounds, Rect::new(0, 0, 9, 1));
        assert_eq!(clusters[1].bounds, Rect::new(30, 30, 1, 1));
    }

    #[test]
    fn test_radius_is_euclidean() {
        // (3,3) is sqrt(18) ~ 4.24 away from the origin.
        let points = vec![(0, 0), (3, 3)];
        assert_eq!(cluster_points(&points, 10, 10, 4).len(), 2);
        assert_eq!(cluster_points(&points, 10, 10, 5).len(), 1);
    }

    #[test]
    fn test_borders_touched() {
        let cluster = PointCluster {
            members: vec![0],
            bounds: Rect::new(0, 0, 10, 3),
        };
        assert_eq!(cluster.borders_touched(10, 10, 0), 3);
        assert_eq!(cluster.borders_touched(20, 20, 1), 2);
    }

    #[test]
    fn test_border_flood_skips_stamped_and_enclosed_pixels() {
        // A ring of foreground encloses a background hole in the middle.
        let mut mask = Mask::filled(9, 9, Mask::BACKGROUND);
        mask.fill_rect(Rect::new(2, 2, 5, 5), Mask::FOREGROUND);
        mask.set(4, 4, Mask::BACKGROUND);

        let regions = border_background_regions(&mask);
        assert_eq!(regions, vec![Rect::new(0, 0, 9, 9)]);
    }

    #[test]
    fn test_border_flood_separate_components() {
        // A vertical foreground wall splits the frame in two.
        let mut mask = Mask::filled(7, 3, Mask::BACKGROUND);
        mask.fill_rect(Rect::new(3, 0, 1, 3), Mask::FOREGROUND);

        let regions = border_background_regions(&mask);
        assert_eq!(regions.len(), 2);
        assert!(regions.contains(&Rect::new(0, 0, 3, 3)));
        assert!(regions.contains(&Rect::new(4, 0, 3, 3)));
    }

    #[test]
    fn test_fully_stamped_mask_has_no_background() {
        let mask = Mask::filled(4, 4, Mask::FOREGROUND);
        assert!(border_background_regions(&mask).is_empty());
    }
}
