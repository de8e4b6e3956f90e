//! Connected-component extraction over the diff mask.
//!
//! Changed pixels are grouped with 8-connectivity, then components whose
//! bounding boxes sit within the proximity margin are merged, so one logical
//! change (say, a button plus its drop shadow) reports as one region.

use std::collections::HashMap;

use crate::analysis::differ::DiffMask;
use crate::config::DifferOptions;
use crate::types::PixelBox;

/// A merged component before kind inference.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRegion {
    pub bounds: PixelBox,
    pub pixel_count: u64,
    pub magnitude_sum: f32,
}

impl RawRegion {
    pub fn mean_magnitude(&self) -> f32 {
        if self.pixel_count == 0 {
            return 0.0;
        }
        self.magnitude_sum / self.pixel_count as f32
    }
}

/// Extracts change regions from the mask, ordered by (top, left).
pub fn extract_regions(mask: &DiffMask, options: &DifferOptions) -> Vec<RawRegion> {
    let components = connected_components(mask);
    let mut merged = merge_nearby(components, options.proximity_margin);
    merged.sort_by_key(|r| (r.bounds.y, r.bounds.x));
    merged
}

fn connected_components(mask: &DiffMask) -> Vec<RawRegion> {
    let w = mask.width() as usize;
    let h = mask.height() as usize;
    if w == 0 || h == 0 {
        return vec![];
    }

    let mut visited = vec![false; w * h];
    let mut stack: Vec<(usize, usize)> = Vec::new();
    let mut regions = Vec::new();

    for start_y in 0..h {
        for start_x in 0..w {
            let idx = start_y * w + start_x;
            if visited[idx] || !mask.is_changed(start_x as u32, start_y as u32) {
                continue;
            }

            visited[idx] = true;
            stack.push((start_x, start_y));
            let (mut min_x, mut max_x) = (start_x, start_x);
            let (mut min_y, mut max_y) = (start_y, start_y);
            let mut pixel_count = 0u64;
            let mut magnitude_sum = 0.0f32;

            while let Some((x, y)) = stack.pop() {
                pixel_count += 1;
                magnitude_sum += mask.magnitude(x as u32, y as u32);
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);

                let x0 = x.saturating_sub(1);
                let y0 = y.saturating_sub(1);
                let x1 = (x + 1).min(w - 1);
                let y1 = (y + 1).min(h - 1);
                for ny in y0..=y1 {
                    for nx in x0..=x1 {
                        let nidx = ny * w + nx;
                        if !visited[nidx] && mask.is_changed(nx as u32, ny as u32) {
                            visited[nidx] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }

            regions.push(RawRegion {
                bounds: PixelBox::new(
                    min_x as u32,
                    min_y as u32,
                    (max_x - min_x + 1) as u32,
                    (max_y - min_y + 1) as u32,
                ),
                pixel_count,
                magnitude_sum,
            });
        }
    }

    regions
}

/// Merges components whose boxes are within `margin` pixels of each other,
/// using union-find over pairwise box adjacency.
fn merge_nearby(regions: Vec<RawRegion>, margin: u32) -> Vec<RawRegion> {
    if regions.len() <= 1 {
        return regions;
    }

    let n = regions.len();
    let mut parent: Vec<usize> = (0..n).collect();
    let mut rank: Vec<usize> = vec![0; n];

    fn find(parent: &mut [usize], i: usize) -> usize {
        if parent[i] != i {
            parent[i] = find(parent, parent[i]);
        }
        parent[i]
    }

    fn union(parent: &mut [usize], rank: &mut [usize], i: usize, j: usize) {
        let pi = find(parent, i);
        let pj = find(parent, j);
        if pi == pj {
            return;
        }
        if rank[pi] < rank[pj] {
            parent[pi] = pj;
        } else if rank[pi] > rank[pj] {
            parent[pj] = pi;
        } else {
            parent[pj] = pi;
            rank[pi] += 1;
        }
    }

    fn boxes_adjacent(a: &PixelBox, b: &PixelBox, margin: u32) -> bool {
        let h_gap = if a.right() < b.x {
            b.x - a.right()
        } else if b.right() < a.x {
            a.x - b.right()
        } else {
            0
        };

        let v_gap = if a.bottom() < b.y {
            b.y - a.bottom()
        } else if b.bottom() < a.y {
            a.y - b.bottom()
        } else {
            0
        };

        h_gap <= margin && v_gap <= margin
    }

    for i in 0..n {
        for j in (i + 1)..n {
            if boxes_adjacent(&regions[i].bounds, &regions[j].bounds, margin) {
                union(&mut parent, &mut rank, i, j);
            }
        }
    }

    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(i);
    }

    groups
        .into_values()
        .map(|indices| {
            let mut bounds = regions[indices[0]].bounds;
            let mut pixel_count = 0u64;
            let mut magnitude_sum = 0.0f32;
            for &i in &indices {
                bounds = bounds.union(&regions[i].bounds);
                pixel_count += regions[i].pixel_count;
                magnitude_sum += regions[i].magnitude_sum;
            }
            RawRegion {
                bounds,
                pixel_count,
                magnitude_sum,
            }
        })
        .collect()
}
