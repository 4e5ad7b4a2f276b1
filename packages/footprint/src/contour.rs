//! Marching-squares extraction of the region `value >= level` on a grid.
//!
//! The grid is treated as surrounded by a one-cell border of zeros so every
//! contour closes. Segments are oriented with the enclosed region on their
//! left, so chained rings come out counter-clockwise for outer boundaries
//! and clockwise for holes.

use std::collections::BTreeMap;

use geo::{Area, Contains, Coord, LineString, MultiPolygon, Point, Polygon};

/// A regular grid of sampled values.
///
/// `values` is row-major: the value at column `i`, row `j` is
/// `values[j * xs.len() + i]`, located at `(xs[i], ys[j])`.
#[derive(Debug, Clone)]
pub struct Grid {
    /// Column x coordinates, strictly increasing and evenly spaced.
    pub xs: Vec<f64>,
    /// Row y coordinates, strictly increasing and evenly spaced.
    pub ys: Vec<f64>,
    /// Sampled values, `xs.len() * ys.len()` of them.
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Axis {
    Horizontal,
    Vertical,
}

/// Edge of the padded grid, identified by its lower/left node.
type EdgeKey = (usize, usize, Axis);

impl Grid {
    fn nx(&self) -> usize {
        self.xs.len()
    }

    fn ny(&self) -> usize {
        self.ys.len()
    }

    /// Value at padded node `(pi, pj)`; the border ring is zero.
    fn padded_value(&self, pi: usize, pj: usize) -> f64 {
        if pi == 0 || pj == 0 || pi > self.nx() || pj > self.ny() {
            0.0
        } else {
            self.values[(pj - 1) * self.nx() + (pi - 1)]
        }
    }

    fn padded_x(&self, pi: usize) -> f64 {
        axis_coord(&self.xs, pi)
    }

    fn padded_y(&self, pj: usize) -> f64 {
        axis_coord(&self.ys, pj)
    }

    /// Where the contour crosses `edge`, by linear interpolation.
    fn crossing(&self, (pi, pj, axis): EdgeKey, level: f64) -> Coord<f64> {
        let (qi, qj) = match axis {
            Axis::Horizontal => (pi + 1, pj),
            Axis::Vertical => (pi, pj + 1),
        };
        let va = self.padded_value(pi, pj);
        let vb = self.padded_value(qi, qj);
        let t = if (vb - va).abs() > f64::EPSILON * va.abs().max(vb.abs()) {
            ((level - va) / (vb - va)).clamp(0.0, 1.0)
        } else {
            0.5
        };
        let (xa, ya) = (self.padded_x(pi), self.padded_y(pj));
        let (xb, yb) = (self.padded_x(qi), self.padded_y(qj));
        Coord {
            x: xa + t * (xb - xa),
            y: ya + t * (yb - ya),
        }
    }
}

/// Coordinate of padded index `p` (index 0 and `len + 1` are the border).
fn axis_coord(axis: &[f64], p: usize) -> f64 {
    let n = axis.len();
    let step = if n > 1 { axis[1] - axis[0] } else { 1.0 };
    if p == 0 {
        axis[0] - step
    } else if p > n {
        axis[n - 1] + step
    } else {
        axis[p - 1]
    }
}

/// Extracts polygons covering `value >= level`.
///
/// `level` must be positive so the zero border is always outside.
#[must_use]
pub fn iso_region(grid: &Grid, level: f64) -> MultiPolygon<f64> {
    if grid.xs.is_empty() || grid.ys.is_empty() || level <= 0.0 {
        return MultiPolygon(vec![]);
    }

    let next = trace_segments(grid, level);
    let rings = chain_rings(grid, level, &next);
    assemble(rings)
}

/// Builds the `exit edge -> entry edge` map for every cell of the padded
/// grid.
fn trace_segments(grid: &Grid, level: f64) -> BTreeMap<EdgeKey, EdgeKey> {
    let inside = |pi: usize, pj: usize| grid.padded_value(pi, pj) >= level;
    let mut next = BTreeMap::new();

    // Padded grid has nx + 2 nodes per row, so nx + 1 cells.
    for pj in 0..=grid.ny() {
        for pi in 0..=grid.nx() {
            // Corners counter-clockwise from bottom-left, and the edge that
            // leaves each corner in the same direction.
            let corners = [(pi, pj), (pi + 1, pj), (pi + 1, pj + 1), (pi, pj + 1)];
            let edges: [EdgeKey; 4] = [
                (pi, pj, Axis::Horizontal),
                (pi + 1, pj, Axis::Vertical),
                (pi, pj + 1, Axis::Horizontal),
                (pi, pj, Axis::Vertical),
            ];
            let state = corners.map(|(i, j)| inside(i, j));

            // (edge, is_exit) in counter-clockwise order
            let mut crossings: Vec<(EdgeKey, bool)> = Vec::with_capacity(4);
            for k in 0..4 {
                let from = state[k];
                let to = state[(k + 1) % 4];
                if from != to {
                    crossings.push((edges[k], from));
                }
            }

            match crossings.len() {
                2 => {
                    let (exit, entry) = if crossings[0].1 {
                        (crossings[0].0, crossings[1].0)
                    } else {
                        (crossings[1].0, crossings[0].0)
                    };
                    next.insert(exit, entry);
                }
                4 => {
                    let centre = corners
                        .iter()
                        .map(|&(i, j)| grid.padded_value(i, j))
                        .sum::<f64>()
                        / 4.0;
                    let joined = centre >= level;
                    for k in 0..4 {
                        let (edge, is_exit) = crossings[k];
                        if is_exit {
                            let partner = if joined { (k + 1) % 4 } else { (k + 3) % 4 };
                            next.insert(edge, crossings[partner].0);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    next
}

fn chain_rings(
    grid: &Grid,
    level: f64,
    next: &BTreeMap<EdgeKey, EdgeKey>,
) -> Vec<LineString<f64>> {
    let mut visited = std::collections::BTreeSet::new();
    let mut rings = Vec::new();

    for &start in next.keys() {
        if visited.contains(&start) {
            continue;
        }
        let mut coords = Vec::new();
        let mut edge = start;
        loop {
            if !visited.insert(edge) {
                break;
            }
            coords.push(grid.crossing(edge, level));
            match next.get(&edge) {
                Some(&following) => edge = following,
                None => break,
            }
        }
        if coords.len() >= 3 {
            let mut ring = LineString::new(coords);
            ring.close();
            rings.push(ring);
        }
    }

    rings
}

/// Outer rings (counter-clockwise) become polygons; each hole is attached
/// to the smallest outer ring that contains it.
fn assemble(rings: Vec<LineString<f64>>) -> MultiPolygon<f64> {
    let mut outers: Vec<(Polygon<f64>, f64)> = Vec::new();
    let mut holes = Vec::new();

    for ring in rings {
        let signed = Polygon::new(ring.clone(), vec![]).signed_area();
        if signed > 0.0 {
            outers.push((Polygon::new(ring, vec![]), signed));
        } else if signed < 0.0 {
            holes.push(ring);
        }
    }

    let mut interiors: Vec<Vec<LineString<f64>>> = vec![Vec::new(); outers.len()];
    for hole in holes {
        let inside = Point(hole.0[0]);
        let owner = outers
            .iter()
            .enumerate()
            .filter(|(_, (outer, _))| outer.contains(&inside))
            .min_by(|(_, (_, a)), (_, (_, b))| a.total_cmp(b))
            .map(|(idx, _)| idx);
        if let Some(idx) = owner {
            interiors[idx].push(hole);
        } else {
            log::debug!("Dropping contour hole with no enclosing ring");
        }
    }

    MultiPolygon(
        outers
            .into_iter()
            .zip(interiors)
            .map(|((outer, _), interiors)| Polygon::new(outer.exterior().clone(), interiors))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(nx: usize, ny: usize, f: impl Fn(usize, usize) -> f64) -> Grid {
        let mut values = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            for i in 0..nx {
                values.push(f(i, j));
            }
        }
        #[allow(clippy::cast_precision_loss)]
        Grid {
            xs: (0..nx).map(|i| i as f64).collect(),
            ys: (0..ny).map(|j| j as f64).collect(),
            values,
        }
    }

    #[test]
    fn plateau_yields_one_counter_clockwise_polygon() {
        let g = grid(5, 5, |i, j| {
            if (1..=3).contains(&i) && (1..=3).contains(&j) {
                1.0
            } else {
                0.0
            }
        });
        let region = iso_region(&g, 0.5);
        assert_eq!(region.0.len(), 1);
        assert!(region.0[0].interiors().is_empty());
        assert!(region.0[0].signed_area() > 0.0);
        // [0.5, 3.5]^2 with the four corner triangles cut off
        assert!((region.unsigned_area() - 8.5).abs() < 1e-9);
    }

    #[test]
    fn dip_inside_plateau_becomes_a_hole() {
        let g = grid(7, 7, |i, j| {
            let on_plateau = (1..=5).contains(&i) && (1..=5).contains(&j);
            if on_plateau && !(i == 3 && j == 3) {
                1.0
            } else {
                0.0
            }
        });
        let region = iso_region(&g, 0.5);
        assert_eq!(region.0.len(), 1);
        assert_eq!(region.0[0].interiors().len(), 1);
        assert!((region.unsigned_area() - 24.0).abs() < 1e-9);
    }

    #[test]
    fn saddle_resolved_by_centre_value() {
        let g = grid(4, 4, |i, j| if (i, j) == (1, 1) || (i, j) == (2, 2) { 1.0 } else { 0.0 });
        // Centre of the shared cell averages to 0.5
        assert_eq!(iso_region(&g, 0.4).0.len(), 1);
        assert_eq!(iso_region(&g, 0.6).0.len(), 2);
    }

    #[test]
    fn values_on_the_grid_edge_still_close() {
        let g = grid(3, 3, |_, _| 1.0);
        let region = iso_region(&g, 0.5);
        assert_eq!(region.0.len(), 1);
        assert!(region.unsigned_area() > 4.0);
    }

    #[test]
    fn nothing_above_level_is_empty() {
        let g = grid(4, 4, |_, _| 0.1);
        assert!(iso_region(&g, 0.5).0.is_empty());
    }
}
