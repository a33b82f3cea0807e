use crate::global_variables::*;

/// A solid shape in lattice coordinates.
///
/// Cell `(i, j)` covers `[i, i + 1) x [j, j + 1)`, so the mask samples a shape
/// at `(i + 0.5, j + 0.5)`.
pub trait Geometry: Sync {
    fn contains(&self, x: Float, y: Float) -> bool;
}

/// Simple polygon tested with the even-odd rule.
///
/// Polygons with fewer than three vertices contain nothing.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    pub vertices: Vec<[Float; 2]>,
}

impl Polygon {
    pub fn new(vertices: Vec<[Float; 2]>) -> Self {
        Self { vertices }
    }

    /// Triangular wing section pitched nose-up, scaled to the domain.
    pub fn wing(nx: usize, ny: usize) -> Self {
        let (lx, ly) = (nx as Float, ny as Float);
        Self::new(vec![
            [0.30 * lx, 0.52 * ly],
            [0.60 * lx, 0.44 * ly],
            [0.60 * lx, 0.50 * ly],
        ])
    }
}

impl Geometry for Polygon {
    fn contains(&self, x: Float, y: Float) -> bool {
        if self.vertices.len() < 3 {
            return false;
        }
        let mut inside = false;
        let mut previous = self.vertices[self.vertices.len() - 1];
        for &current in &self.vertices {
            let [xi, yi] = current;
            let [xj, yj] = previous;
            if (yi > y) != (yj > y) {
                let x_cross = xi + (y - yi) * (xj - xi) / (yj - yi);
                if x < x_cross {
                    inside = !inside;
                }
            }
            previous = current;
        }
        inside
    }
}

/// Axis-aligned rectangle, `min` inclusive and `max` exclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rectangle {
    pub min: [Float; 2],
    pub max: [Float; 2],
}

impl Geometry for Rectangle {
    fn contains(&self, x: Float, y: Float) -> bool {
        x >= self.min[0] && x < self.max[0] && y >= self.min[1] && y < self.max[1]
    }
}

/// No obstacle at all.
pub struct Empty;

impl Geometry for Empty {
    fn contains(&self, _x: Float, _y: Float) -> bool {
        false
    }
}
