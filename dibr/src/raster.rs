//! Triangle rasterizer: warps an input pixel grid, triangulated in a
//! fixed pattern, into an oversampled output buffer with correct
//! depth/quality ordering.
//!
//! The per-triangle shape heuristic weighs near-equilateral triangles
//! over sliver ones, and original-depth samples always win over
//! depth-prolongated ones at equal triangle priority.

use rayon::prelude::*;

use crate::camera::WrappingMethod;
use crate::view::{ColourPlane, MaskPlane, Plane, ScalarPlane, SynthesizedView, View};

/// A warped position per input pixel, in output-image coordinates
/// (already multiplied by the oversampling scale).
pub type WarpMap = Plane<(f32, f32)>;

#[derive(Clone, Copy)]
struct Vertex {
    u: f32,
    v: f32,
    depth: f32,
    colour: [f32; 3],
    original: bool,
}

/// Per-output-pixel running state the priority rule operates on. `None`
/// means "never written", equivalent to `invD' == 0` i.e. `D' = ∞`.
#[derive(Clone, Copy)]
struct Cell {
    colour: [f32; 3],
    inv_depth: f32,
    shape: f32,
    original: bool,
    written: bool,
}

impl Cell {
    const EMPTY: Cell = Cell {
        colour: [0.0, 0.0, 0.0],
        inv_depth: 0.0,
        shape: 0.0,
        original: false,
        written: false,
    };

    /// Foreground-vs-depth-prolongation priority plus a cubed-inverse-depth
    /// tie-break, applied as a commutative "does `other` beat me" merge so
    /// that parallel accumulation order never affects the result.
    fn absorb(&mut self, other: Cell) {
        if !other.written {
            return;
        }
        if !self.written {
            *self = other;
            return;
        }
        if self.original != other.original {
            if other.original {
                *self = other;
            }
            return;
        }
        let mine = self.inv_depth.powi(3) * self.shape;
        let theirs = other.inv_depth.powi(3) * other.shape;
        if mine < theirs {
            *self = other;
        }
    }
}

struct Accum {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl Accum {
    fn empty(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::EMPTY; width * height],
        }
    }

    #[inline]
    fn set_if_better(&mut self, x: i64, y: i64, cell: Cell) {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return;
        }
        let idx = y as usize * self.width + x as usize;
        self.cells[idx].absorb(cell);
    }

    fn merge(mut self, other: Accum) -> Accum {
        for (a, b) in self.cells.iter_mut().zip(other.cells.into_iter()) {
            a.absorb(b);
        }
        self
    }
}

/// Rasterizes one warped input view into an oversampled output buffer.
///
/// `oversample` is the precision scale `s`; `scale_sq` (`s²`, the ideal
/// squared edge length at this oversampling) is the `scale` term the shape
/// formula divides/multiplies squared side lengths by.
pub fn rasterize(
    input_colour: &ColourPlane,
    input_depth: &ScalarPlane,
    input_original_depth: Option<&MaskPlane>,
    warped: &WarpMap,
    output_width: usize,
    output_height: usize,
    oversample: f32,
    wrap: WrappingMethod,
) -> SynthesizedView {
    let w = input_colour.width();
    let h = input_colour.height();
    debug_assert_eq!(w, input_depth.width());
    debug_assert_eq!(h, input_depth.height());
    let scale_sq = oversample * oversample;

    let vertex_at = |col: usize, row: usize| -> Vertex {
        let d = input_depth.get(row, col);
        let (u, v) = warped.get(row, col);
        let original = input_original_depth.map(|m| m.get(row, col) != 0).unwrap_or(true);
        Vertex {
            u,
            v,
            depth: d,
            colour: input_colour.get(row, col),
            original,
        }
    };

    let is_valid_vertex = |vx: &Vertex| vx.depth > 0.0 && vx.u.is_finite() && vx.v.is_finite();

    // Emit (col0, row0, col1, row1, col2, row2) triples for every triangle in
    // the fixed triangulation pattern, including the wrap-around stitching
    // triangles when `wrap == Horizontal`.
    let mut triangle_indices: Vec<[(usize, usize); 3]> = Vec::with_capacity(2 * w * h);
    if h >= 2 && w >= 2 {
        for i in 0..h - 1 {
            for j in 0..w - 1 {
                triangle_indices.push([(j, i), (j + 1, i), (j, i + 1)]);
                triangle_indices.push([(j + 1, i + 1), (j, i + 1), (j + 1, i)]);
            }
            if wrap == WrappingMethod::Horizontal {
                triangle_indices.push([(w - 1, i), (0, i), (w - 1, i + 1)]);
                triangle_indices.push([(0, i + 1), (w - 1, i + 1), (0, i)]);
            }
        }
    }

    let accum = triangle_indices
        .par_iter()
        .fold(
            || Accum::empty(output_width, output_height),
            |mut acc, &[(c0, r0), (c1, r1), (c2, r2)]| {
                let a = vertex_at(c0, r0);
                let b = vertex_at(c1, r1);
                let c = vertex_at(c2, r2);
                if !(is_valid_vertex(&a) && is_valid_vertex(&b) && is_valid_vertex(&c)) {
                    return acc;
                }
                rasterize_triangle(&mut acc, a, b, c, scale_sq);
                acc
            },
        )
        .reduce(|| Accum::empty(output_width, output_height), Accum::merge);

    let mut colour = Plane::filled(output_width, output_height, [0.0f32; 3]);
    let mut depth = Plane::filled(output_width, output_height, f32::NAN);
    let mut quality = Plane::filled(output_width, output_height, 0.0f32);
    let mut validity = Plane::filled(output_width, output_height, 0.0f32);
    let mut original = Plane::filled(output_width, output_height, 0u8);

    for y in 0..output_height {
        for x in 0..output_width {
            let cell = accum.cells[y * output_width + x];
            if !cell.written {
                continue;
            }
            let d = 1.0 / cell.inv_depth;
            let q = cell.shape * cell.inv_depth * 100.0;
            colour.set(y, x, cell.colour);
            depth.set(y, x, d);
            quality.set(y, x, q);
            validity.set(y, x, q);
            original.set(y, x, cell.original as u8);
        }
    }

    SynthesizedView {
        view: View {
            colour,
            depth,
            quality,
            validity,
        },
        original_depth: original,
    }
}

/// `den = (By-Cy)(Ax-Cx) + (Cx-Bx)(Ay-Cy)`; triangle shape heuristic and
/// interior barycentric evaluation.
fn rasterize_triangle(acc: &mut Accum, a: Vertex, b: Vertex, c: Vertex, scale_sq: f32) {
    let (ax, ay) = (a.u, a.v);
    let (bx, by) = (b.u, b.v);
    let (cx, cy) = (c.u, c.v);

    let den = (by - cy) * (ax - cx) + (cx - bx) * (ay - cy);
    if den <= 0.0 {
        return; // back-facing after warp
    }

    let sq = |p: (f32, f32), q: (f32, f32)| (p.0 - q.0).powi(2) + (p.1 - q.1).powi(2);
    let mut sides = [sq((ax, ay), (bx, by)), sq((bx, by), (cx, cy)), sq((cx, cy), (ax, ay))];
    sides.sort_by(|x, y| x.partial_cmp(y).unwrap());
    let [s1, s2, s3] = sides;
    let _ = s1;

    let w = 2.0 * den / s2;
    let shape_base = w.min(1.0 / w) * (s3 / scale_sq).min(scale_sq / s3);
    if shape_base <= 0.0 {
        return;
    }
    let shape = shape_base.powf(1.0 / 8.0);
    let triangle_validity = 100.0 * shape;
    if triangle_validity <= 0.0 {
        return;
    }

    let all_original = a.original && b.original && c.original;

    let min_x = ax.min(bx).min(cx).floor().max(0.0) as i64;
    let max_x = ax.max(bx).max(cx).ceil() as i64;
    let min_y = ay.min(by).min(cy).floor().max(0.0) as i64;
    let max_y = ay.max(by).max(cy).ceil() as i64;

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let (px, py) = (x as f32, y as f32);
            let l_a = ((by - cy) * (px - cx) + (cx - bx) * (py - cy)) / den;
            let l_b = ((cy - ay) * (px - cx) + (ax - cx) * (py - cy)) / den;
            let l_c = 1.0 - l_a - l_b;

            if !(0.0..=1.0).contains(&l_a) || !(0.0..=1.0).contains(&l_b) || !(0.0..=1.0).contains(&l_c) {
                continue;
            }

            let colour = [
                l_a * a.colour[0] + l_b * b.colour[0] + l_c * c.colour[0],
                l_a * a.colour[1] + l_b * b.colour[1] + l_c * c.colour[1],
                l_a * a.colour[2] + l_b * b.colour[2] + l_c * c.colour[2],
            ];
            let d = l_a * a.depth + l_b * b.depth + l_c * c.depth;
            if !(d > 0.0) {
                continue;
            }

            acc.set_if_better(
                x,
                y,
                Cell {
                    colour,
                    inv_depth: 1.0 / d,
                    shape,
                    original: all_original,
                    written: true,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_view(w: usize, h: usize, depth: f32) -> (ColourPlane, ScalarPlane, WarpMap) {
        let colour = Plane::filled(w, h, [0.5f32, 0.5, 0.5]);
        let d = Plane::filled(w, h, depth);
        let mut warp = Plane::filled(w, h, (0.0f32, 0.0));
        for row in 0..h {
            for col in 0..w {
                warp.set(row, col, (col as f32 + 0.5, row as f32 + 0.5));
            }
        }
        (colour, d, warp)
    }

    #[test]
    fn identity_warp_reproduces_input() {
        let (colour, depth, warp) = flat_view(8, 8, 2.0);
        let out = rasterize(&colour, &depth, None, &warp, 8, 8, 1.0, WrappingMethod::None);
        // interior pixels should be written with the source colour
        assert!(out.view.quality.get(4, 4) > 0.0);
        let c = out.view.colour.get(4, 4);
        assert!((c[0] - 0.5).abs() < 1e-3);
    }

    #[test]
    fn triangle_with_invalid_vertex_is_discarded() {
        let (colour, mut depth, warp) = flat_view(3, 3, 1.0);
        depth.set(0, 0, -1.0); // invalidate one vertex
        let out = rasterize(&colour, &depth, None, &warp, 3, 3, 1.0, WrappingMethod::None);
        // the two triangles touching (0,0) must contribute nothing at (0,0)
        assert_eq!(out.view.quality.get(0, 0), 0.0);
    }
}
