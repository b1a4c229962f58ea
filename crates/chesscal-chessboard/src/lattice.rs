//! Integer lattice labelling of grid-graph components and canonical ordering.

use crate::gridgraph::GridGraph;
use chesscal_core::{Corner, PatternGeometry};
use nalgebra::Vector2;
use std::collections::{HashMap, VecDeque};

/// Lattice coordinates of one component, normalised so the minimum is (0, 0).
#[derive(Clone, Debug)]
pub struct LatticeComponent {
    /// `(node, i, j)` per member.
    pub cells: Vec<(usize, i32, i32)>,
    pub width: u32,
    pub height: u32,
}

impl LatticeComponent {
    /// `true` if every cell of the `width x height` rectangle is occupied.
    pub fn is_complete(&self) -> bool {
        self.cells.len() == self.width as usize * self.height as usize
    }

    /// `true` if this is a complete rectangle of the pattern's size, either way round.
    pub fn matches(&self, pattern: &PatternGeometry) -> bool {
        let dims = (self.width, self.height);
        self.is_complete()
            && (dims == (pattern.columns, pattern.rows) || dims == (pattern.rows, pattern.columns))
    }
}

/// BFS-label a component with integer coordinates.
///
/// Returns `None` if a node would receive two different coordinates or two
/// nodes the same coordinate; such a component is ambiguous.
pub fn assign_grid_coordinates(graph: &GridGraph, component: &[usize]) -> Option<LatticeComponent> {
    let start = *component.first()?;
    let mut coord_of: HashMap<usize, (i32, i32)> = HashMap::with_capacity(component.len());
    let mut node_at: HashMap<(i32, i32), usize> = HashMap::with_capacity(component.len());
    let mut queue = VecDeque::from([(start, 0i32, 0i32)]);
    coord_of.insert(start, (0, 0));
    node_at.insert((0, 0), start);

    while let Some((node, i, j)) = queue.pop_front() {
        for n in &graph.neighbors[node] {
            let (di, dj) = n.direction.step();
            let c = (i + di, j + dj);
            match coord_of.get(&n.index) {
                Some(&existing) if existing != c => return None,
                Some(_) => {}
                None => {
                    if node_at.insert(c, n.index).is_some() {
                        return None;
                    }
                    coord_of.insert(n.index, c);
                    queue.push_back((n.index, c.0, c.1));
                }
            }
        }
    }

    let min_i = coord_of.values().map(|c| c.0).min()?;
    let max_i = coord_of.values().map(|c| c.0).max()?;
    let min_j = coord_of.values().map(|c| c.1).min()?;
    let max_j = coord_of.values().map(|c| c.1).max()?;

    let mut cells: Vec<(usize, i32, i32)> = coord_of
        .into_iter()
        .map(|(node, (i, j))| (node, i - min_i, j - min_j))
        .collect();
    cells.sort_unstable_by_key(|&(_, i, j)| (j, i));

    Some(LatticeComponent {
        cells,
        width: (max_i - min_i + 1) as u32,
        height: (max_j - min_j + 1) as u32,
    })
}

/// The eight symmetries of the square lattice acting on `(i, j)` in a `w x h` box.
#[derive(Clone, Copy, Debug)]
struct Symmetry {
    transpose: bool,
    flip_i: bool,
    flip_j: bool,
}

impl Symmetry {
    fn all() -> impl Iterator<Item = Self> {
        (0..8).map(|k| Self {
            transpose: k & 4 != 0,
            flip_i: k & 2 != 0,
            flip_j: k & 1 != 0,
        })
    }

    /// Box size after the transform.
    fn dims(self, w: u32, h: u32) -> (u32, u32) {
        if self.transpose {
            (h, w)
        } else {
            (w, h)
        }
    }

    /// Map lattice `(i, j)` to pattern `(col, row)`.
    fn apply(self, i: i32, j: i32, w: u32, h: u32) -> (u32, u32) {
        let i = if self.flip_i { w as i32 - 1 - i } else { i };
        let j = if self.flip_j { h as i32 - 1 - j } else { j };
        if self.transpose {
            (j as u32, i as u32)
        } else {
            (i as u32, j as u32)
        }
    }
}

/// Mean image step between consecutive columns and between consecutive rows.
fn mean_steps(grid: &[Option<Vector2<f32>>], cols: usize, rows: usize) -> Option<(Vector2<f32>, Vector2<f32>)> {
    let at = |c: usize, r: usize| grid[r * cols + c];
    let mut col_dir = Vector2::zeros();
    let mut row_dir = Vector2::zeros();
    for r in 0..rows {
        for c in 0..cols {
            let p = at(c, r)?;
            if c + 1 < cols {
                col_dir += at(c + 1, r)? - p;
            }
            if r + 1 < rows {
                row_dir += at(c, r + 1)? - p;
            }
        }
    }
    Some((col_dir, row_dir))
}

/// Order a matching component's corners row-major to align with
/// [`PatternGeometry::object_points`].
///
/// Among the symmetries producing a `columns x rows` layout, only those with
/// `cross(col_dir, row_dir) > 0` in image coordinates (y down) are kept; of
/// those, the one whose column direction points most along +x wins.
pub fn canonical_order(
    component: &LatticeComponent,
    corners: &[Corner],
    pattern: &PatternGeometry,
) -> Option<Vec<usize>> {
    let cols = pattern.columns as usize;
    let rows = pattern.rows as usize;
    let (w, h) = (component.width, component.height);

    let mut best: Option<(f32, Vec<usize>)> = None;
    for sym in Symmetry::all() {
        if sym.dims(w, h) != (pattern.columns, pattern.rows) {
            continue;
        }
        let mut order = vec![usize::MAX; cols * rows];
        let mut grid = vec![None; cols * rows];
        for &(node, i, j) in &component.cells {
            let (c, r) = sym.apply(i, j, w, h);
            let k = r as usize * cols + c as usize;
            order[k] = node;
            grid[k] = Some(corners[node].as_vec2());
        }
        let Some((col_dir, row_dir)) = mean_steps(&grid, cols, rows) else {
            continue;
        };
        let cross = col_dir.x * row_dir.y - col_dir.y * row_dir.x;
        let norm = col_dir.norm();
        if cross <= 0.0 || norm <= 0.0 {
            continue;
        }
        let score = col_dir.x / norm;
        if best.as_ref().is_none_or(|(s, _)| score > *s) {
            best = Some((score, order));
        }
    }
    best.map(|(_, order)| order)
}
