use crate::params::GridGraphParams;
use chesscal_core::Corner;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    Right,
    Left,
    Up,
    Down,
}

impl NeighborDirection {
    pub fn opposite(self) -> Self {
        match self {
            Self::Right => Self::Left,
            Self::Left => Self::Right,
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }

    /// Lattice step `(di, dj)` along this direction.
    pub fn step(self) -> (i32, i32) {
        match self {
            Self::Right => (1, 0),
            Self::Left => (-1, 0),
            Self::Up => (0, -1),
            Self::Down => (0, 1),
        }
    }

    fn slot(self) -> usize {
        match self {
            Self::Right => 0,
            Self::Left => 1,
            Self::Up => 2,
            Self::Down => 3,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
    pub score: f32,
}

/// Global image-space grid axes derived from the two diagonal cluster centres.
///
/// `u` and `v` are only used to name link directions consistently across the
/// board; alignment itself is judged locally per edge.
#[derive(Clone, Copy, Debug)]
pub struct GridAxes {
    pub u: Vector2<f32>,
    pub v: Vector2<f32>,
}

impl GridAxes {
    pub fn from_diagonals(diagonals: [f32; 2]) -> Option<Self> {
        let d0 = angle_to_unit(diagonals[0]);
        let d1 = angle_to_unit(diagonals[1]);
        let (u, v) = (d0 + d1, d0 - d1);
        if u.norm_squared() < 1e-6 || v.norm_squared() < 1e-6 {
            return None;
        }
        let (mut u, mut v) = (u.normalize(), v.normalize());
        // Name the axis closer to image x "u" and point both into +x / +y.
        if v.x.abs() > u.x.abs() {
            std::mem::swap(&mut u, &mut v);
        }
        if u.x < 0.0 {
            u = -u;
        }
        if v.y < 0.0 {
            v = -v;
        }
        Some(Self { u, v })
    }

    pub(crate) fn classify(&self, e: &Vector2<f32>) -> NeighborDirection {
        let pu = e.dot(&self.u);
        let pv = e.dot(&self.v);
        if pu.abs() > pv.abs() {
            if pu >= 0.0 {
                NeighborDirection::Right
            } else {
                NeighborDirection::Left
            }
        } else if pv >= 0.0 {
            NeighborDirection::Down
        } else {
            NeighborDirection::Up
        }
    }
}

fn angle_to_unit(theta: f32) -> Vector2<f32> {
    Vector2::new(theta.cos(), theta.sin())
}

fn is_good_neighbor(
    corner: &Corner,
    neighbor: &Corner,
    neighbor_index: usize,
    params: &GridGraphParams,
    axes: &GridAxes,
) -> Option<NodeNeighbor> {
    let (Some(ci), Some(cj)) = (corner.orientation_cluster, neighbor.orientation_cluster) else {
        return None;
    };
    // Lattice neighbours have flipped colours, hence opposite diagonal families.
    if ci == cj {
        return None;
    }

    let vec_to_neighbor = neighbor.position - corner.position;
    let distance = vec_to_neighbor.norm();
    if distance < params.min_spacing_pix || distance > params.max_spacing_pix {
        return None;
    }

    // The two local diagonals span the local grid axes as their sum and
    // difference; a lattice edge runs along one of them.
    let e = vec_to_neighbor / distance;
    let oi = angle_to_unit(corner.orientation);
    let oj = angle_to_unit(neighbor.orientation);
    let best_alignment = [oi + oj, oi - oj]
        .iter()
        .filter(|v| v.norm_squared() > 1e-6)
        .map(|v| v.normalize().dot(&e).abs())
        .fold(0.0f32, f32::max);

    if best_alignment < params.orientation_tolerance_deg.to_radians().cos() {
        return None;
    }

    Some(NodeNeighbor {
        direction: axes.classify(&e),
        index: neighbor_index,
        distance,
        score: 1.0 - best_alignment,
    })
}

/// Keep at most one neighbour per direction: best alignment, then shortest.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> [Option<NodeNeighbor>; 4] {
    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];
    for candidate in candidates {
        let slot = &mut best[candidate.direction.slot()];
        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.distance < current.distance * 0.9
                    || (candidate.distance < current.distance * 1.1
                        && candidate.score < current.score)
            }
        };
        if replace {
            *slot = Some(candidate);
        }
    }
    best
}

/// 4-connected graph over oriented corners. Links are mutual.
pub struct GridGraph {
    pub neighbors: Vec<Vec<NodeNeighbor>>,
}

impl GridGraph {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(corners, params, axes), fields(corners = corners.len()))
    )]
    pub fn new(corners: &[Corner], params: &GridGraphParams, axes: &GridAxes) -> Self {
        if corners.is_empty() {
            return Self {
                neighbors: Vec::new(),
            };
        }
        let coords: Vec<[f32; 2]> = corners
            .iter()
            .map(|c| [c.position.x, c.position.y])
            .collect();
        let tree: KdTree<f32, 2> = (&coords).into();

        let best: Vec<[Option<NodeNeighbor>; 4]> = corners
            .iter()
            .enumerate()
            .map(|(i, corner)| {
                let query = [corner.position.x, corner.position.y];
                let candidates = tree
                    .nearest_n::<SquaredEuclidean>(&query, params.k_neighbors + 1)
                    .into_iter()
                    .map(|nn| nn.item as usize)
                    .filter(|&j| j != i)
                    .filter_map(|j| is_good_neighbor(corner, &corners[j], j, params, axes))
                    .collect();
                select_neighbors(candidates)
            })
            .collect();

        let neighbors = best
            .iter()
            .enumerate()
            .map(|(i, slots)| {
                slots
                    .iter()
                    .flatten()
                    .filter(|n| {
                        best[n.index][n.direction.opposite().slot()]
                            .as_ref()
                            .is_some_and(|back| back.index == i)
                    })
                    .cloned()
                    .collect()
            })
            .collect();

        Self { neighbors }
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

/// Connected components, each listed in ascending node order.
pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.len()];
    let mut components = Vec::new();

    for start in 0..graph.len() {
        if visited[start] {
            continue;
        }
        let mut component = Vec::new();
        let mut stack = vec![start];
        visited[start] = true;
        while let Some(node) = stack.pop() {
            component.push(node);
            for n in &graph.neighbors[node] {
                if !visited[n.index] {
                    visited[n.index] = true;
                    stack.push(n.index);
                }
            }
        }
        component.sort_unstable();
        components.push(component);
    }
    components
}
