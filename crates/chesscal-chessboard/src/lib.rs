//! Chessboard inner-corner detector.
//!
//! Pipeline for one grayscale frame:
//! 1. Oriented X-junction candidates from the `chess-corners` ChESS detector
//!    ([`chess`]).
//! 2. Candidate orientations clustered into the two diagonal families.
//! 3. k-nearest-neighbour grid graph: mutual links between opposite-family
//!    corners at plausible spacing, aligned with the local grid axes.
//! 4. BFS lattice labelling per connected component; exactly one complete
//!    `columns x rows` rectangle must exist, otherwise the frame is a miss.
//! 5. Canonical row-major ordering, then sub-pixel refinement ([`subpix`]).

pub mod chess;
mod detector;
mod gridgraph;
mod lattice;
mod params;
pub mod subpix;

pub use detector::{ChessboardDetector, ChessboardError, PatternDetector};
pub use gridgraph::{connected_components, GridAxes, GridGraph, NeighborDirection, NodeNeighbor};
pub use lattice::{assign_grid_coordinates, canonical_order, LatticeComponent};
pub use params::{ChessCornerParams, ChessboardParams, GridGraphParams, SubPixParams};
