//! Element contexts handed to the assembly callbacks by the external solver.

/// A mesh node inside a bulk region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub index: usize,
    pub region: usize,
}

/// A two-point edge between `nodes.0` (here) and `nodes.1` (there), both
/// inside `region`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub nodes: (usize, usize),
    pub region: usize,
}

impl Edge {
    pub fn new(here: usize, there: usize, region: usize) -> Self {
        Self {
            nodes: (here, there),
            region,
        }
    }
}

/// A node on a boundary region. `region` is the bulk region used to look up
/// local unknown indices; `outer_region` is the second adjacent bulk region
/// for interior interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryNode {
    pub index: usize,
    pub bregion: usize,
    pub region: usize,
    pub outer_region: Option<usize>,
}

impl BoundaryNode {
    pub fn outer(index: usize, bregion: usize, region: usize) -> Self {
        Self {
            index,
            bregion,
            region,
            outer_region: None,
        }
    }

    pub fn interface(index: usize, bregion: usize, region: usize, outer_region: usize) -> Self {
        Self {
            index,
            bregion,
            region,
            outer_region: Some(outer_region),
        }
    }
}
