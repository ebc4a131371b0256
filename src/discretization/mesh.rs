use std::collections::BTreeSet;

use super::context::{BoundaryNode, Edge};
use crate::error::ConfigurationError;

/// The computational grid as seen by the physics layer. Generation happens
/// elsewhere; this is a read-only view over nodes, region-tagged cells and
/// boundary faces.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub coordinates: Vec<[f64; 3]>,
    pub cells: Vec<Cell>,
    pub bfaces: Vec<BoundaryFace>,
    pub num_regions: usize,
    pub num_bregions: usize,
}

/// A simplex cell tagged with its bulk region.
#[derive(Debug, Clone)]
pub struct Cell {
    pub nodes: Vec<usize>,
    pub region: usize,
}

/// A boundary face tagged with its boundary region.
#[derive(Debug, Clone)]
pub struct BoundaryFace {
    pub nodes: Vec<usize>,
    pub region: usize,
}

impl Mesh {
    /// Check that every node and region reference is in range.
    pub fn new(
        coordinates: Vec<[f64; 3]>,
        cells: Vec<Cell>,
        bfaces: Vec<BoundaryFace>,
        num_regions: usize,
        num_bregions: usize,
    ) -> Result<Self, ConfigurationError> {
        let num_nodes = coordinates.len();
        for cell in &cells {
            if cell.region >= num_regions {
                return Err(ConfigurationError::UnknownRegion {
                    region: cell.region,
                    region_count: num_regions,
                });
            }
            if let Some(&node) = cell.nodes.iter().find(|&&n| n >= num_nodes) {
                return Err(ConfigurationError::InvalidParameter(format!(
                    "cell references node {node} but the mesh has {num_nodes} nodes"
                )));
            }
        }
        for bface in &bfaces {
            if bface.region >= num_bregions {
                return Err(ConfigurationError::UnknownRegion {
                    region: bface.region,
                    region_count: num_bregions,
                });
            }
            if let Some(&node) = bface.nodes.iter().find(|&&n| n >= num_nodes) {
                return Err(ConfigurationError::InvalidParameter(format!(
                    "boundary face references node {node} but the mesh has {num_nodes} nodes"
                )));
            }
        }
        Ok(Self {
            coordinates,
            cells,
            bfaces,
            num_regions,
            num_bregions,
        })
    }

    /// A 1D grid on the given coordinates. `cell_regions[i]` tags the
    /// interval `[x_i, x_{i+1}]`; the two end points become boundary regions
    /// 0 (left) and 1 (right).
    pub fn interval(x: &[f64], cell_regions: &[usize]) -> Result<Self, ConfigurationError> {
        if x.len() < 2 || cell_regions.len() + 1 != x.len() {
            return Err(ConfigurationError::ShapeMismatch {
                table: "cell_regions",
                expected: (x.len().saturating_sub(1), 1),
                found: (cell_regions.len(), 1),
            });
        }
        let num_regions = cell_regions.iter().max().map_or(1, |m| m + 1);
        let coordinates = x.iter().map(|&xi| [xi, 0.0, 0.0]).collect();
        let cells = cell_regions
            .iter()
            .enumerate()
            .map(|(i, &region)| Cell {
                nodes: vec![i, i + 1],
                region,
            })
            .collect();
        let bfaces = vec![
            BoundaryFace {
                nodes: vec![0],
                region: 0,
            },
            BoundaryFace {
                nodes: vec![x.len() - 1],
                region: 1,
            },
        ];
        Self::new(coordinates, cells, bfaces, num_regions, 2)
    }

    pub fn num_nodes(&self) -> usize {
        self.coordinates.len()
    }

    /// Sorted bulk regions adjacent to `node`.
    pub fn node_regions(&self, node: usize) -> Vec<usize> {
        self.cells
            .iter()
            .filter(|c| c.nodes.contains(&node))
            .map(|c| c.region)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Every unique node pair sharing a cell, once per region.
    pub fn edges(&self) -> Vec<Edge> {
        let mut seen = BTreeSet::new();
        for cell in &self.cells {
            for (a, &k) in cell.nodes.iter().enumerate() {
                for &l in &cell.nodes[a + 1..] {
                    seen.insert((k.min(l), k.max(l), cell.region));
                }
            }
        }
        seen.into_iter().map(|(k, l, region)| Edge::new(k, l, region)).collect()
    }

    /// Boundary node contexts for every node of every boundary face. Nodes
    /// touching two bulk regions get an interface context.
    pub fn boundary_nodes(&self) -> Vec<BoundaryNode> {
        let mut seen = BTreeSet::new();
        for bface in &self.bfaces {
            for &node in &bface.nodes {
                seen.insert((bface.region, node));
            }
        }
        seen.into_iter()
            .filter_map(|(bregion, node)| {
                let regions = self.node_regions(node);
                match regions.as_slice() {
                    [] => None,
                    [region] => Some(BoundaryNode::outer(node, bregion, *region)),
                    [region, outer, ..] => Some(BoundaryNode::interface(node, bregion, *region, *outer)),
                }
            })
            .collect()
    }

    /// Control volume of every node (1D: half of each adjacent interval).
    pub fn node_volumes_1d(&self) -> Vec<f64> {
        let mut volumes = vec![0.0; self.num_nodes()];
        for cell in &self.cells {
            if let [k, l] = cell.nodes[..] {
                let h = (self.coordinates[l][0] - self.coordinates[k][0]).abs();
                volumes[k] += 0.5 * h;
                volumes[l] += 0.5 * h;
            }
        }
        volumes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_layer() -> Mesh {
        Mesh::interval(&[0.0, 1.0, 2.0, 3.0, 4.0], &[0, 0, 1, 1]).expect("valid mesh")
    }

    #[test]
    fn interval_counts() {
        let mesh = two_layer();
        assert_eq!(mesh.num_nodes(), 5);
        assert_eq!(mesh.num_regions, 2);
        assert_eq!(mesh.num_bregions, 2);
        assert_eq!(mesh.edges().len(), 4);
    }

    #[test]
    fn interface_node_sees_both_regions() {
        let mesh = two_layer();
        assert_eq!(mesh.node_regions(2), vec![0, 1]);
        assert_eq!(mesh.node_regions(0), vec![0]);
        assert_eq!(mesh.node_regions(4), vec![1]);
    }

    #[test]
    fn boundary_nodes_of_contacts() {
        let mesh = two_layer();
        let bnodes = mesh.boundary_nodes();
        assert_eq!(bnodes, vec![BoundaryNode::outer(0, 0, 0), BoundaryNode::outer(4, 1, 1)]);
    }

    #[test]
    fn node_volumes_sum_to_length() {
        let mesh = two_layer();
        let total: f64 = mesh.node_volumes_1d().iter().sum();
        assert_eq!(total, 4.0);
    }

    #[test]
    fn rejects_out_of_range_region() {
        let err = Mesh::new(
            vec![[0.0; 3], [1.0, 0.0, 0.0]],
            vec![Cell { nodes: vec![0, 1], region: 3 }],
            vec![],
            2,
            0,
        )
        .unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownRegion { region: 3, region_count: 2 });
    }
}
