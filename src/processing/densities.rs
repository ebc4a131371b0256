use nalgebra::{DMatrix, DVector};

use crate::discretization::mesh::Mesh;
use crate::error::ConfigurationError;
use crate::physics::DeviceModel;

/// Per-node quantities reconstructed from a node-major solution.
///
/// Carrier rows are indexed by carrier id. Entries for carriers absent at a
/// node are NaN.
#[derive(Debug, Clone)]
pub struct NodalProfile {
    pub potential: DVector<f64>,
    /// Quasi-Fermi potentials φ (V).
    pub quasi_fermi: DMatrix<f64>,
    /// Densities N F(η) (m⁻³).
    pub density: DMatrix<f64>,
    /// Band-edge energies E - q ψ (J).
    pub band_edge: DMatrix<f64>,
}

impl NodalProfile {
    pub fn num_nodes(&self) -> usize {
        self.potential.len()
    }

    /// Space charge `q Σ z n` at every node, doping excluded. Absent carriers
    /// do not contribute.
    pub fn carrier_charge(&self, model: &DeviceModel) -> DVector<f64> {
        let q = model.constants().q;
        DVector::from_fn(self.num_nodes(), |node, _| {
            (0..self.density.nrows())
                .map(|icc| self.density[(icc, node)])
                .enumerate()
                .filter(|(_, n)| n.is_finite())
                .map(|(icc, n)| q * model.params().charge_number(icc) as f64 * n)
                .sum()
        })
    }
}

impl DeviceModel {
    /// Evaluates densities, band edges and quasi-Fermi potentials at every
    /// mesh node. A carrier living on several regions of an interface node is
    /// reported from the lowest-numbered region.
    pub fn nodal_profile(&self, mesh: &Mesh, solution: &DVector<f64>) -> Result<NodalProfile, ConfigurationError> {
        self.check_mesh(mesh)?;
        let ns = self.num_species();
        let nn = mesh.num_nodes();
        if solution.len() != nn * ns {
            return Err(ConfigurationError::ShapeMismatch {
                table: "solution",
                expected: (nn * ns, 1),
                found: (solution.len(), 1),
            });
        }

        let nc = self.num_carriers();
        let q = self.constants().q;
        let ipsi = self.layout().potential();
        let mut profile = NodalProfile {
            potential: DVector::zeros(nn),
            quasi_fermi: DMatrix::from_element(nc, nn, f64::NAN),
            density: DMatrix::from_element(nc, nn, f64::NAN),
            band_edge: DMatrix::from_element(nc, nn, f64::NAN),
        };

        for node in 0..nn {
            let u = &solution.as_slice()[node * ns..(node + 1) * ns];
            let psi = u[ipsi];
            profile.potential[node] = psi;
            for icc in 0..nc {
                let found = mesh
                    .node_regions(node)
                    .into_iter()
                    .find_map(|ireg| self.layout().index(icc, ireg).map(|i| (ireg, i)));
                let Some((ireg, i)) = found else {
                    continue;
                };
                profile.quasi_fermi[(icc, node)] = u[i];
                profile.density[(icc, node)] = self.density(icc, ireg, node, u[i], psi);
                profile.band_edge[(icc, node)] = self.params().band_edge_energy(icc, ireg, node) - q * psi;
            }
        }
        Ok(profile)
    }
}
