//! Physical coefficients, immutable during an assembly pass.
//!
//! Tables keyed by `(carrier, region)` are stored as `DMatrix` with one row
//! per carrier; region-only tables are `DVector`s. Nodal tables carry
//! additive corrections on top of the region value and are either empty
//! (no overrides) or have one column per mesh node.

use nalgebra::{DMatrix, DVector};

use crate::error::ConfigurationError;

/// Mutable staging area for a [`ParameterStore`]. Every table is allocated
/// with the expected shape; callers fill entries and call [`build`].
///
/// [`build`]: ParamsBuilder::build
#[derive(Debug, Clone)]
pub struct ParamsBuilder {
    pub num_carriers: usize,
    pub num_regions: usize,
    pub num_bregions: usize,
    pub num_nodes: usize,

    pub charge_numbers: Vec<i32>,

    // region tables
    pub dielectric_constant: DVector<f64>,
    pub doping: DMatrix<f64>,
    pub density_of_states: DMatrix<f64>,
    pub band_edge_energy: DMatrix<f64>,
    pub mobility: DMatrix<f64>,
    pub srh_lifetime: DMatrix<f64>,
    pub srh_trap_density: DMatrix<f64>,
    pub auger_coefficient: DMatrix<f64>,
    pub radiative_coefficient: DVector<f64>,
    pub generation: DVector<f64>,

    // boundary tables
    pub b_band_edge_energy: DMatrix<f64>,
    pub b_density_of_states: DMatrix<f64>,
    pub b_mobility: DMatrix<f64>,
    pub b_doping: DMatrix<f64>,
    pub b_velocity: DMatrix<f64>,
    pub b_srh_velocity: DMatrix<f64>,
    pub b_srh_trap_density: DMatrix<f64>,
    pub b_reaction_coefficient: DMatrix<f64>,
    pub b_reaction_density: DMatrix<f64>,
    pub schottky_barrier: DVector<f64>,
    pub contact_voltage: DVector<f64>,

    // nodal corrections
    pub dielectric_constant_node: DVector<f64>,
    pub doping_node: DMatrix<f64>,
    pub density_of_states_node: DMatrix<f64>,
    pub band_edge_energy_node: DMatrix<f64>,
    pub mobility_node: DMatrix<f64>,
}

impl ParamsBuilder {
    /// Allocate zeroed region and boundary tables. Nodal tables start empty.
    pub fn new(num_carriers: usize, num_regions: usize, num_bregions: usize, num_nodes: usize) -> Self {
        let cr = || DMatrix::zeros(num_carriers, num_regions);
        let cb = || DMatrix::zeros(num_carriers, num_bregions);
        let empty = || DMatrix::zeros(num_carriers, 0);
        Self {
            num_carriers,
            num_regions,
            num_bregions,
            num_nodes,
            charge_numbers: vec![0; num_carriers],
            dielectric_constant: DVector::from_element(num_regions, 1.0),
            doping: cr(),
            density_of_states: cr(),
            band_edge_energy: cr(),
            mobility: cr(),
            srh_lifetime: DMatrix::from_element(num_carriers, num_regions, 1.0),
            srh_trap_density: cr(),
            auger_coefficient: cr(),
            radiative_coefficient: DVector::zeros(num_regions),
            generation: DVector::zeros(num_regions),
            b_band_edge_energy: cb(),
            b_density_of_states: cb(),
            b_mobility: cb(),
            b_doping: cb(),
            b_velocity: cb(),
            b_srh_velocity: cb(),
            b_srh_trap_density: cb(),
            b_reaction_coefficient: cb(),
            b_reaction_density: cb(),
            schottky_barrier: DVector::zeros(num_bregions),
            contact_voltage: DVector::zeros(num_bregions),
            dielectric_constant_node: DVector::zeros(0),
            doping_node: empty(),
            density_of_states_node: empty(),
            band_edge_energy_node: empty(),
            mobility_node: empty(),
        }
    }

    /// Allocate zeroed nodal correction tables for graded profiles.
    pub fn with_nodal_overrides(mut self) -> Self {
        let (nc, nn) = (self.num_carriers, self.num_nodes);
        let cn = || DMatrix::zeros(nc, nn);
        self.dielectric_constant_node = DVector::zeros(nn);
        self.doping_node = cn();
        self.density_of_states_node = cn();
        self.band_edge_energy_node = cn();
        self.mobility_node = cn();
        self
    }

    /// Validate every table shape and return the immutable store.
    pub fn build(self) -> Result<ParameterStore, ConfigurationError> {
        let (nc, nr, nb, nn) = (
            self.num_carriers,
            self.num_regions,
            self.num_bregions,
            self.num_nodes,
        );

        if self.charge_numbers.len() != nc {
            return Err(ConfigurationError::ShapeMismatch {
                table: "charge_numbers",
                expected: (nc, 1),
                found: (self.charge_numbers.len(), 1),
            });
        }

        check_vector("dielectric_constant", &self.dielectric_constant, nr)?;
        check_vector("radiative_coefficient", &self.radiative_coefficient, nr)?;
        check_vector("generation", &self.generation, nr)?;
        for (name, table) in [
            ("doping", &self.doping),
            ("density_of_states", &self.density_of_states),
            ("band_edge_energy", &self.band_edge_energy),
            ("mobility", &self.mobility),
            ("srh_lifetime", &self.srh_lifetime),
            ("srh_trap_density", &self.srh_trap_density),
            ("auger_coefficient", &self.auger_coefficient),
        ] {
            check_matrix(name, table, nc, nr)?;
        }

        check_vector("schottky_barrier", &self.schottky_barrier, nb)?;
        check_vector("contact_voltage", &self.contact_voltage, nb)?;
        for (name, table) in [
            ("b_band_edge_energy", &self.b_band_edge_energy),
            ("b_density_of_states", &self.b_density_of_states),
            ("b_mobility", &self.b_mobility),
            ("b_doping", &self.b_doping),
            ("b_velocity", &self.b_velocity),
            ("b_srh_velocity", &self.b_srh_velocity),
            ("b_srh_trap_density", &self.b_srh_trap_density),
            ("b_reaction_coefficient", &self.b_reaction_coefficient),
            ("b_reaction_density", &self.b_reaction_density),
        ] {
            check_matrix(name, table, nc, nb)?;
        }

        if !self.dielectric_constant_node.is_empty() {
            check_vector("dielectric_constant_node", &self.dielectric_constant_node, nn)?;
        }
        for (name, table) in [
            ("doping_node", &self.doping_node),
            ("density_of_states_node", &self.density_of_states_node),
            ("band_edge_energy_node", &self.band_edge_energy_node),
            ("mobility_node", &self.mobility_node),
        ] {
            if table.ncols() != 0 {
                check_matrix(name, table, nc, nn)?;
            } else if table.nrows() != nc {
                return Err(ConfigurationError::ShapeMismatch {
                    table: name,
                    expected: (nc, nn),
                    found: table.shape(),
                });
            }
        }

        if let Some(ireg) = self.dielectric_constant.iter().position(|&eps| eps <= 0.0) {
            return Err(ConfigurationError::InvalidParameter(format!(
                "dielectric constant of region {ireg} must be positive"
            )));
        }
        if self.srh_lifetime.iter().any(|&tau| tau <= 0.0) {
            return Err(ConfigurationError::InvalidParameter(
                "SRH lifetimes must be positive".into(),
            ));
        }
        if self.density_of_states.iter().any(|&n| n < 0.0) {
            return Err(ConfigurationError::InvalidParameter(
                "densities of states must be non-negative".into(),
            ));
        }

        Ok(ParameterStore {
            num_carriers: nc,
            num_regions: nr,
            num_bregions: nb,
            num_nodes: nn,
            charge_numbers: self.charge_numbers,
            dielectric_constant: self.dielectric_constant,
            doping: self.doping,
            density_of_states: self.density_of_states,
            band_edge_energy: self.band_edge_energy,
            mobility: self.mobility,
            srh_lifetime: self.srh_lifetime,
            srh_trap_density: self.srh_trap_density,
            auger_coefficient: self.auger_coefficient,
            radiative_coefficient: self.radiative_coefficient,
            generation: self.generation,
            b_band_edge_energy: self.b_band_edge_energy,
            b_density_of_states: self.b_density_of_states,
            b_mobility: self.b_mobility,
            b_doping: self.b_doping,
            b_velocity: self.b_velocity,
            b_srh_velocity: self.b_srh_velocity,
            b_srh_trap_density: self.b_srh_trap_density,
            b_reaction_coefficient: self.b_reaction_coefficient,
            b_reaction_density: self.b_reaction_density,
            schottky_barrier: self.schottky_barrier,
            contact_voltage: self.contact_voltage,
            dielectric_constant_node: self.dielectric_constant_node,
            doping_node: self.doping_node,
            density_of_states_node: self.density_of_states_node,
            band_edge_energy_node: self.band_edge_energy_node,
            mobility_node: self.mobility_node,
        })
    }
}

fn check_vector(table: &'static str, v: &DVector<f64>, len: usize) -> Result<(), ConfigurationError> {
    if v.len() != len {
        return Err(ConfigurationError::ShapeMismatch {
            table,
            expected: (len, 1),
            found: (v.len(), 1),
        });
    }
    Ok(())
}

fn check_matrix(
    table: &'static str,
    m: &DMatrix<f64>,
    rows: usize,
    cols: usize,
) -> Result<(), ConfigurationError> {
    if m.shape() != (rows, cols) {
        return Err(ConfigurationError::ShapeMismatch {
            table,
            expected: (rows, cols),
            found: m.shape(),
        });
    }
    Ok(())
}

/// Validated, read-only parameter tables.
#[derive(Debug, Clone)]
pub struct ParameterStore {
    num_carriers: usize,
    num_regions: usize,
    num_bregions: usize,
    num_nodes: usize,

    charge_numbers: Vec<i32>,

    dielectric_constant: DVector<f64>,
    doping: DMatrix<f64>,
    density_of_states: DMatrix<f64>,
    band_edge_energy: DMatrix<f64>,
    mobility: DMatrix<f64>,
    srh_lifetime: DMatrix<f64>,
    srh_trap_density: DMatrix<f64>,
    auger_coefficient: DMatrix<f64>,
    radiative_coefficient: DVector<f64>,
    generation: DVector<f64>,

    b_band_edge_energy: DMatrix<f64>,
    b_density_of_states: DMatrix<f64>,
    b_mobility: DMatrix<f64>,
    b_doping: DMatrix<f64>,
    b_velocity: DMatrix<f64>,
    b_srh_velocity: DMatrix<f64>,
    b_srh_trap_density: DMatrix<f64>,
    b_reaction_coefficient: DMatrix<f64>,
    b_reaction_density: DMatrix<f64>,
    schottky_barrier: DVector<f64>,
    contact_voltage: DVector<f64>,

    dielectric_constant_node: DVector<f64>,
    doping_node: DMatrix<f64>,
    density_of_states_node: DMatrix<f64>,
    band_edge_energy_node: DMatrix<f64>,
    mobility_node: DMatrix<f64>,
}

#[inline]
fn nodal(table: &DMatrix<f64>, icc: usize, node: usize) -> f64 {
    if table.ncols() == 0 { 0.0 } else { table[(icc, node)] }
}

impl ParameterStore {
    pub fn num_carriers(&self) -> usize {
        self.num_carriers
    }

    pub fn num_regions(&self) -> usize {
        self.num_regions
    }

    pub fn num_bregions(&self) -> usize {
        self.num_bregions
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn charge_number(&self, icc: usize) -> i32 {
        self.charge_numbers[icc]
    }

    pub fn has_nodal_overrides(&self) -> bool {
        self.doping_node.ncols() != 0
            || self.density_of_states_node.ncols() != 0
            || self.band_edge_energy_node.ncols() != 0
            || self.mobility_node.ncols() != 0
            || !self.dielectric_constant_node.is_empty()
    }

    // Region values with nodal corrections applied.

    pub fn dielectric_constant(&self, ireg: usize, node: usize) -> f64 {
        let correction = if self.dielectric_constant_node.is_empty() {
            0.0
        } else {
            self.dielectric_constant_node[node]
        };
        self.dielectric_constant[ireg] + correction
    }

    pub fn doping(&self, icc: usize, ireg: usize, node: usize) -> f64 {
        self.doping[(icc, ireg)] + nodal(&self.doping_node, icc, node)
    }

    pub fn density_of_states(&self, icc: usize, ireg: usize, node: usize) -> f64 {
        self.density_of_states[(icc, ireg)] + nodal(&self.density_of_states_node, icc, node)
    }

    pub fn band_edge_energy(&self, icc: usize, ireg: usize, node: usize) -> f64 {
        self.band_edge_energy[(icc, ireg)] + nodal(&self.band_edge_energy_node, icc, node)
    }

    pub fn mobility(&self, icc: usize, ireg: usize, node: usize) -> f64 {
        self.mobility[(icc, ireg)] + nodal(&self.mobility_node, icc, node)
    }

    pub fn srh_lifetime(&self, icc: usize, ireg: usize) -> f64 {
        self.srh_lifetime[(icc, ireg)]
    }

    pub fn srh_trap_density(&self, icc: usize, ireg: usize) -> f64 {
        self.srh_trap_density[(icc, ireg)]
    }

    pub fn auger_coefficient(&self, icc: usize, ireg: usize) -> f64 {
        self.auger_coefficient[(icc, ireg)]
    }

    pub fn radiative_coefficient(&self, ireg: usize) -> f64 {
        self.radiative_coefficient[ireg]
    }

    pub fn generation(&self, ireg: usize) -> f64 {
        self.generation[ireg]
    }

    // Boundary values.

    pub fn b_band_edge_energy(&self, icc: usize, ibreg: usize) -> f64 {
        self.b_band_edge_energy[(icc, ibreg)]
    }

    pub fn b_density_of_states(&self, icc: usize, ibreg: usize) -> f64 {
        self.b_density_of_states[(icc, ibreg)]
    }

    pub fn b_mobility(&self, icc: usize, ibreg: usize) -> f64 {
        self.b_mobility[(icc, ibreg)]
    }

    pub fn b_doping(&self, icc: usize, ibreg: usize) -> f64 {
        self.b_doping[(icc, ibreg)]
    }

    pub fn b_velocity(&self, icc: usize, ibreg: usize) -> f64 {
        self.b_velocity[(icc, ibreg)]
    }

    pub fn b_srh_velocity(&self, icc: usize, ibreg: usize) -> f64 {
        self.b_srh_velocity[(icc, ibreg)]
    }

    pub fn b_srh_trap_density(&self, icc: usize, ibreg: usize) -> f64 {
        self.b_srh_trap_density[(icc, ibreg)]
    }

    pub fn b_reaction_coefficient(&self, icc: usize, ibreg: usize) -> f64 {
        self.b_reaction_coefficient[(icc, ibreg)]
    }

    pub fn b_reaction_density(&self, icc: usize, ibreg: usize) -> f64 {
        self.b_reaction_density[(icc, ibreg)]
    }

    pub fn schottky_barrier(&self, ibreg: usize) -> f64 {
        self.schottky_barrier[ibreg]
    }

    pub fn contact_voltage(&self, ibreg: usize) -> f64 {
        self.contact_voltage[ibreg]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ParamsBuilder {
        let mut b = ParamsBuilder::new(2, 2, 2, 5);
        b.charge_numbers = vec![-1, 1];
        b
    }

    #[test]
    fn builds_with_default_shapes() {
        let params = builder().build().expect("valid store");
        assert_eq!(params.num_carriers(), 2);
        assert_eq!(params.num_regions(), 2);
        assert!(!params.has_nodal_overrides());
        assert_eq!(params.doping(0, 1, 4), 0.0);
    }

    #[test]
    fn rejects_wrong_carrier_axis() {
        let mut b = builder();
        b.mobility = DMatrix::zeros(3, 2);
        let err = b.build().unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::ShapeMismatch {
                table: "mobility",
                expected: (2, 2),
                found: (3, 2),
            }
        );
    }

    #[test]
    fn rejects_wrong_region_axis_on_boundary_table() {
        let mut b = builder();
        b.schottky_barrier = DVector::zeros(3);
        assert!(matches!(
            b.build(),
            Err(ConfigurationError::ShapeMismatch { table: "schottky_barrier", .. })
        ));
    }

    #[test]
    fn rejects_non_positive_lifetime() {
        let mut b = builder();
        b.srh_lifetime[(1, 0)] = 0.0;
        assert!(matches!(b.build(), Err(ConfigurationError::InvalidParameter(_))));
    }

    #[test]
    fn nodal_corrections_are_additive() {
        let mut b = builder().with_nodal_overrides();
        b.doping[(0, 1)] = 1e21;
        b.doping_node[(0, 3)] = 5e20;
        b.band_edge_energy[(1, 0)] = -1.0;
        b.band_edge_energy_node[(1, 2)] = 0.25;
        b.dielectric_constant[0] = 11.5;
        b.dielectric_constant_node[2] = 0.5;
        let params = b.build().expect("valid store");
        assert!(params.has_nodal_overrides());
        assert_eq!(params.doping(0, 1, 3), 1.5e21);
        assert_eq!(params.doping(0, 1, 2), 1e21);
        assert_eq!(params.band_edge_energy(1, 0, 2), -0.75);
        assert_eq!(params.dielectric_constant(0, 2), 12.0);
    }

    #[test]
    fn rejects_partial_nodal_table() {
        let mut b = builder().with_nodal_overrides();
        b.mobility_node = DMatrix::zeros(2, 4);
        assert!(matches!(
            b.build(),
            Err(ConfigurationError::ShapeMismatch { table: "mobility_node", .. })
        ));
    }
}
