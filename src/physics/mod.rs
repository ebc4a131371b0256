pub mod bernoulli;
pub mod boundary;
pub mod constants;
pub mod distribution;
pub mod equilibrium;
pub mod flux;
pub mod layout;
pub mod params;
pub mod reaction;

use num_dual::DualNum;
use serde::{Deserialize, Serialize};

use crate::config::{BoundaryModel, BulkRecombinationConfig, DeviceConfig, IonicCarrierConfig};
use crate::discretization::context::Edge;
use crate::discretization::mesh::Mesh;
use crate::error::{AssemblyError, ConfigurationError};
use crate::numerics::solver::NonlinearSolver;
use constants::PhysicalConstants;
use distribution::DistributionFunction;
use flux::{CarrierEdge, FluxScheme};
use layout::{InterfaceModel, SpeciesLayout};
use params::ParameterStore;

/// Homotopy multipliers of the nonlinear Poisson charge (λ1), the generation
/// rate (λ2) and the electrochemical boundary reaction (λ3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingParameters {
    pub lambda1: f64,
    pub lambda2: f64,
    pub lambda3: f64,
}

impl Default for EmbeddingParameters {
    fn default() -> Self {
        Self {
            lambda1: 1.0,
            lambda2: 1.0,
            lambda3: 0.0,
        }
    }
}

/// The assembled drift-diffusion model.
///
/// Every assembly callback takes `&self` and writes into a caller-owned
/// residual slice that is expected to be zeroed, so the callbacks can run
/// concurrently across mesh elements. The embedding parameters and the
/// equilibrium flag change only through `&mut self`, which rules out
/// mutation during an assembly pass.
#[derive(Debug, Clone)]
pub struct DeviceModel {
    constants: PhysicalConstants,
    params: ParameterStore,
    distributions: Vec<DistributionFunction>,
    layout: SpeciesLayout,
    interface_model: InterfaceModel,
    boundary_models: Vec<BoundaryModel>,
    flux_scheme: FluxScheme,
    recombination: BulkRecombinationConfig,
    ionic: IonicCarrierConfig,
    penalty_alpha: f64,
    embedding: EmbeddingParameters,
    in_equilibrium: bool,
}

impl DeviceModel {
    /// Validates `config` against `params` and allocates the species layout.
    pub fn new(config: &DeviceConfig, params: ParameterStore) -> Result<Self, ConfigurationError> {
        let nc = config.num_carriers();
        if nc == 0 {
            return Err(ConfigurationError::NoCarriers);
        }
        check_count("carriers", nc, params.num_carriers())?;
        check_count("regions", config.num_regions, params.num_regions())?;
        check_count("boundary_models", config.num_bregions(), params.num_bregions())?;

        for (icc, carrier) in config.carriers.iter().enumerate() {
            if carrier.charge_number != params.charge_number(icc) {
                return Err(ConfigurationError::InvalidParameter(format!(
                    "carrier {icc} has charge number {} but the parameter store says {}",
                    carrier.charge_number,
                    params.charge_number(icc)
                )));
            }
            config.flux_scheme.validate(icc, &carrier.distribution)?;
        }
        if !(config.penalty_alpha.is_finite() && config.penalty_alpha > 0.0) {
            return Err(ConfigurationError::InvalidParameter(format!(
                "penalty alpha must be positive, got {}",
                config.penalty_alpha
            )));
        }

        let interface_model = layout::select_interface_model(&config.boundary_models);
        let layout = layout::allocate(
            nc,
            interface_model,
            &config.ionic,
            &config.continuity(),
            config.num_regions,
            &config.recombination,
        )?;

        Ok(Self {
            constants: config.constants,
            params,
            distributions: config.carriers.iter().map(|c| c.distribution).collect(),
            layout,
            interface_model,
            boundary_models: config.boundary_models.clone(),
            flux_scheme: config.flux_scheme,
            recombination: config.recombination,
            ionic: config.ionic.clone(),
            penalty_alpha: config.penalty_alpha,
            embedding: EmbeddingParameters::default(),
            in_equilibrium: false,
        })
    }

    pub fn constants(&self) -> &PhysicalConstants {
        &self.constants
    }

    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    pub fn layout(&self) -> &SpeciesLayout {
        &self.layout
    }

    pub fn interface_model(&self) -> InterfaceModel {
        self.interface_model
    }

    pub fn boundary_model(&self, ibreg: usize) -> BoundaryModel {
        self.boundary_models[ibreg]
    }

    pub fn flux_scheme(&self) -> FluxScheme {
        self.flux_scheme
    }

    pub fn recombination(&self) -> &BulkRecombinationConfig {
        &self.recombination
    }

    pub fn ionic(&self) -> &IonicCarrierConfig {
        &self.ionic
    }

    pub fn penalty_alpha(&self) -> f64 {
        self.penalty_alpha
    }

    pub fn distribution(&self, icc: usize) -> &DistributionFunction {
        &self.distributions[icc]
    }

    pub fn num_carriers(&self) -> usize {
        self.distributions.len()
    }

    pub fn num_species(&self) -> usize {
        self.layout.num_species()
    }

    pub fn embedding(&self) -> EmbeddingParameters {
        self.embedding
    }

    pub fn set_embedding(&mut self, embedding: EmbeddingParameters) {
        self.embedding = embedding;
    }

    pub fn set_lambda1(&mut self, lambda1: f64) {
        self.embedding.lambda1 = lambda1;
    }

    pub fn in_equilibrium(&self) -> bool {
        self.in_equilibrium
    }

    /// Switches carrier fluxes off and pins the primary carriers to φ = 0.
    pub fn set_equilibrium(&mut self, in_equilibrium: bool) {
        self.in_equilibrium = in_equilibrium;
    }

    /// Registers every species with the regions it lives on.
    pub fn enable_species<S: NonlinearSolver + ?Sized>(&self, solver: &mut S) {
        for (species, regions) in self.layout.species_regions() {
            solver.enable_species(species, &regions);
        }
    }

    /// Fails if `mesh` does not have the node count the parameter store was
    /// built for.
    pub fn check_mesh(&self, mesh: &Mesh) -> Result<(), ConfigurationError> {
        let expected = self.params.num_nodes();
        if mesh.num_nodes() != expected {
            return Err(ConfigurationError::ShapeMismatch {
                table: "mesh nodes",
                expected: (expected, 1),
                found: (mesh.num_nodes(), 1),
            });
        }
        Ok(())
    }

    #[inline]
    pub fn thermal_voltage(&self) -> f64 {
        self.constants.thermal_voltage()
    }

    #[inline]
    pub(crate) fn charge(&self, icc: usize) -> f64 {
        self.params.charge_number(icc) as f64
    }

    /// Reduced chemical potential η = z ((φ - ψ) + E/q) / U_T of carrier
    /// `icc` at `node` inside region `ireg`.
    #[inline]
    pub fn eta<T: DualNum<f64>>(&self, icc: usize, ireg: usize, node: usize, phi: T, psi: T) -> T {
        let band_edge = self.params.band_edge_energy(icc, ireg, node);
        self.reduced_potential(icc, band_edge, phi, psi)
    }

    /// Carrier density N F(η).
    #[inline]
    pub fn density<T: DualNum<f64>>(&self, icc: usize, ireg: usize, node: usize, phi: T, psi: T) -> T {
        let eta = self.eta(icc, ireg, node, phi, psi);
        self.distributions[icc].eval(eta) * self.params.density_of_states(icc, ireg, node)
    }

    /// Carrier density from the boundary tables of `ibreg`.
    #[inline]
    pub fn boundary_density<T: DualNum<f64>>(&self, icc: usize, ibreg: usize, phi: T, psi: T) -> T {
        let band_edge = self.params.b_band_edge_energy(icc, ibreg);
        let eta = self.reduced_potential(icc, band_edge, phi, psi);
        self.distributions[icc].eval(eta) * self.params.b_density_of_states(icc, ibreg)
    }

    #[inline]
    fn reduced_potential<T: DualNum<f64>>(&self, icc: usize, band_edge: f64, phi: T, psi: T) -> T {
        let scale = self.charge(icc) / self.thermal_voltage();
        ((phi - psi) + band_edge / self.constants.q) * scale
    }

    /// Edge flux from `edge.nodes.0` to `edge.nodes.1`.
    ///
    /// The potential gets the displacement flux `-ε ε0 Δψ`. Carriers present
    /// in the edge region get `z q μ U_T (B(X) n_k - B(-X) n_l)` with the
    /// Bernoulli argument and prefactor corrections of the configured scheme.
    /// In equilibrium only the displacement flux is computed.
    pub fn flux<T: DualNum<f64>>(&self, f: &mut [T], uk: &[T], ul: &[T], edge: &Edge) -> Result<(), AssemblyError> {
        let (k, l) = edge.nodes;
        let ireg = edge.region;
        let ipsi = self.layout.potential();
        let q = self.constants.q;
        let ut = self.thermal_voltage();

        let dpsi = ul[ipsi].clone() - uk[ipsi].clone();
        let eps = 0.5 * (self.params.dielectric_constant(ireg, k) + self.params.dielectric_constant(ireg, l));
        f[ipsi] = -dpsi.clone() * (eps * self.constants.eps0);

        if self.in_equilibrium {
            return Ok(());
        }

        for icc in 0..self.num_carriers() {
            let Some(i) = self.layout.index(icc, ireg) else {
                continue;
            };
            let z = self.charge(icc);
            let d_band_edge = self.params.band_edge_energy(icc, ireg, l) - self.params.band_edge_energy(icc, ireg, k);
            let mobility = 0.5 * (self.params.mobility(icc, ireg, k) + self.params.mobility(icc, ireg, l));

            let carrier_edge = CarrierEdge {
                x: (dpsi.clone() - d_band_edge / q) * (z / ut),
                eta_k: self.eta(icc, ireg, k, uk[i].clone(), uk[ipsi].clone()),
                eta_l: self.eta(icc, ireg, l, ul[i].clone(), ul[ipsi].clone()),
                dos_k: self.params.density_of_states(icc, ireg, k),
                dos_l: self.params.density_of_states(icc, ireg, l),
            };
            let j = self.flux_scheme.carrier_flux(&self.distributions[icc], carrier_edge)?;
            f[i] = j * (z * q * mobility * ut);
        }
        Ok(())
    }
}

fn check_count(table: &'static str, expected: usize, found: usize) -> Result<(), ConfigurationError> {
    if expected != found {
        return Err(ConfigurationError::ShapeMismatch {
            table,
            expected: (expected, 1),
            found: (found, 1),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{CarrierConfig, RecombinationModel};
    use crate::physics::params::ParamsBuilder;
    use approx::assert_relative_eq;
    use num_dual::{Dual64, first_derivative};

    pub(crate) const NC: f64 = 4.35e23;
    pub(crate) const NV: f64 = 9.14e24;
    pub(crate) const EC: f64 = 1.424 * 1.602_176_634e-19;

    /// Two-carrier GaAs-like slab with `num_nodes` nodes, one region and two
    /// ohmic contacts.
    pub(crate) fn bipolar_config(scheme: FluxScheme) -> DeviceConfig {
        DeviceConfig {
            carriers: vec![
                CarrierConfig::new(-1, DistributionFunction::Boltzmann),
                CarrierConfig::new(1, DistributionFunction::Boltzmann),
            ],
            num_regions: 1,
            boundary_models: vec![BoundaryModel::OhmicContact, BoundaryModel::OhmicContact],
            recombination: BulkRecombinationConfig {
                electron: 0,
                hole: 1,
                model: RecombinationModel::Full,
            },
            ionic: IonicCarrierConfig::default(),
            flux_scheme: scheme,
            constants: PhysicalConstants::default(),
            penalty_alpha: crate::config::DEFAULT_PENALTY_ALPHA,
        }
    }

    pub(crate) fn bipolar_params(num_nodes: usize) -> ParamsBuilder {
        let mut b = ParamsBuilder::new(2, 1, 2, num_nodes);
        b.charge_numbers = vec![-1, 1];
        b.dielectric_constant[0] = 12.9;
        b.density_of_states[(0, 0)] = NC;
        b.density_of_states[(1, 0)] = NV;
        b.band_edge_energy[(0, 0)] = EC;
        b.mobility[(0, 0)] = 0.85;
        b.mobility[(1, 0)] = 0.04;
        b.doping[(0, 0)] = 1e21;
        for ib in 0..2 {
            b.b_density_of_states[(0, ib)] = NC;
            b.b_density_of_states[(1, ib)] = NV;
            b.b_band_edge_energy[(0, ib)] = EC;
            b.b_doping[(0, ib)] = 1e21;
        }
        b
    }

    pub(crate) fn bipolar_model(scheme: FluxScheme) -> DeviceModel {
        let params = bipolar_params(4).build().expect("valid params");
        DeviceModel::new(&bipolar_config(scheme), params).expect("valid model")
    }

    #[test]
    fn model_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DeviceModel>();
    }

    #[test]
    fn rejects_mismatched_charge_numbers() {
        let mut b = bipolar_params(4);
        b.charge_numbers = vec![1, 1];
        let err = DeviceModel::new(&bipolar_config(FluxScheme::default()), b.build().expect("valid params"))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidParameter(_)));
    }

    #[test]
    fn rejects_region_count_mismatch() {
        let mut config = bipolar_config(FluxScheme::default());
        config.num_regions = 2;
        let err = DeviceModel::new(&config, bipolar_params(4).build().expect("valid params")).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::ShapeMismatch {
                table: "regions",
                expected: (2, 1),
                found: (1, 1)
            }
        );
    }

    #[test]
    fn implicit_scheme_rejects_non_blakemore_statistics_at_build_time() {
        let mut config = bipolar_config(FluxScheme::GeneralizedScharfetterGummel);
        config.carriers[1].distribution = DistributionFunction::FermiDiracZero;
        let err = DeviceModel::new(&config, bipolar_params(4).build().expect("valid params")).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnsupportedStatistics {
                carrier: 1,
                statistics: "Fermi-Dirac(0)"
            }
        );
    }

    #[test]
    fn eta_follows_sign_convention() {
        let model = bipolar_model(FluxScheme::default());
        let ut = model.thermal_voltage();
        // electrons: η = -(φ - ψ + E/q) / U_T
        let eta_n = model.eta(0, 0, 0, 0.1, 0.3);
        assert_relative_eq!(eta_n, -(0.1 - 0.3 + 1.424) / ut, max_relative = 1e-12);
        let eta_p = model.eta(1, 0, 0, 0.1, 0.3);
        assert_relative_eq!(eta_p, (0.1 - 0.3) / ut, max_relative = 1e-12);
    }

    #[test]
    fn displacement_flux_is_scheme_independent() {
        let uk = [0.0, 0.0, 0.1];
        let ul = [0.0, 0.0, 0.4];
        let mut reference = None;
        for scheme in FluxScheme::ALL {
            let model = bipolar_model(scheme);
            let mut f = [0.0; 3];
            model.flux(&mut f, &uk, &ul, &Edge::new(0, 1, 0)).expect("flux");
            let expected = -0.3 * 12.9 * model.constants().eps0;
            assert_relative_eq!(f[2], expected, max_relative = 1e-12);
            let carrier = f[0];
            let r = *reference.get_or_insert(carrier);
            assert_relative_eq!(carrier, r, max_relative = 1e-10);
        }
    }

    #[test]
    fn flux_derivative_is_available_through_dual_numbers() {
        let model = bipolar_model(FluxScheme::ExponentialFitting);
        let flux_of = |psi_l: Dual64| {
            let uk = [Dual64::from(0.0), Dual64::from(0.0), Dual64::from(0.0)];
            let ul = [Dual64::from(0.0), Dual64::from(0.0), psi_l];
            let mut f = vec![Dual64::from(0.0); 3];
            model.flux(&mut f, &uk, &ul, &Edge::new(0, 1, 0)).expect("flux");
            f[2]
        };
        let (_, d) = first_derivative(flux_of, 0.2);
        assert_relative_eq!(d, -12.9 * model.constants().eps0, max_relative = 1e-12);
    }
}
