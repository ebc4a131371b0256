//! Structured configuration supplied at system-build time.

use serde::{Deserialize, Serialize};

use crate::physics::constants::PhysicalConstants;
use crate::physics::distribution::DistributionFunction;
use crate::physics::flux::FluxScheme;

/// Default penalty α of the soft boundary charge balance.
pub const DEFAULT_PENALTY_ALPHA: f64 = 1e-10;

/// A single charge carrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierConfig {
    pub charge_number: i32,
    #[serde(default)]
    pub distribution: DistributionFunction,
    /// Whether the quasi-Fermi potential is continuous across interior
    /// interfaces. Only relevant for the discontinuous layout.
    #[serde(default = "default_true")]
    pub continuous: bool,
}

impl CarrierConfig {
    pub fn new(charge_number: i32, distribution: DistributionFunction) -> Self {
        Self {
            charge_number,
            distribution,
            continuous: true,
        }
    }

    pub fn discontinuous(mut self) -> Self {
        self.continuous = false;
        self
    }
}

fn default_true() -> bool {
    true
}

fn default_alpha() -> f64 {
    DEFAULT_PENALTY_ALPHA
}

/// Mobile ionic species confined to a subset of regions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IonicCarrierConfig {
    pub carriers: Vec<usize>,
    pub regions: Vec<usize>,
}

impl IonicCarrierConfig {
    pub fn is_ionic(&self, icc: usize) -> bool {
        self.carriers.contains(&icc)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecombinationModel {
    #[default]
    None,
    Radiative,
    Auger,
    Srh,
    /// Radiative + Auger + SRH.
    Full,
}

impl RecombinationModel {
    pub fn radiative(self) -> bool {
        matches!(self, RecombinationModel::Radiative | RecombinationModel::Full)
    }

    pub fn auger(self) -> bool {
        matches!(self, RecombinationModel::Auger | RecombinationModel::Full)
    }

    pub fn srh(self) -> bool {
        matches!(self, RecombinationModel::Srh | RecombinationModel::Full)
    }
}

/// The two carriers of the bipolar recombination model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRecombinationConfig {
    pub electron: usize,
    pub hole: usize,
    pub model: RecombinationModel,
}

impl Default for BulkRecombinationConfig {
    fn default() -> Self {
        Self {
            electron: 0,
            hole: 1,
            model: RecombinationModel::None,
        }
    }
}

/// Boundary model declared for a boundary region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryModel {
    /// Soft charge balance for ψ, Dirichlet φ from [`set_ohmic_contact`].
    ///
    /// [`set_ohmic_contact`]: crate::physics::DeviceModel::set_ohmic_contact
    OhmicContact,
    SchottkyContact,
    /// Interior interface or outer boundary without extra physics.
    #[default]
    InterfaceNone,
    /// Interior interface with discontinuous quasi-Fermi potentials.
    InterfaceDiscontinuousQF,
    /// Ionic interface charge. Not modeled yet; treated like `InterfaceNone`.
    InterfaceIonicCharge,
    /// Electrochemical surface reaction scaled by λ3.
    ElectrochemicalReaction,
}

/// Everything needed to build a [`crate::physics::DeviceModel`] apart from
/// the parameter tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub carriers: Vec<CarrierConfig>,
    pub num_regions: usize,
    /// One entry per boundary region.
    pub boundary_models: Vec<BoundaryModel>,
    #[serde(default)]
    pub recombination: BulkRecombinationConfig,
    #[serde(default)]
    pub ionic: IonicCarrierConfig,
    #[serde(default)]
    pub flux_scheme: FluxScheme,
    #[serde(default)]
    pub constants: PhysicalConstants,
    #[serde(default = "default_alpha")]
    pub penalty_alpha: f64,
}

impl DeviceConfig {
    pub fn num_carriers(&self) -> usize {
        self.carriers.len()
    }

    pub fn num_bregions(&self) -> usize {
        self.boundary_models.len()
    }

    pub fn continuity(&self) -> Vec<bool> {
        self.carriers.iter().map(|c| c.continuous).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_json() {
        let json = r#"{
            "carriers": [
                { "charge_number": -1 },
                { "charge_number": 1, "distribution": { "kind": "blakemore", "gamma": 0.27 } }
            ],
            "num_regions": 1,
            "boundary_models": ["ohmic_contact", "schottky_contact"]
        }"#;
        let config: DeviceConfig = serde_json::from_str(json).expect("valid config");
        assert_eq!(config.num_carriers(), 2);
        assert_eq!(config.carriers[0].distribution, DistributionFunction::Boltzmann);
        assert!(config.carriers[1].continuous);
        assert_eq!(
            config.carriers[1].distribution,
            DistributionFunction::Blakemore { gamma: 0.27 }
        );
        assert_eq!(config.boundary_models[1], BoundaryModel::SchottkyContact);
        assert_eq!(config.recombination, BulkRecombinationConfig::default());
        assert_eq!(config.flux_scheme, FluxScheme::ExponentialFitting);
        assert_eq!(config.penalty_alpha, DEFAULT_PENALTY_ALPHA);
        assert_eq!(config.constants.temperature, 300.0);
    }

    #[test]
    fn parses_full_recombination_and_ionic_group() {
        let json = r#"{
            "carriers": [
                { "charge_number": -1, "continuous": false },
                { "charge_number": 1 },
                { "charge_number": 1 }
            ],
            "num_regions": 3,
            "boundary_models": ["ohmic_contact", "ohmic_contact", "interface_discontinuous_q_f"],
            "recombination": { "electron": 0, "hole": 1, "model": "full" },
            "ionic": { "carriers": [2], "regions": [1] },
            "flux_scheme": "diffusion_enhanced"
        }"#;
        let config: DeviceConfig = serde_json::from_str(json).expect("valid config");
        assert_eq!(config.continuity(), vec![false, true, true]);
        assert!(config.recombination.model.srh());
        assert!(config.recombination.model.auger());
        assert!(config.ionic.is_ionic(2));
        assert_eq!(config.flux_scheme, FluxScheme::DiffusionEnhanced);
    }

    #[test]
    fn model_tags_select_kernels() {
        assert!(!RecombinationModel::None.srh());
        assert!(RecombinationModel::Radiative.radiative());
        assert!(!RecombinationModel::Radiative.auger());
    }
}
