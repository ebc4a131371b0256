//! Assignment of unknown indices to carriers and the electrostatic potential.
//!
//! Two layouts exist. The plain layout gives each carrier a single index and
//! the potential the next one. The discontinuous layout gives carriers whose
//! quasi-Fermi potential may jump across interior interfaces one index per
//! region, so the interface transfer term can couple the two sides.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{BoundaryModel, BulkRecombinationConfig, IonicCarrierConfig, RecombinationModel};
use crate::error::ConfigurationError;

/// Interface treatment derived from the boundary models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceModel {
    #[default]
    None,
    DiscontinuousQuasiFermi,
    /// Requested but not modeled; allocates the plain layout.
    IonicInterfaceCharge,
}

/// Picks the interface model from the boundary models of all boundary regions.
pub fn select_interface_model(boundary_models: &[BoundaryModel]) -> InterfaceModel {
    if boundary_models.contains(&BoundaryModel::InterfaceDiscontinuousQF) {
        InterfaceModel::DiscontinuousQuasiFermi
    } else if boundary_models.contains(&BoundaryModel::InterfaceIonicCharge) {
        warn!("ionic interface charge is not modeled; falling back to the plain index layout");
        InterfaceModel::IonicInterfaceCharge
    } else {
        InterfaceModel::None
    }
}

/// Unknown indices of one carrier in the discontinuous layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierQuantity {
    /// Index per region, `None` where the carrier is absent.
    pub regions: Vec<Option<usize>>,
    pub continuous: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexingScheme {
    /// One index per carrier.
    Direct(Vec<usize>),
    /// Per-region indices per carrier.
    PerRegion(Vec<CarrierQuantity>),
}

/// The result of index allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeciesLayout {
    scheme: IndexingScheme,
    potential: usize,
    /// Regions each carrier is enabled on.
    carrier_regions: Vec<Vec<usize>>,
    num_regions: usize,
}

impl SpeciesLayout {
    pub fn scheme(&self) -> &IndexingScheme {
        &self.scheme
    }

    /// Index of the electrostatic potential. Always the last allocated one.
    pub fn potential(&self) -> usize {
        self.potential
    }

    pub fn num_species(&self) -> usize {
        self.potential + 1
    }

    pub fn num_carriers(&self) -> usize {
        self.carrier_regions.len()
    }

    pub fn num_regions(&self) -> usize {
        self.num_regions
    }

    pub fn is_discontinuous(&self) -> bool {
        matches!(self.scheme, IndexingScheme::PerRegion(_))
    }

    /// Unknown index of carrier `icc` in region `ireg`, or `None` if the
    /// carrier is not present there.
    pub fn index(&self, icc: usize, ireg: usize) -> Option<usize> {
        if !self.is_active(icc, ireg) {
            return None;
        }
        match &self.scheme {
            IndexingScheme::Direct(indices) => indices.get(icc).copied(),
            IndexingScheme::PerRegion(quantities) => {
                quantities.get(icc).and_then(|q| q.regions.get(ireg).copied().flatten())
            }
        }
    }

    pub fn is_active(&self, icc: usize, ireg: usize) -> bool {
        self.carrier_regions
            .get(icc)
            .is_some_and(|regions| regions.contains(&ireg))
    }

    pub fn carrier_regions(&self, icc: usize) -> &[usize] {
        &self.carrier_regions[icc]
    }

    /// Every species together with the regions it is enabled on, in index
    /// order. The potential lives on every region.
    pub fn species_regions(&self) -> Vec<(usize, Vec<usize>)> {
        let mut species: Vec<(usize, Vec<usize>)> = Vec::with_capacity(self.num_species());
        for (icc, regions) in self.carrier_regions.iter().enumerate() {
            for &ireg in regions {
                if let Some(idx) = self.index(icc, ireg) {
                    match species.iter_mut().find(|(s, _)| *s == idx) {
                        Some((_, enabled)) => enabled.push(ireg),
                        None => species.push((idx, vec![ireg])),
                    }
                }
            }
        }
        species.push((self.potential, (0..self.num_regions).collect()));
        species.sort_by_key(|(idx, _)| *idx);
        species
    }

    /// The carrier owning unknown `species`, if it is not the potential.
    pub fn carrier_of(&self, species: usize) -> Option<usize> {
        (0..self.num_carriers()).find(|&icc| {
            self.carrier_regions[icc]
                .iter()
                .any(|&ireg| self.index(icc, ireg) == Some(species))
        })
    }
}

/// Allocates unknown indices for `carrier_count` carriers.
///
/// Supported configurations are the two primary (electron/hole) carriers plus
/// at most one group of ionic carriers restricted to `ionic.regions`.
pub fn allocate(
    carrier_count: usize,
    interface_model: InterfaceModel,
    ionic: &IonicCarrierConfig,
    continuity: &[bool],
    region_count: usize,
    recombination: &BulkRecombinationConfig,
) -> Result<SpeciesLayout, ConfigurationError> {
    if carrier_count == 0 {
        return Err(ConfigurationError::NoCarriers);
    }
    if region_count == 0 {
        return Err(ConfigurationError::InvalidParameter(
            "at least one bulk region is required".into(),
        ));
    }
    if continuity.len() != carrier_count {
        return Err(ConfigurationError::ShapeMismatch {
            table: "continuity",
            expected: (carrier_count, 1),
            found: (continuity.len(), 1),
        });
    }
    if let Some(&region) = ionic.regions.iter().find(|&&r| r >= region_count) {
        return Err(ConfigurationError::UnknownRegion { region, region_count });
    }
    if let Some(&carrier) = ionic.carriers.iter().find(|&&c| c >= carrier_count) {
        return Err(ConfigurationError::UnsupportedCarrierLayout { carrier_count, carrier });
    }
    validate_recombination(carrier_count, recombination)?;

    let primary = [recombination.electron, recombination.hole];
    if let Some(carrier) =
        (0..carrier_count).find(|icc| !primary.contains(icc) && !ionic.is_ionic(*icc))
    {
        return Err(ConfigurationError::UnsupportedCarrierLayout { carrier_count, carrier });
    }

    let carrier_regions: Vec<Vec<usize>> = (0..carrier_count)
        .map(|icc| {
            if ionic.is_ionic(icc) {
                let mut regions = ionic.regions.clone();
                regions.sort_unstable();
                regions.dedup();
                regions
            } else {
                (0..region_count).collect()
            }
        })
        .collect();

    let (scheme, potential) = match interface_model {
        InterfaceModel::DiscontinuousQuasiFermi => {
            let mut next = 0;
            let quantities = carrier_regions
                .iter()
                .zip(continuity)
                .map(|(active, &continuous)| {
                    let mut regions = vec![None; region_count];
                    if continuous {
                        for &ireg in active {
                            regions[ireg] = Some(next);
                        }
                        next += 1;
                    } else {
                        for &ireg in active {
                            regions[ireg] = Some(next);
                            next += 1;
                        }
                    }
                    CarrierQuantity { regions, continuous }
                })
                .collect();
            (IndexingScheme::PerRegion(quantities), next)
        }
        InterfaceModel::None | InterfaceModel::IonicInterfaceCharge => {
            (IndexingScheme::Direct((0..carrier_count).collect()), carrier_count)
        }
    };

    let layout = SpeciesLayout {
        scheme,
        potential,
        carrier_regions,
        num_regions: region_count,
    };
    info!(
        "allocated {} species for {} carriers ({:?} interface model)",
        layout.num_species(),
        carrier_count,
        interface_model
    );
    Ok(layout)
}

fn validate_recombination(
    carrier_count: usize,
    recombination: &BulkRecombinationConfig,
) -> Result<(), ConfigurationError> {
    let BulkRecombinationConfig { electron, hole, model } = *recombination;
    let invalid = carrier_count < 2 || electron == hole || electron >= carrier_count || hole >= carrier_count;
    if model != RecombinationModel::None && invalid {
        return Err(ConfigurationError::RecombinationCarriers {
            carrier_count,
            electron,
            hole,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bipolar() -> BulkRecombinationConfig {
        BulkRecombinationConfig {
            model: RecombinationModel::Srh,
            ..Default::default()
        }
    }

    #[test]
    fn plain_layout_puts_potential_last() {
        let layout = allocate(2, InterfaceModel::None, &IonicCarrierConfig::default(), &[true, true], 1, &bipolar())
            .expect("valid layout");
        assert_eq!(layout.scheme(), &IndexingScheme::Direct(vec![0, 1]));
        assert_eq!(layout.potential(), 2);
        assert_eq!(layout.num_species(), 3);
        assert_eq!(layout.index(1, 0), Some(1));
    }

    #[test]
    fn discontinuous_carrier_gets_one_index_per_region() {
        let layout = allocate(
            2,
            InterfaceModel::DiscontinuousQuasiFermi,
            &IonicCarrierConfig::default(),
            &[false, true],
            3,
            &bipolar(),
        )
        .expect("valid layout");
        assert_eq!(layout.index(0, 0), Some(0));
        assert_eq!(layout.index(0, 1), Some(1));
        assert_eq!(layout.index(0, 2), Some(2));
        assert_eq!(layout.index(1, 0), Some(3));
        assert_eq!(layout.index(1, 2), Some(3));
        assert_eq!(layout.potential(), 4);
        assert!(layout.is_discontinuous());
        assert_eq!(layout.carrier_of(2), Some(0));
        assert_eq!(layout.carrier_of(4), None);
    }

    #[test]
    fn fully_continuous_discontinuous_layout_matches_plain_count() {
        let ionic = IonicCarrierConfig::default();
        let plain = allocate(2, InterfaceModel::None, &ionic, &[true, true], 2, &bipolar()).expect("plain");
        let per_region = allocate(2, InterfaceModel::DiscontinuousQuasiFermi, &ionic, &[true, true], 2, &bipolar())
            .expect("per region");
        assert_eq!(plain.num_species(), per_region.num_species());
    }

    #[test]
    fn ionic_carrier_lives_only_on_its_regions() {
        let ionic = IonicCarrierConfig {
            carriers: vec![2],
            regions: vec![1],
        };
        let layout = allocate(3, InterfaceModel::None, &ionic, &[true; 3], 3, &bipolar()).expect("valid layout");
        assert_eq!(layout.index(2, 0), None);
        assert_eq!(layout.index(2, 1), Some(2));
        assert_eq!(layout.potential(), 3);
        let species = layout.species_regions();
        assert_eq!(species[2], (2, vec![1]));
        assert_eq!(species[3], (3, vec![0, 1, 2]));
    }

    #[test]
    fn ionic_interface_charge_falls_back_to_plain() {
        let model = select_interface_model(&[BoundaryModel::OhmicContact, BoundaryModel::InterfaceIonicCharge]);
        assert_eq!(model, InterfaceModel::IonicInterfaceCharge);
        let layout = allocate(2, model, &IonicCarrierConfig::default(), &[false, false], 2, &bipolar())
            .expect("valid layout");
        assert!(!layout.is_discontinuous());
        assert_eq!(layout.num_species(), 3);
    }

    #[test]
    fn discontinuous_interface_wins_selection() {
        let models = [BoundaryModel::InterfaceIonicCharge, BoundaryModel::InterfaceDiscontinuousQF];
        assert_eq!(select_interface_model(&models), InterfaceModel::DiscontinuousQuasiFermi);
        assert_eq!(select_interface_model(&[BoundaryModel::OhmicContact]), InterfaceModel::None);
    }

    #[test]
    fn recombination_needs_two_carriers() {
        let err = allocate(1, InterfaceModel::None, &IonicCarrierConfig::default(), &[true], 1, &bipolar())
            .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::RecombinationCarriers {
                carrier_count: 1,
                electron: 0,
                hole: 1
            }
        );
    }

    #[test]
    fn single_carrier_without_recombination_is_fine() {
        let layout = allocate(
            1,
            InterfaceModel::None,
            &IonicCarrierConfig::default(),
            &[true],
            1,
            &BulkRecombinationConfig::default(),
        )
        .expect("valid layout");
        assert_eq!(layout.potential(), 1);
    }

    #[test]
    fn extra_non_ionic_carrier_is_rejected() {
        let ionic = IonicCarrierConfig {
            carriers: vec![2],
            regions: vec![0],
        };
        let err = allocate(4, InterfaceModel::None, &ionic, &[true; 4], 1, &bipolar()).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnsupportedCarrierLayout {
                carrier_count: 4,
                carrier: 3
            }
        );
    }

    #[test]
    fn zero_carriers_and_bad_shapes_are_rejected() {
        let ionic = IonicCarrierConfig::default();
        assert_eq!(
            allocate(0, InterfaceModel::None, &ionic, &[], 1, &bipolar()).unwrap_err(),
            ConfigurationError::NoCarriers
        );
        assert!(matches!(
            allocate(2, InterfaceModel::None, &ionic, &[true], 1, &bipolar()).unwrap_err(),
            ConfigurationError::ShapeMismatch { table: "continuity", .. }
        ));
        let ionic = IonicCarrierConfig {
            carriers: vec![1],
            regions: vec![5],
        };
        assert_eq!(
            allocate(2, InterfaceModel::None, &ionic, &[true, true], 2, &BulkRecombinationConfig::default())
                .unwrap_err(),
            ConfigurationError::UnknownRegion {
                region: 5,
                region_count: 2
            }
        );
    }
}
