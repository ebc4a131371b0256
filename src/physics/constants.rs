use serde::{Deserialize, Serialize};

/// Physical constants handed to every component at construction.
///
/// Values are CODATA 2018 (exact by the 2019 SI definition except ε₀).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalConstants {
    /// Boltzmann constant [J/K]
    pub k_b: f64,
    /// Elementary charge [C]
    pub q: f64,
    /// Vacuum permittivity [F/m]
    pub eps0: f64,
    /// Lattice temperature [K]
    pub temperature: f64,
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        Self {
            k_b: 1.380_649e-23,
            q: 1.602_176_634e-19,
            eps0: 8.854_187_812_8e-12,
            temperature: 300.0,
        }
    }
}

impl PhysicalConstants {
    pub fn at_temperature(temperature: f64) -> Self {
        Self {
            temperature,
            ..Self::default()
        }
    }

    /// Thermal voltage U_T = k_B T / q [V].
    #[inline]
    pub fn thermal_voltage(&self) -> f64 {
        self.k_b * self.temperature / self.q
    }
}
